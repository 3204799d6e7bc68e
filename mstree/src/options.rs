use mstree_core::digest::HashAlgorithm;

/// Decides the value stored when a write lands on an id.
///
/// Receives the id, the existing value if the id is already populated, and
/// the incoming value; returns the value to store, or `None` to ignore the
/// write. Without a hook, writes to populated ids are rejected.
pub type UpdateHook = Box<dyn Fn(i64, Option<&[u8]>, Vec<u8>) -> Option<Vec<u8>> + Send + Sync>;

/// Options when creating or opening a [`crate::MerkleSortTree`].
pub struct TreeOptions {
    pub(crate) hash_algorithm: HashAlgorithm,
    pub(crate) verify_on_load: bool,
    pub(crate) report_duplicate_on_put: bool,
    pub(crate) readonly: bool,
    pub(crate) update_hook: Option<UpdateHook>,
}

impl TreeOptions {
    /// Create a new `TreeOptions` instance with the default values.
    pub fn new() -> Self {
        TreeOptions {
            hash_algorithm: HashAlgorithm::Blake3,
            verify_on_load: false,
            report_duplicate_on_put: false,
            readonly: false,
            update_hook: None,
        }
    }

    /// Select the hash algorithm for nodes written by this tree.
    ///
    /// A tree opened at an existing root adopts the algorithm of the root
    /// digest instead, since all nodes under one root share its algorithm.
    ///
    /// Default: Blake3.
    pub fn hash_algorithm(&mut self, algorithm: HashAlgorithm) {
        self.hash_algorithm = algorithm;
    }

    /// Re-hash node bytes on every load and compare against the requested
    /// digest, surfacing corruption as an error.
    ///
    /// Default: off.
    pub fn verify_on_load(&mut self, verify: bool) {
        self.verify_on_load = verify;
    }

    /// Treat a put of already-present content as an error instead of relying
    /// on content-addressed idempotence.
    ///
    /// Default: off.
    pub fn report_duplicate_on_put(&mut self, report: bool) {
        self.report_duplicate_on_put = report;
    }

    /// Reject `set`, `commit` and `cancel`.
    ///
    /// Default: off.
    pub fn readonly(&mut self, readonly: bool) {
        self.readonly = readonly;
    }

    /// Install a hook deciding writes to already-populated ids.
    pub fn update_hook(&mut self, hook: UpdateHook) {
        self.update_hook = Some(hook);
    }
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self::new()
    }
}
