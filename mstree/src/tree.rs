//! The merkle sorted tree.

use mstree_core::codec::{decode_index, encode_index, CodecError};
use mstree_core::digest::{Digest, HashAlgorithm, DIGEST_LEN};
use mstree_core::index::{aligned_offset, common_subtree, IndexEntry, TreeDegree};
use mstree_core::proof::HashPathProof;
use tracing::{debug, trace};

use crate::error::Error;
use crate::iter::TreeIterator;
use crate::node::{Child, TreeNode};
use crate::options::TreeOptions;
use crate::store::KvStore;

/// A merkle sorted tree over a put-if-absent key-value store.
///
/// The tree indexes opaque byte values by a 64-bit non-negative id inside the
/// fixed id space `[0, max_count)`. Its shape is a pure function of the
/// populated ids: every node covers an aligned id range split into `degree`
/// slots, values sit at the `step == 1` layer, and a slot may reference a
/// node arbitrarily far below when only one subtree of its range is
/// populated. Nodes are content-addressed in storage, so equal contents
/// produce equal root digests regardless of insertion order.
///
/// Updates stage in memory until [`commit`](Self::commit) flushes dirty nodes
/// bottom-up and returns the new root digest; [`cancel`](Self::cancel)
/// discards staged updates without touching storage. The tree is a
/// single-writer structure: callers serialize mutations externally.
pub struct MerkleSortTree<S> {
    degree: TreeDegree,
    algorithm: HashAlgorithm,
    options: TreeOptions,
    key_prefix: Vec<u8>,
    store: S,
    /// Always present between method calls; taken transiently while the tree
    /// restructures around it.
    root: Option<TreeNode>,
    /// The root as of the last successful commit (or open): its digest and a
    /// snapshot of its entry. `None` for a never-committed tree.
    committed_root: Option<(Digest, IndexEntry)>,
}

impl<S: KvStore> MerkleSortTree<S> {
    /// Create an empty tree with the default branching factor.
    pub fn new(options: TreeOptions, key_prefix: impl Into<Vec<u8>>, store: S) -> Self {
        Self::with_degree(TreeDegree::default(), options, key_prefix, store)
    }

    /// Create an empty tree with the given branching-factor preset.
    pub fn with_degree(
        degree: TreeDegree,
        options: TreeOptions,
        key_prefix: impl Into<Vec<u8>>,
        store: S,
    ) -> Self {
        let root = TreeNode::new_path(0, degree.root_step(), degree.degree());
        MerkleSortTree {
            degree,
            algorithm: options.hash_algorithm,
            options,
            key_prefix: key_prefix.into(),
            store,
            root: Some(root),
            committed_root: None,
        }
    }

    /// Open a tree at an existing root.
    ///
    /// The branching factor is inferred from the root entry; the tree adopts
    /// the hash algorithm of the root digest. Fails with
    /// [`Error::NotFound`] when the root is absent from storage, with
    /// [`Error::HashMismatch`] when `verify_on_load` rejects the stored
    /// bytes, and with [`Error::BadRoot`] when the entry carries an
    /// unsupported degree.
    pub fn open(
        root_hash: Digest,
        options: TreeOptions,
        key_prefix: impl Into<Vec<u8>>,
        store: S,
    ) -> Result<Self, Error> {
        let key_prefix = key_prefix.into();
        let key = storage_key(&key_prefix, &root_hash);
        let bytes = store
            .get(&key)
            .map_err(Error::Storage)?
            .ok_or(Error::NotFound(root_hash))?;
        if options.verify_on_load && !root_hash.verify(&bytes) {
            return Err(Error::HashMismatch(root_hash));
        }
        let entry = decode_index(&bytes).map_err(Error::Codec)?;
        let degree =
            TreeDegree::of_degree(entry.degree()).ok_or(Error::BadRoot(entry.degree()))?;
        let root = TreeNode::from_entry(Some(root_hash), entry.clone());
        Ok(MerkleSortTree {
            degree,
            algorithm: root_hash.algorithm(),
            options,
            key_prefix,
            store,
            root: Some(root),
            committed_root: Some((root_hash, entry)),
        })
    }

    /// The branching-factor preset of this tree.
    pub fn degree(&self) -> TreeDegree {
        self.degree
    }

    /// The exclusive upper bound of the id space.
    pub fn max_count(&self) -> i64 {
        self.degree.max_count()
    }

    /// The hash algorithm of nodes written by this tree.
    pub fn hash_algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// The root digest as of the last successful commit, or `None` for an
    /// empty, never-committed tree. Staged updates do not change it until
    /// they are committed.
    pub fn root_hash(&self) -> Option<Digest> {
        self.committed_root.as_ref().map(|(hash, _)| *hash)
    }

    /// The number of populated ids as of the last commit.
    pub fn count(&self) -> i64 {
        self.root().count()
    }

    /// Whether the tree holds staged, uncommitted updates.
    pub fn is_modified(&self) -> bool {
        self.root().is_modified()
    }

    /// Insert the value at `id`, staging the update in memory.
    ///
    /// Writing to an already-populated id is rejected with
    /// [`Error::DuplicateId`] unless an update hook is installed; the hook
    /// then decides the stored value. The tree is left untouched when the
    /// write is rejected or ignored.
    pub fn set(&mut self, id: i64, value: Vec<u8>) -> Result<(), Error> {
        self.ensure_writable()?;
        self.check_id(id)?;
        let mut root = self.take_root();
        if !root.contains(id) {
            root = self.raise_root(root, id);
        }
        let result = self.insert_into(&mut root, id, value);
        self.root = Some(root);
        result.map(|_| ())
    }

    /// Fetch the value at `id`, or `None` when unpopulated. Staged values are
    /// observed. The walk loads missing nodes on demand without populating
    /// the staging cache.
    pub fn get(&self, id: i64) -> Result<Option<Vec<u8>>, Error> {
        self.seek(id, &mut NullSelector)
    }

    /// The merkle proof of the value at `id`: the digest of every index entry
    /// on the path from the root, followed by the digest of the payload.
    /// Returns `None` when `id` is unpopulated. Fails with
    /// [`Error::Uncommitted`] when the path carries staged updates, since a
    /// dirty node has no digest to authenticate against.
    pub fn get_proof(&self, id: i64) -> Result<Option<HashPathProof>, Error> {
        let mut selector = ProofSelector::default();
        match self.seek(id, &mut selector)? {
            None => Ok(None),
            Some(_) => {
                let path: Option<Vec<Digest>> = selector.path.into_iter().collect();
                let path = path.ok_or(Error::Uncommitted)?;
                Ok(Some(HashPathProof::new(path)))
            }
        }
    }

    /// An in-order iterator over the populated `(id, value)` entries as of
    /// the last commit. Updates staged or committed after creation are not
    /// observed.
    pub fn iter(&self) -> TreeIterator<'_, S> {
        let entry = match &self.committed_root {
            Some((_, entry)) => entry.clone(),
            None => IndexEntry::empty(0, self.degree.root_step(), self.degree.degree()),
        };
        TreeIterator::new(self, entry)
    }

    /// Persist all staged updates, children before parents, and return the
    /// new root digest.
    ///
    /// Writes are content-addressed and idempotent: re-committing identical
    /// content is a success unless `report_duplicate_on_put` is enabled. A
    /// failed commit leaves the staged state intact; callers may retry or
    /// [`cancel`](Self::cancel).
    pub fn commit(&mut self) -> Result<Digest, Error> {
        self.ensure_writable()?;
        let mut root = self.take_root();
        let result = self.commit_node(&mut root);
        if let Ok(hash) = &result {
            self.committed_root = Some((*hash, root.to_entry()));
            debug!(root = %hash, count = root.count(), "committed tree");
        }
        self.root = Some(root);
        result
    }

    /// Discard all staged updates without touching storage. The observable
    /// state returns to the last commit (or to empty for a never-committed
    /// tree).
    pub fn cancel(&mut self) -> Result<(), Error> {
        self.ensure_writable()?;
        let mut root = self.take_root();
        root.cancel();
        let keep = match (&self.committed_root, root.stored_hash()) {
            (Some((committed, _)), Some(current)) => committed == current,
            (None, None) => true,
            _ => false,
        };
        self.root = Some(if keep {
            root
        } else {
            match &self.committed_root {
                Some((hash, entry)) => TreeNode::from_entry(Some(*hash), entry.clone()),
                None => TreeNode::new_path(0, self.degree.root_step(), self.degree.degree()),
            }
        });
        debug!("cancelled staged tree updates");
        Ok(())
    }

    /// The storage key a node digest is persisted under: the tree's key
    /// prefix followed by the encoded digest.
    pub fn storage_key(&self, digest: &Digest) -> Vec<u8> {
        storage_key(&self.key_prefix, digest)
    }

    fn root(&self) -> &TreeNode {
        self.root.as_ref().expect("tree root is always present")
    }

    fn take_root(&mut self) -> TreeNode {
        self.root.take().expect("tree root is always present")
    }

    fn ensure_writable(&self) -> Result<(), Error> {
        if self.options.readonly {
            return Err(Error::ReadOnly);
        }
        Ok(())
    }

    fn check_id(&self, id: i64) -> Result<(), Error> {
        if id < 0 || id >= self.degree.max_count() {
            return Err(Error::BadId(id));
        }
        Ok(())
    }

    /// Create a parent above `root` so that the tree covers `id`. Only
    /// reachable on trees opened at a subtree root; a full-range root covers
    /// every legal id.
    fn raise_root(&self, root: TreeNode, id: i64) -> TreeNode {
        let degree = self.degree.degree();
        let (offset, step) = common_subtree(id, root.offset, root.step, degree);
        debug_assert!(step < self.degree.max_count());
        let mut parent = TreeNode::new_path(offset, step, degree);
        let slot = parent
            .slot_of(root.offset)
            .expect("the common subtree covers the previous root");
        let hash = root.node_hash().copied();
        parent
            .set_index_child(slot, hash, root)
            .expect("the previous root fits inside the raised parent");
        parent
    }

    /// Merge `(id, value)` into the subtree rooted at `node`, which must
    /// cover `id`. Returns whether anything changed.
    fn insert_into(&self, node: &mut TreeNode, id: i64, value: Vec<u8>) -> Result<bool, Error> {
        let idx = node.slot_of(id).expect("id lies inside this subtree");
        if node.is_leaf_layer() {
            return self.insert_value(node, idx, id, value);
        }

        if !node.slot_populated(idx) {
            let leaf = self.fresh_leaf(id, value);
            node.set_index_child(idx, None, leaf)?;
            return Ok(true);
        }

        self.resolve_child(node, idx)?;
        let child_covers = match &node.children[idx] {
            Some(Child::Index(child)) => child.contains(id),
            _ => unreachable!("path-layer slots hold index children"),
        };

        if child_covers {
            let child = match node.children[idx].as_mut() {
                Some(Child::Index(child)) => child,
                _ => unreachable!("path-layer slots hold index children"),
            };
            let changed = self.insert_into(child, id, value)?;
            if changed {
                node.touch_slot(idx);
            }
            Ok(changed)
        } else {
            // The id lands in this slot but outside the existing subtree:
            // both move under a fresh parent at their common span.
            let old = match node.children[idx].take() {
                Some(Child::Index(child)) => *child,
                _ => unreachable!("path-layer slots hold index children"),
            };
            let degree = old.degree();
            let (offset, step) = common_subtree(id, old.offset, old.step, degree);
            let mut parent = TreeNode::new_path(offset, step, degree);
            let old_slot = parent
                .slot_of(old.offset)
                .expect("the common subtree covers the existing child");
            let old_hash = old.node_hash().copied();
            parent
                .set_index_child(old_slot, old_hash, old)
                .expect("the existing child fits inside the merge parent");
            let new_slot = parent
                .slot_of(id)
                .expect("the common subtree covers the new id");
            let leaf = self.fresh_leaf(id, value);
            parent
                .set_index_child(new_slot, None, leaf)
                .expect("the fresh leaf fits inside the merge parent");
            node.set_index_child(idx, None, parent)?;
            Ok(true)
        }
    }

    /// A fresh leaf-layer node holding `value` at `id`.
    fn fresh_leaf(&self, id: i64, value: Vec<u8>) -> TreeNode {
        let degree = self.degree.degree();
        let mut leaf = TreeNode::new_leaf(aligned_offset(id, 1, degree), degree);
        let slot = leaf.slot_of(id).expect("id lies inside its leaf node");
        leaf.set_value_child(slot, value);
        leaf
    }

    /// Stage a value into a leaf-layer slot, consulting the duplicate policy
    /// when the slot is populated.
    fn insert_value(
        &self,
        node: &mut TreeNode,
        idx: usize,
        id: i64,
        value: Vec<u8>,
    ) -> Result<bool, Error> {
        let stored = if node.slot_populated(idx) {
            let hook = match self.options.update_hook.as_ref() {
                None => return Err(Error::DuplicateId(id)),
                Some(hook) => hook,
            };
            self.resolve_child(node, idx)?;
            let old = match &node.children[idx] {
                Some(Child::Value(bytes)) => bytes.as_slice(),
                _ => unreachable!("leaf-layer slots hold payload bytes"),
            };
            match hook(id, Some(old), value) {
                Some(stored) => stored,
                None => return Ok(false),
            }
        } else {
            match self.options.update_hook.as_ref() {
                Some(hook) => match hook(id, None, value) {
                    Some(stored) => stored,
                    None => return Ok(false),
                },
                None => value,
            }
        };
        node.set_value_child(idx, stored);
        Ok(true)
    }

    /// Load the child in `idx` into the staging cache if the slot carries a
    /// hash but no resolved child.
    fn resolve_child(&self, node: &mut TreeNode, idx: usize) -> Result<(), Error> {
        if node.children[idx].is_some() {
            return Ok(());
        }
        let hash = node.child_hashes[idx].expect("an unresolved populated slot carries a hash");
        let child = if node.is_leaf_layer() {
            Child::Value(self.load_node_bytes(&hash)?)
        } else {
            Child::Index(Box::new(self.load_tree_node(&hash)?))
        };
        node.children[idx] = Some(child);
        Ok(())
    }

    /// Walk from the root towards `id`, reporting every visited node to the
    /// selector, and return the payload at `id` if populated.
    fn seek(
        &self,
        id: i64,
        selector: &mut dyn EntrySelector,
    ) -> Result<Option<Vec<u8>>, Error> {
        let mut node = self.root();
        selector.visit_index(node.node_hash());
        loop {
            let idx = match node.slot_of(id) {
                Some(idx) => idx,
                None => return Ok(None),
            };
            if node.is_leaf_layer() {
                return match &node.children[idx] {
                    Some(Child::Value(bytes)) => {
                        selector.visit_value(node.child_hashes[idx].as_ref());
                        Ok(Some(bytes.clone()))
                    }
                    Some(Child::Index(_)) => unreachable!("leaf-layer slots hold payload bytes"),
                    None => match node.child_hashes[idx] {
                        Some(hash) => {
                            selector.visit_value(Some(&hash));
                            Ok(Some(self.load_node_bytes(&hash)?))
                        }
                        None => Ok(None),
                    },
                };
            }
            match &node.children[idx] {
                Some(Child::Index(child)) => {
                    selector.visit_index(node.child_hashes[idx].as_ref());
                    node = &**child;
                }
                Some(Child::Value(_)) => unreachable!("path-layer slots hold index children"),
                None => {
                    let hash = match node.child_hashes[idx] {
                        Some(hash) => hash,
                        None => return Ok(None),
                    };
                    selector.visit_index(Some(&hash));
                    return self.seek_stored(self.load_index_entry(&hash)?, id, selector);
                }
            }
        }
    }

    /// Continue a seek below the staging cache, walking stored entries only.
    fn seek_stored(
        &self,
        mut entry: IndexEntry,
        id: i64,
        selector: &mut dyn EntrySelector,
    ) -> Result<Option<Vec<u8>>, Error> {
        loop {
            let idx = match entry.slot_of(id) {
                Some(idx) => idx,
                None => return Ok(None),
            };
            let hash = match entry.child_hashes[idx] {
                Some(hash) => hash,
                None => return Ok(None),
            };
            if entry.step == 1 {
                selector.visit_value(Some(&hash));
                return Ok(Some(self.load_node_bytes(&hash)?));
            }
            selector.visit_index(Some(&hash));
            entry = self.load_index_entry(&hash)?;
        }
    }

    /// Persist `node` and everything dirty below it, children first, and
    /// return its digest.
    fn commit_node(&self, node: &mut TreeNode) -> Result<Digest, Error> {
        if !node.is_modified() {
            return Ok(*node
                .stored_hash()
                .expect("a clean node carries its stored hash"));
        }
        if node.is_leaf_layer() {
            for idx in 0..node.degree() {
                if node.child_hashes[idx].is_some() {
                    continue;
                }
                if let Some(Child::Value(bytes)) = &node.children[idx] {
                    let hash = self.save_bytes(bytes)?;
                    node.child_hashes[idx] = Some(hash);
                    node.child_counts[idx] = 1;
                }
            }
        } else {
            for idx in 0..node.degree() {
                if let Some(Child::Index(child)) = node.children[idx].as_mut() {
                    let hash = self.commit_node(child)?;
                    node.child_hashes[idx] = Some(hash);
                    node.child_counts[idx] = child.count();
                }
            }
        }
        let bytes = encode_index(&node.to_entry());
        let hash = self.save_bytes(&bytes)?;
        node.mark_committed(hash);
        Ok(hash)
    }

    pub(crate) fn load_node_bytes(&self, hash: &Digest) -> Result<Vec<u8>, Error> {
        let key = self.storage_key(hash);
        let bytes = self
            .store
            .get(&key)
            .map_err(Error::Storage)?
            .ok_or(Error::NotFound(*hash))?;
        if self.options.verify_on_load && !hash.verify(&bytes) {
            return Err(Error::HashMismatch(*hash));
        }
        trace!(node = %hash, len = bytes.len(), "loaded node");
        Ok(bytes)
    }

    pub(crate) fn load_index_entry(&self, hash: &Digest) -> Result<IndexEntry, Error> {
        decode_index(&self.load_node_bytes(hash)?).map_err(Error::Codec)
    }

    fn load_tree_node(&self, hash: &Digest) -> Result<TreeNode, Error> {
        let entry = self.load_index_entry(hash)?;
        if entry.degree() != self.degree.degree() {
            return Err(Error::Codec(CodecError::Invariant(
                "child degree differs from tree degree",
            )));
        }
        Ok(TreeNode::from_entry(Some(*hash), entry))
    }

    fn save_bytes(&self, bytes: &[u8]) -> Result<Digest, Error> {
        let hash = self.algorithm.hash(bytes);
        let key = self.storage_key(&hash);
        let fresh = self
            .store
            .put_if_absent(&key, bytes)
            .map_err(Error::Storage)?;
        if !fresh && self.options.report_duplicate_on_put {
            return Err(Error::DuplicatePut(hash));
        }
        trace!(node = %hash, len = bytes.len(), fresh, "stored node");
        Ok(hash)
    }
}

fn storage_key(prefix: &[u8], digest: &Digest) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + DIGEST_LEN);
    key.extend_from_slice(prefix);
    key.extend_from_slice(&digest.encode());
    key
}

/// Observes the nodes visited while seeking an id.
trait EntrySelector {
    /// An index entry on the path, with its digest when clean.
    fn visit_index(&mut self, hash: Option<&Digest>);
    /// The located payload, with its digest when clean.
    fn visit_value(&mut self, hash: Option<&Digest>);
}

struct NullSelector;

impl EntrySelector for NullSelector {
    fn visit_index(&mut self, _hash: Option<&Digest>) {}
    fn visit_value(&mut self, _hash: Option<&Digest>) {}
}

/// Records the digest path for a merkle proof. Dirty nodes record `None`,
/// which invalidates the proof once the target is actually found.
#[derive(Default)]
struct ProofSelector {
    path: Vec<Option<Digest>>,
}

impl EntrySelector for ProofSelector {
    fn visit_index(&mut self, hash: Option<&Digest>) {
        self.path.push(hash.copied());
    }

    fn visit_value(&mut self, hash: Option<&Digest>) {
        self.path.push(hash.copied());
    }
}
