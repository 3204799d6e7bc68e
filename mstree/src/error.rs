use mstree_core::codec::CodecError;
use mstree_core::digest::Digest;
use thiserror::Error;

/// Errors surfaced by tree operations.
///
/// No operation retries internally. A failed [`commit`](crate::MerkleSortTree::commit)
/// leaves the staged state intact, so callers may retry or
/// [`cancel`](crate::MerkleSortTree::cancel).
#[derive(Debug, Error)]
pub enum Error {
    /// The id lies outside the tree's id space `[0, max_count)`.
    #[error("id {0} is outside the tree's id space")]
    BadId(i64),

    /// A value was written to an already-populated id and no update hook is
    /// installed.
    #[error("id {0} is already populated")]
    DuplicateId(i64),

    /// A mutating operation was invoked on a read-only tree.
    #[error("the tree is read-only")]
    ReadOnly,

    /// An expected node was absent from storage.
    #[error("merkle node {0} does not exist in storage")]
    NotFound(Digest),

    /// Stored node bytes did not hash back to the requested digest.
    #[error("merkle node {0} failed hash verification")]
    HashMismatch(Digest),

    /// A child was installed under a parent whose range does not cover it.
    #[error("child at offset {offset} with step {step} does not belong to its parent")]
    BadChild {
        /// Offset of the rejected child.
        offset: i64,
        /// Step of the rejected child.
        step: i64,
    },

    /// The loaded root carries an unsupported branching factor.
    #[error("root node has unsupported degree {0}")]
    BadRoot(usize),

    /// Stored node bytes could not be decoded.
    #[error("malformed merkle node: {0}")]
    Codec(CodecError),

    /// A commit wrote content that was already present while duplicate
    /// reporting is enabled.
    #[error("merkle node {0} was already present in storage")]
    DuplicatePut(Digest),

    /// A proof was requested along a path carrying uncommitted updates.
    #[error("the requested path has uncommitted updates")]
    Uncommitted,

    /// The storage adapter failed.
    #[error("storage failure: {0}")]
    Storage(anyhow::Error),
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Storage(err)
    }
}
