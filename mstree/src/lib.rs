#![warn(missing_docs)]

//! A merkle sorted tree over a put-if-absent key-value store.
//!
//! The tree is an authenticated, persistent, sparse indexing structure: it
//! maps 64-bit non-negative ids to opaque byte values inside a fixed id space
//! and persists every node content-addressed in an external key-value store.
//! Its shape is a pure function of the populated ids, so two trees holding
//! the same entries always commit to the same root digest, regardless of
//! insertion order.
//!
//! Updates stage in memory and become durable only on
//! [`commit`](MerkleSortTree::commit); [`cancel`](MerkleSortTree::cancel)
//! rolls the tree back to its last committed state without touching storage.
//! Children load lazily on first access, every value can be authenticated
//! against the root with a [`HashPathProof`], and the
//! [iterator](MerkleSortTree::iter) walks populated ids in ascending order
//! while skipping over empty ranges.
//!
//! ```
//! use mstree::{MemoryStore, MerkleSortTree, TreeOptions};
//!
//! let store = MemoryStore::new();
//! let mut tree = MerkleSortTree::new(TreeOptions::new(), "example/", store.clone());
//! tree.set(8, b"a".to_vec())?;
//! tree.set(64001, b"b".to_vec())?;
//! let root = tree.commit()?;
//!
//! let reopened = MerkleSortTree::open(root, TreeOptions::new(), "example/", store)?;
//! assert_eq!(reopened.get(8)?.as_deref(), Some(&b"a"[..]));
//! assert_eq!(reopened.count(), 2);
//! # Ok::<(), mstree::Error>(())
//! ```

pub use mstree_core::codec;
pub use mstree_core::digest::{Digest, DigestError, HashAlgorithm};
pub use mstree_core::index::{IndexEntry, TreeDegree};
pub use mstree_core::proof::{HashPathProof, ProofError};

pub use error::Error;
pub use iter::{TreeIterator, ValueEntry};
pub use options::{TreeOptions, UpdateHook};
pub use store::{KvStore, MemoryStore};
pub use tree::MerkleSortTree;

mod error;
mod iter;
mod node;
mod options;
mod store;
mod tree;
