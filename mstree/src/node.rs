//! In-memory staging nodes of the tree.
//!
//! Nodes reachable from the root are either clean (loaded from storage,
//! carrying the hash they were stored under) or dirty (created or modified
//! since the last commit, observable hash `None`). Child slots resolve
//! lazily: a slot may carry a hash without a loaded child. Each node keeps a
//! snapshot of its child hashes and counts as of its last persisted state so
//! that staged updates can be rolled back without touching storage.

use mstree_core::digest::Digest;
use mstree_core::index::{slot_in, IndexEntry};

use crate::error::Error;

/// A child slot resolved into memory.
pub(crate) enum Child {
    /// A subtree below this node (`step > 1`).
    Index(Box<TreeNode>),
    /// A payload at the leaf layer (`step == 1`).
    Value(Vec<u8>),
}

pub(crate) struct TreeNode {
    pub(crate) offset: i64,
    pub(crate) step: i64,
    /// Hash of the last persisted state of this node, retained while dirty so
    /// cancel can restore it. `None` for nodes that were never committed.
    stored_hash: Option<Digest>,
    pub(crate) child_counts: Vec<i64>,
    pub(crate) child_hashes: Vec<Option<Digest>>,
    orig_child_hashes: Vec<Option<Digest>>,
    orig_child_counts: Vec<i64>,
    pub(crate) children: Vec<Option<Child>>,
    modified: bool,
}

impl TreeNode {
    /// A fresh path node with all slots empty.
    pub(crate) fn new_path(offset: i64, step: i64, degree: usize) -> Self {
        debug_assert!(step > 1);
        Self::empty(offset, step, degree)
    }

    /// A fresh leaf-layer node covering `[offset, offset + degree)`.
    pub(crate) fn new_leaf(offset: i64, degree: usize) -> Self {
        Self::empty(offset, 1, degree)
    }

    fn empty(offset: i64, step: i64, degree: usize) -> Self {
        TreeNode {
            offset,
            step,
            stored_hash: None,
            child_counts: vec![0; degree],
            child_hashes: vec![None; degree],
            orig_child_hashes: vec![None; degree],
            orig_child_counts: vec![0; degree],
            children: (0..degree).map(|_| None).collect(),
            modified: true,
        }
    }

    /// A node materialized from a stored entry. With `hash` present the node
    /// starts clean; without it, dirty.
    pub(crate) fn from_entry(hash: Option<Digest>, entry: IndexEntry) -> Self {
        let degree = entry.degree();
        TreeNode {
            offset: entry.offset,
            step: entry.step,
            modified: hash.is_none(),
            stored_hash: hash,
            orig_child_hashes: entry.child_hashes.clone(),
            orig_child_counts: entry.child_counts.clone(),
            child_hashes: entry.child_hashes,
            child_counts: entry.child_counts,
            children: (0..degree).map(|_| None).collect(),
        }
    }

    pub(crate) fn to_entry(&self) -> IndexEntry {
        IndexEntry {
            offset: self.offset,
            step: self.step,
            child_counts: self.child_counts.clone(),
            child_hashes: self.child_hashes.clone(),
        }
    }

    pub(crate) fn degree(&self) -> usize {
        self.child_hashes.len()
    }

    pub(crate) fn end_offset(&self) -> i64 {
        self.offset + self.step * self.degree() as i64
    }

    pub(crate) fn contains(&self, id: i64) -> bool {
        id >= self.offset && id < self.end_offset()
    }

    pub(crate) fn slot_of(&self, id: i64) -> Option<usize> {
        slot_in(id, self.offset, self.step, self.degree())
    }

    pub(crate) fn is_leaf_layer(&self) -> bool {
        self.step == 1
    }

    pub(crate) fn is_modified(&self) -> bool {
        self.modified
    }

    /// The observable hash of this node: `None` while dirty.
    pub(crate) fn node_hash(&self) -> Option<&Digest> {
        if self.modified {
            None
        } else {
            self.stored_hash.as_ref()
        }
    }

    pub(crate) fn stored_hash(&self) -> Option<&Digest> {
        self.stored_hash.as_ref()
    }

    pub(crate) fn count(&self) -> i64 {
        self.child_counts.iter().sum()
    }

    /// Whether the slot holds anything: a staged child or a persisted hash.
    pub(crate) fn slot_populated(&self, idx: usize) -> bool {
        self.child_hashes[idx].is_some() || self.children[idx].is_some()
    }

    /// Stage a payload into a leaf-layer slot. The slot hash is cleared and
    /// recomputed at commit.
    pub(crate) fn set_value_child(&mut self, idx: usize, value: Vec<u8>) {
        debug_assert!(self.is_leaf_layer());
        self.child_hashes[idx] = None;
        self.children[idx] = Some(Child::Value(value));
        self.modified = true;
    }

    /// Install a subtree into a path-layer slot. `hash` is the digest the
    /// child is known under, or `None` for a dirty child whose hash is
    /// computed at commit. The child must sit strictly below this node and
    /// inside its range.
    pub(crate) fn set_index_child(
        &mut self,
        idx: usize,
        hash: Option<Digest>,
        child: TreeNode,
    ) -> Result<(), Error> {
        if child.step >= self.step || child.offset < self.offset || child.offset >= self.end_offset()
        {
            return Err(Error::BadChild {
                offset: child.offset,
                step: child.step,
            });
        }
        self.child_hashes[idx] = hash;
        self.children[idx] = Some(Child::Index(Box::new(child)));
        self.modified = true;
        Ok(())
    }

    /// Clear a slot's hash after an in-place modification of the child under
    /// it; the hash is recomputed at commit.
    pub(crate) fn touch_slot(&mut self, idx: usize) {
        self.child_hashes[idx] = None;
        self.modified = true;
    }

    /// Record that this node was persisted under `hash`.
    pub(crate) fn mark_committed(&mut self, hash: Digest) {
        self.orig_child_hashes.clone_from(&self.child_hashes);
        self.orig_child_counts.clone_from(&self.child_counts);
        self.stored_hash = Some(hash);
        self.modified = false;
    }

    /// Discard staged updates: every slot whose hash no longer matches the
    /// snapshot of the last persisted state drops its cached child and gets
    /// its hash and count restored. A node that was committed before returns
    /// to clean; a never-committed node keeps only the persisted slots it was
    /// created with (its owner is expected to discard it).
    pub(crate) fn cancel(&mut self) {
        for i in 0..self.degree() {
            let unchanged =
                self.child_hashes[i].is_some() && self.child_hashes[i] == self.orig_child_hashes[i];
            if !unchanged {
                self.children[i] = None;
            }
            self.child_hashes[i] = self.orig_child_hashes[i];
            self.child_counts[i] = self.orig_child_counts[i];
        }
        if self.stored_hash.is_some() {
            self.modified = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mstree_core::digest::HashAlgorithm;

    #[test]
    fn set_index_child_rejects_out_of_range_children() {
        let mut parent = TreeNode::new_path(0, 16, 4);
        // Same step as the parent.
        let sibling = TreeNode::new_path(64, 16, 4);
        assert!(matches!(
            parent.set_index_child(0, None, sibling),
            Err(Error::BadChild { .. })
        ));
        // Outside the parent's range.
        let outside = TreeNode::new_leaf(64, 4);
        assert!(matches!(
            parent.set_index_child(0, None, outside),
            Err(Error::BadChild { .. })
        ));
        // Inside and below: accepted.
        let inside = TreeNode::new_leaf(16, 4);
        assert!(parent.set_index_child(1, None, inside).is_ok());
        assert!(parent.is_modified());
    }

    #[test]
    fn cancel_restores_the_persisted_slots() {
        let digest = HashAlgorithm::Blake3.hash(b"persisted");
        let mut entry = IndexEntry::empty(0, 1, 4);
        entry.child_counts[1] = 1;
        entry.child_hashes[1] = Some(digest);

        let mut node = TreeNode::from_entry(Some(HashAlgorithm::Blake3.hash(b"node")), entry);
        assert!(!node.is_modified());

        node.set_value_child(2, b"staged".to_vec());
        assert!(node.is_modified());
        assert!(node.node_hash().is_none());

        node.cancel();
        assert!(!node.is_modified());
        assert_eq!(node.child_hashes[1], Some(digest));
        assert_eq!(node.child_hashes[2], None);
        assert!(node.children[2].is_none());
        assert_eq!(node.count(), 1);
    }

    #[test]
    fn cancel_drops_a_dirty_child_staged_over_an_empty_slot() {
        let mut node = TreeNode::new_path(0, 4, 4);
        let mut leaf = TreeNode::new_leaf(0, 4);
        leaf.set_value_child(0, b"v".to_vec());
        node.set_index_child(0, None, leaf).unwrap();

        node.cancel();
        assert!(node.children[0].is_none());
        assert_eq!(node.child_hashes[0], None);
    }
}
