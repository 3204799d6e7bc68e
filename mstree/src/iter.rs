//! The skipping, lazily-expanding in-order iterator.
//!
//! The iterator snapshots the `(offset, step, child_counts, child_hashes)` of
//! the committed root at creation, so later updates to the tree are never
//! observed. Subtrees load on first visit: the walk keeps one lazily built
//! child iterator per level and uses the per-slot counts to jump over empty
//! or skipped ranges without materializing them.

use mstree_core::digest::Digest;
use mstree_core::index::IndexEntry;

use crate::error::Error;
use crate::store::KvStore;
use crate::tree::MerkleSortTree;

/// One populated entry of the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueEntry {
    /// The id of the entry.
    pub id: i64,
    /// The payload bytes.
    pub value: Vec<u8>,
}

/// An in-order iterator over the populated ids of a tree, in ascending id
/// order.
///
/// Items are `Result`s because the walk performs storage reads. Beyond
/// [`Iterator::next`], [`skip_n`](Self::skip_n) advances past entries using
/// the per-slot counts alone, without loading the skipped subtrees.
pub struct TreeIterator<'a, S> {
    tree: &'a MerkleSortTree<S>,
    offset: i64,
    step: i64,
    child_counts: Vec<i64>,
    child_hashes: Vec<Option<Digest>>,
    total_count: i64,
    child_index: usize,
    /// Position of the last yielded entry; -1 before the first.
    cursor: i64,
    child_iter: Option<ChildIter<'a, S>>,
}

enum ChildIter<'a, S> {
    Path(Box<TreeIterator<'a, S>>),
    /// A single payload at the leaf layer; `None` once consumed.
    Value(Option<ValueEntry>),
}

impl<'a, S: KvStore> TreeIterator<'a, S> {
    pub(crate) fn new(tree: &'a MerkleSortTree<S>, entry: IndexEntry) -> Self {
        let total_count = entry.total_count();
        TreeIterator {
            tree,
            offset: entry.offset,
            step: entry.step,
            child_counts: entry.child_counts,
            child_hashes: entry.child_hashes,
            total_count,
            child_index: 0,
            cursor: -1,
            child_iter: None,
        }
    }

    /// The number of entries this iterator yields in total, fixed at
    /// creation.
    pub fn total_count(&self) -> i64 {
        self.total_count
    }

    /// The position of the last yielded entry, or -1 before the first.
    pub fn cursor(&self) -> i64 {
        self.cursor
    }

    /// Whether another entry remains.
    pub fn has_next(&self) -> bool {
        self.cursor + 1 < self.total_count
    }

    /// Advance past `count` entries without yielding them, jumping over whole
    /// subtrees using the per-slot counts. Returns the number actually
    /// skipped, which is less than `count` only at the end of the walk.
    pub fn skip_n(&mut self, count: u64) -> Result<u64, Error> {
        if count == 0 {
            return Ok(0);
        }
        let count = i64::try_from(count).unwrap_or(i64::MAX);
        if self.child_index >= self.degree() {
            return Ok(0);
        }

        let passed: i64 = self.child_counts[..=self.child_index].iter().sum();
        let left_in_child = passed - self.cursor - 1;
        let skipped;
        if count < left_in_child {
            // The whole skip lands inside the current child.
            if self.child_iter.is_none() {
                self.child_iter = Some(self.make_child_iter(self.child_index)?);
            }
            let inner = self
                .child_iter
                .as_mut()
                .expect("child iterator was just installed")
                .skip_n(count as u64)?;
            debug_assert_eq!(inner, count as u64);
            skipped = count;
        } else {
            // Pass the rest of the current child, then whole slots while they
            // fit, then descend into the slot the skip ends in.
            self.child_iter = None;
            let mut passed_now = left_in_child;
            self.child_index += 1;
            while self.child_index < self.degree()
                && passed_now + self.child_counts[self.child_index] <= count
            {
                passed_now += self.child_counts[self.child_index];
                self.child_index += 1;
            }
            if self.child_index < self.degree() {
                let remainder = count - passed_now;
                let mut child = self.make_child_iter(self.child_index)?;
                let inner = child.skip_n(remainder as u64)?;
                debug_assert_eq!(inner, remainder as u64);
                self.child_iter = Some(child);
                passed_now = count;
            }
            skipped = passed_now;
        }
        self.cursor += skipped;
        Ok(skipped as u64)
    }

    fn degree(&self) -> usize {
        self.child_counts.len()
    }

    fn make_child_iter(&self, idx: usize) -> Result<ChildIter<'a, S>, Error> {
        let hash = self.child_hashes[idx]
            .as_ref()
            .expect("a slot with a non-zero count carries a hash");
        if self.step > 1 {
            let entry = self.tree.load_index_entry(hash)?;
            Ok(ChildIter::Path(Box::new(TreeIterator::new(
                self.tree, entry,
            ))))
        } else {
            let value = self.tree.load_node_bytes(hash)?;
            Ok(ChildIter::Value(Some(ValueEntry {
                id: self.offset + idx as i64,
                value,
            })))
        }
    }

    fn next_entry(&mut self) -> Option<Result<ValueEntry, Error>> {
        if !self.has_next() {
            return None;
        }

        // Move to the slot holding the next position, skipping empty ones.
        let mut passed: i64 = self.child_counts[..=self.child_index].iter().sum();
        while self.cursor + 1 >= passed && self.child_index < self.degree() - 1 {
            self.child_index += 1;
            self.child_iter = None;
            passed += self.child_counts[self.child_index];
        }

        if self.child_iter.is_none() {
            match self.make_child_iter(self.child_index) {
                Ok(child) => self.child_iter = Some(child),
                Err(err) => return Some(Err(err)),
            }
        }
        self.cursor += 1;
        self.child_iter
            .as_mut()
            .expect("child iterator was just installed")
            .next()
    }
}

impl<'a, S: KvStore> ChildIter<'a, S> {
    fn next(&mut self) -> Option<Result<ValueEntry, Error>> {
        match self {
            ChildIter::Path(iter) => iter.next_entry(),
            ChildIter::Value(value) => value.take().map(Ok),
        }
    }

    fn skip_n(&mut self, count: u64) -> Result<u64, Error> {
        match self {
            ChildIter::Path(iter) => iter.skip_n(count),
            ChildIter::Value(value) => {
                if count > 0 && value.is_some() {
                    *value = None;
                    Ok(1)
                } else {
                    Ok(0)
                }
            }
        }
    }
}

impl<'a, S: KvStore> Iterator for TreeIterator<'a, S> {
    type Item = Result<ValueEntry, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_entry()
    }
}
