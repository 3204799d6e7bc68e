//! The index entry record and the id-addressing rules of the tree.
//!
//! The tree's shape is a pure function of the ids it holds. Every subtree
//! covers the aligned id range `[offset, offset + step * degree)`, split into
//! `degree` slots of `step` ids each. An id belongs to exactly one slot at
//! every level, so addressing never consults the data itself.

use alloc::vec;
use alloc::vec::Vec;

use crate::digest::Digest;

/// Branching-factor presets. Each preset fixes the depth of the tree so that
/// the id space is `degree ^ depth = 2^60`, comfortably inside the positive
/// range of a 64-bit signed integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeDegree {
    /// 4 children per node, 30 levels.
    D4,
    /// 8 children per node, 20 levels.
    D8,
    /// 16 children per node, 15 levels.
    D16,
}

impl TreeDegree {
    /// The number of child slots in every node.
    pub const fn degree(self) -> usize {
        match self {
            TreeDegree::D4 => 4,
            TreeDegree::D8 => 8,
            TreeDegree::D16 => 16,
        }
    }

    /// The number of levels from the root down to the leaf layer.
    pub const fn max_depth(self) -> u32 {
        match self {
            TreeDegree::D4 => 30,
            TreeDegree::D8 => 20,
            TreeDegree::D16 => 15,
        }
    }

    /// The exclusive upper bound of the id space: `degree ^ max_depth`.
    pub const fn max_count(self) -> i64 {
        // All presets resolve to 4^30 == 8^20 == 16^15 == 2^60.
        1i64 << 60
    }

    /// The step of a full-range root node: `max_count / degree`.
    pub const fn root_step(self) -> i64 {
        self.max_count() / self.degree() as i64
    }

    /// Look a preset up by its branching factor.
    pub fn of_degree(degree: usize) -> Option<Self> {
        match degree {
            4 => Some(TreeDegree::D4),
            8 => Some(TreeDegree::D8),
            16 => Some(TreeDegree::D16),
            _ => None,
        }
    }
}

impl Default for TreeDegree {
    fn default() -> Self {
        TreeDegree::D4
    }
}

/// The persisted form of every node above the payload layer.
///
/// `offset` and `step` describe the id range the node covers; the two arrays
/// hold, per slot, the number of populated ids below it and the digest of the
/// child (payload bytes at `step == 1`, another index entry otherwise). An
/// empty slot has count 0 and no digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// The smallest id coverable under this subtree.
    pub offset: i64,
    /// The id span of each child slot.
    pub step: i64,
    /// Populated-id counts per slot.
    pub child_counts: Vec<i64>,
    /// Child digests per slot.
    pub child_hashes: Vec<Option<Digest>>,
}

impl IndexEntry {
    /// An entry with all slots empty.
    pub fn empty(offset: i64, step: i64, degree: usize) -> Self {
        IndexEntry {
            offset,
            step,
            child_counts: vec![0; degree],
            child_hashes: vec![None; degree],
        }
    }

    /// The branching factor, implied by the slot-array length.
    pub fn degree(&self) -> usize {
        self.child_hashes.len()
    }

    /// One past the largest id coverable under this subtree.
    pub fn end_offset(&self) -> i64 {
        self.offset + self.step * self.degree() as i64
    }

    /// Whether `id` falls inside the range this entry covers.
    pub fn contains(&self, id: i64) -> bool {
        id >= self.offset && id < self.end_offset()
    }

    /// The slot holding `id`, or `None` when `id` is outside this entry.
    pub fn slot_of(&self, id: i64) -> Option<usize> {
        slot_in(id, self.offset, self.step, self.degree())
    }

    /// Total number of populated ids below this entry.
    pub fn total_count(&self) -> i64 {
        self.child_counts.iter().sum()
    }
}

/// The slot index of `id` within the span starting at `offset` with the given
/// slot width `step`, or `None` when `id` lies outside the span.
pub fn slot_in(id: i64, offset: i64, step: i64, degree: usize) -> Option<usize> {
    if id < offset || id >= offset + step * degree as i64 {
        return None;
    }
    Some(((id - offset) / step) as usize)
}

/// The offset of the subtree covering `id` at slot width `step`: the largest
/// multiple of `step * degree` not exceeding `id`.
pub fn aligned_offset(id: i64, step: i64, degree: usize) -> i64 {
    let span = step * degree as i64;
    id - id % span
}

/// The lowest common ancestor span of `a` and `b`: the smallest step not below
/// `start_step` at which both ids fall inside the same aligned subtree.
/// Returns the `(offset, step)` of that subtree.
///
/// Both ids must lie inside the id space of the tree, which guarantees
/// termination before the step overflows it.
pub fn common_subtree(a: i64, b: i64, start_step: i64, degree: usize) -> (i64, i64) {
    let mut step = start_step;
    let mut offset_a = aligned_offset(a, step, degree);
    let mut offset_b = aligned_offset(b, step, degree);
    while offset_a != offset_b {
        step *= degree as i64;
        offset_a = aligned_offset(a, step, degree);
        offset_b = aligned_offset(b, step, degree);
    }
    (offset_a, step)
}
