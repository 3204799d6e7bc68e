#![allow(dead_code)]

use std::collections::BTreeSet;

use mstree::{Digest, MemoryStore, MerkleSortTree, TreeDegree, TreeOptions};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_pcg::Lcg64Xsh32;

pub const PREFIX: &[u8] = b"mst/";

pub fn new_tree(store: &MemoryStore) -> MerkleSortTree<MemoryStore> {
    MerkleSortTree::new(TreeOptions::new(), PREFIX, store.clone())
}

pub fn new_tree_with(options: TreeOptions, store: &MemoryStore) -> MerkleSortTree<MemoryStore> {
    MerkleSortTree::new(options, PREFIX, store.clone())
}

pub fn open_tree(root: Digest, store: &MemoryStore) -> MerkleSortTree<MemoryStore> {
    MerkleSortTree::open(root, TreeOptions::new(), PREFIX, store.clone()).unwrap()
}

pub fn set_str(tree: &mut MerkleSortTree<MemoryStore>, id: i64, value: &str) {
    tree.set(id, value.as_bytes().to_vec()).unwrap();
}

pub fn get_str(tree: &MerkleSortTree<MemoryStore>, id: i64) -> Option<String> {
    tree.get(id)
        .unwrap()
        .map(|bytes| String::from_utf8(bytes).unwrap())
}

/// Build a tree over `pairs` and commit it.
pub fn build_committed(
    store: &MemoryStore,
    pairs: &[(i64, &[u8])],
) -> (MerkleSortTree<MemoryStore>, Digest) {
    let mut tree = new_tree(store);
    for (id, value) in pairs {
        tree.set(*id, value.to_vec()).unwrap();
    }
    let root = tree.commit().unwrap();
    (tree, root)
}

/// A deterministic value derived from an id.
pub fn value_for(id: i64) -> Vec<u8> {
    format!("value-{}", id).into_bytes()
}

/// Seeded generator, so randomized scenarios are reproducible.
pub fn rng(seed: u64) -> Lcg64Xsh32 {
    let mut s = [0u8; 16];
    s[0..8].copy_from_slice(&seed.to_le_bytes());
    Lcg64Xsh32::from_seed(s)
}

/// `n` distinct ids drawn from the whole id space.
pub fn unique_ids(seed: u64, n: usize) -> Vec<i64> {
    let max = TreeDegree::default().max_count();
    let mut r = rng(seed);
    let mut ids = BTreeSet::new();
    while ids.len() < n {
        ids.insert(r.gen_range(0..max));
    }
    ids.into_iter().collect()
}

pub fn shuffled(ids: &[i64], seed: u64) -> Vec<i64> {
    let mut out = ids.to_vec();
    out.shuffle(&mut rng(seed));
    out
}
