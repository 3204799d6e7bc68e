mod common;

use std::collections::BTreeSet;

use common::{new_tree, shuffled, value_for};
use mstree::{MemoryStore, TreeDegree};
use quickcheck::{QuickCheck, TestResult};

fn ids_from(raw: &[u64]) -> Vec<i64> {
    let max = TreeDegree::default().max_count() as u64;
    let unique: BTreeSet<i64> = raw.iter().map(|x| (x % max) as i64).collect();
    unique.into_iter().collect()
}

#[test]
fn committed_entries_read_back() {
    fn prop(raw: Vec<u64>) -> TestResult {
        let ids = ids_from(&raw);
        let store = MemoryStore::new();
        let mut tree = new_tree(&store);
        for id in &ids {
            tree.set(*id, value_for(*id)).unwrap();
        }
        tree.commit().unwrap();

        if tree.count() != ids.len() as i64 {
            return TestResult::failed();
        }
        for id in &ids {
            if tree.get(*id).unwrap() != Some(value_for(*id)) {
                return TestResult::failed();
            }
        }
        TestResult::passed()
    }

    QuickCheck::new()
        .tests(50)
        .quickcheck(prop as fn(Vec<u64>) -> TestResult);
}

#[test]
fn root_is_independent_of_insertion_order() {
    fn prop(raw: Vec<u64>, seed: u64) -> TestResult {
        let ids = ids_from(&raw);
        if ids.len() < 2 {
            return TestResult::discard();
        }

        let mut ascending = new_tree(&MemoryStore::new());
        for id in &ids {
            ascending.set(*id, value_for(*id)).unwrap();
        }
        let mut scrambled = new_tree(&MemoryStore::new());
        for id in shuffled(&ids, seed) {
            scrambled.set(id, value_for(id)).unwrap();
        }

        TestResult::from_bool(ascending.commit().unwrap() == scrambled.commit().unwrap())
    }

    QuickCheck::new()
        .tests(50)
        .quickcheck(prop as fn(Vec<u64>, u64) -> TestResult);
}

#[test]
fn skipping_equals_stepping() {
    fn prop(raw: Vec<u64>, k: u8) -> TestResult {
        let ids = ids_from(&raw);
        let store = MemoryStore::new();
        let mut tree = new_tree(&store);
        for id in &ids {
            tree.set(*id, value_for(*id)).unwrap();
        }
        tree.commit().unwrap();

        let full: Vec<_> = tree.iter().map(|e| e.unwrap().id).collect();
        let k = k as u64;

        let mut iter = tree.iter();
        let skipped = iter.skip_n(k).unwrap();
        if skipped != k.min(full.len() as u64) {
            return TestResult::failed();
        }
        let tail: Vec<_> = iter.map(|e| e.unwrap().id).collect();
        TestResult::from_bool(tail == full[skipped as usize..])
    }

    QuickCheck::new()
        .tests(50)
        .quickcheck(prop as fn(Vec<u64>, u8) -> TestResult);
}
