mod common;

use common::{build_committed, new_tree, set_str, unique_ids, value_for};
use mstree::{MemoryStore, ValueEntry};

fn drain(iter: mstree::TreeIterator<'_, MemoryStore>) -> Vec<(i64, Vec<u8>)> {
    iter.map(|entry| entry.unwrap())
        .map(|ValueEntry { id, value }| (id, value))
        .collect()
}

#[test]
fn visits_every_entry_in_ascending_order() {
    let ids = unique_ids(41, 150);
    let store = MemoryStore::new();
    let mut tree = new_tree(&store);
    for id in &ids {
        tree.set(*id, value_for(*id)).unwrap();
    }
    tree.commit().unwrap();

    let iter = tree.iter();
    assert_eq!(iter.total_count(), ids.len() as i64);

    let entries = drain(iter);
    let expected: Vec<_> = ids.iter().map(|id| (*id, value_for(*id))).collect();
    // `unique_ids` returns ids in ascending order already.
    assert_eq!(entries, expected);
}

#[test]
fn skip_matches_stepping() {
    let ids = unique_ids(43, 60);
    let store = MemoryStore::new();
    let mut tree = new_tree(&store);
    for id in &ids {
        tree.set(*id, value_for(*id)).unwrap();
    }
    tree.commit().unwrap();

    let full = drain(tree.iter());
    let n = full.len() as u64;

    for k in [0u64, 1, 3, 17, n - 1, n, n + 9] {
        let mut iter = tree.iter();
        let skipped = iter.skip_n(k).unwrap();
        assert_eq!(skipped, k.min(n), "skip({}) over {} entries", k, n);
        let rest = drain(iter);
        assert_eq!(rest, full[skipped as usize..], "tail after skip({})", k);
    }
}

#[test]
fn skip_beyond_the_end_is_partial() {
    let store = MemoryStore::new();
    let (tree, _) = build_committed(&store, &[(1, b"a"), (500, b"b"), (70_000, b"c")]);

    let mut iter = tree.iter();
    assert_eq!(iter.skip_n(10).unwrap(), 3);
    assert!(!iter.has_next());
    assert!(iter.next().is_none());
    assert_eq!(iter.skip_n(1).unwrap(), 0);
}

#[test]
fn skip_lands_inside_a_far_subtree() {
    // Two tight clusters far apart; a skip across the first must jump its
    // whole subtree and land mid-second-cluster.
    let store = MemoryStore::new();
    let mut tree = new_tree(&store);
    for id in 0..4i64 {
        tree.set(id, value_for(id)).unwrap();
    }
    for id in 1_000_000..1_000_006i64 {
        tree.set(id, value_for(id)).unwrap();
    }
    tree.commit().unwrap();

    let mut iter = tree.iter();
    assert_eq!(iter.skip_n(6).unwrap(), 6);
    let rest = drain(iter);
    let expected: Vec<_> = (1_000_002..1_000_006i64)
        .map(|id| (id, value_for(id)))
        .collect();
    assert_eq!(rest, expected);
}

#[test]
fn staged_updates_are_not_observed() {
    let store = MemoryStore::new();
    let (mut tree, _) = build_committed(&store, &[(0, b"a"), (63, b"b")]);

    set_str(&mut tree, 5, "staged");
    let entries = drain(tree.iter());
    assert_eq!(
        entries,
        vec![(0, b"a".to_vec()), (63, b"b".to_vec())],
        "an iterator walks the last committed state"
    );
}

#[test]
fn an_empty_tree_iterates_nothing() {
    let store = MemoryStore::new();
    let tree = new_tree(&store);
    let mut iter = tree.iter();
    assert_eq!(iter.total_count(), 0);
    assert!(!iter.has_next());
    assert_eq!(iter.skip_n(4).unwrap(), 0);
    assert!(iter.next().is_none());
}
