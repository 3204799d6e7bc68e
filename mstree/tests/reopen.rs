mod common;

use common::{build_committed, get_str, open_tree, set_str, PREFIX};
use mstree::{
    Digest, Error, HashAlgorithm, KvStore, MemoryStore, MerkleSortTree, TreeOptions,
};

#[test]
fn reopen_and_read() {
    let store = MemoryStore::new();
    let (_, root) = build_committed(&store, &[(0, b"a"), (63, b"b")]);

    let reads_before_open = store.read_count();
    let tree = open_tree(root, &store);
    // Opening loads exactly the root.
    assert_eq!(store.read_count(), reads_before_open + 1);

    assert_eq!(get_str(&tree, 63).as_deref(), Some("b"));
    // One path node, one leaf node, one payload: nothing off the lookup path
    // is touched.
    assert_eq!(store.read_count(), reads_before_open + 4);

    assert_eq!(tree.count(), 2);
    assert_eq!(tree.root_hash(), Some(root));
}

#[test]
fn open_missing_root_fails() {
    let store = MemoryStore::new();
    let absent = HashAlgorithm::Blake3.hash(b"nothing stored under this");
    let result = MerkleSortTree::open(absent, TreeOptions::new(), PREFIX, store);
    assert!(matches!(result, Err(Error::NotFound(_))));
}

#[test]
fn open_a_payload_as_root_fails() {
    let store = MemoryStore::new();
    let (_, _) = build_committed(&store, &[(0, b"a")]);

    // The payload blob is stored content, but it does not decode as a node.
    let payload = HashAlgorithm::Blake3.hash(b"a");
    let result = MerkleSortTree::open(payload, TreeOptions::new(), PREFIX, store);
    assert!(matches!(result, Err(Error::Codec(_))));
}

#[test]
fn opening_a_subtree_and_growing_it() {
    let store = MemoryStore::new();
    let (tree, _) = build_committed(&store, &[(0, b"a"), (63, b"b")]);

    // The first digest after the root in a proof is the subtree both ids
    // share.
    let proof = tree.get_proof(0).unwrap().unwrap();
    let subtree_hash = proof.path()[1];

    let mut subtree = open_tree(subtree_hash, &store);
    assert_eq!(subtree.count(), 2);
    assert_eq!(get_str(&subtree, 0).as_deref(), Some("a"));
    assert_eq!(get_str(&subtree, 63).as_deref(), Some("b"));

    // An id outside the subtree's range grows a new root above it.
    set_str(&mut subtree, 100, "c");
    subtree.commit().unwrap();
    assert_eq!(subtree.count(), 3);
    assert_eq!(get_str(&subtree, 0).as_deref(), Some("a"));
    assert_eq!(get_str(&subtree, 100).as_deref(), Some("c"));
}

/// Serves reads through an inner store, flipping one byte of the entry under
/// a chosen key to exercise corruption handling.
struct FlippingStore {
    inner: MemoryStore,
    target: Vec<u8>,
}

impl KvStore for FlippingStore {
    fn get(&self, key: &[u8]) -> anyhow::Result<Option<Vec<u8>>> {
        let mut value = self.inner.get(key)?;
        if key == &self.target[..] {
            if let Some(bytes) = value.as_mut() {
                if let Some(last) = bytes.last_mut() {
                    *last ^= 0x01;
                }
            }
        }
        Ok(value)
    }

    fn put_if_absent(&self, key: &[u8], value: &[u8]) -> anyhow::Result<bool> {
        self.inner.put_if_absent(key, value)
    }
}

fn stored_key(digest: &Digest) -> Vec<u8> {
    let mut key = PREFIX.to_vec();
    key.extend_from_slice(&digest.encode());
    key
}

#[test]
fn corrupted_payload_is_detected_when_verification_is_on() {
    let store = MemoryStore::new();
    let (_, root) = build_committed(&store, &[(0, b"a"), (63, b"b")]);

    let corrupted = FlippingStore {
        inner: store.clone(),
        target: stored_key(&HashAlgorithm::Blake3.hash(b"a")),
    };
    let mut options = TreeOptions::new();
    options.verify_on_load(true);
    let tree = MerkleSortTree::open(root, options, PREFIX, corrupted).unwrap();

    assert!(matches!(tree.get(0), Err(Error::HashMismatch(_))));
    // Other paths are untouched.
    assert_eq!(tree.get(63).unwrap().as_deref(), Some(&b"b"[..]));
}

#[test]
fn corrupted_payload_passes_through_when_verification_is_off() {
    let store = MemoryStore::new();
    let (_, root) = build_committed(&store, &[(0, b"a")]);

    let corrupted = FlippingStore {
        inner: store.clone(),
        target: stored_key(&HashAlgorithm::Blake3.hash(b"a")),
    };
    let tree = MerkleSortTree::open(root, TreeOptions::new(), PREFIX, corrupted).unwrap();

    // Without verification the corrupted bytes surface as-is; the call must
    // still complete.
    let value = tree.get(0).unwrap().unwrap();
    assert_ne!(value, b"a".to_vec());
}
