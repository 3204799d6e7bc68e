//! Hash-path proofs against the tree root.
//!
//! The tree is an authenticated structure: the digest of every traversed index
//! entry, followed by the digest of the leaf payload, authenticates a value
//! against the root. Verification re-derives each link of the chain from the
//! stored node bytes, so a proof holds only if every node on the path hashes
//! to its claimed digest and references the next one.

use alloc::vec::Vec;
use core::fmt;

use crate::codec::{decode_index, CodecError};
use crate::digest::Digest;

/// An ordered path of digests from the root down to a leaf payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashPathProof {
    path: Vec<Digest>,
}

/// Errors in hash-path proof verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProofError {
    /// The proof contains no digests.
    Empty,
    /// The first digest of the proof is not the expected root.
    RootMismatch,
    /// No stored bytes were available for the digest at this position.
    MissingNode(usize),
    /// Stored bytes did not hash to the digest at this position.
    NodeHashMismatch(usize),
    /// Bytes at this position did not decode as an index entry.
    Malformed(CodecError),
    /// The entry at this position does not reference the next digest.
    UnlinkedStep(usize),
}

impl fmt::Display for ProofError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProofError::Empty => write!(f, "proof is empty"),
            ProofError::RootMismatch => write!(f, "proof does not start at the root"),
            ProofError::MissingNode(i) => write!(f, "no stored bytes for proof step {}", i),
            ProofError::NodeHashMismatch(i) => {
                write!(f, "stored bytes do not match digest at proof step {}", i)
            }
            ProofError::Malformed(e) => write!(f, "malformed node in proof: {}", e),
            ProofError::UnlinkedStep(i) => {
                write!(f, "entry at proof step {} does not reference the next step", i)
            }
        }
    }
}

impl HashPathProof {
    /// Assemble a proof from a root-first digest path.
    pub fn new(path: Vec<Digest>) -> Self {
        HashPathProof { path }
    }

    /// The digests of the path, root first, leaf payload last.
    pub fn path(&self) -> &[Digest] {
        &self.path
    }

    /// The root digest the proof claims to start at.
    pub fn root(&self) -> Option<&Digest> {
        self.path.first()
    }

    /// The digest of the proven leaf payload.
    pub fn leaf(&self) -> Option<&Digest> {
        self.path.last()
    }

    /// The number of digests in the path.
    pub fn len(&self) -> usize {
        self.path.len()
    }

    /// Whether the proof holds no digests.
    pub fn is_empty(&self) -> bool {
        self.path.is_empty()
    }

    /// Verify this proof against `root`, resolving digests to stored node
    /// bytes through `fetch`.
    ///
    /// Every digest but the last must resolve to bytes that hash back to it
    /// and decode as an index entry referencing the next digest among its
    /// child hashes; the final digest must match the fetched payload bytes.
    pub fn verify<F>(&self, root: &Digest, mut fetch: F) -> Result<(), ProofError>
    where
        F: FnMut(&Digest) -> Option<Vec<u8>>,
    {
        if self.path.is_empty() {
            return Err(ProofError::Empty);
        }
        if self.path[0] != *root {
            return Err(ProofError::RootMismatch);
        }
        for (i, pair) in self.path.windows(2).enumerate() {
            let bytes = fetch(&pair[0]).ok_or(ProofError::MissingNode(i))?;
            if !pair[0].verify(&bytes) {
                return Err(ProofError::NodeHashMismatch(i));
            }
            let entry = decode_index(&bytes).map_err(ProofError::Malformed)?;
            if !entry.child_hashes.iter().flatten().any(|h| *h == pair[1]) {
                return Err(ProofError::UnlinkedStep(i));
            }
        }
        let last = self.path.len() - 1;
        let payload = fetch(&self.path[last]).ok_or(ProofError::MissingNode(last))?;
        if !self.path[last].verify(&payload) {
            return Err(ProofError::NodeHashMismatch(last));
        }
        Ok(())
    }
}
