//! Hash algorithms and the self-describing digest type.
//!
//! A digest carries the code of the algorithm that produced it, so stored
//! digests can always be re-verified without out-of-band context. All nodes
//! reachable from one root share the algorithm of the root's digest.

use core::fmt;

/// Length in bytes of the raw hash output. All supported algorithms produce
/// 256-bit digests.
pub const RAW_HASH_LEN: usize = 32;

/// Length in bytes of an encoded digest: a 2-byte algorithm code followed by
/// the raw hash.
pub const DIGEST_LEN: usize = 2 + RAW_HASH_LEN;

/// The hash algorithms understood by the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HashAlgorithm {
    /// SHA-256.
    Sha256,
    /// Blake3.
    Blake3,
}

impl HashAlgorithm {
    /// The wire code of this algorithm.
    pub const fn code(self) -> u16 {
        match self {
            HashAlgorithm::Sha256 => 0x0001,
            HashAlgorithm::Blake3 => 0x0002,
        }
    }

    /// Look an algorithm up by its wire code.
    pub fn from_code(code: u16) -> Result<Self, UnknownAlgorithm> {
        match code {
            0x0001 => Ok(HashAlgorithm::Sha256),
            0x0002 => Ok(HashAlgorithm::Blake3),
            other => Err(UnknownAlgorithm(other)),
        }
    }

    /// A short lowercase name, used in display output.
    pub const fn name(self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Blake3 => "blake3",
        }
    }

    /// Hash `bytes`, producing a digest tagged with this algorithm.
    pub fn hash(self, bytes: &[u8]) -> Digest {
        let raw = match self {
            HashAlgorithm::Sha256 => {
                use sha2::{Digest as _, Sha256};
                Sha256::digest(bytes).into()
            }
            HashAlgorithm::Blake3 => *blake3::hash(bytes).as_bytes(),
        };
        Digest {
            algorithm: self,
            raw,
        }
    }
}

/// A digest wire code that maps to no known algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownAlgorithm(pub u16);

impl fmt::Display for UnknownAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown hash algorithm code {:#06x}", self.0)
    }
}

/// Errors when decoding a digest from its wire form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestError {
    /// The input was not exactly [`DIGEST_LEN`] bytes.
    WrongLength(usize),
    /// The algorithm code was not recognized.
    UnknownAlgorithm(u16),
}

impl fmt::Display for DigestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DigestError::WrongLength(len) => {
                write!(f, "digest must be {} bytes, got {}", DIGEST_LEN, len)
            }
            DigestError::UnknownAlgorithm(code) => {
                write!(f, "{}", UnknownAlgorithm(*code))
            }
        }
    }
}

/// The hash of a persisted node: the algorithm that produced it plus the raw
/// 256-bit output.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Digest {
    algorithm: HashAlgorithm,
    raw: [u8; RAW_HASH_LEN],
}

impl Digest {
    /// Assemble a digest from its parts.
    pub const fn new(algorithm: HashAlgorithm, raw: [u8; RAW_HASH_LEN]) -> Self {
        Digest { algorithm, raw }
    }

    /// The algorithm that produced this digest.
    pub const fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// The raw hash output.
    pub const fn raw(&self) -> &[u8; RAW_HASH_LEN] {
        &self.raw
    }

    /// Encode as algorithm code followed by the raw hash.
    pub fn encode(&self) -> [u8; DIGEST_LEN] {
        let mut out = [0u8; DIGEST_LEN];
        out[0..2].copy_from_slice(&self.algorithm.code().to_be_bytes());
        out[2..].copy_from_slice(&self.raw);
        out
    }

    /// Decode a digest from its wire form.
    pub fn decode(bytes: &[u8]) -> Result<Self, DigestError> {
        if bytes.len() != DIGEST_LEN {
            return Err(DigestError::WrongLength(bytes.len()));
        }
        let code = u16::from_be_bytes([bytes[0], bytes[1]]);
        let algorithm =
            HashAlgorithm::from_code(code).map_err(|e| DigestError::UnknownAlgorithm(e.0))?;
        let mut raw = [0u8; RAW_HASH_LEN];
        raw.copy_from_slice(&bytes[2..]);
        Ok(Digest { algorithm, raw })
    }

    /// Re-hash `bytes` with this digest's own algorithm and compare.
    pub fn verify(&self, bytes: &[u8]) -> bool {
        self.algorithm.hash(bytes) == *self
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.algorithm.name())?;
        for byte in &self.raw {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_roundtrip() {
        for algorithm in [HashAlgorithm::Sha256, HashAlgorithm::Blake3] {
            let digest = algorithm.hash(b"hello");
            let decoded = Digest::decode(&digest.encode()).unwrap();
            assert_eq!(digest, decoded);
            assert_eq!(decoded.algorithm(), algorithm);
        }
    }

    #[test]
    fn verify_rejects_tampered_bytes() {
        let digest = HashAlgorithm::Blake3.hash(b"payload");
        assert!(digest.verify(b"payload"));
        assert!(!digest.verify(b"payloae"));
    }

    #[test]
    fn algorithms_do_not_collide() {
        let a = HashAlgorithm::Sha256.hash(b"x");
        let b = HashAlgorithm::Blake3.hash(b"x");
        assert_ne!(a, b);
        assert_ne!(a.encode(), b.encode());
    }

    #[test]
    fn decode_rejects_bad_input() {
        assert_eq!(
            Digest::decode(&[0u8; 7]),
            Err(DigestError::WrongLength(7))
        );
        let mut bytes = HashAlgorithm::Sha256.hash(b"x").encode();
        bytes[0] = 0xff;
        bytes[1] = 0xff;
        assert_eq!(
            Digest::decode(&bytes),
            Err(DigestError::UnknownAlgorithm(0xffff))
        );
    }
}
