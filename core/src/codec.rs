//! The stable wire encoding of index entries.
//!
//! The encoding is canonical: fields in fixed order, slot arrays in slot order
//! including empty slots, integers big-endian and fixed-width. Hashing the
//! encoded bytes therefore yields the same digest for any two nodes with equal
//! contents. A leading schema code distinguishes index records from raw leaf
//! payloads, which are persisted verbatim.

use alloc::vec::Vec;
use core::fmt;

use crate::digest::{Digest, DigestError, DIGEST_LEN};
use crate::index::IndexEntry;

/// Schema code identifying an encoded index entry.
pub const INDEX_SCHEMA_CODE: u32 = 0x0921;

/// Errors while decoding stored node bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    /// The input ended before the structure was complete.
    UnexpectedEnd,
    /// The leading schema code did not identify an index entry.
    BadSchema(u32),
    /// The count and hash arrays declared different lengths.
    ArityMismatch {
        /// Declared length of the count array.
        counts: usize,
        /// Declared length of the hash array.
        hashes: usize,
    },
    /// A slot declared a digest of an impossible length.
    BadDigestLength(usize),
    /// A digest carried an unrecognized algorithm code.
    UnknownAlgorithm(u16),
    /// The fields decoded but violate a structural invariant of the tree.
    Invariant(&'static str),
    /// Well-formed input followed by extra bytes.
    Trailing(usize),
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::UnexpectedEnd => write!(f, "unexpected end of input"),
            CodecError::BadSchema(code) => write!(f, "unexpected schema code {:#010x}", code),
            CodecError::ArityMismatch { counts, hashes } => write!(
                f,
                "count array ({}) and hash array ({}) differ in length",
                counts, hashes
            ),
            CodecError::BadDigestLength(len) => {
                write!(f, "slot digest has impossible length {}", len)
            }
            CodecError::UnknownAlgorithm(code) => {
                write!(f, "unknown hash algorithm code {:#06x}", code)
            }
            CodecError::Invariant(what) => write!(f, "invariant violated: {}", what),
            CodecError::Trailing(n) => write!(f, "{} trailing bytes after entry", n),
        }
    }
}

/// Encode an index entry into its canonical byte form.
pub fn encode_index(entry: &IndexEntry) -> Vec<u8> {
    let mut out = Vec::with_capacity(
        4 + 8 + 8 + 4 + entry.child_counts.len() * 8 + 4 + entry.child_hashes.len() * (4 + DIGEST_LEN),
    );
    out.extend_from_slice(&INDEX_SCHEMA_CODE.to_be_bytes());
    out.extend_from_slice(&entry.offset.to_be_bytes());
    out.extend_from_slice(&entry.step.to_be_bytes());
    out.extend_from_slice(&(entry.child_counts.len() as u32).to_be_bytes());
    for count in &entry.child_counts {
        out.extend_from_slice(&count.to_be_bytes());
    }
    out.extend_from_slice(&(entry.child_hashes.len() as u32).to_be_bytes());
    for hash in &entry.child_hashes {
        match hash {
            Some(digest) => {
                out.extend_from_slice(&(DIGEST_LEN as u32).to_be_bytes());
                out.extend_from_slice(&digest.encode());
            }
            None => out.extend_from_slice(&0u32.to_be_bytes()),
        }
    }
    out
}

/// Decode an index entry, rejecting malformed input and entries that violate
/// the structural invariants every persisted node must satisfy.
pub fn decode_index(bytes: &[u8]) -> Result<IndexEntry, CodecError> {
    let mut reader = Reader { buf: bytes, pos: 0 };

    let schema = reader.read_u32()?;
    if schema != INDEX_SCHEMA_CODE {
        return Err(CodecError::BadSchema(schema));
    }
    let offset = reader.read_i64()?;
    let step = reader.read_i64()?;

    let count_len = reader.read_u32()? as usize;
    let mut child_counts = Vec::with_capacity(count_len);
    for _ in 0..count_len {
        child_counts.push(reader.read_i64()?);
    }

    let hash_len = reader.read_u32()? as usize;
    if hash_len != count_len {
        return Err(CodecError::ArityMismatch {
            counts: count_len,
            hashes: hash_len,
        });
    }
    let mut child_hashes = Vec::with_capacity(hash_len);
    for _ in 0..hash_len {
        let len = reader.read_u32()? as usize;
        if len == 0 {
            child_hashes.push(None);
            continue;
        }
        if len != DIGEST_LEN {
            return Err(CodecError::BadDigestLength(len));
        }
        let digest = Digest::decode(reader.take(len)?).map_err(|e| match e {
            DigestError::WrongLength(l) => CodecError::BadDigestLength(l),
            DigestError::UnknownAlgorithm(code) => CodecError::UnknownAlgorithm(code),
        })?;
        child_hashes.push(Some(digest));
    }

    if reader.pos != bytes.len() {
        return Err(CodecError::Trailing(bytes.len() - reader.pos));
    }

    let entry = IndexEntry {
        offset,
        step,
        child_counts,
        child_hashes,
    };
    check_invariants(&entry)?;
    Ok(entry)
}

fn check_invariants(entry: &IndexEntry) -> Result<(), CodecError> {
    if entry.step < 1 {
        return Err(CodecError::Invariant("step must be at least 1"));
    }
    if entry.offset < 0 {
        return Err(CodecError::Invariant("offset must be non-negative"));
    }
    let span = entry
        .step
        .checked_mul(entry.degree() as i64)
        .ok_or(CodecError::Invariant("subtree span overflows"))?;
    if entry.offset % span != 0 {
        return Err(CodecError::Invariant("offset not aligned to subtree span"));
    }
    for (count, hash) in entry.child_counts.iter().zip(&entry.child_hashes) {
        if *count < 0 {
            return Err(CodecError::Invariant("negative child count"));
        }
        if (*count == 0) != hash.is_none() {
            return Err(CodecError::Invariant(
                "child hash populated iff child count non-zero",
            ));
        }
    }
    Ok(())
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.pos + n > self.buf.len() {
            return Err(CodecError::UnexpectedEnd);
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_u32(&mut self) -> Result<u32, CodecError> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_i64(&mut self) -> Result<i64, CodecError> {
        let bytes = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Ok(i64::from_be_bytes(buf))
    }
}
