//! Schema and core operations of the merkle sorted tree.
//!
//! This crate defines the on-wire shape of the tree in a backend-agnostic manner:
//! the self-describing digest type and the hash algorithm registry, the index
//! entry record together with the id-addressing rules that give the tree its
//! shape, the stable binary encoding of index entries, and hash-path proof
//! verification.
//!
//! Nothing within this crate performs I/O or relies on the standard library.
//!
//! ## Schema
//!
//! The tree indexes values by a 64-bit non-negative id inside a fixed id space
//! `[0, max_count)`. Every node covers a contiguous, aligned id range described
//! by an `(offset, step)` pair and splits it into `degree` equal slots. Nodes at
//! `step == 1` hold user payloads in their slots; nodes at larger steps hold
//! child index entries. Nodes are content-addressed: each is persisted under the
//! digest of its canonical encoding, so equal populated contents always produce
//! equal root digests.

#![no_std]

extern crate alloc;

pub mod codec;
pub mod digest;
pub mod index;
pub mod proof;
