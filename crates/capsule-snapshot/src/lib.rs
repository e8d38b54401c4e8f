//! Capsule Snapshot Codec
//!
//! Binary serialization of complete sandbox execution state: linear memory,
//! PRNG state, gas counter, and injected timestamp. The format is versioned
//! and bit-exact so snapshots interoperate across implementations.
//!
//! # Wire Format
//!
//! All multi-byte integers are little-endian:
//!
//! ```text
//! offset  size  content
//! 0       4     magic bytes  'W' 'S' 'N' 'P'
//! 4       1     version      0x01
//! 5       4     memory_len   u32
//! 9       N     memory       raw linear-memory bytes
//! 9+N     4     state_len    u32
//! 13+N    M     state_json   UTF-8 JSON
//! ```
//!
//! The state JSON carries `{"prngState":{"current":…},"timestamp":…,
//! "gasUsed":…}`; these field names are stable for every version ≤ 1.

pub mod format;

pub use format::{
    decode, encode, Snapshot, SnapshotCodecError, SnapshotState, FORMAT_VERSION, HEADER_LEN, MAGIC,
};
