//! WSNP encoding and decoding.

use capsule_determinism::PrngState;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Magic bytes at the start of every snapshot.
pub const MAGIC: [u8; 4] = *b"WSNP";

/// The only format version this codec reads or writes.
pub const FORMAT_VERSION: u8 = 0x01;

/// Bytes up to and including the `memory_len` field.
pub const HEADER_LEN: usize = 9;

/// Execution state serialized alongside the memory image.
///
/// Field names are part of the wire format (camelCase in JSON).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotState {
    /// PRNG state word.
    pub prng_state: PrngState,
    /// The injected timestamp, milliseconds since epoch.
    pub timestamp: u64,
    /// Gas consumed at serialization time.
    pub gas_used: u64,
}

/// A decoded snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Exact copy of the linear-memory buffer.
    pub memory: Vec<u8>,
    /// Execution state.
    pub state: SnapshotState,
}

/// Snapshot encoding and decoding failures.
///
/// Display strings are written so callers can substring-match on `magic`,
/// `version`, `header`, `truncated`, and `corrupted`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SnapshotCodecError {
    /// Input smaller than the fixed header.
    #[error("snapshot truncated: {len} bytes is smaller than the {HEADER_LEN}-byte header")]
    TruncatedHeader {
        /// Input length.
        len: usize,
    },

    /// The first four bytes are not `WSNP`.
    #[error("bad snapshot magic bytes: expected 'WSNP'")]
    BadMagic,

    /// Unknown format version byte.
    #[error("unsupported snapshot version {found:#04x}, expected version {FORMAT_VERSION:#04x}")]
    UnsupportedVersion {
        /// The version byte found.
        found: u8,
    },

    /// The declared memory section overruns the input.
    #[error("snapshot truncated: memory section of {declared} bytes does not fit in {available} remaining bytes")]
    TruncatedMemory {
        /// Declared memory length.
        declared: usize,
        /// Bytes remaining after the header.
        available: usize,
    },

    /// The declared state section overruns the input.
    #[error("snapshot truncated: state section of {declared} bytes does not fit in {available} remaining bytes")]
    TruncatedState {
        /// Declared state length.
        declared: usize,
        /// Bytes remaining after the memory section.
        available: usize,
    },

    /// The state section is not the expected JSON document.
    #[error("corrupted snapshot state: {reason}")]
    CorruptedState {
        /// Parse failure detail.
        reason: String,
    },

    /// The state could not be serialized while encoding.
    #[error("corrupted snapshot state: could not serialize: {reason}")]
    StateEncode {
        /// Serialization failure detail.
        reason: String,
    },

    /// The memory image is too large for the 32-bit length field.
    #[error("memory image of {len} bytes does not fit the 32-bit length field")]
    MemoryTooLarge {
        /// Memory image length.
        len: usize,
    },
}

/// Encode a snapshot from a memory image and execution state.
pub fn encode(memory: &[u8], state: &SnapshotState) -> Result<Vec<u8>, SnapshotCodecError> {
    if memory.len() > u32::MAX as usize {
        return Err(SnapshotCodecError::MemoryTooLarge { len: memory.len() });
    }

    let state_json =
        serde_json::to_vec(state).map_err(|e| SnapshotCodecError::StateEncode {
            reason: e.to_string(),
        })?;

    let mut out = Vec::with_capacity(HEADER_LEN + memory.len() + 4 + state_json.len());
    out.extend_from_slice(&MAGIC);
    out.push(FORMAT_VERSION);
    out.extend_from_slice(&(memory.len() as u32).to_le_bytes());
    out.extend_from_slice(memory);
    out.extend_from_slice(&(state_json.len() as u32).to_le_bytes());
    out.extend_from_slice(&state_json);
    Ok(out)
}

/// Decode and validate a snapshot.
///
/// Validation order: header length, magic, version, memory bounds, state
/// bounds, state JSON. Trailing bytes after the state section are ignored.
pub fn decode(bytes: &[u8]) -> Result<Snapshot, SnapshotCodecError> {
    if bytes.len() < HEADER_LEN {
        return Err(SnapshotCodecError::TruncatedHeader { len: bytes.len() });
    }

    if bytes[0..4] != MAGIC {
        return Err(SnapshotCodecError::BadMagic);
    }

    if bytes[4] != FORMAT_VERSION {
        return Err(SnapshotCodecError::UnsupportedVersion { found: bytes[4] });
    }

    let memory_len = u32::from_le_bytes([bytes[5], bytes[6], bytes[7], bytes[8]]) as usize;
    let after_header = &bytes[HEADER_LEN..];
    if memory_len.saturating_add(4) > after_header.len() {
        return Err(SnapshotCodecError::TruncatedMemory {
            declared: memory_len,
            available: after_header.len(),
        });
    }

    let memory = after_header[..memory_len].to_vec();
    let rest = &after_header[memory_len..];
    let state_len = u32::from_le_bytes([rest[0], rest[1], rest[2], rest[3]]) as usize;
    let state_bytes = &rest[4..];
    if state_len > state_bytes.len() {
        return Err(SnapshotCodecError::TruncatedState {
            declared: state_len,
            available: state_bytes.len(),
        });
    }

    let state: SnapshotState = serde_json::from_slice(&state_bytes[..state_len]).map_err(|e| {
        SnapshotCodecError::CorruptedState {
            reason: e.to_string(),
        }
    })?;

    Ok(Snapshot { memory, state })
}
