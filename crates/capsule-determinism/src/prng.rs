//! Seeded pseudo-random number generation.
//!
//! The sandbox exposes randomness to guests through a Mulberry32 generator.
//! Mulberry32 keeps its entire state in one 32-bit word, which makes it
//! trivially serializable into snapshots, and its step function is specified
//! in terms of 32-bit wrapping arithmetic so independent implementations
//! produce bit-identical sequences.

use serde::{Deserialize, Serialize};

/// Serializable PRNG state.
///
/// This is the exact shape persisted in snapshot state JSON; the `current`
/// field name is part of the wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrngState {
    /// The single 32-bit state word.
    pub current: u32,
}

/// A Mulberry32 pseudo-random number generator.
///
/// The step function is prescriptive: `wrapping_add`/`wrapping_mul` and
/// logical right shifts on `u32` reproduce the 32-bit integer semantics the
/// algorithm was defined with. Two generators constructed from the same seed
/// yield identical infinite sequences.
///
/// # Example
///
/// ```
/// use capsule_determinism::Mulberry32;
///
/// let mut a = Mulberry32::new(42);
/// let mut b = Mulberry32::new(42);
/// assert_eq!(a.next_u32(), b.next_u32());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mulberry32 {
    state: u32,
}

impl Mulberry32 {
    /// Create a generator from a 32-bit seed.
    pub fn new(seed: u32) -> Self {
        Self { state: seed }
    }

    /// Create a generator from a previously captured state.
    pub fn from_state(state: PrngState) -> Self {
        Self {
            state: state.current,
        }
    }

    /// Advance the generator and return the next 32-bit output.
    pub fn next_u32(&mut self) -> u32 {
        self.state = self.state.wrapping_add(0x6D2B_79F5);
        let mut t = self.state;
        t = (t ^ (t >> 15)).wrapping_mul(t | 1);
        t ^= t.wrapping_add((t ^ (t >> 7)).wrapping_mul(t | 61));
        t ^ (t >> 14)
    }

    /// Capture the current state for serialization.
    pub fn state(&self) -> PrngState {
        PrngState {
            current: self.state,
        }
    }

    /// Overwrite the state, e.g. when restoring a snapshot.
    pub fn set_state(&mut self, state: PrngState) {
        self.state = state.current;
    }

    /// Re-seed the generator, discarding all current state.
    pub fn reset(&mut self, seed: u32) {
        self.state = seed;
    }
}
