//! Capsule Determinism Kernel
//!
//! This crate provides the pieces of the Capsule sandbox that make execution
//! reproducible:
//!
//! - [`Mulberry32`]: a seeded, serializable PRNG with a single 32-bit state
//!   word, exposed to guests as `env.__get_random`
//! - [`ImportPolicy`]: the import isolation gate that blocks every
//!   non-deterministic host surface at load time
//!
//! # Determinism Model
//!
//! A sandbox instance never observes ambient authority. Time is injected as
//! a fixed timestamp, randomness comes from the seeded PRNG, and any WASM
//! import outside the sanctioned `env` surface is rejected before
//! instantiation. Two instances created from the same configuration and fed
//! the same module therefore produce bit-identical results.

pub mod policy;
pub mod prng;

pub use policy::{
    ImportDisposition, ImportPolicy, ImportReport, PolicyViolation, BLOCKED_NAMESPACES,
    HOST_NAMESPACE, MEMORY_IMPORT, RANDOM_IMPORT, TIME_IMPORT,
};
pub use prng::{Mulberry32, PrngState};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::policy::{ImportDisposition, ImportPolicy, ImportReport, PolicyViolation};
    pub use crate::prng::{Mulberry32, PrngState};
}
