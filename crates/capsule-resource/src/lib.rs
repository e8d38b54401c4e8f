//! Capsule Resource Enforcement
//!
//! This crate provides the per-execution resource tracking for the Capsule
//! sandbox:
//!
//! - Gas metering via [`GasMeter`], charged at host-call boundaries
//! - Wall-clock deadlines via [`DeadlineChecker`] with an injectable time
//!   source
//! - Pure linear-memory helpers in [`memory`]
//! - [`ExecutionContext`], the bundle attached to an instance for the
//!   duration of one execution
//!
//! # Enforcement Strategy
//!
//! Gas is an abstract unit charged once per host-function call, immediately
//! before the handler body runs; the deadline is checked at the same
//! boundary. Neither can fire inside a pure WASM compute loop; modules that
//! must remain interruptible are expected to make at least one host call per
//! bounded unit of work. Memory is enforced twice: the engine's configured
//! maximum caps growth in pages, and a post-execution check compares the
//! live buffer against the caller's byte cap, which may sit below a page
//! boundary.
//!
//! When a budget is exceeded the meter or checker returns a typed signal
//! ([`GasExhausted`], [`DeadlineExceeded`]). Signals are internal control
//! flow: the executor converts them into typed errors and they never reach
//! the embedder as raw values.

pub mod context;
pub mod deadline;
pub mod gas;
pub mod memory;

pub use context::{ExecutionContext, HostFailure};
pub use deadline::{DeadlineChecker, DeadlineExceeded, TimeSource, TimeSourceFn};
pub use gas::{GasExhausted, GasMeter};
pub use memory::{pages_for_bytes, MemoryCheck, WASM_PAGE_SIZE};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::context::ExecutionContext;
    pub use crate::deadline::{DeadlineChecker, DeadlineExceeded, TimeSource};
    pub use crate::gas::{GasExhausted, GasMeter};
    pub use crate::memory::{pages_for_bytes, MemoryCheck, WASM_PAGE_SIZE};
}
