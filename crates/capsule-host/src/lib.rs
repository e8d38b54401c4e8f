//! Capsule Host Layer
//!
//! This crate builds the host side of the WASM↔host boundary: the binding
//! table a module is instantiated against, and the helpers for moving bytes
//! across guest memory.
//!
//! Every binding is budget-aware. The system imports (`env.__get_time`,
//! `env.__get_random`) and every embedder-declared host function charge one
//! unit of gas and check the wall-clock deadline before their body runs;
//! both are reached through the [`SandboxState`] trait the store data
//! implements.

pub mod error;
pub mod function;
pub mod memory;
pub mod state;
pub mod table;

pub use error::{HostError, HostFunctionFailure, HostResult};
pub use function::{HostFunction, HostHandler};
pub use memory::{read_bytes, write_bytes};
pub use state::SandboxState;
pub use table::{BoundImport, ImportTable};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::error::{HostError, HostFunctionFailure, HostResult};
    pub use crate::function::HostFunction;
    pub use crate::state::SandboxState;
    pub use crate::table::ImportTable;
}
