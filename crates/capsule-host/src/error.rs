//! Error types for the host layer.

use thiserror::Error;

/// Errors from building the import table or touching guest memory.
#[derive(Debug, Error)]
pub enum HostError {
    /// An import with this name is already bound.
    #[error("import 'env.{name}' is already bound")]
    AlreadyBound {
        /// The duplicated import name.
        name: String,
    },

    /// The underlying linker rejected a binding.
    #[error("failed to bind import 'env.{name}': {reason}")]
    BindFailed {
        /// The import name.
        name: String,
        /// The linker's diagnostic.
        reason: String,
    },

    /// Guest memory access out of bounds.
    #[error("guest memory access out of bounds: offset={offset}, len={len}, memory_size={size}")]
    OutOfBounds {
        /// Requested offset.
        offset: usize,
        /// Requested length.
        len: usize,
        /// Live buffer length.
        size: usize,
    },
}

/// Result type for host operations.
pub type HostResult<T> = std::result::Result<T, HostError>;

/// A host-function handler failure, carried through the wasmtime error
/// chain so the instantiation and execution paths can classify it by
/// downcast.
#[derive(Debug, Clone, Error)]
#[error("host function '{function}' failed: {message}")]
pub struct HostFunctionFailure {
    /// Name of the failing function.
    pub function: String,
    /// The handler's failure message.
    pub message: String,
}
