//! Error taxonomy for sandbox operations.
//!
//! [`SandboxError`] is the caller-facing taxonomy. `execute()` returns it
//! inside a tagged report and never raises; the other lifecycle operations
//! return it as a `Result` error. Internal resource signals
//! (`GasExhausted`, `DeadlineExceeded`) never reach the caller raw; the
//! executor converts them into the corresponding variants here.

use thiserror::Error;

use crate::instance::InstanceId;

/// Discriminates real runtime traps from the synthesized pseudo-traps the
/// executor emits for precondition failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapKind {
    /// The instance was not in a status that permits execution.
    InvalidState,
    /// No live WASM instance handle.
    NoInstance,
    /// The requested action is not an exported function.
    MissingExport,
    /// A fault raised while guest code was running.
    RuntimeError,
}

impl TrapKind {
    /// Stable snake_case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            TrapKind::InvalidState => "invalid_state",
            TrapKind::NoInstance => "no_instance",
            TrapKind::MissingExport => "missing_export",
            TrapKind::RuntimeError => "runtime_error",
        }
    }
}

impl std::fmt::Display for TrapKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed failures surfaced by sandbox operations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SandboxError {
    /// Computation budget exceeded. `gas_used` is the exceeding value.
    #[error("gas exhausted: used {gas_used} of limit {gas_limit}")]
    GasExhausted {
        /// Gas consumed, including the charge that went over.
        gas_used: u64,
        /// The configured budget.
        gas_limit: u64,
    },

    /// Post-execution linear-memory check failed.
    #[error("memory limit exceeded: used {memory_used} bytes, limit {memory_limit} bytes")]
    MemoryExceeded {
        /// Live buffer length.
        memory_used: u64,
        /// Configured cap.
        memory_limit: u64,
    },

    /// Wall-clock budget exceeded at a host-call boundary.
    #[error("execution timed out: {elapsed_ms}ms elapsed, limit {limit_ms}ms")]
    Timeout {
        /// Milliseconds elapsed when the deadline fired.
        elapsed_ms: u64,
        /// The configured budget.
        limit_ms: u64,
    },

    /// A WASM-runtime fault or a synthesized pseudo-trap.
    #[error("wasm trap ({kind}): {message}")]
    WasmTrap {
        /// What kind of trap this is.
        kind: TrapKind,
        /// Human-readable detail.
        message: String,
    },

    /// Validation, compilation, or import-isolation failure.
    #[error("invalid module: {reason}")]
    InvalidModule {
        /// What was wrong with the module.
        reason: String,
    },

    /// A host handler failed during instantiation.
    #[error("host function '{function}' failed: {message}")]
    HostFunction {
        /// The failing function's name.
        function: String,
        /// The handler's message.
        message: String,
    },

    /// Operation on a destroyed instance.
    #[error("instance '{id}' is destroyed")]
    InstanceDestroyed {
        /// The destroyed instance.
        id: InstanceId,
    },

    /// Snapshot serialization or restore validation failed.
    #[error("snapshot error: {reason}")]
    Snapshot {
        /// Why the snapshot operation failed.
        reason: String,
    },

    /// Registry lookup miss.
    #[error("unknown instance '{id}'")]
    UnknownInstance {
        /// The id that resolved to nothing.
        id: InstanceId,
    },

    /// `create()` rejected the configuration.
    #[error("invalid sandbox configuration: {reason}")]
    InvalidConfig {
        /// What was wrong with the configuration.
        reason: String,
    },
}

impl SandboxError {
    /// Stable error code for dispatching on failure kind.
    pub fn code(&self) -> &'static str {
        match self {
            SandboxError::GasExhausted { .. } => "GAS_EXHAUSTED",
            SandboxError::MemoryExceeded { .. } => "MEMORY_EXCEEDED",
            SandboxError::Timeout { .. } => "TIMEOUT",
            SandboxError::WasmTrap { .. } => "WASM_TRAP",
            SandboxError::InvalidModule { .. } => "INVALID_MODULE",
            SandboxError::HostFunction { .. } => "HOST_FUNCTION_ERROR",
            SandboxError::InstanceDestroyed { .. } => "INSTANCE_DESTROYED",
            SandboxError::Snapshot { .. } => "SNAPSHOT_ERROR",
            SandboxError::UnknownInstance { .. } => "UNKNOWN_INSTANCE",
            SandboxError::InvalidConfig { .. } => "INVALID_CONFIG",
        }
    }

    /// Shorthand for a synthesized or runtime trap.
    pub fn trap(kind: TrapKind, message: impl Into<String>) -> Self {
        SandboxError::WasmTrap {
            kind,
            message: message.into(),
        }
    }
}

/// Errors during engine creation.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Invalid engine configuration.
    #[error("invalid engine configuration: {0}")]
    InvalidConfig(String),

    /// Underlying wasmtime error.
    #[error("wasmtime error: {0}")]
    Wasmtime(#[from] wasmtime::Error),
}

/// Result type for sandbox operations.
pub type SandboxResult<T> = std::result::Result<T, SandboxError>;

/// Result type for engine operations.
pub type EngineResult<T> = std::result::Result<T, EngineError>;
