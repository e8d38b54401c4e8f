//! Wasmtime engine wrapper.
//!
//! The engine is configured for deterministic execution: NaN outputs are
//! canonicalized, threads and relaxed SIMD stay off, and both wasmtime fuel
//! and epoch interruption are disabled: gas is charged at host-call
//! boundaries by the sandbox itself, and the deadline is checked
//! cooperatively at the same boundary.

use std::sync::Arc;

use tracing::info;
use wasmtime::{Config, Engine};

use crate::config::EngineConfig;
use crate::error::EngineResult;

/// The Capsule engine wrapping wasmtime.
///
/// One engine is shared by every sandbox instance; compiled modules are
/// tied to it.
pub struct CapsuleEngine {
    inner: Engine,
    config: EngineConfig,
}

impl CapsuleEngine {
    /// Create an engine with the given configuration.
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        let mut wasmtime_config = Config::new();

        // Metering and deadlines are the sandbox's job, at host-call
        // boundaries; the engine-level mechanisms stay off.
        wasmtime_config.consume_fuel(false);
        wasmtime_config.epoch_interruption(false);

        // Determinism: identical inputs must produce identical bits.
        wasmtime_config.cranelift_nan_canonicalization(true);
        wasmtime_config.wasm_threads(false);
        wasmtime_config.wasm_relaxed_simd(false);

        wasmtime_config.max_wasm_stack(config.max_wasm_stack);
        wasmtime_config.debug_info(config.debug_info);
        wasmtime_config.wasm_simd(config.wasm_simd);
        wasmtime_config.wasm_bulk_memory(true);
        wasmtime_config.wasm_multi_value(true);
        wasmtime_config.wasm_reference_types(true);

        let inner = Engine::new(&wasmtime_config)?;

        info!(
            max_wasm_stack = config.max_wasm_stack,
            simd = config.wasm_simd,
            "Created Capsule engine"
        );

        Ok(Self { inner, config })
    }

    /// Create an engine with default configuration.
    pub fn default_engine() -> EngineResult<Self> {
        Self::new(EngineConfig::default())
    }

    /// The underlying wasmtime engine.
    pub fn inner(&self) -> &Engine {
        &self.inner
    }

    /// The configuration this engine was created with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

impl std::fmt::Debug for CapsuleEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapsuleEngine")
            .field("config", &self.config)
            .finish()
    }
}

/// A shared reference to a Capsule engine.
pub type SharedEngine = Arc<CapsuleEngine>;

/// Extension trait for creating shared engines.
pub trait IntoShared {
    /// Convert into a shared engine reference.
    fn into_shared(self) -> SharedEngine;
}

impl IntoShared for CapsuleEngine {
    fn into_shared(self) -> SharedEngine {
        Arc::new(self)
    }
}
