//! # Capsule - Deterministic WebAssembly Sandbox
//!
//! Capsule executes untrusted WebAssembly under strict determinism and
//! bounded resources. Given a configuration (memory cap, gas budget,
//! wall-clock deadline, host functions, PRNG seed, injected timestamp) and
//! a module, it creates an isolated instance, enforces limits during
//! execution, and supports suspend/resume via binary snapshots of complete
//! execution state.
//!
//! ## Quick Start
//!
//! ```ignore
//! use capsule::prelude::*;
//!
//! let runtime = Capsule::builder().build()?;
//!
//! let config = SandboxConfig::new(1_700_000_000_000) // injected "now"
//!     .with_memory_limit(16 * 1024 * 1024)
//!     .with_gas_limit(10_000)
//!     .with_seed(42);
//!
//! let instance = runtime.create(config)?;
//! runtime.load(instance.id, &wasm_bytes)?;
//!
//! let report = runtime.execute(instance.id, "add", Payload::Ints(vec![3, 7]));
//! assert_eq!(report.value(), Some(&serde_json::json!(10)));
//!
//! let snapshot = runtime.snapshot(instance.id)?;
//! // ... later, possibly in another process:
//! runtime.restore(instance.id, &snapshot)?;
//! ```
//!
//! ## Guarantees
//!
//! 1. **Bounded resources**: gas charged per host call, cooperative
//!    wall-clock deadline, byte-exact memory cap enforced after every
//!    execution.
//! 2. **Determinism**: injected timestamp, seeded serializable PRNG,
//!    import isolation against every ambient surface, NaN-canonicalized
//!    engine. Same config + module + inputs ⇒ identical results.
//! 3. **Snapshots**: versioned `WSNP` binary format round-tripping linear
//!    memory, PRNG state, gas counter, and timestamp, bit-exact across
//!    implementations.

use std::sync::Arc;

use capsule_core::{
    CapsuleEngine, EngineConfig, ExecutionReport, InstanceId, Payload, SandboxConfig,
    SandboxInstance, SandboxRegistry,
};
use capsule_observe::{EventDispatcher, EventSubscriber, ResourceMetrics};
use capsule_resource::TimeSourceFn;

// Re-export sub-crates for embedders that need the lower layers.
pub use capsule_core;
pub use capsule_determinism;
pub use capsule_host;
pub use capsule_observe;
pub use capsule_resource;
pub use capsule_snapshot;

/// Builder for a [`CapsuleRuntime`].
pub struct CapsuleBuilder {
    engine_config: EngineConfig,
    subscribers: Vec<Arc<dyn EventSubscriber>>,
}

impl CapsuleBuilder {
    /// Create a builder with default engine configuration.
    pub fn new() -> Self {
        Self {
            engine_config: EngineConfig::default(),
            subscribers: Vec::new(),
        }
    }

    /// Override the engine configuration.
    pub fn with_engine_config(mut self, config: EngineConfig) -> Self {
        self.engine_config = config;
        self
    }

    /// Set the maximum WASM stack size.
    pub fn with_max_wasm_stack(mut self, bytes: usize) -> Self {
        self.engine_config.max_wasm_stack = bytes;
        self
    }

    /// Subscribe to lifecycle events.
    pub fn with_event_subscriber(mut self, subscriber: Arc<dyn EventSubscriber>) -> Self {
        self.subscribers.push(subscriber);
        self
    }

    /// Build the runtime.
    pub fn build(self) -> Result<CapsuleRuntime, CapsuleError> {
        let engine = Arc::new(CapsuleEngine::new(self.engine_config)?);

        let events = Arc::new(EventDispatcher::new());
        for subscriber in self.subscribers {
            events.subscribe(subscriber);
        }

        Ok(CapsuleRuntime {
            registry: SandboxRegistry::with_events(engine, events),
        })
    }
}

impl Default for CapsuleBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Entry point for the Capsule runtime.
pub struct Capsule;

impl Capsule {
    /// Start building a runtime.
    pub fn builder() -> CapsuleBuilder {
        CapsuleBuilder::new()
    }

    /// Build a runtime with default configuration.
    pub fn with_defaults() -> Result<CapsuleRuntime, CapsuleError> {
        CapsuleBuilder::new().build()
    }
}

/// A configured runtime: one engine, one instance registry.
pub struct CapsuleRuntime {
    registry: SandboxRegistry,
}

impl CapsuleRuntime {
    /// Create an instance from a validated configuration.
    pub fn create(&self, config: SandboxConfig) -> Result<SandboxInstance, CapsuleError> {
        Ok(self.registry.create(config)?)
    }

    /// Load a module into a freshly created instance.
    pub fn load(&self, id: InstanceId, bytes: &[u8]) -> Result<(), CapsuleError> {
        Ok(self.registry.load(id, bytes)?)
    }

    /// Execute an exported function. Failures come back inside the report;
    /// this never raises.
    pub fn execute(&self, id: InstanceId, action: &str, payload: Payload) -> ExecutionReport {
        self.registry.execute(id, action, payload)
    }

    /// Execute with an injected time source for the deadline checker.
    pub fn execute_with_timer(
        &self,
        id: InstanceId,
        action: &str,
        payload: Payload,
        timer: TimeSourceFn,
    ) -> ExecutionReport {
        self.registry.execute_with_timer(id, action, payload, timer)
    }

    /// Suspend a loaded instance.
    pub fn suspend(&self, id: InstanceId) -> Result<(), CapsuleError> {
        Ok(self.registry.suspend(id)?)
    }

    /// Destroy an instance. Idempotent, never raises.
    pub fn destroy(&self, id: InstanceId) {
        self.registry.destroy(id);
    }

    /// Serialize the instance's complete execution state.
    pub fn snapshot(&self, id: InstanceId) -> Result<Vec<u8>, CapsuleError> {
        Ok(self.registry.snapshot(id)?)
    }

    /// Restore a snapshot into the instance.
    pub fn restore(&self, id: InstanceId, bytes: &[u8]) -> Result<(), CapsuleError> {
        Ok(self.registry.restore(id, bytes)?)
    }

    /// Current metrics for an instance.
    pub fn metrics(&self, id: InstanceId) -> Result<ResourceMetrics, CapsuleError> {
        Ok(self.registry.metrics(id)?)
    }

    /// Read-only projection of an instance.
    pub fn get(&self, id: InstanceId) -> Result<SandboxInstance, CapsuleError> {
        Ok(self.registry.get(id)?)
    }

    /// The underlying registry, for embedders that need it directly.
    pub fn registry(&self) -> &SandboxRegistry {
        &self.registry
    }
}

impl std::fmt::Debug for CapsuleRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapsuleRuntime")
            .field("registry", &self.registry)
            .finish()
    }
}

/// Errors from the Capsule runtime.
#[derive(Debug, thiserror::Error)]
pub enum CapsuleError {
    /// Engine creation failed.
    #[error("engine error: {0}")]
    Engine(#[from] capsule_core::EngineError),

    /// A sandbox operation failed.
    #[error("sandbox error: {0}")]
    Sandbox(#[from] capsule_core::SandboxError),
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::{Capsule, CapsuleBuilder, CapsuleError, CapsuleRuntime};

    pub use capsule_core::{
        EngineConfig, ExecutionOutcome, ExecutionReport, InstanceId, InstanceStatus, Payload,
        SandboxConfig, SandboxError, SandboxInstance, TrapKind,
    };
    pub use capsule_determinism::{Mulberry32, PrngState};
    pub use capsule_host::HostFunction;
    pub use capsule_observe::{
        assess_pressure, EventSubscriber, PressureLevel, ResourceMetrics, SandboxEvent,
    };

    pub use std::sync::Arc;
}
