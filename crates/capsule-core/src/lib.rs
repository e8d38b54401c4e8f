//! Capsule Core - Deterministic WebAssembly Sandbox
//!
//! This crate is the heart of the Capsule sandbox runtime:
//!
//! - [`CapsuleEngine`]: wasmtime configured for deterministic execution
//! - [`ModuleLoader`]: shape check, compilation, and import isolation
//! - [`SandboxRegistry`]: instance lifecycle behind opaque [`InstanceId`]
//!   handles, execution with resource tracking, and snapshot/restore
//!
//! # Quick Start
//!
//! ```ignore
//! use capsule_core::prelude::*;
//!
//! let engine = CapsuleEngine::default_engine()?.into_shared();
//! let registry = SandboxRegistry::new(engine);
//!
//! let config = SandboxConfig::new(1_700_000_000_000)
//!     .with_memory_limit(16 * 1024 * 1024)
//!     .with_gas_limit(10_000)
//!     .with_seed(42);
//!
//! let instance = registry.create(config)?;
//! registry.load(instance.id, &wasm_bytes)?;
//! let report = registry.execute(instance.id, "add", Payload::Ints(vec![3, 7]));
//! ```
//!
//! # Determinism Model
//!
//! A sandbox observes no ambient authority. Time comes from the injected
//! `event_timestamp`, randomness from the seeded PRNG, and every import
//! outside the sanctioned `env` surface is rejected at load. Gas is charged
//! at host-call boundaries; the wall-clock deadline is checked at the same
//! boundary. Linear memory, PRNG state, gas counter, and timestamp
//! round-trip through versioned binary snapshots, so two instances with the
//! same configuration, module, and inputs are bit-identical, before and
//! after a suspend/resume cycle.

pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod instance;
pub mod loader;
pub mod payload;
pub mod registry;

pub use config::{EngineConfig, SandboxConfig};
pub use engine::{CapsuleEngine, IntoShared, SharedEngine};
pub use error::{EngineError, EngineResult, SandboxError, SandboxResult, TrapKind};
pub use executor::{ExecutionOutcome, ExecutionReport, ALLOC_EXPORT};
pub use instance::{InstanceId, InstanceStatus, SandboxInstance};
pub use loader::{LoadedModule, ModuleLoader, WASM_MAGIC};
pub use payload::Payload;
pub use registry::SandboxRegistry;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::{EngineConfig, SandboxConfig};
    pub use crate::engine::{CapsuleEngine, IntoShared, SharedEngine};
    pub use crate::error::{SandboxError, SandboxResult, TrapKind};
    pub use crate::executor::{ExecutionOutcome, ExecutionReport};
    pub use crate::instance::{InstanceId, InstanceStatus, SandboxInstance};
    pub use crate::payload::Payload;
    pub use crate::registry::SandboxRegistry;
}

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn test_end_to_end() {
        let engine = CapsuleEngine::default_engine().unwrap().into_shared();
        let registry = SandboxRegistry::new(engine);

        let instance = registry.create(SandboxConfig::new(0)).unwrap();
        let bytes = wat::parse_str(
            r#"
            (module
                (func (export "double") (param i32) (result i32)
                    local.get 0
                    i32.const 2
                    i32.mul
                )
            )
        "#,
        )
        .unwrap();

        registry.load(instance.id, &bytes).unwrap();
        let report = registry.execute(instance.id, "double", Payload::Int(21));
        assert_eq!(report.value(), Some(&serde_json::json!(42)));
    }
}
