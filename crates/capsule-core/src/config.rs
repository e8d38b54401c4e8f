//! Configuration types for the Capsule runtime.

use std::collections::HashMap;

use capsule_host::HostFunction;
use capsule_resource::{pages_for_bytes, WASM_PAGE_SIZE};

use capsule_determinism::{MEMORY_IMPORT, RANDOM_IMPORT, TIME_IMPORT};

use crate::error::{SandboxError, SandboxResult};

/// Largest addressable 32-bit linear memory (65 536 pages).
const MAX_MEMORY_BYTES: u64 = 65_536 * WASM_PAGE_SIZE;

/// Configuration for the Capsule engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum WASM stack size in bytes.
    pub max_wasm_stack: usize,

    /// Enable the (deterministic, non-relaxed) SIMD proposal.
    pub wasm_simd: bool,

    /// Enable debug information in compiled code.
    pub debug_info: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_wasm_stack: 1024 * 1024, // 1MB
            wasm_simd: true,
            debug_info: false,
        }
    }
}

impl EngineConfig {
    /// Create an engine configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum WASM stack size.
    pub fn with_max_wasm_stack(mut self, bytes: usize) -> Self {
        self.max_wasm_stack = bytes;
        self
    }

    /// Enable or disable SIMD.
    pub fn with_simd(mut self, enabled: bool) -> Self {
        self.wasm_simd = enabled;
        self
    }

    /// Enable or disable debug info.
    pub fn with_debug_info(mut self, enabled: bool) -> Self {
        self.debug_info = enabled;
        self
    }
}

/// Configuration for one sandbox instance.
///
/// Immutable once bound to an instance at `create()`. The injected
/// timestamp is a required constructor argument; nothing in the sandbox
/// ever falls back to a clock read.
#[derive(Clone)]
pub struct SandboxConfig {
    /// Linear-memory cap in bytes. May sit below a page boundary; the
    /// post-execution check enforces the byte-exact cap.
    pub max_memory_bytes: u64,

    /// Gas budget, one unit per host call.
    pub max_gas: u64,

    /// Wall-clock budget per execution in milliseconds.
    pub max_execution_ms: u64,

    /// Host functions exposed to the guest under `env`.
    pub host_functions: HashMap<String, HostFunction>,

    /// Seed for the instance's PRNG.
    pub deterministic_seed: u32,

    /// The injected "now", milliseconds since epoch, returned verbatim by
    /// `env.__get_time`.
    pub event_timestamp: u64,
}

impl SandboxConfig {
    /// Create a configuration with the required injected timestamp and
    /// default limits (64 MB memory, 1 M gas, 5 s deadline).
    pub fn new(event_timestamp: u64) -> Self {
        Self {
            max_memory_bytes: 64 * 1024 * 1024,
            max_gas: 1_000_000,
            max_execution_ms: 5_000,
            host_functions: HashMap::new(),
            deterministic_seed: 0,
            event_timestamp,
        }
    }

    /// Set the memory cap in bytes.
    pub fn with_memory_limit(mut self, bytes: u64) -> Self {
        self.max_memory_bytes = bytes;
        self
    }

    /// Set the gas budget.
    pub fn with_gas_limit(mut self, gas: u64) -> Self {
        self.max_gas = gas;
        self
    }

    /// Set the wall-clock budget in milliseconds.
    pub fn with_execution_limit_ms(mut self, ms: u64) -> Self {
        self.max_execution_ms = ms;
        self
    }

    /// Set the PRNG seed.
    pub fn with_seed(mut self, seed: u32) -> Self {
        self.deterministic_seed = seed;
        self
    }

    /// Declare a host function, keyed by its own name.
    pub fn with_host_function(mut self, function: HostFunction) -> Self {
        self.host_functions.insert(function.name.clone(), function);
        self
    }

    /// Number of pages needed to cover the memory cap; also the hard
    /// ceiling configured on the instance's memory.
    pub fn memory_pages(&self) -> u64 {
        pages_for_bytes(self.max_memory_bytes)
    }

    /// Validate the configuration. Called by `create()`.
    pub fn validate(&self) -> SandboxResult<()> {
        if self.max_memory_bytes == 0 {
            return Err(SandboxError::InvalidConfig {
                reason: "max_memory_bytes must be non-zero".to_string(),
            });
        }
        if self.max_memory_bytes > MAX_MEMORY_BYTES {
            return Err(SandboxError::InvalidConfig {
                reason: format!(
                    "max_memory_bytes {} exceeds the 32-bit linear memory ceiling {}",
                    self.max_memory_bytes, MAX_MEMORY_BYTES
                ),
            });
        }
        if self.max_execution_ms == 0 {
            return Err(SandboxError::InvalidConfig {
                reason: "max_execution_ms must be non-zero".to_string(),
            });
        }

        for function in self.host_functions.values() {
            if function.name.is_empty() {
                return Err(SandboxError::InvalidConfig {
                    reason: "host function with empty name".to_string(),
                });
            }
            if [MEMORY_IMPORT, TIME_IMPORT, RANDOM_IMPORT].contains(&function.name.as_str()) {
                return Err(SandboxError::InvalidConfig {
                    reason: format!(
                        "host function name '{}' collides with a reserved import",
                        function.name
                    ),
                });
            }
        }

        Ok(())
    }
}

impl std::fmt::Debug for SandboxConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.host_functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("SandboxConfig")
            .field("max_memory_bytes", &self.max_memory_bytes)
            .field("max_gas", &self.max_gas)
            .field("max_execution_ms", &self.max_execution_ms)
            .field("host_functions", &names)
            .field("deterministic_seed", &self.deterministic_seed)
            .field("event_timestamp", &self.event_timestamp)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasmtime::{Val, ValType};

    #[test]
    fn test_defaults() {
        let config = SandboxConfig::new(1_700_000_000_000);
        assert_eq!(config.event_timestamp, 1_700_000_000_000);
        assert_eq!(config.max_memory_bytes, 64 * 1024 * 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_chain() {
        let config = SandboxConfig::new(0)
            .with_memory_limit(100_000)
            .with_gas_limit(50)
            .with_execution_limit_ms(100)
            .with_seed(12345);

        assert_eq!(config.max_memory_bytes, 100_000);
        assert_eq!(config.max_gas, 50);
        assert_eq!(config.max_execution_ms, 100);
        assert_eq!(config.deterministic_seed, 12345);
    }

    #[test]
    fn test_memory_pages() {
        assert_eq!(SandboxConfig::new(0).with_memory_limit(64 * 1024).memory_pages(), 1);
        assert_eq!(SandboxConfig::new(0).with_memory_limit(100_000).memory_pages(), 2);
        assert_eq!(
            SandboxConfig::new(0).with_memory_limit(16 * 1024 * 1024).memory_pages(),
            256
        );
    }

    #[test]
    fn test_zero_limits_rejected() {
        assert!(SandboxConfig::new(0).with_memory_limit(0).validate().is_err());
        assert!(SandboxConfig::new(0)
            .with_execution_limit_ms(0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_oversized_memory_rejected() {
        let config = SandboxConfig::new(0).with_memory_limit(MAX_MEMORY_BYTES + 1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reserved_host_function_name_rejected() {
        let config = SandboxConfig::new(0).with_host_function(HostFunction::new(
            "__get_time",
            vec![],
            vec![ValType::I32],
            |_| Ok(vec![Val::I32(0)]),
        ));
        let err = config.validate().unwrap_err();
        assert_eq!(err.code(), "INVALID_CONFIG");
    }

    #[test]
    fn test_host_function_keyed_by_name() {
        let config = SandboxConfig::new(0).with_host_function(HostFunction::new(
            "log",
            vec![ValType::I32],
            vec![],
            |_| Ok(vec![]),
        ));
        assert!(config.host_functions.contains_key("log"));
    }
}
