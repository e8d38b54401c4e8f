//! Module loading and validation.
//!
//! Three checks run before a module reaches instantiation: a shape check on
//! the raw bytes, compilation by the engine, and the import-isolation gate
//! that rejects every surface outside the sanctioned `env` imports.

use capsule_determinism::{ImportPolicy, ImportReport};
use tracing::{debug, info};
use wasmtime::Module;

use crate::engine::SharedEngine;
use crate::error::{SandboxError, SandboxResult};

/// The WASM binary magic, `\0asm`.
pub const WASM_MAGIC: [u8; 4] = [0x00, 0x61, 0x73, 0x6D];

/// A compiled module that passed import isolation.
#[derive(Debug)]
pub struct LoadedModule {
    /// The compiled module handle.
    pub module: Module,
    /// Summary of the classified import surface.
    pub report: ImportReport,
}

/// Loads, compiles, and isolates WASM modules.
pub struct ModuleLoader {
    engine: SharedEngine,
}

impl ModuleLoader {
    /// Create a loader over the shared engine.
    pub fn new(engine: SharedEngine) -> Self {
        Self { engine }
    }

    /// Run all three checks and return the compiled module with its
    /// import report.
    pub fn load(&self, bytes: &[u8], policy: &ImportPolicy) -> SandboxResult<LoadedModule> {
        check_shape(bytes)?;

        debug!(size = bytes.len(), "Compiling module");
        let module = Module::new(self.engine.inner(), bytes).map_err(|e| {
            SandboxError::InvalidModule {
                reason: format!("compilation failed: {e}"),
            }
        })?;

        let report = isolate_imports(&module, policy)?;

        info!(
            size = bytes.len(),
            imports = report.total,
            host_functions = report.host_functions,
            system_imports = report.system,
            "Module passed validation"
        );

        Ok(LoadedModule { module, report })
    }
}

/// Reject inputs that cannot be a WASM binary before the engine sees them.
fn check_shape(bytes: &[u8]) -> SandboxResult<()> {
    if bytes.is_empty() {
        return Err(SandboxError::InvalidModule {
            reason: "module bytes are empty".to_string(),
        });
    }
    if bytes.len() < 8 {
        return Err(SandboxError::InvalidModule {
            reason: format!(
                "module is {} bytes, shorter than the 8-byte preamble",
                bytes.len()
            ),
        });
    }
    if bytes[0..4] != WASM_MAGIC {
        return Err(SandboxError::InvalidModule {
            reason: "first four bytes are not the '\\0asm' magic".to_string(),
        });
    }
    Ok(())
}

/// Classify every declared import; any rejection fails the whole load.
fn isolate_imports(module: &Module, policy: &ImportPolicy) -> SandboxResult<ImportReport> {
    let mut report = ImportReport::default();
    for import in module.imports() {
        let disposition = policy
            .classify(import.module(), import.name())
            .map_err(|violation| SandboxError::InvalidModule {
                reason: violation.to_string(),
            })?;
        report.record(disposition);
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::engine::{CapsuleEngine, IntoShared};

    fn loader() -> ModuleLoader {
        ModuleLoader::new(CapsuleEngine::new(EngineConfig::default()).unwrap().into_shared())
    }

    fn wat_bytes(wat: &str) -> Vec<u8> {
        wat::parse_str(wat).unwrap()
    }

    #[test]
    fn test_empty_input_rejected() {
        let err = loader().load(&[], &ImportPolicy::default()).unwrap_err();
        assert_eq!(err.code(), "INVALID_MODULE");
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn test_short_input_rejected() {
        let err = loader()
            .load(&[0x00, 0x61, 0x73], &ImportPolicy::default())
            .unwrap_err();
        assert!(err.to_string().contains("8-byte"));
    }

    #[test]
    fn test_bad_magic_rejected() {
        let err = loader()
            .load(&[0xDE, 0xAD, 0xBE, 0xEF, 1, 0, 0, 0], &ImportPolicy::default())
            .unwrap_err();
        assert!(err.to_string().contains("magic"));
    }

    #[test]
    fn test_garbage_after_magic_fails_compilation() {
        let mut bytes = WASM_MAGIC.to_vec();
        bytes.extend_from_slice(&[0xFF; 8]);
        let err = loader().load(&bytes, &ImportPolicy::default()).unwrap_err();
        assert!(err.to_string().contains("compilation failed"));
    }

    #[test]
    fn test_clean_module_loads() {
        let bytes = wat_bytes(
            r#"
            (module
                (func (export "add") (param i32 i32) (result i32)
                    local.get 0
                    local.get 1
                    i32.add
                )
            )
        "#,
        );
        let loaded = loader().load(&bytes, &ImportPolicy::default()).unwrap();
        assert_eq!(loaded.report.total, 0);
    }

    #[test]
    fn test_wasi_import_rejected_as_blocked() {
        let bytes = wat_bytes(
            r#"
            (module
                (import "wasi_snapshot_preview1" "fd_write"
                    (func (param i32 i32 i32 i32) (result i32)))
                (func (export "main"))
            )
        "#,
        );
        let err = loader().load(&bytes, &ImportPolicy::default()).unwrap_err();
        assert_eq!(err.code(), "INVALID_MODULE");
        let message = err.to_string();
        assert!(message.contains("wasi_snapshot_preview1"), "message: {message}");
        assert!(message.contains("blocked"), "message: {message}");
    }

    #[test]
    fn test_foreign_namespace_rejected() {
        let bytes = wat_bytes(
            r#"
            (module
                (import "host" "thing" (func))
            )
        "#,
        );
        let err = loader().load(&bytes, &ImportPolicy::default()).unwrap_err();
        assert!(err.to_string().contains("not permitted"));
    }

    #[test]
    fn test_undeclared_env_import_rejected() {
        let bytes = wat_bytes(
            r#"
            (module
                (import "env" "open_file" (func (param i32) (result i32)))
            )
        "#,
        );
        let err = loader().load(&bytes, &ImportPolicy::default()).unwrap_err();
        assert!(err.to_string().contains("undeclared"));
    }

    #[test]
    fn test_report_counts_system_and_host_imports() {
        let bytes = wat_bytes(
            r#"
            (module
                (import "env" "memory" (memory 1))
                (import "env" "__get_time" (func (result i32)))
                (import "env" "__get_random" (func (result i32)))
                (import "env" "log" (func (param i32)))
            )
        "#,
        );
        let loaded = loader()
            .load(&bytes, &ImportPolicy::new(["log"]))
            .unwrap();
        assert_eq!(loaded.report.total, 4);
        assert_eq!(loaded.report.system, 3);
        assert_eq!(loaded.report.host_functions, 1);
    }
}
