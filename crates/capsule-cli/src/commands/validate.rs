//! Validate command - check a module against the sandbox's import policy.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use capsule::capsule_core::{CapsuleEngine, IntoShared, ModuleLoader};
use capsule::capsule_determinism::ImportPolicy;

use crate::output::Output;

/// Arguments for the validate command.
#[derive(Args)]
pub struct ValidateArgs {
    /// Path to the WebAssembly module
    #[arg(required = true)]
    pub module: PathBuf,

    /// Host-function names the sandbox configuration would declare
    #[arg(long = "allow-fn")]
    pub allow_fns: Vec<String>,
}

/// Validation result.
#[derive(Debug, Serialize)]
struct ValidationResult {
    valid: bool,
    path: String,
    imports: usize,
    system_imports: usize,
    host_function_imports: usize,
    errors: Vec<String>,
}

/// Execute the validate command.
pub fn execute(args: ValidateArgs, out: &Output) -> Result<()> {
    let engine = CapsuleEngine::default_engine()
        .context("Failed to create engine")?
        .into_shared();
    let loader = ModuleLoader::new(engine);
    let policy = ImportPolicy::new(args.allow_fns.iter().cloned());

    let bytes = std::fs::read(&args.module)
        .with_context(|| format!("Failed to read {}", args.module.display()))?;

    let mut result = ValidationResult {
        valid: true,
        path: args.module.display().to_string(),
        imports: 0,
        system_imports: 0,
        host_function_imports: 0,
        errors: Vec::new(),
    };

    match loader.load(&bytes, &policy) {
        Ok(loaded) => {
            result.imports = loaded.report.total;
            result.system_imports = loaded.report.system;
            result.host_function_imports = loaded.report.host_functions;
        }
        Err(e) => {
            result.valid = false;
            result.errors.push(e.to_string());
        }
    }

    out.emit(&result, || {
        if result.valid {
            println!("Module is valid: {}", result.path);
            println!("  Imports: {} total", result.imports);
            println!("    system: {}", result.system_imports);
            println!("    host functions: {}", result.host_function_imports);
        } else {
            println!("Module is INVALID: {}", result.path);
            for error in &result.errors {
                println!("  Error: {}", error);
            }
        }
    })?;

    if result.valid {
        Ok(())
    } else {
        Err(anyhow::anyhow!("Validation failed"))
    }
}
