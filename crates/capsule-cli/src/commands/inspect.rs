//! Inspect command - show a module's imports and exports.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use wasmtime::ExternType;

use capsule::capsule_core::{CapsuleEngine, IntoShared};
use capsule::capsule_determinism::ImportPolicy;

use crate::output::Output;

/// Arguments for the inspect command.
#[derive(Args)]
pub struct InspectArgs {
    /// Path to the WebAssembly module
    #[arg(required = true)]
    pub module: PathBuf,

    /// Host-function names to classify imports against
    #[arg(long = "allow-fn")]
    pub allow_fns: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ImportEntry {
    namespace: String,
    name: String,
    kind: String,
    admitted: bool,
    detail: String,
}

#[derive(Debug, Serialize)]
struct ExportEntry {
    name: String,
    kind: String,
}

#[derive(Debug, Serialize)]
struct InspectResult {
    path: String,
    imports: Vec<ImportEntry>,
    exports: Vec<ExportEntry>,
}

fn kind_name(ty: &ExternType) -> &'static str {
    match ty {
        ExternType::Func(_) => "func",
        ExternType::Memory(_) => "memory",
        ExternType::Global(_) => "global",
        ExternType::Table(_) => "table",
    }
}

/// Execute the inspect command.
pub fn execute(args: InspectArgs, out: &Output) -> Result<()> {
    let engine = CapsuleEngine::default_engine()
        .context("Failed to create engine")?
        .into_shared();
    let policy = ImportPolicy::new(args.allow_fns.iter().cloned());

    let bytes = std::fs::read(&args.module)
        .with_context(|| format!("Failed to read {}", args.module.display()))?;
    let module = wasmtime::Module::new(engine.inner(), &bytes)
        .context("Failed to compile module")?;

    let imports = module
        .imports()
        .map(|import| {
            let (admitted, detail) = match policy.classify(import.module(), import.name()) {
                Ok(disposition) => (true, format!("{disposition:?}")),
                Err(violation) => (false, violation.to_string()),
            };
            ImportEntry {
                namespace: import.module().to_string(),
                name: import.name().to_string(),
                kind: kind_name(&import.ty()).to_string(),
                admitted,
                detail,
            }
        })
        .collect();

    let exports = module
        .exports()
        .map(|export| ExportEntry {
            name: export.name().to_string(),
            kind: kind_name(&export.ty()).to_string(),
        })
        .collect();

    let result = InspectResult {
        path: args.module.display().to_string(),
        imports,
        exports,
    };

    out.emit(&result, || {
        println!("Module: {}", result.path);
        println!("\nImports ({}):", result.imports.len());
        for import in &result.imports {
            let marker = if import.admitted { "ok" } else { "REJECTED" };
            println!(
                "  [{marker}] {}.{} ({}) - {}",
                import.namespace, import.name, import.kind, import.detail
            );
        }
        println!("\nExports ({}):", result.exports.len());
        for export in &result.exports {
            println!("  {} ({})", export.name, export.kind);
        }
    })
}
