//! Run command - execute an exported function in a fresh sandbox.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use capsule::prelude::*;

use crate::output::Output;

/// Arguments for the run command.
#[derive(Args)]
pub struct RunArgs {
    /// Path to the WebAssembly module
    #[arg(required = true)]
    pub module: PathBuf,

    /// Exported function to execute
    #[arg(short = 'e', long, default_value = "main")]
    pub action: String,

    /// Numeric arguments passed in direct mode
    #[arg(last = true)]
    pub args: Vec<i64>,

    /// JSON payload passed through linear memory (overrides direct args)
    #[arg(long)]
    pub payload_json: Option<String>,

    /// Memory cap in bytes
    #[arg(long, default_value = "67108864")]
    pub memory_limit: u64,

    /// Gas budget (one unit per host call)
    #[arg(long, default_value = "1000000")]
    pub gas_limit: u64,

    /// Wall-clock budget in milliseconds
    #[arg(long, default_value = "5000")]
    pub timeout_ms: u64,

    /// PRNG seed
    #[arg(long, default_value = "0")]
    pub seed: u32,

    /// Injected timestamp, milliseconds since epoch
    #[arg(long, default_value = "0")]
    pub timestamp: u64,

    /// Show resource metrics after execution
    #[arg(long)]
    pub metrics: bool,
}

#[derive(Serialize)]
struct RunSummary<'a> {
    success: bool,
    value: Option<&'a serde_json::Value>,
    error: Option<RunFailure>,
    gas_used: u64,
    duration_ms: u64,
    metrics: &'a ResourceMetrics,
}

#[derive(Serialize)]
struct RunFailure {
    code: &'static str,
    message: String,
}

/// Execute the run command.
pub fn execute(args: RunArgs, out: &Output) -> Result<()> {
    let runtime = Capsule::builder()
        .build()
        .context("Failed to create runtime")?;

    let config = SandboxConfig::new(args.timestamp)
        .with_memory_limit(args.memory_limit)
        .with_gas_limit(args.gas_limit)
        .with_execution_limit_ms(args.timeout_ms)
        .with_seed(args.seed);

    let instance = runtime.create(config).context("Failed to create sandbox")?;

    let bytes = std::fs::read(&args.module)
        .with_context(|| format!("Failed to read {}", args.module.display()))?;
    runtime
        .load(instance.id, &bytes)
        .context("Failed to load module")?;

    let payload = match &args.payload_json {
        Some(raw) => {
            let value: serde_json::Value =
                serde_json::from_str(raw).context("Invalid --payload-json")?;
            Payload::Value(value)
        }
        None if args.args.is_empty() => Payload::Null,
        None => Payload::Ints(args.args.clone()),
    };

    if !out.is_quiet() {
        tracing::info!(
            module = %args.module.display(),
            action = args.action,
            "Executing module"
        );
    }

    let report = runtime.execute(instance.id, &args.action, payload);
    runtime.destroy(instance.id);

    let summary = RunSummary {
        success: report.is_success(),
        value: report.value(),
        error: report.error().map(|e| RunFailure {
            code: e.code(),
            message: e.to_string(),
        }),
        gas_used: report.gas_used,
        duration_ms: report.duration_ms,
        metrics: &report.metrics,
    };

    out.emit(&summary, || {
        match &report.outcome {
            ExecutionOutcome::Completed { value } => println!("Result: {value}"),
            ExecutionOutcome::Failed { error } => {
                println!("Execution failed [{}]: {error}", error.code());
            }
        }
        if args.metrics {
            print_metrics(&report.metrics);
        }
    })?;

    if report.is_success() {
        Ok(())
    } else {
        Err(anyhow::anyhow!("Execution failed"))
    }
}

fn print_metrics(metrics: &ResourceMetrics) {
    println!("Metrics:");
    println!(
        "  memory: {} / {} bytes ({})",
        metrics.memory_used_bytes,
        metrics.memory_limit_bytes,
        assess_pressure(metrics.memory_used_bytes, metrics.memory_limit_bytes)
    );
    println!("  gas:    {} / {}", metrics.gas_used, metrics.gas_limit);
    println!(
        "  time:   {}ms / {}ms",
        metrics.execution_ms, metrics.execution_limit_ms
    );
}
