//! Dispatching exports with resource tracking.
//!
//! The executor checks preconditions in a fixed order, attaches a fresh
//! [`ExecutionContext`] to the store data so the wired imports can charge
//! it, dispatches the payload in direct or linear-memory mode, converts
//! internal resource signals into typed errors, runs the post-execution
//! memory check, and finalizes metrics. The instance's previous status is
//! restored on every exit path and the report never raises to the caller.

use capsule_host::{read_bytes, write_bytes};
use capsule_observe::ResourceMetrics;
use capsule_resource::{
    DeadlineChecker, DeadlineExceeded, ExecutionContext, GasExhausted, GasMeter, MemoryCheck,
    TimeSource, TimeSourceFn,
};
use serde_json::Value;
use tracing::{debug, warn};
use wasmtime::{Func, FuncType, Instance, Memory, Store, Val, ValType};

use crate::error::{SandboxError, TrapKind};
use crate::instance::{InstanceData, InstanceStatus, InternalState};
use crate::payload::{val_for, vals_to_json, Payload};

/// Export a module must provide to receive linear-memory payloads.
pub const ALLOC_EXPORT: &str = "__alloc";

/// Outcome of one execution.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    /// The export returned; `value` is its result rendered as JSON.
    Completed {
        /// The result value.
        value: Value,
    },
    /// The execution failed with a typed error.
    Failed {
        /// What went wrong.
        error: SandboxError,
    },
}

impl ExecutionOutcome {
    /// Whether the execution completed without a typed failure.
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Completed { .. })
    }
}

/// The tagged result of `execute()`, with metrics populated on success and
/// failure alike.
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    /// Success value or typed failure.
    pub outcome: ExecutionOutcome,
    /// Resource usage for this execution.
    pub metrics: ResourceMetrics,
    /// Mirror of `metrics.gas_used`.
    pub gas_used: u64,
    /// Mirror of `metrics.execution_ms`.
    pub duration_ms: u64,
}

impl ExecutionReport {
    /// Whether the execution succeeded.
    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }

    /// The success value, if any.
    pub fn value(&self) -> Option<&Value> {
        match &self.outcome {
            ExecutionOutcome::Completed { value } => Some(value),
            ExecutionOutcome::Failed { .. } => None,
        }
    }

    /// The failure, if any.
    pub fn error(&self) -> Option<&SandboxError> {
        match &self.outcome {
            ExecutionOutcome::Completed { .. } => None,
            ExecutionOutcome::Failed { error } => Some(error),
        }
    }

    pub(crate) fn from_failure(error: SandboxError, metrics: ResourceMetrics) -> Self {
        Self {
            outcome: ExecutionOutcome::Failed { error },
            metrics,
            gas_used: metrics.gas_used,
            duration_ms: metrics.execution_ms,
        }
    }
}

/// Run one export with full resource tracking.
pub(crate) fn execute(
    state: &mut InternalState,
    action: &str,
    payload: Payload,
    timer: Option<TimeSourceFn>,
) -> ExecutionReport {
    if state.status == InstanceStatus::Destroyed {
        return precondition_failure(state, SandboxError::InstanceDestroyed { id: state.id });
    }
    if !state.status.can_execute() {
        let error = SandboxError::trap(
            TrapKind::InvalidState,
            format!(
                "execute requires status 'loaded' or 'running', status is '{}'",
                state.status
            ),
        );
        return precondition_failure(state, error);
    }

    let instance = match state.instance {
        Some(instance) => instance,
        None => {
            let error = SandboxError::trap(TrapKind::NoInstance, "module is not instantiated");
            return precondition_failure(state, error);
        }
    };
    let memory = state.memory;

    let func = {
        let store = match state.store.as_mut() {
            Some(store) => store,
            None => {
                let error =
                    SandboxError::trap(TrapKind::NoInstance, "instance store is gone");
                return precondition_failure(state, error);
            }
        };
        instance.get_func(&mut *store, action)
    };
    let func = match func {
        Some(func) => func,
        None => {
            let error = SandboxError::trap(
                TrapKind::MissingExport,
                format!("action '{action}' is not an exported function"),
            );
            return precondition_failure(state, error);
        }
    };

    let deadline = match timer {
        Some(source) => {
            DeadlineChecker::with_source(state.config.max_execution_ms, TimeSource::injected(source))
        }
        None => DeadlineChecker::new(state.config.max_execution_ms),
    };
    let mut ctx = ExecutionContext::new(GasMeter::new(state.config.max_gas), deadline);
    ctx.deadline.start();

    let gas_limit = state.config.max_gas;
    let memory_limit = state.config.max_memory_bytes;
    let execution_limit_ms = state.config.max_execution_ms;

    let prev_status = state.status;
    state.status = InstanceStatus::Running;
    debug!(id = %state.id, action, "Execution started");

    let mut gas_used = 0;
    let mut execution_ms = 0;
    let mut host_failures = Vec::new();

    let outcome = match state.store.as_mut() {
        Some(store) => {
            store.data_mut().context = Some(ctx);

            let call_result = invoke(store, instance, memory, func, payload);

            if let Some(finished) = store.data_mut().context.take() {
                gas_used = finished.gas.used();
                execution_ms = finished.deadline.elapsed_ms();
                host_failures = finished.host_failures;
            }

            match call_result {
                Ok(value) => {
                    let used = memory.map(|m| m.data_size(&*store) as u64).unwrap_or(0);
                    let check = MemoryCheck::evaluate(used, memory_limit);
                    if check.exceeded {
                        ExecutionOutcome::Failed {
                            error: SandboxError::MemoryExceeded {
                                memory_used: check.used,
                                memory_limit: check.limit,
                            },
                        }
                    } else {
                        ExecutionOutcome::Completed { value }
                    }
                }
                Err(error) => ExecutionOutcome::Failed { error },
            }
        }
        None => ExecutionOutcome::Failed {
            error: SandboxError::trap(TrapKind::NoInstance, "instance store is gone"),
        },
    };

    state.status = prev_status;

    let metrics = ResourceMetrics {
        memory_used_bytes: state.memory_used_bytes(),
        memory_limit_bytes: memory_limit,
        gas_used,
        gas_limit,
        execution_ms,
        execution_limit_ms,
    };
    state.metrics = metrics;

    for failure in &host_failures {
        warn!(
            id = %state.id,
            function = failure.function,
            message = failure.message,
            "Host function failed during execution"
        );
    }

    debug!(
        id = %state.id,
        action,
        success = outcome.is_success(),
        gas_used,
        duration_ms = execution_ms,
        "Execution finished"
    );

    ExecutionReport {
        outcome,
        metrics,
        gas_used,
        duration_ms: execution_ms,
    }
}

/// Report a precondition failure without touching instance status or
/// stored metrics.
fn precondition_failure(state: &InternalState, error: SandboxError) -> ExecutionReport {
    warn!(id = %state.id, code = error.code(), "Execution precondition failed");
    let metrics = ResourceMetrics {
        memory_used_bytes: state.memory_used_bytes(),
        memory_limit_bytes: state.config.max_memory_bytes,
        gas_used: 0,
        gas_limit: state.config.max_gas,
        execution_ms: 0,
        execution_limit_ms: state.config.max_execution_ms,
    };
    ExecutionReport::from_failure(error, metrics)
}

fn invoke(
    store: &mut Store<InstanceData>,
    instance: Instance,
    memory: Option<Memory>,
    func: Func,
    payload: Payload,
) -> Result<Value, SandboxError> {
    let fty = func.ty(&*store);
    match payload {
        Payload::Value(value) => invoke_linear(store, instance, memory, func, &fty, value),
        direct => invoke_direct(store, func, &fty, &direct),
    }
}

fn invoke_direct(
    store: &mut Store<InstanceData>,
    func: Func,
    fty: &FuncType,
    payload: &Payload,
) -> Result<Value, SandboxError> {
    let params: Vec<ValType> = fty.params().collect();
    let numbers = payload.direct_numbers();

    let mut args = Vec::with_capacity(numbers.len().min(params.len()));
    for (number, ty) in numbers.iter().zip(params.iter()) {
        match val_for(ty, *number) {
            Some(val) => args.push(val),
            None => {
                return Err(SandboxError::trap(
                    TrapKind::RuntimeError,
                    format!("parameter type {ty} cannot be passed directly"),
                ))
            }
        }
    }

    let mut results = vec![Val::I32(0); fty.results().len()];
    func.call(&mut *store, &args, &mut results)
        .map_err(classify_call_error)?;
    Ok(vals_to_json(&results))
}

fn invoke_linear(
    store: &mut Store<InstanceData>,
    instance: Instance,
    memory: Option<Memory>,
    func: Func,
    fty: &FuncType,
    value: Value,
) -> Result<Value, SandboxError> {
    let Some(memory) = memory else {
        return Err(SandboxError::trap(
            TrapKind::RuntimeError,
            "no linear memory for payload marshalling",
        ));
    };

    let bytes = serde_json::to_vec(&value).map_err(|e| {
        SandboxError::trap(TrapKind::RuntimeError, format!("payload serialization failed: {e}"))
    })?;

    let alloc = instance
        .get_typed_func::<i32, i32>(&mut *store, ALLOC_EXPORT)
        .map_err(|_| {
            SandboxError::trap(
                TrapKind::RuntimeError,
                format!("linear-memory payloads require an '{ALLOC_EXPORT}' export"),
            )
        })?;
    let ptr = alloc
        .call(&mut *store, bytes.len() as i32)
        .map_err(classify_call_error)?;

    write_bytes(&memory, &mut *store, ptr as u32 as usize, &bytes)
        .map_err(|e| SandboxError::trap(TrapKind::RuntimeError, e.to_string()))?;

    let args = [Val::I32(ptr), Val::I32(bytes.len() as i32)];
    let mut results = vec![Val::I32(0); fty.results().len()];
    func.call(&mut *store, &args, &mut results)
        .map_err(classify_call_error)?;

    // Result packing: pointer in the low 16 bits, length in the upper 16.
    match results.first() {
        Some(Val::I32(packed)) => {
            let packed = *packed as u32;
            let out_ptr = (packed & 0xFFFF) as usize;
            let out_len = ((packed >> 16) & 0xFFFF) as usize;
            if out_len == 0 {
                return Ok(Value::Null);
            }
            let raw = read_bytes(&memory, &*store, out_ptr, out_len)
                .map_err(|e| SandboxError::trap(TrapKind::RuntimeError, e.to_string()))?;
            serde_json::from_slice(&raw).map_err(|e| {
                SandboxError::trap(TrapKind::RuntimeError, format!("result JSON is invalid: {e}"))
            })
        }
        _ => Ok(Value::Null),
    }
}

/// Convert a failed call into the typed taxonomy. Resource signals raised
/// inside host wrappers take precedence; everything else, including host
/// handler failures at this boundary, is a runtime trap.
fn classify_call_error(err: wasmtime::Error) -> SandboxError {
    if let Some(gas) = err.downcast_ref::<GasExhausted>() {
        return SandboxError::GasExhausted {
            gas_used: gas.gas_used,
            gas_limit: gas.gas_limit,
        };
    }
    if let Some(deadline) = err.downcast_ref::<DeadlineExceeded>() {
        return SandboxError::Timeout {
            elapsed_ms: deadline.elapsed_ms,
            limit_ms: deadline.limit_ms,
        };
    }

    let message = match err.downcast_ref::<wasmtime::Trap>() {
        Some(trap) => trap.to_string(),
        None => format!("{err:#}"),
    };
    SandboxError::trap(TrapKind::RuntimeError, message)
}
