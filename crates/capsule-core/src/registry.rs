//! The instance registry.
//!
//! Owns every instance's mutable state behind an opaque [`InstanceId`]
//! handle and implements the public sandbox operations. Instances live in
//! individual mutexes so operations on distinct instances never contend;
//! destroyed instances stay in the map so later operations fail with the
//! destroyed error rather than an unknown-instance miss.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use capsule_determinism::ImportPolicy;
use capsule_host::{HostError, HostFunction, HostFunctionFailure, ImportTable};
use capsule_observe::{EventDispatcher, ResourceMetrics, SandboxEvent};
use capsule_resource::TimeSourceFn;
use capsule_snapshot::{decode, encode, SnapshotState};
use parking_lot::{Mutex, RwLock};
use tracing::info;

use crate::config::SandboxConfig;
use crate::error::{SandboxError, SandboxResult, TrapKind};
use crate::executor::{self, ExecutionReport};
use crate::instance::{InstanceId, InstanceStatus, InternalState, SandboxInstance};
use crate::loader::ModuleLoader;
use crate::payload::Payload;
use crate::SharedEngine;

/// Registry of sandbox instances.
pub struct SandboxRegistry {
    engine: SharedEngine,
    loader: ModuleLoader,
    instances: RwLock<HashMap<InstanceId, Arc<Mutex<InternalState>>>>,
    next_id: AtomicU64,
    events: Arc<EventDispatcher>,
}

impl SandboxRegistry {
    /// Create a registry over the shared engine.
    pub fn new(engine: SharedEngine) -> Self {
        Self::with_events(engine, Arc::new(EventDispatcher::new()))
    }

    /// Create a registry that emits lifecycle events to `events`.
    pub fn with_events(engine: SharedEngine, events: Arc<EventDispatcher>) -> Self {
        Self {
            loader: ModuleLoader::new(Arc::clone(&engine)),
            engine,
            instances: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            events,
        }
    }

    /// The event dispatcher this registry emits to.
    pub fn events(&self) -> &Arc<EventDispatcher> {
        &self.events
    }

    /// Number of instances, destroyed ones included.
    pub fn instance_count(&self) -> usize {
        self.instances.read().len()
    }

    fn lookup(&self, id: InstanceId) -> SandboxResult<Arc<Mutex<InternalState>>> {
        self.instances
            .read()
            .get(&id)
            .cloned()
            .ok_or(SandboxError::UnknownInstance { id })
    }

    /// Validate the configuration and allocate a fresh instance.
    pub fn create(&self, config: SandboxConfig) -> SandboxResult<SandboxInstance> {
        config.validate()?;

        let id = InstanceId::from_index(self.next_id.fetch_add(1, Ordering::Relaxed));
        let state = InternalState::create(self.engine.inner(), id, config)?;
        let projection = state.projection();

        self.instances.write().insert(id, Arc::new(Mutex::new(state)));
        self.events.emit(SandboxEvent::InstanceCreated { id: id.to_string() });
        info!(%id, "Created sandbox instance");

        Ok(projection)
    }

    /// Validate, compile, wire, and instantiate a module.
    pub fn load(&self, id: InstanceId, bytes: &[u8]) -> SandboxResult<()> {
        let slot = self.lookup(id)?;
        let mut guard = slot.lock();
        let state = &mut *guard;

        match state.status {
            InstanceStatus::Created => {}
            InstanceStatus::Destroyed => {
                return Err(SandboxError::InstanceDestroyed { id });
            }
            other => {
                return Err(SandboxError::trap(
                    TrapKind::InvalidState,
                    format!("load requires status 'created', status is '{other}'"),
                ));
            }
        }

        let policy = ImportPolicy::new(state.config.host_functions.keys().cloned());
        let loaded = self.loader.load(bytes, &policy)?;

        let (Some(store), Some(memory)) = (state.store.as_mut(), state.memory) else {
            return Err(SandboxError::trap(
                TrapKind::NoInstance,
                "instance has no store or memory",
            ));
        };

        let mut table = ImportTable::new(self.engine.inner());
        table
            .define_memory(&*store, memory)
            .map_err(wiring_error)?;
        table.bind_system().map_err(wiring_error)?;
        let functions: Vec<&HostFunction> = state.config.host_functions.values().collect();
        table
            .bind_host_functions(self.engine.inner(), functions)
            .map_err(wiring_error)?;

        let instance = table
            .instantiate(&mut *store, &loaded.module)
            .map_err(classify_instantiation_error)?;

        state.metrics.memory_used_bytes = memory.data_size(&*store) as u64;
        state.module = Some(loaded.module);
        state.instance = Some(instance);
        state.import_report = Some(loaded.report);
        state.status = InstanceStatus::Loaded;

        self.events.emit(SandboxEvent::ModuleLoaded {
            id: id.to_string(),
            import_count: loaded.report.total,
            host_function_imports: loaded.report.host_functions,
        });
        info!(%id, imports = loaded.report.total, "Module loaded");

        Ok(())
    }

    /// Execute an exported function. Never raises; failures come back
    /// inside the report.
    pub fn execute(&self, id: InstanceId, action: &str, payload: Payload) -> ExecutionReport {
        self.execute_inner(id, action, payload, None)
    }

    /// Execute with an injected time source for the deadline checker.
    pub fn execute_with_timer(
        &self,
        id: InstanceId,
        action: &str,
        payload: Payload,
        timer: TimeSourceFn,
    ) -> ExecutionReport {
        self.execute_inner(id, action, payload, Some(timer))
    }

    fn execute_inner(
        &self,
        id: InstanceId,
        action: &str,
        payload: Payload,
        timer: Option<TimeSourceFn>,
    ) -> ExecutionReport {
        let slot = match self.lookup(id) {
            Ok(slot) => slot,
            Err(_) => {
                return ExecutionReport::from_failure(
                    SandboxError::InstanceDestroyed { id },
                    ResourceMetrics::default(),
                );
            }
        };

        self.events.emit(SandboxEvent::ExecutionStarted {
            id: id.to_string(),
            action: action.to_string(),
        });

        let mut state = slot.lock();
        let report = executor::execute(&mut state, action, payload, timer);

        self.events.emit(SandboxEvent::ExecutionCompleted {
            id: id.to_string(),
            action: action.to_string(),
            success: report.is_success(),
            gas_used: report.gas_used,
            duration_ms: report.duration_ms,
        });

        report
    }

    /// Suspend a loaded instance.
    pub fn suspend(&self, id: InstanceId) -> SandboxResult<()> {
        let slot = self.lookup(id)?;
        let mut state = slot.lock();

        match state.status {
            InstanceStatus::Loaded => {
                state.status = InstanceStatus::Suspended;
                self.events
                    .emit(SandboxEvent::InstanceSuspended { id: id.to_string() });
                Ok(())
            }
            InstanceStatus::Destroyed => Err(SandboxError::InstanceDestroyed { id }),
            other => Err(SandboxError::trap(
                TrapKind::InvalidState,
                format!("suspend requires status 'loaded', status is '{other}'"),
            )),
        }
    }

    /// Destroy an instance. Idempotent; a miss is a no-op.
    pub fn destroy(&self, id: InstanceId) {
        if let Ok(slot) = self.lookup(id) {
            let mut state = slot.lock();
            if state.status != InstanceStatus::Destroyed {
                state.destroy();
                self.events
                    .emit(SandboxEvent::InstanceDestroyed { id: id.to_string() });
                info!(%id, "Destroyed sandbox instance");
            }
        }
    }

    /// Serialize complete execution state into the versioned snapshot
    /// format.
    pub fn snapshot(&self, id: InstanceId) -> SandboxResult<Vec<u8>> {
        let slot = self.lookup(id)?;
        let state = slot.lock();

        if state.status == InstanceStatus::Destroyed {
            return Err(SandboxError::Snapshot {
                reason: format!("instance '{id}' is destroyed"),
            });
        }
        if !state.status.can_snapshot() {
            return Err(SandboxError::Snapshot {
                reason: format!(
                    "snapshot requires status 'loaded' or 'suspended', status is '{}'",
                    state.status
                ),
            });
        }

        let (Some(store), Some(memory)) = (state.store.as_ref(), state.memory) else {
            return Err(SandboxError::Snapshot {
                reason: "instance has no linear memory to serialize".to_string(),
            });
        };

        let data = store.data();
        let snapshot_state = SnapshotState {
            prng_state: data.prng.state(),
            timestamp: data.timestamp,
            gas_used: state.metrics.gas_used,
        };

        let bytes = encode(memory.data(store), &snapshot_state).map_err(|e| {
            SandboxError::Snapshot {
                reason: e.to_string(),
            }
        })?;

        self.events.emit(SandboxEvent::SnapshotTaken {
            id: id.to_string(),
            bytes: bytes.len(),
        });

        Ok(bytes)
    }

    /// Validate a snapshot and restore it into the instance. Any
    /// validation failure leaves the instance untouched.
    pub fn restore(&self, id: InstanceId, bytes: &[u8]) -> SandboxResult<()> {
        let slot = self.lookup(id)?;
        let mut guard = slot.lock();
        let state = &mut *guard;

        if state.status == InstanceStatus::Destroyed {
            return Err(SandboxError::Snapshot {
                reason: format!("instance '{id}' is destroyed"),
            });
        }
        if !state.status.can_snapshot() {
            return Err(SandboxError::Snapshot {
                reason: format!(
                    "restore requires status 'loaded' or 'suspended', status is '{}'",
                    state.status
                ),
            });
        }

        let snapshot = decode(bytes).map_err(|e| SandboxError::Snapshot {
            reason: e.to_string(),
        })?;

        let (Some(store), Some(memory)) = (state.store.as_mut(), state.memory) else {
            return Err(SandboxError::Snapshot {
                reason: "instance has no linear memory to restore into".to_string(),
            });
        };

        let live_len = memory.data_size(&*store);
        if snapshot.memory.len() != live_len {
            return Err(SandboxError::Snapshot {
                reason: format!(
                    "memory size mismatch: snapshot has {} bytes, instance memory is {} bytes",
                    snapshot.memory.len(),
                    live_len
                ),
            });
        }

        memory
            .data_mut(&mut *store)
            .copy_from_slice(&snapshot.memory);
        let data = store.data_mut();
        data.prng.set_state(snapshot.state.prng_state);
        data.timestamp = snapshot.state.timestamp;
        state.metrics.gas_used = snapshot.state.gas_used;
        state.status = InstanceStatus::Loaded;

        self.events
            .emit(SandboxEvent::SnapshotRestored { id: id.to_string() });
        info!(%id, "Snapshot restored");

        Ok(())
    }

    /// Current metrics for an instance.
    pub fn metrics(&self, id: InstanceId) -> SandboxResult<ResourceMetrics> {
        let slot = self.lookup(id)?;
        let state = slot.lock();
        if state.status == InstanceStatus::Destroyed {
            return Err(SandboxError::InstanceDestroyed { id });
        }
        Ok(state.metrics)
    }

    /// Read-only projection of an instance, destroyed ones included.
    pub fn get(&self, id: InstanceId) -> SandboxResult<SandboxInstance> {
        let slot = self.lookup(id)?;
        let state = slot.lock();
        Ok(state.projection())
    }
}

impl std::fmt::Debug for SandboxRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SandboxRegistry")
            .field("instances", &self.instance_count())
            .finish()
    }
}

/// Wiring failures are configuration problems, not module problems.
fn wiring_error(err: HostError) -> SandboxError {
    SandboxError::InvalidConfig {
        reason: err.to_string(),
    }
}

/// Classify an instantiation failure: a typed host-function failure
/// anywhere in the chain wins; everything else is a module problem.
fn classify_instantiation_error(err: wasmtime::Error) -> SandboxError {
    if let Some(failure) = err.downcast_ref::<HostFunctionFailure>() {
        return SandboxError::HostFunction {
            function: failure.function.clone(),
            message: failure.message.clone(),
        };
    }
    SandboxError::InvalidModule {
        reason: format!("instantiation failed: {err:#}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{CapsuleEngine, IntoShared};
    use crate::error::TrapKind;
    use serde_json::json;
    use wasmtime::{Val, ValType};

    const ADD_WAT: &str = r#"
        (module
            (func (export "add") (param i32 i32) (result i32)
                local.get 0
                local.get 1
                i32.add
            )
        )
    "#;

    const FIB_WAT: &str = r#"
        (module
            (import "env" "__get_time" (func $time (result i32)))
            (func (export "fib") (param $n i32) (result i32)
                (local $i i32) (local $a i32) (local $b i32) (local $t i32)
                (local.set $b (i32.const 1))
                (block $done
                    (loop $loop
                        (br_if $done (i32.gt_s (local.get $i) (local.get $n)))
                        (drop (call $time))
                        (local.set $t (i32.add (local.get $a) (local.get $b)))
                        (local.set $b (local.get $a))
                        (local.set $a (local.get $t))
                        (local.set $i (i32.add (local.get $i) (i32.const 1)))
                        (br $loop)
                    )
                )
                (local.get $b)
            )
        )
    "#;

    const SPIN_WAT: &str = r#"
        (module
            (import "env" "__get_time" (func $time (result i32)))
            (func (export "loop")
                (loop $l (drop (call $time)) (br $l))
            )
        )
    "#;

    const GROW_WAT: &str = r#"
        (module
            (import "env" "memory" (memory 1))
            (func (export "allocate") (param $pages i32) (result i32)
                (memory.grow (local.get $pages))
            )
        )
    "#;

    const RANDOM_WAT: &str = r#"
        (module
            (import "env" "__get_random" (func $rand (result i32)))
            (func (export "getRandom") (result i32) (call $rand))
        )
    "#;

    const ECHO_WAT: &str = r#"
        (module
            (import "env" "memory" (memory 1))
            (global $next (mut i32) (i32.const 1024))
            (func (export "__alloc") (param $size i32) (result i32)
                (local $ptr i32)
                (local.set $ptr (global.get $next))
                (global.set $next (i32.add (global.get $next) (local.get $size)))
                (local.get $ptr)
            )
            (func (export "echo") (param $ptr i32) (param $len i32) (result i32)
                (i32.or (local.get $ptr) (i32.shl (local.get $len) (i32.const 16)))
            )
        )
    "#;

    fn registry() -> SandboxRegistry {
        SandboxRegistry::new(CapsuleEngine::default_engine().unwrap().into_shared())
    }

    fn wasm(wat: &str) -> Vec<u8> {
        wat::parse_str(wat).unwrap()
    }

    fn loaded(registry: &SandboxRegistry, config: SandboxConfig, wat: &str) -> InstanceId {
        let instance = registry.create(config).unwrap();
        registry.load(instance.id, &wasm(wat)).unwrap();
        instance.id
    }

    /// A time source that advances `step` ms on every read.
    fn stepping_timer(step: u64) -> TimeSourceFn {
        let clock = AtomicU64::new(0);
        Arc::new(move || clock.fetch_add(step, Ordering::Relaxed))
    }

    #[test]
    fn test_ids_are_monotonic() {
        let registry = registry();
        let a = registry.create(SandboxConfig::new(0)).unwrap();
        let b = registry.create(SandboxConfig::new(0)).unwrap();
        assert_eq!(a.id.to_string(), "sandbox-0");
        assert_eq!(b.id.to_string(), "sandbox-1");
    }

    #[test]
    fn test_create_rejects_invalid_config() {
        let registry = registry();
        let err = registry
            .create(SandboxConfig::new(0).with_memory_limit(0))
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_CONFIG");
    }

    #[test]
    fn test_pure_add() {
        let registry = registry();
        let id = loaded(&registry, SandboxConfig::new(0), ADD_WAT);

        let report = registry.execute(id, "add", Payload::Ints(vec![3, 7]));
        assert_eq!(report.value(), Some(&json!(10)));
        assert_eq!(report.gas_used, 0);
        assert_eq!(report.metrics.gas_used, 0);
    }

    #[test]
    fn test_fib_within_gas_budget() {
        let registry = registry();
        let config = SandboxConfig::new(0).with_gas_limit(1_000_000);
        let id = loaded(&registry, config, FIB_WAT);

        let report = registry.execute(id, "fib", Payload::Int(20));
        assert_eq!(report.value(), Some(&json!(6765)), "{:?}", report.error());
        assert_eq!(report.gas_used, 21);
    }

    #[test]
    fn test_fib_gas_exhaustion() {
        let registry = registry();
        let config = SandboxConfig::new(0).with_gas_limit(50);
        let id = loaded(&registry, config, FIB_WAT);

        let report = registry.execute(id, "fib", Payload::Int(100));
        match report.error().unwrap() {
            SandboxError::GasExhausted { gas_used, gas_limit } => {
                assert!(*gas_used > 50);
                assert_eq!(*gas_limit, 50);
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(report.metrics.gas_used > 50);
        // The instance returns to loaded and can run again.
        let report = registry.execute(id, "fib", Payload::Int(5));
        assert_eq!(report.value(), Some(&json!(5)));
    }

    #[test]
    fn test_deadline_fires_at_host_call_boundary() {
        let registry = registry();
        let config = SandboxConfig::new(0)
            .with_gas_limit(1_000_000_000)
            .with_execution_limit_ms(100);
        let id = loaded(&registry, config, SPIN_WAT);

        let report =
            registry.execute_with_timer(id, "loop", Payload::Null, stepping_timer(60));
        match report.error().unwrap() {
            SandboxError::Timeout { elapsed_ms, limit_ms } => {
                assert!(*elapsed_ms >= 100);
                assert_eq!(*limit_ms, 100);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_memory_cap_below_page_boundary() {
        let registry = registry();
        let config = SandboxConfig::new(0).with_memory_limit(100_000);
        let id = loaded(&registry, config, GROW_WAT);

        let report = registry.execute(id, "allocate", Payload::Int(1));
        match report.error().unwrap() {
            SandboxError::MemoryExceeded { memory_used, memory_limit } => {
                assert!(*memory_used > 100_000);
                assert_eq!(*memory_limit, 100_000);
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(report.metrics.memory_used_bytes, 131_072);
    }

    #[test]
    fn test_growth_beyond_page_ceiling_is_denied_by_engine() {
        let registry = registry();
        let config = SandboxConfig::new(0).with_memory_limit(100_000);
        let id = loaded(&registry, config, GROW_WAT);

        // The page ceiling is 2; asking for 10 more pages fails inside the
        // guest (memory.grow returns -1) and memory stays at one page.
        let report = registry.execute(id, "allocate", Payload::Int(10));
        assert_eq!(report.value(), Some(&json!(-1)));
        assert_eq!(report.metrics.memory_used_bytes, 65_536);
    }

    #[test]
    fn test_wasi_import_rejected_at_load() {
        let registry = registry();
        let instance = registry.create(SandboxConfig::new(0)).unwrap();
        let bytes = wasm(
            r#"
            (module
                (import "wasi_snapshot_preview1" "fd_write"
                    (func (param i32 i32 i32 i32) (result i32)))
                (func (export "main"))
            )
        "#,
        );

        let err = registry.load(instance.id, &bytes).unwrap_err();
        assert_eq!(err.code(), "INVALID_MODULE");
        let message = err.to_string();
        assert!(message.contains("wasi_snapshot_preview1"));
        assert!(message.contains("blocked"));
    }

    #[test]
    fn test_snapshot_round_trip_with_prng() {
        let registry = registry();
        let config = SandboxConfig::new(0).with_seed(12345);
        let id = loaded(&registry, config, RANDOM_WAT);

        let r1 = registry.execute(id, "getRandom", Payload::Null);
        let snap = registry.snapshot(id).unwrap();
        let r2 = registry.execute(id, "getRandom", Payload::Null);
        let _discarded = registry.execute(id, "getRandom", Payload::Null);

        registry.restore(id, &snap).unwrap();
        let r3 = registry.execute(id, "getRandom", Payload::Null);

        assert_eq!(r3.value(), r2.value());
        assert_ne!(r3.value(), r1.value());
    }

    #[test]
    fn test_twin_instances_are_deterministic() {
        let registry = registry();
        let make = || {
            loaded(
                &registry,
                SandboxConfig::new(42).with_seed(777),
                RANDOM_WAT,
            )
        };
        let a = make();
        let b = make();

        for _ in 0..100 {
            let left = registry.execute(a, "getRandom", Payload::Null);
            let right = registry.execute(b, "getRandom", Payload::Null);
            assert_eq!(left.value().unwrap(), right.value().unwrap());
        }
    }

    #[test]
    fn test_injected_time_is_fixed() {
        let registry = registry();
        let config = SandboxConfig::new(9_999);
        let id = loaded(
            &registry,
            config,
            r#"
            (module
                (import "env" "__get_time" (func $t (result i32)))
                (func (export "now") (result i32) (call $t))
            )
        "#,
        );

        for _ in 0..3 {
            let report = registry.execute(id, "now", Payload::Null);
            assert_eq!(report.value(), Some(&json!(9_999)));
        }
    }

    #[test]
    fn test_host_function_round_trip_and_gas() {
        let registry = registry();
        let config = SandboxConfig::new(0).with_host_function(HostFunction::new(
            "mul3",
            vec![ValType::I32],
            vec![ValType::I32],
            |params| Ok(vec![Val::I32(params[0].unwrap_i32() * 3)]),
        ));
        let id = loaded(
            &registry,
            config,
            r#"
            (module
                (import "env" "mul3" (func $m (param i32) (result i32)))
                (func (export "run") (param i32) (result i32)
                    (call $m (local.get 0))
                )
            )
        "#,
        );

        let report = registry.execute(id, "run", Payload::Int(14));
        assert_eq!(report.value(), Some(&json!(42)));
        assert_eq!(report.gas_used, 1);
    }

    #[test]
    fn test_host_failure_during_execute_is_runtime_trap() {
        let registry = registry();
        let config = SandboxConfig::new(0).with_host_function(HostFunction::new(
            "boom",
            vec![],
            vec![],
            |_| Err(anyhow::anyhow!("upstream unavailable")),
        ));
        let id = loaded(
            &registry,
            config,
            r#"
            (module
                (import "env" "boom" (func $b))
                (func (export "run") (call $b))
            )
        "#,
        );

        let report = registry.execute(id, "run", Payload::Null);
        match report.error().unwrap() {
            SandboxError::WasmTrap { kind, message } => {
                assert_eq!(*kind, TrapKind::RuntimeError);
                assert!(message.contains("boom"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_host_failure_during_instantiation_is_host_function_error() {
        let registry = registry();
        let config = SandboxConfig::new(0).with_host_function(HostFunction::new(
            "boom",
            vec![],
            vec![],
            |_| Err(anyhow::anyhow!("no start for you")),
        ));
        let instance = registry.create(config).unwrap();
        let bytes = wasm(
            r#"
            (module
                (import "env" "boom" (func $b))
                (start $s)
                (func $s (call $b))
            )
        "#,
        );

        let err = registry.load(instance.id, &bytes).unwrap_err();
        match err {
            SandboxError::HostFunction { function, message } => {
                assert_eq!(function, "boom");
                assert!(message.contains("no start for you"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_linear_memory_payload_round_trip() {
        let registry = registry();
        let id = loaded(&registry, SandboxConfig::new(0), ECHO_WAT);

        let payload = json!({"series": [1, 2, 3], "label": "demo"});
        let report = registry.execute(id, "echo", Payload::Value(payload.clone()));
        assert_eq!(report.value(), Some(&payload), "{:?}", report.error());
    }

    #[test]
    fn test_linear_memory_payload_requires_alloc_export() {
        let registry = registry();
        let id = loaded(&registry, SandboxConfig::new(0), ADD_WAT);

        let report = registry.execute(id, "add", Payload::Value(json!([1, 2])));
        match report.error().unwrap() {
            SandboxError::WasmTrap { kind, message } => {
                assert_eq!(*kind, TrapKind::RuntimeError);
                assert!(message.contains("__alloc"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_execute_on_unknown_instance() {
        let registry = registry();
        let report = registry.execute(InstanceId::from_index(404), "add", Payload::Null);
        assert_eq!(report.error().unwrap().code(), "INSTANCE_DESTROYED");
    }

    #[test]
    fn test_execute_before_load_is_invalid_state() {
        let registry = registry();
        let instance = registry.create(SandboxConfig::new(0)).unwrap();

        let report = registry.execute(instance.id, "add", Payload::Null);
        match report.error().unwrap() {
            SandboxError::WasmTrap { kind, .. } => assert_eq!(*kind, TrapKind::InvalidState),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_missing_export() {
        let registry = registry();
        let id = loaded(&registry, SandboxConfig::new(0), ADD_WAT);

        let report = registry.execute(id, "does_not_exist", Payload::Null);
        match report.error().unwrap() {
            SandboxError::WasmTrap { kind, .. } => assert_eq!(*kind, TrapKind::MissingExport),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_wasm_trap_surfaces_as_runtime_error() {
        let registry = registry();
        let id = loaded(
            &registry,
            SandboxConfig::new(0),
            r#"
            (module
                (func (export "crash") unreachable)
            )
        "#,
        );

        let report = registry.execute(id, "crash", Payload::Null);
        match report.error().unwrap() {
            SandboxError::WasmTrap { kind, .. } => assert_eq!(*kind, TrapKind::RuntimeError),
            other => panic!("unexpected: {other:?}"),
        }
        // Status is restored; the instance still works.
        assert_eq!(registry.get(id).unwrap().status, InstanceStatus::Loaded);
    }

    #[test]
    fn test_destroy_is_idempotent() {
        let registry = registry();
        let id = loaded(&registry, SandboxConfig::new(0), ADD_WAT);

        registry.destroy(id);
        registry.destroy(id);
        registry.destroy(InstanceId::from_index(404));

        assert_eq!(registry.get(id).unwrap().status, InstanceStatus::Destroyed);
        let report = registry.execute(id, "add", Payload::Null);
        assert_eq!(report.error().unwrap().code(), "INSTANCE_DESTROYED");
        assert_eq!(
            registry.metrics(id).unwrap_err().code(),
            "INSTANCE_DESTROYED"
        );
    }

    #[test]
    fn test_unknown_instance_raises_on_lifecycle_ops() {
        let registry = registry();
        let ghost = InstanceId::from_index(404);
        assert_eq!(registry.load(ghost, &[]).unwrap_err().code(), "UNKNOWN_INSTANCE");
        assert_eq!(registry.metrics(ghost).unwrap_err().code(), "UNKNOWN_INSTANCE");
        assert_eq!(registry.snapshot(ghost).unwrap_err().code(), "UNKNOWN_INSTANCE");
    }

    #[test]
    fn test_load_twice_is_invalid_state() {
        let registry = registry();
        let id = loaded(&registry, SandboxConfig::new(0), ADD_WAT);
        let err = registry.load(id, &wasm(ADD_WAT)).unwrap_err();
        match err {
            SandboxError::WasmTrap { kind, .. } => assert_eq!(kind, TrapKind::InvalidState),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_snapshot_header_and_memory_length() {
        let registry = registry();
        let id = loaded(&registry, SandboxConfig::new(0), ADD_WAT);

        let snap = registry.snapshot(id).unwrap();
        assert_eq!(&snap[0..4], b"WSNP");
        assert_eq!(snap[4], 0x01);
        let memory_len = u32::from_le_bytes([snap[5], snap[6], snap[7], snap[8]]);
        assert_eq!(memory_len, 65_536);
    }

    #[test]
    fn test_snapshot_requires_loaded_or_suspended() {
        let registry = registry();
        let instance = registry.create(SandboxConfig::new(0)).unwrap();
        let err = registry.snapshot(instance.id).unwrap_err();
        assert_eq!(err.code(), "SNAPSHOT_ERROR");

        registry.destroy(instance.id);
        let err = registry.snapshot(instance.id).unwrap_err();
        assert!(err.to_string().contains("destroyed"));
    }

    #[test]
    fn test_suspend_then_restore() {
        let registry = registry();
        let config = SandboxConfig::new(0).with_seed(7);
        let id = loaded(&registry, config, RANDOM_WAT);

        let snap = registry.snapshot(id).unwrap();
        registry.suspend(id).unwrap();
        assert_eq!(registry.get(id).unwrap().status, InstanceStatus::Suspended);

        // Suspended instances cannot execute but can restore.
        let report = registry.execute(id, "getRandom", Payload::Null);
        assert_eq!(report.error().unwrap().code(), "WASM_TRAP");

        registry.restore(id, &snap).unwrap();
        assert_eq!(registry.get(id).unwrap().status, InstanceStatus::Loaded);
    }

    #[test]
    fn test_restore_rejects_bad_magic_and_version() {
        let registry = registry();
        let id = loaded(&registry, SandboxConfig::new(0), ADD_WAT);
        let mut snap = registry.snapshot(id).unwrap();

        let mut bad_magic = snap.clone();
        bad_magic[0] = b'X';
        let err = registry.restore(id, &bad_magic).unwrap_err();
        assert!(err.to_string().contains("magic"));

        snap[4] = 0x02;
        let err = registry.restore(id, &snap).unwrap_err();
        assert!(err.to_string().contains("version"));
    }

    #[test]
    fn test_restore_rejects_memory_size_mismatch() {
        let registry = registry();
        // Exactly two pages, so growth to 131072 bytes is within the cap.
        let config = SandboxConfig::new(0).with_memory_limit(131_072);
        let id = loaded(
            &registry,
            config,
            r#"
            (module
                (import "env" "memory" (memory 1))
                (func (export "allocate") (param i32) (result i32)
                    (memory.grow (local.get 0))
                )
            )
        "#,
        );

        let snap = registry.snapshot(id).unwrap();
        let report = registry.execute(id, "allocate", Payload::Int(1));
        assert!(report.is_success());

        let err = registry.restore(id, &snap).unwrap_err();
        assert!(err.to_string().contains("memory size"));
        // The failed restore left the grown memory in place.
        assert_eq!(registry.metrics(id).unwrap().memory_used_bytes, 131_072);
    }

    #[test]
    fn test_restore_carries_gas_and_timestamp() {
        let registry = registry();
        let config = SandboxConfig::new(5_000).with_gas_limit(100);
        let id = loaded(&registry, config, FIB_WAT);

        let report = registry.execute(id, "fib", Payload::Int(9));
        assert_eq!(report.gas_used, 10);

        let snap = registry.snapshot(id).unwrap();
        let _ = registry.execute(id, "fib", Payload::Int(3));

        registry.restore(id, &snap).unwrap();
        assert_eq!(registry.metrics(id).unwrap().gas_used, 10);
    }

    #[test]
    fn test_metrics_populated_after_execution() {
        let registry = registry();
        let config = SandboxConfig::new(0)
            .with_gas_limit(500)
            .with_memory_limit(1024 * 1024)
            .with_execution_limit_ms(2_000);
        let id = loaded(&registry, config, FIB_WAT);

        let report = registry.execute(id, "fib", Payload::Int(4));
        assert_eq!(report.metrics.gas_limit, 500);
        assert_eq!(report.metrics.memory_limit_bytes, 1024 * 1024);
        assert_eq!(report.metrics.execution_limit_ms, 2_000);
        assert_eq!(report.metrics.memory_used_bytes, 65_536);
        assert_eq!(registry.metrics(id).unwrap(), report.metrics);
    }

    #[test]
    fn test_events_are_emitted() {
        use capsule_observe::{CollectingSubscriber, EventSubscriber};

        let registry = registry();
        let collector = Arc::new(CollectingSubscriber::new(100));
        registry
            .events()
            .subscribe(Arc::clone(&collector) as Arc<dyn EventSubscriber>);

        let id = loaded(&registry, SandboxConfig::new(0), ADD_WAT);
        registry.execute(id, "add", Payload::Ints(vec![1, 2]));
        registry.destroy(id);

        let kinds: Vec<&'static str> = collector
            .events()
            .iter()
            .map(|e| e.event_type())
            .collect();
        assert_eq!(
            kinds,
            vec![
                "instance_created",
                "module_loaded",
                "execution_started",
                "execution_completed",
                "instance_destroyed",
            ]
        );
    }
}
