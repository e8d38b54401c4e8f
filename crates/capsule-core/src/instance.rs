//! Instance identity, lifecycle, and internal state.

use capsule_determinism::{ImportReport, Mulberry32};
use capsule_host::SandboxState;
use capsule_observe::ResourceMetrics;
use capsule_resource::{ExecutionContext, WASM_PAGE_SIZE};
use tracing::debug;
use wasmtime::{Engine, Instance, Memory, MemoryType, Module, Store, StoreLimits, StoreLimitsBuilder};

use crate::config::SandboxConfig;
use crate::error::{SandboxError, SandboxResult};

/// Stable identifier for a sandbox instance.
///
/// Issued monotonically; displays as `sandbox-<n>` so logs and error
/// messages stay reproducible across runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(u64);

impl InstanceId {
    /// Build an id from its index.
    pub fn from_index(index: u64) -> Self {
        Self(index)
    }

    /// The numeric index of this id.
    pub fn index(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sandbox-{}", self.0)
    }
}

/// Lifecycle status of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceStatus {
    /// Created, memory allocated, no module yet.
    Created,
    /// Module instantiated; the only state permitting execute/snapshot/restore.
    Loaded,
    /// An execution is in flight.
    Running,
    /// Externally suspended; restorable.
    Suspended,
    /// Terminal.
    Destroyed,
}

impl InstanceStatus {
    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceStatus::Created => "created",
            InstanceStatus::Loaded => "loaded",
            InstanceStatus::Running => "running",
            InstanceStatus::Suspended => "suspended",
            InstanceStatus::Destroyed => "destroyed",
        }
    }

    /// Whether `execute()` is permitted from this status.
    pub fn can_execute(&self) -> bool {
        matches!(self, InstanceStatus::Loaded | InstanceStatus::Running)
    }

    /// Whether `snapshot()`/`restore()` are permitted from this status.
    pub fn can_snapshot(&self) -> bool {
        matches!(self, InstanceStatus::Loaded | InstanceStatus::Suspended)
    }

    /// The lifecycle state machine.
    pub fn can_transition_to(&self, next: InstanceStatus) -> bool {
        use InstanceStatus::*;
        matches!(
            (self, next),
            (Created, Loaded)
                | (Created, Destroyed)
                | (Loaded, Running)
                | (Loaded, Suspended)
                | (Loaded, Destroyed)
                | (Running, Loaded)
                | (Suspended, Loaded)
                | (Suspended, Destroyed)
        )
    }
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Data owned by the wasmtime store.
///
/// This is where host bindings reach the sandbox at call time: the PRNG,
/// the injected timestamp, and the per-execution context the executor
/// attaches before each call.
pub struct InstanceData {
    /// The owning instance.
    pub id: InstanceId,
    /// Store-level resource ceilings.
    pub limits: StoreLimits,
    /// The instance's seeded PRNG.
    pub prng: Mulberry32,
    /// The injected timestamp, milliseconds since epoch.
    pub timestamp: u64,
    /// Per-execution resource context; `None` outside `execute()`.
    pub context: Option<ExecutionContext>,
}

impl SandboxState for InstanceData {
    fn charge_host_call(&mut self) -> Result<(), wasmtime::Error> {
        if let Some(ctx) = self.context.as_mut() {
            ctx.gas.charge_host_call().map_err(wasmtime::Error::new)?;
            ctx.deadline.check().map_err(wasmtime::Error::new)?;
        }
        Ok(())
    }

    fn injected_timestamp(&self) -> u64 {
        self.timestamp
    }

    fn next_random(&mut self) -> u32 {
        self.prng.next_u32()
    }

    fn record_host_failure(&mut self, function: &str, message: &str) {
        if let Some(ctx) = self.context.as_mut() {
            ctx.record_host_failure(function, message);
        }
    }
}

/// The registry-owned mutable state of one instance.
pub struct InternalState {
    /// The instance's id.
    pub id: InstanceId,
    /// The frozen configuration.
    pub config: SandboxConfig,
    /// Current lifecycle status.
    pub status: InstanceStatus,
    /// Metrics from the most recent execution (or at-rest values).
    pub metrics: ResourceMetrics,
    /// Import report from `load()`, for diagnostics.
    pub import_report: Option<ImportReport>,
    /// The wasmtime store; dropped on destroy.
    pub store: Option<Store<InstanceData>>,
    /// Compiled module handle.
    pub module: Option<Module>,
    /// Live instance handle.
    pub instance: Option<Instance>,
    /// The sandbox-owned linear memory.
    pub memory: Option<Memory>,
}

impl InternalState {
    /// Allocate the store and linear memory for a fresh instance.
    ///
    /// Memory starts at one page; the configured maximum is the page
    /// ceiling of the byte cap, which is the hard growth limit the engine
    /// enforces.
    pub fn create(engine: &Engine, id: InstanceId, config: SandboxConfig) -> SandboxResult<Self> {
        let pages = config.memory_pages();
        let limits = StoreLimitsBuilder::new()
            .memory_size((pages * WASM_PAGE_SIZE) as usize)
            .memories(1)
            .instances(1)
            .tables(4)
            .build();

        let data = InstanceData {
            id,
            limits,
            prng: Mulberry32::new(config.deterministic_seed),
            timestamp: config.event_timestamp,
            context: None,
        };

        let mut store = Store::new(engine, data);
        store.limiter(|data| &mut data.limits);

        let memory = Memory::new(&mut store, MemoryType::new(1, Some(pages as u32))).map_err(
            |e| SandboxError::InvalidConfig {
                reason: format!("could not allocate linear memory: {e}"),
            },
        )?;

        let metrics = ResourceMetrics::at_rest(
            config.max_memory_bytes,
            config.max_gas,
            config.max_execution_ms,
        );

        debug!(%id, pages, "Allocated instance state");

        Ok(Self {
            id,
            config,
            status: InstanceStatus::Created,
            metrics,
            import_report: None,
            store: Some(store),
            module: None,
            instance: None,
            memory: Some(memory),
        })
    }

    /// Live linear-memory buffer length, 0 without a memory.
    pub fn memory_used_bytes(&self) -> u64 {
        match (&self.memory, &self.store) {
            (Some(memory), Some(store)) => memory.data_size(store) as u64,
            _ => 0,
        }
    }

    /// Release every runtime handle and mark the instance destroyed.
    pub fn destroy(&mut self) {
        self.instance = None;
        self.module = None;
        self.memory = None;
        self.store = None;
        self.status = InstanceStatus::Destroyed;
        debug!(id = %self.id, "Instance destroyed");
    }

    /// The read-only projection handed to callers.
    pub fn projection(&self) -> SandboxInstance {
        SandboxInstance {
            id: self.id,
            config: self.config.clone(),
            status: self.status,
            metrics: self.metrics,
        }
    }
}

/// Read-only projection of an instance.
#[derive(Debug, Clone)]
pub struct SandboxInstance {
    /// The instance's id.
    pub id: InstanceId,
    /// The frozen configuration.
    pub config: SandboxConfig,
    /// Status at projection time.
    pub status: InstanceStatus,
    /// Metrics at projection time.
    pub metrics: ResourceMetrics,
}
