//! Observable lifecycle events.

use std::sync::Arc;

use parking_lot::RwLock;

/// Events emitted over the life of a sandbox instance.
#[derive(Debug, Clone)]
pub enum SandboxEvent {
    /// An instance was created.
    InstanceCreated {
        /// Instance identifier.
        id: String,
    },
    /// A module passed validation and was instantiated.
    ModuleLoaded {
        /// Instance identifier.
        id: String,
        /// Total declared imports.
        import_count: usize,
        /// Imports satisfied by configured host functions.
        host_function_imports: usize,
    },
    /// An execution began.
    ExecutionStarted {
        /// Instance identifier.
        id: String,
        /// Exported function being invoked.
        action: String,
    },
    /// An execution finished, successfully or not.
    ExecutionCompleted {
        /// Instance identifier.
        id: String,
        /// Exported function that was invoked.
        action: String,
        /// Whether the execution completed without a typed failure.
        success: bool,
        /// Gas consumed.
        gas_used: u64,
        /// Wall-clock milliseconds spent.
        duration_ms: u64,
    },
    /// A snapshot was serialized.
    SnapshotTaken {
        /// Instance identifier.
        id: String,
        /// Encoded snapshot size in bytes.
        bytes: usize,
    },
    /// A snapshot was restored.
    SnapshotRestored {
        /// Instance identifier.
        id: String,
    },
    /// An instance was suspended.
    InstanceSuspended {
        /// Instance identifier.
        id: String,
    },
    /// An instance was destroyed.
    InstanceDestroyed {
        /// Instance identifier.
        id: String,
    },
}

impl SandboxEvent {
    /// Stable name for the event kind.
    pub fn event_type(&self) -> &'static str {
        match self {
            SandboxEvent::InstanceCreated { .. } => "instance_created",
            SandboxEvent::ModuleLoaded { .. } => "module_loaded",
            SandboxEvent::ExecutionStarted { .. } => "execution_started",
            SandboxEvent::ExecutionCompleted { .. } => "execution_completed",
            SandboxEvent::SnapshotTaken { .. } => "snapshot_taken",
            SandboxEvent::SnapshotRestored { .. } => "snapshot_restored",
            SandboxEvent::InstanceSuspended { .. } => "instance_suspended",
            SandboxEvent::InstanceDestroyed { .. } => "instance_destroyed",
        }
    }
}

/// Subscriber for sandbox events.
pub trait EventSubscriber: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &SandboxEvent);

    /// Filter for event types this subscriber is interested in.
    /// `None` receives all events.
    fn event_filter(&self) -> Option<Vec<&'static str>> {
        None
    }
}

/// A subscriber that forwards events onto `tracing`.
#[derive(Debug, Default)]
pub struct LoggingSubscriber;

impl LoggingSubscriber {
    /// Create a new logging subscriber.
    pub fn new() -> Self {
        Self
    }
}

impl EventSubscriber for LoggingSubscriber {
    fn on_event(&self, event: &SandboxEvent) {
        match event {
            SandboxEvent::InstanceCreated { id } => {
                tracing::info!(event = "instance_created", id, "Instance created");
            }
            SandboxEvent::ModuleLoaded {
                id,
                import_count,
                host_function_imports,
            } => {
                tracing::info!(
                    event = "module_loaded",
                    id,
                    imports = import_count,
                    host_functions = host_function_imports,
                    "Module loaded"
                );
            }
            SandboxEvent::ExecutionStarted { id, action } => {
                tracing::debug!(event = "execution_started", id, action, "Execution started");
            }
            SandboxEvent::ExecutionCompleted {
                id,
                action,
                success,
                gas_used,
                duration_ms,
            } => {
                tracing::info!(
                    event = "execution_completed",
                    id,
                    action,
                    success,
                    gas_used,
                    duration_ms,
                    "Execution completed"
                );
            }
            SandboxEvent::SnapshotTaken { id, bytes } => {
                tracing::debug!(event = "snapshot_taken", id, bytes, "Snapshot taken");
            }
            SandboxEvent::SnapshotRestored { id } => {
                tracing::debug!(event = "snapshot_restored", id, "Snapshot restored");
            }
            SandboxEvent::InstanceSuspended { id } => {
                tracing::debug!(event = "instance_suspended", id, "Instance suspended");
            }
            SandboxEvent::InstanceDestroyed { id } => {
                tracing::info!(event = "instance_destroyed", id, "Instance destroyed");
            }
        }
    }
}

/// A subscriber that collects events for later inspection.
pub struct CollectingSubscriber {
    events: RwLock<Vec<SandboxEvent>>,
    max_events: usize,
}

impl CollectingSubscriber {
    /// Create a collector holding at most `max_events` events.
    pub fn new(max_events: usize) -> Self {
        Self {
            events: RwLock::new(Vec::new()),
            max_events,
        }
    }

    /// Get collected events.
    pub fn events(&self) -> Vec<SandboxEvent> {
        self.events.read().clone()
    }

    /// Clear collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }

    /// Number of collected events.
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Whether no events were collected.
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}

impl EventSubscriber for CollectingSubscriber {
    fn on_event(&self, event: &SandboxEvent) {
        let mut events = self.events.write();
        if events.len() < self.max_events {
            events.push(event.clone());
        }
    }
}

/// Event dispatcher fanning events out to subscribers.
#[derive(Default)]
pub struct EventDispatcher {
    subscribers: RwLock<Vec<Arc<dyn EventSubscriber>>>,
}

impl EventDispatcher {
    /// Create a new dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber.
    pub fn subscribe(&self, subscriber: Arc<dyn EventSubscriber>) {
        self.subscribers.write().push(subscriber);
    }

    /// Number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Emit an event to all interested subscribers.
    pub fn emit(&self, event: SandboxEvent) {
        let subscribers = self.subscribers.read();
        for subscriber in subscribers.iter() {
            if let Some(filter) = subscriber.event_filter() {
                if !filter.contains(&event.event_type()) {
                    continue;
                }
            }
            subscriber.on_event(&event);
        }
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}
