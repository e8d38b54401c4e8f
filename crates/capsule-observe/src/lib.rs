//! Capsule Observability
//!
//! This crate provides the observable surface of the Capsule sandbox:
//!
//! - [`ResourceMetrics`]: the per-execution usage/limit snapshot emitted
//!   with every execution report
//! - [`pressure`]: a stateless memory-pressure advisor
//! - [`events`]: lifecycle events with a subscriber/dispatcher model

pub mod events;
pub mod metrics;
pub mod pressure;

pub use events::{
    CollectingSubscriber, EventDispatcher, EventSubscriber, LoggingSubscriber, SandboxEvent,
};
pub use metrics::ResourceMetrics;
pub use pressure::{assess_pressure, PressureLevel};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::events::{EventDispatcher, EventSubscriber, SandboxEvent};
    pub use crate::metrics::ResourceMetrics;
    pub use crate::pressure::{assess_pressure, PressureLevel};
}
