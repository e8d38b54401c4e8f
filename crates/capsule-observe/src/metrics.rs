//! Execution resource metrics.

use serde::{Deserialize, Serialize};

/// Usage and limits for one execution.
///
/// Emitted with every execution report, populated on success and on every
/// failure mode alike.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceMetrics {
    /// Live linear-memory buffer length in bytes.
    pub memory_used_bytes: u64,
    /// Configured memory cap in bytes.
    pub memory_limit_bytes: u64,
    /// Gas consumed.
    pub gas_used: u64,
    /// Configured gas budget.
    pub gas_limit: u64,
    /// Wall-clock milliseconds spent executing.
    pub execution_ms: u64,
    /// Configured wall-clock budget in milliseconds.
    pub execution_limit_ms: u64,
}

impl ResourceMetrics {
    /// Metrics for an instance that has not executed anything yet: usage
    /// fields zero, limit fields taken from the configuration.
    pub fn at_rest(memory_limit_bytes: u64, gas_limit: u64, execution_limit_ms: u64) -> Self {
        Self {
            memory_limit_bytes,
            gas_limit,
            execution_limit_ms,
            ..Self::default()
        }
    }

    /// Memory utilization in the range `[0.0, ..]`, 0 when no limit is set.
    pub fn memory_utilization(&self) -> f64 {
        if self.memory_limit_bytes == 0 {
            0.0
        } else {
            self.memory_used_bytes as f64 / self.memory_limit_bytes as f64
        }
    }

    /// Gas remaining under the budget, zero once exceeded.
    pub fn gas_remaining(&self) -> u64 {
        self.gas_limit.saturating_sub(self.gas_used)
    }
}
