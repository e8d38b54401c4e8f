//! Gas metering.
//!
//! Gas is charged at host-call boundaries only; one unit per call. The
//! meter's job is to track consumption against a fixed budget and to latch
//! once the budget is exceeded, recording the exceeding value so errors can
//! report how far over budget the execution went.

use thiserror::Error;
use tracing::warn;

/// Signal raised when the gas budget is exceeded.
///
/// `gas_used` is the exceeding value (strictly greater than `gas_limit`),
/// not the limit itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("gas exhausted: used {gas_used} of {gas_limit}")]
pub struct GasExhausted {
    /// Gas consumed including the charge that went over budget.
    pub gas_used: u64,
    /// The configured budget.
    pub gas_limit: u64,
}

/// Tracks gas consumption for a single execution.
///
/// Consuming exactly the budget succeeds; the first charge that would go
/// over marks the meter exhausted and every subsequent charge fails
/// immediately.
#[derive(Debug, Clone)]
pub struct GasMeter {
    used: u64,
    limit: u64,
    exhausted: bool,
}

impl GasMeter {
    /// Create a meter with the given budget.
    pub fn new(limit: u64) -> Self {
        Self {
            used: 0,
            limit,
            exhausted: false,
        }
    }

    /// Charge `amount` units.
    ///
    /// On exhaustion the amount is still added so [`GasExhausted::gas_used`]
    /// records the exceeding value.
    pub fn consume(&mut self, amount: u64) -> Result<(), GasExhausted> {
        if self.exhausted || self.used.saturating_add(amount) > self.limit {
            self.exhausted = true;
            self.used = self.used.saturating_add(amount);
            warn!(used = self.used, limit = self.limit, "Gas exhausted");
            return Err(GasExhausted {
                gas_used: self.used,
                gas_limit: self.limit,
            });
        }

        self.used += amount;
        Ok(())
    }

    /// Charge one unit, the cost of a host call.
    pub fn charge_host_call(&mut self) -> Result<(), GasExhausted> {
        self.consume(1)
    }

    /// Gas consumed so far.
    pub fn used(&self) -> u64 {
        self.used
    }

    /// The configured budget.
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Remaining budget, zero once exhausted.
    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.used)
    }

    /// Whether the meter has latched exhausted.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Restore the meter to a fresh state with the same budget.
    pub fn reset(&mut self) {
        self.used = 0;
        self.exhausted = false;
    }

    /// Overwrite the consumed counter, e.g. when restoring a snapshot.
    pub fn restore_used(&mut self, used: u64) {
        self.used = used;
        self.exhausted = used > self.limit;
    }
}
