//! Per-execution resource context.

use crate::deadline::DeadlineChecker;
use crate::gas::GasMeter;

/// A host-function failure recorded during one execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostFailure {
    /// Name of the failing host function.
    pub function: String,
    /// The failure message.
    pub message: String,
}

/// Everything one execution needs to enforce its budgets.
///
/// Created fresh by the executor for each call, attached to the instance so
/// host-call wrappers can reach it, and detached (and read out into metrics)
/// on every exit path.
#[derive(Debug)]
pub struct ExecutionContext {
    /// Gas meter with a fresh counter.
    pub gas: GasMeter,
    /// Deadline checker, already started by the executor.
    pub deadline: DeadlineChecker,
    /// Host-function failures accumulated during the execution.
    pub host_failures: Vec<HostFailure>,
}

impl ExecutionContext {
    /// Bundle a meter and checker into a fresh context.
    pub fn new(gas: GasMeter, deadline: DeadlineChecker) -> Self {
        Self {
            gas,
            deadline,
            host_failures: Vec::new(),
        }
    }

    /// Record a handler failure for later diagnostics.
    pub fn record_host_failure(&mut self, function: &str, message: &str) {
        self.host_failures.push(HostFailure {
            function: function.to_string(),
            message: message.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_context_is_clean() {
        let ctx = ExecutionContext::new(GasMeter::new(10), DeadlineChecker::new(100));
        assert_eq!(ctx.gas.used(), 0);
        assert!(ctx.host_failures.is_empty());
        assert!(!ctx.deadline.is_timed_out());
    }

    #[test]
    fn test_record_host_failure() {
        let mut ctx = ExecutionContext::new(GasMeter::new(10), DeadlineChecker::new(100));
        ctx.record_host_failure("fetch_price", "upstream unavailable");

        assert_eq!(ctx.host_failures.len(), 1);
        assert_eq!(ctx.host_failures[0].function, "fetch_price");
    }
}
