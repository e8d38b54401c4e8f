//! The gate between host bindings and per-execution sandbox state.

/// Access to the sandbox state that host bindings need at call time.
///
/// Implemented by the store data; closures reach it through
/// `Caller::data_mut`, so the binding built at load time can read the
/// execution context the executor attaches moments before each call.
pub trait SandboxState: Send + 'static {
    /// Charge one unit of gas, then check the deadline.
    ///
    /// Called at every host-call boundary before the handler body. With no
    /// execution in flight (instantiation-time calls) this is a no-op.
    fn charge_host_call(&mut self) -> Result<(), wasmtime::Error>;

    /// The injected timestamp, milliseconds since epoch.
    fn injected_timestamp(&self) -> u64;

    /// Advance the seeded PRNG and return the next output.
    fn next_random(&mut self) -> u32;

    /// Record a host-function handler failure for diagnostics.
    fn record_host_failure(&mut self, function: &str, message: &str);
}
