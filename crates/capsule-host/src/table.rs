//! The host-side binding table.
//!
//! An [`ImportTable`] wraps a wasmtime [`Linker`] and builds the complete
//! import surface a sandboxed module may see: the sandbox-owned linear
//! memory, the injected clock and PRNG, and the embedder's host functions.
//! Every function binding charges gas and checks the deadline before its
//! body runs.

use capsule_determinism::{
    ImportDisposition, HOST_NAMESPACE, MEMORY_IMPORT, RANDOM_IMPORT, TIME_IMPORT,
};
use std::sync::Arc;
use tracing::debug;
use wasmtime::{AsContext, AsContextMut, Caller, Engine, Instance, Linker, Memory, Module, Val};

use crate::error::{HostError, HostFunctionFailure, HostResult};
use crate::function::HostFunction;
use crate::state::SandboxState;

/// Ledger entry for one bound import.
#[derive(Debug, Clone)]
pub struct BoundImport {
    /// Import name under `env`.
    pub name: String,
    /// How the import is satisfied.
    pub disposition: ImportDisposition,
}

/// Builds and tracks the `env.*` binding table for one instance.
pub struct ImportTable<T> {
    inner: Linker<T>,
    bound: Vec<BoundImport>,
}

impl<T> ImportTable<T> {
    /// Create an empty table for the given engine.
    pub fn new(engine: &Engine) -> Self {
        Self {
            inner: Linker::new(engine),
            bound: Vec::new(),
        }
    }

    /// The ledger of bound imports.
    pub fn bound(&self) -> &[BoundImport] {
        &self.bound
    }

    /// Whether a name is already bound.
    pub fn is_bound(&self, name: &str) -> bool {
        self.bound.iter().any(|b| b.name == name)
    }

    fn record(&mut self, name: &str, disposition: ImportDisposition) -> HostResult<()> {
        if self.is_bound(name) {
            return Err(HostError::AlreadyBound {
                name: name.to_string(),
            });
        }
        self.bound.push(BoundImport {
            name: name.to_string(),
            disposition,
        });
        debug!(name, ?disposition, "Bound import");
        Ok(())
    }

    /// Bind the sandbox-owned linear memory at `env.memory`.
    pub fn define_memory(
        &mut self,
        store: impl AsContext<Data = T>,
        memory: Memory,
    ) -> HostResult<()> {
        if self.is_bound(MEMORY_IMPORT) {
            return Err(HostError::AlreadyBound {
                name: MEMORY_IMPORT.to_string(),
            });
        }
        self.inner
            .define(store, HOST_NAMESPACE, MEMORY_IMPORT, memory)
            .map_err(|e| HostError::BindFailed {
                name: MEMORY_IMPORT.to_string(),
                reason: e.to_string(),
            })?;
        self.record(MEMORY_IMPORT, ImportDisposition::Memory)
    }
}

impl<T: SandboxState> ImportTable<T> {
    /// Bind the injected clock and PRNG.
    pub fn bind_system(&mut self) -> HostResult<()> {
        if self.is_bound(TIME_IMPORT) {
            return Err(HostError::AlreadyBound {
                name: TIME_IMPORT.to_string(),
            });
        }
        self.inner
            .func_wrap(
                HOST_NAMESPACE,
                TIME_IMPORT,
                |mut caller: Caller<'_, T>| -> Result<i32, wasmtime::Error> {
                    caller.data_mut().charge_host_call()?;
                    Ok(caller.data().injected_timestamp() as i32)
                },
            )
            .map_err(|e| HostError::BindFailed {
                name: TIME_IMPORT.to_string(),
                reason: e.to_string(),
            })?;
        self.record(TIME_IMPORT, ImportDisposition::InjectedTime)?;

        if self.is_bound(RANDOM_IMPORT) {
            return Err(HostError::AlreadyBound {
                name: RANDOM_IMPORT.to_string(),
            });
        }
        self.inner
            .func_wrap(
                HOST_NAMESPACE,
                RANDOM_IMPORT,
                |mut caller: Caller<'_, T>| -> Result<i32, wasmtime::Error> {
                    caller.data_mut().charge_host_call()?;
                    Ok(caller.data_mut().next_random() as i32)
                },
            )
            .map_err(|e| HostError::BindFailed {
                name: RANDOM_IMPORT.to_string(),
                reason: e.to_string(),
            })?;
        self.record(RANDOM_IMPORT, ImportDisposition::InjectedRandom)
    }

    /// Bind every embedder-declared host function.
    ///
    /// Each binding charges gas and checks the deadline, then invokes the
    /// handler; a handler failure is recorded on the execution context and
    /// re-raised as a typed [`HostFunctionFailure`] so both the
    /// instantiation and execution paths can classify it.
    pub fn bind_host_functions<'f>(
        &mut self,
        engine: &Engine,
        functions: impl IntoIterator<Item = &'f HostFunction>,
    ) -> HostResult<()> {
        for function in functions {
            if self.is_bound(&function.name) {
                return Err(HostError::AlreadyBound {
                    name: function.name.clone(),
                });
            }

            let name = function.name.clone();
            let handler = Arc::clone(&function.handler);
            let expected_results = function.results.len();
            let ty = function.func_type(engine);

            self.inner
                .func_new(
                    HOST_NAMESPACE,
                    &function.name,
                    ty,
                    move |mut caller: Caller<'_, T>,
                          params: &[Val],
                          results: &mut [Val]|
                          -> Result<(), wasmtime::Error> {
                        caller.data_mut().charge_host_call()?;

                        let out = match handler(params) {
                            Ok(out) => out,
                            Err(e) => {
                                let failure = HostFunctionFailure {
                                    function: name.clone(),
                                    message: e.to_string(),
                                };
                                caller
                                    .data_mut()
                                    .record_host_failure(&failure.function, &failure.message);
                                return Err(wasmtime::Error::new(failure));
                            }
                        };

                        if out.len() != expected_results {
                            let failure = HostFunctionFailure {
                                function: name.clone(),
                                message: format!(
                                    "returned {} results, expected {}",
                                    out.len(),
                                    expected_results
                                ),
                            };
                            caller
                                .data_mut()
                                .record_host_failure(&failure.function, &failure.message);
                            return Err(wasmtime::Error::new(failure));
                        }

                        for (slot, val) in results.iter_mut().zip(out) {
                            *slot = val;
                        }
                        Ok(())
                    },
                )
                .map_err(|e| HostError::BindFailed {
                    name: function.name.clone(),
                    reason: e.to_string(),
                })?;

            self.record(&function.name, ImportDisposition::HostFunction)?;
        }
        Ok(())
    }

    /// Instantiate a module against the bound table.
    pub fn instantiate(
        &self,
        store: impl AsContextMut<Data = T>,
        module: &Module,
    ) -> Result<Instance, wasmtime::Error> {
        self.inner.instantiate(store, module)
    }
}

impl<T> std::fmt::Debug for ImportTable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImportTable")
            .field("bound", &self.bound.len())
            .finish()
    }
}
