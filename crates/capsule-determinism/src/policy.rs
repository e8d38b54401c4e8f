//! Import isolation policy.
//!
//! Every import a module declares is classified before instantiation. The
//! policy admits exactly four surfaces, all under the `env` namespace: the
//! sandbox-provided linear memory, the injected clock, the injected PRNG,
//! and host functions the embedder declared in the sandbox configuration.
//! Everything else is rejected, WASI namespaces explicitly so.

use std::collections::HashSet;

use thiserror::Error;
use tracing::debug;

/// Namespaces that grant ambient authority and are always rejected.
pub const BLOCKED_NAMESPACES: [&str; 3] = ["wasi_snapshot_preview1", "wasi_unstable", "wasi"];

/// The only namespace modules may import from.
pub const HOST_NAMESPACE: &str = "env";

/// Name of the sandbox-provided linear memory import.
pub const MEMORY_IMPORT: &str = "memory";

/// Name of the injected-timestamp import.
pub const TIME_IMPORT: &str = "__get_time";

/// Name of the injected-PRNG import.
pub const RANDOM_IMPORT: &str = "__get_random";

/// How a single permitted import is satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportDisposition {
    /// `env.memory`, bound to the instance's linear memory.
    Memory,
    /// `env.__get_time`, bound to the injected timestamp.
    InjectedTime,
    /// `env.__get_random`, bound to the seeded PRNG.
    InjectedRandom,
    /// A host function declared in the sandbox configuration.
    HostFunction,
}

impl ImportDisposition {
    /// Whether this import is provided by the sandbox itself rather than
    /// by an embedder-declared host function.
    pub fn is_system(&self) -> bool {
        !matches!(self, ImportDisposition::HostFunction)
    }
}

/// A rejected import.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PolicyViolation {
    /// The import names a WASI namespace.
    #[error("import '{namespace}.{name}' is blocked: '{namespace}' grants ambient authority")]
    BlockedNamespace {
        /// The offending namespace.
        namespace: String,
        /// The import name within it.
        name: String,
    },

    /// The import names a namespace other than `env`.
    #[error("import namespace '{namespace}' is not permitted; only '{HOST_NAMESPACE}' imports are accepted")]
    ForeignNamespace {
        /// The offending namespace.
        namespace: String,
    },

    /// The import is in `env` but is neither a system import nor a
    /// configured host function.
    #[error("undeclared import '{HOST_NAMESPACE}.{name}': not a system import or a configured host function")]
    Undeclared {
        /// The undeclared name.
        name: String,
    },
}

/// Summary of a module's import surface after classification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportReport {
    /// Total number of declared imports.
    pub total: usize,
    /// Imports satisfied by embedder-declared host functions.
    pub host_functions: usize,
    /// Imports satisfied by the sandbox itself (memory, time, random).
    pub system: usize,
}

impl ImportReport {
    /// Record one classified import.
    pub fn record(&mut self, disposition: ImportDisposition) {
        self.total += 1;
        if disposition.is_system() {
            self.system += 1;
        } else {
            self.host_functions += 1;
        }
    }
}

/// The import isolation gate.
///
/// Constructed from the set of host-function names the embedder declared;
/// classifies each `(namespace, name)` pair a module imports.
#[derive(Debug, Clone, Default)]
pub struct ImportPolicy {
    allowed_functions: HashSet<String>,
}

impl ImportPolicy {
    /// Build a policy admitting the given host-function names.
    pub fn new<I, S>(allowed_functions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed_functions: allowed_functions.into_iter().map(Into::into).collect(),
        }
    }

    /// The number of host-function names this policy admits.
    pub fn allowed_function_count(&self) -> usize {
        self.allowed_functions.len()
    }

    /// Classify one declared import.
    pub fn classify(&self, namespace: &str, name: &str) -> Result<ImportDisposition, PolicyViolation> {
        if BLOCKED_NAMESPACES.contains(&namespace) {
            return Err(PolicyViolation::BlockedNamespace {
                namespace: namespace.to_string(),
                name: name.to_string(),
            });
        }

        if namespace != HOST_NAMESPACE {
            return Err(PolicyViolation::ForeignNamespace {
                namespace: namespace.to_string(),
            });
        }

        let disposition = match name {
            MEMORY_IMPORT => ImportDisposition::Memory,
            TIME_IMPORT => ImportDisposition::InjectedTime,
            RANDOM_IMPORT => ImportDisposition::InjectedRandom,
            other if self.allowed_functions.contains(other) => ImportDisposition::HostFunction,
            other => {
                return Err(PolicyViolation::Undeclared {
                    name: other.to_string(),
                })
            }
        };

        debug!(namespace, name, ?disposition, "Classified import");
        Ok(disposition)
    }
}
