//! Embedder-declared host functions.

use std::sync::Arc;

use wasmtime::{Engine, FuncType, Val, ValType};

/// Handler invoked when the guest calls a declared host function.
///
/// Receives the guest's arguments as a `Val` slice and returns the result
/// values; a returned error aborts the guest call.
pub type HostHandler = Arc<dyn Fn(&[Val]) -> Result<Vec<Val>, anyhow::Error> + Send + Sync>;

/// A host function the embedder exposes to the guest at `env.<name>`.
///
/// The `name` field is authoritative for wiring, independent of where the
/// function is stored in the configuration map.
#[derive(Clone)]
pub struct HostFunction {
    /// Import name under `env`.
    pub name: String,
    /// Parameter types.
    pub params: Vec<ValType>,
    /// Result types.
    pub results: Vec<ValType>,
    /// The handler body.
    pub handler: HostHandler,
}

impl HostFunction {
    /// Create a host function.
    pub fn new(
        name: impl Into<String>,
        params: Vec<ValType>,
        results: Vec<ValType>,
        handler: impl Fn(&[Val]) -> Result<Vec<Val>, anyhow::Error> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            params,
            results,
            handler: Arc::new(handler),
        }
    }

    /// The wasmtime function type for this signature.
    pub fn func_type(&self, engine: &Engine) -> FuncType {
        FuncType::new(engine, self.params.iter().cloned(), self.results.iter().cloned())
    }
}

impl std::fmt::Debug for HostFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostFunction")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("results", &self.results)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_func_type_matches_signature() {
        let engine = Engine::default();
        let func = HostFunction::new(
            "double",
            vec![ValType::I32],
            vec![ValType::I32],
            |params| {
                let n = params[0].unwrap_i32();
                Ok(vec![Val::I32(n * 2)])
            },
        );

        let ty = func.func_type(&engine);
        assert_eq!(ty.params().len(), 1);
        assert_eq!(ty.results().len(), 1);
    }

    #[test]
    fn test_handler_invocation() {
        let func = HostFunction::new("sum", vec![ValType::I32, ValType::I32], vec![ValType::I32], |params| {
            let a = params[0].unwrap_i32();
            let b = params[1].unwrap_i32();
            Ok(vec![Val::I32(a + b)])
        });

        let out = (func.handler)(&[Val::I32(2), Val::I32(3)]).unwrap();
        assert_eq!(out[0].unwrap_i32(), 5);
    }
}
