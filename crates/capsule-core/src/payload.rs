//! Payload dispatch and value conversion.
//!
//! `execute()` recognizes two argument-passing disciplines. Direct mode
//! passes numbers straight to the export; linear-memory mode serializes the
//! payload as JSON into guest memory via the module's `__alloc` export.
//! The dispatch is an explicit tag on [`Payload`], not an inspection of a
//! dynamic value.

use serde_json::{json, Value};
use wasmtime::{Val, ValType};

/// An execution payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// No arguments.
    Null,
    /// A single numeric argument.
    Int(i64),
    /// Multiple numeric arguments.
    Ints(Vec<i64>),
    /// Arbitrary JSON, marshalled through linear memory.
    Value(Value),
}

impl Payload {
    /// Whether this payload uses direct argument passing.
    pub fn is_direct(&self) -> bool {
        !matches!(self, Payload::Value(_))
    }

    /// The direct-mode argument list; empty for `Null`.
    pub fn direct_numbers(&self) -> &[i64] {
        match self {
            Payload::Null | Payload::Value(_) => &[],
            Payload::Int(n) => std::slice::from_ref(n),
            Payload::Ints(ns) => ns,
        }
    }
}

impl From<()> for Payload {
    fn from(_: ()) -> Self {
        Payload::Null
    }
}

impl From<i32> for Payload {
    fn from(n: i32) -> Self {
        Payload::Int(n as i64)
    }
}

impl From<i64> for Payload {
    fn from(n: i64) -> Self {
        Payload::Int(n)
    }
}

impl From<Vec<i64>> for Payload {
    fn from(ns: Vec<i64>) -> Self {
        Payload::Ints(ns)
    }
}

impl From<Vec<i32>> for Payload {
    fn from(ns: Vec<i32>) -> Self {
        Payload::Ints(ns.into_iter().map(i64::from).collect())
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Value(value)
    }
}

/// Coerce one direct-mode number to the declared parameter type.
///
/// `None` for reference or vector parameter types, which direct mode
/// cannot express.
pub(crate) fn val_for(ty: &ValType, n: i64) -> Option<Val> {
    match ty {
        ValType::I32 => Some(Val::I32(n as i32)),
        ValType::I64 => Some(Val::I64(n)),
        ValType::F32 => Some(Val::F32((n as f32).to_bits())),
        ValType::F64 => Some(Val::F64((n as f64).to_bits())),
        _ => None,
    }
}

/// Render result values as JSON: none → null, one → scalar, many → array.
pub(crate) fn vals_to_json(results: &[Val]) -> Value {
    match results {
        [] => Value::Null,
        [single] => val_to_json(single),
        many => Value::Array(many.iter().map(val_to_json).collect()),
    }
}

fn val_to_json(val: &Val) -> Value {
    match val {
        Val::I32(v) => json!(v),
        Val::I64(v) => json!(v),
        Val::F32(bits) => number_or_null(f32::from_bits(*bits) as f64),
        Val::F64(bits) => number_or_null(f64::from_bits(*bits)),
        _ => Value::Null,
    }
}

fn number_or_null(value: f64) -> Value {
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}
