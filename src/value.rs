//! The host-facing value domain.
//!
//! `Value` is a small tagged union rather than an open sum: computors return
//! one of a fixed set of shapes, with `Bytes` as the escape hatch for
//! anything the host wants to round-trip opaquely. Persisted with `bincode`.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// A value flowing through the dependency graph: a computor's input or
/// output, or a value injected at a source node via [`crate::Engine::set`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
}

impl Value {
    pub fn encode(&self) -> Result<Vec<u8>, EngineError> {
        bincode::serialize(self)
            .map_err(|e| EngineError::InvalidComputorReturnValue(format!("value encode failed: {e}")))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, EngineError> {
        bincode::deserialize(bytes)
            .map_err(|e| EngineError::InvalidComputorReturnValue(format!("value decode failed: {e}")))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

/// What a computor returns: a fresh value, or a signal that its output is
/// semantically unchanged from the prior run (suppressing downstream
/// invalidation).
#[derive(Debug, Clone, PartialEq)]
pub enum ComputorOutcome {
    Value(Value),
    Unchanged,
}
