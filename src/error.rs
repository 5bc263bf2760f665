//! The engine's error taxonomy: one `thiserror`-derived enum covering every
//! failure kind the engine can surface, wrapping the host storage backend's
//! own failure type via `#[from]`.

use thiserror::Error;

use crate::storage::StoreError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid expression: {0}")]
    InvalidExpression(String),

    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    #[error("head '{head}' used with conflicting arities {first} and {second}")]
    SchemaArityConflict {
        head: String,
        first: usize,
        second: usize,
    },

    #[error("head '{head}' has more than one compiled node of arity {arity}")]
    SchemaOverlap { head: String, arity: usize },

    #[error("schema contains a cycle: {}", .path.join(" -> "))]
    SchemaCycle { path: Vec<String> },

    #[error("no compiled node matches key '{0}'")]
    InvalidNode(String),

    #[error("key '{0}' is a pattern's own template, not a concrete instance")]
    SchemaPatternNotAllowed(String),

    #[error("set() target '{0}' has inputs; only source nodes may be set")]
    InvalidSet(String),

    #[error("node '{0}' has no materialized value")]
    MissingValue(String),

    #[error("computor returned an invalid value: {0}")]
    InvalidComputorReturnValue(String),

    #[error("expected {expected} input(s), found {found}")]
    ArityMismatch { expected: usize, found: usize },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}
