//! # increap — an incremental computation engine
//!
//! A persistent, on-disk dependency graph that memoizes the results of
//! user-supplied computations and re-evaluates them lazily when their
//! inputs change. A host declares a *schema* of named computations
//! (possibly parameterized by variables) and drives it with two calls:
//! [`Engine::set`] to inject a value at a source node, and [`Engine::pull`]
//! to retrieve the up-to-date value of any node, recomputing the minimum
//! set of dependencies required.
//!
//! ## Pipeline
//!
//! ```text
//! node definitions (output expr, input exprs, computor)
//!     ↓
//! [expr]    parse & canonicalize every expression          (module 01)
//!     ↓
//! [schema]  classify pattern vs. exact, validate, compile   (module 02)
//!     ↓
//! Schema { compiled nodes, static dependents, schema hash }
//!     ↓
//! [engine]  set/pull, freshness propagation, LRU of         (module 05)
//!           concrete instantiations, backed by
//! [storage] a schema-hash-namespaced Store                  (module 04)
//! ```
//!
//! [`schema::unify`] (module 03) sits between the schema compiler and the
//! engine: it matches a concrete key against a pattern's output and
//! substitutes bindings into that pattern's input templates.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use increap::{Engine, NodeDef, Computor, ComputorOutcome, Value, SledStore};
//!
//! struct Identity;
//! #[async_trait::async_trait]
//! impl Computor for Identity {
//!     async fn compute(
//!         &self,
//!         inputs: &[Value],
//!         _prior: Option<&Value>,
//!         _bindings: &increap::Bindings,
//!     ) -> Result<ComputorOutcome, increap::EngineError> {
//!         Ok(ComputorOutcome::Value(inputs[0].clone()))
//!     }
//! }
//!
//! # async fn run() -> Result<(), increap::EngineError> {
//! let store = Arc::new(SledStore::temporary()?);
//! let engine = Engine::new(
//!     store,
//!     vec![
//!         NodeDef { output: "x".into(), inputs: vec![], computor: Arc::new(Identity), is_deterministic: true, has_side_effects: false },
//!         NodeDef { output: "y".into(), inputs: vec!["x".into()], computor: Arc::new(Identity), is_deterministic: true, has_side_effects: false },
//!     ],
//!     10_000,
//! )?;
//! engine.set("x", Value::Int(1)).await?;
//! assert_eq!(engine.pull("y").await?, Value::Int(1));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod expr;
pub mod schema;
pub mod storage;
pub mod value;

pub use config::{ConfigError, EngineConfig};
pub use engine::{DebugFreshness, Engine};
pub use error::EngineError;
pub use expr::{canonicalize, parse, Expr};
pub use schema::{Bindings, Computor, NodeDef, Schema};
pub use storage::{Batch, Freshness, SledStore, Store, StoreError};
pub use value::{ComputorOutcome, Value};
