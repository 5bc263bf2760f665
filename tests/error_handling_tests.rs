//! Exercises every operation-time error kind through the public
//! `set`/`pull` surface.

use std::sync::Arc;

use async_trait::async_trait;
use increap::{Bindings, Computor, ComputorOutcome, Engine, EngineError, NodeDef, SledStore, Value};

struct Source;

#[async_trait]
impl Computor for Source {
    async fn compute(
        &self,
        _inputs: &[Value],
        _prior: Option<&Value>,
        _bindings: &Bindings,
    ) -> Result<ComputorOutcome, EngineError> {
        unreachable!()
    }
}

struct Identity;

#[async_trait]
impl Computor for Identity {
    async fn compute(
        &self,
        inputs: &[Value],
        _prior: Option<&Value>,
        _bindings: &Bindings,
    ) -> Result<ComputorOutcome, EngineError> {
        Ok(ComputorOutcome::Value(inputs[0].clone()))
    }
}

/// Always claims `Unchanged`, violating the computor contract on a node's
/// first-ever computation (no prior value can exist yet).
struct AlwaysUnchanged;

#[async_trait]
impl Computor for AlwaysUnchanged {
    async fn compute(
        &self,
        _inputs: &[Value],
        _prior: Option<&Value>,
        _bindings: &Bindings,
    ) -> Result<ComputorOutcome, EngineError> {
        Ok(ComputorOutcome::Unchanged)
    }
}

fn def(output: &str, inputs: &[&str], computor: Arc<dyn Computor>) -> NodeDef {
    NodeDef {
        output: output.to_string(),
        inputs: inputs.iter().map(|s| s.to_string()).collect(),
        computor,
        is_deterministic: true,
        has_side_effects: false,
    }
}

fn engine(defs: Vec<NodeDef>) -> Engine {
    let store = Arc::new(SledStore::temporary().unwrap());
    Engine::new(store, defs, 1024).unwrap()
}

#[tokio::test]
async fn set_with_invalid_expression_is_rejected() {
    let engine = engine(vec![def("x", &[], Arc::new(Source))]);
    let err = engine.set("not(", Value::Int(1)).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidExpression(_)));
}

#[tokio::test]
async fn pull_of_unknown_key_is_invalid_node() {
    let engine = engine(vec![def("x", &[], Arc::new(Source))]);
    let err = engine.pull("nosuchkey").await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidNode(_)));
}

#[tokio::test]
async fn pull_of_a_patterns_own_template_is_pattern_not_allowed() {
    let engine = engine(vec![
        def("all_events", &[], Arc::new(Source)),
        def("event_context(e)", &["all_events"], Arc::new(Identity)),
    ]);
    let err = engine.pull("event_context(e)").await.unwrap_err();
    assert!(matches!(err, EngineError::SchemaPatternNotAllowed(_)));
}

#[tokio::test]
async fn set_on_a_node_with_inputs_is_invalid_set() {
    let engine = engine(vec![
        def("x", &[], Arc::new(Source)),
        def("y", &["x"], Arc::new(Identity)),
    ]);
    let err = engine.set("y", Value::Int(1)).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidSet(_)));
}

#[tokio::test]
async fn unchanged_without_any_prior_value_is_missing_value() {
    let engine = engine(vec![
        def("x", &[], Arc::new(Source)),
        def("y", &["x"], Arc::new(AlwaysUnchanged)),
    ]);
    engine.set("x", Value::Int(1)).await.unwrap();
    let err = engine.pull("y").await.unwrap_err();
    assert!(matches!(err, EngineError::MissingValue(_)));
}

#[tokio::test]
async fn schema_construction_errors_surface_before_any_operation() {
    let store = Arc::new(SledStore::temporary().unwrap());
    let err = Engine::new(
        store,
        vec![def("pair(x)", &["other(y)"], Arc::new(Identity))],
        1024,
    )
    .unwrap_err();
    assert!(matches!(err, EngineError::InvalidSchema(_)));
}

#[tokio::test]
async fn arity_conflict_is_rejected_at_construction() {
    let store = Arc::new(SledStore::temporary().unwrap());
    let err = Engine::new(
        store,
        vec![
            def("foo(x)", &[], Arc::new(Source)),
            def("foo(x,y)", &[], Arc::new(Source)),
        ],
        1024,
    )
    .unwrap_err();
    assert!(matches!(err, EngineError::SchemaArityConflict { .. }));
}
