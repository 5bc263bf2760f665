//! Schema-hash namespacing: changing the schema must never let an old
//! engine see a new schema's data or vice versa, and reopening the same
//! schema against the same store must reuse its prior namespace.

use std::sync::Arc;

use async_trait::async_trait;
use increap::{Bindings, Computor, ComputorOutcome, DebugFreshness, Engine, EngineError, NodeDef, SledStore, Value};

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

fn def(output: &str, inputs: &[&str], computor: Arc<dyn Computor>) -> NodeDef {
    NodeDef {
        output: output.to_string(),
        inputs: inputs.iter().map(|s| s.to_string()).collect(),
        computor,
        is_deterministic: true,
        has_side_effects: false,
    }
}

#[tokio::test]
async fn changing_the_schema_leaves_prior_data_intact_in_a_fresh_namespace() {
    let dir = tempfile::tempdir().unwrap();

    {
        let store = Arc::new(SledStore::open(dir.path()).unwrap());
        let engine = Engine::new(store, vec![def("x", &[], Arc::new(Source))], 1024).unwrap();
        engine.set("x", Value::Text("original-schema".into())).await.unwrap();
    }

    // A different schema (an extra node) hashes differently and so sees an
    // empty namespace, even though it shares the underlying sled database.
    {
        let store = Arc::new(SledStore::open(dir.path()).unwrap());
        let engine = Engine::new(
            store,
            vec![
                def("x", &[], Arc::new(Source)),
                def("y", &["x"], Arc::new(Identity)),
            ],
            1024,
        )
        .unwrap();
        assert_eq!(
            engine.debug_get_freshness("x").await.unwrap(),
            DebugFreshness::Missing
        );
    }

    // Reopening with the original schema finds its data untouched.
    {
        let store = Arc::new(SledStore::open(dir.path()).unwrap());
        let engine = Engine::new(store, vec![def("x", &[], Arc::new(Source))], 1024).unwrap();
        assert_eq!(
            engine.pull("x").await.unwrap(),
            Value::Text("original-schema".into())
        );
    }
}
