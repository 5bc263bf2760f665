//! The dependency graph engine — `set`, `pull`, and the freshness-propagation
//! algorithm that ties the schema compiler, unifier, and storage layer
//! together.
//!
//! Both graph walks here (the invalidation sweep in [`Engine::set`] and the
//! post-order recalculation in [`Engine::pull`]) are iterative with an
//! explicit work list rather than recursive — acyclicity is guaranteed at
//! schema-compile time (`schema::check_acyclic`), but a 10^3+-deep chain
//! would still blow a native call stack if walked recursively.

mod cache;

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::expr;
use crate::schema::{unify, Bindings, Computor, NodeDef, Schema};
use crate::storage::{Batch, Freshness, SledStore, Store};
use crate::value::{ComputorOutcome, Value};

use cache::ConcreteCache;

/// A pattern definition instantiated against one concrete key.
///
/// Exact (non-pattern) keys are also represented this way, with an empty
/// `bindings` map — there's nothing a computor needs bound for them.
/// Cheap to clone and to rebuild from [`Schema`] alone, which is what makes
/// LRU eviction safe.
#[derive(Clone)]
struct ConcreteNode {
    key: String,
    compiled_index: usize,
    /// Canonical concrete input keys, in declaration order.
    inputs: Vec<String>,
    bindings: Bindings,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum PullStatus {
    Changed,
    Unchanged,
    Cached,
}

#[derive(Clone)]
struct PullResult {
    value: Value,
    status: PullStatus,
}

/// Freshness as reported to a host debugging a stuck pull, with
/// `Missing` standing in for the absence of any freshness record at all —
/// [`crate::storage::Freshness`] has no such variant since "absent" isn't a
/// value that's ever written to storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugFreshness {
    UpToDate,
    PotentiallyOutdated,
    Missing,
}

impl From<Option<Freshness>> for DebugFreshness {
    fn from(f: Option<Freshness>) -> Self {
        match f {
            Some(Freshness::UpToDate) => DebugFreshness::UpToDate,
            Some(Freshness::PotentiallyOutdated) => DebugFreshness::PotentiallyOutdated,
            None => DebugFreshness::Missing,
        }
    }
}

/// The engine's public contract: a compiled [`Schema`] paired with a
/// [`Store`], serialized behind one FIFO mutex so two concurrently-initiated
/// `set`/`pull` calls never interleave their batch commits.
pub struct Engine {
    store: Arc<dyn Store>,
    schema: Arc<Schema>,
    ns: String,
    cache: ConcreteCache,
    /// Serializes `set`/`pull` critical sections. `tokio::sync::Mutex`
    /// rather than `parking_lot`'s: it must stay held across the `.await`
    /// points where storage IO and computor invocation happen, and it
    /// guarantees FIFO wakeup order for waiters.
    lock: Mutex<()>,
}

impl Engine {
    /// Compiles `defs` into a [`Schema`] and wires it to `store`. The
    /// schema's hash becomes the storage namespace.
    pub fn new(
        store: Arc<dyn Store>,
        defs: Vec<NodeDef>,
        cache_capacity: usize,
    ) -> Result<Self, EngineError> {
        let schema = Schema::compile(defs)?;
        tracing::info!(schema_hash = %schema.hash, nodes = schema.compiled.len(), "schema_compiled");
        let ns = schema.hash.clone();
        Ok(Engine {
            store,
            schema: Arc::new(schema),
            ns,
            cache: ConcreteCache::new(cache_capacity),
            lock: Mutex::new(()),
        })
    }

    /// Convenience constructor for binaries that want a config file and a
    /// [`SledStore`] rather than assembling both by hand.
    pub fn open(config: &EngineConfig, defs: Vec<NodeDef>) -> Result<Self, EngineError> {
        let store = SledStore::open(&config.storage.data_dir)?;
        Self::new(Arc::new(store), defs, config.storage.cache_capacity)
    }

    #[tracing::instrument(skip(self, value), fields(key = %key))]
    pub async fn set(&self, key: &str, value: Value) -> Result<(), EngineError> {
        let _guard = self.lock.lock().await;

        let canonical = expr::canonicalize(key)?;
        let node = self.resolve_concrete(&canonical).await?;
        if !node.inputs.is_empty() {
            return Err(EngineError::InvalidSet(canonical));
        }

        let mut batch = Batch::new();
        batch.put_value(node.key.clone(), value.encode()?);
        batch.put_freshness(node.key.clone(), Freshness::UpToDate);

        self.invalidate_dependents(&mut batch, &node.key).await?;

        self.store.commit(&self.ns, batch).await?;
        tracing::debug!("set_committed");
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(key = %key))]
    pub async fn pull(&self, key: &str) -> Result<Value, EngineError> {
        let _guard = self.lock.lock().await;

        let canonical = expr::canonicalize(key)?;
        let result = self.pull_inner(&canonical).await?;
        Ok(result.value)
    }

    pub async fn debug_get_freshness(&self, key: &str) -> Result<DebugFreshness, EngineError> {
        let canonical = expr::canonicalize(key)?;
        let freshness = self.store.get_freshness(&self.ns, &canonical).await?;
        Ok(freshness.into())
    }

    pub async fn debug_list_materialized(&self) -> Result<Vec<String>, EngineError> {
        Ok(self.store.list_materialized(&self.ns).await?)
    }

    /// Resolves a canonical concrete key to its [`ConcreteNode`], going
    /// through the LRU before touching the schema.
    ///
    /// `key` matching a pattern's own declared template verbatim (e.g. the
    /// literal string `"pair(x,y)"` against a `pair(x,y)` pattern
    /// definition) is rejected as [`EngineError::SchemaPatternNotAllowed`]
    /// rather than accepted as a two-atom concrete key named `x`/`y` — the
    /// grammar has no syntax to distinguish a pattern variable from a
    /// concrete identifier, so a literal template reuse is the one case
    /// this engine can detect and reject against a matching-key requirement
    /// that no variables remain.
    async fn resolve_concrete(&self, canonical_key: &str) -> Result<ConcreteNode, EngineError> {
        if let Some(node) = self.cache.get(canonical_key) {
            return Ok(node);
        }

        let parsed = expr::parse(canonical_key)?;
        let head = parsed.head();
        let arity = parsed.arity();

        let node = if let Some(idx) = self.schema.exact_index(canonical_key) {
            let compiled = &self.schema.compiled[idx];
            ConcreteNode {
                key: canonical_key.to_string(),
                compiled_index: idx,
                inputs: compiled.input_canonicals.clone(),
                bindings: Bindings::new(),
            }
        } else if let Some(idx) = self.schema.pattern_index(head, arity) {
            let compiled = &self.schema.compiled[idx];
            if canonical_key == compiled.output_canonical {
                return Err(EngineError::SchemaPatternNotAllowed(canonical_key.to_string()));
            }
            let bindings = unify::match_concrete(&parsed, compiled)?
                .ok_or_else(|| EngineError::InvalidNode(canonical_key.to_string()))?;

            let mut inputs = Vec::with_capacity(compiled.inputs.len());
            for input_pattern in &compiled.inputs {
                inputs.push(unify::substitute(input_pattern, &bindings)?);
            }

            ConcreteNode {
                key: canonical_key.to_string(),
                compiled_index: idx,
                inputs,
                bindings,
            }
        } else {
            return Err(EngineError::InvalidNode(canonical_key.to_string()));
        };

        self.cache.put(node.clone());
        Ok(node)
    }

    /// The iterative `pull` algorithm: a post-order walk over
    /// an explicit frame stack, memoizing results so a diamond-shaped graph
    /// computes each shared input exactly once per `pull` call.
    async fn pull_inner(&self, root: &str) -> Result<PullResult, EngineError> {
        enum FrameState {
            Init,
            AwaitingChildren,
        }

        struct Frame {
            node: ConcreteNode,
            state: FrameState,
        }

        let root_node = self.resolve_concrete(root).await?;
        let mut memo: HashMap<String, PullResult> = HashMap::new();
        let mut stack: Vec<Frame> = vec![Frame {
            node: root_node,
            state: FrameState::Init,
        }];

        while let Some(top_key) = stack.last().map(|f| f.node.key.clone()) {
            if memo.contains_key(&top_key) {
                stack.pop();
                continue;
            }

            let is_init = matches!(stack.last().unwrap().state, FrameState::Init);
            if is_init {
                let freshness = self.store.get_freshness(&self.ns, &top_key).await?;
                if freshness == Some(Freshness::UpToDate) {
                    let node = stack.last().unwrap().node.clone();
                    self.ensure_indices_if_missing(&node).await?;
                    let raw = self
                        .store
                        .get_value(&self.ns, &top_key)
                        .await?
                        .ok_or_else(|| EngineError::MissingValue(top_key.clone()))?;
                    let value = Value::decode(&raw)?;
                    memo.insert(
                        top_key.clone(),
                        PullResult {
                            value,
                            status: PullStatus::Cached,
                        },
                    );
                    stack.pop();
                    continue;
                }

                let inputs = stack.last().unwrap().node.inputs.clone();
                stack.last_mut().unwrap().state = FrameState::AwaitingChildren;

                let mut pending: Vec<String> = Vec::new();
                for input_key in &inputs {
                    if !memo.contains_key(input_key) {
                        pending.push(input_key.clone());
                    }
                }
                for input_key in pending.into_iter().rev() {
                    let child_node = self.resolve_concrete(&input_key).await?;
                    stack.push(Frame {
                        node: child_node,
                        state: FrameState::Init,
                    });
                }
                continue;
            }

            // AwaitingChildren: every input is now in `memo`.
            let node = stack.last().unwrap().node.clone();
            let result = self.recalculate(&node, &memo).await?;
            memo.insert(top_key, result);
            stack.pop();
        }

        Ok(memo.remove(root).expect("root key is always resolved by the loop above"))
    }

    /// `maybeRecalculate`: invokes the node's computor (or
    /// skips it via the `Unchanged` short-circuit) and commits exactly one
    /// batch. Ordering inside the batch follows the resolution recorded in
    /// DESIGN.md: ensure indices, then mark inputs up to date, then write
    /// the result, then mark this node up to date.
    async fn recalculate(
        &self,
        node: &ConcreteNode,
        memo: &HashMap<String, PullResult>,
    ) -> Result<PullResult, EngineError> {
        let compiled = &self.schema.compiled[node.compiled_index];

        let mut input_values = Vec::with_capacity(node.inputs.len());
        let mut all_unchanged = true;
        for input_key in &node.inputs {
            let result = memo
                .get(input_key)
                .expect("every input is pulled before its parent is recalculated");
            if result.status != PullStatus::Unchanged {
                all_unchanged = false;
            }
            input_values.push(result.value.clone());
        }

        let prior_raw = self.store.get_value(&self.ns, &node.key).await?;
        let prior = match prior_raw {
            Some(bytes) => Some(Value::decode(&bytes)?),
            None => None,
        };

        if all_unchanged {
            if let Some(prior_value) = prior.as_ref() {
                let mut batch = Batch::new();
                self.stage_indices(&mut batch, node);
                batch.put_freshness(node.key.clone(), Freshness::UpToDate);
                self.store.commit(&self.ns, batch).await?;
                tracing::debug!(key = %node.key, "unchanged_short_circuit");
                return Ok(PullResult {
                    value: prior_value.clone(),
                    status: PullStatus::Unchanged,
                });
            }
        }

        let outcome = compiled
            .computor
            .compute(&input_values, prior.as_ref(), &node.bindings)
            .await?;

        let mut batch = Batch::new();
        self.stage_indices(&mut batch, node);
        for input_key in &node.inputs {
            batch.put_freshness(input_key.clone(), Freshness::UpToDate);
        }

        let result = match outcome {
            ComputorOutcome::Value(value) => {
                batch.put_value(node.key.clone(), value.encode()?);
                batch.put_freshness(node.key.clone(), Freshness::UpToDate);
                PullResult {
                    value,
                    status: PullStatus::Changed,
                }
            }
            ComputorOutcome::Unchanged => {
                let prior_value = prior.ok_or_else(|| {
                    tracing::warn!(key = %node.key, "unchanged_without_prior_value");
                    EngineError::MissingValue(format!(
                        "computor for '{}' returned Unchanged with no prior value",
                        node.key
                    ))
                })?;
                batch.put_freshness(node.key.clone(), Freshness::UpToDate);
                PullResult {
                    value: prior_value,
                    status: PullStatus::Unchanged,
                }
            }
        };

        self.store.commit(&self.ns, batch).await?;
        tracing::debug!(key = %node.key, status = ?result.status, "recalculated");
        Ok(result)
    }

    fn stage_indices(&self, batch: &mut Batch, node: &ConcreteNode) {
        batch.put_inputs(node.key.clone(), node.inputs.clone());
        for input_key in &node.inputs {
            batch.put_revdep(input_key.clone(), node.key.clone());
        }
    }

    /// Lazily backfills the inputs record and reverse-dep edges for a node
    /// that's `up-to-date` but missing its index (a seeded database that
    /// has values but no index yet).
    async fn ensure_indices_if_missing(&self, node: &ConcreteNode) -> Result<(), EngineError> {
        if self.store.get_inputs(&self.ns, &node.key).await?.is_some() {
            return Ok(());
        }
        let mut batch = Batch::new();
        self.stage_indices(&mut batch, node);
        self.store.commit(&self.ns, batch).await?;
        Ok(())
    }

    /// Iterative breadth-first invalidation sweep: a node
    /// already `potentially-outdated` is neither re-marked nor re-expanded,
    /// bounding the walk by the number of not-yet-stale descendants.
    async fn invalidate_dependents(&self, batch: &mut Batch, key: &str) -> Result<(), EngineError> {
        let mut queue: VecDeque<String> = VecDeque::new();
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(key.to_string());

        self.enqueue_dependents(key, &mut queue, &visited).await?;

        while let Some(dep) = queue.pop_front() {
            if visited.contains(&dep) {
                continue;
            }
            visited.insert(dep.clone());

            let freshness = self.store.get_freshness(&self.ns, &dep).await?;
            if freshness == Some(Freshness::PotentiallyOutdated) {
                continue;
            }

            batch.put_freshness(dep.clone(), Freshness::PotentiallyOutdated);
            tracing::trace!(key = %dep, "marked_potentially_outdated");
            self.enqueue_dependents(&dep, &mut queue, &visited).await?;
        }

        Ok(())
    }

    async fn enqueue_dependents(
        &self,
        key: &str,
        queue: &mut VecDeque<String>,
        visited: &HashSet<String>,
    ) -> Result<(), EngineError> {
        if let Some(indices) = self.schema.static_dependents.get(key) {
            for &idx in indices {
                let dependent_key = self.schema.compiled[idx].output_canonical.clone();
                if !visited.contains(&dependent_key) {
                    queue.push_back(dependent_key);
                }
            }
        }
        for dependent_key in self.store.list_dependents(&self.ns, key).await? {
            if !visited.contains(&dependent_key) {
                queue.push_back(dependent_key);
            }
        }
        Ok(())
    }
}
