//! The compiled node & schema validator, plus the
//! schema-wide structures (`Schema`) that the dependency graph engine
//! (`crate::engine`) consults at `set`/`pull` time.
//!
//! A host describes its computation graph as a flat list of [`NodeDef`]s.
//! [`Schema::compile`] parses every output/input expression, classifies each
//! definition as a pattern or an exact node, and runs the validations of
//! these validations over the compiled set as a whole: variable coverage, one arity per
//! head, pattern overlap, and acyclicity. A schema that survives compilation
//! is handed to [`crate::engine::Engine::new`] alongside a [`crate::storage::Store`].

pub mod unify;

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::EngineError;
use crate::expr::{self, Expr};
use crate::value::{ComputorOutcome, Value};

pub use unify::Bindings;

/// A host-supplied computation body.
///
/// Invoked by the engine once a node's inputs are known to be up to date
/// (or freshly recomputed). `bindings` is empty for an exact node and holds
/// one entry per pattern variable for an instantiated pattern node.
/// Implementations must be pure with respect to `inputs`/`bindings` when
/// the owning [`NodeDef::is_deterministic`] is set and must not return [`ComputorOutcome::Unchanged`] unless a
/// prior value exists.
#[async_trait]
pub trait Computor: Send + Sync {
    async fn compute(
        &self,
        inputs: &[Value],
        prior: Option<&Value>,
        bindings: &Bindings,
    ) -> Result<ComputorOutcome, EngineError>;
}

/// A node definition as supplied by the host.
///
/// `output` is a pattern definition iff it parses to an expression with at
/// least one argument (`Expr::is_pattern`); otherwise it is an exact
/// definition. Every variable used in `inputs` must occur in `output` —
/// checked by [`Schema::compile`], not here.
#[derive(Clone)]
pub struct NodeDef {
    pub output: String,
    pub inputs: Vec<String>,
    pub computor: Arc<dyn Computor>,
    pub is_deterministic: bool,
    pub has_side_effects: bool,
}

impl std::fmt::Debug for NodeDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeDef")
            .field("output", &self.output)
            .field("inputs", &self.inputs)
            .field("is_deterministic", &self.is_deterministic)
            .field("has_side_effects", &self.has_side_effects)
            .finish_non_exhaustive()
    }
}

/// A [`NodeDef`] after parsing and the per-node analysis.
pub struct CompiledNode {
    pub output: Expr,
    pub output_canonical: String,
    pub inputs: Vec<Expr>,
    pub input_canonicals: Vec<String>,
    pub head: String,
    pub arity: usize,
    pub is_pattern: bool,
    pub vars_used_in_inputs: BTreeSet<String>,
    /// Variable name → argument positions in `output`, for variables that
    /// occur more than once (e.g. `pair(x,x)`). Single-occurrence
    /// variables are dropped; single-occurrence entries are dropped.
    pub repeated_var_positions: HashMap<String, Vec<usize>>,
    pub is_deterministic: bool,
    pub has_side_effects: bool,
    pub computor: Arc<dyn Computor>,
}

impl CompiledNode {
    fn compile(def_index: usize, def: &NodeDef) -> Result<Self, EngineError> {
        let output = expr::parse(&def.output)?;
        let output_canonical = output.render();

        let mut inputs = Vec::with_capacity(def.inputs.len());
        let mut input_canonicals = Vec::with_capacity(def.inputs.len());
        for raw in &def.inputs {
            let parsed = expr::parse(raw)?;
            input_canonicals.push(parsed.render());
            inputs.push(parsed);
        }

        let output_vars = output.extract_variables();
        let mut vars_used_in_inputs = BTreeSet::new();
        for input in &inputs {
            for var in input.extract_variables() {
                vars_used_in_inputs.insert(var);
            }
        }
        for var in &vars_used_in_inputs {
            if !output_vars.contains(var) {
                return Err(EngineError::InvalidSchema(format!(
                    "node '{def_index}' (output '{output_canonical}'): input variable '{var}' \
                     does not appear in the output"
                )));
            }
        }

        let mut positions: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, var) in output.args().iter().enumerate() {
            positions.entry(var.clone()).or_default().push(i);
        }
        positions.retain(|_, pos| pos.len() > 1);

        Ok(CompiledNode {
            head: output.head().to_string(),
            arity: output.arity(),
            is_pattern: output.is_pattern(),
            output,
            output_canonical,
            inputs,
            input_canonicals,
            vars_used_in_inputs,
            repeated_var_positions: positions,
            is_deterministic: def.is_deterministic,
            has_side_effects: def.has_side_effects,
            computor: Arc::clone(&def.computor),
        })
    }
}

/// The compiled, validated schema for one engine instance.
///
/// Built once at construction time ([`Schema::compile`]) and shared
/// read-only for the engine's lifetime — compiled nodes never change after
/// a schema passes validation.
pub struct Schema {
    pub compiled: Vec<CompiledNode>,
    /// Exact (non-pattern) nodes, keyed by their canonical output — O(1)
    /// lookup for `set`/`pull` on a concrete key that isn't a pattern
    /// instance.
    exact_by_key: HashMap<String, usize>,
    /// Pattern nodes, keyed by `(head, arity)`. At most one entry per key:
    /// compilation rejects overlapping patterns before this map is built.
    pattern_by_head_arity: HashMap<(String, usize), usize>,
    /// Concrete input key → indices of exact compiled nodes whose inputs
    /// list contains that key verbatim. Precomputed at construction so
    /// `set`'s invalidation walk has a starting point that doesn't require
    /// a prior pattern instantiation to exist in storage.
    pub static_dependents: HashMap<String, Vec<usize>>,
    /// 16-hex-character digest over the canonical schema, used to
    /// namespace all persisted keys.
    pub hash: String,
}

impl Schema {
    pub fn compile(defs: Vec<NodeDef>) -> Result<Self, EngineError> {
        let mut compiled = Vec::with_capacity(defs.len());
        for (i, def) in defs.iter().enumerate() {
            compiled.push(CompiledNode::compile(i, def)?);
        }

        check_arity_conflicts(&compiled)?;
        let (exact_by_key, pattern_by_head_arity) = check_overlap_and_index(&compiled)?;
        check_acyclic(&compiled)?;

        let mut static_dependents: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, node) in compiled.iter().enumerate() {
            if node.is_pattern {
                continue;
            }
            for input_key in &node.input_canonicals {
                static_dependents.entry(input_key.clone()).or_default().push(i);
            }
        }

        let hash = schema_hash(&compiled);

        Ok(Schema {
            compiled,
            exact_by_key,
            pattern_by_head_arity,
            static_dependents,
            hash,
        })
    }

    /// Looks up the compiled node an exact key resolves to, without
    /// instantiating it — used by [`crate::engine::Engine`] to decide
    /// whether a key is a source (no inputs) before it bothers touching
    /// storage.
    pub fn exact_node(&self, canonical_key: &str) -> Option<&CompiledNode> {
        self.exact_by_key.get(canonical_key).map(|&i| &self.compiled[i])
    }

    pub fn pattern_node(&self, head: &str, arity: usize) -> Option<&CompiledNode> {
        self.pattern_by_head_arity
            .get(&(head.to_string(), arity))
            .map(|&i| &self.compiled[i])
    }

    /// Index into `compiled` for an exact key, for callers (the engine)
    /// that want to stash the index in a [`unify::Bindings`]-free
    /// `ConcreteNode` rather than hold a borrow of `Schema`.
    pub fn exact_index(&self, canonical_key: &str) -> Option<usize> {
        self.exact_by_key.get(canonical_key).copied()
    }

    pub fn pattern_index(&self, head: &str, arity: usize) -> Option<usize> {
        self.pattern_by_head_arity.get(&(head.to_string(), arity)).copied()
    }
}

fn check_arity_conflicts(compiled: &[CompiledNode]) -> Result<(), EngineError> {
    let mut seen: HashMap<&str, usize> = HashMap::new();
    for node in compiled {
        match seen.entry(node.head.as_str()) {
            std::collections::hash_map::Entry::Occupied(entry) => {
                if *entry.get() != node.arity {
                    return Err(EngineError::SchemaArityConflict {
                        head: node.head.clone(),
                        first: *entry.get(),
                        second: node.arity,
                    });
                }
            }
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(node.arity);
            }
        }
    }
    Ok(())
}

/// Splits compiled nodes into the exact-key and pattern indices, rejecting
/// duplicate exact outputs and overlapping patterns in the same pass.
///
/// Two patterns overlap iff they share a head and arity: the grammar has no
/// constants, so any two patterns with matching `(head, arity)` unify with
/// exactly the same family of concrete keys.
fn check_overlap_and_index(
    compiled: &[CompiledNode],
) -> Result<(HashMap<String, usize>, HashMap<(String, usize), usize>), EngineError> {
    let mut exact_by_key = HashMap::new();
    let mut pattern_by_head_arity: HashMap<(String, usize), usize> = HashMap::new();

    for (i, node) in compiled.iter().enumerate() {
        if node.is_pattern {
            let key = (node.head.clone(), node.arity);
            if pattern_by_head_arity.contains_key(&key) {
                return Err(EngineError::SchemaOverlap {
                    head: node.head.clone(),
                    arity: node.arity,
                });
            }
            pattern_by_head_arity.insert(key, i);
        } else {
            if exact_by_key.contains_key(&node.output_canonical) {
                return Err(EngineError::InvalidSchema(format!(
                    "duplicate definition for concrete key '{}'",
                    node.output_canonical
                )));
            }
            exact_by_key.insert(node.output_canonical.clone(), i);
        }
    }

    Ok((exact_by_key, pattern_by_head_arity))
}

/// Builds the pattern-level dependency graph (`P -> Q` iff one of `Q`'s
/// inputs shares `(head, arity)` with `P`'s output) and detects cycles with
/// an iterative three-color DFS over an explicit stack, to stay safe on
/// deep chains without blowing the native call stack.
fn check_acyclic(compiled: &[CompiledNode]) -> Result<(), EngineError> {
    let n = compiled.len();
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (q, node) in compiled.iter().enumerate() {
        for input in &node.inputs {
            for (p, candidate) in compiled.iter().enumerate() {
                if candidate.head == input.head() && candidate.arity == input.arity() {
                    adjacency[p].push(q);
                }
            }
        }
    }

    #[derive(Clone, Copy, PartialEq)]
    enum Color {
        White,
        Gray,
        Black,
    }
    let mut color = vec![Color::White; n];

    for start in 0..n {
        if color[start] != Color::White {
            continue;
        }
        // Explicit stack of (node, next-child-index-to-visit). `path`
        // mirrors the stack's node order for cycle reporting.
        let mut stack: Vec<(usize, usize)> = vec![(start, 0)];
        color[start] = Color::Gray;

        while let Some(&mut (node, ref mut next)) = stack.last_mut() {
            if *next < adjacency[node].len() {
                let child = adjacency[node][*next];
                *next += 1;
                match color[child] {
                    Color::White => {
                        color[child] = Color::Gray;
                        stack.push((child, 0));
                    }
                    Color::Gray => {
                        let mut cycle_path: Vec<String> = stack
                            .iter()
                            .map(|&(idx, _)| compiled[idx].output_canonical.clone())
                            .collect();
                        let cycle_start = stack.iter().position(|&(idx, _)| idx == child).unwrap();
                        cycle_path = cycle_path.split_off(cycle_start);
                        cycle_path.push(compiled[child].output_canonical.clone());
                        return Err(EngineError::SchemaCycle { path: cycle_path });
                    }
                    Color::Black => {}
                }
            } else {
                color[node] = Color::Black;
                stack.pop();
            }
        }
    }

    Ok(())
}

/// Stable 16-hex-character digest over the sorted `(canonicalOutput,
/// canonicalInputs)` pairs. Sorting makes the hash independent
/// of the order node definitions were supplied in.
fn schema_hash(compiled: &[CompiledNode]) -> String {
    #[derive(Serialize)]
    struct HashEntry<'a> {
        output: &'a str,
        inputs: &'a [String],
    }

    let mut entries: Vec<HashEntry<'_>> = compiled
        .iter()
        .map(|n| HashEntry {
            output: &n.output_canonical,
            inputs: &n.input_canonicals,
        })
        .collect();
    entries.sort_by(|a, b| a.output.cmp(b.output));

    let bytes = serde_json::to_vec(&entries).expect("schema entries always serialize");
    let digest = Sha256::digest(&bytes);
    digest[..8].iter().map(|b| format!("{b:02x}")).collect()
}
