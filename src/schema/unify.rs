//! The unifier & substitutor.
//!
//! Matching a concrete key against a pattern's output never needs real
//! unification in the logic-programming sense — the grammar has no nested
//! calls or constants, so "unify" degenerates to "same head, same arity,
//! bind each output argument position to the key's argument at that
//! position," with one extra check for repeated variables (`pair(x,x)`
//! requires the two concrete arguments to be textually equal).

use std::collections::BTreeMap;

use crate::error::EngineError;
use crate::expr::Expr;

use super::CompiledNode;

/// Variable name → concrete identifier, for one instantiation of a pattern.
pub type Bindings = BTreeMap<String, String>;

/// Matches `key` (already parsed) against `node`'s output pattern.
///
/// Returns `Ok(None)` for a structural mismatch (different head or arity,
/// or a repeated-variable constraint violated) rather than an error — a
/// mismatch here just means "try the next candidate," and with schema
/// overlap validated at compile time there is at most one candidate to
/// try per `(head, arity)`.
pub fn match_concrete(key: &Expr, node: &CompiledNode) -> Result<Option<Bindings>, EngineError> {
    if key.head() != node.head || key.arity() != node.arity {
        return Ok(None);
    }
    debug_assert!(node.is_pattern, "match_concrete called on a non-pattern node");

    let pattern_args = node.output.args();
    let key_args = key.args();

    // Repeated-variable constraint (e.g. `pair(x,x)`): every position
    // `node.repeated_var_positions` recorded for one variable must carry the
    // same concrete identifier in `key`.
    for positions in node.repeated_var_positions.values() {
        let first = &key_args[positions[0]];
        if positions[1..].iter().any(|&pos| &key_args[pos] != first) {
            return Ok(None);
        }
    }

    let mut bindings = Bindings::new();
    for (var, value) in pattern_args.iter().zip(key_args.iter()) {
        bindings.entry(var.clone()).or_insert_with(|| value.clone());
    }
    Ok(Some(bindings))
}

/// Replaces every variable in `pattern` with its binding and re-canonicalizes.
///
/// `substitute(P.output, bindings)` is the left inverse of `match_concrete`:
/// the round-trip law: matching and substituting a key recovers it exactly.
pub fn substitute(pattern: &Expr, bindings: &Bindings) -> Result<String, EngineError> {
    let substituted = match pattern {
        Expr::Atom(name) => Expr::Atom(name.clone()),
        Expr::Call { head, args } => {
            let mut resolved = Vec::with_capacity(args.len());
            for arg in args {
                let value = bindings.get(arg).ok_or_else(|| {
                    EngineError::InvalidSchema(format!(
                        "input pattern references unbound variable '{arg}'"
                    ))
                })?;
                resolved.push(value.clone());
            }
            Expr::Call {
                head: head.clone(),
                args: resolved,
            }
        }
    };
    crate::expr::canonicalize(&substituted.render())
}
