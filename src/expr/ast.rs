//! The key expression grammar:
//!
//! ```text
//! expr  := atom | call
//! atom  := identifier
//! call  := identifier '(' args? ')'
//! args  := term (',' term)*
//! term  := identifier
//! ```
//!
//! Only identifiers appear as arguments — there are no literals, operators,
//! or nested calls. An expression is a pattern iff it is a call with at
//! least one argument; otherwise it is concrete.

use std::collections::BTreeSet;

/// A parsed key expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expr {
    Atom(String),
    Call { head: String, args: Vec<String> },
}

impl Expr {
    pub fn head(&self) -> &str {
        match self {
            Expr::Atom(name) => name,
            Expr::Call { head, .. } => head,
        }
    }

    pub fn arity(&self) -> usize {
        self.args().len()
    }

    pub fn args(&self) -> &[String] {
        match self {
            Expr::Atom(_) => &[],
            Expr::Call { args, .. } => args,
        }
    }

    /// A call with at least one argument is a pattern; atoms and zero-arity
    /// calls are concrete.
    pub fn is_pattern(&self) -> bool {
        matches!(self, Expr::Call { .. }) && self.arity() >= 1
    }

    /// Render back to the grammar's canonical textual form: no whitespace,
    /// arguments comma-separated in declared order.
    pub fn render(&self) -> String {
        match self {
            Expr::Atom(name) => name.clone(),
            Expr::Call { head, args } => format!("{head}({})", args.join(",")),
        }
    }

    /// Set of argument identifiers; empty for an atom.
    pub fn extract_variables(&self) -> BTreeSet<String> {
        self.args().iter().cloned().collect()
    }
}
