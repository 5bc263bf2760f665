//! The expression parser & canonicalizer.
//!
//! The key expression grammar — `atom | head(arg, arg, ...)` with bare
//! identifiers as arguments — is small enough for a hand-written lexer and
//! recursive-descent parser rather than pulling in a parser-combinator
//! crate. `canonicalize` is the only entry point most callers need;
//! `parse`/`Expr` are exposed for the schema compiler and unifier.

pub mod ast;
pub mod lexer;
pub mod parser;

pub use ast::Expr;
pub use parser::{canonicalize, parse};
