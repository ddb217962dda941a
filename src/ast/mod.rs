//! Syntax tree produced by the parser and consumed by the transpiler.
//!
//! The tree is split by category: statements (this module), tabular
//! operators ([`operators`]), scalar expressions ([`expr`]) and
//! administrative commands ([`command`]).

pub mod command;
pub mod expr;
pub mod operators;

pub use command::*;
pub use expr::*;
pub use operators::*;

/// A top-level statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `let name = value;`
    Let { name: String, value: LetValue },
    /// The terminal tabular expression.
    Query(Pipeline),
    Command(Command),
}

/// Right-hand side of a `let`.
#[derive(Debug, Clone, PartialEq)]
pub enum LetValue {
    Tabular(Pipeline),
    Scalar(Expr),
}
