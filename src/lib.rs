//! # kql2sql
//!
//! Compiles pipe-oriented analytics queries into SQL for DuckDB and
//! Postgres-compatible engines.
//!
//! ## Quick Example
//!
//! ```
//! use kql2sql::prelude::*;
//!
//! let sql = Transpiler::new(Dialect::Postgres)
//!     .convert("StormEvents | summarize events = count() by State | top 3 by events")
//!     .unwrap();
//! assert_eq!(
//!     sql,
//!     "SELECT State, COUNT(*) AS events FROM StormEvents GROUP BY State ORDER BY events DESC LIMIT 3"
//! );
//! ```
//!
//! ## Pieces
//!
//! | Stage          | Module                  |
//! |----------------|-------------------------|
//! | Text → tree    | [`parser`]              |
//! | `let` / CTEs   | [`transpiler::statement`] |
//! | Pipe operators | [`transpiler::pipeline`]  |
//! | Expressions    | [`transpiler::expr`]      |
//! | Engine syntax  | [`transpiler::sql`]       |

pub mod ast;
pub mod catalog;
pub mod config;
pub mod error;
pub mod parser;
pub mod transpiler;

pub mod prelude {
    pub use crate::ast::*;
    pub use crate::catalog::Catalog;
    pub use crate::config::Config;
    pub use crate::error::*;
    pub use crate::parser::parse;
    pub use crate::transpiler::{Dialect, SqlDialect, Transpiler};
}

/// Parse a script into statements.
///
/// # Example
///
/// ```
/// use kql2sql::{ast::Statement, parse};
///
/// let stmts = parse("let n = 5; T | where x > n").unwrap();
/// assert_eq!(stmts.len(), 2);
/// assert!(matches!(stmts[1], Statement::Query(_)));
/// ```
pub fn parse(input: &str) -> error::KqlResult<Vec<ast::Statement>> {
    parser::parse(input)
}

/// Convert a script to SQL for the default dialect (DuckDB).
pub fn convert(query: &str) -> error::KqlResult<String> {
    transpiler::Transpiler::default().convert(query)
}
