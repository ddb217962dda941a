//! SQL Transpiler.
//!
//! Converts parsed statements into SQL text for a target engine.
//!
//! ```
//! use kql2sql::transpiler::{Dialect, Transpiler};
//!
//! let sql = Transpiler::new(Dialect::DuckDb)
//!     .convert("StormEvents | where State == 'TEXAS' | take 10")
//!     .unwrap();
//! assert_eq!(sql, "SELECT * FROM StormEvents WHERE State = 'TEXAS' LIMIT 10");
//! ```

pub mod command;
pub mod dialect;
pub mod expr;
pub mod pipeline;
pub mod select;
pub mod sql;
pub mod statement;
pub mod traits;

use std::sync::Arc;

use crate::ast::Statement;
use crate::catalog::Catalog;
use crate::error::KqlResult;
use crate::parser;

pub use dialect::Dialect;
pub use statement::StatementDriver;
pub use traits::{escape_identifier, SqlDialect};

/// Compiles query text for one dialect. Cheap to clone and safe to share
/// between threads; every call to [`convert`](Self::convert) is independent.
#[derive(Clone)]
pub struct Transpiler {
    dialect: Arc<dyn SqlDialect>,
    catalog: Arc<Catalog>,
}

impl Transpiler {
    pub fn new(dialect: Dialect) -> Self {
        Self::with_generator(dialect.generator())
    }

    /// Use a custom dialect implementation.
    pub fn with_generator(dialect: Arc<dyn SqlDialect>) -> Self {
        Self {
            dialect,
            catalog: Arc::new(Catalog::default()),
        }
    }

    pub fn with_catalog(mut self, catalog: Catalog) -> Self {
        self.catalog = Arc::new(catalog);
        self
    }

    pub fn dialect(&self) -> &dyn SqlDialect {
        self.dialect.as_ref()
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Every scalar function name a query may call: the dialect's table plus
    /// the ones translated independently of the dialect (`bin`, `floor`).
    pub fn function_names(&self) -> Vec<&'static str> {
        sql::merge_names(expr::BUILTIN_FUNCTIONS, &self.dialect.function_names())
    }

    /// Parse and translate a full script: `let`s, then one query or command.
    pub fn convert(&self, query: &str) -> KqlResult<String> {
        let statements = parser::parse(query)?;
        tracing::debug!(
            dialect = self.dialect.name(),
            statements = statements.len(),
            "converting"
        );
        self.convert_statements(&statements)
    }

    /// Translate already parsed statements.
    pub fn convert_statements(&self, statements: &[Statement]) -> KqlResult<String> {
        StatementDriver::new(self).convert(statements)
    }
}

impl Default for Transpiler {
    fn default() -> Self {
        Self::new(Dialect::default())
    }
}

impl std::fmt::Debug for Transpiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transpiler")
            .field("dialect", &self.dialect.name())
            .field("tables", &self.catalog.len())
            .finish()
    }
}
