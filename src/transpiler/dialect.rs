use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::KqlError;
use crate::transpiler::sql::duckdb::DuckDbDialect;
use crate::transpiler::sql::postgres::PostgresDialect;
use crate::transpiler::traits::SqlDialect;

/// Built-in target engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    DuckDb,
    Postgres,
}

impl Dialect {
    pub const ALL: &'static [Dialect] = &[Dialect::DuckDb, Dialect::Postgres];

    pub fn generator(&self) -> Arc<dyn SqlDialect> {
        match self {
            Dialect::DuckDb => Arc::new(DuckDbDialect),
            Dialect::Postgres => Arc::new(PostgresDialect),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::DuckDb => write!(f, "duckdb"),
            Dialect::Postgres => write!(f, "postgres"),
        }
    }
}

impl FromStr for Dialect {
    type Err = KqlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "duckdb" => Ok(Dialect::DuckDb),
            "postgres" | "postgresql" | "pg" => Ok(Dialect::Postgres),
            other => Err(KqlError::Config(format!("unknown dialect '{}'", other))),
        }
    }
}
