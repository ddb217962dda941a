//! Configuration file support.
//!
//! ```toml
//! dialect = "postgres"
//!
//! [tables]
//! Events = ["Timestamp", "State", "EventType"]
//! ```

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::catalog::Catalog;
use crate::error::{KqlError, KqlResult};
use crate::transpiler::{Dialect, Transpiler};

/// File name looked up in the working directory.
pub const LOCAL_CONFIG: &str = "kql2sql.toml";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Default target engine.
    #[serde(default)]
    pub dialect: Dialect,

    /// Known tables and their ordered column lists.
    #[serde(default)]
    pub tables: Catalog,
}

impl Config {
    pub fn from_toml(content: &str) -> KqlResult<Self> {
        toml::from_str(content).map_err(|e| KqlError::Config(format!("Failed to parse config: {}", e)))
    }

    pub fn from_file(path: &Path) -> KqlResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            KqlError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml(&content)?;
        tracing::info!(
            "Loaded config from {} ({} tables)",
            path.display(),
            config.tables.len()
        );
        Ok(config)
    }

    /// Candidate config files, most specific first.
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(LOCAL_CONFIG)];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("kql2sql").join("config.toml"));
        }
        paths
    }

    /// Load `explicit` if given (it must exist), else the first file found on
    /// [`search_paths`](Self::search_paths), else defaults.
    pub fn load(explicit: Option<&Path>) -> KqlResult<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        for path in Self::search_paths() {
            if path.is_file() {
                return Self::from_file(&path);
            }
        }
        tracing::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn catalog(&self) -> &Catalog {
        &self.tables
    }

    /// A transpiler for the configured dialect and catalog.
    pub fn transpiler(&self) -> Transpiler {
        Transpiler::new(self.dialect).with_catalog(self.tables.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config = Config::from_toml(
            r#"
            dialect = "postgres"

            [tables]
            Events = ["ts", "State"]
            "#,
        )
        .unwrap();
        assert_eq!(config.dialect, Dialect::Postgres);
        assert_eq!(
            config.catalog().columns("Events").unwrap(),
            &["ts".to_string(), "State".to_string()]
        );
    }

    #[test]
    fn test_empty_config_is_default() {
        assert_eq!(Config::from_toml("").unwrap(), Config::default());
    }

    #[test]
    fn test_unknown_dialect_rejected() {
        assert!(matches!(
            Config::from_toml("dialect = \"oracle\""),
            Err(KqlError::Config(_))
        ));
    }

    #[test]
    fn test_missing_explicit_file() {
        let err = Config::load(Some(Path::new("/nonexistent/kql2sql.toml"))).unwrap_err();
        assert!(matches!(err, KqlError::Config(_)));
    }

    #[test]
    fn test_transpiler_uses_catalog() {
        let config = Config::from_toml(
            "dialect = \"postgres\"\n[tables]\nT = [\"a\", \"b\"]\n",
        )
        .unwrap();
        assert_eq!(
            config.transpiler().convert("T | project-away b").unwrap(),
            "SELECT a FROM T"
        );
    }
}
