//! Table catalog
//!
//! Optional knowledge of each table's ordered column list. Dialects without
//! column-exclusion syntax need it to spell out select lists.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{KqlError, KqlResult};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Catalog {
    tables: BTreeMap<String, Vec<String>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with_table(mut self, name: impl Into<String>, columns: &[&str]) -> Self {
        self.insert(name, columns.iter().map(|c| c.to_string()).collect());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, columns: Vec<String>) {
        let name = name.into();
        tracing::debug!("Registered columns for table: {}", name);
        self.tables.insert(name, columns);
    }

    pub fn columns(&self, table: &str) -> Option<&[String]> {
        self.tables.get(table).map(Vec::as_slice)
    }

    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Load a standalone TOML table map, e.g. `Events = ["ts", "name"]`.
    pub fn from_toml(content: &str) -> KqlResult<Self> {
        let catalog: Catalog = toml::from_str(content)
            .map_err(|e| KqlError::Config(format!("Failed to parse catalog: {}", e)))?;
        tracing::info!("Loaded {} table schemas", catalog.len());
        Ok(catalog)
    }
}
