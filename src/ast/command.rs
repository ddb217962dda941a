//! Administrative dot-commands.

use super::operators::ColumnDef;
use std::fmt;

/// Bulk-load file format for `.ingest into`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileFormat {
    #[default]
    Csv,
    Json,
    Parquet,
}

impl FileFormat {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "csv" => Some(FileFormat::Csv),
            "json" | "multijson" => Some(FileFormat::Json),
            "parquet" => Some(FileFormat::Parquet),
            _ => None,
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileFormat::Csv => write!(f, "csv"),
            FileFormat::Json => write!(f, "json"),
            FileFormat::Parquet => write!(f, "parquet"),
        }
    }
}

/// A dot-command. Embedded queries are kept as text and compiled separately.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `.ingest inline into table T <| rows`
    IngestInline { table: String, data: String },
    /// `.ingest into table T 'path' [with (...)]`
    IngestFile {
        table: String,
        path: String,
        format: FileFormat,
        header: bool,
    },
    /// `.view Name <| query`
    View { name: String, query: String },
    /// `.create table T (c:type, ...)`
    CreateTable {
        table: String,
        columns: Vec<ColumnDef>,
    },
    /// `.drop table T [ifexists]`
    DropTable { table: String, if_exists: bool },
    /// `.set T <| query`
    Set { table: String, query: String },
    /// `.append T <| query`
    Append { table: String, query: String },
}

impl Command {
    pub fn keyword(&self) -> &'static str {
        match self {
            Command::IngestInline { .. } => ".ingest inline",
            Command::IngestFile { .. } => ".ingest",
            Command::View { .. } => ".view",
            Command::CreateTable { .. } => ".create table",
            Command::DropTable { .. } => ".drop table",
            Command::Set { .. } => ".set",
            Command::Append { .. } => ".append",
        }
    }
}
