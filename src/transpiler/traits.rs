//! Dialect capability trait and identifier escaping.

use chrono::NaiveDateTime;

use crate::ast::{FileFormat, PathSegment};
use crate::error::{KqlError, KqlResult};

/// SQL reserved words that must be quoted when used as identifiers.
pub const RESERVED_WORDS: &[&str] = &[
    "all", "and", "any", "array", "as", "asc", "between", "by", "case", "cast", "check",
    "collate", "column", "constraint", "create", "cross", "current_date", "current_time",
    "current_timestamp", "default", "desc", "distinct", "do", "else", "end", "except", "false",
    "fetch", "for", "foreign", "from", "full", "grant", "group", "having", "in", "inner",
    "intersect", "into", "is", "join", "lateral", "left", "like", "limit", "natural", "not",
    "null", "offset", "on", "only", "or", "order", "outer", "primary", "qualify",
    "references", "right", "select", "table", "then", "to", "true", "union", "unique", "user",
    "using", "when", "where", "window", "with",
];

/// Quote an identifier if it is a reserved word or contains characters that
/// are not valid in a bare SQL identifier.
pub fn escape_identifier(name: &str) -> String {
    let lower = name.to_lowercase();
    let needs_escaping = RESERVED_WORDS.contains(&lower.as_str())
        || name.chars().any(|c| !c.is_alphanumeric() && c != '_')
        || name.chars().next().map(|c| c.is_numeric()).unwrap_or(true);

    if needs_escaping {
        format!("\"{}\"", name.replace('"', "\"\""))
    } else {
        name.to_string()
    }
}

/// Render a string as a single-quoted SQL literal.
pub fn quote_string(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Parenthesize `sql` unless it is a single operand: a name, a number, a call,
/// a bracketed group or a typed literal such as `INTERVAL '1 day'`.
///
/// Used wherever rendered SQL is spliced into an arithmetic template.
pub fn paren_if_compound(sql: &str) -> String {
    if is_operand(sql) {
        sql.to_string()
    } else {
        format!("({})", sql)
    }
}

fn is_operand(sql: &str) -> bool {
    if sql.is_empty() || is_typed_literal(sql) {
        return true;
    }
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for c in sql.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '\'' | '"' => quote = Some(c),
                '(' | '[' => depth += 1,
                ')' | ']' => depth = depth.saturating_sub(1),
                _ if depth > 0 => {}
                c if c.is_whitespace() => return false,
                '+' | '-' | '*' | '/' | '%' | '<' | '>' | '=' | '!' | '|' | '&' | '^' | ':' => {
                    return false;
                }
                _ => {}
            },
        }
    }
    true
}

/// `KEYWORD '...'` with nothing after the closing quote.
fn is_typed_literal(sql: &str) -> bool {
    let Some((keyword, rest)) = sql.split_once(' ') else {
        return false;
    };
    keyword.chars().all(|c| c.is_ascii_alphabetic())
        && rest.len() >= 2
        && rest.starts_with('\'')
        && rest.ends_with('\'')
        && !rest[1..rest.len() - 1].replace("''", "").contains('\'')
}

/// SQL produced by a dialect's array expansion primitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expansion {
    /// Select-list expression yielding one element per row.
    pub value: String,
    /// Extra `FROM` clause the value depends on, if any.
    pub join: Option<String>,
}

/// Engine-specific SQL syntax, function names and type names.
///
/// Implementations are stateless; one instance is shared by every
/// translation running on a [`Transpiler`](super::Transpiler).
pub trait SqlDialect: Send + Sync {
    /// Short lowercase name, e.g. `duckdb`.
    fn name(&self) -> &'static str;

    /// Quote an identifier (table or column name).
    fn quote_identifier(&self, name: &str) -> String {
        escape_identifier(name)
    }

    /// Translate a scalar function call. `None` when the dialect has no rule.
    fn translate_function(&self, name: &str, args: &[String]) -> Option<String>;

    /// Translate an aggregate call. `None` when the dialect has no rule.
    fn translate_aggregate(&self, name: &str, args: &[String]) -> Option<String>;

    /// Scalar function names this dialect translates.
    fn function_names(&self) -> Vec<&'static str>;

    /// Aggregate function names this dialect translates.
    fn aggregate_names(&self) -> Vec<&'static str>;

    /// Map a source type name (`long`, `string`, `dynamic`, ...) to the engine type.
    fn map_type(&self, kql_type: &str) -> KqlResult<&'static str>;

    /// Keyword for case-insensitive `LIKE`.
    fn case_insensitive_like(&self) -> &'static str {
        "ILIKE"
    }

    /// Field or element access on a JSON / record value.
    fn json_access(&self, base: &str, path: &[PathSegment]) -> String;

    /// Select-list text for "every column except `exclude`".
    ///
    /// `columns` is the relation's column list when known.
    fn select_exclude(
        &self,
        qualifier: Option<&str>,
        exclude: &[String],
        columns: Option<&[String]>,
    ) -> KqlResult<String>;

    /// Select-list text renaming `(new, old)` pairs and keeping everything else.
    fn select_rename(
        &self,
        renames: &[(String, String)],
        columns: Option<&[String]>,
    ) -> KqlResult<String>;

    /// `*` with some columns overwritten by `(sql, name)` pairs, for a
    /// relation whose column list is unknown.
    fn select_replace(&self, replacements: &[(String, String)]) -> KqlResult<String>;

    /// Select-list text putting `first` ahead of the remaining columns.
    fn select_reorder(&self, first: &[String], columns: Option<&[String]>) -> KqlResult<String> {
        let mut items: Vec<String> = first.iter().map(|c| self.quote_identifier(c)).collect();
        items.push(self.select_exclude(None, first, columns)?);
        Ok(items.join(", "))
    }

    /// Keep the rows of `inner` for which `window predicate` holds, e.g.
    /// `ROW_NUMBER() OVER (...)` and `= 1`. Produces a complete query.
    fn qualify(
        &self,
        inner: &str,
        window: &str,
        predicate: &str,
        columns: Option<&[String]>,
    ) -> String;

    /// `FROM` item producing one row per value of a series.
    fn generate_series(
        &self,
        alias: &str,
        column: &str,
        start: &str,
        end: &str,
        step: &str,
    ) -> String {
        format!(
            "generate_series({}, {}, {}) AS {}({})",
            start,
            end,
            step,
            alias,
            self.quote_identifier(column)
        )
    }

    /// Expand an array column of `source_alias` into one row per element,
    /// optionally converting each element to `cast`.
    fn unnest(
        &self,
        source_alias: &str,
        column: &str,
        target_alias: &str,
        cast: Option<&str>,
    ) -> Expansion;

    /// Timestamp to milliseconds since the Unix epoch.
    fn epoch_millis(&self, timestamp: &str) -> String;

    /// Milliseconds since the Unix epoch to timestamp.
    fn from_epoch_millis(&self, millis: &str) -> String;

    fn timestamp_literal(&self, value: &NaiveDateTime) -> String {
        format!("TIMESTAMP '{}'", value.format("%Y-%m-%d %H:%M:%S%.f"))
    }

    fn interval_literal(&self, millis: i64) -> String {
        format!("INTERVAL '{} milliseconds'", millis)
    }

    /// Bulk-load statement for `.ingest into`.
    fn copy_from(
        &self,
        table: &str,
        path: &str,
        format: FileFormat,
        header: bool,
    ) -> KqlResult<String>;

    /// Generate string concatenation expression.
    fn string_concat(&self, parts: &[String]) -> String {
        parts.join(" || ")
    }
}

/// Error for a column-list operation on a relation whose columns are unknown.
pub fn unknown_columns(construct: &str) -> KqlError {
    KqlError::unsupported(format!("{} on a relation with unknown columns", construct))
}
