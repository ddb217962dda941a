use crate::ast::{FileFormat, PathSegment};
use crate::error::{KqlError, KqlResult};
use crate::transpiler::sql::{
    common_aggregate, common_function, merge_names, COMMON_AGGREGATES, COMMON_FUNCTIONS,
};
use crate::transpiler::traits::{
    paren_if_compound, quote_string, unknown_columns, Expansion, SqlDialect,
};

/// Postgres-compatible engine.
///
/// There is no `EXCLUDE` / `RENAME` / `QUALIFY` syntax, so column-list
/// operations enumerate the relation's columns and window filters go through
/// a ranked subquery.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    pub fn new() -> Self {
        Self
    }

    fn qualified(&self, qualifier: Option<&str>, column: &str) -> String {
        match qualifier {
            Some(q) => format!("{}.{}", q, self.quote_identifier(column)),
            None => self.quote_identifier(column),
        }
    }
}

const FUNCTIONS: &[&str] = &["array_length", "dayofweek", "extract", "round", "split"];

const AGGREGATES: &[&str] = &[
    "any", "arg_max", "arg_min", "make_list", "make_set", "percentile", "take_any",
];

impl SqlDialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn translate_function(&self, name: &str, args: &[String]) -> Option<String> {
        let sql = match (name, args) {
            ("round", [x, digits]) => format!("ROUND(CAST({} AS NUMERIC), {})", x, digits),
            ("split", [s, delim]) => format!("TO_JSONB(STRING_TO_ARRAY({}, {}))", s, delim),
            // Group 0 is the whole match; REGEXP_MATCH only returns groups.
            ("extract", [regex, group, s]) if group == "0" => {
                format!("(REGEXP_MATCH({}, CONCAT('(', {}, ')')))[1]", s, regex)
            }
            ("extract", [regex, group, s]) => format!("(REGEXP_MATCH({}, {}))[{}]", s, regex, group),
            ("array_length", [a]) => format!("JSONB_ARRAY_LENGTH(TO_JSONB({}))", a),
            ("dayofweek", [d]) => format!("(EXTRACT(DOW FROM {}) * INTERVAL '1 day')", d),
            _ => return common_function(self, name, args),
        };
        Some(sql)
    }

    fn translate_aggregate(&self, name: &str, args: &[String]) -> Option<String> {
        let sql = match (name, args) {
            ("make_list", [x]) => format!("JSONB_AGG({})", x),
            ("make_set", [x]) => format!("JSONB_AGG(DISTINCT {})", x),
            ("percentile", [x, p]) => {
                format!(
                    "PERCENTILE_CONT({} / 100.0) WITHIN GROUP (ORDER BY {})",
                    paren_if_compound(p),
                    x
                )
            }
            ("take_any" | "any", [x]) => format!("(ARRAY_AGG({}))[1]", x),
            ("arg_max", [by, value]) => {
                format!("(ARRAY_AGG({} ORDER BY {} DESC NULLS LAST))[1]", value, by)
            }
            ("arg_min", [by, value]) => {
                format!("(ARRAY_AGG({} ORDER BY {} ASC NULLS LAST))[1]", value, by)
            }
            _ => return common_aggregate(name, args),
        };
        Some(sql)
    }

    fn function_names(&self) -> Vec<&'static str> {
        merge_names(COMMON_FUNCTIONS, FUNCTIONS)
    }

    fn aggregate_names(&self) -> Vec<&'static str> {
        merge_names(COMMON_AGGREGATES, AGGREGATES)
    }

    fn map_type(&self, kql_type: &str) -> KqlResult<&'static str> {
        Ok(match kql_type {
            "bool" | "boolean" => "BOOLEAN",
            "int" => "INTEGER",
            "long" => "BIGINT",
            "real" | "double" => "DOUBLE PRECISION",
            "decimal" => "NUMERIC",
            "datetime" => "TIMESTAMP",
            "date" => "DATE",
            "string" => "TEXT",
            "dynamic" => "JSONB",
            "guid" => "UUID",
            "timespan" | "time" => "INTERVAL",
            other => return Err(KqlError::unsupported(format!("type {}", other))),
        })
    }

    fn json_access(&self, base: &str, path: &[PathSegment]) -> String {
        let mut sql = base.to_string();
        for (i, segment) in path.iter().enumerate() {
            // -> keeps jsonb for intermediates, ->> yields text at the end
            let op = if i == path.len() - 1 { "->>" } else { "->" };
            match segment {
                PathSegment::Key(key) => sql.push_str(&format!("{}{}", op, quote_string(key))),
                PathSegment::Index(index) => sql.push_str(&format!("{}{}", op, index)),
            }
        }
        sql
    }

    fn select_exclude(
        &self,
        qualifier: Option<&str>,
        exclude: &[String],
        columns: Option<&[String]>,
    ) -> KqlResult<String> {
        let columns = columns.ok_or_else(|| unknown_columns("project-away"))?;
        let kept: Vec<String> = columns
            .iter()
            .filter(|c| !exclude.contains(*c))
            .map(|c| self.qualified(qualifier, c))
            .collect();
        if kept.is_empty() {
            return Err(KqlError::unsupported("project-away of every column"));
        }
        Ok(kept.join(", "))
    }

    fn select_rename(
        &self,
        renames: &[(String, String)],
        columns: Option<&[String]>,
    ) -> KqlResult<String> {
        let columns = columns.ok_or_else(|| unknown_columns("project-rename"))?;
        let items: Vec<String> = columns
            .iter()
            .map(|c| match renames.iter().find(|(_, old)| old == c) {
                Some((new, old)) => format!(
                    "{} AS {}",
                    self.quote_identifier(old),
                    self.quote_identifier(new)
                ),
                None => self.quote_identifier(c),
            })
            .collect();
        Ok(items.join(", "))
    }

    fn select_replace(&self, _replacements: &[(String, String)]) -> KqlResult<String> {
        Err(unknown_columns("extend"))
    }

    fn select_reorder(&self, first: &[String], columns: Option<&[String]>) -> KqlResult<String> {
        let columns = columns.ok_or_else(|| unknown_columns("project-reorder"))?;
        let items: Vec<String> = first
            .iter()
            .chain(columns.iter().filter(|c| !first.contains(*c)))
            .map(|c| self.quote_identifier(c))
            .collect();
        Ok(items.join(", "))
    }

    fn qualify(
        &self,
        inner: &str,
        window: &str,
        predicate: &str,
        columns: Option<&[String]>,
    ) -> String {
        match columns {
            Some(columns) => {
                let names: Vec<String> =
                    columns.iter().map(|c| self.quote_identifier(c)).collect();
                format!(
                    "SELECT {} FROM (SELECT *, {} AS _rn FROM ({}) AS _s) AS _q WHERE _q._rn {}",
                    names.join(", "),
                    window,
                    inner,
                    predicate
                )
            }
            // Carry each row as a composite value so the ranking column can be
            // dropped without knowing the column names.
            None => format!(
                "SELECT (_q._row).* FROM (SELECT _s AS _row, {} AS _rn FROM ({}) AS _s) AS _q WHERE _q._rn {}",
                window, inner, predicate
            ),
        }
    }

    fn unnest(
        &self,
        source_alias: &str,
        column: &str,
        target_alias: &str,
        cast: Option<&str>,
    ) -> Expansion {
        let name = self.quote_identifier(column);
        let element = format!("{}.{}", target_alias, name);
        let value = match cast {
            Some(ty) => format!("CAST({} #>> '{{}}' AS {})", element, ty),
            None => element,
        };
        Expansion {
            value,
            join: Some(format!(
                "CROSS JOIN LATERAL jsonb_array_elements(TO_JSONB({}.{})) AS {}({})",
                source_alias, name, target_alias, name
            )),
        }
    }

    fn epoch_millis(&self, timestamp: &str) -> String {
        format!("(EXTRACT(EPOCH FROM {}) * 1000)", timestamp)
    }

    fn from_epoch_millis(&self, millis: &str) -> String {
        format!("(TO_TIMESTAMP(({}) / 1000.0) AT TIME ZONE 'UTC')", millis)
    }

    fn copy_from(
        &self,
        table: &str,
        path: &str,
        format: FileFormat,
        header: bool,
    ) -> KqlResult<String> {
        match format {
            FileFormat::Csv => Ok(format!(
                "COPY {} FROM {} WITH (FORMAT csv, HEADER {})",
                table,
                quote_string(path),
                header
            )),
            other => Err(KqlError::unsupported(format!("format={}", other))),
        }
    }
}
