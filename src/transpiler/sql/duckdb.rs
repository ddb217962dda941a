use crate::ast::{FileFormat, PathSegment};
use crate::error::{KqlError, KqlResult};
use crate::transpiler::sql::{
    common_aggregate, common_function, merge_names, COMMON_AGGREGATES, COMMON_FUNCTIONS,
};
use crate::transpiler::traits::{paren_if_compound, quote_string, Expansion, SqlDialect};

/// Embedded analytics engine. Has native `EXCLUDE`, `RENAME` and `QUALIFY`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DuckDbDialect;

impl DuckDbDialect {
    pub fn new() -> Self {
        Self
    }
}

const FUNCTIONS: &[&str] = &["array_length", "dayofweek", "extract", "round", "split"];

const AGGREGATES: &[&str] = &[
    "any", "arg_max", "arg_min", "make_list", "make_set", "percentile", "take_any",
];

/// `$.a[0]."odd key"`
fn json_path(path: &[PathSegment]) -> String {
    let mut out = String::from("$");
    for segment in path {
        match segment {
            PathSegment::Key(key) if key.chars().all(|c| c.is_alphanumeric() || c == '_') => {
                out.push('.');
                out.push_str(key);
            }
            PathSegment::Key(key) => out.push_str(&format!(".\"{}\"", key.replace('"', "\\\""))),
            PathSegment::Index(i) => out.push_str(&format!("[{}]", i)),
        }
    }
    out
}

impl SqlDialect for DuckDbDialect {
    fn name(&self) -> &'static str {
        "duckdb"
    }

    fn translate_function(&self, name: &str, args: &[String]) -> Option<String> {
        let sql = match (name, args) {
            ("round", [x, digits]) => format!("ROUND({}, {})", x, digits),
            ("split", [s, delim]) => format!("STRING_SPLIT({}, {})", s, delim),
            ("extract", [regex, group, s]) => {
                format!("REGEXP_EXTRACT({}, {}, {})", s, regex, group)
            }
            ("array_length", [a]) => format!("JSON_ARRAY_LENGTH(CAST({} AS JSON))", a),
            ("dayofweek", [d]) => format!("TO_DAYS(CAST(EXTRACT(DOW FROM {}) AS INTEGER))", d),
            _ => return common_function(self, name, args),
        };
        Some(sql)
    }

    fn translate_aggregate(&self, name: &str, args: &[String]) -> Option<String> {
        let sql = match (name, args) {
            ("make_list", [x]) => format!("LIST({})", x),
            ("make_set", [x]) => format!("LIST(DISTINCT {})", x),
            ("percentile", [x, p]) => {
                format!("QUANTILE_CONT({}, {} / 100.0)", x, paren_if_compound(p))
            }
            ("take_any" | "any", [x]) => format!("ANY_VALUE({})", x),
            ("arg_max", [by, value]) => format!("ARG_MAX({}, {})", value, by),
            ("arg_min", [by, value]) => format!("ARG_MIN({}, {})", value, by),
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
            "real" | "double" => "DOUBLE",
            "decimal" => "DECIMAL(38, 18)",
            "datetime" => "TIMESTAMP",
            "date" => "DATE",
            "string" => "VARCHAR",
            "dynamic" => "JSON",
            "guid" => "UUID",
            "timespan" | "time" => "INTERVAL",
            other => return Err(KqlError::unsupported(format!("type {}", other))),
        })
    }

    fn json_access(&self, base: &str, path: &[PathSegment]) -> String {
        format!("json_extract_string({}, '{}')", base, json_path(path))
    }

    fn select_exclude(
        &self,
        qualifier: Option<&str>,
        exclude: &[String],
        _columns: Option<&[String]>,
    ) -> KqlResult<String> {
        let names: Vec<String> = exclude.iter().map(|c| self.quote_identifier(c)).collect();
        let star = match qualifier {
            Some(q) => format!("{}.*", q),
            None => "*".to_string(),
        };
        Ok(format!("{} EXCLUDE ({})", star, names.join(", ")))
    }

    fn select_rename(
        &self,
        renames: &[(String, String)],
        _columns: Option<&[String]>,
    ) -> KqlResult<String> {
        let pairs: Vec<String> = renames
            .iter()
            .map(|(new, old)| {
                format!("{} AS {}", self.quote_identifier(old), self.quote_identifier(new))
            })
            .collect();
        Ok(format!("* RENAME ({})", pairs.join(", ")))
    }

    fn select_replace(&self, replacements: &[(String, String)]) -> KqlResult<String> {
        let pairs: Vec<String> = replacements
            .iter()
            .map(|(sql, name)| format!("{} AS {}", sql, self.quote_identifier(name)))
            .collect();
        Ok(format!("* REPLACE ({})", pairs.join(", ")))
    }

    fn qualify(
        &self,
        inner: &str,
        window: &str,
        predicate: &str,
        _columns: Option<&[String]>,
    ) -> String {
        format!(
            "SELECT * FROM ({}) AS _w QUALIFY {} {}",
            inner, window, predicate
        )
    }

    fn unnest(
        &self,
        source_alias: &str,
        column: &str,
        _target_alias: &str,
        cast: Option<&str>,
    ) -> Expansion {
        let element = cast.unwrap_or("JSON");
        Expansion {
            value: format!(
                "UNNEST(CAST({}.{} AS {}[]))",
                source_alias,
                self.quote_identifier(column),
                element
            ),
            join: None,
        }
    }

    fn epoch_millis(&self, timestamp: &str) -> String {
        format!("epoch_ms({})", timestamp)
    }

    fn from_epoch_millis(&self, millis: &str) -> String {
        format!("epoch_ms(CAST({} AS BIGINT))", millis)
    }

    fn copy_from(
        &self,
        table: &str,
        path: &str,
        format: FileFormat,
        header: bool,
    ) -> KqlResult<String> {
        let options = match format {
            FileFormat::Csv => format!("FORMAT csv, HEADER {}, AUTO_DETECT true", header),
            FileFormat::Json => "FORMAT json, AUTO_DETECT true".to_string(),
            FileFormat::Parquet => "FORMAT parquet".to_string(),
        };
        Ok(format!(
            "COPY {} FROM {} ({})",
            table,
            quote_string(path),
            options
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_map() {
        let d = DuckDbDialect;
        assert_eq!(d.map_type("long").unwrap(), "BIGINT");
        assert_eq!(d.map_type("dynamic").unwrap(), "JSON");
        let err = d.map_type("blob").unwrap_err();
        assert_eq!(err.construct(), Some("type blob"));
    }

    #[test]
    fn test_exclude_and_rename() {
        let d = DuckDbDialect;
        assert_eq!(
            d.select_exclude(Some("_src"), &["tags".into()], None).unwrap(),
            "_src.* EXCLUDE (tags)"
        );
        assert_eq!(
            d.select_rename(&[("b".into(), "a".into())], None).unwrap(),
            "* RENAME (a AS b)"
        );
        assert_eq!(
            d.select_reorder(&["c".into()], None).unwrap(),
            "c, * EXCLUDE (c)"
        );
    }

    #[test]
    fn test_json_access() {
        let d = DuckDbDialect;
        let path = vec![PathSegment::Key("a".into()), PathSegment::Index(0)];
        assert_eq!(d.json_access("props", &path), "json_extract_string(props, '$.a[0]')");
    }

    #[test]
    fn test_arg_max_argument_order() {
        let d = DuckDbDialect;
        let sql = d.translate_aggregate("arg_max", &["ts".into(), "name".into()]);
        assert_eq!(sql.as_deref(), Some("ARG_MAX(name, ts)"));
    }

    #[test]
    fn test_copy_csv() {
        let d = DuckDbDialect;
        assert_eq!(
            d.copy_from("T", "a.csv", FileFormat::Csv, true).unwrap(),
            "COPY T FROM 'a.csv' (FORMAT csv, HEADER true, AUTO_DETECT true)"
        );
    }
}
