//! Built-in dialects and the function rules they share.
//!
//! Each dialect matches its own special cases first and falls back to
//! [`common_function`] / [`common_aggregate`] for SQL that both engines accept.

pub mod duckdb;
pub mod postgres;

use super::traits::{paren_if_compound, SqlDialect};

/// Scalar functions every built-in dialect translates.
pub const COMMON_FUNCTIONS: &[&str] = &[
    "abs",
    "ago",
    "case",
    "ceiling",
    "coalesce",
    "exp",
    "getmonth",
    "getyear",
    "hourofday",
    "iff",
    "iif",
    "indexof",
    "isempty",
    "isnotempty",
    "isnotnull",
    "isnull",
    "log",
    "log10",
    "not",
    "now",
    "parse_json",
    "pow",
    "replace_string",
    "reverse",
    "round",
    "sqrt",
    "startofday",
    "startofmonth",
    "startofweek",
    "startofyear",
    "strcat",
    "strcat_delim",
    "strlen",
    "substring",
    "tobool",
    "todatetime",
    "todecimal",
    "todouble",
    "todynamic",
    "toguid",
    "toint",
    "tolong",
    "tolower",
    "toreal",
    "tostring",
    "toupper",
    "trim",
    "trim_end",
    "trim_start",
    "unixtime_milliseconds_todatetime",
];

/// Aggregates every built-in dialect translates.
pub const COMMON_AGGREGATES: &[&str] = &[
    "avg", "avgif", "count", "countif", "dcount", "dcountif", "max", "min", "stdev", "sum",
    "sumif", "variance",
];

fn cast(dialect: &dyn SqlDialect, value: &str, kql_type: &str) -> Option<String> {
    let ty = dialect.map_type(kql_type).ok()?;
    Some(format!("CAST({} AS {})", value, ty))
}

/// `trim*` only supports the whitespace patterns; anything else has no rule.
fn is_whitespace_pattern(pattern: &str) -> bool {
    matches!(pattern, "' '" | r"'\s'" | r"'\s+'" | r"'\s*'")
}

pub fn common_function(dialect: &dyn SqlDialect, name: &str, args: &[String]) -> Option<String> {
    let sql = match (name, args) {
        ("strlen", [s]) => format!("LENGTH({})", s),
        ("toupper", [s]) => format!("UPPER({})", s),
        ("tolower", [s]) => format!("LOWER({})", s),
        // Source offsets are 0-based.
        ("substring", [s, start]) => {
            format!("SUBSTRING({}, {} + 1)", s, paren_if_compound(start))
        }
        ("substring", [s, start, len]) => format!(
            "SUBSTRING({}, {} + 1, {})",
            s,
            paren_if_compound(start),
            len
        ),
        ("strcat", parts) if !parts.is_empty() => format!("CONCAT({})", parts.join(", ")),
        ("strcat_delim", [delim, parts @ ..]) if !parts.is_empty() => {
            format!("CONCAT_WS({}, {})", delim, parts.join(", "))
        }
        ("replace_string", [s, lookup, rewrite]) => {
            format!("REPLACE({}, {}, {})", s, lookup, rewrite)
        }
        ("indexof", [s, lookup]) => format!("(STRPOS({}, {}) - 1)", s, lookup),
        ("reverse", [s]) => format!("REVERSE({})", s),
        ("trim", [pattern, s]) if is_whitespace_pattern(pattern) => format!("TRIM({})", s),
        ("trim_start", [pattern, s]) if is_whitespace_pattern(pattern) => {
            format!("LTRIM({})", s)
        }
        ("trim_end", [pattern, s]) if is_whitespace_pattern(pattern) => format!("RTRIM({})", s),
        ("isempty", [x]) => format!("({} IS NULL OR {} = '')", x, cast(dialect, x, "string")?),
        ("isnotempty", [x]) => {
            format!("({} IS NOT NULL AND {} != '')", x, cast(dialect, x, "string")?)
        }
        ("isnull", [x]) => format!("({} IS NULL)", x),
        ("isnotnull", [x]) => format!("({} IS NOT NULL)", x),
        ("iff" | "iif", [cond, then, otherwise]) => {
            format!("CASE WHEN {} THEN {} ELSE {} END", cond, then, otherwise)
        }
        ("case", args) if args.len() >= 3 && args.len() % 2 == 1 => {
            let mut sql = String::from("CASE");
            for pair in args.chunks_exact(2) {
                sql.push_str(&format!(" WHEN {} THEN {}", pair[0], pair[1]));
            }
            sql.push_str(&format!(" ELSE {} END", args[args.len() - 1]));
            sql
        }
        ("coalesce", args) if !args.is_empty() => format!("COALESCE({})", args.join(", ")),
        ("not", [x]) => format!("NOT ({})", x),
        ("now", []) => "NOW()".to_string(),
        ("ago", [span]) => format!("(NOW() - {})", paren_if_compound(span)),
        ("startofday", [d]) => format!("DATE_TRUNC('day', {})", d),
        // Weeks start on Sunday.
        ("startofweek", [d]) => format!(
            "(DATE_TRUNC('week', {} + INTERVAL '1 day') - INTERVAL '1 day')",
            paren_if_compound(d)
        ),
        ("startofmonth", [d]) => format!("DATE_TRUNC('month', {})", d),
        ("startofyear", [d]) => format!("DATE_TRUNC('year', {})", d),
        ("getyear", [d]) => cast(dialect, &format!("EXTRACT(YEAR FROM {})", d), "int")?,
        ("getmonth", [d]) => cast(dialect, &format!("EXTRACT(MONTH FROM {})", d), "int")?,
        ("hourofday", [d]) => cast(dialect, &format!("EXTRACT(HOUR FROM {})", d), "int")?,
        ("unixtime_milliseconds_todatetime", [x]) => dialect.from_epoch_millis(x),
        ("abs", [x]) => format!("ABS({})", x),
        ("round", [x]) => format!("ROUND({})", x),
        ("ceiling", [x]) => format!("CEIL({})", x),
        ("sqrt", [x]) => format!("SQRT({})", x),
        ("exp", [x]) => format!("EXP({})", x),
        ("log", [x]) => format!("LN({})", x),
        ("log10", [x]) => format!("LOG10({})", x),
        ("pow", [x, y]) => format!("POWER({}, {})", x, y),
        ("tostring", [x]) => cast(dialect, x, "string")?,
        ("toint", [x]) => cast(dialect, x, "int")?,
        ("tolong", [x]) => cast(dialect, x, "long")?,
        ("toreal" | "todouble", [x]) => cast(dialect, x, "real")?,
        ("todecimal", [x]) => cast(dialect, x, "decimal")?,
        ("tobool", [x]) => cast(dialect, x, "bool")?,
        ("todatetime", [x]) => cast(dialect, x, "datetime")?,
        ("toguid", [x]) => cast(dialect, x, "guid")?,
        ("todynamic" | "parse_json", [x]) => cast(dialect, x, "dynamic")?,
        _ => return None,
    };
    Some(sql)
}

pub fn common_aggregate(name: &str, args: &[String]) -> Option<String> {
    let sql = match (name, args) {
        ("count", []) => "COUNT(*)".to_string(),
        ("count", [x]) => format!("COUNT({})", x),
        ("countif", [pred]) => format!("COUNT(*) FILTER (WHERE {})", pred),
        ("dcount", [x] | [x, _]) => format!("COUNT(DISTINCT {})", x),
        ("dcountif", [x, pred] | [x, pred, _]) => {
            format!("COUNT(DISTINCT {}) FILTER (WHERE {})", x, pred)
        }
        ("sum", [x]) => format!("SUM({})", x),
        ("sumif", [x, pred]) => format!("SUM({}) FILTER (WHERE {})", x, pred),
        ("avg", [x]) => format!("AVG({})", x),
        ("avgif", [x, pred]) => format!("AVG({}) FILTER (WHERE {})", x, pred),
        ("min", [x]) => format!("MIN({})", x),
        ("max", [x]) => format!("MAX({})", x),
        ("stdev", [x]) => format!("STDDEV_SAMP({})", x),
        ("variance", [x]) => format!("VAR_SAMP({})", x),
        _ => return None,
    };
    Some(sql)
}

/// Merge the shared names with a dialect's own, sorted and deduplicated.
pub fn merge_names(common: &[&'static str], own: &[&'static str]) -> Vec<&'static str> {
    let mut names: Vec<&'static str> = common.iter().chain(own).copied().collect();
    names.sort_unstable();
    names.dedup();
    names
}
