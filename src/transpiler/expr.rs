//! Expression Translator: scalar and aggregate expressions to inline SQL.

use std::collections::BTreeMap;

use crate::ast::*;
use crate::error::{KqlError, KqlResult};
use crate::transpiler::traits::{paren_if_compound, quote_string, SqlDialect};

/// Functions handled here rather than by a dialect table.
pub const BUILTIN_FUNCTIONS: &[&str] = &["bin", "floor"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Scalar,
    /// Inside `summarize`: calls may resolve to aggregates.
    Aggregate,
}

/// Translates expressions for one dialect.
///
/// `scalars` holds the SQL of scalar `let` bindings, substituted wherever the
/// bound name appears.
pub struct ExprTranslator<'a> {
    dialect: &'a dyn SqlDialect,
    scalars: &'a BTreeMap<String, String>,
    sides: Option<(&'a str, &'a str)>,
}

impl<'a> ExprTranslator<'a> {
    pub fn new(dialect: &'a dyn SqlDialect, scalars: &'a BTreeMap<String, String>) -> Self {
        Self {
            dialect,
            scalars,
            sides: None,
        }
    }

    /// Resolve `$left` / `$right` to the given relation aliases.
    pub fn with_sides(mut self, left: &'a str, right: &'a str) -> Self {
        self.sides = Some((left, right));
        self
    }

    pub fn translate(&self, expr: &Expr) -> KqlResult<String> {
        self.expr(expr, Mode::Scalar)
    }

    pub fn translate_aggregate(&self, expr: &Expr) -> KqlResult<String> {
        self.expr(expr, Mode::Aggregate)
    }

    pub fn literal(&self, literal: &Literal) -> KqlResult<String> {
        Ok(match &literal.value {
            LiteralValue::Long(_) | LiteralValue::Real(_) => literal.raw.clone(),
            LiteralValue::Bool(b) => b.to_string(),
            LiteralValue::String(s) => quote_string(s),
            LiteralValue::TimeSpan(ms) => self.dialect.interval_literal(*ms),
            LiteralValue::DateTime(dt) => self.dialect.timestamp_literal(dt),
            LiteralValue::Dynamic(value) => format!(
                "CAST({} AS {})",
                quote_string(&value.to_string()),
                self.dialect.map_type("dynamic")?
            ),
            LiteralValue::Null(ty) if ty.is_empty() => "NULL".to_string(),
            LiteralValue::Null(ty) => format!("CAST(NULL AS {})", self.dialect.map_type(ty)?),
        })
    }

    fn expr(&self, expr: &Expr, mode: Mode) -> KqlResult<String> {
        match expr {
            Expr::Literal(literal) => self.literal(literal),
            Expr::Name(name) => Ok(match self.scalars.get(name) {
                Some(sql) if sql.contains(char::is_whitespace) => format!("({})", sql),
                Some(sql) => sql.clone(),
                None => self.dialect.quote_identifier(name),
            }),
            Expr::JoinSide { side, column } => {
                let (left, right) = self
                    .sides
                    .ok_or_else(|| KqlError::unsupported("$left/$right outside join"))?;
                let alias = match side {
                    JoinSide::Left => left,
                    JoinSide::Right => right,
                };
                Ok(format!("{}.{}", alias, self.dialect.quote_identifier(column)))
            }
            Expr::Star => Ok("*".to_string()),
            Expr::Member { base, path } => {
                let base = self.expr(base, mode)?;
                Ok(self.dialect.json_access(&base, path))
            }
            Expr::Binary { left, op, right } => self.binary(left, *op, right, mode),
            Expr::Negate(inner) => Ok(format!("-{}", paren_if_compound(&self.expr(inner, mode)?))),
            Expr::Paren(inner) => Ok(format!("({})", self.expr(inner, mode)?)),
            Expr::Call { name, args } => self.call(name, args, mode),
            Expr::InList {
                expr,
                list,
                negated,
                case_insensitive,
            } => self.in_list(expr, list, *negated, *case_insensitive, mode),
            Expr::Between {
                expr,
                low,
                high,
                negated,
            } => Ok(format!(
                "{} {}BETWEEN {} AND {}",
                self.expr(expr, mode)?,
                if *negated { "NOT " } else { "" },
                self.expr(low, mode)?,
                self.expr(high, mode)?
            )),
        }
    }

    fn binary(&self, left: &Expr, op: BinaryOp, right: &Expr, mode: Mode) -> KqlResult<String> {
        let sql_op = match op {
            BinaryOp::Str(string_op) => return self.string_match(left, string_op, right, mode),
            BinaryOp::EqNoCase | BinaryOp::NotEqNoCase => {
                let cmp = if op == BinaryOp::EqNoCase { "=" } else { "!=" };
                return Ok(format!(
                    "UPPER({}) {} UPPER({})",
                    self.expr(left, mode)?,
                    cmp,
                    self.expr(right, mode)?
                ));
            }
            BinaryOp::Or => "OR",
            BinaryOp::And => "AND",
            BinaryOp::Eq => "=",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
        };
        Ok(format!(
            "{} {} {}",
            self.expr(left, mode)?,
            sql_op,
            self.expr(right, mode)?
        ))
    }

    /// `has` / `contains` / `startswith` / `endswith` and their variants.
    fn string_match(&self, left: &Expr, op: StringOp, right: &Expr, mode: Mode) -> KqlResult<String> {
        let l = self.expr(left, mode)?;
        let like = if op.case_sensitive {
            "LIKE"
        } else {
            self.dialect.case_insensitive_like()
        };
        let not = if op.negated { "NOT " } else { "" };
        let (prefix, suffix) = match op.kind {
            StringOpKind::Has | StringOpKind::Contains => ("%", "%"),
            StringOpKind::StartsWith => ("", "%"),
            StringOpKind::EndsWith => ("%", ""),
        };

        if let Expr::Literal(Literal {
            value: LiteralValue::String(text),
            ..
        }) = right
        {
            let (escaped, needs_escape) = escape_like(text);
            let pattern = quote_string(&format!("{}{}{}", prefix, escaped, suffix));
            let escape = if needs_escape { " ESCAPE '\\'" } else { "" };
            return Ok(format!("{} {}{} {}{}", l, not, like, pattern, escape));
        }

        let r = self.expr(right, mode)?;
        let mut parts = Vec::new();
        if !prefix.is_empty() {
            parts.push(quote_string(prefix));
        }
        parts.push(r);
        if !suffix.is_empty() {
            parts.push(quote_string(suffix));
        }
        Ok(format!(
            "{} {}{} ({})",
            l,
            not,
            like,
            self.dialect.string_concat(&parts)
        ))
    }

    fn in_list(
        &self,
        expr: &Expr,
        list: &[Expr],
        negated: bool,
        case_insensitive: bool,
        mode: Mode,
    ) -> KqlResult<String> {
        let mut subject = self.expr(expr, mode)?;
        let mut items = Vec::with_capacity(list.len());
        for item in list {
            let sql = match item {
                Expr::Literal(Literal {
                    value: LiteralValue::String(s),
                    ..
                }) if case_insensitive => quote_string(&s.to_uppercase()),
                Expr::Literal(literal) => self.literal(literal)?,
                other if case_insensitive => format!("UPPER({})", self.expr(other, mode)?),
                other => self.expr(other, mode)?,
            };
            items.push(sql);
        }
        if case_insensitive {
            subject = format!("UPPER({})", subject);
        }
        let not = if negated { "NOT " } else { "" };
        Ok(format!("{} {}IN ({})", subject, not, items.join(", ")))
    }

    fn call(&self, name: &str, args: &[Expr], mode: Mode) -> KqlResult<String> {
        if mode == Mode::Aggregate && self.dialect.aggregate_names().iter().any(|n| *n == name) {
            let rendered = self.args(args, Mode::Scalar)?;
            return self
                .dialect
                .translate_aggregate(name, &rendered)
                .ok_or_else(|| KqlError::unsupported(name));
        }

        if let ("bin" | "floor", [value, size]) = (name, args) {
            return self.bin(value, size, mode);
        }

        let rendered = self.args(args, mode)?;
        self.dialect
            .translate_function(name, &rendered)
            .ok_or_else(|| KqlError::unsupported(name))
    }

    fn args(&self, args: &[Expr], mode: Mode) -> KqlResult<Vec<String>> {
        args.iter().map(|a| self.expr(a, mode)).collect()
    }

    /// Round down to a multiple of `size`. Duration sizes go through epoch
    /// milliseconds so timestamps bin on exact boundaries.
    fn bin(&self, value: &Expr, size: &Expr, mode: Mode) -> KqlResult<String> {
        let v = self.expr(value, mode)?;
        if let Expr::Literal(Literal {
            value: LiteralValue::TimeSpan(ms),
            ..
        }) = size
        {
            let millis = self.dialect.epoch_millis(&v);
            let floored = format!("FLOOR({} / {}) * {}", millis, ms, ms);
            return Ok(self.dialect.from_epoch_millis(&floored));
        }
        let v = paren_if_compound(&v);
        let s = paren_if_compound(&self.expr(size, mode)?);
        Ok(format!("FLOOR({} / {}) * {}", v, s, s))
    }
}

/// Escape `LIKE` wildcards in literal search text.
fn escape_like(text: &str) -> (String, bool) {
    let mut out = String::with_capacity(text.len());
    let mut escaped = false;
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
            escaped = true;
        }
        out.push(c);
    }
    (out, escaped)
}

/// Column name a bare expression gets when projected without `name =`.
pub fn default_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Name(name) => Some(name.clone()),
        Expr::JoinSide { column, .. } => Some(column.clone()),
        Expr::Member { base, path } => {
            let mut name = default_name(base)?;
            for segment in path {
                match segment {
                    PathSegment::Key(key) => name.push_str(&format!("_{}", key)),
                    PathSegment::Index(i) => name.push_str(&format!("_{}", i)),
                }
            }
            Some(name)
        }
        Expr::Paren(inner) => default_name(inner),
        Expr::Call { name, args } if BUILTIN_FUNCTIONS.iter().any(|b| *b == name.as_str()) => {
            args.first().and_then(default_name)
        }
        _ => None,
    }
}

/// `count()` → `count_`, `sum(x)` → `sum_x`, `percentile(x, 95)` → `percentile_x_95`.
pub fn aggregate_default_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Call { name, args } => {
            let mut out = format!("{}_", name);
            if let Some(first) = args.first().and_then(default_name) {
                out.push_str(&first);
            }
            if name == "percentile" {
                if let Some(Expr::Literal(p)) = args.get(1) {
                    out.push_str(&format!("_{}", p.raw));
                }
            }
            Some(out)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::expressions::parse_expr;
    use crate::transpiler::sql::duckdb::DuckDbDialect;
    use crate::transpiler::sql::postgres::PostgresDialect;

    fn duck(s: &str) -> String {
        let scalars = BTreeMap::new();
        let (_, e) = parse_expr(s).unwrap();
        ExprTranslator::new(&DuckDbDialect, &scalars)
            .translate(&e)
            .unwrap()
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(duck("a == 1 and b != 'x'"), "a = 1 AND b != 'x'");
        assert_eq!(duck("Name =~ 'bob'"), "UPPER(Name) = UPPER('bob')");
    }

    #[test]
    fn test_case_insensitive_in() {
        assert_eq!(
            duck("State in~ ('a', 'B')"),
            "UPPER(State) IN ('A', 'B')"
        );
        assert_eq!(duck("x !in (1, 2)"), "x NOT IN (1, 2)");
    }

    #[test]
    fn test_has_family() {
        assert_eq!(duck("s has 'err'"), "s ILIKE '%err%'");
        assert_eq!(duck("s !has_cs 'err'"), "s NOT LIKE '%err%'");
        assert_eq!(duck("s startswith 'ab'"), "s ILIKE 'ab%'");
        assert_eq!(duck("s endswith_cs t"), "s LIKE ('%' || t)");
    }

    #[test]
    fn test_like_wildcards_escaped() {
        assert_eq!(
            duck("s contains '50%_off'"),
            r"s ILIKE '%50\%\_off%' ESCAPE '\'"
        );
    }

    #[test]
    fn test_bin_duration_and_numeric() {
        assert_eq!(
            duck("bin(ts, 1h)"),
            "epoch_ms(CAST(FLOOR(epoch_ms(ts) / 3600000) * 3600000 AS BIGINT))"
        );
        assert_eq!(duck("bin(x, 10)"), "FLOOR(x / 10) * 10");
        assert_eq!(duck("floor(x, 5)"), "FLOOR(x / 5) * 5");
    }

    #[test]
    fn test_bin_keeps_compound_operands_grouped() {
        assert_eq!(duck("bin(a + 5, 10)"), "FLOOR((a + 5) / 10) * 10");
        assert_eq!(duck("bin(x, 2 + 3)"), "FLOOR(x / (2 + 3)) * (2 + 3)");
    }

    #[test]
    fn test_negation_never_renders_a_comment() {
        assert_eq!(duck("x > - -5"), "x > 5");
        assert_eq!(duck("-(-x)"), "-(-x)");
        assert_eq!(duck("-a"), "-a");
        let mut scalars = BTreeMap::new();
        scalars.insert("n".to_string(), "-5".to_string());
        let (_, e) = parse_expr("-n").unwrap();
        assert_eq!(
            ExprTranslator::new(&DuckDbDialect, &scalars)
                .translate(&e)
                .unwrap(),
            "-(-5)"
        );
    }

    #[test]
    fn test_compound_arguments_in_templates() {
        let scalars = BTreeMap::new();
        let pg = ExprTranslator::new(&PostgresDialect, &scalars);
        let (_, e) = parse_expr("percentile(x, 50 + 45)").unwrap();
        assert_eq!(
            pg.translate_aggregate(&e).unwrap(),
            "PERCENTILE_CONT((50 + 45) / 100.0) WITHIN GROUP (ORDER BY x)"
        );
        assert_eq!(
            duck("ago(1h + 1h)"),
            "(NOW() - (INTERVAL '3600000 milliseconds' + INTERVAL '3600000 milliseconds'))"
        );
        assert_eq!(duck("ago(1h)"), "(NOW() - INTERVAL '3600000 milliseconds')");
    }

    #[test]
    fn test_unknown_function_is_unsupported() {
        let scalars = BTreeMap::new();
        let (_, e) = parse_expr("frob(x)").unwrap();
        let err = ExprTranslator::new(&DuckDbDialect, &scalars)
            .translate(&e)
            .unwrap_err();
        assert_eq!(err.construct(), Some("frob"));
    }

    #[test]
    fn test_aggregate_only_in_aggregate_mode() {
        let scalars = BTreeMap::new();
        let t = ExprTranslator::new(&PostgresDialect, &scalars);
        let (_, e) = parse_expr("round(avg(x), 2)").unwrap();
        assert_eq!(
            t.translate_aggregate(&e).unwrap(),
            "ROUND(CAST(AVG(x) AS NUMERIC), 2)"
        );
        assert!(t.translate(&e).is_err());
    }

    #[test]
    fn test_scalar_substitution() {
        let mut scalars = BTreeMap::new();
        scalars.insert("cutoff".to_string(), "(NOW() - INTERVAL '3600000 milliseconds')".to_string());
        scalars.insert("n".to_string(), "10".to_string());
        let (_, e) = parse_expr("ts > cutoff and x < n").unwrap();
        assert_eq!(
            ExprTranslator::new(&DuckDbDialect, &scalars)
                .translate(&e)
                .unwrap(),
            "ts > ((NOW() - INTERVAL '3600000 milliseconds')) AND x < 10"
        );
    }

    #[test]
    fn test_join_sides() {
        let scalars = BTreeMap::new();
        let (_, e) = parse_expr("$left.id == $right.user_id").unwrap();
        let t = ExprTranslator::new(&DuckDbDialect, &scalars).with_sides("_l", "_r");
        assert_eq!(t.translate(&e).unwrap(), "_l.id = _r.user_id");
    }

    #[test]
    fn test_literals() {
        assert_eq!(duck("datetime(2024-01-02)"), "TIMESTAMP '2024-01-02 00:00:00'");
        assert_eq!(duck("5m"), "INTERVAL '300000 milliseconds'");
        assert_eq!(duck("long(null)"), "CAST(NULL AS BIGINT)");
        assert_eq!(duck("dynamic([1, 2])"), "CAST('[1,2]' AS JSON)");
        assert_eq!(duck("true"), "true");
    }

    #[test]
    fn test_default_names() {
        let (_, e) = parse_expr("percentile(latency, 95)").unwrap();
        assert_eq!(aggregate_default_name(&e).as_deref(), Some("percentile_latency_95"));
        let (_, e) = parse_expr("count()").unwrap();
        assert_eq!(aggregate_default_name(&e).as_deref(), Some("count_"));
        let (_, e) = parse_expr("bin(ts, 1d)").unwrap();
        assert_eq!(default_name(&e).as_deref(), Some("ts"));
    }
}
