//! Scalar expression nodes.

use chrono::NaiveDateTime;
use std::fmt;

/// A scalar (or aggregate) expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    /// Column, table or scalar-binding reference.
    Name(String),
    /// `$left.col` / `$right.col` inside a join condition.
    JoinSide { side: JoinSide, column: String },
    /// `*` as a function argument, e.g. `arg_max(ts, *)`.
    Star,
    /// `x.y`, `x['y']`, `x[0]`
    Member {
        base: Box<Expr>,
        path: Vec<PathSegment>,
    },
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    Negate(Box<Expr>),
    Call { name: String, args: Vec<Expr> },
    Paren(Box<Expr>),
    /// `x in (...)`, `x !in~ (...)`
    InList {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
        case_insensitive: bool,
    },
    /// `x between (low .. high)`
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
        negated: bool,
    },
}

impl Expr {
    pub fn name(name: impl Into<String>) -> Self {
        Expr::Name(name.into())
    }

    pub fn call(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Call {
            name: name.into(),
            args,
        }
    }

    /// The plain column name if this is a bare name reference.
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Expr::Name(n) => Some(n),
            _ => None,
        }
    }

    /// Whether `name` is referenced anywhere inside this expression.
    pub fn references(&self, name: &str) -> bool {
        match self {
            Expr::Name(n) => n == name,
            Expr::Literal(_) | Expr::Star | Expr::JoinSide { .. } => false,
            Expr::Member { base, .. } => base.references(name),
            Expr::Binary { left, right, .. } => left.references(name) || right.references(name),
            Expr::Negate(e) | Expr::Paren(e) => e.references(name),
            Expr::Call { args, .. } => args.iter().any(|a| a.references(name)),
            Expr::InList { expr, list, .. } => {
                expr.references(name) || list.iter().any(|e| e.references(name))
            }
            Expr::Between {
                expr, low, high, ..
            } => expr.references(name) || low.references(name) || high.references(name),
        }
    }

    /// Whether this is an `or` at the top level (needs parentheses when and-ed).
    pub fn is_disjunction(&self) -> bool {
        matches!(
            self,
            Expr::Binary {
                op: BinaryOp::Or,
                ..
            }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinSide {
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(i64),
}

/// Binary operators, comparison and logical first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    /// `=~`
    EqNoCase,
    /// `!~`
    NotEqNoCase,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Str(StringOp),
}

/// The `has` / `contains` / `startswith` / `endswith` family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StringOp {
    pub kind: StringOpKind,
    pub case_sensitive: bool,
    pub negated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringOpKind {
    Has,
    Contains,
    StartsWith,
    EndsWith,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOp::Or => "or",
            BinaryOp::And => "and",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::EqNoCase => "=~",
            BinaryOp::NotEqNoCase => "!~",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Str(op) => {
                if op.negated {
                    write!(f, "!")?;
                }
                let word = match op.kind {
                    StringOpKind::Has => "has",
                    StringOpKind::Contains => "contains",
                    StringOpKind::StartsWith => "startswith",
                    StringOpKind::EndsWith => "endswith",
                };
                write!(f, "{}", word)?;
                if op.case_sensitive {
                    write!(f, "_cs")?;
                }
                return Ok(());
            }
        };
        write!(f, "{}", s)
    }
}

/// A literal together with its source text.
#[derive(Debug, Clone, PartialEq)]
pub struct Literal {
    pub value: LiteralValue,
    pub raw: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    Long(i64),
    Real(f64),
    Bool(bool),
    String(String),
    /// Timespan in milliseconds.
    TimeSpan(i64),
    DateTime(NaiveDateTime),
    Dynamic(serde_json::Value),
    /// Typed null, e.g. `long(null)`.
    Null(String),
}

impl Literal {
    pub fn new(value: LiteralValue, raw: impl Into<String>) -> Self {
        Self {
            value,
            raw: raw.into(),
        }
    }

    pub fn string(s: impl Into<String>) -> Self {
        let s = s.into();
        let raw = format!("'{}'", s);
        Self::new(LiteralValue::String(s), raw)
    }

    pub fn long(n: i64) -> Self {
        Self::new(LiteralValue::Long(n), n.to_string())
    }
}
