//! Tabular nodes: pipelines, sources and pipe operators.

use super::expr::Expr;
use std::fmt;

/// `Source | op | op ...`
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    pub source: Source,
    pub operators: Vec<Operator>,
}

impl Pipeline {
    pub fn table(name: impl Into<String>) -> Self {
        Self {
            source: Source::Table(name.into()),
            operators: vec![],
        }
    }

    /// The table name if this pipeline is a bare table reference.
    pub fn as_table(&self) -> Option<&str> {
        match (&self.source, self.operators.is_empty()) {
            (Source::Table(name), true) => Some(name),
            _ => None,
        }
    }
}

/// The head of a pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    Table(String),
    Nested(Box<Pipeline>),
    Materialize(Box<Pipeline>),
    View(Box<Pipeline>),
    Range {
        column: String,
        start: Expr,
        end: Expr,
        step: Expr,
    },
    Union(Union),
    Print(Vec<NamedExpr>),
    Datatable {
        columns: Vec<ColumnDef>,
        values: Vec<Expr>,
    },
}

/// `name:type` column declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub ty: String,
}

/// `name = expr` or a bare `expr`.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedExpr {
    pub name: Option<String>,
    pub expr: Expr,
}

impl NamedExpr {
    pub fn bare(expr: Expr) -> Self {
        Self { name: None, expr }
    }

    pub fn named(name: impl Into<String>, expr: Expr) -> Self {
        Self {
            name: Some(name.into()),
            expr,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullsOrder {
    First,
    Last,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub expr: Expr,
    pub order: Option<SortOrder>,
    pub nulls: Option<NullsOrder>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinKind {
    #[default]
    InnerUnique,
    Inner,
    LeftOuter,
    RightOuter,
    FullOuter,
    LeftSemi,
    LeftAnti,
    RightSemi,
    RightAnti,
}

impl JoinKind {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "innerunique" => JoinKind::InnerUnique,
            "inner" => JoinKind::Inner,
            "leftouter" => JoinKind::LeftOuter,
            "rightouter" => JoinKind::RightOuter,
            "fullouter" => JoinKind::FullOuter,
            "leftsemi" => JoinKind::LeftSemi,
            "leftanti" | "anti" | "leftantisemi" => JoinKind::LeftAnti,
            "rightsemi" => JoinKind::RightSemi,
            "rightanti" | "rightantisemi" => JoinKind::RightAnti,
            _ => return None,
        })
    }
}

/// `union [withsource=Col] T1, T2`
#[derive(Debug, Clone, PartialEq)]
pub struct Union {
    pub with_source: Option<String>,
    pub tables: Vec<Pipeline>,
}

/// A single pipe operator.
#[derive(Debug, Clone, PartialEq)]
pub enum Operator {
    Where(Expr),
    Project(Vec<NamedExpr>),
    ProjectAway(Vec<String>),
    ProjectKeep(Vec<String>),
    /// `(new, old)` pairs.
    ProjectRename(Vec<(String, String)>),
    ProjectReorder(Vec<String>),
    Extend(Vec<NamedExpr>),
    Summarize {
        aggregates: Vec<NamedExpr>,
        by: Vec<NamedExpr>,
    },
    Sort(Vec<SortKey>),
    /// Row count; any scalar expression, usually a literal or a scalar `let`.
    Take(Expr),
    Top { count: Expr, key: SortKey },
    Count,
    /// Empty list means `distinct *`.
    Distinct(Vec<Expr>),
    Join {
        kind: JoinKind,
        right: Box<Pipeline>,
        on: Vec<Expr>,
    },
    Union(Union),
    MvExpand {
        column: String,
        to_type: Option<String>,
    },
    /// An operator name with no grammar; arguments are skipped.
    Unknown(String),
}

impl Operator {
    /// The operator keyword as written in queries.
    pub fn keyword(&self) -> &str {
        match self {
            Operator::Where(_) => "where",
            Operator::Project(_) => "project",
            Operator::ProjectAway(_) => "project-away",
            Operator::ProjectKeep(_) => "project-keep",
            Operator::ProjectRename(_) => "project-rename",
            Operator::ProjectReorder(_) => "project-reorder",
            Operator::Extend(_) => "extend",
            Operator::Summarize { .. } => "summarize",
            Operator::Sort(_) => "sort",
            Operator::Take(_) => "take",
            Operator::Top { .. } => "top",
            Operator::Count => "count",
            Operator::Distinct(_) => "distinct",
            Operator::Join { .. } => "join",
            Operator::Union(_) => "union",
            Operator::MvExpand { .. } => "mv-expand",
            Operator::Unknown(name) => name,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.keyword())
    }
}
