//! A small relational IR: one `SELECT` level plus the column list flowing
//! out of it. Operators either merge into the current level or wrap it as a
//! subquery; rendering to text happens once at the end.

use super::traits::SqlDialect;

/// One select-list entry. `alias` is the unquoted output name, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    pub sql: String,
    pub alias: Option<String>,
}

impl SelectItem {
    pub fn raw(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            alias: None,
        }
    }

    pub fn aliased(sql: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            alias: Some(alias.into()),
        }
    }

    fn to_sql(&self, dialect: &dyn SqlDialect) -> String {
        match &self.alias {
            Some(alias) => {
                let quoted = dialect.quote_identifier(alias);
                if quoted == self.sql {
                    quoted
                } else {
                    format!("{} AS {}", self.sql, quoted)
                }
            }
            None => self.sql.clone(),
        }
    }
}

/// What a `SELECT` reads from.
#[derive(Debug, Clone, PartialEq)]
pub enum FromItem {
    None,
    /// Quoted table or CTE name.
    Table(String),
    Subquery { sql: String, alias: String },
    /// Pre-rendered clause such as a join or a table function.
    Raw(String),
}

/// A `WHERE` conjunct.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub sql: String,
    /// Top-level `OR`; needs parentheses when and-ed with another conjunct.
    pub disjunction: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub distinct: bool,
    /// Empty means `*`.
    pub items: Vec<SelectItem>,
    pub from: FromItem,
    /// Extra clauses after `FROM`, e.g. `CROSS JOIN LATERAL ...`.
    pub joins: Vec<String>,
    pub filters: Vec<Predicate>,
    pub group_by: Vec<String>,
    pub order_by: Vec<String>,
    /// Rendered `LIMIT` operand.
    pub limit: Option<String>,
}

impl Select {
    pub fn new(from: FromItem) -> Self {
        Self {
            distinct: false,
            items: vec![],
            from,
            joins: vec![],
            filters: vec![],
            group_by: vec![],
            order_by: vec![],
            limit: None,
        }
    }

    /// `SELECT * FROM (sql) AS alias`
    pub fn wrap(sql: String, alias: &str) -> Self {
        Self::new(FromItem::Subquery {
            sql,
            alias: alias.to_string(),
        })
    }

    /// Only row filtering and ordering applied so far: more filters, a
    /// projection or a grouping can merge into this level.
    pub fn is_plain(&self) -> bool {
        self.items.is_empty()
            && !self.distinct
            && self.group_by.is_empty()
            && self.limit.is_none()
    }

    pub fn push_filter(&mut self, sql: String, disjunction: bool) {
        self.filters.push(Predicate { sql, disjunction });
    }

    pub fn to_sql(&self, dialect: &dyn SqlDialect) -> String {
        let mut sql = String::from("SELECT ");
        if self.distinct {
            sql.push_str("DISTINCT ");
        }

        if self.items.is_empty() {
            sql.push('*');
        } else {
            let items: Vec<String> = self.items.iter().map(|i| i.to_sql(dialect)).collect();
            sql.push_str(&items.join(", "));
        }

        match &self.from {
            FromItem::None => {}
            FromItem::Table(name) => {
                sql.push_str(" FROM ");
                sql.push_str(name);
            }
            FromItem::Subquery { sql: inner, alias } => {
                sql.push_str(&format!(" FROM ({}) AS {}", inner, alias));
            }
            FromItem::Raw(clause) => {
                sql.push_str(" FROM ");
                sql.push_str(clause);
            }
        }

        for join in &self.joins {
            sql.push(' ');
            sql.push_str(join);
        }

        if !self.filters.is_empty() {
            let several = self.filters.len() > 1;
            let conjuncts: Vec<String> = self
                .filters
                .iter()
                .map(|p| {
                    if several && p.disjunction {
                        format!("({})", p.sql)
                    } else {
                        p.sql.clone()
                    }
                })
                .collect();
            sql.push_str(" WHERE ");
            sql.push_str(&conjuncts.join(" AND "));
        }

        if !self.group_by.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.group_by.join(", "));
        }

        if !self.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.order_by.join(", "));
        }

        if let Some(n) = &self.limit {
            sql.push_str(&format!(" LIMIT {}", n));
        }

        sql
    }
}

/// Either a structured select or finished SQL text (set operations,
/// dialect-generated window filters).
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Select(Select),
    Sql(String),
}

/// The relation produced at each pipeline step.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub body: Body,
    /// Output column names, when known.
    pub columns: Option<Vec<String>>,
}

impl Fragment {
    pub fn select(select: Select, columns: Option<Vec<String>>) -> Self {
        Self {
            body: Body::Select(select),
            columns,
        }
    }

    pub fn sql(sql: String, columns: Option<Vec<String>>) -> Self {
        Self {
            body: Body::Sql(sql),
            columns,
        }
    }

    /// `SELECT * FROM <quoted>`
    pub fn table(quoted: String, columns: Option<Vec<String>>) -> Self {
        Self::select(Select::new(FromItem::Table(quoted)), columns)
    }

    pub fn to_sql(&self, dialect: &dyn SqlDialect) -> String {
        match &self.body {
            Body::Select(select) => select.to_sql(dialect),
            Body::Sql(sql) => sql.clone(),
        }
    }

    /// The quoted table name if this is exactly `SELECT * FROM t`.
    pub fn bare_table(&self) -> Option<&str> {
        match &self.body {
            Body::Select(s)
                if s.is_plain()
                    && s.filters.is_empty()
                    && s.order_by.is_empty()
                    && s.joins.is_empty() =>
            {
                match &s.from {
                    FromItem::Table(name) => Some(name),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    /// `t AS alias` for a bare table, `(sql) AS alias` otherwise.
    pub fn relation(&self, dialect: &dyn SqlDialect, alias: &str) -> String {
        match self.bare_table() {
            Some(name) => format!("{} AS {}", name, alias),
            None => format!("({}) AS {}", self.to_sql(dialect), alias),
        }
    }

    /// Hand out the current select level if `fits` accepts it, otherwise a
    /// fresh level reading from this fragment as a subquery.
    pub fn into_select(self, dialect: &dyn SqlDialect, fits: impl Fn(&Select) -> bool) -> Select {
        match self.body {
            Body::Select(select) if fits(&select) => select,
            body => {
                let sql = match body {
                    Body::Select(select) => select.to_sql(dialect),
                    Body::Sql(sql) => sql,
                };
                Select::wrap(sql, "_q")
            }
        }
    }
}
