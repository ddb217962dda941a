//! Statement Driver: `let` bindings and the final query.
//!
//! Tabular `let`s become CTEs in declaration order. Scalar `let`s are
//! substituted into later expressions and never reach the SQL text.

use std::collections::BTreeMap;

use crate::ast::{LetValue, Pipeline, Source, Statement};
use crate::error::{KqlError, KqlResult};
use crate::transpiler::command::CommandTranslator;
use crate::transpiler::expr::ExprTranslator;
use crate::transpiler::pipeline::PipelineTranslator;
use crate::transpiler::traits::SqlDialect;
use crate::transpiler::Transpiler;

/// A tabular binding rendered as a CTE.
#[derive(Debug, Clone, PartialEq)]
pub struct Cte {
    pub name: String,
    pub sql: String,
    pub materialized: bool,
    pub columns: Option<Vec<String>>,
}

/// Names bound by `let` so far.
#[derive(Debug, Default)]
pub struct CteRegistry {
    ctes: Vec<Cte>,
    scalars: BTreeMap<String, String>,
}

impl CteRegistry {
    pub fn get(&self, name: &str) -> Option<&Cte> {
        self.ctes.iter().find(|c| c.name == name)
    }

    /// Scalar name to translated SQL.
    pub fn scalars(&self) -> &BTreeMap<String, String> {
        &self.scalars
    }

    pub fn is_bound(&self, name: &str) -> bool {
        self.get(name).is_some() || self.scalars.contains_key(name)
    }

    pub fn ctes(&self) -> &[Cte] {
        &self.ctes
    }

    /// Prefix `body` with a `WITH` clause for every tabular binding.
    pub fn render_with(&self, dialect: &dyn SqlDialect, body: String) -> String {
        if self.ctes.is_empty() {
            return body;
        }
        let ctes: Vec<String> = self
            .ctes
            .iter()
            .map(|cte| {
                format!(
                    "{} AS {}MATERIALIZED ({})",
                    dialect.quote_identifier(&cte.name),
                    if cte.materialized { "" } else { "NOT " },
                    cte.sql
                )
            })
            .collect();
        format!("WITH {} {}", ctes.join(", "), body)
    }
}

pub struct StatementDriver<'a> {
    transpiler: &'a Transpiler,
}

impl<'a> StatementDriver<'a> {
    pub fn new(transpiler: &'a Transpiler) -> Self {
        Self { transpiler }
    }

    pub fn convert(&self, statements: &[Statement]) -> KqlResult<String> {
        if statements.is_empty() {
            return Err(KqlError::parse(0, "Empty query"));
        }

        let dialect = self.transpiler.dialect();
        let mut registry = CteRegistry::default();
        let mut query = None;

        for statement in statements {
            if query.is_some() {
                return Err(KqlError::unsupported("statement after the final query"));
            }
            match statement {
                Statement::Let { name, value } => self.bind(&mut registry, name, value)?,
                Statement::Query(pipeline) => {
                    let fragment = self.pipelines(&registry).translate(pipeline)?;
                    query = Some(fragment.to_sql(dialect));
                }
                Statement::Command(command) if statements.len() == 1 => {
                    return CommandTranslator::new(self.transpiler).translate(command);
                }
                Statement::Command(command) => {
                    return Err(KqlError::unsupported(format!(
                        ".{} in a multi-statement script",
                        command.keyword()
                    )));
                }
            }
        }

        let body = query.ok_or_else(|| KqlError::unsupported("script without a final query"))?;
        tracing::debug!(ctes = registry.ctes().len(), "rendering statement");
        Ok(registry.render_with(dialect, body))
    }

    fn pipelines<'r>(&'r self, registry: &'r CteRegistry) -> PipelineTranslator<'r> {
        PipelineTranslator::new(self.transpiler.dialect(), self.transpiler.catalog(), registry)
    }

    fn bind(&self, registry: &mut CteRegistry, name: &str, value: &LetValue) -> KqlResult<()> {
        if registry.is_bound(name) {
            return Err(KqlError::unsupported(format!("rebinding let {}", name)));
        }

        let pipeline = match value {
            LetValue::Scalar(expr) => {
                let sql = ExprTranslator::new(self.transpiler.dialect(), registry.scalars())
                    .translate(expr)?;
                tracing::debug!(name, sql = %sql, "bound scalar");
                registry.scalars.insert(name.to_string(), sql);
                return Ok(());
            }
            LetValue::Tabular(pipeline) => pipeline,
        };

        // `let b = a` where `a` is a scalar is an alias, not a table.
        if let Some(sql) = pipeline.as_table().and_then(|t| registry.scalars.get(t).cloned()) {
            registry.scalars.insert(name.to_string(), sql);
            return Ok(());
        }

        let (body, materialized) = binding_body(pipeline);
        let fragment = self.pipelines(registry).translate(body)?;
        let cte = Cte {
            name: name.to_string(),
            sql: fragment.to_sql(self.transpiler.dialect()),
            materialized,
            columns: fragment.columns,
        };
        tracing::debug!(name, materialized, "bound tabular let");
        registry.ctes.push(cte);
        Ok(())
    }
}

/// Unwrap `materialize(...)` and `view () { ... }` bodies.
fn binding_body(pipeline: &Pipeline) -> (&Pipeline, bool) {
    if pipeline.operators.is_empty() {
        match &pipeline.source {
            Source::Materialize(inner) => return (inner.as_ref(), true),
            Source::View(inner) => return (inner.as_ref(), false),
            _ => {}
        }
    }
    (pipeline, false)
}
