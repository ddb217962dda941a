//! Operator Pipeline Translator.
//!
//! Folds a pipeline's operators over a [`Fragment`]. Each operator merges
//! into the current `SELECT` level when the level's shape allows it and wraps
//! the level as a subquery otherwise.

use crate::ast::*;
use crate::catalog::Catalog;
use crate::error::{KqlError, KqlResult};
use crate::transpiler::expr::{aggregate_default_name, default_name, ExprTranslator};
use crate::transpiler::select::{Body, Fragment, FromItem, Select, SelectItem};
use crate::transpiler::statement::CteRegistry;
use crate::transpiler::traits::{quote_string, unknown_columns, SqlDialect};

/// Names an output column when the query doesn't.
#[derive(Default)]
struct ColumnNamer {
    next: usize,
}

impl ColumnNamer {
    fn name(&mut self, explicit: Option<&String>, expr: &Expr) -> String {
        explicit.cloned().or_else(|| default_name(expr)).unwrap_or_else(|| {
            self.next += 1;
            format!("Column{}", self.next)
        })
    }
}

/// One equality in a join condition.
struct JoinKey {
    left: String,
    right: String,
    /// Written as a bare column name: the same column on both sides.
    shared: bool,
}

pub struct PipelineTranslator<'a> {
    dialect: &'a dyn SqlDialect,
    catalog: &'a Catalog,
    registry: &'a CteRegistry,
}

impl<'a> PipelineTranslator<'a> {
    pub fn new(dialect: &'a dyn SqlDialect, catalog: &'a Catalog, registry: &'a CteRegistry) -> Self {
        Self {
            dialect,
            catalog,
            registry,
        }
    }

    fn exprs(&self) -> ExprTranslator<'a> {
        ExprTranslator::new(self.dialect, self.registry.scalars())
    }

    fn quote(&self, name: &str) -> String {
        self.dialect.quote_identifier(name)
    }

    pub fn translate(&self, pipeline: &Pipeline) -> KqlResult<Fragment> {
        let mut fragment = self.source(&pipeline.source)?;
        for op in &pipeline.operators {
            tracing::trace!(operator = %op, "applying operator");
            fragment = self.apply(fragment, op)?;
        }
        Ok(fragment)
    }

    fn source(&self, source: &Source) -> KqlResult<Fragment> {
        match source {
            Source::Table(name) => Ok(self.table(name)),
            Source::Nested(inner) | Source::Materialize(inner) | Source::View(inner) => {
                self.translate(inner)
            }
            Source::Range {
                column,
                start,
                end,
                step,
            } => {
                let x = self.exprs();
                let series = self.dialect.generate_series(
                    "_r",
                    column,
                    &x.translate(start)?,
                    &x.translate(end)?,
                    &x.translate(step)?,
                );
                Ok(Fragment::select(
                    Select::new(FromItem::Raw(series)),
                    Some(vec![column.clone()]),
                ))
            }
            Source::Union(union) => self.union(None, union),
            Source::Print(items) => {
                let x = self.exprs();
                let mut select = Select::new(FromItem::None);
                let mut columns = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    let name = item
                        .name
                        .clone()
                        .or_else(|| default_name(&item.expr))
                        .unwrap_or_else(|| format!("print_{}", i));
                    select
                        .items
                        .push(SelectItem::aliased(x.translate(&item.expr)?, name.clone()));
                    columns.push(name);
                }
                Ok(Fragment::select(select, Some(columns)))
            }
            Source::Datatable { columns, values } => self.datatable(columns, values),
        }
    }

    /// A table or `let` name. Columns come from the binding or the catalog.
    fn table(&self, name: &str) -> Fragment {
        let columns = match self.registry.get(name) {
            Some(cte) => cte.columns.clone(),
            None => self.catalog.columns(name).map(<[String]>::to_vec),
        };
        Fragment::table(self.quote(name), columns)
    }

    fn datatable(&self, columns: &[ColumnDef], values: &[Expr]) -> KqlResult<Fragment> {
        if columns.is_empty() || values.len() % columns.len() != 0 {
            return Err(KqlError::unsupported("datatable with a partial row"));
        }
        let x = self.exprs();
        let names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();

        let mut items = Vec::with_capacity(columns.len());
        for column in columns {
            let ty = self.dialect.map_type(&column.ty)?;
            let value = if values.is_empty() {
                "NULL".to_string()
            } else {
                self.quote(&column.name)
            };
            items.push(SelectItem::aliased(
                format!("CAST({} AS {})", value, ty),
                column.name.clone(),
            ));
        }

        if values.is_empty() {
            let mut select = Select::new(FromItem::None);
            select.items = items;
            select.push_filter("false".to_string(), false);
            return Ok(Fragment::select(select, Some(names)));
        }

        let mut rows = Vec::with_capacity(values.len() / columns.len());
        for row in values.chunks(columns.len()) {
            let cells = row
                .iter()
                .map(|v| x.translate(v))
                .collect::<KqlResult<Vec<_>>>()?;
            rows.push(format!("({})", cells.join(", ")));
        }
        let quoted: Vec<String> = names.iter().map(|n| self.quote(n)).collect();
        let mut select = Select::new(FromItem::Raw(format!(
            "(VALUES {}) AS _dt({})",
            rows.join(", "),
            quoted.join(", ")
        )));
        select.items = items;
        Ok(Fragment::select(select, Some(names)))
    }

    fn apply(&self, fragment: Fragment, op: &Operator) -> KqlResult<Fragment> {
        match op {
            Operator::Where(predicate) => self.filter(fragment, predicate),
            Operator::Project(items) => self.project(fragment, items),
            Operator::ProjectAway(names) => self.project_away(fragment, names),
            Operator::ProjectKeep(names) => self.project_keep(fragment, names),
            Operator::ProjectRename(pairs) => self.project_rename(fragment, pairs),
            Operator::ProjectReorder(names) => self.project_reorder(fragment, names),
            Operator::Extend(items) => self.extend(fragment, items),
            Operator::Summarize { aggregates, by } => self.summarize(fragment, aggregates, by),
            Operator::Sort(keys) => self.sort(fragment, keys),
            Operator::Take(count) => self.take(fragment, count),
            Operator::Top { count, key } => {
                let sorted = self.sort(fragment, std::slice::from_ref(key))?;
                self.take(sorted, count)
            }
            Operator::Count => Ok(self.count(fragment)),
            Operator::Distinct(exprs) => self.distinct(fragment, exprs),
            Operator::Join { kind, right, on } => self.join(fragment, *kind, right, on),
            Operator::Union(union) => self.union(Some(fragment), union),
            Operator::MvExpand { column, to_type } => {
                self.mv_expand(fragment, column, to_type.as_deref())
            }
            Operator::Unknown(name) => Err(KqlError::unsupported(name.clone())),
        }
    }

    fn filter(&self, fragment: Fragment, predicate: &Expr) -> KqlResult<Fragment> {
        let sql = self.exprs().translate(predicate)?;
        let columns = fragment.columns.clone();
        let mut select = fragment.into_select(self.dialect, Select::is_plain);
        select.push_filter(sql, predicate.is_disjunction());
        Ok(Fragment::select(select, columns))
    }

    /// True if a computed alias in `items` would capture a name the level's
    /// `ORDER BY` already refers to.
    fn shadows_order(&self, select: &Select, items: &[SelectItem]) -> bool {
        items.iter().any(|item| match &item.alias {
            Some(alias) if item.sql != self.quote(alias) => {
                select.order_by.iter().any(|o| mentions(o, alias))
            }
            _ => false,
        })
    }

    fn project(&self, fragment: Fragment, items: &[NamedExpr]) -> KqlResult<Fragment> {
        let x = self.exprs();
        let mut namer = ColumnNamer::default();
        let mut rendered = Vec::with_capacity(items.len());
        let mut columns = Vec::with_capacity(items.len());
        for item in items {
            let name = namer.name(item.name.as_ref(), &item.expr);
            rendered.push(SelectItem::aliased(x.translate(&item.expr)?, name.clone()));
            columns.push(name);
        }
        let mut select = fragment.into_select(self.dialect, |s| {
            s.is_plain() && !self.shadows_order(s, &rendered)
        });
        select.items = rendered;
        Ok(Fragment::select(select, Some(columns)))
    }

    fn project_keep(&self, fragment: Fragment, names: &[String]) -> KqlResult<Fragment> {
        let ordered: Vec<String> = match &fragment.columns {
            Some(columns) => columns.iter().filter(|c| names.contains(*c)).cloned().collect(),
            None => names.to_vec(),
        };
        let items: Vec<NamedExpr> = ordered
            .into_iter()
            .map(|n| NamedExpr::bare(Expr::Name(n)))
            .collect();
        self.project(fragment, &items)
    }

    /// Shared tail of the `project-*` family: a single dialect-built item.
    fn column_list(&self, fragment: Fragment, item: String, columns: Option<Vec<String>>) -> Fragment {
        let mut select = fragment.into_select(self.dialect, Select::is_plain);
        select.items = vec![SelectItem::raw(item)];
        Fragment::select(select, columns)
    }

    fn project_away(&self, fragment: Fragment, names: &[String]) -> KqlResult<Fragment> {
        let item = self
            .dialect
            .select_exclude(None, names, fragment.columns.as_deref())?;
        let columns = fragment
            .columns
            .as_ref()
            .map(|cols| cols.iter().filter(|c| !names.contains(*c)).cloned().collect());
        Ok(self.column_list(fragment, item, columns))
    }

    fn project_rename(&self, fragment: Fragment, pairs: &[(String, String)]) -> KqlResult<Fragment> {
        let item = self
            .dialect
            .select_rename(pairs, fragment.columns.as_deref())?;
        let columns = fragment.columns.as_ref().map(|cols| {
            cols.iter()
                .map(|c| match pairs.iter().find(|(_, old)| old == c) {
                    Some((new, _)) => new.clone(),
                    None => c.clone(),
                })
                .collect()
        });
        Ok(self.column_list(fragment, item, columns))
    }

    fn project_reorder(&self, fragment: Fragment, names: &[String]) -> KqlResult<Fragment> {
        let item = self
            .dialect
            .select_reorder(names, fragment.columns.as_deref())?;
        let columns = fragment.columns.as_ref().map(|cols| {
            names
                .iter()
                .chain(cols.iter().filter(|c| !names.contains(*c)))
                .cloned()
                .collect()
        });
        Ok(self.column_list(fragment, item, columns))
    }

    fn extend(&self, mut fragment: Fragment, items: &[NamedExpr]) -> KqlResult<Fragment> {
        let mut namer = ColumnNamer::default();
        let named: Vec<(String, &Expr)> = items
            .iter()
            .map(|item| (namer.name(item.name.as_ref(), &item.expr), &item.expr))
            .collect();

        // A column can't read an alias defined in the same SELECT level, so
        // start a new level at each such dependency.
        let mut start = 0;
        for end in 1..=named.len() {
            let split = end == named.len()
                || named[start..end]
                    .iter()
                    .any(|(name, _)| named[end].1.references(name));
            if split {
                fragment = self.extend_level(fragment, &named[start..end])?;
                start = end;
            }
        }
        Ok(fragment)
    }

    fn extend_level(&self, fragment: Fragment, named: &[(String, &Expr)]) -> KqlResult<Fragment> {
        let x = self.exprs();
        let mut new_items = Vec::with_capacity(named.len());
        for (name, expr) in named {
            new_items.push(SelectItem::aliased(x.translate(expr)?, name.clone()));
        }

        let mut columns = fragment.columns.clone();
        let fits = |s: &Select| {
            !s.distinct
                && s.group_by.is_empty()
                && s.limit.is_none()
                && !self.shadows_order(s, &new_items)
                && s.items.iter().all(|item| match &item.alias {
                    None => item.sql == "*",
                    Some(alias) => {
                        item.sql == self.quote(alias)
                            || !named.iter().any(|(_, e)| e.references(alias))
                    }
                })
        };
        let mut select = fragment.into_select(self.dialect, fits);

        if select.items.is_empty() {
            select.items.push(SelectItem::raw("*"));
        }

        // New names that overwrite a column already carried by `*`. Without a
        // column list, only a self-reference (`a = a + 1`) proves the column exists.
        let overwrites: Vec<usize> = new_items
            .iter()
            .enumerate()
            .filter(|(i, item)| {
                let alias = item.alias.as_deref().unwrap_or_default();
                let explicit = select.items.iter().any(|e| e.alias.as_deref() == Some(alias));
                let exists = match &columns {
                    Some(cols) => cols.iter().any(|c| c == alias),
                    None => named[*i].1.references(alias),
                };
                !explicit && exists
            })
            .map(|(i, _)| i)
            .collect();
        let star = select
            .items
            .iter()
            .position(|item| item.alias.is_none() && item.sql == "*");

        if let (false, Some(star)) = (overwrites.is_empty(), star) {
            match &columns {
                // Spell the star out so the overwritten columns can be replaced in place.
                Some(cols) => {
                    let explicit: Vec<String> =
                        select.items.iter().filter_map(|e| e.alias.clone()).collect();
                    let spelled: Vec<SelectItem> = cols
                        .iter()
                        .filter(|c| !explicit.contains(c))
                        .map(|c| SelectItem::aliased(self.quote(c), c.clone()))
                        .collect();
                    let tail = select.items.split_off(star + 1);
                    select.items.truncate(star);
                    select.items.extend(spelled);
                    select.items.extend(tail);
                }
                None => {
                    let replacements: Vec<(String, String)> = overwrites
                        .iter()
                        .map(|&i| {
                            let item = &new_items[i];
                            (item.sql.clone(), item.alias.clone().unwrap_or_default())
                        })
                        .collect();
                    select.items[star] = SelectItem::raw(self.dialect.select_replace(&replacements)?);
                    new_items = new_items
                        .into_iter()
                        .enumerate()
                        .filter(|(i, _)| !overwrites.contains(i))
                        .map(|(_, item)| item)
                        .collect();
                }
            }
        }

        for item in new_items {
            let alias = item.alias.clone().unwrap_or_default();
            match select
                .items
                .iter_mut()
                .find(|existing| existing.alias.as_deref() == Some(alias.as_str()))
            {
                Some(existing) => *existing = item,
                None => select.items.push(item),
            }
            if let Some(cols) = columns.as_mut() {
                if !cols.contains(&alias) {
                    cols.push(alias);
                }
            }
        }
        Ok(Fragment::select(select, columns))
    }

    fn summarize(
        &self,
        fragment: Fragment,
        aggregates: &[NamedExpr],
        by: &[NamedExpr],
    ) -> KqlResult<Fragment> {
        if let [only] = aggregates {
            if let Expr::Call { name, args } = &only.expr {
                if let ("arg_max" | "arg_min", [by_expr, Expr::Star]) = (name.as_str(), args.as_slice()) {
                    return self.keep_extreme_rows(fragment, name == "arg_max", by_expr, by);
                }
            }
        }

        let x = self.exprs();
        let mut namer = ColumnNamer::default();
        let mut items = Vec::new();
        let mut columns = Vec::new();
        let mut group_by = Vec::with_capacity(by.len());

        for key in by {
            let sql = x.translate(&key.expr)?;
            let name = namer.name(key.name.as_ref(), &key.expr);
            group_by.push(sql.clone());
            items.push(SelectItem::aliased(sql, name.clone()));
            columns.push(name);
        }

        for aggregate in aggregates {
            match &aggregate.expr {
                Expr::Call { name, args }
                    if (name == "arg_max" || name == "arg_min") && args.len() > 1 =>
                {
                    // The extreme value itself, then each requested column at that row.
                    let by_sql = x.translate(&args[0])?;
                    let extreme = if name == "arg_max" { "max" } else { "min" };
                    let first = self
                        .dialect
                        .translate_aggregate(extreme, std::slice::from_ref(&by_sql))
                        .ok_or_else(|| KqlError::unsupported(extreme))?;
                    let first_name = namer.name(aggregate.name.as_ref(), &args[0]);
                    items.push(SelectItem::aliased(first, first_name.clone()));
                    columns.push(first_name);

                    for extra in &args[1..] {
                        if matches!(extra, Expr::Star) {
                            return Err(KqlError::unsupported(format!(
                                "{}(..., *) with other aggregates",
                                name
                            )));
                        }
                        let value = x.translate(extra)?;
                        let sql = self
                            .dialect
                            .translate_aggregate(name, &[by_sql.clone(), value])
                            .ok_or_else(|| KqlError::unsupported(name.clone()))?;
                        let column = namer.name(None, extra);
                        items.push(SelectItem::aliased(sql, column.clone()));
                        columns.push(column);
                    }
                }
                expr => {
                    let sql = x.translate_aggregate(expr)?;
                    let name = aggregate
                        .name
                        .clone()
                        .or_else(|| aggregate_default_name(expr))
                        .unwrap_or_else(|| namer.name(None, expr));
                    items.push(SelectItem::aliased(sql, name.clone()));
                    columns.push(name);
                }
            }
        }

        let mut select = fragment.into_select(self.dialect, Select::is_plain);
        select.order_by.clear();
        select.items = items;
        select.group_by = group_by;
        Ok(Fragment::select(select, Some(columns)))
    }

    /// `summarize arg_max(x, *) by k`: whole rows holding the extreme `x` per key.
    fn keep_extreme_rows(
        &self,
        fragment: Fragment,
        max: bool,
        by_expr: &Expr,
        keys: &[NamedExpr],
    ) -> KqlResult<Fragment> {
        let x = self.exprs();
        let order = x.translate(by_expr)?;
        let partition = keys
            .iter()
            .map(|k| x.translate(&k.expr))
            .collect::<KqlResult<Vec<_>>>()?;
        let direction = if max { "DESC" } else { "ASC" };
        let window = if partition.is_empty() {
            format!("ROW_NUMBER() OVER (ORDER BY {} {} NULLS LAST)", order, direction)
        } else {
            format!(
                "ROW_NUMBER() OVER (PARTITION BY {} ORDER BY {} {} NULLS LAST)",
                partition.join(", "),
                order,
                direction
            )
        };
        let columns = fragment.columns.clone();
        let inner = fragment.to_sql(self.dialect);
        let sql = self
            .dialect
            .qualify(&inner, &window, "= 1", columns.as_deref());
        Ok(Fragment::sql(sql, columns))
    }

    fn sort(&self, fragment: Fragment, keys: &[SortKey]) -> KqlResult<Fragment> {
        let x = self.exprs();
        let mut order_by = Vec::with_capacity(keys.len());
        for key in keys {
            // Descending unless asked otherwise.
            let direction = match key.order {
                Some(SortOrder::Asc) => "ASC",
                Some(SortOrder::Desc) | None => "DESC",
            };
            let mut sql = format!("{} {}", x.translate(&key.expr)?, direction);
            match key.nulls {
                Some(NullsOrder::First) => sql.push_str(" NULLS FIRST"),
                Some(NullsOrder::Last) => sql.push_str(" NULLS LAST"),
                None => {}
            }
            order_by.push(sql);
        }

        let simple_keys = keys.iter().all(|k| k.expr.as_name().is_some());
        let columns = fragment.columns.clone();
        let mut select = fragment.into_select(self.dialect, |s| {
            s.limit.is_none() && (simple_keys || s.is_plain())
        });
        select.order_by = order_by;
        Ok(Fragment::select(select, columns))
    }

    /// Consecutive literal limits collapse to the smaller one; any other
    /// existing limit is wrapped first.
    fn take(&self, fragment: Fragment, count: &Expr) -> KqlResult<Fragment> {
        let limit = self.exprs().translate(count)?;
        let literal = limit.parse::<u64>().ok();
        let columns = fragment.columns.clone();
        let mut select = fragment.into_select(self.dialect, |s| match &s.limit {
            None => true,
            Some(existing) => literal.is_some() && existing.parse::<u64>().is_ok(),
        });
        let existing = select.limit.as_deref().and_then(|l| l.parse::<u64>().ok());
        select.limit = Some(match (existing, literal) {
            (Some(existing), Some(n)) => existing.min(n).to_string(),
            _ => limit,
        });
        Ok(Fragment::select(select, columns))
    }

    fn count(&self, fragment: Fragment) -> Fragment {
        let mut select = fragment.into_select(self.dialect, Select::is_plain);
        select.order_by.clear();
        select.items = vec![SelectItem::aliased("COUNT(*)", "Count")];
        Fragment::select(select, Some(vec!["Count".to_string()]))
    }

    fn distinct(&self, fragment: Fragment, exprs: &[Expr]) -> KqlResult<Fragment> {
        let x = self.exprs();
        let mut namer = ColumnNamer::default();
        let mut items = Vec::with_capacity(exprs.len());
        let mut columns = Vec::with_capacity(exprs.len());
        for expr in exprs {
            let name = namer.name(None, expr);
            items.push(SelectItem::aliased(x.translate(expr)?, name.clone()));
            columns.push(name);
        }
        let columns = if exprs.is_empty() {
            fragment.columns.clone()
        } else {
            Some(columns)
        };

        let mut select = fragment.into_select(self.dialect, Select::is_plain);
        select.order_by.clear();
        select.distinct = true;
        select.items = items;
        Ok(Fragment::select(select, columns))
    }

    fn join(
        &self,
        left: Fragment,
        kind: JoinKind,
        right: &Pipeline,
        on: &[Expr],
    ) -> KqlResult<Fragment> {
        let right = self.translate(right)?;
        let keys = join_keys(on)?;

        let join_type = match kind {
            JoinKind::InnerUnique | JoinKind::Inner => "INNER JOIN",
            JoinKind::LeftOuter => "LEFT OUTER JOIN",
            JoinKind::RightOuter => "RIGHT OUTER JOIN",
            JoinKind::FullOuter => "FULL OUTER JOIN",
            JoinKind::LeftSemi | JoinKind::LeftAnti => {
                return Ok(self.semi_join(left, "_l", right, "_r", &keys, kind == JoinKind::LeftAnti));
            }
            JoinKind::RightSemi | JoinKind::RightAnti => {
                return Ok(self.semi_join(right, "_r", left, "_l", &keys, kind == JoinKind::RightAnti));
            }
        };

        let left = if kind == JoinKind::InnerUnique {
            self.dedup_left(left, &keys)
        } else {
            left
        };

        let shared = keys.iter().all(|k| k.shared);
        let condition = if shared {
            let names: Vec<String> = keys.iter().map(|k| self.quote(&k.left)).collect();
            format!("USING ({})", names.join(", "))
        } else {
            format!("ON {}", self.key_equalities(&keys))
        };

        let from = format!(
            "{} {} {} {}",
            left.relation(self.dialect, "_l"),
            join_type,
            right.relation(self.dialect, "_r"),
            condition
        );

        let using: Vec<&str> = if shared {
            keys.iter().map(|k| k.left.as_str()).collect()
        } else {
            vec![]
        };
        let (items, columns) = self.join_output(
            left.columns.as_deref(),
            right.columns.as_deref(),
            &using,
        );
        let mut select = Select::new(FromItem::Raw(from));
        select.items = items;
        Ok(Fragment::select(select, columns))
    }

    fn key_equalities(&self, keys: &[JoinKey]) -> String {
        keys.iter()
            .map(|k| format!("_l.{} = _r.{}", self.quote(&k.left), self.quote(&k.right)))
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    /// At most one left row per key tuple, chosen arbitrarily.
    fn dedup_left(&self, left: Fragment, keys: &[JoinKey]) -> Fragment {
        let partition: Vec<String> = keys.iter().map(|k| self.quote(&k.left)).collect();
        let window = format!("ROW_NUMBER() OVER (PARTITION BY {})", partition.join(", "));
        let columns = left.columns.clone();
        let inner = left.to_sql(self.dialect);
        Fragment::sql(
            self.dialect
                .qualify(&inner, &window, "= 1", columns.as_deref()),
            columns,
        )
    }

    /// `[NOT] EXISTS` filter keeping rows of `outer` with (or without) a match.
    fn semi_join(
        &self,
        outer: Fragment,
        outer_alias: &str,
        inner: Fragment,
        inner_alias: &str,
        keys: &[JoinKey],
        anti: bool,
    ) -> Fragment {
        let exists = format!(
            "{}EXISTS (SELECT 1 FROM {} WHERE {})",
            if anti { "NOT " } else { "" },
            inner.relation(self.dialect, inner_alias),
            self.key_equalities(keys)
        );
        let columns = outer.columns.clone();
        let mut select = Select::new(FromItem::Raw(outer.relation(self.dialect, outer_alias)));
        select.push_filter(exists, false);
        Fragment::select(select, columns)
    }

    /// Spell out the joined columns when both sides are known, renaming
    /// right-side duplicates `name1`, `name2`, ...
    fn join_output(
        &self,
        left: Option<&[String]>,
        right: Option<&[String]>,
        using: &[&str],
    ) -> (Vec<SelectItem>, Option<Vec<String>>) {
        let (Some(left), Some(right)) = (left, right) else {
            return (vec![], None);
        };
        let mut items = Vec::with_capacity(left.len() + right.len());
        let mut columns: Vec<String> = Vec::with_capacity(left.len() + right.len());

        for c in left {
            let sql = if using.contains(&c.as_str()) {
                self.quote(c)
            } else {
                format!("_l.{}", self.quote(c))
            };
            items.push(SelectItem::aliased(sql, c.clone()));
            columns.push(c.clone());
        }
        for c in right {
            if using.contains(&c.as_str()) {
                continue;
            }
            let mut name = c.clone();
            let mut n = 1;
            while columns.contains(&name) {
                name = format!("{}{}", c, n);
                n += 1;
            }
            items.push(SelectItem::aliased(format!("_r.{}", self.quote(c)), name.clone()));
            columns.push(name);
        }
        (items, Some(columns))
    }

    /// `UNION ALL` of the piped input (if any) and the listed tables.
    fn union(&self, input: Option<Fragment>, union: &Union) -> KqlResult<Fragment> {
        let mut branches: Vec<(String, Fragment)> = Vec::with_capacity(union.tables.len() + 1);
        if let Some(fragment) = input {
            let label = fragment
                .bare_table()
                .map(|t| t.trim_matches('"').to_string())
                .unwrap_or_else(|| "union_arg0".to_string());
            branches.push((label, fragment));
        }
        for table in &union.tables {
            let label = table
                .as_table()
                .map(str::to_string)
                .unwrap_or_else(|| format!("union_arg{}", branches.len()));
            branches.push((label, self.translate(table)?));
        }

        let mut columns = branches.first().and_then(|(_, f)| f.columns.clone());
        let mut parts = Vec::with_capacity(branches.len());
        for (label, fragment) in &branches {
            let sql = match &union.with_source {
                Some(source_column) => {
                    let mut select = Select::new(FromItem::Raw(fragment.relation(self.dialect, "_u")));
                    select.items = vec![
                        SelectItem::raw("*"),
                        SelectItem::aliased(quote_string(label), source_column.clone()),
                    ];
                    select.to_sql(self.dialect)
                }
                None => match &fragment.body {
                    Body::Select(s) if !s.order_by.is_empty() || s.limit.is_some() => {
                        format!("({})", s.to_sql(self.dialect))
                    }
                    _ => fragment.to_sql(self.dialect),
                },
            };
            parts.push(sql);
        }
        if let (Some(cols), Some(source_column)) = (columns.as_mut(), &union.with_source) {
            cols.push(source_column.clone());
        }
        Ok(Fragment::sql(parts.join(" UNION ALL "), columns))
    }

    fn mv_expand(&self, fragment: Fragment, column: &str, to_type: Option<&str>) -> KqlResult<Fragment> {
        let cast = to_type.map(|t| self.dialect.map_type(t)).transpose()?;
        let expansion = self.dialect.unnest("_src", column, "_mv", cast);

        let known = fragment.columns.as_deref();
        let others = match known {
            Some(cols) if cols.iter().all(|c| c == column) => None,
            _ => Some(
                self.dialect
                    .select_exclude(Some("_src"), &[column.to_string()], known)
                    .map_err(|e| match known {
                        None => unknown_columns("mv-expand"),
                        Some(_) => e,
                    })?,
            ),
        };

        let columns = fragment.columns.as_ref().map(|cols| {
            let mut out: Vec<String> = cols.iter().filter(|c| *c != column).cloned().collect();
            out.push(column.to_string());
            out
        });

        let mut select = Select::new(FromItem::Raw(fragment.relation(self.dialect, "_src")));
        select.items = others.into_iter().map(SelectItem::raw).collect();
        select.items.push(SelectItem::aliased(expansion.value, column));
        select.joins.extend(expansion.join);
        Ok(Fragment::select(select, columns))
    }
}

/// Split `on` into key equalities. Accepts bare column names and
/// `$left.a == $right.b`, joined by `,` or `and`.
fn join_keys(on: &[Expr]) -> KqlResult<Vec<JoinKey>> {
    fn collect(expr: &Expr, out: &mut Vec<JoinKey>) -> KqlResult<()> {
        match expr {
            Expr::Name(name) => out.push(JoinKey {
                left: name.clone(),
                right: name.clone(),
                shared: true,
            }),
            Expr::Paren(inner) => collect(inner, out)?,
            Expr::Binary {
                left,
                op: BinaryOp::And,
                right,
            } => {
                collect(left, out)?;
                collect(right, out)?;
            }
            Expr::Binary {
                left,
                op: BinaryOp::Eq,
                right,
            } => match (left.as_ref(), right.as_ref()) {
                (
                    Expr::JoinSide {
                        side: JoinSide::Left,
                        column: l,
                    },
                    Expr::JoinSide {
                        side: JoinSide::Right,
                        column: r,
                    },
                )
                | (
                    Expr::JoinSide {
                        side: JoinSide::Right,
                        column: r,
                    },
                    Expr::JoinSide {
                        side: JoinSide::Left,
                        column: l,
                    },
                ) => out.push(JoinKey {
                    left: l.clone(),
                    right: r.clone(),
                    shared: false,
                }),
                _ => return Err(KqlError::unsupported("join condition")),
            },
            _ => return Err(KqlError::unsupported("join condition")),
        }
        Ok(())
    }

    let mut keys = Vec::new();
    for expr in on {
        collect(expr, &mut keys)?;
    }
    if keys.is_empty() {
        return Err(KqlError::unsupported("join condition"));
    }
    Ok(keys)
}

/// Whether `sql` contains `ident` as a whole word.
fn mentions(sql: &str, ident: &str) -> bool {
    sql.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .any(|token| token == ident)
}
