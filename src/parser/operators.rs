//! Pipeline, source and pipe-operator parsing.

use nom::{
    branch::alt,
    bytes::complete::take_while1,
    character::complete::{char, multispace0},
    combinator::{cut, map, opt, value},
    multi::{many0, separated_list1},
    sequence::{delimited, preceded, separated_pair, tuple},
    IResult,
};

use super::base::*;
use super::expressions::*;
use crate::ast::*;

/// Parse `Source | op | op ...`.
pub fn parse_pipeline(input: &str) -> IResult<&str, Pipeline> {
    let (input, source) = preceded(multispace0, parse_source)(input)?;
    let (input, operators) = many0(preceded(
        symbol("|"),
        cut(preceded(multispace0, parse_operator)),
    ))(input)?;
    Ok((input, Pipeline { source, operators }))
}

fn parenthesized_pipeline(input: &str) -> IResult<&str, Pipeline> {
    delimited(symbol("("), parse_pipeline, symbol(")"))(input)
}

/// The head of a pipeline.
pub fn parse_source(input: &str) -> IResult<&str, Source> {
    alt((
        parse_range,
        map(preceded(keyword("union"), parse_union_body), Source::Union),
        map(
            preceded(keyword("print"), separated_list1(symbol(","), parse_named_expr)),
            Source::Print,
        ),
        parse_datatable,
        map(preceded(keyword("materialize"), parenthesized_pipeline), |p| {
            Source::Materialize(Box::new(p))
        }),
        parse_view,
        map(
            delimited(char('('), parse_pipeline, symbol(")")),
            |p| Source::Nested(Box::new(p)),
        ),
        map(identifier, |name| Source::Table(name.to_string())),
    ))(input)
}

/// `range x from a to b step c`
fn parse_range(input: &str) -> IResult<&str, Source> {
    let (input, _) = keyword("range")(input)?;
    let (input, column) = ws_identifier(input)?;
    let (input, _) = ws_keyword("from")(input)?;
    let (input, start) = parse_expr(input)?;
    let (input, _) = ws_keyword("to")(input)?;
    let (input, end) = parse_expr(input)?;
    let (input, _) = ws_keyword("step")(input)?;
    let (input, step) = parse_expr(input)?;
    Ok((
        input,
        Source::Range {
            column,
            start,
            end,
            step,
        },
    ))
}

/// `view () { pipeline }` or `view(pipeline)`
fn parse_view(input: &str) -> IResult<&str, Source> {
    let (input, _) = keyword("view")(input)?;
    let declaration = preceded(
        tuple((symbol("("), symbol(")"))),
        delimited(symbol("{"), parse_pipeline, symbol("}")),
    );
    let (input, body) = alt((declaration, parenthesized_pipeline))(input)?;
    Ok((input, Source::View(Box::new(body))))
}

/// `datatable(a:long, b:string) [1, 'x', 2, 'y']`
fn parse_datatable(input: &str) -> IResult<&str, Source> {
    let (input, _) = keyword("datatable")(input)?;
    let (input, columns) = delimited(
        symbol("("),
        separated_list1(symbol(","), parse_column_def),
        symbol(")"),
    )(input)?;
    let (input, values) = delimited(symbol("["), parse_expr_list, symbol("]"))(input)?;
    Ok((input, Source::Datatable { columns, values }))
}

/// `name:type`
pub fn parse_column_def(input: &str) -> IResult<&str, ColumnDef> {
    map(
        separated_pair(ws_identifier, symbol(":"), ws_identifier),
        |(name, ty)| ColumnDef { name, ty },
    )(input)
}

/// `[withsource=C] [kind=...] T1, (T2 | ...), ...`
fn parse_union_body(input: &str) -> IResult<&str, Union> {
    let (input, params) = many0(parse_parameter)(input)?;
    let with_source = params
        .into_iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("withsource"))
        .map(|(_, value)| value);
    let (input, tables) = separated_list1(
        symbol(","),
        alt((
            preceded(multispace0, parenthesized_pipeline),
            map(ws_identifier, Pipeline::table),
        )),
    )(input)?;
    Ok((
        input,
        Union {
            with_source,
            tables,
        },
    ))
}

/// `name=value` operator parameter, e.g. `kind=inner` or `hint.strategy=shuffle`.
fn parse_parameter(input: &str) -> IResult<&str, (String, String)> {
    let (input, name) = preceded(
        multispace0,
        take_while1(|c: char| is_ident_char(c) || c == '.'),
    )(input)?;
    let (input, _) = preceded(multispace0, char('='))(input)?;
    let (input, value) = preceded(
        multispace0,
        alt((string_literal, map(take_while1(is_ident_char), str::to_string))),
    )(input)?;
    Ok((input, (name.to_string(), value)))
}

fn parse_ident_list(input: &str) -> IResult<&str, Vec<String>> {
    separated_list1(symbol(","), ws_identifier)(input)
}

fn parse_sort_key(input: &str) -> IResult<&str, SortKey> {
    let (input, expr) = parse_expr(input)?;
    let (input, order) = opt(alt((
        value(SortOrder::Asc, ws_keyword("asc")),
        value(SortOrder::Desc, ws_keyword("desc")),
    )))(input)?;
    let (input, nulls) = opt(preceded(
        ws_keyword("nulls"),
        alt((
            value(NullsOrder::First, ws_keyword("first")),
            value(NullsOrder::Last, ws_keyword("last")),
        )),
    ))(input)?;
    Ok((input, SortKey { expr, order, nulls }))
}

/// Parse a single pipe operator.
pub fn parse_operator(input: &str) -> IResult<&str, Operator> {
    let (rest, name) = operator_name(input)?;
    match name {
        "where" | "filter" => map(parse_expr, Operator::Where)(rest),
        "project" => map(
            separated_list1(symbol(","), parse_named_expr),
            Operator::Project,
        )(rest),
        "project-away" => map(parse_ident_list, Operator::ProjectAway)(rest),
        "project-keep" => map(parse_ident_list, Operator::ProjectKeep)(rest),
        "project-reorder" => map(parse_ident_list, Operator::ProjectReorder)(rest),
        "project-rename" => map(
            separated_list1(
                symbol(","),
                separated_pair(ws_identifier, symbol("="), ws_identifier),
            ),
            Operator::ProjectRename,
        )(rest),
        "extend" => map(
            separated_list1(symbol(","), parse_named_expr),
            Operator::Extend,
        )(rest),
        "summarize" => parse_summarize(rest),
        "sort" | "order" => map(
            preceded(
                ws_keyword("by"),
                separated_list1(symbol(","), parse_sort_key),
            ),
            Operator::Sort,
        )(rest),
        "take" | "limit" => map(parse_expr, Operator::Take)(rest),
        "top" => parse_top(rest),
        "count" => Ok((rest, Operator::Count)),
        "distinct" => parse_distinct(rest),
        "join" => parse_join(rest),
        "union" => map(parse_union_body, Operator::Union)(rest),
        "mv-expand" => parse_mv_expand(rest),
        other => Ok((skip_operator_args(rest), Operator::Unknown(other.to_string()))),
    }
}

fn parse_summarize(input: &str) -> IResult<&str, Operator> {
    let (input, aggregates) = if ws_keyword("by")(input).is_ok() {
        (input, vec![])
    } else {
        separated_list1(symbol(","), parse_named_expr)(input)?
    };
    let (input, by) = opt(preceded(
        ws_keyword("by"),
        separated_list1(symbol(","), parse_named_expr),
    ))(input)?;
    Ok((
        input,
        Operator::Summarize {
            aggregates,
            by: by.unwrap_or_default(),
        },
    ))
}

fn parse_top(input: &str) -> IResult<&str, Operator> {
    let (input, count) = parse_expr(input)?;
    let (input, _) = ws_keyword("by")(input)?;
    let (input, key) = parse_sort_key(input)?;
    Ok((input, Operator::Top { count, key }))
}

fn parse_distinct(input: &str) -> IResult<&str, Operator> {
    if let Ok((rest, _)) = symbol("*")(input) {
        return Ok((rest, Operator::Distinct(vec![])));
    }
    map(
        separated_list1(symbol(","), parse_expr),
        Operator::Distinct,
    )(input)
}

fn parse_join(input: &str) -> IResult<&str, Operator> {
    let (input, params) = many0(parse_parameter)(input)?;
    let mut kind = JoinKind::default();
    for (name, value) in &params {
        if name == "kind" {
            match JoinKind::from_name(value) {
                Some(k) => kind = k,
                None => {
                    return Ok((
                        skip_operator_args(input),
                        Operator::Unknown(format!("join kind={}", value)),
                    ));
                }
            }
        }
    }
    let (input, right) = alt((
        preceded(multispace0, parenthesized_pipeline),
        map(ws_identifier, Pipeline::table),
    ))(input)?;
    let (input, _) = ws_keyword("on")(input)?;
    let (input, on) = separated_list1(symbol(","), parse_expr)(input)?;
    Ok((
        input,
        Operator::Join {
            kind,
            right: Box::new(right),
            on,
        },
    ))
}

fn parse_mv_expand(input: &str) -> IResult<&str, Operator> {
    let (input, _) = many0(parse_parameter)(input)?;
    let (input, column) = ws_identifier(input)?;
    let (input, to_type) = opt(preceded(
        tuple((ws_keyword("to"), ws_keyword("typeof"))),
        delimited(symbol("("), ws_identifier, symbol(")")),
    ))(input)?;
    Ok((input, Operator::MvExpand { column, to_type }))
}

/// Skip the arguments of an operator we have no grammar for, stopping at the
/// next top-level `|`, `;` or closing bracket.
fn skip_operator_args(input: &str) -> &str {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, c) in input.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' if depth == 0 => return &input[i..],
            ')' | ']' | '}' => depth -= 1,
            '|' | ';' if depth == 0 => return &input[i..],
            _ => {}
        }
    }
    &input[input.len()..]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipeline(s: &str) -> Pipeline {
        let (rest, p) = parse_pipeline(s).unwrap();
        assert_eq!(rest.trim(), "", "unparsed input in {:?}", s);
        p
    }

    #[test]
    fn test_table_source() {
        assert_eq!(pipeline("StormEvents"), Pipeline::table("StormEvents"));
    }

    #[test]
    fn test_filter_chain() {
        let p = pipeline("T | where a == 1 | where b == 2");
        assert_eq!(p.operators.len(), 2);
        assert!(matches!(p.operators[0], Operator::Where(_)));
    }

    #[test]
    fn test_summarize_by() {
        let p = pipeline("T | summarize n = count(), avg(x) by bin(ts, 1h), State");
        match &p.operators[0] {
            Operator::Summarize { aggregates, by } => {
                assert_eq!(aggregates.len(), 2);
                assert_eq!(aggregates[0].name.as_deref(), Some("n"));
                assert_eq!(by.len(), 2);
            }
            other => panic!("unexpected {:?}", other),
        }
        let p = pipeline("T | summarize by State");
        assert!(matches!(
            &p.operators[0],
            Operator::Summarize { aggregates, by } if aggregates.is_empty() && by.len() == 1
        ));
    }

    #[test]
    fn test_sort_keys() {
        let p = pipeline("T | order by x asc nulls last, y");
        match &p.operators[0] {
            Operator::Sort(keys) => {
                assert_eq!(keys[0].order, Some(SortOrder::Asc));
                assert_eq!(keys[0].nulls, Some(NullsOrder::Last));
                assert_eq!(keys[1].order, None);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_join_forms() {
        let p = pipeline("X | join kind=leftouter (Y | where a > 1) on $left.k == $right.k2");
        match &p.operators[0] {
            Operator::Join { kind, right, on } => {
                assert_eq!(*kind, JoinKind::LeftOuter);
                assert_eq!(right.operators.len(), 1);
                assert_eq!(on.len(), 1);
            }
            other => panic!("unexpected {:?}", other),
        }
        let p = pipeline("X | join Y on K");
        assert!(matches!(
            &p.operators[0],
            Operator::Join { kind: JoinKind::InnerUnique, .. }
        ));
    }

    #[test]
    fn test_unknown_join_kind() {
        let p = pipeline("X | join kind=sideways Y on K | take 1");
        assert_eq!(p.operators[0], Operator::Unknown("join kind=sideways".into()));
        assert_eq!(p.operators[1], Operator::Take(Expr::Literal(Literal::long(1))));
    }

    #[test]
    fn test_unknown_operator_skips_arguments() {
        let p = pipeline("T | frobnicate x, (y | z) | take 3");
        assert_eq!(p.operators[0], Operator::Unknown("frobnicate".into()));
        assert_eq!(p.operators[1], Operator::Take(Expr::Literal(Literal::long(3))));
    }

    #[test]
    fn test_sources() {
        assert!(matches!(
            pipeline("range x from 1 to 10 step 2").source,
            Source::Range { .. }
        ));
        assert!(matches!(
            pipeline("union withsource=Src A, (B | take 1)").source,
            Source::Union(Union { with_source: Some(_), ref tables }) if tables.len() == 2
        ));
        assert!(matches!(
            pipeline("datatable(a:long, b:string) [1, 'x', 2, 'y']").source,
            Source::Datatable { ref columns, ref values } if columns.len() == 2 && values.len() == 4
        ));
        assert!(matches!(
            pipeline("view () { T | take 1 }").source,
            Source::View(_)
        ));
        assert!(matches!(
            pipeline("materialize(T | take 1)").source,
            Source::Materialize(_)
        ));
    }

    #[test]
    fn test_mv_expand_typed() {
        let p = pipeline("T | mv-expand tags to typeof(string)");
        assert_eq!(
            p.operators[0],
            Operator::MvExpand {
                column: "tags".into(),
                to_type: Some("string".into())
            }
        );
    }

    #[test]
    fn test_project_family() {
        let p = pipeline(
            "T | project-away a, b | project-rename c = d | project-reorder e | project-keep f",
        );
        assert_eq!(
            p.operators,
            vec![
                Operator::ProjectAway(vec!["a".into(), "b".into()]),
                Operator::ProjectRename(vec![("c".into(), "d".into())]),
                Operator::ProjectReorder(vec!["e".into()]),
                Operator::ProjectKeep(vec!["f".into()]),
            ]
        );
    }
}
