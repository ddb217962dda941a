//! Scalar expression parsing.
//!
//! Precedence, lowest first:
//! - `or`
//! - `and`
//! - comparisons, string operators, `in`, `between`
//! - `+ -`
//! - `* / %`
//! - unary `-`
//! - member access `x.y`, `x['y']`, `x[0]`

use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{char, digit1, multispace0, one_of},
    combinator::{map, opt, recognize},
    multi::separated_list0,
    sequence::{pair, preceded, tuple},
    IResult,
};

use super::base::*;
use crate::ast::*;

/// Parse a full expression.
pub fn parse_expr(input: &str) -> IResult<&str, Expr> {
    let (input, _) = multispace0(input)?;
    parse_or(input)
}

/// `name = expr` or bare `expr`.
pub fn parse_named_expr(input: &str) -> IResult<&str, NamedExpr> {
    let mut assignment = tuple((
        ws_identifier,
        multispace0,
        char('='),
        nom::combinator::not(one_of("=~")),
        parse_expr,
    ));
    if let Ok((rest, (name, _, _, _, expr))) = assignment(input) {
        return Ok((rest, NamedExpr::named(name, expr)));
    }
    map(parse_expr, NamedExpr::bare)(input)
}

pub fn parse_named_expr_list(input: &str) -> IResult<&str, Vec<NamedExpr>> {
    separated_list0(symbol(","), parse_named_expr)(input)
}

pub fn parse_expr_list(input: &str) -> IResult<&str, Vec<Expr>> {
    separated_list0(symbol(","), parse_expr)(input)
}

fn parse_or(input: &str) -> IResult<&str, Expr> {
    let (input, left) = parse_and(input)?;
    parse_binary_chain(input, left, parse_and, &[("or", BinaryOp::Or)])
}

fn parse_and(input: &str) -> IResult<&str, Expr> {
    let (input, left) = parse_comparison(input)?;
    parse_binary_chain(input, left, parse_comparison, &[("and", BinaryOp::And)])
}

fn parse_additive(input: &str) -> IResult<&str, Expr> {
    let (input, left) = parse_multiplicative(input)?;
    parse_binary_chain(
        input,
        left,
        parse_multiplicative,
        &[("+", BinaryOp::Add), ("-", BinaryOp::Sub)],
    )
}

fn parse_multiplicative(input: &str) -> IResult<&str, Expr> {
    let (input, left) = parse_unary(input)?;
    parse_binary_chain(
        input,
        left,
        parse_unary,
        &[
            ("*", BinaryOp::Mul),
            ("/", BinaryOp::Div),
            ("%", BinaryOp::Rem),
        ],
    )
}

/// Match an operator token; word operators must end on a word boundary.
fn operator_token<'a>(input: &'a str, token: &'static str) -> IResult<&'a str, &'a str> {
    if token.ends_with(|c: char| c.is_alphabetic()) {
        keyword(token)(input)
    } else {
        tag(token)(input)
    }
}

/// Generic left-associative binary chain parser.
fn parse_binary_chain<'a>(
    mut input: &'a str,
    mut left: Expr,
    parse_operand: fn(&'a str) -> IResult<&'a str, Expr>,
    operators: &[(&'static str, BinaryOp)],
) -> IResult<&'a str, Expr> {
    loop {
        let (remaining, _) = multispace0(input)?;

        let matched = operators.iter().find_map(|(token, op)| {
            operator_token(remaining, *token)
                .ok()
                .map(|(after, _)| (after, *op))
        });

        let Some((after_op, op)) = matched else {
            break;
        };
        let (after_right, right) = preceded(multispace0, parse_operand)(after_op)?;
        left = Expr::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        };
        input = after_right;
    }

    Ok((input, left))
}

const fn string_op(kind: StringOpKind, case_sensitive: bool, negated: bool) -> BinaryOp {
    BinaryOp::Str(StringOp {
        kind,
        case_sensitive,
        negated,
    })
}

/// Comparison-level operators. Longer tokens come first.
const COMPARISON_OPS: &[(&str, BinaryOp)] = &[
    ("==", BinaryOp::Eq),
    ("!=", BinaryOp::NotEq),
    ("<>", BinaryOp::NotEq),
    ("<=", BinaryOp::LtEq),
    (">=", BinaryOp::GtEq),
    ("=~", BinaryOp::EqNoCase),
    ("!~", BinaryOp::NotEqNoCase),
    ("<", BinaryOp::Lt),
    (">", BinaryOp::Gt),
    ("!has_cs", string_op(StringOpKind::Has, true, true)),
    ("has_cs", string_op(StringOpKind::Has, true, false)),
    ("!has", string_op(StringOpKind::Has, false, true)),
    ("has", string_op(StringOpKind::Has, false, false)),
    ("!contains_cs", string_op(StringOpKind::Contains, true, true)),
    ("contains_cs", string_op(StringOpKind::Contains, true, false)),
    ("!contains", string_op(StringOpKind::Contains, false, true)),
    ("contains", string_op(StringOpKind::Contains, false, false)),
    ("!startswith_cs", string_op(StringOpKind::StartsWith, true, true)),
    ("startswith_cs", string_op(StringOpKind::StartsWith, true, false)),
    ("!startswith", string_op(StringOpKind::StartsWith, false, true)),
    ("startswith", string_op(StringOpKind::StartsWith, false, false)),
    ("!endswith_cs", string_op(StringOpKind::EndsWith, true, true)),
    ("endswith_cs", string_op(StringOpKind::EndsWith, true, false)),
    ("!endswith", string_op(StringOpKind::EndsWith, false, true)),
    ("endswith", string_op(StringOpKind::EndsWith, false, false)),
];

fn parse_comparison(input: &str) -> IResult<&str, Expr> {
    let (mut input, mut left) = parse_additive(input)?;

    loop {
        let (remaining, _) = multispace0(input)?;

        if let Ok((rest, (negated, case_insensitive))) = in_operator(remaining) {
            let (rest, list) = preceded(
                symbol("("),
                nom::sequence::terminated(parse_expr_list, symbol(")")),
            )(rest)?;
            left = Expr::InList {
                expr: Box::new(left),
                list,
                negated,
                case_insensitive,
            };
            input = rest;
            continue;
        }

        if let Ok((rest, negated)) = between_operator(remaining) {
            let (rest, _) = symbol("(")(rest)?;
            let (rest, low) = parse_additive_ws(rest)?;
            let (rest, _) = symbol("..")(rest)?;
            let (rest, high) = parse_additive_ws(rest)?;
            let (rest, _) = symbol(")")(rest)?;
            left = Expr::Between {
                expr: Box::new(left),
                low: Box::new(low),
                high: Box::new(high),
                negated,
            };
            input = rest;
            continue;
        }

        let matched = COMPARISON_OPS.iter().find_map(|(token, op)| {
            operator_token(remaining, *token)
                .ok()
                .map(|(after, _)| (after, *op))
        });
        let Some((after_op, op)) = matched else {
            break;
        };
        let (rest, right) = parse_additive_ws(after_op)?;
        left = Expr::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        };
        input = rest;
    }

    Ok((input, left))
}

fn parse_additive_ws(input: &str) -> IResult<&str, Expr> {
    preceded(multispace0, parse_additive)(input)
}

/// `in`, `!in`, `in~`, `!in~` as (negated, case_insensitive).
fn in_operator(input: &str) -> IResult<&str, (bool, bool)> {
    alt((
        map(tag("!in~"), |_| (true, true)),
        map(tag("in~"), |_| (false, true)),
        map(keyword("!in"), |_| (true, false)),
        map(keyword("in"), |_| (false, false)),
    ))(input)
}

fn between_operator(input: &str) -> IResult<&str, bool> {
    alt((
        map(keyword("!between"), |_| true),
        map(keyword("between"), |_| false),
    ))(input)
}

fn parse_unary(input: &str) -> IResult<&str, Expr> {
    if let Ok((rest, _)) = char::<&str, nom::error::Error<&str>>('-')(input) {
        let (rest, inner) = preceded(multispace0, parse_unary)(rest)?;
        return Ok((rest, negate(inner)));
    }
    parse_postfix(input)
}

/// Fold `-<number>` into the literal so raw text round-trips.
fn negate(expr: Expr) -> Expr {
    match expr {
        Expr::Literal(Literal {
            value: LiteralValue::Long(n),
            raw,
        }) if n != i64::MIN => Expr::Literal(Literal::new(LiteralValue::Long(-n), negate_raw(raw))),
        Expr::Literal(Literal {
            value: LiteralValue::Real(n),
            raw,
        }) => Expr::Literal(Literal::new(LiteralValue::Real(-n), negate_raw(raw))),
        Expr::Literal(Literal {
            value: LiteralValue::TimeSpan(ms),
            raw,
        }) if ms != i64::MIN => {
            Expr::Literal(Literal::new(LiteralValue::TimeSpan(-ms), negate_raw(raw)))
        }
        other => Expr::Negate(Box::new(other)),
    }
}

/// `5` -> `-5` and `-5` -> `5`; never `--5`, which SQL reads as a comment.
fn negate_raw(raw: String) -> String {
    match raw.strip_prefix('-') {
        Some(positive) => positive.to_string(),
        None => format!("-{}", raw),
    }
}

fn parse_postfix(input: &str) -> IResult<&str, Expr> {
    let (mut input, base) = parse_primary(input)?;
    if matches!(base, Expr::Literal(_)) {
        return Ok((input, base));
    }

    let mut path = Vec::new();
    loop {
        if let Ok((rest, key)) = preceded(char('.'), identifier)(input) {
            path.push(PathSegment::Key(key.to_string()));
            input = rest;
            continue;
        }
        if let Ok((rest, segment)) = bracket_segment(input) {
            path.push(segment);
            input = rest;
            continue;
        }
        break;
    }

    if path.is_empty() {
        return Ok((input, base));
    }
    Ok((
        input,
        Expr::Member {
            base: Box::new(base),
            path,
        },
    ))
}

/// `['key']` or `[0]`
fn bracket_segment(input: &str) -> IResult<&str, PathSegment> {
    let (input, _) = char('[')(input)?;
    let (input, _) = multispace0(input)?;
    let (input, segment) = alt((
        map(string_literal, PathSegment::Key),
        map(recognize(pair(opt(char('-')), digit1)), |n: &str| {
            PathSegment::Index(n.parse().unwrap_or_default())
        }),
    ))(input)?;
    let (input, _) = symbol("]")(input)?;
    Ok((input, segment))
}

fn parse_primary(input: &str) -> IResult<&str, Expr> {
    alt((
        map(
            preceded(
                char('('),
                nom::sequence::terminated(parse_expr, symbol(")")),
            ),
            |e| Expr::Paren(Box::new(e)),
        ),
        map(parse_literal, Expr::Literal),
        parse_join_side,
        parse_call,
        map(identifier, Expr::name),
    ))(input)
}

/// `$left.col` / `$right.col`
fn parse_join_side(input: &str) -> IResult<&str, Expr> {
    let (input, side) = alt((
        map(keyword("$left"), |_| JoinSide::Left),
        map(keyword("$right"), |_| JoinSide::Right),
    ))(input)?;
    let (input, column) = preceded(char('.'), identifier)(input)?;
    Ok((
        input,
        Expr::JoinSide {
            side,
            column: column.to_string(),
        },
    ))
}

fn parse_call(input: &str) -> IResult<&str, Expr> {
    let (input, name) = identifier(input)?;
    let (input, _) = symbol("(")(input)?;
    let (input, args) = separated_list0(
        symbol(","),
        alt((map(symbol("*"), |_| Expr::Star), parse_expr)),
    )(input)?;
    let (input, _) = symbol(")")(input)?;
    Ok((input, Expr::call(name, args)))
}

/// Parse any literal form, keeping its source text.
pub fn parse_literal(input: &str) -> IResult<&str, Literal> {
    alt((
        parse_string_literal,
        parse_number_literal,
        map(keyword("true"), |raw| Literal::new(LiteralValue::Bool(true), raw)),
        map(keyword("false"), |raw| {
            Literal::new(LiteralValue::Bool(false), raw)
        }),
        parse_datetime_literal,
        parse_timespan_literal,
        parse_dynamic_literal,
        parse_typed_null,
        map(keyword("null"), |raw| {
            Literal::new(LiteralValue::Null(String::new()), raw)
        }),
    ))(input)
}

fn consumed<'a>(start: &'a str, rest: &'a str) -> &'a str {
    &start[..start.len() - rest.len()]
}

fn parse_string_literal(input: &str) -> IResult<&str, Literal> {
    let (rest, value) = string_literal(input)?;
    Ok((
        rest,
        Literal::new(LiteralValue::String(value), consumed(input, rest)),
    ))
}

fn parse_number_literal(input: &str) -> IResult<&str, Literal> {
    let (rest, number) = recognize(tuple((
        digit1,
        opt(pair(char('.'), digit1)),
        opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
    )))(input)?;

    if let Ok((after, unit)) = identifier(rest) {
        if let Some(factor) = timespan_factor(unit) {
            let value: f64 = number.parse().unwrap_or_default();
            let millis = (value * factor).round() as i64;
            return Ok((
                after,
                Literal::new(LiteralValue::TimeSpan(millis), consumed(input, after)),
            ));
        }
        return fail(input);
    }

    let value = if number.contains(['.', 'e', 'E']) {
        LiteralValue::Real(number.parse().unwrap_or_default())
    } else {
        match number.parse::<i64>() {
            Ok(n) => LiteralValue::Long(n),
            Err(_) => LiteralValue::Real(number.parse().unwrap_or_default()),
        }
    };
    Ok((rest, Literal::new(value, number)))
}

fn parse_datetime_literal(input: &str) -> IResult<&str, Literal> {
    let (rest, _) = keyword("datetime")(input)?;
    let (rest, _) = multispace0(rest)?;
    let (rest, body) = balanced(rest, '(', ')')?;
    let body = body.trim();
    let body = body.trim_matches(|c| c == '\'' || c == '"');
    match parse_datetime(body) {
        Some(dt) => Ok((
            rest,
            Literal::new(LiteralValue::DateTime(dt), consumed(input, rest)),
        )),
        None => fail(input),
    }
}

fn parse_timespan_literal(input: &str) -> IResult<&str, Literal> {
    let (rest, _) = alt((keyword("timespan"), keyword("time")))(input)?;
    let (rest, _) = multispace0(rest)?;
    let (rest, body) = balanced(rest, '(', ')')?;
    match parse_duration_millis(body) {
        Some(ms) => Ok((
            rest,
            Literal::new(LiteralValue::TimeSpan(ms), consumed(input, rest)),
        )),
        None => fail(input),
    }
}

fn parse_dynamic_literal(input: &str) -> IResult<&str, Literal> {
    let (rest, _) = keyword("dynamic")(input)?;
    let (rest, _) = multispace0(rest)?;
    let (rest, body) = balanced(rest, '(', ')')?;
    let value = serde_json::from_str(body.trim())
        .or_else(|_| serde_json::from_str(&single_to_double_quotes(body)));
    match value {
        Ok(json) => Ok((
            rest,
            Literal::new(LiteralValue::Dynamic(json), consumed(input, rest)),
        )),
        Err(_) => fail(input),
    }
}

/// `dynamic(['a', 'b'])` is accepted alongside strict JSON.
fn single_to_double_quotes(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut in_double = false;
    let mut in_single = false;
    for c in body.trim().chars() {
        match c {
            '"' if !in_single => {
                in_double = !in_double;
                out.push(c);
            }
            '\'' if !in_double => {
                in_single = !in_single;
                out.push('"');
            }
            '"' if in_single => out.push_str("\\\""),
            _ => out.push(c),
        }
    }
    out
}

/// `long(null)`, `string(null)`, ...
fn parse_typed_null(input: &str) -> IResult<&str, Literal> {
    let (rest, ty) = alt((
        keyword("bool"),
        keyword("int"),
        keyword("long"),
        keyword("real"),
        keyword("double"),
        keyword("decimal"),
        keyword("string"),
        keyword("datetime"),
        keyword("timespan"),
        keyword("guid"),
        keyword("dynamic"),
    ))(input)?;
    let (rest, _) = symbol("(")(rest)?;
    let (rest, _) = preceded(multispace0, keyword("null"))(rest)?;
    let (rest, _) = symbol(")")(rest)?;
    Ok((
        rest,
        Literal::new(LiteralValue::Null(ty.to_string()), consumed(input, rest)),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expr(s: &str) -> Expr {
        let (rest, e) = parse_expr(s).unwrap();
        assert_eq!(rest.trim(), "", "unparsed input in {:?}", s);
        e
    }

    #[test]
    fn test_precedence() {
        let e = expr("a == 1 and b > 2 or c");
        match e {
            Expr::Binary {
                op: BinaryOp::Or,
                left,
                ..
            } => assert!(matches!(
                *left,
                Expr::Binary {
                    op: BinaryOp::And,
                    ..
                }
            )),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_string_operators() {
        match expr("Name !has_cs 'x'") {
            Expr::Binary {
                op: BinaryOp::Str(op),
                ..
            } => {
                assert_eq!(op.kind, StringOpKind::Has);
                assert!(op.case_sensitive && op.negated);
            }
            other => panic!("unexpected {:?}", other),
        }
        // `hash` is a name, not the `has` operator
        assert!(matches!(expr("hash"), Expr::Name(_)));
    }

    #[test]
    fn test_in_list() {
        match expr("State in~ ('a', 'B')") {
            Expr::InList {
                list,
                negated,
                case_insensitive,
                ..
            } => {
                assert_eq!(list.len(), 2);
                assert!(!negated);
                assert!(case_insensitive);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            expr("x !in (1, 2)"),
            Expr::InList { negated: true, .. }
        ));
    }

    #[test]
    fn test_between() {
        assert!(matches!(
            expr("x between (1 .. 10)"),
            Expr::Between { negated: false, .. }
        ));
    }

    #[test]
    fn test_timespan_literals() {
        match expr("1h") {
            Expr::Literal(l) => {
                assert_eq!(l.value, LiteralValue::TimeSpan(3_600_000));
                assert_eq!(l.raw, "1h");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            expr("time(30m)"),
            Expr::Literal(Literal {
                value: LiteralValue::TimeSpan(1_800_000),
                ..
            })
        ));
    }

    #[test]
    fn test_negative_number_keeps_raw() {
        match expr("-1.5") {
            Expr::Literal(l) => assert_eq!(l.raw, "-1.5"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_double_negation_folds() {
        match expr("- -5") {
            Expr::Literal(l) => {
                assert_eq!(l.raw, "5");
                assert_eq!(l.value, LiteralValue::Long(5));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_member_access() {
        match expr("props.user['name'][0]") {
            Expr::Member { base, path } => {
                assert_eq!(*base, Expr::name("props"));
                assert_eq!(
                    path,
                    vec![
                        PathSegment::Key("user".into()),
                        PathSegment::Key("name".into()),
                        PathSegment::Index(0),
                    ]
                );
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_call_with_star() {
        assert_eq!(
            expr("arg_max(ts, *)"),
            Expr::call("arg_max", vec![Expr::name("ts"), Expr::Star])
        );
    }

    #[test]
    fn test_dynamic_and_datetime() {
        assert!(matches!(
            expr("dynamic(['a', 'b'])"),
            Expr::Literal(Literal {
                value: LiteralValue::Dynamic(_),
                ..
            })
        ));
        assert!(matches!(
            expr("datetime(2024-01-01)"),
            Expr::Literal(Literal {
                value: LiteralValue::DateTime(_),
                ..
            })
        ));
        assert!(matches!(
            expr("long(null)"),
            Expr::Literal(Literal {
                value: LiteralValue::Null(_),
                ..
            })
        ));
    }

    #[test]
    fn test_named_expr() {
        let (_, n) = parse_named_expr("total = a + b").unwrap();
        assert_eq!(n.name.as_deref(), Some("total"));
        let (_, n) = parse_named_expr("a == b").unwrap();
        assert_eq!(n.name, None);
    }

    #[test]
    fn test_join_side() {
        assert_eq!(
            expr("$left.id == $right.user_id"),
            Expr::Binary {
                left: Box::new(Expr::JoinSide {
                    side: JoinSide::Left,
                    column: "id".into()
                }),
                op: BinaryOp::Eq,
                right: Box::new(Expr::JoinSide {
                    side: JoinSide::Right,
                    column: "user_id".into()
                }),
            }
        );
    }
}
