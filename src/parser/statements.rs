//! Script-level parsing: `let` bindings, the final query and dot-commands.

use nom::{
    character::complete::multispace0,
    sequence::{preceded, tuple},
    IResult,
};

use super::base::*;
use super::commands::parse_command;
use super::expressions::parse_expr;
use super::operators::parse_pipeline;
use crate::ast::*;
use crate::error::{KqlError, KqlResult};

/// Split a script into statements.
///
/// Statements are separated by `;`. A dot-command consumes the rest of the
/// input, since its payload may contain anything.
pub fn parse_statements(input: &str) -> KqlResult<Vec<Statement>> {
    let mut statements = Vec::new();
    let mut rest = input;

    loop {
        let trimmed = rest.trim_start();
        if trimmed.is_empty() {
            break;
        }
        if let Some(after) = trimmed.strip_prefix(';') {
            rest = after;
            continue;
        }
        if trimmed.starts_with('.') {
            statements.push(Statement::Command(parse_command(trimmed)?));
            break;
        }

        let parsed = if keyword("let")(trimmed).is_ok() {
            parse_let(trimmed)
        } else {
            parse_pipeline(trimmed).map(|(r, p)| (r, Statement::Query(p)))
        };
        let (after, statement) = parsed.map_err(|e| nom_error(input, e))?;
        statements.push(statement);

        let after = after.trim_start();
        match after.strip_prefix(';') {
            Some(next) => rest = next,
            None if after.is_empty() => break,
            None => {
                return Err(KqlError::parse(
                    input.len() - after.len(),
                    format!("Unexpected trailing content: '{}'", snippet(after)),
                ));
            }
        }
    }

    Ok(statements)
}

/// `let name = <pipeline | scalar>`
fn parse_let(input: &str) -> IResult<&str, Statement> {
    let (input, (_, name, _)) = tuple((keyword("let"), ws_identifier, symbol("=")))(input)?;
    let (input, value) = preceded(multispace0, parse_let_value)(input)?;
    Ok((input, Statement::Let { name, value }))
}

/// A let value is tabular when it parses as a full pipeline up to the end of
/// the statement, otherwise scalar.
fn parse_let_value(input: &str) -> IResult<&str, LetValue> {
    match parse_pipeline(input) {
        Ok((rest, pipeline)) if at_statement_end(rest) => {
            return Ok((rest, LetValue::Tabular(pipeline)));
        }
        Err(nom::Err::Failure(e)) => return Err(nom::Err::Failure(e)),
        _ => {}
    }
    let (rest, expr) = parse_expr(input)?;
    Ok((rest, LetValue::Scalar(expr)))
}

fn at_statement_end(rest: &str) -> bool {
    let rest = rest.trim_start();
    rest.is_empty() || rest.starts_with(';')
}

/// Map a nom error back to a byte offset in the original script.
fn nom_error(input: &str, err: nom::Err<nom::error::Error<&str>>) -> KqlError {
    match err {
        nom::Err::Error(e) | nom::Err::Failure(e) => {
            let position = input.len() - e.input.len();
            let message = if e.input.trim().is_empty() {
                "Unexpected end of input".to_string()
            } else {
                format!("Unexpected input near '{}'", snippet(e.input))
            };
            KqlError::parse(position, message)
        }
        nom::Err::Incomplete(_) => KqlError::parse(input.len(), "Incomplete input"),
    }
}

fn snippet(s: &str) -> String {
    s.trim().chars().take(30).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_query() {
        let stmts = parse_statements("T | take 5").unwrap();
        assert_eq!(stmts.len(), 1);
        assert!(matches!(stmts[0], Statement::Query(_)));
    }

    #[test]
    fn test_lets_then_query() {
        let stmts =
            parse_statements("let n = 10;\nlet t = T | where x > n;\nt | take n;").unwrap();
        assert_eq!(stmts.len(), 3);
        assert!(matches!(
            &stmts[0],
            Statement::Let { value: LetValue::Scalar(_), .. }
        ));
        assert!(matches!(
            &stmts[1],
            Statement::Let { value: LetValue::Tabular(_), .. }
        ));
    }

    #[test]
    fn test_bare_name_let_is_tabular_shaped() {
        // Classification of bare names happens during translation.
        let stmts = parse_statements("let a = T; a").unwrap();
        assert!(matches!(
            &stmts[0],
            Statement::Let { value: LetValue::Tabular(p), .. } if p.as_table() == Some("T")
        ));
    }

    #[test]
    fn test_expression_let() {
        let stmts = parse_statements("let cutoff = ago(1d); T").unwrap();
        assert!(matches!(
            &stmts[0],
            Statement::Let { value: LetValue::Scalar(Expr::Call { .. }), .. }
        ));
    }

    #[test]
    fn test_error_position() {
        let err = parse_statements("T | where").unwrap_err();
        match err {
            KqlError::Parse { position, .. } => assert_eq!(position, 9),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_trailing_garbage() {
        let err = parse_statements("T | take 5 )").unwrap_err();
        assert!(matches!(err, KqlError::Parse { position: 11, .. }));
    }

    #[test]
    fn test_command_after_let() {
        let stmts = parse_statements("let a = 1;\n.drop table T").unwrap();
        assert!(matches!(stmts[1], Statement::Command(_)));
    }
}
