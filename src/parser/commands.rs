//! Dot-command parsing (`.ingest`, `.view`, `.create table`, ...).
//!
//! Embedded queries are returned as text; the command translator compiles
//! them with the regular statement driver.

use nom::{
    branch::alt,
    bytes::complete::take_while1,
    character::complete::{char, multispace0},
    combinator::{map, opt},
    multi::separated_list0,
    sequence::{delimited, preceded, separated_pair, tuple},
    IResult,
};

use super::base::*;
use super::operators::parse_column_def;
use crate::ast::{ColumnDef, Command, FileFormat};
use crate::error::{KqlError, KqlResult};

/// Parse a dot-command. The input must start with `.`.
pub fn parse_command(input: &str) -> KqlResult<Command> {
    let text = input.trim();
    let head = text.lines().next().unwrap_or_default().trim();
    let malformed = || KqlError::unsupported(format!("malformed command: {}", head));

    let (rest, name) = match preceded(char('.'), operator_name)(text) {
        Ok(parsed) => parsed,
        Err(_) => return Err(malformed()),
    };
    match name {
        "ingest" => parse_ingest(rest)?.ok_or_else(malformed),
        "view" => finish(parse_view(rest)).ok_or_else(malformed),
        "create" => finish(parse_create_table(rest)).ok_or_else(malformed),
        "drop" => finish(parse_drop_table(rest)).ok_or_else(malformed),
        "set" => finish(map(piped_query, |(table, query)| Command::Set { table, query })(rest))
            .ok_or_else(malformed),
        "append" => {
            finish(map(piped_query, |(table, query)| Command::Append { table, query })(rest))
                .ok_or_else(malformed)
        }
        other => Err(KqlError::unsupported(format!(".{}", other))),
    }
}

/// Accept a parse only if it consumed everything but whitespace.
fn finish<T>(result: IResult<&str, T>) -> Option<T> {
    match result {
        Ok((rest, value)) if rest.trim().is_empty() => Some(value),
        _ => None,
    }
}

/// `Ok(None)` means the text matched neither ingest form.
fn parse_ingest(input: &str) -> KqlResult<Option<Command>> {
    if let Ok((rest, (_, _, _, table, _))) = tuple((
        ws_keyword("inline"),
        ws_keyword("into"),
        ws_keyword("table"),
        ws_identifier,
        symbol("<|"),
    ))(input)
    {
        return Ok(Some(Command::IngestInline {
            table,
            data: inline_payload(rest).to_string(),
        }));
    }

    let parsed = tuple((
        ws_keyword("into"),
        ws_keyword("table"),
        ws_identifier,
        preceded(multispace0, ingest_source),
        opt(preceded(ws_keyword("with"), properties)),
    ))(input);
    let (table, path, props) = match finish(parsed) {
        Some((_, _, table, path, props)) => (table, path, props.unwrap_or_default()),
        None => return Ok(None),
    };

    let mut format = FileFormat::default();
    let mut header = false;
    for (key, value) in props {
        match key.as_str() {
            "format" => match FileFormat::from_name(&value) {
                Some(f) => format = f,
                None => return Err(KqlError::unsupported(format!("format={}", value))),
            },
            "ignoreFirstRecord" => header = value.eq_ignore_ascii_case("true"),
            _ => {}
        }
    }
    Ok(Some(Command::IngestFile {
        table,
        path,
        format,
        header,
    }))
}

/// Inline rows start on the line after `<|`, or right after it.
fn inline_payload(rest: &str) -> &str {
    let rest = rest.trim_start_matches([' ', '\t']);
    rest.strip_prefix("\r\n")
        .or_else(|| rest.strip_prefix('\n'))
        .unwrap_or(rest)
}

/// `'path'`, `h'path'` or `('path')`
fn ingest_source(input: &str) -> IResult<&str, String> {
    alt((
        string_literal,
        preceded(char('h'), string_literal),
        delimited(symbol("("), preceded(multispace0, string_literal), symbol(")")),
    ))(input)
}

/// `(key = value, ...)`
fn properties(input: &str) -> IResult<&str, Vec<(String, String)>> {
    delimited(
        symbol("("),
        separated_list0(
            symbol(","),
            separated_pair(
                ws_identifier,
                symbol("="),
                preceded(
                    multispace0,
                    alt((
                        string_literal,
                        map(take_while1(is_ident_char), str::to_string),
                    )),
                ),
            ),
        ),
        symbol(")"),
    )(input)
}

/// `Name <| query`
fn piped_query(input: &str) -> IResult<&str, (String, String)> {
    let (rest, (name, _)) = tuple((ws_identifier, symbol("<|")))(input)?;
    Ok(("", (name, rest.trim().to_string())))
}

fn parse_view(input: &str) -> IResult<&str, Command> {
    map(piped_query, |(name, query)| Command::View { name, query })(input)
}

fn parse_create_table(input: &str) -> IResult<&str, Command> {
    let (input, _) = ws_keyword("table")(input)?;
    let (input, table) = ws_identifier(input)?;
    let (input, columns): (&str, Vec<ColumnDef>) = delimited(
        symbol("("),
        separated_list0(symbol(","), parse_column_def),
        symbol(")"),
    )(input)?;
    Ok((input, Command::CreateTable { table, columns }))
}

fn parse_drop_table(input: &str) -> IResult<&str, Command> {
    let (input, _) = ws_keyword("table")(input)?;
    let (input, table) = ws_identifier(input)?;
    let (input, if_exists) = opt(ws_keyword("ifexists"))(input)?;
    Ok((
        input,
        Command::DropTable {
            table,
            if_exists: if_exists.is_some(),
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ingest_inline() {
        let cmd = parse_command(".ingest inline into table T <|\n1,a\n2,b").unwrap();
        assert_eq!(
            cmd,
            Command::IngestInline {
                table: "T".into(),
                data: "1,a\n2,b".into()
            }
        );
    }

    #[test]
    fn test_ingest_file_with_properties() {
        let cmd = parse_command(
            ".ingest into table Logs 'data/logs.csv' with (format='csv', ignoreFirstRecord=true)",
        )
        .unwrap();
        assert_eq!(
            cmd,
            Command::IngestFile {
                table: "Logs".into(),
                path: "data/logs.csv".into(),
                format: FileFormat::Csv,
                header: true,
            }
        );
    }

    #[test]
    fn test_ingest_unknown_format() {
        let err = parse_command(".ingest into table T 'x' with (format=avro)").unwrap_err();
        assert_eq!(err.construct(), Some("format=avro"));
    }

    #[test]
    fn test_view_keeps_query_text() {
        let cmd = parse_command(".view Recent <| T | where ts > ago(1h)").unwrap();
        assert_eq!(
            cmd,
            Command::View {
                name: "Recent".into(),
                query: "T | where ts > ago(1h)".into()
            }
        );
    }

    #[test]
    fn test_create_and_drop() {
        let cmd = parse_command(".create table T (a:long, b:string)").unwrap();
        assert!(matches!(cmd, Command::CreateTable { ref columns, .. } if columns.len() == 2));
        let cmd = parse_command(".drop table T ifexists").unwrap();
        assert_eq!(
            cmd,
            Command::DropTable {
                table: "T".into(),
                if_exists: true
            }
        );
    }

    #[test]
    fn test_unknown_and_malformed() {
        let err = parse_command(".purge table T").unwrap_err();
        assert_eq!(err.construct(), Some(".purge"));
        let err = parse_command(".view <| T").unwrap_err();
        assert_eq!(err.construct(), Some("malformed command: .view <| T"));
    }
}
