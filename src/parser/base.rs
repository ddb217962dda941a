//! Lexical building blocks shared by the grammar modules.

use chrono::{NaiveDate, NaiveDateTime};
use nom::{
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, multispace0, satisfy},
    combinator::{not, recognize},
    error::{Error, ErrorKind},
    sequence::{pair, preceded, terminated},
    IResult,
};

pub fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

pub fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Parse an identifier (table name, column name, function name).
pub fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(satisfy(is_ident_start), take_while(is_ident_char)))(input)
}

/// Identifier preceded by optional whitespace, owned.
pub fn ws_identifier(input: &str) -> IResult<&str, String> {
    let (input, name) = preceded(multispace0, identifier)(input)?;
    Ok((input, name.to_string()))
}

/// Operator names may contain dashes (`project-away`, `mv-expand`).
pub fn operator_name(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| is_ident_char(c) || c == '-')(input)
}

/// Match `kw` as a whole word.
pub fn keyword<'a>(kw: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    move |input: &'a str| terminated(tag(kw), not(satisfy(is_ident_char)))(input)
}

/// Keyword preceded by optional whitespace.
pub fn ws_keyword<'a>(kw: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    move |input: &'a str| preceded(multispace0, keyword(kw))(input)
}

/// Punctuation preceded by optional whitespace.
pub fn symbol<'a>(s: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    move |input: &'a str| preceded(multispace0, tag(s))(input)
}

pub fn fail<T>(input: &str) -> IResult<&str, T> {
    Err(nom::Err::Error(Error::new(input, ErrorKind::Verify)))
}

/// Parse a quoted string: `'..'`, `".."` with backslash escapes, or
/// verbatim `@'..'` / `@".."`.
pub fn string_literal(input: &str) -> IResult<&str, String> {
    let (rest, verbatim) = match input.strip_prefix('@') {
        Some(rest) => (rest, true),
        None => (input, false),
    };
    let mut chars = rest.char_indices();
    let quote = match chars.next() {
        Some((_, q @ ('\'' | '"'))) => q,
        _ => return fail(input),
    };
    let mut out = String::new();
    while let Some((i, c)) = chars.next() {
        if c == quote {
            return Ok((&rest[i + c.len_utf8()..], out));
        }
        if c == '\\' && !verbatim {
            match chars.next() {
                Some((_, 'n')) => out.push('\n'),
                Some((_, 't')) => out.push('\t'),
                Some((_, 'r')) => out.push('\r'),
                Some((_, other)) => out.push(other),
                None => break,
            }
        } else {
            out.push(c);
        }
    }
    Err(nom::Err::Error(Error::new(input, ErrorKind::Char)))
}

/// Content between a balanced pair of delimiters, quotes respected.
/// The input must start with `open`.
pub fn balanced(input: &str, open: char, close: char) -> IResult<&str, &str> {
    let (body, _) = char(open)(input)?;
    let mut depth = 1usize;
    let mut quote: Option<char> = None;
    let mut verbatim = false;
    let mut escaped = false;
    let mut prev = open;
    for (i, c) in body.char_indices() {
        let at = prev;
        prev = c;
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' && !verbatim {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => {
                quote = Some(c);
                verbatim = at == '@';
            }
            c if c == open => depth += 1,
            c if c == close => {
                depth -= 1;
                if depth == 0 {
                    return Ok((&body[i + c.len_utf8()..], &body[..i]));
                }
            }
            _ => {}
        }
    }
    Err(nom::Err::Error(Error::new(input, ErrorKind::Char)))
}

/// Timespan unit suffix, returned as a millisecond factor.
pub fn timespan_factor(unit: &str) -> Option<f64> {
    Some(match unit {
        "ms" | "millisecond" | "milliseconds" => 1.0,
        "s" | "sec" | "second" | "seconds" => 1_000.0,
        "m" | "min" | "minute" | "minutes" => 60_000.0,
        "h" | "hr" | "hour" | "hours" => 3_600_000.0,
        "d" | "day" | "days" => 86_400_000.0,
        _ => return None,
    })
}

/// Recognize a single-unit duration such as `1h` or `250ms` as milliseconds.
pub fn parse_duration_millis(text: &str) -> Option<i64> {
    let text = text.trim();
    let split = text
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .filter(|&i| i > 0)?;
    let (number, unit) = text.split_at(split);
    let number: f64 = number.parse().ok()?;
    let factor = timespan_factor(unit)?;
    Some((number * factor).round() as i64)
}

/// Parse the body of a `datetime(...)` literal.
pub fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    const FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ];
    let text = text.trim().trim_end_matches('Z');
    FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(text, f).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier() {
        assert_eq!(identifier("State == 1"), Ok((" == 1", "State")));
        assert!(identifier("1abc").is_err());
    }

    #[test]
    fn test_keyword_boundary() {
        assert!(keyword("has")("has 'x'").is_ok());
        assert!(keyword("has")("hash").is_err());
    }

    #[test]
    fn test_string_literal_escapes() {
        assert_eq!(
            string_literal(r#""a\"b" rest"#),
            Ok((" rest", "a\"b".to_string()))
        );
        assert_eq!(
            string_literal(r"@'C:\temp'"),
            Ok(("", r"C:\temp".to_string()))
        );
        assert!(string_literal("'open").is_err());
    }

    #[test]
    fn test_balanced() {
        assert_eq!(
            balanced("([1, (2)], ')') tail", '(', ')'),
            Ok((" tail", "[1, (2)], ')'"))
        );
        assert_eq!(
            balanced(r"{ p == @'C:\' } tail", '{', '}'),
            Ok((" tail", r" p == @'C:\' "))
        );
    }

    #[test]
    fn test_duration_millis() {
        assert_eq!(parse_duration_millis("1h"), Some(3_600_000));
        assert_eq!(parse_duration_millis("250ms"), Some(250));
        assert_eq!(parse_duration_millis("1.5s"), Some(1_500));
        assert_eq!(parse_duration_millis("2d"), Some(172_800_000));
        assert_eq!(parse_duration_millis("10"), None);
        assert_eq!(parse_duration_millis("1h30m"), None);
    }

    #[test]
    fn test_datetime_formats() {
        let dt = parse_datetime("2024-01-02").unwrap();
        assert_eq!(dt.to_string(), "2024-01-02 00:00:00");
        let dt = parse_datetime("2024-01-02T03:04:05Z").unwrap();
        assert_eq!(dt.to_string(), "2024-01-02 03:04:05");
    }
}
