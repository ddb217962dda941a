//! Comment stripping.
//!
//! Lines that hold nothing but a comment are removed entirely, newline
//! included, so line-oriented payloads (`.ingest inline`) keep their shape.
//! Trailing comments after code are dropped and the code is kept. Quoted
//! strings are never touched. String literals are single-line, so an
//! unbalanced quote (an apostrophe in ingested data) ends with its line.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Code,
    Quoted(char),
    /// `@'...'`: backslashes are literal.
    Verbatim(char),
    Block,
}

/// Strip `//` and `/* */` comments from a query.
pub fn strip_comments(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut state = State::Code;

    for line in input.split_inclusive('\n') {
        if matches!(state, State::Quoted(_) | State::Verbatim(_)) {
            state = State::Code;
        }
        let mut kept = String::with_capacity(line.len());
        let mut had_comment = state == State::Block;
        let mut chars = line.chars().peekable();

        while let Some(c) = chars.next() {
            match state {
                State::Code => match c {
                    '\'' | '"' => {
                        state = State::Quoted(c);
                        kept.push(c);
                    }
                    '@' if matches!(chars.peek(), Some('\'' | '"')) => {
                        kept.push(c);
                        if let Some(q) = chars.next() {
                            kept.push(q);
                            state = State::Verbatim(q);
                        }
                    }
                    '/' if chars.peek() == Some(&'/') => {
                        had_comment = true;
                        break;
                    }
                    '/' if chars.peek() == Some(&'*') => {
                        chars.next();
                        had_comment = true;
                        state = State::Block;
                    }
                    _ => kept.push(c),
                },
                State::Quoted(q) => {
                    kept.push(c);
                    if c == '\\' {
                        if let Some(escaped) = chars.next() {
                            kept.push(escaped);
                        }
                    } else if c == q {
                        state = State::Code;
                    }
                }
                State::Verbatim(q) => {
                    kept.push(c);
                    if c == q {
                        state = State::Code;
                    }
                }
                State::Block => {
                    if c == '*' && chars.peek() == Some(&'/') {
                        chars.next();
                        state = State::Code;
                    }
                }
            }
        }

        if !had_comment {
            out.push_str(&kept);
            continue;
        }

        let code = kept.trim_end_matches(['\n', '\r']);
        if code.trim().is_empty() {
            continue;
        }
        out.push_str(code.trim_end());
        if line.ends_with('\n') {
            out.push('\n');
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comment_free_is_unchanged() {
        let q = "T\n| where a == 'x // y'\n| take 10\r\n";
        assert_eq!(strip_comments(q), q);
        assert_eq!(strip_comments(&strip_comments(q)), q);
    }

    #[test]
    fn test_comment_only_line_removed() {
        let q = "T\n    // explain the filter\n| where a == 1\n";
        assert_eq!(strip_comments(q), "T\n| where a == 1\n");
    }

    #[test]
    fn test_trailing_comment_dropped() {
        let q = "T | where a == 1 // only ones\n| take 5";
        assert_eq!(strip_comments(q), "T | where a == 1\n| take 5");
    }

    #[test]
    fn test_block_comments() {
        let q = "T /* inline */ | take 5\n/* whole\nlines */\n| count";
        assert_eq!(strip_comments(q), "T  | take 5\n| count");
    }

    #[test]
    fn test_inline_ingest_rows_keep_shape() {
        let q = ".ingest inline into table T <|\n// header row\n1,a\n2,b // second\n3,c";
        assert_eq!(
            strip_comments(q),
            ".ingest inline into table T <|\n1,a\n2,b\n3,c"
        );
    }

    #[test]
    fn test_apostrophe_in_data_does_not_hide_later_comments() {
        let q = ".ingest inline into table T <|\n1,O'Brien\n// note\n2,x";
        assert_eq!(
            strip_comments(q),
            ".ingest inline into table T <|\n1,O'Brien\n2,x"
        );
    }

    #[test]
    fn test_verbatim_string_backslash_is_literal() {
        let q = r"T | where p == @'C:\' // trailing";
        assert_eq!(strip_comments(q), r"T | where p == @'C:\'");
    }

    #[test]
    fn test_double_quoted_slashes_survive() {
        let q = r#"T | where url == "http://x" // trailing"#;
        assert_eq!(strip_comments(q), r#"T | where url == "http://x""#);
    }
}
