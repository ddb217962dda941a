//! Query parser using nom.
//!
//! Turns query text into [`Statement`]s.
//!
//! # Syntax Overview
//!
//! ```text
//! let recent = StormEvents | where StartTime > ago(7d);
//! recent
//! | summarize events = count() by State
//! | top 10 by events
//! ```
//!
//! Statements are separated by `;`. The final statement is either a query
//! or a dot-command such as `.ingest inline into table T <| ...`.

mod base;
pub mod commands;
pub mod comments;
pub mod expressions;
pub mod operators;
pub mod statements;

pub use comments::strip_comments;

use crate::ast::Statement;
use crate::error::KqlResult;

/// Parse a complete script. Comments are stripped first.
pub fn parse(input: &str) -> KqlResult<Vec<Statement>> {
    let stripped = strip_comments(input);
    parse_stripped(&stripped)
}

/// Parse text that is already free of comments.
///
/// Error positions refer to offsets in `input`.
pub fn parse_stripped(input: &str) -> KqlResult<Vec<Statement>> {
    statements::parse_statements(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::*;

    #[test]
    fn test_parse_with_comments() {
        let stmts = parse("// top states\nStormEvents\n| take 5 // five").unwrap();
        assert_eq!(stmts.len(), 1);
        match &stmts[0] {
            Statement::Query(p) => {
                assert_eq!(p.source, Source::Table("StormEvents".into()));
                assert_eq!(p.operators, vec![Operator::Take(Expr::Literal(Literal::long(5)))]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_empty_script() {
        assert!(parse("// nothing here\n").unwrap().is_empty());
    }
}
