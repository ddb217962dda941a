//! Runs generated DuckDB SQL against an in-memory database.

use duckdb::Connection;
use duckdb::types::FromSql;
use kql2sql::prelude::*;

fn duck(query: &str) -> String {
    Transpiler::new(Dialect::DuckDb)
        .convert(query)
        .expect("Failed to convert query")
}

fn rows<T: FromSql>(query: &str) -> Vec<T> {
    rows_after("", query)
}

/// Run `setup` first, e.g. to create tables the compiler knows nothing about.
fn rows_after<T: FromSql>(setup: &str, query: &str) -> Vec<T> {
    let sql = duck(query);
    let conn = Connection::open_in_memory().expect("Failed to open DuckDB");
    if !setup.is_empty() {
        conn.execute_batch(setup).expect("Failed to run setup");
    }
    let mut stmt = conn
        .prepare(&sql)
        .unwrap_or_else(|e| panic!("Failed to prepare {}: {}", sql, e));
    let values = stmt
        .query_map([], |row| row.get(0))
        .expect("Failed to run query")
        .collect::<Result<Vec<T>, _>>()
        .expect("Failed to read rows");
    values
}

#[test]
fn test_innerunique_keeps_one_left_row_per_key() {
    let tables = r#"
        let X = datatable(K:long, v:string) [1, 'a', 1, 'b'];
        let Y = datatable(K:long, w:string) [1, 'z'];
    "#;
    let count: Vec<i64> = rows(&format!("{} X | join Y on K | count", tables));
    assert_eq!(count, vec![1]);

    let count: Vec<i64> = rows(&format!("{} X | join kind=inner Y on K | count", tables));
    assert_eq!(count, vec![2]);
}

#[test]
fn test_mv_expand_yields_one_row_per_element() {
    let source = "datatable(id:long, tags:dynamic) [7, dynamic([10, 20, 30])]";

    let ids: Vec<i64> = rows(&format!("{} | mv-expand tags | project id", source));
    assert_eq!(ids, vec![7, 7, 7]);

    let mut tags: Vec<i64> = rows(&format!(
        "{} | mv-expand tags to typeof(long) | project tags",
        source
    ));
    tags.sort();
    assert_eq!(tags, vec![10, 20, 30]);
}

#[test]
fn test_arg_max_star_keeps_whole_rows() {
    let values: Vec<String> = rows(
        "datatable(k:string, ts:long, v:string) ['a', 1, 'old', 'a', 2, 'new', 'b', 5, 'only']
        | summarize arg_max(ts, *) by k
        | project v
        | sort by v asc",
    );
    assert_eq!(values, vec!["new".to_string(), "only".to_string()]);
}

#[test]
fn test_star_modifiers_run() {
    let renamed: Vec<i64> =
        rows("datatable(a:long, b:long) [1, 2] | project-rename c = a | project c");
    assert_eq!(renamed, vec![1]);

    let overwritten: Vec<i64> = rows_after(
        "CREATE TABLE T AS SELECT * FROM (VALUES (1), (5)) AS v(a);",
        "T | extend a = a + 1 | where a > 2 | project a",
    );
    assert_eq!(overwritten, vec![6]);
}

#[test]
fn test_bin_of_compound_value() {
    let binned: Vec<f64> = rows("datatable(a:long) [20] | extend b = bin(a + 5, 10) | project b");
    assert_eq!(binned, vec![20.0]);
}
