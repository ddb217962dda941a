use kql2sql::parser::strip_comments;
use kql2sql::prelude::*;
use pretty_assertions::assert_eq;

fn duck(query: &str) -> String {
    Transpiler::new(Dialect::DuckDb)
        .convert(query)
        .expect("Failed to convert query")
}

fn pg(query: &str) -> String {
    Transpiler::new(Dialect::Postgres)
        .convert(query)
        .expect("Failed to convert query")
}

fn unsupported(dialect: Dialect, query: &str) -> String {
    match Transpiler::new(dialect).convert(query) {
        Err(KqlError::Unsupported { construct }) => construct,
        other => panic!("expected an unsupported construct, got {:?}", other),
    }
}

#[test]
fn test_bare_table() {
    assert_eq!(duck("T"), "SELECT * FROM T");
    assert_eq!(pg("T"), "SELECT * FROM T");
}

#[test]
fn test_conversion_is_deterministic() {
    let query = r#"
        let recent = StormEvents | where StartTime > ago(7d);
        recent
        | summarize events = count(), damage = sum(Damage) by State, bin(StartTime, 1d)
        | top 10 by events
    "#;
    for dialect in Dialect::ALL {
        let t = Transpiler::new(*dialect);
        assert_eq!(t.convert(query).unwrap(), t.convert(query).unwrap());
    }
}

#[test]
fn test_filters_compose_into_one_where() {
    assert_eq!(
        duck("T | where a == 1 | where b == 2"),
        "SELECT * FROM T WHERE a = 1 AND b = 2"
    );
}

#[test]
fn test_case_insensitive_membership() {
    assert_eq!(
        duck("T | where State in~ ('a','B')"),
        "SELECT * FROM T WHERE UPPER(State) IN ('A', 'B')"
    );
    assert_eq!(
        pg("T | where State !in ('a', 'b')"),
        "SELECT * FROM T WHERE State NOT IN ('a', 'b')"
    );
}

#[test]
fn test_sort_defaults_to_descending() {
    assert_eq!(duck("T | sort by x"), "SELECT * FROM T ORDER BY x DESC");
    assert_eq!(duck("T | sort by x asc"), "SELECT * FROM T ORDER BY x ASC");
}

#[test]
fn test_unknown_operator_is_named() {
    assert_eq!(unsupported(Dialect::DuckDb, "T | frobnicate x"), "frobnicate");
    assert_eq!(unsupported(Dialect::Postgres, "T | frobnicate x"), "frobnicate");
}

#[test]
fn test_unknown_function_and_type() {
    assert_eq!(unsupported(Dialect::DuckDb, "T | extend y = frob(x)"), "frob");
    assert_eq!(
        unsupported(Dialect::Postgres, "datatable(a:blob) [1]"),
        "type blob"
    );
    assert_eq!(
        unsupported(Dialect::DuckDb, "T | summarize hll(x)"),
        "hll"
    );
}

#[test]
fn test_cte_wrapping() {
    assert_eq!(
        duck("let X = materialize(T | where a > 0); X"),
        "WITH X AS MATERIALIZED (SELECT * FROM T WHERE a > 0) SELECT * FROM X"
    );
    assert_eq!(
        duck("let X = T | where a > 0; X"),
        "WITH X AS NOT MATERIALIZED (SELECT * FROM T WHERE a > 0) SELECT * FROM X"
    );
    assert_eq!(
        pg("let V = view () { T | take 2 }; V | count"),
        "WITH V AS NOT MATERIALIZED (SELECT * FROM T LIMIT 2) SELECT COUNT(*) AS Count FROM V"
    );
}

#[test]
fn test_comment_stripping() {
    let clean = "T\n| where s == 'a // not a comment'\n| take 1";
    assert_eq!(strip_comments(clean), clean);
    assert_eq!(strip_comments(&strip_comments(clean)), clean);

    assert_eq!(
        duck(".ingest inline into table T <|\n// header row\n1,a\n   // indented comment\n2,b"),
        "INSERT INTO T VALUES (1, 'a'), (2, 'b')"
    );
}

#[test]
fn test_like_escaping() {
    assert_eq!(
        duck("T | where s contains '50%'"),
        r"SELECT * FROM T WHERE s ILIKE '%50\%%' ESCAPE '\'"
    );
    assert_eq!(
        pg("T | where s startswith_cs 'ab'"),
        "SELECT * FROM T WHERE s LIKE 'ab%'"
    );
}

#[test]
fn test_json_member_access() {
    assert_eq!(
        duck("T | project v = props.a.b"),
        "SELECT json_extract_string(props, '$.a.b') AS v FROM T"
    );
    assert_eq!(
        pg("T | project v = props['a'][0]"),
        "SELECT props->'a'->>0 AS v FROM T"
    );
}

#[test]
fn test_summarize_with_bin_key() {
    assert_eq!(
        pg("T | summarize n = count() by bin(x, 10)"),
        "SELECT FLOOR(x / 10) * 10 AS x, COUNT(*) AS n FROM T GROUP BY FLOOR(x / 10) * 10"
    );
}

#[test]
fn test_arg_max_star_per_dialect() {
    assert_eq!(
        duck("T | summarize arg_max(ts, *) by k"),
        "SELECT * FROM (SELECT * FROM T) AS _w QUALIFY ROW_NUMBER() OVER (PARTITION BY k ORDER BY ts DESC NULLS LAST) = 1"
    );
    assert_eq!(
        pg("T | summarize arg_min(ts, *) by k"),
        "SELECT (_q._row).* FROM (SELECT _s AS _row, ROW_NUMBER() OVER (PARTITION BY k ORDER BY ts ASC NULLS LAST) AS _rn FROM (SELECT * FROM T) AS _s) AS _q WHERE _q._rn = 1"
    );
}

#[test]
fn test_innerunique_join_per_dialect() {
    assert_eq!(
        pg("X | join (Y | where b > 0) on K"),
        "SELECT * FROM (SELECT (_q._row).* FROM (SELECT _s AS _row, ROW_NUMBER() OVER (PARTITION BY K) AS _rn FROM (SELECT * FROM X) AS _s) AS _q WHERE _q._rn = 1) AS _l INNER JOIN (SELECT * FROM Y WHERE b > 0) AS _r USING (K)"
    );
}

#[test]
fn test_outer_join_kinds() {
    assert_eq!(
        duck("X | join kind=fullouter Y on $left.a == $right.b and $left.c == $right.d"),
        "SELECT * FROM X AS _l FULL OUTER JOIN Y AS _r ON _l.a = _r.b AND _l.c = _r.d"
    );
    assert_eq!(
        unsupported(Dialect::DuckDb, "X | join kind=sideways Y on K"),
        "join kind=sideways"
    );
}

#[test]
fn test_postgres_column_lists_use_catalog() {
    let catalog = Catalog::new().with_table("Events", &["ts", "State", "Payload"]);
    let t = Transpiler::new(Dialect::Postgres).with_catalog(catalog);
    assert_eq!(
        t.convert("Events | project-away Payload").unwrap(),
        "SELECT ts, State FROM Events"
    );
    assert_eq!(
        t.convert("Events | project-reorder State").unwrap(),
        "SELECT State, ts, Payload FROM Events"
    );
    assert_eq!(
        unsupported(Dialect::Postgres, "Events | project-away Payload"),
        "project-away on a relation with unknown columns"
    );
}

#[test]
fn test_duckdb_column_lists_need_no_catalog() {
    assert_eq!(
        duck("T | project-away a, b"),
        "SELECT * EXCLUDE (a, b) FROM T"
    );
    assert_eq!(
        duck("T | project-rename n = name"),
        "SELECT * RENAME (name AS n) FROM T"
    );
}

#[test]
fn test_union_branches() {
    assert_eq!(
        pg("union withsource=Src A, B"),
        "SELECT *, 'A' AS Src FROM A AS _u UNION ALL SELECT *, 'B' AS Src FROM B AS _u"
    );
}

#[test]
fn test_range_and_print_sources() {
    assert_eq!(
        pg("range i from 1 to 3 step 1 | extend sq = i * i"),
        "SELECT *, i * i AS sq FROM generate_series(1, 3, 1) AS _r(i)"
    );
    assert_eq!(duck("print 1 + 1"), "SELECT 1 + 1 AS print_0");
}

#[test]
fn test_scalar_let_substitution() {
    assert_eq!(
        duck("let cutoff = ago(1h); T | where ts > cutoff"),
        "SELECT * FROM T WHERE ts > ((NOW() - INTERVAL '3600000 milliseconds'))"
    );
}

#[test]
fn test_malformed_command() {
    let construct = unsupported(Dialect::DuckDb, ".ingest nonsense");
    assert!(construct.starts_with("malformed command"), "{}", construct);
    assert_eq!(unsupported(Dialect::DuckDb, ".purge table T"), ".purge");
}

#[test]
fn test_parse_error_position() {
    match Transpiler::default().convert("T | where") {
        Err(KqlError::Parse { position, .. }) => assert_eq!(position, 9),
        other => panic!("expected a parse error, got {:?}", other),
    }
}

#[test]
fn test_shared_across_threads() {
    let transpiler = Transpiler::new(Dialect::Postgres);
    let queries = ["T | take 1", "T | where a == 1", "T | count"];
    std::thread::scope(|s| {
        let handles: Vec<_> = queries
            .iter()
            .map(|q| {
                let t = &transpiler;
                s.spawn(move || t.convert(q).unwrap())
            })
            .collect();
        let results: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(
            results,
            vec![
                "SELECT * FROM T LIMIT 1",
                "SELECT * FROM T WHERE a = 1",
                "SELECT COUNT(*) AS Count FROM T",
            ]
        );
    });
}

#[test]
fn test_compound_operands_keep_their_grouping() {
    assert_eq!(
        pg("T | extend b = bin(a + 5, 10)"),
        "SELECT *, FLOOR((a + 5) / 10) * 10 AS b FROM T"
    );
    assert_eq!(
        duck("T | summarize p = percentile(x, 50 + 45)"),
        "SELECT QUANTILE_CONT(x, (50 + 45) / 100.0) AS p FROM T"
    );
}

#[test]
fn test_scalar_let_as_take_count() {
    assert_eq!(duck("let n = 5; T | take n"), "SELECT * FROM T LIMIT 5");
    assert_eq!(
        pg("let n = 2; T | top n by x asc"),
        "SELECT * FROM T ORDER BY x ASC LIMIT 2"
    );
}

#[test]
fn test_apostrophe_row_then_comment_line() {
    assert_eq!(
        duck(".ingest inline into table T <|\n1,O'Brien\n// note\n2,x"),
        "INSERT INTO T VALUES (1, 'O''Brien'), (2, 'x')"
    );
    assert_eq!(
        pg(r"T | where p == @'C:\' // trailing"),
        r"SELECT * FROM T WHERE p = 'C:\'"
    );
}

#[test]
fn test_double_negation() {
    assert_eq!(duck("T | where x > - -5"), "SELECT * FROM T WHERE x > 5");
    assert_eq!(pg("T | where x > -(-y)"), "SELECT * FROM T WHERE x > -(-y)");
}

#[test]
fn test_extend_overwrites_in_place() {
    assert_eq!(
        duck("T | extend a = a + 1 | where a > 2"),
        "SELECT * FROM (SELECT * REPLACE (a + 1 AS a) FROM T) AS _q WHERE a > 2"
    );
    assert_eq!(
        unsupported(Dialect::Postgres, "T | extend a = a + 1"),
        "extend on a relation with unknown columns"
    );
}
