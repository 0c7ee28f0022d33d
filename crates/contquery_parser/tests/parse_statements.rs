use contquery_error::ErrorKind;
use contquery_parser::ast::{DistinctModifier, Expr, GroupByExpr, SelectExpr};
use contquery_parser::parse;
use contquery_parser::statement::Statement;

#[test]
fn parse_continuous_view_round_trip() {
    let sql = "CREATE CONTINUOUS VIEW v AS SELECT k, sum(x) + count(*) AS total FROM s \
               WHERE arrival_timestamp > clock_timestamp() - interval '1 hour' GROUP BY k";
    let stmts = parse(sql).unwrap();
    assert_eq!(1, stmts.len());

    let create = match &stmts[0] {
        Statement::CreateContinuousView(create) => create,
        other => panic!("unexpected statement: {other:?}"),
    };
    assert_eq!(2, create.query.projections.len());
    assert!(matches!(
        &create.query.projections[1],
        SelectExpr::AliasedExpr(Expr::BinaryExpr { .. }, _)
    ));

    // Deparsed output parses back to the same tree.
    let reparsed = parse(&stmts[0].to_string()).unwrap();
    assert_eq!(stmts, reparsed);
}

#[test]
fn parse_query_with_all_clauses() {
    let sql = "select distinct on (k) k, max(v) from s where v > 0 \
               group by cube (k, j) having max(v) > 1 order by k nulls first limit 3 offset 1";
    let stmts = parse(sql).unwrap();
    let query = match &stmts[0] {
        Statement::Query(query) => query,
        other => panic!("unexpected statement: {other:?}"),
    };

    assert!(matches!(query.distinct, Some(DistinctModifier::On(_))));
    assert!(matches!(query.group_by[0], GroupByExpr::Cube(_)));
    assert!(query.having.is_some());
    assert_eq!(Some(true), query.order_by[0].nulls_first);
    assert!(!query.limit.is_empty());
}

#[test]
fn syntax_errors_carry_kind() {
    // (input)
    let tests = [
        "select from",
        "select count(* from s",
        "create continuous view v select 1",
        "select 'unterminated",
        "select a from s group by grouping sets (a",
    ];

    for input in tests {
        let err = parse(input).unwrap_err();
        assert_eq!(ErrorKind::Syntax, err.kind(), "input: {input}");
    }
}
