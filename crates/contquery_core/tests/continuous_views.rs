use contquery_core::arrays::datatype::DataType;
use contquery_core::arrays::field::{Field, Row};
use contquery_core::arrays::interval::Interval;
use contquery_core::arrays::scalar::ScalarValue;
use contquery_core::engine::{Engine, ExecuteResult};
use contquery_core::explain::ExplainConfig;
use contquery_error::ErrorKind;

const MINUTE: i64 = 60_000_000;

fn engine() -> Engine {
    logutil::init_test();
    let engine = Engine::new().unwrap();
    engine
        .create_stream(
            "clicks",
            [
                Field::new("url", DataType::Utf8),
                Field::new("user_id", DataType::Int64),
                Field::new("latency", DataType::Int64),
            ],
        )
        .unwrap();
    engine
}

fn click(url: &str, user_id: i64, latency: i64) -> Row {
    vec![ScalarValue::from(url), ScalarValue::Int64(user_id), ScalarValue::Int64(latency)]
}

fn query(engine: &Engine, sql: &str, now: i64) -> Vec<Row> {
    match engine.execute(sql, now).unwrap().remove(0) {
        ExecuteResult::Rows { mut rows, .. } => {
            rows.sort();
            rows
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn sliding_window_split() {
    let engine = engine();
    engine
        .execute(
            "CREATE CONTINUOUS VIEW v WITH (sw = '1 hour', step_factor = 25) AS \
             SELECT url, count(*) FROM clicks GROUP BY url",
            0,
        )
        .unwrap();

    let split = engine.split("v").unwrap();
    assert_eq!(
        "SELECT url AS url, date_round(arrival_timestamp, interval '15 minutes') AS arrival_timestamp, \
         count(*) AS count FROM clicks GROUP BY url, date_round(arrival_timestamp, interval '15 minutes')",
        split.worker.to_string()
    );
    assert_eq!(
        "SELECT url AS url, arrival_timestamp AS arrival_timestamp, combine(count) AS count \
         FROM v_mrel GROUP BY url, arrival_timestamp",
        split.combiner.to_string()
    );
    assert_eq!(
        "SELECT url AS url, finalize(combine(count)) AS count FROM v_mrel \
         WHERE arrival_timestamp > clock_timestamp() - interval '1 hour' GROUP BY url",
        split.overlay.to_string()
    );
    assert_eq!(Some(Interval::from_secs(3600)), engine.window_interval("v").unwrap());

    let explain = engine.explain("v", ExplainConfig::default()).unwrap();
    assert!(explain.contains("worker:"));
    assert!(explain.contains("overlay:"));
}

#[test]
fn sliding_window_counts() {
    let engine = engine();
    engine
        .execute(
            "CREATE CONTINUOUS VIEW recent AS SELECT url, count(*) AS n FROM clicks \
             WHERE arrival_timestamp > clock_timestamp() - interval '1 hour' AND latency < 100 GROUP BY url",
            0,
        )
        .unwrap();

    let read = |now| query(&engine, "SELECT url, n FROM recent", now);

    engine.insert("clicks", vec![click("/a", 1, 10), click("/a", 2, 500)], 0).unwrap();
    engine.insert("clicks", vec![click("/a", 1, 20), click("/b", 3, 5)], 30 * MINUTE).unwrap();
    assert_eq!(
        vec![
            vec![ScalarValue::from("/a"), ScalarValue::Int64(2)],
            vec![ScalarValue::from("/b"), ScalarValue::Int64(1)],
        ],
        read(31 * MINUTE)
    );

    engine.insert("clicks", vec![click("/b", 3, 5)], 70 * MINUTE).unwrap();
    // The bucket at 0 has left the window, the one at 70 minutes counts.
    assert_eq!(
        vec![
            vec![ScalarValue::from("/a"), ScalarValue::Int64(1)],
            vec![ScalarValue::from("/b"), ScalarValue::Int64(2)],
        ],
        read(71 * MINUTE)
    );
    assert_eq!(vec![vec![ScalarValue::from("/b"), ScalarValue::Int64(1)]], read(125 * MINUTE));

    assert!(engine.vacuum(125 * MINUTE).unwrap() > 0);
    assert_eq!(
        vec![vec![ScalarValue::from("/b"), ScalarValue::Int64(1)]],
        query(&engine, "SELECT url, n FROM recent", 125 * MINUTE)
    );
}

#[test]
fn conjunctive_window_accepted_disjunctive_rejected() {
    let engine = engine();
    engine
        .execute(
            "CREATE CONTINUOUS VIEW ok AS SELECT count(*) FROM clicks \
             WHERE latency > 5 AND arrival_timestamp >= clock_timestamp() - interval '10 minutes'",
            0,
        )
        .unwrap();
    assert_eq!(
        Some(Interval::from_secs(600)),
        engine.window_interval("ok").unwrap()
    );

    let err = engine
        .execute(
            "CREATE CONTINUOUS VIEW bad AS SELECT count(*) FROM clicks \
             WHERE latency > 5 OR arrival_timestamp > clock_timestamp() - interval '10 minutes'",
            0,
        )
        .unwrap_err();
    assert_eq!(ErrorKind::AmbiguousSlidingWindowPredicate, err.kind());
    assert!(engine.read_view("bad", 0).is_err());
}

#[test]
fn rejected_view_definitions() {
    let engine = engine();

    // (definition, expected kind)
    let cases = [
        (
            "SELECT percentile_disc(0.5) WITHIN GROUP (ORDER BY latency) FROM clicks",
            ErrorKind::AggregateNotCombinable,
        ),
        ("SELECT sum(DISTINCT latency) FROM clicks", ErrorKind::AggregateNotCombinable),
        ("SELECT max(count(*)) FROM clicks", ErrorKind::NestedAggregateNotAllowed),
    ];
    for (idx, (definition, kind)) in cases.into_iter().enumerate() {
        let err = engine
            .execute(&format!("CREATE CONTINUOUS VIEW v{idx} AS {definition}"), 0)
            .unwrap_err();
        assert_eq!(kind, err.kind(), "{definition}");
    }

    // (options, expected kind)
    let cases = [
        ("sw = '1 hour', step_factor = 0", ErrorKind::StepFactorOutOfRange),
        ("sw = '1 hour', step_factor = 51", ErrorKind::StepFactorOutOfRange),
        ("step_factor = 10", ErrorKind::StepFactorOutOfRange),
        ("fillfactor = 10", ErrorKind::Syntax),
    ];
    for (options, kind) in cases {
        let err = engine
            .execute(
                &format!("CREATE CONTINUOUS VIEW w WITH ({options}) AS SELECT count(*) FROM clicks"),
                0,
            )
            .unwrap_err();
        assert_eq!(kind, err.kind(), "{options}");
    }

    assert!(engine.view_names().is_empty());
}

#[test]
fn distinct_counts_use_streaming_variant() {
    let engine = engine();
    engine
        .execute(
            "CREATE CONTINUOUS VIEW uniques AS SELECT url, count(DISTINCT user_id) AS users FROM clicks GROUP BY url",
            0,
        )
        .unwrap();
    assert!(
        engine
            .split("uniques")
            .unwrap()
            .worker
            .to_string()
            .contains("hll_count_distinct(user_id)")
    );

    engine
        .insert("clicks", vec![click("/a", 1, 1), click("/a", 2, 1), click("/a", 1, 1)], 0)
        .unwrap();
    engine.insert("clicks", vec![click("/a", 3, 1), click("/a", 2, 1)], 0).unwrap();

    let rows = engine.read_view("uniques", 0).unwrap();
    assert_eq!(1, rows.len());
    let users = rows[0][1].try_as_i64().unwrap();
    assert!((2..=4).contains(&users), "approximate count: {users}");
}

#[test]
fn rollup_over_view_output() {
    let engine = engine();
    engine
        .execute(
            "CREATE CONTINUOUS VIEW by_user AS SELECT url, user_id, count(*) AS n FROM clicks GROUP BY url, user_id",
            0,
        )
        .unwrap();
    engine
        .insert(
            "clicks",
            vec![click("/a", 1, 1), click("/a", 2, 1), click("/b", 1, 1), click("/a", 1, 1)],
            0,
        )
        .unwrap();

    let got = query(&engine, "SELECT url, sum(n) AS n FROM by_user GROUP BY ROLLUP (url)", 0);
    // Nulls sort last.
    let expected = vec![
        vec![ScalarValue::from("/a"), ScalarValue::Int64(3)],
        vec![ScalarValue::from("/b"), ScalarValue::Int64(1)],
        vec![ScalarValue::Null, ScalarValue::Int64(4)],
    ];
    assert_eq!(expected, got);
}

#[test]
fn rollup_view_definition() {
    let engine = engine();
    engine
        .execute(
            "CREATE CONTINUOUS VIEW totals AS SELECT url, count(*) AS n FROM clicks GROUP BY ROLLUP (url)",
            0,
        )
        .unwrap();
    engine.insert("clicks", vec![click("/a", 1, 1), click("/b", 2, 1)], 0).unwrap();
    engine.insert("clicks", vec![click("/a", 3, 1)], MINUTE).unwrap();

    let expected = vec![
        vec![ScalarValue::from("/a"), ScalarValue::Int64(2)],
        vec![ScalarValue::from("/b"), ScalarValue::Int64(1)],
        vec![ScalarValue::Null, ScalarValue::Int64(3)],
    ];
    assert_eq!(expected, query(&engine, "SELECT url, n FROM totals", MINUTE));
}

#[test]
fn sketches_merge_across_view_rows() {
    let engine = engine();
    engine
        .execute(
            "CREATE CONTINUOUS VIEW per_url AS SELECT url, hll_agg(user_id) AS users, \
             topk_agg(latency, 1) AS common, bloom_agg(user_id) AS seen FROM clicks GROUP BY url",
            0,
        )
        .unwrap();
    engine
        .insert("clicks", vec![click("/a", 1, 5), click("/a", 2, 5), click("/b", 2, 9)], 0)
        .unwrap();
    engine.insert("clicks", vec![click("/b", 3, 9), click("/b", 1, 5)], 0).unwrap();

    // (query, expected)
    let cases = [
        (
            "SELECT hll_cardinality(hll_union_agg(users)) AS n FROM per_url",
            vec![vec![ScalarValue::Int64(3)]],
        ),
        (
            "SELECT topk_values(topk_merge_agg(common)) AS top FROM per_url",
            vec![vec![ScalarValue::List(vec![ScalarValue::Int64(5)])]],
        ),
        (
            "SELECT bloom_contains(bloom_intersection_agg(seen), 2) AS a, \
             bloom_contains(bloom_intersection_agg(seen), 3) AS b FROM per_url",
            vec![vec![ScalarValue::Boolean(true), ScalarValue::Boolean(false)]],
        ),
    ];
    for (sql, expected) in cases {
        assert_eq!(expected, query(&engine, sql, 0), "query: {sql}");
    }
}

#[test]
fn first_values_uses_streaming_variant() {
    let engine = engine();
    engine
        .execute(
            "CREATE CONTINUOUS VIEW fastest AS SELECT url, \
             first_values(2) WITHIN GROUP (ORDER BY latency) AS lat FROM clicks GROUP BY url",
            0,
        )
        .unwrap();
    assert!(
        engine
            .split("fastest")
            .unwrap()
            .worker
            .to_string()
            .contains("combinable_first_values(2, latency)")
    );

    engine
        .insert("clicks", vec![click("/a", 1, 30), click("/a", 1, 10), click("/b", 1, 7)], 0)
        .unwrap();
    engine.insert("clicks", vec![click("/a", 1, 20), click("/a", 1, 5)], 0).unwrap();

    let expected = vec![
        vec![
            ScalarValue::from("/a"),
            ScalarValue::List(vec![ScalarValue::Int64(5), ScalarValue::Int64(10)]),
        ],
        vec![ScalarValue::from("/b"), ScalarValue::List(vec![ScalarValue::Int64(7)])],
    ];
    assert_eq!(expected, query(&engine, "SELECT url, lat FROM fastest", 0));
}

#[test]
fn append_only_view_keeps_filtered_rows() {
    let engine = engine();
    engine
        .execute(
            "CREATE CONTINUOUS VIEW slow AS SELECT url, latency FROM clicks WHERE latency > 100",
            0,
        )
        .unwrap();
    engine
        .insert("clicks", vec![click("/a", 1, 150), click("/b", 1, 20), click("/a", 2, 150)], 0)
        .unwrap();

    let expected = vec![
        vec![ScalarValue::from("/a"), ScalarValue::Int64(150)],
        vec![ScalarValue::from("/a"), ScalarValue::Int64(150)],
    ];
    assert_eq!(expected, engine.read_view("slow", 0).unwrap());
}
