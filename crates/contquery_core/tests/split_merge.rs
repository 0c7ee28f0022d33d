//! Folding a stream into a view batch by batch must give the same answer as
//! running the view's query once over every row.
use contquery_core::arrays::datatype::DataType;
use contquery_core::arrays::field::{Field, Row};
use contquery_core::arrays::scalar::ScalarValue;
use contquery_core::engine::{Engine, ExecuteResult};
use contquery_core::execution::{ExecutionContext, MemoryTables, collect};
use contquery_core::planner::QueryPlanner;
use contquery_parser::statement::Statement;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

const KEYS: &[&str] = &["a", "b", "c", "d"];

fn engine() -> Engine {
    let engine = Engine::new().unwrap();
    engine
        .create_stream(
            "events",
            [
                Field::new("k", DataType::Utf8),
                Field::new("x", DataType::Int64),
                Field::new("tag", DataType::Utf8),
            ],
        )
        .unwrap();
    engine
}

fn random_rows(rng: &mut ChaCha8Rng, n: usize) -> Vec<Row> {
    (0..n)
        .map(|_| {
            let k = KEYS[rng.random_range(0..KEYS.len())];
            // Key "d" only ever sees nulls.
            let x = if k == "d" || rng.random_bool(0.2) {
                ScalarValue::Null
            } else {
                ScalarValue::Int64(rng.random_range(-100..100))
            };
            let tag = ScalarValue::from(format!("t{}", rng.random_range(0..5)));
            vec![ScalarValue::from(k), x, tag]
        })
        .collect()
}

/// Run a query over all rows at once, bypassing any view.
fn run_once(engine: &Engine, sql: &str, rows: &[Row], now: i64) -> Vec<Row> {
    let select = match contquery_parser::parse(sql).unwrap().remove(0) {
        Statement::Query(select) => select,
        other => panic!("unexpected statement: {other:?}"),
    };
    let schema = engine.stream_schema("events").unwrap();
    let config = engine.config();
    let plan = QueryPlanner::new(engine.resolver(), &config)
        .plan_select(&select, &schema)
        .unwrap();

    let rows = rows
        .iter()
        .map(|row| {
            let mut row = row.clone();
            row.push(ScalarValue::Timestamp(now));
            row
        })
        .collect();
    let tables = MemoryTables::new().with_table("events", schema, rows);
    collect(&plan, &tables, &ExecutionContext::new(now)).unwrap()
}

fn sorted(mut rows: Vec<Row>) -> Vec<Row> {
    rows.sort();
    rows
}

#[test]
fn batched_matches_single_pass() {
    logutil::init_test();

    // (view query)
    let queries = [
        "SELECT k, count(*) AS n, count(x) AS nx, sum(x) AS s, min(x) AS lo, max(x) AS hi FROM events GROUP BY k",
        "SELECT k, avg(x) AS a FROM events GROUP BY k",
        "SELECT k, tag, sum(x) + 1 AS s1, count(*) * 2 AS n2 FROM events GROUP BY k, tag",
        "SELECT count(*) AS n, max(tag) AS t FROM events",
        "SELECT k, bool_or(x > 50) AS big FROM events GROUP BY k HAVING count(*) > 3",
        "SELECT k, tag, count(*) AS n, sum(x) AS s FROM events GROUP BY ROLLUP (k, tag)",
        "SELECT k, hll_cardinality(hll_agg(x)) AS u, hll_count_distinct(tag) AS t FROM events GROUP BY k",
        "SELECT k, first_values(3) WITHIN GROUP (ORDER BY x) AS lowest FROM events GROUP BY k",
        "SELECT k, bloom_contains(bloom_agg(x), 5) AS has5, freq(freq_agg(tag), 't1') AS t1, \
         topk_values(topk_agg(tag, 2)) AS top FROM events GROUP BY k",
    ];

    for seed in 0..4 {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let rows = random_rows(&mut rng, 200);

        for (idx, query) in queries.iter().enumerate() {
            let engine = engine();
            let name = format!("v{idx}");
            engine
                .execute(&format!("CREATE CONTINUOUS VIEW {name} AS {query}"), 0)
                .unwrap();

            let mut remaining = rows.as_slice();
            while !remaining.is_empty() {
                let n = rng.random_range(1..=remaining.len().min(40));
                let (batch, rest) = remaining.split_at(n);
                engine.insert("events", batch.to_vec(), 0).unwrap();
                remaining = rest;
            }

            let expected = sorted(run_once(&engine, query, &rows, 0));
            let got = sorted(engine.read_view(&name, 0).unwrap());
            assert_eq!(expected, got, "seed: {seed}, query: {query}");
        }
    }
}

#[test]
fn all_null_group_stays_null() {
    logutil::init_test();

    let engine = engine();
    engine
        .execute(
            "CREATE CONTINUOUS VIEW v AS SELECT k, count(x) AS n, sum(x) AS s, min(x) AS lo FROM events GROUP BY k",
            0,
        )
        .unwrap();

    let null_row = || vec![ScalarValue::from("d"), ScalarValue::Null, ScalarValue::from("t0")];
    engine.insert("events", vec![null_row(), null_row()], 0).unwrap();
    engine.insert("events", vec![null_row()], 0).unwrap();

    let expected = vec![vec![
        ScalarValue::from("d"),
        ScalarValue::Int64(0),
        ScalarValue::Null,
        ScalarValue::Null,
    ]];
    assert_eq!(expected, engine.read_view("v", 0).unwrap());
}

#[test]
fn querying_view_output() {
    logutil::init_test();

    let engine = engine();
    engine
        .execute(
            "CREATE CONTINUOUS VIEW v AS SELECT k, count(*) AS n FROM events GROUP BY k",
            0,
        )
        .unwrap();
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let rows = random_rows(&mut rng, 50);
    engine.insert("events", rows.clone(), 0).unwrap();

    let expected = sorted(run_once(
        &engine,
        "SELECT k, count(*) AS n FROM events GROUP BY k ORDER BY n DESC, k LIMIT 2",
        &rows,
        0,
    ));
    let got = match engine
        .execute("SELECT k, n FROM v ORDER BY n DESC, k LIMIT 2", 0)
        .unwrap()
        .remove(0)
    {
        ExecuteResult::Rows { rows, .. } => sorted(rows),
        other => panic!("unexpected result: {other:?}"),
    };
    assert_eq!(expected, got);
}
