use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use contquery_error::{DbError, ErrorKind, Result};
use contquery_parser::ast::{CreateContinuousViewNode, Expr, SelectNode};
use contquery_parser::statement::Statement;
use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::arrays::datatype::DataType;
use crate::arrays::field::{Field, Row, Schema};
use crate::arrays::interval::Interval;
use crate::arrays::scalar::ScalarValue;
use crate::catalog::AggregateCatalog;
use crate::catalog::resolver::CombineInfoResolver;
use crate::config::session::SessionConfig;
use crate::continuous::cache::{QueryId, SplitCache, SplitCacheKey};
use crate::continuous::context::CompileContext;
use crate::continuous::options::ViewOptions;
use crate::continuous::sliding_window::extract_window;
use crate::continuous::splitter::{SplitQueryTriple, split_query};
use crate::continuous::view::{BatchStats, ContinuousView};
use crate::continuous::ARRIVAL_TIMESTAMP;
use crate::execution::{ExecutionContext, MemoryTables, collect};
use crate::explain::ExplainConfig;
use crate::planner::QueryPlanner;

/// Result of executing a single statement.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecuteResult {
    CreatedView { name: String },
    Rows { schema: Schema, rows: Vec<Row> },
}

#[derive(Debug)]
struct ViewEntry {
    view: Mutex<ContinuousView>,
    /// Definition with view options applied, used to recompute the split.
    definition: SelectNode,
    compile: CompileContext,
    key: SplitCacheKey,
}

/// Holds streams and the continuous views defined over them.
///
/// Each view is compiled once when defined. Batches inserted into a stream
/// are folded into every view reading from it.
#[derive(Debug)]
pub struct Engine {
    resolver: Arc<CombineInfoResolver>,
    config: RwLock<SessionConfig>,
    streams: RwLock<HashMap<String, Schema>>,
    views: RwLock<HashMap<String, Arc<ViewEntry>>>,
    /// Query id and current generation for every view name seen so far.
    generations: Mutex<HashMap<String, SplitCacheKey>>,
    splits: Mutex<SplitCache>,
    next_query_id: AtomicU64,
}

impl Engine {
    /// Create an engine with the builtin aggregates.
    pub fn new() -> Result<Self> {
        Ok(Self::with_catalog(AggregateCatalog::with_builtins()?))
    }

    pub fn with_catalog(catalog: AggregateCatalog) -> Self {
        let config = SessionConfig::default();
        let splits = SplitCache::new(config.split_cache_capacity as usize);
        Engine {
            resolver: Arc::new(CombineInfoResolver::new(Arc::new(catalog))),
            config: RwLock::new(config),
            streams: RwLock::new(HashMap::new()),
            views: RwLock::new(HashMap::new()),
            generations: Mutex::new(HashMap::new()),
            splits: Mutex::new(splits),
            next_query_id: AtomicU64::new(1),
        }
    }

    pub fn resolver(&self) -> &Arc<CombineInfoResolver> {
        &self.resolver
    }

    pub fn config(&self) -> SessionConfig {
        self.config.read().clone()
    }

    /// Change a setting. Only views defined afterwards see the new value.
    pub fn set_setting(&self, name: &str, value: ScalarValue) -> Result<()> {
        let mut config = self.config.write();
        config.set_from_scalar(name, value)?;
        self.splits
            .lock()
            .set_capacity(config.split_cache_capacity as usize);
        debug!(%name, "updated setting");
        Ok(())
    }

    pub fn get_setting(&self, name: &str) -> Result<ScalarValue> {
        self.config.read().get_as_scalar(name)
    }

    pub fn reset_setting(&self, name: &str) -> Result<()> {
        let mut config = self.config.write();
        config.reset(name)?;
        self.splits
            .lock()
            .set_capacity(config.split_cache_capacity as usize);
        Ok(())
    }

    /// Create a stream with the given columns.
    ///
    /// Every stream gets a trailing arrival timestamp column, filled in when
    /// rows are inserted.
    pub fn create_stream(&self, name: &str, fields: impl IntoIterator<Item = Field>) -> Result<Schema> {
        let mut fields: Vec<Field> = fields.into_iter().collect();
        if fields.iter().any(|f| f.name == ARRIVAL_TIMESTAMP) {
            return Err(DbError::new(format!(
                "Column \"{ARRIVAL_TIMESTAMP}\" is reserved for streams"
            )));
        }
        fields.push(Field::new(ARRIVAL_TIMESTAMP, DataType::Timestamp));
        let schema = Schema::new(fields);

        if self.views.read().contains_key(name) {
            return Err(DbError::new(format!("Relation \"{name}\" already exists")));
        }
        let mut streams = self.streams.write();
        if streams.contains_key(name) {
            return Err(DbError::new(format!("Relation \"{name}\" already exists")));
        }
        streams.insert(name.to_string(), schema.clone());
        info!(stream = %name, %schema, "created stream");

        Ok(schema)
    }

    pub fn stream_schema(&self, name: &str) -> Option<Schema> {
        self.streams.read().get(name).cloned()
    }

    pub fn view_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.views.read().keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Define a continuous view, compiling its split statements.
    pub fn define_continuous_view(&self, create: &CreateContinuousViewNode) -> Result<()> {
        let name = create.name.value.clone();
        if self.views.read().contains_key(&name) || self.streams.read().contains_key(&name) {
            return Err(DbError::new(format!("Relation \"{name}\" already exists")));
        }

        let stream = create
            .query
            .from
            .as_ref()
            .map(|from| from.table.value.clone())
            .ok_or_else(|| DbError::new("Continuous views must read from a stream"))?;
        let stream_schema = self
            .stream_schema(&stream)
            .ok_or_else(|| DbError::new(format!("Missing stream \"{stream}\"")).with_field("view", name.clone()))?;

        let options = ViewOptions::parse(&create.options)?;
        let mut definition = create.query.clone();
        if let Some(pred) = options.window_predicate() {
            if extract_window(&definition, &stream_schema)?.is_some() {
                return Err(DbError::new(
                    "Cannot specify sw with a sliding window already in the WHERE clause",
                )
                .with_kind(ErrorKind::AmbiguousSlidingWindowPredicate)
                .with_field("view", name.clone()));
            }
            let conjuncts: Vec<Expr> = definition.where_expr.take().into_iter().chain([pred]).collect();
            definition.where_expr = Expr::and_all(conjuncts);
        }

        let mut compile = CompileContext::new(
            self.config(),
            self.resolver.clone(),
            stream_schema,
            format!("{name}_mrel"),
        );
        if let Some(factor) = options.step_factor {
            if extract_window(&definition, &compile.stream_schema)?.is_none() {
                return Err(DbError::new("step_factor requires a sliding window")
                    .with_kind(ErrorKind::StepFactorOutOfRange)
                    .with_field("view", name.clone()));
            }
            compile = compile.with_step_factor(factor);
        }

        let key = self.next_generation(&name);
        let split = self
            .splits
            .lock()
            .get_or_try_insert_with(key, || split_query(&definition, &compile))?;
        let view = ContinuousView::compile(name.clone(), key.query, split, &compile)?;

        let mut views = self.views.write();
        if views.contains_key(&name) {
            return Err(DbError::new(format!("Relation \"{name}\" already exists")));
        }
        views.insert(
            name.clone(),
            Arc::new(ViewEntry {
                view: Mutex::new(view),
                definition,
                compile,
                key,
            }),
        );
        info!(view = %name, query = %key.query, generation = key.generation, "defined continuous view");

        Ok(())
    }

    /// Bump the generation for a view name, assigning a query id the first
    /// time the name is seen.
    fn next_generation(&self, name: &str) -> SplitCacheKey {
        let mut generations = self.generations.lock();
        match generations.get_mut(name) {
            Some(key) => {
                key.generation += 1;
                *key
            }
            None => {
                let key = SplitCacheKey {
                    query: QueryId(self.next_query_id.fetch_add(1, Ordering::Relaxed)),
                    generation: 0,
                };
                generations.insert(name.to_string(), key);
                key
            }
        }
    }

    /// Drop a view and its materialized relation.
    pub fn drop_view(&self, name: &str) -> Result<()> {
        let entry = self
            .views
            .write()
            .remove(name)
            .ok_or_else(|| DbError::new(format!("Missing view \"{name}\"")))?;
        self.next_generation(name);
        self.splits.lock().invalidate(entry.key.query);
        info!(view = %name, "dropped continuous view");
        Ok(())
    }

    /// Insert rows into a stream, folding them into every view on it.
    ///
    /// Rows hold values for the stream's declared columns, the arrival
    /// timestamp is set to `now`. Each view commits its batch on its own,
    /// a failing view doesn't prevent others from seeing the rows. The first
    /// error is returned after all views have run.
    pub fn insert(&self, stream: &str, rows: Vec<Row>, now: i64) -> Result<Vec<(String, BatchStats)>> {
        let schema = self
            .stream_schema(stream)
            .ok_or_else(|| DbError::new(format!("Missing stream \"{stream}\"")))?;
        let declared = &schema.fields[..schema.len() - 1];

        let mut batch = Vec::with_capacity(rows.len());
        for row in rows {
            if row.len() != declared.len() {
                return Err(DbError::new("Row width doesn't match stream")
                    .with_field("stream", stream.to_string())
                    .with_field("expected", declared.len())
                    .with_field("got", row.len()));
            }
            let mut cast = Vec::with_capacity(schema.len());
            for (value, field) in row.into_iter().zip(declared) {
                cast.push(value.cast_to(&field.datatype)?);
            }
            cast.push(ScalarValue::Timestamp(now));
            batch.push(cast);
        }

        let mut targets: Vec<(String, Arc<ViewEntry>)> = self
            .views
            .read()
            .iter()
            .filter(|(_, entry)| entry.view.lock().stream() == stream)
            .map(|(name, entry)| (name.clone(), entry.clone()))
            .collect();
        targets.sort_by(|a, b| a.0.cmp(&b.0));

        let exec = ExecutionContext::new(now);
        let mut stats = Vec::with_capacity(targets.len());
        let mut first_err = None;
        for (name, entry) in targets {
            match entry.view.lock().process_batch(batch.clone(), &exec) {
                Ok(s) => stats.push((name, s)),
                Err(err) => {
                    if first_err.is_none() {
                        first_err = Some(err);
                    }
                }
            }
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(stats),
        }
    }

    fn view_entry(&self, name: &str) -> Result<Arc<ViewEntry>> {
        self.views
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| DbError::new(format!("Missing view \"{name}\"")))
    }

    /// Read the current contents of a view.
    pub fn read_view(&self, name: &str, now: i64) -> Result<Vec<Row>> {
        let entry = self.view_entry(name)?;
        let view = entry.view.lock();
        view.read(&ExecutionContext::new(now))
    }

    pub fn view_schema(&self, name: &str) -> Result<Schema> {
        Ok(self.view_entry(name)?.view.lock().output_schema())
    }

    /// Width of a view's sliding window, if it has one.
    pub fn window_interval(&self, name: &str) -> Result<Option<Interval>> {
        let entry = self.view_entry(name)?;
        let view = entry.view.lock();
        Ok(view.split().window.as_ref().map(|w| w.interval))
    }

    /// Split statements of a view, recomputed if they've been evicted from
    /// the cache.
    pub fn split(&self, name: &str) -> Result<Arc<SplitQueryTriple>> {
        let entry = self.view_entry(name)?;
        self.splits
            .lock()
            .get_or_try_insert_with(entry.key, || split_query(&entry.definition, &entry.compile))
    }

    pub fn explain(&self, name: &str, config: ExplainConfig) -> Result<String> {
        let entry = self.view_entry(name)?;
        let view = entry.view.lock();
        Ok(view.explain(config))
    }

    /// Delete expired buckets from every windowed view.
    pub fn vacuum(&self, now: i64) -> Result<usize> {
        let entries: Vec<_> = self.views.read().values().cloned().collect();
        let mut deleted = 0;
        for entry in entries {
            deleted += entry.view.lock().vacuum(now)?;
        }
        Ok(deleted)
    }

    /// Parse and execute statements.
    ///
    /// Queries may read from a view, seeing finalized values, or from a
    /// view's materialized relation, seeing raw aggregate states.
    pub fn execute(&self, sql: &str, now: i64) -> Result<Vec<ExecuteResult>> {
        let statements = contquery_parser::parse(sql)?;
        let mut results = Vec::with_capacity(statements.len());
        for statement in statements {
            let result = match statement {
                Statement::CreateContinuousView(create) => {
                    self.define_continuous_view(&create)?;
                    ExecuteResult::CreatedView {
                        name: create.name.value,
                    }
                }
                Statement::Query(select) => self.query(&select, now)?,
            };
            results.push(result);
        }
        Ok(results)
    }

    fn query(&self, select: &SelectNode, now: i64) -> Result<ExecuteResult> {
        let table = select
            .from
            .as_ref()
            .map(|from| from.table.value.clone())
            .ok_or_else(|| DbError::new("Queries must read from a view"))?;

        let (schema, rows) = self.relation_rows(&table, now)?;
        let config = self.config();
        let plan = QueryPlanner::new(&self.resolver, &config).plan_select(select, &schema)?;
        let tables = MemoryTables::new().with_table(table, schema, rows);
        let rows = collect(&plan, &tables, &ExecutionContext::new(now))?;

        Ok(ExecuteResult::Rows {
            schema: plan.schema(),
            rows,
        })
    }

    fn relation_rows(&self, table: &str, now: i64) -> Result<(Schema, Vec<Row>)> {
        if let Some(entry) = self.views.read().get(table) {
            let view = entry.view.lock();
            return Ok((view.output_schema(), view.read(&ExecutionContext::new(now))?));
        }
        for entry in self.views.read().values() {
            let view = entry.view.lock();
            if view.matrel().name() == table {
                return Ok((view.matrel().schema().clone(), view.matrel().rows()));
            }
        }
        if self.streams.read().contains_key(table) {
            warn!(stream = %table, "rejected direct query on stream");
            return Err(DbError::new(format!(
                "\"{table}\" is a stream, streams can only be read by continuous views"
            )));
        }
        Err(DbError::new(format!("Missing relation \"{table}\"")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: i64 = 60_000_000;

    fn engine() -> Engine {
        let engine = Engine::new().unwrap();
        engine
            .create_stream(
                "clicks",
                [Field::new("url", DataType::Utf8), Field::new("latency", DataType::Int64)],
            )
            .unwrap();
        engine
    }

    fn click(url: &str, latency: i64) -> Row {
        vec![ScalarValue::from(url), ScalarValue::Int64(latency)]
    }

    fn rows(result: Vec<ExecuteResult>) -> Vec<Row> {
        match result.into_iter().next_back() {
            Some(ExecuteResult::Rows { rows, .. }) => rows,
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn define_insert_read() {
        let engine = engine();
        engine
            .execute(
                "CREATE CONTINUOUS VIEW v AS SELECT url, count(*) AS c, max(latency) AS m FROM clicks GROUP BY url",
                0,
            )
            .unwrap();

        engine.insert("clicks", vec![click("/a", 5), click("/b", 1)], 0).unwrap();
        let stats = engine.insert("clicks", vec![click("/a", 9)], MINUTE).unwrap();
        assert_eq!(1, stats.len());
        assert_eq!(1, stats[0].1.input_rows);

        let mut got = engine.read_view("v", MINUTE).unwrap();
        got.sort();
        let expected = vec![
            vec![ScalarValue::from("/a"), ScalarValue::Int64(2), ScalarValue::Int64(9)],
            vec![ScalarValue::from("/b"), ScalarValue::Int64(1), ScalarValue::Int64(1)],
        ];
        assert_eq!(expected, got);

        let got = rows(
            engine
                .execute("SELECT url, c FROM v WHERE c > 1", MINUTE)
                .unwrap(),
        );
        assert_eq!(vec![vec![ScalarValue::from("/a"), ScalarValue::Int64(2)]], got);
    }

    #[test]
    fn sw_option() {
        let engine = engine();
        engine
            .execute(
                "CREATE CONTINUOUS VIEW recent WITH (sw = '10 minutes') AS SELECT count(*) AS c FROM clicks",
                0,
            )
            .unwrap();
        assert_eq!(
            Some(Interval::from_secs(600)),
            engine.window_interval("recent").unwrap()
        );

        engine.insert("clicks", vec![click("/a", 1)], 0).unwrap();
        engine.insert("clicks", vec![click("/a", 1)], 8 * MINUTE).unwrap();

        let read = |now| engine.read_view("recent", now).unwrap();
        assert_eq!(vec![vec![ScalarValue::Int64(2)]], read(9 * MINUTE));
        assert_eq!(vec![vec![ScalarValue::Int64(1)]], read(15 * MINUTE));
    }

    #[test]
    fn sw_with_window_in_where_is_ambiguous() {
        let engine = engine();
        let err = engine
            .execute(
                "CREATE CONTINUOUS VIEW v WITH (sw = '1 hour') AS SELECT count(*) FROM clicks \
                 WHERE arrival_timestamp > clock_timestamp() - interval '5 minutes'",
                0,
            )
            .unwrap_err();
        assert_eq!(ErrorKind::AmbiguousSlidingWindowPredicate, err.kind());
    }

    #[test]
    fn step_factor_needs_window() {
        let engine = engine();
        let err = engine
            .execute(
                "CREATE CONTINUOUS VIEW v WITH (step_factor = 10) AS SELECT count(*) FROM clicks",
                0,
            )
            .unwrap_err();
        assert_eq!(ErrorKind::StepFactorOutOfRange, err.kind());
    }

    #[test]
    fn failed_view_does_not_block_others() {
        let engine = engine();
        engine
            .execute("CREATE CONTINUOUS VIEW total AS SELECT sum(latency) AS s FROM clicks", 0)
            .unwrap();
        engine
            .execute("CREATE CONTINUOUS VIEW hits AS SELECT count(*) AS c FROM clicks", 0)
            .unwrap();

        engine.insert("clicks", vec![click("/a", i64::MAX)], 0).unwrap();
        let err = engine.insert("clicks", vec![click("/a", 1)], 0).unwrap_err();
        assert_eq!(ErrorKind::Execution, err.kind());

        assert_eq!(vec![vec![ScalarValue::Int64(2)]], engine.read_view("hits", 0).unwrap());
        assert_eq!(
            vec![vec![ScalarValue::Int64(i64::MAX)]],
            engine.read_view("total", 0).unwrap()
        );
    }

    #[test]
    fn matrel_exposes_raw_state() {
        let engine = engine();
        engine
            .execute("CREATE CONTINUOUS VIEW v AS SELECT avg(latency) AS a FROM clicks", 0)
            .unwrap();
        engine.insert("clicks", vec![click("/a", 2), click("/b", 4)], 0).unwrap();

        let got = rows(engine.execute("SELECT finalize(a) AS a FROM v_mrel", 0).unwrap());
        assert_eq!(vec![vec![ScalarValue::Float64(3.0)]], got);
    }

    #[test]
    fn streams_not_queryable() {
        let engine = engine();
        assert!(engine.execute("SELECT url FROM clicks", 0).is_err());
    }

    #[test]
    fn redefine_after_drop() {
        let engine = engine();
        let sql = "CREATE CONTINUOUS VIEW v AS SELECT count(*) AS c FROM clicks";
        engine.execute(sql, 0).unwrap();
        assert!(engine.execute(sql, 0).is_err());

        let first = engine.split("v").unwrap();
        assert!(Arc::ptr_eq(&first, &engine.split("v").unwrap()));

        engine.drop_view("v").unwrap();
        assert!(engine.read_view("v", 0).is_err());
        engine.execute(sql, 0).unwrap();
        assert!(!Arc::ptr_eq(&first, &engine.split("v").unwrap()));
        assert!(engine.read_view("v", 0).unwrap().is_empty());
    }

    #[test]
    fn settings_apply_to_new_views() {
        let engine = engine();
        engine.set_setting("step_factor", ScalarValue::Float64(10.0)).unwrap();
        engine
            .execute(
                "CREATE CONTINUOUS VIEW v AS SELECT count(*) FROM clicks \
                 WHERE arrival_timestamp > clock_timestamp() - interval '1 hour'",
                0,
            )
            .unwrap();
        assert_eq!(Some(Interval::from_secs(360)), engine.split("v").unwrap().step);

        assert!(engine.set_setting("step_factor", ScalarValue::Float64(80.0)).is_err());
        engine.reset_setting("step_factor").unwrap();
        assert_eq!(ScalarValue::Float64(5.0), engine.get_setting("step_factor").unwrap());
    }
}
