use std::sync::Arc;

use contquery_error::{DbError, ErrorKind, OptionExt, Result};
use contquery_parser::ast::BinaryOperator;
use hashbrown::HashSet;
use tracing::{debug, warn};
use uuid::Uuid;

use super::cache::QueryId;
use super::context::CompileContext;
use super::splitter::SplitQueryTriple;
use crate::annotate::{annotate_combiner, annotate_worker};
use crate::arrays::field::{Row, Schema};
use crate::arrays::scalar::ScalarValue;
use crate::execution::{ExecutionContext, MemoryTables, collect};
use crate::explain::ExplainConfig;
use crate::explain::node::ExplainNode;
use crate::planner::QueryPlanner;
use crate::planner::plan::PhysicalPlan;
use crate::storage::{MaterializedRelation, MatrelMode};

/// Outcome of folding one batch into a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchStats {
    pub input_rows: usize,
    /// Rows produced by the worker.
    pub partial_rows: usize,
    /// Rows written to the materialized relation.
    pub written_rows: usize,
}

/// A compiled continuous view along with its materialized relation.
#[derive(Debug)]
pub struct ContinuousView {
    name: String,
    id: QueryId,
    stream: String,
    stream_schema: Schema,
    split: Arc<SplitQueryTriple>,
    worker: PhysicalPlan,
    combiner: PhysicalPlan,
    overlay: PhysicalPlan,
    matrel: MaterializedRelation,
}

impl ContinuousView {
    /// Plan and annotate the split statements of a view.
    ///
    /// Every aggregate of the worker must be combinable. The materialized
    /// relation takes the worker's output schema, which the combiner must
    /// reproduce exactly.
    pub fn compile(
        name: impl Into<String>,
        id: QueryId,
        split: Arc<SplitQueryTriple>,
        ctx: &CompileContext,
    ) -> Result<Self> {
        let name = name.into();
        let stream = split
            .worker
            .from
            .as_ref()
            .map(|from| from.table.value.clone())
            .required("worker FROM clause")?;

        let planner = QueryPlanner::new(&ctx.resolver, &ctx.config);

        let mut worker = planner.plan_select(&split.worker, &ctx.stream_schema)?;
        annotate_worker(&mut worker)?;
        let matrel_schema = worker.schema();

        let mut combiner = planner.plan_select(&split.combiner, &matrel_schema)?;
        annotate_combiner(&mut combiner, &worker)?;
        let combiner_schema = combiner.schema();
        if combiner_schema != matrel_schema {
            return Err(DbError::new("Combiner output doesn't match the materialized relation")
                .with_kind(ErrorKind::ShapeMismatch)
                .with_field("matrel", matrel_schema.to_string())
                .with_field("combiner", combiner_schema.to_string()));
        }

        let overlay = planner.plan_select(&split.overlay, &matrel_schema)?;

        let mode = if split.has_aggregation {
            MatrelMode::Keyed
        } else {
            MatrelMode::Append
        };
        let matrel = MaterializedRelation::new(ctx.matrel_name.clone(), matrel_schema, mode);

        debug!(view = %name, %id, %stream, matrel = %ctx.matrel_name, "compiled continuous view");

        Ok(ContinuousView {
            name,
            id,
            stream,
            stream_schema: ctx.stream_schema.clone(),
            split,
            worker,
            combiner,
            overlay,
            matrel,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> QueryId {
        self.id
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }

    pub fn split(&self) -> &SplitQueryTriple {
        &self.split
    }

    pub fn worker_plan(&self) -> &PhysicalPlan {
        &self.worker
    }

    pub fn combiner_plan(&self) -> &PhysicalPlan {
        &self.combiner
    }

    pub fn overlay_plan(&self) -> &PhysicalPlan {
        &self.overlay
    }

    pub fn matrel(&self) -> &MaterializedRelation {
        &self.matrel
    }

    /// Schema of rows returned by reading the view.
    pub fn output_schema(&self) -> Schema {
        self.overlay.schema()
    }

    /// Fold a batch of stream rows into the materialized relation.
    ///
    /// Nothing is written unless both the worker and the combiner succeed.
    pub fn process_batch(&mut self, batch: Vec<Row>, ctx: &ExecutionContext) -> Result<BatchStats> {
        let batch_id = Uuid::new_v4();
        let input_rows = batch.len();
        match self.try_process_batch(batch, ctx) {
            Ok(stats) => {
                debug!(
                    view = %self.name,
                    %batch_id,
                    input = stats.input_rows,
                    partials = stats.partial_rows,
                    written = stats.written_rows,
                    "processed batch"
                );
                Ok(stats)
            }
            Err(err) => {
                warn!(
                    view = %self.name,
                    %batch_id,
                    input = input_rows,
                    kind = ?err.kind(),
                    %err,
                    "batch failed, nothing was committed"
                );
                Err(err)
            }
        }
    }

    fn try_process_batch(&mut self, batch: Vec<Row>, ctx: &ExecutionContext) -> Result<BatchStats> {
        let input_rows = batch.len();
        let tables = MemoryTables::new().with_table(self.stream.clone(), self.stream_schema.clone(), batch);
        let partials = collect(&self.worker, &tables, ctx)?;
        let partial_rows = partials.len();

        if self.matrel.mode() == MatrelMode::Append {
            let written_rows = self.matrel.apply(partials)?;
            return Ok(BatchStats {
                input_rows,
                partial_rows,
                written_rows,
            });
        }

        // Stored states of the touched groups are merged with the new
        // partial states, stored ones first.
        let mut seen = HashSet::new();
        let keys: Vec<Vec<ScalarValue>> = partials
            .iter()
            .map(|row| self.matrel.key_of(row))
            .filter(|key| seen.insert(key.clone()))
            .collect();
        let mut input = self.matrel.rows_for_keys(&keys);
        input.extend(partials);

        let tables = MemoryTables::new().with_table(
            self.matrel.name().to_string(),
            self.matrel.schema().clone(),
            input,
        );
        let merged = collect(&self.combiner, &tables, ctx)?;
        let written_rows = self.matrel.apply(merged)?;

        Ok(BatchStats {
            input_rows,
            partial_rows,
            written_rows,
        })
    }

    /// Run the overlay over the materialized relation.
    pub fn read(&self, ctx: &ExecutionContext) -> Result<Vec<Row>> {
        let tables = MemoryTables::new().with_table(
            self.matrel.name().to_string(),
            self.matrel.schema().clone(),
            self.matrel.rows(),
        );
        collect(&self.overlay, &tables, ctx)
    }

    /// Delete stored rows that have fallen out of the sliding window for
    /// good. Views without a window keep everything.
    pub fn vacuum(&mut self, now: i64) -> Result<usize> {
        let (window, bucket) = match (&self.split.window, &self.split.bucket_column) {
            (Some(window), Some(bucket)) => (window, bucket),
            _ => return Ok(0),
        };
        let (idx, _) = self
            .matrel
            .schema()
            .find(bucket)
            .ok_or_else(|| DbError::new(format!("Missing bucket column \"{bucket}\"")))?;

        let lower = now - window.interval.total_micros();
        let inclusive = window.op == BinaryOperator::GtEq;
        let deleted = self.matrel.delete_where(|row| {
            let ts = match row.get(idx) {
                Some(ScalarValue::Null) | None => return Ok(false),
                Some(value) => value.try_as_timestamp()?,
            };
            Ok(if inclusive { ts < lower } else { ts <= lower })
        })?;

        if deleted > 0 {
            debug!(view = %self.name, deleted, "vacuumed expired buckets");
        }
        Ok(deleted)
    }

    pub fn explain(&self, config: ExplainConfig) -> String {
        format!(
            "worker:\n{}combiner:\n{}overlay:\n{}",
            ExplainNode::walk_physical(config, &self.worker),
            ExplainNode::walk_physical(config, &self.combiner),
            ExplainNode::walk_physical(config, &self.overlay),
        )
    }
}

#[cfg(test)]
mod tests {
    use contquery_parser::statement::Statement;

    use super::*;
    use crate::arrays::datatype::DataType;
    use crate::arrays::field::Field;
    use crate::catalog::AggregateCatalog;
    use crate::catalog::resolver::CombineInfoResolver;
    use crate::config::session::SessionConfig;
    use crate::continuous::ARRIVAL_TIMESTAMP;
    use crate::continuous::splitter::split_query;

    const HOUR: i64 = 3_600_000_000;

    fn context() -> CompileContext {
        let resolver = Arc::new(CombineInfoResolver::new(Arc::new(
            AggregateCatalog::with_builtins().unwrap(),
        )));
        let schema = Schema::new([
            Field::new("k", DataType::Utf8),
            Field::new("x", DataType::Int64),
            Field::new(ARRIVAL_TIMESTAMP, DataType::Timestamp),
        ]);
        CompileContext::new(SessionConfig::default(), resolver, schema, "v_mrel")
    }

    fn view(sql: &str, ctx: &CompileContext) -> ContinuousView {
        let select = match contquery_parser::parse(sql).unwrap().remove(0) {
            Statement::Query(select) => select,
            other => panic!("unexpected statement: {other:?}"),
        };
        let split = split_query(&select, ctx).unwrap();
        ContinuousView::compile("v", QueryId(1), Arc::new(split), ctx).unwrap()
    }

    fn row(k: &str, x: Option<i64>, ts: i64) -> Row {
        vec![ScalarValue::from(k), ScalarValue::from(x), ScalarValue::Timestamp(ts)]
    }

    fn sorted(mut rows: Vec<Row>) -> Vec<Row> {
        rows.sort();
        rows
    }

    #[test]
    fn batches_accumulate() {
        let ctx = context();
        let mut view = view("SELECT k, count(*) AS c, sum(x) AS s, avg(x) AS a FROM s GROUP BY k", &ctx);
        let exec = ExecutionContext::new(0);

        view.process_batch(vec![row("a", Some(1), 0), row("b", Some(2), 0)], &exec)
            .unwrap();
        view.process_batch(vec![row("a", Some(3), 0), row("a", None, 0)], &exec)
            .unwrap();

        let expected = vec![
            vec![
                ScalarValue::from("a"),
                ScalarValue::Int64(3),
                ScalarValue::Int64(4),
                ScalarValue::Float64(2.0),
            ],
            vec![
                ScalarValue::from("b"),
                ScalarValue::Int64(1),
                ScalarValue::Int64(2),
                ScalarValue::Float64(2.0),
            ],
        ];
        assert_eq!(expected, sorted(view.read(&exec).unwrap()));
        assert_eq!(2, view.matrel().len());
    }

    #[test]
    fn failed_batch_commits_nothing() {
        let ctx = context();
        let mut view = view("SELECT k, sum(x) AS s FROM s GROUP BY k", &ctx);
        let exec = ExecutionContext::new(0);

        view.process_batch(vec![row("a", Some(i64::MAX - 1), 0)], &exec).unwrap();
        let before = view.matrel().rows();

        let err = view
            .process_batch(vec![row("b", Some(1), 0), row("a", Some(5), 0)], &exec)
            .unwrap_err();
        assert_eq!(ErrorKind::Execution, err.kind());
        assert_eq!(before, view.matrel().rows());
    }

    #[test]
    fn sliding_window_read_and_vacuum() {
        let ctx = context().with_step_factor(25.0);
        let mut view = view(
            "SELECT k, count(*) AS c FROM s WHERE arrival_timestamp > now() - interval '1 hour' GROUP BY k",
            &ctx,
        );

        let at = |ts: i64| ExecutionContext::new(ts);
        view.process_batch(vec![row("a", None, 0), row("a", None, HOUR / 2)], &at(HOUR / 2))
            .unwrap();
        view.process_batch(vec![row("a", None, 2 * HOUR)], &at(2 * HOUR))
            .unwrap();
        // Three 15 minute buckets.
        assert_eq!(3, view.matrel().len());

        let read = view.read(&at(2 * HOUR)).unwrap();
        assert_eq!(vec![vec![ScalarValue::from("a"), ScalarValue::Int64(1)]], read);

        let read = view.read(&at(HOUR)).unwrap();
        assert_eq!(vec![vec![ScalarValue::from("a"), ScalarValue::Int64(2)]], read);

        assert_eq!(2, view.vacuum(2 * HOUR).unwrap());
        assert_eq!(1, view.matrel().len());
    }

    #[test]
    fn append_only_view() {
        let ctx = context();
        let mut view = view("SELECT k, x FROM s WHERE x > 1", &ctx);
        let exec = ExecutionContext::new(0);
        view.process_batch(vec![row("a", Some(1), 0), row("b", Some(2), 0)], &exec)
            .unwrap();
        view.process_batch(vec![row("b", Some(2), 0)], &exec).unwrap();

        assert_eq!(MatrelMode::Append, view.matrel().mode());
        let expected = vec![
            vec![ScalarValue::from("b"), ScalarValue::Int64(2)],
            vec![ScalarValue::from("b"), ScalarValue::Int64(2)],
        ];
        assert_eq!(expected, view.read(&exec).unwrap());
    }
}
