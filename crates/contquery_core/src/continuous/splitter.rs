//! Splitting of a continuous view definition into worker, combiner and
//! overlay statements.
//!
//! The worker computes partial aggregate states over each incoming batch,
//! grouped by the view's group keys (plus the time bucket for sliding
//! windows). The combiner merges the worker's partial states with the states
//! already stored in the materialized relation. The overlay reads the
//! materialized relation and finalizes the stored states.
use contquery_error::{DbError, OptionExt, Result, not_implemented};
use contquery_parser::ast::{
    DistinctModifier,
    Expr,
    FromNode,
    Function,
    GroupByExpr,
    Ident,
    LimitModifier,
    SelectExpr,
    SelectNode,
};
use hashbrown::HashSet;
use tracing::debug;

use super::ARRIVAL_TIMESTAMP;
use super::context::CompileContext;
use super::sliding_window::{SlidingWindow, extract_window, interval_literal, strip_window_predicate};
use crate::analyze::classifier::{AggregateClassifier, COMBINE_FUNCTION, CallSiteKind, FINALIZE_FUNCTION};
use crate::analyze::streaming::rewrite_streaming_aggregates;
use crate::analyze::{column_ref_name, output_name, references_columns};
use crate::arrays::interval::Interval;

/// Function truncating the time column into buckets.
pub const BUCKET_FUNCTION: &str = "date_round";

/// The three statements a continuous view compiles into.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitQueryTriple {
    /// Runs over each batch of stream rows, producing partial states.
    pub worker: SelectNode,
    /// Merges partial states into the materialized relation.
    pub combiner: SelectNode,
    /// User facing read of the materialized relation.
    pub overlay: SelectNode,
    /// Worker output columns that aren't output columns of the view.
    pub hoisted: Vec<String>,
    /// If the view groups or aggregates at all. Views that don't only
    /// append rows to the materialized relation.
    pub has_aggregation: bool,
    /// If the overlay has to combine stored states again before finalizing.
    /// True for aggregating sliding window views, where a group is spread
    /// over multiple time buckets.
    pub view_combines: bool,
    pub window: Option<SlidingWindow>,
    /// Bucket width the time column is truncated to.
    pub step: Option<Interval>,
    /// Materialized relation column holding the time bucket.
    pub bucket_column: Option<String>,
}

impl SplitQueryTriple {
    pub fn is_sliding_window(&self) -> bool {
        self.window.is_some()
    }
}

/// Hands out worker column names, unique ignoring case.
///
/// Generated names are `_0`, `_1`, ... skipping anything reserved.
#[derive(Debug, Default)]
struct NameAllocator {
    reserved: HashSet<String>,
    taken: HashSet<String>,
    next: usize,
}

impl NameAllocator {
    fn new<'a>(reserved: impl IntoIterator<Item = &'a str>) -> Self {
        NameAllocator {
            reserved: reserved.into_iter().map(|n| n.to_lowercase()).collect(),
            taken: HashSet::new(),
            next: 0,
        }
    }

    /// Take the preferred name if it's free, otherwise generate one.
    fn claim(&mut self, preferred: Option<&str>) -> String {
        if let Some(name) = preferred {
            if self.taken.insert(name.to_lowercase()) {
                return name.to_string();
            }
        }
        self.generate()
    }

    fn generate(&mut self) -> String {
        loop {
            let name = format!("_{}", self.next);
            self.next += 1;
            if !self.reserved.contains(&name) && self.taken.insert(name.clone()) {
                return name;
            }
        }
    }
}

/// A column of the worker's output, and so of the materialized relation.
#[derive(Debug, Clone)]
struct WorkerColumn {
    expr: Expr,
    name: String,
}

fn aliased(expr: Expr, name: &str) -> SelectExpr {
    SelectExpr::AliasedExpr(expr, Ident::new(name))
}

fn call(name: &str, arg: Expr) -> Expr {
    Expr::function(Function::new(name, vec![arg]))
}

fn from_relation(name: &str) -> Option<FromNode> {
    Some(FromNode {
        table: Ident::new(name),
        alias: None,
    })
}

/// Split a continuous view definition.
pub fn split_query(select: &SelectNode, ctx: &CompileContext) -> Result<SplitQueryTriple> {
    let from = select.from.clone().required("FROM clause")?;
    // Grouping sets are applied on read. The worker and combiner group by
    // every member of every set.
    let grouping_sets = select
        .group_by
        .iter()
        .any(|g| !matches!(g, GroupByExpr::Expr(_)));

    let resolver = ctx.resolver.as_ref();
    let select = rewrite_streaming_aggregates(select, &|name| resolver.is_aggregate_name(name))?;

    // Output columns of the view, wildcards expanded without the arrival
    // timestamp.
    let mut targets: Vec<(Expr, String)> = Vec::with_capacity(select.projections.len());
    for proj in &select.projections {
        match proj {
            SelectExpr::Wildcard => targets.extend(
                ctx.stream_schema
                    .names()
                    .filter(|name| *name != ARRIVAL_TIMESTAMP)
                    .map(|name| (Expr::column(name), name.to_string())),
            ),
            SelectExpr::Expr(expr) | SelectExpr::AliasedExpr(expr, _) => {
                targets.push((expr.clone(), output_name(proj)))
            }
        }
    }

    let window = extract_window(&select, &ctx.stream_schema)?;

    let classifier = AggregateClassifier::new(resolver, ctx.config.enable_aggregate_dedup);
    let mut classified: Vec<&Expr> = targets.iter().map(|(expr, _)| expr).collect();
    classified.extend(select.having.iter());
    classified.extend(select.order_by.iter().map(|o| &o.expr));
    let sites = classifier.classify(classified)?;
    if let Some(site) = sites.iter().find(|s| s.kind == CallSiteKind::Window) {
        not_implemented!("window function {} in a continuous view", site.name);
    }
    if let Some(site) = sites.iter().find(|s| s.kind == CallSiteKind::Combine) {
        return Err(DbError::new(format!(
            "{COMBINE_FUNCTION} can't be used in a continuous view definition"
        ))
        .with_field("call", site.call.to_string()));
    }

    // Plain DISTINCT becomes DISTINCT ON every output column.
    let distinct_on: Option<Vec<Expr>> = match &select.distinct {
        Some(DistinctModifier::Distinct) => Some(targets.iter().map(|(expr, _)| expr.clone()).collect()),
        Some(DistinctModifier::On(exprs)) => Some(exprs.clone()),
        Some(DistinctModifier::All) | None => None,
    };

    let mut group_exprs: Vec<Expr> = select.flattened_group_exprs().into_iter().cloned().collect();
    if sites.is_empty() && group_exprs.is_empty() {
        // Deduplication over an unbounded stream is grouping.
        if let Some(on) = &distinct_on {
            group_exprs = on.clone();
        }
    }
    let has_aggregation = !sites.is_empty() || !group_exprs.is_empty();
    let view_combines = (window.is_some() && has_aggregation) || grouping_sets;

    let mut names = NameAllocator::new(targets.iter().map(|(_, name)| name.as_str()));

    // Output name of the target that is exactly the given expression.
    let target_name = |expr: &Expr| -> Option<String> {
        targets
            .iter()
            .find(|(target, _)| target.unnested() == expr.unnested())
            .map(|(_, name)| name.clone())
    };

    let mut worker_where = select.where_expr.clone();
    if let (Some(where_expr), Some(window)) = (&select.where_expr, &window) {
        worker_where = strip_window_predicate(where_expr, window);
    }

    if !has_aggregation {
        return split_without_aggregation(SplitInput {
            select: &select,
            from,
            targets: &targets,
            window,
            worker_where,
            names,
            ctx,
        });
    }

    let mut keys: Vec<WorkerColumn> = Vec::with_capacity(group_exprs.len() + 1);
    let mut hoisted = Vec::new();
    for expr in &group_exprs {
        let preferred = target_name(expr).or_else(|| column_ref_name(expr).map(|n| n.to_string()));
        let is_output = target_name(expr).is_some();
        let name = names.claim(preferred.as_deref());
        if !is_output || targets.iter().all(|(_, n)| n != &name) {
            hoisted.push(name.clone());
        }
        keys.push(WorkerColumn {
            expr: expr.clone(),
            name,
        });
    }

    // Sliding windows group by a truncated time bucket so that expired
    // buckets can be filtered out on read.
    let mut step = None;
    let mut bucket = None;
    if let Some(window) = &window {
        let width = window.step(ctx.step_factor, ctx.min_step);
        let expr = Expr::function(Function::new(
            BUCKET_FUNCTION,
            vec![window.time_expr.clone(), interval_literal(&width)],
        ));
        let name = names.claim(column_ref_name(&window.time_expr));
        hoisted.push(name.clone());
        step = Some(width);
        bucket = Some(WorkerColumn { expr, name });
    }

    let mut aggregates: Vec<WorkerColumn> = Vec::with_capacity(sites.len());
    for site in &sites {
        let preferred = target_name(&site.call);
        let name = names.claim(preferred.as_deref());
        if preferred.as_deref() != Some(name.as_str()) {
            hoisted.push(name.clone());
        }
        aggregates.push(WorkerColumn {
            expr: site.call.clone(),
            name,
        });
    }

    let worker_keys: Vec<&WorkerColumn> = keys.iter().chain(bucket.iter()).collect();

    let worker = SelectNode {
        distinct: None,
        projections: worker_keys
            .iter()
            .copied()
            .chain(&aggregates)
            .map(|col| aliased(col.expr.clone(), &col.name))
            .collect(),
        from: Some(from),
        where_expr: worker_where,
        group_by: worker_keys
            .iter()
            .map(|col| GroupByExpr::Expr(col.expr.clone()))
            .collect(),
        having: None,
        order_by: Vec::new(),
        limit: LimitModifier::default(),
    };

    let combiner = SelectNode {
        distinct: None,
        projections: worker_keys
            .iter()
            .map(|col| aliased(Expr::column(&col.name), &col.name))
            .chain(
                aggregates
                    .iter()
                    .map(|col| aliased(call(COMBINE_FUNCTION, Expr::column(&col.name)), &col.name)),
            )
            .collect(),
        from: from_relation(&ctx.matrel_name),
        where_expr: None,
        group_by: worker_keys
            .iter()
            .map(|col| GroupByExpr::Expr(Expr::column(&col.name)))
            .collect(),
        having: None,
        order_by: Vec::new(),
        limit: LimitModifier::default(),
    };

    let overlay_rewriter = OverlayRewriter {
        keys: &keys,
        aggregates: &aggregates,
        combine: view_combines,
    };

    let mut overlay_where = match (&window, &bucket) {
        (Some(window), Some(bucket)) => Some(window.predicate_over(Expr::column(&bucket.name))),
        _ => None,
    };
    let mut overlay_having = select.having.as_ref().map(|h| overlay_rewriter.rewrite(h));
    if !view_combines {
        // Each stored row is a complete group, HAVING filters rows.
        if let Some(having) = overlay_having.take() {
            overlay_where = Expr::and_all(overlay_where.into_iter().chain([having]));
        }
    }

    let overlay = SelectNode {
        distinct: distinct_on.map(|on| DistinctModifier::On(on.iter().map(|e| overlay_rewriter.rewrite(e)).collect())),
        projections: targets
            .iter()
            .map(|(expr, name)| aliased(overlay_rewriter.rewrite(expr), name))
            .collect(),
        from: from_relation(&ctx.matrel_name),
        where_expr: overlay_where,
        group_by: if grouping_sets {
            select
                .group_by
                .iter()
                .map(|g| overlay_group_by(g, &overlay_rewriter))
                .collect()
        } else if view_combines {
            keys.iter()
                .map(|col| GroupByExpr::Expr(Expr::column(&col.name)))
                .collect()
        } else {
            Vec::new()
        },
        having: overlay_having,
        order_by: select
            .order_by
            .iter()
            .map(|o| {
                let mut o = o.clone();
                o.expr = overlay_rewriter.rewrite(&o.expr);
                o
            })
            .collect(),
        limit: select.limit.clone(),
    };

    debug!(
        keys = keys.len(),
        aggregates = aggregates.len(),
        hoisted = hoisted.len(),
        sliding_window = window.is_some(),
        grouping_sets,
        "split continuous query"
    );

    Ok(SplitQueryTriple {
        worker,
        combiner,
        overlay,
        hoisted,
        has_aggregation,
        view_combines,
        window,
        step,
        bucket_column: bucket.map(|b| b.name),
    })
}

/// Rewrites view expressions to read from the materialized relation.
#[derive(Debug)]
struct OverlayRewriter<'a> {
    keys: &'a [WorkerColumn],
    aggregates: &'a [WorkerColumn],
    combine: bool,
}

impl OverlayRewriter<'_> {
    fn rewrite(&self, expr: &Expr) -> Expr {
        expr.transform_down(&mut |e| {
            let e = e.unnested();
            if let Some(agg) = self.aggregates.iter().find(|a| a.expr.unnested() == e) {
                let state = Expr::column(&agg.name);
                let state = if self.combine {
                    call(COMBINE_FUNCTION, state)
                } else {
                    state
                };
                return Some(call(FINALIZE_FUNCTION, state));
            }
            self.keys
                .iter()
                .find(|k| k.expr.unnested() == e)
                .map(|k| Expr::column(&k.name))
        })
    }
}

/// Grouping element of the overlay, with members read from the stored key
/// columns.
fn overlay_group_by(group: &GroupByExpr, rewriter: &OverlayRewriter) -> GroupByExpr {
    let rewrite_all = |exprs: &[Expr]| exprs.iter().map(|e| rewriter.rewrite(e)).collect();
    match group {
        GroupByExpr::Expr(expr) => GroupByExpr::Expr(rewriter.rewrite(expr)),
        GroupByExpr::Rollup(exprs) => GroupByExpr::Rollup(rewrite_all(exprs)),
        GroupByExpr::Cube(exprs) => GroupByExpr::Cube(rewrite_all(exprs)),
        GroupByExpr::GroupingSets(sets) => {
            GroupByExpr::GroupingSets(sets.iter().map(|set| rewrite_all(set)).collect())
        }
    }
}

struct SplitInput<'a> {
    select: &'a SelectNode,
    from: FromNode,
    targets: &'a [(Expr, String)],
    window: Option<SlidingWindow>,
    worker_where: Option<Expr>,
    names: NameAllocator,
    ctx: &'a CompileContext,
}

/// Views without aggregation store the projected rows as they are.
///
/// Constant outputs are evaluated on read instead of being stored.
fn split_without_aggregation(input: SplitInput) -> Result<SplitQueryTriple> {
    let SplitInput {
        select,
        from,
        targets,
        window,
        worker_where,
        mut names,
        ctx,
    } = input;

    let mut columns: Vec<WorkerColumn> = Vec::new();
    let mut output: Vec<(Expr, String)> = Vec::with_capacity(targets.len());
    for (expr, name) in targets {
        if !references_columns(expr) {
            output.push((expr.clone(), name.clone()));
            continue;
        }
        let stored = names.claim(Some(name));
        output.push((Expr::column(&stored), name.clone()));
        columns.push(WorkerColumn {
            expr: expr.clone(),
            name: stored,
        });
    }

    // The time column is kept so the window can be applied on read.
    let mut hoisted = Vec::new();
    let mut time_column = None;
    if let Some(window) = &window {
        let existing = columns
            .iter()
            .find(|c| c.expr.unnested() == window.time_expr.unnested())
            .map(|c| c.name.clone());
        let name = match existing {
            Some(name) => name,
            None => {
                let name = names.claim(column_ref_name(&window.time_expr));
                hoisted.push(name.clone());
                columns.push(WorkerColumn {
                    expr: window.time_expr.clone(),
                    name: name.clone(),
                });
                name
            }
        };
        time_column = Some(name);
    }

    let worker = SelectNode {
        projections: columns.iter().map(|c| aliased(c.expr.clone(), &c.name)).collect(),
        from: Some(from),
        where_expr: worker_where,
        ..Default::default()
    };
    let combiner = SelectNode {
        projections: columns
            .iter()
            .map(|c| aliased(Expr::column(&c.name), &c.name))
            .collect(),
        from: from_relation(&ctx.matrel_name),
        ..Default::default()
    };

    // Output expressions were replaced by column references, modifiers
    // referring to them follow.
    let rewrite = |expr: &Expr| -> Expr {
        expr.transform_down(&mut |e| {
            columns
                .iter()
                .find(|c| c.expr.unnested() == e.unnested())
                .map(|c| Expr::column(&c.name))
        })
    };

    let overlay = SelectNode {
        distinct: None,
        projections: output.iter().map(|(expr, name)| aliased(expr.clone(), name)).collect(),
        from: from_relation(&ctx.matrel_name),
        where_expr: match (&window, &time_column) {
            (Some(window), Some(column)) => Some(window.predicate_over(Expr::column(column))),
            _ => None,
        },
        group_by: Vec::new(),
        having: None,
        order_by: select
            .order_by
            .iter()
            .map(|o| {
                let mut o = o.clone();
                o.expr = rewrite(&o.expr);
                o
            })
            .collect(),
        limit: select.limit.clone(),
    };

    debug!(columns = columns.len(), sliding_window = window.is_some(), "split non-aggregating continuous query");

    Ok(SplitQueryTriple {
        worker,
        combiner,
        overlay,
        hoisted,
        has_aggregation: false,
        view_combines: false,
        window,
        step: None,
        bucket_column: time_column,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use contquery_error::ErrorKind;
    use contquery_parser::statement::Statement;

    use super::*;
    use crate::arrays::datatype::DataType;
    use crate::arrays::field::{Field, Schema};
    use crate::catalog::AggregateCatalog;
    use crate::catalog::resolver::CombineInfoResolver;
    use crate::config::session::SessionConfig;

    fn select(sql: &str) -> SelectNode {
        match contquery_parser::parse(sql).unwrap().remove(0) {
            Statement::Query(select) => select,
            other => panic!("unexpected statement: {other:?}"),
        }
    }

    fn context() -> CompileContext {
        let resolver = Arc::new(CombineInfoResolver::new(Arc::new(
            AggregateCatalog::with_builtins().unwrap(),
        )));
        let schema = Schema::new([
            Field::new("k", DataType::Utf8),
            Field::new("x", DataType::Int64),
            Field::new("arrival_ts", DataType::Timestamp),
            Field::new(ARRIVAL_TIMESTAMP, DataType::Timestamp),
        ]);
        CompileContext::new(SessionConfig::default(), resolver, schema, "v_mrel")
    }

    fn split(sql: &str, ctx: &CompileContext) -> SplitQueryTriple {
        split_query(&select(sql), ctx).unwrap()
    }

    #[test]
    fn sliding_window_scenario() {
        let ctx = context().with_step_factor(25.0);
        let triple = split(
            "SELECT k, count(*) FROM s WHERE arrival_ts > now() - interval '1 hour' GROUP BY k",
            &ctx,
        );

        assert_eq!(
            "SELECT k AS k, date_round(arrival_ts, interval '15 minutes') AS arrival_ts, count(*) AS count \
             FROM s GROUP BY k, date_round(arrival_ts, interval '15 minutes')",
            triple.worker.to_string()
        );
        assert_eq!(
            "SELECT k AS k, arrival_ts AS arrival_ts, combine(count) AS count FROM v_mrel GROUP BY k, arrival_ts",
            triple.combiner.to_string()
        );
        assert_eq!(
            "SELECT k AS k, finalize(combine(count)) AS count FROM v_mrel \
             WHERE arrival_ts > now() - interval '1 hour' GROUP BY k",
            triple.overlay.to_string()
        );
        assert!(triple.view_combines);
        assert_eq!(Some(Interval::from_secs(900)), triple.step);
        assert_eq!(Some("arrival_ts".to_string()), triple.bucket_column);
    }

    #[test]
    fn composite_targets_hoist_aggregates() {
        let triple = split("SELECT k, sum(x) + 1 AS s1, sum(x) * 2 AS s2 FROM s GROUP BY k", &context());

        // Identical calls share one worker column.
        assert_eq!(
            "SELECT k AS k, sum(x) AS _0 FROM s GROUP BY k",
            triple.worker.to_string()
        );
        assert_eq!(
            "SELECT k AS k, finalize(_0) + 1 AS s1, finalize(_0) * 2 AS s2 FROM v_mrel",
            triple.overlay.to_string()
        );
        assert_eq!(vec!["_0".to_string()], triple.hoisted);
        assert!(!triple.view_combines);
    }

    #[test]
    fn generated_names_avoid_outputs() {
        let triple = split("SELECT x AS _0, sum(x) + 1 AS s FROM s GROUP BY x", &context());
        assert_eq!("SELECT x AS _0, sum(x) AS _1 FROM s GROUP BY x", triple.worker.to_string());
    }

    #[test]
    fn non_output_group_exprs_are_hoisted() {
        let triple = split("SELECT count(*) FROM s GROUP BY k, lower(k)", &context());
        assert_eq!(
            "SELECT k AS k, lower(k) AS _0, count(*) AS count FROM s GROUP BY k, lower(k)",
            triple.worker.to_string()
        );
        assert_eq!(vec!["k".to_string(), "_0".to_string()], triple.hoisted);
    }

    #[test]
    fn filter_stays_in_worker() {
        let triple = split("SELECT k, count(*) FILTER (WHERE x > 1) AS c FROM s GROUP BY k", &context());
        assert_eq!(
            "SELECT k AS k, count(*) FILTER (WHERE x > 1) AS c FROM s GROUP BY k",
            triple.worker.to_string()
        );
        assert_eq!(
            "SELECT k AS k, combine(c) AS c FROM v_mrel GROUP BY k",
            triple.combiner.to_string()
        );
    }

    #[test]
    fn modifiers_move_to_overlay() {
        let triple = split(
            "SELECT k, sum(x) AS s FROM s GROUP BY k HAVING sum(x) > 10 ORDER BY s DESC LIMIT 3",
            &context(),
        );
        assert_eq!("SELECT k AS k, sum(x) AS s FROM s GROUP BY k", triple.worker.to_string());
        assert_eq!(
            "SELECT k AS k, finalize(s) AS s FROM v_mrel WHERE finalize(s) > 10 ORDER BY s DESC LIMIT 3",
            triple.overlay.to_string()
        );
    }

    #[test]
    fn distinct_becomes_group_by() {
        let triple = split("SELECT DISTINCT k FROM s", &context());
        assert!(triple.has_aggregation);
        assert_eq!("SELECT k AS k FROM s GROUP BY k", triple.worker.to_string());
        assert_eq!("SELECT DISTINCT ON (k) k AS k FROM v_mrel", triple.overlay.to_string());
    }

    #[test]
    fn grouping_sets_apply_on_read() {
        // (group by, worker, overlay)
        let cases = [
            (
                "ROLLUP (k, x)",
                "SELECT k AS k, x AS x, count(*) AS n FROM s GROUP BY k, x",
                "SELECT k AS k, finalize(combine(n)) AS n FROM v_mrel GROUP BY ROLLUP (k, x)",
            ),
            (
                "CUBE (k)",
                "SELECT k AS k, count(*) AS n FROM s GROUP BY k",
                "SELECT k AS k, finalize(combine(n)) AS n FROM v_mrel GROUP BY CUBE (k)",
            ),
            (
                "GROUPING SETS ((k), (k, x), ())",
                "SELECT k AS k, x AS x, count(*) AS n FROM s GROUP BY k, x",
                "SELECT k AS k, finalize(combine(n)) AS n FROM v_mrel GROUP BY GROUPING SETS ((k), (k, x), ())",
            ),
        ];
        for (group_by, worker, overlay) in cases {
            let triple = split(&format!("SELECT k, count(*) AS n FROM s GROUP BY {group_by}"), &context());
            assert_eq!(worker, triple.worker.to_string(), "{group_by}");
            assert_eq!(overlay, triple.overlay.to_string(), "{group_by}");
            assert!(triple.view_combines);
        }

        let triple = split("SELECT k, count(*) AS n FROM s GROUP BY ROLLUP (k, x)", &context());
        assert_eq!(
            "SELECT k AS k, x AS x, combine(n) AS n FROM v_mrel GROUP BY k, x",
            triple.combiner.to_string()
        );
        assert_eq!(vec!["x".to_string()], triple.hoisted);
    }

    #[test]
    fn streaming_variants_substituted() {
        let triple = split("SELECT count(DISTINCT x) FROM s", &context());
        assert_eq!("SELECT hll_count_distinct(x) AS count FROM s", triple.worker.to_string());
    }

    #[test]
    fn without_aggregation() {
        let triple = split(
            "SELECT x, 1 AS one FROM s WHERE arrival_ts > now() - interval '5 minutes' AND x > 2",
            &context(),
        );
        assert!(!triple.has_aggregation);
        assert_eq!(
            "SELECT x AS x, arrival_ts AS arrival_ts FROM s WHERE x > 2",
            triple.worker.to_string()
        );
        assert_eq!(
            "SELECT x AS x, 1 AS one FROM v_mrel WHERE arrival_ts > now() - interval '5 minutes'",
            triple.overlay.to_string()
        );
    }

    #[test]
    fn wildcard_excludes_arrival_timestamp() {
        let triple = split("SELECT * FROM s", &context());
        assert_eq!(
            "SELECT k AS k, x AS x, arrival_ts AS arrival_ts FROM s",
            triple.worker.to_string()
        );
    }

    #[test]
    fn rejected_definitions() {
        // (query, expected kind)
        let cases = [
            (
                "SELECT count(*) FROM s WHERE arrival_ts > now() - interval '1 hour' OR x > 5",
                ErrorKind::AmbiguousSlidingWindowPredicate,
            ),
            ("SELECT sum(count(x)) FROM s", ErrorKind::NestedAggregateNotAllowed),
            ("SELECT k, count(*) FROM s GROUP BY ROLLUP (k) HAVING max(max(x)) > 1", ErrorKind::NestedAggregateNotAllowed),
        ];
        for (sql, kind) in cases {
            let err = split_query(&select(sql), &context()).unwrap_err();
            assert_eq!(kind, err.kind(), "{sql}");
        }
    }
}
