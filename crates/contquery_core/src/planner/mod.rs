//! Planning of SELECT statements into physical plans.
//!
//! Every plan has the same left-deep shape:
//!
//! Scan -> Filter -> [Sort] -> Aggregate -> Filter (HAVING) -> Project ->
//! Sort -> DistinctOn -> Limit
//!
//! Nodes that a statement doesn't need are left out.
pub mod bind;
pub mod grouping;
pub mod plan;

use contquery_error::{DbError, OptionExt, Result, not_implemented};
use contquery_parser::ast::{DistinctModifier, Expr, Literal, SelectExpr, SelectNode};
use tracing::debug;

use self::bind::{ExprBinder, constant_value};
use self::grouping::{expand_grouping_sets, plan_phases};
use self::plan::{
    AggregateNode,
    AggregateStrategy,
    DistinctOnNode,
    FilterNode,
    LimitNode,
    PhysicalPlan,
    ProjectNode,
    ScanNode,
    SortNode,
};
use crate::analyze::classifier::{AggregateCallSite, AggregateClassifier, CallSiteKind};
use crate::analyze::{UNNAMED_COLUMN, expr_output_name, output_name};
use crate::arrays::field::Schema;
use crate::catalog::resolver::CombineInfoResolver;
use crate::config::session::SessionConfig;
use crate::expr::aggregate::{AggregateSplit, PhysicalAggregate};
use crate::expr::{PhysicalExpr, PhysicalSortExpr};

#[derive(Debug, Clone, Copy)]
pub struct QueryPlanner<'a> {
    resolver: &'a CombineInfoResolver,
    config: &'a SessionConfig,
}

impl<'a> QueryPlanner<'a> {
    pub fn new(resolver: &'a CombineInfoResolver, config: &'a SessionConfig) -> Self {
        QueryPlanner { resolver, config }
    }

    /// Plan a select reading from a relation with the given schema.
    pub fn plan_select(&self, select: &SelectNode, source: &Schema) -> Result<PhysicalPlan> {
        let from = select.from.as_ref().required("FROM clause")?;
        let mut plan = PhysicalPlan::Scan(ScanNode {
            table: from.table.value.clone(),
            schema: source.clone(),
        });

        let projections = expand_projections(select, source);

        if let Some(predicate) = &select.where_expr {
            let binder = ExprBinder::new(self.resolver, source, "WHERE");
            plan = PhysicalPlan::Filter(FilterNode {
                predicate: binder.bind(predicate)?,
                input: Box::new(plan),
            });
        }

        let classifier = AggregateClassifier::new(self.resolver, self.config.enable_aggregate_dedup);
        let mut classified: Vec<&Expr> = projections.iter().map(|(expr, _)| expr).collect();
        classified.extend(select.having.iter());
        classified.extend(select.order_by.iter().map(|o| &o.expr));
        let sites = classifier.classify(classified)?;

        if let Some(site) = sites.iter().find(|s| s.kind == CallSiteKind::Window) {
            not_implemented!("window function {}", site.name);
        }

        let group_exprs = select.flattened_group_exprs();
        let exprs = if !sites.is_empty() || !group_exprs.is_empty() {
            let node = self.plan_aggregate(select, &group_exprs, &sites, source, plan)?;

            let mut mapped: Vec<(Expr, usize)> = group_exprs
                .iter()
                .enumerate()
                .map(|(idx, expr)| ((*expr).clone(), idx))
                .collect();
            mapped.extend(
                sites
                    .iter()
                    .enumerate()
                    .map(|(idx, site)| (site.call.clone(), group_exprs.len() + idx)),
            );

            plan = PhysicalPlan::Aggregate(node);
            let agg_schema = plan.schema();

            if let Some(having) = &select.having {
                let binder = ExprBinder::post_aggregate(self.resolver, &agg_schema, mapped.clone(), "HAVING");
                plan = PhysicalPlan::Filter(FilterNode {
                    predicate: binder.bind(having)?,
                    input: Box::new(plan),
                });
            }

            let binder = ExprBinder::post_aggregate(self.resolver, &agg_schema, mapped, "SELECT");
            projections
                .iter()
                .map(|(expr, _)| binder.bind(expr))
                .collect::<Result<Vec<_>>>()?
        } else {
            if select.having.is_some() {
                return Err(DbError::new("HAVING requires GROUP BY or an aggregate"));
            }
            let binder = ExprBinder::new(self.resolver, source, "SELECT");
            projections
                .iter()
                .map(|(expr, _)| binder.bind(expr))
                .collect::<Result<Vec<_>>>()?
        };

        plan = PhysicalPlan::Project(ProjectNode {
            exprs,
            names: projections.iter().map(|(_, name)| name.clone()).collect(),
            input: Box::new(plan),
        });

        // Modifiers refer to output columns by name, by position, or by
        // repeating a projection expression.
        let output = plan.schema();
        let output_binder = ExprBinder::new(self.resolver, &output, "ORDER BY").with_mapped(
            projections
                .iter()
                .enumerate()
                .map(|(idx, (expr, _))| (expr.clone(), idx))
                .collect(),
        );

        if !select.order_by.is_empty() {
            let keys = select
                .order_by
                .iter()
                .map(|o| {
                    Ok(PhysicalSortExpr {
                        expr: bind_output_ref(&output_binder, &o.expr)?,
                        desc: o.desc,
                        nulls_first: o.nulls_first(),
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            plan = PhysicalPlan::Sort(SortNode {
                keys,
                input: Box::new(plan),
            });
        }

        let distinct_on = match &select.distinct {
            Some(DistinctModifier::Distinct) => Some(
                output
                    .fields
                    .iter()
                    .enumerate()
                    .map(|(idx, f)| PhysicalExpr::column(idx, f.name.clone(), f.datatype.clone()))
                    .collect::<Vec<_>>(),
            ),
            Some(DistinctModifier::On(exprs)) => Some(
                exprs
                    .iter()
                    .map(|e| bind_output_ref(&output_binder, e))
                    .collect::<Result<Vec<_>>>()?,
            ),
            Some(DistinctModifier::All) | None => None,
        };
        if let Some(on) = distinct_on {
            plan = PhysicalPlan::DistinctOn(DistinctOnNode {
                on,
                input: Box::new(plan),
            });
        }

        if !select.limit.is_empty() {
            let limit = match &select.limit.limit {
                Some(expr) => Some(constant_value(expr)?.try_as_usize()?),
                None => None,
            };
            let offset = match &select.limit.offset {
                Some(expr) => constant_value(expr)?.try_as_usize()?,
                None => 0,
            };
            plan = PhysicalPlan::Limit(LimitNode {
                limit,
                offset,
                input: Box::new(plan),
            });
        }

        debug!(table = %from.table, "planned select");
        Ok(plan)
    }

    fn plan_aggregate(
        &self,
        select: &SelectNode,
        group_exprs: &[&Expr],
        sites: &[AggregateCallSite],
        source: &Schema,
        input: PhysicalPlan,
    ) -> Result<AggregateNode> {
        let binder = ExprBinder::new(self.resolver, source, "GROUP BY");
        let bound_groups = group_exprs
            .iter()
            .map(|expr| binder.bind(expr))
            .collect::<Result<Vec<_>>>()?;
        let group_names = group_exprs
            .iter()
            .enumerate()
            .map(|(idx, expr)| match expr_output_name(expr) {
                name if name == UNNAMED_COLUMN => format!("group_{idx}"),
                name => name,
            })
            .collect();

        let grouping_sets = expand_grouping_sets(&select.group_by, group_exprs)?;

        let binder = ExprBinder::new(self.resolver, source, "aggregate arguments");
        let aggregates = sites
            .iter()
            .map(|site| self.plan_aggregate_call(site, &binder))
            .collect::<Result<Vec<_>>>()?;

        let needs_sort = aggregates.iter().any(|agg| agg.needs_sort_buffer());
        let strategy = if self.config.hash_aggregate_enabled && !needs_sort {
            AggregateStrategy::Hashed
        } else {
            AggregateStrategy::Sorted {
                phases: plan_phases(&grouping_sets),
            }
        };

        let mut input = input;
        if let AggregateStrategy::Sorted { phases } = &strategy {
            if let Some(first) = phases.first().filter(|p| !p.sort_order.is_empty()) {
                let keys = first
                    .sort_order
                    .iter()
                    .map(|idx| PhysicalSortExpr {
                        expr: bound_groups[*idx].clone(),
                        desc: false,
                        nulls_first: false,
                    })
                    .collect();
                input = PhysicalPlan::Sort(SortNode {
                    keys,
                    input: Box::new(input),
                });
            }
        }

        Ok(AggregateNode {
            group_exprs: bound_groups,
            group_names,
            grouping_sets,
            aggregates,
            strategy,
            input: Box::new(input),
        })
    }

    fn plan_aggregate_call(&self, site: &AggregateCallSite, binder: &ExprBinder) -> Result<PhysicalAggregate> {
        let filter = site.filter.as_ref().map(|f| binder.bind(f)).transpose()?;

        match site.kind {
            CallSiteKind::Window => not_implemented!("window function {}", site.name),
            CallSiteKind::Combine => {
                let input = binder.bind(&site.args[0])?;
                let state = input
                    .as_column()
                    .and_then(|col| binder.schema().fields.get(col.idx))
                    .and_then(|field| field.state_of)
                    .ok_or_else(|| {
                        DbError::new("combine expects a column of aggregate states")
                            .with_field("argument", site.args[0].to_string())
                    })?;
                let descriptor = self.resolver.require_combinable(state.aggregate)?;

                Ok(PhysicalAggregate {
                    name: descriptor.name.clone(),
                    args: vec![input],
                    direct_args: Vec::new(),
                    distinct: false,
                    order_by: Vec::new(),
                    filter,
                    split: AggregateSplit::combining(&descriptor, state.serialized),
                    worker_args: Vec::new(),
                    input_types: descriptor.arg_types.clone(),
                    descriptor,
                })
            }
            CallSiteKind::Normal | CallSiteKind::OrderedSet | CallSiteKind::Hypothetical => {
                let direct_args = site
                    .direct_args
                    .iter()
                    .map(|arg| binder.bind(arg))
                    .collect::<Result<Vec<_>>>()?;
                let args = if site.star {
                    Vec::new()
                } else {
                    site.args
                        .iter()
                        .map(|arg| binder.bind(arg))
                        .collect::<Result<Vec<_>>>()?
                };
                let input_types: Vec<_> = direct_args
                    .iter()
                    .chain(&args)
                    .map(|arg| arg.datatype())
                    .collect();

                let descriptor = self.resolver.resolve_by_name(&site.name, &input_types)?;
                if descriptor.num_direct_args != direct_args.len() {
                    return Err(DbError::new(format!(
                        "{} expects {} direct argument(s), got {}",
                        site.name,
                        descriptor.num_direct_args,
                        direct_args.len()
                    )));
                }

                if site.distinct
                    && site
                        .order_by
                        .iter()
                        .any(|o| !site.args.iter().any(|a| a.unnested() == o.expr.unnested()))
                {
                    return Err(DbError::new(
                        "In an aggregate with DISTINCT, ORDER BY expressions must appear in the argument list",
                    ));
                }

                let order_by = site
                    .order_by
                    .iter()
                    .map(|o| {
                        Ok(PhysicalSortExpr {
                            expr: binder.bind(&o.expr)?,
                            desc: o.desc,
                            nulls_first: o.nulls_first(),
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;

                Ok(PhysicalAggregate {
                    name: site.name.clone(),
                    args,
                    direct_args,
                    distinct: site.distinct,
                    order_by,
                    filter,
                    split: AggregateSplit::SINGLE,
                    worker_args: Vec::new(),
                    input_types,
                    descriptor,
                })
            }
        }
    }
}

/// Expand wildcards, pairing each projection with its output name.
fn expand_projections(select: &SelectNode, source: &Schema) -> Vec<(Expr, String)> {
    let mut out = Vec::with_capacity(select.projections.len());
    for proj in &select.projections {
        match proj {
            SelectExpr::Wildcard => {
                out.extend(source.names().map(|name| (Expr::column(name), name.to_string())));
            }
            SelectExpr::Expr(expr) | SelectExpr::AliasedExpr(expr, _) => {
                out.push((expr.clone(), output_name(proj)));
            }
        }
    }
    out
}

/// Bind a modifier expression against the output of the projection,
/// supporting 1-based ordinals.
fn bind_output_ref(binder: &ExprBinder, expr: &Expr) -> Result<PhysicalExpr> {
    if let Expr::Literal(Literal::Number(n)) = expr.unnested() {
        let ordinal: usize = n.parse()?;
        let schema = binder.schema();
        return match ordinal.checked_sub(1).and_then(|idx| schema.fields.get(idx).map(|f| (idx, f))) {
            Some((idx, field)) => Ok(PhysicalExpr::column(idx, field.name.clone(), field.datatype.clone())),
            None => Err(DbError::new(format!("Position {ordinal} is not in the select list"))),
        };
    }
    binder.bind(expr)
}
