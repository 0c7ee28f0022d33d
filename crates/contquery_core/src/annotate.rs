//! Marking of worker and combiner plans.
//!
//! The worker's aggregate node emits partial states instead of final values.
//! The combiner's aggregate node merges those states, and each of its
//! aggregates is linked to the worker aggregate producing its input.
use contquery_error::{DbError, ErrorKind, Result};
use tracing::debug;

use crate::expr::PhysicalExpr;
use crate::expr::aggregate::{AggregateRole, AggregateSplit};
use crate::planner::plan::{AggregateNode, PhysicalPlan};

fn shape_mismatch(msg: impl Into<String>) -> DbError {
    DbError::new(msg).with_kind(ErrorKind::ShapeMismatch)
}

/// Mark the worker's aggregates as producing partial states.
///
/// Plans without an aggregate node are left as is.
pub fn annotate_worker(plan: &mut PhysicalPlan) -> Result<()> {
    let node = match plan.find_aggregate_mut() {
        Some(node) => node,
        None => return Ok(()),
    };

    for agg in &mut node.aggregates {
        if agg.split.role != AggregateRole::Single || agg.split.combine_input {
            return Err(shape_mismatch("Worker plan is already annotated")
                .with_field("aggregate", agg.to_string()));
        }
        if !agg.descriptor.is_combinable() {
            return Err(DbError::new(format!(
                "Aggregate {} can't be used in a continuous view, it has no combine function",
                agg.descriptor.name
            ))
            .with_kind(ErrorKind::AggregateNotCombinable));
        }
        agg.split = AggregateSplit {
            role: AggregateRole::Worker,
            combine_input: false,
            deserialize_input: false,
            skip_finalize: true,
            serialize_output: agg.descriptor.needs_serialization(),
        };
    }

    debug!(aggregates = node.aggregates.len(), "annotated worker plan");
    Ok(())
}

/// Link the combiner's aggregates to the worker aggregates producing their
/// input states.
///
/// Each combiner aggregate reads a column of the worker's output. That
/// column must be a plain reference to a worker aggregate of the same
/// function.
pub fn annotate_combiner(combiner: &mut PhysicalPlan, worker: &PhysicalPlan) -> Result<()> {
    let worker_node = worker.find_aggregate();
    let worker_project = worker.find_project();
    let combiner_node = combiner.find_aggregate_mut();

    let (combiner_node, worker_node) = match (combiner_node, worker_node) {
        (Some(c), Some(w)) => (c, w),
        (None, None) => return Ok(()),
        (Some(_), None) => return Err(shape_mismatch("Combiner aggregates but worker doesn't")),
        (None, Some(_)) => return Err(shape_mismatch("Worker aggregates but combiner doesn't")),
    };

    if combiner_node.aggregates.len() != worker_node.aggregates.len() {
        return Err(shape_mismatch("Worker and combiner aggregate counts differ")
            .with_field("worker", worker_node.aggregates.len())
            .with_field("combiner", combiner_node.aggregates.len()));
    }

    for agg in &mut combiner_node.aggregates {
        if agg.split.role != AggregateRole::Single || !agg.split.combine_input {
            return Err(shape_mismatch("Combiner aggregate doesn't combine partial states")
                .with_field("aggregate", agg.to_string()));
        }

        let worker_idx = worker_aggregate_index(agg.args.first(), worker_node, worker_project.map(|p| &p.exprs))?;
        let worker_agg = &worker_node.aggregates[worker_idx];

        if worker_agg.descriptor.id != agg.descriptor.id {
            return Err(shape_mismatch("Combiner aggregate differs from worker aggregate")
                .with_field("worker", worker_agg.descriptor.name.clone())
                .with_field("combiner", agg.descriptor.name.clone()));
        }
        if worker_agg.split.role != AggregateRole::Worker {
            return Err(shape_mismatch("Worker plan must be annotated before the combiner"));
        }
        if worker_agg.split.serialize_output != agg.split.deserialize_input {
            return Err(shape_mismatch("Worker state serialization disagrees with combiner")
                .with_field("aggregate", agg.descriptor.name.clone()));
        }

        agg.split.role = AggregateRole::Combiner;
        agg.worker_args = worker_agg.args.clone();
    }

    check_unique_sources(combiner_node)?;
    debug!(aggregates = combiner_node.aggregates.len(), "annotated combiner plan");
    Ok(())
}

/// Follow a combiner input column through the worker's projection back to
/// the worker aggregate computing it.
fn worker_aggregate_index(
    input: Option<&PhysicalExpr>,
    worker: &AggregateNode,
    worker_projection: Option<&Vec<PhysicalExpr>>,
) -> Result<usize> {
    let input = input
        .and_then(|expr| expr.as_column())
        .ok_or_else(|| shape_mismatch("Combiner aggregate input isn't a column"))?;

    // Without a projection the worker output is the aggregate node output.
    let agg_output_idx = match worker_projection {
        Some(exprs) => exprs
            .get(input.idx)
            .and_then(|expr| expr.as_column())
            .map(|col| col.idx)
            .ok_or_else(|| {
                shape_mismatch("Worker output column isn't a plain aggregate reference")
                    .with_field("column", input.name.clone())
            })?,
        None => input.idx,
    };

    agg_output_idx
        .checked_sub(worker.group_exprs.len())
        .filter(|idx| *idx < worker.aggregates.len())
        .ok_or_else(|| {
            shape_mismatch("Combiner input doesn't refer to a worker aggregate")
                .with_field("column", input.name.clone())
        })
}

fn check_unique_sources(node: &AggregateNode) -> Result<()> {
    let mut seen: Vec<usize> = Vec::with_capacity(node.aggregates.len());
    for agg in &node.aggregates {
        if let Some(col) = agg.args.first().and_then(|a| a.as_column()) {
            if seen.contains(&col.idx) {
                return Err(shape_mismatch("Two combiner aggregates read the same worker state")
                    .with_field("column", col.name.clone()));
            }
            seen.push(col.idx);
        }
    }
    Ok(())
}
