//! Aggregate execution.
//!
//! The operator drains its input, evaluating group expressions once per row,
//! then runs either the sorted or the hashed strategy over the buffered rows.
//! Transition states for all aggregates of a group live in a shared
//! `TransitionArena`.
//!
//! A batch is applied atomically by the caller: if the operator fails, its
//! output is discarded as a whole and later polls return the same error.
pub mod arena;
pub mod hashed;
pub mod sort_buffer;
pub mod sorted;
pub mod state;

use contquery_error::{DbError, Result};
use tracing::debug;

use self::hashed::HashedAggregator;
use self::sorted::SortedAggregator;
use super::{ExecutionContext, RowSource};
use crate::arrays::field::Row;
use crate::arrays::scalar::ScalarValue;
use crate::planner::plan::{AggregateNode, AggregateStrategy};

/// An input row along with its evaluated group values.
#[derive(Debug, Clone)]
pub struct GroupedRow {
    pub groups: Vec<ScalarValue>,
    pub row: Row,
}

#[derive(Debug)]
enum OperatorState {
    Pending,
    Emitting(std::vec::IntoIter<Row>),
    /// Execution failed, the error is returned for every subsequent poll.
    Poisoned(DbError),
}

#[derive(Debug)]
pub struct PhysicalAggregateOperator {
    node: AggregateNode,
    input: Box<dyn RowSource>,
    state: OperatorState,
}

impl PhysicalAggregateOperator {
    pub fn try_new(node: &AggregateNode, input: Box<dyn RowSource>) -> Result<Self> {
        if node.strategy == AggregateStrategy::Hashed {
            if let Some(agg) = node.aggregates.iter().find(|agg| agg.needs_sort_buffer()) {
                return Err(DbError::new(
                    "Hash aggregation can't be used with DISTINCT or ordered aggregate inputs",
                )
                .with_field("aggregate", agg.to_string()));
            }
        }

        Ok(PhysicalAggregateOperator {
            node: node.clone(),
            input,
            state: OperatorState::Pending,
        })
    }

    fn compute(&mut self, ctx: &ExecutionContext) -> Result<Vec<Row>> {
        let mut input = Vec::new();
        while let Some(row) = self.input.poll_next_row(ctx)? {
            let groups = self
                .node
                .group_exprs
                .iter()
                .map(|expr| expr.eval(&row, ctx))
                .collect::<Result<Vec<_>>>()?;
            input.push(GroupedRow { groups, row });
        }

        let num_input = input.len();
        let rows = match &self.node.strategy {
            AggregateStrategy::Sorted { phases } => SortedAggregator::new(&self.node).execute(phases, input, ctx)?,
            AggregateStrategy::Hashed => HashedAggregator::new(&self.node).execute(input, ctx)?,
        };
        debug!(input = num_input, output = rows.len(), "aggregated rows");

        Ok(rows)
    }
}

impl RowSource for PhysicalAggregateOperator {
    fn poll_next_row(&mut self, ctx: &ExecutionContext) -> Result<Option<Row>> {
        if matches!(self.state, OperatorState::Pending) {
            match self.compute(ctx) {
                Ok(rows) => self.state = OperatorState::Emitting(rows.into_iter()),
                Err(err) => {
                    self.state = OperatorState::Poisoned(err.duplicate());
                    return Err(err);
                }
            }
        }

        match &mut self.state {
            OperatorState::Emitting(rows) => Ok(rows.next()),
            OperatorState::Poisoned(err) => Err(err.duplicate()),
            OperatorState::Pending => Err(DbError::new("Aggregate operator polled before computing")),
        }
    }
}
