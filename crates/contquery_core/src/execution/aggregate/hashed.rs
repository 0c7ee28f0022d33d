use contquery_error::Result;
use hashbrown::HashMap;

use super::GroupedRow;
use super::arena::TransitionArena;
use super::state::GroupAggregates;
use crate::arrays::field::Row;
use crate::arrays::scalar::ScalarValue;
use crate::execution::ExecutionContext;
use crate::planner::plan::{AggregateNode, GroupingSet};

/// Groups for one grouping set, in first-seen order.
#[derive(Debug, Default)]
struct GroupingSetTable {
    /// Group key to index in `groups`.
    index: HashMap<Vec<ScalarValue>, usize>,
    groups: Vec<(Vec<ScalarValue>, GroupAggregates)>,
}

/// Aggregation with a hash table per grouping set.
///
/// Input order doesn't matter. Output for each set is in order of first
/// appearance of its groups.
#[derive(Debug)]
pub struct HashedAggregator<'a> {
    node: &'a AggregateNode,
    arena: TransitionArena,
    tables: Vec<GroupingSetTable>,
}

impl<'a> HashedAggregator<'a> {
    pub fn new(node: &'a AggregateNode) -> Self {
        HashedAggregator {
            node,
            arena: TransitionArena::new(),
            tables: node.grouping_sets.iter().map(|_| GroupingSetTable::default()).collect(),
        }
    }

    pub fn execute(mut self, input: Vec<GroupedRow>, ctx: &ExecutionContext) -> Result<Vec<Row>> {
        let node = self.node;
        let aggs = &node.aggregates;

        for grouped in &input {
            ctx.cancel.check()?;
            for (set, table) in node.grouping_sets.iter().zip(self.tables.iter_mut()) {
                let key = group_key(set, &grouped.groups);
                let idx = match table.index.get(&key) {
                    Some(idx) => *idx,
                    None => {
                        let idx = table.groups.len();
                        table.index.insert(key, idx);
                        table
                            .groups
                            .push((grouped.groups.clone(), GroupAggregates::new(aggs, &mut self.arena)));
                        idx
                    }
                };
                table.groups[idx].1.update(aggs, &mut self.arena, &grouped.row, ctx)?;
            }
        }

        let mut out = Vec::new();
        for (set, table) in node.grouping_sets.iter().zip(std::mem::take(&mut self.tables)) {
            if table.groups.is_empty() && set.is_empty() {
                let empty = GroupAggregates::new(aggs, &mut self.arena);
                let mut row = vec![ScalarValue::Null; node.group_exprs.len()];
                row.extend(empty.finish(aggs, &mut self.arena)?);
                out.push(row);
                continue;
            }
            for (groups, aggregates) in table.groups {
                let mut row: Row = groups
                    .into_iter()
                    .enumerate()
                    .map(|(idx, value)| if set.contains(&idx) { value } else { ScalarValue::Null })
                    .collect();
                row.extend(aggregates.finish(aggs, &mut self.arena)?);
                out.push(row);
            }
        }
        Ok(out)
    }
}

fn group_key(set: &GroupingSet, groups: &[ScalarValue]) -> Vec<ScalarValue> {
    set.iter().map(|idx| groups[*idx].clone()).collect()
}
