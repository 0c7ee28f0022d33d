use std::cmp::Ordering;

use contquery_error::Result;
use tracing::trace;

use super::GroupedRow;
use super::arena::TransitionArena;
use super::state::GroupAggregates;
use crate::arrays::field::Row;
use crate::arrays::scalar::{ScalarValue, sort_cmp};
use crate::execution::ExecutionContext;
use crate::planner::plan::{AggregateNode, GroupingPhase};

/// Aggregation over input sorted by group values.
///
/// Every grouping set in a phase is a prefix of the phase's sort order, so a
/// change in the sort key at position `p` completes the open group of every
/// set longer than `p`. Those groups are emitted most specific first and
/// restarted.
#[derive(Debug)]
pub struct SortedAggregator<'a> {
    node: &'a AggregateNode,
    arena: TransitionArena,
}

/// Open group for one set of a phase.
#[derive(Debug)]
struct OpenGroup {
    /// Group values of the first row in the group.
    groups: Vec<ScalarValue>,
    aggregates: GroupAggregates,
}

impl<'a> SortedAggregator<'a> {
    pub fn new(node: &'a AggregateNode) -> Self {
        SortedAggregator {
            node,
            arena: TransitionArena::new(),
        }
    }

    pub fn execute(
        mut self,
        phases: &[GroupingPhase],
        mut input: Vec<GroupedRow>,
        ctx: &ExecutionContext,
    ) -> Result<Vec<Row>> {
        let mut out = Vec::new();
        for (phase_idx, phase) in phases.iter().enumerate() {
            // The first phase's order is established by the input.
            if phase_idx > 0 {
                sort_by_phase(phase, &mut input);
            }
            self.execute_phase(phase, &input, ctx, &mut out)?;
        }
        Ok(out)
    }

    fn execute_phase(
        &mut self,
        phase: &GroupingPhase,
        input: &[GroupedRow],
        ctx: &ExecutionContext,
        out: &mut Vec<Row>,
    ) -> Result<()> {
        let node = self.node;
        let aggs = &node.aggregates;
        let mut open: Vec<Option<OpenGroup>> = phase.sets.iter().map(|_| None).collect();
        let mut prev_key: Option<Vec<&ScalarValue>> = None;

        for grouped in input {
            ctx.cancel.check()?;

            let key: Vec<&ScalarValue> = phase.sort_order.iter().map(|idx| &grouped.groups[*idx]).collect();
            if let Some(prev) = &prev_key {
                if let Some(pos) = prev.iter().zip(&key).position(|(a, b)| a != b) {
                    for (set_pos, set) in phase.sets.iter().enumerate() {
                        if set.prefix_len > pos {
                            if let Some(group) = open[set_pos].take() {
                                out.push(self.emit(set.set_idx, group)?);
                            }
                        }
                    }
                }
            }

            for slot in open.iter_mut() {
                let arena = &mut self.arena;
                let group = slot.get_or_insert_with(|| OpenGroup {
                    groups: grouped.groups.clone(),
                    aggregates: GroupAggregates::new(aggs, arena),
                });
                group.aggregates.update(aggs, &mut self.arena, &grouped.row, ctx)?;
            }
            prev_key = Some(key);
        }

        for (set_pos, set) in phase.sets.iter().enumerate() {
            match open[set_pos].take() {
                Some(group) => out.push(self.emit(set.set_idx, group)?),
                // The empty set produces a row even without any input.
                None if set.prefix_len == 0 => {
                    let group = OpenGroup {
                        groups: vec![ScalarValue::Null; node.group_exprs.len()],
                        aggregates: GroupAggregates::new(aggs, &mut self.arena),
                    };
                    out.push(self.emit(set.set_idx, group)?);
                }
                None => (),
            }
        }

        Ok(())
    }

    fn emit(&mut self, set_idx: usize, group: OpenGroup) -> Result<Row> {
        trace!(set_idx, "emitting sorted group");
        let node = self.node;
        let set = &node.grouping_sets[set_idx];
        let mut row: Row = group
            .groups
            .into_iter()
            .enumerate()
            .map(|(idx, value)| if set.contains(&idx) { value } else { ScalarValue::Null })
            .collect();
        row.extend(group.aggregates.finish(&node.aggregates, &mut self.arena)?);
        Ok(row)
    }
}

fn sort_by_phase(phase: &GroupingPhase, input: &mut [GroupedRow]) {
    input.sort_by(|a, b| {
        for idx in &phase.sort_order {
            match sort_cmp(&a.groups[*idx], &b.groups[*idx], false, false) {
                Ordering::Equal => continue,
                other => return other,
            }
        }
        Ordering::Equal
    });
}
