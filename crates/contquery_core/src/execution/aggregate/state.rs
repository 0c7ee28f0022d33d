use contquery_error::{OptionExt, Result, ResultExt};

use super::arena::{StateHandle, TransitionArena};
use super::sort_buffer::SortBuffer;
use crate::arrays::field::Row;
use crate::arrays::scalar::ScalarValue;
use crate::execution::ExecutionContext;
use crate::expr::aggregate::PhysicalAggregate;
use crate::functions::aggregate::TransitionValue;

/// Transition bookkeeping for one aggregate in one group.
#[derive(Debug, Clone, Copy)]
pub struct PerGroupTransitionState {
    pub handle: StateHandle,
    /// A strict aggregate without an initial value hasn't seen a non-null
    /// input yet. The first such input becomes the state.
    pub no_value_yet: bool,
}

#[derive(Debug)]
struct AggregateGroupState {
    transition: PerGroupTransitionState,
    /// Direct arguments, taken from the first row of the group.
    direct: Option<Vec<ScalarValue>>,
    buffer: Option<SortBuffer>,
}

/// States of every aggregate for a single group.
#[derive(Debug)]
pub struct GroupAggregates {
    states: Vec<AggregateGroupState>,
}

impl GroupAggregates {
    pub fn new(aggs: &[PhysicalAggregate], arena: &mut TransitionArena) -> Self {
        let states = aggs
            .iter()
            .map(|agg| {
                let (value, no_value_yet) = agg.descriptor.new_transition_value();
                AggregateGroupState {
                    transition: PerGroupTransitionState {
                        handle: arena.alloc(value),
                        no_value_yet,
                    },
                    direct: None,
                    buffer: agg.needs_sort_buffer().then(SortBuffer::new),
                }
            })
            .collect();
        GroupAggregates { states }
    }

    /// Feed one input row to every aggregate.
    pub fn update(
        &mut self,
        aggs: &[PhysicalAggregate],
        arena: &mut TransitionArena,
        row: &Row,
        ctx: &ExecutionContext,
    ) -> Result<()> {
        for (agg, state) in aggs.iter().zip(self.states.iter_mut()) {
            if state.direct.is_none() && !agg.direct_args.is_empty() {
                state.direct = Some(
                    agg.direct_args
                        .iter()
                        .map(|arg| arg.eval(row, ctx))
                        .collect::<Result<Vec<_>>>()?,
                );
            }

            if let Some(filter) = &agg.filter {
                if !filter.eval_predicate(row, ctx)? {
                    continue;
                }
            }

            let args = agg
                .args
                .iter()
                .map(|arg| arg.eval(row, ctx))
                .collect::<Result<Vec<_>>>()?;

            match state.buffer.as_mut() {
                Some(buffer) => {
                    let keys = agg
                        .order_by
                        .iter()
                        .map(|key| key.expr.eval(row, ctx))
                        .collect::<Result<Vec<_>>>()?;
                    buffer.push(keys, args);
                }
                None => advance(agg, &mut state.transition, arena, args)?,
            }
        }
        Ok(())
    }

    /// Flush buffered inputs and produce the output value of every
    /// aggregate, releasing the group's states.
    pub fn finish(self, aggs: &[PhysicalAggregate], arena: &mut TransitionArena) -> Result<Vec<ScalarValue>> {
        let mut out = Vec::with_capacity(aggs.len());
        for (agg, mut state) in aggs.iter().zip(self.states) {
            if let Some(buffer) = state.buffer.take() {
                for args in buffer.into_sorted_args(&agg.order_by, agg.distinct) {
                    advance(agg, &mut state.transition, arena, args)?;
                }
            }
            let value = arena.take(state.transition.handle)?;
            let direct = state
                .direct
                .unwrap_or_else(|| vec![ScalarValue::Null; agg.direct_args.len()]);
            out.push(finalize_value(agg, value, &direct)?);
        }
        Ok(out)
    }
}

/// Apply one row of arguments to a transition state.
pub fn advance(
    agg: &PhysicalAggregate,
    state: &mut PerGroupTransitionState,
    arena: &mut TransitionArena,
    args: Vec<ScalarValue>,
) -> Result<()> {
    let desc = &agg.descriptor;
    let value = arena.get_mut(state.handle)?;

    if agg.split.combine_input {
        let input = args.into_iter().next().required("partial state input")?;
        if input.is_null() {
            return Ok(());
        }
        let other = if agg.split.deserialize_input {
            desc.behavior
                .deserialize(&input)
                .context_fn(|| format!("Failed to deserialize state for {}", desc.name))?
        } else {
            TransitionValue::Datum(input)
        };
        if state.no_value_yet || value.is_null() {
            *value = other;
            state.no_value_yet = false;
            return Ok(());
        }
        return desc.behavior.combine(value, other);
    }

    if desc.strict {
        if args.iter().any(|arg| arg.is_null()) {
            return Ok(());
        }
        if state.no_value_yet && !desc.needs_serialization() {
            let first = args.into_iter().next().required("first aggregate argument")?;
            *value = TransitionValue::Datum(first.cast_to(&desc.state_storage_type())?);
            state.no_value_yet = false;
            return Ok(());
        }
        // A strict transition that produced null stays null.
        if value.is_null() && !state.no_value_yet {
            return Ok(());
        }
    }

    desc.behavior.transition(value, &args)?;
    state.no_value_yet = false;
    Ok(())
}

/// Produce the value emitted for a finished state.
pub fn finalize_value(
    agg: &PhysicalAggregate,
    value: TransitionValue,
    direct: &[ScalarValue],
) -> Result<ScalarValue> {
    let desc = &agg.descriptor;

    if agg.split.skip_finalize {
        if agg.split.serialize_output {
            return desc.behavior.serialize(&value);
        }
        return Ok(value.as_datum()?.clone());
    }

    if desc.finalize_fn.is_none() {
        return Ok(value.as_datum()?.clone());
    }
    if desc.finalize_strict && (value.is_null() || direct.iter().any(|v| v.is_null())) {
        return Ok(ScalarValue::Null);
    }
    desc.behavior.finalize(&value, direct)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::arrays::datatype::DataType;
    use crate::catalog::AggregateCatalog;
    use crate::catalog::resolver::CombineInfoResolver;
    use crate::expr::PhysicalExpr;
    use crate::expr::aggregate::AggregateSplit;

    fn aggregate(name: &str, datatype: DataType) -> PhysicalAggregate {
        let resolver = CombineInfoResolver::new(Arc::new(AggregateCatalog::with_builtins().unwrap()));
        let descriptor = resolver.resolve_by_name(name, &[datatype.clone()]).unwrap();
        PhysicalAggregate {
            descriptor,
            name: name.to_string(),
            args: vec![PhysicalExpr::column(0, "x", datatype.clone())],
            direct_args: Vec::new(),
            distinct: false,
            order_by: Vec::new(),
            filter: None,
            split: AggregateSplit::SINGLE,
            worker_args: Vec::new(),
            input_types: vec![datatype],
        }
    }

    fn run(agg: &PhysicalAggregate, inputs: &[ScalarValue]) -> ScalarValue {
        let aggs = std::slice::from_ref(agg);
        let mut arena = TransitionArena::new();
        let mut group = GroupAggregates::new(aggs, &mut arena);
        let ctx = ExecutionContext::new(0);
        for input in inputs {
            group.update(aggs, &mut arena, &vec![input.clone()], &ctx).unwrap();
        }
        let out = group.finish(aggs, &mut arena).unwrap();
        assert_eq!(0, arena.live());
        out[0].clone()
    }

    #[test]
    fn strict_transition_skips_nulls() {
        let agg = aggregate("sum", DataType::Int64);
        let with_nulls = [
            ScalarValue::Null,
            ScalarValue::Null,
            ScalarValue::Int64(5),
            ScalarValue::Null,
            ScalarValue::Int64(7),
        ];
        let without = [ScalarValue::Int64(5), ScalarValue::Int64(7)];
        assert_eq!(run(&agg, &without), run(&agg, &with_nulls));
        assert_eq!(ScalarValue::Int64(12), run(&agg, &with_nulls));
    }

    #[test]
    fn strict_all_null_is_null() {
        let agg = aggregate("max", DataType::Int64);
        assert_eq!(ScalarValue::Null, run(&agg, &[ScalarValue::Null, ScalarValue::Null]));
        assert_eq!(ScalarValue::Null, run(&agg, &[]));
    }

    #[test]
    fn combine_mode_skips_null_states() {
        let mut agg = aggregate("sum", DataType::Int64);
        agg.split = AggregateSplit::combining(&agg.descriptor, false);
        let states = [ScalarValue::Int64(3), ScalarValue::Null, ScalarValue::Int64(4)];
        assert_eq!(ScalarValue::Int64(7), run(&agg, &states));
    }
}
