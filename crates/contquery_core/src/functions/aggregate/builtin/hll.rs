use contquery_error::Result;

use super::{
    BuiltinAggregate, combine_sketch, first_arg, merge_sketch_arg, sketch_from_value, sketch_to_value,
};
use crate::arrays::datatype::DataType;
use crate::arrays::scalar::ScalarValue;
use crate::catalog::{
    AggregateDefinition, CombinerDefinition, FunctionDef, ReturnType, StateType,
};
use crate::functions::aggregate::{AggregateBehavior, TransitionValue};
use crate::functions::documentation::{Category, Documentation, Example};
use crate::statistics::hyperloglog::HyperLogLog;

static HLL_COUNT_DISTINCT_DOC: Documentation = Documentation {
    category: Category::APPROXIMATE_AGGREGATE,
    description: "Approximate number of distinct non-NULL inputs using HyperLogLog.",
    arguments: &["input"],
    example: None,
};

static HLL_AGG_DOC: Documentation = Documentation {
    category: Category::APPROXIMATE_AGGREGATE,
    description: "Build a HyperLogLog sketch of the non-NULL inputs. Read it with hll_cardinality.",
    arguments: &["input"],
    example: Some(Example {
        example: "hll_cardinality(hll_agg(user_id))",
        output: "1024",
    }),
};

static HLL_UNION_AGG_DOC: Documentation = Documentation {
    category: Category::APPROXIMATE_AGGREGATE,
    description: "Union HyperLogLog sketches built by hll_agg.",
    arguments: &["sketch"],
    example: None,
};

fn hll_combiner() -> CombinerDefinition {
    CombinerDefinition::new(FunctionDef::strict("hll_union_agg"), StateType::Internal)
        .with_serialization(FunctionDef::strict("hll_send"), FunctionDef::strict("hll_recv"))
}

pub fn definitions() -> Vec<BuiltinAggregate> {
    vec![
        (
            AggregateDefinition::new(
                "hll_agg",
                vec![DataType::Any],
                FunctionDef::non_strict("hll_agg_trans"),
                StateType::Internal,
                &HllAgg,
            )
            .with_finalize(FunctionDef::strict("hll_out"), ReturnType::Fixed(DataType::Binary))
            .with_doc(&HLL_AGG_DOC),
            Some(hll_combiner()),
        ),
        (
            AggregateDefinition::new(
                "hll_union_agg",
                vec![DataType::Binary],
                FunctionDef::non_strict("hll_union_agg_trans"),
                StateType::Internal,
                &HllUnionAgg,
            )
            .with_finalize(FunctionDef::strict("hll_out"), ReturnType::Fixed(DataType::Binary))
            .with_doc(&HLL_UNION_AGG_DOC),
            Some(hll_combiner()),
        ),
        hll_count_distinct(),
    ]
}

fn hll_count_distinct() -> BuiltinAggregate {
    (
        AggregateDefinition::new(
            "hll_count_distinct",
            vec![DataType::Any],
            FunctionDef::non_strict("hll_count_distinct_transfn"),
            StateType::Internal,
            &HllCountDistinct,
        )
        .with_finalize(
            FunctionDef::strict("hll_cardinality"),
            ReturnType::Fixed(DataType::Int64),
        )
        .with_doc(&HLL_COUNT_DISTINCT_DOC),
        Some(hll_combiner()),
    )
}

fn merge_hll(hll: &mut HyperLogLog, other: &HyperLogLog) -> Result<()> {
    hll.merge(other);
    Ok(())
}

/// `hll_agg(x)`, the sketch itself as the result.
#[derive(Debug, Clone, Copy)]
pub struct HllAgg;

impl AggregateBehavior for HllAgg {
    fn initial_state(&self) -> Option<TransitionValue> {
        Some(TransitionValue::internal(HyperLogLog::new()))
    }

    fn transition(&self, state: &mut TransitionValue, args: &[ScalarValue]) -> Result<()> {
        HllCountDistinct.transition(state, args)
    }

    fn combine(&self, state: &mut TransitionValue, other: TransitionValue) -> Result<()> {
        HllCountDistinct.combine(state, other)
    }

    fn finalize(&self, state: &TransitionValue, _direct_args: &[ScalarValue]) -> Result<ScalarValue> {
        sketch_to_value::<HyperLogLog>(state)
    }

    fn serialize(&self, state: &TransitionValue) -> Result<ScalarValue> {
        sketch_to_value::<HyperLogLog>(state)
    }

    fn deserialize(&self, value: &ScalarValue) -> Result<TransitionValue> {
        sketch_from_value::<HyperLogLog>(value)
    }
}

/// `hll_union_agg(sketch)`, null until a non-null sketch is seen.
#[derive(Debug, Clone, Copy)]
pub struct HllUnionAgg;

impl AggregateBehavior for HllUnionAgg {
    fn transition(&self, state: &mut TransitionValue, args: &[ScalarValue]) -> Result<()> {
        merge_sketch_arg(state, args, merge_hll)
    }

    fn combine(&self, state: &mut TransitionValue, other: TransitionValue) -> Result<()> {
        combine_sketch(state, other, merge_hll)
    }

    fn finalize(&self, state: &TransitionValue, _direct_args: &[ScalarValue]) -> Result<ScalarValue> {
        sketch_to_value::<HyperLogLog>(state)
    }

    fn serialize(&self, state: &TransitionValue) -> Result<ScalarValue> {
        sketch_to_value::<HyperLogLog>(state)
    }

    fn deserialize(&self, value: &ScalarValue) -> Result<TransitionValue> {
        sketch_from_value::<HyperLogLog>(value)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HllCountDistinct;

impl AggregateBehavior for HllCountDistinct {
    fn initial_state(&self) -> Option<TransitionValue> {
        Some(TransitionValue::internal(HyperLogLog::new()))
    }

    fn transition(&self, state: &mut TransitionValue, args: &[ScalarValue]) -> Result<()> {
        let value = first_arg(args)?;
        if value.is_null() {
            return Ok(());
        }
        state.internal_or_init(HyperLogLog::new)?.insert(value);
        Ok(())
    }

    fn combine(&self, state: &mut TransitionValue, other: TransitionValue) -> Result<()> {
        combine_sketch(state, other, merge_hll)
    }

    fn finalize(&self, state: &TransitionValue, _direct_args: &[ScalarValue]) -> Result<ScalarValue> {
        let hll = state.downcast_ref::<HyperLogLog>()?;
        Ok(ScalarValue::Int64(hll.cardinality() as i64))
    }

    fn serialize(&self, state: &TransitionValue) -> Result<ScalarValue> {
        sketch_to_value::<HyperLogLog>(state)
    }

    fn deserialize(&self, value: &ScalarValue) -> Result<TransitionValue> {
        sketch_from_value::<HyperLogLog>(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sketch_of(values: std::ops::Range<i64>) -> ScalarValue {
        let mut state = HllAgg.initial_state().unwrap();
        for v in values {
            HllAgg.transition(&mut state, &[ScalarValue::Int64(v)]).unwrap();
        }
        HllAgg.finalize(&state, &[]).unwrap()
    }

    fn cardinality(sketch: &ScalarValue) -> u64 {
        HyperLogLog::from_bytes(sketch.try_as_binary().unwrap())
            .unwrap()
            .cardinality()
    }

    #[test]
    fn hll_agg_partials_combine() {
        let mut a = HllAgg.initial_state().unwrap();
        let mut b = HllAgg.initial_state().unwrap();
        for v in 0..40 {
            HllAgg.transition(&mut a, &[ScalarValue::Int64(v)]).unwrap();
        }
        for v in 30..60 {
            HllAgg.transition(&mut b, &[ScalarValue::Int64(v)]).unwrap();
        }
        let b = HllAgg.deserialize(&HllAgg.serialize(&b).unwrap()).unwrap();
        HllAgg.combine(&mut a, b).unwrap();

        assert_eq!(60, cardinality(&HllAgg.finalize(&a, &[]).unwrap()));
    }

    #[test]
    fn hll_union_agg_skips_nulls() {
        let mut state = TransitionValue::null();
        assert_eq!(ScalarValue::Null, HllUnionAgg.finalize(&state, &[]).unwrap());

        // (sketch input)
        let inputs = [sketch_of(0..10), ScalarValue::Null, sketch_of(5..20)];
        for input in &inputs {
            HllUnionAgg.transition(&mut state, std::slice::from_ref(input)).unwrap();
        }
        assert_eq!(20, cardinality(&HllUnionAgg.finalize(&state, &[]).unwrap()));

        let mut other = TransitionValue::null();
        HllUnionAgg.transition(&mut other, &[sketch_of(100..105)]).unwrap();
        HllUnionAgg.combine(&mut state, other).unwrap();
        assert_eq!(25, cardinality(&HllUnionAgg.finalize(&state, &[]).unwrap()));
    }

    #[test]
    fn counts_distinct_across_partials() {
        let mut a = HllCountDistinct.initial_state().unwrap();
        let mut b = HllCountDistinct.initial_state().unwrap();
        for v in 0..50 {
            HllCountDistinct
                .transition(&mut a, &[ScalarValue::Int64(v)])
                .unwrap();
        }
        for v in 25..75 {
            HllCountDistinct
                .transition(&mut b, &[ScalarValue::Int64(v)])
                .unwrap();
        }
        HllCountDistinct
            .transition(&mut b, &[ScalarValue::Null])
            .unwrap();

        let wire = HllCountDistinct.serialize(&b).unwrap();
        let b = HllCountDistinct.deserialize(&wire).unwrap();
        HllCountDistinct.combine(&mut a, b).unwrap();

        assert_eq!(
            ScalarValue::Int64(75),
            HllCountDistinct.finalize(&a, &[]).unwrap()
        );
    }
}
