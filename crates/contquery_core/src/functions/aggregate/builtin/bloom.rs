use contquery_error::Result;

use super::{
    BuiltinAggregate, combine_sketch, first_arg, merge_sketch_arg, sketch_from_value, sketch_to_value,
};
use crate::arrays::datatype::DataType;
use crate::arrays::scalar::ScalarValue;
use crate::catalog::{AggregateDefinition, CombinerDefinition, FunctionDef, ReturnType, StateType};
use crate::functions::aggregate::{AggregateBehavior, TransitionValue};
use crate::functions::documentation::{Category, Documentation, Example};
use crate::statistics::bloom::BloomFilter;

static BLOOM_AGG_DOC: Documentation = Documentation {
    category: Category::APPROXIMATE_AGGREGATE,
    description: "Build a Bloom filter of the non-NULL inputs. Query it with bloom_contains.",
    arguments: &["input"],
    example: Some(Example {
        example: "bloom_contains(bloom_agg(user_id), 42)",
        output: "true",
    }),
};

static BLOOM_UNION_AGG_DOC: Documentation = Documentation {
    category: Category::APPROXIMATE_AGGREGATE,
    description: "Union Bloom filters built with the same parameters.",
    arguments: &["filter"],
    example: None,
};

static BLOOM_INTERSECTION_AGG_DOC: Documentation = Documentation {
    category: Category::APPROXIMATE_AGGREGATE,
    description: "Intersect Bloom filters built with the same parameters.",
    arguments: &["filter"],
    example: None,
};

fn bloom_combiner(combine: &str) -> CombinerDefinition {
    CombinerDefinition::new(FunctionDef::strict(combine), StateType::Internal)
        .with_serialization(FunctionDef::strict("bloom_send"), FunctionDef::strict("bloom_recv"))
}

fn bloom_definition(
    name: &str,
    arg: DataType,
    transition: &str,
    behavior: &'static dyn AggregateBehavior,
) -> AggregateDefinition {
    AggregateDefinition::new(
        name,
        vec![arg],
        FunctionDef::non_strict(transition),
        StateType::Internal,
        behavior,
    )
    .with_finalize(FunctionDef::strict("bloom_out"), ReturnType::Fixed(DataType::Binary))
}

pub fn definitions() -> Vec<BuiltinAggregate> {
    vec![
        (
            bloom_definition("bloom_agg", DataType::Any, "bloom_agg_trans", &BloomAgg).with_doc(&BLOOM_AGG_DOC),
            Some(bloom_combiner("bloom_union")),
        ),
        (
            bloom_definition("bloom_union_agg", DataType::Binary, "bloom_union_agg_trans", &BloomUnionAgg)
                .with_doc(&BLOOM_UNION_AGG_DOC),
            Some(bloom_combiner("bloom_union")),
        ),
        (
            bloom_definition(
                "bloom_intersection_agg",
                DataType::Binary,
                "bloom_intersection_agg_trans",
                &BloomIntersectionAgg,
            )
            .with_doc(&BLOOM_INTERSECTION_AGG_DOC),
            Some(bloom_combiner("bloom_intersection")),
        ),
    ]
}

fn union(bloom: &mut BloomFilter, other: &BloomFilter) -> Result<()> {
    bloom.union(other)
}

fn intersect(bloom: &mut BloomFilter, other: &BloomFilter) -> Result<()> {
    bloom.intersect(other)
}

/// Result, serialize and deserialize are the same for every bloom aggregate.
macro_rules! bloom_output {
    () => {
        fn finalize(&self, state: &TransitionValue, _direct_args: &[ScalarValue]) -> Result<ScalarValue> {
            sketch_to_value::<BloomFilter>(state)
        }

        fn serialize(&self, state: &TransitionValue) -> Result<ScalarValue> {
            sketch_to_value::<BloomFilter>(state)
        }

        fn deserialize(&self, value: &ScalarValue) -> Result<TransitionValue> {
            sketch_from_value::<BloomFilter>(value)
        }
    };
}

#[derive(Debug, Clone, Copy)]
pub struct BloomAgg;

impl AggregateBehavior for BloomAgg {
    fn initial_state(&self) -> Option<TransitionValue> {
        Some(TransitionValue::internal(BloomFilter::new()))
    }

    fn transition(&self, state: &mut TransitionValue, args: &[ScalarValue]) -> Result<()> {
        let value = first_arg(args)?;
        if value.is_null() {
            return Ok(());
        }
        state.internal_or_init(BloomFilter::new)?.insert(value);
        Ok(())
    }

    fn combine(&self, state: &mut TransitionValue, other: TransitionValue) -> Result<()> {
        combine_sketch(state, other, union)
    }

    bloom_output!();
}

#[derive(Debug, Clone, Copy)]
pub struct BloomUnionAgg;

impl AggregateBehavior for BloomUnionAgg {
    fn transition(&self, state: &mut TransitionValue, args: &[ScalarValue]) -> Result<()> {
        merge_sketch_arg(state, args, union)
    }

    fn combine(&self, state: &mut TransitionValue, other: TransitionValue) -> Result<()> {
        combine_sketch(state, other, union)
    }

    bloom_output!();
}

/// Null inputs are skipped rather than emptying the intersection.
#[derive(Debug, Clone, Copy)]
pub struct BloomIntersectionAgg;

impl AggregateBehavior for BloomIntersectionAgg {
    fn transition(&self, state: &mut TransitionValue, args: &[ScalarValue]) -> Result<()> {
        merge_sketch_arg(state, args, intersect)
    }

    fn combine(&self, state: &mut TransitionValue, other: TransitionValue) -> Result<()> {
        combine_sketch(state, other, intersect)
    }

    bloom_output!();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter_of(values: &[&str]) -> ScalarValue {
        let mut state = BloomAgg.initial_state().unwrap();
        for v in values {
            BloomAgg.transition(&mut state, &[ScalarValue::from(*v)]).unwrap();
        }
        BloomAgg.finalize(&state, &[]).unwrap()
    }

    fn contains(filter: &ScalarValue, value: &str) -> bool {
        BloomFilter::from_bytes(filter.try_as_binary().unwrap())
            .unwrap()
            .contains(&ScalarValue::from(value))
    }

    #[test]
    fn union_and_intersection_aggs() {
        let inputs = [filter_of(&["a", "b"]), ScalarValue::Null, filter_of(&["b", "c"])];

        let mut union = TransitionValue::null();
        let mut both = TransitionValue::null();
        for input in &inputs {
            BloomUnionAgg.transition(&mut union, std::slice::from_ref(input)).unwrap();
            BloomIntersectionAgg.transition(&mut both, std::slice::from_ref(input)).unwrap();
        }
        let union = BloomUnionAgg.finalize(&union, &[]).unwrap();
        let both = BloomIntersectionAgg.finalize(&both, &[]).unwrap();

        // (value, in union, in intersection)
        let cases = [("a", true, false), ("b", true, true), ("c", true, false), ("d", false, false)];
        for (value, in_union, in_both) in cases {
            assert_eq!(in_union, contains(&union, value), "union: {value}");
            assert_eq!(in_both, contains(&both, value), "intersection: {value}");
        }
    }

    #[test]
    fn partial_states_union() {
        let mut a = BloomAgg.initial_state().unwrap();
        let mut b = BloomAgg.initial_state().unwrap();
        BloomAgg.transition(&mut a, &[ScalarValue::Int64(1)]).unwrap();
        BloomAgg.transition(&mut b, &[ScalarValue::Int64(2)]).unwrap();
        BloomAgg.transition(&mut b, &[ScalarValue::Null]).unwrap();

        let b = BloomAgg.deserialize(&BloomAgg.serialize(&b).unwrap()).unwrap();
        BloomAgg.combine(&mut a, b).unwrap();
        let bloom = a.downcast_ref::<BloomFilter>().unwrap();
        assert!(bloom.contains(&ScalarValue::Int64(1)));
        assert!(bloom.contains(&ScalarValue::Int64(2)));
        assert_eq!(2, bloom.cardinality());
    }
}
