use contquery_error::Result;

use super::{
    BuiltinAggregate, combine_sketch, first_arg, merge_sketch_arg, sketch_from_value, sketch_to_value,
};
use crate::arrays::datatype::DataType;
use crate::arrays::scalar::ScalarValue;
use crate::catalog::{AggregateDefinition, CombinerDefinition, FunctionDef, ReturnType, StateType};
use crate::functions::aggregate::{AggregateBehavior, TransitionValue};
use crate::functions::documentation::{Category, Documentation, Example};
use crate::statistics::cmsketch::CountMinSketch;

static FREQ_AGG_DOC: Documentation = Documentation {
    category: Category::APPROXIMATE_AGGREGATE,
    description: "Build a count-min sketch of the non-NULL inputs. Read it with freq and freq_total.",
    arguments: &["input"],
    example: Some(Example {
        example: "freq(freq_agg(url), '/index.html')",
        output: "17",
    }),
};

static FREQ_MERGE_AGG_DOC: Documentation = Documentation {
    category: Category::APPROXIMATE_AGGREGATE,
    description: "Merge count-min sketches built by freq_agg.",
    arguments: &["sketch"],
    example: None,
};

fn freq_combiner() -> CombinerDefinition {
    CombinerDefinition::new(FunctionDef::strict("freq_merge"), StateType::Internal)
        .with_serialization(FunctionDef::strict("freq_send"), FunctionDef::strict("freq_recv"))
}

pub fn definitions() -> Vec<BuiltinAggregate> {
    vec![
        (
            AggregateDefinition::new(
                "freq_agg",
                vec![DataType::Any],
                FunctionDef::non_strict("freq_agg_trans"),
                StateType::Internal,
                &FreqAgg,
            )
            .with_finalize(FunctionDef::strict("freq_out"), ReturnType::Fixed(DataType::Binary))
            .with_doc(&FREQ_AGG_DOC),
            Some(freq_combiner()),
        ),
        (
            AggregateDefinition::new(
                "freq_merge_agg",
                vec![DataType::Binary],
                FunctionDef::non_strict("freq_merge_agg_trans"),
                StateType::Internal,
                &FreqMergeAgg,
            )
            .with_finalize(FunctionDef::strict("freq_out"), ReturnType::Fixed(DataType::Binary))
            .with_doc(&FREQ_MERGE_AGG_DOC),
            Some(freq_combiner()),
        ),
    ]
}

fn merge_cms(cms: &mut CountMinSketch, other: &CountMinSketch) -> Result<()> {
    cms.merge(other)
}

#[derive(Debug, Clone, Copy)]
pub struct FreqAgg;

impl AggregateBehavior for FreqAgg {
    fn initial_state(&self) -> Option<TransitionValue> {
        Some(TransitionValue::internal(CountMinSketch::new()))
    }

    fn transition(&self, state: &mut TransitionValue, args: &[ScalarValue]) -> Result<()> {
        let value = first_arg(args)?;
        if value.is_null() {
            return Ok(());
        }
        state.internal_or_init(CountMinSketch::new)?.add(value, 1);
        Ok(())
    }

    fn combine(&self, state: &mut TransitionValue, other: TransitionValue) -> Result<()> {
        combine_sketch(state, other, merge_cms)
    }

    fn finalize(&self, state: &TransitionValue, _direct_args: &[ScalarValue]) -> Result<ScalarValue> {
        sketch_to_value::<CountMinSketch>(state)
    }

    fn serialize(&self, state: &TransitionValue) -> Result<ScalarValue> {
        sketch_to_value::<CountMinSketch>(state)
    }

    fn deserialize(&self, value: &ScalarValue) -> Result<TransitionValue> {
        sketch_from_value::<CountMinSketch>(value)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FreqMergeAgg;

impl AggregateBehavior for FreqMergeAgg {
    fn transition(&self, state: &mut TransitionValue, args: &[ScalarValue]) -> Result<()> {
        merge_sketch_arg(state, args, merge_cms)
    }

    fn combine(&self, state: &mut TransitionValue, other: TransitionValue) -> Result<()> {
        combine_sketch(state, other, merge_cms)
    }

    fn finalize(&self, state: &TransitionValue, _direct_args: &[ScalarValue]) -> Result<ScalarValue> {
        sketch_to_value::<CountMinSketch>(state)
    }

    fn serialize(&self, state: &TransitionValue) -> Result<ScalarValue> {
        sketch_to_value::<CountMinSketch>(state)
    }

    fn deserialize(&self, value: &ScalarValue) -> Result<TransitionValue> {
        sketch_from_value::<CountMinSketch>(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(values: &[&str]) -> TransitionValue {
        let mut state = FreqAgg.initial_state().unwrap();
        for v in values {
            FreqAgg.transition(&mut state, &[ScalarValue::from(*v)]).unwrap();
        }
        FreqAgg.transition(&mut state, &[ScalarValue::Null]).unwrap();
        state
    }

    #[test]
    fn partials_combine_to_single_pass_counts() {
        let mut a = feed(&["a", "b", "a"]);
        let b = feed(&["a", "c"]);
        let b = FreqAgg.deserialize(&FreqAgg.serialize(&b).unwrap()).unwrap();
        FreqAgg.combine(&mut a, b).unwrap();

        let sketch = FreqAgg.finalize(&a, &[]).unwrap();
        let cms = CountMinSketch::from_bytes(sketch.try_as_binary().unwrap()).unwrap();
        assert_eq!(5, cms.total());

        // (value, expected)
        let cases = [("a", 3), ("b", 1), ("c", 1), ("d", 0)];
        for (value, expected) in cases {
            assert_eq!(expected, cms.estimate(&ScalarValue::from(value)), "{value}");
        }
    }

    #[test]
    fn merge_agg_skips_nulls() {
        let sketch = FreqAgg.finalize(&feed(&["x", "x"]), &[]).unwrap();
        let mut state = TransitionValue::null();
        for input in [ScalarValue::Null, sketch.clone(), sketch] {
            FreqMergeAgg.transition(&mut state, &[input]).unwrap();
        }
        let cms = state.downcast_ref::<CountMinSketch>().unwrap();
        assert_eq!(4, cms.estimate(&ScalarValue::from("x")));

        let empty = TransitionValue::null();
        assert_eq!(ScalarValue::Null, FreqMergeAgg.finalize(&empty, &[]).unwrap());
    }
}
