use contquery_error::{DbError, Result};

use super::{
    BuiltinAggregate, combine_sketch, merge_sketch_arg, sketch_from_value, sketch_to_value,
};
use crate::arrays::datatype::DataType;
use crate::arrays::scalar::ScalarValue;
use crate::catalog::{AggregateDefinition, CombinerDefinition, FunctionDef, ReturnType, StateType};
use crate::functions::aggregate::{AggregateBehavior, TransitionValue};
use crate::functions::documentation::{Category, Documentation, Example};
use crate::statistics::topk::TopK;

static TOPK_AGG_DOC: Documentation = Documentation {
    category: Category::APPROXIMATE_AGGREGATE,
    description: "Track the k most frequent non-NULL inputs. Read it with topk_values and topk_freqs.",
    arguments: &["input", "k"],
    example: Some(Example {
        example: "topk_values(topk_agg(url, 3))",
        output: "[/, /login, /about]",
    }),
};

static TOPK_MERGE_AGG_DOC: Documentation = Documentation {
    category: Category::APPROXIMATE_AGGREGATE,
    description: "Merge top-k sketches built by topk_agg with the same k.",
    arguments: &["sketch"],
    example: None,
};

fn topk_combiner() -> CombinerDefinition {
    CombinerDefinition::new(FunctionDef::strict("topk_merge"), StateType::Internal)
        .with_serialization(FunctionDef::strict("topk_send"), FunctionDef::strict("topk_recv"))
}

pub fn definitions() -> Vec<BuiltinAggregate> {
    vec![
        (
            AggregateDefinition::new(
                "topk_agg",
                vec![DataType::Any, DataType::Int64],
                FunctionDef::non_strict("topk_agg_trans"),
                StateType::Internal,
                &TopKAgg,
            )
            .with_finalize(FunctionDef::strict("topk_out"), ReturnType::Fixed(DataType::Binary))
            .with_doc(&TOPK_AGG_DOC),
            Some(topk_combiner()),
        ),
        (
            AggregateDefinition::new(
                "topk_merge_agg",
                vec![DataType::Binary],
                FunctionDef::non_strict("topk_merge_agg_trans"),
                StateType::Internal,
                &TopKMergeAgg,
            )
            .with_finalize(FunctionDef::strict("topk_out"), ReturnType::Fixed(DataType::Binary))
            .with_doc(&TOPK_MERGE_AGG_DOC),
            Some(topk_combiner()),
        ),
    ]
}

fn merge_topk(topk: &mut TopK, other: &TopK) -> Result<()> {
    topk.merge(other)
}

/// The sketch is created from the first row's `k`, later rows must agree.
#[derive(Debug, Clone, Copy)]
pub struct TopKAgg;

impl AggregateBehavior for TopKAgg {
    fn transition(&self, state: &mut TransitionValue, args: &[ScalarValue]) -> Result<()> {
        let (value, k) = match args {
            [value, k] => (value, k),
            _ => return Err(DbError::new("Expected value and k arguments")),
        };
        if value.is_null() || k.is_null() {
            return Ok(());
        }
        let k = k.try_as_usize()?;
        if state.is_null() {
            *state = TransitionValue::internal(TopK::new(k)?);
        }
        let topk = state.downcast_mut::<TopK>()?;
        if topk.k() != k {
            return Err(DbError::new("k must be constant within a group")
                .with_field("expected", topk.k())
                .with_field("got", k));
        }
        topk.increment(value, 1);
        Ok(())
    }

    fn combine(&self, state: &mut TransitionValue, other: TransitionValue) -> Result<()> {
        combine_sketch(state, other, merge_topk)
    }

    fn finalize(&self, state: &TransitionValue, _direct_args: &[ScalarValue]) -> Result<ScalarValue> {
        sketch_to_value::<TopK>(state)
    }

    fn serialize(&self, state: &TransitionValue) -> Result<ScalarValue> {
        sketch_to_value::<TopK>(state)
    }

    fn deserialize(&self, value: &ScalarValue) -> Result<TransitionValue> {
        sketch_from_value::<TopK>(value)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TopKMergeAgg;

impl AggregateBehavior for TopKMergeAgg {
    fn transition(&self, state: &mut TransitionValue, args: &[ScalarValue]) -> Result<()> {
        merge_sketch_arg(state, args, merge_topk)
    }

    fn combine(&self, state: &mut TransitionValue, other: TransitionValue) -> Result<()> {
        combine_sketch(state, other, merge_topk)
    }

    fn finalize(&self, state: &TransitionValue, _direct_args: &[ScalarValue]) -> Result<ScalarValue> {
        sketch_to_value::<TopK>(state)
    }

    fn serialize(&self, state: &TransitionValue) -> Result<ScalarValue> {
        sketch_to_value::<TopK>(state)
    }

    fn deserialize(&self, value: &ScalarValue) -> Result<TransitionValue> {
        sketch_from_value::<TopK>(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(values: &[&str], k: i64) -> TransitionValue {
        let mut state = TransitionValue::null();
        for v in values {
            TopKAgg
                .transition(&mut state, &[ScalarValue::from(*v), ScalarValue::Int64(k)])
                .unwrap();
        }
        state
    }

    fn top(state: &TransitionValue) -> Vec<(ScalarValue, u64)> {
        state.downcast_ref::<TopK>().unwrap().top()
    }

    #[test]
    fn partials_combine_to_single_pass_top() {
        let rows = ["a", "b", "a", "c", "b", "a", "d"];
        let single = feed(&rows, 2);

        let mut left = feed(&rows[..3], 2);
        let right = feed(&rows[3..], 2);
        let right = TopKAgg.deserialize(&TopKAgg.serialize(&right).unwrap()).unwrap();
        TopKAgg.combine(&mut left, right).unwrap();

        let expected = vec![(ScalarValue::from("a"), 3), (ScalarValue::from("b"), 2)];
        assert_eq!(expected, top(&single));
        assert_eq!(expected, top(&left));
    }

    #[test]
    fn k_must_not_change() {
        let mut state = feed(&["a"], 2);
        let err = TopKAgg.transition(&mut state, &[ScalarValue::from("b"), ScalarValue::Int64(3)]);
        assert!(err.is_err());

        let mut state = TransitionValue::null();
        let err = TopKAgg.transition(&mut state, &[ScalarValue::from("b"), ScalarValue::Int64(0)]);
        assert!(err.is_err());
    }

    #[test]
    fn merge_agg_over_sketches() {
        let sketches = [
            TopKAgg.finalize(&feed(&["x", "y", "y"], 1), &[]).unwrap(),
            ScalarValue::Null,
            TopKAgg.finalize(&feed(&["x", "x"], 1), &[]).unwrap(),
        ];
        let mut state = TransitionValue::null();
        for sketch in sketches {
            TopKMergeAgg.transition(&mut state, &[sketch]).unwrap();
        }
        assert_eq!(vec![(ScalarValue::from("x"), 3)], top(&state));
    }
}
