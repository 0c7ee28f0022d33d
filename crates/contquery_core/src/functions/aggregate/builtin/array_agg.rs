use contquery_error::{DbError, Result};

use super::{BuiltinAggregate, CollectedValues, first_arg};
use crate::arrays::datatype::DataType;
use crate::arrays::scalar::ScalarValue;
use crate::catalog::{
    AggregateDefinition, CombinerDefinition, FunctionDef, ReturnType, StateType,
};
use crate::functions::aggregate::{AggregateBehavior, TransitionValue};
use crate::functions::documentation::{Category, Documentation};

static ARRAY_AGG_DOC: Documentation = Documentation {
    category: Category::GENERAL_PURPOSE_AGGREGATE,
    description: "Collect all input values, including NULLs, into a list.",
    arguments: &["input"],
    example: None,
};

static COMBINABLE_ARRAY_AGG_DOC: Documentation = Documentation {
    category: Category::STREAMING_AGGREGATE,
    description: "Variant of `array_agg` whose partial lists can be concatenated.",
    arguments: &["input"],
    example: None,
};

static SET_AGG_DOC: Documentation = Documentation {
    category: Category::STREAMING_AGGREGATE,
    description: "Collect the distinct non-NULL input values into a list.",
    arguments: &["input"],
    example: None,
};

fn list_state() -> StateType {
    StateType::Value(DataType::list(DataType::Any))
}

pub fn definitions() -> Vec<BuiltinAggregate> {
    vec![
        (
            AggregateDefinition::new(
                "array_agg",
                vec![DataType::Any],
                FunctionDef::non_strict("array_agg_transfn"),
                StateType::Internal,
                &ArrayAgg,
            )
            .with_finalize(
                FunctionDef::non_strict("array_agg_finalfn"),
                ReturnType::ListOfArg(0),
            )
            .with_doc(&ARRAY_AGG_DOC),
            None,
        ),
        (
            AggregateDefinition::new(
                "combinable_array_agg",
                vec![DataType::Any],
                FunctionDef::non_strict("combinable_array_agg_transfn"),
                list_state(),
                &CombinableArrayAgg,
            )
            .with_return_type(ReturnType::ListOfArg(0))
            .with_doc(&COMBINABLE_ARRAY_AGG_DOC),
            Some(CombinerDefinition::new(
                FunctionDef::non_strict("array_agg_combine"),
                list_state(),
            )),
        ),
        (
            AggregateDefinition::new(
                "set_agg",
                vec![DataType::Any],
                FunctionDef::non_strict("set_agg_transfn"),
                list_state(),
                &SetAgg,
            )
            .with_return_type(ReturnType::ListOfArg(0))
            .with_doc(&SET_AGG_DOC),
            Some(CombinerDefinition::new(
                FunctionDef::non_strict("set_agg_combine"),
                list_state(),
            )),
        ),
    ]
}

/// Plain `array_agg`, keeps an internal buffer and can't be combined.
#[derive(Debug, Clone, Copy)]
pub struct ArrayAgg;

impl AggregateBehavior for ArrayAgg {
    fn transition(&self, state: &mut TransitionValue, args: &[ScalarValue]) -> Result<()> {
        let value = first_arg(args)?.clone();
        state
            .internal_or_init(CollectedValues::default)?
            .values
            .push(value);
        Ok(())
    }

    fn finalize(&self, state: &TransitionValue, _direct_args: &[ScalarValue]) -> Result<ScalarValue> {
        if state.is_null() {
            return Ok(ScalarValue::Null);
        }
        let collected = state.downcast_ref::<CollectedValues>()?;
        Ok(ScalarValue::List(collected.values.clone()))
    }
}

fn list_mut(state: &mut TransitionValue) -> Result<&mut Vec<ScalarValue>> {
    if state.is_null() {
        *state = TransitionValue::Datum(ScalarValue::List(Vec::new()));
    }
    match state.as_datum_mut()? {
        ScalarValue::List(values) => Ok(values),
        other => Err(DbError::new(format!("Expected list state, got {other}"))),
    }
}

/// `array_agg` with the state kept as a list value.
#[derive(Debug, Clone, Copy)]
pub struct CombinableArrayAgg;

impl AggregateBehavior for CombinableArrayAgg {
    fn transition(&self, state: &mut TransitionValue, args: &[ScalarValue]) -> Result<()> {
        let value = first_arg(args)?.clone();
        list_mut(state)?.push(value);
        Ok(())
    }

    fn combine(&self, state: &mut TransitionValue, other: TransitionValue) -> Result<()> {
        let other = other.as_datum()?.try_as_list()?.to_vec();
        list_mut(state)?.extend(other);
        Ok(())
    }
}

/// Distinct `array_agg`, unique values in order of first appearance.
#[derive(Debug, Clone, Copy)]
pub struct SetAgg;

impl AggregateBehavior for SetAgg {
    fn transition(&self, state: &mut TransitionValue, args: &[ScalarValue]) -> Result<()> {
        let value = first_arg(args)?;
        if value.is_null() {
            return Ok(());
        }
        let values = list_mut(state)?;
        if !values.contains(value) {
            values.push(value.clone());
        }
        Ok(())
    }

    fn combine(&self, state: &mut TransitionValue, other: TransitionValue) -> Result<()> {
        for value in other.as_datum()?.try_as_list()? {
            self.transition(state, std::slice::from_ref(value))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_agg_dedups_across_partials() {
        let mut a = TransitionValue::null();
        let mut b = TransitionValue::null();
        for v in [1, 2, 1] {
            SetAgg.transition(&mut a, &[ScalarValue::Int64(v)]).unwrap();
        }
        for v in [3, 2] {
            SetAgg.transition(&mut b, &[ScalarValue::Int64(v)]).unwrap();
        }
        SetAgg.transition(&mut b, &[ScalarValue::Null]).unwrap();

        SetAgg.combine(&mut a, b).unwrap();
        let expected = ScalarValue::List(vec![
            ScalarValue::Int64(1),
            ScalarValue::Int64(2),
            ScalarValue::Int64(3),
        ]);
        assert_eq!(&expected, a.as_datum().unwrap());
    }

    #[test]
    fn array_agg_keeps_nulls() {
        let mut state = TransitionValue::null();
        CombinableArrayAgg
            .transition(&mut state, &[ScalarValue::Null])
            .unwrap();
        CombinableArrayAgg
            .transition(&mut state, &[ScalarValue::Int64(4)])
            .unwrap();
        let expected = ScalarValue::List(vec![ScalarValue::Null, ScalarValue::Int64(4)]);
        assert_eq!(&expected, state.as_datum().unwrap());
    }
}
