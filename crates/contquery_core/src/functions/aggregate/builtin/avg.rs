use contquery_error::{DbError, Result};

use super::{BuiltinAggregate, first_arg};
use crate::arrays::datatype::DataType;
use crate::arrays::scalar::ScalarValue;
use crate::catalog::{
    AggregateDefinition, CombinerDefinition, FunctionDef, ReturnType, StateType,
};
use crate::functions::aggregate::{AggregateBehavior, TransitionValue};
use crate::functions::documentation::{Category, Documentation};

static AVG_DOC: Documentation = Documentation {
    category: Category::GENERAL_PURPOSE_AGGREGATE,
    description: "Return the average value of all non-NULL inputs.",
    arguments: &["inputs"],
    example: None,
};

/// State is a `[sum, count]` pair.
fn state_type() -> StateType {
    StateType::Value(DataType::list(DataType::Any))
}

pub fn definitions() -> Vec<BuiltinAggregate> {
    vec![(
        AggregateDefinition::new(
            "avg",
            vec![DataType::Float64],
            FunctionDef::strict("float8_accum"),
            state_type(),
            &Avg,
        )
        .with_initial_value(ScalarValue::List(vec![
            ScalarValue::Float64(0.0),
            ScalarValue::Int64(0),
        ]))
        .with_finalize(
            FunctionDef::strict("float8_avg"),
            ReturnType::Fixed(DataType::Float64),
        )
        .with_doc(&AVG_DOC),
        Some(CombinerDefinition::new(
            FunctionDef::strict("float8_combine"),
            state_type(),
        )),
    )]
}

fn sum_and_count(state: &TransitionValue) -> Result<(f64, i64)> {
    match state.as_datum()?.try_as_list()? {
        [sum, count] => Ok((sum.try_as_f64()?, count.try_as_i64()?)),
        other => Err(DbError::new("Invalid avg state").with_field("len", other.len())),
    }
}

fn make_state(sum: f64, count: i64) -> TransitionValue {
    TransitionValue::Datum(ScalarValue::List(vec![
        ScalarValue::Float64(sum),
        ScalarValue::Int64(count),
    ]))
}

#[derive(Debug, Clone, Copy)]
pub struct Avg;

impl AggregateBehavior for Avg {
    fn transition(&self, state: &mut TransitionValue, args: &[ScalarValue]) -> Result<()> {
        let input = first_arg(args)?.try_as_f64()?;
        let (sum, count) = sum_and_count(state)?;
        *state = make_state(sum + input, count + 1);
        Ok(())
    }

    fn combine(&self, state: &mut TransitionValue, other: TransitionValue) -> Result<()> {
        let (sum, count) = sum_and_count(state)?;
        let (other_sum, other_count) = sum_and_count(&other)?;
        *state = make_state(sum + other_sum, count + other_count);
        Ok(())
    }

    fn finalize(&self, state: &TransitionValue, _direct_args: &[ScalarValue]) -> Result<ScalarValue> {
        let (sum, count) = sum_and_count(state)?;
        if count == 0 {
            return Ok(ScalarValue::Null);
        }
        Ok(ScalarValue::Float64(sum / count as f64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combine_partials() {
        let mut a = make_state(0.0, 0);
        Avg.transition(&mut a, &[ScalarValue::Int64(2)]).unwrap();
        Avg.transition(&mut a, &[ScalarValue::Int64(4)]).unwrap();

        let mut b = make_state(0.0, 0);
        Avg.transition(&mut b, &[ScalarValue::Float64(9.0)]).unwrap();

        Avg.combine(&mut a, b).unwrap();
        assert_eq!(ScalarValue::Float64(5.0), Avg.finalize(&a, &[]).unwrap());
    }

    #[test]
    fn empty_is_null() {
        let state = make_state(0.0, 0);
        assert_eq!(ScalarValue::Null, Avg.finalize(&state, &[]).unwrap());
    }
}
