use contquery_error::{DbError, ErrorKind, Result};

use super::{BuiltinAggregate, first_arg};
use crate::arrays::datatype::DataType;
use crate::arrays::scalar::ScalarValue;
use crate::catalog::{AggregateDefinition, CombinerDefinition, FunctionDef, StateType};
use crate::functions::aggregate::{AggregateBehavior, TransitionValue};
use crate::functions::documentation::{Category, Documentation};

static SUM_DOC: Documentation = Documentation {
    category: Category::GENERAL_PURPOSE_AGGREGATE,
    description: "Compute the sum of all non-NULL inputs.",
    arguments: &["inputs"],
    example: None,
};

pub fn definitions() -> Vec<BuiltinAggregate> {
    let mut defs = Vec::new();
    let overloads: [(DataType, &'static str, &'static dyn AggregateBehavior); 2] = [
        (DataType::Int64, "int8pl", &SumInt64),
        (DataType::Float64, "float8pl", &SumFloat64),
    ];

    for (datatype, func, behavior) in overloads {
        // Strict with no initial value, the first input becomes the state
        // and the transition function doubles as the combine function.
        defs.push((
            AggregateDefinition::new(
                "sum",
                vec![datatype.clone()],
                FunctionDef::strict(func),
                StateType::Value(datatype.clone()),
                behavior,
            )
            .with_doc(&SUM_DOC),
            Some(CombinerDefinition::new(
                FunctionDef::strict(func),
                StateType::Value(datatype),
            )),
        ));
    }

    defs
}

#[derive(Debug, Clone, Copy)]
pub struct SumInt64;

impl AggregateBehavior for SumInt64 {
    fn transition(&self, state: &mut TransitionValue, args: &[ScalarValue]) -> Result<()> {
        let input = first_arg(args)?.try_as_i64()?;
        let current = state.as_datum()?.try_as_i64()?;
        let sum = current.checked_add(input).ok_or_else(|| {
            DbError::new("bigint out of range in sum").with_kind(ErrorKind::Execution)
        })?;
        *state = TransitionValue::Datum(ScalarValue::Int64(sum));
        Ok(())
    }

    fn combine(&self, state: &mut TransitionValue, other: TransitionValue) -> Result<()> {
        let other = other.as_datum()?.clone();
        self.transition(state, &[other])
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SumFloat64;

impl AggregateBehavior for SumFloat64 {
    fn transition(&self, state: &mut TransitionValue, args: &[ScalarValue]) -> Result<()> {
        let input = first_arg(args)?.try_as_f64()?;
        let current = state.as_datum()?.try_as_f64()?;
        *state = TransitionValue::Datum(ScalarValue::Float64(current + input));
        Ok(())
    }

    fn combine(&self, state: &mut TransitionValue, other: TransitionValue) -> Result<()> {
        let other = other.as_datum()?.clone();
        self.transition(state, &[other])
    }
}
