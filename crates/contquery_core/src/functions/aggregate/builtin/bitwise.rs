use contquery_error::Result;

use super::{BuiltinAggregate, first_arg};
use crate::arrays::datatype::DataType;
use crate::arrays::scalar::ScalarValue;
use crate::catalog::{AggregateDefinition, CombinerDefinition, FunctionDef, StateType};
use crate::functions::aggregate::{AggregateBehavior, TransitionValue};
use crate::functions::documentation::{Category, Documentation};

static BIT_AND_DOC: Documentation = Documentation {
    category: Category::GENERAL_PURPOSE_AGGREGATE,
    description: "Bitwise AND of all non-NULL inputs.",
    arguments: &["input"],
    example: None,
};

static BIT_OR_DOC: Documentation = Documentation {
    category: Category::GENERAL_PURPOSE_AGGREGATE,
    description: "Bitwise OR of all non-NULL inputs.",
    arguments: &["input"],
    example: None,
};

static BOOL_AND_DOC: Documentation = Documentation {
    category: Category::GENERAL_PURPOSE_AGGREGATE,
    description: "Returns true if all non-NULL inputs are true, otherwise false.",
    arguments: &["input"],
    example: None,
};

static BOOL_OR_DOC: Documentation = Documentation {
    category: Category::GENERAL_PURPOSE_AGGREGATE,
    description: "Returns true if any non-NULL input is true, otherwise false.",
    arguments: &["input"],
    example: None,
};

pub fn definitions() -> Vec<BuiltinAggregate> {
    let variants: [(&str, &str, DataType, &'static dyn AggregateBehavior, &'static Documentation); 4] = [
        ("bit_and", "int8and", DataType::Int64, &BitAnd, &BIT_AND_DOC),
        ("bit_or", "int8or", DataType::Int64, &BitOr, &BIT_OR_DOC),
        ("bool_and", "booland_statefunc", DataType::Boolean, &BoolAnd, &BOOL_AND_DOC),
        ("bool_or", "boolor_statefunc", DataType::Boolean, &BoolOr, &BOOL_OR_DOC),
    ];

    variants
        .into_iter()
        .map(|(name, func, datatype, behavior, doc)| {
            (
                AggregateDefinition::new(
                    name,
                    vec![datatype.clone()],
                    FunctionDef::strict(func),
                    StateType::Value(datatype.clone()),
                    behavior,
                )
                .with_doc(doc),
                Some(CombinerDefinition::new(
                    FunctionDef::strict(func),
                    StateType::Value(datatype),
                )),
            )
        })
        .collect()
}

/// Apply a binary operation between the state and a new value.
fn apply<T, F, G>(state: &mut TransitionValue, input: &ScalarValue, get: G, op: F) -> Result<()>
where
    F: Fn(T, T) -> T,
    G: Fn(&ScalarValue) -> Result<T>,
    T: Into<ScalarValue>,
{
    let current = get(state.as_datum()?)?;
    let input = get(input)?;
    *state = TransitionValue::Datum(op(current, input).into());
    Ok(())
}

#[derive(Debug, Clone, Copy)]
pub struct BitAnd;

impl AggregateBehavior for BitAnd {
    fn transition(&self, state: &mut TransitionValue, args: &[ScalarValue]) -> Result<()> {
        apply(state, first_arg(args)?, ScalarValue::try_as_i64, |a, b| a & b)
    }

    fn combine(&self, state: &mut TransitionValue, other: TransitionValue) -> Result<()> {
        apply(state, other.as_datum()?, ScalarValue::try_as_i64, |a, b| a & b)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BitOr;

impl AggregateBehavior for BitOr {
    fn transition(&self, state: &mut TransitionValue, args: &[ScalarValue]) -> Result<()> {
        apply(state, first_arg(args)?, ScalarValue::try_as_i64, |a, b| a | b)
    }

    fn combine(&self, state: &mut TransitionValue, other: TransitionValue) -> Result<()> {
        apply(state, other.as_datum()?, ScalarValue::try_as_i64, |a, b| a | b)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BoolAnd;

impl AggregateBehavior for BoolAnd {
    fn transition(&self, state: &mut TransitionValue, args: &[ScalarValue]) -> Result<()> {
        apply(state, first_arg(args)?, ScalarValue::try_as_bool, |a, b| a && b)
    }

    fn combine(&self, state: &mut TransitionValue, other: TransitionValue) -> Result<()> {
        apply(state, other.as_datum()?, ScalarValue::try_as_bool, |a, b| a && b)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BoolOr;

impl AggregateBehavior for BoolOr {
    fn transition(&self, state: &mut TransitionValue, args: &[ScalarValue]) -> Result<()> {
        apply(state, first_arg(args)?, ScalarValue::try_as_bool, |a, b| a || b)
    }

    fn combine(&self, state: &mut TransitionValue, other: TransitionValue) -> Result<()> {
        apply(state, other.as_datum()?, ScalarValue::try_as_bool, |a, b| a || b)
    }
}
