use contquery_error::{DbError, ErrorKind, Result};

use super::{BuiltinAggregate, state_i64};
use crate::arrays::datatype::DataType;
use crate::arrays::scalar::ScalarValue;
use crate::catalog::{AggregateDefinition, CombinerDefinition, FunctionDef, StateType};
use crate::functions::aggregate::{AggregateBehavior, TransitionValue};
use crate::functions::documentation::{Category, Documentation, Example};

static COUNT_STAR_DOC: Documentation = Documentation {
    category: Category::GENERAL_PURPOSE_AGGREGATE,
    description: "Return the number of input rows.",
    arguments: &[],
    example: Some(Example {
        example: "count(*)",
        output: "42",
    }),
};

static COUNT_DOC: Documentation = Documentation {
    category: Category::GENERAL_PURPOSE_AGGREGATE,
    description: "Return the number of non-NULL inputs.",
    arguments: &["input"],
    example: None,
};

pub fn definitions() -> Vec<BuiltinAggregate> {
    // Partial counts are combined by summing them.
    let combiner = CombinerDefinition::new(
        FunctionDef::strict("int8pl"),
        StateType::Value(DataType::Int64),
    );

    vec![
        (
            AggregateDefinition::new(
                "count",
                vec![],
                FunctionDef::non_strict("int8inc"),
                StateType::Value(DataType::Int64),
                &CountStar,
            )
            .with_initial_value(0_i64)
            .with_doc(&COUNT_STAR_DOC),
            Some(combiner.clone()),
        ),
        (
            AggregateDefinition::new(
                "count",
                vec![DataType::Any],
                FunctionDef::strict("int8inc_any"),
                StateType::Value(DataType::Int64),
                &CountStar,
            )
            .with_initial_value(0_i64)
            .with_doc(&COUNT_DOC),
            Some(combiner),
        ),
    ]
}

/// Counts every row it sees. Null skipping for `count(x)` comes from the
/// strict transition function.
#[derive(Debug, Clone, Copy)]
pub struct CountStar;

impl AggregateBehavior for CountStar {
    fn transition(&self, state: &mut TransitionValue, _args: &[ScalarValue]) -> Result<()> {
        let count = state_i64(state)?;
        *state = TransitionValue::Datum(ScalarValue::Int64(count + 1));
        Ok(())
    }

    fn combine(&self, state: &mut TransitionValue, other: TransitionValue) -> Result<()> {
        let sum = state_i64(state)?
            .checked_add(state_i64(&other)?)
            .ok_or_else(|| DbError::new("count overflow").with_kind(ErrorKind::Execution))?;
        *state = TransitionValue::Datum(ScalarValue::Int64(sum));
        Ok(())
    }
}
