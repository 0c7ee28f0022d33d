use contquery_error::Result;
use serde::{Deserialize, Serialize};

use super::BuiltinAggregate;
use crate::arrays::datatype::DataType;
use crate::arrays::scalar::ScalarValue;
use crate::catalog::{
    AggregateDefinition, CombinerDefinition, FunctionDef, ReturnType, StateType,
};
use crate::functions::aggregate::{
    AggregateBehavior, TransitionValue, deserialize_internal, serialize_internal,
};
use crate::functions::documentation::{Category, Documentation, Example};

static STRING_AGG_DOC: Documentation = Documentation {
    category: Category::GENERAL_PURPOSE_AGGREGATE,
    description: "Concatenate all non-NULL input string values using a delimiter.",
    arguments: &["inputs", "delimiter"],
    example: Some(Example {
        example: "string_agg(name, ', ')",
        output: "alice, bob",
    }),
};

static COMBINABLE_STRING_AGG_DOC: Documentation = Documentation {
    category: Category::STREAMING_AGGREGATE,
    description: "Variant of `string_agg` whose partial results can be concatenated.",
    arguments: &["inputs", "delimiter"],
    example: None,
};

pub fn definitions() -> Vec<BuiltinAggregate> {
    let args = vec![DataType::Utf8, DataType::Utf8];
    vec![
        (
            AggregateDefinition::new(
                "string_agg",
                args.clone(),
                FunctionDef::non_strict("string_agg_transfn"),
                StateType::Internal,
                &StringAgg,
            )
            .with_finalize(
                FunctionDef::non_strict("string_agg_finalfn"),
                ReturnType::Fixed(DataType::Utf8),
            )
            .with_doc(&STRING_AGG_DOC),
            None,
        ),
        (
            AggregateDefinition::new(
                "combinable_string_agg",
                args,
                FunctionDef::non_strict("combinable_string_agg_transfn"),
                StateType::Internal,
                &StringAgg,
            )
            .with_finalize(
                FunctionDef::non_strict("string_agg_finalfn"),
                ReturnType::Fixed(DataType::Utf8),
            )
            .with_doc(&COMBINABLE_STRING_AGG_DOC),
            Some(
                CombinerDefinition::new(
                    FunctionDef::non_strict("string_agg_combine"),
                    StateType::Internal,
                )
                .with_serialization(
                    FunctionDef::strict("string_agg_serialize"),
                    FunctionDef::strict("string_agg_deserialize"),
                ),
            ),
        ),
    ]
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StringAggState {
    /// Most recent delimiter, used when concatenating partial states.
    delimiter: Option<String>,
    value: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct StringAgg;

impl AggregateBehavior for StringAgg {
    fn transition(&self, state: &mut TransitionValue, args: &[ScalarValue]) -> Result<()> {
        let value = match args.first() {
            Some(ScalarValue::Null) | None => return Ok(()),
            Some(v) => v.try_as_str()?,
        };
        let delimiter = match args.get(1) {
            Some(ScalarValue::Null) | None => None,
            Some(d) => Some(d.try_as_str()?),
        };

        let state = state.internal_or_init(StringAggState::default)?;
        match &mut state.value {
            Some(current) => {
                if let Some(delimiter) = delimiter {
                    current.push_str(delimiter);
                }
                current.push_str(value);
            }
            None => state.value = Some(value.to_string()),
        }
        if let Some(delimiter) = delimiter {
            state.delimiter = Some(delimiter.to_string());
        }

        Ok(())
    }

    fn combine(&self, state: &mut TransitionValue, other: TransitionValue) -> Result<()> {
        if other.is_null() {
            return Ok(());
        }
        let other = other.downcast_ref::<StringAggState>()?.clone();
        let state = state.internal_or_init(StringAggState::default)?;

        match (&mut state.value, other.value) {
            (Some(current), Some(other_value)) => {
                let delimiter = other.delimiter.as_deref().or(state.delimiter.as_deref());
                if let Some(delimiter) = delimiter {
                    current.push_str(delimiter);
                }
                current.push_str(&other_value);
            }
            (None, Some(other_value)) => state.value = Some(other_value),
            (_, None) => (),
        }
        if other.delimiter.is_some() {
            state.delimiter = other.delimiter;
        }

        Ok(())
    }

    fn finalize(&self, state: &TransitionValue, _direct_args: &[ScalarValue]) -> Result<ScalarValue> {
        if state.is_null() {
            return Ok(ScalarValue::Null);
        }
        let state = state.downcast_ref::<StringAggState>()?;
        Ok(state.value.clone().into())
    }

    fn serialize(&self, state: &TransitionValue) -> Result<ScalarValue> {
        serialize_internal::<StringAggState>(state)
    }

    fn deserialize(&self, value: &ScalarValue) -> Result<TransitionValue> {
        deserialize_internal::<StringAggState>(value)
    }
}
