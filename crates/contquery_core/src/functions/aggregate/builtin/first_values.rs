use contquery_error::{DbError, ErrorKind, Result};
use serde::{Deserialize, Serialize};

use super::{BuiltinAggregate, CollectedValues, first_arg};
use crate::arrays::datatype::DataType;
use crate::arrays::scalar::ScalarValue;
use crate::catalog::{
    AggregateDefinition, AggregateKind, CombinerDefinition, FunctionDef, ReturnType, StateType,
};
use crate::functions::aggregate::{
    AggregateBehavior, TransitionValue, deserialize_internal, serialize_internal,
};
use crate::functions::documentation::{Category, Documentation, Example};

static FIRST_VALUES_DOC: Documentation = Documentation {
    category: Category::ORDERED_SET_AGGREGATE,
    description: "The first n inputs in the WITHIN GROUP ordering, as a list.",
    arguments: &["n", "input"],
    example: Some(Example {
        example: "first_values(3) WITHIN GROUP (ORDER BY latency)",
        output: "[1, 2, 2]",
    }),
};

static COMBINABLE_FIRST_VALUES_DOC: Documentation = Documentation {
    category: Category::STREAMING_AGGREGATE,
    description: "The n smallest inputs in ascending order, keeping only n values per partial state.",
    arguments: &["n", "input"],
    example: Some(Example {
        example: "combinable_first_values(3, latency)",
        output: "[1, 2, 2]",
    }),
};

pub fn definitions() -> Vec<BuiltinAggregate> {
    vec![
        (
            AggregateDefinition::new(
                "first_values",
                vec![DataType::Int64, DataType::Any],
                FunctionDef::non_strict("first_values_ordered_trans"),
                StateType::Internal,
                &FirstValues,
            )
            .with_kind(AggregateKind::OrderedSet, 1)
            .with_finalize(
                FunctionDef::strict("first_values_ordered_final"),
                ReturnType::ListOfArg(1),
            )
            .with_doc(&FIRST_VALUES_DOC),
            None,
        ),
        (
            AggregateDefinition::new(
                "combinable_first_values",
                vec![DataType::Int64, DataType::Any],
                FunctionDef::non_strict("first_values_trans"),
                StateType::Internal,
                &CombinableFirstValues,
            )
            .with_finalize(FunctionDef::strict("first_values_final"), ReturnType::ListOfArg(1))
            .with_doc(&COMBINABLE_FIRST_VALUES_DOC),
            Some(
                CombinerDefinition::new(FunctionDef::strict("first_values_combine"), StateType::Internal)
                    .with_serialization(
                        FunctionDef::strict("first_values_serialize"),
                        FunctionDef::strict("first_values_deserialize"),
                    ),
            ),
        ),
    ]
}

fn value_count(n: &ScalarValue) -> Result<usize> {
    let n = n.try_as_i64()?;
    if n < 1 {
        return Err(DbError::new(format!("Number of values must be positive, got {n}"))
            .with_kind(ErrorKind::Execution));
    }
    Ok(n as usize)
}

/// Exact form, inputs arrive in WITHIN GROUP order.
#[derive(Debug, Clone, Copy)]
pub struct FirstValues;

impl AggregateBehavior for FirstValues {
    fn transition(&self, state: &mut TransitionValue, args: &[ScalarValue]) -> Result<()> {
        let value = first_arg(args)?;
        state
            .internal_or_init(CollectedValues::default)?
            .values
            .push(value.clone());
        Ok(())
    }

    fn finalize(&self, state: &TransitionValue, direct_args: &[ScalarValue]) -> Result<ScalarValue> {
        let n = match direct_args.first() {
            Some(n) => value_count(n)?,
            None => return Err(DbError::new("Missing number of values")),
        };
        let values = &state.downcast_ref::<CollectedValues>()?.values;
        Ok(ScalarValue::List(values.iter().take(n).cloned().collect()))
    }
}

/// The `n` smallest values seen, ascending with nulls last.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FirstValuesState {
    n: usize,
    values: Vec<ScalarValue>,
}

impl FirstValuesState {
    fn insert(&mut self, value: ScalarValue) {
        if self.values.len() >= self.n {
            match self.values.last() {
                Some(last) if value < *last => {
                    self.values.pop();
                }
                _ => return,
            }
        }
        // Equal values keep arrival order.
        let pos = self.values.partition_point(|v| v <= &value);
        self.values.insert(pos, value);
    }

    fn merge(&mut self, other: &FirstValuesState) {
        let mut merged = Vec::with_capacity(self.n);
        let (mut left, mut right) = (self.values.iter().peekable(), other.values.iter().peekable());
        while merged.len() < self.n {
            // Ties take the left side first.
            let take_right = match (left.peek(), right.peek()) {
                (Some(l), Some(r)) => r < l,
                (None, Some(_)) => true,
                (Some(_), None) => false,
                (None, None) => break,
            };
            let next = if take_right { right.next() } else { left.next() };
            if let Some(v) = next {
                merged.push(v.clone());
            }
        }
        self.values = merged;
    }
}

/// `first_values` with the count as a regular argument so partial states
/// can be merged.
#[derive(Debug, Clone, Copy)]
pub struct CombinableFirstValues;

impl AggregateBehavior for CombinableFirstValues {
    fn transition(&self, state: &mut TransitionValue, args: &[ScalarValue]) -> Result<()> {
        let (n, value) = match args {
            [n, value] => (n, value),
            _ => return Err(DbError::new("Expected count and value arguments")),
        };
        if n.is_null() {
            return Ok(());
        }
        let n = value_count(n)?;
        state
            .internal_or_init(|| FirstValuesState {
                n,
                values: Vec::with_capacity(n),
            })?
            .insert(value.clone());
        Ok(())
    }

    fn combine(&self, state: &mut TransitionValue, other: TransitionValue) -> Result<()> {
        if other.is_null() {
            return Ok(());
        }
        if state.is_null() {
            *state = other;
            return Ok(());
        }
        let other = other.downcast_ref::<FirstValuesState>()?;
        state.downcast_mut::<FirstValuesState>()?.merge(other);
        Ok(())
    }

    fn finalize(&self, state: &TransitionValue, _direct_args: &[ScalarValue]) -> Result<ScalarValue> {
        let state = state.downcast_ref::<FirstValuesState>()?;
        Ok(ScalarValue::List(state.values.clone()))
    }

    fn serialize(&self, state: &TransitionValue) -> Result<ScalarValue> {
        serialize_internal::<FirstValuesState>(state)
    }

    fn deserialize(&self, value: &ScalarValue) -> Result<TransitionValue> {
        deserialize_internal::<FirstValuesState>(value)
    }
}
