use std::cmp::Ordering;

use contquery_error::Result;

use super::{BuiltinAggregate, first_arg};
use crate::arrays::datatype::DataType;
use crate::arrays::scalar::ScalarValue;
use crate::catalog::{AggregateDefinition, CombinerDefinition, FunctionDef, StateType};
use crate::functions::aggregate::{AggregateBehavior, TransitionValue};
use crate::functions::documentation::{Category, Documentation};

static MIN_DOC: Documentation = Documentation {
    category: Category::GENERAL_PURPOSE_AGGREGATE,
    description: "Return the minimum non-NULL value seen from input.",
    arguments: &["input"],
    example: None,
};

static MAX_DOC: Documentation = Documentation {
    category: Category::GENERAL_PURPOSE_AGGREGATE,
    description: "Return the maximum non-NULL value seen from input.",
    arguments: &["input"],
    example: None,
};

const MINMAX_TYPES: &[(DataType, &str)] = &[
    (DataType::Int64, "int8"),
    (DataType::Float64, "float8"),
    (DataType::Utf8, "text"),
    (DataType::Timestamp, "timestamp"),
    (DataType::Interval, "interval"),
    (DataType::Boolean, "bool"),
];

pub fn definitions() -> Vec<BuiltinAggregate> {
    let mut defs = Vec::new();
    for (datatype, type_name) in MINMAX_TYPES {
        let variants: [(&str, &str, &'static dyn AggregateBehavior, &'static Documentation); 2] = [
            ("min", "smaller", &Min, &MIN_DOC),
            ("max", "larger", &Max, &MAX_DOC),
        ];
        for (name, func, behavior, doc) in variants {
            // Transition and combine are the same function.
            let func = format!("{type_name}{func}");
            defs.push((
                AggregateDefinition::new(
                    name,
                    vec![datatype.clone()],
                    FunctionDef::strict(func.clone()),
                    StateType::Value(datatype.clone()),
                    behavior,
                )
                .with_doc(doc),
                Some(CombinerDefinition::new(
                    FunctionDef::strict(func),
                    StateType::Value(datatype.clone()),
                )),
            ));
        }
    }
    defs
}

fn keep_if(state: &mut TransitionValue, input: &ScalarValue, replace_when: Ordering) -> Result<()> {
    let current = state.as_datum()?;
    if current.is_null() || input.cmp(current) == replace_when {
        *state = TransitionValue::Datum(input.clone());
    }
    Ok(())
}

#[derive(Debug, Clone, Copy)]
pub struct Min;

impl AggregateBehavior for Min {
    fn transition(&self, state: &mut TransitionValue, args: &[ScalarValue]) -> Result<()> {
        keep_if(state, first_arg(args)?, Ordering::Less)
    }

    fn combine(&self, state: &mut TransitionValue, other: TransitionValue) -> Result<()> {
        keep_if(state, other.as_datum()?, Ordering::Less)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Max;

impl AggregateBehavior for Max {
    fn transition(&self, state: &mut TransitionValue, args: &[ScalarValue]) -> Result<()> {
        keep_if(state, first_arg(args)?, Ordering::Greater)
    }

    fn combine(&self, state: &mut TransitionValue, other: TransitionValue) -> Result<()> {
        keep_if(state, other.as_datum()?, Ordering::Greater)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_max_transition() {
        let mut min = TransitionValue::Datum(ScalarValue::Int64(5));
        let mut max = min.clone();
        for v in [3, 9, 4] {
            Min.transition(&mut min, &[ScalarValue::Int64(v)]).unwrap();
            Max.transition(&mut max, &[ScalarValue::Int64(v)]).unwrap();
        }
        assert_eq!(&ScalarValue::Int64(3), min.as_datum().unwrap());
        assert_eq!(&ScalarValue::Int64(9), max.as_datum().unwrap());

        Max.combine(&mut max, TransitionValue::Datum(ScalarValue::Int64(12)))
            .unwrap();
        assert_eq!(&ScalarValue::Int64(12), max.as_datum().unwrap());
    }
}
