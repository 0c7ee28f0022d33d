use contquery_error::{DbError, Result};

use crate::arrays::datatype::DataType;
use crate::arrays::scalar::ScalarValue;
use crate::execution::ExecutionContext;
use crate::functions::documentation::{Category, Documentation, Example};
use crate::functions::scalar::{ScalarFunction, ScalarFunctionSet};

pub const FUNCTION_SET_COALESCE: ScalarFunctionSet = ScalarFunctionSet {
    name: "coalesce",
    aliases: &[],
    doc: &Documentation {
        category: Category::General,
        description: "Return the first non-NULL argument.",
        arguments: &["value", "..."],
        example: Some(Example {
            example: "coalesce(NULL, 2, 3)",
            output: "2",
        }),
    },
    function: &Coalesce,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Coalesce;

impl ScalarFunction for Coalesce {
    fn return_type(&self, inputs: &[DataType]) -> Result<DataType> {
        if inputs.is_empty() {
            return Err(DbError::new("coalesce expects at least one argument"));
        }
        let mut result = DataType::Null;
        for input in inputs {
            match (&result, input) {
                (_, DataType::Null) => (),
                (DataType::Null, other) => result = other.clone(),
                (DataType::Int64, DataType::Float64) => result = DataType::Float64,
                (current, other) if other.is_coercible_to(current) => (),
                (current, other) => {
                    return Err(DbError::new(format!(
                        "coalesce arguments have incompatible types {current} and {other}"
                    )));
                }
            }
        }
        Ok(result)
    }

    fn invoke(&self, args: &[ScalarValue], _ctx: &ExecutionContext) -> Result<ScalarValue> {
        Ok(args
            .iter()
            .find(|v| !v.is_null())
            .cloned()
            .unwrap_or(ScalarValue::Null))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coalesce() {
        let ctx = ExecutionContext::new(0);
        let got = Coalesce
            .invoke(&[ScalarValue::Null, ScalarValue::Int64(2), ScalarValue::Int64(3)], &ctx)
            .unwrap();
        assert_eq!(ScalarValue::Int64(2), got);

        assert_eq!(
            DataType::Float64,
            Coalesce
                .return_type(&[DataType::Null, DataType::Int64, DataType::Float64])
                .unwrap()
        );
        assert!(Coalesce.return_type(&[DataType::Utf8, DataType::Int64]).is_err());
    }
}
