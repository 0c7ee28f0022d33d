use contquery_error::{DbError, Result};

use crate::arrays::datatype::DataType;
use crate::arrays::scalar::ScalarValue;
use crate::execution::ExecutionContext;
use crate::functions::FunctionVolatility;
use crate::functions::documentation::{Category, Documentation, Example};
use crate::functions::scalar::{ScalarFunction, ScalarFunctionSet, check_arity};

pub const FUNCTION_SET_ABS: ScalarFunctionSet = ScalarFunctionSet {
    name: "abs",
    aliases: &[],
    doc: &Documentation {
        category: Category::Numeric,
        description: "Compute the absolute value of a number.",
        arguments: &["float"],
        example: Some(Example {
            example: "abs(-5.7)",
            output: "5.7",
        }),
    },
    function: &Abs,
};

pub const FUNCTION_SET_RANDOM: ScalarFunctionSet = ScalarFunctionSet {
    name: "random",
    aliases: &[],
    doc: &Documentation {
        category: Category::Numeric,
        description: "Return a random float between 0 and 1.",
        arguments: &[],
        example: Some(Example {
            example: "random()",
            output: "0.7268028627434533",
        }),
    },
    function: &Random,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Abs;

impl ScalarFunction for Abs {
    fn return_type(&self, inputs: &[DataType]) -> Result<DataType> {
        check_arity("abs", inputs, 1)?;
        match &inputs[0] {
            DataType::Int64 | DataType::Float64 => Ok(inputs[0].clone()),
            DataType::Null | DataType::Any => Ok(DataType::Float64),
            other => Err(DbError::new(format!("abs expects a numeric argument, got {other}"))),
        }
    }

    fn invoke(&self, args: &[ScalarValue], _ctx: &ExecutionContext) -> Result<ScalarValue> {
        match &args[0] {
            ScalarValue::Null => Ok(ScalarValue::Null),
            ScalarValue::Int64(v) => v
                .checked_abs()
                .map(ScalarValue::Int64)
                .ok_or_else(|| DbError::new("Integer overflow in abs")),
            ScalarValue::Float64(v) => Ok(ScalarValue::Float64(v.abs())),
            other => Err(DbError::new(format!("Cannot take abs of {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Random;

impl ScalarFunction for Random {
    fn volatility(&self) -> FunctionVolatility {
        FunctionVolatility::Volatile
    }

    fn return_type(&self, inputs: &[DataType]) -> Result<DataType> {
        check_arity("random", inputs, 0)?;
        Ok(DataType::Float64)
    }

    fn invoke(&self, _args: &[ScalarValue], _ctx: &ExecutionContext) -> Result<ScalarValue> {
        Ok(ScalarValue::Float64(rand::random::<f64>()))
    }
}
