use contquery_error::Result;

use crate::arrays::datatype::DataType;
use crate::arrays::scalar::ScalarValue;
use crate::execution::ExecutionContext;
use crate::functions::documentation::{Category, Documentation, Example};
use crate::functions::scalar::{ScalarFunction, ScalarFunctionSet, check_arg, check_arity};

pub const FUNCTION_SET_LOWER: ScalarFunctionSet = ScalarFunctionSet {
    name: "lower",
    aliases: &[],
    doc: &Documentation {
        category: Category::String,
        description: "Convert the string to lowercase.",
        arguments: &["string"],
        example: Some(Example {
            example: "lower('ABC')",
            output: "abc",
        }),
    },
    function: &Lower,
};

pub const FUNCTION_SET_UPPER: ScalarFunctionSet = ScalarFunctionSet {
    name: "upper",
    aliases: &[],
    doc: &Documentation {
        category: Category::String,
        description: "Convert the string to uppercase.",
        arguments: &["string"],
        example: Some(Example {
            example: "upper('ABC')",
            output: "ABC",
        }),
    },
    function: &Upper,
};

pub const FUNCTION_SET_LENGTH: ScalarFunctionSet = ScalarFunctionSet {
    name: "length",
    aliases: &["char_length", "character_length"],
    doc: &Documentation {
        category: Category::String,
        description: "Get the number of characters in a string.",
        arguments: &["string"],
        example: Some(Example {
            example: "length('tschüß')",
            output: "6",
        }),
    },
    function: &Length,
};

fn map_str(args: &[ScalarValue], f: impl Fn(&str) -> ScalarValue) -> Result<ScalarValue> {
    match &args[0] {
        ScalarValue::Null => Ok(ScalarValue::Null),
        v => Ok(f(v.try_as_str()?)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lower;

impl ScalarFunction for Lower {
    fn return_type(&self, inputs: &[DataType]) -> Result<DataType> {
        check_arity("lower", inputs, 1)?;
        check_arg("lower", &inputs[0], DataType::Utf8)?;
        Ok(DataType::Utf8)
    }

    fn invoke(&self, args: &[ScalarValue], _ctx: &ExecutionContext) -> Result<ScalarValue> {
        map_str(args, |s| s.to_lowercase().into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Upper;

impl ScalarFunction for Upper {
    fn return_type(&self, inputs: &[DataType]) -> Result<DataType> {
        check_arity("upper", inputs, 1)?;
        check_arg("upper", &inputs[0], DataType::Utf8)?;
        Ok(DataType::Utf8)
    }

    fn invoke(&self, args: &[ScalarValue], _ctx: &ExecutionContext) -> Result<ScalarValue> {
        map_str(args, |s| s.to_uppercase().into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Length;

impl ScalarFunction for Length {
    fn return_type(&self, inputs: &[DataType]) -> Result<DataType> {
        check_arity("length", inputs, 1)?;
        check_arg("length", &inputs[0], DataType::Utf8)?;
        Ok(DataType::Int64)
    }

    fn invoke(&self, args: &[ScalarValue], _ctx: &ExecutionContext) -> Result<ScalarValue> {
        map_str(args, |s| ScalarValue::Int64(s.chars().count() as i64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_functions() {
        let ctx = ExecutionContext::new(0);
        // (function, input, expected)
        let cases: [(&dyn ScalarFunction, ScalarValue, ScalarValue); 4] = [
            (&Lower, "AbC".into(), "abc".into()),
            (&Upper, "AbC".into(), "ABC".into()),
            (&Length, "tschüß".into(), ScalarValue::Int64(6)),
            (&Length, ScalarValue::Null, ScalarValue::Null),
        ];
        for (func, input, expected) in cases {
            assert_eq!(expected, func.invoke(&[input], &ctx).unwrap());
        }
    }
}
