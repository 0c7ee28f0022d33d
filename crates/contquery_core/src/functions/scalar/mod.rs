pub mod builtin;

use std::fmt::Debug;

use contquery_error::{DbError, Result};

use super::FunctionVolatility;
use super::documentation::Documentation;
use crate::arrays::datatype::DataType;
use crate::arrays::scalar::ScalarValue;
use crate::execution::ExecutionContext;

/// A scalar function evaluated one row at a time.
pub trait ScalarFunction: Debug + Sync + Send {
    fn volatility(&self) -> FunctionVolatility {
        FunctionVolatility::Consistent
    }

    /// Check the argument types and compute the return type.
    fn return_type(&self, inputs: &[DataType]) -> Result<DataType>;

    fn invoke(&self, args: &[ScalarValue], ctx: &ExecutionContext) -> Result<ScalarValue>;
}

/// A named scalar function with its documentation.
#[derive(Debug, Clone, Copy)]
pub struct ScalarFunctionSet {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub doc: &'static Documentation,
    pub function: &'static dyn ScalarFunction,
}

impl ScalarFunctionSet {
    pub fn matches(&self, name: &str) -> bool {
        self.name == name || self.aliases.contains(&name)
    }
}

/// Look up a builtin scalar function by name or alias.
pub fn find_scalar_function(name: &str) -> Option<&'static ScalarFunctionSet> {
    builtin::BUILTIN_SCALAR_FUNCTION_SETS
        .iter()
        .find(|set| set.matches(name))
}

/// If calling the named function may produce different values for the same
/// inputs. Unknown functions are treated as volatile.
pub fn is_volatile_function(name: &str) -> bool {
    match find_scalar_function(name) {
        Some(set) => set.function.volatility() == FunctionVolatility::Volatile,
        None => true,
    }
}

/// Error unless exactly `n` arguments were provided.
pub(crate) fn check_arity(name: &str, inputs: &[DataType], n: usize) -> Result<()> {
    if inputs.len() != n {
        return Err(DbError::new(format!(
            "{name} expects {n} argument(s), got {}",
            inputs.len()
        )));
    }
    Ok(())
}

/// Error if an argument isn't coercible to the expected type.
pub(crate) fn check_arg(name: &str, input: &DataType, expected: DataType) -> Result<()> {
    if !input.is_coercible_to(&expected) {
        return Err(DbError::new(format!(
            "{name} expects an argument of type {expected}, got {input}"
        )));
    }
    Ok(())
}
