pub mod aggregate;
pub mod documentation;
pub mod scalar;

/// Whether repeated evaluation with the same inputs produces the same output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionVolatility {
    /// Same inputs produce the same output within a statement.
    Consistent,
    /// Every call may produce a different value.
    Volatile,
}
