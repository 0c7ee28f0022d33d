//! Bound expressions evaluated against a single row.
pub mod aggregate;
pub mod binary;

use std::fmt;
use std::sync::Arc;

use contquery_error::{DbError, Result, ResultExt};
use contquery_parser::ast::{BinaryOperator, UnaryOperator};

use crate::arrays::datatype::DataType;
use crate::arrays::field::Row;
use crate::arrays::scalar::ScalarValue;
use crate::catalog::descriptor::AggregateDescriptor;
use crate::execution::ExecutionContext;
use crate::functions::aggregate::TransitionValue;
use crate::functions::scalar::ScalarFunctionSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnExpr {
    pub idx: usize,
    pub name: String,
    pub datatype: DataType,
}

#[derive(Debug, Clone)]
pub struct ScalarFunctionExpr {
    pub function: &'static ScalarFunctionSet,
    pub args: Vec<PhysicalExpr>,
    pub return_type: DataType,
}

/// Produce an aggregate's final value from a stored partial state.
#[derive(Debug, Clone)]
pub struct FinalizeExpr {
    pub descriptor: Arc<AggregateDescriptor>,
    /// Input holds the output of the aggregate's serialize function.
    pub serialized: bool,
    pub input: Box<PhysicalExpr>,
    pub return_type: DataType,
}

/// Sort key with direction and null placement.
#[derive(Debug, Clone)]
pub struct PhysicalSortExpr {
    pub expr: PhysicalExpr,
    pub desc: bool,
    pub nulls_first: bool,
}

impl fmt::Display for PhysicalSortExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expr)?;
        if self.desc {
            write!(f, " DESC")?;
        }
        if self.nulls_first {
            write!(f, " NULLS FIRST")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub enum PhysicalExpr {
    Column(ColumnExpr),
    Literal(ScalarValue),
    Binary {
        left: Box<PhysicalExpr>,
        op: BinaryOperator,
        right: Box<PhysicalExpr>,
    },
    Unary {
        op: UnaryOperator,
        expr: Box<PhysicalExpr>,
    },
    IsNull {
        expr: Box<PhysicalExpr>,
        negated: bool,
    },
    Cast {
        datatype: DataType,
        expr: Box<PhysicalExpr>,
    },
    ScalarFunction(ScalarFunctionExpr),
    Finalize(FinalizeExpr),
}

impl PhysicalExpr {
    pub fn column(idx: usize, name: impl Into<String>, datatype: DataType) -> Self {
        PhysicalExpr::Column(ColumnExpr {
            idx,
            name: name.into(),
            datatype,
        })
    }

    pub fn datatype(&self) -> DataType {
        match self {
            Self::Column(col) => col.datatype.clone(),
            Self::Literal(v) => v.datatype(),
            Self::Binary { left, op, right } => {
                binary::binary_result_type(&left.datatype(), *op, &right.datatype())
                    .unwrap_or(DataType::Any)
            }
            Self::Unary { op, expr } => match op {
                UnaryOperator::Not => DataType::Boolean,
                _ => expr.datatype(),
            },
            Self::IsNull { .. } => DataType::Boolean,
            Self::Cast { datatype, .. } => datatype.clone(),
            Self::ScalarFunction(func) => func.return_type.clone(),
            Self::Finalize(finalize) => finalize.return_type.clone(),
        }
    }

    /// Evaluate the expression for a single row.
    pub fn eval(&self, row: &Row, ctx: &ExecutionContext) -> Result<ScalarValue> {
        match self {
            Self::Column(col) => row.get(col.idx).cloned().ok_or_else(|| {
                DbError::new("Column index out of range")
                    .with_field("column", col.name.clone())
                    .with_field("index", col.idx)
                    .with_field("row_len", row.len())
            }),
            Self::Literal(v) => Ok(v.clone()),
            Self::Binary { left, op, right } => {
                let l = left.eval(row, ctx)?;
                let r = right.eval(row, ctx)?;
                binary::eval_binary(&l, *op, &r)
            }
            Self::Unary { op, expr } => eval_unary(*op, expr.eval(row, ctx)?),
            Self::IsNull { expr, negated } => {
                let is_null = expr.eval(row, ctx)?.is_null();
                Ok(ScalarValue::Boolean(is_null != *negated))
            }
            Self::Cast { datatype, expr } => expr.eval(row, ctx)?.cast_to(datatype),
            Self::ScalarFunction(func) => {
                let args = func
                    .args
                    .iter()
                    .map(|arg| arg.eval(row, ctx))
                    .collect::<Result<Vec<_>>>()?;
                func.function.function.invoke(&args, ctx)
            }
            Self::Finalize(finalize) => finalize.eval(row, ctx),
        }
    }

    /// Evaluate as a predicate. Nulls are treated as false.
    pub fn eval_predicate(&self, row: &Row, ctx: &ExecutionContext) -> Result<bool> {
        match self.eval(row, ctx)? {
            ScalarValue::Null => Ok(false),
            v => v.try_as_bool(),
        }
    }

    /// If evaluating this expression may produce different results for the
    /// same input row.
    pub fn is_volatile(&self) -> bool {
        match self {
            Self::ScalarFunction(func) => {
                func.function.function.volatility() == crate::functions::FunctionVolatility::Volatile
                    || func.args.iter().any(|a| a.is_volatile())
            }
            Self::Binary { left, right, .. } => left.is_volatile() || right.is_volatile(),
            Self::Unary { expr, .. } | Self::IsNull { expr, .. } | Self::Cast { expr, .. } => {
                expr.is_volatile()
            }
            Self::Finalize(f) => f.input.is_volatile(),
            Self::Column(_) | Self::Literal(_) => false,
        }
    }

    /// Column index if this is a plain column reference.
    pub fn as_column(&self) -> Option<&ColumnExpr> {
        match self {
            Self::Column(col) => Some(col),
            _ => None,
        }
    }
}

fn eval_unary(op: UnaryOperator, value: ScalarValue) -> Result<ScalarValue> {
    if value.is_null() {
        return Ok(ScalarValue::Null);
    }
    match op {
        UnaryOperator::Plus => Ok(value),
        UnaryOperator::Not => Ok(ScalarValue::Boolean(!value.try_as_bool()?)),
        UnaryOperator::Minus => match value {
            ScalarValue::Int64(v) => v
                .checked_neg()
                .map(ScalarValue::Int64)
                .ok_or_else(|| DbError::new("Integer overflow in negation")),
            ScalarValue::Float64(v) => Ok(ScalarValue::Float64(-v)),
            ScalarValue::Interval(v) => Ok(ScalarValue::Interval(v.negate())),
            other => Err(DbError::new(format!("Cannot negate {other}"))),
        },
    }
}

impl FinalizeExpr {
    fn eval(&self, row: &Row, ctx: &ExecutionContext) -> Result<ScalarValue> {
        let desc = &self.descriptor;
        let input = self.input.eval(row, ctx)?;

        if input.is_null() && (desc.finalize_strict || desc.finalize_fn.is_none()) {
            return Ok(ScalarValue::Null);
        }

        let state = if input.is_null() {
            TransitionValue::null()
        } else if self.serialized {
            desc.behavior
                .deserialize(&input)
                .context_fn(|| format!("Failed to deserialize state for {}", desc.name))?
        } else {
            TransitionValue::Datum(input)
        };

        if desc.finalize_fn.is_none() {
            return desc.behavior.serialize(&state);
        }
        desc.behavior.finalize(&state, &[])
    }
}

impl fmt::Display for PhysicalExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Column(col) => write!(f, "#{}", col.idx),
            Self::Literal(ScalarValue::Utf8(s)) => write!(f, "'{s}'"),
            Self::Literal(v) => write!(f, "{v}"),
            Self::Binary { left, op, right } => write!(f, "({left} {op} {right})"),
            Self::Unary { op, expr } => match op {
                UnaryOperator::Not => write!(f, "NOT {expr}"),
                UnaryOperator::Minus => write!(f, "-{expr}"),
                UnaryOperator::Plus => write!(f, "+{expr}"),
            },
            Self::IsNull { expr, negated } => {
                if *negated {
                    write!(f, "{expr} IS NOT NULL")
                } else {
                    write!(f, "{expr} IS NULL")
                }
            }
            Self::Cast { datatype, expr } => write!(f, "CAST({expr} AS {datatype})"),
            Self::ScalarFunction(func) => {
                write!(f, "{}(", func.function.name)?;
                for (idx, arg) in func.args.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
            Self::Finalize(finalize) => {
                write!(f, "finalize[{}]({})", finalize.descriptor.name, finalize.input)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eval_column_arith() {
        let expr = PhysicalExpr::Binary {
            left: Box::new(PhysicalExpr::column(1, "b", DataType::Int64)),
            op: BinaryOperator::Multiply,
            right: Box::new(PhysicalExpr::Literal(ScalarValue::Int64(3))),
        };
        let ctx = ExecutionContext::new(0);
        let row = vec![ScalarValue::Null, ScalarValue::Int64(4)];
        assert_eq!(ScalarValue::Int64(12), expr.eval(&row, &ctx).unwrap());
        assert_eq!("(#1 * 3)", expr.to_string());
    }

    #[test]
    fn predicate_null_is_false() {
        let expr = PhysicalExpr::Binary {
            left: Box::new(PhysicalExpr::column(0, "a", DataType::Int64)),
            op: BinaryOperator::Gt,
            right: Box::new(PhysicalExpr::Literal(ScalarValue::Int64(3))),
        };
        let ctx = ExecutionContext::new(0);
        assert!(!expr.eval_predicate(&vec![ScalarValue::Null], &ctx).unwrap());
        assert!(expr.eval_predicate(&vec![ScalarValue::Int64(5)], &ctx).unwrap());
    }

    #[test]
    fn column_out_of_range() {
        let expr = PhysicalExpr::column(3, "d", DataType::Int64);
        let ctx = ExecutionContext::new(0);
        assert!(expr.eval(&vec![ScalarValue::Null], &ctx).is_err());
    }
}
