use std::cmp::Ordering;

use contquery_error::{DbError, ErrorKind, Result};
use contquery_parser::ast::BinaryOperator;

use crate::arrays::datatype::DataType;
use crate::arrays::interval::Interval;
use crate::arrays::scalar::ScalarValue;

/// Compute the result type of a binary expression, erroring on operand
/// types the operator doesn't accept.
pub fn binary_result_type(left: &DataType, op: BinaryOperator, right: &DataType) -> Result<DataType> {
    use DataType as D;

    if op.is_comparison() {
        return Ok(D::Boolean);
    }

    let datatype = match op {
        BinaryOperator::And | BinaryOperator::Or => D::Boolean,
        BinaryOperator::StringConcat => D::Utf8,
        _ => match (left, right) {
            (D::Null, other) | (other, D::Null) => other.clone(),
            (D::Any, _) | (_, D::Any) => D::Any,
            (D::Int64, D::Int64) => D::Int64,
            (a, b) if a.is_numeric() && b.is_numeric() => D::Float64,
            (D::Timestamp, D::Interval) | (D::Utf8, D::Interval)
                if matches!(op, BinaryOperator::Plus | BinaryOperator::Minus) =>
            {
                D::Timestamp
            }
            (D::Interval, D::Timestamp) if op == BinaryOperator::Plus => D::Timestamp,
            (D::Timestamp, D::Timestamp) if op == BinaryOperator::Minus => D::Interval,
            (D::Interval, D::Interval) if matches!(op, BinaryOperator::Plus | BinaryOperator::Minus) => {
                D::Interval
            }
            (D::Interval, n) if n.is_numeric() && matches!(op, BinaryOperator::Multiply | BinaryOperator::Divide) => {
                D::Interval
            }
            (n, D::Interval) if n.is_numeric() && op == BinaryOperator::Multiply => D::Interval,
            (a, b) => {
                return Err(DbError::new(format!(
                    "Operator '{op}' not supported for {a} and {b}"
                )));
            }
        },
    };

    Ok(datatype)
}

/// Evaluate a binary operator over two already evaluated operands.
pub fn eval_binary(left: &ScalarValue, op: BinaryOperator, right: &ScalarValue) -> Result<ScalarValue> {
    match op {
        BinaryOperator::And => return eval_and(left, right),
        BinaryOperator::Or => return eval_or(left, right),
        _ => (),
    }

    if left.is_null() || right.is_null() {
        return Ok(ScalarValue::Null);
    }

    if op.is_comparison() {
        let ord = compare_values(left, right)?;
        let result = match op {
            BinaryOperator::Eq => ord == Ordering::Equal,
            BinaryOperator::NotEq => ord != Ordering::Equal,
            BinaryOperator::Lt => ord == Ordering::Less,
            BinaryOperator::LtEq => ord != Ordering::Greater,
            BinaryOperator::Gt => ord == Ordering::Greater,
            BinaryOperator::GtEq => ord != Ordering::Less,
            _ => unreachable!("checked comparison"),
        };
        return Ok(ScalarValue::Boolean(result));
    }

    if op == BinaryOperator::StringConcat {
        return Ok(ScalarValue::Utf8(format!("{left}{right}")));
    }

    eval_arith(left, op, right)
}

fn eval_and(left: &ScalarValue, right: &ScalarValue) -> Result<ScalarValue> {
    let l = left.cast_to(&DataType::Boolean)?;
    let r = right.cast_to(&DataType::Boolean)?;
    Ok(match (l, r) {
        (ScalarValue::Boolean(false), _) | (_, ScalarValue::Boolean(false)) => false.into(),
        (ScalarValue::Boolean(true), ScalarValue::Boolean(true)) => true.into(),
        _ => ScalarValue::Null,
    })
}

fn eval_or(left: &ScalarValue, right: &ScalarValue) -> Result<ScalarValue> {
    let l = left.cast_to(&DataType::Boolean)?;
    let r = right.cast_to(&DataType::Boolean)?;
    Ok(match (l, r) {
        (ScalarValue::Boolean(true), _) | (_, ScalarValue::Boolean(true)) => true.into(),
        (ScalarValue::Boolean(false), ScalarValue::Boolean(false)) => false.into(),
        _ => ScalarValue::Null,
    })
}

/// Compare two non-null values, coercing string literals to the type of the
/// other side.
pub fn compare_values(left: &ScalarValue, right: &ScalarValue) -> Result<Ordering> {
    use ScalarValue as S;

    match (left, right) {
        (S::Int64(_) | S::Float64(_), S::Int64(_) | S::Float64(_)) => Ok(left.cmp(right)),
        (S::Utf8(_), S::Utf8(_)) => Ok(left.cmp(right)),
        (S::Utf8(_), other) => Ok(left.cast_to(&other.datatype())?.cmp(other)),
        (other, S::Utf8(_)) => Ok(other.cmp(&right.cast_to(&other.datatype())?)),
        (a, b) if a.datatype() == b.datatype() => Ok(a.cmp(b)),
        (a, b) => Err(DbError::new(format!(
            "Cannot compare {} with {}",
            a.datatype(),
            b.datatype()
        ))),
    }
}

fn overflow() -> DbError {
    DbError::new("Arithmetic overflow").with_kind(ErrorKind::Execution)
}

fn division_by_zero() -> DbError {
    DbError::new("Division by zero").with_kind(ErrorKind::Execution)
}

fn eval_arith(left: &ScalarValue, op: BinaryOperator, right: &ScalarValue) -> Result<ScalarValue> {
    use ScalarValue as S;

    let unsupported = || {
        DbError::new(format!(
            "Operator '{op}' not supported for {} and {}",
            left.datatype(),
            right.datatype()
        ))
    };

    match (left, right) {
        (S::Int64(a), S::Int64(b)) => {
            let v = match op {
                BinaryOperator::Plus => a.checked_add(*b),
                BinaryOperator::Minus => a.checked_sub(*b),
                BinaryOperator::Multiply => a.checked_mul(*b),
                BinaryOperator::Divide => {
                    if *b == 0 {
                        return Err(division_by_zero());
                    }
                    a.checked_div(*b)
                }
                BinaryOperator::Modulo => {
                    if *b == 0 {
                        return Err(division_by_zero());
                    }
                    a.checked_rem(*b)
                }
                _ => return Err(unsupported()),
            };
            v.map(S::Int64).ok_or_else(overflow)
        }
        (S::Int64(_) | S::Float64(_), S::Int64(_) | S::Float64(_)) => {
            let a = left.try_as_f64()?;
            let b = right.try_as_f64()?;
            let v = match op {
                BinaryOperator::Plus => a + b,
                BinaryOperator::Minus => a - b,
                BinaryOperator::Multiply => a * b,
                BinaryOperator::Divide => {
                    if b == 0.0 {
                        return Err(division_by_zero());
                    }
                    a / b
                }
                BinaryOperator::Modulo => {
                    if b == 0.0 {
                        return Err(division_by_zero());
                    }
                    a % b
                }
                _ => return Err(unsupported()),
            };
            Ok(S::Float64(v))
        }
        (S::Timestamp(ts), S::Interval(i)) => {
            let micros = match op {
                BinaryOperator::Plus => ts.checked_add(i.total_micros()),
                BinaryOperator::Minus => ts.checked_sub(i.total_micros()),
                _ => return Err(unsupported()),
            };
            micros.map(S::Timestamp).ok_or_else(overflow)
        }
        (S::Interval(i), S::Timestamp(ts)) if op == BinaryOperator::Plus => ts
            .checked_add(i.total_micros())
            .map(S::Timestamp)
            .ok_or_else(overflow),
        (S::Timestamp(a), S::Timestamp(b)) if op == BinaryOperator::Minus => a
            .checked_sub(*b)
            .map(|d| S::Interval(Interval::from_micros(d)))
            .ok_or_else(overflow),
        (S::Interval(a), S::Interval(b)) => {
            let v = match op {
                BinaryOperator::Plus => a.checked_add(b),
                BinaryOperator::Minus => a.checked_add(&b.negate()),
                _ => return Err(unsupported()),
            };
            v.map(S::Interval).ok_or_else(overflow)
        }
        (S::Interval(i), n @ (S::Int64(_) | S::Float64(_))) => {
            let factor = n.try_as_f64()?;
            match op {
                BinaryOperator::Multiply => Ok(S::Interval(i.scale(factor))),
                BinaryOperator::Divide => {
                    if factor == 0.0 {
                        return Err(division_by_zero());
                    }
                    Ok(S::Interval(i.scale(1.0 / factor)))
                }
                _ => Err(unsupported()),
            }
        }
        (n @ (S::Int64(_) | S::Float64(_)), S::Interval(i)) if op == BinaryOperator::Multiply => {
            Ok(S::Interval(i.scale(n.try_as_f64()?)))
        }
        // String literals next to datetimes take the datetime's type.
        (S::Utf8(_), S::Interval(_)) => eval_arith(&left.cast_to(&DataType::Timestamp)?, op, right),
        (S::Timestamp(_), S::Utf8(_)) => eval_arith(left, op, &right.cast_to(&DataType::Interval)?),
        _ => Err(unsupported()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrays::scalar::parse_timestamp;

    #[test]
    fn three_valued_logic() {
        use BinaryOperator::{And, Or};
        let t = ScalarValue::Boolean(true);
        let f = ScalarValue::Boolean(false);
        let n = ScalarValue::Null;
        // (left, op, right, expected)
        let cases = [
            (&t, And, &n, ScalarValue::Null),
            (&f, And, &n, f.clone()),
            (&t, Or, &n, t.clone()),
            (&f, Or, &n, ScalarValue::Null),
            (&t, And, &t, t.clone()),
        ];
        for (l, op, r, expected) in cases {
            assert_eq!(expected, eval_binary(l, op, r).unwrap(), "{l} {op} {r}");
        }
    }

    #[test]
    fn timestamp_interval_arith() {
        let ts = ScalarValue::Timestamp(parse_timestamp("2024-05-01 10:00:00").unwrap());
        let hour = ScalarValue::Interval(Interval::parse("1 hour").unwrap());

        let got = eval_binary(&ts, BinaryOperator::Minus, &hour).unwrap();
        assert_eq!(
            ScalarValue::Timestamp(parse_timestamp("2024-05-01 09:00:00").unwrap()),
            got
        );

        let cmp = eval_binary(&ts, BinaryOperator::Gt, &got).unwrap();
        assert_eq!(ScalarValue::Boolean(true), cmp);
    }

    #[test]
    fn compare_string_with_timestamp() {
        let ts = ScalarValue::Timestamp(parse_timestamp("2024-05-01 10:00:00").unwrap());
        let s = ScalarValue::from("2024-05-01 09:00:00");
        assert_eq!(Ordering::Greater, compare_values(&ts, &s).unwrap());
    }

    #[test]
    fn integer_division_by_zero() {
        let err = eval_binary(&1_i64.into(), BinaryOperator::Divide, &0_i64.into()).unwrap_err();
        assert_eq!(ErrorKind::Execution, err.kind());
    }

    #[test]
    fn result_types() {
        use DataType as D;
        // (left, op, right, expected)
        let cases = [
            (D::Int64, BinaryOperator::Plus, D::Int64, D::Int64),
            (D::Int64, BinaryOperator::Divide, D::Float64, D::Float64),
            (D::Timestamp, BinaryOperator::Minus, D::Interval, D::Timestamp),
            (D::Timestamp, BinaryOperator::Minus, D::Timestamp, D::Interval),
            (D::Utf8, BinaryOperator::Eq, D::Int64, D::Boolean),
        ];
        for (l, op, r, expected) in cases {
            assert_eq!(expected, binary_result_type(&l, op, &r).unwrap());
        }
        assert!(binary_result_type(&D::Utf8, BinaryOperator::Plus, &D::Int64).is_err());
    }
}
