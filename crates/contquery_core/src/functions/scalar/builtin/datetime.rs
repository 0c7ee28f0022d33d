use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use contquery_error::{DbError, Result};

use crate::arrays::datatype::DataType;
use crate::arrays::interval::{MICROS_PER_DAY, MICROS_PER_SECOND};
use crate::arrays::scalar::ScalarValue;
use crate::execution::ExecutionContext;
use crate::functions::FunctionVolatility;
use crate::functions::documentation::{Category, Documentation, Example};
use crate::functions::scalar::{ScalarFunction, ScalarFunctionSet, check_arg, check_arity};

pub const FUNCTION_SET_DATE_ROUND: ScalarFunctionSet = ScalarFunctionSet {
    name: "date_round",
    aliases: &[],
    doc: &Documentation {
        category: Category::DateTime,
        description: "Round a timestamp down to a multiple of the given interval since the epoch.",
        arguments: &["timestamp", "interval"],
        example: Some(Example {
            example: "date_round(timestamp '2024-05-01 10:17:00', interval '15 minutes')",
            output: "2024-05-01 10:15:00",
        }),
    },
    function: &DateRound,
};

pub const FUNCTION_SET_DATE_TRUNC: ScalarFunctionSet = ScalarFunctionSet {
    name: "date_trunc",
    aliases: &[],
    doc: &Documentation {
        category: Category::DateTime,
        description: "Truncates a timestamp to the specified precision",
        arguments: &["field", "timestamp"],
        example: None,
    },
    function: &DateTrunc,
};

pub const FUNCTION_SET_NOW: ScalarFunctionSet = ScalarFunctionSet {
    name: "now",
    aliases: &["current_timestamp"],
    doc: &Documentation {
        category: Category::DateTime,
        description: "Timestamp of the current execution.",
        arguments: &[],
        example: None,
    },
    function: &Now,
};

pub const FUNCTION_SET_CLOCK_TIMESTAMP: ScalarFunctionSet = ScalarFunctionSet {
    name: "clock_timestamp",
    aliases: &[],
    doc: &Documentation {
        category: Category::DateTime,
        description: "Current wall clock time, as seen by the executing batch.",
        arguments: &[],
        example: None,
    },
    function: &ClockTimestamp,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRound;

impl ScalarFunction for DateRound {
    fn return_type(&self, inputs: &[DataType]) -> Result<DataType> {
        check_arity("date_round", inputs, 2)?;
        check_arg("date_round", &inputs[0], DataType::Timestamp)?;
        check_arg("date_round", &inputs[1], DataType::Interval)?;
        Ok(DataType::Timestamp)
    }

    fn invoke(&self, args: &[ScalarValue], _ctx: &ExecutionContext) -> Result<ScalarValue> {
        if args.iter().any(|a| a.is_null()) {
            return Ok(ScalarValue::Null);
        }
        let ts = args[0].try_as_timestamp()?;
        let step = args[1].try_as_interval()?.total_micros();
        if step <= 0 {
            return Err(DbError::new("date_round requires a positive interval")
                .with_field("interval", args[1].to_string()));
        }
        Ok(ScalarValue::Timestamp(date_round(ts, step)))
    }
}

/// Floor `ts` to a multiple of `step` microseconds.
pub fn date_round(ts: i64, step: i64) -> i64 {
    ts - ts.rem_euclid(step)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TruncField {
    Microseconds,
    Milliseconds,
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

impl FromStr for TruncField {
    type Err = DbError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "microseconds" => Self::Microseconds,
            "milliseconds" => Self::Milliseconds,
            "second" => Self::Second,
            "minute" => Self::Minute,
            "hour" => Self::Hour,
            "day" => Self::Day,
            "week" => Self::Week,
            "month" => Self::Month,
            "quarter" => Self::Quarter,
            "year" => Self::Year,
            other => return Err(DbError::new(format!("Unexpected date field: {other}"))),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateTrunc;

impl ScalarFunction for DateTrunc {
    fn return_type(&self, inputs: &[DataType]) -> Result<DataType> {
        check_arity("date_trunc", inputs, 2)?;
        check_arg("date_trunc", &inputs[0], DataType::Utf8)?;
        check_arg("date_trunc", &inputs[1], DataType::Timestamp)?;
        Ok(DataType::Timestamp)
    }

    fn invoke(&self, args: &[ScalarValue], _ctx: &ExecutionContext) -> Result<ScalarValue> {
        if args.iter().any(|a| a.is_null()) {
            return Ok(ScalarValue::Null);
        }
        let field: TruncField = args[0].try_as_str()?.to_lowercase().parse()?;
        let ts = args[1].try_as_timestamp()?;
        Ok(ScalarValue::Timestamp(date_trunc(field, ts)?))
    }
}

fn date_trunc(field: TruncField, ts: i64) -> Result<i64> {
    let simple = |unit: i64| ts - ts.rem_euclid(unit);
    match field {
        TruncField::Microseconds => return Ok(ts),
        TruncField::Milliseconds => return Ok(simple(1000)),
        TruncField::Second => return Ok(simple(MICROS_PER_SECOND)),
        TruncField::Minute => return Ok(simple(60 * MICROS_PER_SECOND)),
        TruncField::Hour => return Ok(simple(3600 * MICROS_PER_SECOND)),
        TruncField::Day => return Ok(simple(MICROS_PER_DAY)),
        _ => (),
    }

    let dt = DateTime::from_timestamp_micros(ts)
        .ok_or_else(|| DbError::new(format!("Timestamp out of range: {ts}")))?
        .naive_utc();
    let date = dt.date();

    let truncated = match field {
        TruncField::Week => {
            let days_from_monday = date.weekday().num_days_from_monday() as i64;
            let day_start = simple(MICROS_PER_DAY);
            return Ok(day_start - days_from_monday * MICROS_PER_DAY);
        }
        TruncField::Month => NaiveDate::from_ymd_opt(date.year(), date.month(), 1),
        TruncField::Quarter => {
            let month = (date.month0() / 3) * 3 + 1;
            NaiveDate::from_ymd_opt(date.year(), month, 1)
        }
        TruncField::Year => NaiveDate::from_ymd_opt(date.year(), 1, 1),
        _ => Some(date),
    };

    truncated
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|d: NaiveDateTime| d.and_utc().timestamp_micros())
        .ok_or_else(|| DbError::new("Failed to truncate timestamp"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Now;

impl ScalarFunction for Now {
    fn volatility(&self) -> FunctionVolatility {
        FunctionVolatility::Volatile
    }

    fn return_type(&self, inputs: &[DataType]) -> Result<DataType> {
        check_arity("now", inputs, 0)?;
        Ok(DataType::Timestamp)
    }

    fn invoke(&self, _args: &[ScalarValue], ctx: &ExecutionContext) -> Result<ScalarValue> {
        Ok(ScalarValue::Timestamp(ctx.now))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockTimestamp;

impl ScalarFunction for ClockTimestamp {
    fn volatility(&self) -> FunctionVolatility {
        FunctionVolatility::Volatile
    }

    fn return_type(&self, inputs: &[DataType]) -> Result<DataType> {
        check_arity("clock_timestamp", inputs, 0)?;
        Ok(DataType::Timestamp)
    }

    fn invoke(&self, _args: &[ScalarValue], ctx: &ExecutionContext) -> Result<ScalarValue> {
        Ok(ScalarValue::Timestamp(ctx.now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrays::scalar::parse_timestamp;

    #[test]
    fn date_round_floors() {
        let ctx = ExecutionContext::new(0);
        // (timestamp, interval, expected)
        let cases = [
            ("2024-05-01 10:17:42", "15 minutes", "2024-05-01 10:15:00"),
            ("2024-05-01 10:15:00", "15 minutes", "2024-05-01 10:15:00"),
            ("2024-05-01 10:17:42", "1 hour", "2024-05-01 10:00:00"),
            ("1969-12-31 23:59:30", "1 minute", "1969-12-31 23:59:00"),
        ];
        for (ts, interval, expected) in cases {
            let got = DateRound
                .invoke(
                    &[
                        ScalarValue::Timestamp(parse_timestamp(ts).unwrap()),
                        ScalarValue::from(interval),
                    ],
                    &ctx,
                )
                .unwrap();
            assert_eq!(
                ScalarValue::Timestamp(parse_timestamp(expected).unwrap()),
                got,
                "input: {ts} {interval}"
            );
        }
    }

    #[test]
    fn date_trunc_fields() {
        let ts = parse_timestamp("2024-05-16 10:17:42.5").unwrap();
        // (field, expected)
        let cases = [
            ("second", "2024-05-16 10:17:42"),
            ("minute", "2024-05-16 10:17:00"),
            ("hour", "2024-05-16 10:00:00"),
            ("day", "2024-05-16 00:00:00"),
            ("week", "2024-05-13 00:00:00"),
            ("month", "2024-05-01 00:00:00"),
            ("quarter", "2024-04-01 00:00:00"),
            ("year", "2024-01-01 00:00:00"),
        ];
        for (field, expected) in cases {
            let got = date_trunc(field.parse().unwrap(), ts).unwrap();
            assert_eq!(parse_timestamp(expected).unwrap(), got, "field: {field}");
        }
    }

    #[test]
    fn clocks_use_context_time() {
        let ctx = ExecutionContext::new(42);
        assert_eq!(ScalarValue::Timestamp(42), Now.invoke(&[], &ctx).unwrap());
        assert_eq!(
            ScalarValue::Timestamp(42),
            ClockTimestamp.invoke(&[], &ctx).unwrap()
        );
    }
}
