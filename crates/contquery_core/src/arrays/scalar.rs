use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use contquery_error::{DbError, Result};
use serde::{Deserialize, Serialize};

use super::datatype::DataType;
use super::interval::Interval;

/// An owned value of any supported type.
///
/// Equality and hashing follow grouping semantics: nulls are equal to each
/// other and NaN is equal to NaN. Ordering puts nulls last.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScalarValue {
    Null,
    Boolean(bool),
    Int64(i64),
    Float64(f64),
    Utf8(String),
    Binary(Vec<u8>),
    /// Microseconds since the unix epoch.
    Timestamp(i64),
    Interval(Interval),
    List(Vec<ScalarValue>),
}

impl ScalarValue {
    pub const fn is_null(&self) -> bool {
        matches!(self, ScalarValue::Null)
    }

    pub fn datatype(&self) -> DataType {
        match self {
            Self::Null => DataType::Null,
            Self::Boolean(_) => DataType::Boolean,
            Self::Int64(_) => DataType::Int64,
            Self::Float64(_) => DataType::Float64,
            Self::Utf8(_) => DataType::Utf8,
            Self::Binary(_) => DataType::Binary,
            Self::Timestamp(_) => DataType::Timestamp,
            Self::Interval(_) => DataType::Interval,
            Self::List(vals) => {
                let inner = vals
                    .iter()
                    .find(|v| !v.is_null())
                    .map(|v| v.datatype())
                    .unwrap_or(DataType::Null);
                DataType::list(inner)
            }
        }
    }

    pub fn try_as_bool(&self) -> Result<bool> {
        match self {
            Self::Boolean(b) => Ok(*b),
            other => Err(DbError::new(format!("Not a bool: {other}"))),
        }
    }

    pub fn try_as_i64(&self) -> Result<i64> {
        match self {
            Self::Int64(i) => Ok(*i),
            Self::Float64(f) if f.fract() == 0.0 => Ok(*f as i64),
            other => Err(DbError::new(format!("Not an i64: {other}"))),
        }
    }

    pub fn try_as_usize(&self) -> Result<usize> {
        let v = self.try_as_i64()?;
        usize::try_from(v).map_err(|_| DbError::new(format!("Not a usize: {v}")))
    }

    /// Get the value as an f64, converting integers.
    pub fn try_as_f64(&self) -> Result<f64> {
        match self {
            Self::Int64(i) => Ok(*i as f64),
            Self::Float64(f) => Ok(*f),
            Self::Utf8(s) => Ok(s.trim().parse()?),
            other => Err(DbError::new(format!("Not an f64: {other}"))),
        }
    }

    pub fn try_as_str(&self) -> Result<&str> {
        match self {
            Self::Utf8(s) => Ok(s),
            other => Err(DbError::new(format!("Not a string: {other}"))),
        }
    }

    pub fn try_into_string(self) -> Result<String> {
        match self {
            Self::Utf8(s) => Ok(s),
            other => Err(DbError::new(format!("Not a string: {other}"))),
        }
    }

    pub fn try_as_binary(&self) -> Result<&[u8]> {
        match self {
            Self::Binary(b) => Ok(b),
            other => Err(DbError::new(format!("Not binary: {other}"))),
        }
    }

    pub fn try_as_timestamp(&self) -> Result<i64> {
        match self {
            Self::Timestamp(ts) => Ok(*ts),
            Self::Utf8(s) => parse_timestamp(s),
            other => Err(DbError::new(format!("Not a timestamp: {other}"))),
        }
    }

    pub fn try_as_interval(&self) -> Result<Interval> {
        match self {
            Self::Interval(i) => Ok(*i),
            Self::Utf8(s) => Interval::parse(s),
            other => Err(DbError::new(format!("Not an interval: {other}"))),
        }
    }

    pub fn try_as_list(&self) -> Result<&[ScalarValue]> {
        match self {
            Self::List(vals) => Ok(vals),
            other => Err(DbError::new(format!("Not a list: {other}"))),
        }
    }

    /// Cast this value to the given type.
    ///
    /// Nulls cast to any type.
    pub fn cast_to(&self, datatype: &DataType) -> Result<ScalarValue> {
        if self.is_null() {
            return Ok(ScalarValue::Null);
        }

        let casted = match datatype {
            DataType::Any | DataType::Null => self.clone(),
            DataType::Boolean => match self {
                Self::Boolean(b) => Self::Boolean(*b),
                Self::Int64(i) => Self::Boolean(*i != 0),
                Self::Utf8(s) => match s.to_ascii_lowercase().as_str() {
                    "t" | "true" | "yes" | "1" => Self::Boolean(true),
                    "f" | "false" | "no" | "0" => Self::Boolean(false),
                    _ => return Err(cast_error(self, datatype)),
                },
                _ => return Err(cast_error(self, datatype)),
            },
            DataType::Int64 => match self {
                Self::Int64(i) => Self::Int64(*i),
                Self::Float64(f) => Self::Int64(f.round() as i64),
                Self::Boolean(b) => Self::Int64(*b as i64),
                Self::Utf8(s) => Self::Int64(s.trim().parse()?),
                _ => return Err(cast_error(self, datatype)),
            },
            DataType::Float64 => match self {
                Self::Int64(_) | Self::Float64(_) | Self::Utf8(_) => Self::Float64(self.try_as_f64()?),
                _ => return Err(cast_error(self, datatype)),
            },
            DataType::Utf8 => Self::Utf8(self.to_string()),
            DataType::Binary => match self {
                Self::Binary(b) => Self::Binary(b.clone()),
                Self::Utf8(s) => Self::Binary(s.as_bytes().to_vec()),
                _ => return Err(cast_error(self, datatype)),
            },
            DataType::Timestamp => match self {
                Self::Timestamp(ts) => Self::Timestamp(*ts),
                Self::Utf8(s) => Self::Timestamp(parse_timestamp(s)?),
                _ => return Err(cast_error(self, datatype)),
            },
            DataType::Interval => match self {
                Self::Interval(i) => Self::Interval(*i),
                Self::Utf8(s) => Self::Interval(Interval::parse(s)?),
                Self::Int64(secs) => Self::Interval(Interval::from_secs(*secs)),
                _ => return Err(cast_error(self, datatype)),
            },
            DataType::List(inner) => match self {
                Self::List(vals) => Self::List(
                    vals.iter()
                        .map(|v| v.cast_to(inner))
                        .collect::<Result<Vec<_>>>()?,
                ),
                _ => return Err(cast_error(self, datatype)),
            },
        };

        Ok(casted)
    }

    fn variant_rank(&self) -> u8 {
        match self {
            Self::Boolean(_) => 0,
            Self::Int64(_) => 1,
            Self::Float64(_) => 2,
            Self::Utf8(_) => 3,
            Self::Binary(_) => 4,
            Self::Timestamp(_) => 5,
            Self::Interval(_) => 6,
            Self::List(_) => 7,
            Self::Null => 8,
        }
    }
}

fn cast_error(value: &ScalarValue, datatype: &DataType) -> DbError {
    DbError::new(format!("Cannot cast '{value}' to {datatype}"))
}

/// Parse a timestamp string into microseconds since the epoch.
pub fn parse_timestamp(s: &str) -> Result<i64> {
    const FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
    ];

    let s = s.trim();
    for format in FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(dt.and_utc().timestamp_micros());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(dt) = date.and_hms_opt(0, 0, 0) {
            return Ok(dt.and_utc().timestamp_micros());
        }
    }

    Err(DbError::new(format!("Invalid timestamp: '{s}'")))
}

pub fn format_timestamp(micros: i64) -> String {
    match DateTime::from_timestamp_micros(micros) {
        Some(dt) => dt.naive_utc().format("%Y-%m-%d %H:%M:%S%.f").to_string(),
        None => format!("<invalid timestamp {micros}>"),
    }
}

fn f64_total_eq(a: f64, b: f64) -> bool {
    (a.is_nan() && b.is_nan()) || a == b
}

impl PartialEq for ScalarValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Int64(a), Self::Int64(b)) => a == b,
            (Self::Float64(a), Self::Float64(b)) => f64_total_eq(*a, *b),
            (Self::Utf8(a), Self::Utf8(b)) => a == b,
            (Self::Binary(a), Self::Binary(b)) => a == b,
            (Self::Timestamp(a), Self::Timestamp(b)) => a == b,
            (Self::Interval(a), Self::Interval(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for ScalarValue {}

impl Hash for ScalarValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.variant_rank().hash(state);
        match self {
            Self::Null => (),
            Self::Boolean(v) => v.hash(state),
            Self::Int64(v) => v.hash(state),
            Self::Float64(v) => {
                // Collapse -0.0 and NaN payloads so equal values hash equally.
                let bits = if v.is_nan() {
                    f64::NAN.to_bits()
                } else if *v == 0.0 {
                    0
                } else {
                    v.to_bits()
                };
                bits.hash(state)
            }
            Self::Utf8(v) => v.hash(state),
            Self::Binary(v) => v.hash(state),
            Self::Timestamp(v) => v.hash(state),
            Self::Interval(v) => v.hash(state),
            Self::List(v) => v.hash(state),
        }
    }
}

impl PartialOrd for ScalarValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScalarValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Null, Self::Null) => Ordering::Equal,
            (Self::Null, _) => Ordering::Greater,
            (_, Self::Null) => Ordering::Less,
            (Self::Boolean(a), Self::Boolean(b)) => a.cmp(b),
            (Self::Int64(a), Self::Int64(b)) => a.cmp(b),
            (Self::Float64(a), Self::Float64(b)) => {
                // total_cmp distinguishes -0.0 and 0.0, equality doesn't.
                if f64_total_eq(*a, *b) {
                    Ordering::Equal
                } else {
                    a.total_cmp(b)
                }
            }
            (Self::Int64(a), Self::Float64(b)) => (*a as f64)
                .total_cmp(b)
                .then(self.variant_rank().cmp(&other.variant_rank())),
            (Self::Float64(a), Self::Int64(b)) => a
                .total_cmp(&(*b as f64))
                .then(self.variant_rank().cmp(&other.variant_rank())),
            (Self::Utf8(a), Self::Utf8(b)) => a.cmp(b),
            (Self::Binary(a), Self::Binary(b)) => a.cmp(b),
            (Self::Timestamp(a), Self::Timestamp(b)) => a.cmp(b),
            (Self::Interval(a), Self::Interval(b)) => a.cmp(b),
            (Self::List(a), Self::List(b)) => a.cmp(b),
            (a, b) => a.variant_rank().cmp(&b.variant_rank()),
        }
    }
}

/// Compare two values for sorting with explicit direction and null
/// placement.
pub fn sort_cmp(a: &ScalarValue, b: &ScalarValue, desc: bool, nulls_first: bool) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => {
            if nulls_first {
                Ordering::Less
            } else {
                Ordering::Greater
            }
        }
        (false, true) => {
            if nulls_first {
                Ordering::Greater
            } else {
                Ordering::Less
            }
        }
        (false, false) => {
            let ord = a.cmp(b);
            if desc { ord.reverse() } else { ord }
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Int64(i) => write!(f, "{i}"),
            Self::Float64(v) => write!(f, "{v}"),
            Self::Utf8(s) => write!(f, "{s}"),
            Self::Binary(b) => {
                write!(f, "\\x")?;
                for byte in b {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
            Self::Timestamp(ts) => write!(f, "{}", format_timestamp(*ts)),
            Self::Interval(i) => write!(f, "{i}"),
            Self::List(vals) => {
                write!(f, "{{")?;
                for (idx, v) in vals.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<bool> for ScalarValue {
    fn from(value: bool) -> Self {
        ScalarValue::Boolean(value)
    }
}

impl From<i64> for ScalarValue {
    fn from(value: i64) -> Self {
        ScalarValue::Int64(value)
    }
}

impl From<u64> for ScalarValue {
    fn from(value: u64) -> Self {
        ScalarValue::Int64(value as i64)
    }
}

impl From<f64> for ScalarValue {
    fn from(value: f64) -> Self {
        ScalarValue::Float64(value)
    }
}

impl From<String> for ScalarValue {
    fn from(value: String) -> Self {
        ScalarValue::Utf8(value)
    }
}

impl From<&str> for ScalarValue {
    fn from(value: &str) -> Self {
        ScalarValue::Utf8(value.to_string())
    }
}

impl From<Interval> for ScalarValue {
    fn from(value: Interval) -> Self {
        ScalarValue::Interval(value)
    }
}

impl<T: Into<ScalarValue>> From<Option<T>> for ScalarValue {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => ScalarValue::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn nulls_sort_last() {
        let mut vals = vec![
            ScalarValue::Int64(3),
            ScalarValue::Null,
            ScalarValue::Int64(1),
        ];
        vals.sort();
        assert_eq!(
            vec![ScalarValue::Int64(1), ScalarValue::Int64(3), ScalarValue::Null],
            vals
        );
    }

    #[test]
    fn sort_cmp_directions() {
        let a = ScalarValue::Int64(1);
        let b = ScalarValue::Int64(2);
        assert_eq!(Ordering::Greater, sort_cmp(&a, &b, true, false));
        assert_eq!(Ordering::Less, sort_cmp(&ScalarValue::Null, &a, false, true));
        assert_eq!(Ordering::Greater, sort_cmp(&ScalarValue::Null, &a, true, false));
    }

    #[test]
    fn grouping_equality() {
        let mut set = HashSet::new();
        set.insert(ScalarValue::Null);
        set.insert(ScalarValue::Null);
        set.insert(ScalarValue::Float64(f64::NAN));
        set.insert(ScalarValue::Float64(f64::NAN));
        set.insert(ScalarValue::Float64(0.0));
        set.insert(ScalarValue::Float64(-0.0));
        assert_eq!(3, set.len());
        // Same numeric value but different types are separate groups.
        assert_ne!(ScalarValue::Int64(1), ScalarValue::Float64(1.0));
        assert_ne!(Ordering::Equal, ScalarValue::Int64(1).cmp(&ScalarValue::Float64(1.0)));
        assert_eq!(Ordering::Less, ScalarValue::Int64(1).cmp(&ScalarValue::Float64(1.5)));
    }

    #[test]
    fn timestamp_round_trip() {
        let ts = parse_timestamp("2024-03-01 12:30:00").unwrap();
        assert_eq!("2024-03-01 12:30:00", format_timestamp(ts));
        assert_eq!(ts, parse_timestamp("2024-03-01T12:30:00").unwrap());
    }

    #[test]
    fn casts() {
        // (value, target, expected)
        let tests = [
            (ScalarValue::from("42"), DataType::Int64, ScalarValue::Int64(42)),
            (ScalarValue::Int64(2), DataType::Float64, ScalarValue::Float64(2.0)),
            (
                ScalarValue::from("1 hour"),
                DataType::Interval,
                ScalarValue::Interval(Interval::from_secs(3600)),
            ),
            (ScalarValue::Null, DataType::Timestamp, ScalarValue::Null),
            (ScalarValue::Boolean(true), DataType::Utf8, ScalarValue::from("true")),
        ];

        for (value, target, expected) in tests {
            assert_eq!(expected, value.cast_to(&target).unwrap());
        }

        assert!(ScalarValue::from("abc").cast_to(&DataType::Int64).is_err());
    }
}
