use std::fmt;

use contquery_parser::ast::TypeName;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Null,
    Boolean,
    Int64,
    Float64,
    Utf8,
    Binary,
    /// Microseconds since the unix epoch.
    Timestamp,
    Interval,
    List(Box<DataType>),
    /// Matches any type during function resolution.
    Any,
}

impl DataType {
    pub const fn is_numeric(&self) -> bool {
        matches!(self, DataType::Int64 | DataType::Float64)
    }

    /// Datetime category, valid as a sliding window time column.
    pub const fn is_datetime(&self) -> bool {
        matches!(self, DataType::Timestamp)
    }

    pub fn list(element: DataType) -> Self {
        DataType::List(Box::new(element))
    }

    /// Check if a value of type `self` can be passed where `param` is
    /// expected.
    ///
    /// Nulls and `Any` match everything, and integers implicitly widen to
    /// floats.
    pub fn is_coercible_to(&self, param: &DataType) -> bool {
        match (self, param) {
            (_, DataType::Any) | (DataType::Null, _) | (DataType::Any, _) => true,
            (DataType::Int64, DataType::Float64) => true,
            (DataType::List(a), DataType::List(b)) => a.is_coercible_to(b),
            (a, b) => a == b,
        }
    }
}

impl From<TypeName> for DataType {
    fn from(value: TypeName) -> Self {
        match value {
            TypeName::Boolean => DataType::Boolean,
            TypeName::Int64 => DataType::Int64,
            TypeName::Float64 => DataType::Float64,
            TypeName::Text => DataType::Utf8,
            TypeName::Bytea => DataType::Binary,
            TypeName::Timestamp => DataType::Timestamp,
            TypeName::Interval => DataType::Interval,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "Null"),
            Self::Boolean => write!(f, "Boolean"),
            Self::Int64 => write!(f, "Int64"),
            Self::Float64 => write!(f, "Float64"),
            Self::Utf8 => write!(f, "Utf8"),
            Self::Binary => write!(f, "Binary"),
            Self::Timestamp => write!(f, "Timestamp"),
            Self::Interval => write!(f, "Interval"),
            Self::List(inner) => write!(f, "List[{inner}]"),
            Self::Any => write!(f, "Any"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coercion_rules() {
        // (arg, param, expected)
        let tests = [
            (DataType::Int64, DataType::Float64, true),
            (DataType::Float64, DataType::Int64, false),
            (DataType::Null, DataType::Timestamp, true),
            (DataType::Utf8, DataType::Any, true),
            (DataType::list(DataType::Int64), DataType::list(DataType::Any), true),
            (DataType::Utf8, DataType::Timestamp, false),
        ];

        for (arg, param, expected) in tests {
            assert_eq!(expected, arg.is_coercible_to(&param), "{arg} -> {param}");
        }
    }
}
