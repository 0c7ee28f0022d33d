use std::fmt;

use super::datatype::DataType;
use super::scalar::ScalarValue;
use crate::catalog::AggregateId;

pub type Row = Vec<ScalarValue>;

/// Marks a column as holding transition state for an aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AggregateStateRef {
    pub aggregate: AggregateId,
    /// If the state was wrapped by the aggregate's serialize function.
    pub serialized: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Field {
    pub name: String,
    pub datatype: DataType,
    pub state_of: Option<AggregateStateRef>,
}

impl Field {
    pub fn new(name: impl Into<String>, datatype: DataType) -> Self {
        Field {
            name: name.into(),
            datatype,
            state_of: None,
        }
    }

    pub fn with_state_of(mut self, state: AggregateStateRef) -> Self {
        self.state_of = Some(state);
        self
    }

    pub fn is_state(&self) -> bool {
        self.state_of.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Schema {
    pub fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: impl IntoIterator<Item = Field>) -> Self {
        Schema {
            fields: fields.into_iter().collect(),
        }
    }

    pub const fn empty() -> Self {
        Schema { fields: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Find a field by name, returning its index.
    pub fn find(&self, name: &str) -> Option<(usize, &Field)> {
        self.fields.iter().enumerate().find(|(_, f)| f.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Indices of columns that don't hold aggregate state.
    pub fn key_columns(&self) -> Vec<usize> {
        self.fields
            .iter()
            .enumerate()
            .filter(|(_, f)| !f.is_state())
            .map(|(idx, _)| idx)
            .collect()
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (idx, field) in self.fields.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", field.name, field.datatype)?;
            if field.is_state() {
                write!(f, " [state]")?;
            }
        }
        write!(f, ")")
    }
}
