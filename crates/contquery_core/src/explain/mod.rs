pub mod node;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Configuration for producing explain entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExplainConfig {
    pub verbose: bool,
}

/// Values attached to an explain entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExplainValue {
    Value(String),
    Values(Vec<String>),
}

impl fmt::Display for ExplainValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => write!(f, "{v}"),
            Self::Values(vs) => write!(f, "[{}]", vs.join(", ")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplainEntry {
    pub name: String,
    pub items: BTreeMap<String, ExplainValue>,
}

/// Builds up an explain entry, skipping verbose-only items when not
/// requested.
#[derive(Debug)]
pub struct EntryBuilder {
    conf: ExplainConfig,
    entry: ExplainEntry,
}

impl EntryBuilder {
    pub fn new(name: impl Into<String>, conf: ExplainConfig) -> Self {
        EntryBuilder {
            conf,
            entry: ExplainEntry {
                name: name.into(),
                items: BTreeMap::new(),
            },
        }
    }

    pub fn with_value(mut self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        self.entry
            .items
            .insert(key.into(), ExplainValue::Value(value.to_string()));
        self
    }

    pub fn with_values<T: fmt::Display>(
        mut self,
        key: impl Into<String>,
        values: impl IntoIterator<Item = T>,
    ) -> Self {
        let values = values.into_iter().map(|v| v.to_string()).collect();
        self.entry
            .items
            .insert(key.into(), ExplainValue::Values(values));
        self
    }

    pub fn with_value_if_verbose(self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        if self.conf.verbose {
            self.with_value(key, value)
        } else {
            self
        }
    }

    pub fn build(self) -> ExplainEntry {
        self.entry
    }
}

/// Something that can be described in an explain output.
pub trait Explainable {
    fn explain_entry(&self, conf: ExplainConfig) -> ExplainEntry;
}
