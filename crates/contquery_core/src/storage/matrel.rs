use contquery_error::{DbError, Result};
use indexmap::IndexMap;
use tracing::trace;

use crate::arrays::field::{Row, Schema};
use crate::arrays::scalar::ScalarValue;

/// How rows written to a materialized relation are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrelMode {
    /// One row per key, later writes replace earlier ones.
    Keyed,
    /// Rows are only ever appended.
    Append,
}

/// In-memory backing table of a continuous view.
///
/// Keyed relations hold one row per distinct value of their key columns,
/// which are all columns not holding aggregate state. Rows are kept in
/// insertion order.
#[derive(Debug, Clone)]
pub struct MaterializedRelation {
    name: String,
    schema: Schema,
    mode: MatrelMode,
    key_columns: Vec<usize>,
    keyed: IndexMap<Vec<ScalarValue>, Row>,
    appended: Vec<Row>,
}

impl MaterializedRelation {
    pub fn new(name: impl Into<String>, schema: Schema, mode: MatrelMode) -> Self {
        let key_columns = schema.key_columns();
        MaterializedRelation {
            name: name.into(),
            schema,
            mode,
            key_columns,
            keyed: IndexMap::new(),
            appended: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn mode(&self) -> MatrelMode {
        self.mode
    }

    pub fn key_columns(&self) -> &[usize] {
        &self.key_columns
    }

    pub fn len(&self) -> usize {
        match self.mode {
            MatrelMode::Keyed => self.keyed.len(),
            MatrelMode::Append => self.appended.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Key values of a row.
    pub fn key_of(&self, row: &Row) -> Vec<ScalarValue> {
        self.key_columns
            .iter()
            .map(|idx| row.get(*idx).cloned().unwrap_or(ScalarValue::Null))
            .collect()
    }

    /// All rows, in insertion order.
    pub fn rows(&self) -> Vec<Row> {
        match self.mode {
            MatrelMode::Keyed => self.keyed.values().cloned().collect(),
            MatrelMode::Append => self.appended.clone(),
        }
    }

    /// Stored rows for the given keys. Keys without a row are skipped.
    pub fn rows_for_keys<'a>(&self, keys: impl IntoIterator<Item = &'a Vec<ScalarValue>>) -> Vec<Row> {
        keys.into_iter()
            .filter_map(|key| self.keyed.get(key).cloned())
            .collect()
    }

    /// Write rows, replacing existing rows with the same key.
    ///
    /// Every row is validated before any is written, a failed write leaves
    /// the relation unchanged.
    pub fn apply(&mut self, rows: Vec<Row>) -> Result<usize> {
        for row in &rows {
            if row.len() != self.schema.len() {
                return Err(DbError::new("Row width doesn't match materialized relation")
                    .with_field("relation", self.name.clone())
                    .with_field("expected", self.schema.len())
                    .with_field("got", row.len()));
            }
        }

        let count = rows.len();
        match self.mode {
            MatrelMode::Keyed => {
                for row in rows {
                    let key = self.key_of(&row);
                    self.keyed.insert(key, row);
                }
            }
            MatrelMode::Append => self.appended.extend(rows),
        }
        trace!(relation = %self.name, count, "applied rows");

        Ok(count)
    }

    /// Delete rows matching a predicate, returning the number deleted.
    ///
    /// The predicate is evaluated for every row before anything is removed.
    pub fn delete_where(&mut self, mut pred: impl FnMut(&Row) -> Result<bool>) -> Result<usize> {
        let before = self.len();
        match self.mode {
            MatrelMode::Keyed => {
                let mut keep = Vec::with_capacity(self.keyed.len());
                for row in self.keyed.values() {
                    keep.push(!pred(row)?);
                }
                let mut keep = keep.into_iter();
                self.keyed.retain(|_, _| keep.next().unwrap_or(true));
            }
            MatrelMode::Append => {
                let mut keep = Vec::with_capacity(self.appended.len());
                for row in &self.appended {
                    keep.push(!pred(row)?);
                }
                let mut keep = keep.into_iter();
                self.appended.retain(|_| keep.next().unwrap_or(true));
            }
        }
        Ok(before - self.len())
    }

    pub fn truncate(&mut self) {
        self.keyed.clear();
        self.appended.clear();
    }
}
