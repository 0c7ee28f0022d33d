//! Pull based row execution.
//!
//! Plans are turned into a tree of row sources. Each call to
//! `poll_next_row` pulls a single row through the tree. Cancellation is only
//! observed between rows, so an aggregate never sees a partially applied
//! input row.
pub mod aggregate;
pub mod operators;

use std::fmt::Debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use contquery_error::{DbError, ErrorKind, Result};
use hashbrown::HashMap;

use crate::arrays::field::{Row, Schema};
use crate::planner::plan::PhysicalPlan;

/// Shared flag for cancelling a running execution.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Error if cancellation was requested.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(DbError::new("Execution cancelled").with_kind(ErrorKind::Cancelled));
        }
        Ok(())
    }
}

/// Per-execution state visible to expressions and operators.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Clock time of the batch in microseconds since the epoch. Both `now()`
    /// and `clock_timestamp()` read this value.
    pub now: i64,
    pub cancel: CancelToken,
}

impl ExecutionContext {
    pub fn new(now: i64) -> Self {
        ExecutionContext {
            now,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// A source of rows.
pub trait RowSource: Debug {
    /// Pull the next row, returning None once exhausted.
    fn poll_next_row(&mut self, ctx: &ExecutionContext) -> Result<Option<Row>>;
}

/// Provides rows for tables referenced by scans.
pub trait TableProvider: Debug {
    fn table_rows(&self, name: &str) -> Result<Vec<Row>>;
}

/// Tables held in memory, keyed by name.
#[derive(Debug, Default)]
pub struct MemoryTables {
    tables: HashMap<String, (Schema, Vec<Row>)>,
}

impl MemoryTables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, name: impl Into<String>, schema: Schema, rows: Vec<Row>) -> Self {
        self.insert(name, schema, rows);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, schema: Schema, rows: Vec<Row>) {
        self.tables.insert(name.into(), (schema, rows));
    }

    pub fn schema(&self, name: &str) -> Option<&Schema> {
        self.tables.get(name).map(|(schema, _)| schema)
    }
}

impl TableProvider for MemoryTables {
    fn table_rows(&self, name: &str) -> Result<Vec<Row>> {
        self.tables
            .get(name)
            .map(|(_, rows)| rows.clone())
            .ok_or_else(|| DbError::new(format!("Missing table '{name}'")))
    }
}

/// Build the operator tree for a plan.
pub fn build_operator(plan: &PhysicalPlan, tables: &dyn TableProvider) -> Result<Box<dyn RowSource>> {
    operators::build(plan, tables)
}

/// Execute a plan to completion, collecting all output rows.
pub fn collect(
    plan: &PhysicalPlan,
    tables: &dyn TableProvider,
    ctx: &ExecutionContext,
) -> Result<Vec<Row>> {
    let mut source = build_operator(plan, tables)?;
    let mut rows = Vec::new();
    while let Some(row) = source.poll_next_row(ctx)? {
        rows.push(row);
    }
    Ok(rows)
}
