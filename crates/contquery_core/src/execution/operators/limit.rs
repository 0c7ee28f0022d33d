use contquery_error::Result;

use crate::arrays::field::Row;
use crate::execution::{ExecutionContext, RowSource};

/// Operator for LIMIT and OFFSET clauses.
#[derive(Debug)]
pub struct PhysicalLimit {
    /// Remaining number of rows to emit, None for no limit.
    remaining_count: Option<usize>,
    /// Rows to skip before emitting.
    remaining_offset: usize,
    input: Box<dyn RowSource>,
}

impl PhysicalLimit {
    pub fn new(limit: Option<usize>, offset: usize, input: Box<dyn RowSource>) -> Self {
        PhysicalLimit {
            remaining_count: limit,
            remaining_offset: offset,
            input,
        }
    }
}

impl RowSource for PhysicalLimit {
    fn poll_next_row(&mut self, ctx: &ExecutionContext) -> Result<Option<Row>> {
        if self.remaining_count == Some(0) {
            return Ok(None);
        }
        while let Some(row) = self.input.poll_next_row(ctx)? {
            if self.remaining_offset > 0 {
                self.remaining_offset -= 1;
                continue;
            }
            if let Some(count) = self.remaining_count.as_mut() {
                *count -= 1;
            }
            return Ok(Some(row));
        }
        Ok(None)
    }
}
