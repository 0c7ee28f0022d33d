use contquery_error::Result;

use crate::arrays::field::Row;
use crate::execution::{ExecutionContext, RowSource};

/// Emits a snapshot of a table's rows.
#[derive(Debug)]
pub struct PhysicalScan {
    rows: std::vec::IntoIter<Row>,
}

impl PhysicalScan {
    pub fn new(rows: Vec<Row>) -> Self {
        PhysicalScan {
            rows: rows.into_iter(),
        }
    }
}

impl RowSource for PhysicalScan {
    fn poll_next_row(&mut self, ctx: &ExecutionContext) -> Result<Option<Row>> {
        ctx.cancel.check()?;
        Ok(self.rows.next())
    }
}
