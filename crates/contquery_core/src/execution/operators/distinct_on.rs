use contquery_error::Result;
use hashbrown::HashSet;

use crate::arrays::field::Row;
use crate::arrays::scalar::ScalarValue;
use crate::execution::{ExecutionContext, RowSource};
use crate::expr::PhysicalExpr;

/// Emits the first row seen for every distinct key.
#[derive(Debug)]
pub struct PhysicalDistinctOn {
    on: Vec<PhysicalExpr>,
    seen: HashSet<Vec<ScalarValue>>,
    input: Box<dyn RowSource>,
}

impl PhysicalDistinctOn {
    pub fn new(on: Vec<PhysicalExpr>, input: Box<dyn RowSource>) -> Self {
        PhysicalDistinctOn {
            on,
            seen: HashSet::new(),
            input,
        }
    }
}

impl RowSource for PhysicalDistinctOn {
    fn poll_next_row(&mut self, ctx: &ExecutionContext) -> Result<Option<Row>> {
        while let Some(row) = self.input.poll_next_row(ctx)? {
            let key = self
                .on
                .iter()
                .map(|expr| expr.eval(&row, ctx))
                .collect::<Result<Vec<_>>>()?;
            if self.seen.insert(key) {
                return Ok(Some(row));
            }
        }
        Ok(None)
    }
}
