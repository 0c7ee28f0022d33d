use contquery_error::Result;

use crate::arrays::field::Row;
use crate::execution::{ExecutionContext, RowSource};
use crate::expr::PhysicalExpr;

#[derive(Debug)]
pub struct PhysicalProject {
    exprs: Vec<PhysicalExpr>,
    input: Box<dyn RowSource>,
}

impl PhysicalProject {
    pub fn new(exprs: Vec<PhysicalExpr>, input: Box<dyn RowSource>) -> Self {
        PhysicalProject { exprs, input }
    }
}

impl RowSource for PhysicalProject {
    fn poll_next_row(&mut self, ctx: &ExecutionContext) -> Result<Option<Row>> {
        let row = match self.input.poll_next_row(ctx)? {
            Some(row) => row,
            None => return Ok(None),
        };
        let out = self
            .exprs
            .iter()
            .map(|expr| expr.eval(&row, ctx))
            .collect::<Result<Vec<_>>>()?;
        Ok(Some(out))
    }
}
