use std::cmp::Ordering;

use contquery_error::Result;

use crate::arrays::field::Row;
use crate::arrays::scalar::{ScalarValue, sort_cmp};
use crate::execution::{ExecutionContext, RowSource};
use crate::expr::PhysicalSortExpr;

/// Full sort of the input. Rows with equal keys keep their input order.
#[derive(Debug)]
pub struct PhysicalSort {
    keys: Vec<PhysicalSortExpr>,
    input: Box<dyn RowSource>,
    sorted: Option<std::vec::IntoIter<Row>>,
}

impl PhysicalSort {
    pub fn new(keys: Vec<PhysicalSortExpr>, input: Box<dyn RowSource>) -> Self {
        PhysicalSort {
            keys,
            input,
            sorted: None,
        }
    }
}

impl RowSource for PhysicalSort {
    fn poll_next_row(&mut self, ctx: &ExecutionContext) -> Result<Option<Row>> {
        if self.sorted.is_none() {
            let mut keyed: Vec<(Vec<ScalarValue>, Row)> = Vec::new();
            while let Some(row) = self.input.poll_next_row(ctx)? {
                let key = self
                    .keys
                    .iter()
                    .map(|k| k.expr.eval(&row, ctx))
                    .collect::<Result<Vec<_>>>()?;
                keyed.push((key, row));
            }
            keyed.sort_by(|(a, _), (b, _)| compare_keys(&self.keys, a, b));
            self.sorted = Some(
                keyed
                    .into_iter()
                    .map(|(_, row)| row)
                    .collect::<Vec<_>>()
                    .into_iter(),
            );
        }

        Ok(self.sorted.as_mut().and_then(|rows| rows.next()))
    }
}

/// Compare two evaluated sort keys.
pub fn compare_keys(keys: &[PhysicalSortExpr], a: &[ScalarValue], b: &[ScalarValue]) -> Ordering {
    for ((key, a), b) in keys.iter().zip(a).zip(b) {
        match sort_cmp(a, b, key.desc, key.nulls_first) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}
