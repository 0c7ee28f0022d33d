use contquery_error::Result;

use crate::arrays::field::Row;
use crate::execution::{ExecutionContext, RowSource};
use crate::expr::PhysicalExpr;

/// Passes through rows for which the predicate is true. Null counts as false.
#[derive(Debug)]
pub struct PhysicalFilter {
    predicate: PhysicalExpr,
    input: Box<dyn RowSource>,
}

impl PhysicalFilter {
    pub fn new(predicate: PhysicalExpr, input: Box<dyn RowSource>) -> Self {
        PhysicalFilter { predicate, input }
    }
}

impl RowSource for PhysicalFilter {
    fn poll_next_row(&mut self, ctx: &ExecutionContext) -> Result<Option<Row>> {
        while let Some(row) = self.input.poll_next_row(ctx)? {
            if self.predicate.eval_predicate(&row, ctx)? {
                return Ok(Some(row));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use contquery_parser::ast::BinaryOperator;

    use super::*;
    use crate::arrays::datatype::DataType;
    use crate::arrays::scalar::ScalarValue;
    use crate::execution::operators::testutil::{RowsSource, drain};

    #[test]
    fn filters_nulls_out() {
        let predicate = PhysicalExpr::Binary {
            left: Box::new(PhysicalExpr::column(0, "a", DataType::Int64)),
            op: BinaryOperator::GtEq,
            right: Box::new(PhysicalExpr::Literal(ScalarValue::Int64(2))),
        };
        let input = RowsSource::boxed(vec![
            vec![ScalarValue::Int64(1)],
            vec![ScalarValue::Null],
            vec![ScalarValue::Int64(2)],
            vec![ScalarValue::Int64(3)],
        ]);
        let out = drain(Box::new(PhysicalFilter::new(predicate, input)));
        assert_eq!(
            vec![vec![ScalarValue::Int64(2)], vec![ScalarValue::Int64(3)]],
            out
        );
    }
}
