use std::cmp::Ordering;

use crate::arrays::scalar::ScalarValue;
use crate::execution::operators::sort::compare_keys;
use crate::expr::PhysicalSortExpr;

/// Buffered inputs for an aggregate with DISTINCT or ORDER BY.
///
/// Rows are held until the group completes, then sorted and optionally
/// deduplicated before being passed to the transition function.
#[derive(Debug, Default)]
pub struct SortBuffer {
    /// (sort key values, aggregate arguments)
    rows: Vec<(Vec<ScalarValue>, Vec<ScalarValue>)>,
}

impl SortBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, keys: Vec<ScalarValue>, args: Vec<ScalarValue>) {
        self.rows.push((keys, args));
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Consume the buffer, returning argument rows in transition order.
    ///
    /// Rows with equal sort keys keep their arrival order. For DISTINCT, ties
    /// are broken by the arguments so that duplicates end up adjacent.
    pub fn into_sorted_args(self, order_by: &[PhysicalSortExpr], distinct: bool) -> Vec<Vec<ScalarValue>> {
        let mut rows = self.rows;
        if distinct {
            rows.sort_by(|(ak, aa), (bk, ba)| match compare_keys(order_by, ak, bk) {
                Ordering::Equal => aa.cmp(ba),
                other => other,
            });
        } else {
            rows.sort_by(|(ak, _), (bk, _)| compare_keys(order_by, ak, bk));
        }

        let mut args: Vec<Vec<ScalarValue>> = rows.into_iter().map(|(_, args)| args).collect();
        if distinct {
            args.dedup();
        }
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrays::datatype::DataType;
    use crate::expr::PhysicalExpr;

    fn int(v: i64) -> ScalarValue {
        ScalarValue::Int64(v)
    }

    #[test]
    fn distinct_dedups_after_sort() {
        let mut buf = SortBuffer::new();
        for v in [3, 1, 3, 2, 1] {
            buf.push(Vec::new(), vec![int(v)]);
        }
        let args = buf.into_sorted_args(&[], true);
        assert_eq!(vec![vec![int(1)], vec![int(2)], vec![int(3)]], args);
    }

    #[test]
    fn equal_keys_keep_arrival_order() {
        let order_by = vec![PhysicalSortExpr {
            expr: PhysicalExpr::column(0, "x", DataType::Int64),
            desc: false,
            nulls_first: false,
        }];

        // (pushed (key, arg) pairs, expected args)
        let cases: [(&[(i64, i64)], &[i64]); 3] = [
            (&[(1, 30), (1, 10), (1, 20)], &[30, 10, 20]),
            (&[(2, 5), (1, 9), (2, 1), (1, 3)], &[9, 3, 5, 1]),
            (&[(1, 7), (1, 7), (0, 8)], &[8, 7, 7]),
        ];
        for (pushed, expected) in cases {
            let mut buf = SortBuffer::new();
            for &(key, arg) in pushed {
                buf.push(vec![int(key)], vec![int(arg)]);
            }
            let expected: Vec<_> = expected.iter().map(|&v| vec![int(v)]).collect();
            assert_eq!(expected, buf.into_sorted_args(&order_by, false), "{pushed:?}");
        }
    }

    #[test]
    fn order_by_desc() {
        let order_by = vec![PhysicalSortExpr {
            expr: PhysicalExpr::column(0, "x", DataType::Int64),
            desc: true,
            nulls_first: true,
        }];
        let mut buf = SortBuffer::new();
        for v in [1, 5, 3] {
            buf.push(vec![int(v)], vec![int(v * 10)]);
        }
        buf.push(vec![ScalarValue::Null], vec![int(0)]);
        let args = buf.into_sorted_args(&order_by, false);
        assert_eq!(
            vec![vec![int(0)], vec![int(50)], vec![int(30)], vec![int(10)]],
            args
        );
    }
}
