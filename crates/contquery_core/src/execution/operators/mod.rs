//! Row operators for the non-aggregate plan nodes.
pub mod distinct_on;
pub mod filter;
pub mod limit;
pub mod project;
pub mod scan;
pub mod sort;

use contquery_error::Result;

use self::distinct_on::PhysicalDistinctOn;
use self::filter::PhysicalFilter;
use self::limit::PhysicalLimit;
use self::project::PhysicalProject;
use self::scan::PhysicalScan;
use self::sort::PhysicalSort;
use super::aggregate::PhysicalAggregateOperator;
use super::{RowSource, TableProvider};
use crate::planner::plan::PhysicalPlan;

/// Recursively build row sources for a plan.
pub fn build(plan: &PhysicalPlan, tables: &dyn TableProvider) -> Result<Box<dyn RowSource>> {
    Ok(match plan {
        PhysicalPlan::Scan(scan) => Box::new(PhysicalScan::new(tables.table_rows(&scan.table)?)),
        PhysicalPlan::Filter(n) => Box::new(PhysicalFilter::new(
            n.predicate.clone(),
            build(&n.input, tables)?,
        )),
        PhysicalPlan::Project(n) => Box::new(PhysicalProject::new(
            n.exprs.clone(),
            build(&n.input, tables)?,
        )),
        PhysicalPlan::Sort(n) => Box::new(PhysicalSort::new(n.keys.clone(), build(&n.input, tables)?)),
        PhysicalPlan::DistinctOn(n) => Box::new(PhysicalDistinctOn::new(
            n.on.clone(),
            build(&n.input, tables)?,
        )),
        PhysicalPlan::Limit(n) => Box::new(PhysicalLimit::new(
            n.limit,
            n.offset,
            build(&n.input, tables)?,
        )),
        PhysicalPlan::Aggregate(n) => Box::new(PhysicalAggregateOperator::try_new(
            n,
            build(&n.input, tables)?,
        )?),
    })
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use crate::arrays::field::Row;
    use crate::execution::ExecutionContext;

    /// Row source over a fixed set of rows.
    #[derive(Debug)]
    pub struct RowsSource {
        rows: std::vec::IntoIter<Row>,
    }

    impl RowsSource {
        pub fn boxed(rows: Vec<Row>) -> Box<dyn RowSource> {
            Box::new(RowsSource {
                rows: rows.into_iter(),
            })
        }
    }

    impl RowSource for RowsSource {
        fn poll_next_row(&mut self, _ctx: &ExecutionContext) -> Result<Option<Row>> {
            Ok(self.rows.next())
        }
    }

    pub fn drain(mut source: Box<dyn RowSource>) -> Vec<Row> {
        let ctx = ExecutionContext::new(0);
        let mut out = Vec::new();
        while let Some(row) = source.poll_next_row(&ctx).unwrap() {
            out.push(row);
        }
        out
    }
}
