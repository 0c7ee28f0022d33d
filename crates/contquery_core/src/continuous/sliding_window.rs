//! Detection of sliding window predicates.
//!
//! A sliding window is a top-level WHERE conjunct comparing a timestamp
//! column against the current clock minus a constant interval:
//!
//! ```text
//! WHERE arrival_timestamp > clock_timestamp() - interval '1 hour'
//! ```
use contquery_error::{DbError, ErrorKind, Result};
use contquery_parser::ast::{BinaryOperator, Expr, SelectNode, TypeName};

use crate::analyze::column_ref_name;
use crate::arrays::datatype::DataType;
use crate::arrays::field::Schema;
use crate::arrays::interval::Interval;
use crate::planner::bind::constant_value;

/// Functions reading the current time.
pub const CLOCK_FUNCTIONS: &[&str] = &["now", "clock_timestamp"];

/// A sliding window predicate found in a query.
#[derive(Debug, Clone, PartialEq)]
pub struct SlidingWindow {
    /// Timestamp expression being bounded, always a column reference.
    pub time_expr: Expr,
    /// Window width.
    pub interval: Interval,
    /// Comparison normalized to `time_expr <op> clock - interval`, either
    /// `>` or `>=`.
    pub op: BinaryOperator,
    /// Name of the clock function used.
    pub clock: String,
    /// The conjunct as written.
    pub predicate: Expr,
}

impl SlidingWindow {
    /// Rebuild the window predicate over a different time expression.
    pub fn predicate_over(&self, time_expr: Expr) -> Expr {
        Expr::binary(time_expr, self.op, window_lower_bound(&self.clock, &self.interval))
    }

    /// Bucket width for hoisting the time column.
    ///
    /// The width is `step_factor` percent of the window, but never less than
    /// `min_step`.
    pub fn step(&self, step_factor: f64, min_step: Interval) -> Interval {
        let step = self.interval.scale(step_factor / 100.0);
        if step.total_micros() < min_step.total_micros() {
            min_step
        } else {
            step
        }
    }
}

/// `clock() - interval '<interval>'`
pub fn window_lower_bound(clock: &str, interval: &Interval) -> Expr {
    Expr::binary(
        Expr::function(contquery_parser::ast::Function::new(clock, Vec::new())),
        BinaryOperator::Minus,
        interval_literal(interval),
    )
}

pub fn interval_literal(interval: &Interval) -> Expr {
    Expr::TypedString {
        datatype: TypeName::Interval,
        value: interval.to_string(),
    }
}

fn ambiguous(msg: impl Into<String>) -> DbError {
    DbError::new(msg).with_kind(ErrorKind::AmbiguousSlidingWindowPredicate)
}

fn is_clock_call(expr: &Expr) -> bool {
    match expr.unnested() {
        Expr::Function(func) => {
            func.args.is_empty() && func.over.is_none() && CLOCK_FUNCTIONS.contains(&func.name())
        }
        _ => false,
    }
}

fn mentions_clock(expr: &Expr) -> bool {
    expr.any(&mut |e| is_clock_call(e))
}

/// Find the sliding window predicate of a query, if any.
///
/// Errors if a comparison against the clock appears anywhere other than as
/// a single top-level conjunct, if its shape isn't recognized, or if the
/// bounded expression isn't a timestamp column.
pub fn extract_window(select: &SelectNode, schema: &Schema) -> Result<Option<SlidingWindow>> {
    let where_expr = match &select.where_expr {
        Some(expr) => expr,
        None => return Ok(None),
    };

    // Every comparison involving the clock, wherever it is in the tree.
    let mut candidates: Vec<&Expr> = Vec::new();
    collect_clock_comparisons(where_expr, &mut candidates);
    if candidates.is_empty() {
        return Ok(None);
    }
    if candidates.len() > 1 {
        return Err(ambiguous("Only a single sliding window predicate is allowed")
            .with_field("count", candidates.len()));
    }

    let candidate = candidates[0];
    let conjuncts = where_expr.split_conjunction();
    if !conjuncts.iter().any(|c| std::ptr::eq(c.unnested(), candidate)) {
        return Err(ambiguous(
            "Sliding window predicate must be a top-level conjunct of the WHERE clause",
        )
        .with_field("predicate", candidate.to_string()));
    }

    let (time_expr, op, bound) = match candidate {
        Expr::BinaryExpr { left, op, right } if matches!(op, BinaryOperator::Gt | BinaryOperator::GtEq) => {
            (left.as_ref(), *op, right.as_ref())
        }
        Expr::BinaryExpr { left, op, right } if matches!(op, BinaryOperator::Lt | BinaryOperator::LtEq) => {
            (right.as_ref(), op.flip(), left.as_ref())
        }
        other => {
            return Err(ambiguous("Unrecognized sliding window predicate").with_field("predicate", other.to_string()));
        }
    };

    let (clock, interval_expr) = match bound.unnested() {
        Expr::BinaryExpr {
            left,
            op: BinaryOperator::Minus,
            right,
        } if is_clock_call(left) && !mentions_clock(right) && !mentions_clock(time_expr) => {
            let clock = match left.unnested() {
                Expr::Function(func) => func.name().to_string(),
                _ => return Err(ambiguous("Expected a clock function")),
            };
            (clock, right.as_ref())
        }
        _ => {
            return Err(ambiguous("Sliding window bound must have the form clock() - interval")
                .with_field("predicate", candidate.to_string()));
        }
    };

    let interval = constant_value(interval_expr)
        .and_then(|v| v.cast_to(&DataType::Interval))
        .and_then(|v| v.try_as_interval())
        .map_err(|e| {
            ambiguous("Sliding window width must be a constant interval")
                .with_field("interval", interval_expr.to_string())
                .with_field("reason", e.get_msg().to_string())
        })?;
    if interval.total_micros() <= 0 {
        return Err(DbError::new("Sliding window width must be positive")
            .with_kind(ErrorKind::Syntax)
            .with_field("interval", interval.to_string()));
    }

    let column = column_ref_name(time_expr).ok_or_else(|| {
        DbError::new("Sliding window must bound a timestamp column")
            .with_kind(ErrorKind::InvalidSlidingWindowColumnType)
            .with_field("expression", time_expr.to_string())
    })?;
    let (_, field) = schema
        .find(column)
        .ok_or_else(|| DbError::new(format!("Missing column \"{column}\" in sliding window predicate")))?;
    if !field.datatype.is_datetime() {
        return Err(DbError::new(format!(
            "Sliding window column \"{column}\" must be a timestamp, got {}",
            field.datatype
        ))
        .with_kind(ErrorKind::InvalidSlidingWindowColumnType));
    }

    Ok(Some(SlidingWindow {
        time_expr: time_expr.unnested().clone(),
        interval,
        op,
        clock,
        predicate: candidate.clone(),
    }))
}

fn collect_clock_comparisons<'a>(expr: &'a Expr, out: &mut Vec<&'a Expr>) {
    match expr {
        Expr::BinaryExpr { left, op, right } if op.is_comparison() && (mentions_clock(left) || mentions_clock(right)) => {
            out.push(expr);
        }
        other => other.for_each_child(&mut |child| collect_clock_comparisons(child, out)),
    }
}

/// Remove the window predicate from a WHERE clause, keeping the other
/// conjuncts.
pub fn strip_window_predicate(where_expr: &Expr, window: &SlidingWindow) -> Option<Expr> {
    Expr::and_all(
        where_expr
            .split_conjunction()
            .into_iter()
            .filter(|c| c.unnested() != &window.predicate)
            .cloned(),
    )
}

#[cfg(test)]
mod tests {
    use contquery_parser::statement::Statement;

    use super::*;
    use crate::arrays::field::Field;

    fn select(sql: &str) -> SelectNode {
        match contquery_parser::parse(sql).unwrap().remove(0) {
            Statement::Query(select) => select,
            other => panic!("unexpected statement: {other:?}"),
        }
    }

    fn schema() -> Schema {
        Schema::new([
            Field::new("ts", DataType::Timestamp),
            Field::new("x", DataType::Int64),
        ])
    }

    #[test]
    fn accepted_shapes() {
        // (where clause, expected op)
        let cases = [
            ("ts > now() - interval '1 hour'", BinaryOperator::Gt),
            ("ts >= clock_timestamp() - interval '1 hour'", BinaryOperator::GtEq),
            ("now() - interval '1 hour' < ts", BinaryOperator::Gt),
            ("now() - interval '1 hour' <= ts AND x > 5", BinaryOperator::GtEq),
            ("x > 5 AND (ts > now() - interval '1 hour')", BinaryOperator::Gt),
        ];
        for (clause, op) in cases {
            let sql = format!("SELECT x FROM s WHERE {clause}");
            let window = extract_window(&select(&sql), &schema()).unwrap().unwrap();
            assert_eq!(op, window.op, "{clause}");
            assert_eq!(Expr::column("ts"), window.time_expr);
            assert_eq!(Interval::from_secs(3600), window.interval);
        }
    }

    #[test]
    fn rejected_shapes() {
        // (where clause, expected error kind)
        let cases = [
            (
                "ts > now() - interval '1 hour' OR x > 5",
                ErrorKind::AmbiguousSlidingWindowPredicate,
            ),
            (
                "ts > now() - interval '1 hour' AND ts > now() - interval '2 hours'",
                ErrorKind::AmbiguousSlidingWindowPredicate,
            ),
            ("ts < now() - interval '1 hour'", ErrorKind::AmbiguousSlidingWindowPredicate),
            ("NOT (ts > now() - interval '1 hour')", ErrorKind::AmbiguousSlidingWindowPredicate),
            ("x > now() - interval '1 hour'", ErrorKind::InvalidSlidingWindowColumnType),
            (
                "date_round(ts, interval '1 minute') > now() - interval '1 hour'",
                ErrorKind::InvalidSlidingWindowColumnType,
            ),
        ];
        for (clause, kind) in cases {
            let sql = format!("SELECT x FROM s WHERE {clause}");
            let err = extract_window(&select(&sql), &schema()).unwrap_err();
            assert_eq!(kind, err.kind(), "{clause}");
        }
    }

    #[test]
    fn no_window() {
        assert!(extract_window(&select("SELECT x FROM s WHERE x > 5"), &schema()).unwrap().is_none());
        assert!(extract_window(&select("SELECT x FROM s"), &schema()).unwrap().is_none());
    }

    #[test]
    fn step_is_clamped() {
        let window = extract_window(
            &select("SELECT x FROM s WHERE ts > now() - interval '1 hour'"),
            &schema(),
        )
        .unwrap()
        .unwrap();

        // (step factor, expected seconds)
        let cases = [(25.0, 900), (5.0, 180), (1.0, 60)];
        for (factor, secs) in cases {
            let step = window.step(factor, Interval::from_secs(60));
            assert_eq!(secs * 1_000_000, step.total_micros(), "factor {factor}");
        }
    }

    #[test]
    fn strip_keeps_other_conjuncts() {
        let select = select("SELECT x FROM s WHERE ts > now() - interval '1 hour' AND x > 5");
        let window = extract_window(&select, &schema()).unwrap().unwrap();
        let stripped = strip_window_predicate(select.where_expr.as_ref().unwrap(), &window).unwrap();
        assert_eq!("x > 5", stripped.to_string());
    }
}
