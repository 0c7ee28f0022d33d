//! Substitution of aggregates that can't be combined with streaming variants
//! that can.
//!
//! Exact DISTINCT counts, ordered-set aggregates and aggregates whose state
//! depends on the full input order have no meaningful partial states. Inside
//! a continuous view they're swapped for combinable counterparts, usually
//! approximate ones.
use contquery_error::{DbError, ErrorKind, Result, not_implemented};
use contquery_parser::ast::{Expr, Function, Ident, SelectExpr, SelectNode};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamingVariant {
    pub name: &'static str,
    pub variant: &'static str,
    /// Only applies to `DISTINCT` calls.
    pub distinct: bool,
    /// Ordered-set call, WITHIN GROUP inputs become trailing arguments.
    pub ordered_set: bool,
}

pub const STREAMING_VARIANTS: &[StreamingVariant] = &[
    StreamingVariant {
        name: "count",
        variant: "hll_count_distinct",
        distinct: true,
        ordered_set: false,
    },
    StreamingVariant {
        name: "array_agg",
        variant: "set_agg",
        distinct: true,
        ordered_set: false,
    },
    StreamingVariant {
        name: "array_agg",
        variant: "combinable_array_agg",
        distinct: false,
        ordered_set: false,
    },
    StreamingVariant {
        name: "string_agg",
        variant: "combinable_string_agg",
        distinct: false,
        ordered_set: false,
    },
    StreamingVariant {
        name: "rank",
        variant: "combinable_rank",
        distinct: false,
        ordered_set: true,
    },
    StreamingVariant {
        name: "dense_rank",
        variant: "combinable_dense_rank",
        distinct: false,
        ordered_set: true,
    },
    StreamingVariant {
        name: "percent_rank",
        variant: "combinable_percent_rank",
        distinct: false,
        ordered_set: true,
    },
    StreamingVariant {
        name: "cume_dist",
        variant: "combinable_cume_dist",
        distinct: false,
        ordered_set: true,
    },
    StreamingVariant {
        name: "percentile_cont",
        variant: "combinable_percentile_cont",
        distinct: false,
        ordered_set: true,
    },
    StreamingVariant {
        name: "first_values",
        variant: "combinable_first_values",
        distinct: false,
        ordered_set: true,
    },
];

/// Find the streaming variant for a call.
pub fn streaming_variant(name: &str, distinct: bool) -> Option<&'static StreamingVariant> {
    STREAMING_VARIANTS
        .iter()
        .find(|v| v.name == name && v.distinct == distinct)
}

/// User facing name for an aggregate, mapping streaming variants back to the
/// aggregate they replaced.
pub fn display_name(name: &str) -> &str {
    STREAMING_VARIANTS
        .iter()
        .find(|v| v.variant == name)
        .map(|v| v.name)
        .unwrap_or(name)
}

/// Rewrite every aggregate call in a query into its streaming variant.
///
/// `is_aggregate` decides which function names are aggregates.
pub fn rewrite_streaming_aggregates(
    select: &SelectNode,
    is_aggregate: &impl Fn(&str) -> bool,
) -> Result<SelectNode> {
    let mut rewritten = select.clone();

    let mut projections = Vec::with_capacity(select.projections.len());
    for proj in &select.projections {
        let proj = match proj {
            SelectExpr::Expr(expr) => {
                let new_expr = rewrite_expr(expr, is_aggregate)?;
                // Keep the column named after the aggregate the user wrote.
                if &new_expr != expr && is_renamed_call(expr, &new_expr) {
                    SelectExpr::AliasedExpr(new_expr, Ident::new(super::expr_output_name(expr)))
                } else {
                    SelectExpr::Expr(new_expr)
                }
            }
            SelectExpr::AliasedExpr(expr, alias) => {
                SelectExpr::AliasedExpr(rewrite_expr(expr, is_aggregate)?, alias.clone())
            }
            SelectExpr::Wildcard => SelectExpr::Wildcard,
        };
        projections.push(proj);
    }
    rewritten.projections = projections;

    if let Some(having) = &select.having {
        rewritten.having = Some(rewrite_expr(having, is_aggregate)?);
    }
    for order_by in &mut rewritten.order_by {
        order_by.expr = rewrite_expr(&order_by.expr, is_aggregate)?;
    }

    Ok(rewritten)
}

fn is_renamed_call(before: &Expr, after: &Expr) -> bool {
    match (before.unnested(), after.unnested()) {
        (Expr::Function(a), Expr::Function(b)) => a.name != b.name,
        _ => false,
    }
}

fn rewrite_expr(expr: &Expr, is_aggregate: &impl Fn(&str) -> bool) -> Result<Expr> {
    let mut error = None;
    let rewritten = expr.transform_down(&mut |e| {
        let Expr::Function(func) = e else {
            return None;
        };
        if func.over.is_some() || !is_aggregate(func.name()) {
            return None;
        }
        match rewrite_call(func) {
            Ok(new) => Some(new),
            Err(e) => {
                error.get_or_insert(e);
                Some(Expr::Function(func.clone()))
            }
        }
    });

    match error {
        Some(e) => Err(e),
        None => Ok(rewritten),
    }
}

fn rewrite_call(func: &Function) -> Result<Expr> {
    let Some(variant) = streaming_variant(func.name(), func.distinct) else {
        if func.distinct {
            return Err(DbError::new(format!(
                "DISTINCT is not supported for {} in continuous views",
                func.name()
            ))
            .with_kind(ErrorKind::AggregateNotCombinable));
        }
        return Ok(Expr::Function(Box::new(func.clone())));
    };

    let mut new = func.clone();
    new.name = Ident::new(variant.variant);
    new.distinct = false;

    if variant.ordered_set {
        if func.within_group.is_empty() {
            return Err(DbError::new(format!(
                "WITHIN GROUP is required for ordered-set aggregate {}",
                func.name()
            )));
        }
        if func.within_group.len() != 1 {
            not_implemented!("{} with multiple WITHIN GROUP columns", func.name());
        }
        // Combinable states order ascending with nulls last.
        if func.within_group.iter().any(|o| o.desc || o.nulls_first()) {
            not_implemented!("{} with descending or NULLS FIRST WITHIN GROUP ordering", func.name());
        }
        new.args
            .extend(func.within_group.iter().map(|o| o.expr.clone()));
        new.within_group.clear();
    }

    debug!(from = func.name(), to = variant.variant, "substituted streaming aggregate");
    Ok(Expr::Function(Box::new(new)))
}

#[cfg(test)]
mod tests {
    use contquery_parser::statement::Statement;

    use super::*;

    fn select(sql: &str) -> SelectNode {
        match contquery_parser::parse(sql).unwrap().remove(0) {
            Statement::Query(select) => select,
            other => panic!("unexpected statement: {other:?}"),
        }
    }

    fn is_agg(name: &str) -> bool {
        matches!(
            name,
            "count"
                | "sum"
                | "array_agg"
                | "string_agg"
                | "rank"
                | "dense_rank"
                | "percentile_cont"
                | "first_values"
        )
    }

    #[test]
    fn rewrites_calls() {
        // (input, expected)
        let cases = [
            (
                "SELECT count(DISTINCT x) FROM s",
                "SELECT hll_count_distinct(x) AS count FROM s",
            ),
            ("SELECT count(x) FROM s", "SELECT count(x) FROM s"),
            (
                "SELECT array_agg(DISTINCT x) AS xs FROM s",
                "SELECT set_agg(x) AS xs FROM s",
            ),
            (
                "SELECT rank(3) WITHIN GROUP (ORDER BY x) FROM s",
                "SELECT combinable_rank(3, x) AS rank FROM s",
            ),
            (
                "SELECT sum(x) + percentile_cont(0.9) WITHIN GROUP (ORDER BY x) FROM s",
                "SELECT sum(x) + combinable_percentile_cont(0.9, x) FROM s",
            ),
            (
                "SELECT first_values(3) WITHIN GROUP (ORDER BY x) AS lowest FROM s",
                "SELECT combinable_first_values(3, x) AS lowest FROM s",
            ),
        ];

        for (input, expected) in cases {
            let got = rewrite_streaming_aggregates(&select(input), &is_agg).unwrap();
            assert_eq!(select(expected), got, "input: {input}");
        }
    }

    #[test]
    fn descending_hypothetical_not_implemented() {
        // (input)
        let cases = [
            "SELECT dense_rank(3) WITHIN GROUP (ORDER BY x DESC) FROM s",
            "SELECT first_values(2) WITHIN GROUP (ORDER BY x NULLS FIRST) FROM s",
        ];
        for input in cases {
            assert!(rewrite_streaming_aggregates(&select(input), &is_agg).is_err(), "input: {input}");
        }
    }

    #[test]
    fn distinct_sum_rejected() {
        let q = select("SELECT sum(DISTINCT x) FROM s");
        let err = rewrite_streaming_aggregates(&q, &is_agg).unwrap_err();
        assert_eq!(ErrorKind::AggregateNotCombinable, err.kind());
    }

    #[test]
    fn display_names() {
        assert_eq!("count", display_name("hll_count_distinct"));
        assert_eq!("percentile_cont", display_name("combinable_percentile_cont"));
        assert_eq!("first_values", display_name("combinable_first_values"));
        assert_eq!("sum", display_name("sum"));
    }
}
