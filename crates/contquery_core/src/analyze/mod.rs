//! Statement level analysis shared by the planner and the query splitter.
pub mod classifier;
pub mod streaming;

use contquery_parser::ast::{Expr, SelectExpr};

/// Name given to expressions without a natural column name.
pub const UNNAMED_COLUMN: &str = "?column?";

/// Output column name of a projection.
pub fn output_name(select_expr: &SelectExpr) -> String {
    match select_expr {
        SelectExpr::AliasedExpr(_, alias) => alias.value.clone(),
        SelectExpr::Expr(expr) => expr_output_name(expr),
        SelectExpr::Wildcard => "*".to_string(),
    }
}

/// Column name an unaliased expression produces.
pub fn expr_output_name(expr: &Expr) -> String {
    match expr.unnested() {
        Expr::Ident(ident) => ident.value.clone(),
        Expr::CompoundIdent(parts) => match parts.last() {
            Some(last) => last.value.clone(),
            None => UNNAMED_COLUMN.to_string(),
        },
        Expr::Function(func) => func.name().to_string(),
        Expr::Cast { expr, .. } => expr_output_name(expr),
        _ => UNNAMED_COLUMN.to_string(),
    }
}

/// Column name referenced by an expression, if it's a plain column
/// reference.
pub fn column_ref_name(expr: &Expr) -> Option<&str> {
    match expr.unnested() {
        Expr::Ident(ident) => Some(ident.as_str()),
        Expr::CompoundIdent(parts) => parts.last().map(|p| p.as_str()),
        _ => None,
    }
}

/// If the expression references any column.
pub fn references_columns(expr: &Expr) -> bool {
    expr.any(&mut |e| matches!(e, Expr::Ident(_) | Expr::CompoundIdent(_)))
}
