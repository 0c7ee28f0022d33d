use contquery_error::{DbError, ErrorKind, Result};
use contquery_parser::ast::{Expr, Function, OrderByNode};
use tracing::trace;

use crate::catalog::AggregateKind;
use crate::catalog::resolver::CombineInfoResolver;
use crate::functions::scalar::is_volatile_function;

/// Pseudo aggregate merging stored partial states.
pub const COMBINE_FUNCTION: &str = "combine";
/// Scalar producing an aggregate's final value from a stored state.
pub const FINALIZE_FUNCTION: &str = "finalize";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallSiteKind {
    Normal,
    OrderedSet,
    Hypothetical,
    /// `combine(col)` over a column of partial states.
    Combine,
    /// Aggregate used as a window function.
    Window,
}

/// One aggregate call found in a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateCallSite {
    /// The full call expression as written.
    pub call: Expr,
    pub name: String,
    pub kind: CallSiteKind,
    /// Aggregated arguments. For ordered-set aggregates these are the
    /// WITHIN GROUP expressions.
    pub args: Vec<Expr>,
    /// Arguments evaluated once per group, only for ordered-set aggregates.
    pub direct_args: Vec<Expr>,
    pub star: bool,
    pub distinct: bool,
    pub order_by: Vec<OrderByNode>,
    pub filter: Option<Expr>,
}

impl AggregateCallSite {
    pub fn is_ordered_set(&self) -> bool {
        matches!(self.kind, CallSiteKind::OrderedSet | CallSiteKind::Hypothetical)
    }
}

/// Finds aggregate calls in expressions.
#[derive(Debug, Clone, Copy)]
pub struct AggregateClassifier<'a> {
    resolver: &'a CombineInfoResolver,
    /// Collapse identical non-volatile calls into a single call site.
    dedup: bool,
}

impl<'a> AggregateClassifier<'a> {
    pub fn new(resolver: &'a CombineInfoResolver, dedup: bool) -> Self {
        AggregateClassifier { resolver, dedup }
    }

    fn is_aggregate_function(&self, func: &Function) -> bool {
        func.name() == COMBINE_FUNCTION || self.resolver.is_aggregate_name(func.name())
    }

    /// If the expression itself is an aggregate call, ignoring window calls.
    pub fn is_aggregate_call(&self, expr: &Expr) -> bool {
        match expr.unnested() {
            Expr::Function(func) => func.over.is_none() && self.is_aggregate_function(func),
            _ => false,
        }
    }

    /// If an aggregate call appears anywhere in the expression.
    pub fn contains_aggregate(&self, expr: &Expr) -> bool {
        expr.any(&mut |e| self.is_aggregate_call(e))
    }

    /// Collect the aggregate call sites of the given expressions, in the order
    /// they're first encountered.
    pub fn classify<'e>(&self, exprs: impl IntoIterator<Item = &'e Expr>) -> Result<Vec<AggregateCallSite>> {
        let mut sites = Vec::new();
        for expr in exprs {
            self.collect(expr, &mut sites)?;
        }
        trace!(num_sites = sites.len(), "classified aggregate calls");
        Ok(sites)
    }

    fn collect(&self, expr: &Expr, sites: &mut Vec<AggregateCallSite>) -> Result<()> {
        if let Expr::Function(func) = expr {
            if func.over.is_some() {
                if self.is_aggregate_function(func) {
                    self.push(self.window_site(func, expr), sites);
                }
                // Aggregates are allowed as window function inputs.
                return self.collect_children(expr, sites);
            }

            if self.is_aggregate_function(func) {
                let site = self.call_site(func, expr)?;
                self.push(site, sites);
                return Ok(());
            }
        }

        self.collect_children(expr, sites)
    }

    fn collect_children(&self, expr: &Expr, sites: &mut Vec<AggregateCallSite>) -> Result<()> {
        let mut result = Ok(());
        expr.for_each_child(&mut |child| {
            if result.is_ok() {
                result = self.collect(child, sites);
            }
        });
        result
    }

    fn push(&self, site: AggregateCallSite, sites: &mut Vec<AggregateCallSite>) {
        if self.dedup && !self.is_volatile(&site.call) && sites.iter().any(|s| s.call == site.call) {
            return;
        }
        sites.push(site);
    }

    fn is_volatile(&self, call: &Expr) -> bool {
        call.any(&mut |e| match e {
            Expr::Function(func) => !self.is_aggregate_function(func) && is_volatile_function(func.name()),
            _ => false,
        })
    }

    fn call_site(&self, func: &Function, expr: &Expr) -> Result<AggregateCallSite> {
        self.check_not_nested(func)?;

        if func.name() == COMBINE_FUNCTION {
            if func.args.len() != 1 || func.star || func.distinct || !func.within_group.is_empty() {
                return Err(DbError::new("combine expects a single column of aggregate states"));
            }
            return Ok(AggregateCallSite {
                call: expr.clone(),
                name: COMBINE_FUNCTION.to_string(),
                kind: CallSiteKind::Combine,
                args: func.args.clone(),
                direct_args: Vec::new(),
                star: false,
                distinct: false,
                order_by: Vec::new(),
                filter: func.filter.as_deref().cloned(),
            });
        }

        let catalog_kind = self
            .resolver
            .catalog()
            .overloads(func.name())
            .first()
            .and_then(|id| self.resolver.catalog().aggregate(*id))
            .map(|entry| entry.kind)
            .unwrap_or(AggregateKind::Normal);

        let kind = match catalog_kind {
            AggregateKind::Normal => CallSiteKind::Normal,
            AggregateKind::OrderedSet => CallSiteKind::OrderedSet,
            AggregateKind::Hypothetical => CallSiteKind::Hypothetical,
        };

        match kind {
            CallSiteKind::OrderedSet | CallSiteKind::Hypothetical => {
                if func.within_group.is_empty() {
                    return Err(DbError::new(format!(
                        "WITHIN GROUP is required for ordered-set aggregate {}",
                        func.name()
                    )));
                }
                if func.distinct || !func.order_by.is_empty() {
                    return Err(DbError::new(format!(
                        "Cannot use DISTINCT or ORDER BY in ordered-set aggregate {}",
                        func.name()
                    )));
                }
                Ok(AggregateCallSite {
                    call: expr.clone(),
                    name: func.name().to_string(),
                    kind,
                    args: func.within_group.iter().map(|o| o.expr.clone()).collect(),
                    direct_args: func.args.clone(),
                    star: false,
                    distinct: false,
                    order_by: func.within_group.clone(),
                    filter: func.filter.as_deref().cloned(),
                })
            }
            _ => {
                if !func.within_group.is_empty() {
                    return Err(DbError::new(format!(
                        "{} is not an ordered-set aggregate, WITHIN GROUP cannot be used",
                        func.name()
                    )));
                }
                Ok(AggregateCallSite {
                    call: expr.clone(),
                    name: func.name().to_string(),
                    kind,
                    args: func.args.clone(),
                    direct_args: Vec::new(),
                    star: func.star,
                    distinct: func.distinct,
                    order_by: func.order_by.clone(),
                    filter: func.filter.as_deref().cloned(),
                })
            }
        }
    }

    fn window_site(&self, func: &Function, expr: &Expr) -> AggregateCallSite {
        AggregateCallSite {
            call: expr.clone(),
            name: func.name().to_string(),
            kind: CallSiteKind::Window,
            args: func.args.clone(),
            direct_args: Vec::new(),
            star: func.star,
            distinct: func.distinct,
            order_by: func.order_by.clone(),
            filter: func.filter.as_deref().cloned(),
        }
    }

    fn check_not_nested(&self, func: &Function) -> Result<()> {
        let mut inputs: Vec<&Expr> = func.args.iter().collect();
        inputs.extend(func.order_by.iter().map(|o| &o.expr));
        inputs.extend(func.within_group.iter().map(|o| &o.expr));
        if let Some(filter) = &func.filter {
            inputs.push(filter);
        }

        for input in inputs {
            if self.contains_aggregate(input) {
                return Err(DbError::new(format!(
                    "Aggregate function calls cannot be nested inside {}",
                    func.name()
                ))
                .with_kind(ErrorKind::NestedAggregateNotAllowed)
                .with_field("argument", input.to_string()));
            }
        }
        Ok(())
    }
}
