use contquery_error::{DbError, Result, not_implemented};
use contquery_parser::ast::{Expr, Function, Literal, TypeName};

use crate::analyze::classifier::{COMBINE_FUNCTION, FINALIZE_FUNCTION};
use crate::arrays::datatype::DataType;
use crate::arrays::field::Schema;
use crate::arrays::interval::Interval;
use crate::arrays::scalar::{ScalarValue, parse_timestamp};
use crate::catalog::resolver::CombineInfoResolver;
use crate::expr::binary::binary_result_type;
use crate::expr::{FinalizeExpr, PhysicalExpr, ScalarFunctionExpr};
use crate::functions::scalar::find_scalar_function;

/// Binds parsed expressions to columns of a schema.
#[derive(Debug)]
pub struct ExprBinder<'a> {
    resolver: &'a CombineInfoResolver,
    schema: &'a Schema,
    /// Expressions computed by a lower operator, mapped to their output
    /// column. Checked before anything else.
    mapped: Vec<(Expr, usize)>,
    /// Only allow column references through `mapped`.
    mapped_only: bool,
    /// Clause being bound, used in error messages.
    clause: &'static str,
}

impl<'a> ExprBinder<'a> {
    pub fn new(resolver: &'a CombineInfoResolver, schema: &'a Schema, clause: &'static str) -> Self {
        ExprBinder {
            resolver,
            schema,
            mapped: Vec::new(),
            mapped_only: false,
            clause,
        }
    }

    /// Binder for expressions evaluated after aggregation, where columns may
    /// only be referenced through group expressions or aggregate calls.
    pub fn post_aggregate(
        resolver: &'a CombineInfoResolver,
        schema: &'a Schema,
        mapped: Vec<(Expr, usize)>,
        clause: &'static str,
    ) -> Self {
        ExprBinder {
            resolver,
            schema,
            mapped,
            mapped_only: true,
            clause,
        }
    }

    pub fn with_mapped(mut self, mapped: Vec<(Expr, usize)>) -> Self {
        self.mapped = mapped;
        self
    }

    pub fn schema(&self) -> &Schema {
        self.schema
    }

    fn mapped_column(&self, expr: &Expr) -> Option<PhysicalExpr> {
        let expr = expr.unnested();
        self.mapped
            .iter()
            .find(|(m, _)| m.unnested() == expr)
            .map(|(_, idx)| self.column_expr(*idx))
    }

    fn column_expr(&self, idx: usize) -> PhysicalExpr {
        let field = &self.schema.fields[idx];
        PhysicalExpr::column(idx, field.name.clone(), field.datatype.clone())
    }

    pub fn bind(&self, expr: &Expr) -> Result<PhysicalExpr> {
        if let Some(col) = self.mapped_column(expr) {
            return Ok(col);
        }

        match expr {
            Expr::Ident(_) | Expr::CompoundIdent(_) => self.bind_column(expr),
            Expr::Literal(lit) => Ok(PhysicalExpr::Literal(bind_literal(lit)?)),
            Expr::TypedString { datatype, value } => {
                Ok(PhysicalExpr::Literal(typed_string(*datatype, value)?))
            }
            Expr::UnaryExpr { op, expr } => Ok(PhysicalExpr::Unary {
                op: *op,
                expr: Box::new(self.bind(expr)?),
            }),
            Expr::BinaryExpr { left, op, right } => {
                let left = self.bind(left)?;
                let right = self.bind(right)?;
                binary_result_type(&left.datatype(), *op, &right.datatype())?;
                Ok(PhysicalExpr::Binary {
                    left: Box::new(left),
                    op: *op,
                    right: Box::new(right),
                })
            }
            Expr::Nested(inner) => self.bind(inner),
            Expr::Cast { datatype, expr } => Ok(PhysicalExpr::Cast {
                datatype: DataType::from(*datatype),
                expr: Box::new(self.bind(expr)?),
            }),
            Expr::IsNull { expr, negated } => Ok(PhysicalExpr::IsNull {
                expr: Box::new(self.bind(expr)?),
                negated: *negated,
            }),
            Expr::Function(func) => self.bind_function(func),
        }
    }

    fn bind_column(&self, expr: &Expr) -> Result<PhysicalExpr> {
        let name = match expr {
            Expr::Ident(ident) => ident.as_str(),
            Expr::CompoundIdent(parts) => match parts.last() {
                Some(last) => last.as_str(),
                None => return Err(DbError::new("Empty column reference")),
            },
            other => return Err(DbError::new(format!("Not a column reference: {other}"))),
        };

        if self.mapped_only {
            return Err(DbError::new(format!(
                "Column \"{name}\" must appear in the GROUP BY clause or be used in an aggregate function"
            ))
            .with_field("clause", self.clause));
        }

        match self.schema.find(name) {
            Some((idx, _)) => Ok(self.column_expr(idx)),
            None => Err(DbError::new(format!("Missing column \"{name}\""))
                .with_field("clause", self.clause)
                .with_field("available", self.schema.names().map(|n| n.to_string()).collect::<Vec<_>>())),
        }
    }

    fn bind_function(&self, func: &Function) -> Result<PhysicalExpr> {
        if func.over.is_some() {
            not_implemented!("window function {}", func.name());
        }
        if func.name() == COMBINE_FUNCTION || self.resolver.is_aggregate_name(func.name()) {
            return Err(DbError::new(format!(
                "Aggregate function {} is not allowed in {}",
                func.name(),
                self.clause
            )));
        }
        if func.distinct || func.star || !func.order_by.is_empty() || func.filter.is_some() {
            return Err(DbError::new(format!(
                "{} is not an aggregate function, aggregate modifiers can't be used",
                func.name()
            )));
        }

        if func.name() == FINALIZE_FUNCTION {
            return self.bind_finalize(func);
        }

        let set = find_scalar_function(func.name())
            .ok_or_else(|| DbError::new(format!("Unknown function {}", func.name())))?;
        let args = func
            .args
            .iter()
            .map(|arg| self.bind(arg))
            .collect::<Result<Vec<_>>>()?;
        let types: Vec<_> = args.iter().map(|a| a.datatype()).collect();
        let return_type = set.function.return_type(&types)?;

        Ok(PhysicalExpr::ScalarFunction(ScalarFunctionExpr {
            function: set,
            args,
            return_type,
        }))
    }

    fn bind_finalize(&self, func: &Function) -> Result<PhysicalExpr> {
        let [arg] = func.args.as_slice() else {
            return Err(DbError::new("finalize expects a single argument"));
        };
        let input = self.bind(arg)?;
        let state = input
            .as_column()
            .and_then(|col| self.schema.fields.get(col.idx))
            .and_then(|field| field.state_of)
            .ok_or_else(|| {
                DbError::new("finalize expects a column of aggregate states")
                    .with_field("argument", arg.to_string())
            })?;

        let descriptor = self.resolver.resolve(state.aggregate)?;
        let return_type = descriptor.result_type(&descriptor.arg_types);

        Ok(PhysicalExpr::Finalize(FinalizeExpr {
            descriptor,
            serialized: state.serialized,
            input: Box::new(input),
            return_type,
        }))
    }
}

pub fn bind_literal(lit: &Literal) -> Result<ScalarValue> {
    Ok(match lit {
        Literal::Number(n) => match n.parse::<i64>() {
            Ok(i) => ScalarValue::Int64(i),
            Err(_) => ScalarValue::Float64(n.parse::<f64>()?),
        },
        Literal::SingleQuotedString(s) => ScalarValue::Utf8(s.clone()),
        Literal::Boolean(b) => ScalarValue::Boolean(*b),
        Literal::Null => ScalarValue::Null,
    })
}

fn typed_string(datatype: TypeName, value: &str) -> Result<ScalarValue> {
    match datatype {
        TypeName::Interval => Ok(ScalarValue::Interval(Interval::parse(value)?)),
        TypeName::Timestamp => Ok(ScalarValue::Timestamp(parse_timestamp(value)?)),
        other => ScalarValue::Utf8(value.to_string()).cast_to(&DataType::from(other)),
    }
}

/// Evaluate a constant expression such as a LIMIT count.
pub fn constant_value(expr: &Expr) -> Result<ScalarValue> {
    match expr.unnested() {
        Expr::Literal(lit) => bind_literal(lit),
        Expr::TypedString { datatype, value } => typed_string(*datatype, value),
        Expr::Cast { datatype, expr } => constant_value(expr)?.cast_to(&DataType::from(*datatype)),
        Expr::UnaryExpr {
            op: contquery_parser::ast::UnaryOperator::Minus,
            expr,
        } => match constant_value(expr)? {
            ScalarValue::Int64(v) => Ok(ScalarValue::Int64(-v)),
            ScalarValue::Float64(v) => Ok(ScalarValue::Float64(-v)),
            other => Err(DbError::new(format!("Cannot negate {other}"))),
        },
        other => Err(DbError::new(format!("Expected a constant, got {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use contquery_error::ErrorKind;
    use contquery_parser::ast::BinaryOperator;

    use super::*;
    use crate::arrays::field::Field;
    use crate::catalog::AggregateCatalog;

    fn resolver() -> CombineInfoResolver {
        CombineInfoResolver::new(Arc::new(AggregateCatalog::with_builtins().unwrap()))
    }

    fn schema() -> Schema {
        Schema::new([
            Field::new("a", DataType::Int64),
            Field::new("ts", DataType::Timestamp),
        ])
    }

    #[test]
    fn binds_columns_and_literals() {
        let resolver = resolver();
        let schema = schema();
        let binder = ExprBinder::new(&resolver, &schema, "WHERE");
        let expr = Expr::binary(
            Expr::column("a"),
            BinaryOperator::Gt,
            Expr::Literal(Literal::Number("5".to_string())),
        );
        assert_eq!("(#0 > 5)", binder.bind(&expr).unwrap().to_string());
    }

    #[test]
    fn missing_column() {
        let resolver = resolver();
        let schema = schema();
        let binder = ExprBinder::new(&resolver, &schema, "WHERE");
        assert!(binder.bind(&Expr::column("nope")).is_err());
    }

    #[test]
    fn aggregates_rejected_in_where() {
        let resolver = resolver();
        let schema = schema();
        let binder = ExprBinder::new(&resolver, &schema, "WHERE");
        let expr = Expr::function(Function::new("sum", vec![Expr::column("a")]));
        assert!(binder.bind(&expr).is_err());
    }

    #[test]
    fn window_functions_not_implemented() {
        let resolver = resolver();
        let schema = schema();
        let binder = ExprBinder::new(&resolver, &schema, "SELECT");
        let mut func = Function::new("sum", vec![Expr::column("a")]);
        func.over = Some(Default::default());
        let err = binder.bind(&Expr::function(func)).unwrap_err();
        assert_eq!(ErrorKind::Internal, err.kind());
        assert!(err.get_msg().contains("Not yet implemented"));
    }

    #[test]
    fn ungrouped_column_rejected() {
        let resolver = resolver();
        let schema = Schema::new([Field::new("a", DataType::Int64)]);
        let binder =
            ExprBinder::post_aggregate(&resolver, &schema, vec![(Expr::column("a"), 0)], "SELECT");
        assert!(binder.bind(&Expr::column("a")).is_ok());
        assert!(binder.bind(&Expr::column("b")).is_err());
    }

    #[test]
    fn constants() {
        // (input, expected)
        let cases = [
            (Expr::Literal(Literal::Number("10".to_string())), ScalarValue::Int64(10)),
            (Expr::Literal(Literal::Number("2.5".to_string())), ScalarValue::Float64(2.5)),
            (
                Expr::TypedString {
                    datatype: TypeName::Interval,
                    value: "1 hour".to_string(),
                },
                ScalarValue::Interval(Interval::parse("1 hour").unwrap()),
            ),
        ];
        for (expr, expected) in cases {
            assert_eq!(expected, constant_value(&expr).unwrap());
        }
    }
}
