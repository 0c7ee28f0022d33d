use std::fmt;

use contquery_error::{DbError, ErrorKind, Result};

use super::{AstParseable, Expr, Ident, SelectNode};
use crate::keywords::Keyword;
use crate::parser::Parser;
use crate::tokens::Token;

/// A `key = value` option in a `WITH (...)` clause.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ViewOption {
    pub name: Ident,
    pub value: Expr,
}

impl AstParseable for ViewOption {
    fn parse(parser: &mut Parser) -> Result<Self> {
        let name = Ident::parse(parser)?;
        parser.expect_token(&Token::Eq)?;
        let value = Expr::parse(parser)?;
        Ok(ViewOption { name, value })
    }
}

impl fmt::Display for ViewOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.name, self.value)
    }
}

/// `CREATE CONTINUOUS VIEW name [WITH (key = value, ...)] AS SELECT ...`
///
/// Options are also accepted after the query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CreateContinuousViewNode {
    pub name: Ident,
    pub query: SelectNode,
    pub options: Vec<ViewOption>,
}

impl AstParseable for CreateContinuousViewNode {
    fn parse(parser: &mut Parser) -> Result<Self> {
        parser.expect_keyword_sequence(&[Keyword::CREATE, Keyword::CONTINUOUS, Keyword::VIEW])?;
        let name = Ident::parse(parser)?;

        let leading = parser.parse_keyword(Keyword::WITH);
        let mut options = if leading {
            parser.parse_parenthesized_comma_separated(ViewOption::parse)?
        } else {
            Vec::new()
        };
        parser.expect_keyword(Keyword::AS)?;

        let query = SelectNode::parse(parser)?;

        if parser.parse_keyword(Keyword::WITH) {
            if leading {
                return Err(DbError::new("WITH options given both before and after the query")
                    .with_kind(ErrorKind::Syntax));
            }
            options = parser.parse_parenthesized_comma_separated(ViewOption::parse)?;
        }

        Ok(CreateContinuousViewNode {
            name,
            query,
            options,
        })
    }
}

impl fmt::Display for CreateContinuousViewNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CREATE CONTINUOUS VIEW {}", self.name)?;
        if !self.options.is_empty() {
            write!(f, " WITH (")?;
            super::display_comma_separated(f, &self.options)?;
            write!(f, ")")?;
        }
        write!(f, " AS {}", self.query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::testutil::parse_ast;
    use crate::ast::{Literal, TypeName};

    #[test]
    fn parse_with_options() {
        let node: CreateContinuousViewNode = parse_ast(
            "CREATE CONTINUOUS VIEW v AS SELECT count(*) FROM s WITH (sw = '1 hour', step_factor = 25)",
        )
        .unwrap();

        assert_eq!(Ident::new("v"), node.name);
        let expected = vec![
            ViewOption {
                name: Ident::new("sw"),
                value: Expr::Literal(Literal::SingleQuotedString("1 hour".to_string())),
            },
            ViewOption {
                name: Ident::new("step_factor"),
                value: Expr::Literal(Literal::Number("25".to_string())),
            },
        ];
        assert_eq!(expected, node.options);
    }

    #[test]
    fn parse_interval_option() {
        let node: CreateContinuousViewNode = parse_ast(
            "create continuous view v as select x from s with (sw = interval '5 minutes')",
        )
        .unwrap();
        assert_eq!(
            Expr::TypedString {
                datatype: TypeName::Interval,
                value: "5 minutes".to_string()
            },
            node.options[0].value
        );
    }

    #[test]
    fn options_before_or_after_query() {
        // (sql, expected option count)
        let cases = [
            ("CREATE CONTINUOUS VIEW v WITH (sw = '1 hour') AS SELECT count(*) FROM s", 1),
            ("CREATE CONTINUOUS VIEW v AS SELECT count(*) FROM s WITH (sw = '1 hour')", 1),
            (
                "CREATE CONTINUOUS VIEW v WITH (sw = '1 hour', step_factor = 10) AS SELECT count(*) FROM s",
                2,
            ),
            ("CREATE CONTINUOUS VIEW v AS SELECT count(*) FROM s", 0),
        ];
        for (sql, expected) in cases {
            let node: CreateContinuousViewNode = parse_ast(sql).unwrap();
            assert_eq!(expected, node.options.len(), "{sql}");
            assert_eq!("SELECT count(*) FROM s", node.query.to_string(), "{sql}");
        }

        let res = parse_ast::<CreateContinuousViewNode>(
            "CREATE CONTINUOUS VIEW v WITH (sw = '1 hour') AS SELECT count(*) FROM s WITH (step_factor = 10)",
        );
        assert!(res.is_err());
    }

    #[test]
    fn display_leads_with_options() {
        let sql = "CREATE CONTINUOUS VIEW v WITH (step_factor = 10) AS SELECT count(*) FROM s";
        let node: CreateContinuousViewNode = parse_ast(sql).unwrap();
        assert_eq!(sql, node.to_string());
    }

    #[test]
    fn missing_continuous_is_error() {
        let res = parse_ast::<CreateContinuousViewNode>("CREATE VIEW v AS SELECT 1");
        assert!(res.is_err());
    }
}
