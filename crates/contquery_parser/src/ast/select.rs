use std::fmt;

use contquery_error::Result;

use super::{AstParseable, Expr, Ident, OrderByNode, display_comma_separated, peek_is_keyword};
use crate::keywords::{Keyword, RESERVED_FOR_COLUMN_ALIAS, RESERVED_FOR_TABLE_ALIAS};
use crate::parser::Parser;
use crate::tokens::Token;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DistinctModifier {
    /// `SELECT DISTINCT ON (a, b) ...`
    On(Vec<Expr>),
    /// `SELECT DISTINCT ...`
    Distinct,
    /// `SELECT ALL ...`
    All,
}

impl AstParseable for DistinctModifier {
    fn parse(parser: &mut Parser) -> Result<Self> {
        match parser.parse_one_of_keywords(&[Keyword::DISTINCT, Keyword::ALL]) {
            Some(Keyword::DISTINCT) => {
                if parser.parse_keyword(Keyword::ON) {
                    let exprs = parser.parse_parenthesized_comma_separated(Expr::parse)?;
                    Ok(DistinctModifier::On(exprs))
                } else {
                    Ok(DistinctModifier::Distinct)
                }
            }
            Some(Keyword::ALL) => Ok(DistinctModifier::All),
            _ => Err(parser.error("Expected DISTINCT or ALL")),
        }
    }
}

impl fmt::Display for DistinctModifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::On(exprs) => {
                write!(f, "DISTINCT ON (")?;
                display_comma_separated(f, exprs)?;
                write!(f, ")")
            }
            Self::Distinct => write!(f, "DISTINCT"),
            Self::All => write!(f, "ALL"),
        }
    }
}

/// A single item in the select list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SelectExpr {
    /// An unaliased expression.
    Expr(Expr),
    /// An aliased expression, e.g. `count(*) AS total`.
    AliasedExpr(Expr, Ident),
    /// `*`
    Wildcard,
}

impl SelectExpr {
    pub fn expr(&self) -> Option<&Expr> {
        match self {
            Self::Expr(expr) | Self::AliasedExpr(expr, _) => Some(expr),
            Self::Wildcard => None,
        }
    }

    pub fn alias(&self) -> Option<&Ident> {
        match self {
            Self::AliasedExpr(_, alias) => Some(alias),
            _ => None,
        }
    }
}

impl AstParseable for SelectExpr {
    fn parse(parser: &mut Parser) -> Result<Self> {
        if parser.consume_token(&Token::Mul) {
            return Ok(SelectExpr::Wildcard);
        }

        let expr = Expr::parse(parser)?;
        match parser.parse_alias(RESERVED_FOR_COLUMN_ALIAS)? {
            Some(alias) => Ok(SelectExpr::AliasedExpr(expr, alias)),
            None => Ok(SelectExpr::Expr(expr)),
        }
    }
}

impl fmt::Display for SelectExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expr(expr) => write!(f, "{expr}"),
            Self::AliasedExpr(expr, alias) => write!(f, "{expr} AS {alias}"),
            Self::Wildcard => write!(f, "*"),
        }
    }
}

/// The single relation a continuous query reads from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FromNode {
    pub table: Ident,
    pub alias: Option<Ident>,
}

impl AstParseable for FromNode {
    fn parse(parser: &mut Parser) -> Result<Self> {
        let table = Ident::parse(parser)?;
        let alias = parser.parse_alias(RESERVED_FOR_TABLE_ALIAS)?;
        Ok(FromNode { table, alias })
    }
}

impl fmt::Display for FromNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.table)?;
        if let Some(alias) = &self.alias {
            write!(f, " AS {alias}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GroupByExpr {
    /// Plain grouping expression.
    Expr(Expr),
    /// `ROLLUP (a, b)`
    Rollup(Vec<Expr>),
    /// `CUBE (a, b)`
    Cube(Vec<Expr>),
    /// `GROUPING SETS ((a), (a, b), ())`
    GroupingSets(Vec<Vec<Expr>>),
}

impl GroupByExpr {
    /// Every distinct expression referenced by this grouping element, in
    /// order of first appearance.
    pub fn flattened_exprs(&self) -> Vec<&Expr> {
        let mut out: Vec<&Expr> = Vec::new();
        match self {
            Self::Expr(expr) => out.push(expr),
            Self::Rollup(exprs) | Self::Cube(exprs) => {
                for expr in exprs {
                    if !out.contains(&expr) {
                        out.push(expr);
                    }
                }
            }
            Self::GroupingSets(sets) => {
                for expr in sets.iter().flatten() {
                    if !out.contains(&expr) {
                        out.push(expr);
                    }
                }
            }
        }
        out
    }
}

impl AstParseable for GroupByExpr {
    fn parse(parser: &mut Parser) -> Result<Self> {
        if parser.parse_keyword(Keyword::ROLLUP) {
            let exprs = parser.parse_parenthesized_comma_separated(Expr::parse)?;
            return Ok(GroupByExpr::Rollup(exprs));
        }
        if parser.parse_keyword(Keyword::CUBE) {
            let exprs = parser.parse_parenthesized_comma_separated(Expr::parse)?;
            return Ok(GroupByExpr::Cube(exprs));
        }
        if parser.parse_keyword_sequence(&[Keyword::GROUPING, Keyword::SETS]) {
            let sets = parser.parse_parenthesized_comma_separated(|parser| {
                // Sets may be a single unparenthesized expression.
                if matches!(parser.peek().map(|t| &t.token), Some(Token::LeftParen)) {
                    parser.parse_parenthesized_comma_separated(Expr::parse)
                } else {
                    Ok(vec![Expr::parse(parser)?])
                }
            })?;
            return Ok(GroupByExpr::GroupingSets(sets));
        }

        Ok(GroupByExpr::Expr(Expr::parse(parser)?))
    }
}

impl fmt::Display for GroupByExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expr(expr) => write!(f, "{expr}"),
            Self::Rollup(exprs) => {
                write!(f, "ROLLUP (")?;
                display_comma_separated(f, exprs)?;
                write!(f, ")")
            }
            Self::Cube(exprs) => {
                write!(f, "CUBE (")?;
                display_comma_separated(f, exprs)?;
                write!(f, ")")
            }
            Self::GroupingSets(sets) => {
                write!(f, "GROUPING SETS (")?;
                for (idx, set) in sets.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "(")?;
                    display_comma_separated(f, set)?;
                    write!(f, ")")?;
                }
                write!(f, ")")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct LimitModifier {
    pub limit: Option<Expr>,
    pub offset: Option<Expr>,
}

impl LimitModifier {
    pub fn is_empty(&self) -> bool {
        self.limit.is_none() && self.offset.is_none()
    }
}

impl AstParseable for LimitModifier {
    fn parse(parser: &mut Parser) -> Result<Self> {
        let mut modifier = LimitModifier::default();
        loop {
            if modifier.limit.is_none() && parser.parse_keyword(Keyword::LIMIT) {
                modifier.limit = Some(Expr::parse(parser)?);
                continue;
            }
            if modifier.offset.is_none() && parser.parse_keyword(Keyword::OFFSET) {
                modifier.offset = Some(Expr::parse(parser)?);
                continue;
            }
            break;
        }
        Ok(modifier)
    }
}

impl fmt::Display for LimitModifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut wrote = false;
        if let Some(limit) = &self.limit {
            write!(f, "LIMIT {limit}")?;
            wrote = true;
        }
        if let Some(offset) = &self.offset {
            if wrote {
                write!(f, " ")?;
            }
            write!(f, "OFFSET {offset}")?;
        }
        Ok(())
    }
}

/// A SELECT query with its modifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SelectNode {
    pub distinct: Option<DistinctModifier>,
    pub projections: Vec<SelectExpr>,
    pub from: Option<FromNode>,
    pub where_expr: Option<Expr>,
    pub group_by: Vec<GroupByExpr>,
    pub having: Option<Expr>,
    pub order_by: Vec<OrderByNode>,
    pub limit: LimitModifier,
}

impl SelectNode {
    /// Flattened list of every grouping expression, without duplicates.
    pub fn flattened_group_exprs(&self) -> Vec<&Expr> {
        let mut out: Vec<&Expr> = Vec::new();
        for group in &self.group_by {
            for expr in group.flattened_exprs() {
                if !out.contains(&expr) {
                    out.push(expr);
                }
            }
        }
        out
    }
}

impl AstParseable for SelectNode {
    fn parse(parser: &mut Parser) -> Result<Self> {
        parser.expect_keyword(Keyword::SELECT)?;

        let distinct = if peek_is_keyword(parser, Keyword::DISTINCT)
            || peek_is_keyword(parser, Keyword::ALL)
        {
            Some(DistinctModifier::parse(parser)?)
        } else {
            None
        };

        let projections = parser.parse_comma_separated(SelectExpr::parse)?;

        let from = if parser.parse_keyword(Keyword::FROM) {
            Some(FromNode::parse(parser)?)
        } else {
            None
        };

        let where_expr = if parser.parse_keyword(Keyword::WHERE) {
            Some(Expr::parse(parser)?)
        } else {
            None
        };

        let group_by = if parser.parse_keyword_sequence(&[Keyword::GROUP, Keyword::BY]) {
            parser.parse_comma_separated(GroupByExpr::parse)?
        } else {
            Vec::new()
        };

        let having = if parser.parse_keyword(Keyword::HAVING) {
            Some(Expr::parse(parser)?)
        } else {
            None
        };

        let order_by = if parser.parse_keyword_sequence(&[Keyword::ORDER, Keyword::BY]) {
            parser.parse_comma_separated(OrderByNode::parse)?
        } else {
            Vec::new()
        };

        let limit = LimitModifier::parse(parser)?;

        Ok(SelectNode {
            distinct,
            projections,
            from,
            where_expr,
            group_by,
            having,
            order_by,
            limit,
        })
    }
}

impl fmt::Display for SelectNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SELECT ")?;
        if let Some(distinct) = &self.distinct {
            write!(f, "{distinct} ")?;
        }
        display_comma_separated(f, &self.projections)?;
        if let Some(from) = &self.from {
            write!(f, " FROM {from}")?;
        }
        if let Some(where_expr) = &self.where_expr {
            write!(f, " WHERE {where_expr}")?;
        }
        if !self.group_by.is_empty() {
            write!(f, " GROUP BY ")?;
            display_comma_separated(f, &self.group_by)?;
        }
        if let Some(having) = &self.having {
            write!(f, " HAVING {having}")?;
        }
        if !self.order_by.is_empty() {
            write!(f, " ORDER BY ")?;
            display_comma_separated(f, &self.order_by)?;
        }
        if !self.limit.is_empty() {
            write!(f, " {}", self.limit)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::testutil::parse_ast;

    #[test]
    fn parse_simple_select() {
        let node: SelectNode = parse_ast("SELECT a, count(*) AS c FROM s GROUP BY a").unwrap();
        assert_eq!(2, node.projections.len());
        assert_eq!(Some(&Ident::new("c")), node.projections[1].alias());
        assert_eq!(Ident::new("s"), node.from.as_ref().unwrap().table);
        assert_eq!(vec![GroupByExpr::Expr(Expr::column("a"))], node.group_by);
    }

    #[test]
    fn parse_implicit_alias() {
        let node: SelectNode = parse_ast("SELECT sum(x) total FROM s").unwrap();
        assert_eq!(Some(&Ident::new("total")), node.projections[0].alias());
    }

    #[test]
    fn parse_distinct_on() {
        let node: SelectNode = parse_ast("SELECT DISTINCT ON (a) a, b FROM s").unwrap();
        assert_eq!(
            Some(DistinctModifier::On(vec![Expr::column("a")])),
            node.distinct
        );
    }

    #[test]
    fn parse_grouping_sets() {
        let node: SelectNode =
            parse_ast("SELECT a FROM s GROUP BY GROUPING SETS ((a, b), a, ())").unwrap();
        let expected = GroupByExpr::GroupingSets(vec![
            vec![Expr::column("a"), Expr::column("b")],
            vec![Expr::column("a")],
            vec![],
        ]);
        assert_eq!(vec![expected], node.group_by);
        assert_eq!(2, node.flattened_group_exprs().len());
    }

    #[test]
    fn parse_limit_offset_any_order() {
        let node: SelectNode = parse_ast("SELECT a FROM s OFFSET 2 LIMIT 5").unwrap();
        assert!(node.limit.limit.is_some());
        assert!(node.limit.offset.is_some());
    }

    #[test]
    fn display_select() {
        // (input, expected)
        let tests = [
            (
                "select a, count(*) from s where x > 1 group by a",
                "SELECT a, count(*) FROM s WHERE x > 1 GROUP BY a",
            ),
            (
                "select distinct a from s order by a desc limit 10",
                "SELECT DISTINCT a FROM s ORDER BY a DESC LIMIT 10",
            ),
            (
                "select a, b, sum(c) from s group by rollup (a, b)",
                "SELECT a, b, sum(c) FROM s GROUP BY ROLLUP (a, b)",
            ),
            ("select *, 1 as one from s", "SELECT *, 1 AS one FROM s"),
        ];

        for (input, expected) in tests {
            let node: SelectNode = parse_ast(input).unwrap();
            assert_eq!(expected, node.to_string(), "input: {input}");
        }
    }
}
