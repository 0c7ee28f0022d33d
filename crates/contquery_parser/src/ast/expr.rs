use std::fmt;

use contquery_error::Result;

use super::{AstParseable, Ident, TypeName, display_comma_separated};
use crate::keywords::{Keyword, RESERVED_KEYWORDS};
use crate::parser::Parser;
use crate::tokens::Token;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Literal {
    /// Unparsed number literal.
    Number(String),
    /// String literal.
    SingleQuotedString(String),
    /// Boolean literal.
    Boolean(bool),
    /// Null literal
    Null,
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::SingleQuotedString(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Self::Boolean(true) => write!(f, "TRUE"),
            Self::Boolean(false) => write!(f, "FALSE"),
            Self::Null => write!(f, "NULL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOperator {
    /// Plus, e.g. `+9`
    Plus,
    /// Minus, e.g. `-9`
    Minus,
    /// Not, e.g. `NOT(true)`
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    /// Plus, e.g. `a + b`
    Plus,
    /// Minus, e.g. `a - b`
    Minus,
    /// Multiply, e.g. `a * b`
    Multiply,
    /// Divide, e.g. `a / b`
    Divide,
    /// Modulo, e.g. `a % b`
    Modulo,
    /// String/Array Concat operator, e.g. `a || b`
    StringConcat,
    /// Greater than, e.g. `a > b`
    Gt,
    /// Less than, e.g. `a < b`
    Lt,
    /// Greater equal, e.g. `a >= b`
    GtEq,
    /// Less equal, e.g. `a <= b`
    LtEq,
    /// Equal, e.g. `a = b`
    Eq,
    /// Not equal, e.g. `a <> b`
    NotEq,
    /// And, e.g. `a AND b`
    And,
    /// Or, e.g. `a OR b`
    Or,
}

impl BinaryOperator {
    /// Binding power of the operator when parsing and deparsing.
    pub const fn precedence(&self) -> u8 {
        match self {
            Self::Or => PREC_OR,
            Self::And => PREC_AND,
            Self::Eq | Self::NotEq | Self::Lt | Self::LtEq | Self::Gt | Self::GtEq => {
                PREC_COMPARISON
            }
            Self::StringConcat => PREC_EVERYTHING_ELSE,
            Self::Plus | Self::Minus => PREC_ADD_SUB,
            Self::Multiply | Self::Divide | Self::Modulo => PREC_MUL_DIV_MOD,
        }
    }

    /// If this is a comparison operator.
    pub const fn is_comparison(&self) -> bool {
        matches!(
            self,
            Self::Eq | Self::NotEq | Self::Lt | Self::LtEq | Self::Gt | Self::GtEq
        )
    }

    /// Flip the operands of a comparison, e.g. `a < b` to `b > a`.
    pub const fn flip(&self) -> Self {
        match self {
            Self::Lt => Self::Gt,
            Self::LtEq => Self::GtEq,
            Self::Gt => Self::Lt,
            Self::GtEq => Self::LtEq,
            other => *other,
        }
    }
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::Modulo => "%",
            Self::StringConcat => "||",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::GtEq => ">=",
            Self::LtEq => "<=",
            Self::Eq => "=",
            Self::NotEq => "<>",
            Self::And => "AND",
            Self::Or => "OR",
        };
        write!(f, "{s}")
    }
}

/// An ORDER BY item, used in query modifiers and aggregate arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OrderByNode {
    pub expr: Expr,
    pub desc: bool,
    /// Explicit NULLS FIRST/LAST. Defaults to nulls last for ascending, and
    /// nulls first for descending.
    pub nulls_first: Option<bool>,
}

impl OrderByNode {
    pub fn asc(expr: Expr) -> Self {
        OrderByNode {
            expr,
            desc: false,
            nulls_first: None,
        }
    }

    pub fn nulls_first(&self) -> bool {
        self.nulls_first.unwrap_or(self.desc)
    }
}

impl AstParseable for OrderByNode {
    fn parse(parser: &mut Parser) -> Result<Self> {
        let expr = Expr::parse(parser)?;
        let desc = match parser.parse_one_of_keywords(&[Keyword::ASC, Keyword::DESC]) {
            Some(Keyword::DESC) => true,
            _ => false,
        };
        let nulls_first = if parser.parse_keyword(Keyword::NULLS) {
            match parser.parse_one_of_keywords(&[Keyword::FIRST, Keyword::LAST]) {
                Some(Keyword::FIRST) => Some(true),
                Some(_) => Some(false),
                None => return Err(parser.error("Expected FIRST or LAST after NULLS")),
            }
        } else {
            None
        };

        Ok(OrderByNode {
            expr,
            desc,
            nulls_first,
        })
    }
}

impl fmt::Display for OrderByNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expr)?;
        if self.desc {
            write!(f, " DESC")?;
        }
        match self.nulls_first {
            Some(true) => write!(f, " NULLS FIRST"),
            Some(false) => write!(f, " NULLS LAST"),
            None => Ok(()),
        }
    }
}

/// Window specification for `OVER (...)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct WindowSpec {
    pub partition_by: Vec<Expr>,
    pub order_by: Vec<OrderByNode>,
}

impl AstParseable for WindowSpec {
    fn parse(parser: &mut Parser) -> Result<Self> {
        parser.expect_token(&Token::LeftParen)?;
        let partition_by = if parser.parse_keyword_sequence(&[Keyword::PARTITION, Keyword::BY]) {
            parser.parse_comma_separated(Expr::parse)?
        } else {
            Vec::new()
        };
        let order_by = if parser.parse_keyword_sequence(&[Keyword::ORDER, Keyword::BY]) {
            parser.parse_comma_separated(OrderByNode::parse)?
        } else {
            Vec::new()
        };
        parser.expect_token(&Token::RightParen)?;

        Ok(WindowSpec {
            partition_by,
            order_by,
        })
    }
}

impl fmt::Display for WindowSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        if !self.partition_by.is_empty() {
            write!(f, "PARTITION BY ")?;
            display_comma_separated(f, &self.partition_by)?;
        }
        if !self.order_by.is_empty() {
            if !self.partition_by.is_empty() {
                write!(f, " ")?;
            }
            write!(f, "ORDER BY ")?;
            display_comma_separated(f, &self.order_by)?;
        }
        write!(f, ")")
    }
}

/// A function call, including all aggregate modifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Function {
    pub name: Ident,
    pub args: Vec<Expr>,
    /// `count(*)`
    pub star: bool,
    /// `count(DISTINCT x)`
    pub distinct: bool,
    /// `string_agg(x, ',' ORDER BY y)`
    pub order_by: Vec<OrderByNode>,
    /// `percentile_cont(0.5) WITHIN GROUP (ORDER BY x)`
    pub within_group: Vec<OrderByNode>,
    /// `count(*) FILTER (WHERE x > 1)`
    pub filter: Option<Box<Expr>>,
    /// `sum(x) OVER (...)`
    pub over: Option<WindowSpec>,
}

impl Function {
    /// Create a plain function call with no modifiers.
    pub fn new(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Function {
            name: Ident::new(name),
            args,
            star: false,
            distinct: false,
            order_by: Vec::new(),
            within_group: Vec::new(),
            filter: None,
            over: None,
        }
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    fn parse_after_name(parser: &mut Parser, name: Ident) -> Result<Self> {
        parser.expect_token(&Token::LeftParen)?;

        let mut func = Function {
            name,
            args: Vec::new(),
            star: false,
            distinct: false,
            order_by: Vec::new(),
            within_group: Vec::new(),
            filter: None,
            over: None,
        };

        if parser.consume_token(&Token::Mul) {
            func.star = true;
            parser.expect_token(&Token::RightParen)?;
        } else if !parser.consume_token(&Token::RightParen) {
            match parser.parse_one_of_keywords(&[Keyword::DISTINCT, Keyword::ALL]) {
                Some(Keyword::DISTINCT) => func.distinct = true,
                _ => (),
            }
            func.args = parser.parse_comma_separated(Expr::parse)?;
            if parser.parse_keyword_sequence(&[Keyword::ORDER, Keyword::BY]) {
                func.order_by = parser.parse_comma_separated(OrderByNode::parse)?;
            }
            parser.expect_token(&Token::RightParen)?;
        }

        if parser.parse_keyword_sequence(&[Keyword::WITHIN, Keyword::GROUP]) {
            parser.expect_token(&Token::LeftParen)?;
            parser.expect_keyword_sequence(&[Keyword::ORDER, Keyword::BY])?;
            func.within_group = parser.parse_comma_separated(OrderByNode::parse)?;
            parser.expect_token(&Token::RightParen)?;
        }

        if parser.parse_keyword(Keyword::FILTER) {
            parser.expect_token(&Token::LeftParen)?;
            parser.expect_keyword(Keyword::WHERE)?;
            func.filter = Some(Box::new(Expr::parse(parser)?));
            parser.expect_token(&Token::RightParen)?;
        }

        if parser.parse_keyword(Keyword::OVER) {
            func.over = Some(WindowSpec::parse(parser)?);
        }

        Ok(func)
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        if self.star {
            write!(f, "*")?;
        } else {
            if self.distinct {
                write!(f, "DISTINCT ")?;
            }
            display_comma_separated(f, &self.args)?;
            if !self.order_by.is_empty() {
                write!(f, " ORDER BY ")?;
                display_comma_separated(f, &self.order_by)?;
            }
        }
        write!(f, ")")?;

        if !self.within_group.is_empty() {
            write!(f, " WITHIN GROUP (ORDER BY ")?;
            display_comma_separated(f, &self.within_group)?;
            write!(f, ")")?;
        }
        if let Some(filter) = &self.filter {
            write!(f, " FILTER (WHERE {filter})")?;
        }
        if let Some(over) = &self.over {
            write!(f, " OVER {over}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expr {
    /// Column or other identifier.
    Ident(Ident),
    /// Compound identifier, e.g. `s.col`.
    CompoundIdent(Vec<Ident>),
    /// A literal value.
    Literal(Literal),
    /// A string with an explicit type, e.g. `interval '1 hour'`.
    TypedString { datatype: TypeName, value: String },
    /// Unary expression.
    UnaryExpr { op: UnaryOperator, expr: Box<Expr> },
    /// Binary expression.
    BinaryExpr {
        left: Box<Expr>,
        op: BinaryOperator,
        right: Box<Expr>,
    },
    /// A function call.
    Function(Box<Function>),
    /// Parenthesized expression.
    Nested(Box<Expr>),
    /// `CAST(expr AS type)` or `expr::type`
    Cast { datatype: TypeName, expr: Box<Expr> },
    /// `expr IS [NOT] NULL`
    IsNull { expr: Box<Expr>, negated: bool },
}

pub const PREC_OR: u8 = 10;
pub const PREC_AND: u8 = 20;
pub const PREC_NOT: u8 = 30;
pub const PREC_IS: u8 = 40;
pub const PREC_COMPARISON: u8 = 50;
pub const PREC_EVERYTHING_ELSE: u8 = 70;
pub const PREC_ADD_SUB: u8 = 80;
pub const PREC_MUL_DIV_MOD: u8 = 90;
pub const PREC_UNARY: u8 = 100;
pub const PREC_CAST: u8 = 140;

impl AstParseable for Expr {
    fn parse(parser: &mut Parser) -> Result<Self> {
        Self::parse_subexpr(parser, 0)
    }
}

impl Expr {
    /// Column reference by name.
    pub fn column(name: impl Into<String>) -> Self {
        Expr::Ident(Ident::new(name))
    }

    pub fn binary(left: Expr, op: BinaryOperator, right: Expr) -> Self {
        Expr::BinaryExpr {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    pub fn function(func: Function) -> Self {
        Expr::Function(Box::new(func))
    }

    /// Conjoin expressions with AND, returning None if empty.
    pub fn and_all(exprs: impl IntoIterator<Item = Expr>) -> Option<Expr> {
        exprs
            .into_iter()
            .reduce(|left, right| Expr::binary(left, BinaryOperator::And, right))
    }

    /// Split a predicate into its top-level AND conjuncts.
    pub fn split_conjunction(&self) -> Vec<&Expr> {
        fn inner<'a>(expr: &'a Expr, out: &mut Vec<&'a Expr>) {
            match expr {
                Expr::BinaryExpr {
                    left,
                    op: BinaryOperator::And,
                    right,
                } => {
                    inner(left, out);
                    inner(right, out);
                }
                Expr::Nested(inner_expr) => match inner_expr.as_ref() {
                    Expr::BinaryExpr {
                        op: BinaryOperator::And,
                        ..
                    } => inner(inner_expr, out),
                    _ => out.push(expr),
                },
                other => out.push(other),
            }
        }

        let mut out = Vec::new();
        inner(self, &mut out);
        out
    }

    /// Strip any number of wrapping parentheses.
    pub fn unnested(&self) -> &Expr {
        match self {
            Expr::Nested(inner) => inner.unnested(),
            other => other,
        }
    }

    /// Visit every direct child of this expression.
    pub fn for_each_child<'a>(&'a self, f: &mut impl FnMut(&'a Expr)) {
        match self {
            Expr::Ident(_) | Expr::CompoundIdent(_) | Expr::Literal(_) | Expr::TypedString { .. } => {
            }
            Expr::UnaryExpr { expr, .. } => f(expr),
            Expr::BinaryExpr { left, right, .. } => {
                f(left);
                f(right);
            }
            Expr::Function(func) => {
                func.args.iter().for_each(&mut *f);
                func.order_by.iter().for_each(|o| f(&o.expr));
                func.within_group.iter().for_each(|o| f(&o.expr));
                if let Some(filter) = &func.filter {
                    f(filter);
                }
                if let Some(over) = &func.over {
                    over.partition_by.iter().for_each(&mut *f);
                    over.order_by.iter().for_each(|o| f(&o.expr));
                }
            }
            Expr::Nested(expr) => f(expr),
            Expr::Cast { expr, .. } => f(expr),
            Expr::IsNull { expr, .. } => f(expr),
        }
    }

    /// Rebuild this expression bottom up, applying `f` to every node after its
    /// children have been rewritten.
    ///
    /// The original expression is left untouched.
    pub fn transform_up(&self, f: &mut impl FnMut(Expr) -> Expr) -> Expr {
        let rebuilt = self.map_children(&mut |child| child.transform_up(f));
        f(rebuilt)
    }

    /// Rebuild this expression top down. If `f` returns Some for a node, that
    /// replacement is used and its children are not visited.
    pub fn transform_down(&self, f: &mut impl FnMut(&Expr) -> Option<Expr>) -> Expr {
        if let Some(replacement) = f(self) {
            return replacement;
        }
        self.map_children(&mut |child| child.transform_down(f))
    }

    /// Create a copy of this node with each direct child replaced by the
    /// output of `f`.
    pub fn map_children(&self, f: &mut impl FnMut(&Expr) -> Expr) -> Expr {
        match self {
            Expr::Ident(_) | Expr::CompoundIdent(_) | Expr::Literal(_) | Expr::TypedString { .. } => {
                self.clone()
            }
            Expr::UnaryExpr { op, expr } => Expr::UnaryExpr {
                op: *op,
                expr: Box::new(f(expr)),
            },
            Expr::BinaryExpr { left, op, right } => Expr::BinaryExpr {
                left: Box::new(f(left)),
                op: *op,
                right: Box::new(f(right)),
            },
            Expr::Function(func) => {
                let args = func.args.iter().map(&mut *f).collect();
                let order_by = map_order_by(&func.order_by, f);
                let within_group = map_order_by(&func.within_group, f);
                let filter = func.filter.as_ref().map(|e| Box::new(f(e)));
                let over = func.over.as_ref().map(|w| WindowSpec {
                    partition_by: w.partition_by.iter().map(&mut *f).collect(),
                    order_by: map_order_by(&w.order_by, f),
                });
                Expr::Function(Box::new(Function {
                    name: func.name.clone(),
                    args,
                    star: func.star,
                    distinct: func.distinct,
                    order_by,
                    within_group,
                    filter,
                    over,
                }))
            }
            Expr::Nested(expr) => Expr::Nested(Box::new(f(expr))),
            Expr::Cast { datatype, expr } => Expr::Cast {
                datatype: *datatype,
                expr: Box::new(f(expr)),
            },
            Expr::IsNull { expr, negated } => Expr::IsNull {
                expr: Box::new(f(expr)),
                negated: *negated,
            },
        }
    }

    /// Check if any node in this tree satisfies the predicate.
    pub fn any(&self, pred: &mut impl FnMut(&Expr) -> bool) -> bool {
        if pred(self) {
            return true;
        }
        let mut found = false;
        self.for_each_child(&mut |child| {
            if !found && child.any(pred) {
                found = true;
            }
        });
        found
    }

    /// Replace every occurrence of `old` with `new`, returning a new tree.
    pub fn replace(&self, old: &Expr, new: &Expr) -> Expr {
        self.transform_down(&mut |e| if e == old { Some(new.clone()) } else { None })
    }

    fn parse_subexpr(parser: &mut Parser, precedence: u8) -> Result<Self> {
        let mut expr = Self::parse_prefix(parser)?;

        loop {
            let next_precedence = Self::get_infix_precedence(parser);
            if precedence >= next_precedence {
                break;
            }
            expr = Self::parse_infix(parser, expr, next_precedence)?;
        }

        Ok(expr)
    }

    fn parse_prefix(parser: &mut Parser) -> Result<Self> {
        let tok = match parser.next() {
            Some(tok) => tok.clone(),
            None => return Err(parser.error("Expected expression, found end of statement")),
        };

        let expr = match tok.token {
            Token::Word(w) => {
                let keyword = if w.quote.is_none() { w.keyword } else { None };
                match keyword {
                    Some(Keyword::TRUE) => Expr::Literal(Literal::Boolean(true)),
                    Some(Keyword::FALSE) => Expr::Literal(Literal::Boolean(false)),
                    Some(Keyword::NULL) => Expr::Literal(Literal::Null),
                    Some(Keyword::NOT) => Expr::UnaryExpr {
                        op: UnaryOperator::Not,
                        expr: Box::new(Self::parse_subexpr(parser, PREC_NOT)?),
                    },
                    Some(Keyword::CAST) => {
                        parser.expect_token(&Token::LeftParen)?;
                        let expr = Expr::parse(parser)?;
                        parser.expect_keyword(Keyword::AS)?;
                        let datatype = TypeName::parse(parser)?;
                        parser.expect_token(&Token::RightParen)?;
                        Expr::Cast {
                            datatype,
                            expr: Box::new(expr),
                        }
                    }
                    Some(kw @ (Keyword::INTERVAL | Keyword::TIMESTAMP))
                        if matches!(
                            parser.peek().map(|t| &t.token),
                            Some(Token::SingleQuotedString(_))
                        ) =>
                    {
                        let value = match parser.next().map(|t| t.token.clone()) {
                            Some(Token::SingleQuotedString(s)) => s,
                            _ => return Err(parser.error("Expected string literal")),
                        };
                        let datatype = if kw == Keyword::INTERVAL {
                            TypeName::Interval
                        } else {
                            TypeName::Timestamp
                        };
                        Expr::TypedString { datatype, value }
                    }
                    Some(kw) if RESERVED_KEYWORDS.contains(&kw) => {
                        return Err(parser.error(format!(
                            "Unexpected keyword {kw:?} when parsing expression"
                        )));
                    }
                    _ => {
                        let ident = if w.quote.is_some() {
                            Ident {
                                value: w.value,
                                quoted: true,
                            }
                        } else {
                            Ident::new(w.value.to_lowercase())
                        };
                        Self::parse_ident_expr(parser, ident)?
                    }
                }
            }
            Token::SingleQuotedString(s) => Expr::Literal(Literal::SingleQuotedString(s)),
            Token::Number(n) => Expr::Literal(Literal::Number(n)),
            Token::LeftParen => {
                let inner = Expr::parse(parser)?;
                parser.expect_token(&Token::RightParen)?;
                Expr::Nested(Box::new(inner))
            }
            Token::Minus => Expr::UnaryExpr {
                op: UnaryOperator::Minus,
                expr: Box::new(Self::parse_subexpr(parser, PREC_UNARY)?),
            },
            Token::Plus => Expr::UnaryExpr {
                op: UnaryOperator::Plus,
                expr: Box::new(Self::parse_subexpr(parser, PREC_UNARY)?),
            },
            other => {
                return Err(parser.error(format!(
                    "Unexpected token {other:?} when parsing expression"
                )));
            }
        };

        Ok(expr)
    }

    /// Parse what follows an identifier: a function call, a compound
    /// identifier, or nothing.
    fn parse_ident_expr(parser: &mut Parser, ident: Ident) -> Result<Self> {
        match parser.peek().map(|t| &t.token) {
            Some(Token::LeftParen) => Ok(Expr::Function(Box::new(Function::parse_after_name(
                parser, ident,
            )?))),
            Some(Token::Period) => {
                let mut idents = vec![ident];
                while parser.consume_token(&Token::Period) {
                    idents.push(Ident::parse(parser)?);
                }
                Ok(Expr::CompoundIdent(idents))
            }
            _ => Ok(Expr::Ident(ident)),
        }
    }

    fn get_infix_precedence(parser: &Parser) -> u8 {
        let tok = match parser.peek() {
            Some(tok) => tok,
            None => return 0,
        };

        match &tok.token {
            Token::Word(w) if w.quote.is_none() => match w.keyword {
                Some(Keyword::OR) => PREC_OR,
                Some(Keyword::AND) => PREC_AND,
                Some(Keyword::IS) => PREC_IS,
                _ => 0,
            },
            Token::Eq | Token::Neq | Token::Lt | Token::LtEq | Token::Gt | Token::GtEq => {
                PREC_COMPARISON
            }
            Token::Concat => PREC_EVERYTHING_ELSE,
            Token::Plus | Token::Minus => PREC_ADD_SUB,
            Token::Mul | Token::Div | Token::Mod => PREC_MUL_DIV_MOD,
            Token::DoubleColon => PREC_CAST,
            _ => 0,
        }
    }

    fn parse_infix(parser: &mut Parser, prefix: Expr, precedence: u8) -> Result<Self> {
        if parser.consume_token(&Token::DoubleColon) {
            let datatype = TypeName::parse(parser)?;
            return Ok(Expr::Cast {
                datatype,
                expr: Box::new(prefix),
            });
        }

        if parser.parse_keyword(Keyword::IS) {
            let negated = parser.parse_keyword(Keyword::NOT);
            parser.expect_keyword(Keyword::NULL)?;
            return Ok(Expr::IsNull {
                expr: Box::new(prefix),
                negated,
            });
        }

        let op = if parser.parse_keyword(Keyword::AND) {
            BinaryOperator::And
        } else if parser.parse_keyword(Keyword::OR) {
            BinaryOperator::Or
        } else {
            let tok = match parser.next() {
                Some(tok) => tok.token.clone(),
                None => return Err(parser.error("Expected operator, found end of statement")),
            };
            match tok {
                Token::Eq => BinaryOperator::Eq,
                Token::Neq => BinaryOperator::NotEq,
                Token::Lt => BinaryOperator::Lt,
                Token::LtEq => BinaryOperator::LtEq,
                Token::Gt => BinaryOperator::Gt,
                Token::GtEq => BinaryOperator::GtEq,
                Token::Plus => BinaryOperator::Plus,
                Token::Minus => BinaryOperator::Minus,
                Token::Mul => BinaryOperator::Multiply,
                Token::Div => BinaryOperator::Divide,
                Token::Mod => BinaryOperator::Modulo,
                Token::Concat => BinaryOperator::StringConcat,
                other => {
                    return Err(parser.error(format!("Unexpected token {other:?} for operator")));
                }
            }
        };

        let right = Self::parse_subexpr(parser, precedence)?;

        Ok(Expr::BinaryExpr {
            left: Box::new(prefix),
            op,
            right: Box::new(right),
        })
    }

    fn fmt_operand(&self, f: &mut fmt::Formatter<'_>, parent: u8, right_side: bool) -> fmt::Result {
        let needs_parens = match self {
            Expr::BinaryExpr { op, .. } => {
                let prec = op.precedence();
                prec < parent || (right_side && prec == parent)
            }
            Expr::UnaryExpr {
                op: UnaryOperator::Not,
                ..
            } => parent > PREC_NOT,
            Expr::IsNull { .. } => parent > PREC_IS,
            _ => false,
        };

        if needs_parens {
            write!(f, "({self})")
        } else {
            write!(f, "{self}")
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ident(ident) => write!(f, "{ident}"),
            Self::CompoundIdent(idents) => {
                for (idx, ident) in idents.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ".")?;
                    }
                    write!(f, "{ident}")?;
                }
                Ok(())
            }
            Self::Literal(lit) => write!(f, "{lit}"),
            Self::TypedString { datatype, value } => {
                write!(f, "{datatype} '{}'", value.replace('\'', "''"))
            }
            Self::UnaryExpr { op, expr } => {
                match op {
                    UnaryOperator::Plus => write!(f, "+")?,
                    UnaryOperator::Minus => write!(f, "-")?,
                    UnaryOperator::Not => write!(f, "NOT ")?,
                }
                let prec = match op {
                    UnaryOperator::Not => PREC_NOT,
                    _ => PREC_UNARY,
                };
                expr.fmt_operand(f, prec, true)
            }
            Self::BinaryExpr { left, op, right } => {
                let prec = op.precedence();
                left.fmt_operand(f, prec, false)?;
                write!(f, " {op} ")?;
                right.fmt_operand(f, prec, true)
            }
            Self::Function(func) => write!(f, "{func}"),
            Self::Nested(expr) => write!(f, "({expr})"),
            Self::Cast { datatype, expr } => write!(f, "CAST({expr} AS {datatype})"),
            Self::IsNull { expr, negated } => {
                expr.fmt_operand(f, PREC_IS, false)?;
                if *negated {
                    write!(f, " IS NOT NULL")
                } else {
                    write!(f, " IS NULL")
                }
            }
        }
    }
}

fn map_order_by(nodes: &[OrderByNode], f: &mut impl FnMut(&Expr) -> Expr) -> Vec<OrderByNode> {
    nodes
        .iter()
        .map(|o| OrderByNode {
            expr: f(&o.expr),
            desc: o.desc,
            nulls_first: o.nulls_first,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::testutil::parse_ast;

    fn col(name: &str) -> Box<Expr> {
        Box::new(Expr::column(name))
    }

    fn num(n: &str) -> Box<Expr> {
        Box::new(Expr::Literal(Literal::Number(n.to_string())))
    }

    #[test]
    fn parse_binary_precedence() {
        let expr: Expr = parse_ast("a + b * 2").unwrap();
        let expected = Expr::BinaryExpr {
            left: col("a"),
            op: BinaryOperator::Plus,
            right: Box::new(Expr::BinaryExpr {
                left: col("b"),
                op: BinaryOperator::Multiply,
                right: num("2"),
            }),
        };
        assert_eq!(expected, expr);
    }

    #[test]
    fn parse_left_associative() {
        let expr: Expr = parse_ast("a - b - c").unwrap();
        let expected = Expr::BinaryExpr {
            left: Box::new(Expr::BinaryExpr {
                left: col("a"),
                op: BinaryOperator::Minus,
                right: col("b"),
            }),
            op: BinaryOperator::Minus,
            right: col("c"),
        };
        assert_eq!(expected, expr);
    }

    #[test]
    fn parse_sliding_window_predicate() {
        let expr: Expr = parse_ast("arrival_timestamp > clock_timestamp() - interval '1 hour'").unwrap();
        let expected = Expr::BinaryExpr {
            left: col("arrival_timestamp"),
            op: BinaryOperator::Gt,
            right: Box::new(Expr::BinaryExpr {
                left: Box::new(Expr::function(Function::new("clock_timestamp", Vec::new()))),
                op: BinaryOperator::Minus,
                right: Box::new(Expr::TypedString {
                    datatype: TypeName::Interval,
                    value: "1 hour".to_string(),
                }),
            }),
        };
        assert_eq!(expected, expr);
    }

    #[test]
    fn parse_aggregate_modifiers() {
        let expr: Expr =
            parse_ast("string_agg(DISTINCT x, ',' ORDER BY x DESC) FILTER (WHERE y > 1)").unwrap();
        let func = match expr {
            Expr::Function(f) => f,
            other => panic!("unexpected: {other:?}"),
        };
        assert_eq!("string_agg", func.name());
        assert!(func.distinct);
        assert_eq!(2, func.args.len());
        assert_eq!(1, func.order_by.len());
        assert!(func.order_by[0].desc);
        assert!(func.filter.is_some());
    }

    #[test]
    fn parse_within_group() {
        let expr: Expr = parse_ast("percentile_cont(0.5) WITHIN GROUP (ORDER BY x)").unwrap();
        let func = match expr {
            Expr::Function(f) => f,
            other => panic!("unexpected: {other:?}"),
        };
        assert_eq!(vec![Expr::Literal(Literal::Number("0.5".to_string()))], func.args);
        assert_eq!(vec![OrderByNode::asc(Expr::column("x"))], func.within_group);
    }

    #[test]
    fn parse_count_star_and_over() {
        let expr: Expr = parse_ast("count(*) OVER (PARTITION BY k ORDER BY t)").unwrap();
        let func = match expr {
            Expr::Function(f) => f,
            other => panic!("unexpected: {other:?}"),
        };
        assert!(func.star);
        let over = func.over.unwrap();
        assert_eq!(vec![Expr::column("k")], over.partition_by);
    }

    #[test]
    fn parse_is_null_and_cast() {
        let expr: Expr = parse_ast("x::bigint IS NOT NULL").unwrap();
        let expected = Expr::IsNull {
            expr: Box::new(Expr::Cast {
                datatype: TypeName::Int64,
                expr: col("x"),
            }),
            negated: true,
        };
        assert_eq!(expected, expr);
    }

    #[test]
    fn deparse_round_trip() {
        // (input, expected display)
        let tests = [
            ("a + b * 2", "a + b * 2"),
            ("(a + b) * 2", "(a + b) * 2"),
            ("a - (b - c)", "a - (b - c)"),
            ("x > 1 AND (y < 2 OR z = 3)", "x > 1 AND (y < 2 OR z = 3)"),
            ("count(*)", "count(*)"),
            ("count(DISTINCT x)", "count(DISTINCT x)"),
            ("NOT a", "NOT a"),
            ("ts > now() - interval '1 hour'", "ts > now() - interval '1 hour'"),
            ("CAST(x AS text)", "CAST(x AS text)"),
            ("'it''s'", "'it''s'"),
            (
                "rank(3) WITHIN GROUP (ORDER BY x DESC NULLS LAST)",
                "rank(3) WITHIN GROUP (ORDER BY x DESC NULLS LAST)",
            ),
        ];

        for (input, expected) in tests {
            let expr: Expr = parse_ast(input).unwrap();
            assert_eq!(expected, expr.to_string(), "input: {input}");
        }
    }

    #[test]
    fn split_conjunction_flattens_ands() {
        let expr: Expr = parse_ast("a = 1 AND (b = 2 AND c = 3) AND (d = 4 OR e = 5)").unwrap();
        let conjuncts = expr.split_conjunction();
        assert_eq!(4, conjuncts.len());
        assert_eq!("d = 4 OR e = 5", conjuncts[3].unnested().to_string());
    }

    #[test]
    fn replace_returns_new_tree() {
        let expr: Expr = parse_ast("sum(x) + x").unwrap();
        let replaced = expr.replace(&Expr::column("x"), &Expr::column("_0"));
        assert_eq!("sum(_0) + _0", replaced.to_string());
        assert_eq!("sum(x) + x", expr.to_string());
    }

    #[test]
    fn reserved_keyword_is_not_an_expression() {
        assert!(parse_ast::<Expr>("from").is_err());
    }
}
