pub mod expr;
pub use expr::*;
pub mod select;
pub use select::*;
pub mod create_view;
pub use create_view::*;

use std::fmt;
use std::hash::{Hash, Hasher};

use contquery_error::Result;

use crate::keywords::{Keyword, keyword_from_str};
use crate::parser::Parser;
use crate::tokens::Token;

pub trait AstParseable: Sized {
    /// Parse an instance of Self from the provided parser.
    ///
    /// It's assumed that the parser is in the correct state for parsing Self,
    /// and if it isn't, an error should be returned.
    fn parse(parser: &mut Parser) -> Result<Self>;
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;

    /// Parse an AST node directly from a string.
    pub(crate) fn parse_ast<A: AstParseable>(s: &str) -> Result<A> {
        let mut parser = Parser::with_sql_string(s)?;
        A::parse(&mut parser)
    }
}

/// An identifier.
///
/// Unquoted identifiers are folded to lower case when parsed. Equality and
/// hashing only consider the folded value.
#[derive(Debug, Clone, Eq)]
pub struct Ident {
    pub value: String,
    pub quoted: bool,
}

impl Ident {
    /// Create an identifier from an already normalized string.
    pub fn new(s: impl Into<String>) -> Self {
        Ident {
            value: s.into(),
            quoted: false,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// If the identifier needs quoting to round trip through the parser.
    fn needs_quotes(&self) -> bool {
        let mut chars = self.value.chars();
        let starts_ok = match chars.next() {
            Some(c) => c.is_ascii_lowercase() || c == '_',
            None => return true,
        };
        if !starts_ok {
            return true;
        }
        if !chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_') {
            return true;
        }
        keyword_from_str(&self.value).is_some()
    }
}

impl PartialEq for Ident {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Hash for Ident {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state)
    }
}

impl AstParseable for Ident {
    fn parse(parser: &mut Parser) -> Result<Self> {
        let tok = match parser.next() {
            Some(tok) => tok.clone(),
            None => return Err(parser.error("Expected identifier, found end of statement")),
        };

        match tok.token {
            Token::Word(w) => {
                if w.quote.is_some() {
                    Ok(Ident {
                        value: w.value,
                        quoted: true,
                    })
                } else {
                    Ok(Ident {
                        value: w.value.to_lowercase(),
                        quoted: false,
                    })
                }
            }
            other => Err(parser.error(format!("Expected identifier, got {other:?}"))),
        }
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.quoted || self.needs_quotes() {
            write!(f, "\"{}\"", self.value.replace('"', "\"\""))
        } else {
            write!(f, "{}", self.value)
        }
    }
}

/// Data types that can appear in casts and typed string literals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeName {
    Boolean,
    Int64,
    Float64,
    Text,
    Bytea,
    Timestamp,
    Interval,
}

impl TypeName {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name.to_lowercase().as_str() {
            "bool" | "boolean" => TypeName::Boolean,
            "int" | "int4" | "int8" | "integer" | "bigint" | "smallint" => TypeName::Int64,
            "float" | "float4" | "float8" | "real" | "double" | "numeric" | "decimal" => {
                TypeName::Float64
            }
            "text" | "varchar" | "string" => TypeName::Text,
            "bytea" | "blob" => TypeName::Bytea,
            "timestamp" | "timestamptz" => TypeName::Timestamp,
            "interval" => TypeName::Interval,
            _ => return None,
        })
    }
}

impl AstParseable for TypeName {
    fn parse(parser: &mut Parser) -> Result<Self> {
        let tok = match parser.next() {
            Some(tok) => tok.clone(),
            None => return Err(parser.error("Expected data type, found end of statement")),
        };

        let name = match &tok.token {
            Token::Word(w) => w.value.clone(),
            other => return Err(parser.error(format!("Expected data type, got {other:?}"))),
        };

        // DOUBLE PRECISION
        if name.eq_ignore_ascii_case("double") {
            if let Some(Token::Word(w)) = parser.peek().map(|t| &t.token) {
                if w.value.eq_ignore_ascii_case("precision") {
                    parser.next();
                }
            }
        }

        match TypeName::from_name(&name) {
            Some(t) => Ok(t),
            None => Err(parser.error(format!("Unknown data type: {name}"))),
        }
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Boolean => "boolean",
            Self::Int64 => "bigint",
            Self::Float64 => "double precision",
            Self::Text => "text",
            Self::Bytea => "bytea",
            Self::Timestamp => "timestamp",
            Self::Interval => "interval",
        };
        write!(f, "{s}")
    }
}

/// Write a comma separated list of displayable items.
pub(crate) fn display_comma_separated<T: fmt::Display>(
    f: &mut fmt::Formatter<'_>,
    items: &[T],
) -> fmt::Result {
    for (idx, item) in items.iter().enumerate() {
        if idx > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

/// Check if the next token is a word for the given keyword, used for
/// lookahead decisions without consuming.
pub(crate) fn peek_is_keyword(parser: &Parser, keyword: Keyword) -> bool {
    parser.peek().map(|t| t.is_keyword(keyword)).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::testutil::parse_ast;
    use super::*;

    #[test]
    fn ident_folds_case() {
        let ident: Ident = parse_ast("MyCol").unwrap();
        assert_eq!("mycol", ident.value);
        assert!(!ident.quoted);

        let ident: Ident = parse_ast("\"MyCol\"").unwrap();
        assert_eq!("MyCol", ident.value);
        assert_eq!("\"MyCol\"", ident.to_string());
    }

    #[test]
    fn ident_display_quotes_keywords() {
        assert_eq!("\"select\"", Ident::new("select").to_string());
        assert_eq!("_0", Ident::new("_0").to_string());
        assert_eq!("arrival_timestamp", Ident::new("arrival_timestamp").to_string());
    }

    #[test]
    fn parse_type_names() {
        // (input, expected)
        let tests = [
            ("bigint", TypeName::Int64),
            ("DOUBLE PRECISION", TypeName::Float64),
            ("text", TypeName::Text),
            ("timestamp", TypeName::Timestamp),
            ("interval", TypeName::Interval),
        ];

        for (input, expected) in tests {
            let got: TypeName = parse_ast(input).unwrap();
            assert_eq!(expected, got, "input: {input}");
        }
    }
}
