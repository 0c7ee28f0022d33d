use std::fmt;

use contquery_error::{DbError, ErrorKind, Result};

use crate::ast::{AstParseable, CreateContinuousViewNode, Ident, SelectNode};
use crate::keywords::Keyword;
use crate::statement::Statement;
use crate::tokens::{Token, TokenWithLocation, Tokenizer};

#[derive(Debug)]
pub struct Parser {
    toks: Vec<TokenWithLocation>,
    /// Index of token we should process next.
    idx: usize,
}

impl Parser {
    pub fn with_tokens(toks: Vec<TokenWithLocation>) -> Self {
        Parser { toks, idx: 0 }
    }

    pub fn with_sql_string(sql: &str) -> Result<Self> {
        let toks = Tokenizer::new(sql).tokenize()?;
        Ok(Self::with_tokens(toks))
    }

    /// Parse any number of semicolon separated statements.
    pub fn parse_statements(&mut self) -> Result<Vec<Statement>> {
        let mut stmts = Vec::new();

        loop {
            while self.consume_token(&Token::SemiColon) {}
            if self.peek().is_none() {
                break;
            }

            stmts.push(self.parse_statement()?);

            if self.peek().is_some() && !self.consume_token(&Token::SemiColon) {
                return Err(self.error(format!(
                    "Expected end of statement, found {}",
                    self.describe_next()
                )));
            }
        }

        Ok(stmts)
    }

    pub fn parse_statement(&mut self) -> Result<Statement> {
        let keyword = match self.peek() {
            Some(tok) => match tok.keyword() {
                Some(k) => k,
                None => {
                    return Err(self.error(format!(
                        "Expected a SQL statement, got {}",
                        self.describe_next()
                    )));
                }
            },
            None => return Err(self.error("Empty SQL statement")),
        };

        match keyword {
            Keyword::SELECT => Ok(Statement::Query(SelectNode::parse(self)?)),
            Keyword::CREATE => Ok(Statement::CreateContinuousView(
                CreateContinuousViewNode::parse(self)?,
            )),
            other => Err(self.error(format!("Unexpected keyword: {other:?}"))),
        }
    }

    /// Parse a single keyword.
    pub fn parse_keyword(&mut self, keyword: Keyword) -> bool {
        let idx = self.idx;
        if let Some(tok) = self.next() {
            if tok.is_keyword(keyword) {
                return true;
            }
        }

        // Keyword doesn't match. Reset index and return.
        self.idx = idx;
        false
    }

    /// Parse an exact sequence of keywords.
    ///
    /// If the sequence doesn't match, idx is not changed, and false is
    /// returned.
    pub fn parse_keyword_sequence(&mut self, keywords: &[Keyword]) -> bool {
        let idx = self.idx;
        for keyword in keywords {
            if let Some(tok) = self.next() {
                if tok.is_keyword(*keyword) {
                    continue;
                }
            }

            // Keyword doesn't match. Reset index and return.
            self.idx = idx;
            return false;
        }
        true
    }

    /// Parse any of the provided keywords, returning which one was parsed.
    pub fn parse_one_of_keywords(&mut self, keywords: &[Keyword]) -> Option<Keyword> {
        let idx = self.idx;
        let tok = self.next()?;

        if let Some(k) = keywords.iter().find(|k| tok.is_keyword(**k)) {
            return Some(*k);
        }

        // No matches, reset index.
        self.idx = idx;
        None
    }

    pub fn expect_keyword(&mut self, keyword: Keyword) -> Result<()> {
        if self.parse_keyword(keyword) {
            return Ok(());
        }
        Err(self.error(format!(
            "Expected {keyword:?}, got {}",
            self.describe_next()
        )))
    }

    pub fn expect_keyword_sequence(&mut self, keywords: &[Keyword]) -> Result<()> {
        if self.parse_keyword_sequence(keywords) {
            return Ok(());
        }
        Err(self.error(format!(
            "Expected {keywords:?}, got {}",
            self.describe_next()
        )))
    }

    /// Consume the next token if it matches the expected token.
    pub fn consume_token(&mut self, expected: &Token) -> bool {
        let idx = self.idx;
        if let Some(tok) = self.next() {
            if &tok.token == expected {
                return true;
            }
        }
        self.idx = idx;
        false
    }

    pub fn expect_token(&mut self, expected: &Token) -> Result<()> {
        if self.consume_token(expected) {
            return Ok(());
        }
        Err(self.error(format!(
            "Expected {expected:?}, got {}",
            self.describe_next()
        )))
    }

    /// Parse a comma separated list of items.
    pub fn parse_comma_separated<T>(
        &mut self,
        mut f: impl FnMut(&mut Parser) -> Result<T>,
    ) -> Result<Vec<T>> {
        let mut values = Vec::new();
        loop {
            values.push(f(self)?);
            if !self.consume_token(&Token::Comma) {
                break;
            }
        }
        Ok(values)
    }

    /// Parse a parenthesized comma separated list, allowing an empty list.
    pub fn parse_parenthesized_comma_separated<T>(
        &mut self,
        f: impl FnMut(&mut Parser) -> Result<T>,
    ) -> Result<Vec<T>> {
        self.expect_token(&Token::LeftParen)?;
        if self.consume_token(&Token::RightParen) {
            return Ok(Vec::new());
        }
        let values = self.parse_comma_separated(f)?;
        self.expect_token(&Token::RightParen)?;
        Ok(values)
    }

    /// Parse an optional alias, with or without the AS keyword.
    ///
    /// Without AS, the alias cannot be one of the reserved keywords.
    pub fn parse_alias(&mut self, reserved: &[Keyword]) -> Result<Option<Ident>> {
        if self.parse_keyword(Keyword::AS) {
            return Ok(Some(Ident::parse(self)?));
        }

        let tok = match self.peek() {
            Some(tok) => tok,
            None => return Ok(None),
        };

        match &tok.token {
            Token::Word(w) => {
                if w.quote.is_none() {
                    if let Some(k) = w.keyword {
                        if reserved.contains(&k) {
                            return Ok(None);
                        }
                    }
                }
                Ok(Some(Ident::parse(self)?))
            }
            _ => Ok(None),
        }
    }

    /// Get the next non-whitespace token without advancing.
    pub fn peek(&self) -> Option<&TokenWithLocation> {
        self.peek_nth(0)
    }

    /// Get the nth next non-whitespace token without advancing.
    pub fn peek_nth(&self, n: usize) -> Option<&TokenWithLocation> {
        let mut count = 0;
        let mut idx = self.idx;
        while idx < self.toks.len() {
            if !matches!(self.toks[idx].token, Token::Whitespace) {
                if count == n {
                    return Some(&self.toks[idx]);
                }
                count += 1;
            }
            idx += 1;
        }
        None
    }

    /// Get the next non-whitespace token.
    pub fn next(&mut self) -> Option<&TokenWithLocation> {
        loop {
            if self.idx >= self.toks.len() {
                return None;
            }

            let tok = &self.toks[self.idx];
            self.idx += 1;

            if matches!(&tok.token, Token::Whitespace) {
                continue;
            }

            return Some(tok);
        }
    }

    /// Describe the next token for error messages.
    pub fn describe_next(&self) -> String {
        match self.peek() {
            Some(tok) => TokenDisplay(&tok.token).to_string(),
            None => "end of statement".to_string(),
        }
    }

    /// Create a syntax error, noting the current location.
    pub fn error(&self, msg: impl Into<String>) -> DbError {
        let (line, col) = match self.peek() {
            Some(tok) => (tok.line, tok.col),
            None => (0, 0),
        };
        DbError::new(msg)
            .with_kind(ErrorKind::Syntax)
            .with_field("line", line)
            .with_field("col", col)
    }
}

struct TokenDisplay<'a>(&'a Token);

impl fmt::Display for TokenDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Token::Word(w) => write!(f, "'{}'", w.value),
            Token::SingleQuotedString(s) => write!(f, "string '{s}'"),
            Token::Number(n) => write!(f, "number {n}"),
            other => write!(f, "{other:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peek_skips_whitespace() {
        let mut parser = Parser::with_sql_string("  select   a").unwrap();
        assert!(parser.peek().unwrap().is_keyword(Keyword::SELECT));
        assert!(matches!(
            &parser.peek_nth(1).unwrap().token,
            Token::Word(w) if w.value == "a"
        ));
    }

    #[test]
    fn keyword_sequence_resets_on_mismatch() {
        let mut parser = Parser::with_sql_string("group sets").unwrap();
        assert!(!parser.parse_keyword_sequence(&[Keyword::GROUP, Keyword::BY]));
        assert!(parser.parse_keyword(Keyword::GROUP));
        assert!(parser.parse_keyword(Keyword::SETS));
    }

    #[test]
    fn multiple_statements() {
        let mut parser = Parser::with_sql_string("select 1; select 2;;").unwrap();
        let stmts = parser.parse_statements().unwrap();
        assert_eq!(2, stmts.len());
    }

    #[test]
    fn trailing_garbage_is_error() {
        let mut parser = Parser::with_sql_string("select 1 2").unwrap();
        let err = parser.parse_statements().unwrap_err();
        assert_eq!(ErrorKind::Syntax, err.kind());
    }
}
