use std::iter::Peekable;
use std::str::Chars;

use contquery_error::{DbError, ErrorKind, Result};

use crate::keywords::{Keyword, keyword_from_str};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Word(Word),
    SingleQuotedString(String),
    Number(String),
    Whitespace,
    /// `(`
    LeftParen,
    /// `)`
    RightParen,
    /// `,`
    Comma,
    /// `.`
    Period,
    /// `;`
    SemiColon,
    /// `=`
    Eq,
    /// `!=` or `<>`
    Neq,
    /// `<`
    Lt,
    /// `<=`
    LtEq,
    /// `>`
    Gt,
    /// `>=`
    GtEq,
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Mod,
    /// `||`
    Concat,
    /// `::`
    DoubleColon,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Word {
    pub value: String,
    pub quote: Option<char>,
    pub keyword: Option<Keyword>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TokenWithLocation {
    pub token: Token,
    /// Line number (0-based) the token starts on.
    pub line: usize,
    /// Column (0-based) the token starts at.
    pub col: usize,
}

impl TokenWithLocation {
    pub fn is_keyword(&self, other: Keyword) -> bool {
        match &self.token {
            Token::Word(w) => w.quote.is_none() && w.keyword == Some(other),
            _ => false,
        }
    }

    pub fn keyword(&self) -> Option<Keyword> {
        match &self.token {
            Token::Word(w) if w.quote.is_none() => w.keyword,
            _ => None,
        }
    }
}

#[derive(Debug)]
struct State<'a> {
    chars: Peekable<Chars<'a>>,
    line: usize,
    col: usize,
}

impl State<'_> {
    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn next(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.col = 0;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    /// Consume characters while the predicate holds, returning them.
    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let mut s = String::new();
        while let Some(c) = self.peek() {
            if !pred(c) {
                break;
            }
            s.push(c);
            self.next();
        }
        s
    }
}

#[derive(Debug)]
pub struct Tokenizer<'a> {
    query: &'a str,
}

impl<'a> Tokenizer<'a> {
    pub fn new(query: &'a str) -> Self {
        Tokenizer { query }
    }

    pub fn tokenize(&mut self) -> Result<Vec<TokenWithLocation>> {
        let mut state = State {
            chars: self.query.chars().peekable(),
            line: 0,
            col: 0,
        };

        let mut toks = Vec::new();
        loop {
            let (line, col) = (state.line, state.col);
            let token = match Self::next_token(&mut state)? {
                Some(tok) => tok,
                None => break,
            };
            toks.push(TokenWithLocation { token, line, col });
        }

        Ok(toks)
    }

    fn next_token(state: &mut State) -> Result<Option<Token>> {
        let c = match state.peek() {
            Some(c) => c,
            None => return Ok(None),
        };

        let tok = match c {
            c if c.is_whitespace() => {
                state.take_while(|c| c.is_whitespace());
                Token::Whitespace
            }
            '\'' => {
                state.next();
                Token::SingleQuotedString(Self::quoted_string(state, '\'')?)
            }
            '"' => {
                state.next();
                let value = Self::quoted_string(state, '"')?;
                Token::Word(Word {
                    value,
                    quote: Some('"'),
                    keyword: None,
                })
            }
            c if c.is_ascii_digit() => {
                let mut num = state.take_while(|c| c.is_ascii_digit());
                if state.peek() == Some('.') {
                    state.next();
                    num.push('.');
                    num.push_str(&state.take_while(|c| c.is_ascii_digit()));
                }
                if matches!(state.peek(), Some('e') | Some('E')) {
                    state.next();
                    num.push('e');
                    if let Some(sign @ ('+' | '-')) = state.peek() {
                        state.next();
                        num.push(sign);
                    }
                    num.push_str(&state.take_while(|c| c.is_ascii_digit()));
                }
                Token::Number(num)
            }
            c if c.is_alphabetic() || c == '_' => {
                let value = state.take_while(|c| c.is_alphanumeric() || c == '_' || c == '$');
                let keyword = keyword_from_str(&value);
                Token::Word(Word {
                    value,
                    quote: None,
                    keyword,
                })
            }
            '(' => Self::single(state, Token::LeftParen),
            ')' => Self::single(state, Token::RightParen),
            ',' => Self::single(state, Token::Comma),
            '.' => {
                state.next();
                match state.peek() {
                    Some(c) if c.is_ascii_digit() => {
                        let digits = state.take_while(|c| c.is_ascii_digit());
                        Token::Number(format!("0.{digits}"))
                    }
                    _ => Token::Period,
                }
            }
            ';' => Self::single(state, Token::SemiColon),
            '=' => Self::single(state, Token::Eq),
            '+' => Self::single(state, Token::Plus),
            '*' => Self::single(state, Token::Mul),
            '/' => Self::single(state, Token::Div),
            '%' => Self::single(state, Token::Mod),
            '-' => {
                state.next();
                if state.peek() == Some('-') {
                    // Line comment.
                    state.take_while(|c| c != '\n');
                    Token::Whitespace
                } else {
                    Token::Minus
                }
            }
            '<' => {
                state.next();
                match state.peek() {
                    Some('=') => Self::single(state, Token::LtEq),
                    Some('>') => Self::single(state, Token::Neq),
                    _ => Token::Lt,
                }
            }
            '>' => {
                state.next();
                match state.peek() {
                    Some('=') => Self::single(state, Token::GtEq),
                    _ => Token::Gt,
                }
            }
            '!' => {
                state.next();
                match state.peek() {
                    Some('=') => Self::single(state, Token::Neq),
                    _ => return Err(Self::error(state, "Expected '=' after '!'")),
                }
            }
            '|' => {
                state.next();
                match state.peek() {
                    Some('|') => Self::single(state, Token::Concat),
                    _ => return Err(Self::error(state, "Expected '|' after '|'")),
                }
            }
            ':' => {
                state.next();
                match state.peek() {
                    Some(':') => Self::single(state, Token::DoubleColon),
                    _ => return Err(Self::error(state, "Expected ':' after ':'")),
                }
            }
            other => {
                return Err(Self::error(
                    state,
                    format!("Unexpected character in query: '{other}'"),
                ));
            }
        };

        Ok(Some(tok))
    }

    /// Consume one character and return the token.
    fn single(state: &mut State, tok: Token) -> Token {
        state.next();
        tok
    }

    /// Read a string terminated by `quote`. A doubled quote escapes itself.
    fn quoted_string(state: &mut State, quote: char) -> Result<String> {
        let mut s = String::new();
        loop {
            match state.next() {
                Some(c) if c == quote => {
                    if state.peek() == Some(quote) {
                        state.next();
                        s.push(quote);
                        continue;
                    }
                    return Ok(s);
                }
                Some(c) => s.push(c),
                None => return Err(Self::error(state, "Unterminated quoted string")),
            }
        }
    }

    fn error(state: &State, msg: impl Into<String>) -> DbError {
        DbError::new(msg)
            .with_kind(ErrorKind::Syntax)
            .with_field("line", state.line)
            .with_field("col", state.col)
    }
}
