//! SQL parser for continuous queries. Heavily inspired by sqlparser-rs.
pub mod ast;
pub mod keywords;
pub mod parser;
pub mod statement;
pub mod tokens;

use contquery_error::Result;
use statement::Statement;

/// Parse a string of SQL into statements.
pub fn parse(sql: &str) -> Result<Vec<Statement>> {
    let toks = tokens::Tokenizer::new(sql).tokenize()?;
    parser::Parser::with_tokens(toks).parse_statements()
}
