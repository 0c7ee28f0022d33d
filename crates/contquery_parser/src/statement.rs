use std::fmt;

use crate::ast::{CreateContinuousViewNode, SelectNode};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Statement {
    /// A plain query, run once.
    Query(SelectNode),
    /// Definition of a continuous view over a stream.
    CreateContinuousView(CreateContinuousViewNode),
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Query(query) => write!(f, "{query}"),
            Self::CreateContinuousView(create) => write!(f, "{create}"),
        }
    }
}
