use std::backtrace::{Backtrace, BacktraceStatus};
use std::borrow::Cow;
use std::error::Error;
use std::fmt;

pub type Result<T, E = DbError> = std::result::Result<T, E>;

/// Broad classification of an error.
///
/// Definition-time kinds are raised while compiling a continuous view and
/// indicate a malformed query. Everything else is fatal to the current unit
/// of execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Aggregate could not be found in the catalog.
    UnknownAggregate,
    /// Aggregate lacks a combine function but was placed in a combining plan.
    AggregateNotCombinable,
    /// Aggregate call appeared inside the arguments of another aggregate.
    NestedAggregateNotAllowed,
    /// More than one sliding window predicate, or one nested under OR.
    AmbiguousSlidingWindowPredicate,
    /// Sliding window predicate references a non-datetime expression.
    InvalidSlidingWindowColumnType,
    /// Worker and combiner plans disagree about aggregate structure.
    ShapeMismatch,
    /// Step factor outside of (0, 50].
    StepFactorOutOfRange,
    /// Malformed SQL text.
    Syntax,
    /// Execution was cancelled at a pull boundary.
    Cancelled,
    /// Failure during execution of a plan.
    Execution,
    /// Everything else.
    Internal,
}

impl ErrorKind {
    /// If this kind represents a static error in a query definition.
    pub const fn is_definition_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownAggregate
                | Self::AggregateNotCombinable
                | Self::NestedAggregateNotAllowed
                | Self::AmbiguousSlidingWindowPredicate
                | Self::InvalidSlidingWindowColumnType
                | Self::ShapeMismatch
                | Self::StepFactorOutOfRange
                | Self::Syntax
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::UnknownAggregate => "unknown aggregate",
            Self::AggregateNotCombinable => "aggregate not combinable",
            Self::NestedAggregateNotAllowed => "nested aggregate",
            Self::AmbiguousSlidingWindowPredicate => "ambiguous sliding window predicate",
            Self::InvalidSlidingWindowColumnType => "invalid sliding window column type",
            Self::ShapeMismatch => "shape mismatch",
            Self::StepFactorOutOfRange => "step factor out of range",
            Self::Syntax => "syntax error",
            Self::Cancelled => "cancelled",
            Self::Execution => "execution error",
            Self::Internal => "internal error",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug)]
pub struct DbError {
    inner: Box<DbErrorInner>,
}

#[derive(Debug)]
struct DbErrorInner {
    msg: String,
    kind: ErrorKind,
    source: Option<Box<dyn Error + Send + Sync>>,
    backtrace: Backtrace,
    fields: Vec<ErrorField>,
}

#[derive(Debug)]
struct ErrorField {
    key: Cow<'static, str>,
    value: Box<dyn fmt::Debug + Send + Sync>,
}

impl DbError {
    pub fn new(msg: impl Into<String>) -> Self {
        DbError {
            inner: Box::new(DbErrorInner {
                msg: msg.into(),
                kind: ErrorKind::Internal,
                source: None,
                backtrace: Backtrace::capture(),
                fields: Vec::new(),
            }),
        }
    }

    pub fn with_source(msg: impl Into<String>, source: Box<dyn Error + Send + Sync>) -> Self {
        let mut err = Self::new(msg);
        err.inner.source = Some(source);
        err
    }

    /// Set the kind for this error.
    pub fn with_kind(mut self, kind: ErrorKind) -> Self {
        self.inner.kind = kind;
        self
    }

    /// Attach a structured field to the error.
    pub fn with_field<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<Cow<'static, str>>,
        V: fmt::Debug + Send + Sync + 'static,
    {
        self.inner.fields.push(ErrorField {
            key: key.into(),
            value: Box::new(value),
        });
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.inner.kind
    }

    pub fn get_msg(&self) -> &str {
        &self.inner.msg
    }

    /// Get the backtrace, if one was captured.
    pub fn get_backtrace(&self) -> Option<&Backtrace> {
        match self.inner.backtrace.status() {
            BacktraceStatus::Captured => Some(&self.inner.backtrace),
            _ => None,
        }
    }

    /// Iterate over the keys of attached fields.
    pub fn field_keys(&self) -> impl Iterator<Item = &str> {
        self.inner.fields.iter().map(|f| f.key.as_ref())
    }

    /// Create a new error with the same kind and message.
    ///
    /// Fields and sources are not carried over.
    pub fn duplicate(&self) -> Self {
        DbError::new(self.inner.msg.clone()).with_kind(self.inner.kind)
    }
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner.msg)?;

        for field in &self.inner.fields {
            write!(f, "\n  {}: {:?}", field.key, field.value)?;
        }

        if let Some(source) = &self.inner.source {
            write!(f, "\nError source: {source}")?;
        }

        if let Some(bt) = self.get_backtrace() {
            write!(f, "\nBacktrace: {bt}")?;
        }

        Ok(())
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.inner.source.as_ref().map(|e| e.as_ref() as _)
    }
}

impl From<fmt::Error> for DbError {
    fn from(value: fmt::Error) -> Self {
        DbError::with_source("Format error", Box::new(value))
    }
}

impl From<std::num::ParseIntError> for DbError {
    fn from(value: std::num::ParseIntError) -> Self {
        DbError::with_source("Failed to parse integer", Box::new(value))
    }
}

impl From<std::num::ParseFloatError> for DbError {
    fn from(value: std::num::ParseFloatError) -> Self {
        DbError::with_source("Failed to parse float", Box::new(value))
    }
}

/// Extension methods for adding context to arbitrary errors.
pub trait ResultExt<T, E> {
    /// Wrap an error with a static context string.
    fn context(self, msg: &'static str) -> Result<T>;

    /// Wrap an error with a context string produced by a closure.
    fn context_fn<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: Error + Send + Sync + 'static> ResultExt<T, E> for std::result::Result<T, E> {
    fn context(self, msg: &'static str) -> Result<T> {
        match self {
            Ok(v) => Ok(v),
            Err(e) => Err(DbError::with_source(msg, Box::new(e))),
        }
    }

    fn context_fn<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        match self {
            Ok(v) => Ok(v),
            Err(e) => Err(DbError::with_source(f(), Box::new(e))),
        }
    }
}

pub trait OptionExt<T> {
    /// Return an error if the option is None.
    fn required(self, msg: &'static str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn required(self, msg: &'static str) -> Result<T> {
        match self {
            Some(v) => Ok(v),
            None => Err(DbError::new(format!("Missing required value: {msg}"))),
        }
    }
}

/// Return early with a "not yet implemented" error.
#[macro_export]
macro_rules! not_implemented {
    ($($arg:tt)*) => {{
        let msg = format!($($arg)*);
        return Err($crate::DbError::new(format!("Not yet implemented: {msg}")));
    }};
}
