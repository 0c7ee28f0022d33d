//! Aggregate function behaviors and transition values.
//!
//! An aggregate is driven through a transition function per input row, an
//! optional combine function merging two partial states, and an optional
//! finalize function producing the user visible result. Aggregates whose
//! state can't be represented as a plain value keep an internal state that
//! must be serialized before it leaves the aggregate operator.
pub mod builtin;

use std::any::Any;
use std::fmt::Debug;

use contquery_error::{DbError, ErrorKind, Result, ResultExt};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::arrays::scalar::ScalarValue;

/// Opaque state for aggregates with an internal transition type.
pub trait InternalState: Debug + Send + Sync + 'static {
    fn clone_state(&self) -> Box<dyn InternalState>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

// Note that `Box<dyn InternalState>` intentionally does not implement Clone,
// otherwise it would pick up this impl and downcasts would see the box instead
// of the concrete state.
impl<T> InternalState for T
where
    T: Any + Debug + Clone + Send + Sync,
{
    fn clone_state(&self) -> Box<dyn InternalState> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// The current transition value of one aggregate for one group.
#[derive(Debug)]
pub enum TransitionValue {
    /// State representable as a regular value.
    Datum(ScalarValue),
    /// State only meaningful to the aggregate itself.
    Internal(Box<dyn InternalState>),
}

impl Clone for TransitionValue {
    fn clone(&self) -> Self {
        match self {
            Self::Datum(v) => Self::Datum(v.clone()),
            Self::Internal(state) => Self::Internal((**state).clone_state()),
        }
    }
}

impl TransitionValue {
    pub const fn null() -> Self {
        TransitionValue::Datum(ScalarValue::Null)
    }

    pub fn internal<T: InternalState>(state: T) -> Self {
        TransitionValue::Internal(Box::new(state))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, TransitionValue::Datum(ScalarValue::Null))
    }

    pub fn as_datum(&self) -> Result<&ScalarValue> {
        match self {
            Self::Datum(v) => Ok(v),
            Self::Internal(_) => Err(DbError::new("Expected a datum transition value")),
        }
    }

    pub fn as_datum_mut(&mut self) -> Result<&mut ScalarValue> {
        match self {
            Self::Datum(v) => Ok(v),
            Self::Internal(_) => Err(DbError::new("Expected a datum transition value")),
        }
    }

    pub fn downcast_ref<T: 'static>(&self) -> Result<&T> {
        match self {
            Self::Internal(state) => (**state)
                .as_any()
                .downcast_ref::<T>()
                .ok_or_else(|| DbError::new("Internal aggregate state has unexpected type")),
            Self::Datum(v) => Err(DbError::new(format!(
                "Expected internal aggregate state, got datum {v}"
            ))),
        }
    }

    pub fn downcast_mut<T: 'static>(&mut self) -> Result<&mut T> {
        match self {
            Self::Internal(state) => (**state)
                .as_any_mut()
                .downcast_mut::<T>()
                .ok_or_else(|| DbError::new("Internal aggregate state has unexpected type")),
            Self::Datum(v) => Err(DbError::new(format!(
                "Expected internal aggregate state, got datum {v}"
            ))),
        }
    }

    /// Get the internal state, creating it with `init` if the value is
    /// currently null.
    pub fn internal_or_init<T, F>(&mut self, init: F) -> Result<&mut T>
    where
        T: InternalState + Any,
        F: FnOnce() -> T,
    {
        if self.is_null() {
            *self = TransitionValue::internal(init());
        }
        self.downcast_mut::<T>()
    }
}

/// Runtime implementation of an aggregate's catalog functions.
///
/// Behaviors are stateless singletons referenced by the catalog. All
/// per-group data lives in the `TransitionValue`.
pub trait AggregateBehavior: Debug + Send + Sync {
    /// Fresh state for aggregates that need more than a null or a catalog
    /// initial value to start from.
    fn initial_state(&self) -> Option<TransitionValue> {
        None
    }

    /// Advance the state with one row of aggregated arguments.
    fn transition(&self, state: &mut TransitionValue, args: &[ScalarValue]) -> Result<()>;

    /// Merge a partial state into `state`.
    fn combine(&self, _state: &mut TransitionValue, _other: TransitionValue) -> Result<()> {
        Err(DbError::new("Aggregate has no combine function")
            .with_kind(ErrorKind::AggregateNotCombinable))
    }

    /// Produce the result from a state. Direct arguments are only provided
    /// for ordered-set aggregates.
    fn finalize(&self, state: &TransitionValue, _direct_args: &[ScalarValue]) -> Result<ScalarValue> {
        Ok(state.as_datum()?.clone())
    }

    /// Convert a state into a value that can be stored and transported.
    fn serialize(&self, state: &TransitionValue) -> Result<ScalarValue> {
        Ok(state.as_datum()?.clone())
    }

    /// Inverse of `serialize`.
    fn deserialize(&self, value: &ScalarValue) -> Result<TransitionValue> {
        Ok(TransitionValue::Datum(value.clone()))
    }
}

/// Serialize an internal state to a binary value.
pub fn serialize_internal<T>(state: &TransitionValue) -> Result<ScalarValue>
where
    T: Serialize + 'static,
{
    if state.is_null() {
        return Ok(ScalarValue::Null);
    }
    let inner = state.downcast_ref::<T>()?;
    let bytes = serde_json::to_vec(inner).context("Failed to serialize aggregate state")?;
    Ok(ScalarValue::Binary(bytes))
}

/// Deserialize an internal state produced by `serialize_internal`.
pub fn deserialize_internal<T>(value: &ScalarValue) -> Result<TransitionValue>
where
    T: DeserializeOwned + InternalState + Any,
{
    if value.is_null() {
        return Ok(TransitionValue::null());
    }
    let bytes = value.try_as_binary()?;
    let state: T = serde_json::from_slice(bytes).context("Failed to deserialize aggregate state")?;
    Ok(TransitionValue::internal(state))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Counter {
        n: i64,
    }

    #[test]
    fn clone_copies_internal_state() {
        let mut a = TransitionValue::internal(Counter { n: 1 });
        let b = a.clone();
        a.downcast_mut::<Counter>().unwrap().n = 5;

        assert_eq!(5, a.downcast_ref::<Counter>().unwrap().n);
        assert_eq!(1, b.downcast_ref::<Counter>().unwrap().n);
    }

    #[test]
    fn internal_or_init_on_null() {
        let mut v = TransitionValue::null();
        v.internal_or_init(|| Counter { n: 0 }).unwrap().n += 2;
        assert_eq!(2, v.downcast_ref::<Counter>().unwrap().n);
    }

    #[test]
    fn serialize_round_trip() {
        let v = TransitionValue::internal(Counter { n: 7 });
        let bytes = serialize_internal::<Counter>(&v).unwrap();
        assert!(matches!(bytes, ScalarValue::Binary(_)));

        let restored = deserialize_internal::<Counter>(&bytes).unwrap();
        assert_eq!(&Counter { n: 7 }, restored.downcast_ref::<Counter>().unwrap());

        assert!(deserialize_internal::<Counter>(&ScalarValue::Null).unwrap().is_null());
    }

    #[test]
    fn wrong_downcast_errors() {
        let v = TransitionValue::internal(Counter { n: 1 });
        assert!(v.downcast_ref::<String>().is_err());
        assert!(TransitionValue::null().downcast_ref::<Counter>().is_err());
    }
}
