pub mod array_agg;
pub mod avg;
pub mod bitwise;
pub mod bloom;
pub mod count;
pub mod first_values;
pub mod freq;
pub mod hll;
pub mod hypothetical;
pub mod minmax;
pub mod percentile;
pub mod string_agg;
pub mod sum;
pub mod topk;

use std::fmt::Debug;

use contquery_error::{DbError, Result};
use serde::{Deserialize, Serialize};

use crate::arrays::scalar::ScalarValue;
use crate::catalog::{AggregateDefinition, CombinerDefinition};
use crate::functions::aggregate::TransitionValue;
use crate::statistics::bloom::BloomFilter;
use crate::statistics::cmsketch::CountMinSketch;
use crate::statistics::hyperloglog::HyperLogLog;
use crate::statistics::topk::TopK;

/// An aggregate definition with its optional combine descriptor.
pub type BuiltinAggregate = (AggregateDefinition, Option<CombinerDefinition>);

/// Every builtin aggregate, in registration order.
pub fn builtin_aggregates() -> Vec<BuiltinAggregate> {
    let mut aggs = Vec::new();
    aggs.extend(count::definitions());
    aggs.extend(sum::definitions());
    aggs.extend(avg::definitions());
    aggs.extend(minmax::definitions());
    aggs.extend(bitwise::definitions());
    aggs.extend(string_agg::definitions());
    aggs.extend(array_agg::definitions());
    aggs.extend(hll::definitions());
    aggs.extend(bloom::definitions());
    aggs.extend(freq::definitions());
    aggs.extend(topk::definitions());
    aggs.extend(first_values::definitions());
    aggs.extend(percentile::definitions());
    aggs.extend(hypothetical::definitions());
    aggs
}

/// Internal state that collects every input value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectedValues {
    pub values: Vec<ScalarValue>,
}

pub(crate) fn state_i64(state: &TransitionValue) -> Result<i64> {
    state.as_datum()?.try_as_i64()
}

/// Get the first argument, erroring if the aggregate was called without one.
pub(crate) fn first_arg(args: &[ScalarValue]) -> Result<&ScalarValue> {
    args.first()
        .ok_or_else(|| DbError::new("Aggregate called without arguments"))
}

/// Add two counters element-wise, used by states stored as lists of counts.
pub(crate) fn add_counters(state: &mut TransitionValue, other: &TransitionValue) -> Result<()> {
    let other = other.as_datum()?.try_as_list()?.to_vec();
    let ScalarValue::List(counts) = state.as_datum_mut()? else {
        return Err(DbError::new("Expected a list state"));
    };
    if counts.len() != other.len() {
        return Err(DbError::new("Mismatched counter states")
            .with_field("left", counts.len())
            .with_field("right", other.len()));
    }
    for (count, other) in counts.iter_mut().zip(other) {
        *count = ScalarValue::Int64(count.try_as_i64()? + other.try_as_i64()?);
    }
    Ok(())
}

/// A sketch whose aggregate result is its own binary encoding.
pub trait BinarySketch: Debug + Clone + Send + Sync + Sized + 'static {
    fn to_bytes(&self) -> Result<Vec<u8>>;
    fn from_bytes(bytes: &[u8]) -> Result<Self>;
}

macro_rules! impl_binary_sketch {
    ($($sketch:ty),*) => {
        $(
            impl BinarySketch for $sketch {
                fn to_bytes(&self) -> Result<Vec<u8>> {
                    <$sketch>::to_bytes(self)
                }

                fn from_bytes(bytes: &[u8]) -> Result<Self> {
                    <$sketch>::from_bytes(bytes)
                }
            }
        )*
    };
}

impl_binary_sketch!(HyperLogLog, BloomFilter, CountMinSketch, TopK);

/// Encode a sketch state, null states stay null.
pub(crate) fn sketch_to_value<S: BinarySketch>(state: &TransitionValue) -> Result<ScalarValue> {
    if state.is_null() {
        return Ok(ScalarValue::Null);
    }
    Ok(ScalarValue::Binary(state.downcast_ref::<S>()?.to_bytes()?))
}

pub(crate) fn sketch_from_value<S: BinarySketch>(value: &ScalarValue) -> Result<TransitionValue> {
    if value.is_null() {
        return Ok(TransitionValue::null());
    }
    Ok(TransitionValue::internal(S::from_bytes(value.try_as_binary()?)?))
}

/// Merge `other` into `state` with `merge`. A null state adopts `other`.
pub(crate) fn merge_sketch<S, F>(state: &mut TransitionValue, other: S, merge: F) -> Result<()>
where
    S: BinarySketch,
    F: FnOnce(&mut S, &S) -> Result<()>,
{
    if state.is_null() {
        *state = TransitionValue::internal(other);
        return Ok(());
    }
    merge(state.downcast_mut::<S>()?, &other)
}

/// Merge a partial sketch state into `state`.
pub(crate) fn combine_sketch<S, F>(state: &mut TransitionValue, other: TransitionValue, merge: F) -> Result<()>
where
    S: BinarySketch,
    F: FnOnce(&mut S, &S) -> Result<()>,
{
    if other.is_null() {
        return Ok(());
    }
    let other = other.downcast_ref::<S>()?.clone();
    merge_sketch(state, other, merge)
}

/// Merge an encoded sketch argument into `state`, skipping nulls.
pub(crate) fn merge_sketch_arg<S, F>(state: &mut TransitionValue, args: &[ScalarValue], merge: F) -> Result<()>
where
    S: BinarySketch,
    F: FnOnce(&mut S, &S) -> Result<()>,
{
    let value = first_arg(args)?;
    if value.is_null() {
        return Ok(());
    }
    merge_sketch(state, S::from_bytes(value.try_as_binary()?)?, merge)
}
