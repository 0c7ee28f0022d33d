use contquery_error::{DbError, ErrorKind, Result};
use serde::{Deserialize, Serialize};

use super::{BuiltinAggregate, CollectedValues};
use crate::arrays::datatype::DataType;
use crate::arrays::scalar::ScalarValue;
use crate::catalog::{
    AggregateDefinition, AggregateKind, CombinerDefinition, FunctionDef, ReturnType, StateType,
};
use crate::functions::aggregate::{
    AggregateBehavior, TransitionValue, deserialize_internal, serialize_internal,
};
use crate::functions::documentation::{Category, Documentation, Example};
use crate::statistics::tdigest::TDigest;

static PERCENTILE_CONT_DOC: Documentation = Documentation {
    category: Category::ORDERED_SET_AGGREGATE,
    description: "Continuous percentile, interpolating between adjacent input values.",
    arguments: &["fraction", "input"],
    example: Some(Example {
        example: "percentile_cont(0.5) WITHIN GROUP (ORDER BY latency)",
        output: "12.5",
    }),
};

static PERCENTILE_DISC_DOC: Documentation = Documentation {
    category: Category::ORDERED_SET_AGGREGATE,
    description: "Discrete percentile, the first input value whose position in the ordering equals or exceeds the fraction.",
    arguments: &["fraction", "input"],
    example: None,
};

static COMBINABLE_PERCENTILE_CONT_DOC: Documentation = Documentation {
    category: Category::STREAMING_AGGREGATE,
    description: "Approximate continuous percentile backed by a t-digest.",
    arguments: &["fraction", "input"],
    example: Some(Example {
        example: "combinable_percentile_cont(0.99, latency)",
        output: "250.0",
    }),
};

pub fn definitions() -> Vec<BuiltinAggregate> {
    vec![
        (
            AggregateDefinition::new(
                "percentile_cont",
                vec![DataType::Float64, DataType::Float64],
                FunctionDef::non_strict("ordered_set_transition"),
                StateType::Internal,
                &PercentileCont,
            )
            .with_kind(AggregateKind::OrderedSet, 1)
            .with_finalize(
                FunctionDef::strict("percentile_cont_final"),
                ReturnType::Fixed(DataType::Float64),
            )
            .with_doc(&PERCENTILE_CONT_DOC),
            None,
        ),
        (
            AggregateDefinition::new(
                "percentile_disc",
                vec![DataType::Float64, DataType::Any],
                FunctionDef::non_strict("ordered_set_transition"),
                StateType::Internal,
                &PercentileDisc,
            )
            .with_kind(AggregateKind::OrderedSet, 1)
            .with_finalize(
                FunctionDef::strict("percentile_disc_final"),
                ReturnType::SameAsArg(1),
            )
            .with_doc(&PERCENTILE_DISC_DOC),
            None,
        ),
        (
            AggregateDefinition::new(
                "combinable_percentile_cont",
                vec![DataType::Float64, DataType::Float64],
                FunctionDef::non_strict("tdigest_percentile_transfn"),
                StateType::Internal,
                &CombinablePercentileCont,
            )
            .with_finalize(
                FunctionDef::strict("tdigest_percentile_finalfn"),
                ReturnType::Fixed(DataType::Float64),
            )
            .with_doc(&COMBINABLE_PERCENTILE_CONT_DOC),
            Some(
                CombinerDefinition::new(
                    FunctionDef::strict("tdigest_combine"),
                    StateType::Internal,
                )
                .with_serialization(
                    FunctionDef::strict("tdigest_serialize"),
                    FunctionDef::strict("tdigest_deserialize"),
                ),
            ),
        ),
    ]
}

fn validate_fraction(fraction: f64) -> Result<f64> {
    if !(0.0..=1.0).contains(&fraction) {
        return Err(
            DbError::new(format!("Percentile value {fraction} is not between 0 and 1"))
                .with_kind(ErrorKind::Execution),
        );
    }
    Ok(fraction)
}

fn direct_fraction(direct_args: &[ScalarValue]) -> Result<Option<f64>> {
    match direct_args.first() {
        None => Err(DbError::new("Missing percentile fraction")),
        Some(ScalarValue::Null) => Ok(None),
        Some(v) => Ok(Some(validate_fraction(v.try_as_f64()?)?)),
    }
}

/// Collect every non-null input, used by the exact ordered-set aggregates.
fn collect_non_null(state: &mut TransitionValue, args: &[ScalarValue]) -> Result<()> {
    match args.first() {
        Some(ScalarValue::Null) | None => Ok(()),
        Some(v) => {
            state
                .internal_or_init(CollectedValues::default)?
                .values
                .push(v.clone());
            Ok(())
        }
    }
}

fn sorted_values(state: &TransitionValue) -> Result<Vec<ScalarValue>> {
    let mut values = state.downcast_ref::<CollectedValues>()?.values.clone();
    values.sort();
    Ok(values)
}

#[derive(Debug, Clone, Copy)]
pub struct PercentileCont;

impl AggregateBehavior for PercentileCont {
    fn transition(&self, state: &mut TransitionValue, args: &[ScalarValue]) -> Result<()> {
        collect_non_null(state, args)
    }

    fn finalize(&self, state: &TransitionValue, direct_args: &[ScalarValue]) -> Result<ScalarValue> {
        let Some(fraction) = direct_fraction(direct_args)? else {
            return Ok(ScalarValue::Null);
        };
        let values = sorted_values(state)?
            .iter()
            .map(|v| v.try_as_f64())
            .collect::<Result<Vec<_>>>()?;
        if values.is_empty() {
            return Ok(ScalarValue::Null);
        }

        let pos = fraction * (values.len() - 1) as f64;
        let lo = pos.floor() as usize;
        let hi = pos.ceil() as usize;
        let result = values[lo] + (pos - lo as f64) * (values[hi] - values[lo]);

        Ok(ScalarValue::Float64(result))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PercentileDisc;

impl AggregateBehavior for PercentileDisc {
    fn transition(&self, state: &mut TransitionValue, args: &[ScalarValue]) -> Result<()> {
        collect_non_null(state, args)
    }

    fn finalize(&self, state: &TransitionValue, direct_args: &[ScalarValue]) -> Result<ScalarValue> {
        let Some(fraction) = direct_fraction(direct_args)? else {
            return Ok(ScalarValue::Null);
        };
        let values = sorted_values(state)?;
        if values.is_empty() {
            return Ok(ScalarValue::Null);
        }

        let idx = ((fraction * values.len() as f64).ceil() as usize).saturating_sub(1);
        Ok(values[idx.min(values.len() - 1)].clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigestState {
    /// Fraction from the first row of the group.
    fraction: f64,
    digest: TDigest,
}

/// Approximate `percentile_cont` taking the fraction as a regular argument,
/// so its partial states can be merged.
#[derive(Debug, Clone, Copy)]
pub struct CombinablePercentileCont;

impl AggregateBehavior for CombinablePercentileCont {
    fn transition(&self, state: &mut TransitionValue, args: &[ScalarValue]) -> Result<()> {
        let (fraction, value) = match args {
            [fraction, value] => (fraction, value),
            _ => return Err(DbError::new("Expected fraction and value arguments")),
        };
        if fraction.is_null() || value.is_null() {
            return Ok(());
        }
        let fraction = validate_fraction(fraction.try_as_f64()?)?;
        let value = value.try_as_f64()?;

        let state = state.internal_or_init(|| DigestState {
            fraction,
            digest: TDigest::default(),
        })?;
        state.digest.add(value);

        Ok(())
    }

    fn combine(&self, state: &mut TransitionValue, other: TransitionValue) -> Result<()> {
        if other.is_null() {
            return Ok(());
        }
        if state.is_null() {
            *state = other;
            return Ok(());
        }
        let other = other.downcast_ref::<DigestState>()?;
        state
            .downcast_mut::<DigestState>()?
            .digest
            .merge(&other.digest)
    }

    fn finalize(&self, state: &TransitionValue, _direct_args: &[ScalarValue]) -> Result<ScalarValue> {
        let state = state.downcast_ref::<DigestState>()?;
        if state.digest.is_empty() {
            return Ok(ScalarValue::Null);
        }
        Ok(ScalarValue::Float64(state.digest.quantile(state.fraction)))
    }

    fn serialize(&self, state: &TransitionValue) -> Result<ScalarValue> {
        serialize_internal::<DigestState>(state)
    }

    fn deserialize(&self, value: &ScalarValue) -> Result<TransitionValue> {
        deserialize_internal::<DigestState>(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(behavior: &dyn AggregateBehavior, values: &[ScalarValue]) -> TransitionValue {
        let mut state = TransitionValue::null();
        for v in values {
            behavior.transition(&mut state, std::slice::from_ref(v)).unwrap();
        }
        state
    }

    #[test]
    fn percentile_cont_interpolates() {
        let values: Vec<_> = [4.0, 1.0, 3.0, 2.0, f64::NAN]
            .into_iter()
            .map(|v| if v.is_nan() { ScalarValue::Null } else { v.into() })
            .collect();
        let state = collect(&PercentileCont, &values);

        // (fraction, expected)
        let cases = [(0.0, 1.0), (0.5, 2.5), (1.0, 4.0), (0.25, 1.75)];
        for (fraction, expected) in cases {
            let got = PercentileCont
                .finalize(&state, &[ScalarValue::Float64(fraction)])
                .unwrap();
            assert_eq!(ScalarValue::Float64(expected), got, "fraction: {fraction}");
        }
    }

    #[test]
    fn percentile_disc_picks_input_value() {
        let values: Vec<_> = [10, 20, 30, 40].into_iter().map(ScalarValue::Int64).collect();
        let state = collect(&PercentileDisc, &values);

        // (fraction, expected)
        let cases = [(0.0, 10), (0.25, 10), (0.5, 20), (0.51, 30), (1.0, 40)];
        for (fraction, expected) in cases {
            let got = PercentileDisc
                .finalize(&state, &[ScalarValue::Float64(fraction)])
                .unwrap();
            assert_eq!(ScalarValue::Int64(expected), got, "fraction: {fraction}");
        }
    }

    #[test]
    fn fraction_out_of_range() {
        let state = collect(&PercentileCont, &[ScalarValue::Float64(1.0)]);
        let err = PercentileCont
            .finalize(&state, &[ScalarValue::Float64(1.5)])
            .unwrap_err();
        assert_eq!(ErrorKind::Execution, err.kind());
    }

    #[test]
    fn combinable_percentile_merges_digests() {
        let mut a = TransitionValue::null();
        let mut b = TransitionValue::null();
        for v in 1..=50 {
            CombinablePercentileCont
                .transition(&mut a, &[0.5.into(), (v as f64).into()])
                .unwrap();
        }
        for v in 51..=100 {
            CombinablePercentileCont
                .transition(&mut b, &[0.5.into(), (v as f64).into()])
                .unwrap();
        }

        let wire = CombinablePercentileCont.serialize(&b).unwrap();
        let b = CombinablePercentileCont.deserialize(&wire).unwrap();
        CombinablePercentileCont.combine(&mut a, b).unwrap();

        let median = CombinablePercentileCont
            .finalize(&a, &[])
            .unwrap()
            .try_as_f64()
            .unwrap();
        assert!((median - 50.5).abs() < 2.0, "median: {median}");
    }
}
