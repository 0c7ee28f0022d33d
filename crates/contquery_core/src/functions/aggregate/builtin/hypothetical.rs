use std::cmp::Ordering;

use contquery_error::{DbError, Result};

use super::{BuiltinAggregate, CollectedValues, add_counters};
use crate::arrays::datatype::DataType;
use crate::arrays::scalar::{ScalarValue, sort_cmp};
use crate::catalog::{
    AggregateDefinition, AggregateKind, CombinerDefinition, FunctionDef, ReturnType, StateType,
};
use crate::functions::aggregate::{AggregateBehavior, TransitionValue};
use crate::functions::documentation::{Category, Documentation, Example};
use crate::statistics::hyperloglog::HyperLogLog;

static RANK_DOC: Documentation = Documentation {
    category: Category::ORDERED_SET_AGGREGATE,
    description: "Rank of the hypothetical row, with gaps for duplicate rows.",
    arguments: &["hypothetical", "input"],
    example: Some(Example {
        example: "rank(3) WITHIN GROUP (ORDER BY x)",
        output: "2",
    }),
};

static DENSE_RANK_DOC: Documentation = Documentation {
    category: Category::ORDERED_SET_AGGREGATE,
    description: "Rank of the hypothetical row, without gaps.",
    arguments: &["hypothetical", "input"],
    example: None,
};

static PERCENT_RANK_DOC: Documentation = Documentation {
    category: Category::ORDERED_SET_AGGREGATE,
    description: "Relative rank of the hypothetical row, from 0 to 1.",
    arguments: &["hypothetical", "input"],
    example: None,
};

static CUME_DIST_DOC: Documentation = Documentation {
    category: Category::ORDERED_SET_AGGREGATE,
    description: "Cumulative distribution of the hypothetical row, from 1/N to 1.",
    arguments: &["hypothetical", "input"],
    example: None,
};

static COMBINABLE_RANK_DOC: Documentation = Documentation {
    category: Category::STREAMING_AGGREGATE,
    description: "Hypothetical-set rank taking the hypothetical value as a regular argument.",
    arguments: &["hypothetical", "input"],
    example: Some(Example {
        example: "combinable_rank(3, x)",
        output: "2",
    }),
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankKind {
    Rank,
    DenseRank,
    PercentRank,
    CumeDist,
}

impl RankKind {
    fn return_type(self) -> DataType {
        match self {
            Self::Rank | Self::DenseRank => DataType::Int64,
            Self::PercentRank | Self::CumeDist => DataType::Float64,
        }
    }
}

static RANK: HypotheticalSet = HypotheticalSet { kind: RankKind::Rank };
static DENSE_RANK: HypotheticalSet = HypotheticalSet {
    kind: RankKind::DenseRank,
};
static PERCENT_RANK: HypotheticalSet = HypotheticalSet {
    kind: RankKind::PercentRank,
};
static CUME_DIST: HypotheticalSet = HypotheticalSet {
    kind: RankKind::CumeDist,
};

static COMBINABLE_RANK: CombinableRank = CombinableRank { kind: RankKind::Rank };
static COMBINABLE_PERCENT_RANK: CombinableRank = CombinableRank {
    kind: RankKind::PercentRank,
};
static COMBINABLE_CUME_DIST: CombinableRank = CombinableRank {
    kind: RankKind::CumeDist,
};

fn counter_state() -> StateType {
    StateType::Value(DataType::list(DataType::Any))
}

pub fn definitions() -> Vec<BuiltinAggregate> {
    let mut defs = Vec::new();

    let exact: [(&str, &'static HypotheticalSet, &'static Documentation); 4] = [
        ("rank", &RANK, &RANK_DOC),
        ("dense_rank", &DENSE_RANK, &DENSE_RANK_DOC),
        ("percent_rank", &PERCENT_RANK, &PERCENT_RANK_DOC),
        ("cume_dist", &CUME_DIST, &CUME_DIST_DOC),
    ];
    for (name, behavior, doc) in exact {
        defs.push((
            AggregateDefinition::new(
                name,
                vec![DataType::Any, DataType::Any],
                FunctionDef::non_strict("ordered_set_transition"),
                StateType::Internal,
                behavior,
            )
            .with_kind(AggregateKind::Hypothetical, 1)
            .with_finalize(
                FunctionDef::non_strict(format!("{name}_final")),
                ReturnType::Fixed(behavior.kind.return_type()),
            )
            .with_doc(doc),
            None,
        ));
    }

    let combinable: [(&str, &'static CombinableRank); 3] = [
        ("combinable_rank", &COMBINABLE_RANK),
        ("combinable_percent_rank", &COMBINABLE_PERCENT_RANK),
        ("combinable_cume_dist", &COMBINABLE_CUME_DIST),
    ];
    for (name, behavior) in combinable {
        defs.push((
            AggregateDefinition::new(
                name,
                vec![DataType::Any, DataType::Any],
                FunctionDef::non_strict("hypothetical_counts_transfn"),
                counter_state(),
                behavior,
            )
            .with_initial_value(ScalarValue::List(vec![
                ScalarValue::Int64(0),
                ScalarValue::Int64(0),
                ScalarValue::Int64(0),
            ]))
            .with_finalize(
                FunctionDef::non_strict(format!("{name}_final")),
                ReturnType::Fixed(behavior.kind.return_type()),
            )
            .with_doc(&COMBINABLE_RANK_DOC),
            Some(CombinerDefinition::new(
                FunctionDef::non_strict("hypothetical_counts_combine"),
                counter_state(),
            )),
        ));
    }

    defs.push((
        AggregateDefinition::new(
            "combinable_dense_rank",
            vec![DataType::Any, DataType::Any],
            FunctionDef::non_strict("hypothetical_dense_rank_transfn"),
            StateType::Internal,
            &CombinableDenseRank,
        )
        .with_finalize(
            FunctionDef::strict("hypothetical_dense_rank_final"),
            ReturnType::Fixed(DataType::Int64),
        )
        .with_doc(&COMBINABLE_RANK_DOC),
        Some(
            CombinerDefinition::new(FunctionDef::strict("hll_union_agg"), StateType::Internal)
                .with_serialization(
                    FunctionDef::strict("hll_send"),
                    FunctionDef::strict("hll_recv"),
                ),
        ),
    ));

    defs
}

/// Compare an input value against the hypothetical value, nulls sorting
/// last.
fn compare(value: &ScalarValue, hypothetical: &ScalarValue) -> Ordering {
    if !value.is_null() && !hypothetical.is_null() && value.datatype() != hypothetical.datatype() {
        if let Ok(casted) = hypothetical.cast_to(&value.datatype()) {
            return sort_cmp(value, &casted, false, false);
        }
    }
    sort_cmp(value, hypothetical, false, false)
}

fn rank_result(kind: RankKind, rows: i64, less: i64, equal: i64) -> ScalarValue {
    match kind {
        RankKind::Rank | RankKind::DenseRank => ScalarValue::Int64(less + 1),
        RankKind::PercentRank => {
            if rows == 0 {
                ScalarValue::Float64(0.0)
            } else {
                ScalarValue::Float64(less as f64 / rows as f64)
            }
        }
        RankKind::CumeDist => ScalarValue::Float64((less + equal + 1) as f64 / (rows + 1) as f64),
    }
}

fn hypothetical_arg(direct_args: &[ScalarValue]) -> Result<&ScalarValue> {
    direct_args
        .first()
        .ok_or_else(|| DbError::new("Missing hypothetical argument"))
}

/// Exact hypothetical-set aggregates over the collected group.
#[derive(Debug, Clone, Copy)]
pub struct HypotheticalSet {
    kind: RankKind,
}

impl AggregateBehavior for HypotheticalSet {
    fn transition(&self, state: &mut TransitionValue, args: &[ScalarValue]) -> Result<()> {
        let value = args.first().cloned().unwrap_or(ScalarValue::Null);
        state
            .internal_or_init(CollectedValues::default)?
            .values
            .push(value);
        Ok(())
    }

    fn finalize(&self, state: &TransitionValue, direct_args: &[ScalarValue]) -> Result<ScalarValue> {
        let hypothetical = hypothetical_arg(direct_args)?;
        let values: &[ScalarValue] = if state.is_null() {
            &[]
        } else {
            &state.downcast_ref::<CollectedValues>()?.values
        };

        if self.kind == RankKind::DenseRank {
            let mut below: Vec<&ScalarValue> = values
                .iter()
                .filter(|v| compare(v, hypothetical) == Ordering::Less)
                .collect();
            below.sort();
            below.dedup();
            return Ok(ScalarValue::Int64(below.len() as i64 + 1));
        }

        let mut less = 0;
        let mut equal = 0;
        for value in values {
            match compare(value, hypothetical) {
                Ordering::Less => less += 1,
                Ordering::Equal => equal += 1,
                Ordering::Greater => (),
            }
        }

        Ok(rank_result(self.kind, values.len() as i64, less, equal))
    }
}

/// Hypothetical-set aggregates reduced to three counters: rows seen, rows
/// sorting before the hypothetical value, and rows equal to it.
#[derive(Debug, Clone, Copy)]
pub struct CombinableRank {
    kind: RankKind,
}

impl AggregateBehavior for CombinableRank {
    fn transition(&self, state: &mut TransitionValue, args: &[ScalarValue]) -> Result<()> {
        let (hypothetical, value) = match args {
            [hypothetical, value] => (hypothetical, value),
            _ => return Err(DbError::new("Expected hypothetical and value arguments")),
        };
        let less = (compare(value, hypothetical) == Ordering::Less) as i64;
        let equal = (compare(value, hypothetical) == Ordering::Equal) as i64;

        let row = TransitionValue::Datum(ScalarValue::List(vec![
            ScalarValue::Int64(1),
            ScalarValue::Int64(less),
            ScalarValue::Int64(equal),
        ]));
        add_counters(state, &row)
    }

    fn combine(&self, state: &mut TransitionValue, other: TransitionValue) -> Result<()> {
        if other.is_null() {
            return Ok(());
        }
        if state.is_null() {
            *state = other;
            return Ok(());
        }
        add_counters(state, &other)
    }

    fn finalize(&self, state: &TransitionValue, _direct_args: &[ScalarValue]) -> Result<ScalarValue> {
        if state.is_null() {
            return Ok(rank_result(self.kind, 0, 0, 0));
        }
        let counts = state.as_datum()?.try_as_list()?;
        let [rows, less, equal] = counts else {
            return Err(DbError::new("Malformed hypothetical rank state"));
        };
        Ok(rank_result(
            self.kind,
            rows.try_as_i64()?,
            less.try_as_i64()?,
            equal.try_as_i64()?,
        ))
    }
}

/// `dense_rank` needs distinct values below the hypothetical, approximated
/// with a HyperLogLog sketch.
#[derive(Debug, Clone, Copy)]
pub struct CombinableDenseRank;

impl AggregateBehavior for CombinableDenseRank {
    fn initial_state(&self) -> Option<TransitionValue> {
        Some(TransitionValue::internal(HyperLogLog::new()))
    }

    fn transition(&self, state: &mut TransitionValue, args: &[ScalarValue]) -> Result<()> {
        let (hypothetical, value) = match args {
            [hypothetical, value] => (hypothetical, value),
            _ => return Err(DbError::new("Expected hypothetical and value arguments")),
        };
        let hll = state.internal_or_init(HyperLogLog::new)?;
        if compare(value, hypothetical) == Ordering::Less {
            hll.insert(value);
        }
        Ok(())
    }

    fn combine(&self, state: &mut TransitionValue, other: TransitionValue) -> Result<()> {
        if other.is_null() {
            return Ok(());
        }
        let other = other.downcast_ref::<HyperLogLog>()?;
        state.internal_or_init(HyperLogLog::new)?.merge(other);
        Ok(())
    }

    fn finalize(&self, state: &TransitionValue, _direct_args: &[ScalarValue]) -> Result<ScalarValue> {
        let hll = state.downcast_ref::<HyperLogLog>()?;
        Ok(ScalarValue::Int64(hll.cardinality() as i64 + 1))
    }

    fn serialize(&self, state: &TransitionValue) -> Result<ScalarValue> {
        let hll = state.downcast_ref::<HyperLogLog>()?;
        Ok(ScalarValue::Binary(hll.to_bytes()?))
    }

    fn deserialize(&self, value: &ScalarValue) -> Result<TransitionValue> {
        Ok(TransitionValue::internal(HyperLogLog::from_bytes(
            value.try_as_binary()?,
        )?))
    }
}
