//! Readers for the binary sketches produced by approximate aggregates.

use contquery_error::Result;

use crate::arrays::datatype::DataType;
use crate::arrays::scalar::ScalarValue;
use crate::execution::ExecutionContext;
use crate::functions::documentation::{Category, Documentation, Example};
use crate::functions::scalar::{ScalarFunction, ScalarFunctionSet, check_arg, check_arity};
use crate::statistics::bloom::BloomFilter;
use crate::statistics::cmsketch::CountMinSketch;
use crate::statistics::hyperloglog::HyperLogLog;
use crate::statistics::topk::TopK;

pub const FUNCTION_SET_HLL_CARDINALITY: ScalarFunctionSet = ScalarFunctionSet {
    name: "hll_cardinality",
    aliases: &[],
    doc: &Documentation {
        category: Category::Sketch,
        description: "Estimated number of distinct values in a HyperLogLog sketch.",
        arguments: &["sketch"],
        example: Some(Example {
            example: "hll_cardinality(hll_agg(user_id))",
            output: "1024",
        }),
    },
    function: &HllCardinality,
};

pub const FUNCTION_SET_BLOOM_CONTAINS: ScalarFunctionSet = ScalarFunctionSet {
    name: "bloom_contains",
    aliases: &[],
    doc: &Documentation {
        category: Category::Sketch,
        description: "Check if a value may be in a Bloom filter. False for a NULL filter or value.",
        arguments: &["filter", "value"],
        example: Some(Example {
            example: "bloom_contains(bloom_agg(user_id), 42)",
            output: "true",
        }),
    },
    function: &BloomContains,
};

pub const FUNCTION_SET_BLOOM_CARDINALITY: ScalarFunctionSet = ScalarFunctionSet {
    name: "bloom_cardinality",
    aliases: &[],
    doc: &Documentation {
        category: Category::Sketch,
        description: "Estimated number of distinct values added to a Bloom filter.",
        arguments: &["filter"],
        example: None,
    },
    function: &BloomCardinality,
};

pub const FUNCTION_SET_FREQ: ScalarFunctionSet = ScalarFunctionSet {
    name: "freq",
    aliases: &[],
    doc: &Documentation {
        category: Category::Sketch,
        description: "Estimated number of times a value was added to a count-min sketch.",
        arguments: &["sketch", "value"],
        example: Some(Example {
            example: "freq(freq_agg(url), '/index.html')",
            output: "17",
        }),
    },
    function: &Freq,
};

pub const FUNCTION_SET_FREQ_TOTAL: ScalarFunctionSet = ScalarFunctionSet {
    name: "freq_total",
    aliases: &[],
    doc: &Documentation {
        category: Category::Sketch,
        description: "Total number of values added to a count-min sketch.",
        arguments: &["sketch"],
        example: None,
    },
    function: &FreqTotal,
};

pub const FUNCTION_SET_TOPK_VALUES: ScalarFunctionSet = ScalarFunctionSet {
    name: "topk_values",
    aliases: &[],
    doc: &Documentation {
        category: Category::Sketch,
        description: "The most frequent values in a top-k sketch, most frequent first.",
        arguments: &["sketch"],
        example: Some(Example {
            example: "topk_values(topk_agg(url, 3))",
            output: "[/, /login, /about]",
        }),
    },
    function: &TopKValues,
};

pub const FUNCTION_SET_TOPK_FREQS: ScalarFunctionSet = ScalarFunctionSet {
    name: "topk_freqs",
    aliases: &[],
    doc: &Documentation {
        category: Category::Sketch,
        description: "Estimated counts matching topk_values.",
        arguments: &["sketch"],
        example: Some(Example {
            example: "topk_freqs(topk_agg(url, 3))",
            output: "[120, 31, 7]",
        }),
    },
    function: &TopKFreqs,
};

/// Decode the sketch argument and apply `f`, NULL sketches give NULL.
fn map_sketch<S>(
    args: &[ScalarValue],
    decode: fn(&[u8]) -> Result<S>,
    f: impl Fn(S) -> ScalarValue,
) -> Result<ScalarValue> {
    match &args[0] {
        ScalarValue::Null => Ok(ScalarValue::Null),
        v => Ok(f(decode(v.try_as_binary()?)?)),
    }
}

fn count_value(count: u64) -> ScalarValue {
    ScalarValue::Int64(count as i64)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HllCardinality;

impl ScalarFunction for HllCardinality {
    fn return_type(&self, inputs: &[DataType]) -> Result<DataType> {
        check_arity("hll_cardinality", inputs, 1)?;
        check_arg("hll_cardinality", &inputs[0], DataType::Binary)?;
        Ok(DataType::Int64)
    }

    fn invoke(&self, args: &[ScalarValue], _ctx: &ExecutionContext) -> Result<ScalarValue> {
        map_sketch(args, HyperLogLog::from_bytes, |hll| count_value(hll.cardinality()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BloomContains;

impl ScalarFunction for BloomContains {
    fn return_type(&self, inputs: &[DataType]) -> Result<DataType> {
        check_arity("bloom_contains", inputs, 2)?;
        check_arg("bloom_contains", &inputs[0], DataType::Binary)?;
        Ok(DataType::Boolean)
    }

    fn invoke(&self, args: &[ScalarValue], _ctx: &ExecutionContext) -> Result<ScalarValue> {
        let value = &args[1];
        if value.is_null() {
            return Ok(ScalarValue::Boolean(false));
        }
        let contains = map_sketch(args, BloomFilter::from_bytes, |bloom| {
            ScalarValue::Boolean(bloom.contains(value))
        })?;
        match contains {
            ScalarValue::Null => Ok(ScalarValue::Boolean(false)),
            v => Ok(v),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BloomCardinality;

impl ScalarFunction for BloomCardinality {
    fn return_type(&self, inputs: &[DataType]) -> Result<DataType> {
        check_arity("bloom_cardinality", inputs, 1)?;
        check_arg("bloom_cardinality", &inputs[0], DataType::Binary)?;
        Ok(DataType::Int64)
    }

    fn invoke(&self, args: &[ScalarValue], _ctx: &ExecutionContext) -> Result<ScalarValue> {
        map_sketch(args, BloomFilter::from_bytes, |bloom| count_value(bloom.cardinality()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Freq;

impl ScalarFunction for Freq {
    fn return_type(&self, inputs: &[DataType]) -> Result<DataType> {
        check_arity("freq", inputs, 2)?;
        check_arg("freq", &inputs[0], DataType::Binary)?;
        Ok(DataType::Int64)
    }

    fn invoke(&self, args: &[ScalarValue], _ctx: &ExecutionContext) -> Result<ScalarValue> {
        let value = &args[1];
        if value.is_null() {
            return Ok(ScalarValue::Null);
        }
        map_sketch(args, CountMinSketch::from_bytes, |cms| count_value(cms.estimate(value)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreqTotal;

impl ScalarFunction for FreqTotal {
    fn return_type(&self, inputs: &[DataType]) -> Result<DataType> {
        check_arity("freq_total", inputs, 1)?;
        check_arg("freq_total", &inputs[0], DataType::Binary)?;
        Ok(DataType::Int64)
    }

    fn invoke(&self, args: &[ScalarValue], _ctx: &ExecutionContext) -> Result<ScalarValue> {
        map_sketch(args, CountMinSketch::from_bytes, |cms| count_value(cms.total()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopKValues;

impl ScalarFunction for TopKValues {
    fn return_type(&self, inputs: &[DataType]) -> Result<DataType> {
        check_arity("topk_values", inputs, 1)?;
        check_arg("topk_values", &inputs[0], DataType::Binary)?;
        Ok(DataType::list(DataType::Any))
    }

    fn invoke(&self, args: &[ScalarValue], _ctx: &ExecutionContext) -> Result<ScalarValue> {
        map_sketch(args, TopK::from_bytes, |topk| {
            ScalarValue::List(topk.top().into_iter().map(|(value, _)| value).collect())
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopKFreqs;

impl ScalarFunction for TopKFreqs {
    fn return_type(&self, inputs: &[DataType]) -> Result<DataType> {
        check_arity("topk_freqs", inputs, 1)?;
        check_arg("topk_freqs", &inputs[0], DataType::Binary)?;
        Ok(DataType::list(DataType::Int64))
    }

    fn invoke(&self, args: &[ScalarValue], _ctx: &ExecutionContext) -> Result<ScalarValue> {
        map_sketch(args, TopK::from_bytes, |topk| {
            ScalarValue::List(topk.top().into_iter().map(|(_, count)| count_value(count)).collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &str) -> ScalarValue {
        ScalarValue::from(v)
    }

    #[test]
    fn readers() {
        let ctx = ExecutionContext::new(0);

        let mut hll = HyperLogLog::new();
        let mut bloom = BloomFilter::new();
        let mut cms = CountMinSketch::new();
        let mut topk = TopK::new(2).unwrap();
        for v in ["a", "b", "a", "c", "a", "b"] {
            hll.insert(&s(v));
            bloom.insert(&s(v));
            cms.add(&s(v), 1);
            topk.increment(&s(v), 1);
        }
        let hll = ScalarValue::Binary(hll.to_bytes().unwrap());
        let bloom = ScalarValue::Binary(bloom.to_bytes().unwrap());
        let cms = ScalarValue::Binary(cms.to_bytes().unwrap());
        let topk = ScalarValue::Binary(topk.to_bytes().unwrap());

        // (function, args, expected)
        let cases: Vec<(&dyn ScalarFunction, Vec<ScalarValue>, ScalarValue)> = vec![
            (&HllCardinality, vec![hll.clone()], ScalarValue::Int64(3)),
            (&HllCardinality, vec![ScalarValue::Null], ScalarValue::Null),
            (&BloomContains, vec![bloom.clone(), s("a")], ScalarValue::Boolean(true)),
            (&BloomContains, vec![bloom.clone(), s("z")], ScalarValue::Boolean(false)),
            (&BloomContains, vec![bloom.clone(), ScalarValue::Null], ScalarValue::Boolean(false)),
            (&BloomContains, vec![ScalarValue::Null, s("a")], ScalarValue::Boolean(false)),
            (&BloomCardinality, vec![bloom], ScalarValue::Int64(3)),
            (&Freq, vec![cms.clone(), s("a")], ScalarValue::Int64(3)),
            (&Freq, vec![cms.clone(), s("z")], ScalarValue::Int64(0)),
            (&Freq, vec![cms.clone(), ScalarValue::Null], ScalarValue::Null),
            (&FreqTotal, vec![cms], ScalarValue::Int64(6)),
            (&TopKValues, vec![topk.clone()], ScalarValue::List(vec![s("a"), s("b")])),
            (
                &TopKFreqs,
                vec![topk],
                ScalarValue::List(vec![ScalarValue::Int64(3), ScalarValue::Int64(2)]),
            ),
            (&TopKFreqs, vec![ScalarValue::Null], ScalarValue::Null),
        ];
        for (function, args, expected) in cases {
            assert_eq!(expected, function.invoke(&args, &ctx).unwrap(), "{function:?} {args:?}");
        }
    }

    #[test]
    fn rejects_non_sketch_input() {
        let ctx = ExecutionContext::new(0);
        assert!(HllCardinality.return_type(&[DataType::Utf8]).is_err());
        assert!(Freq.return_type(&[DataType::Binary]).is_err());
        assert_eq!(
            DataType::list(DataType::Any),
            TopKValues.return_type(&[DataType::Binary]).unwrap()
        );
        assert!(
            HllCardinality
                .invoke(&[ScalarValue::Binary(b"not a sketch".to_vec())], &ctx)
                .is_err()
        );
    }
}
