pub mod datetime;
pub mod general;
pub mod numeric;
pub mod sketch;
pub mod string;

use super::ScalarFunctionSet;

pub const BUILTIN_SCALAR_FUNCTION_SETS: &[ScalarFunctionSet] = &[
    // Datetime
    datetime::FUNCTION_SET_DATE_ROUND,
    datetime::FUNCTION_SET_DATE_TRUNC,
    datetime::FUNCTION_SET_NOW,
    datetime::FUNCTION_SET_CLOCK_TIMESTAMP,
    // String
    string::FUNCTION_SET_LOWER,
    string::FUNCTION_SET_UPPER,
    string::FUNCTION_SET_LENGTH,
    // Numeric
    numeric::FUNCTION_SET_ABS,
    numeric::FUNCTION_SET_RANDOM,
    // Sketch
    sketch::FUNCTION_SET_HLL_CARDINALITY,
    sketch::FUNCTION_SET_BLOOM_CONTAINS,
    sketch::FUNCTION_SET_BLOOM_CARDINALITY,
    sketch::FUNCTION_SET_FREQ,
    sketch::FUNCTION_SET_FREQ_TOTAL,
    sketch::FUNCTION_SET_TOPK_VALUES,
    sketch::FUNCTION_SET_TOPK_FREQS,
    // General
    general::FUNCTION_SET_COALESCE,
];
