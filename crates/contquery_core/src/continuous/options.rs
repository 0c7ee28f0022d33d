use contquery_error::{DbError, ErrorKind, Result};
use contquery_parser::ast::{BinaryOperator, Expr, ViewOption};

use super::ARRIVAL_TIMESTAMP;
use super::sliding_window::window_lower_bound;
use crate::arrays::datatype::DataType;
use crate::arrays::interval::Interval;
use crate::config::session::MAX_STEP_FACTOR;
use crate::planner::bind::constant_value;

/// Options given in `WITH (...)` of a continuous view definition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewOptions {
    /// `sw`: sliding window over the arrival timestamp.
    pub sliding_window: Option<Interval>,
    /// `step_factor`: overrides the session step factor.
    pub step_factor: Option<f64>,
}

impl ViewOptions {
    pub fn parse(options: &[ViewOption]) -> Result<Self> {
        let mut parsed = ViewOptions::default();
        for option in options {
            match option.name.as_str() {
                "sw" => {
                    let value = constant_value(&option.value)?;
                    let interval = value.cast_to(&DataType::Interval)?.try_as_interval()?;
                    if interval.total_micros() <= 0 {
                        return Err(DbError::new("sw must be a positive interval")
                            .with_kind(ErrorKind::Syntax)
                            .with_field("value", option.value.to_string()));
                    }
                    parsed.sliding_window = Some(interval);
                }
                "step_factor" => {
                    let factor = constant_value(&option.value)
                        .and_then(|v| v.cast_to(&DataType::Float64))
                        .and_then(|v| v.try_as_f64())
                        .map_err(|_| {
                            DbError::new("step_factor must be a number")
                                .with_kind(ErrorKind::StepFactorOutOfRange)
                                .with_field("value", option.value.to_string())
                        })?;
                    check_step_factor(factor)?;
                    parsed.step_factor = Some(factor);
                }
                other => {
                    return Err(DbError::new(format!("Unrecognized continuous view option \"{other}\""))
                        .with_kind(ErrorKind::Syntax));
                }
            }
        }
        Ok(parsed)
    }

    /// Predicate added to the WHERE clause for the `sw` option.
    pub fn window_predicate(&self) -> Option<Expr> {
        self.sliding_window.map(|interval| {
            Expr::binary(
                Expr::column(ARRIVAL_TIMESTAMP),
                BinaryOperator::Gt,
                window_lower_bound("clock_timestamp", &interval),
            )
        })
    }
}

/// Step factors are a percentage in (0, 50].
pub fn check_step_factor(factor: f64) -> Result<()> {
    if !(factor > 0.0 && factor <= MAX_STEP_FACTOR) {
        return Err(DbError::new(format!(
            "step_factor must be greater than 0 and at most {MAX_STEP_FACTOR}"
        ))
        .with_kind(ErrorKind::StepFactorOutOfRange)
        .with_field("step_factor", factor));
    }
    Ok(())
}
