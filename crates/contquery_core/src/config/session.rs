use std::sync::LazyLock;

use contquery_error::{DbError, ErrorKind, Result};
use hashbrown::HashMap;

use crate::arrays::scalar::ScalarValue;

pub const DEFAULT_STEP_FACTOR: f64 = 5.0;
pub const MAX_STEP_FACTOR: f64 = 50.0;
pub const DEFAULT_MIN_STEP_SECS: u64 = 60;
pub const DEFAULT_SPLIT_CACHE_CAPACITY: u64 = 128;

/// Configuration for compiling and running continuous views.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Sliding window bucket width as a percentage of the window width.
    pub step_factor: f64,
    /// Minimum bucket width for sliding windows.
    pub sliding_window_min_step_secs: u64,
    pub enable_aggregate_dedup: bool,
    pub hash_aggregate_enabled: bool,
    pub split_cache_capacity: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            step_factor: DEFAULT_STEP_FACTOR,
            sliding_window_min_step_secs: DEFAULT_MIN_STEP_SECS,
            enable_aggregate_dedup: true,
            hash_aggregate_enabled: true,
            split_cache_capacity: DEFAULT_SPLIT_CACHE_CAPACITY,
        }
    }
}

impl SessionConfig {
    pub fn set_from_scalar(&mut self, name: &str, value: ScalarValue) -> Result<()> {
        let func = GET_SET_FUNCTIONS
            .get(name)
            .ok_or_else(|| DbError::new(format!("Missing setting for '{name}'")))?;

        (func.set)(value, self)
    }

    pub fn get_as_scalar(&self, name: &str) -> Result<ScalarValue> {
        let func = GET_SET_FUNCTIONS
            .get(name)
            .ok_or_else(|| DbError::new(format!("Missing setting for '{name}'")))?;

        let val = (func.get)(self);
        Ok(val)
    }

    pub fn reset(&mut self, name: &str) -> Result<()> {
        let def_conf = Self::default();

        let func = GET_SET_FUNCTIONS
            .get(name)
            .ok_or_else(|| DbError::new(format!("Missing setting for '{name}'")))?;

        let scalar = (func.get)(&def_conf);
        (func.set)(scalar, self)
    }

    pub fn reset_all(&mut self) {
        *self = Self::default();
    }

    /// Names and descriptions of all settings, sorted by name.
    pub fn describe_settings() -> Vec<(&'static str, &'static str)> {
        let mut settings: Vec<_> = GET_SET_FUNCTIONS
            .iter()
            .map(|(name, funcs)| (*name, funcs.description))
            .collect();
        settings.sort_unstable();
        settings
    }
}

struct SettingFunctions {
    description: &'static str,
    set: fn(scalar: ScalarValue, conf: &mut SessionConfig) -> Result<()>,
    get: fn(conf: &SessionConfig) -> ScalarValue,
}

impl SettingFunctions {
    const fn new<S: SessionSetting>() -> Self {
        SettingFunctions {
            description: S::DESCRIPTION,
            set: S::set_from_scalar as _,
            get: S::get_as_scalar as _,
        }
    }
}

fn insert_setting<S: SessionSetting>(map: &mut HashMap<&'static str, SettingFunctions>) {
    if map.insert(S::NAME, SettingFunctions::new::<S>()).is_some() {
        panic!("Duplicate settings names: {}", S::NAME);
    }
}

static GET_SET_FUNCTIONS: LazyLock<HashMap<&'static str, SettingFunctions>> = LazyLock::new(|| {
    let mut map = HashMap::new();

    insert_setting::<StepFactor>(&mut map);
    insert_setting::<SlidingWindowMinStepSecs>(&mut map);
    insert_setting::<EnableAggregateDedup>(&mut map);
    insert_setting::<HashAggregateEnabled>(&mut map);
    insert_setting::<SplitCacheCapacity>(&mut map);

    map
});

pub trait SessionSetting: Sync + Send + 'static {
    const NAME: &'static str;
    const DESCRIPTION: &'static str;

    fn set_from_scalar(scalar: ScalarValue, conf: &mut SessionConfig) -> Result<()>;
    fn get_as_scalar(conf: &SessionConfig) -> ScalarValue;
}

pub struct StepFactor;

impl StepFactor {
    /// Step factors are a percentage in (0, 50].
    pub fn validate_value(val: f64) -> Result<()> {
        if !(val > 0.0 && val <= MAX_STEP_FACTOR) {
            return Err(DbError::new(format!(
                "step_factor must be greater than 0 and at most {MAX_STEP_FACTOR}, got {val}"
            ))
            .with_kind(ErrorKind::StepFactorOutOfRange));
        }
        Ok(())
    }
}

impl SessionSetting for StepFactor {
    const NAME: &'static str = "step_factor";
    const DESCRIPTION: &'static str =
        "Default sliding window bucket width as a percentage of the window width";

    fn set_from_scalar(scalar: ScalarValue, conf: &mut SessionConfig) -> Result<()> {
        let val = scalar.try_as_f64()?;
        Self::validate_value(val)?;
        conf.step_factor = val;
        Ok(())
    }

    fn get_as_scalar(conf: &SessionConfig) -> ScalarValue {
        conf.step_factor.into()
    }
}

pub struct SlidingWindowMinStepSecs;

impl SessionSetting for SlidingWindowMinStepSecs {
    const NAME: &'static str = "sliding_window_min_step_secs";
    const DESCRIPTION: &'static str = "Minimum sliding window bucket width in seconds";

    fn set_from_scalar(scalar: ScalarValue, conf: &mut SessionConfig) -> Result<()> {
        let val = scalar.try_as_usize()?;
        conf.sliding_window_min_step_secs = val as u64;
        Ok(())
    }

    fn get_as_scalar(conf: &SessionConfig) -> ScalarValue {
        conf.sliding_window_min_step_secs.into()
    }
}

pub struct EnableAggregateDedup;

impl SessionSetting for EnableAggregateDedup {
    const NAME: &'static str = "enable_aggregate_dedup";
    const DESCRIPTION: &'static str = "Share state between identical aggregate calls";

    fn set_from_scalar(scalar: ScalarValue, conf: &mut SessionConfig) -> Result<()> {
        conf.enable_aggregate_dedup = scalar.try_as_bool()?;
        Ok(())
    }

    fn get_as_scalar(conf: &SessionConfig) -> ScalarValue {
        conf.enable_aggregate_dedup.into()
    }
}

pub struct HashAggregateEnabled;

impl SessionSetting for HashAggregateEnabled {
    const NAME: &'static str = "hash_aggregate_enabled";
    const DESCRIPTION: &'static str =
        "Use hashed grouping when no aggregate requires sorted input";

    fn set_from_scalar(scalar: ScalarValue, conf: &mut SessionConfig) -> Result<()> {
        conf.hash_aggregate_enabled = scalar.try_as_bool()?;
        Ok(())
    }

    fn get_as_scalar(conf: &SessionConfig) -> ScalarValue {
        conf.hash_aggregate_enabled.into()
    }
}

pub struct SplitCacheCapacity;

impl SessionSetting for SplitCacheCapacity {
    const NAME: &'static str = "split_cache_capacity";
    const DESCRIPTION: &'static str = "Number of split continuous queries to keep cached";

    fn set_from_scalar(scalar: ScalarValue, conf: &mut SessionConfig) -> Result<()> {
        let val = scalar.try_as_usize()?;
        if val == 0 {
            return Err(DbError::new("split_cache_capacity must be at least 1"));
        }
        conf.split_cache_capacity = val as u64;
        Ok(())
    }

    fn get_as_scalar(conf: &SessionConfig) -> ScalarValue {
        conf.split_cache_capacity.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_reset() {
        let mut conf = SessionConfig::default();
        conf.set_from_scalar("step_factor", ScalarValue::Int64(25)).unwrap();
        assert_eq!(25.0, conf.step_factor);
        assert_eq!(
            ScalarValue::Float64(25.0),
            conf.get_as_scalar("step_factor").unwrap()
        );

        conf.reset("step_factor").unwrap();
        assert_eq!(DEFAULT_STEP_FACTOR, conf.step_factor);
    }

    #[test]
    fn step_factor_range() {
        let mut conf = SessionConfig::default();
        // (input, ok)
        let tests = [(0.0, false), (0.5, true), (50.0, true), (50.1, false), (-1.0, false)];
        for (input, ok) in tests {
            let res = conf.set_from_scalar("step_factor", ScalarValue::Float64(input));
            match res {
                Ok(_) => assert!(ok, "input: {input}"),
                Err(e) => {
                    assert!(!ok, "input: {input}");
                    assert_eq!(ErrorKind::StepFactorOutOfRange, e.kind());
                }
            }
        }
    }

    #[test]
    fn unknown_setting() {
        let mut conf = SessionConfig::default();
        assert!(conf.set_from_scalar("nope", ScalarValue::Null).is_err());
        assert_eq!(5, SessionConfig::describe_settings().len());
    }
}
