use std::sync::Arc;

use crate::arrays::field::Schema;
use crate::arrays::interval::Interval;
use crate::catalog::resolver::CombineInfoResolver;
use crate::config::session::SessionConfig;

/// Everything needed to compile one continuous view.
///
/// Threaded explicitly through the splitter and planner calls instead of
/// living in process wide state.
#[derive(Debug, Clone)]
pub struct CompileContext {
    pub config: SessionConfig,
    pub resolver: Arc<CombineInfoResolver>,
    /// Schema of the stream the view reads from.
    pub stream_schema: Schema,
    /// Name of the relation holding the combiner's output.
    pub matrel_name: String,
    /// Bucket width as a percentage of the sliding window width.
    pub step_factor: f64,
    /// Lower bound on the bucket width.
    pub min_step: Interval,
}

impl CompileContext {
    pub fn new(
        config: SessionConfig,
        resolver: Arc<CombineInfoResolver>,
        stream_schema: Schema,
        matrel_name: impl Into<String>,
    ) -> Self {
        let step_factor = config.step_factor;
        let min_step = Interval::from_secs(config.sliding_window_min_step_secs as i64);
        CompileContext {
            config,
            resolver,
            stream_schema,
            matrel_name: matrel_name.into(),
            step_factor,
            min_step,
        }
    }

    pub fn with_step_factor(mut self, step_factor: f64) -> Self {
        self.step_factor = step_factor;
        self
    }
}
