//! Utilities for logging.

use std::sync::Once;

use tracing::level_filters::LevelFilter;
use tracing::subscriber::set_global_default;
use tracing_subscriber::EnvFilter;

static TEST_INIT: Once = Once::new();

/// Logger for tests.
///
/// Writes through the test harness capture so output only shows for failing
/// tests. `RUST_LOG` overrides the default debug level.
pub fn init_test() {
    TEST_INIT.call_once(|| {
        let filter = EnvFilter::builder()
            .with_default_directive(LevelFilter::DEBUG.into())
            .from_env_lossy();

        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .compact()
            .finish();

        let _ = set_global_default(subscriber);
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_test_is_idempotent() {
        init_test();
        init_test();
        tracing::debug!("logger initialized");
    }
}
