use sleuth_common::observability::{LogConfig, LogFormat, init_logging};
use std::sync::Once;

static TRACING: Once = Once::new();

/// Debug logging for wire tests. `SLEUTH_TEST_LOG=json` switches the encoding.
pub fn init_test_tracing() {
    TRACING.call_once(|| {
        let format = match std::env::var("SLEUTH_TEST_LOG").as_deref() {
            Ok("json") => LogFormat::Json,
            _ => LogFormat::Text,
        };
        let _ = init_logging(LogConfig {
            app_name: "sleuth-llm-tests",
            format,
            default_filter: "sleuth_llm=debug,info".into(),
            ..LogConfig::default()
        });
    });
}
