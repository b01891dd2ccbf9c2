use std::time::Duration;

use log::warn;

/// Sink for advisory health signals. Reporting never affects the operation itself.
pub trait HealthReporter: Send + Sync {
    fn report_slow_operation(&self, reader_name: &str, operation: &str, elapsed: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingHealthReporter;

impl HealthReporter for LoggingHealthReporter {
    fn report_slow_operation(&self, reader_name: &str, operation: &str, elapsed: Duration) {
        warn!(
            "log reader {} observed slow {}: {:?}",
            reader_name, operation, elapsed
        );
    }
}
