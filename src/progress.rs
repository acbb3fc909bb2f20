//! Progress reporting for provisioning operations.

/// Progress reporter for provisioning operations.
pub trait ProgressReporter: Send + Sync {
    fn emit(&self, percentage: u32, message: &str);
}

/// Reporter that forwards progress to the tracing subscriber.
pub struct LogProgressReporter;

impl ProgressReporter for LogProgressReporter {
    fn emit(&self, percentage: u32, message: &str) {
        tracing::info!("[{:>3}%] {}", percentage, message);
    }
}
