//! Timing instrumentation helpers

use std::time::{Duration, Instant};

/// Tracks the elapsed time of one operation
///
/// # Example
///
/// ```ignore
/// use mesh_infrastructure::utils::TimedOperation;
///
/// let timer = TimedOperation::start();
/// let response = transport.execute(&endpoint, request).await?;
/// histogram.observe(timer.elapsed_secs());
/// ```
#[derive(Debug, Clone, Copy)]
pub struct TimedOperation {
    start: Instant,
}

impl TimedOperation {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Elapsed milliseconds with sub-millisecond precision
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    /// Time left before `deadline`, `None` once exceeded
    pub fn remaining(&self, deadline: Duration) -> Option<Duration> {
        deadline.checked_sub(self.start.elapsed())
    }
}
