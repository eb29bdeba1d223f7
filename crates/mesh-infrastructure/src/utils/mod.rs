//! Shared helpers: operation timing and scheduled background tasks

pub mod scheduled;
pub mod timing;

pub use scheduled::ScheduledTask;
pub use timing::TimedOperation;
