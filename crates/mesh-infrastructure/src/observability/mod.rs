//! Observability sinks subscribed to the event bus
//!
//! | Observer | Role |
//! |----------|------|
//! | [`MetricsCollector`] | Counters, gauges and histograms with text and structured export |
//! | [`StructuredLogger`] | One tracing event per mesh event |
//! | [`AlertingObserver`] | Bounded buffer of operator-relevant alerts |

pub mod alerting;
pub mod logger;
pub mod metrics;

pub use alerting::{Alert, AlertSeverity, AlertingObserver};
pub use logger::StructuredLogger;
pub use metrics::{MetricKind, MetricSample, MetricsCollector, ServiceMetrics};
