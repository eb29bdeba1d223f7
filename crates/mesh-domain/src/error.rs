//! Error handling types

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias for operations that can fail
pub type Result<T> = std::result::Result<T, Error>;

/// Which of the independent timeout layers expired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutOperation {
    /// Waiting for a concurrency limiter slot
    SlotAcquire,
    /// The outbound call itself
    Call,
    /// A health probe
    HealthProbe,
}

impl fmt::Display for TimeoutOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SlotAcquire => write!(f, "slot acquire"),
            Self::Call => write!(f, "call"),
            Self::HealthProbe => write!(f, "health probe"),
        }
    }
}

/// Main error type for the service mesh
#[derive(Error, Debug)]
pub enum Error {
    /// No service registered under this id
    #[error("Service not found: {service_id}")]
    ServiceNotFound {
        /// The unknown service id
        service_id: String,
    },

    /// A service with this id is already registered
    #[error("Service already registered: {service_id}")]
    ServiceAlreadyRegistered {
        /// The duplicated service id
        service_id: String,
    },

    /// Invalid descriptor, method, path, header or endpoint
    #[error("Invalid service configuration: {message}")]
    InvalidServiceConfiguration {
        /// What was rejected
        message: String,
    },

    /// The breaker for this service rejected the call
    #[error("Circuit breaker open for service: {service_id}")]
    CircuitBreakerOpen {
        /// Service whose breaker is open
        service_id: String,
    },

    /// Backend or connection pool reported exhaustion / server error
    #[error("Service unavailable: {service_id}: {message}")]
    ServiceUnavailable {
        /// Service that failed
        service_id: String,
        /// Failure detail
        message: String,
        /// HTTP status reported by the backend, if any
        status_code: Option<u16>,
    },

    /// No endpoint eligible for selection
    #[error("Load balancing error for service {service_id}: {message}")]
    LoadBalancing {
        /// Service being resolved
        service_id: String,
        /// Why no endpoint was eligible
        message: String,
    },

    /// Health probe could not be performed
    #[error("Health check error for service {service_id}: {message}")]
    HealthCheck {
        /// Service being probed
        service_id: String,
        /// Failure detail
        message: String,
    },

    /// Metrics could not be collected or rendered
    #[error("Metrics collection error: {message}")]
    MetricsCollection {
        /// Failure detail
        message: String,
    },

    /// Cache lookup for an absent key
    #[error("Cache key not found: {key}")]
    CacheKeyNotFound {
        /// The missing key
        key: String,
    },

    /// Cache lookup for a key whose TTL elapsed
    #[error("Cache entry expired: {key}")]
    CacheExpired {
        /// The expired key
        key: String,
    },

    /// Invalid cache settings or pattern
    #[error("Cache configuration error: {message}")]
    CacheConfiguration {
        /// What was rejected
        message: String,
    },

    /// Background or async operation failed
    #[error("Async operation error: {message}")]
    AsyncOperation {
        /// Failure detail
        message: String,
    },

    /// One of the timeout layers expired
    #[error("Async timeout: {operation} exceeded {timeout_ms}ms")]
    AsyncTimeout {
        /// Which timeout layer fired
        operation: TimeoutOperation,
        /// Configured limit in milliseconds
        timeout_ms: u64,
    },

    /// I/O operation error (with context)
    #[error("I/O error: {message}")]
    Io {
        /// Description of the I/O error
        message: String,
        /// Optional source error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// JSON parsing or serialization error
    #[error("JSON parsing error: {source}")]
    Json {
        /// The underlying JSON error
        #[from]
        source: serde_json::Error,
    },

    /// Configuration-related error
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error
        message: String,
        /// Optional source error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Network-related error
    #[error("Network error: {message}")]
    Network {
        /// Description of the network error
        message: String,
        /// Optional source error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Internal system error
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error
        message: String,
    },
}

// Registry error creation methods
impl Error {
    /// Create a service not found error
    pub fn service_not_found<S: Into<String>>(service_id: S) -> Self {
        Self::ServiceNotFound {
            service_id: service_id.into(),
        }
    }

    /// Create a duplicate registration error
    pub fn already_registered<S: Into<String>>(service_id: S) -> Self {
        Self::ServiceAlreadyRegistered {
            service_id: service_id.into(),
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_configuration<S: Into<String>>(message: S) -> Self {
        Self::InvalidServiceConfiguration {
            message: message.into(),
        }
    }

    /// Create a load balancing error
    pub fn load_balancing<S: Into<String>, M: Into<String>>(service_id: S, message: M) -> Self {
        Self::LoadBalancing {
            service_id: service_id.into(),
            message: message.into(),
        }
    }
}

// Dispatch error creation methods
impl Error {
    /// Create a circuit open error
    pub fn circuit_open<S: Into<String>>(service_id: S) -> Self {
        Self::CircuitBreakerOpen {
            service_id: service_id.into(),
        }
    }

    /// Create a service unavailable error
    pub fn unavailable<S: Into<String>, M: Into<String>>(service_id: S, message: M) -> Self {
        Self::ServiceUnavailable {
            service_id: service_id.into(),
            message: message.into(),
            status_code: None,
        }
    }

    /// Create a service unavailable error carrying the backend status
    pub fn unavailable_with_status<S: Into<String>>(service_id: S, status_code: u16) -> Self {
        Self::ServiceUnavailable {
            service_id: service_id.into(),
            message: format!("backend responded with status {status_code}"),
            status_code: Some(status_code),
        }
    }

    /// Create a timeout error
    pub fn timeout(operation: TimeoutOperation, timeout: std::time::Duration) -> Self {
        Self::AsyncTimeout {
            operation,
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Create an async operation error
    pub fn async_operation<S: Into<String>>(message: S) -> Self {
        Self::AsyncOperation {
            message: message.into(),
        }
    }
}

// Health, metrics and cache error creation methods
impl Error {
    /// Create a health check error
    pub fn health_check<S: Into<String>, M: Into<String>>(service_id: S, message: M) -> Self {
        Self::HealthCheck {
            service_id: service_id.into(),
            message: message.into(),
        }
    }

    /// Create a metrics collection error
    pub fn metrics<S: Into<String>>(message: S) -> Self {
        Self::MetricsCollection {
            message: message.into(),
        }
    }

    /// Create a cache miss error
    pub fn cache_key_not_found<S: Into<String>>(key: S) -> Self {
        Self::CacheKeyNotFound { key: key.into() }
    }

    /// Create a cache expiry error
    pub fn cache_expired<S: Into<String>>(key: S) -> Self {
        Self::CacheExpired { key: key.into() }
    }

    /// Create a cache configuration error
    pub fn cache_configuration<S: Into<String>>(message: S) -> Self {
        Self::CacheConfiguration {
            message: message.into(),
        }
    }
}

// Infrastructure error creation methods
impl Error {
    /// Create an I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io {
            message: message.into(),
            source: None,
        }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
            source: None,
        }
    }

    /// Create a configuration error with source
    pub fn configuration_with_source<
        S: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    >(
        message: S,
        source: E,
    ) -> Self {
        Self::Configuration {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a network error
    pub fn network<S: Into<String>>(message: S) -> Self {
        Self::Network {
            message: message.into(),
            source: None,
        }
    }

    /// Create a network error with source
    pub fn network_with_source<S: Into<String>, E: std::error::Error + Send + Sync + 'static>(
        message: S,
        source: E,
    ) -> Self {
        Self::Network {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

// Classification helpers so callers can tell "busy", "down" and "circuit open" apart
impl Error {
    /// The mesh had no capacity for the call (limiter slot not acquired in time)
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            Self::AsyncTimeout {
                operation: TimeoutOperation::SlotAcquire,
                ..
            }
        )
    }

    /// The backend failed or did not answer in time
    pub fn is_down(&self) -> bool {
        matches!(
            self,
            Self::ServiceUnavailable { .. }
                | Self::Network { .. }
                | Self::AsyncTimeout {
                    operation: TimeoutOperation::Call,
                    ..
                }
        )
    }

    /// The call was rejected by the service's circuit breaker
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitBreakerOpen { .. })
    }

    /// Errors raised by validation, before any network effect
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::InvalidServiceConfiguration { .. })
    }
}
