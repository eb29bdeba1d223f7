//! Service Transport Port
//!
//! The dispatcher and the health monitor never open sockets themselves; they
//! hand an [`OutboundRequest`] to a [`ServiceTransport`] together with the
//! endpoint chosen by the load balancer. Connection pooling and TLS belong to
//! the implementation.

use crate::entities::Endpoint;
use crate::error::Result;
use crate::value_objects::HttpMethod;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

/// A validated call ready to be sent to one endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRequest {
    pub method: HttpMethod,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: Option<serde_json::Value>,
    /// Upper bound for the whole exchange
    pub timeout: Duration,
}

impl OutboundRequest {
    /// A bodiless GET, as used by health probes
    pub fn get<P: Into<String>>(path: P, timeout: Duration) -> Self {
        Self {
            method: HttpMethod::Get,
            path: path.into(),
            headers: HashMap::new(),
            body: None,
            timeout,
        }
    }
}

/// Raw response as reported by the transport
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status_code: u16,
    pub body: serde_json::Value,
    pub headers: HashMap<String, String>,
}

impl TransportResponse {
    pub fn new(status_code: u16, body: serde_json::Value) -> Self {
        Self {
            status_code,
            body,
            headers: HashMap::new(),
        }
    }
}

/// Executes calls against service endpoints
///
/// Implementations return `Err` only when no response was obtained
/// (connection refused, reset, pool exhausted). A response with any status
/// code, including 5xx, is `Ok`; classification is the caller's job.
#[async_trait]
pub trait ServiceTransport: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Send `request` to `endpoint`
    async fn execute(
        &self,
        endpoint: &Endpoint,
        request: OutboundRequest,
    ) -> Result<TransportResponse>;

    /// Lightweight health probe of `endpoint`
    async fn probe(&self, endpoint: &Endpoint, timeout: Duration) -> Result<TransportResponse> {
        self.execute(endpoint, OutboundRequest::get(endpoint.health_path(), timeout))
            .await
    }

    /// Release pooled connections
    async fn close(&self) {}
}
