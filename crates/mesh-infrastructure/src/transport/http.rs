//! HTTP transport backed by a pooled `reqwest` client

use crate::config::TransportConfig;
use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use mesh_domain::error::{Error, Result};
use mesh_domain::ports::{OutboundRequest, ServiceTransport, TransportResponse};
use mesh_domain::{Endpoint, HttpMethod, Protocol, TimeoutOperation};
use reqwest::{Client, Method};
use std::collections::HashMap;
use tracing::{debug, info};

/// Sends calls over a shared connection pool
///
/// Connections are reused across calls to the same host; sockets and TLS
/// are handled by `reqwest`. Closing drops the transport's handle on the
/// pool; idle connections go away once calls still running have finished.
pub struct HttpTransport {
    client: ArcSwapOption<Client>,
}

impl HttpTransport {
    pub fn new(config: &TransportConfig) -> Result<Self> {
        let client = Client::builder()
            .pool_max_idle_per_host(config.max_idle_per_host)
            .pool_idle_timeout(config.idle_timeout())
            .tcp_keepalive(config.keepalive())
            .connect_timeout(config.connect_timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| Error::network_with_source("Failed to build HTTP client", e))?;
        Ok(Self::with_client(client))
    }

    /// Wrap an existing client
    pub fn with_client(client: Client) -> Self {
        Self {
            client: ArcSwapOption::from_pointee(client),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.client.load().is_none()
    }
}

fn to_method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
        HttpMethod::Head => Method::HEAD,
        HttpMethod::Options => Method::OPTIONS,
    }
}

/// Non-JSON bodies are carried as a JSON string; an empty body is `null`
fn parse_body(bytes: &[u8]) -> serde_json::Value {
    if bytes.is_empty() {
        return serde_json::Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

#[async_trait]
impl ServiceTransport for HttpTransport {
    fn name(&self) -> &str {
        "http"
    }

    async fn execute(
        &self,
        endpoint: &Endpoint,
        request: OutboundRequest,
    ) -> Result<TransportResponse> {
        let Some(client) = self.client.load_full() else {
            return Err(Error::network("HTTP transport is closed"));
        };
        if matches!(endpoint.protocol(), Protocol::Tcp) {
            return Err(Error::invalid_configuration(format!(
                "Endpoint {} speaks raw TCP, which the HTTP transport cannot call",
                endpoint.address()
            )));
        }

        let url = endpoint.url_for(&request.path);
        let mut builder = client
            .request(to_method(request.method), &url)
            .timeout(request.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::timeout(TimeoutOperation::Call, request.timeout)
            } else {
                Error::network_with_source(format!("Request to {url} failed"), e)
            }
        })?;

        let status_code = response.status().as_u16();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::network_with_source(format!("Failed to read body from {url}"), e))?;

        debug!(url = %url, status_code, "HTTP call completed");
        Ok(TransportResponse {
            status_code,
            body: parse_body(&bytes),
            headers,
        })
    }

    async fn close(&self) {
        if self.client.swap(None).is_some() {
            info!("HTTP transport closed");
        }
    }
}
