//! Service descriptors and endpoints

use crate::constants::{DEFAULT_HEALTH_PATH, MAX_SERVICE_ID_LENGTH};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Wire protocol spoken by an endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Plain HTTP
    #[default]
    Http,
    /// HTTP over TLS
    Https,
    /// gRPC (HTTP/2)
    Grpc,
    /// Raw TCP
    Tcp,
}

impl Protocol {
    /// URL scheme for this protocol
    pub fn scheme(&self) -> &'static str {
        match self {
            Self::Http | Self::Grpc => "http",
            Self::Https => "https",
            Self::Tcp => "tcp",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http => write!(f, "http"),
            Self::Https => write!(f, "https"),
            Self::Grpc => write!(f, "grpc"),
            Self::Tcp => write!(f, "tcp"),
        }
    }
}

/// Network location of one service instance
///
/// Fields are private: an endpoint never changes once built.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    host: String,
    port: u16,
    #[serde(default)]
    protocol: Protocol,
    #[serde(default)]
    path: String,
    #[serde(default)]
    health_path: Option<String>,
}

impl Endpoint {
    /// Create an HTTP endpoint with an empty base path
    pub fn new<S: Into<String>>(host: S, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            protocol: Protocol::Http,
            path: String::new(),
            health_path: None,
        }
    }

    /// Set the protocol
    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Set the base path prefixed to every request path
    pub fn with_path<S: Into<String>>(mut self, path: S) -> Self {
        self.path = path.into();
        self
    }

    /// Set the path probed by the health monitor
    pub fn with_health_path<S: Into<String>>(mut self, path: S) -> Self {
        self.health_path = Some(path.into());
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Probe path, falling back to `/health`
    pub fn health_path(&self) -> &str {
        self.health_path.as_deref().unwrap_or(DEFAULT_HEALTH_PATH)
    }

    /// `host:port`, used as the endpoint's identity in metrics and health records
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Base URL including the endpoint path
    pub fn url(&self) -> String {
        format!(
            "{}://{}:{}{}",
            self.protocol.scheme(),
            self.host,
            self.port,
            self.path.trim_end_matches('/')
        )
    }

    /// Full URL for a request path relative to this endpoint
    pub fn url_for(&self, request_path: &str) -> String {
        format!("{}{}", self.url(), request_path)
    }

    fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::invalid_configuration("Endpoint host cannot be empty"));
        }
        if self.port == 0 {
            return Err(Error::invalid_configuration(format!(
                "Endpoint {} has port 0",
                self.host
            )));
        }
        if !self.path.is_empty() && !self.path.starts_with('/') {
            return Err(Error::invalid_configuration(format!(
                "Endpoint path must start with '/': {}",
                self.path
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url())
    }
}

/// A deployable service known to the mesh
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    /// Unique service id
    pub id: String,
    /// Human readable name
    pub name: String,
    /// Service category (e.g. "api", "worker")
    #[serde(default, rename = "type")]
    pub service_type: String,
    /// Deployed version
    #[serde(default)]
    pub version: String,
    /// Ordered endpoint list
    pub endpoints: Vec<Endpoint>,
    /// Ids of services this one calls
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Free-form labels
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl ServiceDescriptor {
    /// Create a descriptor with a single endpoint
    pub fn new<I: Into<String>, N: Into<String>>(id: I, name: N, endpoint: Endpoint) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            service_type: String::new(),
            version: String::new(),
            endpoints: vec![endpoint],
            dependencies: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    /// Set the service type
    pub fn with_type<S: Into<String>>(mut self, service_type: S) -> Self {
        self.service_type = service_type.into();
        self
    }

    /// Set the version
    pub fn with_version<S: Into<String>>(mut self, version: S) -> Self {
        self.version = version.into();
        self
    }

    /// Append an endpoint
    pub fn with_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoints.push(endpoint);
        self
    }

    /// Append a dependency id
    pub fn with_dependency<S: Into<String>>(mut self, service_id: S) -> Self {
        self.dependencies.push(service_id.into());
        self
    }

    /// Check the descriptor before it enters the registry
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::invalid_configuration("Service id cannot be empty"));
        }
        if self.id.len() > MAX_SERVICE_ID_LENGTH {
            return Err(Error::invalid_configuration(format!(
                "Service id exceeds {MAX_SERVICE_ID_LENGTH} characters"
            )));
        }
        if self.id.chars().any(char::is_whitespace) {
            return Err(Error::invalid_configuration(format!(
                "Service id cannot contain whitespace: {:?}",
                self.id
            )));
        }
        if self.name.trim().is_empty() {
            return Err(Error::invalid_configuration("Service name cannot be empty"));
        }
        if self.endpoints.is_empty() {
            return Err(Error::invalid_configuration(format!(
                "Service {} has no endpoints",
                self.id
            )));
        }
        self.endpoints.iter().try_for_each(Endpoint::validate)
    }
}
