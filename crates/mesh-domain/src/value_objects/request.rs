//! Request and response types for dispatched calls

use crate::constants::SUPPORTED_HTTP_METHODS;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// HTTP verbs accepted by the dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
        }
    }

    /// Responses to this method may be served from the response cache
    pub fn is_cacheable(&self) -> bool {
        matches!(self, Self::Get)
    }
}

impl FromStr for HttpMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            "HEAD" => Ok(Self::Head),
            "OPTIONS" => Ok(Self::Options),
            _ => Err(Error::invalid_configuration(format!(
                "Unsupported HTTP method '{s}', expected one of {}",
                SUPPORTED_HTTP_METHODS.join(", ")
            ))),
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A call to be routed to a registered service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRequest {
    /// Target service id
    pub service_id: String,
    /// HTTP verb as supplied by the caller; validated before dispatch
    pub method: String,
    /// Path relative to the endpoint, must start with '/'
    pub path: String,
    /// Extra request headers
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// JSON body
    #[serde(default)]
    pub body: Option<serde_json::Value>,
    /// Per-call timeout overriding the configured call timeout
    #[serde(default)]
    pub timeout: Option<Duration>,
}

impl ServiceRequest {
    pub fn new<S: Into<String>, M: Into<String>, P: Into<String>>(
        service_id: S,
        method: M,
        path: P,
    ) -> Self {
        Self {
            service_id: service_id.into(),
            method: method.into(),
            path: path.into(),
            headers: HashMap::new(),
            body: None,
            timeout: None,
        }
    }

    /// Shorthand for a GET request
    pub fn get<S: Into<String>, P: Into<String>>(service_id: S, path: P) -> Self {
        Self::new(service_id, "GET", path)
    }

    /// Shorthand for a POST request with a JSON body
    pub fn post<S: Into<String>, P: Into<String>>(
        service_id: S,
        path: P,
        body: serde_json::Value,
    ) -> Self {
        Self::new(service_id, "POST", path).with_body(body)
    }

    pub fn with_header<K: Into<String>, V: Into<String>>(mut self, name: K, value: V) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Validate method, path and headers, returning the parsed method
    ///
    /// Runs before any registry lookup or network effect.
    pub fn validate(&self) -> Result<HttpMethod> {
        let method: HttpMethod = self.method.parse()?;

        if !self.path.starts_with('/') {
            return Err(Error::invalid_configuration(format!(
                "Request path must start with '/': {:?}",
                self.path
            )));
        }
        if self.path.chars().any(char::is_whitespace) {
            return Err(Error::invalid_configuration(format!(
                "Request path cannot contain whitespace: {:?}",
                self.path
            )));
        }

        for (name, value) in &self.headers {
            if name.is_empty() || !name.bytes().all(is_header_name_byte) {
                return Err(Error::invalid_configuration(format!(
                    "Invalid header name: {name:?}"
                )));
            }
            if value.contains(['\r', '\n']) {
                return Err(Error::invalid_configuration(format!(
                    "Header {name} contains a line break"
                )));
            }
        }

        if matches!(method, HttpMethod::Get | HttpMethod::Head) && self.body.is_some() {
            return Err(Error::invalid_configuration(format!(
                "{method} requests cannot carry a body"
            )));
        }

        Ok(method)
    }

    /// Key under which a cacheable response for this request is stored
    pub fn cache_key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.service_id,
            self.method.to_ascii_uppercase(),
            self.path
        )
    }
}

// RFC 7230 token characters
fn is_header_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}

/// Result of a dispatched call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceResponse {
    /// HTTP status code
    pub status_code: u16,
    /// Response body; non-JSON bodies are carried as a JSON string
    pub body: serde_json::Value,
    /// Response headers
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Wall time spent producing this response
    pub response_time: Duration,
    /// Served from the response cache
    #[serde(default)]
    pub cached: bool,
    /// Address of the endpoint that answered
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl ServiceResponse {
    pub fn new(status_code: u16, body: serde_json::Value) -> Self {
        Self {
            status_code,
            body,
            headers: HashMap::new(),
            response_time: Duration::ZERO,
            cached: false,
            endpoint: None,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    pub fn is_server_error(&self) -> bool {
        self.status_code >= 500
    }
}
