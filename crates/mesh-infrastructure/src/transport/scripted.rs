//! In-memory transport with scripted replies
//!
//! Every endpoint answers with the default reply unless a reply was scripted
//! for its address. Replies can be changed while calls are running, which
//! lets tests take a backend down and bring it back. Calls are recorded and
//! in-flight concurrency is tracked.

use async_trait::async_trait;
use mesh_domain::error::{Error, Result};
use mesh_domain::ports::{OutboundRequest, ServiceTransport, TransportResponse};
use mesh_domain::{Endpoint, HttpMethod};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// How a scripted endpoint answers
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptedReply {
    status_code: u16,
    body: serde_json::Value,
    delay: Duration,
    failure: Option<String>,
}

impl ScriptedReply {
    /// 200 with `body`
    pub fn ok(body: serde_json::Value) -> Self {
        Self::status(200).with_body(body)
    }

    /// Empty response with `status_code`
    pub fn status(status_code: u16) -> Self {
        Self {
            status_code,
            body: serde_json::Value::Null,
            delay: Duration::ZERO,
            failure: None,
        }
    }

    /// No response: the call fails as a network error
    pub fn failure<S: Into<String>>(message: S) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::status(0)
        }
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = body;
        self
    }

    /// Wait before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl Default for ScriptedReply {
    fn default() -> Self {
        Self::ok(serde_json::json!({}))
    }
}

/// A call seen by the transport
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub address: String,
    pub method: HttpMethod,
    pub path: String,
}

#[derive(Default)]
struct Script {
    default: ScriptedReply,
    by_address: HashMap<String, ScriptedReply>,
    calls: Vec<RecordedCall>,
}

/// Scripted backend
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<Script>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every unscripted endpoint answers with `reply`
    pub fn with_default(self, reply: ScriptedReply) -> Self {
        self.set_default(reply);
        self
    }

    /// Endpoint `address` (`host:port`) answers with `reply`
    pub fn with_reply<S: Into<String>>(self, address: S, reply: ScriptedReply) -> Self {
        self.set_reply(address, reply);
        self
    }

    pub fn set_default(&self, reply: ScriptedReply) {
        self.lock().default = reply;
    }

    pub fn set_reply<S: Into<String>>(&self, address: S, reply: ScriptedReply) {
        self.lock().by_address.insert(address.into(), reply);
    }

    /// Every call so far, including health probes
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    /// Calls whose path is `path`
    pub fn calls_to(&self, path: &str) -> usize {
        self.lock().calls.iter().filter(|c| c.path == path).count()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Highest number of calls that were running at once
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::Acquire)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ServiceTransport for ScriptedTransport {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn execute(
        &self,
        endpoint: &Endpoint,
        request: OutboundRequest,
    ) -> Result<TransportResponse> {
        let address = endpoint.address();
        let reply = {
            let mut script = self.lock();
            script.calls.push(RecordedCall {
                address: address.clone(),
                method: request.method,
                path: request.path.clone(),
            });
            script
                .by_address
                .get(&address)
                .unwrap_or(&script.default)
                .clone()
        };

        let running = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak.fetch_max(running, Ordering::AcqRel);
        let _guard = InFlight(&self.in_flight);

        if !reply.delay.is_zero() {
            tokio::time::sleep(reply.delay).await;
        }
        match reply.failure {
            Some(message) => Err(Error::network(format!("{address}: {message}"))),
            None => Ok(TransportResponse::new(reply.status_code, reply.body)),
        }
    }
}
