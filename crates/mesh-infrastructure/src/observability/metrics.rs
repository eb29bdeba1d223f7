//! Metrics collector
//!
//! Keeps its own registry of labeled counters, gauges and bucketed
//! histograms so the mesh can export them on demand, in Prometheus text
//! format or as a structured mapping. Every update is mirrored through the
//! `metrics` facade, so an installed exporter sees the same series.

use crate::constants::{METRICS_PREFIX, RESPONSE_TIME_BUCKETS};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use mesh_domain::error::Result;
use mesh_domain::ports::{MeshObserver, ObserverRole};
use mesh_domain::{CircuitState, HealthStatus, MeshEvent, MeshEventKind};
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};

/// Kind of a metric series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
}

impl MetricKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Counter => "counter",
            Self::Gauge => "gauge",
            Self::Histogram => "histogram",
        }
    }
}

/// One exported series
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSample {
    pub name: String,
    pub kind: MetricKind,
    pub labels: BTreeMap<String, String>,
    /// Counter or gauge value; histogram sum
    pub value: f64,
    /// Histogram observations per bucket upper bound, cumulative
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buckets: Option<Vec<(f64, u64)>>,
    /// Histogram observation count
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    pub timestamp: DateTime<Utc>,
}

/// Per-service view assembled from the collected series
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ServiceMetrics {
    pub service_id: String,
    pub requests_total: u64,
    pub requests_failed: u64,
    pub requests_rejected: u64,
    pub cache_hits: u64,
    pub average_response_time_ms: f64,
    pub error_rate: f64,
    pub circuit_state: Option<CircuitState>,
    pub breaker_transitions: u64,
    pub health: Option<HealthStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct SeriesKey {
    name: String,
    labels: Vec<(String, String)>,
}

impl SeriesKey {
    fn new(name: &str, labels: &[(&str, &str)]) -> Self {
        let mut labels: Vec<(String, String)> = labels
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        labels.sort();
        Self {
            name: format!("{METRICS_PREFIX}_{name}"),
            labels,
        }
    }

    fn label(&self, key: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn facade_labels(&self) -> Vec<metrics::Label> {
        self.labels
            .iter()
            .map(|(k, v)| metrics::Label::new(k.clone(), v.clone()))
            .collect()
    }
}

#[derive(Debug, Clone)]
struct Histogram {
    counts: Vec<u64>,
    count: u64,
    sum: f64,
}

impl Histogram {
    fn new() -> Self {
        Self {
            counts: vec![0; RESPONSE_TIME_BUCKETS.len()],
            count: 0,
            sum: 0.0,
        }
    }

    fn observe(&mut self, value: f64) {
        if let Some(i) = RESPONSE_TIME_BUCKETS.iter().position(|&le| value <= le) {
            self.counts[i] += 1;
        }
        self.count += 1;
        self.sum += value;
    }

    fn cumulative(&self) -> Vec<(f64, u64)> {
        let mut running = 0;
        RESPONSE_TIME_BUCKETS
            .iter()
            .zip(&self.counts)
            .map(|(&le, &n)| {
                running += n;
                (le, running)
            })
            .collect()
    }
}

/// Metrics observer and registry
pub struct MetricsCollector {
    counters: DashMap<SeriesKey, u64>,
    gauges: DashMap<SeriesKey, f64>,
    histograms: DashMap<SeriesKey, Histogram>,
    enabled: AtomicBool,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            counters: DashMap::new(),
            gauges: DashMap::new(),
            histograms: DashMap::new(),
            enabled: AtomicBool::new(true),
        }
    }

    /// Ignore events while disabled; recorded series are kept
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Add `value` to a monotonic counter
    pub fn increment_counter(&self, name: &str, labels: &[(&str, &str)], value: u64) {
        let key = SeriesKey::new(name, labels);
        metrics::counter!(key.name.clone(), key.facade_labels()).increment(value);
        *self.counters.entry(key).or_insert(0) += value;
    }

    /// Set a gauge to `value`
    pub fn set_gauge(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        let key = SeriesKey::new(name, labels);
        metrics::gauge!(key.name.clone(), key.facade_labels()).set(value);
        self.gauges.insert(key, value);
    }

    /// Record one histogram observation
    pub fn observe_histogram(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        let key = SeriesKey::new(name, labels);
        metrics::histogram!(key.name.clone(), key.facade_labels()).record(value);
        self.histograms
            .entry(key)
            .or_insert_with(Histogram::new)
            .observe(value);
    }

    /// Current value of a counter, summed over series whose labels include `labels`
    pub fn counter_value(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        let name = format!("{METRICS_PREFIX}_{name}");
        self.counters
            .iter()
            .filter(|e| e.key().name == name && has_labels(e.key(), labels))
            .map(|e| *e.value())
            .sum()
    }

    /// Current value of a gauge series
    pub fn gauge_value(&self, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
        self.gauges
            .get(&SeriesKey::new(name, labels))
            .map(|v| *v.value())
    }

    /// All series, ordered by name then labels
    pub fn snapshot(&self) -> Vec<MetricSample> {
        let now = Utc::now();
        let mut samples: Vec<(SeriesKey, MetricSample)> = Vec::new();

        for entry in &self.counters {
            samples.push((
                entry.key().clone(),
                sample(entry.key(), MetricKind::Counter, *entry.value() as f64, now),
            ));
        }
        for entry in &self.gauges {
            samples.push((
                entry.key().clone(),
                sample(entry.key(), MetricKind::Gauge, *entry.value(), now),
            ));
        }
        for entry in &self.histograms {
            let hist = entry.value();
            let mut s = sample(entry.key(), MetricKind::Histogram, hist.sum, now);
            s.buckets = Some(hist.cumulative());
            s.count = Some(hist.count);
            samples.push((entry.key().clone(), s));
        }

        samples.sort_by(|a, b| a.0.cmp(&b.0));
        samples.into_iter().map(|(_, s)| s).collect()
    }

    /// Prometheus text exposition of every series
    pub fn render_prometheus(&self) -> String {
        let mut out = String::new();
        let mut current: Option<String> = None;

        for s in self.snapshot() {
            if current.as_deref() != Some(s.name.as_str()) {
                let _ = writeln!(out, "# TYPE {} {}", s.name, s.kind.as_str());
                current = Some(s.name.clone());
            }
            match s.kind {
                MetricKind::Counter | MetricKind::Gauge => {
                    let _ = writeln!(
                        out,
                        "{}{} {}",
                        s.name,
                        format_labels(&s.labels, None),
                        s.value
                    );
                }
                MetricKind::Histogram => {
                    let count = s.count.unwrap_or(0);
                    for (le, n) in s.buckets.iter().flatten() {
                        let _ = writeln!(
                            out,
                            "{}_bucket{} {n}",
                            s.name,
                            format_labels(&s.labels, Some(&le.to_string()))
                        );
                    }
                    let _ = writeln!(
                        out,
                        "{}_bucket{} {count}",
                        s.name,
                        format_labels(&s.labels, Some("+Inf"))
                    );
                    let plain = format_labels(&s.labels, None);
                    let _ = writeln!(out, "{}_sum{plain} {}", s.name, s.value);
                    let _ = writeln!(out, "{}_count{plain} {count}", s.name);
                }
            }
        }
        out
    }

    /// The same data as [`render_prometheus`](Self::render_prometheus) as a JSON mapping
    ///
    /// `{ name: { "type": kind, "series": [ { "labels": {..}, "value": v, .. } ] } }`
    pub fn render_map(&self) -> Value {
        let mut root = Map::new();
        for s in self.snapshot() {
            let metric = root
                .entry(s.name.clone())
                .or_insert_with(|| json!({ "type": s.kind, "series": [] }));
            let mut series = json!({ "labels": s.labels, "value": s.value });
            if let Some(buckets) = &s.buckets {
                series["buckets"] = buckets
                    .iter()
                    .map(|(le, n)| json!({ "le": le, "count": n }))
                    .collect();
                series["count"] = json!(s.count.unwrap_or(0));
            }
            if let Some(list) = metric.get_mut("series").and_then(Value::as_array_mut) {
                list.push(series);
            }
        }
        Value::Object(root)
    }

    /// Per-service summary
    pub fn service_metrics(&self, service_id: &str) -> ServiceMetrics {
        let svc = [("service", service_id)];
        let requests_total = self.counter_value("requests_total", &svc);
        let requests_failed = self.counter_value(
            "request_failures_total",
            &[("service", service_id), ("reason", "error")],
        );
        let requests_rejected = self.counter_value(
            "request_failures_total",
            &[("service", service_id), ("reason", "rejected")],
        );
        let (sum, count) = self
            .histograms
            .get(&SeriesKey::new("response_time_seconds", &svc))
            .map_or((0.0, 0), |h| (h.sum, h.count));
        let attempted = requests_total + requests_failed;

        ServiceMetrics {
            service_id: service_id.to_string(),
            requests_total,
            requests_failed,
            requests_rejected,
            cache_hits: self.counter_value("cache_hits_total", &svc),
            average_response_time_ms: if count == 0 {
                0.0
            } else {
                sum / count as f64 * 1000.0
            },
            error_rate: if attempted == 0 {
                0.0
            } else {
                requests_failed as f64 / attempted as f64
            },
            circuit_state: self
                .gauge_value("circuit_breaker_state", &svc)
                .map(circuit_from_gauge),
            breaker_transitions: self.counter_value("circuit_breaker_transitions_total", &svc),
            health: self
                .gauge_value("service_health", &svc)
                .map(health_from_score),
        }
    }

    /// Drop every series labeled with `service_id`
    pub fn remove_service(&self, service_id: &str) {
        let owned = |key: &SeriesKey| key.label("service") == Some(service_id);
        self.counters.retain(|k, _| !owned(k));
        self.gauges.retain(|k, _| !owned(k));
        self.histograms.retain(|k, _| !owned(k));
    }

    /// Number of distinct series
    pub fn series_count(&self) -> usize {
        self.counters.len() + self.gauges.len() + self.histograms.len()
    }

    fn record_event(&self, event: &MeshEvent) {
        self.increment_counter("events_total", &[("type", event.name())], 1);
        let service = event.service_id.as_deref().unwrap_or("");

        match &event.kind {
            MeshEventKind::RequestCompleted {
                method,
                status_code,
                response_time_ms,
                cached,
                ..
            } => {
                let status = status_code.to_string();
                self.increment_counter(
                    "requests_total",
                    &[
                        ("service", service),
                        ("method", method.as_str()),
                        ("status", status.as_str()),
                    ],
                    1,
                );
                if *cached {
                    self.increment_counter("cache_hits_total", &[("service", service)], 1);
                } else {
                    self.observe_histogram(
                        "response_time_seconds",
                        &[("service", service)],
                        response_time_ms / 1000.0,
                    );
                }
            }
            MeshEventKind::RequestFailed { rejected, .. } => {
                let reason = if *rejected { "rejected" } else { "error" };
                self.increment_counter(
                    "request_failures_total",
                    &[("service", service), ("reason", reason)],
                    1,
                );
            }
            MeshEventKind::BreakerStateChanged { to, .. } => {
                let to_label = to.to_string();
                self.increment_counter(
                    "circuit_breaker_transitions_total",
                    &[("service", service), ("to", to_label.as_str())],
                    1,
                );
                self.set_gauge("circuit_breaker_state", &[("service", service)], to.gauge_value());
            }
            MeshEventKind::HealthChanged { to, .. } => {
                self.set_gauge("service_health", &[("service", service)], to.score());
            }
            MeshEventKind::CacheEvicted { .. } => {
                self.increment_counter("cache_evictions_total", &[], 1);
            }
            MeshEventKind::ServiceRegistered { .. } => {
                self.set_gauge("circuit_breaker_state", &[("service", service)], 0.0);
            }
            MeshEventKind::ServiceUnregistered => self.remove_service(service),
            MeshEventKind::MeshStarted => self.set_gauge("running", &[], 1.0),
            MeshEventKind::MeshStopped => self.set_gauge("running", &[], 0.0),
            MeshEventKind::ConfigUpdated { .. } => {}
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MeshObserver for MetricsCollector {
    fn name(&self) -> &str {
        "metrics"
    }

    fn role(&self) -> ObserverRole {
        ObserverRole::Metrics
    }

    fn update(&self, event: &MeshEvent) -> Result<()> {
        if self.is_enabled() {
            self.record_event(event);
        }
        Ok(())
    }
}

fn sample(key: &SeriesKey, kind: MetricKind, value: f64, timestamp: DateTime<Utc>) -> MetricSample {
    MetricSample {
        name: key.name.clone(),
        kind,
        labels: key.labels.iter().cloned().collect(),
        value,
        buckets: None,
        count: None,
        timestamp,
    }
}

fn has_labels(key: &SeriesKey, wanted: &[(&str, &str)]) -> bool {
    wanted.iter().all(|(k, v)| key.label(k) == Some(*v))
}

fn format_labels(labels: &BTreeMap<String, String>, le: Option<&str>) -> String {
    let mut parts: Vec<String> = labels
        .iter()
        .map(|(k, v)| format!("{k}=\"{}\"", escape_label(v)))
        .collect();
    if let Some(le) = le {
        parts.push(format!("le=\"{le}\""));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!("{{{}}}", parts.join(","))
    }
}

fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

fn circuit_from_gauge(value: f64) -> CircuitState {
    if value >= 1.0 {
        CircuitState::Open
    } else if value > 0.0 {
        CircuitState::HalfOpen
    } else {
        CircuitState::Closed
    }
}

fn health_from_score(score: f64) -> HealthStatus {
    if score >= 1.0 {
        HealthStatus::Healthy
    } else if score >= 0.5 {
        HealthStatus::Degraded
    } else if score >= 0.0 {
        HealthStatus::Unhealthy
    } else {
        HealthStatus::Unknown
    }
}
