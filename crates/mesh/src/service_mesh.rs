//! Service mesh facade
//!
//! [`ServiceMesh`] owns one instance of every component and is the only
//! place where they are wired together:
//!
//! | Component | Role |
//! |-----------|------|
//! | [`ServiceRegistry`] | Service descriptors and endpoint selection |
//! | [`CircuitBreakerRegistry`] | One breaker per registered service |
//! | [`ResponseCache`] | GET responses, tagged with the service id |
//! | [`RequestDispatcher`] | The request pipeline and batch sends |
//! | [`HealthMonitor`] | Periodic probes feeding eligibility and breakers |
//! | [`EventBus`] | Fan-out to metrics, logging and alerting observers |
//!
//! Background work (health sweeps, cache upkeep, gauge refreshes) only runs
//! between [`initialize`](ServiceMesh::initialize) and
//! [`stop`](ServiceMesh::stop).

use futures::FutureExt;
use futures::stream::BoxStream;
use mesh_domain::error::{Error, Result};
use mesh_domain::ports::{CacheSnapshotStore, MeshObserver, ServiceTransport};
use mesh_domain::{
    HealthStatus, MeshEvent, MeshEventKind, MeshStatus, ServiceDescriptor, ServiceRequest,
    ServiceResponse,
};
use mesh_infrastructure::ScheduledTask;
use mesh_infrastructure::cache::{
    JsonFileSnapshotStore, ResponseCache, spawn_expiry_sweeper, spawn_snapshotter,
};
use mesh_infrastructure::config::loader::{validate_mesh_config, validate_mesh_options};
use mesh_infrastructure::config::{MeshConfig, MeshConfigUpdate, MeshOptions};
use mesh_infrastructure::dispatch::{ConcurrencyLimiter, RequestDispatcher};
use mesh_infrastructure::events::EventBus;
use mesh_infrastructure::health::{HealthMonitor, HealthSummary};
use mesh_infrastructure::observability::{
    Alert, AlertingObserver, MetricsCollector, ServiceMetrics, StructuredLogger,
};
use mesh_infrastructure::resilience::{CircuitBreakerRegistry, CircuitBreakerSnapshot};
use mesh_infrastructure::routing::ServiceRegistry;
use mesh_infrastructure::transport::HttpTransport;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Tasks alive between `initialize` and `stop`
#[derive(Default)]
struct Background {
    health: Option<ScheduledTask>,
    monitor: Option<ScheduledTask>,
    cache: Vec<ScheduledTask>,
}

impl Background {
    fn drain(&mut self) -> Vec<ScheduledTask> {
        let mut tasks = std::mem::take(&mut self.cache);
        tasks.extend(self.health.take());
        tasks.extend(self.monitor.take());
        tasks
    }
}

/// The service mesh
pub struct ServiceMesh {
    config: RwLock<MeshConfig>,
    registry: Arc<ServiceRegistry>,
    breakers: Arc<CircuitBreakerRegistry>,
    cache: Arc<ResponseCache>,
    limiter: Arc<ConcurrencyLimiter>,
    bus: Arc<EventBus>,
    metrics: Arc<MetricsCollector>,
    alerts: Option<Arc<AlertingObserver>>,
    transport: Arc<dyn ServiceTransport>,
    dispatcher: RequestDispatcher,
    health: Arc<HealthMonitor>,
    snapshot_store: Option<Arc<dyn CacheSnapshotStore>>,
    background: Mutex<Background>,
    running: AtomicBool,
}

impl ServiceMesh {
    /// Build a mesh calling services through `transport`
    ///
    /// Services listed in the configuration are registered immediately;
    /// background monitoring waits for [`initialize`](Self::initialize).
    pub fn new(config: MeshConfig, transport: Arc<dyn ServiceTransport>) -> Result<Self> {
        validate_mesh_config(&config)?;

        let registry = Arc::new(ServiceRegistry::new(&config.load_balancing));
        let breakers = Arc::new(CircuitBreakerRegistry::new(config.circuit_breaker.clone()));
        let cache = Arc::new(ResponseCache::new(&config.cache)?);
        let limiter = Arc::new(ConcurrencyLimiter::new(&config.dispatcher));
        let bus = Arc::new(EventBus::new(config.events.history_capacity));

        let metrics = Arc::new(MetricsCollector::new());
        bus.subscribe(metrics.clone());
        if config.events.structured_logging {
            bus.subscribe(Arc::new(StructuredLogger::new()));
        }
        let alerts = config
            .events
            .alerting
            .then(|| Arc::new(AlertingObserver::new(config.events.alert_capacity)));
        if let Some(alerts) = &alerts {
            bus.subscribe(alerts.clone());
        }

        let dispatcher = RequestDispatcher::new(
            Arc::clone(&registry),
            Arc::clone(&breakers),
            Arc::clone(&cache),
            Arc::clone(&limiter),
            Arc::clone(&transport),
            Arc::clone(&bus),
        );
        let health = Arc::new(HealthMonitor::new(
            Arc::clone(&registry),
            Arc::clone(&breakers),
            Arc::clone(&transport),
            Arc::clone(&bus),
            config.health.clone(),
        ));
        let snapshot_store = config.cache.snapshot_path.as_ref().map(|path| {
            Arc::new(JsonFileSnapshotStore::new(path)) as Arc<dyn CacheSnapshotStore>
        });

        let services = config.services.clone();
        let mesh = Self {
            config: RwLock::new(config),
            registry,
            breakers,
            cache,
            limiter,
            bus,
            metrics,
            alerts,
            transport,
            dispatcher,
            health,
            snapshot_store,
            background: Mutex::new(Background::default()),
            running: AtomicBool::new(false),
        };
        mesh.apply_options(&mesh.options());

        for service in services {
            mesh.register_service(service)?;
        }
        Ok(mesh)
    }

    /// Build a mesh with the pooled HTTP transport described by `config.transport`
    pub fn from_config(config: MeshConfig) -> Result<Self> {
        let transport = Arc::new(HttpTransport::new(&config.transport)?);
        Self::new(config, transport)
    }

    // ---- Lifecycle ----

    /// Start background monitoring
    ///
    /// Restores the cache snapshot when persistence is configured. Calling
    /// this on a running mesh does nothing.
    pub async fn initialize(&self) -> Result<()> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let config = self.config();

        if let Some(store) = &self.snapshot_store {
            match store.load().await {
                Ok(entries) => {
                    let restored = self.cache.restore(entries);
                    info!(restored, "Response cache restored from snapshot");
                }
                Err(e) => warn!(error = %e, "Cache snapshot could not be loaded"),
            }
        }

        let mut background = self.background.lock().await;
        background.cache.push(spawn_expiry_sweeper(
            Arc::clone(&self.cache),
            config.cache.sweep_interval(),
        ));
        if let Some(store) = &self.snapshot_store {
            background.cache.push(spawn_snapshotter(
                Arc::clone(&self.cache),
                Arc::clone(store),
                config.cache.snapshot_interval(),
            ));
        }
        background.monitor = Some(self.spawn_monitor(&config.mesh));
        if config.mesh.enable_health_checks {
            background.health = Some(self.health.start(config.mesh.health_check_interval()));
        }
        drop(background);

        info!(
            services = self.registry.len(),
            health_checks = config.mesh.enable_health_checks,
            "Service mesh started"
        );
        self.bus.publish(MeshEvent::mesh(MeshEventKind::MeshStarted));
        Ok(())
    }

    /// Stop background monitoring and release pooled connections
    ///
    /// Waits for in-flight sweeps, writes a final cache snapshot when
    /// persistence is configured. Calling this on a stopped mesh does nothing.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }

        let tasks = self.background.lock().await.drain();
        for task in &tasks {
            task.stop().await;
        }

        if let Some(store) = &self.snapshot_store {
            if let Err(e) = store.save(&self.cache.export()).await {
                warn!(error = %e, "Final cache snapshot failed");
            }
        }
        self.transport.close().await;

        info!("Service mesh stopped");
        self.bus.publish(MeshEvent::mesh(MeshEventKind::MeshStopped));
    }

    /// Run `f` against an initialized mesh, stopping it on every exit path
    ///
    /// The mesh is stopped when `f` returns, fails or panics; a panic is
    /// resumed after shutdown.
    pub async fn scope<F, Fut, T>(self: &Arc<Self>, f: F) -> Result<T>
    where
        F: FnOnce(Arc<Self>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.initialize().await?;
        let outcome = AssertUnwindSafe(f(Arc::clone(self))).catch_unwind().await;
        self.stop().await;
        match outcome {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    // ---- Services ----

    /// Register a service and create its circuit breaker
    pub fn register_service(&self, descriptor: ServiceDescriptor) -> Result<bool> {
        let descriptor = self.registry.register(descriptor)?;
        self.breakers.get_or_create(&descriptor.id);
        self.bus.publish(MeshEvent::for_service(
            descriptor.id.as_str(),
            MeshEventKind::ServiceRegistered {
                endpoints: descriptor.endpoints.len(),
            },
        ));
        Ok(true)
    }

    /// Remove a service and everything derived from it
    ///
    /// Returns `false` when the id is not registered.
    pub fn unregister_service(&self, service_id: &str) -> Result<bool> {
        let removed = self.registry.unregister_with(service_id, |_| {
            self.breakers.remove(service_id);
            self.health.remove(service_id);
            self.metrics.remove_service(service_id);
            self.limiter.remove_service(service_id);
            let dropped = self.cache.invalidate_tag(service_id);
            debug!(service_id = %service_id, cache_entries = dropped, "Derived state removed");
        });

        match removed {
            Ok(_) => {
                self.bus.publish(MeshEvent::for_service(
                    service_id,
                    MeshEventKind::ServiceUnregistered,
                ));
                Ok(true)
            }
            Err(Error::ServiceNotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Snapshot of the registered services, ordered by id
    pub fn services(&self) -> Vec<Arc<ServiceDescriptor>> {
        self.registry.list()
    }

    pub fn get_service(&self, service_id: &str) -> Result<Arc<ServiceDescriptor>> {
        self.registry.get(service_id)
    }

    // ---- Requests ----

    /// Dispatch one request through the full pipeline
    pub async fn send_request(&self, request: ServiceRequest) -> Result<ServiceResponse> {
        self.dispatcher.send_request(request).await
    }

    /// Dispatch many requests; results arrive in completion order with their index
    pub fn send_batch(
        &self,
        requests: Vec<ServiceRequest>,
    ) -> BoxStream<'_, (usize, Result<ServiceResponse>)> {
        self.dispatcher.send_batch(requests)
    }

    // ---- Health and breakers ----

    /// Latest health classification; `Unknown` before the first sweep
    pub fn get_service_health(&self, service_id: &str) -> Result<HealthStatus> {
        self.health.status(service_id)
    }

    pub fn get_service_health_summary(&self, service_id: &str) -> Result<HealthSummary> {
        self.health.summary(service_id)
    }

    /// Probe every service now, outside the schedule
    pub async fn check_health_now(&self) -> usize {
        self.health.check_now().await
    }

    pub fn get_breaker_state(&self, service_id: &str) -> Result<CircuitBreakerSnapshot> {
        self.ensure_registered(service_id)?;
        Ok(self.breakers.get_or_create(service_id).snapshot())
    }

    /// Force a service's breaker closed
    pub fn reset_breaker(&self, service_id: &str) -> Result<()> {
        self.ensure_registered(service_id)?;
        if let Some(transition) = self.breakers.reset(service_id) {
            info!(service_id = %service_id, from = %transition.from, "Circuit breaker reset");
            self.bus.publish(MeshEvent::for_service(
                transition.service_id,
                MeshEventKind::BreakerStateChanged {
                    from: transition.from,
                    to: transition.to,
                },
            ));
        }
        Ok(())
    }

    // ---- Observability ----

    /// Request counters and current state of one service
    pub fn get_service_metrics(&self, service_id: &str) -> Result<ServiceMetrics> {
        self.ensure_registered(service_id)?;
        let mut metrics = self.metrics.service_metrics(service_id);
        if let Some(breaker) = self.breakers.get(service_id) {
            metrics.circuit_state = Some(breaker.state());
        }
        metrics.health = Some(self.health.status(service_id)?);
        Ok(metrics)
    }

    /// All metrics in Prometheus text exposition format
    pub fn export_metrics_text(&self) -> String {
        self.metrics.render_prometheus()
    }

    /// All metrics as a structured mapping keyed by metric name
    pub fn export_metrics_map(&self) -> serde_json::Value {
        self.metrics.render_map()
    }

    /// Recent events, newest last
    pub fn events(&self, limit: Option<usize>) -> Vec<MeshEvent> {
        self.bus.history(limit)
    }

    /// Alerts raised so far; empty when alerting is disabled
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts
            .as_ref()
            .map(|alerts| alerts.alerts())
            .unwrap_or_default()
    }

    /// Add an observer to the event bus
    pub fn subscribe(&self, observer: Arc<dyn MeshObserver>) {
        self.bus.subscribe(observer);
    }

    pub fn get_mesh_status(&self) -> MeshStatus {
        let (healthy_count, unhealthy_count) = self.health.counts();
        MeshStatus {
            running: self.is_running(),
            services_count: self.registry.len(),
            healthy_count,
            unhealthy_count,
        }
    }

    // ---- Configuration ----

    pub fn get_mesh_config(&self) -> MeshConfig {
        self.config()
    }

    /// Apply a runtime update, returning the names of the options that changed
    ///
    /// The update is validated as a whole before anything is applied.
    /// Interval changes restart the affected background task.
    pub async fn update_mesh_config(&self, update: MeshConfigUpdate) -> Result<Vec<String>> {
        let (changes, options) = {
            let mut config = self.config.write().unwrap_or_else(PoisonError::into_inner);
            let mut options = config.mesh.clone();
            let changes = update.apply(&mut options);
            validate_mesh_options(&options)?;
            config.mesh = options.clone();
            (changes, options)
        };
        if changes.is_empty() {
            return Ok(changes);
        }

        self.apply_options(&options);

        if self.is_running() {
            let mut background = self.background.lock().await;
            if changed(&changes, &["enable_health_checks", "health_check_interval"]) {
                if let Some(task) = background.health.take() {
                    task.stop().await;
                }
                if options.enable_health_checks {
                    background.health = Some(self.health.start(options.health_check_interval()));
                }
            }
            if changed(&changes, &["monitoring_interval"]) {
                if let Some(task) = background.monitor.take() {
                    task.stop().await;
                }
                background.monitor = Some(self.spawn_monitor(&options));
            }
        }

        info!(changes = ?changes, "Mesh configuration updated");
        self.bus.publish(MeshEvent::mesh(MeshEventKind::ConfigUpdated {
            changes: changes.clone(),
        }));
        Ok(changes)
    }

    fn apply_options(&self, options: &MeshOptions) {
        self.registry
            .set_balancing_enabled(options.enable_load_balancing);
        self.dispatcher
            .set_breaker_enabled(options.enable_circuit_breaker);
        self.dispatcher.set_caching_enabled(options.enable_caching);
        self.health.set_breaker_feed(options.enable_circuit_breaker);
        self.metrics.set_enabled(options.enable_metrics);
    }

    fn spawn_monitor(&self, options: &MeshOptions) -> ScheduledTask {
        let registry = Arc::clone(&self.registry);
        let health = Arc::clone(&self.health);
        let limiter = Arc::clone(&self.limiter);
        let cache = Arc::clone(&self.cache);
        let metrics = Arc::clone(&self.metrics);

        ScheduledTask::spawn("mesh-monitor", options.monitoring_interval(), move || {
            let registry = Arc::clone(&registry);
            let health = Arc::clone(&health);
            let limiter = Arc::clone(&limiter);
            let cache = Arc::clone(&cache);
            let metrics = Arc::clone(&metrics);
            async move {
                if metrics.is_enabled() {
                    let (healthy, unhealthy) = health.counts();
                    metrics.set_gauge("services", &[], registry.len() as f64);
                    metrics.set_gauge("services_healthy", &[], healthy as f64);
                    metrics.set_gauge("services_unhealthy", &[], unhealthy as f64);
                    metrics.set_gauge("requests_in_flight", &[], limiter.in_flight() as f64);
                    metrics.set_gauge("cache_entries", &[], cache.len() as f64);
                }
                Ok(())
            }
        })
    }

    fn ensure_registered(&self, service_id: &str) -> Result<()> {
        if self.registry.contains(service_id) {
            Ok(())
        } else {
            Err(Error::service_not_found(service_id))
        }
    }

    fn options(&self) -> MeshOptions {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .mesh
            .clone()
    }

    fn config(&self) -> MeshConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

fn changed(changes: &[String], names: &[&str]) -> bool {
    changes.iter().any(|c| names.contains(&c.as_str()))
}
