//! Configuration loader
//!
//! Loads [`MeshConfig`] from defaults, a TOML file and environment variables
//! using Figment, then validates it.

use crate::config::{MeshConfig, MeshOptions};
use crate::constants::{CONFIG_ENV_PREFIX, DEFAULT_CONFIG_DIR, DEFAULT_CONFIG_FILENAME};
use crate::error_ext::ErrorContext;
use crate::logging::{log_config_loaded, parse_log_level};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use mesh_domain::ServiceDescriptor;
use mesh_domain::error::{Error, Result};
use std::collections::HashSet;
use std::env;
use std::path::{Path, PathBuf};

/// Configuration loader service
#[derive(Clone)]
pub struct ConfigLoader {
    /// Configuration file path
    config_path: Option<PathBuf>,

    /// Environment prefix
    env_prefix: String,
}

impl ConfigLoader {
    /// Create a new configuration loader with default settings
    pub fn new() -> Self {
        Self {
            config_path: None,
            env_prefix: CONFIG_ENV_PREFIX.to_string(),
        }
    }

    /// Set the configuration file path
    pub fn with_config_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Set the environment variable prefix
    pub fn with_env_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Load configuration from all sources
    ///
    /// Sources are merged in this order (later sources override earlier):
    /// 1. Default values from `MeshConfig::default()`
    /// 2. TOML configuration file (explicit path, or the first default location found)
    /// 3. Environment variables such as `MESH__DISPATCHER__MAX_CONCURRENT_REQUESTS`
    pub fn load(&self) -> Result<MeshConfig> {
        let mut figment = Figment::new().merge(Serialized::defaults(MeshConfig::default()));

        if let Some(config_path) = &self.config_path {
            if config_path.exists() {
                figment = figment.merge(Toml::file(config_path));
                log_config_loaded(config_path, true);
            } else {
                log_config_loaded(config_path, false);
            }
        } else if let Some(default_path) = Self::find_default_config_path() {
            figment = figment.merge(Toml::file(&default_path));
            log_config_loaded(&default_path, true);
        }

        // Double underscore separates nested keys
        figment = figment.merge(Env::prefixed(&format!("{}__", self.env_prefix)).split("__"));

        let config: MeshConfig = figment
            .extract()
            .config_context("Failed to extract configuration")?;

        validate_mesh_config(&config)?;

        Ok(config)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, config: &MeshConfig, path: P) -> Result<()> {
        let toml_string =
            toml::to_string_pretty(config).config_context("Failed to serialize config to TOML")?;

        std::fs::write(path.as_ref(), toml_string).io_context("Failed to write config file")?;

        Ok(())
    }

    /// Get the current configuration file path
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    fn find_default_config_path() -> Option<PathBuf> {
        let current_dir = env::current_dir().ok()?;

        let candidates = [
            Some(current_dir.join(DEFAULT_CONFIG_FILENAME)),
            Some(
                current_dir
                    .join(DEFAULT_CONFIG_DIR)
                    .join(DEFAULT_CONFIG_FILENAME),
            ),
            dirs::config_dir().map(|d| d.join(DEFAULT_CONFIG_DIR).join(DEFAULT_CONFIG_FILENAME)),
        ];

        candidates.into_iter().flatten().find(|path| path.exists())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate every configuration section
pub fn validate_mesh_config(config: &MeshConfig) -> Result<()> {
    validate_mesh_options(&config.mesh)?;
    validate_circuit_breaker_config(config)?;
    validate_cache_config(config)?;
    validate_dispatcher_config(config)?;
    validate_health_config(config)?;
    validate_events_config(config)?;
    parse_log_level(&config.logging.level)?;
    validate_services(&config.services)?;
    Ok(())
}

/// Validate the toggles and intervals that can change at runtime
pub fn validate_mesh_options(options: &MeshOptions) -> Result<()> {
    if options.health_check_interval_ms == 0 {
        return Err(Error::configuration("Health check interval cannot be 0"));
    }
    if options.monitoring_interval_ms == 0 {
        return Err(Error::configuration("Monitoring interval cannot be 0"));
    }
    Ok(())
}

fn validate_circuit_breaker_config(config: &MeshConfig) -> Result<()> {
    let breaker = &config.circuit_breaker;
    if breaker.failure_threshold == 0 {
        return Err(Error::configuration(
            "Circuit breaker failure threshold cannot be 0",
        ));
    }
    if breaker.success_threshold == 0 {
        return Err(Error::configuration(
            "Circuit breaker success threshold cannot be 0",
        ));
    }
    if breaker.recovery_timeout_ms == 0 {
        return Err(Error::configuration(
            "Circuit breaker recovery timeout cannot be 0",
        ));
    }
    if breaker.call_timeout_ms == 0 {
        return Err(Error::configuration("Call timeout cannot be 0"));
    }
    Ok(())
}

fn validate_cache_config(config: &MeshConfig) -> Result<()> {
    let cache = &config.cache;
    if cache.max_entries == 0 {
        return Err(Error::configuration("Cache capacity cannot be 0"));
    }
    if cache.default_ttl_secs == 0 {
        return Err(Error::configuration("Cache TTL cannot be 0"));
    }
    if cache.sweep_interval_secs == 0 {
        return Err(Error::configuration("Cache sweep interval cannot be 0"));
    }
    if cache.snapshot_path.is_some() && cache.snapshot_interval_secs == 0 {
        return Err(Error::configuration(
            "Cache snapshot interval cannot be 0 when persistence is enabled",
        ));
    }
    Ok(())
}

fn validate_dispatcher_config(config: &MeshConfig) -> Result<()> {
    let dispatcher = &config.dispatcher;
    if dispatcher.max_concurrent_requests == 0 {
        return Err(Error::configuration(
            "Maximum concurrent requests cannot be 0",
        ));
    }
    if dispatcher.max_concurrent_per_service == Some(0) {
        return Err(Error::configuration(
            "Per-service concurrency limit cannot be 0",
        ));
    }
    if dispatcher.acquire_timeout_ms == 0 {
        return Err(Error::configuration("Slot acquire timeout cannot be 0"));
    }
    Ok(())
}

fn validate_health_config(config: &MeshConfig) -> Result<()> {
    if config.health.probe_timeout_ms == 0 {
        return Err(Error::configuration("Health probe timeout cannot be 0"));
    }
    Ok(())
}

fn validate_events_config(config: &MeshConfig) -> Result<()> {
    if config.events.alerting && config.events.alert_capacity == 0 {
        return Err(Error::configuration(
            "Alert capacity cannot be 0 when alerting is enabled",
        ));
    }
    Ok(())
}

fn validate_services(services: &[ServiceDescriptor]) -> Result<()> {
    let mut seen = HashSet::new();
    for service in services {
        service.validate().map_err(|e| {
            Error::configuration(format!("Invalid service '{}': {e}", service.id))
        })?;
        if !seen.insert(service.id.as_str()) {
            return Err(Error::configuration(format!(
                "Service '{}' is configured more than once",
                service.id
            )));
        }
    }
    Ok(())
}

/// Configuration builder for programmatic configuration
pub struct ConfigBuilder {
    config: MeshConfig,
}

impl ConfigBuilder {
    /// Create a new configuration builder with defaults
    pub fn new() -> Self {
        Self {
            config: MeshConfig::default(),
        }
    }

    /// Set the mesh options
    pub fn with_mesh(mut self, mesh: MeshOptions) -> Self {
        self.config.mesh = mesh;
        self
    }

    /// Set circuit breaker configuration
    pub fn with_circuit_breaker(mut self, breaker: crate::config::CircuitBreakerConfig) -> Self {
        self.config.circuit_breaker = breaker;
        self
    }

    /// Set cache configuration
    pub fn with_cache(mut self, cache: crate::config::CacheConfig) -> Self {
        self.config.cache = cache;
        self
    }

    /// Set dispatcher configuration
    pub fn with_dispatcher(mut self, dispatcher: crate::config::DispatcherConfig) -> Self {
        self.config.dispatcher = dispatcher;
        self
    }

    /// Set health configuration
    pub fn with_health(mut self, health: crate::config::HealthConfig) -> Self {
        self.config.health = health;
        self
    }

    /// Set events configuration
    pub fn with_events(mut self, events: crate::config::EventsConfig) -> Self {
        self.config.events = events;
        self
    }

    /// Set load balancing configuration
    pub fn with_load_balancing(mut self, lb: crate::config::LoadBalancingConfig) -> Self {
        self.config.load_balancing = lb;
        self
    }

    /// Set logging configuration
    pub fn with_logging(mut self, logging: crate::config::LoggingConfig) -> Self {
        self.config.logging = logging;
        self
    }

    /// Set the HTTP transport configuration
    pub fn with_transport(mut self, transport: crate::config::TransportConfig) -> Self {
        self.config.transport = transport;
        self
    }

    /// Add a service registered at startup
    pub fn with_service(mut self, service: ServiceDescriptor) -> Self {
        self.config.services.push(service);
        self
    }

    /// Build the configuration
    pub fn build(self) -> MeshConfig {
        self.config
    }

    /// Build and validate the configuration
    pub fn build_validated(self) -> Result<MeshConfig> {
        validate_mesh_config(&self.config)?;
        Ok(self.config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
