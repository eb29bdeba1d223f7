//! Binary startup
//!
//! Loads configuration, installs logging and the Prometheus exporter, then
//! runs the mesh until Ctrl-C. The mesh is stopped on every exit path.
//!
//! # Configuration
//!
//! Sources are layered: defaults, then the TOML file (`--config` or the
//! first of `mesh.toml`, `mesh/mesh.toml`, the user config dir), then
//! `MESH__` environment variables such as `MESH__DISPATCHER__MAX_CONCURRENT_REQUESTS=50`.

use crate::ServiceMesh;
use anyhow::Context;
use mesh_domain::error::Error;
use mesh_infrastructure::config::loader::validate_mesh_config;
use mesh_infrastructure::config::{ConfigLoader, MeshConfig};
use mesh_infrastructure::logging::{init_logging, parse_log_level};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// What the binary was asked to do
#[derive(Debug, Clone, Default)]
pub struct RunOptions<'a> {
    /// Explicit configuration file
    pub config_path: Option<&'a Path>,
    /// Overrides `logging.level`
    pub log_level: Option<&'a str>,
    /// Serve the Prometheus exporter here when metrics are enabled
    pub metrics_addr: Option<SocketAddr>,
    /// Validate and print the effective configuration, then exit
    pub check_config: bool,
}

/// Run the mesh until interrupted
pub async fn run(options: RunOptions<'_>) -> anyhow::Result<()> {
    let config = load_config(options.config_path, options.log_level)?;

    if options.check_config {
        validate_mesh_config(&config)?;
        let rendered =
            toml::to_string_pretty(&config).context("Failed to render configuration")?;
        println!("{rendered}");
        return Ok(());
    }

    init_logging(&config.logging)?;

    if config.mesh.enable_metrics {
        if let Some(addr) = options.metrics_addr {
            PrometheusBuilder::new()
                .with_http_listener(addr)
                .install()
                .context("Failed to install Prometheus exporter")?;
            info!(address = %addr, "Prometheus exporter listening");
        }
    }

    info!(
        services = config.services.len(),
        policy = %config.load_balancing.policy,
        max_concurrent_requests = config.dispatcher.max_concurrent_requests,
        "Starting service mesh"
    );

    let mesh = Arc::new(ServiceMesh::from_config(config)?);
    mesh.scope(|mesh| async move {
        let status = mesh.get_mesh_status();
        info!(services = status.services_count, "Service mesh running, press Ctrl-C to stop");
        tokio::signal::ctrl_c()
            .await
            .map_err(|e| Error::io(format!("Failed to listen for Ctrl-C: {e}")))?;
        info!("Shutdown requested");
        Ok(())
    })
    .await?;
    Ok(())
}

/// Load configuration from an optional path, applying the log level override
fn load_config(config_path: Option<&Path>, log_level: Option<&str>) -> anyhow::Result<MeshConfig> {
    let loader = match config_path {
        Some(path) => ConfigLoader::new().with_config_path(path),
        None => ConfigLoader::new(),
    };
    let mut config = loader.load()?;
    if let Some(level) = log_level {
        parse_log_level(level)?;
        config.logging.level = level.to_string();
    }
    Ok(config)
}
