//! Service mesh - Entry Point
//!
//! Runs the mesh with the services listed in the configuration until
//! Ctrl-C, exposing metrics on a Prometheus endpoint.

use clap::Parser;
use mesh::init::{RunOptions, run};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Command line interface for the service mesh
#[derive(Parser, Debug)]
#[command(name = "mesh")]
#[command(about = "Service mesh coordination layer")]
#[command(version)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Address of the Prometheus metrics endpoint
    #[arg(long, default_value = "127.0.0.1:9464")]
    pub metrics_addr: SocketAddr,

    /// Validate the configuration, print it as TOML and exit
    #[arg(long)]
    pub check_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    run(RunOptions {
        config_path: cli.config.as_deref(),
        log_level: cli.log_level.as_deref(),
        metrics_addr: Some(cli.metrics_addr),
        check_config: cli.check_config,
    })
    .await
}
