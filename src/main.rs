//! lbwatch - live health-state synchronization for load-balancer services
//!
//! Usage:
//!     lbwatch [--config <path>]
//!
//! See --help for more options.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use lbwatch::api::StatusServer;
use lbwatch::client::HttpSnapshotClient;
use lbwatch::config::{load_config, parse_config, validate_config, Config};
use lbwatch::live::{ConnectionManager, ManagerSettings, WebSocketConnector};
use lbwatch::metrics::MetricsCollector;
use lbwatch::state::ServiceStore;
use lbwatch::util::{init_logging, ShutdownSignal};

/// Keeps a live view of load-balancer health in sync with its producer.
#[derive(Parser, Debug)]
#[command(name = "lbwatch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file (defaults apply when omitted)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Override the producer HTTP API base URL
    #[arg(long, value_name = "URL")]
    api_url: Option<String>,

    /// Override the producer update channel URL
    #[arg(long, value_name = "URL")]
    channel_url: Option<String>,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path).with_context(|| {
            format!("failed to load configuration from '{}'", path.display())
        })?,
        None => parse_config("").context("default configuration is invalid")?,
    };

    // CLI overrides config
    if let Some(level) = cli.log_level {
        config.global.log_level = level;
    }
    if let Some(url) = cli.api_url {
        config.producer.api_url = url;
    }
    if let Some(url) = cli.channel_url {
        config.producer.channel_url = url;
    }
    validate_config(&config)
        .map_err(anyhow::Error::msg)
        .context("invalid configuration")?;

    init_logging(&config.global.log_level, &config.global.log_format)
        .context("failed to initialize logging")?;

    if cli.validate {
        info!("Configuration is valid");
        println!("Configuration is valid.");
        println!("  API: {}", config.producer.api_url);
        println!("  Channel: {}", config.producer.channel_url);
        println!("  Merge policy: {:?}", config.merge_policy);
        if config.server.enabled {
            println!("  Status server: {}", config.server.address);
        }
        return Ok(());
    }

    info!(
        api_url = %config.producer.api_url,
        channel_url = %config.producer.channel_url,
        merge_policy = ?config.merge_policy,
        "lbwatch starting"
    );

    run(config)
}

/// Run the synchronizer with the given configuration.
fn run(config: Config) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    runtime.block_on(async { run_async(config).await })
}

async fn run_async(config: Config) -> Result<()> {
    let shutdown = ShutdownSignal::new();
    let metrics = MetricsCollector::new();
    let store = Arc::new(ServiceStore::with_policy(config.merge_policy));

    let fetcher = HttpSnapshotClient::new(&config.producer.api_url, config.producer.fetch_timeout)
        .context("failed to create snapshot client")?;
    let connector = WebSocketConnector::new(config.producer.channel_url.clone());

    let (manager, handle) = ConnectionManager::new(
        connector,
        fetcher,
        store,
        ManagerSettings::from_config(&config),
    );
    let manager = manager.with_metrics(metrics.clone());

    let mut handles = vec![tokio::spawn(manager.run(shutdown.subscribe()))];

    if config.server.enabled {
        let server = StatusServer::new(
            config.server.address,
            config.server.metrics_path.clone(),
            handle.clone(),
            metrics,
        );
        handles.push(tokio::spawn(server.run(shutdown.subscribe())));
    }

    info!("lbwatch is running");
    info!("press Ctrl+C to stop");

    shutdown.shutdown_on_ctrl_c().await;

    for task in handles {
        match tokio::time::timeout(Duration::from_secs(5), task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "task failed during shutdown"),
            Err(_) => warn!("task did not stop in time"),
        }
    }

    info!(services = handle.services().len(), "lbwatch shut down complete");
    Ok(())
}
