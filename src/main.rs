//! pulse-proxy: adaptive backend-selection reverse proxy.
//!
//! Bootstraps the engine: load and validate config, build the state store
//! and selection policy, spawn the prober / poller / weight-persistence
//! tasks, and serve until Ctrl+C.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use pulse_proxy::balancer::{learned, BackendStore, ScoringPolicy, Selector};
use pulse_proxy::config::loader::load_config;
use pulse_proxy::health::{HealthProber, MetricsPoller};
use pulse_proxy::http::HttpServer;
use pulse_proxy::lifecycle::Shutdown;
use pulse_proxy::observability::{logging, metrics};

#[derive(Debug, Parser)]
#[command(name = "pulse-proxy", about = "Adaptive backend-selection reverse proxy")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    logging::init(&config.observability.log_level);

    tracing::info!(
        bind_address = %config.listener.bind_address,
        backends = config.backends.len(),
        policy = ?config.scoring.policy,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let store = Arc::new(BackendStore::from_config(&config.backends));
    let policy = ScoringPolicy::from_config(&config.scoring);
    let selector = Arc::new(Selector::new(store.clone(), policy.clone(), &config.scoring));

    let shutdown = Shutdown::new();
    shutdown.trigger_on_ctrl_c();

    let prober = HealthProber::new(store.clone(), config.probe.clone());
    tokio::spawn(prober.run(shutdown.subscribe()));

    let poller = MetricsPoller::new(store.clone(), config.poll.clone());
    tokio::spawn(poller.run(shutdown.subscribe()));

    if let (Some(model), Some(path)) = (policy.model(), &config.scoring.weights_path) {
        tokio::spawn(learned::run_persistence(
            model.clone(),
            path.clone(),
            Duration::from_millis(config.scoring.persist_interval_ms),
            shutdown.subscribe(),
        ));
    }

    let listener = tokio::net::TcpListener::bind(&config.listener.bind_address).await?;
    let server = HttpServer::new(&config, selector);
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
