//! Simulator binary for Clickstream.
//!
//! Wires the sitemap, the worker supervisor and the NATS producers together
//! and runs until interrupted (or until every worker reaches its tick
//! limit).
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `clickstream-config.yaml` (or the path in
//!    `CLICKSTREAM_CONFIG`) and apply environment overrides
//! 2. Initialize structured logging (tracing)
//! 3. Load the sitemap and build the site tree
//! 4. Connect one NATS producer per worker and start the workers
//! 5. Wait for SIGINT/SIGTERM, then stop and drain every worker

mod error;

use std::path::PathBuf;
use std::sync::Arc;

use clickstream_core::{ClickstreamConfig, LoggingConfig, Supervisor};
use clickstream_producer::NatsProducerFactory;
use clickstream_site::{SiteTree, load_paths};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;

/// Default configuration file, relative to the working directory.
const DEFAULT_CONFIG_PATH: &str = "clickstream-config.yaml";

/// Application entry point for the simulator.
///
/// # Errors
///
/// Returns an error if configuration, the sitemap or a broker connection
/// cannot be set up, or if any worker fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::var_os("CLICKSTREAM_CONFIG")
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    let (config, from_file) = ClickstreamConfig::load(&config_path, |name| std::env::var(name).ok())
        .map_err(EngineError::from)?;

    init_tracing(&config.logging);
    info!("clickstream-engine starting");
    if from_file {
        info!(path = %config_path.display(), "Configuration loaded");
    } else {
        info!(path = %config_path.display(), "Config file not found, using defaults");
    }

    let paths = load_paths(&config.simulation.sitemap_source).await?;
    let site = Arc::new(SiteTree::build_from_paths(&paths));
    info!(
        source = config.simulation.sitemap_source,
        paths = paths.len(),
        pages = site.len(),
        leaves = site.leaf_count(),
        "Site tree built"
    );

    let seed = config.simulation.seed.unwrap_or_else(rand::random);
    let worker_count = config.simulation.worker_count();
    info!(
        workers = worker_count,
        max_users_per_worker = config.simulation.max_users_per_worker,
        brokers = config.producer.brokers.join(","),
        topic = config.producer.topic,
        seed = seed,
        "Starting workers"
    );

    let factory = NatsProducerFactory::new(config.producer.clone());
    let supervisor = Supervisor::start(
        worker_count,
        Arc::clone(&site),
        config.worker_config(),
        seed,
        &factory,
    )
    .await
    .map_err(EngineError::from)?;

    let stop = supervisor.stop_handle();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        info!("Shutdown signal received, stopping workers");
        stop.stop();
    });

    let reports = supervisor.await_all().await.map_err(EngineError::from)?;
    let events: u64 = reports.iter().map(|r| r.events_published).sum();
    info!(
        workers = reports.len(),
        events = events,
        "clickstream-engine stopped"
    );
    Ok(())
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Resolve on the first SIGINT (Ctrl+C) or, on Unix, SIGTERM.
///
/// If a handler cannot be installed, that signal is ignored and a warning
/// is logged.
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
