//! droidprobe - Android telemetry sampler
//!
//! Polls one attached device over `adb`, extracts a fixed set of
//! diagnostics from each sample and appends them as rows to a CSV file.

use anyhow::Result;
use clap::Parser;
use probe_lib::collector::{
    discover_device, AdbBridge, CollectionLoopBuilder, IterationOutcome, SampleCollector,
};
use probe_lib::{CsvStore, FeatureExtractor, ProbeConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const PROBE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Exit status when a single-sample run produced no row
const EXIT_VOIDED: u8 = 2;

/// Android telemetry sampler
#[derive(Debug, Parser)]
#[command(name = "droidprobe")]
#[command(author, version, about = "Sample Android device diagnostics into a CSV file", long_about = None)]
pub struct Cli {
    /// Config file (TOML, YAML or JSON). DROIDPROBE_* variables override it.
    #[arg(long, short, env = "DROIDPROBE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Take a single sample and exit
    #[arg(long)]
    pub once: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().with_target(false)).init();
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = ProbeConfig::load(cli.config.as_deref()).map_err(|e| {
        error!(error = %e, "Invalid configuration");
        e
    })?;

    let bridge = Arc::new(AdbBridge::new(
        config.bridge_path.clone(),
        config.command_timeout(),
    ));

    let serial = discover_device(bridge.as_ref(), &config.device_selector())
        .await
        .map_err(|e| {
            error!(error = %e, bridge = %bridge.tool(), "Device discovery failed");
            e
        })?;

    let mut collection_loop = CollectionLoopBuilder::new()
        .collector(SampleCollector::new(bridge, config.queries.clone()))
        .extractor(FeatureExtractor::new(config.extractor_config()))
        .store(CsvStore::new(&config.store_path, config.delimiter))
        .serial(serial)
        .interval(config.poll_interval())
        .critical(config.critical_set())
        .build()?;

    collection_loop.logger().log_startup(
        PROBE_VERSION,
        &config.store_path.display().to_string(),
        config.poll_interval_secs,
        config.queries.len(),
    );

    if cli.once {
        return run_single(collection_loop).await;
    }

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, stopping after the current iteration");
            let _ = signal_tx.send(());
        }
    });

    match collection_loop.run(shutdown_rx).await {
        Ok(stats) => {
            info!(rows_written = stats.rows_written, "Shutting down");
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            error!(error = %e, "Sampling stopped on a fatal error");
            Err(e)
        }
    }
}

async fn run_single(mut collection_loop: probe_lib::collector::CollectionLoop) -> Result<ExitCode> {
    let outcome = collection_loop.run_once().await.map_err(|e| {
        error!(error = %e, "Sampling stopped on a fatal error");
        e
    })?;
    collection_loop
        .logger()
        .log_shutdown("single sample", &collection_loop.stats());

    Ok(match outcome {
        IterationOutcome::Written(_) => ExitCode::SUCCESS,
        IterationOutcome::Voided { .. } => ExitCode::from(EXIT_VOIDED),
        IterationOutcome::WriteFailed(_) => ExitCode::FAILURE,
    })
}
