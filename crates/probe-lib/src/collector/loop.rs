//! Sampling loop
//!
//! Drives collect → extract → store at a fixed interval until a shutdown
//! signal arrives. Everything runs sequentially on the calling task; the
//! signal is only observed between iterations, so an in-flight query always
//! completes or times out first.

use super::SampleCollector;
use crate::extractor::FeatureExtractor;
use crate::models::{CriticalSet, FeatureRow};
use crate::observability::{RunStats, StructuredLogger};
use crate::store::CsvStore;
use anyhow::Result;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

/// Receiving end of the shutdown channel. A sent value or a closed channel
/// both stop the loop.
pub type ShutdownSignal = broadcast::Receiver<()>;

/// Configuration for the sampling loop
#[derive(Debug, Clone)]
pub struct CollectionConfig {
    /// Pause between the end of one iteration and the start of the next
    pub interval: Duration,
    /// Queries whose failure voids the sample
    pub critical: CriticalSet,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            critical: CriticalSet::All,
        }
    }
}

/// Result of one iteration
#[derive(Debug, Clone, PartialEq)]
pub enum IterationOutcome {
    /// A row was appended to the store
    Written(FeatureRow),
    /// A critical query failed; nothing was stored
    Voided { failed: Vec<String> },
    /// The row was built but the append failed
    WriteFailed(String),
}

pub struct CollectionLoop {
    collector: SampleCollector,
    extractor: FeatureExtractor,
    store: CsvStore,
    serial: String,
    config: CollectionConfig,
    logger: StructuredLogger,
    stats: RunStats,
}

impl CollectionLoop {
    pub fn new(
        collector: SampleCollector,
        extractor: FeatureExtractor,
        store: CsvStore,
        serial: impl Into<String>,
        config: CollectionConfig,
    ) -> Self {
        let serial = serial.into();
        Self {
            collector,
            extractor,
            store,
            logger: StructuredLogger::new(serial.clone()),
            serial,
            config,
            stats: RunStats::default(),
        }
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    pub fn store(&self) -> &CsvStore {
        &self.store
    }

    pub fn logger(&self) -> &StructuredLogger {
        &self.logger
    }

    pub fn stats(&self) -> RunStats {
        self.stats
    }

    /// Run until the shutdown signal fires
    ///
    /// Returns the run counters, or an error when a fatal bridge failure
    /// ends the run early.
    pub async fn run(mut self, mut shutdown: ShutdownSignal) -> Result<RunStats> {
        info!(
            serial = %self.serial,
            interval_secs = self.config.interval.as_secs(),
            "Starting sampling loop"
        );

        loop {
            match shutdown.try_recv() {
                Ok(()) | Err(TryRecvError::Lagged(_)) | Err(TryRecvError::Closed) => break,
                Err(TryRecvError::Empty) => {}
            }

            let start = Instant::now();
            let outcome = self.run_once().await?;
            debug!(
                iteration = self.stats.iterations,
                elapsed_ms = start.elapsed().as_millis() as u64,
                written = matches!(outcome, IterationOutcome::Written(_)),
                "Iteration complete"
            );

            tokio::select! {
                _ = sleep(self.config.interval) => {}
                _ = shutdown.recv() => break,
            }
        }

        self.logger.log_shutdown("shutdown requested", &self.stats);
        Ok(self.stats)
    }

    /// Take one sample and store its row
    ///
    /// Fails only for a fatal bridge error. Voided samples and store
    /// failures are reported through the outcome.
    pub async fn run_once(&mut self) -> Result<IterationOutcome> {
        self.stats.iterations += 1;

        let sample = self.collector.collect(&self.serial).await?;
        let failed: Vec<String> = sample.unavailable().into_iter().map(String::from).collect();
        self.stats.query_failures += failed.len() as u64;

        if sample.is_void(&self.config.critical) {
            self.stats.samples_voided += 1;
            self.logger.log_sample_voided(&failed);
            return Ok(IterationOutcome::Voided { failed });
        }

        let row = self.extractor.extract(&sample);

        match self.store.append(&row) {
            Ok(()) => {
                self.stats.rows_written += 1;
                self.logger.log_sample_written(&row);
                Ok(IterationOutcome::Written(row))
            }
            Err(e) => {
                let message = format!("{:#}", e);
                self.stats.write_failures += 1;
                self.logger
                    .log_store_write_failed(&self.store.path().display().to_string(), &message);
                Ok(IterationOutcome::WriteFailed(message))
            }
        }
    }
}

/// Builder for the sampling loop
pub struct CollectionLoopBuilder {
    collector: Option<SampleCollector>,
    store: Option<CsvStore>,
    serial: Option<String>,
    extractor: FeatureExtractor,
    config: CollectionConfig,
}

impl CollectionLoopBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            collector: None,
            store: None,
            serial: None,
            extractor: FeatureExtractor::default(),
            config: CollectionConfig::default(),
        }
    }

    pub fn collector(mut self, collector: SampleCollector) -> Self {
        self.collector = Some(collector);
        self
    }

    pub fn store(mut self, store: CsvStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Serial of the device to sample
    pub fn serial(mut self, serial: impl Into<String>) -> Self {
        self.serial = Some(serial.into());
        self
    }

    pub fn extractor(mut self, extractor: FeatureExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    pub fn critical(mut self, critical: CriticalSet) -> Self {
        self.config.critical = critical;
        self
    }

    pub fn build(self) -> Result<CollectionLoop> {
        let collector = self
            .collector
            .ok_or_else(|| anyhow::anyhow!("Collector is required"))?;
        let store = self
            .store
            .ok_or_else(|| anyhow::anyhow!("Store is required"))?;
        let serial = self
            .serial
            .ok_or_else(|| anyhow::anyhow!("Device serial is required"))?;

        Ok(CollectionLoop::new(
            collector,
            self.extractor,
            store,
            serial,
            self.config,
        ))
    }
}

impl Default for CollectionLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}
