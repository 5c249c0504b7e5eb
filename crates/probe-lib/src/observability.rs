//! Observability for the probe
//!
//! Provides:
//! - Event-tagged structured log records for the sampling lifecycle
//! - Run counters reported at shutdown

use crate::models::FeatureRow;
use serde::Serialize;
use tracing::{error, info, warn};

/// Counters accumulated over one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub iterations: u64,
    pub rows_written: u64,
    pub samples_voided: u64,
    pub query_failures: u64,
    pub write_failures: u64,
}

/// Structured logger for probe events
///
/// Every record carries an `event` field and the device serial so JSON
/// output can be filtered without parsing messages.
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    device: String,
}

impl StructuredLogger {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    /// Log probe startup
    pub fn log_startup(&self, version: &str, store_path: &str, interval_secs: u64, queries: usize) {
        info!(
            event = "probe_started",
            device = %self.device,
            probe_version = %version,
            store_path = %store_path,
            interval_secs = interval_secs,
            queries = queries,
            "Probe started"
        );
    }

    /// Log probe shutdown with the final counters
    pub fn log_shutdown(&self, reason: &str, stats: &RunStats) {
        info!(
            event = "probe_stopped",
            device = %self.device,
            reason = %reason,
            iterations = stats.iterations,
            rows_written = stats.rows_written,
            samples_voided = stats.samples_voided,
            query_failures = stats.query_failures,
            write_failures = stats.write_failures,
            "Probe stopped"
        );
    }

    /// Log a stored row
    pub fn log_sample_written(&self, row: &FeatureRow) {
        let row_json = serde_json::to_string(row).unwrap_or_default();
        info!(
            event = "sample_written",
            device = %self.device,
            timestamp = %row.timestamp,
            foreground_app = %row.foreground_app,
            unavailable = %row.unavailable_queries,
            row = %row_json,
            "Sample written"
        );
    }

    /// Log a sample dropped because a critical query failed
    pub fn log_sample_voided(&self, failed: &[String]) {
        warn!(
            event = "sample_voided",
            device = %self.device,
            failed = %failed.join(","),
            "Sample voided, critical query unavailable"
        );
    }

    /// Log a failed append
    pub fn log_store_write_failed(&self, store_path: &str, err: &str) {
        error!(
            event = "store_write_failed",
            device = %self.device,
            store_path = %store_path,
            error = %err,
            "Failed to append row to store"
        );
    }
}
