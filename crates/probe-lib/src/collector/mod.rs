//! Diagnostic collection from an attached Android device
//!
//! This module runs a fixed battery of read-only shell queries through the
//! device bridge (`adb`) and gathers their raw text into a [`Sample`].
//! A failing query degrades to an unavailable marker for that query only;
//! a missing bridge executable is the one failure that aborts collection.

mod bridge;
mod discovery;
mod r#loop;


pub use bridge::{AdbBridge, BridgeError};
pub use discovery::{
    discover_device, parse_devices, select_device, DeviceEntry, DeviceSelector, DiscoveryError,
};
pub use r#loop::{
    CollectionConfig, CollectionLoop, CollectionLoopBuilder, IterationOutcome, ShutdownSignal,
};

use crate::models::{QueryOutput, Sample};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

pub use async_trait::async_trait;

/// Trait for talking to a device through the bridge tool
#[async_trait]
pub trait Bridge: Send + Sync {
    /// Raw output of the device enumeration command
    async fn list_devices(&self) -> Result<String, BridgeError>;

    /// Run one shell command on the given device and return its trimmed stdout
    async fn shell(&self, serial: &str, command: &str) -> Result<String, BridgeError>;
}

/// One named diagnostic query
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QuerySpec {
    pub name: String,
    pub command: String,
}

impl QuerySpec {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
        }
    }
}

/// Query names the extractor knows how to read
pub mod queries {
    pub const CPU: &str = "cpuinfo";
    pub const CORES: &str = "cpucores";
    pub const MEMORY: &str = "meminfo";
    pub const BATTERY: &str = "battery";
    pub const NETWORK: &str = "netstats";
    pub const LOGCAT: &str = "logcat";
    pub const ACTIVITY: &str = "activity";
    pub const WIFI: &str = "wifi";
}

/// The default query set
pub fn default_queries() -> Vec<QuerySpec> {
    vec![
        QuerySpec::new(queries::CPU, "dumpsys cpuinfo"),
        QuerySpec::new(queries::CORES, "cat /proc/cpuinfo"),
        QuerySpec::new(queries::MEMORY, "cat /proc/meminfo"),
        QuerySpec::new(queries::BATTERY, "dumpsys battery"),
        QuerySpec::new(queries::NETWORK, "dumpsys netstats"),
        QuerySpec::new(queries::LOGCAT, "logcat -d -t 500"),
        QuerySpec::new(queries::ACTIVITY, "dumpsys activity activities"),
        QuerySpec::new(queries::WIFI, "dumpsys wifi"),
    ]
}

/// Runs the configured queries against one device
pub struct SampleCollector {
    bridge: Arc<dyn Bridge>,
    queries: Vec<QuerySpec>,
}

impl SampleCollector {
    pub fn new(bridge: Arc<dyn Bridge>, queries: Vec<QuerySpec>) -> Self {
        Self { bridge, queries }
    }

    pub fn queries(&self) -> &[QuerySpec] {
        &self.queries
    }

    /// Take one sample. Queries run strictly one after another.
    ///
    /// Returns `Err` only for a fatal bridge error; every other failure is
    /// recorded as [`QueryOutput::Unavailable`] for that query.
    pub async fn collect(&self, serial: &str) -> Result<Sample, BridgeError> {
        let mut outputs = Vec::with_capacity(self.queries.len());

        for query in &self.queries {
            let output = match self.bridge.shell(serial, &query.command).await {
                Ok(text) => {
                    debug!(query = %query.name, bytes = text.len(), "Query completed");
                    QueryOutput::Available(text)
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(
                        event = "query_unavailable",
                        query = %query.name,
                        error = %e,
                        "Query unavailable"
                    );
                    QueryOutput::Unavailable(e.to_string())
                }
            };
            outputs.push((query.name.clone(), output));
        }

        Ok(Sample::new(serial, outputs))
    }
}
