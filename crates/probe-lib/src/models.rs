//! Core data models for the probe

use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

/// Timestamp layout used in stored rows (second resolution)
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Outcome of one diagnostic query
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutput {
    /// Trimmed standard output of the command
    Available(String),
    /// The command could not produce output; holds the reason
    Unavailable(String),
}

impl QueryOutput {
    pub fn is_available(&self) -> bool {
        matches!(self, QueryOutput::Available(_))
    }

    /// Text to feed the extractor. Unavailable output reads as empty.
    pub fn text(&self) -> &str {
        match self {
            QueryOutput::Available(text) => text,
            QueryOutput::Unavailable(_) => "",
        }
    }
}

/// Names of queries whose failure voids a whole sample
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CriticalSet {
    /// Every configured query is critical
    All,
    /// Only the named queries are critical (may be empty)
    Only(HashSet<String>),
}

impl CriticalSet {
    pub fn contains(&self, name: &str) -> bool {
        match self {
            CriticalSet::All => true,
            CriticalSet::Only(names) => names.contains(name),
        }
    }
}

impl Default for CriticalSet {
    fn default() -> Self {
        CriticalSet::All
    }
}

/// Raw diagnostic output gathered from one device at one point in time
#[derive(Debug, Clone)]
pub struct Sample {
    pub timestamp: DateTime<Local>,
    pub device_serial: String,
    pub outputs: Vec<(String, QueryOutput)>,
}

impl Sample {
    pub fn new(device_serial: impl Into<String>, outputs: Vec<(String, QueryOutput)>) -> Self {
        Self {
            timestamp: Local::now(),
            device_serial: device_serial.into(),
            outputs,
        }
    }

    /// Output of the named query, if it was part of the sample
    pub fn output(&self, name: &str) -> Option<&QueryOutput> {
        self.outputs
            .iter()
            .find(|(query, _)| query == name)
            .map(|(_, output)| output)
    }

    /// Raw text of the named query; empty when missing or unavailable
    pub fn text(&self, name: &str) -> &str {
        self.output(name).map(QueryOutput::text).unwrap_or("")
    }

    /// Names of the queries that failed, in query order
    pub fn unavailable(&self) -> Vec<&str> {
        self.outputs
            .iter()
            .filter(|(_, output)| !output.is_available())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// True when any critical query failed
    pub fn is_void(&self, critical: &CriticalSet) -> bool {
        self.outputs
            .iter()
            .any(|(name, output)| !output.is_available() && critical.contains(name))
    }

    pub fn formatted_timestamp(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }
}

/// One typed cell of a feature row
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureValue {
    Int(i64),
    /// Unsigned counters such as byte and line totals
    UInt(u64),
    Float(f64),
    Text(String),
    Flag(bool),
    Missing,
}

impl From<Option<i64>> for FeatureValue {
    fn from(value: Option<i64>) -> Self {
        value.map(FeatureValue::Int).unwrap_or(FeatureValue::Missing)
    }
}

impl From<Option<f64>> for FeatureValue {
    fn from(value: Option<f64>) -> Self {
        value.map(FeatureValue::Float).unwrap_or(FeatureValue::Missing)
    }
}

impl fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureValue::Int(v) => write!(f, "{}", v),
            FeatureValue::UInt(v) => write!(f, "{}", v),
            // Keep a decimal point on whole floats so columns stay visibly real-valued
            FeatureValue::Float(v) if v.is_finite() && v.fract() == 0.0 => write!(f, "{:.1}", v),
            FeatureValue::Float(v) => write!(f, "{}", v),
            FeatureValue::Text(s) => f.write_str(s),
            FeatureValue::Flag(b) => f.write_str(if *b { "1" } else { "0" }),
            FeatureValue::Missing => Ok(()),
        }
    }
}

/// Fixed-schema record derived from exactly one sample
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureRow {
    pub timestamp: String,
    pub device_serial: String,
    pub foreground_app: String,
    pub app_blocklisted: bool,
    pub running_activities: u64,
    pub cpu_total_pct: f64,
    pub cpu_load_1m: Option<f64>,
    pub cpu_top_process: String,
    pub cpu_top_process_pct: f64,
    pub cpu_cores: u64,
    pub mem_total_kb: u64,
    pub mem_free_kb: u64,
    pub mem_available_kb: u64,
    pub mem_free_pct: f64,
    pub battery_level: Option<u32>,
    pub battery_low: bool,
    pub battery_plugged: bool,
    pub battery_temp_c: Option<f64>,
    pub battery_voltage_v: Option<f64>,
    pub net_rx_bytes: u64,
    pub net_tx_bytes: u64,
    pub log_lines: u64,
    pub log_warnings: u64,
    pub log_errors: u64,
    pub wifi_ssid: String,
    pub wifi_rssi_dbm: Option<i32>,
    pub wifi_link_mbps: Option<u32>,
    pub unavailable_queries: String,
}

impl FeatureRow {
    /// Column names in store order. `fields()` yields exactly these.
    pub const COLUMNS: &'static [&'static str] = &[
        "timestamp",
        "device_serial",
        "foreground_app",
        "app_blocklisted",
        "running_activities",
        "cpu_total_pct",
        "cpu_load_1m",
        "cpu_top_process",
        "cpu_top_process_pct",
        "cpu_cores",
        "mem_total_kb",
        "mem_free_kb",
        "mem_available_kb",
        "mem_free_pct",
        "battery_level",
        "battery_low",
        "battery_plugged",
        "battery_temp_c",
        "battery_voltage_v",
        "net_rx_bytes",
        "net_tx_bytes",
        "log_lines",
        "log_warnings",
        "log_errors",
        "wifi_ssid",
        "wifi_rssi_dbm",
        "wifi_link_mbps",
        "unavailable_queries",
    ];

    /// Named cells in column order
    pub fn fields(&self) -> Vec<(&'static str, FeatureValue)> {
        use FeatureValue::{Flag, Float, Text, UInt};

        let values = vec![
            Text(self.timestamp.clone()),
            Text(self.device_serial.clone()),
            Text(self.foreground_app.clone()),
            Flag(self.app_blocklisted),
            UInt(self.running_activities),
            Float(self.cpu_total_pct),
            self.cpu_load_1m.into(),
            Text(self.cpu_top_process.clone()),
            Float(self.cpu_top_process_pct),
            UInt(self.cpu_cores),
            UInt(self.mem_total_kb),
            UInt(self.mem_free_kb),
            UInt(self.mem_available_kb),
            Float(self.mem_free_pct),
            self.battery_level.map(i64::from).into(),
            Flag(self.battery_low),
            Flag(self.battery_plugged),
            self.battery_temp_c.into(),
            self.battery_voltage_v.into(),
            UInt(self.net_rx_bytes),
            UInt(self.net_tx_bytes),
            UInt(self.log_lines),
            UInt(self.log_warnings),
            UInt(self.log_errors),
            Text(self.wifi_ssid.clone()),
            self.wifi_rssi_dbm.map(i64::from).into(),
            self.wifi_link_mbps.map(i64::from).into(),
            Text(self.unavailable_queries.clone()),
        ];

        Self::COLUMNS.iter().copied().zip(values).collect()
    }
}
