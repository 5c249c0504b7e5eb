//! Feature extraction from raw diagnostic output
//!
//! Turns one [`Sample`] into one fixed-schema [`FeatureRow`]. Extraction is
//! pure: no I/O, no errors. A query that is missing, unavailable, empty or
//! unparseable contributes its documented defaults, so every row carries
//! the full column set.

mod features;
mod patterns;

pub use features::{
    activity_features, battery_features, cpu_cores, cpu_features, log_features, memory_features,
    network_features, round2, wifi_features, ActivityFeatures, BatteryFeatures, CpuFeatures,
    LogFeatures, MemoryFeatures, NetworkFeatures, WifiFeatures,
};

use crate::collector::queries;
use crate::models::{FeatureRow, Sample};
use std::collections::HashSet;

/// Text used when a textual feature could not be extracted
pub const UNKNOWN: &str = "Unknown";
/// Text used when no process line was found in the CPU summary
pub const NO_PROCESS: &str = "None";

/// Thresholds and allow-lists for derived features
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    pub app_blocklist: HashSet<String>,
    pub battery_low_threshold: u32,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            app_blocklist: HashSet::new(),
            battery_low_threshold: 15,
        }
    }
}

/// Extracts a feature row from a raw sample
#[derive(Debug, Clone, Default)]
pub struct FeatureExtractor {
    config: ExtractorConfig,
}

impl FeatureExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self { config }
    }

    pub fn extract(&self, sample: &Sample) -> FeatureRow {
        let cpu = cpu_features(sample.text(queries::CPU));
        let cores = cpu_cores(sample.text(queries::CORES));
        let memory = memory_features(sample.text(queries::MEMORY));
        let battery = battery_features(sample.text(queries::BATTERY));
        let network = network_features(sample.text(queries::NETWORK));
        let logs = log_features(sample.text(queries::LOGCAT));
        let activity = activity_features(sample.text(queries::ACTIVITY));
        let wifi = wifi_features(sample.text(queries::WIFI));

        let app_blocklisted = self.is_blocklisted(activity.foreground_app.as_deref());
        let battery_low = self.is_battery_low(battery.level);

        FeatureRow {
            timestamp: sample.formatted_timestamp(),
            device_serial: sample.device_serial.clone(),
            foreground_app: activity
                .foreground_app
                .unwrap_or_else(|| UNKNOWN.to_string()),
            app_blocklisted,
            running_activities: activity.running_activities,
            cpu_total_pct: cpu.total_pct,
            cpu_load_1m: cpu.load_1m,
            cpu_top_process: cpu.top_process.unwrap_or_else(|| NO_PROCESS.to_string()),
            cpu_top_process_pct: cpu.top_process_pct,
            cpu_cores: cores,
            mem_total_kb: memory.total_kb,
            mem_free_kb: memory.free_kb,
            mem_available_kb: memory.available_kb,
            mem_free_pct: memory.free_pct,
            battery_level: battery.level,
            battery_low,
            battery_plugged: battery.plugged,
            battery_temp_c: battery.temp_c,
            battery_voltage_v: battery.voltage_v,
            net_rx_bytes: network.rx_bytes,
            net_tx_bytes: network.tx_bytes,
            log_lines: logs.lines,
            log_warnings: logs.warnings,
            log_errors: logs.errors,
            wifi_ssid: wifi.ssid.unwrap_or_else(|| UNKNOWN.to_string()),
            wifi_rssi_dbm: wifi.rssi_dbm,
            wifi_link_mbps: wifi.link_mbps,
            unavailable_queries: sample.unavailable().join(";"),
        }
    }

    fn is_blocklisted(&self, app: Option<&str>) -> bool {
        app.map(|app| self.config.app_blocklist.contains(app))
            .unwrap_or(false)
    }

    fn is_battery_low(&self, level: Option<u32>) -> bool {
        level
            .map(|level| level < self.config.battery_low_threshold)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FeatureValue, QueryOutput};

    fn sample(outputs: &[(&str, QueryOutput)]) -> Sample {
        Sample::new(
            "emulator-5554",
            outputs
                .iter()
                .map(|(name, output)| (name.to_string(), output.clone()))
                .collect(),
        )
    }

    fn available(text: &str) -> QueryOutput {
        QueryOutput::Available(text.to_string())
    }

    fn assert_full_schema(row: &FeatureRow) {
        let names: Vec<&str> = row.fields().iter().map(|(name, _)| *name).collect();
        assert_eq!(names, FeatureRow::COLUMNS);
    }

    #[test]
    fn test_empty_sample_yields_full_schema_with_defaults() {
        let row = FeatureExtractor::default().extract(&sample(&[]));

        assert_full_schema(&row);
        assert_eq!(row.device_serial, "emulator-5554");
        assert_eq!(row.foreground_app, UNKNOWN);
        assert_eq!(row.cpu_top_process, NO_PROCESS);
        assert_eq!(row.wifi_ssid, UNKNOWN);
        assert_eq!(row.cpu_total_pct, 0.0);
        assert_eq!(row.mem_free_pct, 0.0);
        assert_eq!(row.battery_level, None);
        assert!(!row.battery_low);
        assert!(!row.app_blocklisted);
        assert_eq!(row.unavailable_queries, "");
    }

    #[test]
    fn test_unavailable_and_error_blobs_yield_full_schema() {
        let outputs: Vec<(&str, QueryOutput)> = [
            queries::CPU,
            queries::CORES,
            queries::MEMORY,
            queries::BATTERY,
            queries::NETWORK,
            queries::LOGCAT,
            queries::ACTIVITY,
            queries::WIFI,
        ]
        .iter()
        .map(|name| (*name, QueryOutput::Unavailable("timed out".into())))
        .collect();

        let row = FeatureExtractor::default().extract(&sample(&outputs));
        assert_full_schema(&row);
        assert_eq!(
            row.unavailable_queries,
            "cpuinfo;cpucores;meminfo;battery;netstats;logcat;activity;wifi"
        );

        let row = FeatureExtractor::default().extract(&sample(&[
            (queries::CPU, available("Error: closed")),
            (queries::BATTERY, available("none")),
            (queries::WIFI, available("")),
        ]));
        assert_full_schema(&row);
        assert_eq!(row.cpu_total_pct, 0.0);
        assert_eq!(row.battery_temp_c, None);
    }

    #[test]
    fn test_missing_optional_features_render_empty() {
        let row = FeatureExtractor::default().extract(&sample(&[]));
        let fields = row.fields();
        let (_, level) = fields
            .iter()
            .find(|(name, _)| *name == "battery_level")
            .unwrap();
        assert_eq!(*level, FeatureValue::Missing);
    }

    #[test]
    fn test_extracts_documented_values() {
        let row = FeatureExtractor::default().extract(&sample(&[
            (queries::CPU, available("55.25% TOTAL: 30% user + 25% kernel")),
            (
                queries::MEMORY,
                available("MemTotal: 2048000 kB\nMemFree:    102400 kB"),
            ),
            (
                queries::BATTERY,
                available("  level: 80\n  temperature: 350\n  voltage: 3700"),
            ),
        ]));

        assert_eq!(row.cpu_total_pct, 55.25);
        assert_eq!(row.mem_free_pct, 5.0);
        assert_eq!(row.battery_level, Some(80));
        assert_eq!(row.battery_temp_c, Some(35.0));
        assert_eq!(row.battery_voltage_v, Some(3.7));
    }

    #[test]
    fn test_large_counters_are_not_wrapped() {
        let row = FeatureExtractor::default().extract(&sample(&[(
            queries::NETWORK,
            available("rxBytes=18446744073709551000 txBytes=42"),
        )]));

        let fields = row.fields();
        let (_, rx) = fields
            .iter()
            .find(|(name, _)| *name == "net_rx_bytes")
            .unwrap();
        assert_eq!(*rx, FeatureValue::UInt(18_446_744_073_709_551_000));
        assert_eq!(rx.to_string(), "18446744073709551000");
    }

    #[test]
    fn test_cpu_cores_column() {
        let row = FeatureExtractor::default().extract(&sample(&[(
            queries::CORES,
            available("processor\t: 0\nprocessor\t: 1\nprocessor\t: 2\nprocessor\t: 3"),
        )]));
        assert_eq!(row.cpu_cores, 4);
        assert_eq!(FeatureExtractor::default().extract(&sample(&[])).cpu_cores, 0);
    }

    #[test]
    fn test_derived_flags() {
        let extractor = FeatureExtractor::new(ExtractorConfig {
            app_blocklist: ["com.example.tracker".to_string()].into_iter().collect(),
            battery_low_threshold: 20,
        });

        let row = extractor.extract(&sample(&[
            (
                queries::ACTIVITY,
                available("mResumedActivity: ActivityRecord{1 u0 com.example.tracker/.Main t3}"),
            ),
            (queries::BATTERY, available("level: 19")),
        ]));
        assert!(row.app_blocklisted);
        assert!(row.battery_low);

        let row = extractor.extract(&sample(&[
            (
                queries::ACTIVITY,
                available("mResumedActivity: ActivityRecord{1 u0 com.android.chrome/.Main t3}"),
            ),
            (queries::BATTERY, available("level: 20")),
        ]));
        assert!(!row.app_blocklisted);
        assert!(!row.battery_low);
    }
}
