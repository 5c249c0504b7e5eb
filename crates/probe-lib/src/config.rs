//! Probe configuration
//!
//! Loaded from an optional config file layered under `DROIDPROBE_*`
//! environment variables. Every key has a default, so an empty
//! environment yields a working configuration.

use crate::collector::{DeviceSelector, QuerySpec};
use crate::extractor::ExtractorConfig;
use crate::models::CriticalSet;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "DROIDPROBE";

/// Variables whose values are always read as plain strings
const VERBATIM_ENV_KEYS: &[&str] = &["DROIDPROBE_DEVICE", "DROIDPROBE_BRIDGE_PATH"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("query set is empty")]
    NoQueries,

    #[error("duplicate query name `{0}`")]
    DuplicateQuery(String),

    #[error("query `{0}` has an empty command")]
    EmptyCommand(String),

    #[error("critical query `{0}` is not in the query set")]
    UnknownCritical(String),

    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("delimiter {0:?} cannot be used in a delimited file")]
    InvalidDelimiter(char),
}

/// Top-level probe configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ProbeConfig {
    /// Output file for feature rows
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,

    /// `first` for the first ready device, otherwise an explicit serial
    #[serde(default = "default_device")]
    pub device: String,

    /// Wait between samples in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Bounded wait for each bridge invocation in seconds
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// Bridge executable name or path
    #[serde(default = "default_bridge_path")]
    pub bridge_path: String,

    /// Ordered diagnostic queries
    #[serde(default = "default_queries")]
    pub queries: Vec<QuerySpec>,

    /// Queries whose failure voids a sample; unset means all of them
    #[serde(default)]
    pub critical: Option<Vec<String>>,

    /// Store field delimiter
    #[serde(default = "default_delimiter")]
    pub delimiter: char,

    /// Package names flagged by `app_blocklisted`
    #[serde(default)]
    pub app_blocklist: Vec<String>,

    /// Battery level below which `battery_low` is set
    #[serde(default = "default_battery_low_threshold")]
    pub battery_low_threshold: u32,
}

fn default_store_path() -> PathBuf {
    PathBuf::from("metrics.csv")
}

fn default_device() -> String {
    "first".to_string()
}

fn default_poll_interval() -> u64 {
    5
}

fn default_command_timeout() -> u64 {
    10
}

fn default_bridge_path() -> String {
    "adb".to_string()
}

fn default_queries() -> Vec<QuerySpec> {
    crate::collector::default_queries()
}

fn default_delimiter() -> char {
    ','
}

fn default_battery_low_threshold() -> u32 {
    15
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            device: default_device(),
            poll_interval_secs: default_poll_interval(),
            command_timeout_secs: default_command_timeout(),
            bridge_path: default_bridge_path(),
            queries: default_queries(),
            critical: None,
            delimiter: default_delimiter(),
            app_blocklist: Vec::new(),
            battery_low_threshold: default_battery_low_threshold(),
        }
    }
}

impl ProbeConfig {
    /// Load configuration from an optional file and the environment, then validate it
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_vars(file, std::env::vars())
    }

    /// Load with an explicit set of environment variables
    pub fn load_with_vars(
        file: Option<&Path>,
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> Result<Self, ConfigError> {
        // Serials such as `0123` must not go through number parsing
        let (verbatim, typed): (config::Map<String, String>, config::Map<String, String>) = vars
            .into_iter()
            .partition(|(key, _)| VERBATIM_ENV_KEYS.iter().any(|k| key.eq_ignore_ascii_case(k)));

        let mut builder = config::Config::builder();

        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .source(Some(typed))
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("critical")
                    .with_list_parse_key("app_blocklist"),
            )
            .add_source(config::Environment::with_prefix(ENV_PREFIX).source(Some(verbatim)))
            .build()?;

        let config: ProbeConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field invariants
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queries.is_empty() {
            return Err(ConfigError::NoQueries);
        }

        let mut names = HashSet::new();
        for query in &self.queries {
            if !names.insert(query.name.as_str()) {
                return Err(ConfigError::DuplicateQuery(query.name.clone()));
            }
            if query.command.trim().is_empty() {
                return Err(ConfigError::EmptyCommand(query.name.clone()));
            }
        }

        if let Some(critical) = &self.critical {
            if let Some(unknown) = critical.iter().find(|c| !names.contains(c.as_str())) {
                return Err(ConfigError::UnknownCritical(unknown.clone()));
            }
        }

        if self.poll_interval_secs == 0 {
            return Err(ConfigError::ZeroDuration("poll_interval_secs"));
        }
        if self.command_timeout_secs == 0 {
            return Err(ConfigError::ZeroDuration("command_timeout_secs"));
        }

        if matches!(self.delimiter, '"' | '\r' | '\n') {
            return Err(ConfigError::InvalidDelimiter(self.delimiter));
        }

        Ok(())
    }

    pub fn device_selector(&self) -> DeviceSelector {
        DeviceSelector::parse(&self.device)
    }

    pub fn critical_set(&self) -> CriticalSet {
        match &self.critical {
            None => CriticalSet::All,
            Some(names) => CriticalSet::Only(names.iter().cloned().collect()),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn extractor_config(&self) -> ExtractorConfig {
        ExtractorConfig {
            app_blocklist: self.app_blocklist.iter().cloned().collect(),
            battery_low_threshold: self.battery_low_threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = ProbeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.store_path, PathBuf::from("metrics.csv"));
        assert_eq!(config.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.device_selector(), DeviceSelector::FirstAvailable);
        assert_eq!(config.critical_set(), CriticalSet::All);
        assert_eq!(config.queries.len(), 8);
    }

    #[test]
    fn test_rejects_unknown_critical_query() {
        let config = ProbeConfig {
            critical: Some(vec!["gpu".to_string()]),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnknownCritical(name)) if name == "gpu"
        ));
    }

    #[test]
    fn test_rejects_duplicate_and_empty_queries() {
        let mut config = ProbeConfig::default();
        config.queries.push(QuerySpec::new("battery", "dumpsys battery"));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateQuery(_))
        ));

        let config = ProbeConfig {
            queries: vec![QuerySpec::new("battery", "  ")],
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::EmptyCommand(_))));

        let config = ProbeConfig {
            queries: Vec::new(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::NoQueries)));
    }

    #[test]
    fn test_rejects_zero_interval_and_bad_delimiter() {
        let config = ProbeConfig {
            poll_interval_secs: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroDuration("poll_interval_secs"))
        ));

        let config = ProbeConfig {
            delimiter: '"',
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidDelimiter('"'))
        ));
    }

    #[test]
    fn test_empty_critical_list_nulls_only_failed_metric() {
        let config = ProbeConfig {
            critical: Some(Vec::new()),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert!(!config.critical_set().contains("battery"));
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("probe.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
store_path = "out/device.csv"
device = "R58M123ABC"
poll_interval_secs = 30
critical = ["battery"]
app_blocklist = ["com.example.tracker"]

[[queries]]
name = "battery"
command = "dumpsys battery"

[[queries]]
name = "meminfo"
command = "cat /proc/meminfo"
"#
        )
        .unwrap();

        let config = ProbeConfig::load(Some(&path)).unwrap();
        assert_eq!(config.store_path, PathBuf::from("out/device.csv"));
        assert_eq!(
            config.device_selector(),
            DeviceSelector::Serial("R58M123ABC".to_string())
        );
        assert_eq!(config.poll_interval_secs, 30);
        assert_eq!(config.queries.len(), 2);
        assert!(config.critical_set().contains("battery"));
        assert!(!config.critical_set().contains("meminfo"));
        assert_eq!(config.app_blocklist, vec!["com.example.tracker"]);
        // untouched keys keep their defaults
        assert_eq!(config.command_timeout_secs, 10);
        assert_eq!(config.bridge_path, "adb");
    }

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_numeric_looking_serial_from_env_is_kept_verbatim() {
        let config = ProbeConfig::load_with_vars(
            None,
            vars(&[
                ("DROIDPROBE_DEVICE", "0123"),
                ("DROIDPROBE_POLL_INTERVAL_SECS", "7"),
                ("DROIDPROBE_CRITICAL", "battery,meminfo"),
                ("UNRELATED", "1"),
            ]),
        )
        .unwrap();

        assert_eq!(config.device, "0123");
        assert_eq!(
            config.device_selector(),
            DeviceSelector::Serial("0123".to_string())
        );
        assert_eq!(config.poll_interval_secs, 7);
        assert_eq!(
            config.critical,
            Some(vec!["battery".to_string(), "meminfo".to_string()])
        );
    }

    #[test]
    fn test_env_overrides_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("probe.toml");
        std::fs::write(&path, "device = \"emulator-5554\"\npoll_interval_secs = 30\n").unwrap();

        let config = ProbeConfig::load_with_vars(
            Some(&path),
            vars(&[("DROIDPROBE_DEVICE", "R58M123ABC")]),
        )
        .unwrap();
        assert_eq!(config.device, "R58M123ABC");
        assert_eq!(config.poll_interval_secs, 30);
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("probe.toml");
        std::fs::write(&path, "poll_interval_secs = 0\n").unwrap();

        assert!(matches!(
            ProbeConfig::load(Some(&path)),
            Err(ConfigError::ZeroDuration(_))
        ));
    }
}
