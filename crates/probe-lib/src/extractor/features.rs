//! Per-query feature parsers
//!
//! Each parser reads one raw diagnostic blob and returns a small typed
//! struct. The struct's `Default` is the documented fallback, so an empty
//! or garbled blob simply yields defaults.

use super::patterns::Patterns;

static CPU_TOTAL: Patterns = Patterns::new(&[r"(\d+(?:\.\d+)?)%\s+TOTAL:"]);
static CPU_TOP_HEADER: Patterns = Patterns::new(&[r"(?i)(\d+)%cpu\s.*?(\d+)%idle"]);
static CPU_TOP_PROCESS: Patterns =
    Patterns::new(&[r"(?m)^\s*\+?(\d+(?:\.\d+)?)%\s+\d+/([^:\s]+):"]);
static CPU_LOAD: Patterns = Patterns::new(&[r"Load:\s*(\d+(?:\.\d+)?)"]);

static CPU_PROCESSOR: Patterns = Patterns::new(&[r"(?m)^\s*processor\s*:"]);

static MEM_TOTAL: Patterns = Patterns::new(&[r"\bMemTotal:\s+(\d+)"]);
static MEM_FREE: Patterns = Patterns::new(&[r"\bMemFree:\s+(\d+)"]);
static MEM_AVAILABLE: Patterns =
    Patterns::new(&[r"\bMemAvailable:\s+(\d+)", r"\bMemFree:\s+(\d+)"]);

// Line-anchored so "Max charging voltage" never shadows "voltage"
static BATTERY_LEVEL: Patterns = Patterns::new(&[r"(?im)^\s*level\s*[:=]\s*(\d+)"]);
static BATTERY_TEMP: Patterns = Patterns::new(&[r"(?im)^\s*temperature\s*[:=]\s*(-?\d+)"]);
static BATTERY_VOLTAGE: Patterns = Patterns::new(&[r"(?im)^\s*voltage\s*[:=]\s*(\d+)"]);
static BATTERY_PLUGGED: Patterns =
    Patterns::new(&[r"(?im)^\s*(?:AC|USB|Wireless|Dock) powered:\s*true\b"]);

static NET_RX: Patterns = Patterns::new(&[
    r"rxBytes=(\d+)",
    r"(?m)^\s*wlan0:\s*(\d+)",
    r"\brb=(\d+)",
]);
static NET_TX: Patterns = Patterns::new(&[
    r"txBytes=(\d+)",
    r"(?m)^\s*wlan0:\s*(?:\d+\s+){8}(\d+)",
    r"\btb=(\d+)",
]);

// threadtime, time and brief logcat layouts
static LOG_LEVEL: Patterns = Patterns::new(&[
    r"^\d{2}-\d{2}\s+\d{2}:\d{2}:\d{2}\.\d+\s+\d+\s+\d+\s+([VDIWEFA])\s",
    r"^\d{2}-\d{2}\s+\d{2}:\d{2}:\d{2}\.\d+\s+([VDIWEFA])/",
    r"^([VDIWEFA])/",
]);

static FOREGROUND_APP: Patterns = Patterns::new(&[
    r"mResumedActivity:.*? ([\w.]+)/",
    r"topResumedActivity=.*? ([\w.]+)/",
    r"ResumedActivity: .*? ([\w.]+)/",
    r"mFocusedApp=.*? ([\w.]+)/",
]);
static RUNNING_ACTIVITY: Patterns = Patterns::new(&[r"Run #\d+"]);

static WIFI_SSID: Patterns = Patterns::new(&[r#"\bSSID: "(.*?)""#, r"\bSSID: ([^,]+?)\s*(?:,|$)"]);
static WIFI_RSSI: Patterns = Patterns::new(&[r"(?i)\bRSSI:\s*(-?\d+)"]);
static WIFI_LINK: Patterns = Patterns::new(&[r"(?i)Link speed:\s*(\d+)\s*Mbps"]);

const WIFI_INFO_MARKER: &str = "mWifiInfo";

/// SSID reported while not associated
const UNKNOWN_SSID: &str = "<unknown ssid>";

/// Round to two decimal places
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CpuFeatures {
    pub total_pct: f64,
    pub load_1m: Option<f64>,
    pub top_process: Option<String>,
    pub top_process_pct: f64,
}

/// Parse `dumpsys cpuinfo`, falling back to a `top` header for the total
pub fn cpu_features(text: &str) -> CpuFeatures {
    let total_pct = CPU_TOTAL
        .parse::<f64>(text)
        .or_else(|| top_usage_pct(text))
        .unwrap_or(0.0);

    let (top_process, top_process_pct) = CPU_TOP_PROCESS
        .captures(text)
        .and_then(|caps| {
            let pct = caps.get(1)?.as_str().parse::<f64>().ok()?;
            Some((Some(caps.get(2)?.as_str().to_string()), pct))
        })
        .unwrap_or((None, 0.0));

    CpuFeatures {
        total_pct,
        load_1m: CPU_LOAD.parse(text),
        top_process,
        top_process_pct,
    }
}

/// Busy share from a `top -b` header such as `800%cpu 12%user ... 778%idle`
fn top_usage_pct(text: &str) -> Option<f64> {
    let caps = CPU_TOP_HEADER.captures(text)?;
    let capacity: f64 = caps.get(1)?.as_str().parse().ok()?;
    let idle: f64 = caps.get(2)?.as_str().parse().ok()?;

    if capacity <= 0.0 {
        return None;
    }
    Some(round2(((capacity - idle) / capacity * 100.0).clamp(0.0, 100.0)))
}

/// Count `processor` entries in `/proc/cpuinfo`
pub fn cpu_cores(text: &str) -> u64 {
    CPU_PROCESSOR.count(text) as u64
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryFeatures {
    pub total_kb: u64,
    pub free_kb: u64,
    pub available_kb: u64,
    pub free_pct: f64,
}

/// Parse `/proc/meminfo`
pub fn memory_features(text: &str) -> MemoryFeatures {
    let total_kb = MEM_TOTAL.parse::<u64>(text).unwrap_or(0);
    let free_kb = MEM_FREE.parse::<u64>(text).unwrap_or(0);
    let available_kb = MEM_AVAILABLE.parse::<u64>(text).unwrap_or(0);

    let free_pct = if total_kb > 0 {
        round2(free_kb as f64 * 100.0 / total_kb as f64)
    } else {
        0.0
    };

    MemoryFeatures {
        total_kb,
        free_kb,
        available_kb,
        free_pct,
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatteryFeatures {
    pub level: Option<u32>,
    pub plugged: bool,
    /// Degrees Celsius
    pub temp_c: Option<f64>,
    /// Volts
    pub voltage_v: Option<f64>,
}

/// Parse `dumpsys battery`; temperature is reported in tenths of a degree
/// and voltage in millivolts
pub fn battery_features(text: &str) -> BatteryFeatures {
    BatteryFeatures {
        level: BATTERY_LEVEL.parse(text),
        plugged: BATTERY_PLUGGED.captures(text).is_some(),
        temp_c: BATTERY_TEMP.parse::<i64>(text).map(|t| t as f64 / 10.0),
        voltage_v: BATTERY_VOLTAGE.parse::<u64>(text).map(|v| v as f64 / 1000.0),
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetworkFeatures {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

/// Parse `dumpsys netstats` or a `/proc/net/dev` dump
pub fn network_features(text: &str) -> NetworkFeatures {
    NetworkFeatures {
        rx_bytes: NET_RX.parse(text).unwrap_or(0),
        tx_bytes: NET_TX.parse(text).unwrap_or(0),
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogFeatures {
    pub lines: u64,
    pub warnings: u64,
    pub errors: u64,
}

/// Count log lines by priority. Buffer separators are not log lines.
pub fn log_features(text: &str) -> LogFeatures {
    let mut features = LogFeatures::default();

    for line in text.lines() {
        let line = line.trim_end();
        if line.is_empty() || line.starts_with("--------- beginning of") {
            continue;
        }
        features.lines += 1;

        match LOG_LEVEL.find(line) {
            Some("W") => features.warnings += 1,
            Some("E") | Some("F") | Some("A") => features.errors += 1,
            _ => {}
        }
    }

    features
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActivityFeatures {
    pub foreground_app: Option<String>,
    pub running_activities: u64,
}

/// Parse `dumpsys activity activities`
pub fn activity_features(text: &str) -> ActivityFeatures {
    ActivityFeatures {
        foreground_app: FOREGROUND_APP.find(text).map(str::to_string),
        running_activities: RUNNING_ACTIVITY.count(text) as u64,
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WifiFeatures {
    pub ssid: Option<String>,
    pub rssi_dbm: Option<i32>,
    pub link_mbps: Option<u32>,
}

/// Parse `dumpsys wifi`, reading only the `mWifiInfo` line when present
pub fn wifi_features(text: &str) -> WifiFeatures {
    // Saved-network and scan sections also carry SSID fields
    let text = text
        .lines()
        .find(|line| line.contains(WIFI_INFO_MARKER))
        .unwrap_or(text);

    let ssid = WIFI_SSID
        .find(text)
        .map(str::trim)
        .filter(|ssid| !ssid.is_empty() && *ssid != UNKNOWN_SSID)
        .map(str::to_string);

    WifiFeatures {
        ssid,
        rssi_dbm: WIFI_RSSI.parse(text),
        link_mbps: WIFI_LINK.parse(text),
    }
}
