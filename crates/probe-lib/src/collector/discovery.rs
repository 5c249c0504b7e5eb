//! Device discovery
//!
//! Parses `adb devices` output and picks the device to sample. Runs once
//! at startup; any failure here ends the run before sampling begins.

use super::{Bridge, BridgeError};
use thiserror::Error;
use tracing::{debug, info};

/// State reported by the bridge for a device that accepts commands
pub const READY_STATE: &str = "device";

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("no device in `device` state is attached")]
    NoDevice,

    #[error("device `{0}` is not attached")]
    NotFound(String),

    #[error("device `{serial}` is not ready (state: {state})")]
    NotReady { serial: String, state: String },

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

/// How to choose the device to sample
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceSelector {
    /// First device reporting the ready state
    FirstAvailable,
    /// A specific serial
    Serial(String),
}

impl DeviceSelector {
    /// `first` (any case) or an empty string selects the first ready device
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        if value.is_empty() || value.eq_ignore_ascii_case("first") {
            DeviceSelector::FirstAvailable
        } else {
            DeviceSelector::Serial(value.to_string())
        }
    }
}

/// One line of `adb devices`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEntry {
    pub serial: String,
    pub state: String,
}

impl DeviceEntry {
    pub fn is_ready(&self) -> bool {
        self.state == READY_STATE
    }
}

/// Parse `adb devices` output into entries, in listed order
pub fn parse_devices(output: &str) -> Vec<DeviceEntry> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !line.starts_with("List of devices") && !line.starts_with('*'))
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let serial = parts.next()?;
            let state = parts.next()?;
            Some(DeviceEntry {
                serial: serial.to_string(),
                state: state.to_string(),
            })
        })
        .collect()
}

/// Pick the device named by the selector from a parsed list
pub fn select_device(
    entries: &[DeviceEntry],
    selector: &DeviceSelector,
) -> Result<String, DiscoveryError> {
    match selector {
        DeviceSelector::FirstAvailable => entries
            .iter()
            .find(|entry| entry.is_ready())
            .map(|entry| entry.serial.clone())
            .ok_or(DiscoveryError::NoDevice),
        DeviceSelector::Serial(serial) => {
            let entry = entries
                .iter()
                .find(|entry| &entry.serial == serial)
                .ok_or_else(|| DiscoveryError::NotFound(serial.clone()))?;

            if entry.is_ready() {
                Ok(entry.serial.clone())
            } else {
                Err(DiscoveryError::NotReady {
                    serial: entry.serial.clone(),
                    state: entry.state.clone(),
                })
            }
        }
    }
}

/// List attached devices through the bridge and select one
pub async fn discover_device(
    bridge: &dyn Bridge,
    selector: &DeviceSelector,
) -> Result<String, DiscoveryError> {
    let output = bridge.list_devices().await?;
    let entries = parse_devices(&output);
    debug!(count = entries.len(), "Enumerated attached devices");

    let serial = select_device(&entries, selector)?;
    info!(serial = %serial, "Selected device");
    Ok(serial)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEVICES: &str = "\
* daemon not running; starting now at tcp:5037
* daemon started successfully
List of devices attached
0123456789ABCDEF\tunauthorized
emulator-5554\tdevice
R58M123ABC\tdevice usb:1-1 product:a30 model:SM_A305F device:a30 transport_id:2
";

    #[test]
    fn test_parse_devices_skips_header_and_daemon_lines() {
        let entries = parse_devices(DEVICES);

        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].serial, "0123456789ABCDEF");
        assert_eq!(entries[0].state, "unauthorized");
        assert_eq!(entries[2].serial, "R58M123ABC");
        assert!(entries[2].is_ready());
    }

    #[test]
    fn test_parse_devices_empty_list() {
        assert!(parse_devices("List of devices attached\n\n").is_empty());
        assert!(parse_devices("").is_empty());
    }

    #[test]
    fn test_select_first_ready_device() {
        let entries = parse_devices(DEVICES);
        let serial = select_device(&entries, &DeviceSelector::FirstAvailable).unwrap();
        assert_eq!(serial, "emulator-5554");
    }

    #[test]
    fn test_select_explicit_serial() {
        let entries = parse_devices(DEVICES);

        let serial =
            select_device(&entries, &DeviceSelector::Serial("R58M123ABC".into())).unwrap();
        assert_eq!(serial, "R58M123ABC");

        let err = select_device(&entries, &DeviceSelector::Serial("0123456789ABCDEF".into()))
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::NotReady { ref state, .. } if state == "unauthorized"));

        let err = select_device(&entries, &DeviceSelector::Serial("missing".into())).unwrap_err();
        assert!(matches!(err, DiscoveryError::NotFound(_)));
    }

    #[test]
    fn test_no_ready_device() {
        let entries = parse_devices("List of devices attached\nabc\toffline\n");
        assert!(matches!(
            select_device(&entries, &DeviceSelector::FirstAvailable),
            Err(DiscoveryError::NoDevice)
        ));
    }

    #[test]
    fn test_selector_parse() {
        assert_eq!(DeviceSelector::parse("first"), DeviceSelector::FirstAvailable);
        assert_eq!(DeviceSelector::parse("FIRST"), DeviceSelector::FirstAvailable);
        assert_eq!(DeviceSelector::parse(""), DeviceSelector::FirstAvailable);
        assert_eq!(
            DeviceSelector::parse(" emulator-5554 "),
            DeviceSelector::Serial("emulator-5554".into())
        );
    }
}
