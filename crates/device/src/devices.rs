//! Device enumeration and identification.

use serde::{Deserialize, Serialize};

/// One line of `adb devices` output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceEntry {
    pub id: String,
    /// Connection state as reported by adb (`device`, `offline`, `unauthorized`, ...)
    pub status: String,
}

/// Properties read from a device with `getprop`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDetails {
    pub model: String,
    pub android_version: String,
    pub serial: String,
}

/// A listed device with everything `list_android_devices` reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub id: String,
    pub status: String,
    pub is_emulator: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<DeviceDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details_error: Option<String>,
}

/// Parse `adb devices` output, skipping the header and blank lines.
pub fn parse_device_list(raw: &str) -> Vec<DeviceEntry> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("List of devices") && !line.starts_with('*'))
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let id = parts.next()?;
            let status = parts.next()?;
            Some(DeviceEntry {
                id: id.to_string(),
                status: status.to_string(),
            })
        })
        .collect()
}

/// Emulator serials are recognizable without asking the device.
pub fn id_looks_like_emulator(device_id: &str) -> bool {
    device_id.starts_with("emulator-") || device_id.starts_with("localhost:")
}

/// How a property value is compared.
#[derive(Debug, Clone, Copy)]
pub enum Match {
    Contains(&'static str),
    Equals(&'static str),
    NonEmpty,
}

impl Match {
    pub fn matches(&self, value: &str) -> bool {
        let value = value.trim();
        match self {
            Self::Contains(needle) => value.contains(needle),
            Self::Equals(expected) => value == *expected,
            Self::NonEmpty => !value.is_empty(),
        }
    }
}

/// System properties that identify an emulator image.
pub const EMULATOR_INDICATORS: &[(&str, Match)] = &[
    ("ro.build.fingerprint", Match::Contains("generic")),
    ("ro.hardware", Match::Equals("ranchu")),
    ("ro.hardware", Match::Equals("goldfish")),
    ("ro.product.model", Match::Contains("Android SDK built for")),
    ("qemu.hw.mainkeys", Match::NonEmpty),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_devices_output() {
        let raw = "List of devices attached\n\
                   emulator-5554\tdevice\n\
                   R58M123ABC\tunauthorized\n\
                   \n";
        let devices = parse_device_list(raw);
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].id, "emulator-5554");
        assert_eq!(devices[0].status, "device");
        assert_eq!(devices[1].status, "unauthorized");
    }

    #[test]
    fn parse_devices_skips_daemon_noise() {
        let raw = "* daemon not running; starting now at tcp:5037\n\
                   * daemon started successfully\n\
                   List of devices attached\n";
        assert!(parse_device_list(raw).is_empty());
    }

    #[test]
    fn long_format_keeps_id_and_status() {
        let raw = "List of devices attached\n\
                   0123456789ABCDEF       device usb:1-1 product:sunfish model:Pixel_4a\n";
        let devices = parse_device_list(raw);
        assert_eq!(devices[0].id, "0123456789ABCDEF");
        assert_eq!(devices[0].status, "device");
    }

    #[test]
    fn emulator_ids() {
        assert!(id_looks_like_emulator("emulator-5554"));
        assert!(id_looks_like_emulator("localhost:5555"));
        assert!(!id_looks_like_emulator("R58M123ABC"));
    }

    #[test]
    fn indicator_matching() {
        assert!(Match::Contains("generic").matches("google/sdk_gphone64/generic_x86_64:14"));
        assert!(Match::Equals("ranchu").matches("ranchu\n"));
        assert!(!Match::Equals("ranchu").matches("qcom"));
        assert!(Match::NonEmpty.matches("1"));
        assert!(!Match::NonEmpty.matches("  \n"));
    }
}
