//! Device identity: who is asking for an update.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::DeviceSettings;

/// Release channel. `Development` iff the `DEVELOPMENT` marker file exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    #[default]
    Production,
    Development,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Production => "production",
            Channel::Development => "development",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub machine_type: String,
    pub os_version: String,
    pub current_firmware_version: String,
    pub channel: Channel,
}

impl DeviceIdentity {
    pub fn from_settings(settings: &DeviceSettings, channel: Channel) -> Self {
        Self {
            machine_type: settings.machine_type.clone(),
            os_version: settings.os_version.clone(),
            current_firmware_version: settings.version.clone(),
            channel,
        }
    }

    /// True when the device OS falls in the same `<os>_<major>_<minor>`
    /// bucket as `target`.
    pub fn os_matches(&self, target: &str) -> bool {
        match (os_bucket(&self.os_version), os_bucket(target)) {
            (Some(device), Some(target)) => device == target,
            _ => false,
        }
    }
}

/// Reduce `circuitpython_10_1_4` to `("circuitpython", 10, 1)`.
///
/// The OS name is everything before the first numeric component; at least
/// major and minor must be present.
pub fn os_bucket(os_version: &str) -> Option<(String, u32, u32)> {
    let parts: Vec<&str> = os_version.trim().split('_').collect();
    let first_numeric = parts
        .iter()
        .position(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()))?;
    if first_numeric == 0 {
        return None;
    }

    let name = parts[..first_numeric].join("_").to_ascii_lowercase();
    let major = parts.get(first_numeric)?.parse().ok()?;
    let minor = parts.get(first_numeric + 1)?.parse().ok()?;
    Some((name, major, minor))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(os: &str) -> DeviceIdentity {
        DeviceIdentity {
            machine_type: "halo_s3_v1".into(),
            os_version: os.into(),
            current_firmware_version: "0.1.0".into(),
            channel: Channel::Production,
        }
    }

    #[test]
    fn test_os_bucket_parse() {
        assert_eq!(
            os_bucket("circuitpython_10_1_4"),
            Some(("circuitpython".into(), 10, 1))
        );
        assert_eq!(
            os_bucket("micro_python_1_22"),
            Some(("micro_python".into(), 1, 22))
        );
        assert_eq!(os_bucket("circuitpython_10"), None);
        assert_eq!(os_bucket("10_1"), None);
        assert_eq!(os_bucket(""), None);
    }

    #[test]
    fn test_os_bucket_exact_match() {
        let device = identity("circuitpython_10_1_3");
        assert!(device.os_matches("circuitpython_10_1"));
        assert!(device.os_matches("circuitpython_10_1_0"));
        assert!(!device.os_matches("circuitpython_10_0"));
        assert!(!device.os_matches("circuitpython_11_0"));
        assert!(!device.os_matches("micropython_10_1"));
    }
}
