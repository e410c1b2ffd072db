//! Device settings
//!
//! Lives in `settings.toml` at the device root and ships inside every full
//! release, so installing firmware also installs its settings. Unknown keys
//! (weather, LED and portal settings owned by other subsystems) are left
//! untouched when the engine rewrites the file.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use tracing::warn;

use crate::fsutil::atomic_write;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSettings {
    /// Installed firmware version
    #[serde(default = "default_version")]
    pub version: String,

    /// Release manifest endpoint
    #[serde(default = "default_manifest_url")]
    pub manifest_url: String,

    /// Hours between scheduled update checks (valid: 1-168)
    #[serde(default = "default_check_interval_hours")]
    pub update_check_interval_hours: u64,

    #[serde(default = "default_machine_type")]
    pub machine_type: String,

    /// `<os>_<major>_<minor>[_<patch>]`, e.g. `circuitpython_10_1_4`
    #[serde(default = "default_os_version")]
    pub os_version: String,

    /// Safety margin kept free on top of the archive size
    #[serde(default = "default_min_free_space")]
    pub min_free_space_bytes: u64,

    /// Download read size (valid: 512-16384)
    #[serde(default = "default_chunk_size")]
    pub download_chunk_size: usize,

    /// Delay before the first scheduled check after boot
    #[serde(default = "default_boot_check_delay")]
    pub boot_check_delay_secs: u64,
}

fn default_version() -> String {
    "0.0.0".to_string()
}

fn default_manifest_url() -> String {
    "https://updates.halo-ambient.net/releases.json".to_string()
}

fn default_check_interval_hours() -> u64 {
    24
}

fn default_machine_type() -> String {
    "halo_s3_v1".to_string()
}

fn default_os_version() -> String {
    "circuitpython_10_1".to_string()
}

fn default_min_free_space() -> u64 {
    200_000
}

fn default_chunk_size() -> usize {
    2048
}

fn default_boot_check_delay() -> u64 {
    60
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            version: default_version(),
            manifest_url: default_manifest_url(),
            update_check_interval_hours: default_check_interval_hours(),
            machine_type: default_machine_type(),
            os_version: default_os_version(),
            min_free_space_bytes: default_min_free_space(),
            download_chunk_size: default_chunk_size(),
            boot_check_delay_secs: default_boot_check_delay(),
        }
    }
}

impl DeviceSettings {
    /// Load settings, falling back to defaults when missing or unreadable.
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(settings) => settings,
                Err(e) => {
                    warn!("Invalid {}: {}; using defaults", path.display(), e);
                    Self::default()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => Self::default(),
            Err(e) => {
                warn!("Cannot read {}: {}; using defaults", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        atomic_write(path, content.as_bytes())
    }

    /// Clamp update_check_interval_hours to 1-168
    pub fn effective_check_interval_hours(&self) -> u64 {
        self.update_check_interval_hours.clamp(1, 168)
    }

    /// Clamp download_chunk_size to 512-16384
    pub fn effective_chunk_size(&self) -> usize {
        self.download_chunk_size.clamp(512, 16384)
    }

    pub fn check_interval_was_clamped(&self) -> bool {
        self.update_check_interval_hours != self.effective_check_interval_hours()
    }
}

/// Rewrite only the `version` key of `settings.toml`, keeping every other
/// key as it was. Used by script-only releases, which ship no settings file.
pub fn set_installed_version(path: &Path, version: &str) -> io::Result<()> {
    let mut table: toml::Table = match fs::read_to_string(path) {
        Ok(content) => toml::from_str(&content)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => toml::Table::new(),
        Err(e) => return Err(e),
    };
    table.insert(
        "version".to_string(),
        toml::Value::String(version.to_string()),
    );
    let content = toml::to_string_pretty(&table)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    atomic_write(path, content.as_bytes())
}

/// User credentials written by the setup portal. Read-only to the engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Secrets {
    /// Opaque tag sent in the device identification header
    #[serde(default)]
    pub location_tag: String,
}

impl Secrets {
    pub fn load(path: &Path) -> Self {
        fs::read_to_string(path)
            .ok()
            .and_then(|content| serde_json::from_str(&content).ok())
            .unwrap_or_default()
    }
}
