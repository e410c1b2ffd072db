//! Release manifest and package manifest
//!
//! The release manifest is published by the update server and maps
//! hardware/OS groups to release descriptors. The package manifest
//! (`manifest.json`) travels inside every release archive and stays at the
//! device root after install.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use tracing::warn;

use crate::device::Channel;
use crate::version::FirmwareVersion;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseDescriptor {
    pub version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_prior_version: Option<String>,

    /// Inherited from the group when omitted
    #[serde(default)]
    pub target_machine_types: Vec<String>,

    /// Inherited from the group when omitted
    #[serde(default)]
    pub target_operating_systems: Vec<String>,

    #[serde(default)]
    pub channel: Channel,

    #[serde(alias = "zip_url")]
    pub archive_url: String,

    #[serde(default)]
    pub sha256: String,

    #[serde(default)]
    pub release_notes: String,

    #[serde(default)]
    pub release_date: String,
}

impl ReleaseDescriptor {
    pub fn parsed_version(&self) -> Option<FirmwareVersion> {
        FirmwareVersion::parse(&self.version).ok()
    }

    /// Release date as a timestamp; accepts RFC 3339, `YYYY-MM-DDTHH:MM:SS`
    /// and bare `YYYY-MM-DD`.
    pub fn release_timestamp(&self) -> Option<NaiveDateTime> {
        let raw = self.release_date.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.naive_utc());
        }
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
            return Some(dt);
        }
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseGroup {
    #[serde(default)]
    pub target_machine_types: Vec<String>,

    #[serde(default)]
    pub target_operating_systems: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub production: Option<ReleaseDescriptor>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub development: Option<ReleaseDescriptor>,

    /// Older releases, newest first
    #[serde(default)]
    pub archive: Vec<ReleaseDescriptor>,
}

impl ReleaseGroup {
    pub fn targets_machine(&self, machine_type: &str) -> bool {
        self.target_machine_types.iter().any(|m| m == machine_type)
    }

    fn inherit_targets(&mut self) {
        let machines = &self.target_machine_types;
        let systems = &self.target_operating_systems;
        let fill = |d: &mut ReleaseDescriptor, channel: Channel| {
            if d.target_machine_types.is_empty() {
                d.target_machine_types = machines.clone();
            }
            if d.target_operating_systems.is_empty() {
                d.target_operating_systems = systems.clone();
            }
            d.channel = channel;
        };
        if let Some(d) = self.production.as_mut() {
            fill(d, Channel::Production);
        }
        if let Some(d) = self.development.as_mut() {
            fill(d, Channel::Development);
        }
        for d in self.archive.iter_mut() {
            let channel = d.channel;
            fill(d, channel);
        }
    }

    /// Check the group invariants: archive strictly newest-first, current
    /// channel releases absent from the archive.
    pub fn validate(&self) -> Result<(), String> {
        for pair in self.archive.windows(2) {
            let (newer, older) = (&pair[0], &pair[1]);
            let descending = match (newer.release_timestamp(), older.release_timestamp()) {
                (Some(a), Some(b)) => a > b,
                _ => match (newer.parsed_version(), older.parsed_version()) {
                    (Some(a), Some(b)) => a > b,
                    _ => false,
                },
            };
            if !descending {
                return Err(format!(
                    "archive not in descending order at {} -> {}",
                    newer.version, older.version
                ));
            }
        }

        for current in [&self.production, &self.development].into_iter().flatten() {
            if self.archive.iter().any(|a| a.version == current.version) {
                return Err(format!("version {} appears in archive", current.version));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub schema_version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,

    #[serde(default)]
    pub releases: Vec<ReleaseGroup>,
}

impl Manifest {
    /// Parse and resolve target inheritance.
    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        let mut manifest: Manifest = serde_json::from_str(content)?;
        for group in manifest.releases.iter_mut() {
            group.inherit_targets();
        }
        Ok(manifest)
    }

    /// Groups that pass validation. Invalid groups are logged and skipped.
    pub fn valid_groups(&self) -> impl Iterator<Item = &ReleaseGroup> {
        self.releases.iter().filter(|group| match group.validate() {
            Ok(()) => true,
            Err(reason) => {
                warn!(
                    "Skipping manifest group {:?}: {}",
                    group.target_machine_types, reason
                );
                false
            }
        })
    }

    /// First valid group targeting `machine_type`.
    pub fn group_for(&self, machine_type: &str) -> Option<&ReleaseGroup> {
        self.valid_groups().find(|g| g.targets_machine(machine_type))
    }
}

/// `manifest.json` inside a release archive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageManifest {
    #[serde(default)]
    pub schema_version: String,

    pub version: String,

    #[serde(default)]
    pub target_machine_types: Vec<String>,

    #[serde(default)]
    pub target_operating_systems: Vec<String>,

    #[serde(default)]
    pub release_type: String,

    #[serde(default)]
    pub release_notes: String,

    #[serde(default)]
    pub release_date: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_prior_version: Option<String>,

    /// Ships only install scripts, no firmware tree
    #[serde(default)]
    pub script_only_release: bool,

    #[serde(default)]
    pub has_pre_install_script: bool,

    #[serde(default)]
    pub has_post_install_script: bool,
}

impl PackageManifest {
    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    pub fn load(path: &Path) -> io::Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// View as a release descriptor for the shared compatibility check.
    pub fn as_descriptor(&self) -> ReleaseDescriptor {
        ReleaseDescriptor {
            version: self.version.clone(),
            minimum_prior_version: self.minimum_prior_version.clone(),
            target_machine_types: self.target_machine_types.clone(),
            target_operating_systems: self.target_operating_systems.clone(),
            channel: if self.release_type == "development" {
                Channel::Development
            } else {
                Channel::Production
            },
            archive_url: String::new(),
            sha256: String::new(),
            release_notes: self.release_notes.clone(),
            release_date: self.release_date.clone(),
        }
    }
}
