//! Recovery backup and guardian
//!
//! `recovery/` holds a copy of every critical file plus `.integrity`, a JSON
//! record of their SHA-256 digests. It is refreshed only after a successful
//! full-reset install and is never deleted by the update path.
//!
//! The guardian runs first at every boot. If any critical file is missing it
//! restores the whole critical set from the backup, blames the version that
//! was being installed (one strike) and asks for a reboot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use tracing::{error, info, warn};

use crate::attempt::InstallAttempt;
use crate::error::RecoveryError;
use crate::fsutil::{copy_synced, remove_path, sha256_file, write_json_and_sync};
use crate::layout::{DeviceLayout, CRITICAL_FILES, CRITICAL_SET_VERSION};
use crate::stage::clear_pending;
use crate::storage::StatePort;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupIntegrity {
    pub version: String,
    pub critical_set_version: u32,
    pub created_at: DateTime<Utc>,
    /// Relative path -> hex SHA-256
    pub files: BTreeMap<String, String>,
}

impl BackupIntegrity {
    pub fn load(layout: &DeviceLayout) -> Option<Self> {
        let content = fs::read_to_string(layout.recovery_integrity()).ok()?;
        serde_json::from_str(&content).ok()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackupReport {
    pub exists: bool,
    pub version: Option<String>,
    pub missing: Vec<String>,
    pub mismatched: Vec<String>,
}

impl BackupReport {
    pub fn is_valid(&self) -> bool {
        self.exists && self.missing.is_empty() && self.mismatched.is_empty()
    }
}

/// Replace the recovery backup with the currently installed critical files.
///
/// The existing backup is left untouched when the live set is incomplete.
pub fn create_recovery_backup(
    layout: &DeviceLayout,
    version: &str,
) -> Result<BackupIntegrity, RecoveryError> {
    let missing = layout.missing_critical_files();
    if !missing.is_empty() {
        return Err(RecoveryError::Incomplete(missing));
    }

    let dir = layout.recovery_dir();
    remove_path(&dir);
    fs::create_dir_all(&dir)?;

    let mut files = BTreeMap::new();
    for rel in CRITICAL_FILES {
        let src = layout.path(rel);
        copy_synced(&src, &dir.join(rel))?;
        files.insert(rel.to_string(), sha256_file(&src)?);
    }

    let integrity = BackupIntegrity {
        version: version.to_string(),
        critical_set_version: CRITICAL_SET_VERSION,
        created_at: Utc::now(),
        files,
    };
    write_json_and_sync(&layout.recovery_integrity(), &integrity)?;

    let report = validate_backup(layout);
    if !report.missing.is_empty() {
        return Err(RecoveryError::Incomplete(report.missing));
    }
    if let Some(bad) = report.mismatched.first() {
        return Err(RecoveryError::HashMismatch(bad.clone()));
    }

    info!("Recovery backup refreshed for {}", version);
    Ok(integrity)
}

/// Check the backup for completeness and, when `.integrity` exists, content.
pub fn validate_backup(layout: &DeviceLayout) -> BackupReport {
    let dir = layout.recovery_dir();
    if !dir.is_dir() {
        return BackupReport::default();
    }

    let integrity = BackupIntegrity::load(layout);
    let mut report = BackupReport {
        exists: true,
        version: integrity.as_ref().map(|i| i.version.clone()),
        ..Default::default()
    };

    for rel in CRITICAL_FILES {
        let path = dir.join(rel);
        if !path.is_file() {
            report.missing.push(rel.to_string());
            continue;
        }
        let expected = integrity.as_ref().and_then(|i| i.files.get(*rel));
        if let Some(expected) = expected {
            match sha256_file(&path) {
                Ok(actual) if &actual == expected => {}
                _ => report.mismatched.push(rel.to_string()),
            }
        }
    }
    report
}

/// Copy every critical file from the backup into place.
pub fn restore_from_backup(layout: &DeviceLayout) -> Result<Vec<String>, RecoveryError> {
    let report = validate_backup(layout);
    if !report.exists {
        return Err(RecoveryError::NoBackup);
    }
    if !report.missing.is_empty() {
        return Err(RecoveryError::Incomplete(report.missing));
    }
    if let Some(bad) = report.mismatched.first() {
        return Err(RecoveryError::HashMismatch(bad.clone()));
    }

    let dir = layout.recovery_dir();
    let mut restored = Vec::new();
    for rel in CRITICAL_FILES {
        copy_synced(&dir.join(rel), &layout.path(rel))?;
        restored.push(rel.to_string());
    }
    Ok(restored)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryOutcome {
    NotNeeded,
    Restored {
        missing: Vec<String>,
        blamed_version: Option<String>,
    },
    /// Critical files missing and nothing to restore from
    NoBackup { missing: Vec<String> },
    Failed { reason: String },
}

impl RecoveryOutcome {
    pub fn reboot_required(&self) -> bool {
        matches!(self, RecoveryOutcome::Restored { .. })
    }
}

/// Boot-time safety net.
pub fn run_recovery_guardian(layout: &DeviceLayout, state: &mut dyn StatePort) -> RecoveryOutcome {
    let missing = layout.missing_critical_files();
    if missing.is_empty() {
        return RecoveryOutcome::NotNeeded;
    }

    error!("Corruption detected: missing critical files {:?}", missing);

    let restored = match restore_from_backup(layout) {
        Ok(restored) => restored,
        Err(RecoveryError::NoBackup) => {
            error!("No recovery backup available; continuing boot");
            return RecoveryOutcome::NoBackup { missing };
        }
        Err(e) => {
            error!("Recovery failed: {}", e);
            return RecoveryOutcome::Failed {
                reason: e.to_string(),
            };
        }
    };
    info!("Restored {} critical files from recovery backup", restored.len());

    let blamed_version = InstallAttempt::load(&layout.install_attempt()).map(|a| a.target_version);
    if let Some(version) = &blamed_version {
        let reason = format!("corruption detected after install; restored {:?}", missing);
        if let Err(e) = state.mark_incompatible(version, &reason) {
            warn!("Cannot record {} as incompatible: {}", version, e);
        }
    }
    if let Err(e) = InstallAttempt::remove(&layout.install_attempt()) {
        warn!("Cannot remove install marker: {}", e);
    }
    clear_pending(layout);

    RecoveryOutcome::Restored {
        missing,
        blamed_version,
    }
}
