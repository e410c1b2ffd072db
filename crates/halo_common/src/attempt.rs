//! Install attempt marker (`install_attempt.json`)
//!
//! Written before a full reset starts and advanced as the install moves
//! through its phases; removed once the install completes. Survives the
//! reset (it is in the preserved set) so the next boot can tell which
//! version was being installed and where the install stopped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::fsutil::write_json_and_sync;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallPhase {
    /// Deleting the old firmware tree
    Resetting,
    /// Moving files out of the pending root
    Moving,
    /// Files in place; backup and post-install hook remain
    Finalizing,
}

impl InstallPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstallPhase::Resetting => "resetting",
            InstallPhase::Moving => "moving",
            InstallPhase::Finalizing => "finalizing",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallAttempt {
    pub attempt_id: Uuid,
    pub target_version: String,
    pub previous_version: String,
    pub phase: InstallPhase,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    path: PathBuf,
}

impl InstallAttempt {
    /// Create and persist a new marker in the `Resetting` phase.
    pub fn begin(path: &Path, target_version: &str, previous_version: &str) -> io::Result<Self> {
        let now = Utc::now();
        let attempt = Self {
            attempt_id: Uuid::new_v4(),
            target_version: target_version.to_string(),
            previous_version: previous_version.to_string(),
            phase: InstallPhase::Resetting,
            started_at: now,
            updated_at: now,
            path: path.to_path_buf(),
        };
        attempt.save()?;
        Ok(attempt)
    }

    /// Load the marker; a missing or unreadable marker reads as none.
    pub fn load(path: &Path) -> Option<Self> {
        let content = fs::read_to_string(path).ok()?;
        let mut attempt: Self = serde_json::from_str(&content).ok()?;
        attempt.path = path.to_path_buf();
        Some(attempt)
    }

    pub fn save(&self) -> io::Result<()> {
        write_json_and_sync(&self.path, self)
    }

    pub fn remove(path: &Path) -> io::Result<()> {
        match fs::remove_file(path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    /// Advance the phase and persist.
    pub fn update_phase(&mut self, phase: InstallPhase) -> io::Result<()> {
        self.phase = phase;
        self.updated_at = Utc::now();
        self.save()
    }

    /// The file deletions are done; the move can be resumed.
    pub fn is_resumable(&self) -> bool {
        matches!(self.phase, InstallPhase::Moving | InstallPhase::Finalizing)
    }
}
