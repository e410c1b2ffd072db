//! Incompatible release ledger
//!
//! Versions that failed to download, verify, stage or install. A version in
//! the ledger is never selected again (one-strike policy). The list is
//! ordered oldest first and capped at `LEDGER_CAPACITY`; the oldest entry is
//! evicted when a new one arrives.
//!
//! Format: `{"entries": [{"version", "reason", "attempts", "recorded_at"}]}`.
//! Older files using `{"versions": [...]}` or `{"releases": {ver: {...}}}`
//! are read and rewritten in the current shape on the next save.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use tracing::warn;

use crate::fsutil::write_json_and_sync;

pub const LEDGER_CAPACITY: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub version: String,
    pub reason: String,
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    pub recorded_at: DateTime<Utc>,
}

fn default_attempts() -> u32 {
    1
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncompatibleLedger {
    #[serde(default)]
    entries: Vec<LedgerEntry>,
}

impl IncompatibleLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from disk. Missing or corrupt files yield an empty ledger.
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(content) => Self::parse(&content).unwrap_or_else(|| {
                warn!("Corrupt ledger at {}; starting empty", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Self::default(),
            Err(e) => {
                warn!("Cannot read ledger {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        write_json_and_sync(path, self)
    }

    /// Parse any known ledger shape.
    pub fn parse(content: &str) -> Option<Self> {
        let value: serde_json::Value = serde_json::from_str(content).ok()?;

        if value.get("entries").is_some() {
            let mut ledger: Self = serde_json::from_value(value).ok()?;
            ledger.enforce_capacity();
            return Some(ledger);
        }

        let now = Utc::now();
        let mut ledger = Self::default();
        if let Some(versions) = value.get("versions").and_then(|v| v.as_array()) {
            for version in versions.iter().filter_map(|v| v.as_str()) {
                ledger.push_migrated(version, "unknown (migrated)", 1, now);
            }
        } else if let Some(releases) = value.get("releases").and_then(|v| v.as_object()) {
            for (version, info) in releases {
                let reason = info
                    .get("last_reason")
                    .or_else(|| info.get("reason"))
                    .and_then(|r| r.as_str())
                    .unwrap_or("unknown (migrated)");
                let attempts = info
                    .get("attempts")
                    .and_then(|a| a.as_u64())
                    .unwrap_or(1) as u32;
                ledger.push_migrated(version, reason, attempts, now);
            }
        } else {
            return None;
        }
        ledger.enforce_capacity();
        Some(ledger)
    }

    fn push_migrated(&mut self, version: &str, reason: &str, attempts: u32, at: DateTime<Utc>) {
        if self.contains(version) {
            return;
        }
        self.entries.push(LedgerEntry {
            version: version.to_string(),
            reason: reason.to_string(),
            attempts: attempts.max(1),
            recorded_at: at,
        });
    }

    pub fn contains(&self, version: &str) -> bool {
        self.entries.iter().any(|e| e.version == version)
    }

    pub fn get(&self, version: &str) -> Option<&LedgerEntry> {
        self.entries.iter().find(|e| e.version == version)
    }

    /// Record a rejected version.
    ///
    /// A version already present has its attempt counter bumped and moves to
    /// the most recent position; it is never duplicated.
    pub fn record(&mut self, version: &str, reason: &str) {
        let now = Utc::now();
        let entry = match self.entries.iter().position(|e| e.version == version) {
            Some(idx) => {
                let mut existing = self.entries.remove(idx);
                existing.attempts = existing.attempts.saturating_add(1);
                existing.reason = reason.to_string();
                existing.recorded_at = now;
                existing
            }
            None => LedgerEntry {
                version: version.to_string(),
                reason: reason.to_string(),
                attempts: 1,
                recorded_at: now,
            },
        };
        self.entries.push(entry);
        self.enforce_capacity();
    }

    fn enforce_capacity(&mut self) {
        if self.entries.len() > LEDGER_CAPACITY {
            let excess = self.entries.len() - LEDGER_CAPACITY;
            self.entries.drain(..excess);
        }
    }

    /// Oldest first.
    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn versions(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.version.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
