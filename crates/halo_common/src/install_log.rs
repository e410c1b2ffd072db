//! Install log and boot log
//!
//! `install_log.txt` is truncated at the start of every install attempt and
//! records one line per step plus any install script output. `boot_log.txt`
//! collects boot pipeline messages across boots and is trimmed to
//! `BOOT_LOG_MAX_BYTES`, keeping the newest lines.
//!
//! Line format: RFC 3339 UTC timestamp + step + detail
//! Example: 2026-03-01T17:05:23Z verify 0.7.0 compatible

use chrono::{DateTime, SecondsFormat, Utc};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

pub const BOOT_LOG_MAX_BYTES: u64 = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallStep {
    Begin,
    Verify,
    Reject,
    PreInstall,
    Reset,
    Move,
    Backup,
    PostInstall,
    Script,
    Recovery,
    Complete,
}

impl InstallStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstallStep::Begin => "begin",
            InstallStep::Verify => "verify",
            InstallStep::Reject => "reject",
            InstallStep::PreInstall => "pre_install",
            InstallStep::Reset => "reset",
            InstallStep::Move => "move",
            InstallStep::Backup => "backup",
            InstallStep::PostInstall => "post_install",
            InstallStep::Script => "script",
            InstallStep::Recovery => "recovery",
            InstallStep::Complete => "complete",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "begin" => Some(InstallStep::Begin),
            "verify" => Some(InstallStep::Verify),
            "reject" => Some(InstallStep::Reject),
            "pre_install" => Some(InstallStep::PreInstall),
            "reset" => Some(InstallStep::Reset),
            "move" => Some(InstallStep::Move),
            "backup" => Some(InstallStep::Backup),
            "post_install" => Some(InstallStep::PostInstall),
            "script" => Some(InstallStep::Script),
            "recovery" => Some(InstallStep::Recovery),
            "complete" => Some(InstallStep::Complete),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallLogEntry {
    pub timestamp: DateTime<Utc>,
    pub step: InstallStep,
    pub detail: String,
}

impl InstallLogEntry {
    pub fn new(step: InstallStep, detail: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            step,
            detail: detail.to_string(),
        }
    }

    pub fn to_log_line(&self) -> String {
        format!(
            "{} {} {}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.step.as_str(),
            self.detail
        )
    }

    pub fn from_log_line(line: &str) -> Option<Self> {
        let mut parts = line.splitn(3, ' ');
        let timestamp = DateTime::parse_from_rfc3339(parts.next()?)
            .ok()?
            .with_timezone(&Utc);
        let step = InstallStep::parse(parts.next()?)?;
        let detail = parts.next().unwrap_or("").to_string();
        Some(Self {
            timestamp,
            step,
            detail,
        })
    }
}

/// Writer for `install_log.txt`. Write failures are reported via tracing and
/// never interrupt the install.
#[derive(Debug, Clone)]
pub struct InstallLog {
    path: PathBuf,
}

impl InstallLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Truncate and write the first line of a new attempt.
    pub fn begin_attempt(&self, detail: &str) {
        let entry = InstallLogEntry::new(InstallStep::Begin, detail);
        if let Err(e) = fs::write(&self.path, format!("{}\n", entry.to_log_line())) {
            warn!("Cannot reset install log {}: {}", self.path.display(), e);
        }
    }

    pub fn record(&self, step: InstallStep, detail: &str) {
        let entry = InstallLogEntry::new(step, detail);
        if let Err(e) = append_line(&self.path, &entry.to_log_line()) {
            warn!("Cannot write install log {}: {}", self.path.display(), e);
        }
    }

    /// Record a line of install script output.
    pub fn script_output(&self, line: &str) {
        self.record(InstallStep::Script, line.trim_end());
    }

    pub fn read_entries(&self) -> Vec<InstallLogEntry> {
        fs::read_to_string(&self.path)
            .map(|content| content.lines().filter_map(InstallLogEntry::from_log_line).collect())
            .unwrap_or_default()
    }
}

/// Appending writer for `boot_log.txt`.
#[derive(Debug, Clone)]
pub struct BootLog {
    path: PathBuf,
    max_bytes: u64,
}

impl BootLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_bytes: BOOT_LOG_MAX_BYTES,
        }
    }

    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn append(&self, message: &str) {
        let line = format!(
            "{} {}",
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            message
        );
        let result = append_line(&self.path, &line).and_then(|_| self.trim());
        if let Err(e) = result {
            warn!("Cannot write boot log {}: {}", self.path.display(), e);
        }
    }

    /// Drop the oldest whole lines until the file fits.
    fn trim(&self) -> io::Result<()> {
        let len = fs::metadata(&self.path)?.len();
        if len <= self.max_bytes {
            return Ok(());
        }
        let content = fs::read(&self.path)?;
        let mut cut = content.len() - self.max_bytes as usize;
        while cut < content.len() && content[cut - 1] != b'\n' {
            cut += 1;
        }
        crate::fsutil::atomic_write(&self.path, &content[cut..])
    }

    pub fn tail(&self, lines: usize) -> Vec<String> {
        let content = fs::read_to_string(&self.path).unwrap_or_default();
        let all: Vec<&str> = content.lines().collect();
        all[all.len().saturating_sub(lines)..]
            .iter()
            .map(|l| l.to_string())
            .collect()
    }
}

fn append_line(path: &Path, line: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{}", line)?;
    Ok(())
}
