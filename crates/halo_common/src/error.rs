//! Error types for the update engine.
//!
//! Each pipeline stage has its own error enum. `UpdateError` aggregates them
//! and `ErrorKind` carries the ledger policy: which failures blame the
//! release (and mark it incompatible) and which blame the device or network.

use crate::scripts::ScriptKind;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("Invalid version string: {0:?}")]
    Parse(String),
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Invalid manifest JSON: {0}")]
    Decode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("Release descriptor has no checksum")]
    MissingChecksum,

    #[error("Insufficient storage: {required} bytes required, {available} available")]
    InsufficientStorage { required: u64, available: u64 },

    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Malformed ZIP archive: {0}")]
    Format(String),

    #[error("Unsupported compression method {method} for {name}")]
    UnsupportedCompression { name: String, method: u16 },

    #[error("Unsafe entry path: {0}")]
    UnsafePath(String),

    #[error("CRC mismatch for {0}")]
    Crc(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum StageError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("Package manifest missing from archive")]
    MissingManifest,

    #[error("Invalid package manifest: {0}")]
    InvalidManifest(String),

    #[error("Package missing critical files: {}", .0.join(", "))]
    MissingCriticalFiles(Vec<String>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompatibilityError {
    #[error("Machine type {device:?} not targeted (targets: {targets:?})")]
    MachineType { device: String, targets: Vec<String> },

    #[error("OS {device:?} not targeted (targets: {targets:?})")]
    OperatingSystem { device: String, targets: Vec<String> },

    #[error("Version {candidate} is not newer than {current}")]
    NotNewer { current: String, candidate: String },

    #[error("Version {0} is marked incompatible")]
    MarkedIncompatible(String),

    #[error("Version {candidate} requires at least {required}, device has {current}")]
    MinimumPriorVersion {
        candidate: String,
        required: String,
        current: String,
    },

    #[error(transparent)]
    Version(#[from] VersionError),
}

#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("{kind} script for {version} is flagged but not found")]
    NotFound { kind: ScriptKind, version: String },

    #[error("{kind} script for {version} failed: {reason}")]
    Failed {
        kind: ScriptKind,
        version: String,
        reason: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScriptError {
    pub fn kind(&self) -> Option<ScriptKind> {
        match self {
            ScriptError::NotFound { kind, .. } | ScriptError::Failed { kind, .. } => Some(*kind),
            ScriptError::Io(_) => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum RecoveryError {
    #[error("No recovery backup available")]
    NoBackup,

    #[error("Recovery backup incomplete: {}", .0.join(", "))]
    Incomplete(Vec<String>),

    #[error("Recovery backup hash mismatch: {0}")]
    HashMismatch(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Top-level error of an update attempt.
#[derive(Error, Debug)]
pub enum UpdateError {
    /// Manifest fetch failed. Retried on the next scheduled check.
    #[error("Transport error: {0}")]
    Transport(#[source] TransportError),

    /// Archive fetch failed after a release was selected.
    #[error("Archive download failed: {0}")]
    ArchiveFetch(#[source] TransportError),

    #[error("Integrity error: {0}")]
    Integrity(String),

    #[error("Compatibility error: {0}")]
    Compatibility(#[from] CompatibilityError),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Script error: {0}")]
    Script(#[from] ScriptError),

    #[error("Corruption detected: {0}")]
    CorruptionDetected(String),
}

/// Failure class of an `UpdateError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    ArchiveFetch,
    Integrity,
    Compatibility,
    Storage,
    PreInstallScript,
    PostInstallScript,
    CorruptionDetected,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Transport => "transport",
            ErrorKind::ArchiveFetch => "archive_fetch",
            ErrorKind::Integrity => "integrity",
            ErrorKind::Compatibility => "compatibility",
            ErrorKind::Storage => "storage",
            ErrorKind::PreInstallScript => "pre_install_script",
            ErrorKind::PostInstallScript => "post_install_script",
            ErrorKind::CorruptionDetected => "corruption_detected",
        }
    }

    /// Whether the release that produced this failure goes into the ledger.
    pub fn marks_incompatible(&self) -> bool {
        match self {
            ErrorKind::Transport | ErrorKind::Storage | ErrorKind::PostInstallScript => false,
            ErrorKind::ArchiveFetch
            | ErrorKind::Integrity
            | ErrorKind::Compatibility
            | ErrorKind::PreInstallScript
            | ErrorKind::CorruptionDetected => true,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl UpdateError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            UpdateError::Transport(_) => ErrorKind::Transport,
            UpdateError::ArchiveFetch(_) => ErrorKind::ArchiveFetch,
            UpdateError::Integrity(_) => ErrorKind::Integrity,
            UpdateError::Compatibility(_) => ErrorKind::Compatibility,
            UpdateError::Storage(_) => ErrorKind::Storage,
            UpdateError::Script(e) => match e.kind() {
                Some(ScriptKind::PostInstall) => ErrorKind::PostInstallScript,
                _ => ErrorKind::PreInstallScript,
            },
            UpdateError::CorruptionDetected(_) => ErrorKind::CorruptionDetected,
        }
    }
}

impl From<TransportError> for UpdateError {
    fn from(e: TransportError) -> Self {
        UpdateError::Transport(e)
    }
}

impl From<std::io::Error> for UpdateError {
    fn from(e: std::io::Error) -> Self {
        UpdateError::Storage(e.to_string())
    }
}

impl From<DownloadError> for UpdateError {
    fn from(e: DownloadError) -> Self {
        match e {
            DownloadError::MissingChecksum | DownloadError::ChecksumMismatch { .. } => {
                UpdateError::Integrity(e.to_string())
            }
            DownloadError::InsufficientStorage { .. } | DownloadError::Io(_) => {
                UpdateError::Storage(e.to_string())
            }
            DownloadError::Transport(t) => UpdateError::ArchiveFetch(t),
        }
    }
}

impl From<StageError> for UpdateError {
    fn from(e: StageError) -> Self {
        match e {
            StageError::Io(_) | StageError::Archive(ArchiveError::Io(_)) => {
                UpdateError::Storage(e.to_string())
            }
            _ => UpdateError::Integrity(e.to_string()),
        }
    }
}
