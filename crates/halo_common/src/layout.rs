//! On-device filesystem layout.
//!
//! All persisted state hangs off a single device root (`/` on hardware, a
//! temp dir in tests). Paths are relative to that root.

use std::path::{Path, PathBuf};

/// Revision of the critical file list below. Bump when the list changes.
pub const CRITICAL_SET_VERSION: u32 = 1;

/// Files whose presence defines a bootable device.
pub const CRITICAL_FILES: &[&str] = &[
    "bin/halod",
    "bin/haloctl",
    "settings.toml",
    "manifest.json",
    "certs/ca-bundle.pem",
];

pub const SETTINGS_FILE: &str = "settings.toml";
pub const SECRETS_FILE: &str = "secrets.json";
pub const PACKAGE_MANIFEST_FILE: &str = "manifest.json";
pub const LEDGER_FILE: &str = "incompatible_releases.json";
pub const DEVELOPMENT_MARKER: &str = "DEVELOPMENT";
pub const RECOVERY_DIR: &str = "recovery";
pub const RECOVERY_INTEGRITY_FILE: &str = ".integrity";
pub const BOOT_LOG_FILE: &str = "boot_log.txt";
pub const INSTALL_LOG_FILE: &str = "install_log.txt";
pub const INSTALL_ATTEMPT_FILE: &str = "install_attempt.json";
pub const PENDING_DIR: &str = "pending_update";
pub const INSTALL_SCRIPTS_DIR: &str = "firmware_install_scripts";

const PENDING_ARCHIVE: &str = "update.zip";
const PENDING_STAGING: &str = ".staging";
const PENDING_ROOT: &str = "root";
const PENDING_READY: &str = ".ready";

/// Top-level entries that survive a full reset.
pub const PRESERVED_PATHS: &[&str] = &[
    SECRETS_FILE,
    LEDGER_FILE,
    DEVELOPMENT_MARKER,
    RECOVERY_DIR,
    BOOT_LOG_FILE,
    INSTALL_LOG_FILE,
    INSTALL_ATTEMPT_FILE,
    PENDING_DIR,
];

/// Filesystem metadata the reset never touches.
const SYSTEM_ENTRIES: &[&str] = &[
    ".trashes",
    ".fseventsd",
    ".metadata_never_index",
    "system volume information",
    "lost+found",
];

/// Case-insensitive match against the preserved set (FAT volumes).
pub fn is_preserved(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    PRESERVED_PATHS
        .iter()
        .chain(SYSTEM_ENTRIES)
        .any(|p| p.eq_ignore_ascii_case(&lower))
}

/// True when any component of a `/`-separated path starts with a dot.
pub fn is_hidden_path(path: &str) -> bool {
    path.split('/').any(|part| part.starts_with('.'))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceLayout {
    root: PathBuf,
}

impl DeviceLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    pub fn settings(&self) -> PathBuf {
        self.path(SETTINGS_FILE)
    }

    pub fn secrets(&self) -> PathBuf {
        self.path(SECRETS_FILE)
    }

    pub fn installed_manifest(&self) -> PathBuf {
        self.path(PACKAGE_MANIFEST_FILE)
    }

    pub fn ledger(&self) -> PathBuf {
        self.path(LEDGER_FILE)
    }

    pub fn development_marker(&self) -> PathBuf {
        self.path(DEVELOPMENT_MARKER)
    }

    pub fn recovery_dir(&self) -> PathBuf {
        self.path(RECOVERY_DIR)
    }

    pub fn recovery_integrity(&self) -> PathBuf {
        self.recovery_dir().join(RECOVERY_INTEGRITY_FILE)
    }

    pub fn boot_log(&self) -> PathBuf {
        self.path(BOOT_LOG_FILE)
    }

    pub fn install_log(&self) -> PathBuf {
        self.path(INSTALL_LOG_FILE)
    }

    pub fn install_attempt(&self) -> PathBuf {
        self.path(INSTALL_ATTEMPT_FILE)
    }

    pub fn pending_dir(&self) -> PathBuf {
        self.path(PENDING_DIR)
    }

    pub fn pending_archive(&self) -> PathBuf {
        self.pending_dir().join(PENDING_ARCHIVE)
    }

    pub fn pending_staging(&self) -> PathBuf {
        self.pending_dir().join(PENDING_STAGING)
    }

    pub fn pending_root(&self) -> PathBuf {
        self.pending_dir().join(PENDING_ROOT)
    }

    pub fn pending_ready(&self) -> PathBuf {
        self.pending_dir().join(PENDING_READY)
    }

    /// Critical files missing from the installed tree.
    pub fn missing_critical_files(&self) -> Vec<String> {
        missing_files(&self.root, CRITICAL_FILES)
    }
}

/// Entries of `files` that are not regular files under `base`.
pub fn missing_files(base: &Path, files: &[&str]) -> Vec<String> {
    files
        .iter()
        .filter(|rel| !base.join(rel).is_file())
        .map(|rel| rel.to_string())
        .collect()
}
