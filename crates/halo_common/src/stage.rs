//! Staging installer and the pending update singleton
//!
//! Layout under `pending_update/`:
//! - `update.zip`  downloaded archive
//! - `.staging/`   extraction target
//! - `root/`       promoted tree, installed at next boot
//! - `.ready`      hex SHA-256 of `root/manifest.json`
//!
//! `root/` only ever appears through a single rename of `.staging/`, and
//! `.ready` is written after that rename. A root without a matching ready
//! marker is inert and gets cleaned up at boot.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::archive::ZipArchive;
use crate::coop::Cooperative;
use crate::error::StageError;
use crate::fsutil::{atomic_write, remove_path, sha256_file, sync_parent};
use crate::layout::{missing_files, DeviceLayout, CRITICAL_FILES, PACKAGE_MANIFEST_FILE};
use crate::manifest::PackageManifest;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingUpdate {
    pub download_path: PathBuf,
    pub staging_path: PathBuf,
    pub promoted_root_path: PathBuf,
    pub ready_marker: PathBuf,
}

impl PendingUpdate {
    pub fn for_layout(layout: &DeviceLayout) -> Self {
        Self {
            download_path: layout.pending_archive(),
            staging_path: layout.pending_staging(),
            promoted_root_path: layout.pending_root(),
            ready_marker: layout.pending_ready(),
        }
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.promoted_root_path.join(PACKAGE_MANIFEST_FILE)
    }

    pub fn manifest(&self) -> io::Result<PackageManifest> {
        PackageManifest::load(&self.manifest_path())
    }

    /// Root is present, non-empty, and the ready marker matches its manifest.
    pub fn is_ready(&self) -> bool {
        let root_has_entries = fs::read_dir(&self.promoted_root_path)
            .map(|mut entries| entries.next().is_some())
            .unwrap_or(false);
        if !root_has_entries {
            return false;
        }

        let recorded = match fs::read_to_string(&self.ready_marker) {
            Ok(s) => s.trim().to_ascii_lowercase(),
            Err(_) => return false,
        };
        match sha256_file(&self.manifest_path()) {
            Ok(actual) => !recorded.is_empty() && recorded == actual,
            Err(_) => false,
        }
    }
}

/// State of the pending directory as found at boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingState {
    Absent,
    Ready,
    /// Something is there but it is not a complete, marked root
    Incomplete,
}

pub fn pending_state(layout: &DeviceLayout) -> PendingState {
    if !layout.pending_dir().exists() {
        return PendingState::Absent;
    }
    if PendingUpdate::for_layout(layout).is_ready() {
        PendingState::Ready
    } else {
        PendingState::Incomplete
    }
}

/// Remove the whole pending directory.
pub fn clear_pending(layout: &DeviceLayout) {
    let dir = layout.pending_dir();
    if dir.exists() {
        debug!("Removing {}", dir.display());
        remove_path(&dir);
        sync_parent(&dir);
    }
}

/// Drop leftovers that never became a ready root. A ready root is kept but
/// stray staging files next to it are removed.
pub fn cleanup_incomplete(layout: &DeviceLayout) -> PendingState {
    let state = pending_state(layout);
    match state {
        PendingState::Incomplete => {
            warn!("Discarding incomplete pending update");
            clear_pending(layout);
        }
        PendingState::Ready => {
            remove_path(&layout.pending_staging());
            remove_path(&layout.pending_archive());
        }
        PendingState::Absent => {}
    }
    state
}

/// Extract `archive_path`, validate it and promote it to the pending root.
pub fn stage(
    archive_path: &Path,
    layout: &DeviceLayout,
    coop: &dyn Cooperative,
) -> Result<(PendingUpdate, PackageManifest), StageError> {
    let pending = PendingUpdate::for_layout(layout);
    let result = stage_inner(archive_path, &pending, coop);
    if let Err(e) = &result {
        error!("Staging failed: {}", e);
        remove_path(&pending.staging_path);
    }
    result.map(|manifest| (pending, manifest))
}

fn stage_inner(
    archive_path: &Path,
    pending: &PendingUpdate,
    coop: &dyn Cooperative,
) -> Result<PackageManifest, StageError> {
    remove_path(&pending.staging_path);
    remove_path(&pending.promoted_root_path);
    remove_path(&pending.ready_marker);

    info!("Extracting update");
    let mut archive = ZipArchive::open(archive_path)?;
    let summary = archive.extract_all(&pending.staging_path, coop)?;
    debug!(
        "Extracted {} entries ({} bytes), skipped {} hidden",
        summary.extracted, summary.bytes, summary.skipped_hidden
    );
    drop(archive);

    let manifest_path = pending.staging_path.join(PACKAGE_MANIFEST_FILE);
    let content = match fs::read_to_string(&manifest_path) {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(StageError::MissingManifest),
        Err(e) => return Err(e.into()),
    };
    let manifest = PackageManifest::from_json(&content)
        .map_err(|e| StageError::InvalidManifest(e.to_string()))?;
    info!("Package manifest validated (version {})", manifest.version);

    if manifest.script_only_release {
        debug!("Script-only release; skipping firmware completeness check");
    } else {
        let missing = missing_files(&pending.staging_path, CRITICAL_FILES);
        if !missing.is_empty() {
            return Err(StageError::MissingCriticalFiles(missing));
        }
    }

    fs::remove_file(archive_path).or_else(|e| match e.kind() {
        io::ErrorKind::NotFound => Ok(()),
        _ => Err(e),
    })?;

    fs::rename(&pending.staging_path, &pending.promoted_root_path)?;
    sync_parent(&pending.promoted_root_path);
    coop.yield_now();

    let hash = sha256_file(&pending.manifest_path())?;
    atomic_write(&pending.ready_marker, hash.as_bytes())?;

    info!("Update {} ready for installation", manifest.version);
    Ok(manifest)
}
