//! Full-reset install primitives.
//!
//! Installing a release never patches the old tree: every top-level entry
//! outside the preserved set is deleted, then the pending root is moved into
//! place file by file. Both steps are safe to repeat after power loss.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::coop::Cooperative;
use crate::fsutil::{remove_path, sync_parent};
use crate::layout::is_preserved;

/// Delete every top-level entry of `root` that is not preserved.
/// Returns the number of entries removed.
pub fn full_reset(root: &Path, coop: &dyn Cooperative) -> io::Result<usize> {
    let mut removed = 0;
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if is_preserved(&name) {
            debug!("Preserving {}", name);
            continue;
        }
        remove_path(&entry.path());
        removed += 1;
        coop.yield_now();
    }

    let leftovers: Vec<String> = fs::read_dir(root)?
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| !is_preserved(name))
        .collect();
    if !leftovers.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::Other,
            format!("reset left entries behind: {}", leftovers.join(", ")),
        ));
    }

    info!("Full reset removed {} entries", removed);
    Ok(removed)
}

/// Move every file under `pending_root` to the same relative path under
/// `device_root`. Paths whose top-level component is preserved are skipped
/// so a package can never overwrite device state. Returns files moved.
pub fn move_into_place(
    pending_root: &Path,
    device_root: &Path,
    coop: &dyn Cooperative,
) -> io::Result<usize> {
    let mut dirs: Vec<PathBuf> = Vec::new();
    let mut files: Vec<PathBuf> = Vec::new();
    for entry in WalkDir::new(pending_root).min_depth(1) {
        let entry = entry.map_err(io::Error::from)?;
        let rel = match entry.path().strip_prefix(pending_root) {
            Ok(rel) => rel.to_path_buf(),
            Err(_) => continue,
        };
        let top = rel
            .components()
            .next()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .unwrap_or_default();
        if is_preserved(&top) {
            debug!("Skipping preserved path {} in package", rel.display());
            continue;
        }
        if entry.file_type().is_dir() {
            dirs.push(rel);
        } else {
            files.push(rel);
        }
    }

    for rel in &dirs {
        fs::create_dir_all(device_root.join(rel))?;
    }

    for rel in &files {
        let src = pending_root.join(rel);
        let dst = device_root.join(rel);
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)?;
        }
        if dst.is_dir() {
            remove_path(&dst);
        }
        fs::rename(&src, &dst)?;
        coop.yield_now();
    }
    sync_parent(&device_root.join("."));

    info!("Moved {} files into place", files.len());
    Ok(files.len())
}
