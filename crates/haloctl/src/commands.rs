//! Command implementations
//!
//! Every command reads the device tree directly. Only `stage` writes, and
//! only under `pending_update/`.

use anyhow::{bail, Context, Result};
use halo_common::attempt::InstallAttempt;
use halo_common::check_release_compatibility;
use halo_common::coop::NoYield;
use halo_common::fsutil::{copy_synced, sha256_file};
use halo_common::install_log::BootLog;
use halo_common::ledger::LedgerEntry;
use halo_common::recovery::{validate_backup, BackupReport};
use halo_common::stage::{clear_pending, pending_state, stage, PendingState, PendingUpdate};
use halo_common::storage::{FsStatePort, StatePort};
use halo_common::transport::HttpTransport;
use halo_common::{
    Channel, DeviceIdentity, DeviceLayout, DeviceSettings, ReleaseDescriptor, UpdateCycle,
};
use owo_colors::OwoColorize;
use serde::Serialize;
use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;
use tracing::info;

const BOOT_LOG_TAIL: usize = 10;

#[derive(Serialize)]
pub struct StatusReport {
    pub version: String,
    pub machine_type: String,
    pub os_version: String,
    pub channel: Channel,
    pub pending: &'static str,
    pub pending_version: Option<String>,
    pub install_attempt: Option<InstallAttempt>,
    pub missing_critical_files: Vec<String>,
    pub backup: BackupReport,
    pub incompatible_releases: usize,
    pub boot_log: Vec<String>,
}

impl StatusReport {
    pub fn collect(layout: &DeviceLayout) -> Self {
        let settings = DeviceSettings::load(&layout.settings());
        let state = FsStatePort::new(layout.clone());
        let pending = pending_state(layout);
        let pending_version = match pending {
            PendingState::Ready => PendingUpdate::for_layout(layout)
                .manifest()
                .ok()
                .map(|pkg| pkg.version),
            _ => None,
        };

        Self {
            version: settings.version,
            machine_type: settings.machine_type,
            os_version: settings.os_version,
            channel: state.channel(),
            pending: match pending {
                PendingState::Absent => "absent",
                PendingState::Ready => "ready",
                PendingState::Incomplete => "incomplete",
            },
            pending_version,
            install_attempt: InstallAttempt::load(&layout.install_attempt()),
            missing_critical_files: layout.missing_critical_files(),
            backup: validate_backup(layout),
            incompatible_releases: state.load_ledger().len(),
            boot_log: BootLog::new(layout.boot_log()).tail(BOOT_LOG_TAIL),
        }
    }
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn ok_or_bad(ok: bool) -> String {
    if ok {
        "ok".green().to_string()
    } else {
        "FAILED".red().bold().to_string()
    }
}

pub fn status(layout: &DeviceLayout, json: bool) -> Result<ExitCode> {
    let report = StatusReport::collect(layout);
    if json {
        print_json(&report)?;
        return Ok(ExitCode::SUCCESS);
    }

    println!("{}", "Halo Status".bold());
    println!("{}", "=".repeat(40));
    println!("  Firmware:   {}", report.version.bold());
    println!("  Machine:    {}", report.machine_type);
    println!("  OS:         {}", report.os_version);
    println!("  Channel:    {}", report.channel);
    match &report.pending_version {
        Some(v) => println!("  Pending:    {} ({})", v.cyan(), report.pending),
        None => println!("  Pending:    {}", report.pending.dimmed()),
    }
    if let Some(attempt) = &report.install_attempt {
        println!(
            "  Install:    {} in phase {} since {}",
            attempt.target_version.yellow(),
            attempt.phase.as_str(),
            attempt.started_at.to_rfc3339()
        );
    }
    println!(
        "  Critical:   {}",
        ok_or_bad(report.missing_critical_files.is_empty())
    );
    println!(
        "  Backup:     {} {}",
        ok_or_bad(report.backup.is_valid()),
        report.backup.version.as_deref().unwrap_or("-").dimmed()
    );
    println!("  Rejected:   {} release(s)", report.incompatible_releases);

    if !report.boot_log.is_empty() {
        println!();
        println!("{}", "Recent boot log:".bold());
        for line in &report.boot_log {
            println!("  {}", line.dimmed());
        }
    }
    Ok(ExitCode::SUCCESS)
}

pub fn ledger(layout: &DeviceLayout, json: bool) -> Result<ExitCode> {
    let ledger = FsStatePort::new(layout.clone()).load_ledger();
    let entries: &[LedgerEntry] = ledger.entries();
    if json {
        print_json(&entries)?;
        return Ok(ExitCode::SUCCESS);
    }

    if entries.is_empty() {
        println!("No incompatible releases recorded");
        return Ok(ExitCode::SUCCESS);
    }
    println!("{}", "Incompatible releases (oldest first)".bold());
    for entry in entries {
        println!(
            "  {:<12} x{:<3} {}  {}",
            entry.version.yellow(),
            entry.attempts,
            entry.recorded_at.format("%Y-%m-%d %H:%M"),
            entry.reason
        );
    }
    Ok(ExitCode::SUCCESS)
}

#[derive(Serialize)]
pub struct VerifyReport {
    pub missing_critical_files: Vec<String>,
    pub backup: BackupReport,
}

impl VerifyReport {
    pub fn healthy(&self) -> bool {
        self.missing_critical_files.is_empty() && self.backup.is_valid()
    }
}

pub fn verify(layout: &DeviceLayout, json: bool) -> Result<ExitCode> {
    let report = VerifyReport {
        missing_critical_files: layout.missing_critical_files(),
        backup: validate_backup(layout),
    };
    let code = if report.healthy() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    };
    if json {
        print_json(&report)?;
        return Ok(code);
    }

    println!(
        "Critical files: {}",
        ok_or_bad(report.missing_critical_files.is_empty())
    );
    for rel in &report.missing_critical_files {
        println!("  missing {}", rel.red());
    }

    if !report.backup.exists {
        println!("Recovery backup: {}", "none".red().bold());
    } else {
        println!(
            "Recovery backup: {} ({})",
            ok_or_bad(report.backup.is_valid()),
            report.backup.version.as_deref().unwrap_or("unknown version")
        );
        for rel in &report.backup.missing {
            println!("  missing {}", rel.red());
        }
        for rel in &report.backup.mismatched {
            println!("  hash mismatch {}", rel.red());
        }
    }
    Ok(code)
}

#[derive(Serialize)]
struct CheckReport {
    current: String,
    channel: Channel,
    release: Option<ReleaseDescriptor>,
}

/// Dry run: nothing is downloaded and no state is written.
pub fn check(layout: &DeviceLayout, json: bool) -> Result<ExitCode> {
    let transport =
        HttpTransport::new(Duration::from_secs(30)).context("Failed to create HTTP client")?;
    let mut state = FsStatePort::new(layout.clone());
    let channel = state.channel();
    let cycle = UpdateCycle::new(layout.clone(), &transport, &NoYield, &mut state);
    let current = cycle.settings().version.clone();
    let release = cycle.check().context("Manifest check failed")?;

    if json {
        print_json(&CheckReport {
            current,
            channel,
            release,
        })?;
        return Ok(ExitCode::SUCCESS);
    }

    match release {
        Some(r) => {
            println!(
                "Update available: {} -> {} ({})",
                current,
                r.version.green().bold(),
                r.channel
            );
            if let Some(mpv) = &r.minimum_prior_version {
                println!("  requires:  {}", mpv);
            }
            println!("  archive:   {}", r.archive_url);
            println!("  sha256:    {}", r.sha256.dimmed());
            if !r.release_notes.is_empty() {
                println!("  notes:     {}", r.release_notes);
            }
        }
        None => println!("Up to date ({}, {} channel)", current, channel),
    }
    Ok(ExitCode::SUCCESS)
}

/// Sideload: copy the archive into `pending_update/` and stage it. The boot
/// verifier still rechecks it before anything is installed.
pub fn stage_archive(
    layout: &DeviceLayout,
    archive: &Path,
    sha256: Option<&str>,
) -> Result<ExitCode> {
    if let Some(expected) = sha256 {
        let actual = sha256_file(archive)
            .with_context(|| format!("Failed to read {}", archive.display()))?;
        if !actual.eq_ignore_ascii_case(expected.trim()) {
            bail!("Checksum mismatch: expected {}, got {}", expected, actual);
        }
    }

    clear_pending(layout);
    let pending_zip = layout.pending_archive();
    copy_synced(archive, &pending_zip)
        .with_context(|| format!("Failed to copy {}", archive.display()))?;

    let (_, package) = match stage(&pending_zip, layout, &NoYield) {
        Ok(staged) => staged,
        Err(e) => {
            clear_pending(layout);
            bail!("Staging failed: {}", e);
        }
    };
    info!("Sideloaded {} from {}", package.version, archive.display());
    println!(
        "Staged {} for installation at next boot",
        package.version.green().bold()
    );

    let settings = DeviceSettings::load(&layout.settings());
    let state = FsStatePort::new(layout.clone());
    let identity = DeviceIdentity::from_settings(&settings, state.channel());
    if let Err(e) =
        check_release_compatibility(&package.as_descriptor(), &identity, &state.load_ledger())
    {
        println!(
            "{} boot will reject this package: {}",
            "warning:".yellow().bold(),
            e
        );
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_status_on_empty_root() {
        let tmp = TempDir::new().unwrap();
        let layout = DeviceLayout::new(tmp.path());
        let report = StatusReport::collect(&layout);
        assert_eq!(report.version, "0.0.0");
        assert_eq!(report.pending, "absent");
        assert!(!report.backup.exists);
        assert_eq!(
            report.missing_critical_files.len(),
            halo_common::CRITICAL_FILES.len()
        );
    }

    #[test]
    fn test_status_reports_channel_marker() {
        let tmp = TempDir::new().unwrap();
        let layout = DeviceLayout::new(tmp.path());
        fs::write(layout.development_marker(), b"").unwrap();
        assert_eq!(StatusReport::collect(&layout).channel, Channel::Development);
    }

    #[test]
    fn test_verify_unhealthy_without_backup() {
        let tmp = TempDir::new().unwrap();
        let layout = DeviceLayout::new(tmp.path());
        let report = VerifyReport {
            missing_critical_files: layout.missing_critical_files(),
            backup: validate_backup(&layout),
        };
        assert!(!report.healthy());
    }
}
