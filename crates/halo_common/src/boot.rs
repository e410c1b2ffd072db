//! Boot pipeline: recovery guardian, then the pending-update state machine
//!
//! `Idle -> Detected -> Verifying -> {Installing | Rejected} -> Done`
//!
//! Each state is a transition function over `BootContext`; the loop in
//! `run_boot_sequence` only dispatches. Nothing here panics or returns an
//! error: every failure ends in `Rejected` or in a reboot request that the
//! guardian resolves on the next boot.

use std::path::PathBuf;
use tracing::{error, info, warn};

use crate::attempt::{InstallAttempt, InstallPhase};
use crate::compat::check_release_compatibility;
use crate::config::{set_installed_version, DeviceSettings};
use crate::coop::Cooperative;
use crate::device::DeviceIdentity;
use crate::error::UpdateError;
use crate::install::{full_reset, move_into_place};
use crate::install_log::{BootLog, InstallLog, InstallStep};
use crate::layout::{missing_files, DeviceLayout, CRITICAL_FILES};
use crate::manifest::PackageManifest;
use crate::recovery::{create_recovery_backup, run_recovery_guardian, RecoveryOutcome};
use crate::scripts::{ScriptContext, ScriptKind, ScriptOutcome, ScriptRegistry};
use crate::stage::{cleanup_incomplete, clear_pending, PendingState, PendingUpdate};
use crate::storage::StatePort;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootState {
    Idle,
    Detected,
    Verifying,
    Installing,
    Rejected,
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootOutcome {
    /// Nothing pending; current firmware boots unchanged
    NoUpdate,
    /// Guardian restored the critical set from the backup
    Recovered { blamed_version: Option<String> },
    /// Critical files are missing and could not be restored
    RecoveryUnavailable { reason: String },
    Rejected {
        version: Option<String>,
        reason: String,
    },
    Installed {
        version: String,
        resumed: bool,
        /// Post-install failures never roll the install back
        post_install_error: Option<String>,
    },
    /// Script-only release applied; only the version changed
    ScriptApplied { version: String },
    /// Pre-install hook finished the release itself
    ScriptRestart { version: String },
    /// Files moved but the critical set is incomplete; left to the guardian
    InstallIncomplete {
        version: String,
        missing: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootReport {
    pub outcome: BootOutcome,
    pub reboot_required: bool,
    pub log: Vec<String>,
}

/// Everything the boot transitions read and write.
pub struct BootContext<'a> {
    pub layout: DeviceLayout,
    pub settings: DeviceSettings,
    pub state: &'a mut dyn StatePort,
    pub scripts: &'a ScriptRegistry,
    pub coop: &'a dyn Cooperative,
    pub install_log: InstallLog,
    pub boot_log: BootLog,
    /// Package being handled, once detected
    pub package: Option<PackageManifest>,
    /// Set when an interrupted install is picked up again
    pub resume: Option<InstallAttempt>,
    pub rejection: Option<UpdateError>,
    pub outcome: Option<BootOutcome>,
    pub reboot_required: bool,
    pub log: Vec<String>,
}

impl<'a> BootContext<'a> {
    pub fn new(
        layout: DeviceLayout,
        state: &'a mut dyn StatePort,
        scripts: &'a ScriptRegistry,
        coop: &'a dyn Cooperative,
    ) -> Self {
        let settings = DeviceSettings::load(&layout.settings());
        let install_log = InstallLog::new(layout.install_log());
        let boot_log = BootLog::new(layout.boot_log());
        Self {
            layout,
            settings,
            state,
            scripts,
            coop,
            install_log,
            boot_log,
            package: None,
            resume: None,
            rejection: None,
            outcome: None,
            reboot_required: false,
            log: Vec::new(),
        }
    }

    fn note(&mut self, message: impl Into<String>) {
        let message = message.into();
        info!("{}", message);
        self.boot_log.append(&message);
        self.log.push(message);
    }

    fn finish(&mut self, outcome: BootOutcome, reboot: bool) -> BootState {
        self.outcome = Some(outcome);
        self.reboot_required |= reboot;
        BootState::Done
    }

    fn pending_root(&self) -> PathBuf {
        self.layout.pending_root()
    }

    fn reject(&mut self, error: UpdateError) -> BootState {
        self.rejection = Some(error);
        BootState::Rejected
    }
}

/// Run the guardian and then the state machine to completion.
pub fn run_boot_sequence(mut ctx: BootContext<'_>) -> BootReport {
    ctx.note(format!("Boot: firmware {}", ctx.settings.version));

    match run_recovery_guardian(&ctx.layout, &mut *ctx.state) {
        RecoveryOutcome::NotNeeded => {}
        RecoveryOutcome::Restored {
            missing,
            blamed_version,
        } => {
            ctx.install_log.record(
                InstallStep::Recovery,
                &format!("restored {:?}, blamed {:?}", missing, blamed_version),
            );
            ctx.note(format!(
                "Recovery: restored {} critical files, rebooting",
                missing.len()
            ));
            ctx.finish(BootOutcome::Recovered { blamed_version }, true);
            return report(ctx);
        }
        RecoveryOutcome::NoBackup { missing } => {
            let reason = format!("missing {:?} and no recovery backup", missing);
            error!("{}", reason);
            ctx.note(format!("CRITICAL: {}", reason));
            ctx.finish(BootOutcome::RecoveryUnavailable { reason }, false);
            return report(ctx);
        }
        RecoveryOutcome::Failed { reason } => {
            error!("Recovery failed: {}", reason);
            ctx.note(format!("CRITICAL: recovery failed: {}", reason));
            ctx.finish(BootOutcome::RecoveryUnavailable { reason }, false);
            return report(ctx);
        }
    }

    let mut state = BootState::Idle;
    while state != BootState::Done {
        state = step(state, &mut ctx);
        ctx.coop.yield_now();
    }
    report(ctx)
}

fn report(ctx: BootContext<'_>) -> BootReport {
    BootReport {
        outcome: ctx.outcome.unwrap_or(BootOutcome::NoUpdate),
        reboot_required: ctx.reboot_required,
        log: ctx.log,
    }
}

/// One transition.
pub fn step(state: BootState, ctx: &mut BootContext<'_>) -> BootState {
    match state {
        BootState::Idle => idle(ctx),
        BootState::Detected => detected(ctx),
        BootState::Verifying => verifying(ctx),
        BootState::Installing => installing(ctx),
        BootState::Rejected => rejected(ctx),
        BootState::Done => BootState::Done,
    }
}

fn idle(ctx: &mut BootContext<'_>) -> BootState {
    if let Some(attempt) = InstallAttempt::load(&ctx.layout.install_attempt()) {
        // Finalizing no longer needs the pending root.
        let resumable = attempt.is_resumable()
            && (attempt.phase == InstallPhase::Finalizing || ctx.pending_root().is_dir());
        if resumable {
            ctx.note(format!(
                "Resuming install of {} from phase {}",
                attempt.target_version,
                attempt.phase.as_str()
            ));
            ctx.package = Some(resumed_package(&ctx.layout, &attempt));
            ctx.resume = Some(attempt);
            return BootState::Installing;
        }
        warn!(
            "Discarding stale install marker for {} (phase {})",
            attempt.target_version,
            attempt.phase.as_str()
        );
        if let Err(e) = InstallAttempt::remove(&ctx.layout.install_attempt()) {
            warn!("Cannot remove install marker: {}", e);
        }
    }

    match cleanup_incomplete(&ctx.layout) {
        PendingState::Ready => BootState::Detected,
        PendingState::Incomplete => {
            ctx.note("Discarded incomplete pending update");
            ctx.finish(BootOutcome::NoUpdate, false)
        }
        PendingState::Absent => ctx.finish(BootOutcome::NoUpdate, false),
    }
}

/// Package manifest for an interrupted install: the pending copy if still
/// there, else the one already moved to the device root.
fn resumed_package(layout: &DeviceLayout, attempt: &InstallAttempt) -> PackageManifest {
    let pending = PendingUpdate::for_layout(layout);
    [pending.manifest_path(), layout.installed_manifest()]
        .iter()
        .filter_map(|path| PackageManifest::load(path).ok())
        .find(|pkg| pkg.version == attempt.target_version)
        .unwrap_or_else(|| PackageManifest {
            version: attempt.target_version.clone(),
            ..Default::default()
        })
}

fn detected(ctx: &mut BootContext<'_>) -> BootState {
    match PendingUpdate::for_layout(&ctx.layout).manifest() {
        Ok(pkg) => {
            ctx.note(format!("Pending update {} detected", pkg.version));
            ctx.package = Some(pkg);
            BootState::Verifying
        }
        Err(e) => ctx.reject(UpdateError::Integrity(format!(
            "unreadable package manifest: {}",
            e
        ))),
    }
}

fn verifying(ctx: &mut BootContext<'_>) -> BootState {
    let pkg = match ctx.package.clone() {
        Some(pkg) => pkg,
        None => return ctx.reject(UpdateError::Integrity("no package manifest".into())),
    };
    ctx.install_log
        .begin_attempt(&format!("{} -> {}", ctx.settings.version, pkg.version));

    let identity = DeviceIdentity::from_settings(&ctx.settings, ctx.state.channel());
    let ledger = ctx.state.load_ledger();
    if let Err(e) = check_release_compatibility(&pkg.as_descriptor(), &identity, &ledger) {
        return ctx.reject(e.into());
    }

    if !pkg.script_only_release {
        let missing = missing_files(&ctx.pending_root(), CRITICAL_FILES);
        if !missing.is_empty() {
            return ctx.reject(UpdateError::Integrity(format!(
                "package missing critical files {:?}",
                missing
            )));
        }
    }
    ctx.install_log.record(InstallStep::Verify, "compatible");

    let pending_root = ctx.pending_root();
    let pending_dir = ctx.layout.pending_dir();
    let hook = ctx.scripts.run_hook(
        pkg.has_pre_install_script,
        &pending_root,
        &ScriptContext {
            kind: ScriptKind::PreInstall,
            version: &pkg.version,
            log: &ctx.install_log,
            pending_root: Some(&pending_root),
            pending_dir: Some(&pending_dir),
            device_root: ctx.layout.root(),
        },
    );
    let hook = match hook {
        Ok(hook) => hook,
        Err(e) => return ctx.reject(e.into()),
    };
    if hook.is_some() {
        ctx.install_log
            .record(InstallStep::PreInstall, &format!("{:?}", hook));
    }

    if pkg.script_only_release || hook == Some(ScriptOutcome::RestartRequested) {
        return apply_script_release(ctx, &pkg);
    }
    BootState::Installing
}

/// Release finished by its pre-install hook: bump the version, drop the
/// pending tree, reboot.
fn apply_script_release(ctx: &mut BootContext<'_>, pkg: &PackageManifest) -> BootState {
    if let Err(e) = set_installed_version(&ctx.layout.settings(), &pkg.version) {
        return ctx.reject(e.into());
    }
    clear_pending(&ctx.layout);
    ctx.install_log
        .record(InstallStep::Complete, &format!("script release {}", pkg.version));

    let version = pkg.version.clone();
    if pkg.script_only_release {
        ctx.note(format!("Script-only release {} applied", version));
        ctx.finish(BootOutcome::ScriptApplied { version }, true)
    } else {
        ctx.note(format!("Pre-install hook for {} requested restart", version));
        ctx.finish(BootOutcome::ScriptRestart { version }, true)
    }
}

fn installing(ctx: &mut BootContext<'_>) -> BootState {
    let pkg = match ctx.package.clone() {
        Some(pkg) => pkg,
        None => return ctx.reject(UpdateError::Integrity("no package manifest".into())),
    };
    let resumed = ctx.resume.is_some();

    let mut attempt = match ctx.resume.take() {
        Some(attempt) => attempt,
        None => {
            match InstallAttempt::begin(
                &ctx.layout.install_attempt(),
                &pkg.version,
                &ctx.settings.version,
            ) {
                Ok(attempt) => attempt,
                Err(e) => return ctx.reject(e.into()),
            }
        }
    };

    if attempt.phase == InstallPhase::Resetting {
        ctx.install_log.record(InstallStep::Reset, "full reset");
        if let Err(e) = full_reset(ctx.layout.root(), ctx.coop) {
            return install_interrupted(ctx, &pkg, &format!("reset failed: {}", e));
        }
        if let Err(e) = attempt.update_phase(InstallPhase::Moving) {
            warn!("Cannot advance install marker: {}", e);
        }
    }

    if attempt.phase == InstallPhase::Moving {
        match move_into_place(&ctx.pending_root(), ctx.layout.root(), ctx.coop) {
            Ok(moved) => ctx
                .install_log
                .record(InstallStep::Move, &format!("{} files", moved)),
            Err(e) => return install_interrupted(ctx, &pkg, &format!("move failed: {}", e)),
        }
        if let Err(e) = attempt.update_phase(InstallPhase::Finalizing) {
            warn!("Cannot advance install marker: {}", e);
        }
    }

    let missing = ctx.layout.missing_critical_files();
    if !missing.is_empty() {
        error!("Critical files missing after move: {:?}", missing);
        ctx.note(format!(
            "Install of {} incomplete; recovery on next boot",
            pkg.version
        ));
        return ctx.finish(
            BootOutcome::InstallIncomplete {
                version: pkg.version.clone(),
                missing,
            },
            true,
        );
    }

    finalize(ctx, &pkg, resumed)
}

/// Reset or move broke off. The attempt marker stays so the guardian can
/// blame this version once it restores the critical set.
fn install_interrupted(ctx: &mut BootContext<'_>, pkg: &PackageManifest, reason: &str) -> BootState {
    error!("Install of {} interrupted: {}", pkg.version, reason);
    ctx.install_log.record(InstallStep::Reset, reason);
    ctx.note(format!("Install of {} failed: {}", pkg.version, reason));
    ctx.finish(
        BootOutcome::InstallIncomplete {
            version: pkg.version.clone(),
            missing: ctx.layout.missing_critical_files(),
        },
        true,
    )
}

fn finalize(ctx: &mut BootContext<'_>, pkg: &PackageManifest, resumed: bool) -> BootState {
    match create_recovery_backup(&ctx.layout, &pkg.version) {
        Ok(_) => ctx.install_log.record(InstallStep::Backup, "refreshed"),
        Err(e) => {
            warn!("Recovery backup not refreshed: {}", e);
            ctx.install_log
                .record(InstallStep::Backup, &format!("failed: {}", e));
        }
    }

    let post = ctx.scripts.run_hook(
        pkg.has_post_install_script,
        ctx.layout.root(),
        &ScriptContext {
            kind: ScriptKind::PostInstall,
            version: &pkg.version,
            log: &ctx.install_log,
            pending_root: None,
            pending_dir: None,
            device_root: ctx.layout.root(),
        },
    );
    let post_install_error = match post {
        Ok(Some(outcome)) => {
            ctx.install_log
                .record(InstallStep::PostInstall, &format!("{:?}", outcome));
            None
        }
        Ok(None) => None,
        Err(e) => {
            let err = UpdateError::from(e);
            warn!("Post-install hook failed ({}): {}", err.kind(), err);
            ctx.install_log
                .record(InstallStep::PostInstall, &format!("failed: {}", err));
            Some(err.to_string())
        }
    };

    clear_pending(&ctx.layout);
    if let Err(e) = InstallAttempt::remove(&ctx.layout.install_attempt()) {
        warn!("Cannot remove install marker: {}", e);
    }
    ctx.install_log
        .record(InstallStep::Complete, &format!("installed {}", pkg.version));
    ctx.note(format!("Installed {}, rebooting", pkg.version));

    ctx.finish(
        BootOutcome::Installed {
            version: pkg.version.clone(),
            resumed,
            post_install_error,
        },
        true,
    )
}

fn rejected(ctx: &mut BootContext<'_>) -> BootState {
    let rejection = ctx.rejection.take();
    let reason = rejection
        .as_ref()
        .map(|e| e.to_string())
        .unwrap_or_else(|| "rejected".to_string());
    // Device-side faults (storage) leave the release eligible for a retry.
    let blames_release = rejection
        .as_ref()
        .map_or(true, |e| e.kind().marks_incompatible());
    let version = ctx.package.as_ref().map(|p| p.version.clone());

    if let Some(v) = version.as_deref().filter(|_| blames_release) {
        if let Err(e) = ctx.state.mark_incompatible(v, &reason) {
            warn!("Cannot record {} as incompatible: {}", v, e);
        }
    }
    clear_pending(&ctx.layout);

    ctx.install_log.record(InstallStep::Reject, &reason);
    ctx.note(format!(
        "Rejected pending update {}: {}",
        version.as_deref().unwrap_or("<unknown>"),
        reason
    ));
    ctx.finish(BootOutcome::Rejected { version, reason }, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coop::NoYield;
    use crate::device::Channel;
    use crate::fsutil::{atomic_write, sha256_file};
    use crate::storage::MemoryStatePort;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    const SETTINGS: &str = "version = \"1.0.0\"\nmachine_type = \"halo_s3_v1\"\nos_version = \"circuitpython_10_1_3\"\n";

    fn write_tree(base: &Path, version: &str, pkg_extra: &str) {
        for rel in CRITICAL_FILES {
            let path = base.join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, format!("{} {}", rel, version)).unwrap();
        }
        fs::write(
            base.join("settings.toml"),
            SETTINGS.replace("1.0.0", version),
        )
        .unwrap();
        fs::write(
            base.join("manifest.json"),
            format!(
                r#"{{"version": "{}", "target_machine_types": ["halo_s3_v1"],
                    "target_operating_systems": ["circuitpython_10_1"]{}}}"#,
                version, pkg_extra
            ),
        )
        .unwrap();
    }

    fn device(tmp: &TempDir) -> DeviceLayout {
        let layout = DeviceLayout::new(tmp.path());
        write_tree(layout.root(), "1.0.0", "");
        fs::write(layout.path("app.py"), b"old app").unwrap();
        create_recovery_backup(&layout, "1.0.0").unwrap();
        layout
    }

    fn stage_pending(layout: &DeviceLayout, version: &str, pkg_extra: &str) {
        let root = layout.pending_root();
        fs::create_dir_all(&root).unwrap();
        write_tree(&root, version, pkg_extra);
        let hash = sha256_file(&root.join("manifest.json")).unwrap();
        atomic_write(&layout.pending_ready(), hash.as_bytes()).unwrap();
    }

    fn boot(layout: &DeviceLayout, state: &mut MemoryStatePort) -> BootReport {
        let registry = ScriptRegistry::new();
        let ctx = BootContext::new(layout.clone(), state, &registry, &NoYield);
        run_boot_sequence(ctx)
    }

    #[test]
    fn test_no_pending_update() {
        let tmp = TempDir::new().unwrap();
        let layout = device(&tmp);
        let mut state = MemoryStatePort::new(Channel::Production);
        let report = boot(&layout, &mut state);
        assert_eq!(report.outcome, BootOutcome::NoUpdate);
        assert!(!report.reboot_required);
    }

    #[test]
    fn test_full_install() {
        let tmp = TempDir::new().unwrap();
        let layout = device(&tmp);
        stage_pending(&layout, "1.1.0", "");
        let mut state = MemoryStatePort::new(Channel::Production);

        let report = boot(&layout, &mut state);
        assert!(matches!(
            report.outcome,
            BootOutcome::Installed { ref version, resumed: false, post_install_error: None } if version == "1.1.0"
        ));
        assert!(report.reboot_required);
        assert!(!layout.path("app.py").exists());
        assert!(!layout.pending_dir().exists());
        assert!(!layout.install_attempt().exists());
        assert_eq!(DeviceSettings::load(&layout.settings()).version, "1.1.0");
        assert_eq!(
            crate::recovery::validate_backup(&layout).version.as_deref(),
            Some("1.1.0")
        );
    }

    #[test]
    fn test_older_package_rejected() {
        let tmp = TempDir::new().unwrap();
        let layout = device(&tmp);
        stage_pending(&layout, "0.9.0", "");
        let mut state = MemoryStatePort::new(Channel::Production);

        let report = boot(&layout, &mut state);
        assert!(matches!(report.outcome, BootOutcome::Rejected { .. }));
        assert!(!report.reboot_required);
        assert!(state.ledger.contains("0.9.0"));
        assert!(!layout.pending_dir().exists());
        assert!(layout.path("app.py").exists());
    }

    #[test]
    fn test_ledger_blocks_staged_version() {
        let tmp = TempDir::new().unwrap();
        let layout = device(&tmp);
        stage_pending(&layout, "1.1.0", "");
        let mut state = MemoryStatePort::new(Channel::Production);
        state.ledger.record("1.1.0", "earlier failure");

        let report = boot(&layout, &mut state);
        assert!(matches!(report.outcome, BootOutcome::Rejected { .. }));
        assert_eq!(state.ledger.get("1.1.0").unwrap().attempts, 2);
    }

    #[test]
    fn test_missing_pre_install_hook_rejects() {
        let tmp = TempDir::new().unwrap();
        let layout = device(&tmp);
        stage_pending(&layout, "1.1.0", r#", "has_pre_install_script": true"#);
        let mut state = MemoryStatePort::new(Channel::Production);

        let report = boot(&layout, &mut state);
        assert!(matches!(report.outcome, BootOutcome::Rejected { .. }));
        assert!(state.ledger.contains("1.1.0"));
    }

    #[test]
    fn test_unready_root_is_discarded() {
        let tmp = TempDir::new().unwrap();
        let layout = device(&tmp);
        stage_pending(&layout, "1.1.0", "");
        fs::remove_file(layout.pending_ready()).unwrap();
        let mut state = MemoryStatePort::new(Channel::Production);

        let report = boot(&layout, &mut state);
        assert_eq!(report.outcome, BootOutcome::NoUpdate);
        assert!(!layout.pending_dir().exists());
        assert!(state.ledger.is_empty());
    }

    #[test]
    fn test_resume_interrupted_move() {
        let tmp = TempDir::new().unwrap();
        let layout = device(&tmp);
        stage_pending(&layout, "1.1.0", "");

        let mut attempt =
            InstallAttempt::begin(&layout.install_attempt(), "1.1.0", "1.0.0").unwrap();
        full_reset(layout.root(), &NoYield).unwrap();
        attempt.update_phase(InstallPhase::Moving).unwrap();
        // Guardian needs the critical set; put the backup's copy back as the
        // recovery would, so the move resumes instead.
        for rel in CRITICAL_FILES {
            fs::create_dir_all(layout.path(rel).parent().unwrap()).unwrap();
            fs::copy(layout.recovery_dir().join(rel), layout.path(rel)).unwrap();
        }

        let mut state = MemoryStatePort::new(Channel::Production);
        let report = boot(&layout, &mut state);
        assert!(matches!(
            report.outcome,
            BootOutcome::Installed { resumed: true, .. }
        ));
        assert_eq!(DeviceSettings::load(&layout.settings()).version, "1.1.0");
        assert!(!layout.install_attempt().exists());
    }

    #[test]
    fn test_script_only_release_bumps_version() {
        let tmp = TempDir::new().unwrap();
        let layout = device(&tmp);
        let root = layout.pending_root();
        fs::create_dir_all(&root).unwrap();
        fs::write(
            root.join("manifest.json"),
            r#"{"version": "1.0.1", "script_only_release": true,
                "target_machine_types": ["halo_s3_v1"],
                "target_operating_systems": ["circuitpython_10_1"]}"#,
        )
        .unwrap();
        let hash = sha256_file(&root.join("manifest.json")).unwrap();
        fs::write(layout.pending_ready(), hash).unwrap();

        let mut state = MemoryStatePort::new(Channel::Production);
        let report = boot(&layout, &mut state);
        assert_eq!(
            report.outcome,
            BootOutcome::ScriptApplied {
                version: "1.0.1".into()
            }
        );
        assert!(report.reboot_required);
        let settings = DeviceSettings::load(&layout.settings());
        assert_eq!(settings.version, "1.0.1");
        assert_eq!(settings.machine_type, "halo_s3_v1");
        assert!(layout.path("app.py").exists());
        assert!(!layout.pending_dir().exists());
    }

    #[test]
    fn test_guardian_runs_first() {
        let tmp = TempDir::new().unwrap();
        let layout = device(&tmp);
        stage_pending(&layout, "1.1.0", "");
        InstallAttempt::begin(&layout.install_attempt(), "1.1.0", "1.0.0").unwrap();
        fs::remove_file(layout.path("bin/halod")).unwrap();

        let mut state = MemoryStatePort::new(Channel::Production);
        let report = boot(&layout, &mut state);
        assert_eq!(
            report.outcome,
            BootOutcome::Recovered {
                blamed_version: Some("1.1.0".into())
            }
        );
        assert!(report.reboot_required);
        assert!(layout.missing_critical_files().is_empty());
        assert!(!layout.pending_dir().exists());
    }
}
