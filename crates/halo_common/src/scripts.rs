//! Install script hooks
//!
//! A release may carry a pre-install and a post-install hook, matched to the
//! release version exactly. Hooks resolve from the compiled-in registry
//! first, then from an executable shipped in the package:
//! `firmware_install_scripts/<kind>_v<version>`.
//!
//! External hook contract:
//! - pre-install args: `<pending root> <pending dir>`
//! - post-install args: `<installed version>`
//! - exit 0: completed, exit 10: restart requested, anything else: failure
//! - stdout and stderr lines go to the install log

use std::collections::HashMap;
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::error::ScriptError;
use crate::install_log::InstallLog;
use crate::layout::INSTALL_SCRIPTS_DIR;

pub const EXIT_RESTART_REQUESTED: i32 = 10;

/// A hook still running after this is killed and counts as failed.
pub const HOOK_TIMEOUT: Duration = Duration::from_secs(300);

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptKind {
    PreInstall,
    PostInstall,
}

impl ScriptKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScriptKind::PreInstall => "pre_install",
            ScriptKind::PostInstall => "post_install",
        }
    }

    /// `firmware_install_scripts/<kind>_v<version>` relative to a tree root.
    pub fn file_name(&self, version: &str) -> String {
        format!("{}/{}_v{}", INSTALL_SCRIPTS_DIR, self.as_str(), version)
    }
}

impl fmt::Display for ScriptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptOutcome {
    Completed,
    /// The hook finished all work itself and wants the device restarted now
    RestartRequested,
}

pub struct ScriptContext<'a> {
    pub kind: ScriptKind,
    pub version: &'a str,
    pub log: &'a InstallLog,
    /// Pre-install only
    pub pending_root: Option<&'a Path>,
    /// Pre-install only
    pub pending_dir: Option<&'a Path>,
    pub device_root: &'a Path,
}

pub trait InstallScript {
    fn run(&self, ctx: &ScriptContext) -> Result<ScriptOutcome, ScriptError>;
}

/// Hook shipped as an executable inside the package.
#[derive(Debug, Clone)]
pub struct ExternalScript {
    pub path: PathBuf,
    pub timeout: Duration,
}

impl ExternalScript {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            timeout: HOOK_TIMEOUT,
        }
    }
}

impl InstallScript for ExternalScript {
    fn run(&self, ctx: &ScriptContext) -> Result<ScriptOutcome, ScriptError> {
        let mut command = Command::new(&self.path);
        match ctx.kind {
            ScriptKind::PreInstall => {
                if let Some(root) = ctx.pending_root {
                    command.arg(root);
                }
                if let Some(dir) = ctx.pending_dir {
                    command.arg(dir);
                }
            }
            ScriptKind::PostInstall => {
                command.arg(ctx.version);
            }
        }
        command.current_dir(ctx.device_root);

        let failed = |reason: String| ScriptError::Failed {
            kind: ctx.kind,
            version: ctx.version.to_string(),
            reason,
        };

        ensure_executable(&self.path)
            .map_err(|e| failed(format!("cannot run {}: {}", self.path.display(), e)))?;
        let mut child = command
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| failed(format!("cannot run {}: {}", self.path.display(), e)))?;

        // Drain both pipes while waiting so a chatty hook cannot block on a full pipe.
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());
        let status = wait_with_deadline(&mut child, self.timeout);
        let stdout = stdout.join().unwrap_or_default();
        let stderr = stderr.join().unwrap_or_default();

        for line in stdout.lines() {
            ctx.log.script_output(line);
        }
        for line in stderr.lines() {
            ctx.log.script_output(&format!("stderr: {}", line));
        }

        let status = match status {
            Ok(Some(status)) => status,
            Ok(None) => {
                warn!("{} hook for {} timed out", ctx.kind, ctx.version);
                return Err(failed(format!("timed out after {}s", self.timeout.as_secs())));
            }
            Err(e) => return Err(failed(format!("wait failed: {}", e))),
        };

        match status.code() {
            Some(0) => Ok(ScriptOutcome::Completed),
            Some(EXIT_RESTART_REQUESTED) => Ok(ScriptOutcome::RestartRequested),
            Some(code) => Err(failed(format!("exit code {}", code))),
            None => Err(failed("terminated by signal".to_string())),
        }
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

/// Poll until the child exits or `timeout` passes; on timeout the child is
/// killed and `None` returned.
fn wait_with_deadline(child: &mut Child, timeout: Duration) -> std::io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            if let Err(e) = child.kill() {
                debug!("Kill failed: {}", e);
            }
            child.wait()?;
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// ZIP extraction drops Unix mode bits.
#[cfg(unix)]
fn ensure_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = std::fs::metadata(path)?.permissions();
    if perms.mode() & 0o111 == 0 {
        perms.set_mode(perms.mode() | 0o755);
        std::fs::set_permissions(path, perms)?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn ensure_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Hooks keyed by kind and exact release version.
#[derive(Default)]
pub struct ScriptRegistry {
    scripts: HashMap<(ScriptKind, String), Box<dyn InstallScript>>,
}

impl ScriptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        kind: ScriptKind,
        version: &str,
        script: impl InstallScript + 'static,
    ) -> &mut Self {
        self.scripts
            .insert((kind, version.to_string()), Box::new(script));
        self
    }

    /// Run the hook for `(kind, ctx.version)`.
    ///
    /// Unflagged hooks are not looked up at all and return `Ok(None)`.
    /// A flagged hook that cannot be found is `ScriptError::NotFound`.
    pub fn run_hook(
        &self,
        flagged: bool,
        search_root: &Path,
        ctx: &ScriptContext,
    ) -> Result<Option<ScriptOutcome>, ScriptError> {
        if !flagged {
            return Ok(None);
        }

        let key = (ctx.kind, ctx.version.to_string());
        let outcome = if let Some(script) = self.scripts.get(&key) {
            debug!("Running registered {} hook for {}", ctx.kind, ctx.version);
            script.run(ctx)
        } else {
            let path = search_root.join(ctx.kind.file_name(ctx.version));
            if !path.is_file() {
                warn!("{} hook for {} flagged but missing", ctx.kind, ctx.version);
                return Err(ScriptError::NotFound {
                    kind: ctx.kind,
                    version: ctx.version.to_string(),
                });
            }
            debug!("Running {}", path.display());
            ExternalScript::new(path).run(ctx)
        };

        match &outcome {
            Ok(o) => info!("{} hook for {} finished: {:?}", ctx.kind, ctx.version, o),
            Err(e) => warn!("{} hook for {} failed: {}", ctx.kind, ctx.version, e),
        }
        outcome.map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;
    use tempfile::TempDir;

    fn ctx<'a>(kind: ScriptKind, version: &'a str, log: &'a InstallLog, root: &'a Path) -> ScriptContext<'a> {
        ScriptContext {
            kind,
            version,
            log,
            pending_root: Some(root),
            pending_dir: Some(root),
            device_root: root,
        }
    }

    #[test]
    fn test_unflagged_is_noop() {
        let tmp = TempDir::new().unwrap();
        let log = InstallLog::new(tmp.path().join("install_log.txt"));
        let registry = ScriptRegistry::new();
        let c = ctx(ScriptKind::PreInstall, "1.0.0", &log, tmp.path());
        assert_eq!(registry.run_hook(false, tmp.path(), &c).unwrap(), None);
    }

    #[test]
    fn test_flagged_missing_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let log = InstallLog::new(tmp.path().join("install_log.txt"));
        let registry = ScriptRegistry::new();
        let c = ctx(ScriptKind::PreInstall, "1.0.0", &log, tmp.path());
        assert!(matches!(
            registry.run_hook(true, tmp.path(), &c),
            Err(ScriptError::NotFound { .. })
        ));
    }

    struct Recorder(Rc<Cell<bool>>);

    impl InstallScript for Recorder {
        fn run(&self, _ctx: &ScriptContext) -> Result<ScriptOutcome, ScriptError> {
            self.0.set(true);
            Ok(ScriptOutcome::Completed)
        }
    }

    #[test]
    fn test_exact_version_match_only() {
        let tmp = TempDir::new().unwrap();
        let log = InstallLog::new(tmp.path().join("install_log.txt"));
        let ran = Rc::new(Cell::new(false));

        let mut registry = ScriptRegistry::new();
        registry.register(ScriptKind::PostInstall, "1.0.0", Recorder(ran.clone()));

        let near = ctx(ScriptKind::PostInstall, "1.0.1", &log, tmp.path());
        assert!(registry.run_hook(true, tmp.path(), &near).is_err());
        assert!(!ran.get());

        let exact = ctx(ScriptKind::PostInstall, "1.0.0", &log, tmp.path());
        assert_eq!(
            registry.run_hook(true, tmp.path(), &exact).unwrap(),
            Some(ScriptOutcome::Completed)
        );
        assert!(ran.get());
    }

    #[cfg(unix)]
    #[test]
    fn test_external_script_exit_codes() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let log = InstallLog::new(tmp.path().join("install_log.txt"));
        let registry = ScriptRegistry::new();
        let scripts = tmp.path().join(INSTALL_SCRIPTS_DIR);
        std::fs::create_dir_all(&scripts).unwrap();

        let write_script = |name: &str, body: &str| {
            let path = scripts.join(name);
            std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        };
        write_script("post_install_v2.0.0", "echo migrated $1\nexit 0");
        write_script("post_install_v2.0.1", "exit 10");
        write_script("post_install_v2.0.2", "echo oops >&2\nexit 3");

        let c = ctx(ScriptKind::PostInstall, "2.0.0", &log, tmp.path());
        assert_eq!(
            registry.run_hook(true, tmp.path(), &c).unwrap(),
            Some(ScriptOutcome::Completed)
        );
        let c = ctx(ScriptKind::PostInstall, "2.0.1", &log, tmp.path());
        assert_eq!(
            registry.run_hook(true, tmp.path(), &c).unwrap(),
            Some(ScriptOutcome::RestartRequested)
        );
        let c = ctx(ScriptKind::PostInstall, "2.0.2", &log, tmp.path());
        assert!(matches!(
            registry.run_hook(true, tmp.path(), &c),
            Err(ScriptError::Failed { .. })
        ));

        let details: Vec<String> = log.read_entries().into_iter().map(|e| e.detail).collect();
        assert!(details.contains(&"migrated 2.0.0".to_string()));
        assert!(details.contains(&"stderr: oops".to_string()));
    }

    #[cfg(unix)]
    #[test]
    fn test_hung_hook_is_killed() {
        let tmp = TempDir::new().unwrap();
        let log = InstallLog::new(tmp.path().join("install_log.txt"));
        let path = tmp.path().join("pre_install_v3.0.0");
        std::fs::write(&path, "#!/bin/sh\necho starting\nexec sleep 30\n").unwrap();

        let script = ExternalScript {
            path,
            timeout: Duration::from_millis(300),
        };
        let c = ctx(ScriptKind::PreInstall, "3.0.0", &log, tmp.path());
        let started = Instant::now();
        let err = script.run(&c).unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(matches!(err, ScriptError::Failed { ref reason, .. } if reason.contains("timed out")));
        let details: Vec<String> = log.read_entries().into_iter().map(|e| e.detail).collect();
        assert!(details.contains(&"starting".to_string()));
    }

    #[cfg(unix)]
    #[test]
    fn test_extracted_script_without_mode_bits_runs() {
        let tmp = TempDir::new().unwrap();
        let log = InstallLog::new(tmp.path().join("install_log.txt"));
        let scripts = tmp.path().join(INSTALL_SCRIPTS_DIR);
        std::fs::create_dir_all(&scripts).unwrap();
        std::fs::write(scripts.join("post_install_v2.1.0"), "#!/bin/sh
exit 0
").unwrap();

        let c = ctx(ScriptKind::PostInstall, "2.1.0", &log, tmp.path());
        assert_eq!(
            ScriptRegistry::new().run_hook(true, tmp.path(), &c).unwrap(),
            Some(ScriptOutcome::Completed)
        );
    }
}
