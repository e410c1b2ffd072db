//! Halo daemon - firmware entry point
//!
//! Runs the recovery guardian and boot verifier, then schedules update
//! checks. A required reboot is signalled by exiting with code 75; the
//! platform supervisor restarts the daemon.

mod scheduler;

use anyhow::{Context, Result};
use clap::Parser;
use halo_common::boot::BootContext;
use halo_common::coop::ThreadYield;
use halo_common::scripts::ScriptRegistry;
use halo_common::storage::FsStatePort;
use halo_common::{run_boot_sequence, CycleOutcome, DeviceLayout, DeviceSettings};
use scheduler::UpdateScheduler;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Exit status asking the supervisor for a restart (EX_TEMPFAIL)
const EXIT_REBOOT: u8 = 75;

#[derive(Parser)]
#[command(name = "halod", version = env!("HALO_VERSION"), about = "Halo firmware daemon")]
struct Cli {
    /// Device root
    #[arg(long, env = "HALO_ROOT", default_value = "/")]
    root: PathBuf,

    /// Boot, run a single update check, and exit
    #[arg(long)]
    once: bool,
}

fn main() -> Result<ExitCode> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    info!(
        "Halo daemon v{} starting (root {})",
        env!("HALO_VERSION"),
        cli.root.display()
    );
    let layout = DeviceLayout::new(&cli.root);

    // Boot steps run before any scheduling; nothing else touches the tree.
    let mut state = FsStatePort::new(layout.clone());
    let hooks = ScriptRegistry::new();
    let report = run_boot_sequence(BootContext::new(
        layout.clone(),
        &mut state,
        &hooks,
        &ThreadYield,
    ));
    info!("Boot outcome: {:?}", report.outcome);
    if report.reboot_required {
        info!("Reboot required");
        return Ok(ExitCode::from(EXIT_REBOOT));
    }

    let settings = DeviceSettings::load(&layout.settings());
    info!("Firmware {} ready", settings.version);

    if cli.once {
        return Ok(match scheduler::run_cycle(&layout) {
            CycleOutcome::Staged { .. } => ExitCode::from(EXIT_REBOOT),
            _ => ExitCode::SUCCESS,
        });
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start scheduler runtime")?;
    runtime.block_on(serve(layout, settings))
}

async fn serve(layout: DeviceLayout, settings: DeviceSettings) -> Result<ExitCode> {
    let (tx, mut rx) = mpsc::channel(1);
    let checks = UpdateScheduler::from_settings(layout, &settings).start(tx);

    let code = tokio::select! {
        Some(version) = rx.recv() => {
            info!("Update {} staged; restarting to install", version);
            ExitCode::from(EXIT_REBOOT)
        }
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!("Signal handler failed: {}", e);
            }
            info!("Shutting down gracefully");
            ExitCode::SUCCESS
        }
    };
    checks.abort();
    Ok(code)
}
