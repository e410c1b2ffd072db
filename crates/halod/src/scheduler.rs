//! Scheduled update checks
//!
//! Each check runs `UpdateCycle` on the blocking pool. The loop awaits the
//! check before waiting for the next tick, so at most one is in flight;
//! ticks missed while a slow check runs are skipped, not queued.

use halo_common::coop::ThreadYield;
use halo_common::storage::FsStatePort;
use halo_common::transport::HttpTransport;
use halo_common::{CycleOutcome, DeviceLayout, DeviceSettings, ErrorKind, UpdateCycle};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Request timeout for manifest and archive downloads
const HTTP_TIMEOUT: Duration = Duration::from_secs(120);

pub struct UpdateScheduler {
    layout: DeviceLayout,
    initial_delay: Duration,
    interval: Duration,
}

impl UpdateScheduler {
    pub fn from_settings(layout: DeviceLayout, settings: &DeviceSettings) -> Self {
        if settings.check_interval_was_clamped() {
            warn!(
                "update_check_interval_hours {} out of range, using {}",
                settings.update_check_interval_hours,
                settings.effective_check_interval_hours()
            );
        }
        Self {
            layout,
            initial_delay: Duration::from_secs(settings.boot_check_delay_secs),
            interval: Duration::from_secs(settings.effective_check_interval_hours() * 3600),
        }
    }

    /// Start the check loop. The staged version is sent on `staged` and the
    /// loop ends; installing it needs a restart.
    pub fn start(self, staged: mpsc::Sender<String>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                "Update checks every {}h, first in {}s",
                self.interval.as_secs() / 3600,
                self.initial_delay.as_secs()
            );
            time::sleep(self.initial_delay).await;

            let mut ticker = time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;

                let layout = self.layout.clone();
                let outcome = match tokio::task::spawn_blocking(move || run_cycle(&layout)).await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        error!("Update check task failed: {}", e);
                        continue;
                    }
                };

                if let CycleOutcome::Staged { version } = outcome {
                    if staged.send(version).await.is_err() {
                        debug!("Staged update receiver gone");
                    }
                    return;
                }
            }
        })
    }
}

/// One blocking update check against the live device.
pub fn run_cycle(layout: &DeviceLayout) -> CycleOutcome {
    let transport = match HttpTransport::new(HTTP_TIMEOUT) {
        Ok(t) => t,
        Err(e) => {
            error!("Cannot create HTTP client: {}", e);
            return CycleOutcome::Failed {
                kind: ErrorKind::Transport,
                reason: e.to_string(),
                marked_incompatible: false,
            };
        }
    };
    let mut state = FsStatePort::new(layout.clone());
    let outcome = UpdateCycle::new(layout.clone(), &transport, &ThreadYield, &mut state).run();
    match &outcome {
        CycleOutcome::NoUpdate => info!("Firmware is up to date"),
        CycleOutcome::Staged { version } => info!("Update {} staged", version),
        CycleOutcome::Failed {
            kind,
            reason,
            marked_incompatible,
        } => warn!(
            "Update check failed ({}{}): {}",
            kind,
            if *marked_incompatible { ", release marked incompatible" } else { "" },
            reason
        ),
    }
    outcome
}
