//! Update cycle: fetch manifest, select, download, stage
//!
//! One cycle leaves either nothing, or a ready pending update for the next
//! boot to verify and install. Failures are classified by `ErrorKind`; the
//! ledger policy decides whether the release is marked incompatible.

use tracing::{error, info, warn};

use crate::compat::select;
use crate::config::{DeviceSettings, Secrets};
use crate::coop::Cooperative;
use crate::device::DeviceIdentity;
use crate::download::{Downloader, FreeSpaceProbe};
use crate::error::{ErrorKind, UpdateError};
use crate::layout::DeviceLayout;
use crate::manifest::ReleaseDescriptor;
use crate::manifest_client::ManifestClient;
use crate::stage::{clear_pending, pending_state, stage, PendingState, PendingUpdate};
use crate::storage::StatePort;
use crate::transport::Transport;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    NoUpdate,
    /// A ready pending update exists for this version
    Staged { version: String },
    Failed {
        kind: ErrorKind,
        reason: String,
        marked_incompatible: bool,
    },
}

pub struct UpdateCycle<'a> {
    layout: DeviceLayout,
    transport: &'a dyn Transport,
    coop: &'a dyn Cooperative,
    state: &'a mut dyn StatePort,
    settings: DeviceSettings,
    secrets: Secrets,
    free_space_probe: Option<FreeSpaceProbe>,
}

impl<'a> UpdateCycle<'a> {
    /// Settings and secrets are read from the device root.
    pub fn new(
        layout: DeviceLayout,
        transport: &'a dyn Transport,
        coop: &'a dyn Cooperative,
        state: &'a mut dyn StatePort,
    ) -> Self {
        let settings = DeviceSettings::load(&layout.settings());
        let secrets = Secrets::load(&layout.secrets());
        Self {
            layout,
            transport,
            coop,
            state,
            settings,
            secrets,
            free_space_probe: None,
        }
    }

    pub fn with_free_space_probe(mut self, probe: FreeSpaceProbe) -> Self {
        self.free_space_probe = Some(probe);
        self
    }

    pub fn settings(&self) -> &DeviceSettings {
        &self.settings
    }

    pub fn identity(&self) -> DeviceIdentity {
        DeviceIdentity::from_settings(&self.settings, self.state.channel())
    }

    /// Release this device would download now, without touching disk.
    pub fn check(&self) -> Result<Option<ReleaseDescriptor>, UpdateError> {
        let identity = self.identity();
        let client = ManifestClient::new(self.transport, &self.settings, &identity, &self.secrets);
        let manifest = client.fetch().map_err(UpdateError::Transport)?;
        Ok(select(&manifest, &identity, &self.state.load_ledger()))
    }

    pub fn run(&mut self) -> CycleOutcome {
        let release = match self.check() {
            Ok(Some(release)) => release,
            Ok(None) => {
                info!("No update available for {}", self.settings.version);
                return CycleOutcome::NoUpdate;
            }
            Err(e) => return self.fail(e, None),
        };

        if self.already_staged(&release.version) {
            info!("Update {} already staged", release.version);
            return CycleOutcome::Staged {
                version: release.version,
            };
        }

        info!(
            "Update {} -> {} selected ({})",
            self.settings.version, release.version, release.channel
        );
        match self.fetch_and_stage(&release) {
            Ok(version) => CycleOutcome::Staged { version },
            Err(e) => self.fail(e, Some(&release.version)),
        }
    }

    fn already_staged(&self, version: &str) -> bool {
        pending_state(&self.layout) == PendingState::Ready
            && PendingUpdate::for_layout(&self.layout)
                .manifest()
                .map(|pkg| pkg.version == version)
                .unwrap_or(false)
    }

    fn fetch_and_stage(&self, release: &ReleaseDescriptor) -> Result<String, UpdateError> {
        // Last writer wins: a new download replaces any previous pending update.
        clear_pending(&self.layout);

        let headers = crate::manifest_client::request_headers(&self.identity(), &self.secrets);
        let mut downloader = Downloader::new(self.transport, self.coop)
            .with_headers(headers)
            .with_chunk_size(self.settings.effective_chunk_size())
            .with_min_free_space(self.settings.min_free_space_bytes);
        if let Some(probe) = self.free_space_probe {
            downloader = downloader.with_free_space_probe(probe);
        }

        let archive = self.layout.pending_archive();
        downloader.download(&release.archive_url, &release.sha256, &archive)?;

        let (_, package) = stage(&archive, &self.layout, self.coop)?;
        if package.version != release.version {
            return Err(UpdateError::Integrity(format!(
                "package version {} does not match release {}",
                package.version, release.version
            )));
        }
        Ok(package.version)
    }

    fn fail(&mut self, error: UpdateError, version: Option<&str>) -> CycleOutcome {
        let kind = error.kind();
        let reason = error.to_string();
        error!("Update cycle failed ({}): {}", kind, reason);

        let mut marked_incompatible = false;
        if let Some(version) = version {
            clear_pending(&self.layout);
            if kind.marks_incompatible() {
                match self.state.mark_incompatible(version, &reason) {
                    Ok(()) => marked_incompatible = true,
                    Err(e) => warn!("Cannot record {} as incompatible: {}", version, e),
                }
            }
        }

        CycleOutcome::Failed {
            kind,
            reason,
            marked_incompatible,
        }
    }
}
