//! Compatibility matcher
//!
//! `check_release_compatibility` is the single eligibility check, used when
//! choosing a release to download and again at boot against the staged
//! package manifest. `select` applies it to a manifest, including the
//! stepping-stone search through the archive when the device is too old to
//! jump straight to the current release.

use tracing::{debug, info};

use crate::device::{Channel, DeviceIdentity};
use crate::error::CompatibilityError;
use crate::ledger::IncompatibleLedger;
use crate::manifest::{Manifest, ReleaseDescriptor, ReleaseGroup};
use crate::version::FirmwareVersion;

/// Check one release against the device. Order: machine type, OS bucket,
/// strictly newer, not in ledger, minimum prior version.
pub fn check_release_compatibility(
    release: &ReleaseDescriptor,
    identity: &DeviceIdentity,
    ledger: &IncompatibleLedger,
) -> Result<(), CompatibilityError> {
    if !release
        .target_machine_types
        .iter()
        .any(|m| m == &identity.machine_type)
    {
        return Err(CompatibilityError::MachineType {
            device: identity.machine_type.clone(),
            targets: release.target_machine_types.clone(),
        });
    }

    if !release
        .target_operating_systems
        .iter()
        .any(|os| identity.os_matches(os))
    {
        return Err(CompatibilityError::OperatingSystem {
            device: identity.os_version.clone(),
            targets: release.target_operating_systems.clone(),
        });
    }

    let candidate = FirmwareVersion::parse(&release.version)?;
    let current = FirmwareVersion::parse(&identity.current_firmware_version)?;
    if candidate <= current {
        return Err(CompatibilityError::NotNewer {
            current: identity.current_firmware_version.clone(),
            candidate: release.version.clone(),
        });
    }

    if ledger.contains(&release.version) {
        return Err(CompatibilityError::MarkedIncompatible(release.version.clone()));
    }

    if let Some(required) = &release.minimum_prior_version {
        if current < FirmwareVersion::parse(required)? {
            return Err(CompatibilityError::MinimumPriorVersion {
                candidate: release.version.clone(),
                required: required.clone(),
                current: identity.current_firmware_version.clone(),
            });
        }
    }

    Ok(())
}

/// Choose the release this device should install next, if any.
pub fn select(
    manifest: &Manifest,
    identity: &DeviceIdentity,
    ledger: &IncompatibleLedger,
) -> Option<ReleaseDescriptor> {
    let group = match manifest.group_for(&identity.machine_type) {
        Some(g) => g,
        None => {
            debug!("No release group for machine type {}", identity.machine_type);
            return None;
        }
    };

    let production = group
        .production
        .as_ref()
        .and_then(|d| resolve(group, d, identity, ledger));

    let chosen = match identity.channel {
        Channel::Production => production,
        Channel::Development => {
            let development = group
                .development
                .as_ref()
                .and_then(|d| resolve(group, d, identity, ledger));
            newer_of(production, development)
        }
    };

    if let Some(release) = &chosen {
        info!(
            "Selected release {} for {} ({})",
            release.version, identity.machine_type, identity.channel
        );
    }
    chosen
}

/// Evaluate a channel descriptor, falling back to an archive stepping stone
/// when only its minimum prior version blocks it.
fn resolve(
    group: &ReleaseGroup,
    descriptor: &ReleaseDescriptor,
    identity: &DeviceIdentity,
    ledger: &IncompatibleLedger,
) -> Option<ReleaseDescriptor> {
    match check_release_compatibility(descriptor, identity, ledger) {
        Ok(()) => Some(descriptor.clone()),
        Err(CompatibilityError::MinimumPriorVersion { required, .. }) => {
            debug!(
                "{} requires {}; searching archive for a stepping stone",
                descriptor.version, required
            );
            stepping_stone(group, identity, ledger)
        }
        Err(e) => {
            debug!("Release {} not eligible: {}", descriptor.version, e);
            None
        }
    }
}

/// Newest archive release the device can install directly.
fn stepping_stone(
    group: &ReleaseGroup,
    identity: &DeviceIdentity,
    ledger: &IncompatibleLedger,
) -> Option<ReleaseDescriptor> {
    group
        .archive
        .iter()
        .find(|d| check_release_compatibility(d, identity, ledger).is_ok())
        .cloned()
}

/// Pick the newer release; production wins ties.
fn newer_of(
    production: Option<ReleaseDescriptor>,
    development: Option<ReleaseDescriptor>,
) -> Option<ReleaseDescriptor> {
    match (production, development) {
        (Some(p), Some(d)) => match (p.parsed_version(), d.parsed_version()) {
            (Some(pv), Some(dv)) if dv > pv => Some(d),
            _ => Some(p),
        },
        (p, d) => p.or(d),
    }
}
