//! Halo Common - Update & Recovery Engine for the Halo ambient display
//!
//! Everything that decides whether new firmware may replace the running one
//! lives here: manifest parsing and release selection, chunked download with
//! checksum verification, atomic staging, the boot-time verifier and install
//! pipeline, install hooks, the recovery backup, and the incompatible-release
//! ledger. The `halod` and `haloctl` binaries are thin shells around it.

pub mod archive;
pub mod attempt;
pub mod boot;
pub mod compat;
pub mod config;
pub mod coop;
pub mod device;
pub mod download;
pub mod error;
pub mod fsutil;
pub mod install;
pub mod install_log;
pub mod layout;
pub mod ledger;
pub mod manifest;
pub mod manifest_client;
pub mod recovery;
pub mod scripts;
pub mod stage;
pub mod storage;
pub mod transport;
pub mod updater;
pub mod version;

pub use boot::{run_boot_sequence, BootOutcome, BootReport};
pub use compat::{check_release_compatibility, select};
pub use config::DeviceSettings;
pub use device::{Channel, DeviceIdentity};
pub use error::{ErrorKind, UpdateError};
pub use layout::{DeviceLayout, CRITICAL_FILES, CRITICAL_SET_VERSION};
pub use ledger::IncompatibleLedger;
pub use manifest::{Manifest, PackageManifest, ReleaseDescriptor};
pub use updater::{CycleOutcome, UpdateCycle};
pub use version::{compare_versions, is_newer_version, FirmwareVersion};
