//! CLI - command-line argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Halo field diagnostics
#[derive(Parser)]
#[command(name = "haloctl")]
#[command(about = "Halo firmware diagnostics and sideloading", long_about = None)]
#[command(version = env!("HALO_VERSION"))]
pub struct Cli {
    /// Device root
    #[arg(long, global = true, env = "HALO_ROOT", default_value = "/")]
    pub root: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Installed version, pending update, backup and recent boot log
    Status {
        /// Output JSON only
        #[arg(long)]
        json: bool,
    },

    /// Releases this device has rejected
    Ledger {
        /// Output JSON only
        #[arg(long)]
        json: bool,
    },

    /// Check the critical files and the recovery backup
    Verify {
        /// Output JSON only
        #[arg(long)]
        json: bool,
    },

    /// Fetch the manifest and show which release would be installed
    Check {
        /// Output JSON only
        #[arg(long)]
        json: bool,
    },

    /// Stage a local release archive for installation at next boot
    Stage {
        /// Release ZIP
        archive: PathBuf,

        /// Expected SHA-256 of the archive
        #[arg(long)]
        sha256: Option<String>,
    },
}
