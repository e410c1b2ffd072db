//! haloctl - field diagnostics for Halo devices
//!
//! Reads the device tree under `--root`. Logs go to stderr so `--json`
//! output stays machine readable.

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use halo_common::DeviceLayout;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> Result<ExitCode> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let layout = DeviceLayout::new(&cli.root);

    match cli.command {
        Commands::Status { json } => commands::status(&layout, json),
        Commands::Ledger { json } => commands::ledger(&layout, json),
        Commands::Verify { json } => commands::verify(&layout, json),
        Commands::Check { json } => commands::check(&layout, json),
        Commands::Stage { archive, sha256 } => {
            commands::stage_archive(&layout, &archive, sha256.as_deref())
        }
    }
}
