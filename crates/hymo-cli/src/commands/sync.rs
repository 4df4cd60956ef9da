//! `hymod sync` — Copy a directory tree with label fixing.

use std::path::PathBuf;

use clap::Args;
use hymo_core::selinux::SecurityContextPropagator;

/// Arguments for the `sync` command.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Source directory.
    pub src: PathBuf,

    /// Destination directory; created if missing.
    pub dst: PathBuf,
}

/// Executes the `sync` command.
///
/// # Errors
///
/// Returns an error if any entry fails to copy.
pub fn execute(args: &SyncArgs) -> anyhow::Result<()> {
    let labels = SecurityContextPropagator::detect();
    hymo_core::fs::sync_dir(&args.src, &args.dst, &labels)?;
    Ok(())
}
