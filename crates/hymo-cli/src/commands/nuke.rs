//! `hymod nuke` — Purge stale ext4 sysfs state.

use std::path::PathBuf;

use clap::Args;
use hymo_common::config::HymoConfig;
use hymo_core::unmount::UnmountRegistry;

/// Arguments for the `nuke` command.
#[derive(Args, Debug)]
pub struct NukeArgs {
    /// Mount point of the image whose sysfs entries are purged.
    pub target: PathBuf,
}

/// Executes the `nuke` command.
///
/// # Errors
///
/// Returns an error if `enable_nuke` is off, the driver is unavailable, or
/// the driver rejects the command.
pub fn execute(args: &NukeArgs, config: &HymoConfig) -> anyhow::Result<()> {
    if !config.enable_nuke {
        anyhow::bail!("ext4 sysfs purge is disabled; set enable_nuke in the config");
    }
    UnmountRegistry::system().nuke_filesystem_state(&args.target)?;
    Ok(())
}
