//! `hymod umount` — Detach a mount point.

use std::path::PathBuf;

use clap::Args;

/// Arguments for the `umount` command.
#[derive(Args, Debug)]
pub struct UmountArgs {
    /// Mount point to detach.
    pub target: PathBuf,

    /// Detach lazily (`MNT_DETACH`).
    #[arg(short, long)]
    pub lazy: bool,
}

/// Executes the `umount` command.
///
/// # Errors
///
/// Returns an error if `umount2(2)` fails.
#[cfg(any(target_os = "linux", target_os = "android"))]
pub fn execute(args: &UmountArgs) -> anyhow::Result<()> {
    hymo_core::mount::unmount(&args.target, args.lazy)?;
    Ok(())
}

/// Executes the `umount` command.
///
/// # Errors
///
/// Always fails: unmounting needs Linux.
#[cfg(not(any(target_os = "linux", target_os = "android")))]
pub fn execute(_args: &UmountArgs) -> anyhow::Result<()> {
    anyhow::bail!("unmounting is only supported on Linux")
}
