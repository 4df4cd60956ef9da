//! `hymod copy-context` — Mirror the SELinux label of one path onto another.

use std::path::PathBuf;

use clap::Args;
use hymo_core::selinux::{LabelWrite, SecurityContextPropagator};

/// Arguments for the `copy-context` command.
#[derive(Args, Debug)]
pub struct CopyContextArgs {
    /// Path whose label is copied. May be missing.
    pub src: PathBuf,

    /// Path that receives the label.
    pub dst: PathBuf,
}

/// Executes the `copy-context` command.
///
/// # Errors
///
/// Returns an error if the label cannot be written.
pub fn execute(args: &CopyContextArgs) -> anyhow::Result<()> {
    match SecurityContextPropagator::detect().copy_context(&args.src, &args.dst)? {
        LabelWrite::Applied => {
            tracing::info!(src = %args.src.display(), dst = %args.dst.display(), "label copied");
        }
        LabelWrite::Unsupported => {
            tracing::warn!("SELinux labels are not supported on this system; nothing written");
        }
    }
    Ok(())
}
