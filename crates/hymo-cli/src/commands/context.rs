//! `hymod context` — Print the SELinux context for a path.

use std::path::PathBuf;

use clap::Args;
use hymo_core::selinux::SecurityContextPropagator;

use crate::output;

/// Arguments for the `context` command.
#[derive(Args, Debug)]
pub struct ContextArgs {
    /// Path to classify. Need not exist.
    pub path: PathBuf,

    /// Print the label currently on disk instead of the derived one.
    #[arg(long)]
    pub current: bool,
}

/// Executes the `context` command.
///
/// # Errors
///
/// Returns an error if `--current` is given and the label cannot be read.
pub fn execute(args: &ContextArgs) -> anyhow::Result<()> {
    if args.current {
        match SecurityContextPropagator::detect().read_label(&args.path)? {
            Some(label) => output::line(label),
            None => anyhow::bail!("SELinux labels are not supported on this system"),
        }
    } else {
        output::line(SecurityContextPropagator::get_context_for_path(&args.path));
    }
    Ok(())
}
