//! `hymod probe` — Report kernel and filesystem capabilities.

use std::path::{Path, PathBuf};

use clap::Args;
use hymo_common::config::HymoConfig;
use hymo_core::selinux::{LabelSupport, SecurityContextPropagator};

use crate::output;

/// Arguments for the `probe` command.
#[derive(Args, Debug)]
pub struct ProbeArgs {
    /// Directory used for the tmpfs label probe. Defaults to the configured
    /// scratch directory.
    #[arg(long)]
    pub scratch: Option<PathBuf>,

    /// Also mount a probe tmpfs to test whether it keeps labels.
    #[arg(long)]
    pub tmpfs: bool,
}

/// Executes the `probe` command. Unsupported probes report `no`.
pub fn execute(args: &ProbeArgs, config: &HymoConfig) {
    let labels = SecurityContextPropagator::detect();
    let scratch = args.scratch.clone().unwrap_or_else(|| config.temp_dir());

    output::flag("erofs", hymo_core::fs::is_erofs_supported());
    output::flag("selinux", labels.support() == LabelSupport::Supported);
    output::flag("scratch_has_files", hymo_core::fs::has_files_recursive(&scratch));
    if args.tmpfs {
        output::flag("tmpfs_xattr", tmpfs_keeps_labels(&scratch, &labels));
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn tmpfs_keeps_labels(scratch: &Path, labels: &SecurityContextPropagator) -> bool {
    hymo_core::fs::check_tmpfs_xattr(scratch, labels)
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn tmpfs_keeps_labels(_scratch: &Path, _labels: &SecurityContextPropagator) -> bool {
    false
}
