//! `hymod tempdir` — Validate, recreate, or remove a scratch directory.

use std::path::{Path, PathBuf};

use clap::{Args, Subcommand};
use hymo_common::config::HymoConfig;
use hymo_core::tempdir::TempDirGuard;

use crate::output;

/// Arguments for the `tempdir` command.
#[derive(Args, Debug)]
pub struct TempdirArgs {
    /// Action to perform.
    #[command(subcommand)]
    pub action: TempdirAction,
}

/// Scratch directory actions.
#[derive(Subcommand, Debug)]
pub enum TempdirAction {
    /// Report whether a path may be wiped.
    Check(TempdirTarget),
    /// Wipe and recreate a path.
    Ensure {
        /// Target directory.
        #[command(flatten)]
        target: TempdirTarget,

        /// Mount a tmpfs on the directory once it is recreated.
        #[arg(long)]
        tmpfs: bool,
    },
    /// Remove a path. Refusals and failures are logged, never fatal.
    Cleanup(TempdirTarget),
}

/// Directory selection shared by every action.
#[derive(Args, Debug)]
pub struct TempdirTarget {
    /// Directory to act on. Defaults to the configured scratch directory.
    pub path: Option<PathBuf>,

    /// Accept the mirror directory even though it sits under `/dev`.
    #[arg(long)]
    pub allow_dev_mirror: bool,
}

impl TempdirTarget {
    fn resolve(&self, config: &HymoConfig) -> PathBuf {
        self.path.clone().unwrap_or_else(|| config.temp_dir())
    }
}

/// Executes the `tempdir` command.
///
/// # Errors
///
/// Returns an error if the configured mirror is not below `/dev`, if
/// `check` finds the path unsafe, or if `ensure` refuses the path or fails
/// to recreate it.
pub fn execute(args: &TempdirArgs, config: &HymoConfig) -> anyhow::Result<()> {
    let guard = TempDirGuard::default().with_dev_mirror(&config.mirror_dir)?;

    match &args.action {
        TempdirAction::Check(target) => {
            let path = target.resolve(config);
            if !guard.is_safe(&path, target.allow_dev_mirror) {
                anyhow::bail!("unsafe temp dir: {}", path.display());
            }
            output::line(path.display());
        }
        TempdirAction::Ensure { target, tmpfs } => {
            let path = target.resolve(config);
            guard.ensure(&path, target.allow_dev_mirror)?;
            if *tmpfs {
                mount_scratch(&path)?;
            }
            output::line(path.display());
        }
        TempdirAction::Cleanup(target) => {
            guard.cleanup(&target.resolve(config), target.allow_dev_mirror);
        }
    }
    Ok(())
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn mount_scratch(path: &Path) -> anyhow::Result<()> {
    hymo_core::fs::mount_tmpfs(path)?;
    Ok(())
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn mount_scratch(_path: &Path) -> anyhow::Result<()> {
    anyhow::bail!("tmpfs mounts are only supported on Linux")
}
