//! CLI command definitions and dispatch.

pub mod config;
pub mod context;
pub mod copy_context;
pub mod erofs;
pub mod mount;
pub mod nuke;
pub mod probe;
pub mod repair;
pub mod sync;
pub mod tempdir;
pub mod umount;
pub mod unmountable;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use hymo_common::config::HymoConfig;
use hymo_common::constants;

/// hymod — module image mounting and maintenance.
#[derive(Parser, Debug)]
#[command(name = constants::BIN_NAME, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Path to the configuration file.
    #[arg(long, global = true, default_value = constants::DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Enable debug logging.
    #[arg(long, global = true)]
    pub debug: bool,

    /// Enable trace logging.
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Rename the process before running the command.
    #[arg(long, global = true)]
    pub process_name: Option<String>,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Mount an image, block device, or directory at a target.
    Mount(mount::MountArgs),
    /// Detach a mount point.
    Umount(umount::UmountArgs),
    /// Check and fix a filesystem image.
    Repair(repair::RepairArgs),
    /// Print the SELinux context a path would receive.
    Context(context::ContextArgs),
    /// Copy or derive the SELinux label of one path onto another.
    CopyContext(copy_context::CopyContextArgs),
    /// Validate, recreate, or remove a scratch directory.
    Tempdir(tempdir::TempdirArgs),
    /// Register mount points for forced unmount.
    Unmountable(unmountable::UnmountableArgs),
    /// Purge stale ext4 sysfs state for a detached image mount.
    Nuke(nuke::NukeArgs),
    /// Copy a directory tree, labelling every entry by destination.
    Sync(sync::SyncArgs),
    /// Report whether the kernel supports EROFS.
    Erofs,
    /// Report kernel and filesystem capabilities.
    Probe(probe::ProbeArgs),
    /// Show or write the effective configuration.
    Config(config::ConfigArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli, config: &HymoConfig) -> anyhow::Result<()> {
    if let Some(name) = cli.process_name.as_deref() {
        rename_process(name);
    }

    match cli.command {
        Command::Mount(args) => mount::execute(&args, config),
        Command::Umount(args) => umount::execute(&args),
        Command::Repair(args) => repair::execute(&args, config),
        Command::Context(args) => context::execute(&args),
        Command::CopyContext(args) => copy_context::execute(&args),
        Command::Tempdir(args) => tempdir::execute(&args, config),
        Command::Unmountable(args) => unmountable::execute(&args, config),
        Command::Nuke(args) => nuke::execute(&args, config),
        Command::Sync(args) => sync::execute(&args),
        Command::Erofs => {
            erofs::execute();
            Ok(())
        }
        Command::Probe(args) => {
            probe::execute(&args, config);
            Ok(())
        }
        Command::Config(args) => config::execute(&args, config, &cli.config),
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn rename_process(name: &str) {
    if let Err(e) = hymo_core::fs::camouflage_process(name) {
        tracing::warn!(name, error = %e, "process rename skipped");
    }
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn rename_process(name: &str) {
    tracing::warn!(name, "process rename is not supported on this platform");
}
