//! `hymod mount` — Mount an image at a target.

use std::path::PathBuf;

use clap::Args;
use hymo_common::config::HymoConfig;

/// Arguments for the `mount` command.
#[derive(Args, Debug)]
pub struct MountArgs {
    /// Image file, block device, or directory to mount.
    pub image: PathBuf,

    /// Mount point; created if missing.
    pub target: PathBuf,

    /// Filesystem type. Defaults to the configured type.
    #[arg(short = 't', long = "type")]
    pub fs_type: Option<String>,

    /// Comma-separated mount options (`ro`, `noatime`, `bind`, ...).
    #[arg(short, long, default_value = "")]
    pub options: String,

    /// Repair the image and retry once if the first mount fails.
    #[arg(long)]
    pub repair: bool,
}

/// Executes the `mount` command.
///
/// # Errors
///
/// Returns an error if the mount fails, or if the repair or the retry fails
/// when `--repair` is given.
#[cfg(any(target_os = "linux", target_os = "android"))]
pub fn execute(args: &MountArgs, config: &HymoConfig) -> anyhow::Result<()> {
    use hymo_core::mount::MountOrchestrator;
    use hymo_core::repair::ImageRepairer;

    let fs_type = args.fs_type.as_deref().unwrap_or(&config.fs_type);
    let orchestrator = MountOrchestrator::default();

    match orchestrator.mount_image(&args.image, &args.target, fs_type, &args.options) {
        Ok(()) => Ok(()),
        Err(e) if args.repair && args.image.is_file() => {
            tracing::warn!(image = %args.image.display(), error = %e, "mount failed, repairing image");
            let outcome = ImageRepairer::new(&config.repair_tool).repair(&args.image)?;
            tracing::info!(?outcome, "retrying mount after repair");
            orchestrator.mount_image(&args.image, &args.target, fs_type, &args.options)?;
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Executes the `mount` command.
///
/// # Errors
///
/// Always fails: image mounts need Linux.
#[cfg(not(any(target_os = "linux", target_os = "android")))]
pub fn execute(_args: &MountArgs, _config: &HymoConfig) -> anyhow::Result<()> {
    anyhow::bail!("image mounts are only supported on Linux")
}
