//! `hymod unmountable` — Register mount points for forced unmount.

use std::path::PathBuf;

use clap::Args;
use hymo_common::config::HymoConfig;
use hymo_core::unmount::{Registration, UnmountRegistry};

use crate::output;

/// Arguments for the `unmountable` command.
#[derive(Args, Debug)]
pub struct UnmountableArgs {
    /// Mount points to register.
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,
}

/// Executes the `unmountable` command.
///
/// Paths the driver refuses are reported and skipped.
///
/// # Errors
///
/// Returns an error if the privileged driver cannot be reached.
pub fn execute(args: &UnmountableArgs, config: &HymoConfig) -> anyhow::Result<()> {
    if config.disable_umount {
        tracing::info!("force-unmount registration is disabled");
        return Ok(());
    }

    let registry = UnmountRegistry::system();
    for path in &args.paths {
        let outcome = registry.register_unmountable(path)?;
        output::line(format!("{}: {}", path.display(), describe(outcome)));
    }
    tracing::debug!(registered = registry.registered_count(), "registration finished");
    Ok(())
}

const fn describe(outcome: Registration) -> &'static str {
    match outcome {
        Registration::Registered => "registered",
        Registration::AlreadyRegistered => "already registered",
        Registration::Rejected => "rejected",
        Registration::Ignored => "ignored",
        Registration::Unsupported => "unsupported",
    }
}
