//! `hymod repair` — Check and fix a filesystem image.

use std::path::PathBuf;

use clap::Args;
use hymo_common::config::HymoConfig;
use hymo_core::repair::{ImageRepairer, RepairOutcome};

use crate::output;

/// Arguments for the `repair` command.
#[derive(Args, Debug)]
pub struct RepairArgs {
    /// Image file to check.
    pub image: PathBuf,

    /// Checker to run instead of the configured one.
    #[arg(long)]
    pub tool: Option<String>,
}

/// Executes the `repair` command.
///
/// # Errors
///
/// Returns an error if the checker cannot run or reports uncorrected errors.
pub fn execute(args: &RepairArgs, config: &HymoConfig) -> anyhow::Result<()> {
    let tool = args.tool.as_deref().unwrap_or(&config.repair_tool);
    let outcome = ImageRepairer::new(tool).repair(&args.image)?;
    output::line(describe(outcome));
    Ok(())
}

const fn describe(outcome: RepairOutcome) -> &'static str {
    match outcome {
        RepairOutcome::Clean => "clean",
        RepairOutcome::Corrected => "corrected",
        RepairOutcome::CorrectedRebootAdvised => "corrected (reboot advised)",
        RepairOutcome::Failed(_) => "failed",
    }
}
