//! Image repair through the external filesystem checker.

use std::path::Path;
use std::process::{Command, Stdio};

use hymo_common::constants;
use hymo_common::error::{HymoError, Result};

/// Classified result of one checker run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairOutcome {
    /// Exit code 0: no errors.
    Clean,
    /// Exit code 1: errors were corrected.
    Corrected,
    /// Exit code 2: errors were corrected, a reboot is advised.
    CorrectedRebootAdvised,
    /// Any other exit code, or `None` when the checker was killed.
    Failed(Option<i32>),
}

impl RepairOutcome {
    /// Classifies a checker exit code.
    #[must_use]
    pub const fn from_exit_code(code: Option<i32>) -> Self {
        match code {
            Some(0) => Self::Clean,
            Some(1) => Self::Corrected,
            Some(constants::REPAIR_MAX_OK_CODE) => Self::CorrectedRebootAdvised,
            other => Self::Failed(other),
        }
    }

    /// Whether the image can be mounted again.
    #[must_use]
    pub const fn is_success(self) -> bool {
        !matches!(self, Self::Failed(_))
    }
}

/// Runs the filesystem checker in forced, non-interactive, auto-fix mode.
#[derive(Debug, Clone)]
pub struct ImageRepairer {
    program: String,
    prefix_args: Vec<String>,
}

impl Default for ImageRepairer {
    fn default() -> Self {
        Self::new(constants::DEFAULT_REPAIR_TOOL)
    }
}

impl ImageRepairer {
    /// Uses `program` as the checker.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            prefix_args: Vec::new(),
        }
    }

    /// Arguments placed before the checker flags, for multi-call binaries
    /// such as `busybox e2fsck`.
    #[must_use]
    pub fn with_prefix_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prefix_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Checks and fixes `image`. Checker output is discarded.
    ///
    /// # Errors
    ///
    /// Returns [`HymoError::Io`] if the checker cannot be started, and
    /// [`HymoError::Repair`] if it exits with a code above 2 or is killed.
    pub fn repair(&self, image: &Path) -> Result<RepairOutcome> {
        tracing::info!(image = %image.display(), tool = %self.program, "running image repair");

        let status = Command::new(&self.program)
            .args(&self.prefix_args)
            .args(["-y", "-f"])
            .arg(image)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| {
                tracing::error!(tool = %self.program, error = %e, "failed to run checker");
                HymoError::Io {
                    path: self.program.clone().into(),
                    source: e,
                }
            })?;

        let outcome = RepairOutcome::from_exit_code(status.code());
        match outcome {
            RepairOutcome::Failed(code) => {
                match code {
                    Some(code) => tracing::error!(code, "image repair failed"),
                    None => tracing::error!("image repair terminated abnormally"),
                }
                Err(HymoError::Repair { code })
            }
            _ => {
                tracing::info!(code = ?status.code(), ?outcome, "image repair succeeded");
                Ok(outcome)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_up_to_two_are_success() {
        assert_eq!(RepairOutcome::from_exit_code(Some(0)), RepairOutcome::Clean);
        assert_eq!(RepairOutcome::from_exit_code(Some(1)), RepairOutcome::Corrected);
        assert_eq!(
            RepairOutcome::from_exit_code(Some(2)),
            RepairOutcome::CorrectedRebootAdvised
        );
        for code in 0..=2 {
            assert!(RepairOutcome::from_exit_code(Some(code)).is_success());
        }
    }

    #[test]
    fn other_exit_codes_are_failure() {
        for code in [3, 4, 8, 12, 127, -1] {
            assert!(!RepairOutcome::from_exit_code(Some(code)).is_success());
        }
        assert_eq!(
            RepairOutcome::from_exit_code(None),
            RepairOutcome::Failed(None)
        );
    }

    #[test]
    fn missing_checker_is_an_io_error() {
        let repairer = ImageRepairer::new("/nonexistent/e2fsck");
        assert!(matches!(
            repairer.repair(Path::new("/tmp/img")),
            Err(HymoError::Io { .. })
        ));
    }
}
