//! Unified error types for the hymo workspace.
//!
//! Every public operation in `hymo-core` reports its outcome through
//! [`HymoError`]; the variants mirror the failure classes callers act on
//! (exhausted resources, failed syscalls, policy refusals, tool failures).

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum HymoError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// A loop device could not be allocated or bound.
    #[error("loop device error: {message}")]
    LoopDevice {
        /// Description of the failed step.
        message: String,
    },

    /// The `mount(2)` syscall failed.
    #[error("mount failed: {errno} (src={source_path}, tgt={target}, type={fs_type})")]
    Mount {
        /// Effective mount source (image, bind source, or loop device).
        source_path: String,
        /// Mount point.
        target: PathBuf,
        /// Filesystem type passed to the kernel.
        fs_type: String,
        /// System error reported by the kernel.
        errno: std::io::Error,
    },

    /// A destructive operation was refused because the path is protected.
    #[error("refusing to operate on unsafe path: {path}")]
    UnsafePath {
        /// The rejected path.
        path: PathBuf,
    },

    /// The external filesystem checker did not succeed.
    #[error("image repair failed: {}", code.map_or_else(|| "abnormal termination".to_string(), |c| format!("exit code {c}")))]
    Repair {
        /// Exit code of the checker, `None` when it was killed by a signal.
        code: Option<i32>,
    },

    /// The privileged driver handle could not be obtained.
    #[error("privileged driver not available")]
    DriverUnavailable,

    /// A command sent to the privileged driver failed.
    #[error("driver command {operation} failed: {source}")]
    Driver {
        /// Name of the driver command.
        operation: &'static str,
        /// Underlying system error.
        source: std::io::Error,
    },

    /// The operation is not available on this platform.
    #[error("unsupported on this platform: {feature}")]
    Unsupported {
        /// Name of the missing platform feature.
        feature: String,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, HymoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repair_error_reports_exit_code() {
        let err = HymoError::Repair { code: Some(8) };
        assert_eq!(err.to_string(), "image repair failed: exit code 8");
    }

    #[test]
    fn repair_error_reports_abnormal_termination() {
        let err = HymoError::Repair { code: None };
        assert_eq!(err.to_string(), "image repair failed: abnormal termination");
    }

    #[test]
    fn mount_error_names_source_and_target() {
        let err = HymoError::Mount {
            source_path: "/dev/block/loop3".into(),
            target: PathBuf::from("/mnt/img"),
            fs_type: "ext4".into(),
            errno: std::io::Error::from(std::io::ErrorKind::InvalidInput),
        };
        let msg = err.to_string();
        assert!(msg.contains("src=/dev/block/loop3"));
        assert!(msg.contains("tgt=/mnt/img"));
        assert!(msg.contains("type=ext4"));
    }
}
