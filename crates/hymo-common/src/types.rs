//! Domain primitive types used across the hymo workspace.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants;

/// An SELinux security label such as `u:object_r:system_file:s0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SecurityContext(String);

impl SecurityContext {
    /// Creates a context from a raw label string.
    ///
    /// Trailing NUL bytes, as returned by `getxattr(2)`, are stripped.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        let mut label = label.into();
        while label.ends_with('\0') {
            let _ = label.pop();
        }
        Self(label)
    }

    /// The label given to ordinary system files.
    #[must_use]
    pub fn system_file() -> Self {
        Self(constants::DEFAULT_SELINUX_CONTEXT.to_string())
    }

    /// The label given to files on vendor-style partitions.
    #[must_use]
    pub fn vendor_file() -> Self {
        Self(constants::VENDOR_SELINUX_CONTEXT.to_string())
    }

    /// Returns the label a path should carry based on where it lives:
    /// anything under a vendor-style mount point gets the vendor label,
    /// everything else the system label.
    #[must_use]
    pub fn for_path(path: &Path) -> Self {
        if constants::VENDOR_PREFIXES
            .iter()
            .any(|prefix| path.starts_with(prefix))
        {
            Self::vendor_file()
        } else {
            Self::system_file()
        }
    }

    /// Whether this label is the placeholder left on files that never
    /// received a real context.
    #[must_use]
    pub fn is_uninitialized_rootfs(&self) -> bool {
        self.0.contains(constants::ROOTFS_SELINUX_CONTEXT)
    }

    /// Returns the inner label string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SecurityContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
