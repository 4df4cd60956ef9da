//! Scratch directory safety.
//!
//! Every destructive operation on a working directory goes through
//! [`TempDirGuard`], which refuses the filesystem root, the application data
//! directories, and anything on a virtual filesystem. The check is redone on
//! every call.

use std::path::{Component, Path, PathBuf};

use hymo_common::constants;
use hymo_common::error::{HymoError, Result};

/// Validates scratch directories before they are wiped.
#[derive(Debug, Clone)]
pub struct TempDirGuard {
    protected: Vec<PathBuf>,
    virtual_roots: Vec<PathBuf>,
    dev_mirror: PathBuf,
}

impl Default for TempDirGuard {
    fn default() -> Self {
        Self {
            protected: constants::PROTECTED_DIRS.iter().map(PathBuf::from).collect(),
            virtual_roots: constants::VIRTUAL_FS_ROOTS
                .iter()
                .map(PathBuf::from)
                .collect(),
            dev_mirror: PathBuf::from(constants::DEV_MIRROR_DIR),
        }
    }
}

impl TempDirGuard {
    /// Uses `mirror` as the directory exempted when `allow_dev_mirror` is set.
    ///
    /// # Errors
    ///
    /// Returns [`HymoError::UnsafePath`] unless `mirror` is an absolute path
    /// strictly below `/dev` once normalized.
    pub fn with_dev_mirror(mut self, mirror: impl Into<PathBuf>) -> Result<Self> {
        let mirror = mirror.into();
        let normalized = normalize(&mirror);
        let dev = Path::new(constants::DEV_DIR);
        if !normalized.is_absolute() || !normalized.starts_with(dev) || normalized == dev {
            tracing::error!(path = %mirror.display(), "rejecting dev mirror outside /dev");
            return Err(HymoError::UnsafePath { path: mirror });
        }
        self.dev_mirror = normalized;
        Ok(self)
    }

    /// Whether `path` may be wiped and recreated.
    #[must_use]
    pub fn is_safe(&self, path: &Path, allow_dev_mirror: bool) -> bool {
        !self.is_dangerous(path, allow_dev_mirror)
    }

    fn is_dangerous(&self, path: &Path, allow_dev_mirror: bool) -> bool {
        let p = normalize(path);
        let s = p.as_os_str();
        if s.is_empty() || s == "." || s == ".." {
            return true;
        }
        if self.protected.iter().any(|d| *d == p) {
            return true;
        }
        if allow_dev_mirror && p.starts_with(&self.dev_mirror) {
            return false;
        }
        self.virtual_roots.iter().any(|root| p.starts_with(root))
    }

    /// Wipes `path` and recreates it empty.
    ///
    /// # Errors
    ///
    /// Returns [`HymoError::UnsafePath`] without touching the filesystem if
    /// the path is protected, or [`HymoError::Io`] if removal or creation
    /// fails.
    pub fn ensure(&self, path: &Path, allow_dev_mirror: bool) -> Result<()> {
        if !self.is_safe(path, allow_dev_mirror) {
            tracing::error!(path = %path.display(), "refusing to clean unsafe temp dir");
            return Err(HymoError::UnsafePath {
                path: path.to_path_buf(),
            });
        }

        remove_existing(path).map_err(|e| {
            tracing::error!(path = %path.display(), error = %e, "failed to prepare temp dir");
            HymoError::Io {
                path: path.to_path_buf(),
                source: e,
            }
        })?;
        std::fs::create_dir_all(path).map_err(|e| {
            tracing::error!(path = %path.display(), error = %e, "failed to prepare temp dir");
            HymoError::Io {
                path: path.to_path_buf(),
                source: e,
            }
        })?;
        tracing::debug!(path = %path.display(), "temp dir ready");
        Ok(())
    }

    /// Removes `path` if it is safe to do so. Never fails: refusals and
    /// removal errors are logged and swallowed.
    pub fn cleanup(&self, path: &Path, allow_dev_mirror: bool) {
        if !self.is_safe(path, allow_dev_mirror) {
            tracing::warn!(path = %path.display(), "skipping cleanup for unsafe temp dir");
            return;
        }
        match remove_existing(path) {
            Ok(()) => tracing::debug!(path = %path.display(), "temp dir removed"),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to clean up temp dir");
            }
        }
    }
}

/// Lexically normalizes `path`: drops `.` components and trailing slashes,
/// folds `..` into its parent. Never touches the filesystem.
#[must_use]
pub fn normalize(path: &Path) -> PathBuf {
    let mut parts: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match parts.last() {
                Some(Component::Normal(_)) => {
                    let _ = parts.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => parts.push(component),
            },
            other => parts.push(other),
        }
    }
    parts.iter().collect()
}

fn remove_existing(path: &Path) -> std::io::Result<()> {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(path),
        Ok(_) => std::fs::remove_file(path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
