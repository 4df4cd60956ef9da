//! Filesystem helpers used around mounts: directory creation, recursive
//! copy with label fixing, content probing, tmpfs and EROFS support checks.

use std::path::Path;

use hymo_common::constants;
use hymo_common::error::{HymoError, Result};
use hymo_common::types::SecurityContext;
use walkdir::WalkDir;

use crate::selinux::{LabelWrite, SecurityContextPropagator};

/// Creates `path` and its parents if missing.
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub fn ensure_dir_exists(path: &Path) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    std::fs::create_dir_all(path).map_err(|e| {
        tracing::error!(path = %path.display(), error = %e, "failed to create directory");
        HymoError::Io {
            path: path.to_path_buf(),
            source: e,
        }
    })
}

/// Whether any regular file or symlink exists anywhere below `path`.
///
/// A missing path or non-directory yields `false`. A traversal error yields
/// `true`, so callers never treat an unreadable tree as empty.
#[must_use]
pub fn has_files_recursive(path: &Path) -> bool {
    if !path.is_dir() {
        return false;
    }
    WalkDir::new(path).min_depth(1).into_iter().any(|entry| match entry {
        Ok(entry) => {
            let file_type = entry.file_type();
            file_type.is_file() || file_type.is_symlink()
        }
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "walk failed, assuming content");
            true
        }
    })
}

/// Copies the tree at `src` into `dst`, labelling every created entry by
/// its destination path.
///
/// A missing source is not an error. Existing files and symlinks in `dst`
/// are replaced.
///
/// # Errors
///
/// Returns an error if `dst` cannot be created or any entry fails to copy.
pub fn sync_dir(src: &Path, dst: &Path, labels: &SecurityContextPropagator) -> Result<()> {
    tracing::debug!(src = %src.display(), dst = %dst.display(), "sync_dir");

    if !src.exists() {
        tracing::warn!(src = %src.display(), "sync_dir: source does not exist");
        return Ok(());
    }
    ensure_dir_exists(dst)?;

    let count = copy_tree(src, dst, labels)?;
    tracing::debug!(src = %src.display(), count, "sync_dir complete");
    Ok(())
}

fn copy_tree(src: &Path, dst: &Path, labels: &SecurityContextPropagator) -> Result<usize> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |e: std::io::Error| HymoError::Io { path, source: e }
    };

    create_dir_like(src, dst, labels).map_err(io_err(dst))?;

    let mut count = 0;
    for entry in WalkDir::new(src).min_depth(1) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(src).to_path_buf();
            tracing::error!(path = %path.display(), error = %e, "failed to walk source tree");
            HymoError::Io {
                path,
                source: e.into(),
            }
        })?;
        let from = entry.path();
        let Ok(relative) = from.strip_prefix(src) else {
            continue;
        };
        let to = dst.join(relative);
        let file_type = entry.file_type();
        count += 1;

        if file_type.is_symlink() {
            let link = std::fs::read_link(from).map_err(io_err(from))?;
            remove_entry(&to).map_err(io_err(&to))?;
            std::os::unix::fs::symlink(&link, &to).map_err(io_err(&to))?;
            label_by_location(labels, &to);
        } else if file_type.is_dir() {
            create_dir_like(from, &to, labels).map_err(io_err(&to))?;
        } else {
            if !std::fs::symlink_metadata(&to).is_ok_and(|meta| meta.is_file()) {
                remove_entry(&to).map_err(io_err(&to))?;
            }
            let _ = std::fs::copy(from, &to).map_err(io_err(from))?;
            let perms = entry.metadata().map_err(|e| HymoError::Io {
                path: from.to_path_buf(),
                source: e.into(),
            })?;
            std::fs::set_permissions(&to, perms.permissions()).map_err(io_err(&to))?;
            label_by_location(labels, &to);
        }
    }
    Ok(count)
}

fn create_dir_like(
    src: &Path,
    dst: &Path,
    labels: &SecurityContextPropagator,
) -> std::io::Result<()> {
    if std::fs::symlink_metadata(dst).is_ok_and(|meta| meta.is_dir()) {
        return Ok(());
    }
    remove_entry(dst)?;
    std::fs::create_dir_all(dst)?;
    std::fs::set_permissions(dst, std::fs::metadata(src)?.permissions())?;
    label_by_location(labels, dst);
    Ok(())
}

fn remove_entry(path: &Path) -> std::io::Result<()> {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(path),
        Ok(_) => std::fs::remove_file(path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

fn label_by_location(labels: &SecurityContextPropagator, path: &Path) {
    // Best effort.
    let _ = labels.set_label(path, &SecurityContext::for_path(path));
}

/// Whether `probe_dir` accepts SELinux labels, tested by labelling a
/// throwaway file.
#[must_use]
pub fn is_xattr_supported(probe_dir: &Path, labels: &SecurityContextPropagator) -> bool {
    let probe = probe_dir.join(".xattr_test");
    if std::fs::write(&probe, b"test").is_err() {
        return false;
    }
    let supported = matches!(
        labels.set_label(&probe, &SecurityContext::system_file()),
        Ok(LabelWrite::Applied)
    );
    let _ = std::fs::remove_file(&probe);
    supported
}

/// Whether a `/proc/filesystems` listing names `fs_type`.
#[must_use]
pub fn filesystems_list_has(listing: &str, fs_type: &str) -> bool {
    listing
        .lines()
        .filter_map(|line| line.split_whitespace().last())
        .any(|name| name == fs_type)
}

/// Whether the running kernel can mount EROFS images.
#[must_use]
pub fn is_erofs_supported() -> bool {
    std::fs::read_to_string(constants::PROC_FILESYSTEMS)
        .is_ok_and(|listing| filesystems_list_has(&listing, "erofs"))
}

/// Mounts a fresh tmpfs (mode 0755) at `target`, creating it if needed.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or the mount fails.
#[cfg(any(target_os = "linux", target_os = "android"))]
pub fn mount_tmpfs(target: &Path) -> Result<()> {
    use nix::mount::{MsFlags, mount};

    ensure_dir_exists(target)?;
    mount(
        Some("tmpfs"),
        target,
        Some("tmpfs"),
        MsFlags::empty(),
        Some("mode=0755"),
    )
    .map_err(|e| {
        tracing::error!(target = %target.display(), error = %e, "failed to mount tmpfs");
        HymoError::Mount {
            source_path: "tmpfs".into(),
            target: target.to_path_buf(),
            fs_type: "tmpfs".into(),
            errno: e.into(),
        }
    })?;
    tracing::debug!(target = %target.display(), "tmpfs mounted");
    Ok(())
}

/// Whether a tmpfs on this device keeps SELinux labels. Mounts a probe
/// tmpfs under `scratch`, labels a file in it, then tears it down.
#[cfg(any(target_os = "linux", target_os = "android"))]
#[must_use]
pub fn check_tmpfs_xattr(scratch: &Path, labels: &SecurityContextPropagator) -> bool {
    let probe_dir = scratch.join("xattr_check");
    if mount_tmpfs(&probe_dir).is_err() {
        return false;
    }
    let supported = is_xattr_supported(&probe_dir, labels);
    if let Err(e) = crate::mount::unmount(&probe_dir, true) {
        tracing::warn!(path = %probe_dir.display(), error = %e, "failed to detach tmpfs probe");
    }
    let _ = std::fs::remove_dir(&probe_dir);
    supported
}

/// Renames the calling thread (and, for the main thread, the process as
/// shown by `ps`).
///
/// # Errors
///
/// Returns an error if the name contains a NUL byte or `prctl(2)` fails.
#[cfg(any(target_os = "linux", target_os = "android"))]
pub fn camouflage_process(name: &str) -> Result<()> {
    let c_name = std::ffi::CString::new(name).map_err(|_| HymoError::Config {
        message: format!("process name contains NUL: {name:?}"),
    })?;
    nix::sys::prctl::set_name(&c_name).map_err(|e| {
        tracing::warn!(error = %e, "failed to camouflage process");
        HymoError::Io {
            path: "/proc/self/comm".into(),
            source: e.into(),
        }
    })
}
