//! Image and directory mounting.
//!
//! Parses `mount(8)`-style option strings, picks the effective source
//! (verbatim path or a freshly bound loop device), and issues `mount(2)`.
//! A loop device bound for a failed mount is cleared before returning.

use std::path::{Path, PathBuf};

use hymo_common::error::{HymoError, Result};
use nix::mount::{MntFlags, MsFlags};

use crate::loop_device::{LoopBinding, LoopDeviceBinder};

/// Parsed representation of a comma-separated mount option string.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountOptions {
    /// Flags passed to `mount(2)`.
    pub flags: MsFlags,
    /// Filesystem-specific data: every unrecognized token, comma-joined.
    pub data: String,
    /// `ro` was requested.
    pub read_only: bool,
    /// `bind` was requested.
    pub bind: bool,
    /// `remount` was requested.
    pub remount: bool,
}

impl Default for MountOptions {
    fn default() -> Self {
        Self {
            flags: MsFlags::empty(),
            data: String::new(),
            read_only: false,
            bind: false,
            remount: false,
        }
    }
}

impl MountOptions {
    /// Parses an option string such as `"ro,noatime,errors=continue"`.
    ///
    /// Parsing never fails: `loop` is accepted and ignored, empty segments
    /// are skipped, and unknown tokens are passed through as data. `ro` wins
    /// over `rw` regardless of order.
    #[must_use]
    pub fn parse(options: &str) -> Self {
        let mut parsed = Self::default();
        let mut data = Vec::new();

        for token in options.split(',') {
            match token {
                "" | "loop" | "rw" => {}
                "ro" => {
                    parsed.flags |= MsFlags::MS_RDONLY;
                    parsed.read_only = true;
                }
                "noatime" => parsed.flags |= MsFlags::MS_NOATIME,
                "noexec" => parsed.flags |= MsFlags::MS_NOEXEC,
                "nosuid" => parsed.flags |= MsFlags::MS_NOSUID,
                "nodev" => parsed.flags |= MsFlags::MS_NODEV,
                "sync" => parsed.flags |= MsFlags::MS_SYNCHRONOUS,
                "bind" => {
                    parsed.flags |= MsFlags::MS_BIND;
                    parsed.bind = true;
                }
                "remount" => {
                    parsed.flags |= MsFlags::MS_REMOUNT;
                    parsed.remount = true;
                }
                other => data.push(other),
            }
        }

        parsed.data = data.join(",");
        parsed
    }

    /// Whether the source must be handed to the kernel untouched.
    #[must_use]
    pub const fn uses_source_verbatim(&self) -> bool {
        self.bind || self.remount
    }
}

/// A single mount to perform.
#[derive(Debug, Clone)]
pub struct MountRequest {
    /// Image file, block device, directory, or bind source.
    pub source: PathBuf,
    /// Mount point; created if missing.
    pub target: PathBuf,
    /// Filesystem type; empty for bind mounts and remounts.
    pub fs_type: String,
    /// Parsed options.
    pub options: MountOptions,
}

impl MountRequest {
    /// Builds a request, parsing `options` with [`MountOptions::parse`].
    #[must_use]
    pub fn new(
        source: impl Into<PathBuf>,
        target: impl Into<PathBuf>,
        fs_type: impl Into<String>,
        options: &str,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            fs_type: fs_type.into(),
            options: MountOptions::parse(options),
        }
    }
}

/// Effective source chosen for a request.
#[derive(Debug)]
pub enum MountSource {
    /// The request source, passed to the kernel as-is.
    Verbatim(PathBuf),
    /// A loop device bound to the request's image file.
    Loop(LoopBinding),
}

impl MountSource {
    /// Path handed to `mount(2)`.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Verbatim(path) => path,
            Self::Loop(binding) => binding.device_path(),
        }
    }
}

/// Runs mount requests, binding loop devices for image files.
#[derive(Debug, Clone, Default)]
pub struct MountOrchestrator {
    binder: LoopDeviceBinder,
}

impl MountOrchestrator {
    /// Creates an orchestrator that allocates loop devices with `binder`.
    #[must_use]
    pub const fn new(binder: LoopDeviceBinder) -> Self {
        Self { binder }
    }

    /// Mounts `image` at `target` with a raw option string.
    ///
    /// # Errors
    ///
    /// See [`MountOrchestrator::mount`].
    pub fn mount_image(
        &self,
        image: &Path,
        target: &Path,
        fs_type: &str,
        options: &str,
    ) -> Result<()> {
        self.mount(&MountRequest::new(image, target, fs_type, options))
    }

    /// Decides what to pass to the kernel as the mount source.
    ///
    /// Bind mounts and remounts use the source verbatim. A regular file is
    /// bound to a loop device (read-only when `ro` was requested). Anything
    /// else (block device, directory, pseudo source) is used verbatim.
    ///
    /// # Errors
    ///
    /// Returns an error if a loop device is needed and cannot be bound.
    pub fn resolve_source(&self, request: &MountRequest) -> Result<MountSource> {
        if request.options.uses_source_verbatim() || !request.source.is_file() {
            return Ok(MountSource::Verbatim(request.source.clone()));
        }
        let binding = self
            .binder
            .bind(&request.source, request.options.read_only)?;
        Ok(MountSource::Loop(binding))
    }

    /// Performs the mount described by `request`.
    ///
    /// On success a loop device, if any, is left to autoclear. On failure it
    /// is cleared before this returns.
    ///
    /// # Errors
    ///
    /// Returns an error if the target cannot be created, if a loop device
    /// cannot be bound, or if `mount(2)` fails.
    pub fn mount(&self, request: &MountRequest) -> Result<()> {
        crate::fs::ensure_dir_exists(&request.target)?;

        let source = self.resolve_source(request)?;
        let fs_type = (!request.fs_type.is_empty()).then_some(request.fs_type.as_str());
        let data = (!request.options.data.is_empty()).then_some(request.options.data.as_str());

        tracing::debug!(
            source = %source.path().display(),
            target = %request.target.display(),
            fs_type = %request.fs_type,
            flags = ?request.options.flags,
            data = %request.options.data,
            "mounting"
        );

        let result = nix::mount::mount(
            Some(source.path()),
            &request.target,
            fs_type,
            request.options.flags,
            data,
        );

        match result {
            Ok(()) => {
                if let MountSource::Loop(binding) = source {
                    tracing::debug!(
                        device = %binding.device_path().display(),
                        backing = %binding.backing_path().display(),
                        "loop device held by mount"
                    );
                    binding.release();
                }
                tracing::info!(
                    source = %request.source.display(),
                    target = %request.target.display(),
                    "mounted"
                );
                Ok(())
            }
            Err(errno) => {
                let source_path = source.path().display().to_string();
                tracing::error!(
                    src = %source_path,
                    tgt = %request.target.display(),
                    fs_type = %request.fs_type,
                    error = %errno,
                    "mount failed"
                );
                if let MountSource::Loop(binding) = source {
                    let backing = binding.backing_path().to_path_buf();
                    if let Err(e) = binding.detach() {
                        tracing::warn!(
                            backing = %backing.display(),
                            error = %e,
                            "failed to clear loop device after mount failure"
                        );
                    }
                }
                Err(HymoError::Mount {
                    source_path,
                    target: request.target.clone(),
                    fs_type: request.fs_type.clone(),
                    errno: errno.into(),
                })
            }
        }
    }
}

/// Unmounts `target`, lazily detaching it when `lazy` is set.
///
/// # Errors
///
/// Returns an error if `umount2(2)` fails.
pub fn unmount(target: &Path, lazy: bool) -> Result<()> {
    let flags = if lazy {
        MntFlags::MNT_DETACH
    } else {
        MntFlags::empty()
    };
    nix::mount::umount2(target, flags).map_err(|e| HymoError::Io {
        path: target.to_path_buf(),
        source: e.into(),
    })?;
    tracing::debug!(target = %target.display(), lazy, "unmounted");
    Ok(())
}
