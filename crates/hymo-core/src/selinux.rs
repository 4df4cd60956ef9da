//! SELinux label propagation.
//!
//! Labels live in the `security.selinux` extended attribute. Whether they
//! can be read and written is decided once through [`LabelSupport`] and
//! injected into [`SecurityContextPropagator`]; on hosts without SELinux
//! every label operation reports [`LabelWrite::Unsupported`] instead of
//! failing.

use std::path::Path;

use hymo_common::constants;
use hymo_common::error::{HymoError, Result};
use hymo_common::types::SecurityContext;

/// Whether the running system stores SELinux labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelSupport {
    /// Labels can be read and written.
    Supported,
    /// Label operations are no-ops.
    Unsupported,
}

impl LabelSupport {
    /// Probes the running system.
    ///
    /// Android always carries labels; other Linux systems only when
    /// selinuxfs is mounted.
    #[must_use]
    pub fn detect() -> Self {
        if cfg!(target_os = "android")
            || (cfg!(target_os = "linux") && Path::new(constants::SELINUXFS_PATH).exists())
        {
            Self::Supported
        } else {
            Self::Unsupported
        }
    }
}

/// Result of a label write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelWrite {
    /// The label was written.
    Applied,
    /// The platform has no labels; nothing was done.
    Unsupported,
}

/// Reads, derives, and writes SELinux labels.
#[derive(Debug, Clone, Copy)]
pub struct SecurityContextPropagator {
    support: LabelSupport,
}

impl SecurityContextPropagator {
    /// Creates a propagator with an explicit capability.
    #[must_use]
    pub const fn new(support: LabelSupport) -> Self {
        Self { support }
    }

    /// Creates a propagator for the running system.
    #[must_use]
    pub fn detect() -> Self {
        Self::new(LabelSupport::detect())
    }

    /// The capability this propagator was built with.
    #[must_use]
    pub const fn support(&self) -> LabelSupport {
        self.support
    }

    /// Label a path should carry based purely on where it lives.
    #[must_use]
    pub fn get_context_for_path(path: &Path) -> SecurityContext {
        SecurityContext::for_path(path)
    }

    /// Reads the label of `path` without following symlinks.
    ///
    /// Returns `Ok(None)` on platforms without labels. An empty attribute
    /// reads as the system label.
    ///
    /// # Errors
    ///
    /// Returns an error if the attribute cannot be read.
    pub fn read_label(&self, path: &Path) -> Result<Option<SecurityContext>> {
        if self.support == LabelSupport::Unsupported {
            return Ok(None);
        }
        let raw = xattr::lget(path, constants::SELINUX_XATTR).map_err(|e| HymoError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(Some(label_from_xattr(&raw)))
    }

    /// Writes `context` onto `path` without following symlinks.
    ///
    /// # Errors
    ///
    /// Returns an error if the attribute cannot be written.
    pub fn set_label(&self, path: &Path, context: &SecurityContext) -> Result<LabelWrite> {
        if self.support == LabelSupport::Unsupported {
            return Ok(LabelWrite::Unsupported);
        }
        xattr::lset(path, constants::SELINUX_XATTR, context.as_str().as_bytes()).map_err(|e| {
            tracing::debug!(path = %path.display(), error = %e, "lsetfilecon failed");
            HymoError::Io {
                path: path.to_path_buf(),
                source: e,
            }
        })?;
        tracing::trace!(path = %path.display(), context = %context, "label set");
        Ok(LabelWrite::Applied)
    }

    /// Label `dst` should receive when it mirrors `src`.
    ///
    /// An existing source passes its label on, unless that label is the
    /// uninitialized rootfs placeholder. A missing source, or the
    /// placeholder, means the label comes from `dst`'s own location. A
    /// source whose label cannot be read yields the system label.
    #[must_use]
    pub fn resolve_context(&self, src: &Path, dst: &Path) -> SecurityContext {
        let source_label = src.exists().then(|| {
            self.read_label(src)
                .ok()
                .flatten()
                .unwrap_or_else(SecurityContext::system_file)
        });
        derive_context(source_label, dst)
    }

    /// Copies the label of `src` onto `dst`, following the rules of
    /// [`resolve_context`](Self::resolve_context).
    ///
    /// # Errors
    ///
    /// Returns an error if the label cannot be written. Platforms without
    /// labels return `Ok(LabelWrite::Unsupported)`.
    pub fn copy_context(&self, src: &Path, dst: &Path) -> Result<LabelWrite> {
        if self.support == LabelSupport::Unsupported {
            return Ok(LabelWrite::Unsupported);
        }
        let context = self.resolve_context(src, dst);
        self.set_label(dst, &context)
    }
}

fn label_from_xattr(raw: &[u8]) -> SecurityContext {
    let label = SecurityContext::new(String::from_utf8_lossy(raw).into_owned());
    if label.as_str().is_empty() {
        SecurityContext::system_file()
    } else {
        label
    }
}

/// Picks the destination label from the source label (`None` when the
/// source does not exist) and the destination path.
#[must_use]
pub fn derive_context(source_label: Option<SecurityContext>, dst: &Path) -> SecurityContext {
    match source_label {
        Some(label) if !label.is_uninitialized_rootfs() => label,
        _ => SecurityContext::for_path(dst),
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
mod xattr {
    use std::ffi::CString;
    use std::io;
    use std::os::unix::ffi::OsStrExt;
    use std::path::Path;

    fn c_string(bytes: &[u8]) -> io::Result<CString> {
        CString::new(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
    }

    pub fn lget(path: &Path, name: &str) -> io::Result<Vec<u8>> {
        let c_path = c_string(path.as_os_str().as_bytes())?;
        let c_name = c_string(name.as_bytes())?;

        // SAFETY: both strings are NUL-terminated and outlive the call; a
        // null buffer of size 0 only queries the value length.
        let size =
            unsafe { libc::lgetxattr(c_path.as_ptr(), c_name.as_ptr(), std::ptr::null_mut(), 0) };
        let size = usize::try_from(size).map_err(|_| io::Error::last_os_error())?;

        let mut buf = vec![0u8; size];
        // SAFETY: `buf` is valid for `buf.len()` bytes of writes.
        let len = unsafe {
            libc::lgetxattr(
                c_path.as_ptr(),
                c_name.as_ptr(),
                buf.as_mut_ptr().cast(),
                buf.len(),
            )
        };
        let len = usize::try_from(len).map_err(|_| io::Error::last_os_error())?;
        buf.truncate(len);
        Ok(buf)
    }

    pub fn lset(path: &Path, name: &str, value: &[u8]) -> io::Result<()> {
        let c_path = c_string(path.as_os_str().as_bytes())?;
        let c_name = c_string(name.as_bytes())?;

        // SAFETY: strings are NUL-terminated and `value` is valid for
        // `value.len()` bytes of reads.
        let rc = unsafe {
            libc::lsetxattr(
                c_path.as_ptr(),
                c_name.as_ptr(),
                value.as_ptr().cast(),
                value.len(),
                0,
            )
        };
        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
mod xattr {
    use std::io;
    use std::path::Path;

    pub fn lget(_path: &Path, _name: &str) -> io::Result<Vec<u8>> {
        Err(io::Error::from(io::ErrorKind::Unsupported))
    }

    pub fn lset(_path: &Path, _name: &str, _value: &[u8]) -> io::Result<()> {
        Err(io::Error::from(io::ErrorKind::Unsupported))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rootfs() -> SecurityContext {
        SecurityContext::new(constants::ROOTFS_SELINUX_CONTEXT)
    }

    #[test]
    fn absent_source_takes_label_from_destination() {
        assert_eq!(
            derive_context(None, Path::new("/vendor/etc/init/foo.rc")),
            SecurityContext::vendor_file()
        );
        assert_eq!(
            derive_context(None, Path::new("/system/etc/foo")),
            SecurityContext::system_file()
        );
    }

    #[test]
    fn rootfs_source_label_is_replaced() {
        assert_eq!(
            derive_context(Some(rootfs()), Path::new("/odm/lib64/x.so")),
            SecurityContext::vendor_file()
        );
        assert_eq!(
            derive_context(Some(rootfs()), Path::new("/product/app")),
            SecurityContext::system_file()
        );
    }

    #[test]
    fn empty_attribute_reads_as_system_label() {
        assert_eq!(label_from_xattr(b""), SecurityContext::system_file());
        assert_eq!(label_from_xattr(b"\0"), SecurityContext::system_file());
        assert_eq!(
            label_from_xattr(b"u:object_r:vendor_file:s0\0"),
            SecurityContext::vendor_file()
        );
    }

    #[test]
    fn real_source_label_is_copied_verbatim() {
        let label = SecurityContext::new("u:object_r:same_process_hal_file:s0");
        assert_eq!(
            derive_context(Some(label.clone()), Path::new("/vendor/lib/hw")),
            label
        );
    }

    #[test]
    fn unsupported_platform_reports_instead_of_failing() {
        let dir = tempfile::tempdir().unwrap();
        let propagator = SecurityContextPropagator::new(LabelSupport::Unsupported);
        let dst = dir.path().join("dst");
        std::fs::write(&dst, b"").unwrap();

        assert_eq!(
            propagator.copy_context(&dir.path().join("missing"), &dst).unwrap(),
            LabelWrite::Unsupported
        );
        assert_eq!(
            propagator
                .set_label(&dst, &SecurityContext::system_file())
                .unwrap(),
            LabelWrite::Unsupported
        );
        assert!(propagator.read_label(&dst).unwrap().is_none());
    }

    #[test]
    fn unreadable_source_label_falls_back_to_system_label() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        std::fs::write(&src, b"").unwrap();

        // Without labels the read yields nothing, which must not be mistaken
        // for a missing source.
        let propagator = SecurityContextPropagator::new(LabelSupport::Unsupported);
        assert_eq!(
            propagator.resolve_context(&src, Path::new("/vendor/bin/x")),
            SecurityContext::system_file()
        );
    }

    #[test]
    fn missing_source_resolves_from_destination() {
        let dir = tempfile::tempdir().unwrap();
        let propagator = SecurityContextPropagator::new(LabelSupport::Unsupported);
        assert_eq!(
            propagator.resolve_context(&dir.path().join("nope"), Path::new("/vendor/bin/x")),
            SecurityContext::vendor_file()
        );
    }
}
