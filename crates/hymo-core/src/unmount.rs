//! Force-unmount registration with the privileged kernel driver.
//!
//! [`UnmountRegistry`] owns the lazily opened driver handle and the set of
//! paths already registered, both behind one mutex. A failed open is
//! remembered too, so the side-channel is tried at most once per registry.

use std::collections::HashSet;
use std::ffi::{CStr, CString};
use std::fmt;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use hymo_common::constants;
use hymo_common::error::{HymoError, Result};

/// Commands understood by the privileged driver.
pub trait DriverChannel: Send {
    /// Marks `path` as a mount point to detach for unprivileged apps.
    ///
    /// # Errors
    ///
    /// Returns the system error if the driver rejects the command.
    fn add_try_umount(&self, path: &CStr, flags: u32, mode: u8) -> std::io::Result<()>;

    /// Drops stale ext4 sysfs entries left behind by the filesystem mounted
    /// at `target`.
    ///
    /// # Errors
    ///
    /// Returns the system error if the driver rejects the command.
    fn nuke_ext4_sysfs(&self, target: &CStr) -> std::io::Result<()>;
}

type Connector = Box<dyn Fn() -> Option<Box<dyn DriverChannel>> + Send + Sync>;

/// Outcome of [`UnmountRegistry::register_unmountable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// The driver accepted the path.
    Registered,
    /// The path was registered earlier; no command was sent.
    AlreadyRegistered,
    /// The driver refused the path. Registration is best effort, so this is
    /// not an error, but forced unmount will not cover the path.
    Rejected,
    /// Empty path; nothing to register.
    Ignored,
    /// This platform has no privileged driver.
    Unsupported,
}

enum DriverSlot {
    Unopened,
    Unavailable,
    Open(Box<dyn DriverChannel>),
}

struct RegistryState {
    driver: DriverSlot,
    registered: HashSet<String>,
}

/// Deduplicated registry of force-unmountable paths.
pub struct UnmountRegistry {
    connector: Option<Connector>,
    state: Mutex<RegistryState>,
}

impl fmt::Debug for UnmountRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        let driver = match state.driver {
            DriverSlot::Unopened => "unopened",
            DriverSlot::Unavailable => "unavailable",
            DriverSlot::Open(_) => "open",
        };
        f.debug_struct("UnmountRegistry")
            .field("supported", &self.connector.is_some())
            .field("driver", &driver)
            .field("registered", &state.registered.len())
            .finish()
    }
}

impl UnmountRegistry {
    /// Creates a registry that opens its driver channel with `connect` on
    /// first use. `connect` returning `None` means the driver is missing.
    pub fn new<F>(connect: F) -> Self
    where
        F: Fn() -> Option<Box<dyn DriverChannel>> + Send + Sync + 'static,
    {
        Self::with_connector(Some(Box::new(connect)))
    }

    /// Creates a registry for a platform without the driver interface.
    #[must_use]
    pub fn unsupported() -> Self {
        Self::with_connector(None)
    }

    /// Creates a registry for the running system.
    #[must_use]
    pub fn system() -> Self {
        #[cfg(target_os = "android")]
        {
            Self::new(|| KsuDriver::open().map(|d| Box::new(d) as Box<dyn DriverChannel>))
        }
        #[cfg(not(target_os = "android"))]
        {
            Self::unsupported()
        }
    }

    fn with_connector(connector: Option<Connector>) -> Self {
        Self {
            connector,
            state: Mutex::new(RegistryState {
                driver: DriverSlot::Unopened,
                registered: HashSet::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        // The state stays consistent across a panic in a driver call.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether `path` was registered during this registry's lifetime.
    #[must_use]
    pub fn is_registered(&self, path: &Path) -> bool {
        self.lock()
            .registered
            .contains(path.to_string_lossy().as_ref())
    }

    /// Number of registered paths.
    #[must_use]
    pub fn registered_count(&self) -> usize {
        self.lock().registered.len()
    }

    /// Registers `path` as force-unmountable. A path is sent to the driver
    /// at most once; later calls return
    /// [`Registration::AlreadyRegistered`].
    ///
    /// # Errors
    ///
    /// Returns [`HymoError::DriverUnavailable`] if the driver handle cannot
    /// be obtained, or [`HymoError::Config`] if the path contains a NUL
    /// byte.
    pub fn register_unmountable(&self, path: &Path) -> Result<Registration> {
        let Some(connector) = self.connector.as_ref() else {
            return Ok(Registration::Unsupported);
        };
        let key = path.to_string_lossy().into_owned();
        if key.is_empty() {
            return Ok(Registration::Ignored);
        }

        let mut guard = self.lock();
        let state = &mut *guard;
        if state.registered.contains(&key) {
            return Ok(Registration::AlreadyRegistered);
        }
        let c_path = c_path(path)?;
        let driver = open_driver(&mut state.driver, connector)?;

        match driver.add_try_umount(
            &c_path,
            constants::TRY_UMOUNT_FLAGS,
            constants::TRY_UMOUNT_MODE,
        ) {
            Ok(()) => {
                tracing::debug!(path = %key, "registered unmountable path");
                let _ = state.registered.insert(key);
                Ok(Registration::Registered)
            }
            Err(e) => {
                tracing::warn!(path = %key, error = %e, "failed to register unmountable path");
                Ok(Registration::Rejected)
            }
        }
    }

    /// Asks the driver to purge stale ext4 sysfs state for the filesystem
    /// that was mounted at `target`. Never deduplicated.
    ///
    /// # Errors
    ///
    /// Returns [`HymoError::Unsupported`] on platforms without the driver,
    /// [`HymoError::DriverUnavailable`] if the handle cannot be obtained,
    /// and [`HymoError::Driver`] if the command fails.
    pub fn nuke_filesystem_state(&self, target: &Path) -> Result<()> {
        let Some(connector) = self.connector.as_ref() else {
            return Err(HymoError::Unsupported {
                feature: "privileged driver".into(),
            });
        };
        let c_target = c_path(target)?;

        let mut guard = self.lock();
        let driver = open_driver(&mut guard.driver, connector)?;
        driver.nuke_ext4_sysfs(&c_target).map_err(|e| {
            tracing::error!(target = %target.display(), error = %e, "nuke ioctl failed");
            HymoError::Driver {
                operation: "nuke_ext4_sysfs",
                source: e,
            }
        })?;
        tracing::info!(target = %target.display(), "purged ext4 sysfs state");
        Ok(())
    }
}

fn open_driver<'a>(
    slot: &'a mut DriverSlot,
    connector: &Connector,
) -> Result<&'a dyn DriverChannel> {
    if matches!(slot, DriverSlot::Unopened) {
        *slot = match connector() {
            Some(channel) => {
                tracing::debug!("privileged driver handle acquired");
                DriverSlot::Open(channel)
            }
            None => {
                tracing::error!("privileged driver not available");
                DriverSlot::Unavailable
            }
        };
    }
    match slot {
        DriverSlot::Open(channel) => Ok(&**channel),
        DriverSlot::Unopened | DriverSlot::Unavailable => Err(HymoError::DriverUnavailable),
    }
}

fn c_path(path: &Path) -> Result<CString> {
    CString::new(path.as_os_str().as_bytes()).map_err(|_| HymoError::Config {
        message: format!("path contains NUL byte: {}", path.display()),
    })
}

#[allow(dead_code)]
#[repr(C)]
struct KsuAddTryUmount {
    arg: u64,
    flags: u32,
    mode: u8,
}

#[allow(dead_code)]
#[repr(C)]
struct NukeExt4SysfsCmd {
    arg: u64,
}

#[cfg(any(target_os = "linux", target_os = "android"))]
mod ioctl {
    use super::{KsuAddTryUmount, NukeExt4SysfsCmd};
    use hymo_common::constants::{
        KSU_IOCTL_ADD_TRY_UMOUNT_NR, KSU_IOCTL_NUKE_EXT4_SYSFS_NR, KSU_IOCTL_TYPE,
    };

    nix::ioctl_write_ptr_bad!(
        /// Registers a try-umount path.
        ksu_add_try_umount,
        nix::request_code_write!(KSU_IOCTL_TYPE, KSU_IOCTL_ADD_TRY_UMOUNT_NR, 0),
        KsuAddTryUmount
    );
    nix::ioctl_write_ptr_bad!(
        /// Purges ext4 sysfs state for a mount point.
        ksu_nuke_ext4_sysfs,
        nix::request_code_write!(KSU_IOCTL_TYPE, KSU_IOCTL_NUKE_EXT4_SYSFS_NR, 0),
        NukeExt4SysfsCmd
    );
}

/// Channel to the KernelSU driver, obtained through its `reboot(2)` hook.
#[cfg(any(target_os = "linux", target_os = "android"))]
#[cfg_attr(not(target_os = "android"), allow(dead_code))]
#[derive(Debug)]
pub struct KsuDriver {
    fd: std::os::fd::OwnedFd,
}

#[cfg(any(target_os = "linux", target_os = "android"))]
#[cfg_attr(not(target_os = "android"), allow(dead_code))]
impl KsuDriver {
    /// Asks the driver for a handle. Returns `None` when the driver is not
    /// installed.
    #[must_use]
    pub fn open() -> Option<Self> {
        use std::os::fd::FromRawFd;

        let mut fd: libc::c_int = -1;
        // SAFETY: the driver hook writes a descriptor through the last
        // argument when both magics match; otherwise the call fails and `fd`
        // is left untouched.
        let _ = unsafe {
            libc::syscall(
                libc::SYS_reboot,
                libc::c_ulong::from(constants::KSU_INSTALL_MAGIC1),
                libc::c_ulong::from(constants::KSU_INSTALL_MAGIC2),
                0 as libc::c_ulong,
                &raw mut fd,
            )
        };
        if fd < 0 {
            return None;
        }
        // SAFETY: the driver handed us a fresh descriptor that nothing else
        // owns.
        Some(Self {
            fd: unsafe { std::os::fd::OwnedFd::from_raw_fd(fd) },
        })
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
impl DriverChannel for KsuDriver {
    fn add_try_umount(&self, path: &CStr, flags: u32, mode: u8) -> std::io::Result<()> {
        use std::os::fd::AsRawFd;

        let cmd = KsuAddTryUmount {
            arg: path.as_ptr() as u64,
            flags,
            mode,
        };
        // SAFETY: `cmd` and the string it points to outlive the call.
        let _ = unsafe { ioctl::ksu_add_try_umount(self.fd.as_raw_fd(), &raw const cmd) }?;
        Ok(())
    }

    fn nuke_ext4_sysfs(&self, target: &CStr) -> std::io::Result<()> {
        use std::os::fd::AsRawFd;

        let cmd = NukeExt4SysfsCmd {
            arg: target.as_ptr() as u64,
        };
        // SAFETY: `cmd` and the string it points to outlive the call.
        let _ = unsafe { ioctl::ksu_nuke_ext4_sysfs(self.fd.as_raw_fd(), &raw const cmd) }?;
        Ok(())
    }
}
