//! Loop device allocation and binding.
//!
//! A [`LoopBinding`] owns the open loop device descriptor for the duration
//! of a mount attempt. Dropping a binding that was never released clears the
//! kernel association, so an error path cannot leave a bound device behind.

use std::fs::{File, OpenOptions};
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::Duration;

use hymo_common::constants;
use hymo_common::error::{HymoError, Result};

const LOOP_SET_FD: u32 = 0x4C00;
const LOOP_CLR_FD: u32 = 0x4C01;
const LOOP_SET_STATUS64: u32 = 0x4C04;
const LOOP_CTL_GET_FREE: u32 = 0x4C82;

/// Device is read-only.
pub const LO_FLAGS_READ_ONLY: u32 = 1;
/// Kernel releases the device once it is unmounted and unreferenced.
pub const LO_FLAGS_AUTOCLEAR: u32 = 4;

const LO_NAME_SIZE: usize = 64;
const LO_KEY_SIZE: usize = 32;

/// Mirror of the kernel's `struct loop_info64`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct LoopInfo64 {
    lo_device: u64,
    lo_inode: u64,
    lo_rdevice: u64,
    lo_offset: u64,
    lo_sizelimit: u64,
    lo_number: u32,
    lo_encrypt_type: u32,
    lo_encrypt_key_size: u32,
    lo_flags: u32,
    lo_file_name: [u8; LO_NAME_SIZE],
    lo_crypt_name: [u8; LO_NAME_SIZE],
    lo_encrypt_key: [u8; LO_KEY_SIZE],
    lo_init: [u64; 2],
}

impl LoopInfo64 {
    /// Builds the status block applied right after binding: autoclear is
    /// always set, read-only on request.
    #[must_use]
    pub fn for_binding(backing: &Path, read_only: bool) -> Self {
        let mut info = Self {
            lo_device: 0,
            lo_inode: 0,
            lo_rdevice: 0,
            lo_offset: 0,
            lo_sizelimit: 0,
            lo_number: 0,
            lo_encrypt_type: 0,
            lo_encrypt_key_size: 0,
            lo_flags: LO_FLAGS_AUTOCLEAR,
            lo_file_name: [0; LO_NAME_SIZE],
            lo_crypt_name: [0; LO_NAME_SIZE],
            lo_encrypt_key: [0; LO_KEY_SIZE],
            lo_init: [0; 2],
        };
        if read_only {
            info.lo_flags |= LO_FLAGS_READ_ONLY;
        }
        // Informational only; keep the terminating NUL.
        let name = backing.as_os_str().as_encoded_bytes();
        let len = name.len().min(LO_NAME_SIZE - 1);
        info.lo_file_name[..len].copy_from_slice(&name[..len]);
        info
    }

    /// Returns the `lo_flags` field.
    #[must_use]
    pub const fn flags(&self) -> u32 {
        self.lo_flags
    }
}

mod ioctl {
    use super::{LOOP_CLR_FD, LOOP_CTL_GET_FREE, LOOP_SET_FD, LOOP_SET_STATUS64, LoopInfo64};

    nix::ioctl_none_bad!(
        /// Allocates a free loop device number.
        loop_ctl_get_free,
        LOOP_CTL_GET_FREE
    );
    nix::ioctl_write_int_bad!(
        /// Binds a backing file descriptor to a loop device.
        loop_set_fd,
        LOOP_SET_FD
    );
    nix::ioctl_none_bad!(
        /// Detaches the backing file from a loop device.
        loop_clr_fd,
        LOOP_CLR_FD
    );
    nix::ioctl_write_ptr_bad!(
        /// Applies a `loop_info64` status block.
        loop_set_status64,
        LOOP_SET_STATUS64,
        LoopInfo64
    );
}

/// Allocates loop devices and binds image files to them.
#[derive(Debug, Clone)]
pub struct LoopDeviceBinder {
    control_path: PathBuf,
    node_templates: Vec<String>,
    probe_rounds: u32,
    probe_delay: Duration,
}

impl Default for LoopDeviceBinder {
    fn default() -> Self {
        Self {
            control_path: PathBuf::from(constants::LOOP_CONTROL_PATH),
            node_templates: constants::LOOP_NODE_TEMPLATES
                .iter()
                .map(ToString::to_string)
                .collect(),
            probe_rounds: constants::LOOP_NODE_PROBE_ROUNDS,
            probe_delay: Duration::from_millis(constants::LOOP_NODE_PROBE_DELAY_MS),
        }
    }
}

impl LoopDeviceBinder {
    /// Uses `path` instead of `/dev/loop-control` for allocation.
    #[must_use]
    pub fn with_control_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.control_path = path.into();
        self
    }

    /// Replaces the ordered list of device node templates. `{}` in each
    /// template is substituted with the allocated device number.
    #[must_use]
    pub fn with_node_templates<I, S>(mut self, templates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.node_templates = templates.into_iter().map(Into::into).collect();
        self
    }

    /// Sets how many passes over the templates are made, and the pause
    /// between passes, before node resolution gives up.
    #[must_use]
    pub fn with_probe(mut self, rounds: u32, delay: Duration) -> Self {
        self.probe_rounds = rounds.max(1);
        self.probe_delay = delay;
        self
    }

    /// Returns the candidate node paths for device `number`, in probe order.
    #[must_use]
    pub fn node_candidates(&self, number: u32) -> Vec<PathBuf> {
        let n = number.to_string();
        self.node_templates
            .iter()
            .map(|t| PathBuf::from(t.replace("{}", &n)))
            .collect()
    }

    /// Finds the first accessible node for device `number`.
    ///
    /// Devices have different naming schemes across images, and the node may
    /// show up slightly after allocation, so every candidate is re-probed on
    /// each pass.
    ///
    /// # Errors
    ///
    /// Returns [`HymoError::LoopDevice`] if no candidate exists after the
    /// last pass.
    pub fn resolve_node(&self, number: u32) -> Result<PathBuf> {
        let candidates = self.node_candidates(number);
        for round in 0..self.probe_rounds {
            if round > 0 {
                std::thread::sleep(self.probe_delay);
            }
            if let Some(found) = candidates.iter().find(|p| p.exists()) {
                tracing::trace!(device = %found.display(), round, "resolved loop node");
                return Ok(found.clone());
            }
        }
        Err(HymoError::LoopDevice {
            message: format!("no accessible node for loop{number} (tried {candidates:?})"),
        })
    }

    /// Binds `image` to a free loop device.
    ///
    /// The backing descriptor is closed as soon as the kernel holds its own
    /// reference. The returned binding carries the open device descriptor
    /// with autoclear set.
    ///
    /// # Errors
    ///
    /// Returns an error if no device can be allocated or opened, if the image
    /// cannot be opened, or if binding or setting the status fails. On every
    /// error path the device is left unbound.
    pub fn bind(&self, image: &Path, read_only: bool) -> Result<LoopBinding> {
        let number = self.allocate()?;
        let device = self.resolve_node(number)?;

        let device_file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&device)
            .map_err(|e| {
                tracing::error!(device = %device.display(), error = %e, "failed to open loop device");
                HymoError::LoopDevice {
                    message: format!("failed to open loop device {}: {e}", device.display()),
                }
            })?;

        let backing = OpenOptions::new()
            .read(true)
            .write(!read_only)
            .open(image)
            .map_err(|e| {
                tracing::error!(image = %image.display(), error = %e, "failed to open image");
                HymoError::Io {
                    path: image.to_path_buf(),
                    source: e,
                }
            })?;

        // SAFETY: both descriptors are owned by live `File`s for the
        // duration of the call.
        let _ = unsafe { ioctl::loop_set_fd(device_file.as_raw_fd(), backing.as_raw_fd()) }.map_err(
            |e| {
                tracing::error!(device = %device.display(), error = %e, "failed to bind loop device");
                HymoError::LoopDevice {
                    message: format!("LOOP_SET_FD on {} failed: {e}", device.display()),
                }
            },
        )?;
        drop(backing);

        // From here on the guard clears the association if anything fails.
        let binding = LoopBinding {
            device,
            backing: image.to_path_buf(),
            read_only,
            file: Some(device_file),
        };

        let info = LoopInfo64::for_binding(image, read_only);
        if let Some(file) = binding.file.as_ref() {
            // SAFETY: `info` is a valid `loop_info64` that outlives the call,
            // and the descriptor is owned by `binding`.
            let _ = unsafe { ioctl::loop_set_status64(file.as_raw_fd(), &raw const info) }.map_err(
                |e| {
                    tracing::error!(device = %binding.device.display(), error = %e, "failed to set loop status");
                    HymoError::LoopDevice {
                        message: format!(
                            "LOOP_SET_STATUS64 on {} failed: {e}",
                            binding.device.display()
                        ),
                    }
                },
            )?;
        }

        tracing::debug!(
            device = %binding.device.display(),
            image = %image.display(),
            read_only,
            "loop device bound"
        );
        Ok(binding)
    }

    fn allocate(&self) -> Result<u32> {
        let control = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.control_path)
            .map_err(|e| {
                tracing::error!(path = %self.control_path.display(), error = %e, "failed to open loop control");
                HymoError::LoopDevice {
                    message: format!("failed to open {}: {e}", self.control_path.display()),
                }
            })?;

        // SAFETY: the descriptor belongs to `control`, alive for the call.
        let number = unsafe { ioctl::loop_ctl_get_free(control.as_raw_fd()) }.map_err(|e| {
            tracing::error!(error = %e, "failed to allocate loop device");
            HymoError::LoopDevice {
                message: format!("no free loop device: {e}"),
            }
        })?;

        u32::try_from(number).map_err(|_| HymoError::LoopDevice {
            message: format!("kernel returned invalid loop number {number}"),
        })
    }
}

/// One loop device bound to one backing file.
///
/// Exactly one of three things happens to the descriptor: [`release`] hands
/// the device over to autoclear, [`detach`] clears it explicitly, or drop
/// clears it. In every case the descriptor is closed once.
///
/// [`release`]: LoopBinding::release
/// [`detach`]: LoopBinding::detach
#[derive(Debug)]
pub struct LoopBinding {
    device: PathBuf,
    backing: PathBuf,
    read_only: bool,
    file: Option<File>,
}

impl LoopBinding {
    /// Path of the loop device node.
    #[must_use]
    pub fn device_path(&self) -> &Path {
        &self.device
    }

    /// Path of the backing image.
    #[must_use]
    pub fn backing_path(&self) -> &Path {
        &self.backing
    }

    /// Whether the device was bound read-only.
    #[must_use]
    pub const fn read_only(&self) -> bool {
        self.read_only
    }

    /// Closes the descriptor and leaves the device to autoclear. Use once a
    /// mount holds the device.
    pub fn release(mut self) {
        if let Some(file) = self.file.take() {
            drop(file);
            tracing::trace!(device = %self.device.display(), "loop descriptor released to autoclear");
        }
    }

    /// Clears the kernel association and closes the descriptor.
    ///
    /// # Errors
    ///
    /// Returns an error if `LOOP_CLR_FD` fails. The descriptor is closed
    /// regardless.
    pub fn detach(mut self) -> Result<()> {
        match self.file.take() {
            Some(file) => clear(&self.device, &file),
            None => Ok(()),
        }
    }
}

impl Drop for LoopBinding {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            if let Err(e) = clear(&self.device, &file) {
                tracing::warn!(device = %self.device.display(), error = %e, "loop cleanup failed");
            }
        }
    }
}

fn clear(device: &Path, file: &File) -> Result<()> {
    // SAFETY: the descriptor belongs to `file`, alive for the call.
    let _ = unsafe { ioctl::loop_clr_fd(file.as_raw_fd()) }.map_err(|e| HymoError::LoopDevice {
        message: format!("LOOP_CLR_FD on {} failed: {e}", device.display()),
    })?;
    tracing::debug!(device = %device.display(), "loop device cleared");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_binder(templates: Vec<String>) -> LoopDeviceBinder {
        LoopDeviceBinder::default()
            .with_node_templates(templates)
            .with_probe(1, Duration::ZERO)
    }

    #[test]
    fn loop_info_matches_kernel_layout() {
        assert_eq!(std::mem::size_of::<LoopInfo64>(), 232);
    }

    #[test]
    fn binding_status_always_sets_autoclear() {
        let rw = LoopInfo64::for_binding(Path::new("/data/img"), false);
        assert_eq!(rw.flags(), LO_FLAGS_AUTOCLEAR);

        let ro = LoopInfo64::for_binding(Path::new("/data/img"), true);
        assert_eq!(ro.flags(), LO_FLAGS_AUTOCLEAR | LO_FLAGS_READ_ONLY);
    }

    #[test]
    fn binding_status_truncates_long_file_names() {
        let long = "/x".repeat(100);
        let info = LoopInfo64::for_binding(Path::new(&long), false);
        assert_eq!(info.lo_file_name[LO_NAME_SIZE - 1], 0);
        assert_eq!(info.lo_file_name[0], b'/');
    }

    #[test]
    fn default_candidates_cover_both_naming_schemes() {
        let binder = LoopDeviceBinder::default();
        assert_eq!(
            binder.node_candidates(7),
            vec![PathBuf::from("/dev/block/loop7"), PathBuf::from("/dev/loop7")]
        );
    }

    #[test]
    fn resolve_prefers_first_accessible_template() {
        let dir = tempfile::tempdir().unwrap();
        let block = dir.path().join("block");
        std::fs::create_dir(&block).unwrap();
        std::fs::write(block.join("loop3"), b"").unwrap();
        std::fs::write(dir.path().join("loop3"), b"").unwrap();

        let binder = fast_binder(vec![
            format!("{}/block/loop{{}}", dir.path().display()),
            format!("{}/loop{{}}", dir.path().display()),
        ]);
        assert_eq!(binder.resolve_node(3).unwrap(), block.join("loop3"));
    }

    #[test]
    fn resolve_falls_back_to_other_naming_scheme() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("loop5"), b"").unwrap();

        let binder = fast_binder(vec![
            format!("{}/block/loop{{}}", dir.path().display()),
            format!("{}/loop{{}}", dir.path().display()),
        ]);
        assert_eq!(binder.resolve_node(5).unwrap(), dir.path().join("loop5"));
    }

    #[test]
    fn resolve_gives_up_when_no_node_exists() {
        let dir = tempfile::tempdir().unwrap();
        let binder = fast_binder(vec![format!("{}/loop{{}}", dir.path().display())]);
        assert!(matches!(
            binder.resolve_node(9),
            Err(HymoError::LoopDevice { .. })
        ));
    }

    #[test]
    fn missing_control_device_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let binder = LoopDeviceBinder::default().with_control_path(dir.path().join("loop-control"));
        let image = dir.path().join("img");
        std::fs::write(&image, b"").unwrap();
        assert!(matches!(
            binder.bind(&image, true),
            Err(HymoError::LoopDevice { .. })
        ));
    }

    #[test]
    #[ignore = "requires root and a free loop device"]
    fn bind_and_detach_real_image() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("img");
        std::fs::write(&image, vec![0u8; 1 << 20]).unwrap();

        let binding = LoopDeviceBinder::default().bind(&image, true).unwrap();
        assert!(binding.device_path().exists());
        assert!(binding.read_only());
        binding.detach().unwrap();
    }
}
