//! System-wide constants and default paths.

/// Base directory for hymo data on the device.
pub const BASE_DIR: &str = "/data/adb/hymo";

/// Default configuration file path.
pub const DEFAULT_CONFIG_FILE: &str = "/data/adb/hymo/config.json";

/// Default runtime directory; the scratch workdir lives below it.
pub const DEFAULT_RUN_DIR: &str = "/data/adb/hymo/run";

/// Name of the scratch directory under the runtime directory.
pub const WORKDIR_NAME: &str = "workdir";

/// Device filesystem root; any mirror exemption must sit strictly below it.
pub const DEV_DIR: &str = "/dev";

/// Mirror directory that may be used as scratch space when explicitly allowed.
pub const DEV_MIRROR_DIR: &str = "/dev/hymo_mirror";

/// Directories that must never be wiped, regardless of flags.
pub const PROTECTED_DIRS: &[&str] = &["/", "/data", "/data/adb", BASE_DIR];

/// Virtual filesystems; nothing beneath them is a valid scratch directory.
pub const VIRTUAL_FS_ROOTS: &[&str] = &[DEV_DIR, "/proc", "/sys"];

// ── Loop devices ─────────────────────────────────────────────────────

/// Loop device allocator.
pub const LOOP_CONTROL_PATH: &str = "/dev/loop-control";

/// Loop device node naming conventions, tried in order. `{}` is replaced by
/// the device number.
pub const LOOP_NODE_TEMPLATES: &[&str] = &["/dev/block/loop{}", "/dev/loop{}"];

/// Number of passes over [`LOOP_NODE_TEMPLATES`] before giving up.
pub const LOOP_NODE_PROBE_ROUNDS: u32 = 3;

/// Delay between probe passes, in milliseconds.
pub const LOOP_NODE_PROBE_DELAY_MS: u64 = 20;

// ── Security labels ──────────────────────────────────────────────────

/// Extended attribute holding the SELinux label.
pub const SELINUX_XATTR: &str = "security.selinux";

/// Label assigned to ordinary system files.
pub const DEFAULT_SELINUX_CONTEXT: &str = "u:object_r:system_file:s0";

/// Label assigned to files under vendor-style partitions.
pub const VENDOR_SELINUX_CONTEXT: &str = "u:object_r:vendor_file:s0";

/// Label carried by files that never got a real context (ramdisk rootfs).
pub const ROOTFS_SELINUX_CONTEXT: &str = "u:object_r:rootfs:s0";

/// Mount points whose contents take [`VENDOR_SELINUX_CONTEXT`].
pub const VENDOR_PREFIXES: &[&str] = &["/vendor", "/odm"];

/// Location of selinuxfs; its presence means labels can be read and written.
pub const SELINUXFS_PATH: &str = "/sys/fs/selinux";

// ── Privileged driver ────────────────────────────────────────────────

/// First magic argument of the driver side-channel `reboot(2)` call.
pub const KSU_INSTALL_MAGIC1: u32 = 0xDEAD_BEEF;

/// Second magic argument of the driver side-channel `reboot(2)` call.
pub const KSU_INSTALL_MAGIC2: u32 = 0xCAFE_BABE;

/// Ioctl type byte used by the driver.
pub const KSU_IOCTL_TYPE: u8 = b'K';

/// Ioctl number of the "nuke ext4 sysfs" command.
pub const KSU_IOCTL_NUKE_EXT4_SYSFS_NR: u8 = 17;

/// Ioctl number of the "add try-umount" command.
pub const KSU_IOCTL_ADD_TRY_UMOUNT_NR: u8 = 18;

/// Flags passed with every try-umount registration.
pub const TRY_UMOUNT_FLAGS: u32 = 2;

/// Mode passed with every try-umount registration (add).
pub const TRY_UMOUNT_MODE: u8 = 1;

// ── External tools ───────────────────────────────────────────────────

/// Default filesystem checker used for image repair.
pub const DEFAULT_REPAIR_TOOL: &str = "e2fsck";

/// Highest checker exit code that still means the image is usable.
pub const REPAIR_MAX_OK_CODE: i32 = 2;

/// Default filesystem type for module images.
pub const DEFAULT_FS_TYPE: &str = "ext4";

/// Kernel list of registered filesystem types.
pub const PROC_FILESYSTEMS: &str = "/proc/filesystems";

/// Binary name for the CLI.
pub const BIN_NAME: &str = "hymod";
