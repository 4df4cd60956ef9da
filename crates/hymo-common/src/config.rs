//! Global configuration model for hymo.
//!
//! The configuration is a JSON document; every field is optional on disk
//! and falls back to the defaults in [`crate::constants`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{HymoError, Result};

/// Root configuration for the hymo daemon and CLI.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HymoConfig {
    /// Runtime directory; the default scratch workdir lives below it.
    pub run_dir: PathBuf,
    /// Explicit scratch directory, overriding `<run_dir>/workdir`.
    pub tempdir: Option<PathBuf>,
    /// Mirror directory accepted as scratch space when explicitly allowed.
    pub mirror_dir: PathBuf,
    /// Filesystem type used for module images.
    pub fs_type: String,
    /// Filesystem checker invoked by image repair.
    pub repair_tool: String,
    /// Enable debug logging.
    pub debug: bool,
    /// Enable verbose (trace) logging. Implies `debug`.
    pub verbose: bool,
    /// Skip registering mount points as force-unmountable.
    pub disable_umount: bool,
    /// Allow purging stale ext4 sysfs state through the driver.
    pub enable_nuke: bool,
}

impl Default for HymoConfig {
    fn default() -> Self {
        Self {
            run_dir: PathBuf::from(constants::DEFAULT_RUN_DIR),
            tempdir: None,
            mirror_dir: PathBuf::from(constants::DEV_MIRROR_DIR),
            fs_type: constants::DEFAULT_FS_TYPE.to_string(),
            repair_tool: constants::DEFAULT_REPAIR_TOOL.to_string(),
            debug: false,
            verbose: false,
            disable_umount: false,
            enable_nuke: false,
        }
    }
}

impl HymoConfig {
    /// Loads the configuration from `path`.
    ///
    /// A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(HymoError::Io {
                    path: path.to_path_buf(),
                    source: e,
                });
            }
        };
        Ok(serde_json::from_str(&raw)?)
    }

    /// Writes the configuration to `path` as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created or the
    /// file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| HymoError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let data = serde_json::to_string_pretty(self)?;
        std::fs::write(path, data).map_err(|e| HymoError::Io {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Returns the scratch directory: the explicit override when set,
    /// otherwise `<run_dir>/workdir`.
    #[must_use]
    pub fn temp_dir(&self) -> PathBuf {
        self.tempdir
            .clone()
            .unwrap_or_else(|| self.run_dir.join(constants::WORKDIR_NAME))
    }

    /// Returns the log filter directive implied by the `debug`/`verbose`
    /// switches.
    #[must_use]
    pub const fn log_level(&self) -> &'static str {
        if self.verbose {
            "trace"
        } else if self.debug {
            "debug"
        } else {
            "info"
        }
    }
}
