//! `hymod config` — Show or write the effective configuration.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Subcommand};
use hymo_common::config::HymoConfig;

use crate::output;

/// Arguments for the `config` command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// What to do with the configuration.
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// `config` subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration as JSON.
    Show,
    /// Write the effective configuration to a file.
    Init(InitArgs),
}

/// Arguments for `config init`.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Destination file. Defaults to the `--config` path.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Overwrite an existing file.
    #[arg(long)]
    pub force: bool,
}

/// Executes the `config` command.
///
/// # Errors
///
/// Returns an error if the configuration cannot be serialized, or if
/// `init` targets an existing file without `--force` or cannot write it.
pub fn execute(args: &ConfigArgs, config: &HymoConfig, config_path: &Path) -> anyhow::Result<()> {
    match &args.action {
        ConfigAction::Show => output::line(serde_json::to_string_pretty(config)?),
        ConfigAction::Init(init) => {
            let path = init.output.as_deref().unwrap_or(config_path);
            write_config(config, path, init.force)?;
            output::line(path.display());
        }
    }
    Ok(())
}

/// Saves `config` to `path`, refusing to replace an existing file unless
/// `force` is set.
///
/// # Errors
///
/// Returns an error if `path` exists without `force`, or if the file cannot
/// be written.
pub fn write_config(config: &HymoConfig, path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{} already exists, pass --force to overwrite", path.display());
    }
    config
        .save(path)
        .with_context(|| format!("failed to write config {}", path.display()))?;
    tracing::info!(path = %path.display(), "configuration written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_writes_a_loadable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hymo").join("config.json");
        let config = HymoConfig {
            enable_nuke: true,
            fs_type: "erofs".to_string(),
            ..HymoConfig::default()
        };

        write_config(&config, &path, false).unwrap();

        assert_eq!(HymoConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn init_keeps_an_existing_file_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "debug": true }"#).unwrap();

        assert!(write_config(&HymoConfig::default(), &path, false).is_err());
        assert!(HymoConfig::load(&path).unwrap().debug);
    }

    #[test]
    fn init_with_force_replaces_an_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "debug": true }"#).unwrap();

        write_config(&HymoConfig::default(), &path, true).unwrap();

        assert_eq!(HymoConfig::load(&path).unwrap(), HymoConfig::default());
    }
}
