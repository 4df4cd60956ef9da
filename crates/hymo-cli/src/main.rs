//! # hymod — hymo CLI
//!
//! Mounts module images on loop devices, repairs them, fixes SELinux labels,
//! and manages scratch directories and force-unmount registration.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

mod commands;
mod output;

use anyhow::Context;
use clap::Parser;
use hymo_common::config::HymoConfig;
use tracing_subscriber::EnvFilter;

use crate::commands::Cli;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = HymoConfig::load(&cli.config)
        .with_context(|| format!("failed to load config {}", cli.config.display()))?;
    config.debug |= cli.debug;
    config.verbose |= cli.verbose;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.log_level()));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_writer(std::io::stderr)
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(filter)
            .init();
    }

    commands::execute(cli, &config)
}
