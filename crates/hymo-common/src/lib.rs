//! # hymo-common
//!
//! Shared types, error definitions, configuration model, and constants
//! used across the hymo workspace.
//!
//! This crate is the leaf of the dependency graph. It never touches the
//! kernel; everything that issues a syscall lives in `hymo-core`.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod config;
pub mod constants;
pub mod error;
pub mod types;
