//! # hymo-core
//!
//! Kernel-facing primitives for mounting module images on a device.
//!
//! This crate provides safe abstractions over:
//! - **Loop devices**: allocation from `/dev/loop-control`, binding with
//!   autoclear, and guaranteed release on failure.
//! - **Mounts**: option-string parsing, source resolution, and the
//!   `mount(2)` call with loop cleanup.
//! - **Repair**: running the filesystem checker and classifying its exit code.
//! - **SELinux labels**: reading, deriving, and writing `security.selinux`.
//! - **Scratch directories**: refusing destructive work on protected paths.
//! - **Unmount registry**: deduplicated registration of force-unmountable
//!   paths with the privileged driver.
//!
//! All unsafe system calls are encapsulated in safe wrappers with
//! `// SAFETY:` documentation.

#![allow(unsafe_code)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

pub mod fs;
#[cfg(any(target_os = "linux", target_os = "android"))]
pub mod loop_device;
#[cfg(any(target_os = "linux", target_os = "android"))]
pub mod mount;
pub mod repair;
pub mod selinux;
pub mod tempdir;
pub mod unmount;
