//! Image repair against a scripted stand-in checker.
//!
//! The checker is `sh -c '<script>' e2fsck`, so the script sees the real
//! flags as `$1..$3`.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::path::Path;

use hymo_common::error::HymoError;
use hymo_core::repair::{ImageRepairer, RepairOutcome};

fn scripted(script: &str) -> ImageRepairer {
    ImageRepairer::new("sh").with_prefix_args(["-c", script, "e2fsck"])
}

#[test]
fn clean_image_is_success() {
    let outcome = scripted("exit 0").repair(Path::new("/tmp/a.img")).unwrap();
    assert_eq!(outcome, RepairOutcome::Clean);
}

#[test]
fn corrected_image_is_success() {
    let outcome = scripted("exit 1").repair(Path::new("/tmp/a.img")).unwrap();
    assert_eq!(outcome, RepairOutcome::Corrected);
}

#[test]
fn reboot_advised_is_success() {
    let outcome = scripted("exit 2").repair(Path::new("/tmp/a.img")).unwrap();
    assert_eq!(outcome, RepairOutcome::CorrectedRebootAdvised);
}

#[test]
fn uncorrected_errors_are_failure() {
    let err = scripted("exit 8").repair(Path::new("/tmp/a.img")).unwrap_err();
    assert!(matches!(err, HymoError::Repair { code: Some(8) }));
}

#[test]
fn killed_checker_is_failure() {
    let err = scripted("kill -9 $$").repair(Path::new("/tmp/a.img")).unwrap_err();
    assert!(matches!(err, HymoError::Repair { code: None }));
}

#[test]
fn checker_receives_forced_auto_fix_flags() {
    let script = r#"[ "$1" = "-y" ] && [ "$2" = "-f" ] && [ "$3" = "/tmp/module.img" ] || exit 9"#;
    let outcome = scripted(script)
        .repair(Path::new("/tmp/module.img"))
        .unwrap();
    assert_eq!(outcome, RepairOutcome::Clean);
}
