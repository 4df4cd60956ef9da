//! Destructive scratch-directory operations on real directories.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::path::Path;

use hymo_common::config::HymoConfig;
use hymo_common::error::HymoError;
use hymo_core::tempdir::TempDirGuard;

#[test]
fn ensure_wipes_and_recreates() {
    let root = tempfile::tempdir().unwrap();
    let work = root.path().join("workdir");
    std::fs::create_dir_all(work.join("stale").join("deep")).unwrap();
    std::fs::write(work.join("stale").join("file"), b"old").unwrap();

    TempDirGuard::default().ensure(&work, false).unwrap();

    assert!(work.is_dir());
    assert_eq!(std::fs::read_dir(&work).unwrap().count(), 0);
}

#[test]
fn ensure_creates_missing_parents() {
    let root = tempfile::tempdir().unwrap();
    let work = root.path().join("a").join("b").join("workdir");
    TempDirGuard::default().ensure(&work, false).unwrap();
    assert!(work.is_dir());
}

#[test]
fn ensure_replaces_a_plain_file() {
    let root = tempfile::tempdir().unwrap();
    let work = root.path().join("workdir");
    std::fs::write(&work, b"not a dir").unwrap();
    TempDirGuard::default().ensure(&work, false).unwrap();
    assert!(work.is_dir());
}

#[test]
fn ensure_refuses_protected_paths() {
    let guard = TempDirGuard::default();
    for p in ["", ".", "..", "/", "/data", "/proc/self", "/sys", "/dev/hymo_mirror"] {
        assert!(
            matches!(
                guard.ensure(Path::new(p), false),
                Err(HymoError::UnsafePath { .. })
            ),
            "{p:?}"
        );
    }
}

#[test]
fn ensure_refuses_a_protected_path_reached_through_dots() {
    let guard = TempDirGuard::default();
    assert!(matches!(
        guard.ensure(Path::new("/data/adb/hymo/workdir/../.."), false),
        Err(HymoError::UnsafePath { .. })
    ));
}

#[test]
fn cleanup_removes_safe_directory() {
    let root = tempfile::tempdir().unwrap();
    let work = root.path().join("workdir");
    std::fs::create_dir_all(work.join("x")).unwrap();
    std::fs::write(work.join("x").join("f"), b"").unwrap();

    TempDirGuard::default().cleanup(&work, false);
    assert!(!work.exists());
}

#[test]
fn cleanup_of_missing_directory_is_silent() {
    let root = tempfile::tempdir().unwrap();
    TempDirGuard::default().cleanup(&root.path().join("never-created"), false);
}

#[test]
fn cleanup_refuses_protected_paths_silently() {
    let guard = TempDirGuard::default();
    guard.cleanup(Path::new("/"), true);
    guard.cleanup(Path::new("/data/adb/hymo/run/.."), true);
    guard.cleanup(Path::new("/dev/hymo_mirror"), false);
    assert!(Path::new("/").is_dir());
}

#[test]
fn cleanup_removes_a_symlink_without_following_it() {
    let root = tempfile::tempdir().unwrap();
    let real = root.path().join("real");
    std::fs::create_dir(&real).unwrap();
    std::fs::write(real.join("keep"), b"").unwrap();
    let link = root.path().join("workdir");
    std::os::unix::fs::symlink(&real, &link).unwrap();

    TempDirGuard::default().cleanup(&link, false);

    assert!(std::fs::symlink_metadata(&link).is_err());
    assert!(real.join("keep").exists());
}

#[test]
fn configured_mirror_cannot_exempt_virtual_filesystems() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    for mirror in ["", "/", "/dev", "/proc/self"] {
        std::fs::write(&path, format!(r#"{{ "mirror_dir": "{mirror}" }}"#)).unwrap();
        let config = HymoConfig::load(&path).unwrap();
        assert!(
            matches!(
                TempDirGuard::default().with_dev_mirror(&config.mirror_dir),
                Err(HymoError::UnsafePath { .. })
            ),
            "{mirror:?}"
        );
    }
}

#[test]
fn configured_mirror_below_dev_is_exempt() {
    let guard = TempDirGuard::default()
        .with_dev_mirror(HymoConfig::default().mirror_dir)
        .unwrap();
    assert!(guard.is_safe(Path::new("/dev/hymo_mirror/work"), true));
    assert!(!guard.is_safe(Path::new("/dev/block"), true));
    assert!(!guard.is_safe(Path::new("/proc/self"), true));
}
