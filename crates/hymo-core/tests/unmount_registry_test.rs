//! Registry behaviour against an in-memory driver channel.
//!
//! Verifies that:
//! 1. A path is sent to the driver once per registry
//! 2. A failed driver open is remembered
//! 3. Rejected registrations are retried on the next call
//! 4. Purge commands are never deduplicated
//! 5. Concurrent registration of one path sends one command

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::ffi::CStr;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use hymo_common::error::HymoError;
use hymo_core::unmount::{DriverChannel, Registration, UnmountRegistry};

#[derive(Default)]
struct Recorder {
    opens: AtomicUsize,
    umounts: Mutex<Vec<(String, u32, u8)>>,
    nukes: Mutex<Vec<String>>,
    reject: AtomicBool,
}

struct FakeDriver(Arc<Recorder>);

impl DriverChannel for FakeDriver {
    fn add_try_umount(&self, path: &CStr, flags: u32, mode: u8) -> std::io::Result<()> {
        if self.0.reject.load(Ordering::SeqCst) {
            return Err(std::io::Error::from_raw_os_error(1));
        }
        self.0
            .umounts
            .lock()
            .unwrap()
            .push((path.to_string_lossy().into_owned(), flags, mode));
        Ok(())
    }

    fn nuke_ext4_sysfs(&self, target: &CStr) -> std::io::Result<()> {
        self.0
            .nukes
            .lock()
            .unwrap()
            .push(target.to_string_lossy().into_owned());
        Ok(())
    }
}

fn registry_with(recorder: &Arc<Recorder>) -> UnmountRegistry {
    let recorder = Arc::clone(recorder);
    UnmountRegistry::new(move || {
        let _ = recorder.opens.fetch_add(1, Ordering::SeqCst);
        Some(Box::new(FakeDriver(Arc::clone(&recorder))) as Box<dyn DriverChannel>)
    })
}

#[test]
fn same_path_is_sent_once() {
    let recorder = Arc::new(Recorder::default());
    let registry = registry_with(&recorder);
    let path = Path::new("/system/app/Foo");

    assert_eq!(
        registry.register_unmountable(path).unwrap(),
        Registration::Registered
    );
    assert_eq!(
        registry.register_unmountable(path).unwrap(),
        Registration::AlreadyRegistered
    );

    let umounts = recorder.umounts.lock().unwrap();
    assert_eq!(umounts.len(), 1);
    assert_eq!(umounts[0], ("/system/app/Foo".to_string(), 2, 1));
    assert!(registry.is_registered(path));
}

#[test]
fn driver_is_opened_lazily_and_once() {
    let recorder = Arc::new(Recorder::default());
    let registry = registry_with(&recorder);
    assert_eq!(recorder.opens.load(Ordering::SeqCst), 0);

    let _ = registry.register_unmountable(Path::new("/a")).unwrap();
    let _ = registry.register_unmountable(Path::new("/b")).unwrap();
    registry.nuke_filesystem_state(Path::new("/c")).unwrap();

    assert_eq!(recorder.opens.load(Ordering::SeqCst), 1);
    assert_eq!(registry.registered_count(), 2);
}

#[test]
fn failed_open_is_cached() {
    let opens = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&opens);
    let registry = UnmountRegistry::new(move || {
        let _ = counter.fetch_add(1, Ordering::SeqCst);
        None
    });

    for _ in 0..3 {
        assert!(matches!(
            registry.register_unmountable(Path::new("/system/bin")),
            Err(HymoError::DriverUnavailable)
        ));
    }
    assert!(matches!(
        registry.nuke_filesystem_state(Path::new("/data/adb/hymo/img")),
        Err(HymoError::DriverUnavailable)
    ));
    assert_eq!(opens.load(Ordering::SeqCst), 1);
}

#[test]
fn rejected_registration_is_best_effort_and_retried() {
    let recorder = Arc::new(Recorder::default());
    recorder.reject.store(true, Ordering::SeqCst);
    let registry = registry_with(&recorder);
    let path = Path::new("/vendor/lib");

    assert_eq!(
        registry.register_unmountable(path).unwrap(),
        Registration::Rejected
    );
    assert!(!registry.is_registered(path));

    recorder.reject.store(false, Ordering::SeqCst);
    assert_eq!(
        registry.register_unmountable(path).unwrap(),
        Registration::Registered
    );
}

#[test]
fn nuke_is_not_deduplicated() {
    let recorder = Arc::new(Recorder::default());
    let registry = registry_with(&recorder);
    let target = Path::new("/data/adb/hymo/img_mnt");

    registry.nuke_filesystem_state(target).unwrap();
    registry.nuke_filesystem_state(target).unwrap();

    assert_eq!(recorder.nukes.lock().unwrap().len(), 2);
    assert_eq!(registry.registered_count(), 0);
}

#[test]
fn independent_registries_do_not_share_state() {
    let recorder = Arc::new(Recorder::default());
    let first = registry_with(&recorder);
    let second = registry_with(&recorder);
    let path = Path::new("/product/overlay");

    let _ = first.register_unmountable(path).unwrap();
    assert_eq!(
        second.register_unmountable(path).unwrap(),
        Registration::Registered
    );
    assert_eq!(recorder.umounts.lock().unwrap().len(), 2);
    assert_eq!(recorder.opens.load(Ordering::SeqCst), 2);
}

#[test]
fn concurrent_registration_sends_one_command() {
    let recorder = Arc::new(Recorder::default());
    let registry = Arc::new(registry_with(&recorder));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let registry = Arc::clone(&registry);
            std::thread::spawn(move || {
                registry
                    .register_unmountable(Path::new("/system/framework"))
                    .unwrap()
            })
        })
        .collect();
    let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(
        outcomes
            .iter()
            .filter(|o| **o == Registration::Registered)
            .count(),
        1
    );
    assert_eq!(recorder.umounts.lock().unwrap().len(), 1);
    assert_eq!(recorder.opens.load(Ordering::SeqCst), 1);
}
