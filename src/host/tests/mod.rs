//! HandleRegistry unit tests

use std::sync::Arc;
use std::thread;

use crate::host::{
    EnvironmentHandle, HandleRegistry, HostEnvironment, HostError, ProcessHost, RawHandle,
};

fn registry() -> (Arc<ProcessHost>, HandleRegistry) {
    let host = Arc::new(ProcessHost::new());
    let registry = HandleRegistry::new(host.clone());
    (host, registry)
}

#[test]
fn test_raw_handle_null() {
    assert!(RawHandle::NULL.is_null());
    assert!(RawHandle::from_ptr(std::ptr::null_mut()).is_null());
    assert!(!RawHandle::from_addr(0x40).is_null());
    assert_eq!(RawHandle::from_addr(0x40).as_ptr() as usize, 0x40);
    assert_eq!(format!("{}", RawHandle::from_addr(255)), "0xff");
}

#[test]
fn test_acquire_then_release_once() {
    let (host, registry) = registry();
    let raw = host.create_context("application");

    let handle = registry.acquire(host.environment(), raw).unwrap();
    assert_eq!(registry.live(), 1);
    assert_eq!(host.live_references(), 1);
    assert_ne!(handle.raw(), raw);
    assert_eq!(host.context_label(handle.raw()).as_deref(), Some("application"));

    registry.release(handle);
    assert_eq!(registry.live(), 0);
    assert_eq!(host.live_references(), 0);
    let stats = host.stats();
    assert_eq!(stats.retains, 1);
    assert_eq!(stats.releases, 1);
    assert_eq!(stats.invalid_releases, 0);
}

#[test]
fn test_acquire_null_rejected() {
    let (host, registry) = registry();
    let err = registry
        .acquire(host.environment(), RawHandle::NULL)
        .unwrap_err();
    assert_eq!(err, HostError::NullContext);
    assert_eq!(host.stats().retains, 0);
}

#[test]
fn test_acquire_unknown_context_rejected() {
    let (host, registry) = registry();
    let err = registry
        .acquire(host.environment(), RawHandle::from_addr(0xdead0))
        .unwrap_err();
    assert!(matches!(err, HostError::RetainFailed(_)));
    assert_eq!(registry.live(), 0);
}

#[test]
fn test_acquire_in_foreign_environment_rejected() {
    let (host, registry) = registry();
    let raw = host.create_context("application");
    let foreign = EnvironmentHandle::new(RawHandle::from_addr(0x1));
    assert!(registry.acquire(foreign, raw).is_err());
}

#[test]
fn test_release_from_other_thread_attaches() {
    let (host, registry) = registry();
    let registry = Arc::new(registry);
    let handle = registry
        .acquire(host.environment(), host.create_context("application"))
        .unwrap();

    let worker_registry = registry.clone();
    let worker_host = host.clone();
    thread::spawn(move || {
        worker_registry.release(handle);
        // Guard detached again after the release.
        assert!(!worker_host.is_attached(thread::current().id()));
    })
    .join()
    .unwrap();

    let stats = host.stats();
    assert_eq!(stats.releases, 1);
    assert_eq!(stats.unattached_releases, 0);
    assert_eq!(stats.attaches, 1);
    assert_eq!(stats.detaches, 1);
}

#[test]
fn test_attach_guard_keeps_existing_attachment() {
    let (host, registry) = registry();
    let env = host.environment();
    assert!(host.attach_current_thread(env).unwrap());

    {
        let guard = registry.attach(env).unwrap();
        assert!(!guard.attached_here());
    }
    assert!(host.is_attached(thread::current().id()));
    host.detach_current_thread(env);
    assert!(!host.is_attached(thread::current().id()));
}

#[test]
fn test_leaked_handle_is_not_released() {
    let (host, registry) = registry();
    let handle = registry
        .acquire(host.environment(), host.create_context("application"))
        .unwrap();
    let raw = handle.leak();
    assert!(!raw.is_null());
    assert_eq!(host.live_references(), 1);
    assert_eq!(host.stats().releases, 0);
}
