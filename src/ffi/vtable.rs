//! Host environment supplied as a table of C callbacks.

use std::ffi::{c_int, c_void};
use std::ptr;

use thiserror::Error;
use tracing::trace;

use crate::host::{EnvironmentHandle, HostEnvironment, HostError, RawHandle};

/// Promote a short-lived context reference. Returns null on failure.
pub type RetainContextFn =
    unsafe extern "C" fn(user_data: *mut c_void, env: *mut c_void, context: *mut c_void) -> *mut c_void;
/// Drop a durable context reference.
pub type ReleaseContextFn =
    unsafe extern "C" fn(user_data: *mut c_void, env: *mut c_void, durable: *mut c_void);
/// Attach the calling thread. Returns 1 if newly attached, 0 if it already
/// was, negative on failure.
pub type AttachThreadFn = unsafe extern "C" fn(user_data: *mut c_void, env: *mut c_void) -> c_int;
/// Detach the calling thread.
pub type DetachThreadFn = unsafe extern "C" fn(user_data: *mut c_void, env: *mut c_void);

/// Callback table the host hands over at install time.
///
/// All four callbacks are required. They are invoked from the host's
/// lifecycle thread and from the engine worker thread, so they must be
/// thread-safe, and `user_data` must stay valid for the life of the process.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct HostVTable {
    pub user_data: *mut c_void,
    pub retain_context: Option<RetainContextFn>,
    pub release_context: Option<ReleaseContextFn>,
    pub attach_current_thread: Option<AttachThreadFn>,
    pub detach_current_thread: Option<DetachThreadFn>,
}

impl HostVTable {
    /// A table with every callback missing.
    pub const fn empty() -> Self {
        Self {
            user_data: ptr::null_mut(),
            retain_context: None,
            release_context: None,
            attach_current_thread: None,
            detach_current_thread: None,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VTableError {
    #[error("host vtable pointer is null")]
    Null,

    #[error("host vtable is missing `{0}`")]
    MissingCallback(&'static str),
}

/// [`HostEnvironment`] backed by a validated [`HostVTable`].
#[derive(Debug)]
pub struct VTableHost {
    user_data: *mut c_void,
    retain: RetainContextFn,
    release: ReleaseContextFn,
    attach: AttachThreadFn,
    detach: DetachThreadFn,
}

// SAFETY: the host guarantees its callbacks and `user_data` may be used from
// any thread (see `HostVTable`).
unsafe impl Send for VTableHost {}
unsafe impl Sync for VTableHost {}

impl VTableHost {
    pub fn new(vtable: HostVTable) -> Result<Self, VTableError> {
        Ok(Self {
            user_data: vtable.user_data,
            retain: vtable
                .retain_context
                .ok_or(VTableError::MissingCallback("retain_context"))?,
            release: vtable
                .release_context
                .ok_or(VTableError::MissingCallback("release_context"))?,
            attach: vtable
                .attach_current_thread
                .ok_or(VTableError::MissingCallback("attach_current_thread"))?,
            detach: vtable
                .detach_current_thread
                .ok_or(VTableError::MissingCallback("detach_current_thread"))?,
        })
    }

    /// Copy the table out of a host pointer and validate it.
    ///
    /// # Safety
    ///
    /// `vtable` must be null or point to a readable `HostVTable`.
    pub unsafe fn from_raw(vtable: *const HostVTable) -> Result<Self, VTableError> {
        if vtable.is_null() {
            return Err(VTableError::Null);
        }
        // SAFETY: non-null and readable per the caller contract.
        Self::new(unsafe { *vtable })
    }
}

impl HostEnvironment for VTableHost {
    fn retain_context(
        &self,
        env: EnvironmentHandle,
        raw: RawHandle,
    ) -> Result<RawHandle, HostError> {
        // SAFETY: callback validated in `new`; handles are host-provided.
        let durable = unsafe { (self.retain)(self.user_data, env.raw().as_ptr(), raw.as_ptr()) };
        if durable.is_null() {
            return Err(HostError::RetainFailed(format!(
                "host returned null for context {}",
                raw
            )));
        }
        Ok(RawHandle::from_ptr(durable))
    }

    fn release_context(
        &self,
        env: EnvironmentHandle,
        durable: RawHandle,
    ) {
        trace!(handle = %durable, "releasing context through host vtable");
        // SAFETY: as above; `durable` came from `retain_context`.
        unsafe { (self.release)(self.user_data, env.raw().as_ptr(), durable.as_ptr()) }
    }

    fn attach_current_thread(&self, env: EnvironmentHandle) -> Result<bool, HostError> {
        // SAFETY: as above.
        let status = unsafe { (self.attach)(self.user_data, env.raw().as_ptr()) };
        match status {
            0 => Ok(false),
            s if s > 0 => Ok(true),
            s => Err(HostError::AttachFailed(format!("host returned status {}", s))),
        }
    }

    fn detach_current_thread(&self, env: EnvironmentHandle) {
        // SAFETY: as above.
        unsafe { (self.detach)(self.user_data, env.raw().as_ptr()) }
    }
}
