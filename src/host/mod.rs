//! Host environment handles
//!
//! The host container owns two opaque objects this layer has to hold on to
//! while a session runs:
//!
//! - the process-wide execution environment ([`EnvironmentHandle`]), which a
//!   thread the host did not create must attach to before touching host
//!   objects;
//! - a long-lived context object, promoted from a short-lived reference into a
//!   durable one on start ([`ContextHandle`]) and released on quit.
//!
//! [`HandleRegistry`] is the single place where that promotion and release
//! happen. `ContextHandle` is an ownership token: it is not `Clone`, and
//! [`HandleRegistry::release`] consumes it, so a second release of the same
//! acquisition does not compile.

use std::ffi::c_void;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

pub mod process;

pub use process::{HostStats, ProcessHost};

/// Address of a host-owned object. Never dereferenced by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RawHandle(usize);

impl RawHandle {
    /// The null handle.
    pub const NULL: RawHandle = RawHandle(0);

    /// Wrap a pointer received from the host.
    #[inline]
    pub fn from_ptr(ptr: *mut c_void) -> Self {
        Self(ptr as usize)
    }

    /// Wrap a plain address.
    #[inline]
    pub const fn from_addr(addr: usize) -> Self {
        Self(addr)
    }

    /// Pointer form for handing back to the host.
    #[inline]
    pub fn as_ptr(self) -> *mut c_void {
        self.0 as *mut c_void
    }

    /// Address value.
    #[inline]
    pub fn addr(self) -> usize {
        self.0
    }

    #[inline]
    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for RawHandle {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// The host's process-wide execution environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnvironmentHandle(RawHandle);

impl EnvironmentHandle {
    #[inline]
    pub fn new(raw: RawHandle) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn raw(self) -> RawHandle {
        self.0
    }
}

/// Durable reference to the host context, owned by whoever holds the token.
#[must_use = "a ContextHandle must be passed to HandleRegistry::release"]
pub struct ContextHandle {
    env: EnvironmentHandle,
    durable: RawHandle,
    armed: bool,
}

impl ContextHandle {
    /// The durable handle value, for read-only sharing.
    #[inline]
    pub fn raw(&self) -> RawHandle {
        self.durable
    }

    /// Environment the handle was acquired in.
    #[inline]
    pub fn environment(&self) -> EnvironmentHandle {
        self.env
    }

    /// Give up ownership without releasing. The host reference stays alive.
    pub fn leak(mut self) -> RawHandle {
        self.armed = false;
        self.durable
    }

    fn disarm(&mut self) -> RawHandle {
        self.armed = false;
        self.durable
    }
}

impl fmt::Debug for ContextHandle {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("ContextHandle")
            .field("env", &self.env)
            .field("durable", &self.durable)
            .finish()
    }
}

impl Drop for ContextHandle {
    fn drop(&mut self) {
        if self.armed {
            warn!(handle = %self.durable, "context handle dropped without release; host reference leaked");
        }
    }
}

/// Host environment errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error("host context is null")]
    NullContext,

    #[error("host refused to retain context: {0}")]
    RetainFailed(String),

    #[error("cannot attach thread to host environment: {0}")]
    AttachFailed(String),
}

/// Operations the host execution environment provides.
///
/// Implementations must tolerate calls from any thread that has been attached
/// with [`HostEnvironment::attach_current_thread`].
pub trait HostEnvironment: Send + Sync {
    /// Turn a possibly short-lived reference into a durable one.
    fn retain_context(
        &self,
        env: EnvironmentHandle,
        raw: RawHandle,
    ) -> Result<RawHandle, HostError>;

    /// Drop a durable reference obtained from `retain_context`.
    fn release_context(
        &self,
        env: EnvironmentHandle,
        durable: RawHandle,
    );

    /// Attach the calling thread. Returns `true` if this call attached it,
    /// `false` if it was already attached.
    fn attach_current_thread(&self, env: EnvironmentHandle) -> Result<bool, HostError>;

    /// Detach the calling thread.
    fn detach_current_thread(&self, env: EnvironmentHandle);
}

/// Keeps the calling thread attached to the host environment.
///
/// Detaches on drop, but only if the guard performed the attach.
pub struct AttachGuard {
    host: Arc<dyn HostEnvironment>,
    env: EnvironmentHandle,
    attached_here: bool,
}

impl AttachGuard {
    /// Whether this guard attached the thread (as opposed to finding it attached).
    #[inline]
    pub fn attached_here(&self) -> bool {
        self.attached_here
    }
}

impl fmt::Debug for AttachGuard {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("AttachGuard")
            .field("env", &self.env)
            .field("attached_here", &self.attached_here)
            .finish()
    }
}

impl Drop for AttachGuard {
    fn drop(&mut self) {
        if self.attached_here {
            self.host.detach_current_thread(self.env);
        }
    }
}

/// Single point of acquisition and release for the host context.
pub struct HandleRegistry {
    host: Arc<dyn HostEnvironment>,
    live: AtomicUsize,
}

impl HandleRegistry {
    pub fn new(host: Arc<dyn HostEnvironment>) -> Self {
        Self {
            host,
            live: AtomicUsize::new(0),
        }
    }

    /// Promote `raw` into a durable context reference.
    pub fn acquire(
        &self,
        env: EnvironmentHandle,
        raw: RawHandle,
    ) -> Result<ContextHandle, HostError> {
        if raw.is_null() {
            return Err(HostError::NullContext);
        }
        let durable = self.host.retain_context(env, raw)?;
        if durable.is_null() {
            return Err(HostError::RetainFailed(format!(
                "retain of {} returned null",
                raw
            )));
        }
        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(raw = %raw, durable = %durable, live, "acquired host context");
        Ok(ContextHandle {
            env,
            durable,
            armed: true,
        })
    }

    /// Release a context reference. Consumes the token.
    ///
    /// Safe from any thread: the calling thread is attached to the handle's
    /// environment for the duration of the call if it is not already.
    pub fn release(&self, mut handle: ContextHandle) {
        let env = handle.env;
        let durable = handle.disarm();
        let _guard = match self.attach(env) {
            Ok(guard) => Some(guard),
            Err(err) => {
                warn!(error = %err, "releasing context from an unattached thread");
                None
            }
        };
        self.host.release_context(env, durable);
        let live = self.live.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        debug!(durable = %durable, live, "released host context");
    }

    /// Attach the calling thread to `env` until the guard drops.
    pub fn attach(&self, env: EnvironmentHandle) -> Result<AttachGuard, HostError> {
        let attached_here = self.host.attach_current_thread(env)?;
        Ok(AttachGuard {
            host: self.host.clone(),
            env,
            attached_here,
        })
    }

    /// Number of acquisitions not yet released.
    #[inline]
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for HandleRegistry {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("HandleRegistry")
            .field("live", &self.live())
            .finish()
    }
}

#[cfg(test)]
mod tests;
