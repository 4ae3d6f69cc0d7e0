//! C ABI boundary
//!
//! The host container drives the process-wide session through these
//! functions, one per lifecycle transition:
//!
//! | Function | Effect |
//! |----------|--------|
//! | `love_fragment_install_headless` | install the controller (once per process) |
//! | `love_fragment_init` | start a session on a worker thread |
//! | `love_fragment_pause` / `love_fragment_resume` | post lifecycle events |
//! | `love_fragment_quit` | post quit, block until the worker exits |
//! | `love_fragment_is_active` | whether a session is active |
//! | `love_fragment_get_environment` / `love_fragment_get_context` | cached handles, or null |
//!
//! Nothing here unwinds into the host. Calls made before a controller is
//! installed are logged and ignored.

use std::ffi::{c_char, c_int, c_void, CStr};
use std::ptr;
use std::sync::Arc;

use thiserror::Error;
use tracing::{error, warn};

use crate::engine::{EngineFactory, HeadlessEngine, HeadlessOptions};
use crate::event::{EventQueue, EventSink};
use crate::host::{EnvironmentHandle, RawHandle};
use crate::session::{self, LifecycleController, QuitOutcome, SessionError, StartOutcome};
use crate::util::config::{ConfigError, FragmentConfig};
use crate::util::logger::{self, LogLevel};

mod guard;
pub mod vtable;

pub use vtable::{HostVTable, VTableError, VTableHost};

use guard::{guard_void, guard_with_default};

pub const LF_OK: c_int = 0;
/// `init`: a session is already running. `install`: a controller exists.
pub const LF_ALREADY: c_int = 1;
/// `quit`: no session was active.
pub const LF_NOT_RUNNING: c_int = 2;
/// `quit`: the worker missed the configured timeout and was abandoned.
pub const LF_ABANDONED: c_int = 3;
pub const LF_ERR_NOT_INSTALLED: c_int = -1;
pub const LF_ERR_INVALID_ARGUMENT: c_int = -2;
pub const LF_ERR_CONTEXT: c_int = -3;
pub const LF_ERR_SPAWN: c_int = -4;
pub const LF_ERR_CONFIG: c_int = -5;
/// `init`: an engine thread abandoned by a timed-out quit is still running.
pub const LF_ERR_BUSY: c_int = -6;
pub const LF_ERR_PANIC: c_int = -99;

/// Errors while installing the process-wide controller.
#[derive(Debug, Error)]
pub enum InstallError {
    #[error(transparent)]
    VTable(#[from] VTableError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

impl InstallError {
    fn status(&self) -> c_int {
        match self {
            InstallError::VTable(_) => LF_ERR_INVALID_ARGUMENT,
            InstallError::Config(_) => LF_ERR_CONFIG,
            InstallError::Session(SessionError::AlreadyInstalled) => LF_ALREADY,
            InstallError::Session(_) => LF_ERR_NOT_INSTALLED,
        }
    }
}

/// Install the process-wide controller over a host vtable.
pub fn install_with_vtable(
    vtable: HostVTable,
    engine: Arc<dyn EngineFactory>,
    sink: Arc<dyn EventSink>,
    config: FragmentConfig,
) -> Result<&'static LifecycleController, InstallError> {
    let host = VTableHost::new(vtable)?;
    let controller = LifecycleController::new(Arc::new(host), engine, sink, config);
    Ok(session::install(controller)?)
}

pub fn start_outcome_status(outcome: StartOutcome) -> c_int {
    match outcome {
        StartOutcome::Started => LF_OK,
        StartOutcome::AlreadyRunning => LF_ALREADY,
        StartOutcome::ContextRejected => LF_ERR_CONTEXT,
        StartOutcome::PreviousWorkerAlive => LF_ERR_BUSY,
        StartOutcome::SpawnFailed => LF_ERR_SPAWN,
    }
}

pub fn quit_outcome_status(outcome: QuitOutcome) -> c_int {
    match outcome {
        QuitOutcome::Stopped => LF_OK,
        QuitOutcome::NotRunning | QuitOutcome::AlreadyStopping => LF_NOT_RUNNING,
        QuitOutcome::Abandoned => LF_ABANDONED,
    }
}

fn installed(op: &'static str) -> Option<&'static LifecycleController> {
    let controller = session::global();
    if controller.is_none() {
        warn!(op, "called before a session controller was installed");
    }
    controller
}

/// Read a resource path handed over by the host.
///
/// # Safety
///
/// `path` must be null or a NUL-terminated string valid for the call.
unsafe fn resource_path<'a>(path: *const c_char) -> Option<&'a str> {
    if path.is_null() {
        return None;
    }
    // SAFETY: non-null and NUL-terminated per the caller contract.
    unsafe { CStr::from_ptr(path) }.to_str().ok()
}

/// Install a controller running the headless engine.
///
/// Configuration is resolved from the environment as `FragmentConfig::load`
/// describes. Returns `LF_OK`, `LF_ALREADY` or a negative error.
///
/// # Safety
///
/// `vtable` must be null or point to a readable `HostVTable` whose callbacks
/// stay valid for the life of the process.
#[no_mangle]
pub unsafe extern "C" fn love_fragment_install_headless(vtable: *const HostVTable) -> c_int {
    guard_with_default("install_headless", LF_ERR_PANIC, || {
        logger::try_init_with_level(LogLevel::Info);
        // SAFETY: forwarded caller contract.
        let result = unsafe { VTableHost::from_raw(vtable) }
            .map_err(InstallError::from)
            .and_then(|host| {
                let config = FragmentConfig::load(None)?;
                let queue = EventQueue::new();
                let engine =
                    HeadlessEngine::with_options(queue.clone(), HeadlessOptions::from_config(&config));
                let controller =
                    LifecycleController::new(Arc::new(host), Arc::new(engine), Arc::new(queue), config);
                Ok(session::install(controller)?)
            });
        match result {
            Ok(_) => LF_OK,
            Err(err) => {
                error!(error = %err, "cannot install session controller");
                err.status()
            }
        }
    })
}

/// Start a session for the resource at `path`.
///
/// # Safety
///
/// `path` must be null or a NUL-terminated string. `env` and `context` are
/// passed to the host vtable unchanged.
#[no_mangle]
pub unsafe extern "C" fn love_fragment_init(
    env: *mut c_void,
    context: *mut c_void,
    path: *const c_char,
) -> c_int {
    guard_with_default("init", LF_ERR_PANIC, || {
        let Some(controller) = installed("init") else {
            return LF_ERR_NOT_INSTALLED;
        };
        // SAFETY: forwarded caller contract.
        let Some(resource) = (unsafe { resource_path(path) }) else {
            error!("init called with a null or non UTF-8 resource path");
            return LF_ERR_INVALID_ARGUMENT;
        };
        let env = EnvironmentHandle::new(RawHandle::from_ptr(env));
        start_outcome_status(controller.start(env, RawHandle::from_ptr(context), resource))
    })
}

#[no_mangle]
pub extern "C" fn love_fragment_pause() {
    guard_void("pause", || {
        if let Some(controller) = installed("pause") {
            controller.pause();
        }
    })
}

#[no_mangle]
pub extern "C" fn love_fragment_resume() {
    guard_void("resume", || {
        if let Some(controller) = installed("resume") {
            controller.resume();
        }
    })
}

/// Stop the session. Blocks until the worker thread has exited.
#[no_mangle]
pub extern "C" fn love_fragment_quit() -> c_int {
    guard_with_default("quit", LF_ERR_PANIC, || match installed("quit") {
        Some(controller) => quit_outcome_status(controller.quit()),
        None => LF_ERR_NOT_INSTALLED,
    })
}

#[no_mangle]
pub extern "C" fn love_fragment_is_active() -> bool {
    guard_with_default("is_active", false, || {
        session::global().is_some_and(LifecycleController::is_active)
    })
}

/// Cached environment handle, or null when no session is active.
#[no_mangle]
pub extern "C" fn love_fragment_get_environment() -> *mut c_void {
    guard_with_default("get_environment", ptr::null_mut(), || {
        session::global()
            .and_then(LifecycleController::environment_handle)
            .map_or(ptr::null_mut(), |env| env.raw().as_ptr())
    })
}

/// Cached durable context handle, or null when no session is active.
#[no_mangle]
pub extern "C" fn love_fragment_get_context() -> *mut c_void {
    guard_with_default("get_context", ptr::null_mut(), || {
        session::global()
            .and_then(LifecycleController::context_handle)
            .map_or(ptr::null_mut(), RawHandle::as_ptr)
    })
}
