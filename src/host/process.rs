//! In-process host environment
//!
//! Stands in for a managed host runtime when the layer runs on a desktop or in
//! tests: contexts are plain labelled entries, durable references are counted,
//! and thread attachment is tracked per `ThreadId`.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, ThreadId};

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::warn;

use super::{EnvironmentHandle, HostEnvironment, HostError, RawHandle};

const ENVIRONMENT_ADDR: usize = 0xE000;
const LOCAL_BASE: usize = 0x1_0000;
const DURABLE_BASE: usize = 0x8_0000;
const HANDLE_STRIDE: usize = 0x10;

/// Counters describing how the host was used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HostStats {
    pub retains: usize,
    pub releases: usize,
    pub invalid_releases: usize,
    pub unattached_releases: usize,
    pub attaches: usize,
    pub detaches: usize,
}

#[derive(Debug, Default)]
struct ProcessState {
    /// Local context handle -> label
    contexts: IndexMap<RawHandle, String>,
    /// Durable handle -> local context it refers to
    durable: IndexMap<RawHandle, RawHandle>,
    attached: HashSet<ThreadId>,
    stats: HostStats,
}

/// Host environment living inside this process.
#[derive(Debug)]
pub struct ProcessHost {
    env: EnvironmentHandle,
    next_local: AtomicUsize,
    next_durable: AtomicUsize,
    state: Mutex<ProcessState>,
}

impl ProcessHost {
    pub fn new() -> Self {
        Self {
            env: EnvironmentHandle::new(RawHandle::from_addr(ENVIRONMENT_ADDR)),
            next_local: AtomicUsize::new(0),
            next_durable: AtomicUsize::new(0),
            state: Mutex::new(ProcessState::default()),
        }
    }

    /// The environment handle to pass to `start`.
    #[inline]
    pub fn environment(&self) -> EnvironmentHandle {
        self.env
    }

    /// Create a context object and return its short-lived reference.
    pub fn create_context(&self, label: &str) -> RawHandle {
        let n = self.next_local.fetch_add(1, Ordering::SeqCst);
        let raw = RawHandle::from_addr(LOCAL_BASE + n * HANDLE_STRIDE);
        self.state.lock().contexts.insert(raw, label.to_string());
        raw
    }

    /// Label of the context a durable handle refers to.
    pub fn context_label(&self, durable: RawHandle) -> Option<String> {
        let state = self.state.lock();
        let local = state.durable.get(&durable)?;
        state.contexts.get(local).cloned()
    }

    /// Durable references currently outstanding.
    pub fn live_references(&self) -> usize {
        self.state.lock().durable.len()
    }

    /// Usage counters.
    pub fn stats(&self) -> HostStats {
        self.state.lock().stats
    }

    /// Whether `thread` is attached right now.
    pub fn is_attached(&self, thread: ThreadId) -> bool {
        self.state.lock().attached.contains(&thread)
    }

    fn check_env(
        &self,
        env: EnvironmentHandle,
    ) -> Result<(), String> {
        if env == self.env {
            Ok(())
        } else {
            Err(format!("unknown environment {}", env.raw()))
        }
    }
}

impl Default for ProcessHost {
    fn default() -> Self {
        Self::new()
    }
}

impl HostEnvironment for ProcessHost {
    fn retain_context(
        &self,
        env: EnvironmentHandle,
        raw: RawHandle,
    ) -> Result<RawHandle, HostError> {
        self.check_env(env).map_err(HostError::RetainFailed)?;
        let mut state = self.state.lock();
        if !state.contexts.contains_key(&raw) {
            return Err(HostError::RetainFailed(format!("unknown context {}", raw)));
        }
        let n = self.next_durable.fetch_add(1, Ordering::SeqCst);
        let durable = RawHandle::from_addr(DURABLE_BASE + n * HANDLE_STRIDE);
        state.durable.insert(durable, raw);
        state.stats.retains += 1;
        Ok(durable)
    }

    fn release_context(
        &self,
        env: EnvironmentHandle,
        durable: RawHandle,
    ) {
        let mut state = self.state.lock();
        if !state.attached.contains(&thread::current().id()) {
            state.stats.unattached_releases += 1;
        }
        if self.check_env(env).is_err() || state.durable.shift_remove(&durable).is_none() {
            state.stats.invalid_releases += 1;
            warn!(handle = %durable, "release of unknown durable reference");
            return;
        }
        state.stats.releases += 1;
    }

    fn attach_current_thread(&self, env: EnvironmentHandle) -> Result<bool, HostError> {
        self.check_env(env).map_err(HostError::AttachFailed)?;
        let mut state = self.state.lock();
        let newly = state.attached.insert(thread::current().id());
        if newly {
            state.stats.attaches += 1;
        }
        Ok(newly)
    }

    fn detach_current_thread(&self, _env: EnvironmentHandle) {
        let mut state = self.state.lock();
        if state.attached.remove(&thread::current().id()) {
            state.stats.detaches += 1;
        }
    }
}
