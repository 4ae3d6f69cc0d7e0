//! Session lifecycle controller
//!
//! [`LifecycleController`] is the state machine the host drives:
//!
//! ```text
//!            start                    quit (join)
//! Stopped ──────────▶ Running ──────────▶ Stopping ──────────▶ Stopped
//!    ▲                   │                               release context
//!    └───────────────────┘
//!      worker exited on its own, reaped on the next call
//! ```
//!
//! - `start` acquires the host context, drops any events left in the queue
//!   from while no session ran, spawns the worker thread and returns without
//!   waiting for the engine.
//! - `pause` / `resume` post events and return; nothing checks whether a worker
//!   is listening. Posted between sessions, they are dropped by the next
//!   `start`.
//! - `quit` posts the quit event and blocks until the worker thread has
//!   exited, then releases the context exactly once.
//!
//! A host calls these from a single lifecycle thread. Concurrent `quit` calls
//! are not supported.
//!
//! The process-wide instance used by the C entry points lives in [`global`].

use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError};
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::engine::{EngineFactory, LaunchArgs};
use crate::event::{EventBridge, EventSink};
use crate::host::{
    ContextHandle, EnvironmentHandle, HandleRegistry, HostEnvironment, HostError, RawHandle,
};
use crate::util::config::FragmentConfig;
use crate::worker::{
    panic_message, run_session, OsThreadSpawner, RunnerOutcome, ThreadSpawner, WorkerContext,
};

pub mod global;

pub use global::{global, install};

/// Result of [`LifecycleController::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StartOutcome {
    /// A worker thread was spawned.
    Started,
    /// A session is already active; nothing changed.
    AlreadyRunning,
    /// The host context could not be acquired; nothing changed.
    ContextRejected,
    /// A worker abandoned by a timed-out `quit` is still running and would
    /// compete for the event queue; nothing changed.
    PreviousWorkerAlive,
    /// The worker thread could not be created; the context was released.
    SpawnFailed,
}

/// Result of [`LifecycleController::quit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuitOutcome {
    /// The worker exited and the context was released.
    Stopped,
    /// No session was active.
    NotRunning,
    /// Another `quit` is already waiting for the worker.
    AlreadyStopping,
    /// The worker did not exit within the configured timeout. It was detached
    /// and the context was left retained. `start` is refused until that thread
    /// has finished.
    Abandoned,
}

/// Session errors
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("a session controller is already installed for this process")]
    AlreadyInstalled,

    #[error("no session controller installed")]
    NotInstalled,

    #[error("host rejected context: {0}")]
    Host(#[from] HostError),
}

struct WorkerHandle {
    thread: JoinHandle<()>,
    done: Receiver<RunnerOutcome>,
}

struct ActiveSession {
    worker: WorkerHandle,
    context: ContextHandle,
    env: EnvironmentHandle,
    resource: String,
}

struct StoppingSession {
    context: ContextHandle,
    env: EnvironmentHandle,
    resource: String,
}

enum SessionState {
    Stopped,
    Running(ActiveSession),
    Stopping(StoppingSession),
}

impl SessionState {
    fn name(&self) -> &'static str {
        match self {
            SessionState::Stopped => "stopped",
            SessionState::Running(_) => "running",
            SessionState::Stopping(_) => "stopping",
        }
    }
}

enum WorkerExit {
    Joined(RunnerOutcome),
    TimedOut(JoinHandle<()>),
}

/// Host-facing lifecycle state machine for one embedded engine.
pub struct LifecycleController {
    config: FragmentConfig,
    registry: Arc<HandleRegistry>,
    engine: Arc<dyn EngineFactory>,
    bridge: EventBridge,
    spawner: Arc<dyn ThreadSpawner>,
    quit_requested: AtomicBool,
    state: Mutex<SessionState>,
    last_outcome: Mutex<Option<RunnerOutcome>>,
    abandoned: Mutex<Option<JoinHandle<()>>>,
}

impl LifecycleController {
    pub fn new(
        host: Arc<dyn HostEnvironment>,
        engine: Arc<dyn EngineFactory>,
        sink: Arc<dyn EventSink>,
        config: FragmentConfig,
    ) -> Self {
        let bridge = EventBridge::new(sink, config.window_id);
        Self {
            config,
            registry: Arc::new(HandleRegistry::new(host)),
            engine,
            bridge,
            spawner: Arc::new(OsThreadSpawner),
            quit_requested: AtomicBool::new(false),
            state: Mutex::new(SessionState::Stopped),
            last_outcome: Mutex::new(None),
            abandoned: Mutex::new(None),
        }
    }

    /// Replace the thread spawner.
    pub fn with_spawner(
        mut self,
        spawner: Arc<dyn ThreadSpawner>,
    ) -> Self {
        self.spawner = spawner;
        self
    }

    /// Start a session running `resource`.
    ///
    /// A no-op (logged) if a session is already active.
    pub fn start(
        &self,
        env: EnvironmentHandle,
        context: RawHandle,
        resource: &str,
    ) -> StartOutcome {
        let mut state = self.state.lock();
        self.reap_finished(&mut state);
        if !matches!(*state, SessionState::Stopped) {
            warn!(
                state = state.name(),
                resource, "start called but engine is already running"
            );
            return StartOutcome::AlreadyRunning;
        }
        if !self.abandoned_worker_gone() {
            warn!(resource, "start refused: abandoned engine thread still running");
            return StartOutcome::PreviousWorkerAlive;
        }

        let context = match self.registry.acquire(env, context) {
            Ok(handle) => handle,
            Err(err) => {
                error!(error = %err, "cannot acquire host context");
                return StartOutcome::ContextRejected;
            }
        };

        self.quit_requested.store(false, Ordering::SeqCst);
        self.bridge.discard_stale();

        let worker_ctx = WorkerContext {
            engine: self.engine.clone(),
            registry: self.registry.clone(),
            env,
            args: LaunchArgs::new(
                self.config.program_name.as_str(),
                self.config.boot_script_label.as_str(),
                resource,
            ),
            plan: self.config.boot_plan(),
        };
        let (done_tx, done_rx) = channel::bounded(1);
        let body = Box::new(move || {
            let outcome = run_session(worker_ctx);
            let _ = done_tx.send(outcome);
        });

        match self
            .spawner
            .spawn(&self.config.thread_name, self.config.stack_size, body)
        {
            Ok(thread) => {
                info!(resource, thread = %self.config.thread_name, "engine thread started");
                *state = SessionState::Running(ActiveSession {
                    worker: WorkerHandle {
                        thread,
                        done: done_rx,
                    },
                    context,
                    env,
                    resource: resource.to_string(),
                });
                StartOutcome::Started
            }
            Err(err) => {
                error!(error = %err, "failed to create engine thread");
                self.registry.release(context);
                StartOutcome::SpawnFailed
            }
        }
    }

    /// Ask the engine to pause. Fire-and-forget.
    pub fn pause(&self) {
        self.bridge.pause();
    }

    /// Ask the engine to resume. Fire-and-forget.
    pub fn resume(&self) {
        self.bridge.resume();
    }

    /// Stop the session and wait for the worker thread to exit.
    ///
    /// Blocks without limit unless `quit_timeout_ms` is configured.
    pub fn quit(&self) -> QuitOutcome {
        self.quit_requested.store(true, Ordering::SeqCst);

        let worker = {
            let mut state = self.state.lock();
            // A worker that already exited must not leave a quit event behind.
            self.reap_finished(&mut state);
            match mem::replace(&mut *state, SessionState::Stopped) {
                SessionState::Stopped => {
                    debug!("quit called with no active session");
                    return QuitOutcome::NotRunning;
                }
                SessionState::Stopping(stopping) => {
                    *state = SessionState::Stopping(stopping);
                    warn!("quit called while another quit is in progress");
                    return QuitOutcome::AlreadyStopping;
                }
                SessionState::Running(active) => {
                    let ActiveSession {
                        worker,
                        context,
                        env,
                        resource,
                    } = active;
                    *state = SessionState::Stopping(StoppingSession {
                        context,
                        env,
                        resource,
                    });
                    worker
                }
            }
        };

        self.bridge.quit();
        let exit = self.await_worker(worker);

        let mut state = self.state.lock();
        let stopping = match mem::replace(&mut *state, SessionState::Stopped) {
            SessionState::Stopping(stopping) => stopping,
            other => {
                // Only quit moves a session out of Stopping.
                error!(state = other.name(), "session left stopping state during quit");
                *state = other;
                return QuitOutcome::AlreadyStopping;
            }
        };

        match exit {
            WorkerExit::Joined(outcome) => {
                self.registry.release(stopping.context);
                info!(resource = %stopping.resource, %outcome, "engine thread stopped");
                *self.last_outcome.lock() = Some(outcome);
                QuitOutcome::Stopped
            }
            WorkerExit::TimedOut(thread) => {
                *self.abandoned.lock() = Some(thread);
                let leaked = stopping.context.leak();
                error!(
                    resource = %stopping.resource,
                    context = %leaked,
                    "engine did not exit in time; worker abandoned and context left retained"
                );
                QuitOutcome::Abandoned
            }
        }
    }

    /// Whether a session is active (worker thread or context still held).
    pub fn is_active(&self) -> bool {
        let mut state = self.state.lock();
        self.reap_finished(&mut state);
        !matches!(*state, SessionState::Stopped)
    }

    /// Cached environment handle while a session is active.
    pub fn environment_handle(&self) -> Option<EnvironmentHandle> {
        match &*self.state.lock() {
            SessionState::Stopped => None,
            SessionState::Running(active) => Some(active.env),
            SessionState::Stopping(stopping) => Some(stopping.env),
        }
    }

    /// Cached durable context handle while a session is active.
    pub fn context_handle(&self) -> Option<RawHandle> {
        match &*self.state.lock() {
            SessionState::Stopped => None,
            SessionState::Running(active) => Some(active.context.raw()),
            SessionState::Stopping(stopping) => Some(stopping.context.raw()),
        }
    }

    /// Resource path of the active session.
    pub fn resource_path(&self) -> Option<String> {
        match &*self.state.lock() {
            SessionState::Stopped => None,
            SessionState::Running(active) => Some(active.resource.clone()),
            SessionState::Stopping(stopping) => Some(stopping.resource.clone()),
        }
    }

    /// Whether `quit` has been requested since the last `start`.
    #[inline]
    pub fn quit_requested(&self) -> bool {
        self.quit_requested.load(Ordering::SeqCst)
    }

    /// How the most recently joined worker ended.
    pub fn last_outcome(&self) -> Option<RunnerOutcome> {
        self.last_outcome.lock().clone()
    }

    /// Host references this controller currently holds.
    #[inline]
    pub fn live_contexts(&self) -> usize {
        self.registry.live()
    }

    #[inline]
    pub fn config(&self) -> &FragmentConfig {
        &self.config
    }

    /// Join a worker that exited without `quit` and release its context.
    fn reap_finished(&self, state: &mut SessionState) {
        let finished = matches!(state, SessionState::Running(active) if active.worker.thread.is_finished());
        if !finished {
            return;
        }
        if let SessionState::Running(active) = mem::replace(state, SessionState::Stopped) {
            let outcome = join_worker(active.worker);
            self.registry.release(active.context);
            info!(resource = %active.resource, %outcome, "engine thread exited on its own");
            *self.last_outcome.lock() = Some(outcome);
        }
    }

    /// Join a previously abandoned worker if it has finished. Returns whether
    /// no abandoned worker remains.
    fn abandoned_worker_gone(&self) -> bool {
        let mut abandoned = self.abandoned.lock();
        match abandoned.take() {
            None => true,
            Some(thread) if thread.is_finished() => {
                if let Err(payload) = thread.join() {
                    warn!(panic = %panic_message(payload), "abandoned engine thread panicked");
                }
                info!("abandoned engine thread has exited");
                true
            }
            Some(thread) => {
                *abandoned = Some(thread);
                false
            }
        }
    }

    fn await_worker(&self, worker: WorkerHandle) -> WorkerExit {
        let Some(timeout) = self.config.quit_timeout() else {
            return WorkerExit::Joined(join_worker(worker));
        };
        match worker.done.recv_timeout(timeout) {
            Ok(outcome) => {
                if let Err(payload) = worker.thread.join() {
                    warn!(panic = %panic_message(payload), "engine thread panicked after finishing");
                }
                WorkerExit::Joined(outcome)
            }
            Err(RecvTimeoutError::Disconnected) => WorkerExit::Joined(join_worker(worker)),
            Err(RecvTimeoutError::Timeout) => {
                warn!(timeout_ms = timeout_ms(timeout), "timed out waiting for engine thread");
                WorkerExit::TimedOut(worker.thread)
            }
        }
    }
}

fn join_worker(worker: WorkerHandle) -> RunnerOutcome {
    match worker.thread.join() {
        Ok(()) => worker.done.try_recv().unwrap_or_else(|_| {
            RunnerOutcome::Panicked("worker exited without reporting".to_string())
        }),
        Err(payload) => {
            let msg = panic_message(payload);
            error!(panic = %msg, "engine thread panicked");
            RunnerOutcome::Panicked(msg)
        }
    }
}

fn timeout_ms(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)
}

impl fmt::Debug for LifecycleController {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("LifecycleController")
            .field("engine", &self.engine.name())
            .field("state", &self.state.lock().name())
            .field("quit_requested", &self.quit_requested())
            .field("registry", &self.registry)
            .finish()
    }
}

impl Drop for LifecycleController {
    fn drop(&mut self) {
        if !matches!(*self.state.get_mut(), SessionState::Stopped) {
            self.quit();
        }
    }
}
