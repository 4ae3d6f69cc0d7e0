//! love-fragment: lifecycle coordination for an embedded game engine
//!
//! Runs an embedded engine on a dedicated worker thread inside a host UI
//! container whose lifecycle (create, pause, resume, destroy) is driven from
//! outside. The host's calls become engine events; shutdown blocks until the
//! worker has fully exited and the host context is released exactly once.
//!
//! # Layout
//!
//! - [`host`]: host environment handles and the context registry
//! - [`event`]: lifecycle signal to engine event translation
//! - [`engine`]: interpreter collaborator interfaces and a headless engine
//! - [`worker`]: what runs on the engine thread
//! - [`session`]: the lifecycle state machine and the process-wide instance
//! - [`ffi`]: the C entry points
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use love_fragment::{run_headless, FragmentConfig, HeadlessRun};
//!
//! let run = HeadlessRun {
//!     quit_after: Some(Duration::from_millis(100)),
//!     ..HeadlessRun::new("game.love")
//! };
//! let report = run_headless(&run, FragmentConfig::default()).unwrap();
//! assert_eq!(report.argv, vec!["love", "game.love"]);
//! ```

#![warn(rust_2018_idioms)]

pub mod engine;
pub mod event;
pub mod ffi;
pub mod host;
pub mod session;
pub mod util;
pub mod worker;

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::bail;
use serde::Serialize;
use tracing::{debug, info};

// Re-exports
pub use anyhow::{Context, Result};
pub use engine::{ExitReason, HeadlessEngine, HeadlessOptions};
pub use event::{EventBridge, EventQueue, LifecycleSignal};
pub use host::{HandleRegistry, HostStats, ProcessHost};
pub use session::{LifecycleController, QuitOutcome, StartOutcome};
pub use util::config::FragmentConfig;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = "love-fragment";

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// A scripted host lifecycle against the headless engine.
///
/// Offsets are measured from the moment `start` returns.
#[derive(Debug, Clone)]
pub struct HeadlessRun {
    pub resource: String,
    pub max_frames: Option<u64>,
    pub pause_after: Option<Duration>,
    pub resume_after: Option<Duration>,
    pub quit_after: Option<Duration>,
}

impl HeadlessRun {
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            max_frames: None,
            pause_after: None,
            resume_after: None,
            quit_after: None,
        }
    }
}

/// What happened during a [`run_headless`] session.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub resource: String,
    pub argv: Vec<String>,
    pub start: StartOutcome,
    pub quit: QuitOutcome,
    pub outcome: Option<String>,
    pub exit: Option<ExitReason>,
    pub events: Vec<String>,
    pub frames: u64,
    pub resumes: u64,
    pub elapsed_ms: u64,
    pub host: HostStats,
}

/// Drive one session through `start`, the scheduled signals and `quit`.
///
/// Without `quit_after` the run waits for the engine to stop on its own,
/// which needs `max_frames`.
pub fn run_headless(
    run: &HeadlessRun,
    config: FragmentConfig,
) -> Result<RunReport> {
    if run.quit_after.is_none() && run.max_frames.is_none() {
        bail!("a headless run needs a frame limit or a quit time");
    }

    let host = Arc::new(ProcessHost::new());
    let queue = EventQueue::new();
    let engine = HeadlessEngine::with_options(
        queue.clone(),
        HeadlessOptions {
            max_frames: run.max_frames,
            ..HeadlessOptions::from_config(&config)
        },
    );
    let controller =
        LifecycleController::new(host.clone(), Arc::new(engine.clone()), Arc::new(queue), config);

    let context = host.create_context("application");
    let started_at = Instant::now();
    let start = controller.start(host.environment(), context, &run.resource);
    if start != StartOutcome::Started {
        bail!("engine did not start: {:?}", start);
    }
    info!(resource = %run.resource, "headless session started");

    let mut schedule: Vec<(Duration, LifecycleSignal)> = [
        (run.pause_after, LifecycleSignal::Pause),
        (run.resume_after, LifecycleSignal::Resume),
        (run.quit_after, LifecycleSignal::Quit),
    ]
    .into_iter()
    .filter_map(|(at, signal)| at.map(|at| (at, signal)))
    .collect();
    schedule.sort_by_key(|(at, _)| *at);

    let mut quit = None;
    for (at, signal) in schedule {
        if let Some(wait) = at.checked_sub(started_at.elapsed()) {
            thread::sleep(wait);
        }
        debug!(%signal, "scheduled signal");
        match signal {
            LifecycleSignal::Pause => controller.pause(),
            LifecycleSignal::Resume => controller.resume(),
            LifecycleSignal::Quit => quit = Some(controller.quit()),
        }
    }

    let quit = match quit {
        Some(outcome) => outcome,
        None => {
            while controller.is_active() {
                thread::sleep(POLL_INTERVAL);
            }
            controller.quit()
        }
    };

    let journal = engine.journal();
    Ok(RunReport {
        resource: run.resource.clone(),
        argv: journal
            .args
            .iter()
            .filter(|(i, _)| *i == -2 || *i >= 1)
            .map(|(_, v)| v.clone())
            .collect(),
        start,
        quit,
        outcome: controller.last_outcome().map(|o| o.to_string()),
        exit: journal.exit,
        events: journal.events.iter().map(|e| format!("{:?}", e.kind)).collect(),
        frames: journal.frames,
        resumes: journal.resumes,
        elapsed_ms: u64::try_from(started_at.elapsed().as_millis()).unwrap_or(u64::MAX),
        host: host.stats(),
    })
}
