//! Headless engine
//!
//! A windowless engine that speaks the [`Interpreter`] protocol. Its boot
//! sequence is a frame loop driven from the shared [`EventQueue`]:
//!
//! 1. drain pending events (blocking briefly while minimized)
//! 2. `WindowMinimized` stops frame advance, `WindowRestored` restarts it,
//!    `Quit` completes the sequence
//! 3. otherwise advance one frame and yield
//!
//! The sequence also completes after `max_frames` frames of that interpreter.
//! Everything the engine observes is recorded in a [`Journal`] for inspection;
//! the journal accumulates across every interpreter the factory creates.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use indexmap::{IndexMap, IndexSet};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, trace};

use super::{BootStep, EngineError, EngineFactory, FlagValue, Interpreter, LaunchArgs};
use crate::event::{EngineEvent, EventKind, EventQueue};
use crate::util::config::FragmentConfig;

/// Why the boot sequence completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    QuitEvent,
    FrameLimit,
}

/// Tunables for [`HeadlessEngine`].
#[derive(Debug, Clone)]
pub struct HeadlessOptions {
    /// Complete after this many frames of one interpreter.
    pub max_frames: Option<u64>,
    /// Sleep between frames.
    pub frame_interval: Duration,
    /// How long to block on the queue per resume while minimized.
    pub idle_wait: Duration,
    /// Module whose loading makes `boot_module` available.
    pub main_module: String,
    /// Module that must be loaded before the boot sequence can run.
    pub boot_module: String,
    /// Make loading this module fail with a script error.
    pub fail_on_load: Option<String>,
}

impl Default for HeadlessOptions {
    fn default() -> Self {
        Self {
            max_frames: None,
            frame_interval: Duration::from_millis(1),
            idle_wait: Duration::from_millis(20),
            main_module: "love".to_string(),
            boot_module: "love.boot".to_string(),
            fail_on_load: None,
        }
    }
}

impl HeadlessOptions {
    /// Defaults with the module names a session built from `config` loads.
    pub fn from_config(config: &FragmentConfig) -> Self {
        Self {
            main_module: config.modules.main.clone(),
            boot_module: config.modules.boot.clone(),
            ..Self::default()
        }
    }
}

/// What the engine saw during its lifetime.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    pub interpreters_created: usize,
    pub interpreters_closed: usize,
    pub registered: Vec<String>,
    pub loaded: Vec<String>,
    pub args: Vec<(i64, String)>,
    pub fields: IndexMap<String, FlagValue>,
    pub events: Vec<EngineEvent>,
    /// Frames advanced by all interpreters together.
    pub frames: u64,
    pub resumes: u64,
    pub discarded: usize,
    pub exit: Option<ExitReason>,
    pub boot_thread: Option<String>,
}

/// Engine factory for the headless engine. Cloning shares queue and journal.
#[derive(Debug, Clone)]
pub struct HeadlessEngine {
    queue: EventQueue,
    options: HeadlessOptions,
    journal: Arc<Mutex<Journal>>,
}

impl HeadlessEngine {
    pub fn new(queue: EventQueue) -> Self {
        Self::with_options(queue, HeadlessOptions::default())
    }

    pub fn with_options(
        queue: EventQueue,
        options: HeadlessOptions,
    ) -> Self {
        Self {
            queue,
            options,
            journal: Arc::new(Mutex::new(Journal::default())),
        }
    }

    /// The queue the engine polls.
    #[inline]
    pub fn queue(&self) -> &EventQueue {
        &self.queue
    }

    /// Snapshot of the journal.
    pub fn journal(&self) -> Journal {
        self.journal.lock().clone()
    }
}

impl EngineFactory for HeadlessEngine {
    fn name(&self) -> &str {
        "headless"
    }

    fn create_interpreter(&self) -> Result<Box<dyn Interpreter>, EngineError> {
        self.journal.lock().interpreters_created += 1;
        Ok(Box::new(HeadlessInterpreter {
            queue: self.queue.clone(),
            options: self.options.clone(),
            journal: self.journal.clone(),
            registered: IndexSet::new(),
            loaded: IndexSet::new(),
            frames: 0,
            paused: false,
            finished: false,
        }))
    }
}

struct HeadlessInterpreter {
    queue: EventQueue,
    options: HeadlessOptions,
    journal: Arc<Mutex<Journal>>,
    registered: IndexSet<String>,
    loaded: IndexSet<String>,
    frames: u64,
    paused: bool,
    finished: bool,
}

impl HeadlessInterpreter {
    fn pending_events(&self) -> Vec<EngineEvent> {
        if self.paused {
            match self.queue.wait_timeout(self.options.idle_wait) {
                Some(first) => {
                    let mut events = vec![first];
                    events.extend(self.queue.drain());
                    events
                }
                None => Vec::new(),
            }
        } else {
            self.queue.drain()
        }
    }

    fn finish(
        &mut self,
        reason: ExitReason,
    ) -> BootStep {
        self.finished = true;
        self.journal.lock().exit = Some(reason);
        debug!(?reason, "headless boot sequence completed");
        BootStep::Completed
    }
}

impl Interpreter for HeadlessInterpreter {
    fn register_module(&mut self, name: &str) -> Result<(), EngineError> {
        if self.registered.insert(name.to_string()) {
            self.journal.lock().registered.push(name.to_string());
        }
        Ok(())
    }

    fn load_module(&mut self, name: &str) -> Result<(), EngineError> {
        if !self.registered.contains(name) {
            return Err(EngineError::ModuleNotFound(name.to_string()));
        }
        if self.options.fail_on_load.as_deref() == Some(name) {
            return Err(EngineError::Script {
                module: name.to_string(),
                message: "load failed".to_string(),
            });
        }
        if self.loaded.insert(name.to_string()) {
            self.journal.lock().loaded.push(name.to_string());
        }
        if name == self.options.main_module {
            let boot = self.options.boot_module.clone();
            self.register_module(&boot)?;
        }
        Ok(())
    }

    fn set_args(&mut self, args: &LaunchArgs) {
        self.journal.lock().args = args
            .table()
            .into_iter()
            .map(|(i, v)| (i, v.to_string()))
            .collect();
    }

    fn set_module_field(
        &mut self,
        module: &str,
        key: &str,
        value: FlagValue,
    ) -> Result<(), EngineError> {
        if !self.loaded.contains(module) {
            return Err(EngineError::ModuleNotLoaded(module.to_string()));
        }
        self.journal
            .lock()
            .fields
            .insert(format!("{}.{}", module, key), value);
        Ok(())
    }

    fn resume_boot_sequence(&mut self) -> Result<BootStep, EngineError> {
        if !self.loaded.contains(&self.options.boot_module) {
            return Err(EngineError::BootNotLoaded);
        }
        if self.finished {
            return Ok(BootStep::Completed);
        }
        {
            let mut journal = self.journal.lock();
            journal.resumes += 1;
            if journal.boot_thread.is_none() {
                journal.boot_thread = thread::current().name().map(str::to_string);
            }
        }

        for event in self.pending_events() {
            trace!(?event, "headless engine event");
            self.journal.lock().events.push(event);
            match event.kind {
                EventKind::WindowMinimized => self.paused = true,
                EventKind::WindowRestored => self.paused = false,
                EventKind::Quit => return Ok(self.finish(ExitReason::QuitEvent)),
            }
        }

        if self.paused {
            return Ok(BootStep::Suspended { results: 0 });
        }

        self.frames += 1;
        self.journal.lock().frames += 1;
        if self.options.max_frames.is_some_and(|max| self.frames >= max) {
            return Ok(self.finish(ExitReason::FrameLimit));
        }
        if !self.options.frame_interval.is_zero() {
            thread::sleep(self.options.frame_interval);
        }
        Ok(BootStep::Suspended { results: 1 })
    }

    fn discard_results(&mut self, count: usize) {
        self.journal.lock().discarded += count;
    }

    fn close(self: Box<Self>) {
        self.journal.lock().interpreters_closed += 1;
    }
}
