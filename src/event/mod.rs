//! Lifecycle event injection
//!
//! Host lifecycle transitions reach the engine as ordinary events on the
//! engine's own queue, the same way window-manager events would. Three
//! transitions exist:
//!
//! | Signal | Event | Engine reaction |
//! |--------|-------|-----------------|
//! | `Pause` | `WindowMinimized` | stops audio and rendering |
//! | `Resume` | `WindowRestored` | restarts audio and rendering |
//! | `Quit` | `Quit` | leaves its main loop |
//!
//! Injected events carry a synthetic window id (1 by default) that is not tied
//! to a real surface. Posting is fire-and-forget: nothing reports back whether
//! the engine consumed the event. Events posted while no session runs are
//! discarded when the next session starts.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

pub mod queue;

pub use queue::EventQueue;

/// Window id stamped on injected events unless configured otherwise.
pub const SYNTHETIC_WINDOW_ID: u32 = 1;

/// Engine-native event kinds this layer injects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    WindowMinimized,
    WindowRestored,
    Quit,
}

/// An event as the engine's queue stores it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EngineEvent {
    pub kind: EventKind,
    pub window_id: u32,
}

impl EngineEvent {
    #[inline]
    pub fn new(
        kind: EventKind,
        window_id: u32,
    ) -> Self {
        Self { kind, window_id }
    }
}

/// Host lifecycle transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleSignal {
    Pause,
    Resume,
    Quit,
}

impl LifecycleSignal {
    /// The engine event this signal turns into.
    #[inline]
    pub fn event_kind(self) -> EventKind {
        match self {
            LifecycleSignal::Pause => EventKind::WindowMinimized,
            LifecycleSignal::Resume => EventKind::WindowRestored,
            LifecycleSignal::Quit => EventKind::Quit,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleSignal::Pause => "pause",
            LifecycleSignal::Resume => "resume",
            LifecycleSignal::Quit => "quit",
        }
    }
}

impl fmt::Display for LifecycleSignal {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The engine's event-injection mechanism.
pub trait EventSink: Send + Sync {
    /// Append an event to the engine's queue. Returns `false` if the queue
    /// refused it.
    fn post_event(&self, event: EngineEvent) -> bool;

    /// Drop everything still queued. Returns how many events were dropped.
    fn discard_pending(&self) -> usize {
        0
    }
}

/// Translates lifecycle signals into injected engine events.
#[derive(Clone)]
pub struct EventBridge {
    sink: Arc<dyn EventSink>,
    window_id: u32,
}

impl EventBridge {
    pub fn new(
        sink: Arc<dyn EventSink>,
        window_id: u32,
    ) -> Self {
        Self { sink, window_id }
    }

    /// Post the event for `signal`. Returns whether the queue accepted it.
    pub fn signal(&self, signal: LifecycleSignal) -> bool {
        let event = EngineEvent::new(signal.event_kind(), self.window_id);
        let accepted = self.sink.post_event(event);
        if accepted {
            debug!(%signal, window_id = self.window_id, "posted lifecycle event");
        } else {
            warn!(%signal, "engine event queue rejected lifecycle event");
        }
        accepted
    }

    #[inline]
    pub fn pause(&self) -> bool {
        self.signal(LifecycleSignal::Pause)
    }

    #[inline]
    pub fn resume(&self) -> bool {
        self.signal(LifecycleSignal::Resume)
    }

    #[inline]
    pub fn quit(&self) -> bool {
        self.signal(LifecycleSignal::Quit)
    }

    /// Empty the queue of events no session will consume.
    pub fn discard_stale(&self) -> usize {
        let dropped = self.sink.discard_pending();
        if dropped > 0 {
            debug!(dropped, "discarded lifecycle events posted while no session ran");
        }
        dropped
    }

    #[inline]
    pub fn window_id(&self) -> u32 {
        self.window_id
    }
}

impl fmt::Debug for EventBridge {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("EventBridge")
            .field("window_id", &self.window_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests;
