//! Engine event queue
//!
//! Unbounded multi-producer FIFO shared between the host thread (producer)
//! and the worker thread (consumer). The queue outlives sessions but is
//! dormant between them: a starting session discards whatever is pending, and
//! only events posted after that point reach the new worker.

use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};

use super::{EngineEvent, EventSink};

/// FIFO queue of engine events. Cloning shares the same queue.
#[derive(Debug, Clone)]
pub struct EventQueue {
    tx: Sender<EngineEvent>,
    rx: Receiver<EngineEvent>,
}

impl EventQueue {
    pub fn new() -> Self {
        let (tx, rx) = channel::unbounded();
        Self { tx, rx }
    }

    /// Append an event.
    #[inline]
    pub fn post(&self, event: EngineEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    /// Take the oldest event, if any.
    #[inline]
    pub fn poll(&self) -> Option<EngineEvent> {
        self.rx.try_recv().ok()
    }

    /// Wait up to `timeout` for the next event.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<EngineEvent> {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Take every queued event, oldest first.
    pub fn drain(&self) -> Vec<EngineEvent> {
        self.rx.try_iter().collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for EventQueue {
    fn post_event(&self, event: EngineEvent) -> bool {
        self.post(event)
    }

    fn discard_pending(&self) -> usize {
        self.rx.try_iter().count()
    }
}
