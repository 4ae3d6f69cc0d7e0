//! EventBridge 单元测试

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::event::{
    EngineEvent, EventBridge, EventKind, EventQueue, EventSink, LifecycleSignal,
    SYNTHETIC_WINDOW_ID,
};

struct ClosedSink {
    attempts: AtomicUsize,
}

impl EventSink for ClosedSink {
    fn post_event(&self, _event: EngineEvent) -> bool {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        false
    }
}

#[test]
fn test_signal_event_kinds() {
    assert_eq!(LifecycleSignal::Pause.event_kind(), EventKind::WindowMinimized);
    assert_eq!(LifecycleSignal::Resume.event_kind(), EventKind::WindowRestored);
    assert_eq!(LifecycleSignal::Quit.event_kind(), EventKind::Quit);
    assert_eq!(LifecycleSignal::Quit.to_string(), "quit");
}

#[test]
fn test_bridge_stamps_synthetic_window() {
    let queue = EventQueue::new();
    let bridge = EventBridge::new(Arc::new(queue.clone()), SYNTHETIC_WINDOW_ID);

    assert!(bridge.pause());
    let event = queue.poll().unwrap();
    assert_eq!(event, EngineEvent::new(EventKind::WindowMinimized, 1));
    assert!(queue.poll().is_none());
}

#[test]
fn test_pause_resume_quit_fifo() {
    let queue = EventQueue::new();
    let bridge = EventBridge::new(Arc::new(queue.clone()), 7);

    bridge.pause();
    bridge.resume();
    bridge.quit();

    let kinds: Vec<EventKind> = queue.drain().into_iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![EventKind::WindowMinimized, EventKind::WindowRestored, EventKind::Quit]
    );
    assert!(queue.is_empty());
}

#[test]
fn test_rejected_post_is_reported() {
    let sink = Arc::new(ClosedSink {
        attempts: AtomicUsize::new(0),
    });
    let bridge = EventBridge::new(sink.clone(), SYNTHETIC_WINDOW_ID);
    assert!(!bridge.resume());
    assert_eq!(sink.attempts.load(Ordering::SeqCst), 1);
}

#[test]
fn test_queue_holds_events_until_polled() {
    let queue = EventQueue::new();
    let producer = queue.clone();
    thread::spawn(move || {
        producer.post(EngineEvent::new(EventKind::Quit, 1));
    })
    .join()
    .unwrap();

    assert_eq!(queue.len(), 1);
    assert_eq!(
        queue.wait_timeout(Duration::from_millis(10)).map(|e| e.kind),
        Some(EventKind::Quit)
    );
    assert_eq!(queue.wait_timeout(Duration::from_millis(5)), None);
}

#[test]
fn test_wait_timeout_wakes_on_post() {
    let queue = EventQueue::new();
    let producer = queue.clone();
    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        producer.post(EngineEvent::new(EventKind::WindowRestored, 1));
    });
    let event = queue.wait_timeout(Duration::from_secs(5));
    handle.join().unwrap();
    assert_eq!(event.map(|e| e.kind), Some(EventKind::WindowRestored));
}

#[test]
fn test_discard_stale_empties_queue() {
    let queue = EventQueue::new();
    let bridge = EventBridge::new(Arc::new(queue.clone()), SYNTHETIC_WINDOW_ID);
    bridge.pause();
    bridge.quit();

    assert_eq!(bridge.discard_stale(), 2);
    assert!(queue.is_empty());
    assert_eq!(bridge.discard_stale(), 0);

    bridge.resume();
    assert_eq!(queue.poll().map(|e| e.kind), Some(EventKind::WindowRestored));
}

#[test]
fn test_sink_without_discard_keeps_default() {
    let sink = Arc::new(ClosedSink {
        attempts: AtomicUsize::new(0),
    });
    let bridge = EventBridge::new(sink, SYNTHETIC_WINDOW_ID);
    assert_eq!(bridge.discard_stale(), 0);
}
