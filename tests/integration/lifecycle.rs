//! Host lifecycle sequences through the public API.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use love_fragment::engine::Journal;
use love_fragment::event::EventKind;
use love_fragment::{
    EventQueue, FragmentConfig, HeadlessEngine, HeadlessOptions, LifecycleController,
    ProcessHost, QuitOutcome, StartOutcome,
};

fn setup(options: HeadlessOptions) -> (Arc<ProcessHost>, HeadlessEngine, LifecycleController) {
    let host = Arc::new(ProcessHost::new());
    let queue = EventQueue::new();
    let engine = HeadlessEngine::with_options(queue.clone(), options);
    let controller = LifecycleController::new(
        host.clone(),
        Arc::new(engine.clone()),
        Arc::new(queue),
        FragmentConfig::default(),
    );
    (host, engine, controller)
}

fn kinds(journal: &Journal) -> Vec<EventKind> {
    journal.events.iter().map(|e| e.kind).collect()
}

#[test]
fn test_activity_create_pause_resume_destroy() {
    let (host, engine, controller) = setup(HeadlessOptions::default());
    let ctx = host.create_context("activity");

    assert_eq!(
        controller.start(host.environment(), ctx, "/sdcard/game.love"),
        StartOutcome::Started
    );
    thread::sleep(Duration::from_millis(20));
    controller.pause();
    thread::sleep(Duration::from_millis(20));
    controller.resume();
    thread::sleep(Duration::from_millis(20));
    assert_eq!(controller.quit(), QuitOutcome::Stopped);

    let journal = engine.journal();
    assert_eq!(
        kinds(&journal),
        vec![EventKind::WindowMinimized, EventKind::WindowRestored, EventKind::Quit]
    );
    assert!(journal.frames > 0);
    assert_eq!(journal.args.last().map(|(_, v)| v.as_str()), Some("/sdcard/game.love"));
    assert_eq!(host.live_references(), 0);
    assert!(!controller.is_active());
}

#[test]
fn test_frames_stop_while_paused() {
    let (host, engine, controller) = setup(HeadlessOptions {
        idle_wait: Duration::from_millis(5),
        ..HeadlessOptions::default()
    });
    controller.start(host.environment(), host.create_context("activity"), "game.love");

    controller.pause();
    let deadline = Instant::now() + Duration::from_secs(5);
    while engine.journal().events.is_empty() {
        assert!(Instant::now() < deadline, "pause never reached the engine");
        thread::sleep(Duration::from_millis(2));
    }
    let frozen = engine.journal().frames;
    thread::sleep(Duration::from_millis(40));
    assert_eq!(engine.journal().frames, frozen);

    controller.quit();
}

#[test]
fn test_repeated_sessions_on_one_controller() {
    let (host, engine, controller) = setup(HeadlessOptions::default());
    for round in 0..3 {
        let ctx = host.create_context("activity");
        let resource = format!("level{}.love", round);
        assert_eq!(
            controller.start(host.environment(), ctx, &resource),
            StartOutcome::Started
        );
        assert_eq!(controller.resource_path(), Some(resource));
        assert_eq!(controller.quit(), QuitOutcome::Stopped);
    }
    let stats = host.stats();
    assert_eq!(stats.retains, 3);
    assert_eq!(stats.releases, 3);
    assert_eq!(engine.journal().interpreters_closed, 3);
}

#[test]
fn test_quit_from_another_thread() {
    let (host, engine, controller) = setup(HeadlessOptions::default());
    let controller = Arc::new(controller);
    controller.start(host.environment(), host.create_context("activity"), "game.love");

    let remote = controller.clone();
    let outcome = thread::spawn(move || remote.quit()).join().unwrap();
    assert_eq!(outcome, QuitOutcome::Stopped);
    assert_eq!(engine.journal().interpreters_closed, 1);
    assert_eq!(host.stats().unattached_releases, 0);
}
