//! Engine interface and headless engine tests

use std::time::Duration;

use crate::engine::{
    BootStep, EngineError, EngineFactory, ExitReason, FlagValue, HeadlessEngine, HeadlessOptions,
    LaunchArgs,
};
use crate::event::{EngineEvent, EventKind, EventQueue};
use crate::util::config::FragmentConfig;

fn fast_options() -> HeadlessOptions {
    HeadlessOptions {
        frame_interval: Duration::ZERO,
        idle_wait: Duration::from_millis(1),
        ..HeadlessOptions::default()
    }
}

#[cfg(test)]
mod launch_args_tests {
    use super::*;

    #[test]
    fn test_argv_is_program_then_resource() {
        let args = LaunchArgs::new("love", "embedded boot.lua", "game.love");
        assert_eq!(args.argv(), vec!["love", "game.love"]);
        assert_eq!(args.resource(), "game.love");
    }

    #[test]
    fn test_table_indices() {
        let args = LaunchArgs::new("love", "embedded boot.lua", "game.love").with_arg("--fused");
        assert_eq!(
            args.table(),
            vec![
                (-2, "love"),
                (-1, "embedded boot.lua"),
                (1, "game.love"),
                (2, "--fused"),
            ]
        );
    }

    #[test]
    fn test_flag_value_display() {
        assert_eq!(FlagValue::Nil.to_string(), "nil");
        assert_eq!(FlagValue::Bool(true).to_string(), "true");
        assert_eq!(FlagValue::Str("x".into()).to_string(), "\"x\"");
    }
}

#[cfg(test)]
mod headless_tests {
    use super::*;

    fn booted(engine: &HeadlessEngine) -> Box<dyn crate::engine::Interpreter> {
        let mut interp = engine.create_interpreter().unwrap();
        interp.register_module("love").unwrap();
        interp.load_module("love").unwrap();
        interp.load_module("love.boot").unwrap();
        interp
    }

    #[test]
    fn test_load_requires_registration() {
        let engine = HeadlessEngine::with_options(EventQueue::new(), fast_options());
        let mut interp = engine.create_interpreter().unwrap();
        assert_eq!(
            interp.load_module("love.jitsetup"),
            Err(EngineError::ModuleNotFound("love.jitsetup".into()))
        );
        interp.register_module("love.jitsetup").unwrap();
        assert!(interp.load_module("love.jitsetup").is_ok());
    }

    #[test]
    fn test_main_module_exposes_boot_module() {
        let engine = HeadlessEngine::with_options(EventQueue::new(), fast_options());
        let mut interp = engine.create_interpreter().unwrap();
        assert!(interp.load_module("love.boot").is_err());
        interp.register_module("love").unwrap();
        interp.load_module("love").unwrap();
        assert!(interp.load_module("love.boot").is_ok());
        assert_eq!(engine.journal().loaded, vec!["love", "love.boot"]);
    }

    #[test]
    fn test_field_needs_loaded_module() {
        let engine = HeadlessEngine::with_options(EventQueue::new(), fast_options());
        let mut interp = engine.create_interpreter().unwrap();
        assert_eq!(
            interp.set_module_field("love", "_exe", FlagValue::Bool(true)),
            Err(EngineError::ModuleNotLoaded("love".into()))
        );
    }

    #[test]
    fn test_boot_without_boot_module_fails() {
        let engine = HeadlessEngine::with_options(EventQueue::new(), fast_options());
        let mut interp = engine.create_interpreter().unwrap();
        assert_eq!(interp.resume_boot_sequence(), Err(EngineError::BootNotLoaded));
    }

    #[test]
    fn test_frame_limit_completes() {
        let options = HeadlessOptions {
            max_frames: Some(3),
            ..fast_options()
        };
        let engine = HeadlessEngine::with_options(EventQueue::new(), options);
        let mut interp = booted(&engine);

        assert_eq!(
            interp.resume_boot_sequence(),
            Ok(BootStep::Suspended { results: 1 })
        );
        assert_eq!(
            interp.resume_boot_sequence(),
            Ok(BootStep::Suspended { results: 1 })
        );
        assert_eq!(interp.resume_boot_sequence(), Ok(BootStep::Completed));
        assert_eq!(interp.resume_boot_sequence(), Ok(BootStep::Completed));

        let journal = engine.journal();
        assert_eq!(journal.frames, 3);
        assert_eq!(journal.exit, Some(ExitReason::FrameLimit));
    }

    #[test]
    fn test_frame_limit_counts_per_interpreter() {
        let options = HeadlessOptions {
            max_frames: Some(3),
            ..fast_options()
        };
        let engine = HeadlessEngine::with_options(EventQueue::new(), options);

        for _ in 0..2 {
            let mut interp = booted(&engine);
            let mut steps = 0;
            while interp.resume_boot_sequence() != Ok(BootStep::Completed) {
                steps += 1;
                assert!(steps < 10, "frame limit never reached");
            }
            assert_eq!(steps, 2);
            interp.close();
        }

        let journal = engine.journal();
        assert_eq!(journal.frames, 6);
        assert_eq!(journal.interpreters_created, 2);
    }

    #[test]
    fn test_options_follow_configured_modules() {
        let config = FragmentConfig::from_toml_str(
            "[modules]\nsetup = \"game.setup\"\nmain = \"game\"\nboot = \"game.boot\"\n",
        )
        .unwrap();
        let options = HeadlessOptions::from_config(&config);
        assert_eq!(options.main_module, "game");
        assert_eq!(options.boot_module, "game.boot");
        assert_eq!(options.max_frames, None);

        let engine = HeadlessEngine::with_options(EventQueue::new(), options);
        let mut interp = engine.create_interpreter().unwrap();
        interp.register_module("game").unwrap();
        interp.load_module("game").unwrap();
        assert!(interp.load_module("game.boot").is_ok());
        assert!(interp.resume_boot_sequence().is_ok());
    }

    #[test]
    fn test_minimize_stops_frames_until_restore() {
        let queue = EventQueue::new();
        let engine = HeadlessEngine::with_options(queue.clone(), fast_options());
        let mut interp = booted(&engine);

        queue.post(EngineEvent::new(EventKind::WindowMinimized, 1));
        assert_eq!(
            interp.resume_boot_sequence(),
            Ok(BootStep::Suspended { results: 0 })
        );
        assert_eq!(
            interp.resume_boot_sequence(),
            Ok(BootStep::Suspended { results: 0 })
        );
        assert_eq!(engine.journal().frames, 0);

        queue.post(EngineEvent::new(EventKind::WindowRestored, 1));
        assert_eq!(
            interp.resume_boot_sequence(),
            Ok(BootStep::Suspended { results: 1 })
        );
        assert_eq!(engine.journal().frames, 1);
    }

    #[test]
    fn test_quit_event_completes() {
        let queue = EventQueue::new();
        let engine = HeadlessEngine::with_options(queue.clone(), fast_options());
        let mut interp = booted(&engine);

        queue.post(EngineEvent::new(EventKind::Quit, 1));
        assert_eq!(interp.resume_boot_sequence(), Ok(BootStep::Completed));
        interp.close();

        let journal = engine.journal();
        assert_eq!(journal.exit, Some(ExitReason::QuitEvent));
        assert_eq!(journal.interpreters_closed, 1);
        assert_eq!(journal.events.last().map(|e| e.kind), Some(EventKind::Quit));
    }

    #[test]
    fn test_fail_on_load() {
        let options = HeadlessOptions {
            fail_on_load: Some("love".into()),
            ..fast_options()
        };
        let engine = HeadlessEngine::with_options(EventQueue::new(), options);
        let mut interp = engine.create_interpreter().unwrap();
        interp.register_module("love").unwrap();
        assert!(matches!(
            interp.load_module("love"),
            Err(EngineError::Script { .. })
        ));
    }
}
