//! Rhai API for metre scheduling.
//!
//! All functions reach the performer through a thread-local set by
//! [`init_api`], so every script thread needs its own call before running.
//!
//! # Usage
//!
//! 1. Initialize the API for the thread with `init_api()`
//! 2. Build an engine with `create_engine()` (or call `register_api()`)
//! 3. Run scripts that call the registered functions

pub mod helpers;
pub mod metre;
pub mod notes;

use crate::error::Error;
use crate::performer::Performer;
use rhai::{Engine, EvalAltResult, Position};
use std::cell::RefCell;
use std::sync::Arc;

thread_local! {
    static PERFORMER: RefCell<Option<Arc<dyn Performer>>> = RefCell::new(None);
}

/// Bind `performer` to scripts run on the calling thread.
pub fn init_api(performer: Arc<dyn Performer>) {
    PERFORMER.with(|p| {
        *p.borrow_mut() = Some(performer);
    });
}

pub fn get_performer() -> Option<Arc<dyn Performer>> {
    PERFORMER.with(|p| p.borrow().clone())
}

pub fn require_performer() -> Result<Arc<dyn Performer>, Box<EvalAltResult>> {
    get_performer().ok_or_else(|| script_error("metre API not initialized. Call init_api() first."))
}

pub(crate) fn script_error(message: impl Into<String>) -> Box<EvalAltResult> {
    Box::new(EvalAltResult::ErrorRuntime(
        message.into().into(),
        Position::NONE,
    ))
}

impl From<Error> for Box<EvalAltResult> {
    fn from(err: Error) -> Self {
        script_error(err.to_string())
    }
}

pub fn register_api(engine: &mut Engine) {
    helpers::register(engine);
    metre::register(engine);
    notes::register(engine);
}

/// Create an engine with the metre API registered and script output routed
/// into the log.
pub fn create_engine() -> Engine {
    let mut engine = Engine::new();

    engine.set_max_expr_depths(1024, 1024);
    engine.set_max_call_levels(1024);

    engine.on_print(|text| {
        log::info!("[script] {}", text);
    });

    engine.on_debug(|text, source, pos| {
        let loc = match (source, pos) {
            (Some(src), pos) if !pos.is_none() => format!(" ({}:{})", src, pos),
            (Some(src), _) => format!(" ({})", src),
            (None, pos) if !pos.is_none() => format!(" ({})", pos),
            _ => String::new(),
        };
        log::debug!("[script]{} {}", loc, text);
    });

    register_api(&mut engine);

    engine
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::performer::{Performer, VirtualPerformer};

    #[test]
    fn test_uninitialized_api_errors() {
        let engine = create_engine();
        let err = engine.run(r#"use_metre("4/4");"#).unwrap_err();
        assert!(err.to_string().contains("not initialized"));
    }

    #[test]
    fn test_print_does_not_fail() {
        init_api(Arc::new(VirtualPerformer::new()));
        let engine = create_engine();
        engine.run(r#"print("hello"); debug("there");"#).unwrap();
    }

    #[test]
    fn test_demo_scripts_run() {
        let cases = [
            (include_str!("../../demos/waltz.rhai"), 12, 12.0),
            (include_str!("../../demos/drums.rhai"), 7, 11.0),
        ];
        for (source, sounds, end_beat) in cases {
            let performer = Arc::new(VirtualPerformer::new());
            init_api(performer.clone());
            create_engine().run(source).unwrap();
            assert_eq!(performer.events().len(), sounds);
            assert!((performer.current_beat() - end_beat).abs() < 1e-9);
        }

        let performer = Arc::new(VirtualPerformer::starting_at(1.5));
        init_api(performer.clone());
        create_engine()
            .run(include_str!("../../demos/swing.rhai"))
            .unwrap();
        let events = performer.events();
        assert_eq!(events.len(), 16);
        assert_eq!(events[0].beat, 4.0);
    }
}
