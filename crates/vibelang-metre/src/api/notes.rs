//! Note, sample and rest placement for Rhai scripts.
//!
//! Every placement defaults to one note at the beat level:
//!
//! ```rhai
//! bar(|| {
//!     add_note("C4");              // one beat
//!     add_note("E4", 1, 1);        // one division below the beat
//!     add_sample("bd_haus", 0, 2, #{ amp: 0.8 });
//!     add_quaver("G4");
//!     add_rest();
//! });
//! ```

use super::helpers::{note_name, sound_options};
use super::require_performer;
use crate::rational::RationalDuration;
use crate::schedule::{self, NoteValue};
use rhai::{Dynamic, Engine, EvalAltResult, Map};

type ScriptResult<T> = Result<T, Box<EvalAltResult>>;

/// Register placement functions with the Rhai engine.
pub fn register(engine: &mut Engine) {
    engine.register_fn("add_note", |note: Dynamic| add_note(note, 0, 1, Map::new()));
    engine.register_fn("add_note", |note: Dynamic, level: i64| {
        add_note(note, level, 1, Map::new())
    });
    engine.register_fn("add_note", |note: Dynamic, level: i64, duration: i64| {
        add_note(note, level, duration, Map::new())
    });
    engine.register_fn("add_note", add_note);

    engine.register_fn("add_sample", |name: Dynamic| add_sample(name, 0, 1, Map::new()));
    engine.register_fn("add_sample", |name: Dynamic, level: i64| {
        add_sample(name, level, 1, Map::new())
    });
    engine.register_fn("add_sample", |name: Dynamic, level: i64, duration: i64| {
        add_sample(name, level, duration, Map::new())
    });
    engine.register_fn("add_sample", add_sample);

    engine.register_fn("add_rest", || add_rest(0, 1));
    engine.register_fn("add_rest", |level: i64| add_rest(level, 1));
    engine.register_fn("add_rest", add_rest);

    for value in NoteValue::ALL {
        for name in [value.us_name(), value.british_name()] {
            let name = format!("add_{}", name);
            engine.register_fn(name.as_str(), move |note: Dynamic| {
                add_note_value(note, value, Map::new())
            });
            engine.register_fn(name.as_str(), move |note: Dynamic, opts: Map| {
                add_note_value(note, value, opts)
            });
        }
    }
}

/// Play a note for `duration` notes of `level`. Returns the quarter lengths
/// it took up.
pub fn add_note(
    note: Dynamic,
    level: i64,
    duration: i64,
    opts: Map,
) -> ScriptResult<RationalDuration> {
    let performer = require_performer()?;
    let note = note_name(&note)?;
    let opts = sound_options(&opts)?;
    Ok(schedule::add_note(
        performer.as_ref(),
        &note,
        level,
        duration,
        &opts,
    )?)
}

pub fn add_sample(
    name: Dynamic,
    level: i64,
    duration: i64,
    opts: Map,
) -> ScriptResult<RationalDuration> {
    let performer = require_performer()?;
    let name = note_name(&name)?;
    let opts = sound_options(&opts)?;
    Ok(schedule::add_sample(
        performer.as_ref(),
        &name,
        level,
        duration,
        &opts,
    )?)
}

pub fn add_rest(level: i64, duration: i64) -> ScriptResult<RationalDuration> {
    let performer = require_performer()?;
    Ok(schedule::add_rest(performer.as_ref(), level, duration)?)
}

fn add_note_value(note: Dynamic, value: NoteValue, opts: Map) -> ScriptResult<RationalDuration> {
    let performer = require_performer()?;
    let note = note_name(&note)?;
    let opts = sound_options(&opts)?;
    Ok(schedule::add_note_value(
        performer.as_ref(),
        &note,
        value,
        &opts,
    )?)
}

#[cfg(test)]
mod tests {
    use crate::api::{create_engine, init_api};
    use crate::performer::{Performer, Sound, VirtualPerformer};
    use std::sync::Arc;

    fn setup() -> (Arc<VirtualPerformer>, rhai::Engine) {
        let performer = Arc::new(VirtualPerformer::new());
        init_api(performer.clone());
        (performer, create_engine())
    }

    #[test]
    fn test_shorthands_in_both_spellings() {
        let (performer, engine) = setup();
        engine
            .run(
                r#"
                use_metre("4/4");
                bar(|| {
                    add_crotchet("C4");
                    add_8th("D4");
                    add_quaver("E4", #{ amp: 0.25 });
                    add_half("F4");
                });
                bar(|| add_semibreve(67));
                "#,
            )
            .unwrap();

        let beats: Vec<f64> = performer.events().iter().map(|e| e.beat).collect();
        assert_eq!(beats, vec![0.0, 1.0, 1.5, 2.0, 4.0]);
        let events = performer.events();
        assert_eq!(events[2].options.get("amp"), Some(&0.25));
        assert_eq!(events[4].sound, Sound::Note("67".to_string()));
        assert!((performer.current_beat() - 8.0).abs() < 1e-12);
    }

    #[test]
    fn test_default_arguments() {
        let (performer, engine) = setup();
        let used: String = engine
            .eval(
                r#"
                use_metre("3/4");
                let used = [];
                bar(|| {
                    used.push(add_note("C4").to_string());
                    used.push(add_sample(":elec_blip", 1).to_string());
                    used.push(add_rest(1).to_string());
                    used.push(add_note("C4", 2, 2, #{ release: 1 }).to_string());
                });
                used.reduce(|sum, x| sum + " " + x, "")
                "#,
            )
            .unwrap();
        assert_eq!(used.trim(), "1 1/2 1/2 1/2");

        let events = performer.events();
        assert_eq!(events.len(), 3);
        assert_eq!(events[1].sound, Sound::Sample("elec_blip".to_string()));
        assert_eq!(events[2].beat, 2.0);
        assert_eq!(events[2].options.get("release"), Some(&1.0));
    }

    #[test]
    fn test_bad_option_value() {
        let (_, engine) = setup();
        let err = engine
            .run(
                r#"
                use_metre("2/4");
                bar(|| add_note("C4", 0, 1, #{ synth: "saw" }));
                "#,
            )
            .unwrap_err();
        assert!(err.to_string().contains("must be a number"), "{err}");
    }

    #[test]
    fn test_overflow_reported() {
        let (_, engine) = setup();
        let err = engine
            .run(
                r#"
                use_metre("2/4");
                bar(|| add_whole("C4"));
                "#,
            )
            .unwrap_err();
        assert!(err.to_string().contains("Bar overflow"), "{err}");
    }
}
