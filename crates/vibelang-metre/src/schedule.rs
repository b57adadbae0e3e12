//! The scheduling façade.
//!
//! These functions are what a performance script calls. They keep the
//! thread's metre and bar in [`crate::context`] and drive a [`Performer`]
//! for sound and time. A thread moves between three states: no metre, metre
//! set, and inside a bar.

use crate::bar::Bar;
use crate::context::{self, BarGuard, MetreRestore};
use crate::error::{Error, Result};
use crate::metre::SynchronisedMetre;
use crate::performer::{Performer, Sound, SoundOptions};
use crate::rational::RationalDuration;
use crate::tree::MetreSpec;
use std::fmt;
use std::sync::Arc;

fn build_metre(
    performer: &dyn Performer,
    spec: &MetreSpec,
    style: Option<&str>,
) -> Result<Arc<SynchronisedMetre>> {
    let metre = SynchronisedMetre::new(spec, style)?
        .with_beat_scale(performer.beats_per_quarter());
    Ok(Arc::new(metre))
}

/// Set the thread's metre until changed again.
pub fn use_metre(
    performer: &dyn Performer,
    spec: &MetreSpec,
    style: Option<&str>,
) -> Result<Arc<SynchronisedMetre>> {
    let metre = build_metre(performer, spec, style)?;
    log::debug!("[METRE] use_metre {}", metre);
    context::set_current_metre(Some(Arc::clone(&metre)));
    Ok(metre)
}

/// Run `block` under a metre, then put the previous metre back.
///
/// The previous metre is restored however `block` exits.
pub fn with_metre<T, E, F>(
    performer: &dyn Performer,
    spec: &MetreSpec,
    style: Option<&str>,
    block: F,
) -> std::result::Result<T, E>
where
    E: From<Error>,
    F: FnOnce() -> std::result::Result<T, E>,
{
    let metre = build_metre(performer, spec, style)?;
    log::debug!("[METRE] with_metre {}", metre);
    let _restore = MetreRestore::install(metre);
    block()
}

/// Fill one bar of the current metre.
///
/// When `block` succeeds, sleeps for whatever part of the bar it left
/// empty. The bar slot is cleared on every exit.
pub fn bar<T, E, F>(performer: &dyn Performer, block: F) -> std::result::Result<T, E>
where
    E: From<Error>,
    F: FnOnce() -> std::result::Result<T, E>,
{
    let metre = context::current_metre().ok_or(Error::NoMetreDefined)?;
    let guard = BarGuard::open(Bar::new(Arc::clone(metre.tree())), Arc::clone(&metre))?;
    log::debug!("[BAR] open in {} at beat {:.3}", metre, performer.current_beat());

    let value = block()?;

    if let Some(open) = guard.close() {
        let remaining = open.bar.remaining_quarter_lengths();
        log::debug!("[BAR] close with {} ql remaining", remaining);
        performer.sleep(open.metre.quarter_length_to_beat(&remaining))?;
    }
    Ok(value)
}

fn place(
    performer: &dyn Performer,
    caller: &'static str,
    sound: Option<Sound>,
    level: i64,
    duration: i64,
    opts: &SoundOptions,
) -> Result<RationalDuration> {
    let (offset, length, metre) = context::with_open_bar(|open| {
        let offset = open.bar.current_offset().clone();
        open.bar
            .add_note(level, duration)
            .map(|length| (offset, length, Arc::clone(&open.metre)))
    })
    .ok_or(Error::NotInBar(caller))??;

    if let Some(sound) = sound {
        let shift = metre.quarter_length_to_beat(&metre.get_timing(&offset));
        log::debug!(
            "[BAR] {} at {} for {} ql, shift {:+.3}",
            sound,
            offset,
            length,
            shift
        );
        performer.time_warp(shift, &mut || match &sound {
            Sound::Note(note) => performer.play(note, opts),
            Sound::Sample(name) => performer.sample(name, opts),
        })?;
    } else {
        log::debug!("[BAR] rest at {} for {} ql", offset, length);
    }

    performer.sleep(metre.quarter_length_to_beat(&length))?;
    Ok(length)
}

/// Play `note` at the bar cursor for `duration` notes of `level`.
pub fn add_note(
    performer: &dyn Performer,
    note: &str,
    level: i64,
    duration: i64,
    opts: &SoundOptions,
) -> Result<RationalDuration> {
    place(
        performer,
        "add_note",
        Some(Sound::Note(note.to_string())),
        level,
        duration,
        opts,
    )
}

pub fn add_sample(
    performer: &dyn Performer,
    name: &str,
    level: i64,
    duration: i64,
    opts: &SoundOptions,
) -> Result<RationalDuration> {
    place(
        performer,
        "add_sample",
        Some(Sound::Sample(name.to_string())),
        level,
        duration,
        opts,
    )
}

/// Advance the cursor without sound.
pub fn add_rest(performer: &dyn Performer, level: i64, duration: i64) -> Result<RationalDuration> {
    place(
        performer,
        "add_rest",
        None,
        level,
        duration,
        &SoundOptions::new(),
    )
}

/// Fixed note lengths. Beat level and above assume a simple metre.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NoteValue {
    Whole,
    HalfDotted,
    Half,
    QuarterDotted,
    Quarter,
    EighthDotted,
    Eighth,
    Sixteenth,
}

impl NoteValue {
    pub const ALL: [NoteValue; 8] = [
        NoteValue::Whole,
        NoteValue::HalfDotted,
        NoteValue::Half,
        NoteValue::QuarterDotted,
        NoteValue::Quarter,
        NoteValue::EighthDotted,
        NoteValue::Eighth,
        NoteValue::Sixteenth,
    ];

    /// `(level, duration)` passed to `add_note`.
    pub fn level_and_duration(&self) -> (i64, i64) {
        match self {
            NoteValue::Whole => (0, 4),
            NoteValue::HalfDotted => (0, 3),
            NoteValue::Half => (0, 2),
            NoteValue::QuarterDotted => (1, 3),
            NoteValue::Quarter => (0, 1),
            NoteValue::EighthDotted => (2, 3),
            NoteValue::Eighth => (1, 1),
            NoteValue::Sixteenth => (2, 1),
        }
    }

    pub fn us_name(&self) -> &'static str {
        match self {
            NoteValue::Whole => "whole",
            NoteValue::HalfDotted => "half_d",
            NoteValue::Half => "half",
            NoteValue::QuarterDotted => "quarter_d",
            NoteValue::Quarter => "quarter",
            NoteValue::EighthDotted => "8th_d",
            NoteValue::Eighth => "8th",
            NoteValue::Sixteenth => "16th",
        }
    }

    /// Look up a value by its US or British name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|value| value.us_name() == name || value.british_name() == name)
    }

    pub fn british_name(&self) -> &'static str {
        match self {
            NoteValue::Whole => "semibreve",
            NoteValue::HalfDotted => "minim_d",
            NoteValue::Half => "minim",
            NoteValue::QuarterDotted => "crotchet_d",
            NoteValue::Quarter => "crotchet",
            NoteValue::EighthDotted => "quaver_d",
            NoteValue::Eighth => "quaver",
            NoteValue::Sixteenth => "semiquaver",
        }
    }
}

impl fmt::Display for NoteValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.us_name())
    }
}

pub fn add_note_value(
    performer: &dyn Performer,
    note: &str,
    value: NoteValue,
    opts: &SoundOptions,
) -> Result<RationalDuration> {
    let (level, duration) = value.level_and_duration();
    add_note(performer, note, level, duration, opts)
}

/// Sleep until the next downbeat of the current metre's shared grid.
///
/// Returns the beats slept; zero when already on a downbeat.
pub fn wait_for_downbeat(performer: &dyn Performer) -> Result<f64> {
    if context::in_bar() {
        return Err(Error::BlockMisuse(
            "wait_for_downbeat cannot be used inside a bar".to_string(),
        ));
    }
    let metre = context::current_metre().ok_or(Error::NoMetreDefined)?;
    let wait = metre.beats_until_downbeat(performer.current_beat());
    if wait > 0.0 {
        log::debug!("[METRE] waiting {:.3} beats for the {} downbeat", wait, metre.key());
        performer.sleep(wait)?;
    }
    Ok(wait)
}

pub fn current_metre() -> Option<Arc<SynchronisedMetre>> {
    context::current_metre()
}

pub fn in_bar() -> bool {
    context::in_bar()
}

/// Cursor of the open bar, in quarter lengths.
pub fn bar_offset() -> Option<RationalDuration> {
    context::with_open_bar(|open| open.bar.current_offset().clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::performer::VirtualPerformer;
    use crate::rational::ql;

    fn spec(s: &str) -> MetreSpec {
        s.parse().unwrap()
    }

    fn none() -> SoundOptions {
        SoundOptions::new()
    }

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[test]
    fn test_eighth_and_three_beats_then_trailing_sleep() {
        init_logging();
        let p = VirtualPerformer::new();
        use_metre(&p, &spec("4/4"), None).unwrap();

        let value: Result<()> = bar(&p, || {
            assert_eq!(add_note(&p, "C4", 1, 1, &none())?, ql(1, 2));
            assert_eq!(add_note(&p, "D4", 0, 3, &none())?, ql(3, 1));
            assert_eq!(bar_offset(), Some(ql(7, 2)));
            assert!((p.current_beat() - 3.5).abs() < 1e-12);
            Ok(())
        });
        value.unwrap();

        let events = p.events();
        let beats: Vec<f64> = events.iter().map(|e| e.beat).collect();
        assert_eq!(beats, vec![0.0, 0.5]);
        assert_eq!(events[1].sound, Sound::Note("D4".to_string()));
        assert!((p.current_beat() - 4.0).abs() < 1e-12);
        assert!(!in_bar());
    }

    #[test]
    fn test_overflow_inside_bar() {
        let p = VirtualPerformer::new();
        use_metre(&p, &spec("4/4"), None).unwrap();
        let result: Result<()> = bar(&p, || {
            add_note(&p, "C4", 0, 5, &none())?;
            Ok(())
        });
        assert!(matches!(result, Err(Error::BarOverflow { .. })));
        assert!(p.events().is_empty());
        assert_eq!(p.current_beat(), 0.0);
        assert!(!in_bar());
    }

    #[test]
    fn test_level_too_deep() {
        let p = VirtualPerformer::new();
        use_metre(&p, &spec("[[1/2,1/2],[1/2,1/2]]"), None).unwrap();
        let result: Result<()> = bar(&p, || {
            add_note(&p, "C4", 5, 1, &none())?;
            Ok(())
        });
        assert!(matches!(result, Err(Error::InvalidLevel { level: 5, .. })));
    }

    #[test]
    fn test_placement_outside_bar() {
        let p = VirtualPerformer::new();
        use_metre(&p, &spec("3/4"), None).unwrap();
        assert!(matches!(
            add_note(&p, "C4", 0, 1, &none()),
            Err(Error::NotInBar("add_note"))
        ));
        assert!(matches!(
            add_rest(&p, 0, 1),
            Err(Error::NotInBar("add_rest"))
        ));
        assert_eq!(
            Error::NotInBar("add_sample").to_string(),
            "add_sample must be called inside a bar"
        );
    }

    #[test]
    fn test_bar_without_metre() {
        let p = VirtualPerformer::new();
        let mut ran = false;
        let result: Result<()> = bar(&p, || {
            ran = true;
            Ok(())
        });
        assert!(matches!(result, Err(Error::NoMetreDefined)));
        assert!(!ran);
    }

    #[test]
    fn test_nested_bar_never_runs_inner_block() {
        let p = VirtualPerformer::new();
        use_metre(&p, &spec("2/4"), None).unwrap();
        let mut inner_ran = false;
        let result: Result<()> = bar(&p, || {
            add_note(&p, "C4", 0, 1, &none())?;
            bar(&p, || {
                inner_ran = true;
                Ok::<(), Error>(())
            })
        });
        assert!(matches!(result, Err(Error::NestedBar)));
        assert!(!inner_ran);
        assert!(!in_bar());

        // the failed outer bar does not sleep out its remainder
        assert_eq!(p.current_beat(), 1.0);
        let again: Result<()> = bar(&p, || Ok(()));
        again.unwrap();
        assert_eq!(p.current_beat(), 3.0);
    }

    #[test]
    fn test_with_metre_restores_on_success_and_error() {
        let p = VirtualPerformer::new();
        assert!(current_metre().is_none());

        let result: Result<()> = with_metre(&p, &spec("3/4"), None, || {
            assert_eq!(current_metre().unwrap().key(), "3/4");
            Ok(())
        });
        result.unwrap();
        assert!(current_metre().is_none());

        use_metre(&p, &spec("6/8"), None).unwrap();
        let result: Result<()> = with_metre(&p, &spec("4/4"), None, || {
            bar(&p, || {
                add_note(&p, "C4", 0, 9, &none())?;
                Ok(())
            })
        });
        assert!(result.is_err());
        assert_eq!(current_metre().unwrap().key(), "6/8");
        assert!(!in_bar());
    }

    #[test]
    fn test_with_metre_bad_spec_keeps_metre() {
        let p = VirtualPerformer::new();
        use_metre(&p, &spec("2/4"), None).unwrap();
        let mut ran = false;
        let result: Result<()> =
            with_metre(&p, &spec("3/4"), Some("triplet_swing_ish"), || {
                ran = true;
                Ok(())
            });
        assert!(matches!(result, Err(Error::UnknownStyle(_))));
        assert!(!ran);
        assert_eq!(current_metre().unwrap().key(), "2/4");
    }

    #[test]
    fn test_caller_errors_pass_through_blocks() {
        #[derive(Debug)]
        enum ScriptError {
            Metre(Error),
            Stopped,
        }
        impl From<Error> for ScriptError {
            fn from(e: Error) -> Self {
                ScriptError::Metre(e)
            }
        }

        let p = VirtualPerformer::new();
        let result = with_metre(&p, &spec("4/4"), None, || {
            bar(&p, || -> std::result::Result<(), ScriptError> {
                add_rest(&p, 0, 1)?;
                Err(ScriptError::Stopped)
            })
        });
        assert!(matches!(result, Err(ScriptError::Stopped)));

        let result = bar(&p, || Ok::<(), ScriptError>(()));
        assert!(matches!(result, Err(ScriptError::Metre(Error::NoMetreDefined))));
    }

    #[test]
    fn test_swing_shifts_offbeats() {
        let p = VirtualPerformer::new();
        use_metre(&p, &spec("4/4"), Some("triplet_swing")).unwrap();
        let result: Result<()> = bar(&p, || {
            for note in ["C4", "D4", "E4", "F4"] {
                add_note_value(&p, note, NoteValue::Eighth, &none())?;
            }
            add_note_value(&p, "G4", NoteValue::Half, &none())?;
            Ok(())
        });
        result.unwrap();

        let beats: Vec<f64> = p.events().iter().map(|e| e.beat).collect();
        let expected = [0.0, 0.5 + 1.0 / 6.0, 1.0, 1.5 + 1.0 / 6.0, 2.0];
        assert_eq!(beats.len(), expected.len());
        for (got, want) in beats.iter().zip(expected) {
            assert!((got - want).abs() < 1e-9, "{got} != {want}");
        }
        assert!((p.current_beat() - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_rests_and_samples() {
        let p = VirtualPerformer::new().with_beats_per_quarter(ql(1, 2));
        use_metre(&p, &spec("3/4"), None).unwrap();
        let result: Result<()> = bar(&p, || {
            add_rest(&p, 0, 1)?;
            let mut opts = none();
            opts.insert("rate".to_string(), 2.0);
            add_sample(&p, "drum_snare_hard", 1, 1, &opts)?;
            Ok(())
        });
        result.unwrap();

        let events = p.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].beat, 0.5);
        assert_eq!(events[0].options.get("rate"), Some(&2.0));
        assert!((p.current_beat() - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_note_value_names() {
        assert_eq!(NoteValue::from_name("quaver"), Some(NoteValue::Eighth));
        assert_eq!(NoteValue::from_name("8th_d"), Some(NoteValue::EighthDotted));
        assert_eq!(NoteValue::Whole.british_name(), "semibreve");
        assert_eq!(NoteValue::QuarterDotted.level_and_duration(), (1, 3));
        assert_eq!(NoteValue::from_name("breve"), None);
    }

    #[test]
    fn test_wait_for_downbeat() {
        let p = VirtualPerformer::starting_at(1.0);
        use_metre(&p, &spec("[1,1,1,1,1]"), None).unwrap();
        assert!((wait_for_downbeat(&p).unwrap() - 4.0).abs() < 1e-12);
        assert!((p.current_beat() - 5.0).abs() < 1e-12);
        assert_eq!(wait_for_downbeat(&p).unwrap(), 0.0);

        p.sleep(2.0).unwrap();
        assert!((wait_for_downbeat(&p).unwrap() - 3.0).abs() < 1e-12);
        assert!((p.current_beat() - 10.0).abs() < 1e-12);

        let inside: Result<()> = bar(&p, || {
            wait_for_downbeat(&p)?;
            Ok(())
        });
        assert!(matches!(inside, Err(Error::BlockMisuse(_))));
    }

    #[test]
    fn test_late_thread_joins_grid_in_either_order() {
        // Each thread keeps its own metre slot; joining fixes who registers first
        let late_join = |late_first: bool| {
            let straight = || {
                std::thread::spawn(|| {
                    let p = VirtualPerformer::new();
                    use_metre(&p, &spec("4/4"), None).unwrap();
                    bar(&p, || add_note(&p, "C4", 0, 4, &none())).unwrap();
                    p.events()[0].beat
                })
            };
            let late = || {
                std::thread::spawn(|| {
                    let p = VirtualPerformer::starting_at(1.5);
                    use_metre(&p, &spec("4/4"), Some("triplet_swing")).unwrap();
                    let waited = wait_for_downbeat(&p).unwrap();
                    (waited, p.current_beat())
                })
            };
            if late_first {
                let joined = late().join().unwrap();
                straight().join().unwrap();
                joined
            } else {
                straight().join().unwrap();
                late().join().unwrap()
            }
        };

        for late_first in [false, true] {
            let (waited, beat) = late_join(late_first);
            assert!((waited - 2.5).abs() < 1e-12, "late_first={late_first}");
            assert!((beat - 4.0).abs() < 1e-12, "late_first={late_first}");
        }
    }

    #[test]
    fn test_wait_for_downbeat_without_metre() {
        let p = VirtualPerformer::new();
        assert!(matches!(wait_for_downbeat(&p), Err(Error::NoMetreDefined)));
    }
}
