//! Performers carry out what the scheduler decides.
//!
//! The scheduler only computes when things happen. Producing sound and
//! suspending the timeline is delegated to a [`Performer`]:
//!
//! - [`VirtualPerformer`] advances a logical clock instantly and records every
//!   sound, for offline rendering and tests.
//! - [`RealtimePerformer`] follows a shared [`TransportClock`] and blocks the
//!   calling thread until each logical beat is reached.

use crate::clock::TransportClock;
use crate::error::{Error, Result};
use crate::rational::RationalDuration;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

/// Free-form numeric options passed through to `play`/`sample`.
pub type SoundOptions = BTreeMap<String, f64>;

/// Callback receiving every sound a [`RealtimePerformer`] emits.
pub type SoundSink = Box<dyn Fn(&ScheduledSound) + Send + Sync>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Sound {
    Note(String),
    Sample(String),
}

impl fmt::Display for Sound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sound::Note(note) => write!(f, "note {}", note),
            Sound::Sample(name) => write!(f, "sample {}", name),
        }
    }
}

/// A sound and the performance beat it was emitted at.
#[derive(Clone, Debug, PartialEq)]
pub struct ScheduledSound {
    pub beat: f64,
    pub sound: Sound,
    pub options: SoundOptions,
}

impl fmt::Display for ScheduledSound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3} {}", self.beat, self.sound)?;
        for (key, value) in &self.options {
            write!(f, " {}:{}", key, value)?;
        }
        Ok(())
    }
}

/// The collaborator the scheduler drives.
///
/// All timing arguments are in performance beats.
pub trait Performer: Send + Sync {
    fn play(&self, note: &str, opts: &SoundOptions) -> Result<()>;

    fn sample(&self, name: &str, opts: &SoundOptions) -> Result<()>;

    /// Run `body` with every sound it emits moved by `shift` beats.
    fn time_warp(&self, shift: f64, body: &mut dyn FnMut() -> Result<()>) -> Result<()>;

    /// Suspend the calling timeline for `beats`.
    fn sleep(&self, beats: f64) -> Result<()>;

    fn current_beat(&self) -> f64;

    /// Performance beats per quarter length.
    fn beats_per_quarter(&self) -> RationalDuration {
        RationalDuration::one()
    }
}

fn check_sleep(beats: f64) -> Result<()> {
    if beats.is_finite() && beats >= 0.0 {
        Ok(())
    } else {
        Err(Error::Performer(format!("cannot sleep for {} beats", beats)))
    }
}

#[derive(Debug, Default)]
struct VirtualState {
    beat: f64,
    warp: f64,
    events: Vec<ScheduledSound>,
}

/// A performer whose clock only moves when told to sleep.
#[derive(Debug)]
pub struct VirtualPerformer {
    state: Mutex<VirtualState>,
    beats_per_quarter: RationalDuration,
}

impl Default for VirtualPerformer {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualPerformer {
    pub fn new() -> Self {
        Self::starting_at(0.0)
    }

    pub fn starting_at(beat: f64) -> Self {
        Self {
            state: Mutex::new(VirtualState {
                beat,
                ..VirtualState::default()
            }),
            beats_per_quarter: RationalDuration::one(),
        }
    }

    pub fn with_beats_per_quarter(mut self, scale: RationalDuration) -> Self {
        self.beats_per_quarter = scale;
        self
    }

    /// Everything recorded so far, in emission order.
    pub fn events(&self) -> Vec<ScheduledSound> {
        self.lock().events.clone()
    }

    pub fn take_events(&self) -> Vec<ScheduledSound> {
        std::mem::take(&mut self.lock().events)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VirtualState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, sound: Sound, opts: &SoundOptions) {
        let mut state = self.lock();
        let beat = state.beat + state.warp;
        log::debug!("[VIRTUAL] {} at beat {:.3}", sound, beat);
        state.events.push(ScheduledSound {
            beat,
            sound,
            options: opts.clone(),
        });
    }
}

impl Performer for VirtualPerformer {
    fn play(&self, note: &str, opts: &SoundOptions) -> Result<()> {
        self.record(Sound::Note(note.to_string()), opts);
        Ok(())
    }

    fn sample(&self, name: &str, opts: &SoundOptions) -> Result<()> {
        self.record(Sound::Sample(name.to_string()), opts);
        Ok(())
    }

    fn time_warp(&self, shift: f64, body: &mut dyn FnMut() -> Result<()>) -> Result<()> {
        self.lock().warp += shift;
        let result = body();
        self.lock().warp -= shift;
        result
    }

    fn sleep(&self, beats: f64) -> Result<()> {
        check_sleep(beats)?;
        self.lock().beat += beats;
        Ok(())
    }

    fn current_beat(&self) -> f64 {
        self.lock().beat
    }

    fn beats_per_quarter(&self) -> RationalDuration {
        self.beats_per_quarter.clone()
    }
}

#[derive(Debug)]
struct RealtimeState {
    beat: f64,
    warp: f64,
}

/// A performer that waits on the wall clock.
///
/// Each performer keeps its own logical beat; sleeping sets the next logical
/// beat and waits until the clock reaches it, so waiting never drifts no
/// matter how long the work between sleeps takes.
pub struct RealtimePerformer {
    clock: Arc<TransportClock>,
    state: Mutex<RealtimeState>,
    sink: Option<SoundSink>,
    beats_per_quarter: RationalDuration,
}

impl RealtimePerformer {
    /// Start at whatever beat the clock reads now.
    pub fn new(clock: Arc<TransportClock>) -> Self {
        let beat = clock.beat_at(Instant::now());
        Self {
            clock,
            state: Mutex::new(RealtimeState { beat, warp: 0.0 }),
            sink: None,
            beats_per_quarter: RationalDuration::one(),
        }
    }

    pub fn with_sink(mut self, sink: SoundSink) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_beats_per_quarter(mut self, scale: RationalDuration) -> Self {
        self.beats_per_quarter = scale;
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RealtimeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, sound: Sound, opts: &SoundOptions) {
        let event = {
            let state = self.lock();
            ScheduledSound {
                beat: state.beat + state.warp,
                sound,
                options: opts.clone(),
            }
        };
        log::info!("[PLAY] {}", event);
        if let Some(sink) = &self.sink {
            sink(&event);
        }
    }
}

impl fmt::Debug for RealtimePerformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealtimePerformer")
            .field("clock", &self.clock)
            .field("state", &self.state)
            .field("has_sink", &self.sink.is_some())
            .finish()
    }
}

impl Performer for RealtimePerformer {
    fn play(&self, note: &str, opts: &SoundOptions) -> Result<()> {
        self.emit(Sound::Note(note.to_string()), opts);
        Ok(())
    }

    fn sample(&self, name: &str, opts: &SoundOptions) -> Result<()> {
        self.emit(Sound::Sample(name.to_string()), opts);
        Ok(())
    }

    fn time_warp(&self, shift: f64, body: &mut dyn FnMut() -> Result<()>) -> Result<()> {
        self.lock().warp += shift;
        let result = body();
        self.lock().warp -= shift;
        result
    }

    fn sleep(&self, beats: f64) -> Result<()> {
        check_sleep(beats)?;
        let deadline = {
            let mut state = self.lock();
            let target = state.beat + beats;
            let deadline = self.clock.instant_of(target)?;
            state.beat = target;
            deadline
        };
        let now = Instant::now();
        if deadline > now {
            std::thread::sleep(deadline - now);
        }
        Ok(())
    }

    fn current_beat(&self) -> f64 {
        self.lock().beat
    }

    fn beats_per_quarter(&self) -> RationalDuration {
        self.beats_per_quarter.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_virtual_records_with_warp() {
        let performer = VirtualPerformer::new();
        let mut opts = SoundOptions::new();
        opts.insert("amp".to_string(), 0.5);

        performer.play("C4", &opts).unwrap();
        performer.sleep(1.0).unwrap();
        performer
            .time_warp(-0.25, &mut || performer.sample("bd_haus", &SoundOptions::new()))
            .unwrap();

        let events = performer.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].beat, 0.0);
        assert_eq!(events[0].options.get("amp"), Some(&0.5));
        assert_eq!(events[1].beat, 0.75);
        assert_eq!(events[1].sound, Sound::Sample("bd_haus".to_string()));
        assert_eq!(performer.current_beat(), 1.0);
    }

    #[test]
    fn test_warp_restored_after_failure() {
        let performer = VirtualPerformer::new();
        let result = performer.time_warp(0.5, &mut || Err(Error::Performer("boom".to_string())));
        assert!(result.is_err());
        performer.play("E4", &SoundOptions::new()).unwrap();
        assert_eq!(performer.events()[0].beat, 0.0);
    }

    #[test]
    fn test_negative_sleep_rejected() {
        let performer = VirtualPerformer::starting_at(2.0);
        assert!(matches!(performer.sleep(-1.0), Err(Error::Performer(_))));
        assert!(performer.sleep(f64::NAN).is_err());
        assert_eq!(performer.current_beat(), 2.0);
    }

    #[test]
    fn test_take_events_drains() {
        let performer = VirtualPerformer::new();
        performer.play("C4", &SoundOptions::new()).unwrap();
        assert_eq!(performer.take_events().len(), 1);
        assert!(performer.events().is_empty());
    }

    #[test]
    fn test_realtime_sleep_waits_for_clock() {
        let clock = Arc::new(TransportClock::new(600.0));
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink_events = Arc::clone(&events);
        let performer = RealtimePerformer::new(Arc::clone(&clock)).with_sink(Box::new(
            move |event: &ScheduledSound| {
                sink_events.lock().unwrap().push(event.clone());
            },
        ));

        let start = Instant::now();
        let first = performer.current_beat();
        performer.play("C4", &SoundOptions::new()).unwrap();
        // 600 BPM: one beat is 100ms
        performer.sleep(1.0).unwrap();
        assert!(start.elapsed() >= Duration::from_millis(80));
        assert!((performer.current_beat() - first - 1.0).abs() < 1e-9);

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].sound, Sound::Note("C4".to_string()));
    }

    #[test]
    fn test_realtime_sleep_past_clock_range_fails() {
        let performer = RealtimePerformer::new(Arc::new(TransportClock::new(1.0)));
        let before = performer.current_beat();
        let err = performer.sleep(1e20).unwrap_err();
        assert!(matches!(err, Error::Performer(_)), "{err}");
        assert_eq!(performer.current_beat(), before);
    }
}
