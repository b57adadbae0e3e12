//! Wall-clock transport for realtime performance.

use crate::error::{Error, Result};
use std::time::{Duration, Instant};

/// Lowest and highest tempo the clock accepts.
pub const BPM_RANGE: (f64, f64) = (1.0, 999.0);

/// Converts between instants and performance beats.
///
/// Beat 0 falls on the start instant; the tempo is fixed for the clock's
/// lifetime so every thread sharing it agrees on where each beat lands.
#[derive(Clone, Debug)]
pub struct TransportClock {
    bpm: f64,
    start: Instant,
}

impl Default for TransportClock {
    fn default() -> Self {
        Self::new(120.0)
    }
}

impl TransportClock {
    /// Create a clock at beat 0, starting now.
    pub fn new(bpm: f64) -> Self {
        Self::starting_at(bpm, Instant::now())
    }

    pub fn starting_at(bpm: f64, start: Instant) -> Self {
        Self {
            bpm: bpm.clamp(BPM_RANGE.0, BPM_RANGE.1),
            start,
        }
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn seconds_per_beat(&self) -> f64 {
        60.0 / self.bpm
    }

    /// Beat position at `time`. Instants before the start read as beat 0.
    pub fn beat_at(&self, time: Instant) -> f64 {
        if time <= self.start {
            return 0.0;
        }
        time.duration_since(self.start).as_secs_f64() / self.seconds_per_beat()
    }

    /// Instant at which `beat` falls. Negative beats map to the start.
    ///
    /// Fails for beats too far out for the platform's clock.
    pub fn instant_of(&self, beat: f64) -> Result<Instant> {
        let seconds = beat.max(0.0) * self.seconds_per_beat();
        Duration::try_from_secs_f64(seconds)
            .ok()
            .and_then(|offset| self.start.checked_add(offset))
            .ok_or_else(|| {
                Error::Performer(format!(
                    "beat {} is out of range for a clock at {} bpm",
                    beat, self.bpm
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_beat_calculation() {
        let start = Instant::now();
        let clock = TransportClock::starting_at(120.0, start);
        // At 120 BPM one beat is half a second
        let beat = clock.beat_at(start + Duration::from_millis(500));
        assert!((beat - 1.0).abs() < 1e-9);
        assert_eq!(clock.beat_at(start), 0.0);
    }

    #[test]
    fn test_instant_round_trip() {
        let start = Instant::now();
        let clock = TransportClock::starting_at(90.0, start);
        let at = clock.instant_of(3.0).unwrap();
        assert!((clock.beat_at(at) - 3.0).abs() < 1e-6);
        assert_eq!(clock.instant_of(-2.0).unwrap(), start);
    }

    #[test]
    fn test_bpm_is_clamped() {
        assert_eq!(TransportClock::new(0.0).bpm(), 1.0);
        assert_eq!(TransportClock::new(5000.0).bpm(), 999.0);
    }

    #[test]
    fn test_far_beats_are_errors() {
        let clock = TransportClock::new(1.0);
        for beat in [1e20, f64::INFINITY, f64::MAX] {
            assert!(
                matches!(clock.instant_of(beat), Err(Error::Performer(_))),
                "{beat}"
            );
        }
    }
}
