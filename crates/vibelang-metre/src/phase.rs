//! Shared phase grid for synchronised metres.
//!
//! Every metre's bar grid starts at the registry's timeline origin, beat 0
//! of the shared clock unless set otherwise. A thread that starts late joins
//! a grid that was already running, so threads agree on where bars begin no
//! matter which of them uses a metre first. Anchors are written once and
//! then only read.

use std::collections::HashMap;
use std::sync::{OnceLock, PoisonError, RwLock};

/// Phases closer than this to a downbeat count as being on it.
const DOWNBEAT_EPSILON: f64 = 1e-9;

static GLOBAL_REGISTRY: OnceLock<PhaseRegistry> = OnceLock::new();

/// Where a metre's bar grid starts, in performance beats.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PhaseAnchor {
    pub origin_beat: f64,
}

impl PhaseAnchor {
    /// Offset of `beat` into its bar, in `[0, bar_beats)`.
    pub fn phase_at(&self, beat: f64, bar_beats: f64) -> f64 {
        if bar_beats <= 0.0 {
            return 0.0;
        }
        let phase = (beat - self.origin_beat).rem_euclid(bar_beats);
        if bar_beats - phase < DOWNBEAT_EPSILON {
            0.0
        } else {
            phase
        }
    }

    /// Beats from `beat` to the next downbeat; zero when already on one.
    pub fn beats_until_downbeat(&self, beat: f64, bar_beats: f64) -> f64 {
        let phase = self.phase_at(beat, bar_beats);
        if phase < DOWNBEAT_EPSILON {
            0.0
        } else {
            bar_beats - phase
        }
    }
}

/// Canonical metre spec to phase anchor.
#[derive(Debug, Default)]
pub struct PhaseRegistry {
    origin_beat: f64,
    anchors: RwLock<HashMap<String, PhaseAnchor>>,
}

impl PhaseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry whose grids start at `origin_beat` instead of beat 0.
    pub fn with_origin(origin_beat: f64) -> Self {
        Self {
            origin_beat,
            anchors: RwLock::default(),
        }
    }

    pub fn origin_beat(&self) -> f64 {
        self.origin_beat
    }

    /// The process-wide registry used by [`crate::SynchronisedMetre::new`].
    pub fn global() -> &'static PhaseRegistry {
        GLOBAL_REGISTRY.get_or_init(PhaseRegistry::new)
    }

    /// Return the anchor for `key`, creating it on the timeline origin if
    /// this is the first time the spec is seen.
    pub fn establish(&self, key: &str) -> PhaseAnchor {
        if let Some(anchor) = self.anchor(key) {
            return anchor;
        }
        let mut anchors = self.anchors.write().unwrap_or_else(PoisonError::into_inner);
        *anchors.entry(key.to_string()).or_insert_with(|| {
            log::debug!(
                "[METRE] Phase for {} anchored at beat {:.3}",
                key,
                self.origin_beat
            );
            PhaseAnchor {
                origin_beat: self.origin_beat,
            }
        })
    }

    pub fn anchor(&self, key: &str) -> Option<PhaseAnchor> {
        self.anchors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .copied()
    }

    pub fn len(&self) -> usize {
        self.anchors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
