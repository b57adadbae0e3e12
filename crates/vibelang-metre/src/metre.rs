//! Synchronised metres.
//!
//! A [`SynchronisedMetre`] bundles a subdivision tree, an optional
//! micro-timing style and the shared phase anchor for its spec. It converts
//! quarter lengths into performance beats and looks up the timing shift for
//! a position in the bar.

use crate::error::Result;
use crate::phase::{PhaseAnchor, PhaseRegistry};
use crate::rational::RationalDuration;
use crate::style::MicroTimingStyle;
use crate::tree::{MetreSpec, SubdivisionTree};
use std::fmt;
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct SynchronisedMetre {
    spec: MetreSpec,
    key: String,
    tree: Arc<SubdivisionTree>,
    style: Option<MicroTimingStyle>,
    beat_scale: RationalDuration,
    anchor: PhaseAnchor,
}

impl SynchronisedMetre {
    /// Build a metre bound to the process-wide phase grid.
    pub fn new(spec: &MetreSpec, style: Option<&str>) -> Result<Self> {
        Self::with_registry(spec, style, PhaseRegistry::global())
    }

    /// Build a metre bound to an explicit phase registry.
    pub fn with_registry(
        spec: &MetreSpec,
        style: Option<&str>,
        registry: &PhaseRegistry,
    ) -> Result<Self> {
        let tree = SubdivisionTree::parse(spec)?;
        let key = spec.canonical();
        let style = style.map(str::parse::<MicroTimingStyle>).transpose()?;
        if let Some(style) = style {
            style.check_compatible(&tree, &key)?;
        }
        let anchor = registry.establish(&key);

        Ok(Self {
            spec: spec.clone(),
            key,
            tree: Arc::new(tree),
            style,
            beat_scale: RationalDuration::one(),
            anchor,
        })
    }

    /// Set how many performance beats one quarter length lasts.
    ///
    /// Non-positive scales are ignored.
    pub fn with_beat_scale(mut self, scale: RationalDuration) -> Self {
        if scale.is_positive() {
            self.beat_scale = scale;
        } else {
            log::warn!("[METRE] Ignoring non-positive beat scale {}", scale);
        }
        self
    }

    pub fn spec(&self) -> &MetreSpec {
        &self.spec
    }

    /// Canonical spec string, the key of the phase grid.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn tree(&self) -> &Arc<SubdivisionTree> {
        &self.tree
    }

    pub fn style(&self) -> Option<MicroTimingStyle> {
        self.style
    }

    pub fn beat_scale(&self) -> &RationalDuration {
        &self.beat_scale
    }

    pub fn anchor(&self) -> PhaseAnchor {
        self.anchor
    }

    pub fn quarter_length_to_beat(&self, quarter_lengths: &RationalDuration) -> f64 {
        (quarter_lengths * &self.beat_scale).to_f64()
    }

    /// Micro-timing shift, in quarter lengths, for a note starting at
    /// `offset` into the bar.
    ///
    /// Every tier that has a node starting at `offset` contributes its
    /// style shift scaled by that node's length.
    pub fn get_timing(&self, offset: &RationalDuration) -> RationalDuration {
        let Some(style) = self.style else {
            return RationalDuration::zero();
        };
        self.tree
            .onsets_at(offset)
            .into_iter()
            .filter_map(|node| {
                let position = node.position.as_ref()?;
                let shift = style.timing_for(position);
                (!shift.is_zero()).then(|| &shift * &node.weight)
            })
            .sum()
    }

    /// True if both metres share a downbeat grid.
    pub fn is_phase_compatible(&self, other: &SynchronisedMetre) -> bool {
        self.key == other.key
    }

    /// Length of one bar in performance beats.
    pub fn bar_beats(&self) -> f64 {
        self.quarter_length_to_beat(self.tree.root_weight())
    }

    /// Position of `beat` within its bar on the shared grid, in beats.
    pub fn phase_at(&self, beat: f64) -> f64 {
        self.anchor.phase_at(beat, self.bar_beats())
    }

    pub fn beats_until_downbeat(&self, beat: f64) -> f64 {
        self.anchor.beats_until_downbeat(beat, self.bar_beats())
    }
}

impl PartialEq for SynchronisedMetre {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.style == other.style
    }
}

impl fmt::Display for SynchronisedMetre {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.style {
            Some(style) => write!(f, "{} ({})", self.key, style),
            None => f.write_str(&self.key),
        }
    }
}
