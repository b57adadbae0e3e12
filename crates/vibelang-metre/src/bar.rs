//! Capacity-tracked bars.

use crate::error::{Error, Result};
use crate::rational::RationalDuration;
use crate::tree::SubdivisionTree;
use std::sync::Arc;

/// One bar being filled with notes and rests, front to back.
///
/// The tree is captured when the bar opens and never changes afterwards.
#[derive(Clone, Debug)]
pub struct Bar {
    tree: Arc<SubdivisionTree>,
    cursor: RationalDuration,
}

impl Bar {
    pub fn new(tree: Arc<SubdivisionTree>) -> Self {
        Self {
            tree,
            cursor: RationalDuration::zero(),
        }
    }

    pub fn tree(&self) -> &Arc<SubdivisionTree> {
        &self.tree
    }

    /// Place `duration` notes of `level` at the cursor and return their
    /// total length in quarter lengths.
    ///
    /// On failure the cursor does not move.
    pub fn add_note(&mut self, level: i64, duration: i64) -> Result<RationalDuration> {
        let length = self.tree.resolve(level, duration, &self.cursor)?;
        let remaining = self.remaining_quarter_lengths();
        if length > remaining {
            return Err(Error::BarOverflow {
                required: length,
                remaining,
            });
        }
        self.cursor += &length;
        log::trace!(
            "[BAR] level {} x{} -> {} ql, cursor now {}",
            level,
            duration,
            length,
            self.cursor
        );
        Ok(length)
    }

    /// Offset of the next placement from the start of the bar.
    pub fn current_offset(&self) -> &RationalDuration {
        &self.cursor
    }

    pub fn remaining_quarter_lengths(&self) -> RationalDuration {
        self.tree.root_weight() - &self.cursor
    }

    pub fn is_full(&self) -> bool {
        &self.cursor >= self.tree.root_weight()
    }
}
