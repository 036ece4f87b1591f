// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Positioned glyph runs.

use alloc::vec::Vec;

use crate::geometry::{PointF, RectF};

/// A run of shaped glyphs in one font.
///
/// Shaping happens before recording; the run only carries glyph ids and
/// their positions relative to the run origin.
#[derive(Clone, Debug, PartialEq)]
pub struct TextRun {
    /// Producer-assigned font identity.
    pub font_id: u32,
    /// Font size in local units.
    pub font_size: f32,
    /// Glyph ids.
    pub glyphs: Vec<u16>,
    /// One position per glyph.
    pub positions: Vec<PointF>,
    /// Conservative ink bounds relative to the run origin.
    pub bounds: RectF,
}

impl TextRun {
    /// Number of glyphs in the run.
    pub fn len(&self) -> usize {
        self.glyphs.len()
    }

    /// Returns `true` if the run has no glyphs.
    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }

    /// Checks the run for internal consistency.
    pub(crate) fn check(&self, max_glyphs: usize) -> Result<(), &'static str> {
        if self.glyphs.len() > max_glyphs {
            return Err("too many glyphs");
        }
        if self.glyphs.len() != self.positions.len() {
            return Err("glyph and position counts differ");
        }
        if !(self.font_size.is_finite() && self.font_size >= 0.0) {
            return Err("font size out of range");
        }
        if !self.bounds.is_finite() || !self.positions.iter().all(|p| p.is_finite()) {
            return Err("non-finite glyph geometry");
        }
        Ok(())
    }
}
