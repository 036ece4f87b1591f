// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Paint attributes shared by attribute-bearing ops.

use kurbo::{Cap, Join};
use peniko::Color;
use smallvec::SmallVec;

wire_enum! {
    /// How a shape is painted.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub enum PaintStyle {
        /// Fill the interior of the shape.
        #[default]
        Fill = 0,
        /// Stroke the outline of the shape.
        Stroke = 1,
        /// Fill the interior and stroke the outline.
        StrokeAndFill = 2,
    }
}

wire_enum! {
    /// Blend mode used when compositing a draw into its destination.
    ///
    /// The first group is Porter–Duff compositing, followed by separable and
    /// non-separable blend modes.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub enum BlendMode {
        /// Clear the destination.
        Clear = 0,
        /// Replace the destination with the source.
        Src = 1,
        /// Keep the destination.
        Dst = 2,
        /// Source over destination.
        #[default]
        SrcOver = 3,
        /// Destination over source.
        DstOver = 4,
        /// Source inside destination.
        SrcIn = 5,
        /// Destination inside source.
        DstIn = 6,
        /// Source outside destination.
        SrcOut = 7,
        /// Destination outside source.
        DstOut = 8,
        /// Source atop destination.
        SrcATop = 9,
        /// Destination atop source.
        DstATop = 10,
        /// Exclusive or.
        Xor = 11,
        /// Sum of source and destination.
        Plus = 12,
        /// Product of source and destination components.
        Modulate = 13,
        /// Screen.
        Screen = 14,
        /// Overlay.
        Overlay = 15,
        /// Darken.
        Darken = 16,
        /// Lighten.
        Lighten = 17,
        /// Color dodge.
        ColorDodge = 18,
        /// Color burn.
        ColorBurn = 19,
        /// Hard light.
        HardLight = 20,
        /// Soft light.
        SoftLight = 21,
        /// Difference.
        Difference = 22,
        /// Exclusion.
        Exclusion = 23,
        /// Multiply.
        Multiply = 24,
        /// Hue.
        Hue = 25,
        /// Saturation.
        Saturation = 26,
        /// Color.
        Color = 27,
        /// Luminosity.
        Luminosity = 28,
    }
}

pub(crate) const PATH_EFFECT_NONE: u8 = 0;
pub(crate) const PATH_EFFECT_DASH: u8 = 1;
pub(crate) const PATH_EFFECT_CORNER: u8 = 2;

pub(crate) fn cap_to_u8(cap: Cap) -> u8 {
    match cap {
        Cap::Butt => 0,
        Cap::Square => 1,
        Cap::Round => 2,
    }
}

pub(crate) fn cap_from_u8(value: u8) -> Option<Cap> {
    match value {
        0 => Some(Cap::Butt),
        1 => Some(Cap::Square),
        2 => Some(Cap::Round),
        _ => None,
    }
}

pub(crate) fn join_to_u8(join: Join) -> u8 {
    match join {
        Join::Miter => 0,
        Join::Round => 1,
        Join::Bevel => 2,
    }
}

pub(crate) fn join_from_u8(value: u8) -> Option<Join> {
    match value {
        0 => Some(Join::Miter),
        1 => Some(Join::Round),
        2 => Some(Join::Bevel),
        _ => None,
    }
}

/// Optional geometric effect applied to a path before it is stroked or filled.
#[derive(Clone, Debug, PartialEq)]
pub enum PathEffect {
    /// Dash the outline with alternating on/off intervals.
    Dash {
        /// On/off lengths; must contain an even, non-zero number of entries.
        intervals: SmallVec<[f32; 4]>,
        /// Offset into the dash pattern at the start of each contour.
        phase: f32,
    },
    /// Round sharp corners with the given radius.
    Corner {
        /// Corner radius in local units.
        radius: f32,
    },
}

impl PathEffect {
    /// Create a dash effect.
    pub fn dash(intervals: &[f32], phase: f32) -> Self {
        Self::Dash {
            intervals: SmallVec::from_slice(intervals),
            phase,
        }
    }

    /// Returns `true` if the effect parameters are well formed.
    pub fn is_valid(&self, max_dash_intervals: usize) -> bool {
        match self {
            Self::Dash { intervals, phase } => {
                let count_ok = !intervals.is_empty()
                    && intervals.len() % 2 == 0
                    && intervals.len() <= max_dash_intervals;
                let values_ok = intervals.iter().all(|v| v.is_finite() && *v >= 0.0);
                let sum: f32 = intervals.iter().sum();
                count_ok && values_ok && sum > 0.0 && sum.is_finite() && phase.is_finite()
            }
            Self::Corner { radius } => radius.is_finite() && *radius > 0.0,
        }
    }
}

/// Paint attributes: how an attribute-bearing op colors its geometry.
#[derive(Clone, Debug, PartialEq)]
pub struct PaintFlags {
    /// Source color.
    pub color: Color,
    /// Blend mode used when compositing.
    pub blend_mode: BlendMode,
    /// Fill, stroke, or both.
    pub style: PaintStyle,
    /// Stroke width; zero means a hairline.
    pub stroke_width: f32,
    /// Miter limit for [`Join::Miter`] joins.
    pub miter_limit: f32,
    /// Stroke cap.
    pub cap: Cap,
    /// Stroke join.
    pub join: Join,
    /// Whether edges are anti-aliased.
    pub antialias: bool,
    /// Optional path effect.
    pub path_effect: Option<PathEffect>,
}

impl Default for PaintFlags {
    fn default() -> Self {
        Self {
            color: Color::BLACK,
            blend_mode: BlendMode::SrcOver,
            style: PaintStyle::Fill,
            stroke_width: 0.0,
            miter_limit: 4.0,
            cap: Cap::Butt,
            join: Join::Miter,
            antialias: false,
            path_effect: None,
        }
    }
}

impl PaintFlags {
    /// Default attributes with the given color.
    pub fn from_color(color: Color) -> Self {
        Self {
            color,
            ..Self::default()
        }
    }

    /// Stroke attributes with the given color and width.
    pub fn stroke(color: Color, width: f32) -> Self {
        Self {
            color,
            style: PaintStyle::Stroke,
            stroke_width: width,
            ..Self::default()
        }
    }

    /// Returns a copy with anti-aliasing set.
    #[must_use]
    pub fn with_antialias(mut self, antialias: bool) -> Self {
        self.antialias = antialias;
        self
    }

    /// Returns a copy with the given path effect.
    #[must_use]
    pub fn with_path_effect(mut self, effect: PathEffect) -> Self {
        self.path_effect = Some(effect);
        self
    }

    /// Alpha component of the color.
    #[inline]
    pub fn alpha(&self) -> f32 {
        self.color.components[3]
    }

    /// Returns a copy whose alpha is multiplied by `alpha`.
    #[must_use]
    pub fn with_alpha_multiplied(&self, alpha: f32) -> Self {
        let mut flags = self.clone();
        let [r, g, b, a] = self.color.components;
        flags.color = Color::new([r, g, b, a * alpha]);
        flags
    }

    /// Returns `true` if the style includes a stroke.
    #[inline]
    pub fn is_stroked(&self) -> bool {
        matches!(self.style, PaintStyle::Stroke | PaintStyle::StrokeAndFill)
    }

    /// Returns `true` if drawing with these attributes can never change the destination.
    pub fn nothing_to_draw(&self) -> bool {
        match self.blend_mode {
            BlendMode::Dst => true,
            BlendMode::SrcOver
            | BlendMode::DstOver
            | BlendMode::DstOut
            | BlendMode::SrcATop
            | BlendMode::Xor
            | BlendMode::Plus => self.alpha() == 0.0,
            _ => false,
        }
    }

    /// Returns `true` if every numeric field is in range.
    pub fn is_valid(&self, max_dash_intervals: usize) -> bool {
        let color_ok = self.color.components.iter().all(|c| c.is_finite());
        let stroke_ok = self.stroke_width.is_finite()
            && self.stroke_width >= 0.0
            && self.miter_limit.is_finite()
            && self.miter_limit >= 0.0;
        let effect_ok = self
            .path_effect
            .as_ref()
            .is_none_or(|e| e.is_valid(max_dash_intervals));
        color_ok && stroke_ok && effect_ok
    }

    /// How far stroking may extend geometry beyond its fill bounds.
    pub(crate) fn stroke_outset(&self) -> f32 {
        if !self.is_stroked() {
            return 0.0;
        }
        // Hairlines cover at most one device pixel, handled by quick-reject outset.
        let half = self.stroke_width * 0.5;
        let join_factor = match self.join {
            Join::Miter => self.miter_limit.max(1.0),
            Join::Bevel | Join::Round => 1.0,
        };
        let cap_factor = match self.cap {
            Cap::Square => core::f32::consts::SQRT_2,
            Cap::Butt | Cap::Round => 1.0,
        };
        half * join_factor.max(cap_factor)
    }
}
