// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Compact f32 geometry stored inside paint op records.
//!
//! Records keep f32 values so that they stay small in memory and on the wire.
//! Analysis converts them to `kurbo` types where f64 precision helps.

/// Affine transform type used by paint ops.
pub type Affine = kurbo::Affine;

#[allow(
    clippy::cast_possible_truncation,
    reason = "records store f32 geometry; narrowing from kurbo's f64 is intended"
)]
#[inline]
pub(crate) fn f64_to_f32(v: f64) -> f32 {
    v as f32
}

/// A point in f32 coordinates.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct PointF {
    /// X coordinate.
    pub x: f32,
    /// Y coordinate.
    pub y: f32,
}

impl PointF {
    /// Create a new point.
    #[inline]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Returns `true` if both coordinates are finite.
    #[inline]
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Convert to kurbo's point type.
    #[inline]
    pub fn to_kurbo(self) -> kurbo::Point {
        kurbo::Point::new(f64::from(self.x), f64::from(self.y))
    }
}

/// A simple axis-aligned rectangle in f32 coordinates.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct RectF {
    /// Minimum X coordinate.
    pub x0: f32,
    /// Minimum Y coordinate.
    pub y0: f32,
    /// Maximum X coordinate.
    pub x1: f32,
    /// Maximum Y coordinate.
    pub y1: f32,
}

impl RectF {
    /// The empty rectangle at the origin.
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0, 0.0);

    /// Create a new rectangle from min/max corners.
    #[inline]
    pub const fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// Create a rectangle from an origin and a size.
    #[inline]
    pub fn from_origin_size(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self::new(x, y, x + width, y + height)
    }

    /// Width of the rectangle (may be negative for unsorted rects).
    #[inline]
    pub fn width(self) -> f32 {
        self.x1 - self.x0
    }

    /// Height of the rectangle (may be negative for unsorted rects).
    #[inline]
    pub fn height(self) -> f32 {
        self.y1 - self.y0
    }

    /// Returns `true` if every coordinate is finite.
    #[inline]
    pub fn is_finite(self) -> bool {
        self.x0.is_finite() && self.y0.is_finite() && self.x1.is_finite() && self.y1.is_finite()
    }

    /// Returns `true` if the rectangle encloses no area.
    #[inline]
    pub fn is_empty(self) -> bool {
        !(self.x0 < self.x1 && self.y0 < self.y1)
    }

    /// Returns the rectangle with min/max corners swapped where needed.
    #[inline]
    pub fn sorted(self) -> Self {
        Self {
            x0: self.x0.min(self.x1),
            y0: self.y0.min(self.y1),
            x1: self.x0.max(self.x1),
            y1: self.y0.max(self.y1),
        }
    }

    /// Smallest rectangle containing both points.
    #[inline]
    pub fn from_points(a: PointF, b: PointF) -> Self {
        Self::new(a.x, a.y, b.x, b.y).sorted()
    }

    /// Returns the rectangle translated by `(dx, dy)`.
    #[inline]
    pub fn offset(self, dx: f32, dy: f32) -> Self {
        Self::new(self.x0 + dx, self.y0 + dy, self.x1 + dx, self.y1 + dy)
    }

    /// Returns the rectangle grown by `amount` on every side.
    #[inline]
    pub fn outset(self, amount: f32) -> Self {
        Self::new(
            self.x0 - amount,
            self.y0 - amount,
            self.x1 + amount,
            self.y1 + amount,
        )
    }

    /// Narrow a kurbo rectangle to f32 coordinates.
    #[inline]
    pub fn from_kurbo(r: kurbo::Rect) -> Self {
        Self::new(
            f64_to_f32(r.x0),
            f64_to_f32(r.y0),
            f64_to_f32(r.x1),
            f64_to_f32(r.y1),
        )
    }

    /// Convert to kurbo's rectangle type.
    #[inline]
    pub fn to_kurbo(self) -> kurbo::Rect {
        kurbo::Rect::new(
            f64::from(self.x0),
            f64::from(self.y0),
            f64::from(self.x1),
            f64::from(self.y1),
        )
    }
}

/// An integer rectangle, used by `DrawIRectOp`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct IRect {
    /// Minimum X coordinate.
    pub x0: i32,
    /// Minimum Y coordinate.
    pub y0: i32,
    /// Maximum X coordinate.
    pub x1: i32,
    /// Maximum Y coordinate.
    pub y1: i32,
}

impl IRect {
    /// Create a new integer rectangle from min/max corners.
    #[inline]
    pub const fn new(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// Convert to an f32 rectangle.
    #[inline]
    pub fn to_rect(self) -> RectF {
        RectF::new(
            self.x0 as f32,
            self.y0 as f32,
            self.x1 as f32,
            self.y1 as f32,
        )
    }
}

/// Corner radii for a rounded rectangle in f32 coordinates.
///
/// Radii are specified clockwise starting from the top-left corner.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct RoundedRectRadiiF {
    /// The radius of the top-left corner.
    pub top_left: f32,
    /// The radius of the top-right corner.
    pub top_right: f32,
    /// The radius of the bottom-right corner.
    pub bottom_right: f32,
    /// The radius of the bottom-left corner.
    pub bottom_left: f32,
}

impl RoundedRectRadiiF {
    /// Create radii with potentially different values per corner.
    #[inline]
    pub const fn new(top_left: f32, top_right: f32, bottom_right: f32, bottom_left: f32) -> Self {
        Self {
            top_left,
            top_right,
            bottom_right,
            bottom_left,
        }
    }

    /// Create radii with a single value for all corners.
    #[inline]
    pub const fn from_single_radius(radius: f32) -> Self {
        Self::new(radius, radius, radius, radius)
    }

    /// The radii in clockwise order starting from the top-left corner.
    #[inline]
    pub const fn as_array(self) -> [f32; 4] {
        [
            self.top_left,
            self.top_right,
            self.bottom_right,
            self.bottom_left,
        ]
    }

    /// Returns `true` if every radius is finite and non-negative.
    #[inline]
    pub fn is_valid(self) -> bool {
        self.as_array().iter().all(|r| r.is_finite() && *r >= 0.0)
    }

    /// Convert to kurbo's rounded-rect radii type.
    #[inline]
    pub fn to_kurbo(self) -> kurbo::RoundedRectRadii {
        kurbo::RoundedRectRadii::new(
            f64::from(self.top_left),
            f64::from(self.top_right),
            f64::from(self.bottom_right),
            f64::from(self.bottom_left),
        )
    }
}

impl From<f32> for RoundedRectRadiiF {
    #[inline]
    fn from(radius: f32) -> Self {
        Self::from_single_radius(radius)
    }
}

/// An axis-aligned rounded rectangle in f32 coordinates.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct RoundedRectF {
    /// The underlying axis-aligned rectangle.
    pub rect: RectF,
    /// Radii of the rounded corners.
    pub radii: RoundedRectRadiiF,
}

impl RoundedRectF {
    /// Create a new rounded rectangle from corners and radii.
    #[inline]
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32, radii: impl Into<RoundedRectRadiiF>) -> Self {
        Self {
            rect: RectF { x0, y0, x1, y1 },
            radii: radii.into(),
        }
    }

    /// Returns `true` if the rect is finite and the radii are finite and non-negative.
    #[inline]
    pub fn is_valid(self) -> bool {
        self.rect.is_finite() && self.radii.is_valid()
    }

    /// Convert to kurbo's rounded-rect type.
    #[inline]
    pub fn to_kurbo(self) -> kurbo::RoundedRect {
        kurbo::RoundedRect::new(
            f64::from(self.rect.x0),
            f64::from(self.rect.y0),
            f64::from(self.rect.x1),
            f64::from(self.rect.y1),
            self.radii.to_kurbo(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorted_swaps_inverted_corners() {
        let r = RectF::new(10.0, 8.0, 2.0, 4.0).sorted();
        assert_eq!(r, RectF::new(2.0, 4.0, 10.0, 8.0));
        assert!(!r.is_empty());
    }

    #[test]
    fn empty_and_non_finite_rects() {
        assert!(RectF::new(0.0, 0.0, 0.0, 5.0).is_empty());
        assert!(RectF::new(f32::NAN, 0.0, 1.0, 1.0).is_empty());
        assert!(!RectF::new(0.0, 0.0, f32::INFINITY, 1.0).is_finite());
    }

    #[test]
    fn radii_reject_negative_values() {
        assert!(RoundedRectRadiiF::from_single_radius(2.0).is_valid());
        assert!(!RoundedRectRadiiF::new(1.0, -1.0, 1.0, 1.0).is_valid());
        assert!(!RoundedRectF::new(0.0, 0.0, 1.0, 1.0, f32::NAN).is_valid());
    }

    #[test]
    fn irect_converts_to_rect() {
        let r = IRect::new(-2, 3, 4, 9).to_rect();
        assert_eq!(r, RectF::new(-2.0, 3.0, 4.0, 9.0));
    }
}
