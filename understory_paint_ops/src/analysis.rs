// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Conservative bounds, visibility and cost analysis.

use crate::flags::{PaintFlags, PaintStyle, PathEffect};
use crate::geometry::{Affine, RectF};
use crate::ops::PaintOp;
use kurbo::Cap;

/// Paths smaller than this in both dimensions are filled by a fast
/// anti-aliasing path even when concave.
const FAST_FILL_PATH_EXTENT: f32 = 64.0;

/// Local bounds of a draw op, or `None` if the op has no defined bound.
///
/// Stroked geometry is outset by the stroke's reach. `None` means callers
/// must assume the op may cover the whole clip: this is the case for
/// non-drawing ops, [`DrawColorOp`](crate::ops::DrawColorOp) and nested
/// buffers.
pub fn op_bounds(op: &PaintOp) -> Option<RectF> {
    let with_stroke = |rect: RectF, flags: &PaintFlags| rect.sorted().outset(flags.stroke_outset());
    match op {
        PaintOp::DrawRect(op) => Some(with_stroke(op.rect, &op.flags)),
        PaintOp::DrawIRect(op) => Some(with_stroke(op.rect.to_rect(), &op.flags)),
        PaintOp::DrawOval(op) => Some(with_stroke(op.oval, &op.flags)),
        PaintOp::DrawRRect(op) => Some(with_stroke(op.rrect.rect, &op.flags)),
        PaintOp::DrawDRRect(op) => Some(with_stroke(op.outer.rect, &op.flags)),
        PaintOp::DrawLine(op) => {
            // Lines are always stroked, even with a fill style.
            let reach = (op.flags.stroke_width * 0.5).max(op.flags.stroke_outset());
            Some(RectF::from_points(op.p0, op.p1).outset(reach))
        }
        PaintOp::DrawPath(op) => op
            .path
            .bounds()
            .map(|rect| with_stroke(rect, &op.flags)),
        PaintOp::DrawImage(op) => Some(op.image.rect_at(op.left, op.top)),
        PaintOp::DrawImageRect(op) => Some(op.dst.sorted()),
        PaintOp::DrawTextRun(op) => Some(with_stroke(op.run.bounds.offset(op.x, op.y), &op.flags)),
        PaintOp::DrawAnimation(op) => Some(op.dst.sorted()),
        _ => None,
    }
}

/// Returns `true` if `op` cannot touch any pixel inside `device_clip`.
///
/// The op's bounds are mapped through `transform` and outset by one device
/// pixel to cover anti-aliasing before testing them against the clip. Ops
/// without bounds, and ops that do not draw, are never rejected. Bounds that
/// are not finite after mapping are rejected.
pub fn quick_reject(op: &PaintOp, transform: &Affine, device_clip: RectF) -> bool {
    if !op.is_draw() {
        return false;
    }
    let Some(local) = op_bounds(op) else {
        return false;
    };
    if !local.is_finite() {
        return true;
    }
    let mapped = RectF::from_kurbo(transform.transform_rect_bbox(local.to_kurbo())).outset(1.0);
    if !mapped.is_finite() || device_clip.is_empty() {
        return true;
    }
    let overlaps = mapped.x0 < device_clip.x1
        && device_clip.x0 < mapped.x1
        && mapped.y0 < device_clip.y1
        && device_clip.y0 < mapped.y1;
    !overlaps
}

/// Per-buffer analysis, accumulated once per op at append time.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct OpStats {
    /// Ops likely to hit a slow rasterization path, including nested buffers.
    pub slow_paths: usize,
    /// Draw ops, including those in nested buffers.
    pub draw_ops: usize,
    /// Ops that reference an image, including animation image overrides.
    pub images: usize,
    /// Image references without attached pixels, which need decoding at playback.
    pub undecoded_images: usize,
    /// Nested buffers referenced, recursively.
    pub records: usize,
    /// Layers pushed by save-layer ops.
    pub save_layers: usize,
    /// Draws and clips that opted out of anti-aliasing.
    pub non_aa_ops: usize,
    /// Glyph runs.
    pub text_runs: usize,
    /// Ops held by nested buffers, recursively.
    pub nested_ops: usize,
}

impl OpStats {
    /// Ops that depend on external resources: undecoded images and nested buffers.
    pub fn resource_heavy_ops(&self) -> usize {
        self.undecoded_images + self.records
    }

    /// Returns `true` if any op is expected to rasterize slowly.
    pub fn has_slow_paths(&self) -> bool {
        self.slow_paths > 0
    }

    pub(crate) fn record(&mut self, op: &PaintOp) {
        self.slow_paths += slow_paths(op);
        if op.is_draw() {
            self.draw_ops += 1;
        }
        match op {
            PaintOp::DrawImage(op) => self.count_image(op.image.is_decoded()),
            PaintOp::DrawImageRect(op) => self.count_image(op.image.is_decoded()),
            PaintOp::DrawAnimation(op) => {
                for image in op.overrides.images.values() {
                    self.count_image(image.is_decoded());
                }
            }
            PaintOp::DrawRecord(op) => {
                let nested = op.record.stats();
                self.records += 1 + nested.records;
                self.slow_paths += nested.slow_paths;
                self.draw_ops += nested.draw_ops;
                self.images += nested.images;
                self.undecoded_images += nested.undecoded_images;
                self.save_layers += nested.save_layers;
                self.non_aa_ops += nested.non_aa_ops;
                self.text_runs += nested.text_runs;
                self.nested_ops += op.record.total_op_count();
            }
            PaintOp::SaveLayer(_) | PaintOp::SaveLayerAlpha(_) => self.save_layers += 1,
            PaintOp::DrawTextRun(_) => self.text_runs += 1,
            _ => {}
        }
        if is_non_aa(op) {
            self.non_aa_ops += 1;
        }
    }

    fn count_image(&mut self, decoded: bool) {
        self.images += 1;
        if !decoded {
            self.undecoded_images += 1;
        }
    }
}

fn is_non_aa(op: &PaintOp) -> bool {
    match op {
        PaintOp::ClipPath(op) => !op.antialias,
        PaintOp::ClipRRect(op) => !op.antialias,
        PaintOp::DrawPath(_)
        | PaintOp::DrawLine(_)
        | PaintOp::DrawOval(_)
        | PaintOp::DrawRRect(_)
        | PaintOp::DrawDRRect(_) => op.flags().is_some_and(|flags| !flags.antialias),
        _ => false,
    }
}

fn is_two_interval_dash(flags: &PaintFlags) -> bool {
    matches!(&flags.path_effect, Some(PathEffect::Dash { intervals, .. }) if intervals.len() == 2)
}

/// Number of slow rasterization paths `op` is expected to take.
///
/// Path effects are slow wherever they appear, except on lines with a
/// two-interval dash and non-round caps, which rasterizers special-case.
/// Anti-aliased concave paths are slow unless they are hairline strokes or
/// small fills. Anti-aliased concave clips are slow.
fn slow_paths(op: &PaintOp) -> usize {
    let from_flags = op
        .flags()
        .map_or(0, |flags| usize::from(flags.path_effect.is_some()));
    match op {
        PaintOp::DrawLine(op) => {
            if op.flags.cap != Cap::Round && is_two_interval_dash(&op.flags) {
                0
            } else {
                from_flags
            }
        }
        PaintOp::DrawPath(op) => {
            let flags = &op.flags;
            if !flags.antialias || op.path.is_convex() {
                return from_flags;
            }
            let hairline = flags.style == PaintStyle::Stroke && flags.stroke_width == 0.0;
            let small_fill = flags.style == PaintStyle::Fill
                && op.path.bounds().is_some_and(|b| {
                    b.width() < FAST_FILL_PATH_EXTENT && b.height() < FAST_FILL_PATH_EXTENT
                });
            if hairline || small_fill {
                from_flags
            } else {
                from_flags + 1
            }
        }
        PaintOp::ClipPath(op) => usize::from(op.antialias && !op.path.is_convex()),
        _ => from_flags,
    }
}
