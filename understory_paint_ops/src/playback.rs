// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Replaying ops against a drawing surface.

use alloc::sync::Arc;
use core::fmt;

use peniko::Color;

use crate::analysis::quick_reject;
use crate::animation::{AnimationOverrides, AnimationPayload};
use crate::buffer::PaintOpBuffer;
use crate::flags::{BlendMode, PaintFlags};
use crate::geometry::{Affine, PointF, RectF, RoundedRectF};
use crate::image::{ImageData, ImageProvider, PaintImage};
use crate::ops::{AnnotationType, ClipOp, ImageSampling, PaintOp, SrcRectConstraint};
use crate::path::PaintPath;
use crate::text::TextRun;

/// The primitives a replayed op calls into.
///
/// Implementations wrap a real renderer, or record the calls for inspection.
/// Transforms map local coordinates to device coordinates; `concat` applies a
/// matrix after the current transform (`current * matrix`).
pub trait DrawSurface {
    /// Push the transform and clip.
    fn save(&mut self);
    /// Push a compositing layer drawn with `flags` on restore.
    fn save_layer(&mut self, bounds: Option<RectF>, flags: &PaintFlags);
    /// Push a compositing layer with a uniform opacity.
    fn save_layer_alpha(&mut self, bounds: Option<RectF>, alpha: f32);
    /// Pop the most recent save or layer. Has no effect with nothing saved.
    fn restore(&mut self);
    /// Number of saves and layers currently pushed.
    fn save_count(&self) -> usize;

    /// The current transform.
    fn transform(&self) -> Affine;
    /// Replace the current transform.
    fn set_transform(&mut self, transform: Affine);
    /// Apply `matrix` after the current transform.
    fn concat(&mut self, matrix: Affine) {
        let transform = self.transform();
        self.set_transform(transform * matrix);
    }

    /// Clip to a rectangle.
    fn clip_rect(&mut self, rect: RectF, op: ClipOp, antialias: bool);
    /// Clip to a rounded rectangle.
    fn clip_rrect(&mut self, rrect: RoundedRectF, op: ClipOp, antialias: bool);
    /// Clip to a path.
    fn clip_path(&mut self, path: &PaintPath, op: ClipOp, antialias: bool);
    /// Conservative device-space bounds of the current clip, if known.
    ///
    /// Buffer replay skips draws that fall entirely outside these bounds.
    fn device_clip_bounds(&self) -> Option<RectF> {
        None
    }

    /// Fill the clip with a color.
    fn draw_color(&mut self, color: Color, mode: BlendMode);
    /// Draw a rectangle.
    fn draw_rect(&mut self, rect: RectF, flags: &PaintFlags);
    /// Draw an oval inscribed in `oval`.
    fn draw_oval(&mut self, oval: RectF, flags: &PaintFlags);
    /// Draw a rounded rectangle.
    fn draw_rrect(&mut self, rrect: RoundedRectF, flags: &PaintFlags);
    /// Draw the area between two rounded rectangles.
    fn draw_drrect(&mut self, outer: RoundedRectF, inner: RoundedRectF, flags: &PaintFlags);
    /// Draw a line segment.
    fn draw_line(&mut self, p0: PointF, p1: PointF, flags: &PaintFlags);
    /// Draw a path.
    fn draw_path(&mut self, path: &PaintPath, flags: &PaintFlags);
    /// Draw decoded pixels with their top-left corner at `(left, top)`.
    fn draw_image(
        &mut self,
        image: &ImageData,
        left: f32,
        top: f32,
        sampling: ImageSampling,
        flags: &PaintFlags,
    );
    /// Draw the `src` part of decoded pixels into `dst`.
    ///
    /// `src` is in pixel coordinates of `image`.
    fn draw_image_rect(
        &mut self,
        image: &ImageData,
        src: RectF,
        dst: RectF,
        sampling: ImageSampling,
        constraint: SrcRectConstraint,
        flags: &PaintFlags,
    );
    /// Draw a run of glyphs with its origin at `(x, y)`.
    fn draw_text_run(&mut self, run: &TextRun, x: f32, y: f32, flags: &PaintFlags);
    /// Draw a frame of an animation into `dst`.
    fn draw_animation(
        &mut self,
        animation: &AnimationPayload,
        dst: RectF,
        t: f32,
        overrides: &AnimationOverrides,
    );

    /// Attach link metadata to a rectangle. Ignored by default.
    fn annotate(&mut self, annotation_type: AnnotationType, rect: RectF, data: Option<&[u8]>) {
        let _ = (annotation_type, rect, data);
    }
    /// Tag subsequent draws with a structure node id. Ignored by default.
    fn set_node_id(&mut self, node_id: i32) {
        let _ = node_id;
    }
}

bitflags::bitflags! {
    /// Mode flags for playback.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct PlaybackFlags: u8 {
        /// Replay for analysis only: the custom-data callback is not invoked
        /// and images are not resolved; image draws become rectangles
        /// covering the image bounds.
        const IS_ANALYZING = 1 << 0;
    }
}

/// Callback invoked for [`CustomDataOp`](crate::ops::CustomDataOp) with the
/// surface and the op's id.
pub type CustomDataCallback<'a> = dyn FnMut(&mut dyn DrawSurface, u32) + 'a;

/// State threaded through replay.
pub struct PlaybackContext<'a> {
    /// Resolves images at draw time. Without a provider, only images with
    /// attached pixels are drawn.
    pub image_provider: Option<&'a dyn ImageProvider>,
    /// Invoked for custom-data ops.
    pub custom_data: Option<&'a mut CustomDataCallback<'a>>,
    /// Transform the surface had when playback started.
    ///
    /// [`SetMatrixOp`](crate::ops::SetMatrixOp) is relative to this transform.
    pub original_transform: Affine,
    /// Surface transform before the op being replayed.
    pub current_transform: Affine,
    /// Mode flags.
    pub flags: PlaybackFlags,
}

impl<'a> PlaybackContext<'a> {
    /// A context for playback that starts under `original_transform`.
    pub fn new(original_transform: Affine) -> Self {
        Self {
            image_provider: None,
            custom_data: None,
            original_transform,
            current_transform: original_transform,
            flags: PlaybackFlags::empty(),
        }
    }

    /// Resolve images through `provider`.
    pub fn with_image_provider(mut self, provider: &'a dyn ImageProvider) -> Self {
        self.image_provider = Some(provider);
        self
    }

    /// Invoke `callback` for custom-data ops.
    pub fn with_custom_data(mut self, callback: &'a mut CustomDataCallback<'a>) -> Self {
        self.custom_data = Some(callback);
        self
    }

    /// Replace the mode flags.
    pub fn with_flags(mut self, flags: PlaybackFlags) -> Self {
        self.flags = flags;
        self
    }

    fn is_analyzing(&self) -> bool {
        self.flags.contains(PlaybackFlags::IS_ANALYZING)
    }
}

impl fmt::Debug for PlaybackContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackContext")
            .field("image_provider", &self.image_provider.is_some())
            .field("custom_data", &self.custom_data.is_some())
            .field("original_transform", &self.original_transform)
            .field("current_transform", &self.current_transform)
            .field("flags", &self.flags)
            .finish()
    }
}

/// Pixels to draw for an image and their size relative to nominal.
fn resolve_image(
    image: &PaintImage,
    recorded_scale: (f32, f32),
    cx: &PlaybackContext<'_>,
) -> Option<(Arc<ImageData>, (f32, f32))> {
    match cx.image_provider {
        Some(provider) => provider
            .decode_for_transform(image, &cx.current_transform)
            .map(|decoded| (decoded.data, decoded.scale_adjustment)),
        None => image.data.clone().map(|data| (data, recorded_scale)),
    }
}

fn replay_op(
    op: &PaintOp,
    flags_override: Option<&PaintFlags>,
    surface: &mut dyn DrawSurface,
    cx: &mut PlaybackContext<'_>,
) {
    cx.current_transform = surface.transform();
    match op {
        PaintOp::Annotate(op) => {
            surface.annotate(op.annotation_type, op.rect, op.data.as_deref());
        }
        PaintOp::ClipPath(op) => surface.clip_path(&op.path, op.op, op.antialias),
        PaintOp::ClipRect(op) => surface.clip_rect(op.rect, op.op, op.antialias),
        PaintOp::ClipRRect(op) => surface.clip_rrect(op.rrect, op.op, op.antialias),
        PaintOp::Concat(op) => surface.concat(op.matrix),
        PaintOp::CustomData(op) if !cx.is_analyzing() => {
            if let Some(callback) = cx.custom_data.as_deref_mut() {
                callback(&mut *surface, op.id);
            }
        }
        PaintOp::CustomData(_) => {}
        PaintOp::DrawAnimation(op) => {
            surface.draw_animation(&op.animation, op.dst, op.t, &op.overrides);
        }
        PaintOp::DrawColor(op) => surface.draw_color(op.color, op.mode),
        PaintOp::DrawDRRect(op) => {
            surface.draw_drrect(op.outer, op.inner, flags_override.unwrap_or(&op.flags));
        }
        PaintOp::DrawImage(op) => {
            let flags = flags_override.unwrap_or(&op.flags);
            if cx.is_analyzing() {
                surface.draw_rect(op.image.rect_at(op.left, op.top), flags);
                return;
            }
            let Some((data, (sx, sy))) = resolve_image(&op.image, op.scale_adjustment, cx) else {
                tracing::trace!(id = op.image.id.0, "image not resolved, skipping draw");
                return;
            };
            if (sx, sy) == (1.0, 1.0) {
                surface.draw_image(&data, op.left, op.top, op.sampling, flags);
            } else {
                // Draw the decoded pixels at nominal size.
                surface.save();
                surface.concat(
                    Affine::translate((f64::from(op.left), f64::from(op.top)))
                        * Affine::scale_non_uniform(1.0 / f64::from(sx), 1.0 / f64::from(sy)),
                );
                surface.draw_image(&data, 0.0, 0.0, op.sampling, flags);
                surface.restore();
            }
        }
        PaintOp::DrawImageRect(op) => {
            let flags = flags_override.unwrap_or(&op.flags);
            if cx.is_analyzing() {
                surface.draw_rect(op.dst, flags);
                return;
            }
            let Some((data, (sx, sy))) = resolve_image(&op.image, op.scale_adjustment, cx) else {
                tracing::trace!(id = op.image.id.0, "image not resolved, skipping draw");
                return;
            };
            let src = RectF::new(op.src.x0 * sx, op.src.y0 * sy, op.src.x1 * sx, op.src.y1 * sy);
            surface.draw_image_rect(&data, src, op.dst, op.sampling, op.constraint, flags);
        }
        PaintOp::DrawIRect(op) => {
            surface.draw_rect(op.rect.to_rect(), flags_override.unwrap_or(&op.flags));
        }
        PaintOp::DrawLine(op) => {
            surface.draw_line(op.p0, op.p1, flags_override.unwrap_or(&op.flags));
        }
        PaintOp::DrawOval(op) => surface.draw_oval(op.oval, flags_override.unwrap_or(&op.flags)),
        PaintOp::DrawPath(op) => surface.draw_path(&op.path, flags_override.unwrap_or(&op.flags)),
        PaintOp::DrawRecord(op) => op.record.replay(surface, cx),
        PaintOp::DrawRect(op) => surface.draw_rect(op.rect, flags_override.unwrap_or(&op.flags)),
        PaintOp::DrawRRect(op) => surface.draw_rrect(op.rrect, flags_override.unwrap_or(&op.flags)),
        PaintOp::DrawTextRun(op) => {
            surface.draw_text_run(&op.run, op.x, op.y, flags_override.unwrap_or(&op.flags));
        }
        PaintOp::Noop(_) => {}
        PaintOp::Restore(_) => surface.restore(),
        PaintOp::Rotate(op) => surface.concat(op.matrix()),
        PaintOp::Save(_) => surface.save(),
        PaintOp::SaveLayer(op) => {
            surface.save_layer(op.bounds, flags_override.unwrap_or(&op.flags));
        }
        PaintOp::SaveLayerAlpha(op) => surface.save_layer_alpha(op.bounds, op.alpha),
        PaintOp::Scale(op) => surface.concat(op.matrix()),
        PaintOp::SetMatrix(op) => surface.set_transform(cx.original_transform * op.matrix),
        PaintOp::SetNodeId(op) => surface.set_node_id(op.node_id),
        PaintOp::Translate(op) => surface.concat(op.matrix()),
    }
}

impl PaintOp {
    /// Apply this op to `surface`.
    ///
    /// A draw whose image cannot be resolved is skipped. Nested buffers are
    /// replayed with the same context and without an added clip.
    pub fn replay(&self, surface: &mut dyn DrawSurface, cx: &mut PlaybackContext<'_>) {
        replay_op(self, None, surface, cx);
    }

    /// Apply this op to `surface` with `flags` in place of its own flags.
    ///
    /// # Panics
    ///
    /// Panics if this op's kind carries no paint flags.
    pub fn replay_with_flags(
        &self,
        flags: &PaintFlags,
        surface: &mut dyn DrawSurface,
        cx: &mut PlaybackContext<'_>,
    ) {
        assert!(
            self.kind().has_flags(),
            "{:?} has no paint flags to override",
            self.kind()
        );
        replay_op(self, Some(flags), surface, cx);
    }
}

impl PaintOpBuffer {
    /// Apply every op to `surface`, in recording order.
    ///
    /// Restores that would pop saves made before this call are ignored, and
    /// the surface is restored to its starting save count afterwards. When
    /// the surface reports its clip bounds, draws that fall entirely outside
    /// them are skipped.
    #[tracing::instrument(level = "trace", skip_all, fields(ops = self.op_count()))]
    pub fn replay(&self, surface: &mut dyn DrawSurface, cx: &mut PlaybackContext<'_>) {
        let start = surface.save_count();
        for op in self {
            if matches!(op, PaintOp::Restore(_)) && surface.save_count() <= start {
                continue;
            }
            let rejected = op.is_draw()
                && surface
                    .device_clip_bounds()
                    .is_some_and(|clip| quick_reject(op, &surface.transform(), clip));
            if !rejected {
                op.replay(surface, cx);
            }
        }
        while surface.save_count() > start {
            surface.restore();
        }
    }
}
