// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Understory Paint Ops Reference Surface.
//!
//! This crate provides [`RefSurface`], a small, stateful implementation of
//! [`DrawSurface`] for **call recording and state tracing**.
//!
//! It does not rasterize. Each primitive a replayed op calls is logged as an
//! [`Event`] together with a [`StateSnapshot`] of the surface at that moment,
//! so tests can assert on the exact sequence of calls, the transform each draw
//! was issued under, and the save depth and clips in effect.

#![no_std]

extern crate alloc;

use alloc::vec::Vec;

use understory_paint_ops::{
    Affine, AnimationOverrides, AnimationPayload, AnnotationType, BlendMode, ClipOp, Color,
    DrawSurface, ImageData, ImageSampling, PaintFlags, PaintPath, PointF, RectF, RoundedRectF,
    SrcRectConstraint, TextRun,
};

/// Snapshot of the surface state.
#[derive(Clone, Debug, PartialEq)]
pub struct StateSnapshot {
    /// Current transform.
    pub transform: Affine,
    /// Number of saves and layers pushed.
    pub save_depth: usize,
    /// Number of clips applied since the bottom of the stack.
    pub clip_count: usize,
    /// Device-space clip bounds, if tracked.
    pub device_clip: Option<RectF>,
    /// Structure node id set by the last `set_node_id`.
    pub node_id: Option<i32>,
}

impl Default for StateSnapshot {
    fn default() -> Self {
        Self {
            transform: Affine::IDENTITY,
            save_depth: 0,
            clip_count: 0,
            device_clip: None,
            node_id: None,
        }
    }
}

/// A state-changing call.
#[derive(Clone, Debug, PartialEq)]
pub enum StateCall {
    /// `save`.
    Save,
    /// `save_layer`.
    SaveLayer {
        /// Layer bounds hint.
        bounds: Option<RectF>,
        /// Layer flags.
        flags: PaintFlags,
    },
    /// `save_layer_alpha`.
    SaveLayerAlpha {
        /// Layer bounds hint.
        bounds: Option<RectF>,
        /// Layer opacity.
        alpha: f32,
    },
    /// `restore`, including restores with nothing saved.
    Restore,
    /// `set_transform`, or `concat` through the default method.
    SetTransform(Affine),
    /// `clip_rect`.
    ClipRect {
        /// Clip rectangle.
        rect: RectF,
        /// Combine mode.
        op: ClipOp,
        /// Anti-aliased edge.
        antialias: bool,
    },
    /// `clip_rrect`.
    ClipRRect {
        /// Clip geometry.
        rrect: RoundedRectF,
        /// Combine mode.
        op: ClipOp,
        /// Anti-aliased edge.
        antialias: bool,
    },
    /// `clip_path`.
    ClipPath {
        /// Clip geometry.
        path: PaintPath,
        /// Combine mode.
        op: ClipOp,
        /// Anti-aliased edge.
        antialias: bool,
    },
    /// `annotate`.
    Annotate {
        /// Annotation kind.
        annotation_type: AnnotationType,
        /// Annotated rectangle.
        rect: RectF,
        /// Annotation payload.
        data: Option<Vec<u8>>,
    },
    /// `set_node_id`.
    SetNodeId(i32),
}

/// A drawing call.
#[derive(Clone, Debug, PartialEq)]
pub enum DrawCall {
    /// `draw_color`.
    Color {
        /// Fill color.
        color: Color,
        /// Blend mode.
        mode: BlendMode,
    },
    /// `draw_rect`.
    Rect {
        /// Rectangle.
        rect: RectF,
        /// Paint flags.
        flags: PaintFlags,
    },
    /// `draw_oval`.
    Oval {
        /// Bounding rectangle.
        oval: RectF,
        /// Paint flags.
        flags: PaintFlags,
    },
    /// `draw_rrect`.
    RRect {
        /// Geometry.
        rrect: RoundedRectF,
        /// Paint flags.
        flags: PaintFlags,
    },
    /// `draw_drrect`.
    DRRect {
        /// Outer boundary.
        outer: RoundedRectF,
        /// Inner boundary.
        inner: RoundedRectF,
        /// Paint flags.
        flags: PaintFlags,
    },
    /// `draw_line`.
    Line {
        /// Start point.
        p0: PointF,
        /// End point.
        p1: PointF,
        /// Paint flags.
        flags: PaintFlags,
    },
    /// `draw_path`.
    Path {
        /// Geometry.
        path: PaintPath,
        /// Paint flags.
        flags: PaintFlags,
    },
    /// `draw_image`.
    Image {
        /// Decoded width in pixels.
        width: u32,
        /// Decoded height in pixels.
        height: u32,
        /// Left edge.
        left: f32,
        /// Top edge.
        top: f32,
        /// Sampling quality.
        sampling: ImageSampling,
        /// Paint flags.
        flags: PaintFlags,
    },
    /// `draw_image_rect`.
    ImageRect {
        /// Decoded width in pixels.
        width: u32,
        /// Decoded height in pixels.
        height: u32,
        /// Source rectangle in pixels.
        src: RectF,
        /// Destination rectangle.
        dst: RectF,
        /// Sampling quality.
        sampling: ImageSampling,
        /// Source constraint.
        constraint: SrcRectConstraint,
        /// Paint flags.
        flags: PaintFlags,
    },
    /// `draw_text_run`.
    TextRun {
        /// The glyph run.
        run: TextRun,
        /// Origin X.
        x: f32,
        /// Origin Y.
        y: f32,
        /// Paint flags.
        flags: PaintFlags,
    },
    /// `draw_animation`.
    Animation {
        /// Asset ids declared by the payload.
        asset_ids: Vec<u64>,
        /// Destination rectangle.
        dst: RectF,
        /// Normalized time.
        t: f32,
        /// Number of image and color overrides.
        override_count: usize,
    },
}

/// Event recorded by the reference surface.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// State call and the state after applying it.
    State {
        /// The call.
        call: StateCall,
        /// Snapshot after the call.
        state: StateSnapshot,
    },
    /// Draw call and the state it was issued under.
    Draw {
        /// The call.
        call: DrawCall,
        /// Snapshot at the time of drawing.
        state: StateSnapshot,
    },
}

/// Reference drawing surface that records every call.
///
/// Device clip tracking is off unless the surface is created with
/// [`RefSurface::with_device_clip`]. When on, intersecting rectangle clips
/// narrow the tracked bounds, and [`DrawSurface::device_clip_bounds`] reports
/// them so buffer replay can quick-reject.
#[derive(Clone, Debug, Default)]
pub struct RefSurface {
    events: Vec<Event>,
    state: StateSnapshot,
    stack: Vec<StateSnapshot>,
}

impl RefSurface {
    /// A surface with an identity transform and no clip tracking.
    pub fn new() -> Self {
        Self::default()
    }

    /// A surface whose device clip starts as `bounds`.
    pub fn with_device_clip(bounds: RectF) -> Self {
        Self {
            state: StateSnapshot {
                device_clip: Some(bounds),
                ..StateSnapshot::default()
            },
            ..Self::default()
        }
    }

    /// A surface starting under `transform`.
    pub fn with_transform(transform: Affine) -> Self {
        Self {
            state: StateSnapshot {
                transform,
                ..StateSnapshot::default()
            },
            ..Self::default()
        }
    }

    /// Recorded events, in call order.
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Recorded draw calls, in call order.
    pub fn draws(&self) -> impl Iterator<Item = &DrawCall> + '_ {
        self.events.iter().filter_map(|event| match event {
            Event::Draw { call, .. } => Some(call),
            Event::State { .. } => None,
        })
    }

    /// Current state.
    pub fn state(&self) -> &StateSnapshot {
        &self.state
    }

    /// Forget recorded events but keep the current state.
    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    fn push_state(&mut self, call: StateCall) {
        self.events.push(Event::State {
            call,
            state: self.state.clone(),
        });
    }

    fn push_draw(&mut self, call: DrawCall) {
        self.events.push(Event::Draw {
            call,
            state: self.state.clone(),
        });
    }

    fn push_save(&mut self, call: StateCall) {
        self.stack.push(self.state.clone());
        self.state.save_depth = self.stack.len();
        self.push_state(call);
    }

    fn push_clip(&mut self, call: StateCall, device_rect: Option<RectF>) {
        self.state.clip_count += 1;
        if let (Some(clip), Some(rect)) = (self.state.device_clip, device_rect) {
            let narrowed = clip.to_kurbo().intersect(rect.to_kurbo());
            self.state.device_clip = Some(RectF::from_kurbo(narrowed));
        }
        self.push_state(call);
    }
}

impl DrawSurface for RefSurface {
    fn save(&mut self) {
        self.push_save(StateCall::Save);
    }

    fn save_layer(&mut self, bounds: Option<RectF>, flags: &PaintFlags) {
        self.push_save(StateCall::SaveLayer {
            bounds,
            flags: flags.clone(),
        });
    }

    fn save_layer_alpha(&mut self, bounds: Option<RectF>, alpha: f32) {
        self.push_save(StateCall::SaveLayerAlpha { bounds, alpha });
    }

    fn restore(&mut self) {
        if let Some(saved) = self.stack.pop() {
            // The node id is not part of the save stack.
            let node_id = self.state.node_id;
            self.state = saved;
            self.state.node_id = node_id;
        }
        self.push_state(StateCall::Restore);
    }

    fn save_count(&self) -> usize {
        self.stack.len()
    }

    fn transform(&self) -> Affine {
        self.state.transform
    }

    fn set_transform(&mut self, transform: Affine) {
        self.state.transform = transform;
        self.push_state(StateCall::SetTransform(transform));
    }

    fn clip_rect(&mut self, rect: RectF, op: ClipOp, antialias: bool) {
        let device = (op == ClipOp::Intersect).then(|| {
            RectF::from_kurbo(self.state.transform.transform_rect_bbox(rect.sorted().to_kurbo()))
        });
        self.push_clip(StateCall::ClipRect { rect, op, antialias }, device);
    }

    fn clip_rrect(&mut self, rrect: RoundedRectF, op: ClipOp, antialias: bool) {
        let device = (op == ClipOp::Intersect).then(|| {
            RectF::from_kurbo(
                self.state
                    .transform
                    .transform_rect_bbox(rrect.rect.sorted().to_kurbo()),
            )
        });
        self.push_clip(StateCall::ClipRRect { rrect, op, antialias }, device);
    }

    fn clip_path(&mut self, path: &PaintPath, op: ClipOp, antialias: bool) {
        let device = match op {
            ClipOp::Intersect => path.bounds().map(|bounds| {
                RectF::from_kurbo(self.state.transform.transform_rect_bbox(bounds.to_kurbo()))
            }),
            ClipOp::Difference => None,
        };
        let call = StateCall::ClipPath {
            path: path.clone(),
            op,
            antialias,
        };
        self.push_clip(call, device);
    }

    fn device_clip_bounds(&self) -> Option<RectF> {
        self.state.device_clip
    }

    fn draw_color(&mut self, color: Color, mode: BlendMode) {
        self.push_draw(DrawCall::Color { color, mode });
    }

    fn draw_rect(&mut self, rect: RectF, flags: &PaintFlags) {
        self.push_draw(DrawCall::Rect {
            rect,
            flags: flags.clone(),
        });
    }

    fn draw_oval(&mut self, oval: RectF, flags: &PaintFlags) {
        self.push_draw(DrawCall::Oval {
            oval,
            flags: flags.clone(),
        });
    }

    fn draw_rrect(&mut self, rrect: RoundedRectF, flags: &PaintFlags) {
        self.push_draw(DrawCall::RRect {
            rrect,
            flags: flags.clone(),
        });
    }

    fn draw_drrect(&mut self, outer: RoundedRectF, inner: RoundedRectF, flags: &PaintFlags) {
        self.push_draw(DrawCall::DRRect {
            outer,
            inner,
            flags: flags.clone(),
        });
    }

    fn draw_line(&mut self, p0: PointF, p1: PointF, flags: &PaintFlags) {
        self.push_draw(DrawCall::Line {
            p0,
            p1,
            flags: flags.clone(),
        });
    }

    fn draw_path(&mut self, path: &PaintPath, flags: &PaintFlags) {
        self.push_draw(DrawCall::Path {
            path: path.clone(),
            flags: flags.clone(),
        });
    }

    fn draw_image(
        &mut self,
        image: &ImageData,
        left: f32,
        top: f32,
        sampling: ImageSampling,
        flags: &PaintFlags,
    ) {
        self.push_draw(DrawCall::Image {
            width: image.width(),
            height: image.height(),
            left,
            top,
            sampling,
            flags: flags.clone(),
        });
    }

    fn draw_image_rect(
        &mut self,
        image: &ImageData,
        src: RectF,
        dst: RectF,
        sampling: ImageSampling,
        constraint: SrcRectConstraint,
        flags: &PaintFlags,
    ) {
        self.push_draw(DrawCall::ImageRect {
            width: image.width(),
            height: image.height(),
            src,
            dst,
            sampling,
            constraint,
            flags: flags.clone(),
        });
    }

    fn draw_text_run(&mut self, run: &TextRun, x: f32, y: f32, flags: &PaintFlags) {
        self.push_draw(DrawCall::TextRun {
            run: run.clone(),
            x,
            y,
            flags: flags.clone(),
        });
    }

    fn draw_animation(
        &mut self,
        animation: &AnimationPayload,
        dst: RectF,
        t: f32,
        overrides: &AnimationOverrides,
    ) {
        self.push_draw(DrawCall::Animation {
            asset_ids: animation.asset_ids().to_vec(),
            dst,
            t,
            override_count: overrides.images.len() + overrides.colors.len(),
        });
    }

    fn annotate(&mut self, annotation_type: AnnotationType, rect: RectF, data: Option<&[u8]>) {
        self.push_state(StateCall::Annotate {
            annotation_type,
            rect,
            data: data.map(<[u8]>::to_vec),
        });
    }

    fn set_node_id(&mut self, node_id: i32) {
        self.state.node_id = (node_id >= 0).then_some(node_id);
        self.push_state(StateCall::SetNodeId(node_id));
    }
}
