// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The closed catalogue of paint operations.
//!
//! Each op is a plain struct; [`PaintOp`] is the tagged union stored by
//! [`PaintOpBuffer`](crate::PaintOpBuffer). The catalogue is declared once in
//! a single table below, which generates [`OpKind`], [`PaintOp`], the static
//! [`OpInfo`] table and the deserializer dispatch table, so the four can never
//! disagree about which kinds exist or in which order.

use alloc::sync::Arc;

use crate::PaintOpBuffer;
use crate::animation::{AnimationOverrides, AnimationPayload};
use crate::deserialize::{ReadFn, read_record};
use crate::error::SerializeError;
use crate::flags::{BlendMode, PaintFlags};
use crate::geometry::{Affine, IRect, PointF, RectF, RoundedRectF};
use crate::image::PaintImage;
use crate::path::PaintPath;
use crate::serialize::{WriteContext, WriteOp};
use crate::text::TextRun;
use crate::wire::{HEADER_SIZE, MAX_SKIP, PAINT_OP_ALIGN, PaintOpWriter, align_up};
use peniko::Color;

wire_enum! {
    /// How a clip combines with the current clip.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub enum ClipOp {
        /// Keep the intersection of the current clip and the shape.
        #[default]
        Intersect = 0,
        /// Remove the shape from the current clip.
        Difference = 1,
    }
}

wire_enum! {
    /// Kind of annotation attached to a rectangle.
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub enum AnnotationType {
        /// The rectangle links to the URL in the annotation data.
        Url = 0,
        /// The rectangle links to a named destination.
        LinkToDestination = 1,
        /// The rectangle's origin defines a named destination.
        NamedDestination = 2,
    }
}

wire_enum! {
    /// Image sampling quality.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub enum ImageSampling {
        /// Nearest-neighbor sampling.
        Nearest = 0,
        /// Bilinear sampling.
        #[default]
        Linear = 1,
        /// Bicubic sampling.
        Cubic = 2,
    }
}

wire_enum! {
    /// Whether sampling may read outside the source rectangle.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub enum SrcRectConstraint {
        /// Sampling stays strictly inside the source rectangle.
        #[default]
        Strict = 0,
        /// Sampling may bleed past the source rectangle edges.
        Fast = 1,
    }
}

/// Static facts about one op kind.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct OpInfo {
    /// The kind described.
    pub kind: OpKind,
    /// Kind name, for diagnostics.
    pub name: &'static str,
    /// In-memory size of the op struct.
    pub size: usize,
    /// In-memory alignment of the op struct.
    pub align: usize,
    /// Record length the op accounts for in a buffer: header plus struct,
    /// rounded up to [`PAINT_OP_ALIGN`].
    pub skip: usize,
    /// Whether the op produces pixels.
    pub is_draw: bool,
    /// Whether the op carries [`PaintFlags`].
    pub has_flags: bool,
}

/// Common surface of every op struct.
pub(crate) trait OpRecord: Into<PaintOp> {
    const KIND: OpKind;
}

macro_rules! paint_ops {
    ($(
        $(#[$doc:meta])*
        $kind:ident($op:ident) { draw: $draw:literal, flags: $flags:literal },
    )*) => {
        /// Kind of a paint op; the discriminant is the wire tag.
        ///
        /// Tags are dense, starting at zero, in the order listed here.
        #[repr(u8)]
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum OpKind {
            $(
                $(#[$doc])*
                $kind,
            )*
        }

        impl OpKind {
            /// Every kind, in tag order.
            pub const ALL: &'static [Self] = &[$(Self::$kind,)*];

            /// Number of kinds; valid tags are `0..COUNT`.
            pub const COUNT: usize = Self::ALL.len();

            /// Map a wire tag to its kind, rejecting tags outside the closed range.
            #[inline]
            pub const fn from_tag(tag: u8) -> Option<Self> {
                let index = tag as usize;
                if index < Self::COUNT {
                    Some(Self::ALL[index])
                } else {
                    None
                }
            }
        }

        /// One recorded paint operation.
        #[derive(Clone, Debug, PartialEq)]
        pub enum PaintOp {
            $(
                $(#[$doc])*
                $kind($op),
            )*
        }

        impl PaintOp {
            /// Kind of this op.
            #[inline]
            pub const fn kind(&self) -> OpKind {
                match self {
                    $(Self::$kind(_) => OpKind::$kind,)*
                }
            }

            /// Write the fields of this op, without header or padding.
            pub(crate) fn write_body(
                &self,
                w: &mut PaintOpWriter<'_>,
                cx: &mut WriteContext<'_>,
            ) -> Result<(), SerializeError> {
                match self {
                    $(Self::$kind(op) => op.write(w, cx),)*
                }
            }
        }

        $(
            impl From<$op> for PaintOp {
                #[inline]
                fn from(op: $op) -> Self {
                    Self::$kind(op)
                }
            }

            impl OpRecord for $op {
                const KIND: OpKind = OpKind::$kind;
            }
        )*

        const OP_INFO_TABLE: [OpInfo; OpKind::COUNT] = [$(
            OpInfo {
                kind: OpKind::$kind,
                name: stringify!($kind),
                size: size_of::<$op>(),
                align: align_of::<$op>(),
                skip: align_up(HEADER_SIZE + size_of::<$op>(), PAINT_OP_ALIGN),
                is_draw: $draw,
                has_flags: $flags,
            },
        )*];

        /// Deserializer dispatch, indexed by tag.
        pub(crate) static READERS: [ReadFn; OpKind::COUNT] = [$(read_record::<$op>,)*];
    };
}

paint_ops! {
    /// Attach link metadata to a rectangle.
    Annotate(AnnotateOp) { draw: false, flags: false },
    /// Clip to a path.
    ClipPath(ClipPathOp) { draw: false, flags: false },
    /// Clip to a rectangle.
    ClipRect(ClipRectOp) { draw: false, flags: false },
    /// Clip to a rounded rectangle.
    ClipRRect(ClipRRectOp) { draw: false, flags: false },
    /// Concatenate a matrix onto the current transform.
    Concat(ConcatOp) { draw: false, flags: false },
    /// Invoke the caller's custom-data callback.
    CustomData(CustomDataOp) { draw: false, flags: false },
    /// Draw a frame of an animation payload.
    DrawAnimation(DrawAnimationOp) { draw: true, flags: false },
    /// Fill the clip with a color.
    DrawColor(DrawColorOp) { draw: true, flags: false },
    /// Draw the area between two rounded rectangles.
    DrawDRRect(DrawDRRectOp) { draw: true, flags: true },
    /// Draw an image at its nominal size.
    DrawImage(DrawImageOp) { draw: true, flags: true },
    /// Draw part of an image into a rectangle.
    DrawImageRect(DrawImageRectOp) { draw: true, flags: true },
    /// Draw an integer rectangle.
    DrawIRect(DrawIRectOp) { draw: true, flags: true },
    /// Draw a line segment.
    DrawLine(DrawLineOp) { draw: true, flags: true },
    /// Draw an oval inscribed in a rectangle.
    DrawOval(DrawOvalOp) { draw: true, flags: true },
    /// Draw a path.
    DrawPath(DrawPathOp) { draw: true, flags: true },
    /// Replay a nested buffer.
    DrawRecord(DrawRecordOp) { draw: true, flags: false },
    /// Draw a rectangle.
    DrawRect(DrawRectOp) { draw: true, flags: true },
    /// Draw a rounded rectangle.
    DrawRRect(DrawRRectOp) { draw: true, flags: true },
    /// Draw a run of glyphs.
    DrawTextRun(DrawTextRunOp) { draw: true, flags: true },
    /// Do nothing.
    Noop(NoopOp) { draw: false, flags: false },
    /// Pop the most recent save.
    Restore(RestoreOp) { draw: false, flags: false },
    /// Rotate the current transform.
    Rotate(RotateOp) { draw: false, flags: false },
    /// Push the transform and clip.
    Save(SaveOp) { draw: false, flags: false },
    /// Push a compositing layer with paint flags.
    SaveLayer(SaveLayerOp) { draw: false, flags: true },
    /// Push a compositing layer with an opacity.
    SaveLayerAlpha(SaveLayerAlphaOp) { draw: false, flags: false },
    /// Scale the current transform.
    Scale(ScaleOp) { draw: false, flags: false },
    /// Set the transform relative to the original playback transform.
    SetMatrix(SetMatrixOp) { draw: false, flags: false },
    /// Tag subsequent draws with a structure node id.
    SetNodeId(SetNodeIdOp) { draw: false, flags: false },
    /// Translate the current transform.
    Translate(TranslateOp) { draw: false, flags: false },
}

/// Static per-kind facts, indexed by tag.
pub static OP_INFO: [OpInfo; OpKind::COUNT] = OP_INFO_TABLE;

const _: () = {
    assert!(
        OpKind::COUNT <= u8::MAX as usize + 1,
        "tags must fit in the header's tag byte"
    );
    let mut i = 0;
    while i < OpKind::COUNT {
        let info = &OP_INFO_TABLE[i];
        assert!(
            OpKind::ALL[i] as usize == i,
            "op kinds must be dense and in tag order"
        );
        assert!(info.kind as usize == i, "op info table must be in tag order");
        assert!(
            info.size <= size_of::<PaintOp>(),
            "op struct larger than its storage"
        );
        assert!(
            info.skip > 0 && info.skip % PAINT_OP_ALIGN == 0,
            "op skip must be a positive multiple of the alignment"
        );
        assert!(info.skip <= MAX_SKIP, "op skip exceeds the maximum record length");
        assert!(
            !info.has_flags || info.is_draw || matches!(info.kind, OpKind::SaveLayer),
            "only draw ops and save-layer carry flags"
        );
        i += 1;
    }
};

impl OpKind {
    /// Wire tag of this kind.
    #[inline]
    pub const fn tag(self) -> u8 {
        self as u8
    }

    /// Static facts about this kind.
    #[inline]
    pub fn info(self) -> &'static OpInfo {
        &OP_INFO[self as usize]
    }

    /// Name of this kind.
    pub fn name(self) -> &'static str {
        self.info().name
    }

    /// Whether ops of this kind produce pixels.
    pub fn is_draw(self) -> bool {
        self.info().is_draw
    }

    /// Whether ops of this kind carry [`PaintFlags`].
    pub fn has_flags(self) -> bool {
        self.info().has_flags
    }
}

impl PaintOp {
    /// Static facts about this op's kind.
    #[inline]
    pub fn info(&self) -> &'static OpInfo {
        self.kind().info()
    }

    /// Record length this op accounts for in a buffer.
    #[inline]
    pub fn skip(&self) -> usize {
        self.info().skip
    }

    /// Whether this op produces pixels.
    pub fn is_draw(&self) -> bool {
        self.info().is_draw
    }

    /// The op's paint flags, if its kind carries them.
    pub fn flags(&self) -> Option<&PaintFlags> {
        match self {
            Self::DrawDRRect(op) => Some(&op.flags),
            Self::DrawImage(op) => Some(&op.flags),
            Self::DrawImageRect(op) => Some(&op.flags),
            Self::DrawIRect(op) => Some(&op.flags),
            Self::DrawLine(op) => Some(&op.flags),
            Self::DrawOval(op) => Some(&op.flags),
            Self::DrawPath(op) => Some(&op.flags),
            Self::DrawRect(op) => Some(&op.flags),
            Self::DrawRRect(op) => Some(&op.flags),
            Self::DrawTextRun(op) => Some(&op.flags),
            Self::SaveLayer(op) => Some(&op.flags),
            _ => None,
        }
    }
}

/// Attach link metadata to a rectangle.
#[derive(Clone, Debug, PartialEq)]
pub struct AnnotateOp {
    /// What the annotation means.
    pub annotation_type: AnnotationType,
    /// Annotated rectangle in local coordinates.
    pub rect: RectF,
    /// Annotation payload, such as a URL.
    pub data: Option<Arc<[u8]>>,
}

/// Clip to a path.
#[derive(Clone, Debug, PartialEq)]
pub struct ClipPathOp {
    /// Clip geometry.
    pub path: PaintPath,
    /// How the clip combines with the current clip.
    pub op: ClipOp,
    /// Whether the clip edge is anti-aliased.
    pub antialias: bool,
}

/// Clip to a rectangle.
#[derive(Clone, Debug, PartialEq)]
pub struct ClipRectOp {
    /// Clip rectangle in local coordinates.
    pub rect: RectF,
    /// How the clip combines with the current clip.
    pub op: ClipOp,
    /// Whether the clip edge is anti-aliased.
    pub antialias: bool,
}

/// Clip to a rounded rectangle.
#[derive(Clone, Debug, PartialEq)]
pub struct ClipRRectOp {
    /// Clip geometry.
    pub rrect: RoundedRectF,
    /// How the clip combines with the current clip.
    pub op: ClipOp,
    /// Whether the clip edge is anti-aliased.
    pub antialias: bool,
}

/// Concatenate a matrix onto the current transform.
#[derive(Clone, Debug, PartialEq)]
pub struct ConcatOp {
    /// Matrix applied after the current transform.
    pub matrix: Affine,
}

/// Invoke the caller's custom-data callback with an opaque id.
#[derive(Clone, Debug, PartialEq)]
pub struct CustomDataOp {
    /// Caller-defined id.
    pub id: u32,
}

/// Draw one frame of an animation payload into a rectangle.
#[derive(Clone, Debug, PartialEq)]
pub struct DrawAnimationOp {
    /// The animation.
    pub animation: Arc<AnimationPayload>,
    /// Destination rectangle.
    pub dst: RectF,
    /// Normalized time in `[0, 1]`.
    pub t: f32,
    /// Image and color replacements for this draw.
    pub overrides: AnimationOverrides,
}

/// Fill the current clip with a color.
#[derive(Clone, Debug, PartialEq)]
pub struct DrawColorOp {
    /// Fill color.
    pub color: Color,
    /// Blend mode.
    pub mode: BlendMode,
}

/// Draw the area between an outer and an inner rounded rectangle.
#[derive(Clone, Debug, PartialEq)]
pub struct DrawDRRectOp {
    /// Outer boundary.
    pub outer: RoundedRectF,
    /// Inner boundary, excluded from the draw.
    pub inner: RoundedRectF,
    /// Paint flags.
    pub flags: PaintFlags,
}

/// Draw an image at its nominal size with its top-left corner at `(left, top)`.
#[derive(Clone, Debug)]
pub struct DrawImageOp {
    /// The image.
    pub image: PaintImage,
    /// Left edge in local coordinates.
    pub left: f32,
    /// Top edge in local coordinates.
    pub top: f32,
    /// Sampling quality.
    pub sampling: ImageSampling,
    /// Paint flags.
    pub flags: PaintFlags,
    /// Ratio of embedded decoded size to nominal size, set by the serializer.
    pub scale_adjustment: (f32, f32),
}

impl DrawImageOp {
    /// Draw `image` at `(left, top)` with default flags.
    pub fn new(image: PaintImage, left: f32, top: f32) -> Self {
        Self {
            image,
            left,
            top,
            sampling: ImageSampling::default(),
            flags: PaintFlags::default(),
            scale_adjustment: (1.0, 1.0),
        }
    }
}

/// The scale adjustment is recomputed for every serialization and is not compared.
impl PartialEq for DrawImageOp {
    fn eq(&self, other: &Self) -> bool {
        self.image == other.image
            && self.left == other.left
            && self.top == other.top
            && self.sampling == other.sampling
            && self.flags == other.flags
    }
}

/// Draw the `src` part of an image into `dst`.
#[derive(Clone, Debug)]
pub struct DrawImageRectOp {
    /// The image.
    pub image: PaintImage,
    /// Source rectangle in nominal image coordinates.
    pub src: RectF,
    /// Destination rectangle in local coordinates.
    pub dst: RectF,
    /// Sampling quality.
    pub sampling: ImageSampling,
    /// Whether sampling may bleed outside `src`.
    pub constraint: SrcRectConstraint,
    /// Paint flags.
    pub flags: PaintFlags,
    /// Ratio of embedded decoded size to nominal size, set by the serializer.
    pub scale_adjustment: (f32, f32),
}

impl DrawImageRectOp {
    /// Draw all of `image` into `dst` with default flags.
    pub fn new(image: PaintImage, dst: RectF) -> Self {
        let src = image.rect_at(0.0, 0.0);
        Self {
            image,
            src,
            dst,
            sampling: ImageSampling::default(),
            constraint: SrcRectConstraint::default(),
            flags: PaintFlags::default(),
            scale_adjustment: (1.0, 1.0),
        }
    }
}

impl PartialEq for DrawImageRectOp {
    fn eq(&self, other: &Self) -> bool {
        self.image == other.image
            && self.src == other.src
            && self.dst == other.dst
            && self.sampling == other.sampling
            && self.constraint == other.constraint
            && self.flags == other.flags
    }
}

/// Draw an integer rectangle.
#[derive(Clone, Debug, PartialEq)]
pub struct DrawIRectOp {
    /// Rectangle in local coordinates.
    pub rect: IRect,
    /// Paint flags.
    pub flags: PaintFlags,
}

/// Draw a line segment.
#[derive(Clone, Debug, PartialEq)]
pub struct DrawLineOp {
    /// Start point.
    pub p0: PointF,
    /// End point.
    pub p1: PointF,
    /// Paint flags.
    pub flags: PaintFlags,
}

/// Draw an oval inscribed in a rectangle.
#[derive(Clone, Debug, PartialEq)]
pub struct DrawOvalOp {
    /// Bounding rectangle of the oval.
    pub oval: RectF,
    /// Paint flags.
    pub flags: PaintFlags,
}

/// Draw a path.
#[derive(Clone, Debug, PartialEq)]
pub struct DrawPathOp {
    /// Geometry.
    pub path: PaintPath,
    /// Paint flags.
    pub flags: PaintFlags,
}

/// Replay a nested buffer.
///
/// The nested buffer is shared: several parents may reference it, and it is
/// never mutated after being wrapped.
#[derive(Clone, Debug, PartialEq)]
pub struct DrawRecordOp {
    /// Buffer to replay.
    pub record: Arc<PaintOpBuffer>,
}

/// Draw a rectangle.
#[derive(Clone, Debug, PartialEq)]
pub struct DrawRectOp {
    /// Rectangle in local coordinates.
    pub rect: RectF,
    /// Paint flags.
    pub flags: PaintFlags,
}

impl DrawRectOp {
    /// Draw `rect` with `flags`.
    pub fn new(rect: RectF, flags: PaintFlags) -> Self {
        Self { rect, flags }
    }
}

/// Draw a rounded rectangle.
#[derive(Clone, Debug, PartialEq)]
pub struct DrawRRectOp {
    /// Geometry.
    pub rrect: RoundedRectF,
    /// Paint flags.
    pub flags: PaintFlags,
}

/// Draw a run of glyphs with its origin at `(x, y)`.
#[derive(Clone, Debug, PartialEq)]
pub struct DrawTextRunOp {
    /// The glyph run.
    pub run: Arc<TextRun>,
    /// Run origin X.
    pub x: f32,
    /// Run origin Y.
    pub y: f32,
    /// Paint flags.
    pub flags: PaintFlags,
}

/// Do nothing.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NoopOp;

/// Pop the most recent save or layer.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RestoreOp;

/// Rotate the current transform.
#[derive(Clone, Debug, PartialEq)]
pub struct RotateOp {
    /// Clockwise rotation in degrees.
    pub degrees: f32,
}

impl RotateOp {
    /// The rotation as a matrix.
    pub fn matrix(&self) -> Affine {
        Affine::rotate(f64::from(self.degrees) * (core::f64::consts::PI / 180.0))
    }
}

/// Push the current transform and clip.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SaveOp;

/// Push a compositing layer drawn with `flags` on restore.
#[derive(Clone, Debug, PartialEq)]
pub struct SaveLayerOp {
    /// Optional bounds hint in local coordinates.
    pub bounds: Option<RectF>,
    /// Paint flags used to composite the layer.
    pub flags: PaintFlags,
}

/// Push a compositing layer with a uniform opacity.
#[derive(Clone, Debug, PartialEq)]
pub struct SaveLayerAlphaOp {
    /// Optional bounds hint in local coordinates.
    pub bounds: Option<RectF>,
    /// Layer opacity in `[0, 1]`.
    pub alpha: f32,
}

/// Scale the current transform.
#[derive(Clone, Debug, PartialEq)]
pub struct ScaleOp {
    /// Horizontal scale.
    pub sx: f32,
    /// Vertical scale.
    pub sy: f32,
}

impl ScaleOp {
    /// The scale as a matrix.
    pub fn matrix(&self) -> Affine {
        Affine::scale_non_uniform(f64::from(self.sx), f64::from(self.sy))
    }
}

/// Set the transform to `original ∘ matrix`.
///
/// The matrix is relative to the transform playback started with, not to the
/// current transform.
#[derive(Clone, Debug, PartialEq)]
pub struct SetMatrixOp {
    /// Matrix relative to the original transform.
    pub matrix: Affine,
}

/// Tag subsequent draws with a structure node id.
#[derive(Clone, Debug, PartialEq)]
pub struct SetNodeIdOp {
    /// Node id; negative ids clear the tag.
    pub node_id: i32,
}

/// Translate the current transform.
#[derive(Clone, Debug, PartialEq)]
pub struct TranslateOp {
    /// Horizontal offset.
    pub dx: f32,
    /// Vertical offset.
    pub dy: f32,
}

impl TranslateOp {
    /// The translation as a matrix.
    pub fn matrix(&self) -> Affine {
        Affine::translate((f64::from(self.dx), f64::from(self.dy)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::ImageId;

    #[test]
    fn tags_are_dense_and_round_trip() {
        assert_eq!(OpKind::COUNT, 29);
        for (i, kind) in OpKind::ALL.iter().enumerate() {
            assert_eq!(kind.tag() as usize, i);
            assert_eq!(OpKind::from_tag(kind.tag()), Some(*kind));
            assert_eq!(kind.info().kind, *kind);
        }
        assert_eq!(OpKind::from_tag(29), None);
        assert_eq!(OpKind::from_tag(u8::MAX), None);
    }

    #[test]
    fn info_table_reports_capabilities() {
        let draws = OpKind::ALL.iter().filter(|k| k.is_draw()).count();
        let flagged = OpKind::ALL.iter().filter(|k| k.has_flags()).count();
        assert_eq!(draws, 13);
        assert_eq!(flagged, 11);
        assert!(OpKind::SaveLayer.has_flags());
        assert!(!OpKind::DrawRecord.has_flags());
        assert_eq!(OpKind::DrawRRect.name(), "DrawRRect");
    }

    #[test]
    fn unit_ops_still_occupy_a_record() {
        let save = PaintOp::from(SaveOp);
        assert_eq!(save.skip(), PAINT_OP_ALIGN);
        assert_eq!(save.info().size, 0);
    }

    #[test]
    fn flags_accessor_matches_capability() {
        let rect = PaintOp::from(DrawRectOp::new(RectF::ZERO, PaintFlags::default()));
        assert!(rect.flags().is_some());
        assert!(PaintOp::from(RestoreOp).flags().is_none());
        for kind in OpKind::ALL {
            assert!(kind.info().align <= PAINT_OP_ALIGN, "{kind:?} over-aligned");
        }
    }

    #[test]
    fn image_equality_ignores_scale_adjustment() {
        let image = PaintImage::new(ImageId(1), 10, 10);
        let a = DrawImageOp::new(image.clone(), 1.0, 2.0);
        let mut b = DrawImageOp::new(image, 1.0, 2.0);
        b.scale_adjustment = (0.5, 0.5);
        assert_eq!(a, b);
        b.left = 3.0;
        assert_ne!(a, b);
    }
}
