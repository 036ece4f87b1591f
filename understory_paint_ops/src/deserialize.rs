// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Validating deserialization of untrusted records.
//!
//! Every record is framed by its header before any field is read, every field
//! read is bounded by the record, every count is bounded by a configured
//! limit and by the bytes left, and every decoded op passes a per-kind
//! consistency check before it is returned. A record that fails any of these
//! produces an error and no op.

use alloc::sync::Arc;
use alloc::vec::Vec;

use hashbrown::HashMap;
use kurbo::{BezPath, Point};

use crate::animation::{AnimationOverrides, AnimationPayload};
use crate::buffer::PaintOpBuffer;
use crate::error::DeserializeError;
use crate::flags::{
    BlendMode, PATH_EFFECT_CORNER, PATH_EFFECT_DASH, PATH_EFFECT_NONE, PaintFlags, PaintStyle,
    PathEffect, cap_from_u8, join_from_u8,
};
use crate::image::{ImageData, ImageId, PaintImage};
use crate::ops::{
    AnnotateOp, AnnotationType, ClipOp, ClipPathOp, ClipRRectOp, ClipRectOp, ConcatOp,
    CustomDataOp, DrawAnimationOp, DrawColorOp, DrawDRRectOp, DrawIRectOp, DrawImageOp,
    DrawImageRectOp, DrawLineOp, DrawOvalOp, DrawPathOp, DrawRRectOp, DrawRecordOp, DrawRectOp,
    DrawTextRunOp, ImageSampling, NoopOp, OpKind, OpRecord, PaintOp, READERS, RestoreOp, RotateOp,
    SaveLayerAlphaOp, SaveLayerOp, SaveOp, ScaleOp, SetMatrixOp, SetNodeIdOp, SrcRectConstraint,
    TranslateOp,
};
use crate::path::{
    PATH_CACHED, PATH_INLINE, PaintPath, PathCache, VERB_CLOSE, VERB_CUBIC, VERB_LINE, VERB_MOVE,
    VERB_QUAD, fill_rule_from_u8,
};
use crate::text::TextRun;
use crate::wire::{HEADER_SIZE, PAINT_OP_ALIGN, PaintOpReader, validate_header};

const NESTED_OPS_PREALLOC: usize = 64;

/// Limits and shared state for deserializing untrusted records.
///
/// Every limit bounds an allocation whose size is read from the input.
#[derive(Clone, Copy, Debug)]
pub struct DeserializeOptions<'a> {
    /// Path cache shared with the sending side.
    ///
    /// Without a cache, records that reference cached paths are rejected.
    pub path_cache: Option<&'a PathCache>,
    /// Deepest nesting of nested buffers accepted.
    pub max_nesting_depth: usize,
    /// Most ops directly inside one nested buffer.
    pub max_nested_ops: usize,
    /// Most path elements in one path.
    pub max_path_elements: usize,
    /// Most embedded pixel bytes in one image.
    pub max_image_bytes: usize,
    /// Largest embedded or nominal image width or height.
    pub max_image_dimension: u32,
    /// Most glyphs in one text run.
    pub max_text_glyphs: usize,
    /// Most intervals in a dash effect.
    pub max_dash_intervals: usize,
    /// Most bytes of annotation data.
    pub max_annotation_bytes: usize,
    /// Most bytes in one animation payload.
    pub max_animation_bytes: usize,
    /// Most color overrides on one animation draw.
    ///
    /// Image overrides are bounded by the assets the payload declares.
    pub max_animation_color_overrides: usize,
}

impl Default for DeserializeOptions<'_> {
    fn default() -> Self {
        Self {
            path_cache: None,
            max_nesting_depth: 16,
            max_nested_ops: 1 << 20,
            max_path_elements: 65_536,
            max_image_bytes: 1 << 24,
            max_image_dimension: 16_384,
            max_text_glyphs: 65_536,
            max_dash_intervals: 16,
            max_annotation_bytes: 4096,
            max_animation_bytes: 1 << 24,
            max_animation_color_overrides: 1024,
        }
    }
}

/// What [`deserialize_into`] does when a record fails to deserialize.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Stop, drop every op appended by this call and return the error.
    #[default]
    Abort,
    /// Skip records that are well framed but invalid; stop at the first
    /// record whose header cannot be trusted.
    SkipRecord,
}

/// Outcome of [`deserialize_into`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StreamSummary {
    /// Ops appended to the buffer.
    pub ops_read: usize,
    /// Well-framed records that were skipped.
    pub records_skipped: usize,
    /// Bytes consumed from the input.
    pub bytes_consumed: usize,
    /// Offset and cause of the framing error that ended the stream early.
    pub stopped: Option<(usize, DeserializeError)>,
}

/// State threaded through the readers of one record.
pub(crate) struct ReadContext<'a> {
    options: &'a DeserializeOptions<'a>,
    depth: usize,
    pending_paths: Vec<(u64, Arc<BezPath>)>,
}

impl<'a> ReadContext<'a> {
    fn new(options: &'a DeserializeOptions<'a>) -> Self {
        Self {
            options,
            depth: 0,
            pending_paths: Vec::new(),
        }
    }

    fn cached_path(&self, id: u64) -> Option<Arc<BezPath>> {
        self.pending_paths
            .iter()
            .find(|(pending, _)| *pending == id)
            .map(|(_, path)| Arc::clone(path))
            .or_else(|| self.options.path_cache?.get(id))
    }

    fn commit_paths(&mut self) {
        if let Some(cache) = self.options.path_cache {
            for (id, path) in self.pending_paths.drain(..) {
                cache.insert(id, path);
            }
        }
    }
}

/// Dispatch entry for one op kind.
pub(crate) type ReadFn =
    fn(&mut PaintOpReader<'_>, &mut ReadContext<'_>) -> Result<PaintOp, DeserializeError>;

/// Per-kind field reader and consistency check.
pub(crate) trait ReadOp: OpRecord + Sized {
    fn read(r: &mut PaintOpReader<'_>, cx: &mut ReadContext<'_>) -> Result<Self, DeserializeError>;

    fn check(&self, _options: &DeserializeOptions<'_>) -> Result<(), &'static str> {
        Ok(())
    }
}

pub(crate) fn read_record<T: ReadOp>(
    r: &mut PaintOpReader<'_>,
    cx: &mut ReadContext<'_>,
) -> Result<PaintOp, DeserializeError> {
    let op = T::read(r, cx)?;
    op.check(cx.options)
        .map_err(|reason| DeserializeError::InvalidRecord {
            kind: T::KIND,
            reason,
        })?;
    Ok(op.into())
}

/// Frame and decode the record at the start of `input`.
fn read_one(
    input: &[u8],
    cx: &mut ReadContext<'_>,
) -> Result<(PaintOp, usize), DeserializeError> {
    let (kind, skip) = validate_header(input)?;
    let mut r = PaintOpReader::new(&input[..skip]);
    r.skip(HEADER_SIZE, "record header")?;
    let op = READERS[usize::from(kind.tag())](&mut r, cx)?;
    Ok((op, skip))
}

/// Deserialize the record at the start of `input`.
///
/// Returns the op and the number of bytes the record occupies. Nothing is
/// read past the record's declared length. On success, inline paths are
/// added to the configured path cache.
pub fn deserialize_op(
    input: &[u8],
    options: &DeserializeOptions<'_>,
) -> Result<(PaintOp, usize), DeserializeError> {
    let mut cx = ReadContext::new(options);
    match read_one(input, &mut cx) {
        Ok(decoded) => {
            cx.commit_paths();
            Ok(decoded)
        }
        Err(error) => {
            tracing::debug!(%error, "rejected paint op record");
            Err(error)
        }
    }
}

/// Deserialize the record at the start of `input` and append it to `buffer`.
///
/// Returns the number of bytes consumed. On error the buffer is unchanged.
pub fn deserialize_op_into(
    buffer: &mut PaintOpBuffer,
    input: &[u8],
    options: &DeserializeOptions<'_>,
) -> Result<usize, DeserializeError> {
    let (op, skip) = deserialize_op(input, options)?;
    buffer.push(op);
    Ok(skip)
}

/// Deserialize a stream of records and append them to `buffer`.
///
/// With [`ErrorPolicy::Abort`] the first failure rolls the buffer back to its
/// state before the call. With [`ErrorPolicy::SkipRecord`] records whose
/// header is valid are skipped on failure and the stream stops at the first
/// header that cannot be trusted; the summary says where.
#[tracing::instrument(level = "debug", skip_all, fields(len = bytes.len()))]
pub fn deserialize_into(
    buffer: &mut PaintOpBuffer,
    bytes: &[u8],
    options: &DeserializeOptions<'_>,
    policy: ErrorPolicy,
) -> Result<StreamSummary, DeserializeError> {
    let checkpoint = buffer.checkpoint();
    let mut summary = StreamSummary::default();
    let mut offset = 0;
    while offset < bytes.len() {
        let rest = &bytes[offset..];
        match deserialize_op(rest, options) {
            Ok((op, skip)) => {
                buffer.push(op);
                summary.ops_read += 1;
                offset += skip;
            }
            Err(error) => match policy {
                ErrorPolicy::Abort => {
                    tracing::debug!(offset, "aborting stream, rolling back");
                    buffer.rollback(checkpoint);
                    return Err(error);
                }
                ErrorPolicy::SkipRecord => match validate_header(rest) {
                    Ok((kind, skip)) => {
                        tracing::debug!(offset, ?kind, "skipping invalid record");
                        summary.records_skipped += 1;
                        offset += skip;
                    }
                    Err(_) => {
                        summary.stopped = Some((offset, error));
                        break;
                    }
                },
            },
        }
    }
    summary.bytes_consumed = offset;
    Ok(summary)
}

/// Deserialize a complete stream into a new buffer, failing on the first
/// invalid record.
pub fn deserialize_buffer(
    bytes: &[u8],
    options: &DeserializeOptions<'_>,
) -> Result<PaintOpBuffer, DeserializeError> {
    let mut buffer = PaintOpBuffer::new();
    deserialize_into(&mut buffer, bytes, options, ErrorPolicy::Abort)?;
    Ok(buffer)
}

fn read_enum<T>(
    r: &mut PaintOpReader<'_>,
    field: &'static str,
    decode: fn(u8) -> Option<T>,
) -> Result<T, DeserializeError> {
    let value = r.read_u8(field)?;
    decode(value).ok_or(DeserializeError::InvalidEnum { field, value })
}

fn read_flags(
    r: &mut PaintOpReader<'_>,
    options: &DeserializeOptions<'_>,
) -> Result<PaintFlags, DeserializeError> {
    let color = r.read_color("paint color")?;
    let blend_mode = read_enum(r, "blend mode", BlendMode::from_u8)?;
    let style = read_enum(r, "paint style", PaintStyle::from_u8)?;
    let stroke_width = r.read_f32("stroke width")?;
    let miter_limit = r.read_f32("miter limit")?;
    let cap = read_enum(r, "stroke cap", cap_from_u8)?;
    let join = read_enum(r, "stroke join", join_from_u8)?;
    let antialias = r.read_bool("antialias")?;
    let path_effect = match r.read_u8("path effect")? {
        PATH_EFFECT_NONE => None,
        PATH_EFFECT_DASH => {
            let count = r.read_count("dash intervals", options.max_dash_intervals, 4)?;
            let mut intervals = smallvec::SmallVec::with_capacity(count);
            for _ in 0..count {
                intervals.push(r.read_f32("dash intervals")?);
            }
            let phase = r.read_f32("dash phase")?;
            Some(PathEffect::Dash { intervals, phase })
        }
        PATH_EFFECT_CORNER => Some(PathEffect::Corner {
            radius: r.read_f32("corner radius")?,
        }),
        value => {
            return Err(DeserializeError::InvalidEnum {
                field: "path effect",
                value,
            });
        }
    };
    Ok(PaintFlags {
        color,
        blend_mode,
        style,
        stroke_width,
        miter_limit,
        cap,
        join,
        antialias,
        path_effect,
    })
}

fn check_flags(flags: &PaintFlags, options: &DeserializeOptions<'_>) -> Result<(), &'static str> {
    if flags.is_valid(options.max_dash_intervals) {
        Ok(())
    } else {
        Err("paint flags out of range")
    }
}

fn read_kurbo_point(r: &mut PaintOpReader<'_>) -> Result<Point, DeserializeError> {
    Ok(Point::new(
        r.read_f64("path point")?,
        r.read_f64("path point")?,
    ))
}

fn read_path(
    r: &mut PaintOpReader<'_>,
    cx: &mut ReadContext<'_>,
) -> Result<PaintPath, DeserializeError> {
    let id = r.read_u64("path id")?;
    let fill_rule = read_enum(r, "fill rule", fill_rule_from_u8)?;
    match r.read_u8("path mode")? {
        PATH_CACHED => {
            let path = cx
                .cached_path(id)
                .ok_or(DeserializeError::UnknownCachedPath(id))?;
            Ok(PaintPath::from_shared(path, fill_rule))
        }
        PATH_INLINE => {
            let count = r.read_count("path elements", cx.options.max_path_elements, 1)?;
            let mut path = BezPath::new();
            for _ in 0..count {
                match r.read_u8("path verb")? {
                    VERB_MOVE => path.move_to(read_kurbo_point(r)?),
                    VERB_LINE => path.line_to(read_kurbo_point(r)?),
                    VERB_QUAD => {
                        let p1 = read_kurbo_point(r)?;
                        path.quad_to(p1, read_kurbo_point(r)?);
                    }
                    VERB_CUBIC => {
                        let p1 = read_kurbo_point(r)?;
                        let p2 = read_kurbo_point(r)?;
                        path.curve_to(p1, p2, read_kurbo_point(r)?);
                    }
                    VERB_CLOSE => path.close_path(),
                    value => {
                        return Err(DeserializeError::InvalidEnum {
                            field: "path verb",
                            value,
                        });
                    }
                }
            }
            let path = Arc::new(path);
            if cx.options.path_cache.is_some() {
                cx.pending_paths.push((id, Arc::clone(&path)));
            }
            Ok(PaintPath::from_shared(path, fill_rule))
        }
        value => Err(DeserializeError::InvalidEnum {
            field: "path mode",
            value,
        }),
    }
}

fn read_paint_image(
    r: &mut PaintOpReader<'_>,
    kind: OpKind,
    options: &DeserializeOptions<'_>,
) -> Result<PaintImage, DeserializeError> {
    let invalid = |reason| DeserializeError::InvalidRecord { kind, reason };
    let id = ImageId(r.read_u64("image id")?);
    let width = r.read_u32("image size")?;
    let height = r.read_u32("image size")?;
    if width > options.max_image_dimension || height > options.max_image_dimension {
        return Err(invalid("image size out of range"));
    }
    let mut image = PaintImage::new(id, width, height);
    if r.read_bool("image data flag")? {
        let data_width = r.read_u32("image data size")?;
        let data_height = r.read_u32("image data size")?;
        if data_width > options.max_image_dimension || data_height > options.max_image_dimension {
            return Err(invalid("decoded image size out of range"));
        }
        let pixels = r.read_byte_run("image pixels", options.max_image_bytes)?;
        let data = ImageData::new(data_width, data_height, pixels.to_vec())
            .ok_or_else(|| invalid("pixel length does not match image size"))?;
        image.data = Some(Arc::new(data));
    }
    Ok(image)
}

fn read_scale_adjustment(r: &mut PaintOpReader<'_>) -> Result<(f32, f32), DeserializeError> {
    Ok((
        r.read_f32("scale adjustment")?,
        r.read_f32("scale adjustment")?,
    ))
}

fn check_scale_adjustment((sx, sy): (f32, f32)) -> Result<(), &'static str> {
    if sx.is_finite() && sy.is_finite() && sx > 0.0 && sy > 0.0 {
        Ok(())
    } else {
        Err("scale adjustment out of range")
    }
}

fn ensure(ok: bool, reason: &'static str) -> Result<(), &'static str> {
    if ok { Ok(()) } else { Err(reason) }
}

impl ReadOp for NoopOp {
    fn read(
        _: &mut PaintOpReader<'_>,
        _: &mut ReadContext<'_>,
    ) -> Result<Self, DeserializeError> {
        Ok(Self)
    }
}

impl ReadOp for RestoreOp {
    fn read(
        _: &mut PaintOpReader<'_>,
        _: &mut ReadContext<'_>,
    ) -> Result<Self, DeserializeError> {
        Ok(Self)
    }
}

impl ReadOp for SaveOp {
    fn read(
        _: &mut PaintOpReader<'_>,
        _: &mut ReadContext<'_>,
    ) -> Result<Self, DeserializeError> {
        Ok(Self)
    }
}

impl ReadOp for AnnotateOp {
    fn read(
        r: &mut PaintOpReader<'_>,
        cx: &mut ReadContext<'_>,
    ) -> Result<Self, DeserializeError> {
        let annotation_type = read_enum(r, "annotation type", AnnotationType::from_u8)?;
        let rect = r.read_rect("annotation rect")?;
        let data = if r.read_bool("annotation data flag")? {
            let bytes = r.read_byte_run("annotation data", cx.options.max_annotation_bytes)?;
            Some(Arc::from(bytes))
        } else {
            None
        };
        Ok(Self {
            annotation_type,
            rect,
            data,
        })
    }

    fn check(&self, _: &DeserializeOptions<'_>) -> Result<(), &'static str> {
        ensure(self.rect.is_finite(), "non-finite annotation rect")
    }
}

impl ReadOp for ClipPathOp {
    fn read(
        r: &mut PaintOpReader<'_>,
        cx: &mut ReadContext<'_>,
    ) -> Result<Self, DeserializeError> {
        Ok(Self {
            path: read_path(r, cx)?,
            op: read_enum(r, "clip op", ClipOp::from_u8)?,
            antialias: r.read_bool("clip antialias")?,
        })
    }

    fn check(&self, _: &DeserializeOptions<'_>) -> Result<(), &'static str> {
        ensure(self.path.is_valid(), "malformed clip path")
    }
}

impl ReadOp for ClipRectOp {
    fn read(
        r: &mut PaintOpReader<'_>,
        _: &mut ReadContext<'_>,
    ) -> Result<Self, DeserializeError> {
        Ok(Self {
            rect: r.read_rect("clip rect")?,
            op: read_enum(r, "clip op", ClipOp::from_u8)?,
            antialias: r.read_bool("clip antialias")?,
        })
    }

    fn check(&self, _: &DeserializeOptions<'_>) -> Result<(), &'static str> {
        ensure(self.rect.is_finite(), "non-finite clip rect")
    }
}

impl ReadOp for ClipRRectOp {
    fn read(
        r: &mut PaintOpReader<'_>,
        _: &mut ReadContext<'_>,
    ) -> Result<Self, DeserializeError> {
        Ok(Self {
            rrect: r.read_rounded_rect("clip rrect")?,
            op: read_enum(r, "clip op", ClipOp::from_u8)?,
            antialias: r.read_bool("clip antialias")?,
        })
    }

    fn check(&self, _: &DeserializeOptions<'_>) -> Result<(), &'static str> {
        ensure(self.rrect.is_valid(), "invalid clip rrect")
    }
}

impl ReadOp for ConcatOp {
    fn read(
        r: &mut PaintOpReader<'_>,
        _: &mut ReadContext<'_>,
    ) -> Result<Self, DeserializeError> {
        Ok(Self {
            matrix: r.read_affine("concat matrix")?,
        })
    }

    fn check(&self, _: &DeserializeOptions<'_>) -> Result<(), &'static str> {
        ensure(self.matrix.is_finite(), "non-finite matrix")
    }
}

impl ReadOp for CustomDataOp {
    fn read(
        r: &mut PaintOpReader<'_>,
        _: &mut ReadContext<'_>,
    ) -> Result<Self, DeserializeError> {
        Ok(Self {
            id: r.read_u32("custom data id")?,
        })
    }
}

impl ReadOp for DrawAnimationOp {
    fn read(
        r: &mut PaintOpReader<'_>,
        cx: &mut ReadContext<'_>,
    ) -> Result<Self, DeserializeError> {
        let options = cx.options;
        let bytes = r.read_byte_run("animation payload", options.max_animation_bytes)?;
        let animation = AnimationPayload::parse(bytes)?;
        let dst = r.read_rect("animation dst")?;
        let t = r.read_f32("animation time")?;

        let duplicate = DeserializeError::InvalidRecord {
            kind: OpKind::DrawAnimation,
            reason: "duplicate animation override",
        };
        // Asset id, image id, nominal size and data flag.
        let image_count = r.read_count(
            "animation image overrides",
            animation.asset_ids().len(),
            25,
        )?;
        let mut images = HashMap::with_capacity(image_count);
        for _ in 0..image_count {
            let asset = r.read_u64("animation asset id")?;
            let image = read_paint_image(r, OpKind::DrawAnimation, options)?;
            if images.insert(asset, image).is_some() {
                return Err(duplicate);
            }
        }
        let color_count = r.read_count(
            "animation color overrides",
            options.max_animation_color_overrides,
            20,
        )?;
        let mut colors = HashMap::with_capacity(color_count);
        for _ in 0..color_count {
            let node = r.read_u32("animation color node")?;
            if colors.insert(node, r.read_color("animation color")?).is_some() {
                return Err(duplicate);
            }
        }

        Ok(Self {
            animation: Arc::new(animation),
            dst,
            t,
            overrides: AnimationOverrides { images, colors },
        })
    }

    fn check(&self, options: &DeserializeOptions<'_>) -> Result<(), &'static str> {
        ensure(self.dst.is_finite(), "non-finite animation dst")?;
        ensure((0.0..=1.0).contains(&self.t), "animation time out of range")?;
        self.overrides
            .check(&self.animation, options.max_animation_color_overrides)
    }
}

impl ReadOp for DrawColorOp {
    fn read(
        r: &mut PaintOpReader<'_>,
        _: &mut ReadContext<'_>,
    ) -> Result<Self, DeserializeError> {
        Ok(Self {
            color: r.read_color("draw color")?,
            mode: read_enum(r, "blend mode", BlendMode::from_u8)?,
        })
    }

    fn check(&self, _: &DeserializeOptions<'_>) -> Result<(), &'static str> {
        ensure(
            self.color.components.iter().all(|c| c.is_finite()),
            "non-finite color",
        )
    }
}

impl ReadOp for DrawDRRectOp {
    fn read(
        r: &mut PaintOpReader<'_>,
        cx: &mut ReadContext<'_>,
    ) -> Result<Self, DeserializeError> {
        Ok(Self {
            outer: r.read_rounded_rect("outer rrect")?,
            inner: r.read_rounded_rect("inner rrect")?,
            flags: read_flags(r, cx.options)?,
        })
    }

    fn check(&self, options: &DeserializeOptions<'_>) -> Result<(), &'static str> {
        ensure(
            self.outer.is_valid() && self.inner.is_valid(),
            "invalid rrect",
        )?;
        check_flags(&self.flags, options)
    }
}

impl ReadOp for DrawImageOp {
    fn read(
        r: &mut PaintOpReader<'_>,
        cx: &mut ReadContext<'_>,
    ) -> Result<Self, DeserializeError> {
        let image = read_paint_image(r, Self::KIND, cx.options)?;
        let scale_adjustment = read_scale_adjustment(r)?;
        Ok(Self {
            image,
            left: r.read_f32("image left")?,
            top: r.read_f32("image top")?,
            sampling: read_enum(r, "image sampling", ImageSampling::from_u8)?,
            flags: read_flags(r, cx.options)?,
            scale_adjustment,
        })
    }

    fn check(&self, options: &DeserializeOptions<'_>) -> Result<(), &'static str> {
        ensure(
            self.left.is_finite() && self.top.is_finite(),
            "non-finite image origin",
        )?;
        check_scale_adjustment(self.scale_adjustment)?;
        check_flags(&self.flags, options)
    }
}

impl ReadOp for DrawImageRectOp {
    fn read(
        r: &mut PaintOpReader<'_>,
        cx: &mut ReadContext<'_>,
    ) -> Result<Self, DeserializeError> {
        let image = read_paint_image(r, Self::KIND, cx.options)?;
        let scale_adjustment = read_scale_adjustment(r)?;
        Ok(Self {
            image,
            src: r.read_rect("image src")?,
            dst: r.read_rect("image dst")?,
            sampling: read_enum(r, "image sampling", ImageSampling::from_u8)?,
            constraint: read_enum(r, "src rect constraint", SrcRectConstraint::from_u8)?,
            flags: read_flags(r, cx.options)?,
            scale_adjustment,
        })
    }

    fn check(&self, options: &DeserializeOptions<'_>) -> Result<(), &'static str> {
        ensure(
            self.src.is_finite() && self.dst.is_finite(),
            "non-finite image rect",
        )?;
        check_scale_adjustment(self.scale_adjustment)?;
        check_flags(&self.flags, options)
    }
}

impl ReadOp for DrawIRectOp {
    fn read(
        r: &mut PaintOpReader<'_>,
        cx: &mut ReadContext<'_>,
    ) -> Result<Self, DeserializeError> {
        Ok(Self {
            rect: r.read_irect("irect")?,
            flags: read_flags(r, cx.options)?,
        })
    }

    fn check(&self, options: &DeserializeOptions<'_>) -> Result<(), &'static str> {
        check_flags(&self.flags, options)
    }
}

impl ReadOp for DrawLineOp {
    fn read(
        r: &mut PaintOpReader<'_>,
        cx: &mut ReadContext<'_>,
    ) -> Result<Self, DeserializeError> {
        Ok(Self {
            p0: r.read_point("line start")?,
            p1: r.read_point("line end")?,
            flags: read_flags(r, cx.options)?,
        })
    }

    fn check(&self, options: &DeserializeOptions<'_>) -> Result<(), &'static str> {
        ensure(
            self.p0.is_finite() && self.p1.is_finite(),
            "non-finite line",
        )?;
        check_flags(&self.flags, options)
    }
}

impl ReadOp for DrawOvalOp {
    fn read(
        r: &mut PaintOpReader<'_>,
        cx: &mut ReadContext<'_>,
    ) -> Result<Self, DeserializeError> {
        Ok(Self {
            oval: r.read_rect("oval")?,
            flags: read_flags(r, cx.options)?,
        })
    }

    fn check(&self, options: &DeserializeOptions<'_>) -> Result<(), &'static str> {
        ensure(self.oval.is_finite(), "non-finite oval")?;
        check_flags(&self.flags, options)
    }
}

impl ReadOp for DrawPathOp {
    fn read(
        r: &mut PaintOpReader<'_>,
        cx: &mut ReadContext<'_>,
    ) -> Result<Self, DeserializeError> {
        Ok(Self {
            path: read_path(r, cx)?,
            flags: read_flags(r, cx.options)?,
        })
    }

    fn check(&self, options: &DeserializeOptions<'_>) -> Result<(), &'static str> {
        ensure(self.path.is_valid(), "malformed path")?;
        check_flags(&self.flags, options)
    }
}

/// Children are complete records, each framed and checked like a top-level
/// record. The nesting depth is bounded before any child is read.
impl ReadOp for DrawRecordOp {
    fn read(
        r: &mut PaintOpReader<'_>,
        cx: &mut ReadContext<'_>,
    ) -> Result<Self, DeserializeError> {
        let count = r.read_count("nested ops", cx.options.max_nested_ops, PAINT_OP_ALIGN)?;
        r.align_to(PAINT_OP_ALIGN)?;
        if cx.depth >= cx.options.max_nesting_depth {
            return Err(DeserializeError::NestingTooDeep(cx.options.max_nesting_depth));
        }
        cx.depth += 1;
        // The count is untrusted until every child has been read.
        let mut record = PaintOpBuffer::with_capacity(count.min(NESTED_OPS_PREALLOC));
        for _ in 0..count {
            let (op, skip) = read_one(r.rest(), cx)?;
            r.skip(skip, "nested op")?;
            record.push(op);
        }
        cx.depth -= 1;
        Ok(Self {
            record: Arc::new(record),
        })
    }
}

impl ReadOp for DrawRectOp {
    fn read(
        r: &mut PaintOpReader<'_>,
        cx: &mut ReadContext<'_>,
    ) -> Result<Self, DeserializeError> {
        Ok(Self {
            rect: r.read_rect("rect")?,
            flags: read_flags(r, cx.options)?,
        })
    }

    fn check(&self, options: &DeserializeOptions<'_>) -> Result<(), &'static str> {
        ensure(self.rect.is_finite(), "non-finite rect")?;
        check_flags(&self.flags, options)
    }
}

impl ReadOp for DrawRRectOp {
    fn read(
        r: &mut PaintOpReader<'_>,
        cx: &mut ReadContext<'_>,
    ) -> Result<Self, DeserializeError> {
        Ok(Self {
            rrect: r.read_rounded_rect("rrect")?,
            flags: read_flags(r, cx.options)?,
        })
    }

    fn check(&self, options: &DeserializeOptions<'_>) -> Result<(), &'static str> {
        ensure(self.rrect.is_valid(), "invalid rrect")?;
        check_flags(&self.flags, options)
    }
}

impl ReadOp for DrawTextRunOp {
    fn read(
        r: &mut PaintOpReader<'_>,
        cx: &mut ReadContext<'_>,
    ) -> Result<Self, DeserializeError> {
        let max_glyphs = cx.options.max_text_glyphs;
        let font_id = r.read_u32("font id")?;
        let font_size = r.read_f32("font size")?;
        let bounds = r.read_rect("text bounds")?;
        let glyph_count = r.read_count("glyphs", max_glyphs, 2)?;
        let mut glyphs = Vec::with_capacity(glyph_count);
        for _ in 0..glyph_count {
            glyphs.push(r.read_u16("glyphs")?);
        }
        let position_count = r.read_count("glyph positions", max_glyphs, 8)?;
        let mut positions = Vec::with_capacity(position_count);
        for _ in 0..position_count {
            positions.push(r.read_point("glyph positions")?);
        }
        Ok(Self {
            run: Arc::new(TextRun {
                font_id,
                font_size,
                glyphs,
                positions,
                bounds,
            }),
            x: r.read_f32("text x")?,
            y: r.read_f32("text y")?,
            flags: read_flags(r, cx.options)?,
        })
    }

    fn check(&self, options: &DeserializeOptions<'_>) -> Result<(), &'static str> {
        self.run.check(options.max_text_glyphs)?;
        ensure(
            self.x.is_finite() && self.y.is_finite(),
            "non-finite text origin",
        )?;
        check_flags(&self.flags, options)
    }
}

impl ReadOp for RotateOp {
    fn read(
        r: &mut PaintOpReader<'_>,
        _: &mut ReadContext<'_>,
    ) -> Result<Self, DeserializeError> {
        Ok(Self {
            degrees: r.read_f32("rotation")?,
        })
    }

    fn check(&self, _: &DeserializeOptions<'_>) -> Result<(), &'static str> {
        ensure(self.degrees.is_finite(), "non-finite rotation")
    }
}

impl ReadOp for SaveLayerOp {
    fn read(
        r: &mut PaintOpReader<'_>,
        cx: &mut ReadContext<'_>,
    ) -> Result<Self, DeserializeError> {
        Ok(Self {
            bounds: r.read_optional_rect("layer bounds")?,
            flags: read_flags(r, cx.options)?,
        })
    }

    fn check(&self, options: &DeserializeOptions<'_>) -> Result<(), &'static str> {
        ensure(
            self.bounds.is_none_or(|b| b.is_finite()),
            "non-finite layer bounds",
        )?;
        check_flags(&self.flags, options)
    }
}

impl ReadOp for SaveLayerAlphaOp {
    fn read(
        r: &mut PaintOpReader<'_>,
        _: &mut ReadContext<'_>,
    ) -> Result<Self, DeserializeError> {
        Ok(Self {
            bounds: r.read_optional_rect("layer bounds")?,
            alpha: r.read_f32("layer alpha")?,
        })
    }

    fn check(&self, _: &DeserializeOptions<'_>) -> Result<(), &'static str> {
        ensure(
            self.bounds.is_none_or(|b| b.is_finite()),
            "non-finite layer bounds",
        )?;
        ensure((0.0..=1.0).contains(&self.alpha), "layer alpha out of range")
    }
}

impl ReadOp for ScaleOp {
    fn read(
        r: &mut PaintOpReader<'_>,
        _: &mut ReadContext<'_>,
    ) -> Result<Self, DeserializeError> {
        Ok(Self {
            sx: r.read_f32("scale")?,
            sy: r.read_f32("scale")?,
        })
    }

    fn check(&self, _: &DeserializeOptions<'_>) -> Result<(), &'static str> {
        ensure(self.sx.is_finite() && self.sy.is_finite(), "non-finite scale")
    }
}

impl ReadOp for SetMatrixOp {
    fn read(
        r: &mut PaintOpReader<'_>,
        _: &mut ReadContext<'_>,
    ) -> Result<Self, DeserializeError> {
        Ok(Self {
            matrix: r.read_affine("matrix")?,
        })
    }

    fn check(&self, _: &DeserializeOptions<'_>) -> Result<(), &'static str> {
        ensure(self.matrix.is_finite(), "non-finite matrix")
    }
}

impl ReadOp for SetNodeIdOp {
    fn read(
        r: &mut PaintOpReader<'_>,
        _: &mut ReadContext<'_>,
    ) -> Result<Self, DeserializeError> {
        Ok(Self {
            node_id: r.read_i32("node id")?,
        })
    }
}

impl ReadOp for TranslateOp {
    fn read(
        r: &mut PaintOpReader<'_>,
        _: &mut ReadContext<'_>,
    ) -> Result<Self, DeserializeError> {
        Ok(Self {
            dx: r.read_f32("translation")?,
            dy: r.read_f32("translation")?,
        })
    }

    fn check(&self, _: &DeserializeOptions<'_>) -> Result<(), &'static str> {
        ensure(
            self.dx.is_finite() && self.dy.is_finite(),
            "non-finite translation",
        )
    }
}
