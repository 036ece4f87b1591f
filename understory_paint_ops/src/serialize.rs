// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Serialization of ops into the wire format.

use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

use kurbo::{BezPath, PathEl, Point};

use crate::buffer::PaintOpBuffer;
use crate::error::SerializeError;
use crate::flags::{
    PATH_EFFECT_CORNER, PATH_EFFECT_DASH, PATH_EFFECT_NONE, PaintFlags, PathEffect, cap_to_u8,
    join_to_u8,
};
use crate::geometry::Affine;
use crate::image::{ImageData, ImageProvider, PaintImage};
use crate::ops::{
    AnnotateOp, ClipPathOp, ClipRRectOp, ClipRectOp, ConcatOp, CustomDataOp, DrawAnimationOp,
    DrawColorOp, DrawDRRectOp, DrawIRectOp, DrawImageOp, DrawImageRectOp, DrawLineOp, DrawOvalOp,
    DrawPathOp, DrawRRectOp, DrawRecordOp, DrawRectOp, DrawTextRunOp, NoopOp, PaintOp, RestoreOp,
    RotateOp, SaveLayerAlphaOp, SaveLayerOp, SaveOp, ScaleOp, SetMatrixOp, SetNodeIdOp,
    TranslateOp,
};
use crate::path::{
    PATH_CACHED, PATH_INLINE, PaintPath, PathCache, VERB_CLOSE, VERB_CUBIC, VERB_LINE, VERB_MOVE,
    VERB_QUAD, fill_rule_to_u8,
};
use crate::text::TextRun;
use crate::wire::{MAX_SKIP, PAINT_OP_ALIGN, PaintOpWriter, align_up};

const INITIAL_SCRATCH: usize = 4096;

/// Options for serializing ops.
#[derive(Clone, Copy)]
pub struct SerializeOptions<'a> {
    /// Decode images while serializing and embed the decoded pixels.
    ///
    /// The provider is asked for each image under the transform it will be
    /// drawn with; the resulting scale adjustment travels with the op.
    pub image_provider: Option<&'a dyn ImageProvider>,
    /// Path cache shared with the receiving side.
    ///
    /// Paths already in the cache are written as references.
    pub path_cache: Option<&'a PathCache>,
    /// Inline nested buffers as `Save`, the nested ops, then `Restore`.
    pub flatten_records: bool,
    /// Deepest nesting of nested buffers that will be written.
    pub max_nesting_depth: usize,
}

impl Default for SerializeOptions<'_> {
    fn default() -> Self {
        Self {
            image_provider: None,
            path_cache: None,
            flatten_records: false,
            max_nesting_depth: 16,
        }
    }
}

impl fmt::Debug for SerializeOptions<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerializeOptions")
            .field("image_provider", &self.image_provider.is_some())
            .field("path_cache", &self.path_cache)
            .field("flatten_records", &self.flatten_records)
            .field("max_nesting_depth", &self.max_nesting_depth)
            .finish()
    }
}

/// State threaded through the writers of one serialization call.
pub(crate) struct WriteContext<'a> {
    options: &'a SerializeOptions<'a>,
    flags_override: Option<&'a PaintFlags>,
    current: Affine,
    original: Affine,
    saved: Vec<Affine>,
    depth: usize,
    pending_paths: Vec<(u64, Arc<BezPath>)>,
}

impl<'a> WriteContext<'a> {
    fn new(
        options: &'a SerializeOptions<'a>,
        flags_override: Option<&'a PaintFlags>,
        current: Affine,
        original: Affine,
    ) -> Self {
        Self {
            options,
            flags_override,
            current,
            original,
            saved: Vec::new(),
            depth: 0,
            pending_paths: Vec::new(),
        }
    }

    fn path_sent(&self, id: u64) -> bool {
        self.options.path_cache.is_some_and(|cache| cache.contains(id))
            || self.pending_paths.iter().any(|(pending, _)| *pending == id)
    }

    /// Publish paths written by records that completed.
    fn commit_paths(&mut self) {
        if let Some(cache) = self.options.path_cache {
            for (id, path) in self.pending_paths.drain(..) {
                cache.insert(id, path);
            }
        }
    }

    fn discard_paths(&mut self) {
        self.pending_paths.clear();
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            current: self.current,
            depth: self.depth,
            pending_paths: self.pending_paths.len(),
        }
    }

    /// Return to `snapshot`, forgetting paths written since.
    fn rewind(&mut self, snapshot: Snapshot) {
        self.current = snapshot.current;
        self.depth = snapshot.depth;
        self.pending_paths.truncate(snapshot.pending_paths);
    }

    fn enter_nested(&mut self) -> Result<(), SerializeError> {
        if self.depth >= self.options.max_nesting_depth {
            return Err(SerializeError::NestingTooDeep(self.options.max_nesting_depth));
        }
        self.depth += 1;
        Ok(())
    }

    fn leave_nested(&mut self) {
        self.depth -= 1;
    }

    /// Follow the transform the receiver will have after `op` is replayed.
    fn track_transform(&mut self, op: &PaintOp) {
        match op {
            PaintOp::Save(_) | PaintOp::SaveLayer(_) | PaintOp::SaveLayerAlpha(_) => {
                self.saved.push(self.current);
            }
            PaintOp::Restore(_) => {
                if let Some(transform) = self.saved.pop() {
                    self.current = transform;
                }
            }
            PaintOp::Translate(op) => self.current *= op.matrix(),
            PaintOp::Scale(op) => self.current *= op.matrix(),
            PaintOp::Rotate(op) => self.current *= op.matrix(),
            PaintOp::Concat(op) => self.current *= op.matrix,
            PaintOp::SetMatrix(op) => self.current = self.original * op.matrix,
            _ => {}
        }
    }
}

/// Writer state before a record attempt.
///
/// The saved-transform stack is not captured; nested writers hand it back
/// themselves.
#[derive(Clone, Copy)]
struct Snapshot {
    current: Affine,
    depth: usize,
    pending_paths: usize,
}

/// Per-kind field writer.
pub(crate) trait WriteOp {
    fn write(
        &self,
        w: &mut PaintOpWriter<'_>,
        cx: &mut WriteContext<'_>,
    ) -> Result<(), SerializeError>;
}

/// Write one record: header, fields, then zero padding.
///
/// The header is written last, once the padded length is known.
fn write_record(
    op: &PaintOp,
    dst: &mut [u8],
    cx: &mut WriteContext<'_>,
) -> Result<usize, SerializeError> {
    let mut w = PaintOpWriter::new(dst);
    w.write_u32(0)?;
    op.write_body(&mut w, cx)?;
    let skip = align_up(w.position(), PAINT_OP_ALIGN);
    if skip > MAX_SKIP {
        return Err(SerializeError::RecordTooLarge(skip));
    }
    w.pad_to(PAINT_OP_ALIGN)?;
    let skip_word = u32::try_from(skip).map_err(|_| SerializeError::RecordTooLarge(skip))?;
    w.patch_header(op.kind().tag(), skip_word);
    Ok(skip)
}

/// Destination for a sequence of records.
trait RecordSink {
    fn put(&mut self, op: &PaintOp, cx: &mut WriteContext<'_>) -> Result<(), SerializeError>;
}

impl RecordSink for PaintOpWriter<'_> {
    fn put(&mut self, op: &PaintOp, cx: &mut WriteContext<'_>) -> Result<(), SerializeError> {
        let written = write_record(op, self.remaining_mut(), cx)?;
        self.advance(written);
        Ok(())
    }
}

/// Appends records to a vector, serializing each into a scratch area that
/// grows on capacity failure.
struct GrowableSink<'v> {
    out: &'v mut Vec<u8>,
    scratch: Vec<u8>,
}

impl RecordSink for GrowableSink<'_> {
    fn put(&mut self, op: &PaintOp, cx: &mut WriteContext<'_>) -> Result<(), SerializeError> {
        let snapshot = cx.snapshot();
        loop {
            match write_record(op, &mut self.scratch, cx) {
                Ok(written) => {
                    self.out.extend_from_slice(&self.scratch[..written]);
                    cx.commit_paths();
                    return Ok(());
                }
                Err(SerializeError::InsufficientSpace { .. }) => {
                    cx.rewind(snapshot);
                    // Nested records report the capacity of their sub-slice,
                    // so growth is driven by the scratch length.
                    let capacity = self.scratch.len();
                    if capacity > MAX_SKIP {
                        return Err(SerializeError::RecordTooLarge(capacity));
                    }
                    let grown = (capacity * 2).min(MAX_SKIP + PAINT_OP_ALIGN);
                    self.scratch.resize(grown, 0);
                }
                Err(error) => {
                    cx.rewind(snapshot);
                    return Err(error);
                }
            }
        }
    }
}

fn emit(
    op: &PaintOp,
    sink: &mut impl RecordSink,
    cx: &mut WriteContext<'_>,
) -> Result<(), SerializeError> {
    match op {
        PaintOp::DrawRecord(op) if cx.options.flatten_records => {
            emit_flattened(&op.record, sink, cx)
        }
        _ => {
            sink.put(op, cx)?;
            cx.track_transform(op);
            Ok(())
        }
    }
}

/// Inline a nested buffer as `Save`, its ops, and enough `Restore`s to
/// balance it. Restores that would pop past the inserted `Save` are dropped,
/// as nested playback ignores them.
fn emit_flattened(
    record: &PaintOpBuffer,
    sink: &mut impl RecordSink,
    cx: &mut WriteContext<'_>,
) -> Result<(), SerializeError> {
    cx.enter_nested()?;
    let result = emit_balanced(record, sink, cx);
    cx.leave_nested();
    result
}

fn emit_balanced(
    record: &PaintOpBuffer,
    sink: &mut impl RecordSink,
    cx: &mut WriteContext<'_>,
) -> Result<(), SerializeError> {
    let base = cx.saved.len();
    emit(&PaintOp::Save(SaveOp), sink, cx)?;
    for op in record {
        if matches!(op, PaintOp::Restore(_)) && cx.saved.len() <= base + 1 {
            continue;
        }
        emit(op, sink, cx)?;
    }
    while cx.saved.len() > base {
        emit(&PaintOp::Restore(RestoreOp), sink, cx)?;
    }
    Ok(())
}

/// Serialize one op into `dst`, returning the typed error on failure.
///
/// `flags_override` replaces the op's own paint flags for this call only.
/// `current` is the transform the op will be drawn under and `original` the
/// transform playback starts with; `SetMatrix` is written relative to it.
///
/// With [`SerializeOptions::flatten_records`], a nested buffer is written as
/// several records. Paths are only added to the shared path cache once the
/// whole call succeeds.
///
/// # Panics
///
/// Panics if `flags_override` is given for an op whose kind has no flags.
pub fn try_serialize_op(
    op: &PaintOp,
    dst: &mut [u8],
    options: &SerializeOptions<'_>,
    flags_override: Option<&PaintFlags>,
    current: &Affine,
    original: &Affine,
) -> Result<usize, SerializeError> {
    assert!(
        flags_override.is_none() || op.kind().has_flags(),
        "flags override given for {:?}, which has no paint flags",
        op.kind()
    );
    let mut cx = WriteContext::new(options, flags_override, *current, *original);
    let mut w = PaintOpWriter::new(dst);
    match emit(op, &mut w, &mut cx) {
        Ok(()) => {
            cx.commit_paths();
            Ok(w.position())
        }
        Err(error) => {
            cx.discard_paths();
            Err(error)
        }
    }
}

/// Serialize one op into `dst`, returning the number of bytes written.
///
/// Returns 0 if the op does not fit; grow `dst` and call again. See
/// [`try_serialize_op`] for the meaning of the other arguments.
pub fn serialize_op(
    op: &PaintOp,
    dst: &mut [u8],
    options: &SerializeOptions<'_>,
    flags_override: Option<&PaintFlags>,
    current: &Affine,
    original: &Affine,
) -> usize {
    try_serialize_op(op, dst, options, flags_override, current, original).unwrap_or_else(
        |error| {
            tracing::trace!(kind = ?op.kind(), %error, "paint op did not serialize");
            0
        },
    )
}

/// Serialize every op of `buffer`, in order, into a new byte vector.
///
/// `original` is the transform playback on the receiving side starts with.
/// The transform each op is drawn under is tracked through the buffer so
/// that an image provider decodes for the right scale.
pub fn serialize_buffer(
    buffer: &PaintOpBuffer,
    options: &SerializeOptions<'_>,
    original: Affine,
) -> Result<Vec<u8>, SerializeError> {
    let mut out = Vec::with_capacity(buffer.total_bytes());
    let mut sink = GrowableSink {
        out: &mut out,
        scratch: vec![0; INITIAL_SCRATCH],
    };
    let mut cx = WriteContext::new(options, None, original, original);
    for op in buffer {
        emit(op, &mut sink, &mut cx)?;
    }
    Ok(out)
}

fn write_flags(w: &mut PaintOpWriter<'_>, flags: &PaintFlags) -> Result<(), SerializeError> {
    w.write_color(flags.color)?;
    w.write_u8(flags.blend_mode.to_u8())?;
    w.write_u8(flags.style.to_u8())?;
    w.write_f32(flags.stroke_width)?;
    w.write_f32(flags.miter_limit)?;
    w.write_u8(cap_to_u8(flags.cap))?;
    w.write_u8(join_to_u8(flags.join))?;
    w.write_bool(flags.antialias)?;
    match &flags.path_effect {
        None => w.write_u8(PATH_EFFECT_NONE),
        Some(PathEffect::Dash { intervals, phase }) => {
            w.write_u8(PATH_EFFECT_DASH)?;
            w.write_len(intervals.len())?;
            for interval in intervals {
                w.write_f32(*interval)?;
            }
            w.write_f32(*phase)
        }
        Some(PathEffect::Corner { radius }) => {
            w.write_u8(PATH_EFFECT_CORNER)?;
            w.write_f32(*radius)
        }
    }
}

fn write_kurbo_point(w: &mut PaintOpWriter<'_>, p: Point) -> Result<(), SerializeError> {
    w.write_f64(p.x)?;
    w.write_f64(p.y)
}

fn write_path(
    w: &mut PaintOpWriter<'_>,
    cx: &mut WriteContext<'_>,
    path: &PaintPath,
) -> Result<(), SerializeError> {
    w.write_u64(path.id())?;
    w.write_u8(fill_rule_to_u8(path.fill_rule()))?;
    if cx.path_sent(path.id()) {
        return w.write_u8(PATH_CACHED);
    }
    w.write_u8(PATH_INLINE)?;
    let elements = path.path().elements();
    w.write_len(elements.len())?;
    for el in elements {
        match *el {
            PathEl::MoveTo(p) => {
                w.write_u8(VERB_MOVE)?;
                write_kurbo_point(w, p)?;
            }
            PathEl::LineTo(p) => {
                w.write_u8(VERB_LINE)?;
                write_kurbo_point(w, p)?;
            }
            PathEl::QuadTo(p1, p2) => {
                w.write_u8(VERB_QUAD)?;
                write_kurbo_point(w, p1)?;
                write_kurbo_point(w, p2)?;
            }
            PathEl::CurveTo(p1, p2, p3) => {
                w.write_u8(VERB_CUBIC)?;
                write_kurbo_point(w, p1)?;
                write_kurbo_point(w, p2)?;
                write_kurbo_point(w, p3)?;
            }
            PathEl::ClosePath => w.write_u8(VERB_CLOSE)?,
        }
    }
    if cx.options.path_cache.is_some() {
        cx.pending_paths
            .push((path.id(), Arc::clone(path.shared_path())));
    }
    Ok(())
}

fn write_paint_image(
    w: &mut PaintOpWriter<'_>,
    image: &PaintImage,
    data: Option<&ImageData>,
) -> Result<(), SerializeError> {
    w.write_u64(image.id.0)?;
    w.write_u32(image.width)?;
    w.write_u32(image.height)?;
    match data {
        Some(data) => {
            w.write_bool(true)?;
            w.write_u32(data.width())?;
            w.write_u32(data.height())?;
            w.write_byte_run(data.pixels())
        }
        None => w.write_bool(false),
    }
}

/// Write an image and the scale adjustment of the pixels embedded with it.
///
/// With an image provider, the image is decoded now and the provider's scale
/// adjustment is written; otherwise any attached pixels are embedded with the
/// op's recorded adjustment.
fn write_drawn_image(
    w: &mut PaintOpWriter<'_>,
    cx: &WriteContext<'_>,
    image: &PaintImage,
    recorded_scale: (f32, f32),
) -> Result<(), SerializeError> {
    let (data, scale) = match cx.options.image_provider {
        Some(provider) => match provider.decode_for_transform(image, &cx.current) {
            Some(decoded) => (Some(decoded.data), decoded.scale_adjustment),
            None => (None, (1.0, 1.0)),
        },
        None => (image.data.clone(), recorded_scale),
    };
    write_paint_image(w, image, data.as_deref())?;
    w.write_f32(scale.0)?;
    w.write_f32(scale.1)
}

fn write_text_run(w: &mut PaintOpWriter<'_>, run: &TextRun) -> Result<(), SerializeError> {
    w.write_u32(run.font_id)?;
    w.write_f32(run.font_size)?;
    w.write_rect(run.bounds)?;
    w.write_len(run.glyphs.len())?;
    for glyph in &run.glyphs {
        w.write_u16(*glyph)?;
    }
    w.write_len(run.positions.len())?;
    for position in &run.positions {
        w.write_point(*position)?;
    }
    Ok(())
}

macro_rules! write_nothing {
    ($($op:ty),*) => {
        $(
            impl WriteOp for $op {
                fn write(
                    &self,
                    _: &mut PaintOpWriter<'_>,
                    _: &mut WriteContext<'_>,
                ) -> Result<(), SerializeError> {
                    Ok(())
                }
            }
        )*
    };
}

write_nothing!(NoopOp, RestoreOp, SaveOp);

impl WriteOp for AnnotateOp {
    fn write(
        &self,
        w: &mut PaintOpWriter<'_>,
        _: &mut WriteContext<'_>,
    ) -> Result<(), SerializeError> {
        w.write_u8(self.annotation_type.to_u8())?;
        w.write_rect(self.rect)?;
        match &self.data {
            Some(data) => {
                w.write_bool(true)?;
                w.write_byte_run(data)
            }
            None => w.write_bool(false),
        }
    }
}

impl WriteOp for ClipPathOp {
    fn write(
        &self,
        w: &mut PaintOpWriter<'_>,
        cx: &mut WriteContext<'_>,
    ) -> Result<(), SerializeError> {
        write_path(w, cx, &self.path)?;
        w.write_u8(self.op.to_u8())?;
        w.write_bool(self.antialias)
    }
}

impl WriteOp for ClipRectOp {
    fn write(
        &self,
        w: &mut PaintOpWriter<'_>,
        _: &mut WriteContext<'_>,
    ) -> Result<(), SerializeError> {
        w.write_rect(self.rect)?;
        w.write_u8(self.op.to_u8())?;
        w.write_bool(self.antialias)
    }
}

impl WriteOp for ClipRRectOp {
    fn write(
        &self,
        w: &mut PaintOpWriter<'_>,
        _: &mut WriteContext<'_>,
    ) -> Result<(), SerializeError> {
        w.write_rounded_rect(self.rrect)?;
        w.write_u8(self.op.to_u8())?;
        w.write_bool(self.antialias)
    }
}

impl WriteOp for ConcatOp {
    fn write(
        &self,
        w: &mut PaintOpWriter<'_>,
        _: &mut WriteContext<'_>,
    ) -> Result<(), SerializeError> {
        w.write_affine(self.matrix)
    }
}

impl WriteOp for CustomDataOp {
    fn write(
        &self,
        w: &mut PaintOpWriter<'_>,
        _: &mut WriteContext<'_>,
    ) -> Result<(), SerializeError> {
        w.write_u32(self.id)
    }
}

impl WriteOp for DrawAnimationOp {
    fn write(
        &self,
        w: &mut PaintOpWriter<'_>,
        _: &mut WriteContext<'_>,
    ) -> Result<(), SerializeError> {
        w.write_byte_run(self.animation.as_bytes())?;
        w.write_rect(self.dst)?;
        w.write_f32(self.t)?;

        // Sorted so that equal ops always produce equal bytes.
        let mut images: Vec<_> = self.overrides.images.iter().collect();
        images.sort_unstable_by_key(|(id, _)| **id);
        w.write_len(images.len())?;
        for (id, image) in images {
            w.write_u64(*id)?;
            write_paint_image(w, image, image.data.as_deref())?;
        }

        let mut colors: Vec<_> = self.overrides.colors.iter().collect();
        colors.sort_unstable_by_key(|(id, _)| **id);
        w.write_len(colors.len())?;
        for (id, color) in colors {
            w.write_u32(*id)?;
            w.write_color(*color)?;
        }
        Ok(())
    }
}

impl WriteOp for DrawColorOp {
    fn write(
        &self,
        w: &mut PaintOpWriter<'_>,
        _: &mut WriteContext<'_>,
    ) -> Result<(), SerializeError> {
        w.write_color(self.color)?;
        w.write_u8(self.mode.to_u8())
    }
}

impl WriteOp for DrawDRRectOp {
    fn write(
        &self,
        w: &mut PaintOpWriter<'_>,
        cx: &mut WriteContext<'_>,
    ) -> Result<(), SerializeError> {
        w.write_rounded_rect(self.outer)?;
        w.write_rounded_rect(self.inner)?;
        write_flags(w, cx.flags_override.unwrap_or(&self.flags))
    }
}

impl WriteOp for DrawImageOp {
    fn write(
        &self,
        w: &mut PaintOpWriter<'_>,
        cx: &mut WriteContext<'_>,
    ) -> Result<(), SerializeError> {
        write_drawn_image(w, cx, &self.image, self.scale_adjustment)?;
        w.write_f32(self.left)?;
        w.write_f32(self.top)?;
        w.write_u8(self.sampling.to_u8())?;
        write_flags(w, cx.flags_override.unwrap_or(&self.flags))
    }
}

impl WriteOp for DrawImageRectOp {
    fn write(
        &self,
        w: &mut PaintOpWriter<'_>,
        cx: &mut WriteContext<'_>,
    ) -> Result<(), SerializeError> {
        write_drawn_image(w, cx, &self.image, self.scale_adjustment)?;
        w.write_rect(self.src)?;
        w.write_rect(self.dst)?;
        w.write_u8(self.sampling.to_u8())?;
        w.write_u8(self.constraint.to_u8())?;
        write_flags(w, cx.flags_override.unwrap_or(&self.flags))
    }
}

impl WriteOp for DrawIRectOp {
    fn write(
        &self,
        w: &mut PaintOpWriter<'_>,
        cx: &mut WriteContext<'_>,
    ) -> Result<(), SerializeError> {
        w.write_irect(self.rect)?;
        write_flags(w, cx.flags_override.unwrap_or(&self.flags))
    }
}

impl WriteOp for DrawLineOp {
    fn write(
        &self,
        w: &mut PaintOpWriter<'_>,
        cx: &mut WriteContext<'_>,
    ) -> Result<(), SerializeError> {
        w.write_point(self.p0)?;
        w.write_point(self.p1)?;
        write_flags(w, cx.flags_override.unwrap_or(&self.flags))
    }
}

impl WriteOp for DrawOvalOp {
    fn write(
        &self,
        w: &mut PaintOpWriter<'_>,
        cx: &mut WriteContext<'_>,
    ) -> Result<(), SerializeError> {
        w.write_rect(self.oval)?;
        write_flags(w, cx.flags_override.unwrap_or(&self.flags))
    }
}

impl WriteOp for DrawPathOp {
    fn write(
        &self,
        w: &mut PaintOpWriter<'_>,
        cx: &mut WriteContext<'_>,
    ) -> Result<(), SerializeError> {
        write_path(w, cx, &self.path)?;
        write_flags(w, cx.flags_override.unwrap_or(&self.flags))
    }
}

/// A nested buffer is written as an op count followed by an aligned stream
/// of complete records.
impl WriteOp for DrawRecordOp {
    fn write(
        &self,
        w: &mut PaintOpWriter<'_>,
        cx: &mut WriteContext<'_>,
    ) -> Result<(), SerializeError> {
        cx.enter_nested()?;
        let current = cx.current;
        let saved = core::mem::take(&mut cx.saved);
        let result = write_nested(&self.record, w, cx);
        // Restored even when a child did not fit.
        cx.current = current;
        cx.saved = saved;
        cx.leave_nested();
        result
    }
}

fn write_nested(
    record: &PaintOpBuffer,
    w: &mut PaintOpWriter<'_>,
    cx: &mut WriteContext<'_>,
) -> Result<(), SerializeError> {
    w.write_len(record.op_count())?;
    w.pad_to(PAINT_OP_ALIGN)?;
    for op in record {
        emit(op, w, cx)?;
    }
    Ok(())
}

impl WriteOp for DrawRectOp {
    fn write(
        &self,
        w: &mut PaintOpWriter<'_>,
        cx: &mut WriteContext<'_>,
    ) -> Result<(), SerializeError> {
        w.write_rect(self.rect)?;
        write_flags(w, cx.flags_override.unwrap_or(&self.flags))
    }
}

impl WriteOp for DrawRRectOp {
    fn write(
        &self,
        w: &mut PaintOpWriter<'_>,
        cx: &mut WriteContext<'_>,
    ) -> Result<(), SerializeError> {
        w.write_rounded_rect(self.rrect)?;
        write_flags(w, cx.flags_override.unwrap_or(&self.flags))
    }
}

impl WriteOp for DrawTextRunOp {
    fn write(
        &self,
        w: &mut PaintOpWriter<'_>,
        cx: &mut WriteContext<'_>,
    ) -> Result<(), SerializeError> {
        write_text_run(w, &self.run)?;
        w.write_f32(self.x)?;
        w.write_f32(self.y)?;
        write_flags(w, cx.flags_override.unwrap_or(&self.flags))
    }
}

impl WriteOp for RotateOp {
    fn write(
        &self,
        w: &mut PaintOpWriter<'_>,
        _: &mut WriteContext<'_>,
    ) -> Result<(), SerializeError> {
        w.write_f32(self.degrees)
    }
}

impl WriteOp for SaveLayerOp {
    fn write(
        &self,
        w: &mut PaintOpWriter<'_>,
        cx: &mut WriteContext<'_>,
    ) -> Result<(), SerializeError> {
        w.write_optional_rect(self.bounds)?;
        write_flags(w, cx.flags_override.unwrap_or(&self.flags))
    }
}

impl WriteOp for SaveLayerAlphaOp {
    fn write(
        &self,
        w: &mut PaintOpWriter<'_>,
        _: &mut WriteContext<'_>,
    ) -> Result<(), SerializeError> {
        w.write_optional_rect(self.bounds)?;
        w.write_f32(self.alpha)
    }
}

impl WriteOp for ScaleOp {
    fn write(
        &self,
        w: &mut PaintOpWriter<'_>,
        _: &mut WriteContext<'_>,
    ) -> Result<(), SerializeError> {
        w.write_f32(self.sx)?;
        w.write_f32(self.sy)
    }
}

/// The sender's original transform is baked in, so the receiver applies the
/// written matrix relative to its own original transform.
impl WriteOp for SetMatrixOp {
    fn write(
        &self,
        w: &mut PaintOpWriter<'_>,
        cx: &mut WriteContext<'_>,
    ) -> Result<(), SerializeError> {
        w.write_affine(cx.original * self.matrix)
    }
}

impl WriteOp for SetNodeIdOp {
    fn write(
        &self,
        w: &mut PaintOpWriter<'_>,
        _: &mut WriteContext<'_>,
    ) -> Result<(), SerializeError> {
        w.write_i32(self.node_id)
    }
}

impl WriteOp for TranslateOp {
    fn write(
        &self,
        w: &mut PaintOpWriter<'_>,
        _: &mut WriteContext<'_>,
    ) -> Result<(), SerializeError> {
        w.write_f32(self.dx)?;
        w.write_f32(self.dy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::RefCell;

    use crate::FillRule;
    use crate::geometry::RectF;
    use crate::image::{DecodedImage, ImageId};
    use crate::ops::{AnnotationType, OpKind};
    use crate::wire::{HEADER_SIZE, unpack_header};
    use peniko::Color;

    fn serialize(op: &PaintOp, options: &SerializeOptions<'_>) -> Vec<u8> {
        let mut dst = vec![0; 1024];
        let written = try_serialize_op(
            op,
            &mut dst,
            options,
            None,
            &Affine::IDENTITY,
            &Affine::IDENTITY,
        )
        .unwrap();
        dst.truncate(written);
        dst
    }

    fn header(bytes: &[u8]) -> (u8, usize) {
        let mut word = [0; HEADER_SIZE];
        word.copy_from_slice(&bytes[..HEADER_SIZE]);
        unpack_header(u32::from_le_bytes(word))
    }

    fn triangle() -> PaintPath {
        let mut path = BezPath::new();
        path.move_to((0.0, 0.0));
        path.line_to((10.0, 0.0));
        path.line_to((0.0, 10.0));
        path.close_path();
        PaintPath::new(path, FillRule::NonZero)
    }

    #[test]
    fn records_are_padded_and_headed() {
        let op = PaintOp::from(DrawRectOp::new(
            RectF::new(0.0, 0.0, 10.0, 10.0),
            PaintFlags::default(),
        ));
        let bytes = serialize(&op, &SerializeOptions::default());
        let (tag, skip) = header(&bytes);
        assert_eq!(tag, OpKind::DrawRect.tag());
        assert_eq!(skip, bytes.len());
        assert_eq!(skip % PAINT_OP_ALIGN, 0);

        let save = serialize(&SaveOp.into(), &SerializeOptions::default());
        assert_eq!(save, [OpKind::Save.tag(), 8, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn short_destination_writes_nothing() {
        let op = PaintOp::from(DrawRectOp::new(RectF::ZERO, PaintFlags::default()));
        let mut dst = [0_u8; 3];
        let written = serialize_op(
            &op,
            &mut dst,
            &SerializeOptions::default(),
            None,
            &Affine::IDENTITY,
            &Affine::IDENTITY,
        );
        assert_eq!(written, 0);

        let mut dst = [0_u8; 16];
        assert_eq!(
            try_serialize_op(
                &op,
                &mut dst,
                &SerializeOptions::default(),
                None,
                &Affine::IDENTITY,
                &Affine::IDENTITY,
            ),
            Err(SerializeError::InsufficientSpace { capacity: 16 })
        );
    }

    #[test]
    fn flags_override_replaces_written_flags() {
        let op = PaintOp::from(DrawRectOp::new(RectF::ZERO, PaintFlags::default()));
        let red = PaintFlags::from_color(Color::from_rgb8(255, 0, 0));
        let mut plain = vec![0; 256];
        let mut overridden = vec![0; 256];
        let options = SerializeOptions::default();
        let a = serialize_op(&op, &mut plain, &options, None, &Affine::IDENTITY, &Affine::IDENTITY);
        let b = serialize_op(
            &op,
            &mut overridden,
            &options,
            Some(&red),
            &Affine::IDENTITY,
            &Affine::IDENTITY,
        );
        assert_eq!(a, b);
        assert_ne!(plain[..a], overridden[..b]);
        assert_eq!(op.flags(), Some(&PaintFlags::default()));
    }

    #[test]
    #[should_panic(expected = "has no paint flags")]
    fn flags_override_on_plain_op_panics() {
        let mut dst = [0_u8; 64];
        let _ = try_serialize_op(
            &SaveOp.into(),
            &mut dst,
            &SerializeOptions::default(),
            Some(&PaintFlags::default()),
            &Affine::IDENTITY,
            &Affine::IDENTITY,
        );
    }

    #[test]
    fn path_cache_sends_geometry_once() {
        let cache = PathCache::new();
        let options = SerializeOptions {
            path_cache: Some(&cache),
            ..SerializeOptions::default()
        };
        let op = PaintOp::from(DrawPathOp {
            path: triangle(),
            flags: PaintFlags::default(),
        });
        let first = serialize(&op, &options);
        assert!(cache.contains(op_path_id(&op)));
        let second = serialize(&op, &options);
        assert!(second.len() < first.len());
    }

    #[test]
    fn failed_record_does_not_publish_paths() {
        let cache = PathCache::new();
        let options = SerializeOptions {
            path_cache: Some(&cache),
            ..SerializeOptions::default()
        };
        let op = PaintOp::from(DrawPathOp {
            path: triangle(),
            flags: PaintFlags::default(),
        });
        let mut small = [0_u8; 48];
        assert_eq!(
            serialize_op(&op, &mut small, &options, None, &Affine::IDENTITY, &Affine::IDENTITY),
            0
        );
        assert!(cache.is_empty());
    }

    fn op_path_id(op: &PaintOp) -> u64 {
        match op {
            PaintOp::DrawPath(op) => op.path.id(),
            _ => unreachable!("test only passes path ops"),
        }
    }

    #[test]
    fn set_matrix_bakes_original_transform() {
        let op = PaintOp::from(SetMatrixOp {
            matrix: Affine::scale(2.0),
        });
        let original = Affine::translate((5.0, 0.0));
        let mut dst = [0_u8; 64];
        let written = try_serialize_op(
            &op,
            &mut dst,
            &SerializeOptions::default(),
            None,
            &original,
            &original,
        )
        .unwrap();
        assert_eq!(written, 56);
        let mut coeffs = [0.0; 6];
        for (i, c) in coeffs.iter_mut().enumerate() {
            let start = HEADER_SIZE + i * 8;
            let mut bytes = [0; 8];
            bytes.copy_from_slice(&dst[start..start + 8]);
            *c = f64::from_le_bytes(bytes);
        }
        assert_eq!(Affine::new(coeffs), original * Affine::scale(2.0));
    }

    #[test]
    fn flattening_inlines_nested_buffers() {
        let mut inner = PaintOpBuffer::new();
        inner.push(SaveOp);
        inner.push(DrawRectOp::new(RectF::ZERO, PaintFlags::default()));
        inner.push(RestoreOp);
        inner.push(RestoreOp);
        let mut outer = PaintOpBuffer::new();
        outer.push(DrawRecordOp {
            record: Arc::new(inner),
        });

        let options = SerializeOptions {
            flatten_records: true,
            ..SerializeOptions::default()
        };
        let bytes = serialize_buffer(&outer, &options, Affine::IDENTITY).unwrap();
        let mut tags = Vec::new();
        let mut offset = 0;
        while offset < bytes.len() {
            let (tag, skip) = header(&bytes[offset..]);
            tags.push(OpKind::from_tag(tag).unwrap());
            offset += skip;
        }
        assert_eq!(
            tags,
            [
                OpKind::Save,
                OpKind::Save,
                OpKind::DrawRect,
                OpKind::Restore,
                OpKind::Restore
            ]
        );
    }

    #[test]
    fn nesting_depth_is_bounded() {
        let mut record = PaintOpBuffer::new();
        record.push(SaveOp);
        for _ in 0..3 {
            let mut parent = PaintOpBuffer::new();
            parent.push(DrawRecordOp {
                record: Arc::new(record),
            });
            record = parent;
        }
        let options = SerializeOptions {
            max_nesting_depth: 2,
            ..SerializeOptions::default()
        };
        assert_eq!(
            serialize_buffer(&record, &options, Affine::IDENTITY),
            Err(SerializeError::NestingTooDeep(2))
        );
        assert!(serialize_buffer(&record, &SerializeOptions::default(), Affine::IDENTITY).is_ok());
    }

    /// A path op whose record needs several scratch doublings.
    fn long_path_op() -> DrawPathOp {
        let mut path = BezPath::new();
        path.move_to((0.0, 0.0));
        for i in 0..1000 {
            path.line_to((f64::from(i), f64::from(i % 7)));
        }
        DrawPathOp {
            path: PaintPath::new(path, FillRule::EvenOdd),
            flags: PaintFlags::default(),
        }
    }

    #[test]
    fn buffer_serialization_grows_scratch_for_large_records() {
        let mut buffer = PaintOpBuffer::new();
        buffer.push(long_path_op());
        let bytes = serialize_buffer(&buffer, &SerializeOptions::default(), Affine::IDENTITY)
            .unwrap();
        assert!(bytes.len() > INITIAL_SCRATCH);
        assert_eq!(header(&bytes).1, bytes.len());
    }

    #[test]
    fn growing_scratch_for_a_nested_record_keeps_its_depth() {
        let mut inner = PaintOpBuffer::new();
        inner.push(long_path_op());
        let mut outer = PaintOpBuffer::new();
        outer.push(DrawRecordOp {
            record: Arc::new(inner),
        });
        outer.push(SaveOp);

        let options = SerializeOptions {
            max_nesting_depth: 1,
            ..SerializeOptions::default()
        };
        let bytes = serialize_buffer(&outer, &options, Affine::IDENTITY).unwrap();
        let (tag, skip) = header(&bytes);
        assert_eq!(tag, OpKind::DrawRecord.tag());
        assert!(skip > INITIAL_SCRATCH);
        assert_eq!(header(&bytes[skip..]), (OpKind::Save.tag(), 8));
        assert_eq!(bytes.len(), skip + 8);
    }

    /// Records the transform of every decode request.
    #[derive(Default)]
    struct TransformLog(RefCell<Vec<Affine>>);

    impl ImageProvider for TransformLog {
        fn decode_for_transform(
            &self,
            _: &PaintImage,
            transform: &Affine,
        ) -> Option<DecodedImage> {
            self.0.borrow_mut().push(*transform);
            None
        }
    }

    #[test]
    fn growing_scratch_for_a_nested_record_keeps_the_tracked_transform() {
        let image = || DrawImageOp::new(PaintImage::new(ImageId(1), 4, 4), 0.0, 0.0);
        let mut inner = PaintOpBuffer::new();
        inner.push(TranslateOp { dx: 100.0, dy: 0.0 });
        inner.push(long_path_op());
        inner.push(image());
        let mut outer = PaintOpBuffer::new();
        outer.push(SaveOp);
        outer.push(TranslateOp { dx: 10.0, dy: 0.0 });
        outer.push(DrawRecordOp {
            record: Arc::new(inner),
        });
        outer.push(RestoreOp);
        outer.push(image());

        let log = TransformLog::default();
        let options = SerializeOptions {
            image_provider: Some(&log),
            ..SerializeOptions::default()
        };
        serialize_buffer(&outer, &options, Affine::IDENTITY).unwrap();

        // The nested image is only reached by attempts where the path fit.
        let seen = log.0.into_inner();
        let (last, nested) = seen.split_last().unwrap();
        assert!(!nested.is_empty());
        assert!(
            nested
                .iter()
                .all(|t| *t == Affine::translate((110.0, 0.0))),
            "{nested:?}"
        );
        assert_eq!(*last, Affine::IDENTITY);
    }

    #[test]
    fn failed_nested_record_leaves_the_context_unchanged() {
        let mut inner = PaintOpBuffer::new();
        inner.push(SaveOp);
        inner.push(TranslateOp { dx: 3.0, dy: 0.0 });
        inner.push(long_path_op());
        let op = PaintOp::from(DrawRecordOp {
            record: Arc::new(inner),
        });

        let options = SerializeOptions::default();
        let start = Affine::translate((1.0, 2.0));
        let mut cx = WriteContext::new(&options, None, start, Affine::IDENTITY);
        cx.saved.push(Affine::IDENTITY);
        let mut dst = vec![0; 256];
        assert!(matches!(
            write_record(&op, &mut dst, &mut cx),
            Err(SerializeError::InsufficientSpace { .. })
        ));
        assert_eq!(cx.depth, 0);
        assert_eq!(cx.current, start);
        assert_eq!(cx.saved, [Affine::IDENTITY]);

        let flattened = SerializeOptions {
            flatten_records: true,
            ..SerializeOptions::default()
        };
        let mut cx = WriteContext::new(&flattened, None, start, Affine::IDENTITY);
        let mut w = PaintOpWriter::new(&mut dst);
        assert!(emit(&op, &mut w, &mut cx).is_err());
        assert_eq!(cx.depth, 0);
    }

    fn oversized_annotation() -> PaintOp {
        AnnotateOp {
            annotation_type: AnnotationType::Url,
            rect: RectF::ZERO,
            data: Some(Arc::from(vec![0_u8; MAX_SKIP])),
        }
        .into()
    }

    #[test]
    fn records_past_the_length_field_are_too_large() {
        let op = oversized_annotation();
        let mut dst = vec![0; MAX_SKIP + 64];
        let result = try_serialize_op(
            &op,
            &mut dst,
            &SerializeOptions::default(),
            None,
            &Affine::IDENTITY,
            &Affine::IDENTITY,
        );
        assert!(
            matches!(result, Err(SerializeError::RecordTooLarge(skip)) if skip > MAX_SKIP),
            "{result:?}"
        );

        let mut buffer = PaintOpBuffer::new();
        buffer.push(SaveOp);
        buffer.push(op);
        assert!(matches!(
            serialize_buffer(&buffer, &SerializeOptions::default(), Affine::IDENTITY),
            Err(SerializeError::RecordTooLarge(_))
        ));
    }
}
