// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Wire format primitives: record header, alignment, and bounded cursors.
//!
//! Every record starts with a 32-bit little-endian header word holding the op
//! tag in the low 8 bits and the padded record length ("skip") in the high 24
//! bits. The length counts the header itself and is always a positive
//! multiple of [`PAINT_OP_ALIGN`]. Body fields follow in a fixed order and are
//! little-endian; records are zero-padded up to the next alignment boundary.

use crate::error::{DeserializeError, SerializeError};
use crate::geometry::{Affine, IRect, PointF, RectF, RoundedRectF, RoundedRectRadiiF};
use crate::ops::OpKind;
use peniko::Color;

/// Alignment of every record boundary, in memory and on the wire.
pub const PAINT_OP_ALIGN: usize = 8;

/// Size of the packed record header in bytes.
pub const HEADER_SIZE: usize = 4;

/// Largest representable record length: the 24-bit skip field rounded down to
/// the record alignment.
pub const MAX_SKIP: usize = ((1 << 24) - 1) & !(PAINT_OP_ALIGN - 1);

/// Round `len` up to the next multiple of `align` (a power of two).
#[inline]
pub const fn align_up(len: usize, align: usize) -> usize {
    (len + align - 1) & !(align - 1)
}

/// Pack a tag and record length into a header word.
///
/// `skip` must not exceed [`MAX_SKIP`]; higher bits are discarded.
#[inline]
pub const fn pack_header(tag: u8, skip: u32) -> u32 {
    (skip << 8) | tag as u32
}

/// Split a header word into its tag and record length.
#[inline]
pub const fn unpack_header(word: u32) -> (u8, usize) {
    (word.to_le_bytes()[0], (word >> 8) as usize)
}

/// Validate the header at the start of `input` against the remaining length.
///
/// Checks run in a fixed order: the header must fit, the tag must name a
/// known op, the length must fit in the input and under [`MAX_SKIP`], and the
/// length must be a positive multiple of [`PAINT_OP_ALIGN`]. Nothing past the
/// header is read.
pub fn validate_header(input: &[u8]) -> Result<(OpKind, usize), DeserializeError> {
    let Some(header) = input.first_chunk::<HEADER_SIZE>() else {
        return Err(DeserializeError::TruncatedHeader {
            remaining: input.len(),
        });
    };
    let (tag, skip) = unpack_header(u32::from_le_bytes(*header));
    let kind = OpKind::from_tag(tag).ok_or(DeserializeError::InvalidTag(tag))?;
    if skip > input.len() {
        return Err(DeserializeError::LengthOutOfBounds {
            skip,
            remaining: input.len(),
        });
    }
    if skip > MAX_SKIP {
        return Err(DeserializeError::LengthTooLarge(skip));
    }
    if skip == 0 || skip % PAINT_OP_ALIGN != 0 {
        return Err(DeserializeError::MisalignedLength(skip));
    }
    Ok((kind, skip))
}

/// Bounded cursor writing one record into a caller-provided slice.
#[derive(Debug)]
pub(crate) struct PaintOpWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> PaintOpWriter<'a> {
    pub(crate) fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    fn overflow(&self) -> SerializeError {
        SerializeError::InsufficientSpace {
            capacity: self.buf.len(),
        }
    }

    pub(crate) fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), SerializeError> {
        let end = self
            .pos
            .checked_add(bytes.len())
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| self.overflow())?;
        self.buf[self.pos..end].copy_from_slice(bytes);
        self.pos = end;
        Ok(())
    }

    pub(crate) fn write_u8(&mut self, value: u8) -> Result<(), SerializeError> {
        self.write_bytes(&[value])
    }

    pub(crate) fn write_bool(&mut self, value: bool) -> Result<(), SerializeError> {
        self.write_u8(u8::from(value))
    }

    pub(crate) fn write_u16(&mut self, value: u16) -> Result<(), SerializeError> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub(crate) fn write_u32(&mut self, value: u32) -> Result<(), SerializeError> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub(crate) fn write_i32(&mut self, value: i32) -> Result<(), SerializeError> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub(crate) fn write_u64(&mut self, value: u64) -> Result<(), SerializeError> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub(crate) fn write_f32(&mut self, value: f32) -> Result<(), SerializeError> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub(crate) fn write_f64(&mut self, value: f64) -> Result<(), SerializeError> {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Write a collection length as `u32`.
    pub(crate) fn write_len(&mut self, len: usize) -> Result<(), SerializeError> {
        let len = u32::try_from(len).map_err(|_| SerializeError::RecordTooLarge(len))?;
        self.write_u32(len)
    }

    /// Write a length-prefixed byte run.
    pub(crate) fn write_byte_run(&mut self, bytes: &[u8]) -> Result<(), SerializeError> {
        self.write_len(bytes.len())?;
        self.write_bytes(bytes)
    }

    pub(crate) fn write_point(&mut self, p: PointF) -> Result<(), SerializeError> {
        self.write_f32(p.x)?;
        self.write_f32(p.y)
    }

    pub(crate) fn write_rect(&mut self, r: RectF) -> Result<(), SerializeError> {
        self.write_f32(r.x0)?;
        self.write_f32(r.y0)?;
        self.write_f32(r.x1)?;
        self.write_f32(r.y1)
    }

    pub(crate) fn write_optional_rect(&mut self, r: Option<RectF>) -> Result<(), SerializeError> {
        match r {
            Some(r) => {
                self.write_bool(true)?;
                self.write_rect(r)
            }
            None => self.write_bool(false),
        }
    }

    pub(crate) fn write_irect(&mut self, r: IRect) -> Result<(), SerializeError> {
        self.write_i32(r.x0)?;
        self.write_i32(r.y0)?;
        self.write_i32(r.x1)?;
        self.write_i32(r.y1)
    }

    pub(crate) fn write_rounded_rect(&mut self, rr: RoundedRectF) -> Result<(), SerializeError> {
        self.write_rect(rr.rect)?;
        for radius in rr.radii.as_array() {
            self.write_f32(radius)?;
        }
        Ok(())
    }

    pub(crate) fn write_affine(&mut self, m: Affine) -> Result<(), SerializeError> {
        for c in m.as_coeffs() {
            self.write_f64(c)?;
        }
        Ok(())
    }

    pub(crate) fn write_color(&mut self, color: Color) -> Result<(), SerializeError> {
        for c in color.components {
            self.write_f32(c)?;
        }
        Ok(())
    }

    /// Zero-fill up to the next multiple of `align`, relative to the record start.
    pub(crate) fn pad_to(&mut self, align: usize) -> Result<usize, SerializeError> {
        let target = align_up(self.pos, align);
        if target > self.buf.len() {
            return Err(self.overflow());
        }
        self.buf[self.pos..target].fill(0);
        self.pos = target;
        Ok(target)
    }

    /// Unwritten tail of the destination, used to serialize nested records in place.
    pub(crate) fn remaining_mut(&mut self) -> &mut [u8] {
        &mut self.buf[self.pos..]
    }

    /// Advance past bytes written through [`Self::remaining_mut`].
    pub(crate) fn advance(&mut self, len: usize) {
        debug_assert!(self.pos + len <= self.buf.len(), "advance past capacity");
        self.pos += len;
    }

    /// Overwrite the header word at the record start.
    pub(crate) fn patch_header(&mut self, tag: u8, skip: u32) {
        let word = pack_header(tag, skip).to_le_bytes();
        self.buf[..HEADER_SIZE].copy_from_slice(&word);
    }
}

/// Bounded cursor over one untrusted record.
///
/// Reads never go past the slice the reader was created with; every read
/// failure is reported as [`DeserializeError::UnexpectedEof`] naming the
/// field being decoded.
#[derive(Debug)]
pub(crate) struct PaintOpReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PaintOpReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Unread tail of the record, used to parse nested records in place.
    pub(crate) fn rest(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    pub(crate) fn read_bytes(
        &mut self,
        len: usize,
        what: &'static str,
    ) -> Result<&'a [u8], DeserializeError> {
        if self.remaining() < len {
            return Err(DeserializeError::UnexpectedEof(what));
        }
        let start = self.pos;
        self.pos += len;
        Ok(&self.data[start..self.pos])
    }

    pub(crate) fn skip(&mut self, len: usize, what: &'static str) -> Result<(), DeserializeError> {
        self.read_bytes(len, what).map(|_| ())
    }

    fn read_array<const N: usize>(
        &mut self,
        what: &'static str,
    ) -> Result<[u8; N], DeserializeError> {
        let bytes = self.read_bytes(N, what)?;
        let mut out = [0_u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    pub(crate) fn read_u8(&mut self, what: &'static str) -> Result<u8, DeserializeError> {
        Ok(self.read_array::<1>(what)?[0])
    }

    pub(crate) fn read_bool(&mut self, what: &'static str) -> Result<bool, DeserializeError> {
        match self.read_u8(what)? {
            0 => Ok(false),
            1 => Ok(true),
            value => Err(DeserializeError::InvalidEnum { field: what, value }),
        }
    }

    pub(crate) fn read_u16(&mut self, what: &'static str) -> Result<u16, DeserializeError> {
        Ok(u16::from_le_bytes(self.read_array(what)?))
    }

    pub(crate) fn read_u32(&mut self, what: &'static str) -> Result<u32, DeserializeError> {
        Ok(u32::from_le_bytes(self.read_array(what)?))
    }

    pub(crate) fn read_i32(&mut self, what: &'static str) -> Result<i32, DeserializeError> {
        Ok(i32::from_le_bytes(self.read_array(what)?))
    }

    pub(crate) fn read_u64(&mut self, what: &'static str) -> Result<u64, DeserializeError> {
        Ok(u64::from_le_bytes(self.read_array(what)?))
    }

    pub(crate) fn read_f32(&mut self, what: &'static str) -> Result<f32, DeserializeError> {
        Ok(f32::from_le_bytes(self.read_array(what)?))
    }

    pub(crate) fn read_f64(&mut self, what: &'static str) -> Result<f64, DeserializeError> {
        Ok(f64::from_le_bytes(self.read_array(what)?))
    }

    /// Read an element count and check it against `max` and the bytes left.
    ///
    /// `min_element_size` is the smallest encoding of one element, so a
    /// corrupted count cannot trigger an allocation larger than the input.
    pub(crate) fn read_count(
        &mut self,
        what: &'static str,
        max: usize,
        min_element_size: usize,
    ) -> Result<usize, DeserializeError> {
        let count = self.read_u32(what)? as usize;
        if count > max {
            return Err(DeserializeError::CollectionTooLarge { what, count, max });
        }
        if count.saturating_mul(min_element_size) > self.remaining() {
            return Err(DeserializeError::UnexpectedEof(what));
        }
        Ok(count)
    }

    /// Read a length-prefixed byte run of at most `max` bytes.
    pub(crate) fn read_byte_run(
        &mut self,
        what: &'static str,
        max: usize,
    ) -> Result<&'a [u8], DeserializeError> {
        let len = self.read_count(what, max, 1)?;
        self.read_bytes(len, what)
    }

    pub(crate) fn read_point(&mut self, what: &'static str) -> Result<PointF, DeserializeError> {
        Ok(PointF::new(self.read_f32(what)?, self.read_f32(what)?))
    }

    pub(crate) fn read_rect(&mut self, what: &'static str) -> Result<RectF, DeserializeError> {
        Ok(RectF::new(
            self.read_f32(what)?,
            self.read_f32(what)?,
            self.read_f32(what)?,
            self.read_f32(what)?,
        ))
    }

    pub(crate) fn read_optional_rect(
        &mut self,
        what: &'static str,
    ) -> Result<Option<RectF>, DeserializeError> {
        if self.read_bool(what)? {
            self.read_rect(what).map(Some)
        } else {
            Ok(None)
        }
    }

    pub(crate) fn read_irect(&mut self, what: &'static str) -> Result<IRect, DeserializeError> {
        Ok(IRect::new(
            self.read_i32(what)?,
            self.read_i32(what)?,
            self.read_i32(what)?,
            self.read_i32(what)?,
        ))
    }

    pub(crate) fn read_rounded_rect(
        &mut self,
        what: &'static str,
    ) -> Result<RoundedRectF, DeserializeError> {
        let rect = self.read_rect(what)?;
        let radii = RoundedRectRadiiF::new(
            self.read_f32(what)?,
            self.read_f32(what)?,
            self.read_f32(what)?,
            self.read_f32(what)?,
        );
        Ok(RoundedRectF { rect, radii })
    }

    pub(crate) fn read_affine(&mut self, what: &'static str) -> Result<Affine, DeserializeError> {
        let mut coeffs = [0.0; 6];
        for c in &mut coeffs {
            *c = self.read_f64(what)?;
        }
        Ok(Affine::new(coeffs))
    }

    pub(crate) fn read_color(&mut self, what: &'static str) -> Result<Color, DeserializeError> {
        let mut components = [0.0; 4];
        for c in &mut components {
            *c = self.read_f32(what)?;
        }
        Ok(Color::new(components))
    }

    /// Skip padding up to the next multiple of `align`, relative to the record start.
    pub(crate) fn align_to(&mut self, align: usize) -> Result<(), DeserializeError> {
        let target = align_up(self.pos, align);
        self.skip(target - self.pos, "alignment padding")
    }
}
