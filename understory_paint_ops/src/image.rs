// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Image references, decoded pixels, and the image resolution hook.

use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::geometry::{Affine, RectF};

/// Stable identifier for an image, assigned by the producer.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ImageId(pub u64);

/// Decoded pixels: tightly packed, premultiplied RGBA8 rows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageData {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl ImageData {
    /// Bytes per pixel.
    pub const BYTES_PER_PIXEL: usize = 4;

    /// Wrap pixel data, returning `None` if its length does not match the size.
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Option<Self> {
        (Self::byte_len(width, height)? == pixels.len()).then_some(Self {
            width,
            height,
            pixels,
        })
    }

    /// A `width` x `height` image filled with one premultiplied pixel value.
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Option<Self> {
        let len = Self::byte_len(width, height)?;
        let pixels = rgba.iter().copied().cycle().take(len).collect();
        Some(Self {
            width,
            height,
            pixels,
        })
    }

    /// Number of bytes an image of this size occupies, if it fits in `usize`.
    pub fn byte_len(width: u32, height: u32) -> Option<usize> {
        (width as usize)
            .checked_mul(height as usize)?
            .checked_mul(Self::BYTES_PER_PIXEL)
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw pixel bytes.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }
}

/// An image referenced by a draw op.
///
/// The nominal size is the size the producer laid the image out at. Decoded
/// pixels are optional: a producer may leave decoding to an [`ImageProvider`]
/// on the playback side, or the serializer may embed pixels decoded at
/// serialization time.
#[derive(Clone, Debug)]
pub struct PaintImage {
    /// Producer-assigned identity.
    pub id: ImageId,
    /// Nominal width in local units.
    pub width: u32,
    /// Nominal height in local units.
    pub height: u32,
    /// Already-decoded pixels, if any.
    pub data: Option<Arc<ImageData>>,
}

impl PaintImage {
    /// An image known only by id and nominal size.
    pub fn new(id: ImageId, width: u32, height: u32) -> Self {
        Self {
            id,
            width,
            height,
            data: None,
        }
    }

    /// An image whose pixels are already decoded at nominal size.
    pub fn from_data(id: ImageId, data: ImageData) -> Self {
        Self {
            id,
            width: data.width(),
            height: data.height(),
            data: Some(Arc::new(data)),
        }
    }

    /// Returns `true` if pixels are attached.
    pub fn is_decoded(&self) -> bool {
        self.data.is_some()
    }

    /// The image rectangle at nominal size with its origin at `(left, top)`.
    pub fn rect_at(&self, left: f32, top: f32) -> RectF {
        RectF::from_origin_size(left, top, self.width as f32, self.height as f32)
    }
}

/// Images compare by identity and nominal size; attached pixels are ignored.
impl PartialEq for PaintImage {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.width == other.width && self.height == other.height
    }
}

/// Result of resolving a [`PaintImage`] through an [`ImageProvider`].
#[derive(Clone, Debug)]
pub struct DecodedImage {
    /// Decoded pixels.
    pub data: Arc<ImageData>,
    /// Decoded size divided by nominal size, per axis.
    pub scale_adjustment: (f32, f32),
}

impl DecodedImage {
    /// Wrap decoded pixels, computing the scale adjustment against `image`.
    ///
    /// A zero nominal dimension yields a scale adjustment of 1 on that axis.
    pub fn for_image(image: &PaintImage, data: Arc<ImageData>) -> Self {
        let axis = |decoded: u32, nominal: u32| {
            if nominal == 0 {
                1.0
            } else {
                decoded as f32 / nominal as f32
            }
        };
        let scale_adjustment = (
            axis(data.width(), image.width),
            axis(data.height(), image.height),
        );
        Self {
            data,
            scale_adjustment,
        }
    }

    /// Returns `true` if the decoded pixels are not at nominal size.
    pub fn needs_scale_adjustment(&self) -> bool {
        self.scale_adjustment != (1.0, 1.0)
    }
}

/// Image resolution hook consulted during serialization and playback.
///
/// Implementations typically front a decode cache. `transform` is the
/// transform the image will be drawn under, so a provider may decode at a
/// reduced size and report it through [`DecodedImage::scale_adjustment`].
pub trait ImageProvider {
    /// Resolve `image` for drawing under `transform`, or `None` if it is unavailable.
    fn decode_for_transform(&self, image: &PaintImage, transform: &Affine)
    -> Option<DecodedImage>;
}
