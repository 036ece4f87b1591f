// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Opaque animation payloads and their per-draw overrides.
//!
//! The payload body is not interpreted here. Only a small header is parsed so
//! that the deserializer can bound the override maps that travel with a draw:
//!
//! ```text
//! "UANM" | version: u16 | reserved: u16 | width: f32 | height: f32
//!        | duration: f32 | asset_count: u32 | asset_ids: [u64] | body
//! ```
//!
//! All integers and floats are little-endian.

use alloc::sync::Arc;
use alloc::vec::Vec;

use hashbrown::{HashMap, HashSet};
use peniko::Color;

use crate::image::PaintImage;

const MAGIC: [u8; 4] = *b"UANM";
const VERSION: u16 = 1;
const FIXED_HEADER_LEN: usize = 24;
const ASSET_ID_LEN: usize = 8;

/// Failure to parse an animation payload header.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AnimationError {
    /// The payload is shorter than its header.
    #[error("payload of {0} bytes is shorter than the animation header")]
    Truncated(usize),
    /// The payload does not start with the animation magic.
    #[error("payload does not start with the animation magic")]
    BadMagic,
    /// The header names a version this crate does not understand.
    #[error("unsupported animation version {0}")]
    UnsupportedVersion(u16),
    /// Width, height or duration is negative or not finite.
    #[error("animation size or duration out of range")]
    InvalidDimensions,
    /// The declared asset count cannot fit in the payload.
    #[error("{count} assets declared but at most {max} fit in the payload")]
    TooManyAssets {
        /// Declared asset count.
        count: usize,
        /// Assets that fit in the remaining bytes.
        max: usize,
    },
    /// An asset id is declared twice.
    #[error("asset {0} is declared more than once")]
    DuplicateAsset(u64),
}

fn le_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn le_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn le_f32(bytes: &[u8], at: usize) -> f32 {
    f32::from_bits(le_u32(bytes, at))
}

fn le_u64(bytes: &[u8], at: usize) -> u64 {
    let mut word = [0_u8; 8];
    word.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(word)
}

/// An animation payload with its parsed header.
///
/// Payloads are immutable once parsed and shared between the ops that draw
/// them.
#[derive(Clone, Debug)]
pub struct AnimationPayload {
    bytes: Arc<[u8]>,
    version: u16,
    width: f32,
    height: f32,
    duration: f32,
    asset_ids: Vec<u64>,
}

impl AnimationPayload {
    /// Parse the header of a serialized payload.
    pub fn parse(bytes: &[u8]) -> Result<Self, AnimationError> {
        if bytes.len() < FIXED_HEADER_LEN {
            return Err(AnimationError::Truncated(bytes.len()));
        }
        if bytes[..4] != MAGIC {
            return Err(AnimationError::BadMagic);
        }
        let version = le_u16(bytes, 4);
        if version != VERSION {
            return Err(AnimationError::UnsupportedVersion(version));
        }
        let width = le_f32(bytes, 8);
        let height = le_f32(bytes, 12);
        let duration = le_f32(bytes, 16);
        if ![width, height, duration]
            .iter()
            .all(|v| v.is_finite() && *v >= 0.0)
        {
            return Err(AnimationError::InvalidDimensions);
        }

        let count = le_u32(bytes, 20) as usize;
        let max = (bytes.len() - FIXED_HEADER_LEN) / ASSET_ID_LEN;
        if count > max {
            return Err(AnimationError::TooManyAssets { count, max });
        }
        let mut seen = HashSet::with_capacity(count);
        let mut asset_ids = Vec::with_capacity(count);
        for i in 0..count {
            let id = le_u64(bytes, FIXED_HEADER_LEN + i * ASSET_ID_LEN);
            if !seen.insert(id) {
                return Err(AnimationError::DuplicateAsset(id));
            }
            asset_ids.push(id);
        }

        Ok(Self {
            bytes: Arc::from(bytes),
            version,
            width,
            height,
            duration,
            asset_ids,
        })
    }

    /// Build a payload from its header fields and an opaque body.
    pub fn encode(
        width: f32,
        height: f32,
        duration: f32,
        asset_ids: &[u64],
        body: &[u8],
    ) -> Result<Self, AnimationError> {
        let mut bytes =
            Vec::with_capacity(FIXED_HEADER_LEN + asset_ids.len() * ASSET_ID_LEN + body.len());
        bytes.extend_from_slice(&MAGIC);
        bytes.extend_from_slice(&VERSION.to_le_bytes());
        bytes.extend_from_slice(&0_u16.to_le_bytes());
        bytes.extend_from_slice(&width.to_le_bytes());
        bytes.extend_from_slice(&height.to_le_bytes());
        bytes.extend_from_slice(&duration.to_le_bytes());
        let count = u32::try_from(asset_ids.len()).map_err(|_| AnimationError::TooManyAssets {
            count: asset_ids.len(),
            max: u32::MAX as usize,
        })?;
        bytes.extend_from_slice(&count.to_le_bytes());
        for id in asset_ids {
            bytes.extend_from_slice(&id.to_le_bytes());
        }
        bytes.extend_from_slice(body);
        Self::parse(&bytes)
    }

    /// The complete serialized payload.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Header version.
    pub fn version(&self) -> u16 {
        self.version
    }

    /// Intrinsic size as `(width, height)`.
    pub fn size(&self) -> (f32, f32) {
        (self.width, self.height)
    }

    /// Duration in seconds.
    pub fn duration(&self) -> f32 {
        self.duration
    }

    /// Asset ids the payload declares, in header order.
    pub fn asset_ids(&self) -> &[u64] {
        &self.asset_ids
    }

    /// Returns `true` if `id` is a declared asset.
    pub fn declares_asset(&self, id: u64) -> bool {
        self.asset_ids.contains(&id)
    }
}

impl PartialEq for AnimationPayload {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

/// Per-draw replacements applied to an animation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AnimationOverrides {
    /// Replacement images keyed by declared asset id.
    pub images: HashMap<u64, PaintImage>,
    /// Replacement colors keyed by animation node id.
    pub colors: HashMap<u32, Color>,
}

impl AnimationOverrides {
    /// Returns `true` if no override is set.
    pub fn is_empty(&self) -> bool {
        self.images.is_empty() && self.colors.is_empty()
    }

    /// Checks the overrides against the payload they apply to.
    ///
    /// Image overrides are bounded by the payload's own asset declarations;
    /// color overrides by `max_colors`.
    pub(crate) fn check(
        &self,
        payload: &AnimationPayload,
        max_colors: usize,
    ) -> Result<(), &'static str> {
        if self.images.len() > payload.asset_ids().len() {
            return Err("more image overrides than declared assets");
        }
        if !self.images.keys().all(|id| payload.declares_asset(*id)) {
            return Err("image override for an undeclared asset");
        }
        if self.colors.len() > max_colors {
            return Err("too many color overrides");
        }
        if !self
            .colors
            .values()
            .all(|c| c.components.iter().all(|v| v.is_finite()))
        {
            return Err("non-finite override color");
        }
        Ok(())
    }
}
