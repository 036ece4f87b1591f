// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Understory Paint Ops: recorded drawing commands with a validated wire format.
//!
//! This crate defines a closed catalogue of paint operations ([`PaintOp`]),
//! an append-only command buffer that stores them ([`PaintOpBuffer`]), a
//! compact binary wire format for moving buffers across a process boundary,
//! and a playback engine that replays buffers against a [`DrawSurface`].
//!
//! # Position in the stack
//!
//! - **Producers** (widget layers, display lists) append ops to a buffer.
//! - **This crate** stores, analyzes, serializes, deserializes and replays
//!   those ops.
//! - **Consumers** implement [`DrawSurface`] on top of a real renderer, or use
//!   the `understory_paint_ops_ref` crate to trace calls in tests.
//!
//! # Core concepts
//!
//! - **Variant registry**: [`OpKind`] names every op with a dense wire tag.
//!   [`OpKind::info`] exposes the static per-kind [`OpInfo`] table (size,
//!   alignment, whether the op draws, whether it carries [`PaintFlags`]).
//! - **Command buffer**: [`PaintOpBuffer`] keeps ops in recording order and
//!   tracks the op count, the total record size and per-buffer analysis
//!   ([`OpStats`]) computed once at append time.
//! - **Wire format**: every record is a packed 32-bit header (tag and padded
//!   length) followed by fixed-order fields, padded to [`PAINT_OP_ALIGN`].
//!   [`serialize_op`] writes one record; [`deserialize_op`] parses one record
//!   from untrusted input and validates it before returning it.
//! - **Playback**: [`PaintOp::replay`] and [`PaintOpBuffer::replay`] drive a
//!   [`DrawSurface`] through a [`PlaybackContext`] that carries the image
//!   resolution hook and the original and current transforms.
//! - **Analysis**: [`op_bounds`] and [`quick_reject`] compute conservative
//!   bounds and visibility; [`OpStats`] counts slow paths and ops that need
//!   external resources.
//!
//! # Example
//!
//! ```
//! use understory_paint_ops::ops::{DrawRectOp, RestoreOp, SaveOp};
//! use understory_paint_ops::{
//!     Affine, DeserializeOptions, PaintFlags, PaintOpBuffer, RectF, SerializeOptions,
//!     deserialize_buffer, serialize_buffer,
//! };
//!
//! let mut buffer = PaintOpBuffer::new();
//! buffer.push(SaveOp);
//! buffer.push(DrawRectOp {
//!     rect: RectF::new(0.0, 0.0, 10.0, 10.0),
//!     flags: PaintFlags::default(),
//! });
//! buffer.push(RestoreOp);
//!
//! let bytes = serialize_buffer(&buffer, &SerializeOptions::default(), Affine::IDENTITY)
//!     .unwrap();
//! let decoded = deserialize_buffer(&bytes, &DeserializeOptions::default()).unwrap();
//! assert_eq!(decoded.op_count(), 3);
//! assert_eq!(decoded.iter().nth(1), buffer.iter().nth(1));
//! ```

#![no_std]

extern crate alloc;

/// Declare a `#[repr(u8)]` enum with explicit wire values and range-checked decoding.
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $(
                $(#[$vmeta:meta])*
                $variant:ident = $value:literal,
            )*
        }
    ) => {
        $(#[$meta])*
        #[repr(u8)]
        $vis enum $name {
            $(
                $(#[$vmeta])*
                $variant = $value,
            )*
        }

        impl $name {
            /// Decode a wire value, returning `None` outside the enumeration.
            pub(crate) const fn from_u8(value: u8) -> Option<Self> {
                match value {
                    $($value => Some(Self::$variant),)*
                    _ => None,
                }
            }

            /// Wire value of this variant.
            pub(crate) const fn to_u8(self) -> u8 {
                self as u8
            }
        }
    };
}

mod analysis;
mod animation;
mod buffer;
mod deserialize;
mod error;
mod flags;
mod geometry;
mod image;
pub mod ops;
mod path;
mod playback;
mod serialize;
mod text;
mod wire;

pub use peniko::{Color, Fill as FillRule};

pub use analysis::{OpStats, op_bounds, quick_reject};
pub use animation::{AnimationError, AnimationOverrides, AnimationPayload};
pub use buffer::{Checkpoint, Iter, OpIndex, PaintOpBuffer};
pub use deserialize::{
    DeserializeOptions, ErrorPolicy, StreamSummary, deserialize_buffer, deserialize_into,
    deserialize_op, deserialize_op_into,
};
pub use error::{DeserializeError, SerializeError};
pub use flags::{BlendMode, PaintFlags, PaintStyle, PathEffect};
pub use geometry::{Affine, IRect, PointF, RectF, RoundedRectF, RoundedRectRadiiF};
pub use image::{DecodedImage, ImageData, ImageId, ImageProvider, PaintImage};
pub use ops::{
    AnnotationType, ClipOp, ImageSampling, OpInfo, OpKind, PaintOp, SrcRectConstraint,
};
pub use path::{PaintPath, PathCache};
pub use playback::{CustomDataCallback, DrawSurface, PlaybackContext, PlaybackFlags};
pub use serialize::{SerializeOptions, serialize_buffer, serialize_op, try_serialize_op};
pub use text::TextRun;
pub use wire::{
    HEADER_SIZE, MAX_SKIP, PAINT_OP_ALIGN, align_up, pack_header, unpack_header, validate_header,
};
