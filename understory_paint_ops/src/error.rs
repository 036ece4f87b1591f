// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error types for serialization and deserialization.

use crate::OpKind;
use crate::animation::AnimationError;

/// Failure to serialize a record.
///
/// [`SerializeError::InsufficientSpace`] is recoverable: grow the destination
/// and serialize the whole record again.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SerializeError {
    /// The destination cannot hold the record.
    #[error("destination of {capacity} bytes is too small for the record")]
    InsufficientSpace {
        /// Capacity of the destination in bytes.
        capacity: usize,
    },
    /// The padded record would exceed [`MAX_SKIP`](crate::MAX_SKIP).
    #[error("record of {0} bytes exceeds the maximum record length")]
    RecordTooLarge(usize),
    /// Nested records are deeper than the configured limit.
    #[error("nested records exceed the maximum depth of {0}")]
    NestingTooDeep(usize),
}

/// Failure to deserialize a record from untrusted input.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum DeserializeError {
    /// Fewer bytes remain than a record header needs.
    #[error("truncated record header: {remaining} bytes remaining")]
    TruncatedHeader {
        /// Bytes remaining in the input.
        remaining: usize,
    },
    /// The header tag is outside the closed op range.
    #[error("invalid op tag {0}")]
    InvalidTag(u8),
    /// The declared record length runs past the end of the input.
    #[error("record length {skip} exceeds the {remaining} bytes remaining")]
    LengthOutOfBounds {
        /// Declared record length.
        skip: usize,
        /// Bytes remaining in the input.
        remaining: usize,
    },
    /// The declared record length exceeds [`MAX_SKIP`](crate::MAX_SKIP).
    #[error("record length {0} exceeds the maximum record length")]
    LengthTooLarge(usize),
    /// The declared record length is zero or not a multiple of [`PAINT_OP_ALIGN`](crate::PAINT_OP_ALIGN).
    #[error("record length {0} is not a positive multiple of the record alignment")]
    MisalignedLength(usize),
    /// A field read ran past the end of its record.
    #[error("unexpected end of record while reading {0}")]
    UnexpectedEof(&'static str),
    /// A length-prefixed collection declares more elements than allowed.
    #[error("{what} declares {count} elements, limit is {max}")]
    CollectionTooLarge {
        /// Which collection.
        what: &'static str,
        /// Declared element count.
        count: usize,
        /// Maximum permitted element count.
        max: usize,
    },
    /// A record decoded but failed its consistency check.
    #[error("invalid {kind:?} record: {reason}")]
    InvalidRecord {
        /// Kind of the rejected record.
        kind: OpKind,
        /// What was wrong with it.
        reason: &'static str,
    },
    /// An enumerated field holds a value outside its range.
    #[error("invalid value {value} for {field}")]
    InvalidEnum {
        /// Field being decoded.
        field: &'static str,
        /// Raw wire value.
        value: u8,
    },
    /// Nested records are deeper than the configured limit.
    #[error("nested records exceed the maximum depth of {0}")]
    NestingTooDeep(usize),
    /// A path reference names an id that is not in the path cache.
    #[error("path {0} is not in the path cache")]
    UnknownCachedPath(u64),
    /// The embedded animation payload failed to parse.
    #[error("invalid animation payload: {0}")]
    Animation(#[from] AnimationError),
}
