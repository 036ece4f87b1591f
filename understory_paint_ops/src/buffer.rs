// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The append-only command buffer.

use alloc::vec::Vec;
use core::iter::FusedIterator;
use core::slice;

use crate::analysis::OpStats;
use crate::ops::PaintOp;

/// Position of an op inside a [`PaintOpBuffer`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpIndex(usize);

impl OpIndex {
    /// Zero-based position in recording order.
    #[inline]
    pub const fn get(self) -> usize {
        self.0
    }
}

/// Saved buffer state for [`PaintOpBuffer::rollback`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Checkpoint {
    len: usize,
    bytes: usize,
    stats: OpStats,
}

/// An ordered, append-only sequence of paint ops.
///
/// Every op accounts for its kind's record length ([`OpInfo::skip`]) in
/// [`total_bytes`](Self::total_bytes), so the total always equals the sum of
/// the record lengths of the ops it holds. Analysis is accumulated into
/// [`OpStats`] as ops are appended and is never recomputed.
///
/// Ops are never mutated after they are appended. Dropping the buffer drops
/// every op, releasing any images, text runs and nested buffers they share.
///
/// [`OpInfo::skip`]: crate::OpInfo::skip
#[derive(Clone, Debug, Default)]
pub struct PaintOpBuffer {
    ops: Vec<PaintOp>,
    bytes_used: usize,
    stats: OpStats,
}

impl PaintOpBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty buffer with room for `capacity` ops.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ops: Vec::with_capacity(capacity),
            ..Self::default()
        }
    }

    /// Append an op, returning its position.
    pub fn push(&mut self, op: impl Into<PaintOp>) -> OpIndex {
        let op = op.into();
        self.bytes_used += op.skip();
        self.stats.record(&op);
        let index = OpIndex(self.ops.len());
        self.ops.push(op);
        index
    }

    /// The op at `index`, if it exists.
    pub fn get(&self, index: OpIndex) -> Option<&PaintOp> {
        self.ops.get(index.0)
    }

    /// Number of ops in this buffer, not counting nested buffers.
    #[inline]
    pub fn op_count(&self) -> usize {
        self.ops.len()
    }

    /// Number of ops including those in nested buffers, recursively.
    pub fn total_op_count(&self) -> usize {
        self.ops.len() + self.stats.nested_ops
    }

    /// Sum of the record lengths of every op.
    #[inline]
    pub fn total_bytes(&self) -> usize {
        self.bytes_used
    }

    /// Returns `true` if the buffer holds no ops.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Analysis accumulated as ops were appended.
    #[inline]
    pub fn stats(&self) -> &OpStats {
        &self.stats
    }

    /// The ops as a slice, in recording order.
    #[inline]
    pub fn ops(&self) -> &[PaintOp] {
        &self.ops
    }

    /// Iterate over the ops in recording order.
    #[inline]
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            inner: self.ops.iter(),
        }
    }

    /// Capture the current op count, byte count and analysis.
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            len: self.ops.len(),
            bytes: self.bytes_used,
            stats: self.stats,
        }
    }

    /// Drop every op appended since `checkpoint` and restore its counters.
    ///
    /// # Panics
    ///
    /// Panics if the buffer holds fewer ops than when the checkpoint was taken,
    /// which means the checkpoint belongs to another buffer or a cleared one.
    pub fn rollback(&mut self, checkpoint: Checkpoint) {
        assert!(
            checkpoint.len <= self.ops.len(),
            "checkpoint is newer than the buffer"
        );
        self.ops.truncate(checkpoint.len);
        self.bytes_used = checkpoint.bytes;
        self.stats = checkpoint.stats;
    }

    /// Drop every op and reset the counters.
    pub fn clear(&mut self) {
        self.ops.clear();
        self.bytes_used = 0;
        self.stats = OpStats::default();
    }
}

/// Buffers compare by their ops; cached analysis follows from them.
impl PartialEq for PaintOpBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.ops == other.ops
    }
}

impl<T: Into<PaintOp>> Extend<T> for PaintOpBuffer {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for op in iter {
            self.push(op);
        }
    }
}

impl<T: Into<PaintOp>> FromIterator<T> for PaintOpBuffer {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut buffer = Self::new();
        buffer.extend(iter);
        buffer
    }
}

impl<'a> IntoIterator for &'a PaintOpBuffer {
    type Item = &'a PaintOp;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the ops of a [`PaintOpBuffer`], in recording order.
#[derive(Clone, Debug)]
pub struct Iter<'a> {
    inner: slice::Iter<'a, PaintOp>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a PaintOp;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl DoubleEndedIterator for Iter<'_> {
    #[inline]
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back()
    }
}

impl ExactSizeIterator for Iter<'_> {}

impl FusedIterator for Iter<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::PaintFlags;
    use crate::geometry::RectF;
    use crate::ops::{DrawRectOp, OpKind, RestoreOp, SaveOp, TranslateOp};
    use alloc::sync::Arc;

    fn rect_op() -> DrawRectOp {
        DrawRectOp::new(RectF::new(0.0, 0.0, 10.0, 10.0), PaintFlags::default())
    }

    #[test]
    fn counters_track_appends() {
        let mut buffer = PaintOpBuffer::new();
        let first = buffer.push(rect_op());
        buffer.push(SaveOp);
        buffer.push(RestoreOp);

        assert_eq!(first.get(), 0);
        assert_eq!(buffer.op_count(), 3);
        let sum: usize = buffer.iter().map(PaintOp::skip).sum();
        assert_eq!(buffer.total_bytes(), sum);
        assert_eq!(buffer.iter().len(), 3);
    }

    #[test]
    fn iteration_follows_recording_order() {
        let buffer: PaintOpBuffer = [
            PaintOp::from(SaveOp),
            PaintOp::from(TranslateOp { dx: 1.0, dy: 2.0 }),
            PaintOp::from(rect_op()),
            PaintOp::from(RestoreOp),
        ]
        .into_iter()
        .collect();
        let kinds: Vec<_> = buffer.iter().map(PaintOp::kind).collect();
        assert_eq!(
            kinds,
            [OpKind::Save, OpKind::Translate, OpKind::DrawRect, OpKind::Restore]
        );
        // Iteration restarts from the beginning.
        assert_eq!(buffer.iter().next().map(PaintOp::kind), Some(OpKind::Save));
    }

    #[test]
    fn rollback_restores_counters_exactly() {
        let mut buffer = PaintOpBuffer::new();
        buffer.push(rect_op());
        let checkpoint = buffer.checkpoint();
        let bytes = buffer.total_bytes();
        let stats = *buffer.stats();

        buffer.push(SaveOp);
        buffer.push(rect_op());
        assert_ne!(buffer.total_bytes(), bytes);

        buffer.rollback(checkpoint);
        assert_eq!(buffer.op_count(), 1);
        assert_eq!(buffer.total_bytes(), bytes);
        assert_eq!(*buffer.stats(), stats);
    }

    #[test]
    fn clear_resets_everything() {
        let mut buffer = PaintOpBuffer::new();
        buffer.push(rect_op());
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.total_bytes(), 0);
        assert_eq!(*buffer.stats(), OpStats::default());
    }

    #[test]
    fn total_op_count_includes_nested_buffers() {
        let inner: PaintOpBuffer = [rect_op(), rect_op()].into_iter().collect();
        let mut outer = PaintOpBuffer::new();
        outer.push(crate::ops::DrawRecordOp {
            record: Arc::new(inner),
        });
        assert_eq!(outer.op_count(), 1);
        assert_eq!(outer.total_op_count(), 3);
    }

    #[test]
    #[should_panic(expected = "checkpoint is newer than the buffer")]
    fn foreign_checkpoint_panics() {
        let mut a = PaintOpBuffer::new();
        a.push(SaveOp);
        let checkpoint = a.checkpoint();
        let mut b = PaintOpBuffer::new();
        b.rollback(checkpoint);
    }
}
