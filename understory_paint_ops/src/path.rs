// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Shared path geometry and the cross-process path cache.

use alloc::sync::Arc;
use core::cell::RefCell;
use core::sync::atomic::{AtomicU64, Ordering};

use hashbrown::HashMap;
use kurbo::{BezPath, PathEl, Point};

use crate::FillRule;
use crate::geometry::RectF;

static NEXT_PATH_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) const PATH_INLINE: u8 = 0;
pub(crate) const PATH_CACHED: u8 = 1;

pub(crate) const VERB_MOVE: u8 = 0;
pub(crate) const VERB_LINE: u8 = 1;
pub(crate) const VERB_QUAD: u8 = 2;
pub(crate) const VERB_CUBIC: u8 = 3;
pub(crate) const VERB_CLOSE: u8 = 4;

pub(crate) fn fill_rule_to_u8(rule: FillRule) -> u8 {
    match rule {
        FillRule::NonZero => 0,
        FillRule::EvenOdd => 1,
    }
}

pub(crate) fn fill_rule_from_u8(value: u8) -> Option<FillRule> {
    match value {
        0 => Some(FillRule::NonZero),
        1 => Some(FillRule::EvenOdd),
        _ => None,
    }
}

fn next_path_id() -> u64 {
    NEXT_PATH_ID.fetch_add(1, Ordering::Relaxed)
}

/// Path geometry referenced by clip-path and draw-path ops.
///
/// The geometry is shared, so cloning a `PaintPath` (and therefore the ops
/// that hold one) is cheap. Each path carries a process-local id used by the
/// [`PathCache`] to send repeated geometry only once.
#[derive(Clone, Debug)]
pub struct PaintPath {
    id: u64,
    path: Arc<BezPath>,
    fill_rule: FillRule,
    convex: bool,
}

impl PaintPath {
    /// Wrap `path` with the given fill rule, assigning a fresh id.
    pub fn new(path: BezPath, fill_rule: FillRule) -> Self {
        Self::from_shared(Arc::new(path), fill_rule)
    }

    pub(crate) fn from_shared(path: Arc<BezPath>, fill_rule: FillRule) -> Self {
        let convex = is_convex(path.elements());
        Self {
            id: next_path_id(),
            path,
            fill_rule,
            convex,
        }
    }

    /// Process-local identity of the geometry.
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The underlying geometry.
    #[inline]
    pub fn path(&self) -> &BezPath {
        &self.path
    }

    pub(crate) fn shared_path(&self) -> &Arc<BezPath> {
        &self.path
    }

    /// Fill rule used when filling or clipping.
    #[inline]
    pub fn fill_rule(&self) -> FillRule {
        self.fill_rule
    }

    /// Whether the geometry is a single convex contour.
    #[inline]
    pub fn is_convex(&self) -> bool {
        self.convex
    }

    /// Conservative bounds including control points.
    pub fn bounds(&self) -> Option<RectF> {
        if self.path.elements().is_empty() {
            return None;
        }
        Some(RectF::from_kurbo(self.path.control_box()))
    }

    /// Returns `true` if the path is well formed.
    ///
    /// Every point must be finite, the path must start with a move-to, and a
    /// move-to must follow each close before further segments.
    pub fn is_valid(&self) -> bool {
        is_well_formed(self.path.elements())
    }
}

impl PartialEq for PaintPath {
    fn eq(&self, other: &Self) -> bool {
        self.fill_rule == other.fill_rule
            && (Arc::ptr_eq(&self.path, &other.path)
                || self.path.elements() == other.path.elements())
    }
}

fn is_well_formed(elements: &[PathEl]) -> bool {
    let mut open = false;
    for el in elements {
        let finite = match el {
            PathEl::MoveTo(p) | PathEl::LineTo(p) => p.is_finite(),
            PathEl::QuadTo(a, b) => a.is_finite() && b.is_finite(),
            PathEl::CurveTo(a, b, c) => a.is_finite() && b.is_finite() && c.is_finite(),
            PathEl::ClosePath => true,
        };
        if !finite {
            return false;
        }
        match el {
            PathEl::MoveTo(_) => open = true,
            PathEl::ClosePath => {
                if !open {
                    return false;
                }
                open = false;
            }
            _ if !open => return false,
            _ => {}
        }
    }
    true
}

fn sign(v: f64) -> i8 {
    if v > 0.0 {
        1
    } else if v < 0.0 {
        -1
    } else {
        0
    }
}

/// Trig-free convexity test over the control polygon of a single contour.
///
/// The contour is convex if every turn has the same direction and the edge
/// direction changes sign at most twice along each axis.
fn is_convex(elements: &[PathEl]) -> bool {
    let mut points: alloc::vec::Vec<Point> = alloc::vec::Vec::new();
    let mut contours = 0;
    for el in elements {
        match el {
            PathEl::MoveTo(p) => {
                contours += 1;
                if contours > 1 {
                    return false;
                }
                points.push(*p);
            }
            PathEl::LineTo(p) => points.push(*p),
            PathEl::QuadTo(a, b) => points.extend([*a, *b]),
            PathEl::CurveTo(a, b, c) => points.extend([*a, *b, *c]),
            PathEl::ClosePath => {}
        }
    }
    points.dedup();
    if points.len() > 1 && points.first() == points.last() {
        points.pop();
    }
    if points.len() < 3 {
        // Degenerate contours are trivially convex.
        return true;
    }

    let n = points.len();
    let mut turn = 0_i8;
    let mut x_flips = 0;
    let mut y_flips = 0;
    let mut last_dx = 0_i8;
    let mut last_dy = 0_i8;
    for i in 0..n {
        let a = points[i];
        let b = points[(i + 1) % n];
        let c = points[(i + 2) % n];
        let cross = (b - a).cross(c - b);
        let s = sign(cross);
        if s != 0 {
            if turn != 0 && s != turn {
                return false;
            }
            turn = s;
        }

        let dx = sign(b.x - a.x);
        let dy = sign(b.y - a.y);
        if dx != 0 {
            if last_dx != 0 && dx != last_dx {
                x_flips += 1;
            }
            last_dx = dx;
        }
        if dy != 0 {
            if last_dy != 0 && dy != last_dy {
                y_flips += 1;
            }
            last_dy = dy;
        }
    }
    x_flips <= 2 && y_flips <= 2
}

/// Cache of path geometry shared between a serializer and a deserializer.
///
/// On the sending side, a path whose id is already cached is written as a
/// reference; otherwise its geometry is written inline and cached. On the
/// receiving side, inline geometry is cached under the sender's id so that
/// later references resolve to it. Both sides must see the same sequence of
/// records for the ids to agree.
#[derive(Debug, Default)]
pub struct PathCache {
    entries: RefCell<HashMap<u64, Arc<BezPath>>>,
}

impl PathCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached paths.
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Returns `true` if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Returns `true` if `id` is cached.
    pub fn contains(&self, id: u64) -> bool {
        self.entries.borrow().contains_key(&id)
    }

    /// Remove every entry.
    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }

    pub(crate) fn insert(&self, id: u64, path: Arc<BezPath>) {
        self.entries.borrow_mut().insert(id, path);
    }

    pub(crate) fn get(&self, id: u64) -> Option<Arc<BezPath>> {
        self.entries.borrow().get(&id).cloned()
    }
}
