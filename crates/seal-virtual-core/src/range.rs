//! Windowing math: which rows must be rendered for a scroll offset.
//!
//! Pure functions over an [`ItemHeights`] view. Three paths:
//! - uniform heights: O(1) arithmetic,
//! - prefix-indexed heights ([`HeightIndex`](crate::HeightIndex)): O(log n) binary search,
//! - anything else: a linear accumulation from row 0.
//!
//! All three agree for the same heights.

use std::ops::RangeInclusive;

use serde::Serialize;

use crate::height::ItemHeights;

/// Inclusive index range of rows to render, plus the layout offset of the
/// first one. Always satisfies `start <= end`; "nothing to render" is
/// expressed as `None` by the functions that produce it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VisibleRange {
    /// First row to render (overscan included).
    pub start: usize,
    /// Last row to render, inclusive (overscan included).
    pub end: usize,
    /// Top edge of `start`.
    pub offset_y: f32,
}

impl VisibleRange {
    /// `start` must not exceed `end`.
    pub const fn new(start: usize, end: usize, offset_y: f32) -> Self {
        debug_assert!(start <= end, "inverted visible range");
        Self {
            start,
            end,
            offset_y,
        }
    }

    /// Number of rows in the range
    pub const fn len(&self) -> usize {
        self.end - self.start + 1
    }

    /// Never true; a range always holds at least one row.
    pub const fn is_empty(&self) -> bool {
        false
    }

    pub const fn contains(&self, index: usize) -> bool {
        index >= self.start && index <= self.end
    }

    pub const fn indices(&self) -> RangeInclusive<usize> {
        self.start..=self.end
    }

    /// Smallest range covering both.
    pub fn union(&self, other: &Self) -> Self {
        if other.start < self.start {
            Self::new(other.start, self.end.max(other.end), other.offset_y)
        } else {
            Self::new(self.start, self.end.max(other.end), self.offset_y)
        }
    }
}

/// Negative or NaN offsets scroll to the top.
fn normalize_offset(offset: f32) -> f64 {
    if offset.is_finite() && offset > 0.0 {
        f64::from(offset)
    } else {
        0.0
    }
}

/// Compute the rows to render for a scroll position.
///
/// Returns `None` when `item_count == 0`. A non-positive viewport collapses
/// the range to `[start, start]`.
pub fn compute_visible_range(
    offset: f32,
    viewport_size: f32,
    item_count: usize,
    heights: &impl ItemHeights,
    overscan: usize,
) -> Option<VisibleRange> {
    if item_count == 0 {
        return None;
    }
    let last_index = item_count - 1;
    let offset = normalize_offset(offset);
    let viewport = if viewport_size.is_finite() {
        f64::from(viewport_size)
    } else {
        0.0
    };
    let viewport_end = offset + viewport.max(0.0);

    let (first, last) = match heights.uniform_height().filter(|h| *h > 0.0) {
        Some(height) => {
            let height = f64::from(height);
            let first = (offset / height).floor() as usize;
            let last = (viewport_end / height).ceil() as usize;
            (first.min(last_index), last.min(last_index))
        }
        None if heights.has_fast_offsets() => (
            index_containing(offset, item_count, heights),
            first_starting_at_or_after(viewport_end, item_count, heights),
        ),
        None => scan_linear(offset, viewport_end, item_count, heights),
    };

    let start = first.saturating_sub(overscan);
    if viewport <= 0.0 {
        return Some(VisibleRange::new(start, start, heights.offset_of(start) as f32));
    }
    let end = last.saturating_add(overscan).min(last_index).max(start);
    Some(VisibleRange::new(start, end, heights.offset_of(start) as f32))
}

/// Accumulate heights from row 0 until both edges of the viewport are found.
fn scan_linear(
    offset: f64,
    viewport_end: f64,
    item_count: usize,
    heights: &impl ItemHeights,
) -> (usize, usize) {
    let last_index = item_count - 1;
    let mut first = None;
    let mut top = 0.0_f64;
    for index in 0..item_count {
        let bottom = top + f64::from(heights.height(index));
        if first.is_none() && bottom > offset {
            first = Some(index);
        }
        if top >= viewport_end {
            return (first.unwrap_or(index), index);
        }
        top = bottom;
    }
    (first.unwrap_or(last_index), last_index)
}

/// Smallest index whose top edge is at or past `position`, clamped.
fn first_starting_at_or_after(
    position: f64,
    item_count: usize,
    heights: &impl ItemHeights,
) -> usize {
    let (mut low, mut high) = (0, item_count - 1);
    while low < high {
        let mid = low + (high - low) / 2;
        if heights.offset_of(mid) >= position {
            high = mid;
        } else {
            low = mid + 1;
        }
    }
    low
}

fn index_containing(offset: f64, item_count: usize, heights: &impl ItemHeights) -> usize {
    let (mut low, mut high) = (0, item_count - 1);
    while low < high {
        let mid = low + (high - low) / 2;
        if heights.offset_of(mid + 1) > offset {
            high = mid;
        } else {
            low = mid + 1;
        }
    }
    low
}

/// Index of the row whose span `[top, bottom)` contains `offset`.
///
/// Assumes non-negative heights. An offset sitting exactly on a boundary
/// belongs to the row starting there. Offsets before the first row give 0,
/// offsets past the end give `item_count - 1`. Returns 0 for an empty list.
pub fn find_index_at_offset(offset: f32, item_count: usize, heights: &impl ItemHeights) -> usize {
    if item_count == 0 {
        return 0;
    }
    let offset = normalize_offset(offset);
    if let Some(height) = heights.uniform_height().filter(|h| *h > 0.0) {
        return ((offset / f64::from(height)).floor() as usize).min(item_count - 1);
    }
    index_containing(offset, item_count, heights)
}

/// Total scrollable extent of `item_count` rows.
pub fn compute_total_extent(item_count: usize, heights: &impl ItemHeights) -> f64 {
    heights.offset_of(item_count)
}
