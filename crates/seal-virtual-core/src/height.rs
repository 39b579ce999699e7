//! Item height model, measured-height cache and prefix-sum index.
//!
//! Heights come from two places: a [`HeightModel`] that estimates every row
//! up front, and a [`HeightCache`] of real measurements reported after rows
//! are rendered. Once an index is measured, the cache wins.

use std::collections::HashMap;
use std::fmt;
use std::ops::RangeInclusive;

use crate::error::ConfigError;

/// Accept a height only if it is a finite, non-negative number.
pub(crate) fn valid_height(height: f32) -> Option<f32> {
    (height.is_finite() && height >= 0.0).then_some(height)
}

/// How row heights are estimated before they are measured.
pub enum HeightModel {
    /// Every row has the same height.
    Fixed(f32),
    /// Per-row lookup. `None` (or an invalid value) means "unknown", in
    /// which case `estimate` is used.
    PerIndex {
        /// Fallback height for rows the lookup cannot answer.
        estimate: f32,
        /// Lookup from index to height.
        height_of: Box<dyn Fn(usize) -> Option<f32>>,
    },
}

impl HeightModel {
    /// Constant-height model.
    #[must_use]
    pub const fn fixed(height: f32) -> Self {
        Self::Fixed(height)
    }

    /// Per-index model with an estimate used for unknown rows.
    pub fn per_index(estimate: f32, height_of: impl Fn(usize) -> Option<f32> + 'static) -> Self {
        Self::PerIndex {
            estimate,
            height_of: Box::new(height_of),
        }
    }

    /// Estimated height of a row.
    pub fn estimate(&self, index: usize) -> f32 {
        match self {
            Self::Fixed(height) => *height,
            Self::PerIndex {
                estimate,
                height_of,
            } => height_of(index).and_then(valid_height).unwrap_or(*estimate),
        }
    }

    /// The constant height, if this is a fixed model.
    pub const fn uniform(&self) -> Option<f32> {
        match self {
            Self::Fixed(height) => Some(*height),
            Self::PerIndex { .. } => None,
        }
    }

    /// Check that the fixed height or fallback estimate is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let (field, height) = match self {
            Self::Fixed(height) => ("height_model.fixed", *height),
            Self::PerIndex { estimate, .. } => ("height_model.estimate", *estimate),
        };
        if height.is_finite() && height > 0.0 {
            Ok(())
        } else {
            Err(ConfigError::invalid(
                field,
                format!("must be a positive finite height, got {height}"),
            ))
        }
    }
}

impl fmt::Debug for HeightModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(height) => f.debug_tuple("Fixed").field(height).finish(),
            Self::PerIndex { estimate, .. } => f
                .debug_struct("PerIndex")
                .field("estimate", estimate)
                .finish_non_exhaustive(),
        }
    }
}

/// Measured row heights, keyed by index.
///
/// Entries are only ever inserted or overwritten, so a cached height is
/// always the latest real measurement for its index. Rows that leave the
/// collection take their entries with them.
#[derive(Debug, Clone, Default)]
pub struct HeightCache {
    heights: HashMap<usize, f32>,
}

impl HeightCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a measurement. Returns the previous measurement, if any.
    ///
    /// Invalid heights (negative, NaN, infinite) are rejected and leave the
    /// cache untouched; `None` is returned in that case too.
    pub fn insert(&mut self, index: usize, height: f32) -> Option<f32> {
        let height = valid_height(height)?;
        self.heights.insert(index, height)
    }

    pub fn get(&self, index: usize) -> Option<f32> {
        self.heights.get(&index).copied()
    }

    pub fn contains(&self, index: usize) -> bool {
        self.heights.contains_key(&index)
    }

    pub fn len(&self) -> usize {
        self.heights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heights.is_empty()
    }

    /// How many indices in `range` have a measurement.
    pub fn measured_in(&self, range: RangeInclusive<usize>) -> usize {
        if range.is_empty() {
            return 0;
        }
        let span = range.end() - range.start() + 1;
        if span <= self.heights.len() {
            range.filter(|i| self.heights.contains_key(i)).count()
        } else {
            self.heights.keys().filter(|i| range.contains(i)).count()
        }
    }

    /// Drop measurements at or past `count`.
    pub fn truncate(&mut self, count: usize) {
        self.heights.retain(|index, _| *index < count);
    }

    /// Drop every measurement. Only used when the item collection is replaced.
    pub fn clear(&mut self) {
        self.heights.clear();
    }
}

/// Read access to per-index heights for the range calculator.
pub trait ItemHeights {
    /// Height of the row at `index`.
    fn height(&self, index: usize) -> f32;

    /// `Some(h)` when every row is known to be exactly `h` tall.
    fn uniform_height(&self) -> Option<f32> {
        None
    }

    /// Top edge of the row at `index` (sum of all heights before it).
    fn offset_of(&self, index: usize) -> f64 {
        if let Some(height) = self.uniform_height() {
            return index as f64 * f64::from(height);
        }
        (0..index).map(|i| f64::from(self.height(i))).sum()
    }

    /// True when `offset_of` is cheaper than a linear scan.
    fn has_fast_offsets(&self) -> bool {
        false
    }
}

/// Adapts a plain height getter closure.
pub struct FnHeights<F>(pub F);

impl<F: Fn(usize) -> f32> ItemHeights for FnHeights<F> {
    fn height(&self, index: usize) -> f32 {
        valid_height((self.0)(index)).unwrap_or(0.0)
    }
}

impl<F> fmt::Debug for FnHeights<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnHeights")
    }
}

/// Heights as the engine sees them: cache first, model estimate otherwise.
#[derive(Debug, Clone, Copy)]
pub struct MeasuredHeights<'a> {
    model: &'a HeightModel,
    cache: &'a HeightCache,
}

impl<'a> MeasuredHeights<'a> {
    pub const fn new(model: &'a HeightModel, cache: &'a HeightCache) -> Self {
        Self { model, cache }
    }
}

impl ItemHeights for MeasuredHeights<'_> {
    fn height(&self, index: usize) -> f32 {
        self.cache
            .get(index)
            .unwrap_or_else(|| self.model.estimate(index))
    }

    fn uniform_height(&self) -> Option<f32> {
        // A single measurement makes the model non-authoritative.
        if self.cache.is_empty() {
            self.model.uniform()
        } else {
            None
        }
    }
}

/// Fenwick tree over row heights: O(log n) offsets and single-row updates.
#[derive(Debug, Clone, Default)]
pub struct HeightIndex {
    heights: Vec<f32>,
    tree: Vec<f64>,
}

const fn lowbit(i: usize) -> usize {
    i & i.wrapping_neg()
}

impl HeightIndex {
    /// Build the index for `count` rows in O(n).
    pub fn build(count: usize, source: &impl ItemHeights) -> Self {
        let heights: Vec<f32> = (0..count).map(|i| source.height(i)).collect();
        let mut tree = vec![0.0_f64; count + 1];
        for i in 1..=count {
            tree[i] += f64::from(heights[i - 1]);
            let parent = i + lowbit(i);
            if parent <= count {
                tree[parent] += tree[i];
            }
        }
        Self { heights, tree }
    }

    pub fn len(&self) -> usize {
        self.heights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heights.is_empty()
    }

    /// Replace the height of one row. Out-of-range indices are ignored.
    pub fn set(&mut self, index: usize, height: f32) {
        let Some(slot) = self.heights.get_mut(index) else {
            return;
        };
        let delta = f64::from(height) - f64::from(*slot);
        *slot = height;
        let mut i = index + 1;
        while i < self.tree.len() {
            self.tree[i] += delta;
            i += lowbit(i);
        }
    }

    /// Append one row in O(log n).
    pub fn push(&mut self, height: f32) {
        if self.tree.is_empty() {
            self.tree.push(0.0);
        }
        let i = self.heights.len() + 1;
        let covered = self.prefix(i - 1) - self.prefix(i - lowbit(i));
        self.heights.push(height);
        self.tree.push(f64::from(height) + covered);
    }

    /// Grow or shrink to `count` rows, reading new rows from `source`.
    pub fn resize(&mut self, count: usize, source: &impl ItemHeights) {
        if count <= self.heights.len() {
            self.heights.truncate(count);
            self.tree.truncate(count + 1);
            return;
        }
        for index in self.heights.len()..count {
            self.push(source.height(index));
        }
    }

    /// Sum of the first `count` heights.
    pub fn prefix(&self, count: usize) -> f64 {
        let mut i = count.min(self.heights.len());
        let mut sum = 0.0;
        while i > 0 {
            sum += self.tree[i];
            i -= lowbit(i);
        }
        sum
    }

    /// Sum of every height.
    pub fn total(&self) -> f64 {
        self.prefix(self.heights.len())
    }
}

impl ItemHeights for HeightIndex {
    fn height(&self, index: usize) -> f32 {
        self.heights.get(index).copied().unwrap_or(0.0)
    }

    fn offset_of(&self, index: usize) -> f64 {
        self.prefix(index)
    }

    fn has_fast_offsets(&self) -> bool {
        true
    }
}

/// Position and size of one row along the scroll axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ItemLayout {
    /// Top edge of the row.
    pub offset: f32,
    /// Height of the row.
    pub height: f32,
}

impl ItemLayout {
    pub const fn new(offset: f32, height: f32) -> Self {
        Self { offset, height }
    }

    /// Get the bottom edge of this row
    pub fn bottom(&self) -> f32 {
        self.offset + self.height
    }
}
