//! Orchestration controller: the stateful face of the list engine.
//!
//! Owns the height cache, the scroll state machine, the predictor, the
//! resource pool and the performance loop. Scroll samples flow through
//! [`VirtualController::on_scroll`]; timers are requested from the injected
//! [`Scheduler`] and delivered back through [`VirtualController::poll`]; the
//! host's per-frame callback drives [`VirtualController::on_frame`].
//!
//! ```text
//! scroll sample ──► predictor.observe ──► (throttle) ──► recompute
//!                                                          │
//!      compute_visible_range ◄── heights (cache ∪ model) ◄─┤
//!      predictor.prefetch_range ◄──────────────────────────┤
//!                                                          ▼
//!                                              WindowState + listener
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, trace};

use crate::config::VirtualizerConfig;
use crate::error::ConfigError;
use crate::height::{
    valid_height, HeightCache, HeightIndex, HeightModel, ItemHeights, ItemLayout, MeasuredHeights,
};
use crate::memory::{MemoryPressureMonitor, MemorySource};
use crate::optimizer::{OptimizerAction, PerformanceOptimizer, TuningConfig};
use crate::perf::{MetricExtras, PerformanceMetrics, PerformanceMonitor};
use crate::pool::{PoolStats, Recyclable, ResourcePool};
use crate::predictor::{ScrollDirection, ScrollPattern, ScrollPredictor, ScrollSample};
use crate::range::{compute_total_extent, compute_visible_range, find_index_at_offset, VisibleRange};
use crate::scheduler::{ManualScheduler, Scheduler, TickHandle};

/// Scroll activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollState {
    #[default]
    Idle,
    Scrolling,
}

/// Where to place an item when scrolling to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollAlign {
    /// Align item to start of viewport
    Start,
    /// Align item to center of viewport
    Center,
    /// Align item to end of viewport
    End,
    /// Only scroll if item not fully visible
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScrollBehavior {
    /// Jump in one step.
    #[default]
    Instant,
    /// Ease out over `smooth_scroll_ms`, one step per frame.
    Smooth,
}

/// The published render window.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct WindowState {
    /// Rows covering the viewport, overscan included.
    pub visible_range: Option<VisibleRange>,
    /// `visible_range` widened by prediction. Always contains it.
    pub prefetch_range: Option<VisibleRange>,
    pub is_scrolling: bool,
    pub direction: Option<ScrollDirection>,
    /// px/s, signed.
    pub velocity: f32,
    pub pattern: ScrollPattern,
    pub confidence: f32,
    pub offset: f32,
    pub total_extent: f64,
}

impl WindowState {
    /// Rows that should exist: prefetch if present, otherwise visible.
    pub fn render_range(&self) -> Option<VisibleRange> {
        self.prefetch_range.or(self.visible_range)
    }

    /// Indices warmed by prediction but outside the visible range.
    pub fn prefetched_indices(&self) -> Vec<usize> {
        match (self.visible_range, self.prefetch_range) {
            (Some(visible), Some(prefetch)) => prefetch
                .indices()
                .filter(|i| !visible.contains(*i))
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// One row of the materialized render window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderedItem<'a, T> {
    pub item: &'a T,
    pub index: usize,
    pub layout_offset: f32,
    /// False for rows that are only prefetched.
    pub visible: bool,
}

/// Outcome of binding pool resources to the render window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    pub acquired: Vec<usize>,
    pub released: Vec<usize>,
    /// Rows left without a resource because the pool was exhausted.
    pub skipped: Vec<usize>,
}

#[derive(Debug)]
struct BoundResource<R> {
    resource: R,
    kind: String,
}

#[derive(Debug, Clone, Copy)]
struct SmoothScroll {
    from: f32,
    to: f32,
    started_ms: f64,
    duration_ms: f64,
}

impl SmoothScroll {
    /// Eased position at `now_ms` and whether the animation is finished.
    fn position(&self, now_ms: f64) -> (f32, bool) {
        let progress = if self.duration_ms > 0.0 {
            ((now_ms - self.started_ms) / self.duration_ms).clamp(0.0, 1.0)
        } else {
            1.0
        };
        let eased = 1.0 - (1.0 - progress).powi(3);
        let position = (self.to - self.from).mul_add(eased as f32, self.from);
        (position, progress >= 1.0)
    }
}

/// Heights view used for every computation: prefix index when it is in
/// sync, cache-over-model otherwise.
enum EngineHeights<'a> {
    Measured(MeasuredHeights<'a>),
    Indexed(&'a HeightIndex),
}

impl ItemHeights for EngineHeights<'_> {
    fn height(&self, index: usize) -> f32 {
        match self {
            Self::Measured(heights) => heights.height(index),
            Self::Indexed(index_tree) => index_tree.height(index),
        }
    }

    fn uniform_height(&self) -> Option<f32> {
        match self {
            Self::Measured(heights) => heights.uniform_height(),
            Self::Indexed(_) => None,
        }
    }

    fn offset_of(&self, index: usize) -> f64 {
        match self {
            Self::Measured(heights) => heights.offset_of(index),
            Self::Indexed(index_tree) => index_tree.offset_of(index),
        }
    }

    fn has_fast_offsets(&self) -> bool {
        matches!(self, Self::Indexed(_))
    }
}

type WindowListener = Box<dyn FnMut(&WindowState)>;

/// Stateful coordinator of one virtualized list.
pub struct VirtualController<R, S = ManualScheduler> {
    config: VirtualizerConfig,
    tuning: TuningConfig,
    model: HeightModel,
    cache: HeightCache,
    index: Option<HeightIndex>,
    item_count: usize,
    viewport_size: f32,
    offset: f32,
    total_extent: f64,
    predictor: ScrollPredictor,
    pool: ResourcePool<R>,
    bound: BTreeMap<usize, BoundResource<R>>,
    scheduler: S,
    perf: PerformanceMonitor,
    optimizer: PerformanceOptimizer,
    memory: MemoryPressureMonitor,
    memory_source: Option<Box<dyn MemorySource>>,
    state: WindowState,
    scroll_state: ScrollState,
    debounce_tick: Option<TickHandle>,
    trailing_tick: Option<TickHandle>,
    /// Timestamp of the oldest sample not yet reflected in `state`.
    pending_since: Option<f64>,
    last_recompute_ms: Option<f64>,
    dirty: bool,
    smooth: Option<SmoothScroll>,
    listener: Option<WindowListener>,
    frames_since_eval: u32,
    torn_down: bool,
}

impl<R, S> fmt::Debug for VirtualController<R, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualController")
            .field("item_count", &self.item_count)
            .field("viewport_size", &self.viewport_size)
            .field("offset", &self.offset)
            .field("tuning", &self.tuning)
            .field("scroll_state", &self.scroll_state)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<R: Recyclable> VirtualController<R, ManualScheduler> {
    /// Controller with a fresh pool built from `config.pool` and a manual scheduler.
    pub fn from_factory(
        config: VirtualizerConfig,
        model: HeightModel,
        factory: impl FnMut(&str) -> R + 'static,
    ) -> Result<Self, ConfigError> {
        let pool = ResourcePool::new(config.pool.clone(), factory);
        Self::new(config, model, pool, ManualScheduler::new())
    }
}

impl<R: Recyclable, S: Scheduler> VirtualController<R, S> {
    pub fn new(
        config: VirtualizerConfig,
        model: HeightModel,
        pool: ResourcePool<R>,
        scheduler: S,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        model.validate()?;
        let mut controller = Self {
            tuning: config.tuning(),
            predictor: ScrollPredictor::new(config.predictor.clone()),
            perf: PerformanceMonitor::new(config.performance.clone()),
            optimizer: PerformanceOptimizer::new(config.optimizer.clone()),
            memory: MemoryPressureMonitor::new(config.memory.clone()),
            config,
            model,
            cache: HeightCache::new(),
            index: None,
            item_count: 0,
            viewport_size: 0.0,
            offset: 0.0,
            total_extent: 0.0,
            pool,
            bound: BTreeMap::new(),
            scheduler,
            memory_source: None,
            state: WindowState::default(),
            scroll_state: ScrollState::Idle,
            debounce_tick: None,
            trailing_tick: None,
            pending_since: None,
            last_recompute_ms: None,
            dirty: false,
            smooth: None,
            listener: None,
            frames_since_eval: 0,
            torn_down: false,
        };
        controller.refresh();
        Ok(controller)
    }

    /// Sample host memory on every performance evaluation.
    pub fn with_memory_source(mut self, source: impl MemorySource + 'static) -> Self {
        self.memory_source = Some(Box::new(source));
        self
    }

    /// Called with the window state after each recomputation and on scroll end.
    pub fn set_window_listener(&mut self, listener: impl FnMut(&WindowState) + 'static) {
        self.listener = Some(Box::new(listener));
    }

    // ---------------------------------------------------------------------
    // Accessors
    // ---------------------------------------------------------------------

    pub const fn state(&self) -> &WindowState {
        &self.state
    }

    pub const fn scroll_state(&self) -> ScrollState {
        self.scroll_state
    }

    pub const fn config(&self) -> &VirtualizerConfig {
        &self.config
    }

    /// Tuning currently in effect (after optimizer changes).
    pub const fn tuning(&self) -> &TuningConfig {
        &self.tuning
    }

    pub const fn item_count(&self) -> usize {
        self.item_count
    }

    pub const fn viewport_size(&self) -> f32 {
        self.viewport_size
    }

    /// Latest scroll offset, which may be ahead of `state().offset`.
    pub const fn offset(&self) -> f32 {
        self.offset
    }

    /// Extent as of the last recomputation.
    pub const fn total_extent(&self) -> f64 {
        self.total_extent
    }

    /// True while height updates are not yet reflected in the window.
    pub const fn is_stale(&self) -> bool {
        self.dirty
    }

    pub const fn predictor(&self) -> &ScrollPredictor {
        &self.predictor
    }

    pub const fn optimizer(&self) -> &PerformanceOptimizer {
        &self.optimizer
    }

    pub const fn height_cache(&self) -> &HeightCache {
        &self.cache
    }

    pub const fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    pub const fn is_smooth_scrolling(&self) -> bool {
        self.smooth.is_some()
    }

    pub const fn is_under_memory_pressure(&self) -> bool {
        self.memory.is_under_pressure()
    }

    pub fn prefetched_indices(&self) -> Vec<usize> {
        self.state.prefetched_indices()
    }

    fn heights(&self) -> EngineHeights<'_> {
        match &self.index {
            Some(index) if index.len() == self.item_count => EngineHeights::Indexed(index),
            _ => EngineHeights::Measured(MeasuredHeights::new(&self.model, &self.cache)),
        }
    }

    /// Position and height of a row, or `None` past the end.
    pub fn item_layout(&self, index: usize) -> Option<ItemLayout> {
        if index >= self.item_count {
            return None;
        }
        let heights = self.heights();
        Some(ItemLayout::new(
            heights.offset_of(index) as f32,
            heights.height(index),
        ))
    }

    /// Row under a scroll offset.
    pub fn index_at_offset(&self, offset: f32) -> usize {
        find_index_at_offset(offset, self.item_count, &self.heights())
    }

    /// Whether the viewport bottom is close enough to the end to load more.
    pub fn should_load_more(&self) -> bool {
        self.item_count > 0
            && f64::from(self.offset + self.viewport_size + self.config.load_more_threshold)
                >= self.current_extent()
    }

    /// Overscan after memory pressure adjustments.
    pub fn effective_overscan(&self) -> usize {
        let overscan = self.tuning.overscan;
        if self.memory.is_under_pressure() {
            (overscan / 2).max(1).min(overscan)
        } else {
            overscan
        }
    }

    // ---------------------------------------------------------------------
    // Item collection and viewport
    // ---------------------------------------------------------------------

    /// Change the item count, keeping measurements (appends, infinite loading).
    pub fn set_item_count(&mut self, count: usize) {
        if count == self.item_count {
            return;
        }
        if count < self.item_count {
            self.cache.truncate(count);
        }
        self.item_count = count;
        let leaving: Vec<usize> = self.bound.range(count..).map(|(i, _)| *i).collect();
        for index in leaving {
            self.release_bound(index);
        }
        self.refresh();
    }

    /// Replace the whole collection: forgets measurements and scroll history.
    pub fn replace_items(&mut self, count: usize) {
        debug!(count, measured = self.cache.len(), "Item collection replaced");
        self.predictor.reset();
        self.cache.clear();
        self.index = None;
        self.release_all_bound();
        self.item_count = count;
        self.refresh();
    }

    /// Invalid sizes (negative, NaN) are treated as an empty viewport.
    pub fn set_viewport_size(&mut self, size: f32) {
        self.viewport_size = valid_height(size).unwrap_or(0.0);
        self.refresh();
    }

    /// Record a measured row height.
    ///
    /// Only marks the window stale; the next frame or scroll recomputation
    /// picks it up. Returns false for rejected measurements.
    pub fn update_item_height(&mut self, index: usize, height: f32) -> bool {
        if index >= self.item_count || valid_height(height).is_none() {
            debug!(index, height, "Ignoring height measurement");
            return false;
        }
        self.cache.insert(index, height);
        if let Some(tree) = self.index.as_mut() {
            tree.set(index, height);
        }
        self.dirty = true;
        true
    }

    // ---------------------------------------------------------------------
    // Scroll input
    // ---------------------------------------------------------------------

    /// A user scroll sample. Cancels any smooth scroll in progress.
    pub fn on_scroll(&mut self, offset: f32, now_ms: f64) {
        if self.torn_down {
            return;
        }
        self.smooth = None;
        self.ingest(offset, now_ms);
    }

    /// Scroll so that `index` is placed according to `align`.
    ///
    /// Returns false when the index is out of range, the controller is torn
    /// down, or `Auto` found the row already fully visible.
    pub fn scroll_to_index(
        &mut self,
        index: usize,
        align: ScrollAlign,
        behavior: ScrollBehavior,
        now_ms: f64,
    ) -> bool {
        if self.torn_down {
            return false;
        }
        let Some(layout) = self.item_layout(index) else {
            return false;
        };
        let viewport = self.viewport_size;
        let current = self.offset;
        let target = match align {
            ScrollAlign::Start => layout.offset,
            ScrollAlign::Center => layout.offset - (viewport - layout.height) / 2.0,
            ScrollAlign::End => layout.bottom() - viewport,
            ScrollAlign::Auto => {
                if layout.offset < current {
                    layout.offset
                } else if layout.bottom() > current + viewport {
                    layout.bottom() - viewport
                } else {
                    return false;
                }
            }
        };
        self.scroll_to_offset(target, behavior, now_ms);
        true
    }

    /// Scroll to an absolute offset, clamped to the scrollable extent.
    pub fn scroll_to_offset(&mut self, offset: f32, behavior: ScrollBehavior, now_ms: f64) {
        if self.torn_down {
            return;
        }
        let target = self.clamp_offset(offset);
        self.smooth = None;
        match behavior {
            ScrollBehavior::Smooth
                if self.config.smooth_scroll_ms > 0.0 && (target - self.offset).abs() > 0.5 =>
            {
                self.smooth = Some(SmoothScroll {
                    from: self.offset,
                    to: target,
                    started_ms: now_ms,
                    duration_ms: self.config.smooth_scroll_ms,
                });
            }
            _ => self.ingest(target, now_ms),
        }
    }

    /// Common path for user, programmatic and animated scroll positions.
    fn ingest(&mut self, offset: f32, now_ms: f64) {
        self.offset = self.clamp_offset(offset);
        self.predictor
            .observe(ScrollSample::new(self.offset, now_ms));

        if self.scroll_state == ScrollState::Idle {
            debug!(offset = self.offset, "Scroll started");
        }
        self.scroll_state = ScrollState::Scrolling;
        self.state.is_scrolling = true;

        if let Some(tick) = self.debounce_tick.take() {
            self.scheduler.cancel_tick(tick);
        }
        self.debounce_tick = Some(self.scheduler.request_tick(now_ms + self.config.debounce_ms));

        if self.pending_since.is_none() {
            self.pending_since = Some(now_ms);
        }
        match self.last_recompute_ms {
            Some(last) if now_ms - last < self.tuning.scroll_throttle_ms => {
                if self.trailing_tick.is_none() {
                    let due = last + self.tuning.scroll_throttle_ms;
                    self.trailing_tick = Some(self.scheduler.request_tick(due));
                }
            }
            _ => self.recompute(now_ms),
        }
    }

    fn clamp_offset(&self, offset: f32) -> f32 {
        if offset.is_nan() {
            return 0.0;
        }
        let max = (self.current_extent() - f64::from(self.viewport_size)).max(0.0) as f32;
        offset.clamp(0.0, max)
    }

    /// Extent including measurements not yet applied to the published window.
    fn current_extent(&self) -> f64 {
        if self.dirty {
            compute_total_extent(self.item_count, &self.heights())
        } else {
            self.total_extent
        }
    }

    /// Deliver every tick the scheduler reports as due.
    pub fn poll(&mut self, now_ms: f64) {
        for tick in self.scheduler.take_due(now_ms) {
            self.handle_tick(tick, now_ms);
        }
    }

    /// Deliver one fired tick. Unknown handles are ignored.
    pub fn handle_tick(&mut self, tick: TickHandle, now_ms: f64) {
        if self.trailing_tick == Some(tick) {
            self.trailing_tick = None;
            if self.pending_since.is_some() {
                self.recompute(now_ms);
            }
        } else if self.debounce_tick == Some(tick) {
            self.debounce_tick = None;
            if self.pending_since.is_some() {
                self.recompute(now_ms);
            }
            self.finish_scroll();
        }
    }

    fn finish_scroll(&mut self) {
        self.scroll_state = ScrollState::Idle;
        self.state.is_scrolling = false;
        self.state.velocity = 0.0;
        self.state.direction = None;
        debug!(offset = self.offset, "Scroll ended");
        self.notify();
    }

    /// Per-frame callback: samples frame rate, advances smooth scrolling,
    /// delivers due ticks, evaluates performance and applies stale heights.
    pub fn on_frame(&mut self, now_ms: f64) {
        if self.torn_down {
            return;
        }
        self.perf.record_frame(now_ms);

        if let Some(smooth) = self.smooth {
            let (position, finished) = smooth.position(now_ms);
            if finished {
                self.smooth = None;
            }
            self.ingest(position, now_ms);
        }

        self.poll(now_ms);

        self.frames_since_eval += 1;
        if self.frames_since_eval >= self.config.optimize_interval_frames {
            self.frames_since_eval = 0;
            self.evaluate_performance();
        }

        if self.dirty {
            match self.last_recompute_ms {
                Some(last) if now_ms - last < self.tuning.scroll_throttle_ms => {}
                _ => self.recompute(now_ms),
            }
        }
    }

    // ---------------------------------------------------------------------
    // Recomputation
    // ---------------------------------------------------------------------

    fn needs_index(&self) -> bool {
        self.item_count > self.config.linear_scan_limit
            && MeasuredHeights::new(&self.model, &self.cache)
                .uniform_height()
                .is_none()
    }

    /// Build, resize or drop the prefix index to match the current heights.
    fn sync_index(&mut self) {
        if !self.needs_index() {
            self.index = None;
            return;
        }
        let source = MeasuredHeights::new(&self.model, &self.cache);
        if let Some(index) = self.index.as_mut() {
            if index.len() != self.item_count {
                index.resize(self.item_count, &source);
            }
            return;
        }
        debug!(items = self.item_count, "Building prefix height index");
        self.index = Some(HeightIndex::build(self.item_count, &source));
    }

    /// Recompute outside the scroll path (count, viewport or collection changes).
    fn refresh(&mut self) {
        self.compute_window();
        self.notify();
    }

    fn recompute(&mut self, now_ms: f64) {
        if let Some(tick) = self.trailing_tick.take() {
            self.scheduler.cancel_tick(tick);
        }
        if let Some(since) = self.pending_since.take() {
            self.perf.record_scroll_latency(now_ms - since);
        }
        self.last_recompute_ms = Some(now_ms);

        let started = Instant::now();
        self.compute_window();
        self.perf
            .record_render_time(started.elapsed().as_secs_f64() * 1000.0);
        self.notify();
    }

    fn compute_window(&mut self) {
        self.sync_index();
        let overscan = self.effective_overscan();
        let heights = self.heights();
        let total_extent = compute_total_extent(self.item_count, &heights);
        let max_offset = (total_extent - f64::from(self.viewport_size)).max(0.0) as f32;
        let offset = self.offset.clamp(0.0, max_offset);

        let visible = compute_visible_range(
            offset,
            self.viewport_size,
            self.item_count,
            &heights,
            overscan,
        );
        let confident = self.predictor.confidence() >= self.tuning.prefetch_threshold;
        let prefetch = visible.map(|visible| {
            if !confident {
                return visible;
            }
            let widened = self.predictor.prefetch_range(
                &visible,
                self.predictor.direction(),
                self.predictor.velocity(),
                self.item_count,
                self.config.prefetch_factor,
            );
            let start = (*widened.start()).min(visible.start);
            let end = (*widened.end()).max(visible.end);
            VisibleRange::new(start, end, heights.offset_of(start) as f32)
        });

        self.offset = offset;
        self.total_extent = total_extent;
        self.dirty = false;
        self.state.visible_range = visible;
        self.state.prefetch_range = prefetch;
        self.state.offset = offset;
        self.state.total_extent = total_extent;
        self.state.pattern = self.predictor.pattern();
        self.state.confidence = self.predictor.confidence();
        if self.scroll_state == ScrollState::Scrolling {
            self.state.direction = self.predictor.direction();
            self.state.velocity = self.predictor.velocity();
        }
        trace!(
            start = visible.map(|v| v.start),
            end = visible.map(|v| v.end),
            offset,
            overscan,
            pattern = %self.state.pattern,
            "Recomputed visible range"
        );
    }

    fn notify(&mut self) {
        if let Some(listener) = self.listener.as_mut() {
            listener(&self.state);
        }
    }

    // ---------------------------------------------------------------------
    // Performance loop
    // ---------------------------------------------------------------------

    /// Run one optimizer cycle and the memory pressure check.
    pub fn evaluate_performance(&mut self) -> Option<OptimizerAction> {
        let was_pressured = self.memory.is_under_pressure();
        if let Some(source) = self.memory_source.as_deref_mut() {
            self.memory.sample(source);
        }
        let pressured = self.memory.is_under_pressure();
        if pressured {
            self.pool.optimize_pools();
        }
        if pressured != was_pressured {
            self.dirty = true;
        }

        let action = self
            .optimizer
            .evaluate(self.perf.is_degraded(), &self.tuning);
        match action {
            Some(OptimizerAction::Apply(tuning) | OptimizerAction::Revert(tuning)) => {
                self.tuning = tuning;
                self.dirty = true;
            }
            Some(OptimizerAction::Propose(_)) | None => {}
        }
        action
    }

    /// Apply the optimizer's pending proposal (`auto_apply = false`).
    pub fn apply_pending_proposal(&mut self) -> Option<TuningConfig> {
        let tuning = self.optimizer.accept_proposal(&self.tuning)?;
        self.tuning = tuning;
        self.dirty = true;
        Some(tuning)
    }

    /// Host-measured delay between a scroll sample and its repaint.
    pub fn record_scroll_latency(&mut self, ms: f64) {
        self.perf.record_scroll_latency(ms);
    }

    /// Run host render work, recording its duration.
    pub fn measure_render<T>(&mut self, render: impl FnOnce() -> T) -> T {
        self.perf.measure(render)
    }

    pub fn performance_metrics(&self) -> PerformanceMetrics {
        self.perf.metrics(self.metric_extras())
    }

    pub fn performance_report(&self) -> String {
        let mut report = self.perf.report(self.metric_extras());
        report.push_str(&format!(
            "\noverscan={} throttle={}ms pattern={} confidence={:.2}",
            self.effective_overscan(),
            self.tuning.scroll_throttle_ms,
            self.state.pattern,
            self.state.confidence
        ));
        report
    }

    fn metric_extras(&self) -> MetricExtras {
        let stats = self.pool.stats();
        let returned = stats.recycled + stats.discarded;
        MetricExtras {
            items_rendered: self.state.render_range().map_or(0, |r| r.len()),
            cache_hit_rate: stats.hit_rate,
            recycle_rate: if returned == 0 {
                0.0
            } else {
                stats.recycled as f64 / returned as f64
            },
        }
    }

    // ---------------------------------------------------------------------
    // Output
    // ---------------------------------------------------------------------

    /// Materialize the render window over `items`.
    ///
    /// If `items` is shorter than the configured count, rows past its end are
    /// left out.
    pub fn render_window<'a, T>(&self, items: &'a [T]) -> Vec<RenderedItem<'a, T>> {
        let count = items.len().min(self.item_count);
        let Some(range) = self.state.render_range() else {
            return Vec::new();
        };
        if count == 0 || range.start >= count {
            return Vec::new();
        }
        let visible = self.state.visible_range;
        let heights = self.heights();
        let end = range.end.min(count - 1);
        let mut layout_offset = heights.offset_of(range.start);
        let mut rendered = Vec::with_capacity(end - range.start + 1);
        for (index, item) in items.iter().enumerate().take(end + 1).skip(range.start) {
            rendered.push(RenderedItem {
                item,
                index,
                layout_offset: layout_offset as f32,
                visible: visible.is_some_and(|v| v.contains(index)),
            });
            layout_offset += f64::from(heights.height(index));
        }
        rendered
    }

    /// Bind pool resources to rows entering the render window and release
    /// those bound to rows that left it. Visible rows are served first.
    pub fn reconcile_resources<K: AsRef<str>>(
        &mut self,
        kind_of: impl Fn(usize) -> K,
    ) -> Reconciliation {
        let mut report = Reconciliation::default();
        let window = self.state.render_range();

        let leaving: Vec<usize> = self
            .bound
            .keys()
            .copied()
            .filter(|i| !window.is_some_and(|w| w.contains(*i)))
            .collect();
        for index in leaving {
            self.release_bound(index);
            report.released.push(index);
        }

        let Some(window) = window else {
            return report;
        };
        let visible = self.state.visible_range.unwrap_or(window);
        let wanted = visible
            .indices()
            .chain(window.indices().filter(|i| !visible.contains(*i)));
        for index in wanted {
            if self.bound.contains_key(&index) {
                continue;
            }
            let kind = kind_of(index);
            match self.pool.acquire(kind.as_ref()) {
                Some(resource) => {
                    self.bound.insert(
                        index,
                        BoundResource {
                            resource,
                            kind: kind.as_ref().to_string(),
                        },
                    );
                    report.acquired.push(index);
                }
                None => report.skipped.push(index),
            }
        }
        report
    }

    /// Resource currently bound to a row.
    pub fn resource(&self, index: usize) -> Option<&R> {
        self.bound.get(&index).map(|b| &b.resource)
    }

    pub fn resource_mut(&mut self, index: usize) -> Option<&mut R> {
        self.bound.get_mut(&index).map(|b| &mut b.resource)
    }

    pub fn bound_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.bound.keys().copied()
    }

    fn release_bound(&mut self, index: usize) {
        if let Some(bound) = self.bound.remove(&index) {
            self.pool.release(bound.resource, &bound.kind);
        }
    }

    fn release_all_bound(&mut self) {
        for (_, bound) in std::mem::take(&mut self.bound) {
            self.pool.release(bound.resource, &bound.kind);
        }
    }

    /// Release every resource, stop sampling and forget scroll history.
    /// The controller ignores input afterwards.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        for tick in [self.debounce_tick.take(), self.trailing_tick.take()]
            .into_iter()
            .flatten()
        {
            self.scheduler.cancel_tick(tick);
        }
        self.release_all_bound();
        self.pool.cleanup();
        self.perf.stop();
        self.predictor.reset();
        self.smooth = None;
        self.pending_since = None;
        self.scroll_state = ScrollState::Idle;
        self.state.is_scrolling = false;
        self.torn_down = true;
        debug!("Virtual list torn down");
    }

    pub const fn is_torn_down(&self) -> bool {
        self.torn_down
    }
}
