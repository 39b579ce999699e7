//! Virtualized list engine for the seal transit operations dashboard.
//!
//! Renders only the slice of a large collection that covers the viewport:
//! - Windowing math: [`compute_visible_range`], [`find_index_at_offset`],
//!   [`compute_total_extent`] over cached or estimated [`HeightModel`] heights
//! - Scroll prediction: [`ScrollPredictor`] classifies motion into a
//!   [`ScrollPattern`] and widens the window ahead of it
//! - Resource recycling: [`ResourcePool`] with a hard ceiling, plus a
//!   [`MemoryPressureMonitor`]
//! - Self-tuning: [`PerformanceMonitor`] and the hysteresis
//!   [`PerformanceOptimizer`]
//! - Orchestration: [`VirtualController`] ties it together behind an injected
//!   [`Scheduler`]
//!
//! ```
//! use seal_virtual_core::{HeightModel, VirtualController, VirtualizerConfig};
//!
//! let mut list = VirtualController::from_factory(
//!     VirtualizerConfig::default(),
//!     HeightModel::fixed(80.0),
//!     |_| String::new(),
//! )
//! .unwrap();
//! list.set_viewport_size(800.0);
//! list.set_item_count(100_000);
//!
//! let window = list.state().visible_range.unwrap();
//! assert_eq!((window.start, window.end), (0, 15));
//!
//! list.on_scroll(8000.0, 0.0);
//! assert_eq!(list.state().visible_range.unwrap().start, 95);
//! ```

mod config;
mod controller;
mod error;
mod height;
mod memory;
mod optimizer;
mod perf;
mod pool;
mod predictor;
mod range;
mod scheduler;

pub use config::VirtualizerConfig;
pub use controller::{
    Reconciliation, RenderedItem, ScrollAlign, ScrollBehavior, ScrollState, VirtualController,
    WindowState,
};
pub use error::ConfigError;
pub use height::{
    FnHeights, HeightCache, HeightIndex, HeightModel, ItemHeights, ItemLayout, MeasuredHeights,
};
#[cfg(feature = "system-memory")]
pub use memory::SystemMemory;
pub use memory::{
    MemoryPressureConfig, MemoryPressureMonitor, MemoryReading, MemorySource, NoMemorySource,
};
pub use optimizer::{OptimizerAction, OptimizerConfig, PerformanceOptimizer, TuningConfig};
pub use perf::{
    MetricExtras, PerformanceMetrics, PerformanceMonitor, PerformanceThresholds, NEUTRAL_FPS,
};
pub use pool::{PoolConfig, PoolStats, Recyclable, ResourcePool, DEFAULT_KIND};
pub use predictor::{
    PredictorConfig, ScrollDirection, ScrollPattern, ScrollPredictor, ScrollSample,
};
pub use range::{compute_total_extent, compute_visible_range, find_index_at_offset, VisibleRange};
pub use scheduler::{ManualScheduler, Scheduler, TickHandle};
