//! Rolling performance sampling for the list engine.
//!
//! Frame times come from the host's per-frame callback, render times from
//! [`PerformanceMonitor::measure`], and scroll latency from the host
//! reporting the delay between a scroll sample and the repaint showing it.
//! All three are kept in bounded windows and reported as arithmetic means.

use std::collections::VecDeque;
use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Frame rate reported while no frame deltas exist.
pub const NEUTRAL_FPS: f64 = 60.0;

/// Degradation thresholds and window size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceThresholds {
    /// Samples kept per window.
    pub window: usize,
    /// Frame rate below which the list is degraded.
    pub min_fps: f64,
    /// Mean render time (ms) above which the list is degraded.
    pub max_render_ms: f64,
    /// Mean scroll latency (ms) above which the list is degraded.
    pub max_scroll_latency_ms: f64,
}

impl Default for PerformanceThresholds {
    fn default() -> Self {
        Self {
            window: 60,
            min_fps: 30.0,
            max_render_ms: 50.0,
            max_scroll_latency_ms: 100.0,
        }
    }
}

impl PerformanceThresholds {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window == 0 {
            return Err(ConfigError::invalid("performance.window", "must be positive"));
        }
        for (field, value) in [
            ("performance.min_fps", self.min_fps),
            ("performance.max_render_ms", self.max_render_ms),
            ("performance.max_scroll_latency_ms", self.max_scroll_latency_ms),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::invalid(field, "must be a positive number"));
            }
        }
        Ok(())
    }
}

/// Caller-supplied figures merged into [`PerformanceMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MetricExtras {
    pub items_rendered: usize,
    pub cache_hit_rate: f64,
    pub recycle_rate: f64,
}

/// Snapshot of the rolling windows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceMetrics {
    pub fps: f64,
    pub avg_frame_ms: f64,
    pub avg_render_ms: f64,
    pub avg_scroll_latency_ms: f64,
    pub frames: u64,
    pub items_rendered: usize,
    pub cache_hit_rate: f64,
    pub recycle_rate: f64,
}

impl fmt::Display for PerformanceMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Virtual List Performance ===")?;
        writeln!(f, "fps={:.1} frame={:.2}ms frames={}", self.fps, self.avg_frame_ms, self.frames)?;
        writeln!(
            f,
            "render={:.2}ms scroll_latency={:.2}ms",
            self.avg_render_ms, self.avg_scroll_latency_ms
        )?;
        write!(
            f,
            "items={} cache_hit={:.0}% recycle={:.0}%",
            self.items_rendered,
            self.cache_hit_rate * 100.0,
            self.recycle_rate * 100.0
        )
    }
}

/// Fixed-capacity window of millisecond samples.
#[derive(Debug, Clone)]
struct Window {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl Window {
    fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, value: f64) {
        if !value.is_finite() || value < 0.0 {
            return;
        }
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    fn mean(&self) -> Option<f64> {
        if self.samples.is_empty() {
            None
        } else {
            Some(self.samples.iter().sum::<f64>() / self.samples.len() as f64)
        }
    }

    fn clear(&mut self) {
        self.samples.clear();
    }
}

/// Frame rate, render time and scroll latency sampler.
#[derive(Debug, Clone)]
pub struct PerformanceMonitor {
    thresholds: PerformanceThresholds,
    frames: Window,
    renders: Window,
    latencies: Window,
    last_frame_ms: Option<f64>,
    total_frames: u64,
    running: bool,
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new(PerformanceThresholds::default())
    }
}

impl PerformanceMonitor {
    pub fn new(thresholds: PerformanceThresholds) -> Self {
        let window = thresholds.window.max(1);
        Self {
            thresholds,
            frames: Window::new(window),
            renders: Window::new(window),
            latencies: Window::new(window),
            last_frame_ms: None,
            total_frames: 0,
            running: true,
        }
    }

    pub const fn thresholds(&self) -> &PerformanceThresholds {
        &self.thresholds
    }

    pub const fn is_running(&self) -> bool {
        self.running
    }

    /// Resume frame sampling. The next frame starts a fresh delta.
    pub fn start(&mut self) {
        self.running = true;
        self.last_frame_ms = None;
    }

    /// Stop frame sampling. Recorded windows are kept for reporting.
    pub fn stop(&mut self) {
        self.running = false;
    }

    /// Record a frame callback at host time `now_ms`.
    pub fn record_frame(&mut self, now_ms: f64) {
        if !self.running {
            return;
        }
        if let Some(last) = self.last_frame_ms {
            self.frames.push(now_ms - last);
        }
        self.last_frame_ms = Some(now_ms);
        self.total_frames += 1;
    }

    pub fn record_render_time(&mut self, ms: f64) {
        self.renders.push(ms);
    }

    pub fn record_scroll_latency(&mut self, ms: f64) {
        self.latencies.push(ms);
    }

    /// Run `f`, recording its wall time as render time.
    pub fn measure<T>(&mut self, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let result = f();
        self.record_render_time(start.elapsed().as_secs_f64() * 1000.0);
        result
    }

    /// Mean frame rate of the window, [`NEUTRAL_FPS`] when empty.
    pub fn fps(&self) -> f64 {
        match self.frames.mean() {
            Some(avg) if avg > 0.0 => 1000.0 / avg,
            _ => NEUTRAL_FPS,
        }
    }

    pub fn metrics(&self, extras: MetricExtras) -> PerformanceMetrics {
        PerformanceMetrics {
            fps: self.fps(),
            avg_frame_ms: self.frames.mean().unwrap_or(1000.0 / NEUTRAL_FPS),
            avg_render_ms: self.renders.mean().unwrap_or(0.0),
            avg_scroll_latency_ms: self.latencies.mean().unwrap_or(0.0),
            frames: self.total_frames,
            items_rendered: extras.items_rendered,
            cache_hit_rate: extras.cache_hit_rate,
            recycle_rate: extras.recycle_rate,
        }
    }

    /// Whether any mean breaches its threshold.
    pub fn is_degraded(&self) -> bool {
        let metrics = self.metrics(MetricExtras::default());
        metrics.fps < self.thresholds.min_fps
            || metrics.avg_render_ms > self.thresholds.max_render_ms
            || metrics.avg_scroll_latency_ms > self.thresholds.max_scroll_latency_ms
    }

    /// Human-readable snapshot.
    pub fn report(&self, extras: MetricExtras) -> String {
        let mut out = self.metrics(extras).to_string();
        out.push('\n');
        out.push_str(if self.is_degraded() {
            "status: degraded"
        } else {
            "status: ok"
        });
        out
    }

    pub fn reset(&mut self) {
        self.frames.clear();
        self.renders.clear();
        self.latencies.clear();
        self.last_frame_ms = None;
        self.total_frames = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames_every(monitor: &mut PerformanceMonitor, step_ms: f64, count: usize) {
        for i in 0..count {
            monitor.record_frame(step_ms * i as f64);
        }
    }

    #[test]
    fn test_empty_window_is_neutral() {
        let monitor = PerformanceMonitor::default();
        let metrics = monitor.metrics(MetricExtras::default());
        assert_eq!(metrics.fps, NEUTRAL_FPS);
        assert_eq!(metrics.avg_render_ms, 0.0);
        assert!(!monitor.is_degraded());
    }

    #[test]
    fn test_fps_from_frame_deltas() {
        let mut monitor = PerformanceMonitor::default();
        frames_every(&mut monitor, 20.0, 11);
        assert!((monitor.fps() - 50.0).abs() < 1e-9);
        assert_eq!(monitor.metrics(MetricExtras::default()).frames, 11);
    }

    #[test]
    fn test_low_fps_is_degraded() {
        let mut monitor = PerformanceMonitor::default();
        frames_every(&mut monitor, 50.0, 10);
        assert!(monitor.is_degraded());
    }

    #[test]
    fn test_slow_render_or_latency_is_degraded() {
        let mut monitor = PerformanceMonitor::default();
        monitor.record_render_time(80.0);
        assert!(monitor.is_degraded());

        let mut monitor = PerformanceMonitor::default();
        monitor.record_scroll_latency(150.0);
        assert!(monitor.is_degraded());
    }

    #[test]
    fn test_window_is_rolling() {
        let mut monitor = PerformanceMonitor::new(PerformanceThresholds {
            window: 3,
            ..PerformanceThresholds::default()
        });
        for ms in [100.0, 100.0, 100.0, 10.0, 10.0, 10.0] {
            monitor.record_render_time(ms);
        }
        assert!((monitor.metrics(MetricExtras::default()).avg_render_ms - 10.0).abs() < 1e-9);
        assert!(!monitor.is_degraded());
    }

    #[test]
    fn test_invalid_samples_ignored() {
        let mut monitor = PerformanceMonitor::default();
        monitor.record_render_time(f64::NAN);
        monitor.record_scroll_latency(-5.0);
        let metrics = monitor.metrics(MetricExtras::default());
        assert_eq!(metrics.avg_render_ms, 0.0);
        assert_eq!(metrics.avg_scroll_latency_ms, 0.0);
    }

    #[test]
    fn test_stopped_monitor_ignores_frames() {
        let mut monitor = PerformanceMonitor::default();
        monitor.stop();
        frames_every(&mut monitor, 100.0, 5);
        assert_eq!(monitor.metrics(MetricExtras::default()).frames, 0);
        monitor.start();
        frames_every(&mut monitor, 10.0, 3);
        assert!((monitor.fps() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_measure_returns_value_and_records() {
        let mut monitor = PerformanceMonitor::default();
        let value = monitor.measure(|| 21 * 2);
        assert_eq!(value, 42);
        assert!(monitor.renders.mean().is_some());
    }

    #[test]
    fn test_report_mentions_extras_and_status() {
        let mut monitor = PerformanceMonitor::default();
        monitor.record_render_time(80.0);
        let report = monitor.report(MetricExtras {
            items_rendered: 16,
            cache_hit_rate: 0.5,
            recycle_rate: 0.25,
        });
        assert!(report.contains("items=16"));
        assert!(report.contains("cache_hit=50%"));
        assert!(report.contains("status: degraded"));
    }

    #[test]
    fn test_thresholds_validation() {
        assert!(PerformanceThresholds::default().validate().is_ok());
        let bad = PerformanceThresholds {
            min_fps: 0.0,
            ..PerformanceThresholds::default()
        };
        assert!(bad.validate().is_err());
    }
}
