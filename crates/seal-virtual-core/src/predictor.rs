//! Scroll pattern prediction.
//!
//! Feeds on `(offset, timestamp)` samples, classifies recent motion into a
//! [`ScrollPattern`] and widens the visible range in the direction the user
//! is heading. Misclassification only costs prefetch efficiency; the strictly
//! visible range is always computed independently.

use std::collections::VecDeque;
use std::fmt;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::range::VisibleRange;

/// Heuristic classification of recent scroll behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScrollPattern {
    /// Fast, consistent movement toward higher indices.
    FastForward,
    /// Fast, consistent movement toward lower indices.
    FastBackward,
    /// Moderate, mostly consistent reading pace.
    SteadyBrowse,
    /// Large jumps with no stable direction.
    JumpNavigation,
    /// Not enough signal.
    #[default]
    Unknown,
}

impl ScrollPattern {
    /// Every pattern, in counter order.
    pub const ALL: [Self; 5] = [
        Self::FastForward,
        Self::FastBackward,
        Self::SteadyBrowse,
        Self::JumpNavigation,
        Self::Unknown,
    ];

    const fn slot(self) -> usize {
        match self {
            Self::FastForward => 0,
            Self::FastBackward => 1,
            Self::SteadyBrowse => 2,
            Self::JumpNavigation => 3,
            Self::Unknown => 4,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FastForward => "fast-forward",
            Self::FastBackward => "fast-backward",
            Self::SteadyBrowse => "steady-browse",
            Self::JumpNavigation => "jump-navigation",
            Self::Unknown => "unknown",
        }
    }

    const fn implied_direction(self) -> Option<ScrollDirection> {
        match self {
            Self::FastForward => Some(ScrollDirection::Down),
            Self::FastBackward => Some(ScrollDirection::Up),
            _ => None,
        }
    }
}

impl fmt::Display for ScrollPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of the last offset change. `None` stands for "not moving".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    /// Toward lower indices.
    Up,
    /// Toward higher indices.
    Down,
}

impl ScrollDirection {
    fn from_delta(delta: f64) -> Option<Self> {
        if delta > 0.0 {
            Some(Self::Down)
        } else if delta < 0.0 {
            Some(Self::Up)
        } else {
            None
        }
    }
}

/// One scroll position observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollSample {
    /// Scroll offset in pixels.
    pub offset: f32,
    /// Host timestamp in milliseconds.
    pub timestamp_ms: f64,
}

impl ScrollSample {
    pub const fn new(offset: f32, timestamp_ms: f64) -> Self {
        Self {
            offset,
            timestamp_ms,
        }
    }
}

/// Tuning knobs for classification and prefetch widening.
///
/// Thresholds differ between touch and wheel input, so none of them are
/// hard-coded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictorConfig {
    /// Samples kept in history.
    pub history_capacity: usize,
    /// Recent motions considered by classification.
    pub window: usize,
    /// Mean speed (px/s) above which motion counts as fast.
    pub fast_velocity: f64,
    /// Mean speed (px/s) at which steady browsing starts.
    pub steady_min_velocity: f64,
    /// Share of samples that must agree on direction for fast patterns.
    pub fast_consistency: f64,
    /// Share of samples that must agree on direction for steady browsing.
    pub steady_consistency: f64,
    /// Mean per-sample jump (px) that signals jump navigation.
    pub jump_distance: f64,
    /// Per-observation decay applied to pattern counters.
    pub decay: f64,
    /// History length required before confidence is reported.
    pub min_confidence_samples: usize,
    /// Speed (px/s) that doubles the prefetch width.
    pub velocity_scale: f64,
    /// Upper bound on the speed multiplier.
    pub velocity_cap: f64,
    /// Extra widening applied on each side for jump navigation.
    pub jump_multiplier: f64,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            history_capacity: 50,
            window: 10,
            fast_velocity: 3000.0,
            steady_min_velocity: 50.0,
            fast_consistency: 0.8,
            steady_consistency: 0.6,
            jump_distance: 1500.0,
            decay: 0.9,
            min_confidence_samples: 10,
            velocity_scale: 1000.0,
            velocity_cap: 3.0,
            jump_multiplier: 2.0,
        }
    }
}

impl PredictorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.history_capacity < 2 {
            return Err(ConfigError::invalid(
                "predictor.history_capacity",
                "must keep at least 2 samples",
            ));
        }
        if self.window < 2 || self.window > self.history_capacity {
            return Err(ConfigError::invalid(
                "predictor.window",
                format!("must be in 2..={}", self.history_capacity),
            ));
        }
        if !(self.steady_min_velocity >= 0.0 && self.steady_min_velocity < self.fast_velocity) {
            return Err(ConfigError::invalid(
                "predictor.steady_min_velocity",
                "must be non-negative and below fast_velocity",
            ));
        }
        for (field, share) in [
            ("predictor.fast_consistency", self.fast_consistency),
            ("predictor.steady_consistency", self.steady_consistency),
        ] {
            if !(0.0..=1.0).contains(&share) {
                return Err(ConfigError::invalid(field, "must be in 0.0..=1.0"));
            }
        }
        if !(self.decay > 0.0 && self.decay <= 1.0) {
            return Err(ConfigError::invalid("predictor.decay", "must be in (0.0, 1.0]"));
        }
        if !(self.velocity_scale > 0.0) {
            return Err(ConfigError::invalid(
                "predictor.velocity_scale",
                "must be positive",
            ));
        }
        if !(self.jump_distance > 0.0 && self.velocity_cap >= 0.0 && self.jump_multiplier >= 1.0) {
            return Err(ConfigError::invalid(
                "predictor.jump_distance",
                "jump_distance must be positive, velocity_cap non-negative, jump_multiplier >= 1",
            ));
        }
        Ok(())
    }
}

/// Per-sample motion derived from two consecutive samples.
#[derive(Debug, Clone, Copy)]
struct Motion {
    delta: f64,
    /// Signed, px/s.
    velocity: f64,
    direction: Option<ScrollDirection>,
}

/// Stateful scroll analyzer.
#[derive(Debug, Clone)]
pub struct ScrollPredictor {
    config: PredictorConfig,
    samples: VecDeque<ScrollSample>,
    motions: VecDeque<Motion>,
    /// Decayed pattern counters, indexed by `ScrollPattern::slot`.
    counts: [f64; 5],
    pattern: ScrollPattern,
    velocity: f64,
    direction: Option<ScrollDirection>,
}

impl Default for ScrollPredictor {
    fn default() -> Self {
        Self::new(PredictorConfig::default())
    }
}

impl ScrollPredictor {
    pub fn new(config: PredictorConfig) -> Self {
        let capacity = config.history_capacity;
        Self {
            config,
            samples: VecDeque::with_capacity(capacity + 1),
            motions: VecDeque::with_capacity(capacity + 1),
            counts: [0.0; 5],
            pattern: ScrollPattern::Unknown,
            velocity: 0.0,
            direction: None,
        }
    }

    pub const fn config(&self) -> &PredictorConfig {
        &self.config
    }

    /// Record a sample and reclassify.
    pub fn observe(&mut self, sample: ScrollSample) -> ScrollPattern {
        if let Some(previous) = self.samples.back() {
            let delta = f64::from(sample.offset) - f64::from(previous.offset);
            // Timestamps that tie or run backwards still count as 1ms apart.
            let elapsed_ms = (sample.timestamp_ms - previous.timestamp_ms).max(1.0);
            let velocity = delta / elapsed_ms * 1000.0;
            let direction = ScrollDirection::from_delta(delta);
            self.velocity = velocity;
            self.direction = direction;
            self.motions.push_back(Motion {
                delta,
                velocity,
                direction,
            });
            while self.motions.len() >= self.config.history_capacity {
                self.motions.pop_front();
            }
        }
        self.samples.push_back(sample);
        while self.samples.len() > self.config.history_capacity {
            self.samples.pop_front();
        }

        if let Some(pattern) = self.classify() {
            for count in &mut self.counts {
                *count *= self.config.decay;
            }
            self.counts[pattern.slot()] += 1.0;
            self.pattern = pattern;
        } else {
            self.pattern = ScrollPattern::Unknown;
        }
        self.pattern
    }

    /// Classify the most recent window, or `None` without enough motion.
    fn classify(&self) -> Option<ScrollPattern> {
        let take = self.config.window.min(self.motions.len());
        if take < 2 {
            return None;
        }
        let window = self.motions.iter().skip(self.motions.len() - take);

        let (mut speed_sum, mut jump_sum, mut down, mut up) = (0.0, 0.0, 0usize, 0usize);
        for motion in window {
            speed_sum += motion.velocity.abs();
            jump_sum += motion.delta.abs();
            match motion.direction {
                Some(ScrollDirection::Down) => down += 1,
                Some(ScrollDirection::Up) => up += 1,
                None => {}
            }
        }
        let n = take as f64;
        let mean_speed = speed_sum / n;
        let mean_jump = jump_sum / n;
        let consistency = down.max(up) as f64 / n;

        let pattern = if mean_speed > self.config.fast_velocity
            && consistency >= self.config.fast_consistency
        {
            if down >= up {
                ScrollPattern::FastForward
            } else {
                ScrollPattern::FastBackward
            }
        } else if mean_speed >= self.config.steady_min_velocity
            && mean_speed <= self.config.fast_velocity
            && consistency >= self.config.steady_consistency
        {
            ScrollPattern::SteadyBrowse
        } else if mean_jump > self.config.jump_distance {
            ScrollPattern::JumpNavigation
        } else {
            ScrollPattern::Unknown
        };
        Some(pattern)
    }

    pub const fn pattern(&self) -> ScrollPattern {
        self.pattern
    }

    /// Signed velocity of the last sample, px/s.
    pub fn velocity(&self) -> f32 {
        self.velocity as f32
    }

    pub const fn direction(&self) -> Option<ScrollDirection> {
        self.direction
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Dominant decayed count over the total, or 0 while history is short.
    pub fn confidence(&self) -> f32 {
        if self.samples.len() < self.config.min_confidence_samples {
            return 0.0;
        }
        let total: f64 = self.counts.iter().sum();
        if total <= 0.0 {
            return 0.0;
        }
        let dominant = self.counts.iter().copied().fold(0.0, f64::max);
        (dominant / total) as f32
    }

    /// Forget everything. Called when the item collection is replaced.
    pub fn reset(&mut self) {
        self.samples.clear();
        self.motions.clear();
        self.counts = [0.0; 5];
        self.pattern = ScrollPattern::Unknown;
        self.velocity = 0.0;
        self.direction = None;
    }

    /// Widen `visible` according to the current pattern.
    ///
    /// The widening is `factor * visible_len * (1 + min(|velocity| / scale, cap))`
    /// rows, applied ahead of the scroll direction. Jump navigation widens
    /// both sides by `jump_multiplier` times that; `unknown` leaves the range
    /// as it is.
    pub fn prefetch_range(
        &self,
        visible: &VisibleRange,
        direction: Option<ScrollDirection>,
        velocity: f32,
        item_count: usize,
        factor: f32,
    ) -> RangeInclusive<usize> {
        let Some(last_index) = item_count.checked_sub(1) else {
            return visible.indices();
        };
        let (start, end) = (visible.start.min(last_index), visible.end.min(last_index));
        let factor = if factor.is_finite() {
            f64::from(factor.max(0.0))
        } else {
            0.0
        };
        let speed = if velocity.is_finite() {
            f64::from(velocity.abs())
        } else {
            0.0
        };
        let boost = 1.0 + (speed / self.config.velocity_scale).min(self.config.velocity_cap);
        let width = (factor * visible.len() as f64 * boost).ceil() as usize;

        let (before, after) = match self.pattern {
            ScrollPattern::Unknown => (0, 0),
            ScrollPattern::JumpNavigation => {
                let side = (width as f64 * self.config.jump_multiplier).ceil() as usize;
                (side, side)
            }
            pattern => match direction.or_else(|| pattern.implied_direction()) {
                Some(ScrollDirection::Down) => (0, width),
                Some(ScrollDirection::Up) => (width, 0),
                None => (width / 2, width - width / 2),
            },
        };
        start.saturating_sub(before)..=end.saturating_add(after).min(last_index)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn feed(predictor: &mut ScrollPredictor, step_px: f32, step_ms: f64, count: usize) {
        for i in 0..count {
            predictor.observe(ScrollSample::new(step_px * i as f32, step_ms * i as f64));
        }
    }

    #[test]
    fn test_fast_forward_detected_with_confidence() {
        let mut predictor = ScrollPredictor::default();
        feed(&mut predictor, 2000.0, 16.0, 20);
        assert_eq!(predictor.pattern(), ScrollPattern::FastForward);
        assert_eq!(predictor.direction(), Some(ScrollDirection::Down));
        assert!(predictor.confidence() > 0.7, "confidence {}", predictor.confidence());
        assert!((predictor.velocity() - 125_000.0).abs() < 1.0);
    }

    #[test]
    fn test_fast_backward_detected() {
        let mut predictor = ScrollPredictor::default();
        for i in 0..20 {
            let offset = 100_000.0 - 2000.0 * i as f32;
            predictor.observe(ScrollSample::new(offset, 16.0 * f64::from(i)));
        }
        assert_eq!(predictor.pattern(), ScrollPattern::FastBackward);
        assert_eq!(predictor.direction(), Some(ScrollDirection::Up));
    }

    #[test]
    fn test_zero_velocity_is_unknown() {
        let mut predictor = ScrollPredictor::default();
        feed(&mut predictor, 0.0, 16.0, 20);
        assert_eq!(predictor.pattern(), ScrollPattern::Unknown);
        assert_eq!(predictor.direction(), None);
        assert_eq!(predictor.velocity(), 0.0);
    }

    #[test]
    fn test_steady_browse() {
        let mut predictor = ScrollPredictor::default();
        // 20px per 16ms = 1250 px/s
        feed(&mut predictor, 20.0, 16.0, 15);
        assert_eq!(predictor.pattern(), ScrollPattern::SteadyBrowse);
    }

    #[test]
    fn test_jump_navigation() {
        let mut predictor = ScrollPredictor::default();
        let offsets = [0.0, 40_000.0, 5_000.0, 60_000.0, 10_000.0, 80_000.0];
        for (i, offset) in offsets.iter().enumerate() {
            predictor.observe(ScrollSample::new(*offset, 500.0 * i as f64));
        }
        assert_eq!(predictor.pattern(), ScrollPattern::JumpNavigation);
    }

    #[test]
    fn test_confidence_zero_until_enough_samples() {
        let mut predictor = ScrollPredictor::default();
        feed(&mut predictor, 2000.0, 16.0, 9);
        assert_eq!(predictor.pattern(), ScrollPattern::FastForward);
        assert_eq!(predictor.confidence(), 0.0);
        predictor.observe(ScrollSample::new(18_000.0, 144.0));
        assert!(predictor.confidence() > 0.0);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut predictor = ScrollPredictor::default();
        feed(&mut predictor, 5.0, 16.0, 500);
        assert_eq!(predictor.sample_count(), 50);
    }

    #[test]
    fn test_equal_timestamps_do_not_divide_by_zero() {
        let mut predictor = ScrollPredictor::default();
        predictor.observe(ScrollSample::new(0.0, 10.0));
        predictor.observe(ScrollSample::new(30.0, 10.0));
        assert!(predictor.velocity().is_finite());
        assert_eq!(predictor.velocity(), 30_000.0);
    }

    #[test]
    fn test_reset_clears_state() {
        let mut predictor = ScrollPredictor::default();
        feed(&mut predictor, 2000.0, 16.0, 20);
        predictor.reset();
        assert_eq!(predictor.pattern(), ScrollPattern::Unknown);
        assert_eq!(predictor.confidence(), 0.0);
        assert_eq!(predictor.sample_count(), 0);
        assert_eq!(predictor.direction(), None);
    }

    #[test]
    fn test_prefetch_unknown_does_not_widen() {
        let predictor = ScrollPredictor::default();
        let visible = VisibleRange::new(10, 19, 0.0);
        let range = predictor.prefetch_range(&visible, None, 0.0, 1000, 0.5);
        assert_eq!(range, 10..=19);
    }

    #[test]
    fn test_prefetch_widens_ahead_of_fast_scroll() {
        let mut predictor = ScrollPredictor::default();
        feed(&mut predictor, 2000.0, 16.0, 20);
        let visible = VisibleRange::new(100, 109, 0.0);
        // 10 rows * 0.5 * (1 + min(125, 3)) = 20
        let range = predictor.prefetch_range(
            &visible,
            predictor.direction(),
            predictor.velocity(),
            100_000,
            0.5,
        );
        assert_eq!(range, 100..=129);
    }

    #[test]
    fn test_prefetch_backward_and_clamped() {
        let mut predictor = ScrollPredictor::default();
        feed(&mut predictor, 20.0, 16.0, 15);
        let visible = VisibleRange::new(4, 13, 0.0);
        let range = predictor.prefetch_range(&visible, Some(ScrollDirection::Up), 0.0, 14, 1.0);
        assert_eq!(range, 0..=13);
    }

    #[test]
    fn test_prefetch_jump_is_symmetric() {
        let mut predictor = ScrollPredictor::default();
        let offsets = [0.0, 40_000.0, 5_000.0, 60_000.0, 10_000.0, 80_000.0];
        for (i, offset) in offsets.iter().enumerate() {
            predictor.observe(ScrollSample::new(*offset, 500.0 * i as f64));
        }
        let visible = VisibleRange::new(500, 509, 0.0);
        // width = ceil(0.5 * 10 * 1) = 5, each side 10
        let range = predictor.prefetch_range(&visible, None, 0.0, 10_000, 0.5);
        assert_eq!(range, 490..=519);
    }

    #[test]
    fn test_pattern_names() {
        assert_eq!(ScrollPattern::FastForward.to_string(), "fast-forward");
        assert_eq!(ScrollPattern::JumpNavigation.as_str(), "jump-navigation");
        let json = serde_json::to_string(&ScrollPattern::SteadyBrowse).unwrap();
        assert_eq!(json, "\"steady-browse\"");
    }

    #[test]
    fn test_config_validation() {
        assert!(PredictorConfig::default().validate().is_ok());
        let bad = PredictorConfig {
            window: 1,
            ..PredictorConfig::default()
        };
        assert!(bad.validate().is_err());
        let bad = PredictorConfig {
            decay: 0.0,
            ..PredictorConfig::default()
        };
        assert!(bad.validate().is_err());
    }
}
