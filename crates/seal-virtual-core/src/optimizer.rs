//! Hysteresis controller that relaxes engine tuning under sustained load.
//!
//! Each evaluation cycle reports whether performance was degraded. After more
//! than `trigger_cycles` consecutive degraded cycles the optimizer halves
//! overscan, raises the prefetch threshold by half and doubles the throttle
//! interval. It reverts after the same number of consecutive healthy cycles,
//! so it can never flip faster than its own trigger window.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ConfigError;

/// The knobs the optimizer is allowed to turn.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TuningConfig {
    pub overscan: usize,
    /// Minimum predictor confidence before prefetching.
    pub prefetch_threshold: f32,
    pub scroll_throttle_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Degraded cycles tolerated before acting; the next one triggers.
    pub trigger_cycles: u32,
    /// Upper bound for the relaxed throttle interval.
    pub max_throttle_ms: f64,
    /// Apply tuning directly instead of only proposing it.
    pub auto_apply: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            trigger_cycles: 5,
            max_throttle_ms: 100.0,
            auto_apply: true,
        }
    }
}

impl OptimizerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.max_throttle_ms.is_finite() && self.max_throttle_ms > 0.0) {
            return Err(ConfigError::invalid(
                "optimizer.max_throttle_ms",
                "must be a positive number",
            ));
        }
        Ok(())
    }
}

/// What an evaluation cycle decided.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OptimizerAction {
    /// Use this relaxed tuning from now on.
    Apply(TuningConfig),
    /// Relaxed tuning suggested but not applied (`auto_apply = false`).
    Propose(TuningConfig),
    /// Performance recovered; restore this tuning.
    Revert(TuningConfig),
}

#[derive(Debug, Clone)]
pub struct PerformanceOptimizer {
    config: OptimizerConfig,
    baseline: Option<TuningConfig>,
    applied: Option<TuningConfig>,
    pending: Option<TuningConfig>,
    degraded_streak: u32,
    healthy_streak: u32,
    applies: u64,
    reverts: u64,
}

impl Default for PerformanceOptimizer {
    fn default() -> Self {
        Self::new(OptimizerConfig::default())
    }
}

impl PerformanceOptimizer {
    pub const fn new(config: OptimizerConfig) -> Self {
        Self {
            config,
            baseline: None,
            applied: None,
            pending: None,
            degraded_streak: 0,
            healthy_streak: 0,
            applies: 0,
            reverts: 0,
        }
    }

    /// Cycles of one kind needed to flip state.
    const fn window(&self) -> u32 {
        self.config.trigger_cycles + 1
    }

    /// Relaxed version of `current`.
    pub fn relax(&self, current: &TuningConfig) -> TuningConfig {
        TuningConfig {
            overscan: (current.overscan / 2).max(1).min(current.overscan),
            prefetch_threshold: (current.prefetch_threshold * 1.5).min(1.0),
            scroll_throttle_ms: (current.scroll_throttle_ms * 2.0).min(self.config.max_throttle_ms),
        }
    }

    /// Feed one cycle's verdict. `current` is the tuning in effect.
    pub fn evaluate(&mut self, degraded: bool, current: &TuningConfig) -> Option<OptimizerAction> {
        if degraded {
            self.healthy_streak = 0;
            self.degraded_streak = self.degraded_streak.saturating_add(1);
            if self.applied.is_some() || self.degraded_streak < self.window() {
                return None;
            }
            let relaxed = self.relax(current);
            if self.config.auto_apply {
                self.apply(*current, relaxed);
                return Some(OptimizerAction::Apply(relaxed));
            }
            if self.pending.is_none() {
                self.pending = Some(relaxed);
                info!(?relaxed, "Proposing relaxed tuning");
                return Some(OptimizerAction::Propose(relaxed));
            }
            return None;
        }

        self.degraded_streak = 0;
        self.healthy_streak = self.healthy_streak.saturating_add(1);
        if self.healthy_streak < self.window() {
            return None;
        }
        self.pending = None;
        let (Some(_), Some(baseline)) = (self.applied.take(), self.baseline.take()) else {
            return None;
        };
        self.healthy_streak = 0;
        self.reverts += 1;
        info!(?baseline, "Performance recovered, reverting tuning");
        Some(OptimizerAction::Revert(baseline))
    }

    fn apply(&mut self, baseline: TuningConfig, relaxed: TuningConfig) {
        self.baseline = Some(baseline);
        self.applied = Some(relaxed);
        self.pending = None;
        self.degraded_streak = 0;
        self.applies += 1;
        info!(?relaxed, "Applying relaxed tuning");
    }

    /// Apply a pending proposal; `current` becomes the revert target.
    pub fn accept_proposal(&mut self, current: &TuningConfig) -> Option<TuningConfig> {
        let relaxed = self.pending.take()?;
        if self.applied.is_some() {
            return None;
        }
        self.apply(*current, relaxed);
        Some(relaxed)
    }

    pub const fn pending_proposal(&self) -> Option<&TuningConfig> {
        self.pending.as_ref()
    }

    pub const fn applied(&self) -> Option<&TuningConfig> {
        self.applied.as_ref()
    }

    pub const fn is_applied(&self) -> bool {
        self.applied.is_some()
    }

    /// Total (applies, reverts) so far.
    pub const fn transitions(&self) -> (u64, u64) {
        (self.applies, self.reverts)
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.config.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: TuningConfig = TuningConfig {
        overscan: 5,
        prefetch_threshold: 0.5,
        scroll_throttle_ms: 16.0,
    };

    fn run(
        optimizer: &mut PerformanceOptimizer,
        degraded: bool,
        cycles: usize,
        current: &TuningConfig,
    ) -> Vec<OptimizerAction> {
        (0..cycles)
            .filter_map(|_| optimizer.evaluate(degraded, current))
            .collect()
    }

    #[test]
    fn test_fewer_than_trigger_never_applies() {
        let mut optimizer = PerformanceOptimizer::default();
        assert!(run(&mut optimizer, true, 5, &BASE).is_empty());
        assert!(!optimizer.is_applied());
    }

    #[test]
    fn test_six_degraded_apply_once_six_healthy_revert_once() {
        let mut optimizer = PerformanceOptimizer::default();
        let applied = run(&mut optimizer, true, 6, &BASE);
        assert_eq!(applied.len(), 1);
        let OptimizerAction::Apply(relaxed) = applied[0] else {
            panic!("expected apply, got {:?}", applied[0]);
        };
        assert_eq!(relaxed.overscan, 2);
        assert!((relaxed.prefetch_threshold - 0.75).abs() < f32::EPSILON);
        assert_eq!(relaxed.scroll_throttle_ms, 32.0);

        // Staying degraded does not stack changes.
        assert!(run(&mut optimizer, true, 20, &relaxed).is_empty());

        assert!(run(&mut optimizer, false, 5, &relaxed).is_empty());
        let reverted = run(&mut optimizer, false, 1, &relaxed);
        assert_eq!(reverted, vec![OptimizerAction::Revert(BASE)]);
        assert!(run(&mut optimizer, false, 20, &BASE).is_empty());
        assert_eq!(optimizer.transitions(), (1, 1));
    }

    #[test]
    fn test_interrupted_streak_restarts() {
        let mut optimizer = PerformanceOptimizer::default();
        assert!(run(&mut optimizer, true, 5, &BASE).is_empty());
        assert!(optimizer.evaluate(false, &BASE).is_none());
        assert!(run(&mut optimizer, true, 5, &BASE).is_empty());
        assert_eq!(run(&mut optimizer, true, 1, &BASE).len(), 1);
    }

    #[test]
    fn test_relax_caps() {
        let optimizer = PerformanceOptimizer::default();
        let relaxed = optimizer.relax(&TuningConfig {
            overscan: 1,
            prefetch_threshold: 0.9,
            scroll_throttle_ms: 80.0,
        });
        assert_eq!(relaxed.overscan, 1);
        assert_eq!(relaxed.prefetch_threshold, 1.0);
        assert_eq!(relaxed.scroll_throttle_ms, 100.0);

        let zero = optimizer.relax(&TuningConfig {
            overscan: 0,
            ..BASE
        });
        assert_eq!(zero.overscan, 0);
    }

    #[test]
    fn test_proposal_mode() {
        let mut optimizer = PerformanceOptimizer::new(OptimizerConfig {
            auto_apply: false,
            ..OptimizerConfig::default()
        });
        let actions = run(&mut optimizer, true, 10, &BASE);
        assert_eq!(actions.len(), 1);
        assert!(matches!(actions[0], OptimizerAction::Propose(_)));
        assert!(!optimizer.is_applied());
        assert!(optimizer.pending_proposal().is_some());

        let accepted = optimizer.accept_proposal(&BASE);
        assert_eq!(accepted.map(|t| t.overscan), Some(2));
        assert!(optimizer.is_applied());
        assert!(optimizer.pending_proposal().is_none());
    }

    #[test]
    fn test_config_validation() {
        assert!(OptimizerConfig::default().validate().is_ok());
        let bad = OptimizerConfig {
            max_throttle_ms: f64::NAN,
            ..OptimizerConfig::default()
        };
        assert!(bad.validate().is_err());
    }
}
