//! Engine configuration.
//!
//! Every field has a default, so a YAML file only needs the keys it changes:
//!
//! ```yaml
//! overscan: 8
//! throttle_ms: 32
//! pool:
//!   max_resources: 120
//! optimizer:
//!   auto_apply: false
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::memory::MemoryPressureConfig;
use crate::optimizer::{OptimizerConfig, TuningConfig};
use crate::perf::PerformanceThresholds;
use crate::pool::PoolConfig;
use crate::predictor::PredictorConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VirtualizerConfig {
    /// Rows rendered beyond the viewport on each side.
    pub overscan: usize,
    /// Quiet period after the last scroll sample before going idle.
    pub debounce_ms: f64,
    /// Minimum interval between range recomputations.
    pub throttle_ms: f64,
    /// Prefetch width relative to the visible row count.
    pub prefetch_factor: f32,
    /// Predictor confidence required before prefetching beyond overscan.
    pub prefetch_threshold: f32,
    /// Item counts above this use a prefix-sum index for variable heights.
    pub linear_scan_limit: usize,
    /// Distance from the end (px) at which more items should be loaded.
    pub load_more_threshold: f32,
    /// Duration of smooth programmatic scrolls.
    pub smooth_scroll_ms: f64,
    /// Frames between optimizer evaluations.
    pub optimize_interval_frames: u32,
    pub predictor: PredictorConfig,
    pub pool: PoolConfig,
    pub performance: PerformanceThresholds,
    pub optimizer: OptimizerConfig,
    pub memory: MemoryPressureConfig,
}

impl Default for VirtualizerConfig {
    fn default() -> Self {
        Self {
            overscan: 5,
            debounce_ms: 150.0,
            throttle_ms: 16.0,
            prefetch_factor: 0.5,
            prefetch_threshold: 0.5,
            linear_scan_limit: 10_000,
            load_more_threshold: 200.0,
            smooth_scroll_ms: 300.0,
            optimize_interval_frames: 60,
            predictor: PredictorConfig::default(),
            pool: PoolConfig::default(),
            performance: PerformanceThresholds::default(),
            optimizer: OptimizerConfig::default(),
            memory: MemoryPressureConfig::default(),
        }
    }
}

impl VirtualizerConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load, parse and validate a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml_ng::to_string(self)?)
    }

    /// The subset the optimizer may change.
    pub const fn tuning(&self) -> TuningConfig {
        TuningConfig {
            overscan: self.overscan,
            prefetch_threshold: self.prefetch_threshold,
            scroll_throttle_ms: self.throttle_ms,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("debounce_ms", self.debounce_ms),
            ("throttle_ms", self.throttle_ms),
            ("smooth_scroll_ms", self.smooth_scroll_ms),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::invalid(field, "must be a finite, non-negative duration"));
            }
        }
        if !(self.prefetch_factor.is_finite() && self.prefetch_factor >= 0.0) {
            return Err(ConfigError::invalid("prefetch_factor", "must be non-negative"));
        }
        if !(0.0..=1.0).contains(&self.prefetch_threshold) {
            return Err(ConfigError::invalid("prefetch_threshold", "must be in 0.0..=1.0"));
        }
        if !(self.load_more_threshold.is_finite() && self.load_more_threshold >= 0.0) {
            return Err(ConfigError::invalid("load_more_threshold", "must be non-negative"));
        }
        if self.optimize_interval_frames == 0 {
            return Err(ConfigError::invalid("optimize_interval_frames", "must be positive"));
        }
        self.predictor.validate()?;
        self.pool.validate()?;
        self.performance.validate()?;
        self.optimizer.validate()?;
        self.memory.validate()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = VirtualizerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.overscan, 5);
        assert_eq!(config.debounce_ms, 150.0);
        assert_eq!(config.linear_scan_limit, 10_000);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = VirtualizerConfig::from_yaml_str(
            "overscan: 8\npool:\n  max_resources: 120\noptimizer:\n  auto_apply: false\n",
        )
        .unwrap();
        assert_eq!(config.overscan, 8);
        assert_eq!(config.pool.max_resources, 120);
        assert_eq!(config.pool.max_per_kind, PoolConfig::default().max_per_kind);
        assert!(!config.optimizer.auto_apply);
        assert_eq!(config.throttle_ms, 16.0);
    }

    #[test]
    fn test_empty_yaml_is_default() {
        let config = VirtualizerConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config, VirtualizerConfig::default());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = VirtualizerConfig::from_yaml_str("throttle_ms: -1").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "throttle_ms", .. }));

        let err = VirtualizerConfig::from_yaml_str("pool:\n  max_resources: 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "pool.max_resources", .. }));

        let err = VirtualizerConfig::from_yaml_str("overscan: [1, 2]").unwrap_err();
        assert!(matches!(err, ConfigError::Yaml(_)));
    }

    #[test]
    fn test_yaml_round_trip() {
        let config = VirtualizerConfig {
            overscan: 3,
            ..VirtualizerConfig::default()
        };
        let yaml = config.to_yaml().unwrap();
        assert_eq!(VirtualizerConfig::from_yaml_str(&yaml).unwrap(), config);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = VirtualizerConfig::from_yaml_file("/nonexistent/seal-virtual.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_tuning_subset() {
        let tuning = VirtualizerConfig::default().tuning();
        assert_eq!(tuning.overscan, 5);
        assert_eq!(tuning.scroll_throttle_ms, 16.0);
    }
}
