//! Host memory pressure sampling.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ConfigError;

/// One used/total memory observation in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryReading {
    pub used: u64,
    pub total: u64,
}

impl MemoryReading {
    /// Used share in `0.0..=1.0`, or `None` when total is unknown.
    pub fn ratio(&self) -> Option<f64> {
        if self.total == 0 {
            return None;
        }
        Some((self.used as f64 / self.total as f64).clamp(0.0, 1.0))
    }
}

/// Something that can report host memory usage.
pub trait MemorySource {
    /// Current reading, or `None` when the host cannot tell.
    fn memory(&mut self) -> Option<MemoryReading>;
}

/// Source for hosts without memory reporting.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMemorySource;

impl MemorySource for NoMemorySource {
    fn memory(&mut self) -> Option<MemoryReading> {
        None
    }
}

impl<F: FnMut() -> Option<MemoryReading>> MemorySource for F {
    fn memory(&mut self) -> Option<MemoryReading> {
        self()
    }
}

/// Memory reported by the operating system through `sysinfo`.
#[cfg(feature = "system-memory")]
pub struct SystemMemory {
    system: sysinfo::System,
}

#[cfg(feature = "system-memory")]
impl Default for SystemMemory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "system-memory")]
impl SystemMemory {
    pub fn new() -> Self {
        Self {
            system: sysinfo::System::new(),
        }
    }
}

#[cfg(feature = "system-memory")]
impl std::fmt::Debug for SystemMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemMemory").finish_non_exhaustive()
    }
}

#[cfg(feature = "system-memory")]
impl MemorySource for SystemMemory {
    fn memory(&mut self) -> Option<MemoryReading> {
        self.system
            .refresh_memory_specifics(sysinfo::MemoryRefreshKind::everything());
        let total = self.system.total_memory();
        (total > 0).then(|| MemoryReading {
            used: self.system.used_memory(),
            total,
        })
    }
}

/// Memory pressure settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryPressureConfig {
    /// Readings kept for the rolling average.
    pub window: usize,
    /// Average used share above which the host is under pressure.
    pub threshold: f64,
}

impl Default for MemoryPressureConfig {
    fn default() -> Self {
        Self {
            window: 10,
            threshold: 0.9,
        }
    }
}

impl MemoryPressureConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window == 0 {
            return Err(ConfigError::invalid("memory.window", "must be positive"));
        }
        if !(self.threshold > 0.0 && self.threshold <= 1.0) {
            return Err(ConfigError::invalid("memory.threshold", "must be in (0.0, 1.0]"));
        }
        Ok(())
    }
}

/// Rolling average of memory usage ratios.
#[derive(Debug, Clone)]
pub struct MemoryPressureMonitor {
    config: MemoryPressureConfig,
    ratios: VecDeque<f64>,
    under_pressure: bool,
}

impl Default for MemoryPressureMonitor {
    fn default() -> Self {
        Self::new(MemoryPressureConfig::default())
    }
}

impl MemoryPressureMonitor {
    pub fn new(config: MemoryPressureConfig) -> Self {
        Self {
            ratios: VecDeque::with_capacity(config.window),
            config,
            under_pressure: false,
        }
    }

    /// Record a reading. Readings without a known total are ignored.
    pub fn record(&mut self, reading: MemoryReading) {
        let Some(ratio) = reading.ratio() else {
            return;
        };
        self.ratios.push_back(ratio);
        while self.ratios.len() > self.config.window {
            self.ratios.pop_front();
        }

        let pressured = self.average() > self.config.threshold;
        if pressured != self.under_pressure {
            if pressured {
                warn!(average = self.average(), "Memory pressure detected");
            } else {
                info!(average = self.average(), "Memory pressure cleared");
            }
            self.under_pressure = pressured;
        }
    }

    /// Read `source` once and record the result.
    pub fn sample(&mut self, source: &mut dyn MemorySource) -> bool {
        if let Some(reading) = source.memory() {
            self.record(reading);
        }
        self.under_pressure
    }

    /// Mean used share of the window, 0 when empty.
    pub fn average(&self) -> f64 {
        if self.ratios.is_empty() {
            return 0.0;
        }
        self.ratios.iter().sum::<f64>() / self.ratios.len() as f64
    }

    pub const fn is_under_pressure(&self) -> bool {
        self.under_pressure
    }

    pub fn clear(&mut self) {
        self.ratios.clear();
        self.under_pressure = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(used: u64) -> MemoryReading {
        MemoryReading { used, total: 100 }
    }

    #[test]
    fn test_ratio() {
        assert_eq!(reading(25).ratio(), Some(0.25));
        assert_eq!(MemoryReading { used: 5, total: 0 }.ratio(), None);
        assert_eq!(reading(150).ratio(), Some(1.0));
    }

    #[test]
    fn test_pressure_uses_rolling_average() {
        let mut monitor = MemoryPressureMonitor::default();
        monitor.record(reading(95));
        assert!(monitor.is_under_pressure());

        for _ in 0..3 {
            monitor.record(reading(50));
        }
        assert!(!monitor.is_under_pressure());
        assert!((monitor.average() - 0.6125).abs() < 1e-9);
    }

    #[test]
    fn test_window_is_bounded() {
        let mut monitor = MemoryPressureMonitor::new(MemoryPressureConfig {
            window: 3,
            threshold: 0.9,
        });
        for used in [10, 10, 10, 99, 99, 99] {
            monitor.record(reading(used));
        }
        assert!((monitor.average() - 0.99).abs() < 1e-9);
        assert!(monitor.is_under_pressure());
    }

    #[test]
    fn test_sample_from_closure_source() {
        let mut monitor = MemoryPressureMonitor::default();
        let mut source = || Some(reading(97));
        assert!(monitor.sample(&mut source));

        let mut silent = NoMemorySource;
        monitor.clear();
        assert!(!monitor.sample(&mut silent));
        assert_eq!(monitor.average(), 0.0);
    }

    #[cfg(feature = "system-memory")]
    #[test]
    fn test_system_memory_ratio_in_bounds() {
        let mut source = SystemMemory::new();
        if let Some(ratio) = source.memory().and_then(|r| r.ratio()) {
            assert!((0.0..=1.0).contains(&ratio));
        }
    }

    #[test]
    fn test_config_validation() {
        assert!(MemoryPressureConfig::default().validate().is_ok());
        let bad = MemoryPressureConfig {
            threshold: 1.5,
            ..MemoryPressureConfig::default()
        };
        assert!(bad.validate().is_err());
    }
}
