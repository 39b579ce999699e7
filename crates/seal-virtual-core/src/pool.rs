//! Recycle pool for row rendering resources.
//!
//! Resources are created by a caller-supplied factory and kept in per-kind
//! free lists (LIFO). The total number of live resources, handed out plus
//! pooled, never exceeds `max_resources`.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ConfigError;

/// Kind used when the caller does not distinguish row shapes.
pub const DEFAULT_KIND: &str = "default";

/// A resource that can be returned to baseline before reuse.
pub trait Recyclable {
    /// Clear content and listeners, restoring baseline presentation state.
    fn reset(&mut self);
}

impl Recyclable for () {
    fn reset(&mut self) {}
}

impl Recyclable for String {
    fn reset(&mut self) {
        self.clear();
    }
}

impl<T> Recyclable for Vec<T> {
    fn reset(&mut self) {
        self.clear();
    }
}

/// Pool limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Ceiling on live resources across all kinds.
    pub max_resources: usize,
    /// Ceiling on idle resources kept per kind.
    pub max_per_kind: usize,
    /// Free lists larger than `trim_factor` times the average are trimmed.
    pub trim_factor: f64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_resources: 200,
            max_per_kind: 100,
            trim_factor: 2.0,
        }
    }
}

impl PoolConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_resources == 0 {
            return Err(ConfigError::invalid("pool.max_resources", "must be positive"));
        }
        if self.max_per_kind == 0 {
            return Err(ConfigError::invalid("pool.max_per_kind", "must be positive"));
        }
        if !(self.trim_factor >= 1.0) {
            return Err(ConfigError::invalid("pool.trim_factor", "must be at least 1.0"));
        }
        Ok(())
    }
}

/// Pool statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PoolStats {
    pub hits: u64,
    pub misses: u64,
    pub created: u64,
    pub recycled: u64,
    /// Released resources dropped because the free list was full.
    pub discarded: u64,
    /// Idle resources dropped to make room for another kind.
    pub evicted: u64,
    /// Acquires that returned nothing.
    pub exhausted: u64,
    pub total_outstanding: usize,
    pub pool_sizes: BTreeMap<String, usize>,
    pub hit_rate: f64,
}

impl PoolStats {
    pub const fn total_acquires(&self) -> u64 {
        self.hits + self.misses
    }
}

/// Bounded, kind-keyed pool of reusable resources.
pub struct ResourcePool<R> {
    config: PoolConfig,
    factory: Box<dyn FnMut(&str) -> R>,
    free: HashMap<String, Vec<R>>,
    outstanding: usize,
    hits: u64,
    misses: u64,
    created: u64,
    recycled: u64,
    discarded: u64,
    evicted: u64,
    exhausted: u64,
}

impl<R> fmt::Debug for ResourcePool<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourcePool")
            .field("config", &self.config)
            .field("outstanding", &self.outstanding)
            .field("pooled", &self.pooled())
            .finish_non_exhaustive()
    }
}

impl<R: Default + 'static> Default for ResourcePool<R> {
    fn default() -> Self {
        Self::new(PoolConfig::default(), |_| R::default())
    }
}

impl<R> ResourcePool<R> {
    pub fn new(config: PoolConfig, factory: impl FnMut(&str) -> R + 'static) -> Self {
        Self {
            config,
            factory: Box::new(factory),
            free: HashMap::new(),
            outstanding: 0,
            hits: 0,
            misses: 0,
            created: 0,
            recycled: 0,
            discarded: 0,
            evicted: 0,
            exhausted: 0,
        }
    }

    pub const fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Idle resources across all kinds.
    pub fn pooled(&self) -> usize {
        self.free.values().map(Vec::len).sum()
    }

    /// Handed out and not yet released.
    pub const fn outstanding(&self) -> usize {
        self.outstanding
    }

    /// Outstanding plus pooled.
    pub fn live(&self) -> usize {
        self.outstanding + self.pooled()
    }

    pub fn stats(&self) -> PoolStats {
        let total = self.hits + self.misses;
        PoolStats {
            hits: self.hits,
            misses: self.misses,
            created: self.created,
            recycled: self.recycled,
            discarded: self.discarded,
            evicted: self.evicted,
            exhausted: self.exhausted,
            total_outstanding: self.outstanding,
            pool_sizes: self
                .free
                .iter()
                .map(|(kind, list)| (kind.clone(), list.len()))
                .collect(),
            hit_rate: if total == 0 {
                0.0
            } else {
                self.hits as f64 / total as f64
            },
        }
    }

    /// Drop one idle resource from the largest free list of another kind.
    fn evict_for(&mut self, kind: &str) -> bool {
        let victim = self
            .free
            .iter_mut()
            .filter(|(other, list)| other.as_str() != kind && !list.is_empty())
            .max_by_key(|(_, list)| list.len());
        match victim {
            Some((other, list)) => {
                list.pop();
                debug!(evicted_kind = %other, for_kind = kind, "Evicted idle resource");
                self.evicted += 1;
                true
            }
            None => false,
        }
    }
}

impl<R: Recyclable> ResourcePool<R> {
    /// Take a resource of `kind`, reusing the most recently released one.
    ///
    /// Returns `None` when the pool is at its ceiling and nothing idle can be
    /// evicted; callers skip that row for one cycle.
    pub fn acquire(&mut self, kind: &str) -> Option<R> {
        if let Some(mut resource) = self.free.get_mut(kind).and_then(Vec::pop) {
            resource.reset();
            self.hits += 1;
            self.outstanding += 1;
            return Some(resource);
        }

        self.misses += 1;
        if self.live() >= self.config.max_resources && !self.evict_for(kind) {
            self.exhausted += 1;
            warn!(
                kind,
                max_resources = self.config.max_resources,
                outstanding = self.outstanding,
                "Resource pool exhausted"
            );
            return None;
        }

        let resource = (self.factory)(kind);
        self.created += 1;
        self.outstanding += 1;
        Some(resource)
    }

    /// Return a resource. It is reset and kept if its free list has room.
    pub fn release(&mut self, mut resource: R, kind: &str) {
        self.outstanding = self.outstanding.saturating_sub(1);
        let over_ceiling = self.live() >= self.config.max_resources;
        let kind_full = self
            .free
            .get(kind)
            .is_some_and(|list| list.len() >= self.config.max_per_kind);
        if over_ceiling || kind_full || self.config.max_per_kind == 0 {
            self.discarded += 1;
            return;
        }
        resource.reset();
        self.free.entry(kind.to_string()).or_default().push(resource);
        self.recycled += 1;
    }

    /// Forget every pooled and outstanding resource. Counters are kept.
    pub fn cleanup(&mut self) {
        let pooled = self.pooled();
        self.free.clear();
        self.outstanding = 0;
        debug!(pooled, "Resource pool cleaned up");
    }

    /// Trim free lists holding more than `trim_factor` times the average.
    ///
    /// Returns the number of resources discarded.
    pub fn optimize_pools(&mut self) -> usize {
        self.free.retain(|_, list| !list.is_empty());
        if self.free.len() < 2 {
            return 0;
        }
        let average = self.pooled() as f64 / self.free.len() as f64;
        let limit = (average * self.config.trim_factor).ceil() as usize;
        let mut trimmed = 0;
        for list in self.free.values_mut() {
            if list.len() > limit {
                trimmed += list.len() - limit;
                list.truncate(limit);
            }
        }
        if trimmed > 0 {
            self.discarded += trimmed as u64;
            debug!(trimmed, limit, "Trimmed oversized free lists");
        }
        trimmed
    }
}
