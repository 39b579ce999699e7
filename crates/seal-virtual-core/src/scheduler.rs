//! Tick scheduling capability.
//!
//! The controller never touches real timers. It asks a [`Scheduler`] for a
//! tick at a host timestamp and later collects the ticks that came due, which
//! keeps debounce and throttle behavior deterministic under test.

/// Opaque identifier of a requested tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TickHandle(u64);

impl TickHandle {
    pub const fn id(self) -> u64 {
        self.0
    }
}

/// Timer capability injected into the controller.
pub trait Scheduler {
    /// Ask for a tick at host time `at_ms`.
    fn request_tick(&mut self, at_ms: f64) -> TickHandle;

    /// Cancel a tick. Unknown or already fired handles are ignored.
    fn cancel_tick(&mut self, handle: TickHandle);

    /// Remove and return ticks due at `now_ms`, earliest first.
    fn take_due(&mut self, now_ms: f64) -> Vec<TickHandle>;
}

/// Scheduler driven entirely by the timestamps passed to [`Scheduler::take_due`].
#[derive(Debug, Default, Clone)]
pub struct ManualScheduler {
    next_id: u64,
    pending: Vec<(f64, TickHandle)>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Earliest pending due time.
    pub fn next_due(&self) -> Option<f64> {
        self.pending.iter().map(|(at, _)| *at).reduce(f64::min)
    }
}

impl Scheduler for ManualScheduler {
    fn request_tick(&mut self, at_ms: f64) -> TickHandle {
        let handle = TickHandle(self.next_id);
        self.next_id += 1;
        let at_ms = if at_ms.is_nan() { 0.0 } else { at_ms };
        self.pending.push((at_ms, handle));
        handle
    }

    fn cancel_tick(&mut self, handle: TickHandle) {
        self.pending.retain(|(_, h)| *h != handle);
    }

    fn take_due(&mut self, now_ms: f64) -> Vec<TickHandle> {
        let (mut due, rest): (Vec<_>, Vec<_>) =
            self.pending.drain(..).partition(|(at, _)| *at <= now_ms);
        self.pending = rest;
        due.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        due.into_iter().map(|(_, handle)| handle).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_due_ticks_in_time_order() {
        let mut scheduler = ManualScheduler::new();
        let late = scheduler.request_tick(30.0);
        let early = scheduler.request_tick(10.0);
        let future = scheduler.request_tick(100.0);

        assert!(scheduler.take_due(5.0).is_empty());
        assert_eq!(scheduler.take_due(50.0), vec![early, late]);
        assert_eq!(scheduler.pending_count(), 1);
        assert_eq!(scheduler.next_due(), Some(100.0));
        assert_eq!(scheduler.take_due(100.0), vec![future]);
    }

    #[test]
    fn test_cancel_removes_tick() {
        let mut scheduler = ManualScheduler::new();
        let tick = scheduler.request_tick(10.0);
        scheduler.cancel_tick(tick);
        scheduler.cancel_tick(tick);
        assert!(scheduler.take_due(1000.0).is_empty());
        assert_eq!(scheduler.next_due(), None);
    }

    #[test]
    fn test_handles_are_unique() {
        let mut scheduler = ManualScheduler::new();
        let a = scheduler.request_tick(1.0);
        let b = scheduler.request_tick(1.0);
        assert_ne!(a, b);
        assert!(a.id() < b.id());
        assert_eq!(scheduler.take_due(1.0), vec![a, b]);
    }
}
