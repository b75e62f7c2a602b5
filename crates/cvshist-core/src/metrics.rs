//! Global atomic counters for a conversion run.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event at the end of a run.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    revisions_collected: AtomicU64,
    changesets_assembled: AtomicU64,
    timestamps_clamped: AtomicU64,
    cycles_broken: AtomicU64,
    revisions_grafted: AtomicU64,
    events_emitted: AtomicU64,
}

/// Point-in-time copy of every counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub revisions_collected: u64,
    pub changesets_assembled: u64,
    pub timestamps_clamped: u64,
    pub cycles_broken: u64,
    pub revisions_grafted: u64,
    pub events_emitted: u64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            revisions_collected: AtomicU64::new(0),
            changesets_assembled: AtomicU64::new(0),
            timestamps_clamped: AtomicU64::new(0),
            cycles_broken: AtomicU64::new(0),
            revisions_grafted: AtomicU64::new(0),
            events_emitted: AtomicU64::new(0),
        }
    }

    pub fn inc_revisions_collected(&self, n: u64) {
        self.revisions_collected.fetch_add(n, Ordering::Relaxed);
        tracing::trace!(metric = "revisions_collected", n, "counter incremented");
    }

    pub fn inc_changesets_assembled(&self, n: u64) {
        self.changesets_assembled.fetch_add(n, Ordering::Relaxed);
        tracing::trace!(metric = "changesets_assembled", n, "counter incremented");
    }

    pub fn inc_timestamps_clamped(&self) {
        self.timestamps_clamped.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "timestamps_clamped", "counter incremented");
    }

    pub fn inc_cycles_broken(&self) {
        self.cycles_broken.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "cycles_broken", "counter incremented");
    }

    pub fn inc_revisions_grafted(&self, n: u64) {
        self.revisions_grafted.fetch_add(n, Ordering::Relaxed);
        tracing::trace!(metric = "revisions_grafted", n, "counter incremented");
    }

    pub fn inc_events_emitted(&self) {
        self.events_emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            revisions_collected: self.revisions_collected.load(Ordering::Relaxed),
            changesets_assembled: self.changesets_assembled.load(Ordering::Relaxed),
            timestamps_clamped: self.timestamps_clamped.load(Ordering::Relaxed),
            cycles_broken: self.cycles_broken.load(Ordering::Relaxed),
            revisions_grafted: self.revisions_grafted.load(Ordering::Relaxed),
            events_emitted: self.events_emitted.load(Ordering::Relaxed),
        }
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        let s = self.snapshot();
        tracing::info!(
            metric = "flush",
            revisions_collected = s.revisions_collected,
            changesets_assembled = s.changesets_assembled,
            timestamps_clamped = s.timestamps_clamped,
            cycles_broken = s.cycles_broken,
            revisions_grafted = s.revisions_grafted,
            events_emitted = s.events_emitted,
        );
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.revisions_collected.store(0, Ordering::Relaxed);
        self.changesets_assembled.store(0, Ordering::Relaxed);
        self.timestamps_clamped.store(0, Ordering::Relaxed);
        self.cycles_broken.store(0, Ordering::Relaxed);
        self.revisions_grafted.store(0, Ordering::Relaxed);
        self.events_emitted.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = Metrics::new();
        m.inc_revisions_collected(5);
        m.inc_revisions_collected(2);
        m.inc_timestamps_clamped();
        m.inc_cycles_broken();
        m.inc_cycles_broken();
        let s = m.snapshot();
        assert_eq!(s.revisions_collected, 7);
        assert_eq!(s.timestamps_clamped, 1);
        assert_eq!(s.cycles_broken, 2);
        assert_eq!(s.events_emitted, 0);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = Metrics::new();
        m.inc_changesets_assembled(3);
        m.inc_revisions_grafted(4);
        m.inc_events_emitted();
        m.reset();
        assert_eq!(m.snapshot(), MetricsSnapshot::default());
    }
}
