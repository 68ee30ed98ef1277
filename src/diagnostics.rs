// src/diagnostics.rs
//! Always-on, low-overhead counters for conditions that are worth knowing
//! about but are not themselves trace events with a job/step context -
//! ring pressure, heap exhaustion, and foreign-region detection.
//!
//! Grounded on the teacher's `SystemDiagnostics`: plain atomics, a `const
//! fn new()`, and a `Snapshot` the caller can print however it logs (this
//! crate never writes to a console - see `spec.md`'s OUT OF SCOPE list).

use core::sync::atomic::{AtomicU64, Ordering};

/// Crate-wide diagnostic counters. Safe to share across interrupt context;
/// every field is an independent atomic, so readers see a consistent
/// snapshot of each counter but not necessarily a consistent snapshot
/// *across* counters (acceptable for diagnostics, per `spec.md` §5).
#[derive(Debug, Default)]
pub struct Diagnostics {
    ring_full: AtomicU64,
    heap_alloc_fail: AtomicU64,
    magic_mismatch: AtomicU64,
    budget_violations: AtomicU64,
    span_table_exhausted: AtomicU64,
    safe_mode_entries: AtomicU64,
    timeouts: AtomicU64,
}

impl Diagnostics {
    /// A fresh, all-zero counter set.
    pub const fn new() -> Self {
        Self {
            ring_full: AtomicU64::new(0),
            heap_alloc_fail: AtomicU64::new(0),
            magic_mismatch: AtomicU64::new(0),
            budget_violations: AtomicU64::new(0),
            span_table_exhausted: AtomicU64::new(0),
            safe_mode_entries: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
        }
    }

    pub fn record_ring_full(&self) {
        self.ring_full.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_heap_alloc_fail(&self) {
        self.heap_alloc_fail.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_magic_mismatch(&self) {
        self.magic_mismatch.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_budget_violation(&self) {
        self.budget_violations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_span_table_exhausted(&self) {
        self.span_table_exhausted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_safe_mode_entry(&self) {
        self.safe_mode_entries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a point-in-time snapshot for display or export.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            ring_full: self.ring_full.load(Ordering::Relaxed),
            heap_alloc_fail: self.heap_alloc_fail.load(Ordering::Relaxed),
            magic_mismatch: self.magic_mismatch.load(Ordering::Relaxed),
            budget_violations: self.budget_violations.load(Ordering::Relaxed),
            span_table_exhausted: self.span_table_exhausted.load(Ordering::Relaxed),
            safe_mode_entries: self.safe_mode_entries.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
        }
    }
}

/// A structured, point-in-time dump of [`Diagnostics`]. The crate never
/// prints this itself; a host kernel formats it with its own console.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Snapshot {
    pub ring_full: u64,
    pub heap_alloc_fail: u64,
    pub magic_mismatch: u64,
    pub budget_violations: u64,
    pub span_table_exhausted: u64,
    pub safe_mode_entries: u64,
    pub timeouts: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero_and_accumulate() {
        let d = Diagnostics::new();
        assert_eq!(d.snapshot(), Snapshot::default());

        d.record_ring_full();
        d.record_ring_full();
        d.record_timeout();

        let s = d.snapshot();
        assert_eq!(s.ring_full, 2);
        assert_eq!(s.timeouts, 1);
        assert_eq!(s.heap_alloc_fail, 0);
    }
}
