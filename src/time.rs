// src/time.rs
//! Cycle-counter time source used by the executor's adaptive backoff
//! (`spec.md` §4.4, §9 "model the spin/sleep loop as a pluggable Backoff
//! capability... default implementation uses the cycle counter").
//!
//! `rdtsc` is the only architecture-specific primitive this crate still
//! touches directly (the rest of the out-of-scope boot/paging layer was
//! dropped when this crate was narrowed to the core - see `DESIGN.md`).
//! Everything else here is portable.

use raw_cpuid::CpuId;

/// Cycles-per-microsecond, used to convert `rdtsc` deltas into the
/// microsecond durations the spec's trace events and budgets are
/// expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calibration {
    cycles_per_usec: u64,
}

/// Conservative fallback when CPUID leaf 0x15 (TSC/core crystal clock
/// ratio) is unavailable, e.g. under an older hypervisor.
const FALLBACK_CYCLES_PER_USEC: u64 = 1_000;

impl Calibration {
    /// Probe the current CPU via `CPUID` for its TSC frequency; fall back
    /// to a conservative constant if the leaf is absent.
    pub fn detect() -> Self {
        let cpuid = CpuId::new();
        let cycles_per_usec = cpuid
            .get_tsc_info()
            .and_then(|info| info.tsc_frequency())
            .map(|hz| (hz as u64 / 1_000_000).max(1))
            .unwrap_or(FALLBACK_CYCLES_PER_USEC);
        Self { cycles_per_usec }
    }

    /// Build a calibration from a known cycles-per-microsecond ratio,
    /// bypassing CPUID entirely (used by tests and simulated backoffs).
    pub const fn from_cycles_per_usec(cycles_per_usec: u64) -> Self {
        Self { cycles_per_usec }
    }

    pub fn cycles_to_usec(&self, cycles: u64) -> u64 {
        cycles / self.cycles_per_usec.max(1)
    }

    pub fn usec_to_cycles(&self, usec: u64) -> u64 {
        usec.saturating_mul(self.cycles_per_usec)
    }
}

/// Read the raw cycle counter.
#[cfg(target_arch = "x86_64")]
pub fn cycles() -> u64 {
    // SAFETY: `rdtsc` has no memory side effects and is available on every
    // x86_64 CPU this core targets.
    unsafe { core::arch::x86_64::_rdtsc() }
}

/// Portable fallback for architectures without a cycle counter intrinsic
/// this crate knows how to read: a monotonically increasing counter, so
/// duration math still produces sane (if not wall-clock-accurate) deltas.
#[cfg(not(target_arch = "x86_64"))]
pub fn cycles() -> u64 {
    use core::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calibration_round_trips_cycles_and_usec() {
        let c = Calibration::from_cycles_per_usec(1_000);
        assert_eq!(c.cycles_to_usec(1_000_000), 1_000);
        assert_eq!(c.usec_to_cycles(1_000), 1_000_000);
    }

    #[test]
    fn cycles_is_monotonic_enough_to_bound_a_delta() {
        let a = cycles();
        let b = cycles();
        assert!(b >= a);
    }
}
