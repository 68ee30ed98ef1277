// src/config.rs
//! Centralized configuration for the ZENEDGE core.
//!
//! Mirrors the knobs enumerated in `spec.md` §6. Every subsystem takes its
//! tunables from a `Config` value rather than reading ambient constants, so
//! a host kernel can run several differently-configured executors side by
//! side (e.g. one per accelerator) without global state.

use crate::error::{Error, Invalid, Result};

/// Runtime-tunable knobs for the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Flight recorder trace ring capacity. Must be a power of two.
    pub trace_buffer_size: u32,
    /// Pure-spin window of the executor's adaptive backoff, in microseconds.
    pub poll_spin_window_us: u32,
    /// Total deadline for a single offloaded step's response, in milliseconds.
    pub poll_total_timeout_ms: u32,
    /// Fraction of `per_step_budget` above which a step logs `BUDGET_WARN`.
    pub per_step_warn_ratio: Ratio100,
    /// Shared-heap allocation granularity, in bytes.
    pub heap_block_size: u32,
    /// Number of packet slots in the command/response rings.
    pub cmd_ring_capacity: u32,
}

/// A ratio in `[0, 1]` represented as hundredths, so `Config` stays `Eq`
/// without pulling in a float-ordering dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ratio100(u8);

impl Ratio100 {
    /// Construct from a percentage in `[0, 100]`.
    pub const fn from_percent(pct: u8) -> Self {
        Self(pct)
    }

    /// Evaluate `value * self` using integer arithmetic, saturating.
    pub const fn of(self, value: u64) -> u64 {
        value.saturating_mul(self.0 as u64) / 100
    }
}

impl Config {
    /// The defaults named in `spec.md` §6.
    pub const fn default_const() -> Self {
        Self {
            trace_buffer_size: 256,
            poll_spin_window_us: 100_000,
            poll_total_timeout_ms: 5_000,
            per_step_warn_ratio: Ratio100::from_percent(80),
            heap_block_size: 64,
            cmd_ring_capacity: 1024,
        }
    }

    /// Validate invariants that the spec states but a bare struct literal
    /// cannot enforce (principally: the trace buffer must be a power of two).
    pub fn validate(&self) -> Result<()> {
        if !self.trace_buffer_size.is_power_of_two() {
            return Err(Error::Invalid(Invalid::NotPowerOfTwo));
        }
        if self.cmd_ring_capacity == 0 || self.heap_block_size == 0 {
            return Err(Error::Invalid(Invalid::SizeOutOfBounds));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_const()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let c = Config::default();
        assert_eq!(c.trace_buffer_size, 256);
        assert_eq!(c.poll_spin_window_us, 100_000);
        assert_eq!(c.poll_total_timeout_ms, 5_000);
        assert_eq!(c.per_step_warn_ratio.of(100), 80);
        assert_eq!(c.heap_block_size, 64);
        assert_eq!(c.cmd_ring_capacity, 1024);
        c.validate().unwrap();
    }

    #[test]
    fn rejects_non_power_of_two_trace_buffer() {
        let mut c = Config::default();
        c.trace_buffer_size = 300;
        assert_eq!(
            c.validate(),
            Err(Error::Invalid(Invalid::NotPowerOfTwo))
        );
    }

    #[test]
    fn ratio_boundary_is_exact() {
        // A duration at exactly `per_step_budget` must not count as the
        // 80% warn threshold crossed at budget+1; exercised fully in
        // executor tests, here we just pin the arithmetic.
        let r = Ratio100::from_percent(80);
        assert_eq!(r.of(1000), 800);
        assert_eq!(r.of(0), 0);
    }
}
