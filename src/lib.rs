// src/lib.rs
//! Contract-driven job executor, shared-memory IPC substrate, and
//! flight-recorder telemetry for a bare-metal AI/ML accelerator core.
//!
//! This crate is the core half of a two-party system: it owns job
//! admission, CPU/memory budget enforcement, and the always-on trace and
//! audit log, and it talks to a companion peer across a fixed 1 MiB
//! shared-memory region (`shm`). It does not boot, page, or schedule
//! threads itself - the host kernel supplies a global allocator, maps the
//! shared region, and drives `executor::run_job` from its own scheduler.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![cfg_attr(test, allow(missing_docs))]

extern crate alloc;

pub mod config;
pub mod contract;
pub mod diagnostics;
pub mod error;
pub mod executor;
pub mod flightrec;
pub mod hash;
pub mod heap;
pub mod job;
pub mod pagecap;
pub mod shm;
pub mod time;

use lazy_static::lazy_static;
use spin::Mutex;

/// Default knob set (`spec.md` §6); callers may build their own `Config`
/// instead when multiple executors run side by side with different
/// tunables.
pub static DEFAULT_CONFIG: config::Config = config::Config::default_const();

/// Crate-wide diagnostic counters. A plain `static` suffices since every
/// field is its own atomic; no lock is needed to keep it safe to touch
/// from interrupt context.
pub static DIAGNOSTICS: diagnostics::Diagnostics = diagnostics::Diagnostics::new();

/// Maximum number of jobs with a live contract at once, sized to the same
/// order as [`job::MAX_JOB_STEPS`]'s neighborhood - generous for a single
/// core's worth of concurrent jobs without being unbounded.
pub const MAX_LIVE_CONTRACTS: usize = 64;

lazy_static! {
    /// The job-id-indexed contract registry, guarded by a spinlock so it
    /// can be touched from both the admission path and an interrupt-time
    /// contract-violation handler without a full OS mutex.
    pub static ref CONTRACT_REGISTRY: Mutex<contract::ContractRegistry> =
        Mutex::new(contract::ContractRegistry::new(MAX_LIVE_CONTRACTS));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        DEFAULT_CONFIG.validate().unwrap();
    }

    #[test]
    fn contract_registry_starts_empty() {
        let mut reg = CONTRACT_REGISTRY.lock();
        assert!(reg.get(1).is_none());
        reg.insert(contract::Contract::new(
            1,
            contract::Priority::Normal,
            pagecap::Node::Local,
            contract::MemTier::Ddr,
            1000,
            64,
            1,
        ))
        .unwrap();
        assert!(reg.get(1).is_some());
        reg.remove(1);
    }
}
