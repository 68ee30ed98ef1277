// src/contract/mod.rs
//! Resource-governance contracts: per-job CPU/memory budgets, a monotonic
//! state machine (`OK -> WARNED -> SAFE_MODE`), and admission control
//! (`spec.md` §3, §4.3).

use alloc::vec::Vec;

use crate::error::{Capacity, Error, Result};
use crate::flightrec::trace::{EventType, TraceRing};
use crate::job::Job;
use crate::pagecap::{Frame, Node, PageSource};

/// Scheduling priority a contract was admitted under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    Low,
    Normal,
    High,
    Realtime,
}

/// Governance state. Monotonic and absorbing: once `SafeMode`, a contract
/// never returns to `Warned` or `Ok` on its own (`spec.md` §3 "contract
/// state only ever escalates").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractState {
    Ok,
    Warned,
    SafeMode,
}

/// Preferred memory tier for a contract's allocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemTier {
    Ddr,
    Hbm,
    Device,
}

/// Outcome of [`admit_job`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmitResult {
    Ok,
    /// Pinned or peak memory requirement exceeds the contract's budget.
    RejectMemory,
    /// Reserved for a future CPU hard-reject path; the current admission
    /// algorithm only ever warns on estimated CPU, never rejects on it
    /// (`spec.md` §4.3).
    RejectCpu,
    /// Reserved for a future priority-based hard-reject path; unreachable
    /// today since admission does not consult `Priority`.
    RejectPriority,
    /// No contiguous memory of the required kind is available right now.
    RejectNoResources,
}

/// A single job's resource budget and live accounting.
#[derive(Debug, Clone, Copy)]
pub struct Contract {
    pub job_id: u32,
    pub priority: Priority,
    pub preferred_node: Node,
    pub tier_hint: MemTier,
    pub cpu_budget_us: u32,
    pub memory_kb: u32,
    pub accel_slots: u8,

    pub cpu_used_us: u32,
    pub mem_used_kb: u32,
    pub cpu_violations: u32,
    pub mem_violations: u32,
    pub state: ContractState,
}

impl Contract {
    pub fn new(
        job_id: u32,
        priority: Priority,
        preferred_node: Node,
        tier_hint: MemTier,
        cpu_budget_us: u32,
        memory_kb: u32,
        accel_slots: u8,
    ) -> Self {
        Self {
            job_id,
            priority,
            preferred_node,
            tier_hint,
            cpu_budget_us,
            memory_kb,
            accel_slots,
            cpu_used_us: 0,
            mem_used_kb: 0,
            cpu_violations: 0,
            mem_violations: 0,
            state: ContractState::Ok,
        }
    }

    /// Whether new work may still be admitted under this contract.
    pub fn can_continue(&self) -> bool {
        self.state != ContractState::SafeMode
    }

    /// Escalate state; never de-escalates (`spec.md` §3).
    fn set_state(&mut self, new_state: ContractState, trace: &mut TraceRing) {
        if new_state as u8 <= self.state as u8 {
            return;
        }
        self.state = new_state;
        trace.log(EventType::ContractStateChange, self.job_id, 0, new_state as u32);
        if new_state == ContractState::SafeMode {
            trace.log(EventType::ContractSafeMode, self.job_id, 0, 0);
        }
    }

    /// Charge `used_us` of CPU time against the budget. Logs
    /// `BUDGET_WARN`/`BUDGET_EXCEED` and escalates state on exceeding
    /// (`spec.md` §4.4: "3 CPU violations while WARNED trips SAFE_MODE").
    pub fn charge_cpu(&mut self, used_us: u32, trace: &mut TraceRing) {
        self.cpu_used_us = self.cpu_used_us.saturating_add(used_us);
        if self.cpu_used_us <= self.cpu_budget_us {
            return;
        }
        trace.log(EventType::ContractBudgetExceed, self.job_id, 0, self.cpu_used_us);
        self.cpu_violations += 1;
        self.set_state(ContractState::Warned, trace);
        if self.state == ContractState::Warned && self.cpu_violations >= 3 {
            self.set_state(ContractState::SafeMode, trace);
        }
    }

    /// Charge `used_kb` of memory against the budget. Same shape as
    /// [`Contract::charge_cpu`] but trips `SAFE_MODE` at 2 violations
    /// (`spec.md` §4.3, `contracts.c` "2 memory violations while WARNED").
    pub fn charge_memory(&mut self, used_kb: u32, trace: &mut TraceRing) {
        self.mem_used_kb = self.mem_used_kb.saturating_add(used_kb);
        if self.mem_used_kb <= self.memory_kb {
            return;
        }
        trace.log(EventType::MemContractExceed, self.job_id, 0, self.mem_used_kb);
        self.mem_violations += 1;
        self.set_state(ContractState::Warned, trace);
        if self.state == ContractState::Warned && self.mem_violations >= 2 {
            self.set_state(ContractState::SafeMode, trace);
        }
    }

    /// Allocate a frame through `source`, honoring this contract's node
    /// preference and refusing outright once in `SAFE_MODE`
    /// (`contracts.c` `contract_alloc_page`).
    pub fn alloc_page(
        &mut self,
        source: &mut dyn PageSource,
        trace: &mut TraceRing,
    ) -> Result<Frame> {
        if !self.can_continue() {
            trace.log(EventType::MemAllocFail, self.job_id, 0, 0);
            return Err(Error::Denied);
        }
        match source.alloc_frame(self.preferred_node) {
            Some(frame) => {
                if frame.node != self.preferred_node && self.preferred_node != Node::Any {
                    trace.log(EventType::MemLocalityMiss, self.job_id, 0, 0);
                }
                trace.log(EventType::MemAlloc, self.job_id, 0, 0);
                Ok(frame)
            }
            None => {
                trace.log(EventType::MemAllocFail, self.job_id, 0, 0);
                Err(Error::CapacityExhausted(Capacity::HeapFull))
            }
        }
    }

    pub fn free_page(&self, source: &mut dyn PageSource, frame: Frame, trace: &mut TraceRing) {
        source.free_frame(frame);
        trace.log(EventType::MemFree, self.job_id, 0, 0);
    }
}

/// Fixed-capacity, job-id-indexed registry of live contracts.
pub struct ContractRegistry {
    entries: Vec<Contract>,
    capacity: usize,
}

impl ContractRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            capacity,
        }
    }

    pub fn insert(&mut self, contract: Contract) -> Result<()> {
        if self.entries.len() >= self.capacity {
            return Err(Error::CapacityExhausted(Capacity::ContractRegistry));
        }
        self.entries.push(contract);
        Ok(())
    }

    pub fn get(&self, job_id: u32) -> Option<&Contract> {
        self.entries.iter().find(|c| c.job_id == job_id)
    }

    pub fn get_mut(&mut self, job_id: u32) -> Option<&mut Contract> {
        self.entries.iter_mut().find(|c| c.job_id == job_id)
    }

    pub fn remove(&mut self, job_id: u32) -> Option<Contract> {
        let idx = self.entries.iter().position(|c| c.job_id == job_id)?;
        Some(self.entries.swap_remove(idx))
    }
}

/// Admission algorithm (`contracts.c` `contract_admit_job`, `spec.md`
/// §4.3): two hard memory rejects, then an available-memory reject against
/// what's left of the contract's own budget, then a CPU estimate that only
/// ever warns.
pub fn admit_job(contract: &mut Contract, job: &Job, trace: &mut TraceRing) -> AdmitResult {
    if job.peak_memory_kb > contract.memory_kb {
        trace.log(EventType::JobReject, job.id, 0, job.peak_memory_kb);
        return AdmitResult::RejectMemory;
    }
    if job.pinned_memory_kb > contract.memory_kb {
        trace.log(EventType::JobReject, job.id, 0, job.pinned_memory_kb);
        return AdmitResult::RejectMemory;
    }
    let available_kb = contract.memory_kb.saturating_sub(contract.mem_used_kb);
    if job.peak_memory_kb > available_kb {
        trace.log(EventType::JobReject, job.id, 0, job.peak_memory_kb);
        return AdmitResult::RejectNoResources;
    }

    let estimated_cpu_us = job.estimated_cpu_us();
    if estimated_cpu_us > contract.cpu_budget_us {
        trace.log(EventType::ContractBudgetWarn, job.id, 0, estimated_cpu_us);
    }

    trace.log(EventType::JobAdmit, job.id, job.peak_memory_kb, estimated_cpu_us);
    AdmitResult::Ok
}
