// src/executor/mod.rs
//! Job execution: walks a job's DAG in readiness order, offloading compute
//! steps across the shared-memory region and simulating everything else,
//! charging each step against its contract as it completes (`spec.md`
//! §4.4).

use crate::config::Config;
use crate::contract::Contract;
use crate::error::{Error, Result};
use crate::flightrec::trace::{EventType, TraceRing};
use crate::job::{Job, StepType};
use crate::shm::layout::CMD_RUN_MODEL;
use crate::shm::packet::{Packet, Response};
use crate::shm::region::Region;
use crate::time::Calibration;

/// Pluggable adaptive-wait capability (`spec.md` §9: "model the spin/sleep
/// loop as a pluggable Backoff capability"). `ready` is polled repeatedly
/// until it returns `true` or `deadline_cycles` (an absolute `time::cycles`
/// reading) passes.
pub trait Backoff {
    fn wait_for(&mut self, ready: &mut dyn FnMut() -> bool, deadline_cycles: u64) -> bool;
}

/// Default backoff: pure spin for `spin_window_us`, then keep polling at
/// the same rate until the deadline. There is no real OS scheduler to
/// cooperatively yield to here, so "cooperative" degrades to a spin-loop
/// hint past the window - still a distinct phase from the caller's point
/// of view, which is what the trait boundary is for.
pub struct CycleBackoff {
    calibration: Calibration,
    spin_window_us: u32,
}

impl CycleBackoff {
    pub fn new(calibration: Calibration, spin_window_us: u32) -> Self {
        Self {
            calibration,
            spin_window_us,
        }
    }
}

impl Backoff for CycleBackoff {
    fn wait_for(&mut self, ready: &mut dyn FnMut() -> bool, deadline_cycles: u64) -> bool {
        let spin_window_cycles = self.calibration.usec_to_cycles(self.spin_window_us as u64);
        let start = crate::time::cycles();
        loop {
            if ready() {
                return true;
            }
            let now = crate::time::cycles();
            if now >= deadline_cycles {
                return false;
            }
            if now.wrapping_sub(start) > spin_window_cycles {
                core::hint::spin_loop();
            }
        }
    }
}

/// Busy-loop-simulate a non-offloaded step for `usec` microseconds.
fn simulate_work(usec: u32, calibration: &Calibration) {
    let cycles_budget = calibration.usec_to_cycles(usec as u64);
    let start = crate::time::cycles();
    while crate::time::cycles().wrapping_sub(start) < cycles_budget {
        core::hint::spin_loop();
    }
}

/// Run `job` to completion against `contract`, offloading `Compute` steps
/// through `region` and simulating every other step type in-process
/// (`spec.md` §4.4).
pub fn run_job(
    job: &mut Job,
    contract: &mut Contract,
    region: &mut Region,
    trace: &mut TraceRing,
    backoff: &mut dyn Backoff,
    calibration: &Calibration,
    config: &Config,
) -> Result<crate::flightrec::trace::JobStats> {
    trace.log(EventType::JobSubmit, job.id, 0, 0);

    let num_steps = job.steps().len().max(1) as u32;
    let per_step_budget = contract.cpu_budget_us / num_steps;
    let warn_threshold = config.per_step_warn_ratio.of(per_step_budget as u64) as u32;

    loop {
        if job.all_completed() {
            break;
        }
        let Some(step_id) = job.next_ready() else {
            // A DAG with no completed-but-unready steps left and no ready
            // step either is malformed (a cycle); nothing more to do here.
            break;
        };
        let step = job
            .steps()
            .iter()
            .find(|s| s.id == step_id)
            .expect("next_ready only returns ids present in the graph");
        let step_type = step.step_type;
        // Input tensor the offloaded command should operate on (`sched_core.c`
        // "use first input as payload"); 0 if the step has no inputs.
        let payload_id = step.inputs.first().copied().unwrap_or(0);

        let span = trace.begin_span(EventType::StepStart, job.id, step_id);

        if !contract.can_continue() {
            trace.end_span(span, EventType::StepEnd);
            return Err(Error::Denied);
        }

        let step_result = match step_type {
            StepType::Compute => run_compute_step(
                region, trace, backoff, calibration, config, job.id, step_id, payload_id,
            ),
            other => {
                simulate_work(other.estimated_cpu_us(), calibration);
                Ok(())
            }
        };

        trace.end_span(span, EventType::StepEnd);
        step_result?;
        let duration = trace.last_duration(job.id, step_id);

        if duration > per_step_budget {
            trace.log(EventType::ContractBudgetExceed, job.id, step_id, duration);
        } else if duration > warn_threshold {
            trace.log(EventType::ContractBudgetWarn, job.id, step_id, duration);
        }
        contract.charge_cpu(duration, trace);

        job.mark_completed(step_id)?;
    }

    trace.log(EventType::JobComplete, job.id, 0, 0);
    Ok(trace.job_stats(job.id))
}

fn run_compute_step(
    region: &mut Region,
    trace: &mut TraceRing,
    backoff: &mut dyn Backoff,
    calibration: &Calibration,
    config: &Config,
    job_id: u32,
    step_id: u32,
    payload_id: u32,
) -> Result<()> {
    region.send_cmd(Packet {
        cmd: CMD_RUN_MODEL,
        flags: 0,
        payload_id,
        timestamp: calibration.cycles_to_usec(crate::time::cycles()),
    })?;

    let deadline = crate::time::cycles()
        .saturating_add(calibration.usec_to_cycles(config.poll_total_timeout_ms as u64 * 1000));

    let mut rsp: Option<Response> = None;
    let got = backoff.wait_for(
        &mut || {
            if let Some(r) = region.poll_rsp() {
                rsp = Some(r);
                true
            } else {
                false
            }
        },
        deadline,
    );

    if !got {
        trace.log(EventType::ContractViolation, job_id, step_id, 0xDEAD);
        return Err(Error::Timeout);
    }
    let rsp = rsp.expect("wait_for only returns true after setting rsp");
    if !rsp.is_ok() {
        return Err(Error::PeerError(rsp.status));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{Contract, MemTier, Priority};
    use crate::job::TensorDtype;
    use crate::pagecap::{Node, SimulatedPageSource};

    fn setup() -> (Job, Contract, Region, TraceRing, Calibration, Config) {
        let mut p = SimulatedPageSource::new(8, 8);
        let region = Region::init(&mut p).unwrap();
        let calibration = Calibration::from_cycles_per_usec(1);
        let trace = TraceRing::new(64, calibration);
        let contract = Contract::new(1, Priority::Normal, Node::Local, MemTier::Ddr, 10_000, 1024, 1);
        let config = Config::default_const();
        (Job::new(1), contract, region, trace, calibration, config)
    }

    #[test]
    fn control_only_job_runs_to_completion_and_reports_stats() {
        let (mut job, mut contract, mut region, mut trace, calibration, config) = setup();
        job.add_step(1, StepType::Control).unwrap();
        job.add_step(2, StepType::Control).unwrap();
        job.add_dep(2, 1).unwrap();

        let mut backoff = CycleBackoff::new(calibration, config.poll_spin_window_us);
        let stats = run_job(
            &mut job,
            &mut contract,
            &mut region,
            &mut trace,
            &mut backoff,
            &calibration,
            &config,
        )
        .unwrap();

        assert!(job.all_completed());
        assert_eq!(stats.steps_completed, 2);
    }

    #[test]
    fn compute_step_round_trips_through_the_region() {
        let (mut job, mut contract, mut region, mut trace, calibration, config) = setup();
        job.add_step(1, StepType::Compute).unwrap();
        // Input tensor id is deliberately different from the step id, so a
        // payload_id that coincidentally equals step_id can't pass the test.
        job.add_tensor(42, TensorDtype::Fp32, 16, false, 0xFF).unwrap();
        job.step_add_input(1, 42).unwrap();
        job.compute_memory();

        // Pre-stage the peer's reply: the rings are FIFO and independent
        // of command/response pairing, so queuing the response before
        // `run_job` ever sends its command is equivalent to a peer that
        // answers instantly.
        region
            .send_rsp(Response {
                status: crate::shm::layout::RSP_OK,
                orig_cmd: CMD_RUN_MODEL,
                result: 0,
                timestamp: 0,
            })
            .unwrap();

        let mut backoff = CycleBackoff::new(calibration, config.poll_spin_window_us);
        let stats = run_job(
            &mut job,
            &mut contract,
            &mut region,
            &mut trace,
            &mut backoff,
            &calibration,
            &config,
        )
        .unwrap();

        assert_eq!(stats.steps_completed, 1);
        assert!(job.all_completed());

        let sent_cmd = region.poll_cmd().expect("run_job must have sent CMD_RUN_MODEL");
        assert_eq!(sent_cmd.cmd, CMD_RUN_MODEL);
        assert_eq!(sent_cmd.payload_id, 42);
    }

    #[test]
    fn exceeding_per_step_budget_logs_budget_exceed_and_charges_contract() {
        let (mut job, mut contract, mut region, mut trace, calibration, config) = setup();
        contract.cpu_budget_us = 0; // any measured duration will exceed a 0-us budget
        job.add_step(1, StepType::Control).unwrap();

        let mut backoff = CycleBackoff::new(calibration, config.poll_spin_window_us);
        let _ = run_job(
            &mut job,
            &mut contract,
            &mut region,
            &mut trace,
            &mut backoff,
            &calibration,
            &config,
        )
        .unwrap();

        assert!(trace
            .dump()
            .iter()
            .any(|e| e.event_type == EventType::ContractBudgetExceed));
    }
}
