// src/job/mod.rs
//! DAG-based job graph: steps, dependencies, and tensor metadata used for
//! admission control and memory planning (`spec.md` §4.3, §5).

use alloc::vec::Vec;

use crate::error::{Capacity, Error, Invalid, Result};

pub const MAX_JOB_STEPS: usize = 32;
pub const MAX_JOB_TENSORS: usize = 64;
pub const MAX_STEP_DEPS: usize = 4;
pub const MAX_STEP_INPUTS: usize = 4;
pub const MAX_STEP_OUTPUTS: usize = 2;

/// What kind of work a step performs, for CPU-time estimation in
/// admission control (`spec.md` §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepType {
    Compute,
    Collective,
    Io,
    Control,
}

impl StepType {
    /// Heuristic microsecond cost used by admission-control estimation and
    /// by the executor's simulated busy-loop for non-offloaded steps.
    pub(crate) fn estimated_cpu_us(self) -> u32 {
        match self {
            StepType::Compute => 1_000,
            StepType::Collective => 3_000,
            StepType::Io => 2_000,
            StepType::Control => 100,
        }
    }
}

/// Tensor element type for job-graph memory planning. Distinct from
/// [`crate::heap::blob::TensorDtype`], which describes the wire-format
/// tensor header stored in the shared heap - this set includes `Bf16`,
/// which the heap layer does not (`SPEC_FULL.md` §C).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorDtype {
    Fp32,
    Fp16,
    Bf16,
    Int8,
    Int32,
}

impl TensorDtype {
    fn element_bytes(self) -> u32 {
        match self {
            TensorDtype::Fp32 | TensorDtype::Int32 => 4,
            TensorDtype::Fp16 | TensorDtype::Bf16 => 2,
            TensorDtype::Int8 => 1,
        }
    }
}

/// NUMA-node preference for a tensor, `0xFF` meaning "any".
pub const NODE_AFFINITY_ANY: u8 = 0xFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TensorDesc {
    pub id: u32,
    pub dtype: TensorDtype,
    pub num_elements: u32,
    pub size_bytes: u32,
    pub pinned: bool,
    pub node_affinity: u8,
}

#[derive(Debug, Clone)]
pub struct Step {
    pub id: u32,
    pub step_type: StepType,
    pub deps: Vec<u32>,
    pub inputs: Vec<u32>,
    pub outputs: Vec<u32>,
    pub peak_memory_kb: u32,
    pub working_set_kb: u32,
    pub ready: bool,
    pub completed: bool,
}

/// A DAG of steps over a shared tensor registry.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: u32,
    steps: Vec<Step>,
    tensors: Vec<TensorDesc>,
    pub total_memory_kb: u32,
    pub peak_memory_kb: u32,
    pub pinned_memory_kb: u32,
}

impl Job {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            steps: Vec::new(),
            tensors: Vec::new(),
            total_memory_kb: 0,
            peak_memory_kb: 0,
            pinned_memory_kb: 0,
        }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn tensors(&self) -> &[TensorDesc] {
        &self.tensors
    }

    fn find_step_idx(&self, id: u32) -> Option<usize> {
        self.steps.iter().position(|s| s.id == id)
    }

    fn find_tensor(&self, id: u32) -> Option<&TensorDesc> {
        self.tensors.iter().find(|t| t.id == id)
    }

    /// Add a step with no dependencies yet (so it starts `ready`).
    pub fn add_step(&mut self, id: u32, step_type: StepType) -> Result<()> {
        if self.steps.len() >= MAX_JOB_STEPS {
            return Err(Error::CapacityExhausted(Capacity::JobGraph));
        }
        self.steps.push(Step {
            id,
            step_type,
            deps: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            peak_memory_kb: 0,
            working_set_kb: 0,
            ready: true,
            completed: false,
        });
        Ok(())
    }

    /// Record that `step` depends on `depends_on`; marks `step` not-ready
    /// until that dependency completes.
    pub fn add_dep(&mut self, step: u32, depends_on: u32) -> Result<()> {
        self.find_step_idx(depends_on)
            .ok_or(Error::Invalid(Invalid::UnknownGraphId))?;
        let idx = self
            .find_step_idx(step)
            .ok_or(Error::Invalid(Invalid::UnknownGraphId))?;
        if self.steps[idx].deps.len() >= MAX_STEP_DEPS {
            return Err(Error::CapacityExhausted(Capacity::JobGraph));
        }
        self.steps[idx].deps.push(depends_on);
        self.steps[idx].ready = false;
        Ok(())
    }

    /// Register a tensor with the job's registry.
    pub fn add_tensor(
        &mut self,
        id: u32,
        dtype: TensorDtype,
        num_elements: u32,
        pinned: bool,
        node_affinity: u8,
    ) -> Result<()> {
        if self.tensors.len() >= MAX_JOB_TENSORS {
            return Err(Error::CapacityExhausted(Capacity::JobGraph));
        }
        if self.find_tensor(id).is_some() {
            return Err(Error::Invalid(Invalid::UnknownGraphId));
        }
        let size_bytes = num_elements * dtype.element_bytes();
        self.tensors.push(TensorDesc {
            id,
            dtype,
            num_elements,
            size_bytes,
            pinned,
            node_affinity,
        });
        Ok(())
    }

    pub fn step_add_input(&mut self, step_id: u32, tensor_id: u32) -> Result<()> {
        self.find_tensor(tensor_id)
            .ok_or(Error::Invalid(Invalid::UnknownGraphId))?;
        let idx = self
            .find_step_idx(step_id)
            .ok_or(Error::Invalid(Invalid::UnknownGraphId))?;
        if self.steps[idx].inputs.len() >= MAX_STEP_INPUTS {
            return Err(Error::CapacityExhausted(Capacity::JobGraph));
        }
        self.steps[idx].inputs.push(tensor_id);
        Ok(())
    }

    pub fn step_add_output(&mut self, step_id: u32, tensor_id: u32) -> Result<()> {
        self.find_tensor(tensor_id)
            .ok_or(Error::Invalid(Invalid::UnknownGraphId))?;
        let idx = self
            .find_step_idx(step_id)
            .ok_or(Error::Invalid(Invalid::UnknownGraphId))?;
        if self.steps[idx].outputs.len() >= MAX_STEP_OUTPUTS {
            return Err(Error::CapacityExhausted(Capacity::JobGraph));
        }
        self.steps[idx].outputs.push(tensor_id);
        Ok(())
    }

    /// Mark `step` completed and recompute readiness of every other step
    /// by rescanning dependencies (cheap at this graph's fixed size).
    pub fn mark_completed(&mut self, step: u32) -> Result<()> {
        let idx = self
            .find_step_idx(step)
            .ok_or(Error::Invalid(Invalid::UnknownGraphId))?;
        self.steps[idx].completed = true;

        let completed: Vec<u32> = self
            .steps
            .iter()
            .filter(|s| s.completed)
            .map(|s| s.id)
            .collect();
        for s in &mut self.steps {
            if s.completed {
                continue;
            }
            s.ready = s.deps.iter().all(|d| completed.contains(d));
        }
        Ok(())
    }

    /// The id of the next step that is ready and not completed, if any.
    pub fn next_ready(&self) -> Option<u32> {
        self.steps
            .iter()
            .find(|s| s.ready && !s.completed)
            .map(|s| s.id)
    }

    pub fn all_completed(&self) -> bool {
        self.steps.iter().all(|s| s.completed)
    }

    /// Recompute `total_memory_kb`, `pinned_memory_kb`, `peak_memory_kb`,
    /// and each step's `working_set_kb`/`peak_memory_kb`, from the tensor
    /// registry and each step's input/output tensor lists. Must be called
    /// after all tensors and step I/O are configured, and again any time
    /// they change.
    pub fn compute_memory(&mut self) {
        let to_kb = |bytes: u32| bytes.div_ceil(1024);

        let mut total = 0u32;
        let mut pinned = 0u32;
        for t in &self.tensors {
            let kb = to_kb(t.size_bytes);
            total += kb;
            if t.pinned {
                pinned += kb;
            }
        }

        let mut peak = 0u32;
        for s in &mut self.steps {
            let mut step_mem = 0u32;
            for tid in s.inputs.iter().chain(s.outputs.iter()) {
                if let Some(t) = self.tensors.iter().find(|t| t.id == *tid) {
                    step_mem += to_kb(t.size_bytes);
                }
            }
            s.working_set_kb = step_mem;
            s.peak_memory_kb = step_mem;
            if step_mem > peak {
                peak = step_mem;
            }
        }

        self.total_memory_kb = total;
        self.pinned_memory_kb = pinned;
        self.peak_memory_kb = peak;
    }

    /// Sum of the per-step admission-control CPU heuristic
    /// (`spec.md` §4.3: "~1000us compute, ~3000us collective, ~2000us io,
    /// ~100us control").
    pub fn estimated_cpu_us(&self) -> u32 {
        self.steps.iter().map(|s| s.step_type.estimated_cpu_us()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_step_job() -> Job {
        let mut j = Job::new(1);
        j.add_step(1, StepType::Compute).unwrap();
        j.add_step(2, StepType::Compute).unwrap();
        j.add_dep(2, 1).unwrap();
        j
    }

    #[test]
    fn second_step_not_ready_until_first_completes() {
        let mut j = two_step_job();
        assert_eq!(j.next_ready(), Some(1));
        j.mark_completed(1).unwrap();
        assert_eq!(j.next_ready(), Some(2));
        j.mark_completed(2).unwrap();
        assert!(j.all_completed());
        assert_eq!(j.next_ready(), None);
    }

    #[test]
    fn compute_memory_tracks_pinned_and_peak() {
        let mut j = Job::new(1);
        j.add_step(1, StepType::Compute).unwrap();
        j.add_tensor(10, TensorDtype::Fp32, 1024, true, NODE_AFFINITY_ANY)
            .unwrap();
        j.add_tensor(11, TensorDtype::Fp16, 1024, false, NODE_AFFINITY_ANY)
            .unwrap();
        j.step_add_input(1, 10).unwrap();
        j.step_add_output(1, 11).unwrap();
        j.compute_memory();

        assert_eq!(j.total_memory_kb, 4 + 2); // 4 KiB fp32 + 2 KiB fp16
        assert_eq!(j.pinned_memory_kb, 4);
        assert_eq!(j.peak_memory_kb, 6);
        assert_eq!(j.steps()[0].working_set_kb, 6);
    }

    #[test]
    fn step_capacity_is_enforced() {
        let mut j = Job::new(1);
        for i in 0..MAX_JOB_STEPS as u32 {
            j.add_step(i, StepType::Control).unwrap();
        }
        let err = j.add_step(999, StepType::Control).unwrap_err();
        assert_eq!(err, Error::CapacityExhausted(Capacity::JobGraph));
    }

    #[test]
    fn estimated_cpu_sums_step_heuristics() {
        let mut j = Job::new(1);
        j.add_step(1, StepType::Compute).unwrap();
        j.add_step(2, StepType::Collective).unwrap();
        assert_eq!(j.estimated_cpu_us(), 1_000 + 3_000);
    }
}
