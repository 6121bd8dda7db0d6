//! Architecture model
//!
//! Pure per-generation lookup tables mapping an opcode class to a latency
//! range and an issue cost, plus the machine constants the estimator needs.
//! Each accelerator generation is one preset behind the same two-function
//! interface; there is no shared mutable state, and the model is passed into
//! the analysis explicitly as part of the configuration.

use crate::kernel::{MemSpace, OpClass};

/// Accelerator generation selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Generation {
    /// SM 7.0
    Volta,
    /// SM 7.5
    Turing,
    /// SM 8.0
    Ampere,
}

/// Machine constants and latency tables for one accelerator generation
#[derive(Debug, Clone)]
pub struct GpuArch {
    /// Which generation this model describes
    pub generation: Generation,
    /// Lanes per warp
    pub warp_size: u32,
    /// Warp schedulers per SM
    pub schedulers_per_sm: u32,
    /// Maximum resident warps per SM
    pub max_warps_per_sm: u32,
    /// SMs on the device
    pub sm_count: u32,
}

impl GpuArch {
    /// Volta (SM 7.0) — V100
    #[must_use]
    pub fn volta() -> Self {
        Self {
            generation: Generation::Volta,
            warp_size: 32,
            schedulers_per_sm: 4,
            max_warps_per_sm: 64,
            sm_count: 80,
        }
    }

    /// Turing (SM 7.5) — RTX 2080 Ti
    #[must_use]
    pub fn turing() -> Self {
        Self {
            generation: Generation::Turing,
            warp_size: 32,
            schedulers_per_sm: 4,
            max_warps_per_sm: 32,
            sm_count: 68,
        }
    }

    /// Ampere (SM 8.0) — A100
    #[must_use]
    pub fn ampere() -> Self {
        Self {
            generation: Generation::Ampere,
            warp_size: 32,
            schedulers_per_sm: 4,
            max_warps_per_sm: 64,
            sm_count: 108,
        }
    }

    /// Latency lower/upper bound in issue cycles for an opcode class
    ///
    /// The lower bound is the pipeline's best case; the upper bound caps the
    /// exposure window the latency-feasibility search is allowed to explore.
    #[must_use]
    pub fn latency(&self, op: OpClass) -> (u32, u32) {
        match op {
            OpClass::Integer | OpClass::Predicate => (4, 6),
            OpClass::Float => (4, 6),
            OpClass::Double => match self.generation {
                Generation::Volta | Generation::Ampere => (8, 16),
                // Turing runs FP64 at 1/32 rate on a shared unit
                Generation::Turing => (16, 64),
            },
            OpClass::Convert => (8, 16),
            OpClass::Control => (4, 8),
            OpClass::Memory(space) => match space {
                MemSpace::Shared => match self.generation {
                    Generation::Volta | Generation::Turing => (19, 40),
                    Generation::Ampere => (18, 35),
                },
                MemSpace::Constant => (20, 140),
                MemSpace::Global | MemSpace::Generic | MemSpace::Texture => {
                    match self.generation {
                        Generation::Volta | Generation::Turing => (200, 800),
                        Generation::Ampere => (190, 750),
                    }
                }
                MemSpace::Local => (200, 800),
            },
            OpClass::Misc => (4, 8),
        }
    }

    /// Issue cost in scheduler cycles for an opcode class
    #[must_use]
    pub fn issue_cost(&self, op: OpClass) -> u32 {
        match op {
            OpClass::Double => match self.generation {
                Generation::Volta | Generation::Ampere => 2,
                Generation::Turing => 4,
            },
            OpClass::Memory(_) => 2,
            _ => 1,
        }
    }

    /// Maximum resident warps across the whole device
    #[must_use]
    pub const fn max_warps_per_device(&self) -> u32 {
        self.max_warps_per_sm * self.sm_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_bounds_ordered() {
        let arch = GpuArch::volta();
        for op in [
            OpClass::Integer,
            OpClass::Float,
            OpClass::Double,
            OpClass::Predicate,
            OpClass::Convert,
            OpClass::Control,
            OpClass::Memory(MemSpace::Shared),
            OpClass::Memory(MemSpace::Global),
            OpClass::Memory(MemSpace::Local),
            OpClass::Memory(MemSpace::Constant),
            OpClass::Misc,
        ] {
            let (lo, hi) = arch.latency(op);
            assert!(lo <= hi, "lower bound above upper for {op:?}");
            assert!(lo > 0, "zero lower bound for {op:?}");
        }
    }

    #[test]
    fn test_global_memory_dominates_alu() {
        let arch = GpuArch::ampere();
        let (_, mem_hi) = arch.latency(OpClass::Memory(MemSpace::Global));
        let (_, alu_hi) = arch.latency(OpClass::Integer);
        assert!(mem_hi > 10 * alu_hi);
    }

    #[test]
    fn test_turing_double_slower() {
        let volta = GpuArch::volta();
        let turing = GpuArch::turing();
        assert!(turing.latency(OpClass::Double).1 > volta.latency(OpClass::Double).1);
        assert!(turing.issue_cost(OpClass::Double) > volta.issue_cost(OpClass::Double));
    }

    #[test]
    fn test_machine_constants() {
        let arch = GpuArch::ampere();
        assert_eq!(arch.warp_size, 32);
        assert_eq!(arch.max_warps_per_device(), 64 * 108);
    }
}
