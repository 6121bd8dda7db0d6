//! Kernel execution statistics
//!
//! Launch-shape and utilization numbers the profiling subsystem measures per
//! kernel invocation. Pure input data for the optimizer catalog; the engine
//! never derives these itself.

use serde::{Deserialize, Serialize};

/// Measured execution statistics for one kernel invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelStats {
    /// Thread blocks launched
    pub blocks: u32,
    /// Threads per block
    pub threads_per_block: u32,
    /// Registers allocated per thread
    pub registers_per_thread: u32,
    /// Average resident warps per SM during execution
    pub active_warps_per_sm: f64,
    /// Samples taken while at least one warp was issuing
    pub active_samples: f64,
    /// Total samples taken over the kernel's lifetime
    pub total_samples: f64,
    /// Measured wall time in nanoseconds
    pub time_ns: u64,
    /// Times this kernel was launched
    pub invocations: u32,
    /// Fraction of SMs that held at least one active warp (0.0–1.0)
    pub sm_efficiency: f64,
}

impl KernelStats {
    /// Warps per block, rounded up to warp granularity
    #[must_use]
    pub fn warps_per_block(&self, warp_size: u32) -> u32 {
        self.threads_per_block.div_ceil(warp_size)
    }

    /// Fraction of samples spent with no warp issuing
    #[must_use]
    pub fn idle_fraction(&self) -> f64 {
        if self.total_samples == 0.0 {
            0.0
        } else {
            1.0 - self.active_samples / self.total_samples
        }
    }
}
