//! Instruction property index
//!
//! Per-address records derived once per kernel binary: computed latency
//! bounds and issue cost from the architecture model, plus the enclosing
//! block and function. The index is immutable after construction and safe to
//! share read-only across concurrently analyzed invocation units; the
//! invocation-scoped profile association lives in [`crate::profile::KernelProfile`].

use std::collections::HashMap;

use crate::arch::GpuArch;
use crate::error::{CulpaError, Result};
use crate::kernel::{BlockId, FunctionId, Program};

/// Computed static properties of one instruction address
#[derive(Debug, Clone, Copy)]
pub struct InstrProps {
    /// Instruction address
    pub pc: u64,
    /// Enclosing function
    pub function: FunctionId,
    /// Enclosing block
    pub block: BlockId,
    /// Latency lower/upper bound in issue cycles
    pub latency: (u32, u32),
    /// Issue cost in scheduler cycles
    pub issue_cost: u32,
}

/// Address → property record map for one kernel binary
#[derive(Debug)]
pub struct PropertyIndex {
    props: HashMap<u64, InstrProps>,
}

impl PropertyIndex {
    /// Derive properties for every instruction in the program
    #[must_use]
    pub fn build(program: &Program, arch: &GpuArch) -> Self {
        let mut props = HashMap::with_capacity(program.instruction_count());
        for (fid, function) in program.functions().iter().enumerate() {
            for &bid in &function.blocks {
                for instr in &program.block(bid).instructions {
                    props.insert(
                        instr.pc,
                        InstrProps {
                            pc: instr.pc,
                            function: fid,
                            block: bid,
                            latency: arch.latency(instr.op),
                            issue_cost: arch.issue_cost(instr.op),
                        },
                    );
                }
            }
        }
        Self { props }
    }

    /// Property record for `pc`
    ///
    /// # Errors
    ///
    /// Returns [`CulpaError::UnmappedAddress`] when `pc` is not covered by
    /// the static CFG — a contract violation between decoder and sampler
    /// that aborts the current unit's analysis.
    pub fn props(&self, pc: u64) -> Result<&InstrProps> {
        self.props.get(&pc).ok_or(CulpaError::UnmappedAddress { pc })
    }

    /// Property record for `pc`, or `None` when unmapped
    #[must_use]
    pub fn get(&self, pc: u64) -> Option<&InstrProps> {
        self.props.get(&pc)
    }

    /// Number of indexed addresses
    #[must_use]
    pub fn len(&self) -> usize {
        self.props.len()
    }

    /// True when the program had no instructions
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.props.is_empty()
    }
}
