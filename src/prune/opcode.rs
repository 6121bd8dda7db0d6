//! Opcode-class compatibility filter
//!
//! First pruning pass. An edge survives only when the effect instruction
//! actually sampled latency of the kind its cause would produce: shared
//! memory exposes execution-dependency latency, other memory accesses expose
//! memory-dependency latency, and everything else execution-dependency
//! latency. An edge whose evidence aggregate is exactly zero is removed.

use crate::error::{CulpaError, Result};
use crate::graph::DepGraph;
use crate::kernel::{OpClass, Program};
use crate::profile::{KernelProfile, ProfileNode};

/// Latency evidence on `effect` for a cause of class `cause_op`
#[must_use]
pub fn evidence(cause_op: OpClass, effect: &ProfileNode) -> f64 {
    if cause_op.is_shared_memory() || !cause_op.is_memory() {
        effect.latency.exec_dep_total()
    } else {
        effect.latency.mem_dep_total()
    }
}

/// Remove edges with zero supporting latency evidence
///
/// # Errors
///
/// Returns [`CulpaError::UnmappedAddress`] when an edge endpoint is not part
/// of the static CFG.
pub fn filter(
    graph: &mut DepGraph<u64>,
    program: &Program,
    profile: &KernelProfile,
) -> Result<usize> {
    let edges: Vec<(u64, u64)> = graph.edges().collect();
    let mut doomed = Vec::new();
    for (cause, effect) in edges {
        let cause_op = program
            .instruction_at(cause)
            .ok_or(CulpaError::UnmappedAddress { pc: cause })?
            .op;
        let supported = profile
            .node(effect)
            .is_some_and(|n| evidence(cause_op, n) != 0.0);
        if !supported {
            doomed.push((cause, effect));
        }
    }
    for &(cause, effect) in &doomed {
        graph.remove_edge(cause, effect);
    }
    Ok(doomed.len())
}
