//! Scoreboard-barrier compatibility filter
//!
//! Second pruning pass. A cause that writes or reads a scoreboard barrier
//! can only stall an effect that actually blocks on that barrier index; the
//! edge is rejected when the effect's wait mask misses every barrier the
//! cause touches. Causes that touch no barrier pass through untouched — the
//! latency-feasibility search decides those.

use crate::error::{CulpaError, Result};
use crate::graph::DepGraph;
use crate::kernel::{Instruction, Program};

/// Does `effect` block on any barrier `cause` writes or reads?
#[must_use]
pub fn compatible(cause: &Instruction, effect: &Instruction) -> bool {
    if !cause.touches_barrier() {
        return true;
    }
    cause
        .write_barriers
        .iter()
        .chain(cause.read_barriers.iter())
        .any(|&b| effect.waits_on(b))
}

/// Remove edges whose barrier wiring cannot explain the stall
///
/// # Errors
///
/// Returns [`CulpaError::UnmappedAddress`] when an edge endpoint is not part
/// of the static CFG.
pub fn filter(graph: &mut DepGraph<u64>, program: &Program) -> Result<usize> {
    let edges: Vec<(u64, u64)> = graph.edges().collect();
    let mut doomed = Vec::new();
    for (cause, effect) in edges {
        let ci = program
            .instruction_at(cause)
            .ok_or(CulpaError::UnmappedAddress { pc: cause })?;
        let ei = program
            .instruction_at(effect)
            .ok_or(CulpaError::UnmappedAddress { pc: effect })?;
        if !compatible(ci, ei) {
            doomed.push((cause, effect));
        }
    }
    for &(cause, effect) in &doomed {
        graph.remove_edge(cause, effect);
    }
    Ok(doomed.len())
}
