//! Graph pruning pipeline
//!
//! Three sequential filters remove dynamic-graph edges unsupported by
//! evidence, in a fixed order:
//!
//! 1. [`opcode`] — the effect must have sampled latency of the kind the
//!    cause's opcode class produces
//! 2. [`barrier`] — a cause that touches a scoreboard barrier must be one
//!    the effect actually waits on
//! 3. [`latency`] — a bounded DFS must find at least one unshadowed path
//!    from cause to effect within the cause's latency budget
//!
//! Only edges are ever removed; nodes stay behind so the blame attributor
//! can report "no surviving cause".

pub mod barrier;
pub mod latency;
pub mod opcode;

use std::collections::BTreeMap;

pub use latency::PathStats;

use crate::error::Result;
use crate::graph::DepGraph;
use crate::kernel::Program;
use crate::profile::KernelProfile;
use crate::props::PropertyIndex;

/// Edges removed per pass, for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneSummary {
    /// Removed by the opcode-class filter
    pub opcode_removed: usize,
    /// Removed by the barrier filter
    pub barrier_removed: usize,
    /// Removed by the latency-feasibility filter
    pub latency_removed: usize,
}

impl PruneSummary {
    /// Total edges removed by the pipeline
    #[must_use]
    pub const fn total(&self) -> usize {
        self.opcode_removed + self.barrier_removed + self.latency_removed
    }
}

/// Result of running the full pipeline
#[derive(Debug)]
pub struct PruneOutcome {
    /// Path statistics for every surviving edge
    pub paths: BTreeMap<(u64, u64), PathStats>,
    /// Per-pass removal counts
    pub summary: PruneSummary,
}

/// Run all three filters over the dynamic graph, in order
///
/// # Errors
///
/// Returns [`crate::CulpaError::UnmappedAddress`] when an edge endpoint is
/// not covered by the static CFG (inconsistent decoder/profile inputs).
pub fn prune(
    graph: &mut DepGraph<u64>,
    program: &Program,
    props: &PropertyIndex,
    profile: &KernelProfile,
) -> Result<PruneOutcome> {
    let opcode_removed = opcode::filter(graph, program, profile)?;
    let barrier_removed = barrier::filter(graph, program)?;
    let (paths, latency_removed) = latency::filter(graph, program, props)?;
    Ok(PruneOutcome {
        paths,
        summary: PruneSummary {
            opcode_removed,
            barrier_removed,
            latency_removed,
        },
    })
}
