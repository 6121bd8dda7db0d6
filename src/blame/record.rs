//! Blame records and per-kernel aggregation

use serde::Serialize;

use crate::kernel::{BlockId, FunctionId};
use crate::profile::{KindCounters, StallKind};

/// One apportionment result: blame assigned to a cause for an effect's stall
///
/// Append-only within one kernel analysis. `distance` is the instruction
/// count along the shortest accepted path from cause to effect; `None` marks
/// blame carried by the instruction itself.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstrBlame {
    /// Upstream instruction the stall is blamed on
    pub cause_pc: u64,
    /// Instruction that sampled the stall
    pub effect_pc: u64,
    /// Function enclosing the effect
    pub function: FunctionId,
    /// Block enclosing the effect
    pub block: BlockId,
    /// Shortest accepted path length, or `None` for self-blame
    pub distance: Option<u32>,
    /// Blame category
    pub kind: StallKind,
    /// Apportioned stall samples (≥ 0)
    pub stall: f64,
    /// Apportioned latency samples (≥ 0)
    pub latency: f64,
}

/// Per-kernel blame aggregate
///
/// Collects every [`InstrBlame`] for one invocation, maintains per-kind
/// running sums, and — once finalized — two index views sorted descending by
/// stall and latency blame. Never mutated after the analysis completes.
#[derive(Debug, Default)]
pub struct KernelBlame {
    records: Vec<InstrBlame>,
    by_stall: Vec<usize>,
    by_latency: Vec<usize>,
    stall_totals: KindCounters,
    latency_totals: KindCounters,
}

impl KernelBlame {
    /// Create an empty aggregate
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one blame record, updating the per-kind sums
    pub fn push(&mut self, record: InstrBlame) {
        self.stall_totals.add(record.kind, record.stall);
        self.latency_totals.add(record.kind, record.latency);
        self.records.push(record);
    }

    /// Build the sorted index views
    ///
    /// Stable sorts keyed on descending blame: ties keep insertion order,
    /// which makes repeated runs over the same inputs byte-identical.
    pub fn finalize(&mut self) {
        let mut by_stall: Vec<usize> = (0..self.records.len()).collect();
        by_stall.sort_by(|&a, &b| self.records[b].stall.total_cmp(&self.records[a].stall));
        let mut by_latency: Vec<usize> = (0..self.records.len()).collect();
        by_latency.sort_by(|&a, &b| self.records[b].latency.total_cmp(&self.records[a].latency));
        self.by_stall = by_stall;
        self.by_latency = by_latency;
    }

    /// All records, in insertion order
    #[must_use]
    pub fn records(&self) -> &[InstrBlame] {
        &self.records
    }

    /// Top `k` records by stall blame (requires [`Self::finalize`])
    pub fn top_by_stall(&self, k: usize) -> impl Iterator<Item = &InstrBlame> {
        self.by_stall.iter().take(k).map(|&i| &self.records[i])
    }

    /// Top `k` records by latency blame (requires [`Self::finalize`])
    pub fn top_by_latency(&self, k: usize) -> impl Iterator<Item = &InstrBlame> {
        self.by_latency.iter().take(k).map(|&i| &self.records[i])
    }

    /// Running stall sum for one kind
    #[must_use]
    pub fn stall_total(&self, kind: StallKind) -> f64 {
        self.stall_totals.get(kind)
    }

    /// Running latency sum for one kind
    #[must_use]
    pub fn latency_total(&self, kind: StallKind) -> f64 {
        self.latency_totals.get(kind)
    }

    /// Stall sum across all kinds
    #[must_use]
    pub fn total_stall(&self) -> f64 {
        self.stall_totals.total()
    }

    /// Latency sum across all kinds
    #[must_use]
    pub fn total_latency(&self) -> f64 {
        self.latency_totals.total()
    }

    /// Latency sum over the dependency kinds (exec-dep plus mem-dep)
    #[must_use]
    pub fn dependency_latency(&self) -> f64 {
        self.latency_totals.exec_dep_total() + self.latency_totals.mem_dep_total()
    }

    /// Number of records
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when no blame was recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
