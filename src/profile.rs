//! Sampled profile model
//!
//! The per-invocation dynamic side of the analysis: the closed stall/latency
//! taxonomy, fixed-size per-kind counters, and the address-indexed arena of
//! profile nodes for one (process, thread, kernel-invocation) unit.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{CulpaError, Result};

/// Number of stall kinds in the closed taxonomy
pub const STALL_KIND_COUNT: usize = 14;

/// Closed taxonomy of stall/latency reasons
///
/// Execution-dependency and memory-dependency kinds are apportioned onto
/// cause instructions; the remaining kinds are self-stalls (or, for
/// synchronization, blamed on the immediately preceding instruction).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StallKind {
    /// Waiting on a register produced by an earlier instruction
    ExecDepRegister,
    /// Waiting on a shared-memory access result
    ExecDepSharedMemory,
    /// Write-after-read hazard tracked through a read scoreboard
    ExecDepWar,
    /// Dependency latency with no surviving cause (scheduler/unexplained)
    ExecDepScheduler,
    /// Waiting on a global-memory access
    MemDepGlobal,
    /// Waiting on a local-memory (spill) access
    MemDepLocal,
    /// Waiting on a constant-cache access
    MemDepConstant,
    /// Blocked at a synchronization point
    Synchronization,
    /// Instruction fetch starvation
    InstructionFetch,
    /// Required pipe was busy
    PipeBusy,
    /// Eligible but not selected by the scheduler
    NotSelected,
    /// Warp was asleep
    Sleep,
    /// Any other sampled reason
    Other,
    /// Sample with an invalid reason code
    Invalid,
}

impl StallKind {
    /// Every kind, in stable taxonomy order
    pub const ALL: [Self; STALL_KIND_COUNT] = [
        Self::ExecDepRegister,
        Self::ExecDepSharedMemory,
        Self::ExecDepWar,
        Self::ExecDepScheduler,
        Self::MemDepGlobal,
        Self::MemDepLocal,
        Self::MemDepConstant,
        Self::Synchronization,
        Self::InstructionFetch,
        Self::PipeBusy,
        Self::NotSelected,
        Self::Sleep,
        Self::Other,
        Self::Invalid,
    ];

    /// Stable index into per-kind counter tables
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Execution-dependency kinds (register, shared memory, WAR, scheduler)
    #[must_use]
    pub const fn is_exec_dep(self) -> bool {
        matches!(
            self,
            Self::ExecDepRegister
                | Self::ExecDepSharedMemory
                | Self::ExecDepWar
                | Self::ExecDepScheduler
        )
    }

    /// Memory-dependency kinds (global, local, constant)
    #[must_use]
    pub const fn is_mem_dep(self) -> bool {
        matches!(self, Self::MemDepGlobal | Self::MemDepLocal | Self::MemDepConstant)
    }

    /// Kinds that are always blamed on the instruction itself
    #[must_use]
    pub const fn is_self_stall(self) -> bool {
        matches!(
            self,
            Self::InstructionFetch
                | Self::PipeBusy
                | Self::NotSelected
                | Self::Sleep
                | Self::Other
                | Self::Invalid
        )
    }

    /// Stable counter name, as exported to the metric store
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::ExecDepRegister => "exec_dep_register",
            Self::ExecDepSharedMemory => "exec_dep_shared_memory",
            Self::ExecDepWar => "exec_dep_war",
            Self::ExecDepScheduler => "exec_dep_scheduler",
            Self::MemDepGlobal => "mem_dep_global",
            Self::MemDepLocal => "mem_dep_local",
            Self::MemDepConstant => "mem_dep_constant",
            Self::Synchronization => "synchronization",
            Self::InstructionFetch => "instruction_fetch",
            Self::PipeBusy => "pipe_busy",
            Self::NotSelected => "not_selected",
            Self::Sleep => "sleep",
            Self::Other => "other",
            Self::Invalid => "invalid",
        }
    }

    /// Resolve a counter name back to a kind
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }
}

/// Fixed-size per-kind f64 counter table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KindCounters {
    values: [f64; STALL_KIND_COUNT],
}

impl Default for KindCounters {
    fn default() -> Self {
        Self {
            values: [0.0; STALL_KIND_COUNT],
        }
    }
}

impl KindCounters {
    /// Counter value for one kind
    #[must_use]
    pub const fn get(&self, kind: StallKind) -> f64 {
        self.values[kind.index()]
    }

    /// Add to one kind's counter
    pub fn add(&mut self, kind: StallKind, amount: f64) {
        self.values[kind.index()] += amount;
    }

    /// Sum over all kinds
    #[must_use]
    pub fn total(&self) -> f64 {
        self.values.iter().sum()
    }

    /// Sum over the execution-dependency kinds
    #[must_use]
    pub fn exec_dep_total(&self) -> f64 {
        StallKind::ALL
            .into_iter()
            .filter(|k| k.is_exec_dep())
            .map(|k| self.get(k))
            .sum()
    }

    /// Sum over the memory-dependency kinds
    #[must_use]
    pub fn mem_dep_total(&self) -> f64 {
        StallKind::ALL
            .into_iter()
            .filter(|k| k.is_mem_dep())
            .map(|k| self.get(k))
            .sum()
    }

    /// Iterate over kinds with non-zero counters
    pub fn iter_nonzero(&self) -> impl Iterator<Item = (StallKind, f64)> + '_ {
        StallKind::ALL
            .into_iter()
            .map(|k| (k, self.get(k)))
            .filter(|&(_, v)| v != 0.0)
    }
}

/// Dynamic per-address record of sampled counters for one invocation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileNode {
    /// Instruction address this node describes
    pub pc: u64,
    /// Sampled issue count
    pub issued: f64,
    /// Per-kind stall sample counts
    pub stall: KindCounters,
    /// Per-kind latency sample counts
    pub latency: KindCounters,
}

impl ProfileNode {
    /// A zero-valued node, synthesized when a dependency analysis needs to
    /// blame an address that was never directly sampled
    #[must_use]
    pub fn zero(pc: u64) -> Self {
        Self {
            pc,
            ..Self::default()
        }
    }

    /// Did the sampler actually observe this address?
    #[must_use]
    pub fn is_sampled(&self) -> bool {
        self.issued != 0.0 || self.stall.total() != 0.0 || self.latency.total() != 0.0
    }
}

/// Address-indexed arena of profile nodes for one invocation unit
///
/// Scoped to one (process, thread, kernel-invocation) unit; a fresh arena per
/// unit is what makes analyses independent and safely parallelizable.
#[derive(Debug, Clone, Default)]
pub struct KernelProfile {
    nodes: BTreeMap<u64, ProfileNode>,
}

impl KernelProfile {
    /// Create an empty profile
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert (or replace) a node
    pub fn insert(&mut self, node: ProfileNode) {
        self.nodes.insert(node.pc, node);
    }

    /// Record one sampled counter by name
    ///
    /// Accepted names: `issued`, `stall_<kind>`, `latency_<kind>`.
    ///
    /// # Errors
    ///
    /// Returns [`CulpaError::MissingMetric`] for a counter name with no
    /// assigned kind; the caller skips the whole unit in that case.
    pub fn record(&mut self, pc: u64, counter: &str, value: f64) -> Result<()> {
        let node = self.nodes.entry(pc).or_insert_with(|| ProfileNode::zero(pc));
        if counter == "issued" {
            node.issued += value;
            return Ok(());
        }
        if let Some(kind) = counter.strip_prefix("stall_").and_then(StallKind::from_name) {
            node.stall.add(kind, value);
            return Ok(());
        }
        if let Some(kind) = counter
            .strip_prefix("latency_")
            .and_then(StallKind::from_name)
        {
            node.latency.add(kind, value);
            return Ok(());
        }
        Err(CulpaError::MissingMetric {
            name: counter.to_string(),
        })
    }

    /// Node at `pc`, if present
    #[must_use]
    pub fn node(&self, pc: u64) -> Option<&ProfileNode> {
        self.nodes.get(&pc)
    }

    /// Node at `pc`, synthesizing a zero-valued one if absent
    pub fn ensure(&mut self, pc: u64) -> &mut ProfileNode {
        self.nodes.entry(pc).or_insert_with(|| ProfileNode::zero(pc))
    }

    /// Iterate nodes in ascending address order
    pub fn nodes(&self) -> impl Iterator<Item = &ProfileNode> {
        self.nodes.values()
    }

    /// Profiled addresses in ascending order
    pub fn pcs(&self) -> impl Iterator<Item = u64> + '_ {
        self.nodes.keys().copied()
    }

    /// Number of nodes (sampled plus synthesized)
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when no node exists
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_roundtrip_names() {
        for kind in StallKind::ALL {
            assert_eq!(StallKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(StallKind::from_name("bogus"), None);
    }

    #[test]
    fn test_kind_partitions_disjoint() {
        for kind in StallKind::ALL {
            let groups = [kind.is_exec_dep(), kind.is_mem_dep(), kind.is_self_stall()];
            let members = groups.iter().filter(|&&g| g).count();
            assert!(members <= 1, "{kind:?} in multiple groups");
        }
        // Synchronization belongs to no group: it has its own blame policy.
        assert!(!StallKind::Synchronization.is_exec_dep());
        assert!(!StallKind::Synchronization.is_self_stall());
    }

    #[test]
    fn test_counters_aggregates() {
        let mut c = KindCounters::default();
        c.add(StallKind::ExecDepRegister, 40.0);
        c.add(StallKind::ExecDepWar, 2.0);
        c.add(StallKind::MemDepGlobal, 10.0);
        c.add(StallKind::Synchronization, 5.0);

        assert_eq!(c.exec_dep_total(), 42.0);
        assert_eq!(c.mem_dep_total(), 10.0);
        assert_eq!(c.total(), 57.0);
        assert_eq!(c.iter_nonzero().count(), 4);
    }

    #[test]
    fn test_record_counters() {
        let mut profile = KernelProfile::new();
        profile.record(0x10, "issued", 8.0).unwrap();
        profile.record(0x10, "latency_exec_dep_register", 40.0).unwrap();
        profile.record(0x10, "stall_synchronization", 3.0).unwrap();

        let node = profile.node(0x10).unwrap();
        assert_eq!(node.issued, 8.0);
        assert_eq!(node.latency.get(StallKind::ExecDepRegister), 40.0);
        assert_eq!(node.stall.get(StallKind::Synchronization), 3.0);
        assert!(node.is_sampled());
    }

    #[test]
    fn test_record_unknown_counter() {
        let mut profile = KernelProfile::new();
        let err = profile.record(0x10, "stall_mystery", 1.0).unwrap_err();
        assert!(matches!(err, CulpaError::MissingMetric { .. }));
    }

    #[test]
    fn test_ensure_synthesizes_zero_node() {
        let mut profile = KernelProfile::new();
        let node = profile.ensure(0x40);
        assert_eq!(node.pc, 0x40);
        assert!(!node.is_sampled());
        assert_eq!(profile.len(), 1);
    }

    #[test]
    fn test_nodes_iterate_in_address_order() {
        let mut profile = KernelProfile::new();
        profile.insert(ProfileNode::zero(0x30));
        profile.insert(ProfileNode::zero(0x10));
        profile.insert(ProfileNode::zero(0x20));
        let pcs: Vec<u64> = profile.pcs().collect();
        assert_eq!(pcs, vec![0x10, 0x20, 0x30]);
    }
}
