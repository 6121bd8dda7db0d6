//! Latency-feasibility filter
//!
//! Third pruning pass: a bounded depth-first search over the control-flow
//! graph. For every value a cause defines and its effect consumes, the
//! search starts one instruction after the cause and accumulates issue cost
//! per visited instruction. A path is accepted when it reaches the effect
//! instruction; it is discarded when an intervening instruction redefines
//! the value (the def is shadowed) or when the accumulated cost reaches the
//! cause's latency upper bound (the value's lifetime outlives achievable
//! exposure — the stall cannot be this cause's doing). An edge with zero
//! accepted paths is removed.
//!
//! Same-block pairs where the effect address is not strictly greater than
//! the cause's are loop carries: the start block's visited mark is cleared
//! so the back edge can re-enter it and reach the effect at the block top.
//! Each block is visited at most once per active branch (visited-set
//! push/pop on backtrack), which bounds the search.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{CulpaError, Result};
use crate::graph::DepGraph;
use crate::kernel::{BlockId, Location, Program, Value};
use crate::props::PropertyIndex;

/// Accepted-path statistics for one surviving edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathStats {
    /// Instruction count along the shortest accepted path
    pub shortest: u32,
    /// Instruction count along the longest accepted path
    pub longest: u32,
    /// Number of accepted paths across all dependence-carrying values
    pub accepted: u32,
}

impl PathStats {
    fn record(acc: &mut Option<Self>, len: u32) {
        match acc {
            Some(stats) => {
                stats.shortest = stats.shortest.min(len);
                stats.longest = stats.longest.max(len);
                stats.accepted += 1;
            }
            None => {
                *acc = Some(Self {
                    shortest: len,
                    longest: len,
                    accepted: 1,
                });
            }
        }
    }
}

/// Remove edges with no latency-feasible path; report path statistics for
/// the survivors
///
/// # Errors
///
/// Returns [`CulpaError::UnmappedAddress`] when an edge endpoint is not part
/// of the static CFG.
pub fn filter(
    graph: &mut DepGraph<u64>,
    program: &Program,
    props: &PropertyIndex,
) -> Result<(BTreeMap<(u64, u64), PathStats>, usize)> {
    let edges: Vec<(u64, u64)> = graph.edges().collect();
    let mut paths = BTreeMap::new();
    let mut doomed = Vec::new();

    for (cause, effect) in edges {
        match edge_paths(program, props, cause, effect)? {
            Some(stats) => {
                paths.insert((cause, effect), stats);
            }
            // Zero accepted paths is the designed pruning signal, not an
            // error.
            None => doomed.push((cause, effect)),
        }
    }
    for &(cause, effect) in &doomed {
        graph.remove_edge(cause, effect);
    }
    Ok((paths, doomed.len()))
}

/// Search every dependence-carrying value of one edge
fn edge_paths(
    program: &Program,
    props: &PropertyIndex,
    cause: u64,
    effect: u64,
) -> Result<Option<PathStats>> {
    let ci = program
        .instruction_at(cause)
        .ok_or(CulpaError::UnmappedAddress { pc: cause })?;
    let ei = program
        .instruction_at(effect)
        .ok_or(CulpaError::UnmappedAddress { pc: effect })?;
    let cause_loc = program
        .location_of(cause)
        .ok_or(CulpaError::UnmappedAddress { pc: cause })?;
    let effect_loc = program
        .location_of(effect)
        .ok_or(CulpaError::UnmappedAddress { pc: effect })?;
    let budget = props.props(cause)?.latency.1;

    let defs: BTreeSet<Value> = ci.defs().collect();
    let uses: BTreeSet<Value> = ei.uses().collect();

    let mut acc = None;
    for &value in defs.intersection(&uses) {
        let search = PathSearch {
            program,
            props,
            cause_pc: cause,
            effect_pc: effect,
            value,
            budget,
        };
        search.run(cause_loc, effect_loc, &mut acc);
    }
    Ok(acc)
}

/// Outcome of scanning one block along the current path
enum ScanEnd {
    /// Reached the effect after `len` intervening instructions
    Accept(u32),
    /// Path discarded: shadowing redefinition or budget exhausted
    Dead,
    /// Block end reached; continue into successors
    Continue { cost: u32, len: u32 },
}

/// Bounded DFS for one (cause, effect, value) triple
struct PathSearch<'a> {
    program: &'a Program,
    props: &'a PropertyIndex,
    cause_pc: u64,
    effect_pc: u64,
    value: Value,
    budget: u32,
}

/// One active block on the explicit search stack
#[derive(Clone, Copy)]
struct Frame {
    block: BlockId,
    cost: u32,
    len: u32,
    next_target: usize,
}

impl PathSearch<'_> {
    fn run(&self, start: Location, effect: Location, acc: &mut Option<PathStats>) {
        let loop_carry = start.block == effect.block && self.effect_pc <= self.cause_pc;

        let mut visited: BTreeSet<BlockId> = BTreeSet::new();
        let mut stack: Vec<Frame> = Vec::new();

        // The start block stays re-enterable for loop carries so the back
        // edge can reach an effect that sits above the cause.
        if !loop_carry {
            visited.insert(start.block);
        }
        match self.scan(start.block, start.index + 1, 0, 0) {
            ScanEnd::Accept(len) => PathStats::record(acc, len),
            ScanEnd::Dead => {}
            ScanEnd::Continue { cost, len } => stack.push(Frame {
                block: start.block,
                cost,
                len,
                next_target: 0,
            }),
        }

        while let Some(depth) = stack.len().checked_sub(1) {
            let Frame {
                block,
                cost,
                len,
                next_target,
            } = stack[depth];
            let targets = &self.program.block(block).targets;
            if next_target >= targets.len() {
                stack.pop();
                visited.remove(&block);
                continue;
            }
            stack[depth].next_target += 1;
            let (succ, _) = targets[next_target];
            if visited.contains(&succ) {
                continue;
            }
            match self.scan(succ, 0, cost, len) {
                ScanEnd::Accept(l) => PathStats::record(acc, l),
                ScanEnd::Dead => {}
                ScanEnd::Continue { cost, len } => {
                    visited.insert(succ);
                    stack.push(Frame {
                        block: succ,
                        cost,
                        len,
                        next_target: 0,
                    });
                }
            }
        }
    }

    /// Walk one block from `from`, accumulating issue cost and path length
    fn scan(&self, block: BlockId, from: usize, mut cost: u32, mut len: u32) -> ScanEnd {
        for instr in &self.program.block(block).instructions[from..] {
            if instr.pc == self.effect_pc {
                return ScanEnd::Accept(len);
            }
            if instr.pc != self.cause_pc && instr.defines(self.value) {
                return ScanEnd::Dead;
            }
            cost += self
                .props
                .get(instr.pc)
                .map_or(1, |p| p.issue_cost)
                .max(instr.issue_stall.max(1));
            len += 1;
            if cost >= self.budget {
                return ScanEnd::Dead;
            }
        }
        ScanEnd::Continue { cost, len }
    }
}
