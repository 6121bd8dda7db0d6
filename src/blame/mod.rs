//! Blame attribution
//!
//! Walks every profiled node and apportions its sampled stall and latency
//! onto the causes that survived pruning. Dependency latency is split per
//! apportionment group by the product of two normalized weights — inverse
//! longest accepted path length and own issue count — re-normalized so the
//! shares sum to one. The arithmetic, including its zero-guards and the
//! one-warp issue floor, is load-bearing: downstream optimizer thresholds
//! were tuned against exactly this formula.
//!
//! Self-stall kinds are always carried by the instruction itself;
//! synchronization is carried by the immediately preceding instruction; a
//! node whose causes were all pruned keeps its dependency latency under the
//! unexplained/scheduler kind rather than dropping it.

pub mod record;

use std::collections::BTreeMap;

pub use record::{InstrBlame, KernelBlame};

use crate::arch::GpuArch;
use crate::error::{CulpaError, Result};
use crate::graph::DepGraph;
use crate::kernel::{Instruction, Location, Program};
use crate::profile::{KernelProfile, ProfileNode, StallKind};
use crate::prune::PathStats;

/// Apportion all sampled stall and latency onto surviving causes
///
/// # Errors
///
/// Returns [`CulpaError::UnmappedAddress`] when a profiled address is not
/// covered by the static CFG.
pub fn attribute(
    program: &Program,
    profile: &KernelProfile,
    dynamic: &DepGraph<u64>,
    paths: &BTreeMap<(u64, u64), PathStats>,
    arch: &GpuArch,
) -> Result<KernelBlame> {
    let mut blame = KernelBlame::new();
    for node in profile.nodes() {
        let loc = program
            .location_of(node.pc)
            .ok_or(CulpaError::UnmappedAddress { pc: node.pc })?;
        blame_self_stalls(node, loc, &mut blame);
        blame_synchronization(program, node, loc, &mut blame);
        blame_dependencies(program, profile, dynamic, paths, arch, node, loc, &mut blame)?;
    }
    blame.finalize();
    Ok(blame)
}

/// Self-stall kinds stay on the instruction that sampled them
fn blame_self_stalls(node: &ProfileNode, loc: Location, blame: &mut KernelBlame) {
    for kind in StallKind::ALL {
        if !kind.is_self_stall() {
            continue;
        }
        let stall = node.stall.get(kind);
        let latency = node.latency.get(kind);
        if stall == 0.0 && latency == 0.0 {
            continue;
        }
        blame.push(InstrBlame {
            cause_pc: node.pc,
            effect_pc: node.pc,
            function: loc.function,
            block: loc.block,
            distance: None,
            kind,
            stall,
            latency,
        });
    }
}

/// Synchronization stalls are carried by the immediately preceding
/// instruction in the block; an effect at the block start carries them
/// itself
fn blame_synchronization(
    program: &Program,
    node: &ProfileNode,
    loc: Location,
    blame: &mut KernelBlame,
) {
    let stall = node.stall.get(StallKind::Synchronization);
    let latency = node.latency.get(StallKind::Synchronization);
    if stall == 0.0 && latency == 0.0 {
        return;
    }
    let (cause_pc, distance) = if loc.index > 0 {
        let prev = &program.block(loc.block).instructions[loc.index - 1];
        (prev.pc, Some(0))
    } else {
        (node.pc, None)
    };
    blame.push(InstrBlame {
        cause_pc,
        effect_pc: node.pc,
        function: loc.function,
        block: loc.block,
        distance,
        kind: StallKind::Synchronization,
        stall,
        latency,
    });
}

/// Apportion the two dependency groups; orphaned latency becomes
/// unexplained/scheduler blame on the node itself
#[allow(clippy::too_many_arguments)]
fn blame_dependencies(
    program: &Program,
    profile: &KernelProfile,
    dynamic: &DepGraph<u64>,
    paths: &BTreeMap<(u64, u64), PathStats>,
    arch: &GpuArch,
    node: &ProfileNode,
    loc: Location,
    blame: &mut KernelBlame,
) -> Result<()> {
    let mut exec_members = Vec::new();
    let mut mem_members = Vec::new();
    if let Some(causes) = dynamic.incoming(node.pc) {
        for &cause in causes {
            let ci = program
                .instruction_at(cause)
                .ok_or(CulpaError::UnmappedAddress { pc: cause })?;
            if ci.op.is_memory() && !ci.op.is_shared_memory() {
                mem_members.push(cause);
            } else {
                exec_members.push(cause);
            }
        }
    }

    let mut orphan_stall = 0.0;
    let mut orphan_latency = 0.0;
    for (members, group_stall, group_latency) in [
        (
            &exec_members,
            node.stall.exec_dep_total(),
            node.latency.exec_dep_total(),
        ),
        (
            &mem_members,
            node.stall.mem_dep_total(),
            node.latency.mem_dep_total(),
        ),
    ] {
        if group_stall == 0.0 && group_latency == 0.0 {
            continue;
        }
        if members.is_empty() {
            orphan_stall += group_stall;
            orphan_latency += group_latency;
            continue;
        }
        apportion(
            program,
            profile,
            paths,
            arch,
            node,
            loc,
            members,
            group_stall,
            group_latency,
            blame,
        )?;
    }

    if orphan_stall != 0.0 || orphan_latency != 0.0 {
        blame.push(InstrBlame {
            cause_pc: node.pc,
            effect_pc: node.pc,
            function: loc.function,
            block: loc.block,
            distance: None,
            kind: StallKind::ExecDepScheduler,
            stall: orphan_stall,
            latency: orphan_latency,
        });
    }
    Ok(())
}

/// Split one group's stall/latency across its members
#[allow(clippy::too_many_arguments)]
fn apportion(
    program: &Program,
    profile: &KernelProfile,
    paths: &BTreeMap<(u64, u64), PathStats>,
    arch: &GpuArch,
    node: &ProfileNode,
    loc: Location,
    members: &[u64],
    group_stall: f64,
    group_latency: f64,
    blame: &mut KernelBlame,
) -> Result<()> {
    let shares = member_shares(profile, paths, arch, node.pc, members);
    for (&cause, share) in members.iter().zip(shares) {
        let ci = program
            .instruction_at(cause)
            .ok_or(CulpaError::UnmappedAddress { pc: cause })?;
        let ei = program
            .instruction_at(node.pc)
            .ok_or(CulpaError::UnmappedAddress { pc: node.pc })?;
        let stats = paths.get(&(cause, node.pc));
        blame.push(InstrBlame {
            cause_pc: cause,
            effect_pc: node.pc,
            function: loc.function,
            block: loc.block,
            distance: Some(stats.map_or(0, |s| s.shortest)),
            kind: edge_kind(ci, ei),
            stall: group_stall * share,
            latency: group_latency * share,
        });
    }
    Ok(())
}

/// Apportionment shares for a group, summing to one
///
/// A single member takes everything. Otherwise each member is weighted by
/// (inverse longest accepted path length, normalized) × (own issue count,
/// floored at one warp's worth when never sampled, normalized), and the
/// products are re-normalized. A zero normalization denominator substitutes
/// a neutral weight of 1 so apportionment stays well-defined.
fn member_shares(
    profile: &KernelProfile,
    paths: &BTreeMap<(u64, u64), PathStats>,
    arch: &GpuArch,
    effect_pc: u64,
    members: &[u64],
) -> Vec<f64> {
    let n = members.len();
    if n == 1 {
        return vec![1.0];
    }

    let dist: Vec<f64> = members
        .iter()
        .map(|&m| {
            let longest = paths.get(&(m, effect_pc)).map_or(1, |s| s.longest.max(1));
            1.0 / f64::from(longest)
        })
        .collect();
    let issue: Vec<f64> = members
        .iter()
        .map(|&m| {
            let issued = profile.node(m).map_or(0.0, |p| p.issued);
            if issued == 0.0 {
                f64::from(arch.warp_size)
            } else {
                issued
            }
        })
        .collect();

    let normalize = |weights: &[f64]| -> Vec<f64> {
        let sum: f64 = weights.iter().sum();
        if sum == 0.0 {
            vec![1.0; weights.len()]
        } else {
            weights.iter().map(|w| w / sum).collect()
        }
    };
    let dist_norm = normalize(&dist);
    let issue_norm = normalize(&issue);

    let mut shares: Vec<f64> = dist_norm
        .iter()
        .zip(&issue_norm)
        .map(|(d, i)| d * i)
        .collect();
    let sum: f64 = shares.iter().sum();
    if sum == 0.0 {
        vec![1.0 / n as f64; n]
    } else {
        for s in &mut shares {
            *s /= sum;
        }
        shares
    }
}

/// Blame category for a surviving cause→effect edge
fn edge_kind(cause: &Instruction, effect: &Instruction) -> StallKind {
    use crate::kernel::MemSpace;
    if let crate::kernel::OpClass::Memory(space) = cause.op {
        return match space {
            MemSpace::Shared => StallKind::ExecDepSharedMemory,
            MemSpace::Local => StallKind::MemDepLocal,
            MemSpace::Constant => StallKind::MemDepConstant,
            MemSpace::Global | MemSpace::Generic | MemSpace::Texture => StallKind::MemDepGlobal,
        };
    }
    // A dependence carried only through a read scoreboard is a WAR hazard.
    let war_only = cause.read_barriers.iter().any(|&b| effect.waits_on(b))
        && !effect.uses().any(|v| {
            cause.dst_regs.iter().any(|&r| v == crate::kernel::Value::Register(r))
                || cause.dst_preds.iter().any(|&p| v == crate::kernel::Value::Predicate(p))
                || cause.write_barriers.iter().any(|&b| v == crate::kernel::Value::Barrier(b))
        });
    if war_only {
        StallKind::ExecDepWar
    } else {
        StallKind::ExecDepRegister
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{build_dynamic_graph, build_static_graph};
    use crate::kernel::{Block, Function, MemSpace, OpClass};
    use crate::props::PropertyIndex;
    use crate::prune;

    fn run_blame(
        program: &Program,
        profile: &mut KernelProfile,
    ) -> (KernelBlame, DepGraph<u64>) {
        let arch = GpuArch::volta();
        let props = PropertyIndex::build(program, &arch);
        let static_graph = build_static_graph(program);
        let mut dynamic = build_dynamic_graph(&static_graph, profile);
        let outcome = prune::prune(&mut dynamic, program, &props, profile).unwrap();
        let blame = attribute(program, profile, &dynamic, &outcome.paths, &arch).unwrap();
        (blame, dynamic)
    }

    #[test]
    fn test_single_cause_takes_all() {
        let b = Block::new(0x0, 0x20)
            .push(Instruction::new(0x0, OpClass::Memory(MemSpace::Shared)).def_reg(1))
            .push(Instruction::new(0x10, OpClass::Float).use_reg(1));
        let program = Program::new(vec![Function::new("k", 0x0, vec![0])], vec![b]).unwrap();

        let mut profile = KernelProfile::new();
        profile
            .record(0x10, "latency_exec_dep_register", 40.0)
            .unwrap();
        profile.record(0x10, "stall_exec_dep_register", 4.0).unwrap();
        let (blame, _) = run_blame(&program, &mut profile);

        assert_eq!(blame.len(), 1);
        let r = &blame.records()[0];
        assert_eq!(r.cause_pc, 0x0);
        assert_eq!(r.effect_pc, 0x10);
        assert_eq!(r.kind, StallKind::ExecDepSharedMemory);
        assert_eq!(r.latency, 40.0);
        assert_eq!(r.stall, 4.0);
        assert_eq!(r.distance, Some(0));
    }

    #[test]
    fn test_issue_weight_split() {
        // Two ALU causes at equal distance; issue counts 10 and 30 must
        // split 100 latency samples 25/75.
        let b = Block::new(0x0, 0x40)
            .push(Instruction::new(0x0, OpClass::Integer).def_reg(1))
            .push(Instruction::new(0x10, OpClass::Integer).def_reg(2))
            .push(
                Instruction::new(0x20, OpClass::Float)
                    .use_reg(1)
                    .use_reg(2),
            );
        let program = Program::new(vec![Function::new("k", 0x0, vec![0])], vec![b]).unwrap();

        let mut profile = KernelProfile::new();
        profile.record(0x0, "issued", 10.0).unwrap();
        profile.record(0x10, "issued", 30.0).unwrap();
        profile
            .record(0x20, "latency_exec_dep_register", 100.0)
            .unwrap();
        let (blame, _) = run_blame(&program, &mut profile);

        let share_of = |cause: u64| {
            blame
                .records()
                .iter()
                .find(|r| r.cause_pc == cause)
                .map(|r| r.latency)
                .unwrap()
        };
        // Distance weights differ slightly (paths of length 1 and 0 floor to
        // 1), so both cancel and the issue ratio decides.
        assert!((share_of(0x0) - 25.0).abs() < 1e-9);
        assert!((share_of(0x10) - 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_conservation_per_group() {
        let b = Block::new(0x0, 0x40)
            .push(Instruction::new(0x0, OpClass::Memory(MemSpace::Global)).def_reg(1))
            .push(Instruction::new(0x10, OpClass::Memory(MemSpace::Global)).def_reg(2))
            .push(
                Instruction::new(0x20, OpClass::Float)
                    .use_reg(1)
                    .use_reg(2),
            );
        let program = Program::new(vec![Function::new("k", 0x0, vec![0])], vec![b]).unwrap();

        let mut profile = KernelProfile::new();
        profile.record(0x0, "issued", 7.0).unwrap();
        profile.record(0x10, "issued", 13.0).unwrap();
        profile.record(0x20, "latency_mem_dep_global", 64.0).unwrap();
        profile.record(0x20, "stall_mem_dep_global", 8.0).unwrap();
        let (blame, _) = run_blame(&program, &mut profile);

        let latency_sum: f64 = blame.records().iter().map(|r| r.latency).sum();
        let stall_sum: f64 = blame.records().iter().map(|r| r.stall).sum();
        assert!((latency_sum - 64.0).abs() < 1e-6);
        assert!((stall_sum - 8.0).abs() < 1e-6);
    }

    #[test]
    fn test_orphan_goes_to_scheduler() {
        // Latency sampled but no def of the consumed register exists, so no
        // candidate edge survives: unexplained.
        let b = Block::new(0x0, 0x30)
            .push(Instruction::new(0x0, OpClass::Integer).def_reg(1))
            .push(Instruction::new(0x10, OpClass::Integer).def_reg(1))
            .push(Instruction::new(0x20, OpClass::Float).use_reg(2));
        let program = Program::new(vec![Function::new("k", 0x0, vec![0])], vec![b]).unwrap();

        let mut profile = KernelProfile::new();
        profile
            .record(0x20, "latency_exec_dep_register", 33.0)
            .unwrap();
        let (blame, dynamic) = run_blame(&program, &mut profile);

        assert!(dynamic.incoming(0x20).unwrap().is_empty());
        assert_eq!(blame.latency_total(StallKind::ExecDepScheduler), 33.0);
        let r = blame
            .records()
            .iter()
            .find(|r| r.kind == StallKind::ExecDepScheduler)
            .unwrap();
        assert_eq!(r.cause_pc, r.effect_pc);
        assert_eq!(r.distance, None);
    }

    #[test]
    fn test_self_stall_stays_put() {
        let b = Block::new(0x0, 0x10).push(Instruction::new(0x0, OpClass::Integer));
        let program = Program::new(vec![Function::new("k", 0x0, vec![0])], vec![b]).unwrap();

        let mut profile = KernelProfile::new();
        profile.record(0x0, "stall_pipe_busy", 6.0).unwrap();
        profile.record(0x0, "stall_instruction_fetch", 2.0).unwrap();
        let (blame, _) = run_blame(&program, &mut profile);

        assert_eq!(blame.stall_total(StallKind::PipeBusy), 6.0);
        assert_eq!(blame.stall_total(StallKind::InstructionFetch), 2.0);
        assert!(blame.records().iter().all(|r| r.cause_pc == r.effect_pc));
    }

    #[test]
    fn test_synchronization_blames_predecessor() {
        let b = Block::new(0x0, 0x20)
            .push(Instruction::new(0x0, OpClass::Memory(MemSpace::Shared)).def_reg(1))
            .push(Instruction::new(0x10, OpClass::Control).use_reg(1));
        let program = Program::new(vec![Function::new("k", 0x0, vec![0])], vec![b]).unwrap();

        let mut profile = KernelProfile::new();
        profile.record(0x10, "stall_synchronization", 12.0).unwrap();
        let (blame, _) = run_blame(&program, &mut profile);

        let r = blame
            .records()
            .iter()
            .find(|r| r.kind == StallKind::Synchronization)
            .unwrap();
        assert_eq!(r.cause_pc, 0x0);
        assert_eq!(r.effect_pc, 0x10);
        assert_eq!(r.stall, 12.0);
    }

    #[test]
    fn test_sync_at_block_start_blames_itself() {
        let b = Block::new(0x0, 0x10).push(Instruction::new(0x0, OpClass::Control));
        let program = Program::new(vec![Function::new("k", 0x0, vec![0])], vec![b]).unwrap();

        let mut profile = KernelProfile::new();
        profile.record(0x0, "stall_synchronization", 5.0).unwrap();
        let (blame, _) = run_blame(&program, &mut profile);

        let r = &blame.records()[0];
        assert_eq!(r.cause_pc, 0x0);
        assert_eq!(r.distance, None);
    }

    #[test]
    fn test_war_kind_for_read_barrier_dependence() {
        // Store reads barrier 1; the next write to its source register waits
        // on barrier 1 before overwriting.
        let cause = Instruction::new(0x0, OpClass::Integer)
            .use_reg(4)
            .read_barrier(1);
        let effect = Instruction::new(0x10, OpClass::Integer).def_reg(4).wait_on(1);
        assert_eq!(edge_kind(&cause, &effect), StallKind::ExecDepWar);
    }

    #[test]
    fn test_register_kind_for_data_dependence() {
        let cause = Instruction::new(0x0, OpClass::Integer).def_reg(4).read_barrier(1);
        let effect = Instruction::new(0x10, OpClass::Float).use_reg(4).wait_on(1);
        assert_eq!(edge_kind(&cause, &effect), StallKind::ExecDepRegister);
    }
}
