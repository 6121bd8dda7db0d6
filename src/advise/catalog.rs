//! Optimizer catalog
//!
//! A closed set of pattern matchers, each consuming the aggregated kernel
//! blame and execution statistics and producing at most one quantified
//! tuning candidate. The catalog declaration order is the ranking
//! tie-break, so adding a new optimizer at the end never reshuffles
//! existing reports.

use serde::Serialize;

use crate::advise::estimator::{Estimate, Estimator, Region};
use crate::arch::GpuArch;
use crate::blame::{InstrBlame, KernelBlame};
use crate::profile::StallKind;
use crate::stats::KernelStats;

/// Hot blame records carried per candidate
const HOT_LIMIT: usize = 5;

/// The closed optimizer catalog, in tie-break order
pub const CATALOG: [Optimizer; 8] = [
    Optimizer::OccupancyIncrease,
    Optimizer::GlobalMemoryCoalesce,
    Optimizer::SharedMemoryTransfer,
    Optimizer::CodeReorder,
    Optimizer::LoopUnroll,
    Optimizer::RegisterReduce,
    Optimizer::SyncReduce,
    Optimizer::BlockIncrease,
];

/// One optimization pattern the engine knows how to recognize and quantify
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Optimizer {
    /// Raise resident warps so dependency latency overlaps with other warps
    OccupancyIncrease,
    /// Restructure global memory accesses that keep consumers waiting
    GlobalMemoryCoalesce,
    /// Move repeatedly accessed shared-memory data into registers
    SharedMemoryTransfer,
    /// Separate producers from consumers to hide short latencies
    CodeReorder,
    /// Unroll hot loops to relieve instruction fetch pressure
    LoopUnroll,
    /// Cut per-thread registers to stop local-memory spilling
    RegisterReduce,
    /// Reduce or relocate block-wide synchronization
    SyncReduce,
    /// Launch more blocks to occupy idle SMs
    BlockIncrease,
}

/// Suggested before/after launch-configuration values
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TuningDeltas {
    /// Resident warps per SM (current, suggested)
    pub warps: Option<(u32, u32)>,
    /// Blocks launched (current, suggested)
    pub blocks: Option<(u32, u32)>,
    /// Threads per block (current, suggested)
    pub threads: Option<(u32, u32)>,
    /// Registers per thread (current, suggested)
    pub registers: Option<(u32, u32)>,
}

/// A blame record distilled for the report formatter
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HotSpot {
    /// Blamed instruction address
    pub cause_pc: u64,
    /// Stalling instruction address
    pub effect_pc: u64,
    /// Blame category
    pub kind: StallKind,
    /// Latency blame magnitude
    pub latency: f64,
    /// Shortest accepted path length, `None` for self-blame
    pub distance: Option<u32>,
}

impl From<&InstrBlame> for HotSpot {
    fn from(r: &InstrBlame) -> Self {
        Self {
            cause_pc: r.cause_pc,
            effect_pc: r.effect_pc,
            kind: r.kind,
            latency: r.latency,
            distance: r.distance,
        }
    }
}

/// One matched optimization opportunity with its quantified estimate
#[derive(Debug, Clone, Serialize)]
pub struct Candidate {
    /// Which optimizer matched
    pub optimizer: Optimizer,
    /// Stable display name
    pub name: &'static str,
    /// Human-readable tuning advice
    pub hint: String,
    /// Ratio/speedup series and ranking score
    pub estimate: Estimate,
    /// Optional launch-configuration suggestion
    pub tuning: Option<TuningDeltas>,
    /// Hottest supporting blame records
    pub hot: Vec<HotSpot>,
}

impl Optimizer {
    /// Stable display name
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::OccupancyIncrease => "increase occupancy",
            Self::GlobalMemoryCoalesce => "coalesce global memory accesses",
            Self::SharedMemoryTransfer => "move shared-memory data to registers",
            Self::CodeReorder => "reorder dependent instructions",
            Self::LoopUnroll => "unroll hot loops",
            Self::RegisterReduce => "reduce register pressure",
            Self::SyncReduce => "reduce synchronization",
            Self::BlockIncrease => "launch more blocks",
        }
    }

    /// The estimator this optimizer scores with
    #[must_use]
    pub const fn estimator(self) -> Estimator {
        match self {
            Self::OccupancyIncrease => Estimator::ParallelOccupancy,
            Self::GlobalMemoryCoalesce
            | Self::SharedMemoryTransfer
            | Self::LoopUnroll
            | Self::RegisterReduce => Estimator::Sequential,
            Self::CodeReorder | Self::SyncReduce => Estimator::SequentialHiding,
            Self::BlockIncrease => Estimator::ParallelAdditive,
        }
    }

    /// Match this optimizer against one kernel's blame table
    ///
    /// Returns `None` when the pattern does not apply.
    #[must_use]
    pub fn evaluate(
        self,
        blame: &KernelBlame,
        stats: &KernelStats,
        arch: &GpuArch,
    ) -> Option<Candidate> {
        match self {
            Self::OccupancyIncrease => self.occupancy_increase(blame, stats, arch),
            Self::GlobalMemoryCoalesce => self.kind_candidate(
                blame,
                stats,
                arch,
                &[StallKind::MemDepGlobal],
                |hot| {
                    format!(
                        "global loads near {} keep their consumers waiting; \
                         coalesce accesses or prefetch into shared memory",
                        fmt_pc(hot)
                    )
                },
                None,
            ),
            Self::SharedMemoryTransfer => self.kind_candidate(
                blame,
                stats,
                arch,
                &[StallKind::ExecDepSharedMemory],
                |hot| {
                    format!(
                        "shared-memory reads near {} are on the critical path; \
                         keep reused values in registers",
                        fmt_pc(hot)
                    )
                },
                None,
            ),
            Self::CodeReorder => self.kind_candidate(
                blame,
                stats,
                arch,
                &[StallKind::ExecDepRegister, StallKind::ExecDepWar],
                |hot| {
                    format!(
                        "consumers sit immediately behind their producers near {}; \
                         move independent instructions between them",
                        fmt_pc(hot)
                    )
                },
                None,
            ),
            Self::LoopUnroll => self.kind_candidate(
                blame,
                stats,
                arch,
                &[StallKind::InstructionFetch],
                |hot| {
                    format!(
                        "instruction fetch stalls concentrate near {}; \
                         unroll the enclosing loop to amortize fetches",
                        fmt_pc(hot)
                    )
                },
                None,
            ),
            Self::RegisterReduce => {
                let tuning = TuningDeltas {
                    registers: Some((
                        stats.registers_per_thread,
                        (stats.registers_per_thread * 3 / 4).max(16),
                    )),
                    ..TuningDeltas::default()
                };
                self.kind_candidate(
                    blame,
                    stats,
                    arch,
                    &[StallKind::MemDepLocal],
                    |hot| {
                        format!(
                            "local-memory traffic near {} indicates register spills; \
                             lower per-thread register use",
                            fmt_pc(hot)
                        )
                    },
                    Some(tuning),
                )
            }
            Self::SyncReduce => self.kind_candidate(
                blame,
                stats,
                arch,
                &[StallKind::Synchronization],
                |hot| {
                    format!(
                        "warps idle at barriers near {}; narrow the synchronized \
                         region or split the barrier",
                        fmt_pc(hot)
                    )
                },
                None,
            ),
            Self::BlockIncrease => self.block_increase(stats, arch),
        }
    }

    /// Shared matcher for optimizers driven by one or more blame kinds
    fn kind_candidate(
        self,
        blame: &KernelBlame,
        stats: &KernelStats,
        arch: &GpuArch,
        kinds: &[StallKind],
        hint: impl Fn(&[HotSpot]) -> String,
        tuning: Option<TuningDeltas>,
    ) -> Option<Candidate> {
        let amount: f64 = kinds.iter().map(|&k| blame.latency_total(k)).sum();
        if amount <= 0.0 {
            return None;
        }
        let hot = hot_spots(blame, kinds);
        let estimate = self
            .estimator()
            .estimate(&[Region::whole_kernel(amount, stats)], stats, arch);
        Some(Candidate {
            optimizer: self,
            name: self.name(),
            hint: hint(&hot),
            estimate,
            tuning,
            hot,
        })
    }

    fn occupancy_increase(
        self,
        blame: &KernelBlame,
        stats: &KernelStats,
        arch: &GpuArch,
    ) -> Option<Candidate> {
        let dependency = blame.dependency_latency();
        if dependency <= 0.0 || stats.active_warps_per_sm >= f64::from(arch.max_warps_per_sm) {
            return None;
        }
        let estimate = self.estimator().estimate(
            &[Region::whole_kernel(dependency, stats)],
            stats,
            arch,
        );
        let current_warps = stats.active_warps_per_sm.round() as u32;
        let expansion =
            (f64::from(arch.max_warps_per_sm) / stats.active_warps_per_sm).ceil() as u32;
        let kinds: Vec<StallKind> = StallKind::ALL
            .into_iter()
            .filter(|k| k.is_exec_dep() || k.is_mem_dep())
            .collect();
        Some(Candidate {
            optimizer: self,
            name: self.name(),
            hint: format!(
                "{current_warps} of {} warps per SM are resident; raise the block or \
                 thread count so dependency latency overlaps with other warps",
                arch.max_warps_per_sm
            ),
            estimate,
            tuning: Some(TuningDeltas {
                warps: Some((current_warps, arch.max_warps_per_sm)),
                blocks: Some((stats.blocks, stats.blocks.saturating_mul(expansion))),
                ..TuningDeltas::default()
            }),
            hot: hot_spots(blame, &kinds),
        })
    }

    fn block_increase(self, stats: &KernelStats, arch: &GpuArch) -> Option<Candidate> {
        if stats.sm_efficiency >= 1.0 || stats.sm_efficiency <= 0.0 {
            return None;
        }
        let estimate = self.estimator().estimate(
            &[Region {
                blame: stats.sm_efficiency,
                active: stats.active_samples,
                total: stats.total_samples,
            }],
            stats,
            arch,
        );
        let suggested = (f64::from(stats.blocks) / stats.sm_efficiency).ceil() as u32;
        Some(Candidate {
            optimizer: self,
            name: self.name(),
            hint: format!(
                "only {:.0}% of SMs held work; launch at least {suggested} blocks \
                 to cover all {} SMs",
                stats.sm_efficiency * 100.0,
                arch.sm_count
            ),
            estimate,
            tuning: Some(TuningDeltas {
                blocks: Some((stats.blocks, suggested)),
                ..TuningDeltas::default()
            }),
            hot: Vec::new(),
        })
    }
}

/// Top latency-blame records of the given kinds, bounded at [`HOT_LIMIT`]
fn hot_spots(blame: &KernelBlame, kinds: &[StallKind]) -> Vec<HotSpot> {
    blame
        .top_by_latency(usize::MAX)
        .filter(|r| kinds.contains(&r.kind))
        .take(HOT_LIMIT)
        .map(HotSpot::from)
        .collect()
}

/// Best address to point the user at, from a hot-spot list
fn fmt_pc(hot: &[HotSpot]) -> String {
    hot.first()
        .map_or_else(|| "the kernel entry".to_string(), |h| format!("{:#x}", h.cause_pc))
}

/// Match every optimizer and keep the `top_n` best candidates
///
/// Candidates are sorted descending by estimated speedup; the sort is
/// stable, so score ties resolve to catalog declaration order.
#[must_use]
pub fn rank(
    blame: &KernelBlame,
    stats: &KernelStats,
    arch: &GpuArch,
    top_n: usize,
) -> Vec<Candidate> {
    let mut candidates: Vec<Candidate> = CATALOG
        .into_iter()
        .filter_map(|o| o.evaluate(blame, stats, arch))
        .collect();
    candidates.sort_by(|a, b| b.estimate.score.total_cmp(&a.estimate.score));
    candidates.truncate(top_n);
    candidates
}
