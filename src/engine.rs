//! Analysis entry point
//!
//! [`Analyzer`] owns everything derived once per kernel binary — the static
//! CFG, the property index, and the static def→use graph — and runs the
//! per-invocation pipeline on demand: dynamic graph construction, pruning,
//! blame attribution, optimizer matching, report assembly.
//!
//! One `analyze` call is a pure function of its inputs; all mutable state is
//! scoped to the call, so a single `Analyzer` can serve concurrently
//! analyzed invocation units from multiple threads.

use tracing::{debug, error, instrument};

use crate::advise::{rank, Candidate};
use crate::arch::GpuArch;
use crate::blame::{attribute, KernelBlame};
use crate::error::{CulpaError, Result};
use crate::graph::{build_dynamic_graph, build_static_graph, DepGraph};
use crate::kernel::Program;
use crate::profile::KernelProfile;
use crate::props::PropertyIndex;
use crate::prune::{prune, PruneSummary};
use crate::report::{assemble, InspectionReport};
use crate::stats::KernelStats;

/// Explicit, self-contained configuration for one analysis run
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Architecture model for the device the kernel ran on
    pub arch: GpuArch,
    /// Ranked candidates to keep
    pub top_advice: usize,
    /// Per-address metric rows to keep in the report
    pub top_metrics: usize,
}

impl AnalysisConfig {
    /// Defaults: five advice entries, thirty-two metric rows
    #[must_use]
    pub fn new(arch: GpuArch) -> Self {
        Self {
            arch,
            top_advice: 5,
            top_metrics: 32,
        }
    }

    /// Override the number of ranked candidates kept
    #[must_use]
    pub fn with_top_advice(mut self, n: usize) -> Self {
        self.top_advice = n;
        self
    }

    /// Override the number of metric rows kept
    #[must_use]
    pub fn with_top_metrics(mut self, n: usize) -> Self {
        self.top_metrics = n;
        self
    }
}

/// Everything one invocation's analysis produced
#[derive(Debug)]
pub struct AnalysisOutcome {
    /// The full blame table
    pub blame: KernelBlame,
    /// Ranked optimization candidates
    pub advice: Vec<Candidate>,
    /// Structured inspection record for the report formatter
    pub report: InspectionReport,
    /// Edges removed per pruning pass
    pub pruned: PruneSummary,
}

/// Per-binary analysis state, shareable read-only across invocation units
#[derive(Debug)]
pub struct Analyzer {
    program: Program,
    props: PropertyIndex,
    static_graph: DepGraph<u64>,
    config: AnalysisConfig,
}

impl Analyzer {
    /// Build the per-binary state: property index and static def→use graph
    #[must_use]
    pub fn new(program: Program, config: AnalysisConfig) -> Self {
        let props = PropertyIndex::build(&program, &config.arch);
        let static_graph = build_static_graph(&program);
        debug!(
            instructions = program.instruction_count(),
            static_edges = static_graph.edge_count(),
            "analyzer ready"
        );
        Self {
            program,
            props,
            static_graph,
            config,
        }
    }

    /// The decoded program under analysis
    #[must_use]
    pub fn program(&self) -> &Program {
        &self.program
    }

    /// The whole-kernel static def→use graph
    #[must_use]
    pub fn static_graph(&self) -> &DepGraph<u64> {
        &self.static_graph
    }

    /// Analyze one (process, thread, kernel-invocation) unit
    ///
    /// # Errors
    ///
    /// Returns [`CulpaError::UnmappedAddress`] when the profile references
    /// an address the static CFG does not cover. The error aborts only this
    /// unit; callers keep processing the rest of the batch.
    #[instrument(skip(self, profile, stats), fields(kernel = kernel_name))]
    pub fn analyze(
        &self,
        kernel_name: &str,
        profile: &KernelProfile,
        stats: &KernelStats,
    ) -> Result<AnalysisOutcome> {
        // Surface decoder/profile mismatches loudly before any work: they
        // indicate upstream data corruption, not a property of this kernel.
        for pc in profile.pcs() {
            if self.props.get(pc).is_none() {
                error!(pc, "profiled address missing from the property index");
                return Err(CulpaError::UnmappedAddress { pc });
            }
        }

        let mut working = profile.clone();
        let mut dynamic = build_dynamic_graph(&self.static_graph, &mut working);
        let candidates = dynamic.edge_count();

        let outcome = prune(&mut dynamic, &self.program, &self.props, &working)?;
        debug!(
            candidates,
            surviving = dynamic.edge_count(),
            removed = outcome.summary.total(),
            "pruning complete"
        );

        let blame = attribute(
            &self.program,
            &working,
            &dynamic,
            &outcome.paths,
            &self.config.arch,
        )?;
        let advice = rank(&blame, stats, &self.config.arch, self.config.top_advice);
        let report = assemble(kernel_name, &blame, &advice, self.config.top_metrics);

        Ok(AnalysisOutcome {
            blame,
            advice,
            report,
            pruned: outcome.summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::{Block, Function, Instruction, MemSpace, OpClass};
    use crate::profile::StallKind;

    fn small_analyzer() -> Analyzer {
        let b = Block::new(0x0, 0x30)
            .push(Instruction::new(0x0, OpClass::Memory(MemSpace::Shared)).def_reg(1))
            .push(Instruction::new(0x10, OpClass::Float).use_reg(1).def_reg(2))
            .push(Instruction::new(0x20, OpClass::Float).use_reg(2));
        let program = Program::new(vec![Function::new("k", 0x0, vec![0])], vec![b]).unwrap();
        Analyzer::new(program, AnalysisConfig::new(GpuArch::volta()))
    }

    fn small_stats() -> KernelStats {
        KernelStats {
            blocks: 32,
            threads_per_block: 128,
            registers_per_thread: 40,
            active_warps_per_sm: 24.0,
            active_samples: 80.0,
            total_samples: 100.0,
            time_ns: 10_000,
            invocations: 1,
            sm_efficiency: 1.0,
        }
    }

    #[test]
    fn test_end_to_end_single_cause() {
        let analyzer = small_analyzer();
        let mut profile = KernelProfile::new();
        profile
            .record(0x10, "latency_exec_dep_register", 40.0)
            .unwrap();

        let outcome = analyzer
            .analyze("k", &profile, &small_stats())
            .unwrap();
        assert_eq!(outcome.blame.len(), 1);
        assert_eq!(outcome.blame.records()[0].cause_pc, 0x0);
        assert_eq!(
            outcome.blame.records()[0].kind,
            StallKind::ExecDepSharedMemory
        );
        assert!(!outcome.advice.is_empty());
        assert_eq!(outcome.report.kernel, "k");
    }

    #[test]
    fn test_unmapped_profile_address_aborts_unit() {
        let analyzer = small_analyzer();
        let mut profile = KernelProfile::new();
        profile
            .record(0xbeef, "latency_exec_dep_register", 1.0)
            .unwrap();

        let err = analyzer
            .analyze("k", &profile, &small_stats())
            .unwrap_err();
        assert!(matches!(err, CulpaError::UnmappedAddress { pc: 0xbeef }));
    }

    #[test]
    fn test_reruns_are_identical() {
        let analyzer = small_analyzer();
        let mut profile = KernelProfile::new();
        profile.record(0x10, "latency_exec_dep_register", 40.0).unwrap();
        profile.record(0x20, "latency_exec_dep_register", 10.0).unwrap();
        profile.record(0x20, "stall_pipe_busy", 2.0).unwrap();

        let first = analyzer.analyze("k", &profile, &small_stats()).unwrap();
        let second = analyzer.analyze("k", &profile, &small_stats()).unwrap();
        assert_eq!(
            first.report.to_json().unwrap(),
            second.report.to_json().unwrap()
        );
    }

    #[test]
    fn test_caller_input_profile_untouched() {
        let analyzer = small_analyzer();
        let mut profile = KernelProfile::new();
        profile.record(0x10, "latency_exec_dep_register", 40.0).unwrap();
        let before = profile.len();

        analyzer.analyze("k", &profile, &small_stats()).unwrap();
        // Synthesized zero nodes live in the unit-scoped working copy only.
        assert_eq!(profile.len(), before);
    }
}
