//! Culpa: Stall-Blame Diagnosis for Accelerator Kernels
//!
//! **Culpa** (Spanish: "blame") reconstructs *why* a massively parallel
//! kernel stalled. Given a kernel's static control-flow graph and a sampled
//! profile attributing stall/latency counts to instruction addresses, it:
//!
//! 1. Builds a whole-kernel static def→use graph and a per-invocation
//!    dynamic graph over the profiled addresses
//! 2. Prunes candidate dependency edges through three evidence filters
//!    (opcode class, scoreboard barriers, latency feasibility)
//! 3. Apportions each observed stall onto the upstream instructions that
//!    caused it, aggregated by blame category
//! 4. Matches the aggregate against a catalog of optimizers and ranks the
//!    resulting tuning advice by analytically estimated speedup
//!
//! # Quick Start
//!
//! ```rust
//! use culpa::arch::GpuArch;
//! use culpa::engine::{AnalysisConfig, Analyzer};
//! use culpa::kernel::{Block, Function, Instruction, MemSpace, OpClass, Program};
//! use culpa::profile::KernelProfile;
//! use culpa::stats::KernelStats;
//!
//! // A two-instruction kernel: a shared-memory load feeding a multiply.
//! let block = Block::new(0x0, 0x20)
//!     .push(Instruction::new(0x0, OpClass::Memory(MemSpace::Shared)).def_reg(1))
//!     .push(Instruction::new(0x10, OpClass::Float).use_reg(1));
//! let program = Program::new(vec![Function::new("k", 0x0, vec![0])], vec![block]).unwrap();
//! let analyzer = Analyzer::new(program, AnalysisConfig::new(GpuArch::volta()));
//!
//! // The multiply sampled 40 cycles of execution-dependency latency.
//! let mut profile = KernelProfile::new();
//! profile.record(0x10, "latency_exec_dep_register", 40.0).unwrap();
//!
//! let stats = KernelStats {
//!     blocks: 32,
//!     threads_per_block: 128,
//!     registers_per_thread: 40,
//!     active_warps_per_sm: 24.0,
//!     active_samples: 80.0,
//!     total_samples: 100.0,
//!     time_ns: 10_000,
//!     invocations: 1,
//!     sm_efficiency: 1.0,
//! };
//! let outcome = analyzer.analyze("k", &profile, &stats).unwrap();
//! assert_eq!(outcome.blame.records()[0].cause_pc, 0x0);
//! ```
//!
//! # Scope
//!
//! Culpa is a pure in-memory transformation invoked as a library call from a
//! batch post-processing pipeline. The binary decoder, the sampler, source
//! correlation, and report rendering are external collaborators; culpa
//! consumes their outputs ([`kernel::Program`], [`profile::KernelProfile`],
//! [`stats::KernelStats`]) and produces a blame table plus ranked advice.
//!
//! Analyses of separate (process, thread, kernel-invocation) units are
//! independent: the [`engine::Analyzer`] is read-only during analysis, so
//! callers may fan units out across any worker pool.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod advise;
pub mod arch;
pub mod blame;
pub mod engine;
pub mod error;
pub mod graph;
pub mod kernel;
pub mod profile;
pub mod props;
pub mod prune;
pub mod report;
pub mod stats;

pub use advise::{Candidate, Optimizer};
pub use arch::GpuArch;
pub use blame::{InstrBlame, KernelBlame};
pub use engine::{AnalysisConfig, AnalysisOutcome, Analyzer};
pub use error::{CulpaError, Result};
pub use kernel::Program;
pub use profile::{KernelProfile, StallKind};
pub use report::InspectionReport;
pub use stats::KernelStats;
