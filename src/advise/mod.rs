//! Optimizer catalog and speedup estimation
//!
//! Consumes one kernel's aggregated blame table and execution statistics,
//! matches the closed optimizer catalog against it, and ranks the resulting
//! candidates by analytically estimated speedup.

pub mod catalog;
pub mod estimator;

pub use catalog::{rank, Candidate, HotSpot, Optimizer, TuningDeltas, CATALOG};
pub use estimator::{Estimate, Estimator, Region};
