//! Speedup estimators
//!
//! Each optimizer pairs with one estimator that converts a blame series —
//! `(blame, active, total)` sample tuples for one or more regions of
//! interest — into per-region ratio/speedup pairs and an aggregate score
//! used for ranking.

use serde::Serialize;

use crate::arch::GpuArch;
use crate::stats::KernelStats;

/// One region of interest in a blame series
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Region {
    /// Blame samples attributed to the region
    pub blame: f64,
    /// Samples with at least one warp issuing
    pub active: f64,
    /// Total samples over the region
    pub total: f64,
}

impl Region {
    /// Whole-kernel region from the execution statistics
    #[must_use]
    pub fn whole_kernel(blame: f64, stats: &KernelStats) -> Self {
        Self {
            blame,
            active: stats.active_samples,
            total: stats.total_samples,
        }
    }
}

/// Ratio/speedup series produced by an estimator
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Estimate {
    /// Per-region fraction of samples the fix addresses
    pub ratios: Vec<f64>,
    /// Per-region predicted speedup
    pub speedups: Vec<f64>,
    /// Aggregate speedup used as the ranking score
    pub score: f64,
}

/// Analytical speedup models, one per optimizer family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Estimator {
    /// Removing the blamed samples shortens the run proportionally
    Sequential,
    /// Like [`Self::Sequential`], but the removable amount is capped at the
    /// region's active samples — hidden latency cannot be removed twice
    SequentialHiding,
    /// The first region's blame is an idle fraction; filling it gives
    /// `1 / blame`
    ParallelAdditive,
    /// Amdahl-style model of raising resident warps toward the hardware
    /// maximum
    ParallelOccupancy,
}

impl Estimator {
    /// Convert a blame series into ratios, speedups, and a ranking score
    #[must_use]
    pub fn estimate(self, series: &[Region], stats: &KernelStats, arch: &GpuArch) -> Estimate {
        match self {
            Self::Sequential => Self::sequential(series, |r| r.blame),
            Self::SequentialHiding => Self::sequential(series, |r| r.blame.min(r.active)),
            Self::ParallelAdditive => Self::parallel_additive(series),
            Self::ParallelOccupancy => Self::parallel_occupancy(series, stats, arch),
        }
    }

    /// Shared sequential model over a removable-amount selector
    fn sequential(series: &[Region], removable: impl Fn(&Region) -> f64) -> Estimate {
        let mut est = Estimate::default();
        let mut blame_sum = 0.0;
        let mut total: f64 = 0.0;
        for region in series {
            let amount = removable(region).max(0.0);
            est.ratios.push(ratio(amount, region.total));
            est.speedups.push(shorten(region.total, amount));
            blame_sum += amount;
            total = total.max(region.total);
        }
        est.score = shorten(total, blame_sum);
        est
    }

    fn parallel_additive(series: &[Region]) -> Estimate {
        let fraction = series.first().map_or(0.0, |r| r.blame);
        let speedup = if fraction > 0.0 { 1.0 / fraction } else { 1.0 };
        Estimate {
            ratios: vec![fraction],
            speedups: vec![speedup],
            score: speedup,
        }
    }

    fn parallel_occupancy(series: &[Region], stats: &KernelStats, arch: &GpuArch) -> Estimate {
        let expansion = if stats.active_warps_per_sm > 0.0 {
            (f64::from(arch.max_warps_per_sm) / stats.active_warps_per_sm).max(1.0)
        } else {
            1.0
        };
        let mut est = Estimate::default();
        for region in series {
            let f = ratio(region.blame, region.total);
            let speedup = 1.0 / ((1.0 - f) + f / expansion);
            est.ratios.push(f);
            est.speedups.push(speedup);
        }
        est.score = est.speedups.first().copied().unwrap_or(1.0);
        est
    }
}

/// Fraction with a zero-total guard
fn ratio(amount: f64, total: f64) -> f64 {
    if total > 0.0 {
        (amount / total).min(1.0)
    } else {
        0.0
    }
}

/// `total / (total - removed)`, saturating when everything is removed
fn shorten(total: f64, removed: f64) -> f64 {
    if total <= 0.0 {
        return 1.0;
    }
    let remaining = total - removed;
    if remaining > 0.0 {
        total / remaining
    } else {
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats() -> KernelStats {
        KernelStats {
            blocks: 80,
            threads_per_block: 256,
            registers_per_thread: 32,
            active_warps_per_sm: 16.0,
            active_samples: 700.0,
            total_samples: 1000.0,
            time_ns: 1_000_000,
            invocations: 1,
            sm_efficiency: 1.0,
        }
    }

    #[test]
    fn test_sequential_basic() {
        // 200 of 1000 samples removed: 1.25x, 20%.
        let est = Estimator::Sequential.estimate(
            &[Region::whole_kernel(200.0, &stats())],
            &stats(),
            &GpuArch::volta(),
        );
        assert!((est.score - 1.25).abs() < 1e-9);
        assert!((est.ratios[0] - 0.2).abs() < 1e-9);
        assert!((est.speedups[0] - 1.25).abs() < 1e-9);
    }

    #[test]
    fn test_sequential_hiding_caps_at_active() {
        // 900 blame against only 700 active samples: at most 700 removable.
        let est = Estimator::SequentialHiding.estimate(
            &[Region::whole_kernel(900.0, &stats())],
            &stats(),
            &GpuArch::volta(),
        );
        assert!((est.ratios[0] - 0.7).abs() < 1e-9);
        assert!((est.score - 1000.0 / 300.0).abs() < 1e-9);
    }

    #[test]
    fn test_parallel_additive_guards_zero() {
        let arch = GpuArch::volta();
        let zero = Estimator::ParallelAdditive.estimate(
            &[Region {
                blame: 0.0,
                active: 0.0,
                total: 0.0,
            }],
            &stats(),
            &arch,
        );
        assert_eq!(zero.score, 1.0);

        let half = Estimator::ParallelAdditive.estimate(
            &[Region {
                blame: 0.5,
                active: 0.0,
                total: 0.0,
            }],
            &stats(),
            &arch,
        );
        assert!((half.score - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_parallel_occupancy_amdahl() {
        // 16 of 64 warps resident: 4x expansion of the stalled half.
        let est = Estimator::ParallelOccupancy.estimate(
            &[Region::whole_kernel(500.0, &stats())],
            &stats(),
            &GpuArch::volta(),
        );
        let expected = 1.0 / (0.5 + 0.5 / 4.0);
        assert!((est.score - expected).abs() < 1e-9);
    }

    #[test]
    fn test_parallel_occupancy_full_residency_no_gain() {
        let mut full = stats();
        full.active_warps_per_sm = 64.0;
        let est = Estimator::ParallelOccupancy.estimate(
            &[Region::whole_kernel(500.0, &full)],
            &full,
            &GpuArch::volta(),
        );
        assert!((est.score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_sequential_saturates_when_all_removed() {
        let est = Estimator::Sequential.estimate(
            &[Region::whole_kernel(1000.0, &stats())],
            &stats(),
            &GpuArch::volta(),
        );
        assert_eq!(est.score, 1000.0);
    }

    #[test]
    fn test_multi_region_aggregate() {
        let regions = [
            Region::whole_kernel(100.0, &stats()),
            Region::whole_kernel(150.0, &stats()),
        ];
        let est = Estimator::Sequential.estimate(&regions, &stats(), &GpuArch::volta());
        assert_eq!(est.speedups.len(), 2);
        assert!((est.score - 1000.0 / 750.0).abs() < 1e-9);
    }
}
