//! Inspection report assembly
//!
//! Converts one kernel's blame table and ranked advice into structured,
//! serializable records: per-kind totals, per-address blame metrics ready to
//! merge back into the profile store, and the ranked candidates. Rendering
//! to text is the report formatter's job, not ours.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::advise::Candidate;
use crate::blame::KernelBlame;
use crate::error::Result;
use crate::profile::StallKind;

/// Aggregated blame for one kind across the kernel
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct KindSummary {
    /// Blame category
    pub kind: StallKind,
    /// Total stall blame in the category
    pub stall: f64,
    /// Total latency blame in the category
    pub latency: f64,
}

/// Blame attributed to one cause address, exportable as a named metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BlameMetricRow {
    /// Cause instruction address the metric is keyed on
    pub pc: u64,
    /// Blame category
    pub kind: StallKind,
    /// Stall blame carried by this address
    pub stall: f64,
    /// Latency blame carried by this address
    pub latency: f64,
}

/// The structured inspection record for one kernel invocation
#[derive(Debug, Clone, Serialize)]
pub struct InspectionReport {
    /// Kernel name as reported by the decoder
    pub kernel: String,
    /// Per-kind blame totals, non-zero kinds only
    pub kinds: Vec<KindSummary>,
    /// Top per-address blame rows, sorted descending by latency
    pub metrics: Vec<BlameMetricRow>,
    /// Ranked optimization candidates
    pub advice: Vec<Candidate>,
}

impl InspectionReport {
    /// Serialize the report to pretty JSON
    ///
    /// # Errors
    ///
    /// Returns [`crate::CulpaError::Json`] when serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Assemble the inspection record from analysis results
#[must_use]
pub fn assemble(
    kernel: &str,
    blame: &KernelBlame,
    advice: &[Candidate],
    top_metrics: usize,
) -> InspectionReport {
    let kinds = StallKind::ALL
        .into_iter()
        .map(|kind| KindSummary {
            kind,
            stall: blame.stall_total(kind),
            latency: blame.latency_total(kind),
        })
        .filter(|s| s.stall != 0.0 || s.latency != 0.0)
        .collect();

    // Merge records into one row per (cause, kind) before picking the top.
    let mut per_cause: BTreeMap<(u64, usize), (f64, f64)> = BTreeMap::new();
    for r in blame.records() {
        let entry = per_cause.entry((r.cause_pc, r.kind.index())).or_insert((0.0, 0.0));
        entry.0 += r.stall;
        entry.1 += r.latency;
    }
    let mut metrics: Vec<BlameMetricRow> = per_cause
        .into_iter()
        .map(|((pc, kind_index), (stall, latency))| BlameMetricRow {
            pc,
            kind: StallKind::ALL[kind_index],
            stall,
            latency,
        })
        .collect();
    metrics.sort_by(|a, b| b.latency.total_cmp(&a.latency));
    metrics.truncate(top_metrics);

    InspectionReport {
        kernel: kernel.to_string(),
        kinds,
        metrics,
        advice: advice.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blame::InstrBlame;

    fn sample_blame() -> KernelBlame {
        let mut blame = KernelBlame::new();
        blame.push(InstrBlame {
            cause_pc: 0x0,
            effect_pc: 0x10,
            function: 0,
            block: 0,
            distance: Some(0),
            kind: StallKind::MemDepGlobal,
            stall: 4.0,
            latency: 80.0,
        });
        blame.push(InstrBlame {
            cause_pc: 0x0,
            effect_pc: 0x20,
            function: 0,
            block: 0,
            distance: Some(1),
            kind: StallKind::MemDepGlobal,
            stall: 1.0,
            latency: 20.0,
        });
        blame.push(InstrBlame {
            cause_pc: 0x8,
            effect_pc: 0x8,
            function: 0,
            block: 0,
            distance: None,
            kind: StallKind::PipeBusy,
            stall: 3.0,
            latency: 0.0,
        });
        blame.finalize();
        blame
    }

    #[test]
    fn test_kinds_skip_zero_entries() {
        let report = assemble("k", &sample_blame(), &[], 10);
        assert_eq!(report.kinds.len(), 2);
        let mem = report
            .kinds
            .iter()
            .find(|s| s.kind == StallKind::MemDepGlobal)
            .unwrap();
        assert_eq!(mem.latency, 100.0);
        assert_eq!(mem.stall, 5.0);
    }

    #[test]
    fn test_metrics_merge_per_cause() {
        let report = assemble("k", &sample_blame(), &[], 10);
        // Two MemDepGlobal records share cause 0x0 and merge into one row.
        assert_eq!(report.metrics.len(), 2);
        assert_eq!(report.metrics[0].pc, 0x0);
        assert_eq!(report.metrics[0].latency, 100.0);
    }

    #[test]
    fn test_metrics_truncate() {
        let report = assemble("k", &sample_blame(), &[], 1);
        assert_eq!(report.metrics.len(), 1);
    }

    #[test]
    fn test_json_output() {
        let report = assemble("vec_add", &sample_blame(), &[], 10);
        let json = report.to_json().unwrap();
        assert!(json.contains("vec_add"));
        assert!(json.contains("MemDepGlobal"));
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(parsed.get("kinds").is_some());
        assert!(parsed.get("advice").is_some());
    }
}
