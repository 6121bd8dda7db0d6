//! Error types for culpa analyses

use thiserror::Error;

/// Result type alias for culpa operations
pub type Result<T> = std::result::Result<T, CulpaError>;

/// Errors that can occur while analyzing one kernel-invocation unit
///
/// Errors are always local to one unit: the caller skips the failed unit and
/// keeps processing the rest of the batch.
#[derive(Debug, Error)]
pub enum CulpaError {
    /// A sampled counter name has no assigned metric for this process/thread.
    /// Non-fatal; the caller skips the unit entirely.
    #[error("no metric assigned for counter `{name}`")]
    MissingMetric {
        /// The counter name that could not be resolved
        name: String,
    },

    /// A dependency edge references an address absent from the property
    /// index. This indicates an inconsistent static CFG versus profile and
    /// aborts the current unit's analysis.
    #[error("address {pc:#x} is not mapped in the property index")]
    UnmappedAddress {
        /// The unmapped instruction address
        pc: u64,
    },

    /// The decoded control-flow graph violates a structural invariant
    /// (unsorted instructions, overlapping block ranges, dangling edges).
    #[error("malformed control-flow graph: {reason}")]
    MalformedCfg {
        /// Which invariant was violated
        reason: String,
    },

    /// JSON serialization error while assembling an inspection report
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
