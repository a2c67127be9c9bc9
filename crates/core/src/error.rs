//! Error types shared by the nesting crates.

use thiserror::Error;

/// Errors produced by ingestion, NFP generation and the solver layer.
///
/// A part that simply does not fit on any sheet is not an error; it is
/// reported through [`crate::result::SolveResult::unplaced`] instead.
#[derive(Debug, Error)]
pub enum Error {
    /// Input geometry is unusable: fewer than three vertices, near-zero
    /// area, or every outline of a part degenerate after cleanup.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    /// Sheet template or container polygon is unusable.
    #[error("invalid sheet: {0}")]
    InvalidSheet(String),

    /// Configuration rejected before the solve starts.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// No-fit polygon generation failed for a specific pair. Callers log
    /// this and skip the candidate rather than aborting the whole solve.
    #[error(
        "nfp generation failed for pair ({a_id}, {b_id}) at rotations ({a_rotation}, {b_rotation}): {reason}"
    )]
    NfpFailure {
        /// Outline id of the stationary polygon.
        a_id: u64,
        /// Outline id of the orbiting polygon.
        b_id: u64,
        /// Rotation of the stationary polygon in degrees.
        a_rotation: f64,
        /// Rotation of the orbiting polygon in degrees.
        b_rotation: f64,
        /// What went wrong.
        reason: String,
    },

    /// Broken internal invariant, e.g. a poisoned cache lock.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience alias used across the workspace.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nfp_failure_display() {
        let err = Error::NfpFailure {
            a_id: 3,
            b_id: 7,
            a_rotation: 0.0,
            b_rotation: 90.0,
            reason: "degenerate sum".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("(3, 7)"));
        assert!(msg.contains("90"));
        assert!(msg.contains("degenerate sum"));
    }

    #[test]
    fn test_invalid_config_display() {
        let err = Error::InvalidConfig("population_size must be at least 2".into());
        assert!(err.to_string().starts_with("invalid configuration"));
    }
}
