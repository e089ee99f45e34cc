//! Processing report emitted at the end of a run.

use serde::{Deserialize, Serialize};

/// Aggregate counters for one pipeline run.
///
/// With deduplication enabled:
/// - `input_count - duplicate_rows_merged - unmatched_dropped - invalid_dropped == output_count`
/// - `candidate_pairs - output_count == duplicates_removed` when no group
///   was dropped for invalid geometry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessingReport {
    /// Footprint rows supplied by the loader.
    pub input_count: u64,
    /// (footprint, parcel) pairs produced by the key join.
    pub candidate_pairs: u64,
    /// Records emitted.
    pub output_count: u64,
    /// Candidate pairs discarded from groups that resolved to one pair.
    pub duplicates_removed: u64,
    /// Footprint ids whose parcel key matched nothing.
    pub unmatched_dropped: u64,
    /// Footprint ids where no candidate had a usable geometry.
    pub invalid_dropped: u64,
    /// Input rows beyond the first sharing a footprint id.
    pub duplicate_rows_merged: u64,
    /// Vertices removed by regularization across all records.
    pub vertices_removed_total: u64,
    /// Records that kept their original geometry after a failed
    /// regularization attempt.
    pub fallback_count: u64,
    /// Subset of `fallback_count` caused by reprojection failures.
    pub reprojection_failures: u64,
    /// Number of batches processed.
    pub batches: u64,
    /// Wall-clock run time.
    pub elapsed_seconds: f64,
    /// Input footprints per second of wall-clock time.
    pub features_per_second: f64,
    /// Shape statistics over regularized records.
    pub regularization: RegularizationSummary,
}

impl ProcessingReport {
    /// Percentage of `part` in `whole`, zero when `whole` is zero.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn pct(part: u64, whole: u64) -> f64 {
        if whole == 0 {
            0.0
        } else {
            part as f64 / whole as f64 * 100.0
        }
    }

    /// Deduplicated share of all candidate pairs, in percent.
    #[must_use]
    pub fn duplicate_pct(&self) -> f64 {
        Self::pct(self.duplicates_removed, self.candidate_pairs)
    }

    /// Unmatched share of input rows, in percent.
    #[must_use]
    pub fn unmatched_pct(&self) -> f64 {
        Self::pct(self.unmatched_dropped, self.input_count)
    }

    /// Fallback share of emitted records, in percent.
    #[must_use]
    pub fn fallback_pct(&self) -> f64 {
        Self::pct(self.fallback_count, self.output_count)
    }
}

/// Area, vertex, and orthogonality statistics over the records whose
/// regularized geometry was accepted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegularizationSummary {
    pub regularized_count: u64,
    pub area_change_pct_mean: f64,
    pub area_change_pct_median: f64,
    pub area_change_pct_max: f64,
    pub vertex_reduction_mean: f64,
    pub vertex_reduction_median: f64,
    /// Mean share of edges within 2 degrees of 0/45/90/135, before.
    pub orthogonality_before_pct: f64,
    /// Same, after regularization.
    pub orthogonality_after_pct: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pct_handles_zero_denominator() {
        assert!(ProcessingReport::pct(3, 0).abs() < f64::EPSILON);
        assert!((ProcessingReport::pct(1, 4) - 25.0).abs() < 1e-12);
    }
}
