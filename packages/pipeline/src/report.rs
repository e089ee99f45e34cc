//! Per-batch counters and the run-wide accumulator.

use std::collections::BTreeMap;
use std::time::Duration;

use pre_event_inventory_models::{FallbackReason, ProcessingReport, RegularizationSummary};
use pre_event_regularize::RegularizeOutcome;

/// Steps per unit in [`Distribution`]. Values are kept to 0.001.
const SCALE: f64 = 1000.0;

/// Streaming summary of a non-negative sample.
///
/// Values are quantized to `1 / SCALE` and counted per step, so memory is
/// bounded by the number of distinct steps seen rather than the sample
/// size. Merging is exact integer arithmetic: the result does not depend
/// on how samples were split across groups and batches.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Distribution {
    count: u64,
    sum: u64,
    max: u64,
    steps: BTreeMap<u64, u64>,
}

impl Distribution {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn push(&mut self, value: f64) {
        let step = (value.max(0.0) * SCALE).round() as u64;
        self.count += 1;
        self.sum += step;
        self.max = self.max.max(step);
        *self.steps.entry(step).or_insert(0) += 1;
    }

    pub fn merge(&mut self, other: Self) {
        self.count += other.count;
        self.sum += other.sum;
        self.max = self.max.max(other.max);
        for (step, n) in other.steps {
            *self.steps.entry(step).or_insert(0) += n;
        }
    }

    #[must_use]
    pub const fn count(&self) -> u64 {
        self.count
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum as f64 / self.count as f64 / SCALE
        }
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn max(&self) -> f64 {
        self.max as f64 / SCALE
    }

    /// Step at zero-based `rank` in sorted order.
    fn nth(&self, rank: u64) -> u64 {
        let mut seen = 0;
        for (&step, &n) in &self.steps {
            seen += n;
            if rank < seen {
                return step;
            }
        }
        self.max
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn median(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let mid = self.count / 2;
        let median = if self.count % 2 == 0 {
            f64::midpoint(self.nth(mid - 1) as f64, self.nth(mid) as f64)
        } else {
            self.nth(mid) as f64
        };
        median / SCALE
    }
}

/// Counters for one unit of work, merged upward group to batch to run.
///
/// Regularization statistics are only filled through
/// [`Tally::record_outcome`].
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Tally {
    pub input_rows: u64,
    pub candidate_pairs: u64,
    pub output_count: u64,
    pub duplicates_removed: u64,
    pub unmatched_dropped: u64,
    pub invalid_dropped: u64,
    pub duplicate_rows_merged: u64,
    pub vertices_removed_total: u64,
    pub fallback_count: u64,
    pub reprojection_failures: u64,
    pub(crate) area_change_pct: Distribution,
    pub(crate) vertex_reduction: Distribution,
    pub(crate) orthogonality_before: Distribution,
    pub(crate) orthogonality_after: Distribution,
}

impl Tally {
    /// Counts one regularization attempt for an emitted record.
    #[allow(clippy::cast_precision_loss)]
    pub fn record_outcome(&mut self, outcome: &RegularizeOutcome) {
        if outcome.fell_back {
            self.fallback_count += 1;
            if outcome.reason == Some(FallbackReason::Reprojection) {
                self.reprojection_failures += 1;
            }
            return;
        }

        self.vertices_removed_total += outcome.vertices_removed as u64;
        self.vertex_reduction.push(outcome.vertices_removed as f64);
        if let Some(shape) = &outcome.shape {
            self.area_change_pct.push(shape.area_change_pct.abs());
            self.orthogonality_before.push(shape.orthogonality_before_pct);
            self.orthogonality_after.push(shape.orthogonality_after_pct);
        }
    }

    /// Adds `other` into `self`.
    pub fn merge(&mut self, other: Self) {
        self.input_rows += other.input_rows;
        self.candidate_pairs += other.candidate_pairs;
        self.output_count += other.output_count;
        self.duplicates_removed += other.duplicates_removed;
        self.unmatched_dropped += other.unmatched_dropped;
        self.invalid_dropped += other.invalid_dropped;
        self.duplicate_rows_merged += other.duplicate_rows_merged;
        self.vertices_removed_total += other.vertices_removed_total;
        self.fallback_count += other.fallback_count;
        self.reprojection_failures += other.reprojection_failures;
        self.area_change_pct.merge(other.area_change_pct);
        self.vertex_reduction.merge(other.vertex_reduction);
        self.orthogonality_before.merge(other.orthogonality_before);
        self.orthogonality_after.merge(other.orthogonality_after);
    }

    /// Accepted regularizations counted so far.
    #[must_use]
    pub const fn regularized_count(&self) -> u64 {
        self.vertex_reduction.count()
    }
}

/// Run-wide totals, fed one completed batch at a time.
#[derive(Debug, Default)]
pub struct ReportAccumulator {
    tally: Tally,
    batches: u64,
}

impl ReportAccumulator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds in a completed batch.
    pub fn merge_batch(&mut self, tally: Tally) {
        self.tally.merge(tally);
        self.batches += 1;
    }

    #[must_use]
    pub const fn tally(&self) -> &Tally {
        &self.tally
    }

    #[must_use]
    pub const fn batches(&self) -> u64 {
        self.batches
    }

    /// Produces the final report.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn finish(self, elapsed: Duration) -> ProcessingReport {
        let t = self.tally;
        let elapsed_seconds = elapsed.as_secs_f64();
        let features_per_second = if elapsed_seconds > 0.0 {
            t.input_rows as f64 / elapsed_seconds
        } else {
            0.0
        };

        let regularization = RegularizationSummary {
            regularized_count: t.vertex_reduction.count(),
            area_change_pct_mean: t.area_change_pct.mean(),
            area_change_pct_median: t.area_change_pct.median(),
            area_change_pct_max: t.area_change_pct.max(),
            vertex_reduction_mean: t.vertex_reduction.mean(),
            vertex_reduction_median: t.vertex_reduction.median(),
            orthogonality_before_pct: t.orthogonality_before.mean(),
            orthogonality_after_pct: t.orthogonality_after.mean(),
        };

        ProcessingReport {
            input_count: t.input_rows,
            candidate_pairs: t.candidate_pairs,
            output_count: t.output_count,
            duplicates_removed: t.duplicates_removed,
            unmatched_dropped: t.unmatched_dropped,
            invalid_dropped: t.invalid_dropped,
            duplicate_rows_merged: t.duplicate_rows_merged,
            vertices_removed_total: t.vertices_removed_total,
            fallback_count: t.fallback_count,
            reprojection_failures: t.reprojection_failures,
            batches: self.batches,
            elapsed_seconds,
            features_per_second,
            regularization,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;
    use pre_event_regularize::ShapeChange;

    fn accepted(removed: usize, area_change: f64) -> RegularizeOutcome {
        RegularizeOutcome {
            polygon: polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0)],
            fell_back: false,
            vertices_removed: removed,
            reason: None,
            shape: Some(ShapeChange {
                area_change_pct: area_change,
                orthogonality_before_pct: 50.0,
                orthogonality_after_pct: 100.0,
            }),
        }
    }

    fn fallback(reason: FallbackReason) -> RegularizeOutcome {
        RegularizeOutcome {
            polygon: polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0)],
            fell_back: true,
            vertices_removed: 0,
            reason: Some(reason),
            shape: None,
        }
    }

    #[test]
    fn outcomes_feed_counters_and_statistics() {
        let mut batch = Tally::default();
        batch.record_outcome(&accepted(2, -1.0));
        batch.record_outcome(&accepted(6, 3.0));
        batch.record_outcome(&fallback(FallbackReason::LowIou));

        let mut other = Tally::default();
        other.record_outcome(&accepted(4, 2.0));
        other.record_outcome(&fallback(FallbackReason::Reprojection));

        let mut acc = ReportAccumulator::new();
        acc.merge_batch(batch);
        acc.merge_batch(other);
        assert_eq!(acc.tally().regularized_count(), 3);

        let report = acc.finish(Duration::from_secs(2));
        assert_eq!(report.batches, 2);
        assert_eq!(report.vertices_removed_total, 12);
        assert_eq!(report.fallback_count, 2);
        assert_eq!(report.reprojection_failures, 1);

        let summary = &report.regularization;
        assert_eq!(summary.regularized_count, 3);
        assert!((summary.area_change_pct_mean - 2.0).abs() < 1e-12);
        assert!((summary.area_change_pct_median - 2.0).abs() < 1e-12);
        assert!((summary.area_change_pct_max - 3.0).abs() < 1e-12);
        assert!((summary.vertex_reduction_median - 4.0).abs() < 1e-12);
        assert!((summary.orthogonality_after_pct - 100.0).abs() < 1e-12);
    }

    #[test]
    fn rate_uses_input_rows() {
        let mut acc = ReportAccumulator::new();
        acc.merge_batch(Tally {
            input_rows: 500,
            ..Tally::default()
        });
        let report = acc.finish(Duration::from_millis(250));
        assert!((report.features_per_second - 2000.0).abs() < 1e-9);

        let empty = ReportAccumulator::new().finish(Duration::ZERO);
        assert!(empty.features_per_second.abs() < f64::EPSILON);
    }

    fn distribution(values: &[f64]) -> Distribution {
        let mut d = Distribution::default();
        for &v in values {
            d.push(v);
        }
        d
    }

    #[test]
    fn median_of_even_count_is_midpoint() {
        assert!((distribution(&[4.0, 1.0, 3.0, 2.0]).median() - 2.5).abs() < 1e-12);
        assert!((distribution(&[5.0, 1.0, 5.0]).median() - 5.0).abs() < 1e-12);
        assert!(Distribution::default().median().abs() < f64::EPSILON);
    }

    #[test]
    fn distribution_keeps_one_entry_per_distinct_value() {
        let mut d = Distribution::default();
        for i in 0..100_000 {
            d.push(f64::from(i % 4));
        }
        assert_eq!(d.count(), 100_000);
        assert_eq!(d.steps.len(), 4);
        assert!((d.mean() - 1.5).abs() < 1e-12);
        assert!((d.max() - 3.0).abs() < 1e-12);
        assert!((d.median() - 1.5).abs() < 1e-12);
    }

    #[test]
    fn merged_distributions_do_not_depend_on_split() {
        let values = [0.125, 2.5, 0.3337, 7.0, 1.0, 0.999_9, 4.2];

        let whole = distribution(&values);
        for split in 1..values.len() {
            let mut left = distribution(&values[..split]);
            left.merge(distribution(&values[split..]));
            assert_eq!(left, whole, "split at {split}");
        }
    }
}
