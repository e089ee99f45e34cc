//! Batch partitioning and per-group processing.
//!
//! A batch is a run of consecutive footprint groups. Every group is
//! processed independently and a batch's output is the concatenation of
//! its groups' outputs in group order, so the final output does not depend
//! on the batch size or on how work is scheduled across threads.

use pre_event_inventory_models::{
    Footprint, GeometryStatus, InventoryRecord, Parcel, PipelineConfig,
};
use pre_event_regularize::{RegularizeOutcome, regularize_geographic};
use pre_event_resolve::{FootprintGroup, KeyIndex, Resolution, ResolvedPair, Resolver, join_group};
use rayon::prelude::*;

use crate::report::Tally;

/// Consecutive groups processed and merged as one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub index: usize,
    pub groups: Vec<FootprintGroup>,
}

impl Batch {
    /// Footprint rows covered by this batch.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.groups.iter().map(|g| g.rows.len()).sum()
    }
}

/// Splits groups into batches of at most `batch_size` groups, preserving
/// order. A footprint id never spans two batches.
#[must_use]
pub fn partition(groups: Vec<FootprintGroup>, batch_size: usize) -> Vec<Batch> {
    let size = batch_size.max(1);
    let mut batches = Vec::with_capacity(groups.len().div_ceil(size));
    let mut iter = groups.into_iter().peekable();

    while iter.peek().is_some() {
        batches.push(Batch {
            index: batches.len(),
            groups: iter.by_ref().take(size).collect(),
        });
    }

    batches
}

/// Records and counters produced by one batch.
#[derive(Debug, Default)]
pub struct BatchOutput {
    pub records: Vec<InventoryRecord>,
    pub tally: Tally,
}

/// Shared, read-only inputs for processing groups.
#[derive(Clone, Copy)]
pub struct BatchContext<'a> {
    pub config: &'a PipelineConfig,
    pub footprints: &'a [Footprint],
    pub parcels: &'a [Parcel],
    pub index: &'a KeyIndex,
    pub resolver: Resolver<'a>,
}

impl BatchContext<'_> {
    /// Processes every group of `batch` in parallel on the current rayon
    /// pool and concatenates the results in group order.
    #[must_use]
    pub fn process(&self, batch: &Batch) -> BatchOutput {
        let outputs: Vec<BatchOutput> = batch
            .groups
            .par_iter()
            .map(|group| self.process_group(group))
            .collect();

        let mut merged = BatchOutput::default();
        for output in outputs {
            merged.records.extend(output.records);
            merged.tally.merge(output.tally);
        }
        merged
    }

    /// Joins, resolves, and regularizes one footprint id.
    #[must_use]
    pub fn process_group(&self, group: &FootprintGroup) -> BatchOutput {
        let mut tally = Tally {
            input_rows: group.rows.len() as u64,
            duplicate_rows_merged: group.rows.len().saturating_sub(1) as u64,
            ..Tally::default()
        };

        let candidates = join_group(group, self.footprints, self.index);
        tally.candidate_pairs = candidates.pairs.len() as u64;

        let kept: Vec<ResolvedPair> = if self.config.enable_deduplication {
            match self.resolver.resolve(&candidates) {
                Resolution::Resolved(pair) => {
                    tally.duplicates_removed = (pair.candidate_count - 1) as u64;
                    vec![pair]
                }
                Resolution::DroppedNoCandidate => {
                    tally.unmatched_dropped = 1;
                    Vec::new()
                }
                Resolution::DroppedInvalidGeometry => {
                    tally.invalid_dropped = 1;
                    Vec::new()
                }
            }
        } else {
            if candidates.pairs.is_empty() {
                tally.unmatched_dropped = 1;
            }
            Resolver::passthrough(&candidates)
        };

        // One regularization per footprint row, even when several pairs
        // share it.
        let mut outcomes: Vec<(usize, RegularizeOutcome)> = Vec::new();
        let mut records = Vec::with_capacity(kept.len());

        for resolved in kept {
            let row = resolved.pair.footprint;
            let footprint = &self.footprints[row];
            let parcel = &self.parcels[resolved.pair.parcel];

            let (geometry, geometry_status) = if self.config.enable_regularization {
                let slot = if let Some(slot) = outcomes.iter().position(|(r, _)| *r == row) {
                    slot
                } else {
                    let outcome =
                        regularize_geographic(&footprint.geometry, &self.config.regularization);
                    if let Some(reason) = outcome.reason {
                        log::debug!(
                            "Footprint {} kept its original geometry ({reason})",
                            footprint.footprint_id
                        );
                    }
                    outcomes.push((row, outcome));
                    outcomes.len() - 1
                };
                let outcome = &outcomes[slot].1;
                tally.record_outcome(outcome);
                (outcome.polygon.clone(), outcome.status())
            } else {
                (footprint.geometry.clone(), GeometryStatus::Untouched)
            };

            records.push(InventoryRecord {
                footprint_id: footprint.footprint_id.clone(),
                parcel_key: parcel.parcel_key.clone(),
                geometry,
                attributes: footprint.attributes.clone(),
                parcel_geometry: parcel.geometry.clone(),
                parcel_attributes: parcel.attributes.clone(),
                candidate_count: resolved.candidate_count,
                overlap_area: resolved.overlap_area,
                geometry_status,
            });
        }

        tally.output_count = records.len() as u64;
        BatchOutput { records, tally }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn groups(n: usize) -> Vec<FootprintGroup> {
        (0..n).map(|i| FootprintGroup { rows: vec![i] }).collect()
    }

    #[test]
    fn partition_keeps_order_and_sizes() {
        let batches = partition(groups(7), 3);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].groups.len(), 3);
        assert_eq!(batches[2].groups.len(), 1);
        assert_eq!(batches[2].index, 2);
        assert_eq!(batches[2].groups[0].rows, vec![6]);
    }

    #[test]
    fn partition_edge_sizes() {
        assert!(partition(Vec::new(), 10).is_empty());
        assert_eq!(partition(groups(4), 1).len(), 4);
        assert_eq!(partition(groups(4), 100).len(), 1);
        assert_eq!(partition(groups(4), 0).len(), 4);
    }

    #[test]
    fn row_count_includes_duplicate_rows() {
        let batch = Batch {
            index: 0,
            groups: vec![
                FootprintGroup { rows: vec![0, 3] },
                FootprintGroup { rows: vec![1] },
            ],
        };
        assert_eq!(batch.row_count(), 3);
    }
}
