#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Batch orchestration for the pre-event building inventory.
//!
//! An [`Orchestrator`] takes the loaded footprint and parcel collections
//! for one region and produces the deduplicated, regularized inventory plus
//! a [`ProcessingReport`]. Footprints are grouped by id, the groups are cut
//! into fixed-size batches, and each batch is processed in parallel on a
//! dedicated `rayon` pool. Batches are merged one at a time in batch order,
//! which makes the output identical for every batch size and thread count.
//!
//! A batch either merges completely or not at all: a panic inside a batch
//! fails the run with [`PipelineError::BatchFailed`], and cancellation is
//! only observed between batches.

pub mod batch;
pub mod config;
pub mod progress;
pub mod report;

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use pre_event_inventory_models::{
    Footprint, GeometryStatus, InventoryRecord, Parcel, PipelineConfig, ProcessingReport,
};
use pre_event_regularize::regularize_geographic;
use pre_event_resolve::{KeyIndex, Resolver, group_footprints};
use pre_event_spatial::{ParcelCache, PreparedParcel};
use rayon::prelude::*;

pub use config::ConfigError;
pub use progress::{NullProgress, ProgressCallback, null_progress};

use crate::batch::{BatchContext, BatchOutput};
use crate::report::{ReportAccumulator, Tally};

/// Errors that abort a whole run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The worker pool could not be created.
    #[error("Failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// A batch panicked. None of its records were emitted.
    #[error("Batch {batch} failed: {message}")]
    BatchFailed { batch: usize, message: String },

    /// The run was cancelled between batches.
    #[error("Run cancelled after {completed_batches} of {total_batches} batches")]
    Cancelled {
        completed_batches: usize,
        total_batches: usize,
    },
}

/// Output of a full run.
#[derive(Debug)]
pub struct PipelineOutput {
    /// One record per surviving footprint id (or per candidate pair with
    /// deduplication disabled), in order of first appearance.
    pub records: Vec<InventoryRecord>,
    pub report: ProcessingReport,
}

/// A footprint after the regularize-only stage.
#[derive(Debug, Clone, PartialEq)]
pub struct RegularizedFootprint {
    pub footprint: Footprint,
    pub status: GeometryStatus,
}

/// Output of [`Orchestrator::regularize_collection`].
#[derive(Debug)]
pub struct RegularizeOutput {
    pub footprints: Vec<RegularizedFootprint>,
    pub report: ProcessingReport,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Drives pipeline runs.
///
/// Owns the worker pool and the run-scoped [`ParcelCache`], which is
/// cleared and rebuilt at the start of every run.
pub struct Orchestrator {
    config: PipelineConfig,
    pool: rayon::ThreadPool,
    cache: ParcelCache,
    cancel: Arc<AtomicBool>,
    progress: Arc<dyn ProgressCallback>,
}

impl Orchestrator {
    /// Validates `config` and builds the worker pool.
    ///
    /// # Errors
    ///
    /// * If the configuration is invalid
    /// * If the thread pool cannot be created
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        config::validate(&config)?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.num_threads)
            .thread_name(|i| format!("pre-event-worker-{i}"))
            .build()?;

        Ok(Self {
            config,
            pool,
            cache: ParcelCache::new(),
            cancel: Arc::new(AtomicBool::new(false)),
            progress: null_progress(),
        })
    }

    /// Reports progress through `progress` instead of discarding it.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Flag that, once set, stops the current run before its next batch.
    /// It stays set, failing later runs too, until [`Self::reset_cancel`].
    #[must_use]
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn reset_cancel(&self) {
        self.cancel.store(false, Ordering::Relaxed);
    }

    fn prepare_cache(&mut self, parcels: &[Parcel]) {
        self.cache.clear();
        let prepared: Vec<PreparedParcel> = self.pool.install(|| {
            parcels
                .par_iter()
                .map(|p| PreparedParcel::new(&p.geometry))
                .collect()
        });
        self.cache.prepare(prepared);
    }

    fn check_cancelled(&self, completed: usize, total: usize) -> Result<(), PipelineError> {
        if self.cancel.load(Ordering::Relaxed) {
            log::warn!("Run cancelled after {completed}/{total} batches");
            return Err(PipelineError::Cancelled {
                completed_batches: completed,
                total_batches: total,
            });
        }
        Ok(())
    }

    /// Runs `work` on the worker pool as batch `index`.
    ///
    /// A panic anywhere inside `work` becomes
    /// [`PipelineError::BatchFailed`] and nothing it produced is kept.
    fn execute_batch<R, F>(&self, index: usize, work: F) -> Result<R, PipelineError>
    where
        R: Send,
        F: FnOnce() -> R + Send,
    {
        panic::catch_unwind(AssertUnwindSafe(|| self.pool.install(work))).map_err(|payload| {
            let message = panic_message(payload.as_ref());
            log::error!("Batch {index} failed: {message}");
            PipelineError::BatchFailed {
                batch: index,
                message,
            }
        })
    }

    /// Processes `batches` in order, merging each completed batch before
    /// starting the next. Stops at the first failed batch or when the
    /// cancel flag is raised, discarding everything merged so far.
    fn run_batches<B, F>(
        &self,
        batches: &[B],
        work: F,
    ) -> Result<(Vec<InventoryRecord>, ReportAccumulator), PipelineError>
    where
        B: Sync,
        F: Fn(&B) -> BatchOutput + Sync,
    {
        let total = batches.len();
        let mut records = Vec::new();
        let mut acc = ReportAccumulator::new();

        for (index, batch) in batches.iter().enumerate() {
            self.check_cancelled(index, total)?;

            let output = self.execute_batch(index, || work(batch))?;

            log::debug!(
                "Batch {}/{total}: {} rows in, {} records out",
                index + 1,
                output.tally.input_rows,
                output.records.len()
            );
            self.progress.inc(output.tally.input_rows);
            records.extend(output.records);
            acc.merge_batch(output.tally);
        }

        Ok((records, acc))
    }

    /// Runs join, deduplication, and regularization over one region.
    ///
    /// # Errors
    ///
    /// * [`PipelineError::BatchFailed`] if processing a batch panics
    /// * [`PipelineError::Cancelled`] if the cancel flag is raised
    pub fn run(
        &mut self,
        footprints: &[Footprint],
        parcels: &[Parcel],
    ) -> Result<PipelineOutput, PipelineError> {
        let start = Instant::now();

        self.prepare_cache(parcels);
        let index = KeyIndex::build(parcels);
        let groups = group_footprints(footprints);
        let batches = batch::partition(groups, self.config.batch_size);
        let total = batches.len();

        log::info!(
            "Processing {} footprints ({} parcels, {} keys) in {total} batches on {} threads",
            footprints.len(),
            parcels.len(),
            index.len(),
            self.pool.current_num_threads()
        );

        let ctx = BatchContext {
            config: &self.config,
            footprints,
            parcels,
            index: &index,
            resolver: Resolver::new(footprints, parcels, &self.cache),
        };

        self.progress.set_total(footprints.len() as u64);
        self.progress.set_message("Resolving footprints".to_string());

        let (records, acc) = self.run_batches(&batches, |batch| ctx.process(batch))?;

        let report = acc.finish(start.elapsed());
        log_summary(&report, &self.config);
        self.progress.finish(format!(
            "{} records from {} footprints",
            report.output_count, report.input_count
        ));

        Ok(PipelineOutput { records, report })
    }

    /// Regularizes every footprint without joining to parcels.
    ///
    /// Footprints are returned in input order, one per input row.
    ///
    /// # Errors
    ///
    /// * [`PipelineError::BatchFailed`] if processing a batch panics
    /// * [`PipelineError::Cancelled`] if the cancel flag is raised
    pub fn regularize_collection(
        &self,
        footprints: &[Footprint],
    ) -> Result<RegularizeOutput, PipelineError> {
        let start = Instant::now();

        let size = self.config.batch_size.max(1);
        let total = footprints.len().div_ceil(size);
        let reg = &self.config.regularization;

        log::info!(
            "Regularizing {} footprints in {total} batches on {} threads",
            footprints.len(),
            self.pool.current_num_threads()
        );
        self.progress.set_total(footprints.len() as u64);
        self.progress.set_message("Regularizing footprints".to_string());

        let mut out = Vec::with_capacity(footprints.len());
        let mut acc = ReportAccumulator::new();

        for (i, chunk) in footprints.chunks(size).enumerate() {
            self.check_cancelled(i, total)?;

            let results: Vec<(RegularizedFootprint, Tally)> = self.execute_batch(i, || {
                chunk
                    .par_iter()
                    .map(|footprint| {
                        let outcome = regularize_geographic(&footprint.geometry, reg);
                        let mut tally = Tally {
                            input_rows: 1,
                            output_count: 1,
                            ..Tally::default()
                        };
                        tally.record_outcome(&outcome);
                        let status = outcome.status();
                        let regularized = RegularizedFootprint {
                            footprint: Footprint {
                                geometry: outcome.polygon,
                                ..footprint.clone()
                            },
                            status,
                        };
                        (regularized, tally)
                    })
                    .collect()
            })?;

            let mut tally = Tally::default();
            for (footprint, t) in results {
                out.push(footprint);
                tally.merge(t);
            }
            acc.merge_batch(tally);
            self.progress.inc(chunk.len() as u64);
        }

        let report = acc.finish(start.elapsed());
        log::info!(
            "Regularized {} of {} footprints ({} fell back, {:.2}%) at {:.0} footprints/s",
            report.regularization.regularized_count,
            report.input_count,
            report.fallback_count,
            report.fallback_pct(),
            report.features_per_second
        );
        self.progress.finish(format!("{} footprints regularized", report.input_count));

        Ok(RegularizeOutput {
            footprints: out,
            report,
        })
    }
}

fn log_summary(report: &ProcessingReport, config: &PipelineConfig) {
    if report.unmatched_dropped > 0 {
        log::warn!(
            "Skipped {} footprints without parcel matches ({:.2}%)",
            report.unmatched_dropped,
            report.unmatched_pct()
        );
    }
    if report.invalid_dropped > 0 {
        log::warn!(
            "Dropped {} footprints with no usable candidate geometry",
            report.invalid_dropped
        );
    }
    if report.duplicate_rows_merged > 0 {
        log::info!(
            "Merged {} repeated footprint rows into their first occurrence",
            report.duplicate_rows_merged
        );
    }
    if config.enable_deduplication {
        log::info!(
            "Removed {} duplicate footprint-parcel pairs ({:.2}%)",
            report.duplicates_removed,
            report.duplicate_pct()
        );
    }
    if config.enable_regularization {
        log::info!(
            "Removed {} vertices; {} footprints kept original geometry ({:.2}%, {} reprojection failures)",
            report.vertices_removed_total,
            report.fallback_count,
            report.fallback_pct(),
            report.reprojection_failures
        );
    }
    log::info!(
        "Emitted {} records from {} footprints in {:.2}s ({:.0} footprints/s)",
        report.output_count,
        report.input_count,
        report.elapsed_seconds,
        report.features_per_second
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    use geo::{LineString, MultiPolygon, Polygon};
    use pre_event_inventory_models::{
        AttributeValue, Attributes, FOOTPRINT_SCHEMA, FallbackReason, PARCEL_SCHEMA,
    };

    const LON0: f64 = -87.63;
    const LAT0: f64 = 41.88;

    /// Local metres to longitude/latitude near Chicago.
    fn lon_lat(x: f64, y: f64) -> (f64, f64) {
        (
            LON0 + x / (111_320.0 * LAT0.to_radians().cos()),
            LAT0 + y / 110_574.0,
        )
    }

    fn polygon(points: &[(f64, f64)]) -> Polygon<f64> {
        let coords: Vec<(f64, f64)> = points.iter().map(|&(x, y)| lon_lat(x, y)).collect();
        Polygon::new(LineString::from(coords), vec![])
    }

    fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Polygon<f64> {
        polygon(&[(x0, y0), (x1, y0), (x1, y1), (x0, y1)])
    }

    /// A 20 m by 10 m building with jittered vertices, lower-left at (x, y).
    fn noisy_building(x: f64, y: f64) -> Polygon<f64> {
        let offsets = [
            (0.1, -0.1),
            (5.0, 0.12),
            (10.0, -0.08),
            (15.0, 0.1),
            (20.1, 0.05),
            (19.9, 5.0),
            (20.05, 10.1),
            (10.0, 9.9),
            (0.0, 10.05),
            (-0.1, 5.1),
        ];
        let points: Vec<(f64, f64)> = offsets.iter().map(|(dx, dy)| (x + dx, y + dy)).collect();
        polygon(&points)
    }

    fn footprint(id: &str, key: &str, geometry: Polygon<f64>) -> Footprint {
        Footprint {
            footprint_id: id.to_string(),
            parcel_key: key.to_string(),
            geometry,
            attributes: Attributes::empty(&FOOTPRINT_SCHEMA),
        }
    }

    fn parcel(key: &str, geometry: Polygon<f64>) -> Parcel {
        Parcel {
            parcel_key: key.to_string(),
            geometry: MultiPolygon(vec![geometry]),
            attributes: Attributes::empty(&PARCEL_SCHEMA),
        }
    }

    fn config(batch_size: usize, num_threads: usize) -> PipelineConfig {
        PipelineConfig {
            batch_size,
            num_threads,
            ..PipelineConfig::default()
        }
    }

    /// A block of buildings exercising every resolution path:
    /// - every 4th building straddles two parcels sharing its key (30/70)
    /// - every 6th building has two identical candidate parcels (tie)
    /// - every 9th building has a key that matches nothing
    /// - building 5 appears twice in the input
    fn neighbourhood(n: usize) -> (Vec<Footprint>, Vec<Parcel>) {
        let mut footprints = Vec::new();
        let mut parcels = Vec::new();

        for i in 0..n {
            #[allow(clippy::cast_precision_loss)]
            let (x, y) = ((i % 10) as f64 * 50.0, (i / 10) as f64 * 50.0);
            let id = format!("s{i}");
            let key = format!("p{i}");

            if i % 9 == 8 {
                footprints.push(footprint(&id, "unknown", noisy_building(x, y)));
                continue;
            }
            footprints.push(footprint(&id, &key, noisy_building(x, y)));

            if i % 4 == 0 {
                // 30% of the 20 m width on the first parcel, 70% on the second.
                parcels.push(parcel(&key, rect(x - 10.0, y - 10.0, x + 6.0, y + 30.0)));
                parcels.push(parcel(&key, rect(x + 6.0, y - 10.0, x + 40.0, y + 30.0)));
            } else if i % 6 == 0 {
                // Same geometry, told apart by lot number.
                for lot in [1, 2] {
                    let mut tied = parcel(&key, rect(x - 10.0, y - 10.0, x + 40.0, y + 30.0));
                    tied.attributes
                        .declared
                        .insert("trampoline_ct".to_string(), AttributeValue::Integer(lot));
                    parcels.push(tied);
                }
            } else {
                parcels.push(parcel(&key, rect(x - 10.0, y - 10.0, x + 40.0, y + 30.0)));
            }
        }

        footprints.push(footprint("s5", "p5", noisy_building(250.0, 0.0)));
        (footprints, parcels)
    }

    fn run(
        footprints: &[Footprint],
        parcels: &[Parcel],
        config: PipelineConfig,
    ) -> (Vec<InventoryRecord>, ProcessingReport) {
        let mut orchestrator = Orchestrator::new(config).unwrap();
        let output = orchestrator.run(footprints, parcels).unwrap();
        (output.records, output.report)
    }

    /// Report fields that must not depend on scheduling.
    fn counters(report: &ProcessingReport) -> [u64; 10] {
        [
            report.input_count,
            report.candidate_pairs,
            report.output_count,
            report.duplicates_removed,
            report.unmatched_dropped,
            report.invalid_dropped,
            report.duplicate_rows_merged,
            report.vertices_removed_total,
            report.fallback_count,
            report.reprojection_failures,
        ]
    }

    #[test]
    fn single_candidate_passes_through_unscored() {
        let footprints = vec![footprint("s1", "p1", noisy_building(0.0, 0.0))];
        let parcels = vec![parcel("p1", rect(-10.0, -10.0, 40.0, 30.0))];

        let (records, report) = run(&footprints, &parcels, config(10, 1));

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].footprint_id, "s1");
        assert_eq!(records[0].parcel_key, "p1");
        assert_eq!(records[0].candidate_count, 1);
        assert_eq!(records[0].overlap_area, None);
        assert_eq!(report.duplicates_removed, 0);
    }

    #[test]
    fn larger_overlap_parcel_wins() {
        let footprints = vec![footprint("s1", "p1", noisy_building(0.0, 0.0))];
        let p1 = rect(-10.0, -10.0, 6.0, 30.0);
        let p2 = rect(6.0, -10.0, 40.0, 30.0);
        let parcels = vec![parcel("p1", p1), parcel("p1", p2.clone())];

        let (records, report) = run(&footprints, &parcels, config(10, 2));

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].parcel_geometry, MultiPolygon(vec![p2]));
        assert_eq!(records[0].candidate_count, 2);
        assert!(records[0].overlap_area.unwrap() > 0.0);
        assert_eq!(report.duplicates_removed, 1);
    }

    #[test]
    fn unmatched_footprint_is_dropped_and_counted() {
        let footprints = vec![
            footprint("s1", "p1", noisy_building(0.0, 0.0)),
            footprint("s2", "p2", noisy_building(50.0, 0.0)),
            footprint("s3", "missing", noisy_building(100.0, 0.0)),
        ];
        let parcels = vec![
            parcel("p1", rect(-10.0, -10.0, 40.0, 30.0)),
            parcel("p2", rect(40.0, -10.0, 90.0, 30.0)),
        ];

        let (records, report) = run(&footprints, &parcels, config(2, 0));

        assert_eq!(records.len(), footprints.len() - 1);
        assert_eq!(report.output_count, report.input_count - 1);
        assert_eq!(report.unmatched_dropped, 1);
        assert!(records.iter().all(|r| r.footprint_id != "s3"));
    }

    #[test]
    fn output_is_independent_of_batch_size() {
        let (footprints, parcels) = neighbourhood(40);
        let (baseline, baseline_report) = run(&footprints, &parcels, config(usize::MAX, 4));

        for batch_size in [1, 3, 7, 41] {
            let (records, report) = run(&footprints, &parcels, config(batch_size, 4));
            assert_eq!(records, baseline, "batch size {batch_size}");
            assert_eq!(counters(&report), counters(&baseline_report), "batch size {batch_size}");
            assert_eq!(report.regularization, baseline_report.regularization);
        }
    }

    #[test]
    fn tie_breaks_are_identical_across_thread_counts() {
        let (footprints, parcels) = neighbourhood(40);
        let (baseline, _) = run(&footprints, &parcels, config(5, 1));

        for threads in [2, 3, 8] {
            for _ in 0..3 {
                let (records, _) = run(&footprints, &parcels, config(5, threads));
                assert_eq!(records, baseline, "{threads} threads");
            }
        }

        // s6 has two identical parcels; the first one in input order wins.
        let s6 = baseline.iter().find(|r| r.footprint_id == "s6").unwrap();
        assert_eq!(s6.candidate_count, 2);
        assert_eq!(s6.parcel_attributes.get("trampoline_ct"), Some(&AttributeValue::Integer(1)));
    }

    #[test]
    fn report_counters_are_consistent() {
        let (footprints, parcels) = neighbourhood(40);
        let (records, report) = run(&footprints, &parcels, config(8, 0));

        assert_eq!(report.input_count, footprints.len() as u64);
        assert_eq!(report.output_count, records.len() as u64);
        assert_eq!(report.duplicate_rows_merged, 1);
        assert_eq!(report.invalid_dropped, 0);
        let accounted = report.input_count
            - report.duplicate_rows_merged
            - report.unmatched_dropped
            - report.invalid_dropped;
        assert_eq!(accounted, report.output_count);
        assert_eq!(report.candidate_pairs - report.output_count, report.duplicates_removed);
        assert_eq!(report.batches, 5);

        // s8, s17, s26, s35 have unmatched keys.
        assert_eq!(report.unmatched_dropped, 4);

        // The repeated s5 row contributes its candidate to the same group.
        let s5 = records.iter().find(|r| r.footprint_id == "s5").unwrap();
        assert_eq!(s5.candidate_count, 2);
        assert_eq!(records.iter().filter(|r| r.footprint_id == "s5").count(), 1);
    }

    #[test]
    fn footprints_are_regularized_with_fidelity() {
        let (footprints, parcels) = neighbourhood(12);
        let (records, report) = run(&footprints, &parcels, config(4, 2));

        assert_eq!(report.fallback_count, 0);
        assert!(report.vertices_removed_total > 0);
        assert_eq!(report.regularization.regularized_count, report.output_count);
        assert!(report.regularization.area_change_pct_max < 3.0);
        let summary = &report.regularization;
        assert!(summary.orthogonality_after_pct > summary.orthogonality_before_pct);

        for record in &records {
            let original = footprints
                .iter()
                .find(|f| f.footprint_id == record.footprint_id)
                .unwrap();
            assert!(record.geometry.exterior().0.len() <= original.geometry.exterior().0.len());
            assert!(matches!(record.geometry_status, GeometryStatus::Regularized { .. }));
        }
    }

    #[test]
    fn sliver_keeps_its_exact_geometry() {
        let sliver = polygon(&[(0.0, 0.0), (30.0, 0.0), (30.0, 0.05), (0.0, 0.05)]);
        let footprints = vec![footprint("s1", "p1", sliver.clone())];
        let parcels = vec![parcel("p1", rect(-10.0, -10.0, 40.0, 30.0))];

        let (records, report) = run(&footprints, &parcels, config(10, 1));

        assert_eq!(records[0].geometry, sliver);
        assert!(records[0].fell_back());
        assert_eq!(
            records[0].geometry_status,
            GeometryStatus::FellBack(FallbackReason::Degenerate)
        );
        assert_eq!(report.fallback_count, 1);
    }

    #[test]
    fn disabled_regularization_leaves_geometry_untouched() {
        let (footprints, parcels) = neighbourhood(12);
        let config = PipelineConfig {
            enable_regularization: false,
            ..config(4, 2)
        };
        let (records, report) = run(&footprints, &parcels, config);

        assert_eq!(report.vertices_removed_total, 0);
        assert_eq!(report.fallback_count, 0);
        for record in &records {
            let original = footprints
                .iter()
                .find(|f| f.footprint_id == record.footprint_id)
                .unwrap();
            assert_eq!(record.geometry, original.geometry);
            assert_eq!(record.geometry_status, GeometryStatus::Untouched);
        }
    }

    #[test]
    fn disabled_deduplication_emits_every_pair() {
        let (footprints, parcels) = neighbourhood(12);
        let config = PipelineConfig {
            enable_deduplication: false,
            ..config(4, 2)
        };
        let (records, report) = run(&footprints, &parcels, config);

        assert_eq!(report.duplicates_removed, 0);
        assert_eq!(report.output_count, report.candidate_pairs);
        assert_eq!(records.len() as u64, report.candidate_pairs);
        assert_eq!(records.iter().filter(|r| r.footprint_id == "s0").count(), 2);
    }

    #[test]
    fn cancelled_run_emits_nothing() {
        let (footprints, parcels) = neighbourhood(12);
        let mut orchestrator = Orchestrator::new(config(4, 1)).unwrap();
        orchestrator.cancel_handle().store(true, Ordering::Relaxed);

        let err = orchestrator.run(&footprints, &parcels).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Cancelled {
                completed_batches: 0,
                total_batches: 3
            }
        ));

        orchestrator.reset_cancel();
        assert!(orchestrator.run(&footprints, &parcels).is_ok());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let result = Orchestrator::new(config(0, 1));
        assert!(matches!(result, Err(PipelineError::Config(_))));
    }

    #[test]
    fn regularize_only_mode_keeps_input_order() {
        let (footprints, _) = neighbourhood(12);
        let orchestrator = Orchestrator::new(config(5, 2)).unwrap();
        let output = orchestrator.regularize_collection(&footprints).unwrap();

        assert_eq!(output.footprints.len(), footprints.len());
        assert_eq!(output.report.input_count, footprints.len() as u64);
        assert_eq!(output.report.batches, 3);
        for (out, input) in output.footprints.iter().zip(&footprints) {
            assert_eq!(out.footprint.footprint_id, input.footprint_id);
            assert!(matches!(out.status, GeometryStatus::Regularized { .. }));
        }
    }

    #[test]
    fn empty_footprint_geometry_is_degenerate_not_reprojection() {
        let empty = Polygon::new(LineString::new(vec![]), vec![]);
        let footprints = vec![
            footprint("s1", "p1", empty.clone()),
            footprint("s2", "p2", noisy_building(50.0, 0.0)),
        ];
        let parcels = vec![
            parcel("p1", rect(-10.0, -10.0, 40.0, 30.0)),
            parcel("p2", rect(40.0, -10.0, 90.0, 30.0)),
        ];

        let (records, report) = run(&footprints, &parcels, config(10, 1));

        let s1 = records.iter().find(|r| r.footprint_id == "s1").unwrap();
        assert_eq!(s1.geometry, empty);
        assert_eq!(s1.geometry_status, GeometryStatus::FellBack(FallbackReason::Degenerate));
        assert_eq!(report.fallback_count, 1);
        assert_eq!(report.reprojection_failures, 0);
    }

    #[test]
    fn invalid_candidate_geometry_is_dropped_and_counted() {
        let flat = polygon(&[(60.0, 0.0), (80.0, 0.0), (100.0, 0.0)]);
        let footprints = vec![
            footprint("s1", "p1", noisy_building(0.0, 0.0)),
            footprint("s2", "p2", noisy_building(70.0, 0.0)),
        ];
        let parcels = vec![
            parcel("p1", rect(-10.0, -10.0, 6.0, 30.0)),
            parcel("p1", rect(6.0, -10.0, 40.0, 30.0)),
            parcel("p2", flat.clone()),
            parcel("p2", flat),
        ];

        let (records, report) = run(&footprints, &parcels, config(1, 2));

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].footprint_id, "s1");
        assert_eq!(report.candidate_pairs, 4);
        assert_eq!(report.duplicates_removed, 1);
        assert_eq!(report.invalid_dropped, 1);
        assert_eq!(report.unmatched_dropped, 0);
        assert_eq!(report.output_count, 1);
        let accounted = report.input_count
            - report.duplicate_rows_merged
            - report.unmatched_dropped
            - report.invalid_dropped;
        assert_eq!(accounted, report.output_count);
    }

    fn rows(n: u64) -> BatchOutput {
        BatchOutput {
            records: Vec::new(),
            tally: Tally {
                input_rows: n,
                output_count: n,
                ..Tally::default()
            },
        }
    }

    #[test]
    fn batches_merge_in_order() {
        let orchestrator = Orchestrator::new(config(1, 2)).unwrap();
        let (records, acc) = orchestrator.run_batches(&[1_u64, 2, 3], |&n| rows(n)).unwrap();

        assert!(records.is_empty());
        assert_eq!(acc.batches(), 3);
        assert_eq!(acc.tally().input_rows, 6);
    }

    #[test]
    fn panicking_batch_fails_the_whole_run() {
        let orchestrator = Orchestrator::new(config(1, 2)).unwrap();
        let result = orchestrator.run_batches(&[0_usize, 1, 2], |&batch| {
            if batch == 1 {
                panic!("corrupt geometry in batch {batch}");
            }
            rows(1)
        });

        match result {
            Err(PipelineError::BatchFailed { batch, message }) => {
                assert_eq!(batch, 1);
                assert_eq!(message, "corrupt geometry in batch 1");
            }
            other => panic!("expected BatchFailed, got {other:?}"),
        }
    }

    #[test]
    fn panic_on_a_worker_thread_is_caught() {
        let orchestrator = Orchestrator::new(config(1, 4)).unwrap();
        let result = orchestrator.run_batches(&[0_usize], |_| {
            (0..64).into_par_iter().for_each(|i| assert!(i != 40, "bad row {i}"));
            rows(64)
        });

        assert!(matches!(result, Err(PipelineError::BatchFailed { batch: 0, .. })));
    }
}
