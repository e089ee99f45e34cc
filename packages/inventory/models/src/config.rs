//! Configuration structs for the inventory pipeline.
//!
//! These are plain data; loading from TOML and the environment plus
//! validation live in `pre_event_pipeline::config`.

use serde::{Deserialize, Serialize};

/// Tunables for footprint regularization. Distances are in metres of the
/// local projected frame, angles in degrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegularizationConfig {
    /// Maximum lateral displacement of an edge's endpoints when rotating
    /// it onto a canonical direction. Edges that would move further keep
    /// their own direction.
    #[serde(default = "default_snap_tolerance")]
    pub snap_tolerance_m: f64,

    /// Adjacent parallel edges closer than this are merged into one.
    #[serde(default = "default_parallel_merge_tolerance")]
    pub parallel_merge_tolerance_m: f64,

    /// Vertices deviating less than this from their neighbours' chord are
    /// removed.
    #[serde(default = "default_simplify_tolerance")]
    pub simplify_tolerance_m: f64,

    /// Regularized shapes with a lower intersection-over-union against the
    /// original are discarded.
    #[serde(default = "default_min_acceptable_iou")]
    pub min_acceptable_iou: f64,

    /// Whether 45 and 135 degree edges are canonical directions.
    #[serde(default = "default_allow_45_degree")]
    pub allow_45_degree: bool,

    /// An edge snaps to a diagonal only if it is closer to it than to the
    /// nearest orthogonal direction by more than this many degrees.
    #[serde(default = "default_diagonal_threshold_reduction")]
    pub diagonal_threshold_reduction_deg: f64,
}

const fn default_snap_tolerance() -> f64 {
    1.0
}

const fn default_parallel_merge_tolerance() -> f64 {
    1.0
}

const fn default_simplify_tolerance() -> f64 {
    0.5
}

const fn default_min_acceptable_iou() -> f64 {
    0.75
}

const fn default_allow_45_degree() -> bool {
    true
}

const fn default_diagonal_threshold_reduction() -> f64 {
    15.0
}

impl Default for RegularizationConfig {
    fn default() -> Self {
        Self {
            snap_tolerance_m: default_snap_tolerance(),
            parallel_merge_tolerance_m: default_parallel_merge_tolerance(),
            simplify_tolerance_m: default_simplify_tolerance(),
            min_acceptable_iou: default_min_acceptable_iou(),
            allow_45_degree: default_allow_45_degree(),
            diagonal_threshold_reduction_deg: default_diagonal_threshold_reduction(),
        }
    }
}

/// Run-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Footprints per batch. Affects memory and scheduling only.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Worker threads. `0` uses every available core.
    #[serde(default)]
    pub num_threads: usize,

    /// When false the regularizer stage is skipped and geometry passes
    /// through untouched.
    #[serde(default = "default_true")]
    pub enable_regularization: bool,

    /// When false every candidate pair is emitted unresolved.
    #[serde(default = "default_true")]
    pub enable_deduplication: bool,

    #[serde(default)]
    pub regularization: RegularizationConfig,
}

const fn default_batch_size() -> usize {
    10_000
}

const fn default_true() -> bool {
    true
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            num_threads: 0,
            enable_regularization: true,
            enable_deduplication: true,
            regularization: RegularizationConfig::default(),
        }
    }
}
