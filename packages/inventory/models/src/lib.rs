#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared types for the pre-event building inventory.
//!
//! This crate contains only data types, configuration structs, and simple
//! conversions. Geometry is carried as `geo` types in geographic
//! coordinates (longitude, latitude).

pub mod attributes;
pub mod config;
pub mod report;

use geo::{MultiPolygon, Polygon};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

pub use attributes::{
    AttributeKind, AttributeSchema, AttributeValue, Attributes, EntityKind, FOOTPRINT_SCHEMA,
    PARCEL_SCHEMA,
};
pub use config::{PipelineConfig, RegularizationConfig};
pub use report::{ProcessingReport, RegularizationSummary};

/// A building outline as supplied by the loader.
#[derive(Debug, Clone, PartialEq)]
pub struct Footprint {
    /// Unique per building; rows sharing an id are grouped together.
    pub footprint_id: String,
    /// Join key into the parcel collection. May match zero or many parcels.
    pub parcel_key: String,
    pub geometry: Polygon<f64>,
    pub attributes: Attributes,
}

/// A property boundary as supplied by the loader.
#[derive(Debug, Clone, PartialEq)]
pub struct Parcel {
    /// Join key. Not guaranteed unique.
    pub parcel_key: String,
    pub geometry: MultiPolygon<f64>,
    pub attributes: Attributes,
}

/// Why a regularized geometry was discarded in favour of the original.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FallbackReason {
    /// Input was unusable (too few distinct vertices, no area, or
    /// self-intersecting) or collapsed during cleanup.
    Degenerate,
    /// The regularized polygon was invalid or had no area.
    InvalidResult,
    /// Intersection-over-union fell below the configured minimum.
    LowIou,
    /// The regularized polygon had more vertices than the input.
    VertexIncrease,
    /// The footprint could not be moved into a projected frame.
    Reprojection,
    /// Regularization panicked on this footprint.
    Internal,
}

/// What happened to a record's geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryStatus {
    /// Regularization is disabled for the run.
    Untouched,
    /// The regularized geometry was accepted.
    Regularized { vertices_removed: usize },
    /// The original geometry was kept.
    FellBack(FallbackReason),
}

/// One emitted inventory row: a footprint linked to its chosen parcel.
#[derive(Debug, Clone, PartialEq)]
pub struct InventoryRecord {
    pub footprint_id: String,
    pub parcel_key: String,
    /// Final footprint geometry (regularized, or the original).
    pub geometry: Polygon<f64>,
    pub attributes: Attributes,
    pub parcel_geometry: MultiPolygon<f64>,
    pub parcel_attributes: Attributes,
    /// Number of candidate parcels the footprint joined against.
    pub candidate_count: usize,
    /// Overlap area of the winning pair, in square degrees. `None` when
    /// the pair was kept without scoring.
    pub overlap_area: Option<f64>,
    pub geometry_status: GeometryStatus,
}

impl InventoryRecord {
    /// Whether the record kept its original geometry after a failed
    /// regularization.
    #[must_use]
    pub const fn fell_back(&self) -> bool {
        matches!(self.geometry_status, GeometryStatus::FellBack(_))
    }
}
