//! `GeoJSON` input and output for the inventory binary.
//!
//! Footprints and parcels are read from `FeatureCollection` files. A
//! feature missing its id, its join key, or a usable areal geometry is
//! skipped and counted rather than failing the whole load.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use geojson::{Feature, FeatureCollection, GeoJson, JsonObject, JsonValue};
use pre_event_inventory_models::{
    Attributes, FOOTPRINT_SCHEMA, Footprint, GeometryStatus, InventoryRecord, PARCEL_SCHEMA,
    Parcel, PipelineConfig, ProcessingReport,
};
use pre_event_pipeline::RegularizedFootprint;
use pre_event_spatial::convert;
use serde::Serialize;

/// Prefix for parcel attributes copied onto output features.
pub const PARCEL_PREFIX: &str = "parcel_";

/// Errors reading or writing inventory files.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid GeoJSON: {0}")]
    GeoJson(#[from] geojson::Error),

    #[error("Expected a FeatureCollection, found a {0}")]
    NotFeatureCollection(&'static str),

    #[error("Failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
}

/// Property names holding the footprint id and the parcel join key.
#[derive(Debug, Clone)]
pub struct FieldNames {
    pub id: String,
    pub key: String,
}

/// Entities parsed from one file, plus how many features were unusable.
#[derive(Debug)]
pub struct Loaded<T> {
    pub items: Vec<T>,
    pub skipped: usize,
}

fn read(path: &Path) -> Result<String, LoadError> {
    std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn write(path: &Path, contents: &str) -> Result<(), LoadError> {
    std::fs::write(path, contents).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn features(text: &str) -> Result<Vec<Feature>, LoadError> {
    match text.parse::<GeoJson>()? {
        GeoJson::FeatureCollection(fc) => Ok(fc.features),
        GeoJson::Feature(_) => Err(LoadError::NotFeatureCollection("Feature")),
        GeoJson::Geometry(_) => Err(LoadError::NotFeatureCollection("Geometry")),
    }
}

/// Reads an id or key property. Numeric ids are accepted and kept in
/// their JSON spelling.
fn property_string(properties: &JsonObject, name: &str) -> Option<String> {
    match properties.get(name)? {
        JsonValue::String(s) if !s.is_empty() => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Parses footprints from `GeoJSON` text.
///
/// # Errors
///
/// * If the text is not a `GeoJSON` `FeatureCollection`
pub fn parse_footprints(text: &str, fields: &FieldNames) -> Result<Loaded<Footprint>, LoadError> {
    let mut items = Vec::new();
    let mut skipped = 0;

    for (i, feature) in features(text)?.into_iter().enumerate() {
        let properties = feature.properties.unwrap_or_default();
        let (Some(footprint_id), Some(parcel_key)) = (
            property_string(&properties, &fields.id),
            property_string(&properties, &fields.key),
        ) else {
            log::debug!(
                "Skipping footprint feature {i}: missing {} or {}",
                fields.id,
                fields.key
            );
            skipped += 1;
            continue;
        };

        let geometry = match feature.geometry.map(convert::to_polygon) {
            Some(Ok(polygon)) => polygon,
            Some(Err(e)) => {
                log::debug!("Skipping footprint {footprint_id}: {e}");
                skipped += 1;
                continue;
            }
            None => {
                log::debug!("Skipping footprint {footprint_id}: no geometry");
                skipped += 1;
                continue;
            }
        };

        let skip = [fields.id.as_str(), fields.key.as_str()];
        items.push(Footprint {
            footprint_id,
            parcel_key,
            geometry,
            attributes: Attributes::from_properties(&FOOTPRINT_SCHEMA, &properties, &skip),
        });
    }

    Ok(Loaded { items, skipped })
}

/// Parses parcels from `GeoJSON` text. Only the key field is required.
///
/// # Errors
///
/// * If the text is not a `GeoJSON` `FeatureCollection`
pub fn parse_parcels(text: &str, fields: &FieldNames) -> Result<Loaded<Parcel>, LoadError> {
    let mut items = Vec::new();
    let mut skipped = 0;

    for (i, feature) in features(text)?.into_iter().enumerate() {
        let properties = feature.properties.unwrap_or_default();
        let Some(parcel_key) = property_string(&properties, &fields.key) else {
            log::debug!("Skipping parcel feature {i}: missing {}", fields.key);
            skipped += 1;
            continue;
        };

        let geometry = match feature.geometry.map(convert::to_multipolygon) {
            Some(Ok(multi)) => multi,
            Some(Err(e)) => {
                log::debug!("Skipping parcel {parcel_key}: {e}");
                skipped += 1;
                continue;
            }
            None => {
                log::debug!("Skipping parcel {parcel_key}: no geometry");
                skipped += 1;
                continue;
            }
        };

        items.push(Parcel {
            parcel_key,
            geometry,
            attributes: Attributes::from_properties(
                &PARCEL_SCHEMA,
                &properties,
                &[fields.key.as_str()],
            ),
        });
    }

    Ok(Loaded { items, skipped })
}

/// Loads footprints from a `GeoJSON` file.
///
/// # Errors
///
/// * If the file cannot be read or is not a `FeatureCollection`
pub fn load_footprints(path: &Path, fields: &FieldNames) -> Result<Loaded<Footprint>, LoadError> {
    let loaded = parse_footprints(&read(path)?, fields)?;
    log_skipped("footprint", path, &loaded);
    Ok(loaded)
}

/// Loads parcels from a `GeoJSON` file.
///
/// # Errors
///
/// * If the file cannot be read or is not a `FeatureCollection`
pub fn load_parcels(path: &Path, fields: &FieldNames) -> Result<Loaded<Parcel>, LoadError> {
    let loaded = parse_parcels(&read(path)?, fields)?;
    log_skipped("parcel", path, &loaded);
    Ok(loaded)
}

fn log_skipped<T>(what: &str, path: &Path, loaded: &Loaded<T>) {
    log::info!("Loaded {} {what}s from {}", loaded.items.len(), path.display());
    if loaded.skipped > 0 {
        log::warn!(
            "Skipped {} unusable {what} features in {}",
            loaded.skipped,
            path.display()
        );
    }
}

fn insert_status(properties: &mut JsonObject, status: GeometryStatus) {
    let (label, reason) = match status {
        GeometryStatus::Untouched => ("untouched", None),
        GeometryStatus::Regularized { .. } => ("regularized", None),
        GeometryStatus::FellBack(reason) => ("fell_back", Some(reason)),
    };
    properties.insert("geometry_status".to_string(), label.into());
    if let Some(reason) = reason {
        properties.insert("fallback_reason".to_string(), reason.to_string().into());
    }
}

/// Builds the output collection: one feature per record carrying the
/// final footprint geometry, the footprint's attributes, and the chosen
/// parcel's attributes under [`PARCEL_PREFIX`].
#[must_use]
pub fn records_to_collection(records: &[InventoryRecord], fields: &FieldNames) -> FeatureCollection {
    let features = records
        .iter()
        .map(|record| {
            let mut properties = record.attributes.to_properties("");
            properties.extend(record.parcel_attributes.to_properties(PARCEL_PREFIX));
            properties.insert(fields.id.clone(), record.footprint_id.clone().into());
            properties.insert(fields.key.clone(), record.parcel_key.clone().into());
            properties.insert("candidate_count".to_string(), record.candidate_count.into());
            if let Some(area) = record.overlap_area {
                properties.insert("overlap_area".to_string(), area.into());
            }
            insert_status(&mut properties, record.geometry_status);

            Feature {
                bbox: None,
                geometry: Some(convert::from_polygon(&record.geometry)),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

/// Builds the output collection for regularize-only runs.
#[must_use]
pub fn footprints_to_collection(
    footprints: &[RegularizedFootprint],
    fields: &FieldNames,
) -> FeatureCollection {
    let features = footprints
        .iter()
        .map(|regularized| {
            let footprint = &regularized.footprint;
            let mut properties = footprint.attributes.to_properties("");
            properties.insert(fields.id.clone(), footprint.footprint_id.clone().into());
            properties.insert(fields.key.clone(), footprint.parcel_key.clone().into());
            insert_status(&mut properties, regularized.status);

            Feature {
                bbox: None,
                geometry: Some(convert::from_polygon(&footprint.geometry)),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

/// Writes a feature collection to `path`.
///
/// # Errors
///
/// * If serialization or the write fails
pub fn write_collection(path: &Path, collection: &FeatureCollection) -> Result<(), LoadError> {
    write(path, &serde_json::to_string(collection)?)
}

/// Run description written next to the output.
#[derive(Debug, Serialize)]
pub struct RunMetadata<'a> {
    pub generated_at: DateTime<Utc>,
    pub command: &'static str,
    pub footprints_path: &'a Path,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parcels_path: Option<&'a Path>,
    pub skipped_footprint_features: usize,
    pub skipped_parcel_features: usize,
    pub config: &'a PipelineConfig,
    pub report: &'a ProcessingReport,
}

/// Path of the metadata file for `output`: `out.geojson` becomes
/// `out.metadata.json`.
#[must_use]
pub fn metadata_path(output: &Path) -> PathBuf {
    output.with_extension("metadata.json")
}

/// Writes `metadata` as pretty-printed JSON.
///
/// # Errors
///
/// * If serialization or the write fails
pub fn write_metadata(path: &Path, metadata: &RunMetadata<'_>) -> Result<(), LoadError> {
    write(path, &serde_json::to_string_pretty(metadata)?)
}
