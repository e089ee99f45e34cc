//! Conversions between `GeoJSON` geometries and `geo` polygons.

use geo::{MultiPolygon, Polygon};
use geojson::GeoJson;

/// Errors turning a `GeoJSON` geometry into a polygon.
#[derive(Debug, thiserror::Error)]
pub enum GeometryParseError {
    /// The `GeoJSON` could not be parsed or converted.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    /// A non-areal geometry type.
    #[error("unsupported geometry type: {0}")]
    Unsupported(&'static str),

    /// A footprint given as a multi-polygon with more than one part.
    #[error("footprint has {0} parts, expected one")]
    MultiPart(usize),

    /// A polygon or multi-polygon without coordinates.
    #[error("geometry is empty")]
    Empty,
}

const fn type_name(geometry: &geo::Geometry<f64>) -> &'static str {
    match geometry {
        geo::Geometry::Point(_) => "Point",
        geo::Geometry::Line(_) => "Line",
        geo::Geometry::LineString(_) => "LineString",
        geo::Geometry::Polygon(_) => "Polygon",
        geo::Geometry::MultiPoint(_) => "MultiPoint",
        geo::Geometry::MultiLineString(_) => "MultiLineString",
        geo::Geometry::MultiPolygon(_) => "MultiPolygon",
        geo::Geometry::GeometryCollection(_) => "GeometryCollection",
        geo::Geometry::Rect(_) => "Rect",
        geo::Geometry::Triangle(_) => "Triangle",
    }
}

/// Converts a `GeoJSON` geometry into a single polygon.
///
/// A multi-polygon with exactly one part is accepted.
///
/// # Errors
///
/// Returns an error for non-areal, empty, or multi-part geometries.
pub fn to_polygon(geometry: geojson::Geometry) -> Result<Polygon<f64>, GeometryParseError> {
    let geometry: geo::Geometry<f64> = geometry.try_into()?;
    let polygon = match geometry {
        geo::Geometry::Polygon(p) => p,
        geo::Geometry::MultiPolygon(mut mp) => match mp.0.len() {
            0 => return Err(GeometryParseError::Empty),
            1 => mp.0.remove(0),
            n => return Err(GeometryParseError::MultiPart(n)),
        },
        other => return Err(GeometryParseError::Unsupported(type_name(&other))),
    };
    if polygon.exterior().0.is_empty() {
        return Err(GeometryParseError::Empty);
    }
    Ok(polygon)
}

/// Converts a `GeoJSON` geometry into a multi-polygon.
///
/// # Errors
///
/// Returns an error for non-areal or empty geometries.
pub fn to_multipolygon(
    geometry: geojson::Geometry,
) -> Result<MultiPolygon<f64>, GeometryParseError> {
    let geometry: geo::Geometry<f64> = geometry.try_into()?;
    let multi = match geometry {
        geo::Geometry::MultiPolygon(mp) => mp,
        geo::Geometry::Polygon(p) => MultiPolygon(vec![p]),
        other => return Err(GeometryParseError::Unsupported(type_name(&other))),
    };
    if multi.0.iter().all(|p| p.exterior().0.is_empty()) {
        return Err(GeometryParseError::Empty);
    }
    Ok(multi)
}

/// Parses a `GeoJSON` geometry string into a [`MultiPolygon`].
/// Handles both `Polygon` and `MultiPolygon` geometry types.
#[must_use]
pub fn parse_multipolygon(geojson_str: &str) -> Option<MultiPolygon<f64>> {
    let geojson: GeoJson = geojson_str.parse().ok()?;
    if let GeoJson::Geometry(geom) = geojson {
        to_multipolygon(geom).ok()
    } else {
        None
    }
}

/// Converts a polygon to a `GeoJSON` geometry.
#[must_use]
pub fn from_polygon(polygon: &Polygon<f64>) -> geojson::Geometry {
    geojson::Geometry::new(geojson::Value::from(polygon))
}

/// Converts a multi-polygon to a `GeoJSON` geometry.
#[must_use]
pub fn from_multipolygon(multi: &MultiPolygon<f64>) -> geojson::Geometry {
    geojson::Geometry::new(geojson::Value::from(multi))
}
