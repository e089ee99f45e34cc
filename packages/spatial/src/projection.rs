//! Universal Transverse Mercator reprojection on the WGS84 ellipsoid.
//!
//! Uses the 6th-order Krüger series (Karney 2011), which is accurate to
//! well under a millimetre inside a zone. Angle and distance work on
//! footprints happens in this frame; degrees are only used at the edges
//! of the pipeline.

use std::sync::LazyLock;

use geo::{Centroid, Coord, MapCoords, Polygon};

const WGS84_A: f64 = 6_378_137.0;
const WGS84_F: f64 = 1.0 / 298.257_223_563;
const UTM_K0: f64 = 0.9996;
const FALSE_EASTING: f64 = 500_000.0;
const FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

/// UTM is defined between these latitudes.
const MIN_LATITUDE: f64 = -80.0;
const MAX_LATITUDE: f64 = 84.0;

const MAX_NEWTON_ITERATIONS: usize = 10;

/// Errors moving geometry into or out of a projected frame.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProjectionError {
    /// Latitude outside the band UTM covers.
    #[error("latitude {latitude} is outside the UTM band [-80, 84]")]
    OutsideZoneBounds {
        /// The offending latitude.
        latitude: f64,
    },

    /// A coordinate was NaN or infinite, before or after projection.
    #[error("non-finite coordinate ({x}, {y})")]
    NonFinite { x: f64, y: f64 },

    /// The geometry has no centroid to pick a zone from.
    #[error("geometry is empty")]
    EmptyGeometry,
}

/// Series coefficients for WGS84.
struct Series {
    /// `k0 * A`, the scaled rectifying radius.
    k0_a: f64,
    e: f64,
    alpha: [f64; 6],
    beta: [f64; 6],
}

static SERIES: LazyLock<Series> = LazyLock::new(Series::wgs84);

impl Series {
    fn wgs84() -> Self {
        let n = WGS84_F / (2.0 - WGS84_F);
        let n2 = n * n;
        let n3 = n2 * n;
        let n4 = n3 * n;
        let n5 = n4 * n;
        let n6 = n5 * n;

        let a = WGS84_A / (1.0 + n) * (1.0 + n2 / 4.0 + n4 / 64.0 + n6 / 256.0);

        let alpha = [
            n / 2.0 - 2.0 * n2 / 3.0 + 5.0 * n3 / 16.0 + 41.0 * n4 / 180.0 - 127.0 * n5 / 288.0
                + 7891.0 * n6 / 37800.0,
            13.0 * n2 / 48.0 - 3.0 * n3 / 5.0 + 557.0 * n4 / 1440.0 + 281.0 * n5 / 630.0
                - 1_983_433.0 * n6 / 1_935_360.0,
            61.0 * n3 / 240.0 - 103.0 * n4 / 140.0 + 15061.0 * n5 / 26880.0
                + 167_603.0 * n6 / 181_440.0,
            49561.0 * n4 / 161_280.0 - 179.0 * n5 / 168.0 + 6_601_661.0 * n6 / 7_257_600.0,
            34729.0 * n5 / 80640.0 - 3_418_889.0 * n6 / 1_995_840.0,
            212_378_941.0 * n6 / 319_334_400.0,
        ];

        let beta = [
            n / 2.0 - 2.0 * n2 / 3.0 + 37.0 * n3 / 96.0 - n4 / 360.0 - 81.0 * n5 / 512.0
                + 96199.0 * n6 / 604_800.0,
            n2 / 48.0 + n3 / 15.0 - 437.0 * n4 / 1440.0 + 46.0 * n5 / 105.0
                - 1_118_711.0 * n6 / 3_870_720.0,
            17.0 * n3 / 480.0 - 37.0 * n4 / 840.0 - 209.0 * n5 / 4480.0 + 5569.0 * n6 / 90720.0,
            4397.0 * n4 / 161_280.0 - 11.0 * n5 / 504.0 - 830_251.0 * n6 / 7_257_600.0,
            4583.0 * n5 / 161_280.0 - 108_847.0 * n6 / 3_991_680.0,
            20_648_693.0 * n6 / 638_668_800.0,
        ];

        Self {
            k0_a: UTM_K0 * a,
            e: (WGS84_F * (2.0 - WGS84_F)).sqrt(),
            alpha,
            beta,
        }
    }
}

/// A UTM zone: number 1-60 plus hemisphere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UtmZone {
    pub number: u8,
    pub north: bool,
}

impl std::fmt::Display for UtmZone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "UTM zone {}{}", self.number, if self.north { 'N' } else { 'S' })
    }
}

impl UtmZone {
    /// The zone containing a geographic coordinate.
    ///
    /// # Errors
    ///
    /// Returns an error if the coordinate is non-finite or the latitude is
    /// outside the UTM band.
    pub fn for_lon_lat(lon: f64, lat: f64) -> Result<Self, ProjectionError> {
        if !lon.is_finite() || !lat.is_finite() {
            return Err(ProjectionError::NonFinite { x: lon, y: lat });
        }
        if !(MIN_LATITUDE..=MAX_LATITUDE).contains(&lat) {
            return Err(ProjectionError::OutsideZoneBounds { latitude: lat });
        }

        let wrapped = (lon + 180.0).rem_euclid(360.0);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let number = ((wrapped / 6.0).floor() as u8 + 1).min(60);

        Ok(Self {
            number,
            north: lat >= 0.0,
        })
    }

    /// The zone for a polygon, chosen from its centroid.
    ///
    /// # Errors
    ///
    /// Returns an error if the polygon is empty or its centroid lies
    /// outside the UTM band.
    pub fn for_polygon(polygon: &Polygon<f64>) -> Result<Self, ProjectionError> {
        let centroid = polygon.centroid().ok_or(ProjectionError::EmptyGeometry)?;
        Self::for_lon_lat(centroid.x(), centroid.y())
    }

    /// Longitude of the zone's central meridian, in degrees.
    #[must_use]
    pub fn central_meridian(self) -> f64 {
        f64::from(self.number) * 6.0 - 183.0
    }

    /// EPSG code of the WGS84 / UTM zone.
    #[must_use]
    pub fn epsg(self) -> u32 {
        let base = if self.north { 32600 } else { 32700 };
        base + u32::from(self.number)
    }

    const fn false_northing(self) -> f64 {
        if self.north { 0.0 } else { FALSE_NORTHING_SOUTH }
    }

    /// Geographic (lon, lat) in degrees to (easting, northing) in metres.
    ///
    /// # Errors
    ///
    /// Returns an error for non-finite input or output, or a latitude
    /// outside the UTM band.
    pub fn forward(self, lon: f64, lat: f64) -> Result<(f64, f64), ProjectionError> {
        if !lon.is_finite() || !lat.is_finite() {
            return Err(ProjectionError::NonFinite { x: lon, y: lat });
        }
        if !(MIN_LATITUDE..=MAX_LATITUDE).contains(&lat) {
            return Err(ProjectionError::OutsideZoneBounds { latitude: lat });
        }

        let series = &*SERIES;
        let e = series.e;
        let phi = lat.to_radians();
        let dlon = (lon - self.central_meridian()).to_radians();

        let sin_phi = phi.sin();
        let t = (sin_phi.atanh() - e * (e * sin_phi).atanh()).sinh();
        let xi_p = t.atan2(dlon.cos());
        let eta_p = (dlon.sin() / t.hypot(1.0)).atanh();

        let mut xi = xi_p;
        let mut eta = eta_p;
        for (j, alpha) in (1_u32..).zip(&series.alpha) {
            let k = 2.0 * f64::from(j);
            xi += alpha * (k * xi_p).sin() * (k * eta_p).cosh();
            eta += alpha * (k * xi_p).cos() * (k * eta_p).sinh();
        }

        let easting = FALSE_EASTING + series.k0_a * eta;
        let northing = self.false_northing() + series.k0_a * xi;

        if easting.is_finite() && northing.is_finite() {
            Ok((easting, northing))
        } else {
            Err(ProjectionError::NonFinite {
                x: easting,
                y: northing,
            })
        }
    }

    /// (easting, northing) in metres back to geographic (lon, lat).
    ///
    /// # Errors
    ///
    /// Returns an error for non-finite input or output.
    pub fn inverse(self, easting: f64, northing: f64) -> Result<(f64, f64), ProjectionError> {
        if !easting.is_finite() || !northing.is_finite() {
            return Err(ProjectionError::NonFinite {
                x: easting,
                y: northing,
            });
        }

        let series = &*SERIES;
        let xi = (northing - self.false_northing()) / series.k0_a;
        let eta = (easting - FALSE_EASTING) / series.k0_a;

        let mut xi_p = xi;
        let mut eta_p = eta;
        for (j, beta) in (1_u32..).zip(&series.beta) {
            let k = 2.0 * f64::from(j);
            xi_p -= beta * (k * xi).sin() * (k * eta).cosh();
            eta_p -= beta * (k * xi).cos() * (k * eta).sinh();
        }

        let tau_p = xi_p.sin() / eta_p.sinh().hypot(xi_p.cos());
        let dlon = eta_p.sinh().atan2(xi_p.cos());
        let tau = tau_from_conformal(tau_p, series.e);

        let lat = tau.atan().to_degrees();
        let lon = self.central_meridian() + dlon.to_degrees();

        if lat.is_finite() && lon.is_finite() {
            Ok((lon, lat))
        } else {
            Err(ProjectionError::NonFinite { x: lon, y: lat })
        }
    }
}

/// Conformal `tan` latitude for a geodetic `tan` latitude.
fn conformal_tau(tau: f64, e: f64) -> f64 {
    let sigma = (e * (e * tau / tau.hypot(1.0)).atanh()).sinh();
    tau * sigma.hypot(1.0) - sigma * tau.hypot(1.0)
}

/// Inverts [`conformal_tau`] by Newton's method.
fn tau_from_conformal(tau_p: f64, e: f64) -> f64 {
    let e2m = 1.0 - e * e;
    let mut tau = tau_p;
    for _ in 0..MAX_NEWTON_ITERATIONS {
        let tau_i = conformal_tau(tau, e);
        let step = (tau_p - tau_i) / tau_i.hypot(1.0) * (1.0 + e2m * tau * tau)
            / (e2m * tau.hypot(1.0));
        tau += step;
        if step.abs() <= 1e-14 * tau.abs().max(1.0) {
            break;
        }
    }
    tau
}

/// Projects a geographic polygon into `zone`.
///
/// # Errors
///
/// Returns the first coordinate that fails to project.
pub fn to_projected(polygon: &Polygon<f64>, zone: UtmZone) -> Result<Polygon<f64>, ProjectionError> {
    polygon.try_map_coords(move |c: Coord<f64>| {
        zone.forward(c.x, c.y).map(|(x, y)| Coord { x, y })
    })
}

/// Projects a polygon in `zone` back to geographic coordinates.
///
/// # Errors
///
/// Returns the first coordinate that fails to unproject.
pub fn to_geographic(polygon: &Polygon<f64>, zone: UtmZone) -> Result<Polygon<f64>, ProjectionError> {
    polygon.try_map_coords(move |c: Coord<f64>| {
        zone.inverse(c.x, c.y).map(|(x, y)| Coord { x, y })
    })
}
