//! Geographic coordinates and great-circle distance.
//!
//! All distances in DisasterZone are expressed in meters and computed with
//! the Haversine formula on a spherical Earth of radius [`EARTH_RADIUS_METERS`].

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Mean Earth radius used by every distance calculation.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// A WGS84 position in decimal degrees.
///
/// Values constructed through [`GeoCoordinate::new`] are guaranteed to be
/// finite and inside `[-90, 90]` x `[-180, 180]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoCoordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoCoordinate {
    /// Create a validated coordinate.
    ///
    /// Fails with [`Error::InvalidArgument`] if either component is not
    /// finite or lies outside its range.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(Error::InvalidArgument(format!(
                "latitude {latitude} is outside [-90, 90]"
            )));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(Error::InvalidArgument(format!(
                "longitude {longitude} is outside [-180, 180]"
            )));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// Interpret a location reported by a client.
    ///
    /// Mobile clients report `(0, 0)` when no fix has been obtained yet, so
    /// that pair maps to `None` rather than a point in the Gulf of Guinea.
    pub fn from_reported(latitude: f64, longitude: f64) -> Result<Option<Self>> {
        if latitude == 0.0 && longitude == 0.0 {
            return Ok(None);
        }
        Self::new(latitude, longitude).map(Some)
    }

    /// Like [`GeoCoordinate::from_reported`], for a pair whose halves are
    /// each optional. Both absent means unset; only one present is an error.
    pub fn from_optional(latitude: Option<f64>, longitude: Option<f64>) -> Result<Option<Self>> {
        match (latitude, longitude) {
            (Some(lat), Some(lon)) => Self::from_reported(lat, lon),
            (None, None) => Ok(None),
            _ => Err(Error::InvalidArgument(
                "latitude and longitude must be given together".to_string(),
            )),
        }
    }

    /// Great-circle distance to `other`, in meters.
    pub fn distance_to(&self, other: &GeoCoordinate) -> f64 {
        distance_meters(*self, *other)
    }
}

/// Haversine distance between two coordinates, in meters.
///
/// Returns exactly `0.0` for identical inputs and is symmetric in its
/// arguments.
pub fn distance_meters(a: GeoCoordinate, b: GeoCoordinate) -> f64 {
    if a == b {
        return 0.0;
    }

    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let delta_lat = (b.latitude - a.latitude).to_radians();
    let delta_lon = (b.longitude - a.longitude).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);
    // Rounding can push h marginally above 1 for antipodal points.
    let c = 2.0 * h.min(1.0).sqrt().asin();

    EARTH_RADIUS_METERS * c
}
