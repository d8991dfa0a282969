// src/geo.rs
//! Flat degree geometry, matching the native unit of a 2d spatial index.
//!
//! One degree is taken as 111.12 km everywhere. This overstates longitude
//! distances away from the equator; it is the metric the index itself uses,
//! so radius checks here and in storage always agree.

use crate::model::GeoPoint;

/// Approximate length of one degree of latitude at the equator.
pub const KM_PER_DEGREE: f64 = 111.12;

pub fn km_to_degrees(km: f64) -> f64 {
    km / KM_PER_DEGREE
}

pub fn degrees_to_km(deg: f64) -> f64 {
    deg * KM_PER_DEGREE
}

/// Euclidean distance in degrees.
pub fn distance_deg(a: GeoPoint, b: GeoPoint) -> f64 {
    let dlat = a.lat - b.lat;
    let dlon = a.lon - b.lon;
    (dlat * dlat + dlon * dlon).sqrt()
}

pub fn distance_km(a: GeoPoint, b: GeoPoint) -> f64 {
    degrees_to_km(distance_deg(a, b))
}

/// Point `km` north of `origin` (clamped at the pole). Handy for building
/// fixtures at exact distances.
pub fn offset_north_km(origin: GeoPoint, km: f64) -> GeoPoint {
    GeoPoint {
        lat: (origin.lat + km_to_degrees(km)).min(90.0),
        lon: origin.lon,
    }
}
