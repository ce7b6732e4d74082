//! # Geographic Utilities
//!
//! Pure geometry used by the navigation core: distances, bearings and
//! geofence containment. Nothing in here holds state.
//!
//! ## Overview
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`haversine_distance`] | Great-circle distance between two coordinates |
//! | [`bearing_degrees`] | Initial compass bearing from one coordinate to another |
//! | [`destination_point`] | Coordinate reached by travelling a distance along a bearing |
//! | [`within_radius`] | Point-in-circle test used by geofences |
//! | [`meters_to_degrees`] | Convert meters to approximate degrees at a latitude |
//! | [`spread_offsets`] | Fan overlapping markers out on a small circle |
//!
//! ## Example
//!
//! ```rust
//! use tour_nav::{Coordinate, geo_utils};
//!
//! let gate = Coordinate::new(12.9330, 77.5350);
//! let shrine = Coordinate::new(12.9339, 77.5350);
//!
//! let dist = geo_utils::haversine_distance(&gate, &shrine);
//! assert!((dist - 100.0).abs() < 1.0);
//!
//! // Due north
//! let bearing = geo_utils::bearing_degrees(&gate, &shrine);
//! assert!(bearing < 0.5 || bearing > 359.5);
//! ```
//!
//! ## Algorithm Notes
//!
//! All computations assume a spherical Earth (mean radius 6,371 km), which is
//! what the [`geo`] crate's `Haversine` metric space uses. For the distances a
//! walking tour deals with (meters to tens of kilometers) the error is well
//! below what a phone's location sensor reports.
//!
//! Coordinates are WGS84 degrees. `geo` works in (x = longitude, y = latitude)
//! order; conversion happens only at the boundary of this module.

use geo::{Bearing, Destination, Distance, Haversine, Point};

use crate::Coordinate;

#[inline]
fn to_point(c: &Coordinate) -> Point<f64> {
    Point::new(c.longitude, c.latitude)
}

// =============================================================================
// Distance Functions
// =============================================================================

/// Calculate the great-circle distance between two coordinates using the Haversine formula.
///
/// Returns the distance in meters. Symmetric in its arguments and exactly zero
/// for identical inputs.
///
/// # Example
///
/// ```rust
/// use tour_nav::{Coordinate, geo_utils};
///
/// let london = Coordinate::new(51.5074, -0.1278);
/// let paris = Coordinate::new(48.8566, 2.3522);
///
/// let distance = geo_utils::haversine_distance(&london, &paris);
/// assert!((distance - 343_560.0).abs() < 1000.0); // ~344 km
/// ```
#[inline]
pub fn haversine_distance(a: &Coordinate, b: &Coordinate) -> f64 {
    Haversine::distance(to_point(a), to_point(b))
}

/// Point-in-circle test: is `point` within `radius_m` meters of `center`?
///
/// The boundary counts as inside.
#[inline]
pub fn within_radius(point: &Coordinate, center: &Coordinate, radius_m: f64) -> bool {
    haversine_distance(point, center) <= radius_m
}

// =============================================================================
// Bearing Functions
// =============================================================================

/// Initial compass bearing from `from` to `to`, in degrees within `[0, 360)`.
///
/// 0 is north, 90 is east. The result is meaningless when both coordinates
/// are the same point; callers must check the distance first and keep their
/// own fallback bearing in that case.
pub fn bearing_degrees(from: &Coordinate, to: &Coordinate) -> f64 {
    let bearing = Haversine::bearing(to_point(from), to_point(to)).rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if bearing >= 360.0 {
        0.0
    } else {
        bearing
    }
}

/// Coordinate reached from `origin` after travelling `distance_m` meters
/// along the initial bearing `bearing_deg`.
///
/// Only the map renderer needs this (to offset overlapping markers); the
/// navigation state machine itself never calls it.
pub fn destination_point(origin: &Coordinate, distance_m: f64, bearing_deg: f64) -> Coordinate {
    let p = Haversine::destination(to_point(origin), bearing_deg, distance_m);
    Coordinate::new(p.y(), p.x())
}

/// Convert meters to approximate degrees at a given latitude.
///
/// Uses the longitude scale (which shrinks with `cos(latitude)`), so the
/// result is an upper bound for both axes. The value grows without limit
/// towards the poles; callers must treat a huge span as "every longitude".
#[inline]
pub fn meters_to_degrees(meters: f64, latitude: f64) -> f64 {
    // At the equator, 1 degree ≈ 111,320 meters
    let lat_rad = latitude.to_radians();
    meters / (111_320.0 * lat_rad.cos().abs())
}

// =============================================================================
// Marker Layout
// =============================================================================

/// Spread `n` markers that share the same `center` evenly on a small circle.
///
/// The radius grows with the number of markers: `12 + min(40, 2 * (n - 1))`
/// meters. A single marker stays where it is.
pub fn spread_offsets(center: &Coordinate, n: usize) -> Vec<Coordinate> {
    if n <= 1 {
        return vec![*center; n];
    }

    let radius = 12.0 + (2.0 * (n - 1) as f64).min(40.0);
    let step = 360.0 / n as f64;

    (0..n)
        .map(|i| destination_point(center, radius, step * i as f64))
        .collect()
}

// =============================================================================
// Unit Tests
// =============================================================================
