//! Geofence registry.
//!
//! A flat projection of every geolocated place in the loaded tours into a
//! circular geofence. The registry is rebuilt from scratch whenever the tour
//! set changes and is never mutated in between.
//!
//! Lookups go through an R-tree of fence envelopes so that a position sample
//! only has to be measured against the handful of fences near it. Results are
//! always returned in registry order (tour order, then place order) so that
//! check-ins for a single sample come out deterministically.

use rstar::{RTree, RTreeObject, AABB};

use crate::geo_utils::{haversine_distance, meters_to_degrees, within_radius};
use crate::tour::{DEFAULT_GEOFENCE_RADIUS_M, MIN_GEOFENCE_RADIUS_M};
use crate::{Coordinate, Tour};

/// Radius policy applied when deriving fences from places.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "persist", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "persist", serde(default))]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct GeofenceConfig {
    /// Radius for places that do not set one.
    /// Default: 30.0 meters
    pub default_radius_m: f64,

    /// Lower bound on any radius. Smaller radii are raised to this.
    /// Default: 5.0 meters (below typical phone GPS accuracy)
    pub min_radius_m: f64,
}

impl Default for GeofenceConfig {
    fn default() -> Self {
        Self {
            default_radius_m: DEFAULT_GEOFENCE_RADIUS_M,
            min_radius_m: MIN_GEOFENCE_RADIUS_M,
        }
    }
}

/// A circular region around a place.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct Geofence {
    pub place_id: String,
    pub tour_id: String,
    pub center: Coordinate,
    pub radius_m: f64,
    /// Display name of the place
    pub name: String,
    pub blurb: Option<String>,
    pub time: Option<String>,
}

impl Geofence {
    /// Distance from `point` to the fence center, in meters.
    #[inline]
    pub fn distance_to(&self, point: &Coordinate) -> f64 {
        haversine_distance(point, &self.center)
    }

    pub fn contains(&self, point: &Coordinate) -> bool {
        within_radius(point, &self.center, self.radius_m)
    }
}

/// Envelope of one fence, tagged with its registry index.
#[derive(Debug, Clone)]
struct FenceEnvelope {
    index: usize,
    min_lat: f64,
    max_lat: f64,
    min_lng: f64,
    max_lng: f64,
}

impl FenceEnvelope {
    /// Envelopes covering `fence` in `[lng, lat]` space.
    ///
    /// A fence that crosses the antimeridian gets a second envelope shifted by
    /// 360 degrees. A fence that reaches a pole, or whose longitude span
    /// would exceed a quarter turn, covers every longitude.
    fn for_fence(index: usize, fence: &Geofence) -> Vec<Self> {
        // Pad a little so rounding in the degree conversion never clips a fence
        let reach = fence.radius_m * 1.1;
        let Coordinate { latitude, longitude } = fence.center;

        let lat_pad = meters_to_degrees(reach, 0.0);
        let min_lat = (latitude - lat_pad).max(-90.0);
        let max_lat = (latitude + lat_pad).min(90.0);

        // Longitude degrees are narrowest at the latitude farthest from the equator
        let lng_pad = meters_to_degrees(reach, min_lat.abs().max(max_lat.abs()));
        if min_lat <= -90.0 || max_lat >= 90.0 || !lng_pad.is_finite() || lng_pad >= 90.0 {
            return vec![Self {
                index,
                min_lat,
                max_lat,
                min_lng: -180.0,
                max_lng: 180.0,
            }];
        }

        let base = Self {
            index,
            min_lat,
            max_lat,
            min_lng: longitude - lng_pad,
            max_lng: longitude + lng_pad,
        };

        let wrapped = if base.min_lng < -180.0 {
            Some(base.shifted(360.0))
        } else if base.max_lng > 180.0 {
            Some(base.shifted(-360.0))
        } else {
            None
        };

        std::iter::once(base).chain(wrapped).collect()
    }

    fn shifted(&self, degrees: f64) -> Self {
        Self {
            min_lng: self.min_lng + degrees,
            max_lng: self.max_lng + degrees,
            ..self.clone()
        }
    }
}

impl RTreeObject for FenceEnvelope {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners([self.min_lng, self.min_lat], [self.max_lng, self.max_lat])
    }
}

/// All geofences derived from the loaded tours.
#[derive(Debug, Default)]
pub struct GeofenceRegistry {
    fences: Vec<Geofence>,
    index: RTree<FenceEnvelope>,
}

impl GeofenceRegistry {
    /// Derive one fence per geolocated place, in tour then place order.
    ///
    /// # Example
    /// ```
    /// use tour_nav::{Coordinate, GeofenceConfig, GeofenceRegistry, Place, Tour};
    ///
    /// let tour = Tour::new("t1", "Old Town", vec![
    ///     Place::new("gate", "City Gate", Coordinate::new(12.9330, 77.5350)),
    ///     Place::new("well", "Step Well", Coordinate::new(12.9350, 77.5360)).with_radius(50.0),
    /// ]);
    ///
    /// let registry = GeofenceRegistry::from_tours(&[tour], &GeofenceConfig::default());
    /// assert_eq!(registry.len(), 2);
    /// assert_eq!(registry.fences()[0].radius_m, 30.0);
    /// ```
    pub fn from_tours(tours: &[Tour], config: &GeofenceConfig) -> Self {
        let fences: Vec<Geofence> = tours
            .iter()
            .flat_map(|tour| {
                tour.places.iter().filter_map(move |place| {
                    let center = place.location()?;
                    Some(Geofence {
                        place_id: place.id.clone(),
                        tour_id: tour.id.clone(),
                        center,
                        radius_m: place.effective_radius(config.default_radius_m, config.min_radius_m),
                        name: place.name.clone(),
                        blurb: place.blurb.clone(),
                        time: place.time.clone(),
                    })
                })
            })
            .collect();

        let envelopes: Vec<FenceEnvelope> = fences
            .iter()
            .enumerate()
            .flat_map(|(i, f)| FenceEnvelope::for_fence(i, f))
            .collect();

        Self {
            fences,
            index: RTree::bulk_load(envelopes),
        }
    }

    pub fn fences(&self) -> &[Geofence] {
        &self.fences
    }

    pub fn len(&self) -> usize {
        self.fences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fences.is_empty()
    }

    /// Fences belonging to one tour, in registry order.
    pub fn for_tour<'a>(&'a self, tour_id: &'a str) -> impl Iterator<Item = &'a Geofence> + 'a {
        self.fences.iter().filter(move |f| f.tour_id == tour_id)
    }

    /// Fences whose envelope contains `point`, in registry order.
    ///
    /// This is a coarse filter: callers still measure the true distance.
    pub fn candidates(&self, point: &Coordinate) -> Vec<&Geofence> {
        let probe = AABB::from_point([point.longitude, point.latitude]);
        let mut hits: Vec<usize> = self
            .index
            .locate_in_envelope_intersecting(&probe)
            .map(|e| e.index)
            .collect();
        hits.sort_unstable();
        // A fence near the antimeridian can match through both of its envelopes
        hits.dedup();
        hits.into_iter().map(|i| &self.fences[i]).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Place;

    fn sample_tours() -> Vec<Tour> {
        let mut ghost = Place::new("ghost", "No coords", Coordinate::new(0.0, 0.0));
        ghost.coordinate = None;
        vec![
            Tour::new(
                "t1",
                "Temple walk",
                vec![
                    Place::new("a", "A", Coordinate::new(12.9330, 77.5350)).with_radius(25.0),
                    ghost,
                    Place::new("b", "B", Coordinate::new(12.9340, 77.5350)),
                ],
            ),
            Tour::new(
                "t2",
                "Market walk",
                vec![Place::new("c", "C", Coordinate::new(12.9716, 77.5946)).with_radius(1.0)],
            ),
        ]
    }

    #[test]
    fn test_from_tours_skips_places_without_coordinates() {
        let registry = GeofenceRegistry::from_tours(&sample_tours(), &GeofenceConfig::default());
        let ids: Vec<&str> = registry.fences().iter().map(|f| f.place_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_radius_policy() {
        let registry = GeofenceRegistry::from_tours(&sample_tours(), &GeofenceConfig::default());
        let radii: Vec<f64> = registry.fences().iter().map(|f| f.radius_m).collect();
        assert_eq!(radii, vec![25.0, 30.0, 5.0]);
    }

    #[test]
    fn test_for_tour() {
        let registry = GeofenceRegistry::from_tours(&sample_tours(), &GeofenceConfig::default());
        assert_eq!(registry.for_tour("t1").count(), 2);
        assert_eq!(registry.for_tour("t2").count(), 1);
        assert_eq!(registry.for_tour("nope").count(), 0);
    }

    #[test]
    fn test_candidates_in_registry_order() {
        // a and b are ~111 m apart; a 100 m radius on both makes them overlap
        let tours = vec![Tour::new(
            "t",
            "T",
            vec![
                Place::new("b", "B", Coordinate::new(12.9340, 77.5350)).with_radius(100.0),
                Place::new("a", "A", Coordinate::new(12.9330, 77.5350)).with_radius(100.0),
            ],
        )];
        let registry = GeofenceRegistry::from_tours(&tours, &GeofenceConfig::default());
        let midpoint = Coordinate::new(12.9335, 77.5350);
        let ids: Vec<&str> = registry
            .candidates(&midpoint)
            .iter()
            .map(|f| f.place_id.as_str())
            .collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn test_candidates_cover_every_contained_point() {
        let registry = GeofenceRegistry::from_tours(&sample_tours(), &GeofenceConfig::default());
        let fence = &registry.fences()[0];
        for bearing in [0.0, 45.0, 90.0, 135.0, 180.0, 225.0, 270.0, 315.0] {
            let edge = crate::geo_utils::destination_point(&fence.center, fence.radius_m * 0.99, bearing);
            assert!(fence.contains(&edge));
            assert!(registry.candidates(&edge).iter().any(|f| f.place_id == fence.place_id));
        }
    }

    fn single_fence(center: Coordinate, radius_m: f64) -> GeofenceRegistry {
        let tours = vec![Tour::new(
            "t",
            "T",
            vec![Place::new("p", "P", center).with_radius(radius_m)],
        )];
        GeofenceRegistry::from_tours(&tours, &GeofenceConfig::default())
    }

    fn assert_candidate(registry: &GeofenceRegistry, point: Coordinate) {
        let fence = &registry.fences()[0];
        assert!(fence.contains(&point), "{:?} should be inside", point);
        let hits = registry.candidates(&point);
        assert_eq!(hits.len(), 1, "{:?} missed by the index", point);
        assert_eq!(hits[0].place_id, fence.place_id);
    }

    #[test]
    fn test_candidates_across_antimeridian() {
        // ~10.6 m apart on opposite sides of 180
        let registry = single_fence(Coordinate::new(-16.8, 179.99999), 30.0);
        assert_candidate(&registry, Coordinate::new(-16.8, -179.99991));
        assert_candidate(&registry, Coordinate::new(-16.8, 179.99990));

        let registry = single_fence(Coordinate::new(-16.8, -179.99999), 30.0);
        assert_candidate(&registry, Coordinate::new(-16.8, 179.99991));
    }

    #[test]
    fn test_candidates_at_high_latitude() {
        // Longitude degrees are ~1.9 km wide at 89N; 0.012 is ~23 m
        let registry = single_fence(Coordinate::new(89.0, 10.0), 30.0);
        assert_candidate(&registry, Coordinate::new(89.0, 10.012));
        assert_candidate(&registry, Coordinate::new(89.0, 9.988));
    }

    #[test]
    fn test_candidates_for_fence_over_a_pole() {
        // Opposite sides of the pole, ~22 m apart
        let registry = single_fence(Coordinate::new(89.9999, 10.0), 30.0);
        assert_candidate(&registry, Coordinate::new(89.9999, -170.0));
        assert!(registry.candidates(&Coordinate::new(80.0, -170.0)).is_empty());
    }

    #[test]
    fn test_candidates_far_away() {
        let registry = GeofenceRegistry::from_tours(&sample_tours(), &GeofenceConfig::default());
        assert!(registry.candidates(&Coordinate::new(51.5, -0.12)).is_empty());
    }

    #[test]
    fn test_empty_registry() {
        let registry = GeofenceRegistry::default();
        assert!(registry.is_empty());
        assert!(registry.candidates(&Coordinate::new(0.0, 0.0)).is_empty());
    }
}
