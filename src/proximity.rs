//! Proximity detection.
//!
//! Measures each forwarded position sample against the geofences and emits a
//! [`CheckinEvent`] the first time the user is inside one. A place that has
//! triggered stays triggered for the rest of the session, even if its prompt
//! was dismissed: a place is visited at most once per session.

use std::collections::HashSet;

use log::debug;

use crate::{Coordinate, Geofence, PositionSample};

/// The user entered a geofence.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "persist", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct CheckinEvent {
    pub place_id: String,
    pub tour_id: String,
    pub name: String,
    /// Center of the geofence that triggered
    pub coordinate: Coordinate,
    pub radius_m: f64,
    /// Distance from the sample to the center, rounded to whole meters
    pub distance_at_trigger_m: f64,
    /// Timestamp of the triggering sample
    pub timestamp_ms: u64,
    pub blurb: Option<String>,
    pub time: Option<String>,
}

/// At-most-once check-in detection.
#[derive(Debug, Default)]
pub struct ProximityEngine {
    triggered: HashSet<String>,
}

impl ProximityEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget every triggered place. Only called when a new session starts.
    pub fn reset(&mut self) {
        self.triggered.clear();
    }

    pub fn is_triggered(&self, place_id: &str) -> bool {
        self.triggered.contains(place_id)
    }

    pub fn triggered_count(&self) -> usize {
        self.triggered.len()
    }

    /// Evaluate one sample against `fences`, in the order given.
    ///
    /// Returns one event per newly entered geofence.
    ///
    /// # Example
    /// ```
    /// use tour_nav::{Coordinate, GeofenceConfig, GeofenceRegistry, Place, PositionSample,
    ///     ProximityEngine, Tour};
    ///
    /// let center = Coordinate::new(12.9330, 77.5350);
    /// let tour = Tour::new("t1", "Temple", vec![Place::new("p1", "Gate", center).with_radius(25.0)]);
    /// let registry = GeofenceRegistry::from_tours(&[tour], &GeofenceConfig::default());
    ///
    /// let mut engine = ProximityEngine::new();
    /// let sample = PositionSample::new(center, 1_000);
    ///
    /// let events = engine.evaluate(&sample, registry.fences());
    /// assert_eq!(events.len(), 1);
    /// assert_eq!(events[0].distance_at_trigger_m, 0.0);
    ///
    /// // Visited once per session
    /// assert!(engine.evaluate(&sample, registry.fences()).is_empty());
    /// ```
    pub fn evaluate<'a, I>(&mut self, sample: &PositionSample, fences: I) -> Vec<CheckinEvent>
    where
        I: IntoIterator<Item = &'a Geofence>,
    {
        let mut events = Vec::new();

        for fence in fences {
            if self.triggered.contains(&fence.place_id) {
                continue;
            }

            if !fence.contains(&sample.coordinate) {
                continue;
            }
            let distance = fence.distance_to(&sample.coordinate);

            self.triggered.insert(fence.place_id.clone());
            debug!(
                "[ProximityEngine] Entered {} ({:.1}m from center, radius {}m)",
                fence.place_id, distance, fence.radius_m
            );

            events.push(CheckinEvent {
                place_id: fence.place_id.clone(),
                tour_id: fence.tour_id.clone(),
                name: fence.name.clone(),
                coordinate: fence.center,
                radius_m: fence.radius_m,
                distance_at_trigger_m: distance.round(),
                timestamp_ms: sample.timestamp_ms,
                blurb: fence.blurb.clone(),
                time: fence.time.clone(),
            });
        }

        events
    }
}
