//! Tour and place definitions.
//!
//! Tours are produced by the data layer and are read-only to the navigation
//! core. The only logic here is deciding which places a navigator can use
//! (those with valid coordinates) and in which order the route visits them.

use crate::{Coordinate, NavError};

/// Default geofence radius when a place does not set one.
pub const DEFAULT_GEOFENCE_RADIUS_M: f64 = 30.0;

/// Smallest geofence radius a place may have.
pub const MIN_GEOFENCE_RADIUS_M: f64 = 5.0;

/// What a place represents within its tour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "persist", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "persist", serde(rename_all = "snake_case"))]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum PlaceKind {
    Start,
    #[default]
    Place,
    End,
}

/// Mode of travel used when requesting directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "persist", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "persist", serde(rename_all = "snake_case"))]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum TravelProfile {
    #[default]
    Walking,
    Driving,
    Cycling,
}

impl TravelProfile {
    /// Profile name as used in directions API paths.
    pub fn as_str(&self) -> &'static str {
        match self {
            TravelProfile::Walking => "walking",
            TravelProfile::Driving => "driving",
            TravelProfile::Cycling => "cycling",
        }
    }
}

impl std::fmt::Display for TravelProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stop on a tour.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "persist", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct Place {
    /// Unique identifier across all loaded tours
    pub id: String,
    pub name: String,
    /// Location of the place; `None` for places the data layer could not geocode
    pub coordinate: Option<Coordinate>,
    /// Geofence radius in meters; [`DEFAULT_GEOFENCE_RADIUS_M`] when unset
    pub geofence_radius_m: Option<f64>,
    pub kind: PlaceKind,
    /// Short description shown in check-in prompts
    pub blurb: Option<String>,
    /// Time hint such as "09:30"
    pub time: Option<String>,
    pub image: Option<String>,
    pub tags: Vec<String>,
}

impl Place {
    /// Create a geolocated place of kind [`PlaceKind::Place`] with no metadata.
    pub fn new(id: &str, name: &str, coordinate: Coordinate) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            coordinate: Some(coordinate),
            geofence_radius_m: None,
            kind: PlaceKind::Place,
            blurb: None,
            time: None,
            image: None,
            tags: Vec::new(),
        }
    }

    pub fn with_kind(mut self, kind: PlaceKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_radius(mut self, radius_m: f64) -> Self {
        self.geofence_radius_m = Some(radius_m);
        self
    }

    pub fn with_blurb(mut self, blurb: &str) -> Self {
        self.blurb = Some(blurb.to_string());
        self
    }

    /// The coordinate, if present and inside valid WGS84 ranges.
    pub fn location(&self) -> Option<Coordinate> {
        self.coordinate.filter(|c| c.is_valid())
    }

    /// Geofence radius with the default applied and the minimum enforced.
    pub fn effective_radius(&self, default_m: f64, min_m: f64) -> f64 {
        let radius = self
            .geofence_radius_m
            .filter(|r| r.is_finite())
            .unwrap_or(default_m);
        radius.max(min_m)
    }
}

/// An ordered sequence of places.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "persist", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct Tour {
    pub id: String,
    pub title: String,
    pub places: Vec<Place>,
    /// Profile used when navigation is started without an explicit one
    pub default_profile: TravelProfile,
}

impl Tour {
    pub fn new(id: &str, title: &str, places: Vec<Place>) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            places,
            default_profile: TravelProfile::default(),
        }
    }

    /// Places with usable coordinates, in tour order.
    pub fn geolocated(&self) -> impl Iterator<Item = &Place> {
        self.places.iter().filter(|p| p.location().is_some())
    }

    /// Check that the tour can be navigated: at least one stop plus an end
    /// point must carry coordinates.
    pub fn validate(&self) -> Result<(), NavError> {
        let geolocated = self.geolocated().count();
        if geolocated < 2 {
            return Err(NavError::InvalidTourData {
                tour_id: self.id.clone(),
                geolocated,
            });
        }
        Ok(())
    }

    /// Geolocated places in route order: start, intermediate stops, end.
    ///
    /// The start is the first place tagged [`PlaceKind::Start`], otherwise the
    /// first geolocated place. The end is the first place tagged
    /// [`PlaceKind::End`], otherwise the last geolocated place (only when
    /// there are two or more). Everything else keeps its tour order in
    /// between.
    pub fn ordered_stops(&self) -> Vec<&Place> {
        let all: Vec<&Place> = self.geolocated().collect();
        if all.is_empty() {
            return all;
        }

        let start_idx = all
            .iter()
            .position(|p| p.kind == PlaceKind::Start)
            .unwrap_or(0);
        let end_idx = all
            .iter()
            .position(|p| p.kind == PlaceKind::End)
            .or(if all.len() > 1 { Some(all.len() - 1) } else { None })
            .filter(|&i| i != start_idx);

        let mut ordered = Vec::with_capacity(all.len());
        ordered.push(all[start_idx]);
        ordered.extend(
            all.iter()
                .enumerate()
                .filter(|(i, _)| *i != start_idx && Some(*i) != end_idx)
                .map(|(_, p)| *p),
        );
        if let Some(i) = end_idx {
            ordered.push(all[i]);
        }
        ordered
    }

    /// Coordinates of [`Tour::ordered_stops`].
    pub fn ordered_waypoints(&self) -> Vec<Coordinate> {
        self.ordered_stops()
            .iter()
            .filter_map(|p| p.location())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn place(id: &str, lat: f64, kind: PlaceKind) -> Place {
        Place::new(id, id, Coordinate::new(lat, 77.5350)).with_kind(kind)
    }

    #[test]
    fn test_effective_radius() {
        let p = place("a", 12.0, PlaceKind::Place);
        assert_eq!(p.effective_radius(30.0, 5.0), 30.0);
        assert_eq!(p.clone().with_radius(25.0).effective_radius(30.0, 5.0), 25.0);
        assert_eq!(p.clone().with_radius(2.0).effective_radius(30.0, 5.0), 5.0);
        assert_eq!(p.with_radius(f64::NAN).effective_radius(30.0, 5.0), 30.0);
    }

    #[test]
    fn test_validate_requires_two_geolocated() {
        let mut missing = place("b", 12.1, PlaceKind::End);
        missing.coordinate = None;
        let tour = Tour::new("t", "T", vec![place("a", 12.0, PlaceKind::Start), missing]);
        assert_eq!(
            tour.validate(),
            Err(NavError::InvalidTourData { tour_id: "t".into(), geolocated: 1 })
        );

        let ok = Tour::new(
            "t",
            "T",
            vec![place("a", 12.0, PlaceKind::Start), place("b", 12.1, PlaceKind::End)],
        );
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_out_of_range_coordinate_is_not_geolocated() {
        let bad = Place::new("x", "x", Coordinate::new(95.0, 0.0));
        assert!(bad.location().is_none());
    }

    #[test]
    fn test_ordered_stops_explicit_kinds() {
        let tour = Tour::new(
            "t",
            "T",
            vec![
                place("mid1", 12.1, PlaceKind::Place),
                place("end", 12.4, PlaceKind::End),
                place("start", 12.0, PlaceKind::Start),
                place("mid2", 12.2, PlaceKind::Place),
            ],
        );
        let ids: Vec<&str> = tour.ordered_stops().iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["start", "mid1", "mid2", "end"]);
    }

    #[test]
    fn test_ordered_stops_implicit_kinds() {
        let tour = Tour::new(
            "t",
            "T",
            vec![
                place("a", 12.0, PlaceKind::Place),
                place("b", 12.1, PlaceKind::Place),
                place("c", 12.2, PlaceKind::Place),
            ],
        );
        let ids: Vec<&str> = tour.ordered_stops().iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_ordered_stops_skips_places_without_coordinates() {
        let mut ghost = place("ghost", 12.3, PlaceKind::Place);
        ghost.coordinate = None;
        let tour = Tour::new(
            "t",
            "T",
            vec![place("a", 12.0, PlaceKind::Place), ghost, place("b", 12.1, PlaceKind::Place)],
        );
        assert_eq!(tour.ordered_waypoints().len(), 2);
    }

    #[test]
    fn test_ordered_stops_single_place() {
        let tour = Tour::new("t", "T", vec![place("only", 12.0, PlaceKind::End)]);
        let ids: Vec<&str> = tour.ordered_stops().iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["only"]);
    }

    #[test]
    fn test_profile_names() {
        assert_eq!(TravelProfile::Walking.as_str(), "walking");
        assert_eq!(TravelProfile::Driving.to_string(), "driving");
        assert_eq!(TravelProfile::default(), TravelProfile::Walking);
    }
}
