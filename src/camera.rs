//! Follow camera.
//!
//! While navigation is running the map keeps the user centered, rotated to
//! their direction of travel. Any manual pan, zoom or rotate hands control
//! back to the user until the next start or resume.

use crate::geo_utils::{bearing_degrees, haversine_distance};
use crate::{Coordinate, PositionSample};

/// Camera parameters used while following.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "persist", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "persist", serde(default))]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct CameraConfig {
    /// Zoom level while following.
    /// Default: 17.5 (street level)
    pub follow_zoom: f64,

    /// Camera tilt in degrees while following.
    /// Default: 60.0
    pub follow_pitch: f64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            follow_zoom: 17.5,
            follow_pitch: 60.0,
        }
    }
}

/// Viewport requested from the map renderer.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "persist", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct Viewport {
    pub center: Coordinate,
    /// Map rotation in degrees, 0 = north up
    pub bearing: f64,
    pub zoom: f64,
    pub pitch: f64,
}

#[derive(Debug)]
pub struct CameraFollower {
    config: CameraConfig,
    following: bool,
    last_position: Option<Coordinate>,
    bearing: f64,
}

impl CameraFollower {
    pub fn new(config: CameraConfig) -> Self {
        Self {
            config,
            following: false,
            last_position: None,
            bearing: 0.0,
        }
    }

    pub fn is_following(&self) -> bool {
        self.following
    }

    /// Start following (on start or resume).
    pub fn enable(&mut self) {
        self.following = true;
    }

    /// Stop following (on pause or stop).
    pub fn disable(&mut self) {
        self.following = false;
    }

    /// The user moved the map by hand.
    pub fn on_manual_interaction(&mut self) {
        self.following = false;
    }

    /// Forget the last position and bearing (new session).
    pub fn reset(&mut self) {
        self.following = false;
        self.last_position = None;
        self.bearing = 0.0;
    }

    /// Viewport for a forwarded sample, or `None` when not following.
    ///
    /// The bearing is the device heading when reported, else the direction
    /// from the previous sample, else the previous bearing. The last position
    /// is tracked even while not following so the bearing is fresh when
    /// following resumes.
    pub fn update(&mut self, sample: &PositionSample) -> Option<Viewport> {
        let current = sample.coordinate;

        if let Some(heading) = sample.valid_heading() {
            self.bearing = heading;
        } else if let Some(last) = self.last_position {
            if haversine_distance(&last, &current) > 0.0 {
                self.bearing = bearing_degrees(&last, &current);
            }
        }
        self.last_position = Some(current);

        if !self.following {
            return None;
        }

        Some(Viewport {
            center: current,
            bearing: self.bearing,
            zoom: self.config.follow_zoom,
            pitch: self.config.follow_pitch,
        })
    }
}
