//! # Tour Navigator
//!
//! Live navigation and geofencing core for guided tours.
//!
//! This library provides:
//! - A navigation session state machine (idle / running / paused)
//! - Throttled position sampling over a shared platform location watch
//! - At-most-once geofence check-ins, merged into nearby prompts
//! - A follow camera and route requests from the live position
//! - An optional Mapbox Directions client
//!
//! ## Features
//!
//! - **`http`** - Enable the directions client
//! - **`persist`** - Enable serde support and JSON config/snapshots
//! - **`ffi`** - Enable FFI bindings for mobile platforms (iOS/Android)
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use tour_nav::{Coordinate, LocationSource, Navigator, NavigatorConfig, Place,
//!     PositionSample, SensorError, SharedLocationSource, Tour, TravelProfile};
//!
//! struct Gps;
//! impl LocationSource for Gps {
//!     fn start_watch(&mut self, _high_accuracy: bool) -> Result<(), SensorError> { Ok(()) }
//!     fn stop_watch(&mut self) {}
//! }
//!
//! let tour = Tour::new("fort", "Fort walk", vec![
//!     Place::new("gate", "Main Gate", Coordinate::new(12.9330, 77.5350)),
//!     Place::new("tower", "Watch Tower", Coordinate::new(12.9362, 77.5371)),
//! ]);
//!
//! let mut nav = Navigator::new(NavigatorConfig::default(), SharedLocationSource::new(Box::new(Gps)));
//! nav.load_tours(vec![tour]);
//! nav.start("fort", TravelProfile::Walking, 0).unwrap();
//!
//! let update = nav.on_location(PositionSample::new(Coordinate::new(12.9330, 77.5350), 1_000));
//! for event in &update.checkins {
//!     println!("Arrived at {} ({}m)", event.name, event.distance_at_trigger_m);
//! }
//! ```

pub mod camera;
pub mod checkin;
pub mod error;
pub mod geo_utils;
pub mod geofence;
pub mod navigator;
pub mod proximity;
pub mod routing;
pub mod sampler;
pub mod session;
pub mod tour;

// HTTP module for directions lookups
#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "http")]
pub use http::DirectionsClient;

pub use camera::{CameraConfig, CameraFollower, Viewport};
pub use checkin::{CheckinAggregator, Cluster, PushOutcome, Resolution, ResolvedCheckin};
pub use error::{NavError, RoutingError, SensorError};
pub use geofence::{Geofence, GeofenceConfig, GeofenceRegistry};
pub use navigator::{NavigationUpdate, Navigator, NavigatorConfig};
pub use proximity::{CheckinEvent, ProximityEngine};
pub use routing::{Route, RouteRequest, RouteResult, RouteTicket, RouteTracker};
pub use sampler::{
    LocationSource, LocationSubscription, PositionSample, PositionSampler, SamplerConfig,
    SamplerState, SharedLocationSource,
};
pub use session::{ListenerId, NavStatus, NavigationSession, RouteStats, SessionEvent, SessionSnapshot};
pub use tour::{Place, PlaceKind, Tour, TravelProfile};

#[cfg(feature = "ffi")]
uniffi::setup_scaffolding!();

/// Initialize logging for Android (only used in FFI)
#[cfg(all(feature = "ffi", target_os = "android"))]
fn init_logging() {
    use android_logger::Config;
    use log::LevelFilter;

    android_logger::init_once(
        Config::default()
            .with_max_level(LevelFilter::Debug)
            .with_tag("TourNavRust"),
    );
}

#[cfg(all(feature = "ffi", not(target_os = "android")))]
fn init_logging() {
    // No-op on non-Android platforms
}

// ============================================================================
// Core Types
// ============================================================================

/// A WGS84 coordinate in degrees.
///
/// # Example
/// ```
/// use tour_nav::Coordinate;
/// let gate = Coordinate::new(12.9330, 77.5350);
/// assert!(gate.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "persist", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Check if the coordinate is finite and within lat/lng bounds.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

// ============================================================================
// FFI Exports (only when feature enabled)
// ============================================================================

#[cfg(feature = "ffi")]
mod ffi {
    use super::*;
    use log::{info, warn};
    use std::sync::{Arc, Mutex, MutexGuard};

    // ========================================================================
    // Platform location (implemented in Kotlin/Swift)
    // ========================================================================

    /// The platform's continuous location watch.
    ///
    /// Fixes and errors are pushed back through [`FfiNavigator::push_location`]
    /// and friends.
    #[uniffi::export(callback_interface)]
    pub trait PlatformLocation: Send + Sync {
        /// Begin watching. Return false if location permission is denied.
        fn start_watch(&self, high_accuracy: bool) -> bool;
        fn stop_watch(&self);
    }

    struct PlatformSource(Box<dyn PlatformLocation>);

    impl LocationSource for PlatformSource {
        fn start_watch(&mut self, high_accuracy: bool) -> Result<(), SensorError> {
            if self.0.start_watch(high_accuracy) {
                Ok(())
            } else {
                Err(SensorError::PermissionDenied)
            }
        }

        fn stop_watch(&mut self) {
            self.0.stop_watch();
        }
    }

    /// Process-wide location watch shared by every navigator.
    static SHARED_LOCATION: Mutex<Option<SharedLocationSource>> = Mutex::new(None);

    fn shared_location() -> MutexGuard<'static, Option<SharedLocationSource>> {
        SHARED_LOCATION.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Install the platform location watch. Call once at app startup.
    #[uniffi::export]
    pub fn set_platform_location(location: Box<dyn PlatformLocation>) {
        init_logging();
        let mut shared = shared_location();
        if shared.is_some() {
            warn!("[TourNavRust] Replacing platform location source");
        }
        *shared = Some(SharedLocationSource::new(Box::new(PlatformSource(location))));
    }

    // ========================================================================
    // Navigator object
    // ========================================================================

    #[derive(uniffi::Object)]
    pub struct FfiNavigator {
        inner: Mutex<Navigator>,
    }

    impl FfiNavigator {
        fn nav(&self) -> MutexGuard<'_, Navigator> {
            self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
        }
    }

    #[uniffi::export]
    impl FfiNavigator {
        /// Create a navigator on the shared platform watch.
        #[uniffi::constructor]
        pub fn new(config: NavigatorConfig) -> Result<Arc<Self>, SensorError> {
            init_logging();
            let source = shared_location().clone().ok_or_else(|| {
                SensorError::Unavailable("set_platform_location was not called".to_string())
            })?;
            info!("[TourNavRust] Navigator created");
            Ok(Arc::new(Self {
                inner: Mutex::new(Navigator::new(config, source)),
            }))
        }

        pub fn load_tours(&self, tours: Vec<Tour>) {
            self.nav().load_tours(tours);
        }

        pub fn start(&self, tour_id: String, profile: TravelProfile, now_ms: u64) -> Result<(), NavError> {
            self.nav().start(&tour_id, profile, now_ms)
        }

        pub fn pause(&self) {
            self.nav().pause();
        }

        pub fn resume(&self, now_ms: u64) {
            self.nav().resume(now_ms);
        }

        pub fn stop(&self) {
            self.nav().stop();
        }

        pub fn status(&self) -> NavStatus {
            self.nav().status()
        }

        pub fn push_location(&self, sample: PositionSample) -> NavigationUpdate {
            self.nav().on_location(sample)
        }

        pub fn push_permission_denied(&self) {
            self.nav().on_location_error(SensorError::PermissionDenied);
        }

        pub fn push_location_unavailable(&self, message: String) {
            self.nav().on_location_error(SensorError::Unavailable(message));
        }

        /// Returns a message when the fix timeout elapsed.
        pub fn tick(&self, now_ms: u64) -> Option<String> {
            self.nav().tick(now_ms).map(|e| e.to_string())
        }

        pub fn sensor_error(&self) -> Option<String> {
            self.nav().sensor_error().map(|e| e.to_string())
        }

        pub fn on_manual_interaction(&self) {
            self.nav().on_manual_interaction();
        }

        pub fn is_following(&self) -> bool {
            self.nav().is_following()
        }

        pub fn set_custom_origin(&self, origin: Option<Coordinate>) {
            self.nav().set_custom_origin(origin);
        }

        pub fn tour_route_request(&self, now_ms: u64) -> Option<RouteRequest> {
            self.nav().tour_route_request(now_ms)
        }

        /// Hand back a route; `None` means the directions lookup failed.
        pub fn complete_route(&self, request: RouteRequest, route: Option<Route>) -> Option<RouteResult> {
            let outcome = route.ok_or(RoutingError::NoRoute);
            self.nav().complete_route(&request, outcome)
        }

        pub fn last_stats(&self) -> Option<RouteStats> {
            self.nav().last_stats()
        }

        pub fn clusters(&self) -> Vec<Cluster> {
            self.nav().clusters().to_vec()
        }

        pub fn history(&self) -> Vec<ResolvedCheckin> {
            self.nav().history().to_vec()
        }

        pub fn confirm(&self, place_id: String) -> Option<CheckinEvent> {
            self.nav().confirm(&place_id)
        }

        pub fn dismiss(&self, place_id: String) -> Option<CheckinEvent> {
            self.nav().dismiss(&place_id)
        }

        pub fn dismiss_cluster(&self, key: String) -> Vec<CheckinEvent> {
            self.nav().dismiss_cluster(&key)
        }
    }

    #[cfg(feature = "http")]
    #[uniffi::export]
    impl FfiNavigator {
        /// Fetch the route from Mapbox and apply it. Blocks the calling thread.
        pub fn resolve_route(&self, access_token: String, request: RouteRequest) -> Option<RouteResult> {
            // The lock is only taken once the response is in
            let outcome = crate::http::fetch_route_sync(&access_token, &request);
            self.nav().complete_route(&request, outcome)
        }
    }

    // ========================================================================
    // Free functions
    // ========================================================================

    #[uniffi::export]
    pub fn default_navigator_config() -> NavigatorConfig {
        init_logging();
        NavigatorConfig::default()
    }

    #[uniffi::export]
    pub fn ffi_distance_meters(a: Coordinate, b: Coordinate) -> f64 {
        crate::geo_utils::haversine_distance(&a, &b)
    }

    /// Marker positions fanned around `center` for `count` overlapping places.
    #[uniffi::export]
    pub fn ffi_spread_offsets(center: Coordinate, count: u32) -> Vec<Coordinate> {
        crate::geo_utils::spread_offsets(&center, count as usize)
    }

    /// Geofences of the given tours, for drawing.
    #[uniffi::export]
    pub fn ffi_geofences(tours: Vec<Tour>, config: GeofenceConfig) -> Vec<Geofence> {
        GeofenceRegistry::from_tours(&tours, &config).fences().to_vec()
    }
}

// ============================================================================
// Tests
// ============================================================================
