//! The navigation core.
//!
//! [`Navigator`] owns every component and routes platform callbacks through
//! them:
//!
//! ```text
//! on_location ─▶ PositionSampler ─▶ ProximityEngine ─▶ CheckinAggregator
//!                       │                  (every loaded tour's fences)
//!                       ├──────────▶ CameraFollower ─▶ Viewport
//!                       └──────────▶ RouteTracker   ─▶ RouteRequest
//! ```
//!
//! Everything runs synchronously on the caller's thread. The only deferred
//! work is the directions lookup: the host resolves the returned
//! [`RouteRequest`] and hands the outcome back through
//! [`Navigator::complete_route`].

use log::{debug, info, warn};

use crate::camera::{CameraConfig, CameraFollower, Viewport};
use crate::checkin::{Cluster, ResolvedCheckin, DEFAULT_MERGE_RADIUS_M};
use crate::routing::{Route, RouteRequest, RouteResult, RouteTracker, DEFAULT_MAX_WAYPOINTS};
use crate::sampler::{PositionSampler, SamplerConfig, SharedLocationSource};
use crate::session::{ListenerId, NavStatus, NavigationSession, RouteStats, SessionEvent, SessionSnapshot};
use crate::{
    CheckinAggregator, CheckinEvent, Coordinate, GeofenceConfig, GeofenceRegistry, NavError,
    PositionSample, ProximityEngine, RoutingError, SensorError, Tour, TravelProfile,
};

/// Configuration for [`Navigator`].
#[derive(Debug, Clone)]
#[cfg_attr(feature = "persist", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "persist", serde(default))]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct NavigatorConfig {
    pub sampler: SamplerConfig,
    pub geofence: GeofenceConfig,

    /// Check-ins closer than this to an open prompt join it.
    /// Default: 60.0 meters
    pub merge_radius_m: f64,

    pub camera: CameraConfig,

    /// Waypoint cap of the directions service.
    /// Default: 25
    pub max_waypoints: u32,
}

impl Default for NavigatorConfig {
    fn default() -> Self {
        Self {
            sampler: SamplerConfig::default(),
            geofence: GeofenceConfig::default(),
            merge_radius_m: DEFAULT_MERGE_RADIUS_M,
            camera: CameraConfig::default(),
            max_waypoints: DEFAULT_MAX_WAYPOINTS as u32,
        }
    }
}

#[cfg(feature = "persist")]
impl NavigatorConfig {
    /// Parse a config; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Everything one location fix produced.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct NavigationUpdate {
    /// Newly entered places, in registry order
    pub checkins: Vec<CheckinEvent>,
    /// Where the map should move, when following
    pub viewport: Option<Viewport>,
    /// Route from the live position, for the directions service
    pub route_request: Option<RouteRequest>,
}

impl NavigationUpdate {
    pub fn is_empty(&self) -> bool {
        self.checkins.is_empty() && self.viewport.is_none() && self.route_request.is_none()
    }
}

/// Live navigation over a set of tours.
///
/// # Example
/// ```
/// use tour_nav::{Coordinate, LocationSource, Navigator, NavigatorConfig, Place,
///     PositionSample, SensorError, SharedLocationSource, Tour, TravelProfile};
///
/// struct Gps;
/// impl LocationSource for Gps {
///     fn start_watch(&mut self, _high_accuracy: bool) -> Result<(), SensorError> { Ok(()) }
///     fn stop_watch(&mut self) {}
/// }
///
/// let gate = Coordinate::new(12.9330, 77.5350);
/// let tour = Tour::new("t1", "Temple walk", vec![
///     Place::new("gate", "Gate", gate),
///     Place::new("hall", "Hall", Coordinate::new(12.9350, 77.5360)),
/// ]);
///
/// let mut nav = Navigator::new(NavigatorConfig::default(), SharedLocationSource::new(Box::new(Gps)));
/// nav.load_tours(vec![tour]);
/// nav.start("t1", TravelProfile::Walking, 0).unwrap();
///
/// let update = nav.on_location(PositionSample::new(gate, 1_000));
/// assert_eq!(update.checkins.len(), 1);
/// assert_eq!(nav.clusters().len(), 1);
/// ```
#[derive(Debug)]
pub struct Navigator {
    tours: Vec<Tour>,
    geofence_config: GeofenceConfig,
    registry: GeofenceRegistry,
    session: NavigationSession,
    sampler: PositionSampler,
    proximity: ProximityEngine,
    checkins: CheckinAggregator,
    camera: CameraFollower,
    routes: RouteTracker,
    custom_origin: Option<Coordinate>,
}

impl Navigator {
    pub fn new(config: NavigatorConfig, source: SharedLocationSource) -> Self {
        Self {
            tours: Vec::new(),
            registry: GeofenceRegistry::default(),
            session: NavigationSession::new(),
            sampler: PositionSampler::new(config.sampler, source),
            proximity: ProximityEngine::new(),
            checkins: CheckinAggregator::new(config.merge_radius_m),
            camera: CameraFollower::new(config.camera),
            routes: RouteTracker::new(config.max_waypoints as usize),
            geofence_config: config.geofence,
            custom_origin: None,
        }
    }

    /// Replace the tour set and rebuild the geofences.
    pub fn load_tours(&mut self, tours: Vec<Tour>) {
        self.registry = GeofenceRegistry::from_tours(&tours, &self.geofence_config);
        info!(
            "[Navigator] Loaded {} tours, {} geofences",
            tours.len(),
            self.registry.len()
        );
        self.tours = tours;

        if let Some(active) = self.session.active_tour_id() {
            if self.find_tour(active).is_none() {
                warn!("[Navigator] Active tour {} is no longer loaded", active);
            }
        }
    }

    pub fn tours(&self) -> &[Tour] {
        &self.tours
    }

    pub fn registry(&self) -> &GeofenceRegistry {
        &self.registry
    }

    pub fn session(&self) -> &NavigationSession {
        &self.session
    }

    pub fn status(&self) -> NavStatus {
        self.session.status()
    }

    pub fn active_tour(&self) -> Option<&Tour> {
        self.session.active_tour_id().and_then(|id| self.find_tour(id))
    }

    pub fn last_stats(&self) -> Option<RouteStats> {
        self.session.last_stats()
    }

    /// Latest sensor error, if the live feed is degraded.
    pub fn sensor_error(&self) -> Option<&SensorError> {
        self.sampler.error()
    }

    pub fn is_following(&self) -> bool {
        self.camera.is_following()
    }

    fn find_tour(&self, tour_id: &str) -> Option<&Tour> {
        self.tours.iter().find(|t| t.id == tour_id)
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    /// Start navigating `tour_id`.
    ///
    /// Ignored unless idle. Refuses unknown tours and tours with fewer than
    /// two geolocated places. A sensor failure does not fail the start: it is
    /// reported through [`Navigator::sensor_error`] and a
    /// [`SessionEvent::SensorFault`].
    pub fn start(&mut self, tour_id: &str, profile: TravelProfile, now_ms: u64) -> Result<(), NavError> {
        if self.session.status() != NavStatus::Idle {
            debug!("[Navigator] start ignored in {:?}", self.session.status());
            return Ok(());
        }

        let tour = self
            .find_tour(tour_id)
            .ok_or_else(|| NavError::UnknownTour(tour_id.to_string()))?;
        tour.validate()?;

        self.proximity.reset();
        self.checkins.clear();
        self.routes.reset();
        self.camera.reset();

        self.session.start(tour_id, profile);
        self.camera.enable();
        self.start_sampling(now_ms);
        Ok(())
    }

    pub fn pause(&mut self) {
        if self.session.pause() {
            self.sampler.suspend();
            self.camera.disable();
        }
    }

    pub fn resume(&mut self, now_ms: u64) {
        if self.session.resume() {
            self.camera.enable();
            self.start_sampling(now_ms);
        }
    }

    /// Stop from any state, tearing down the location subscription.
    pub fn stop(&mut self) {
        if self.session.stop() {
            self.sampler.stop();
            self.proximity.reset();
            self.checkins.clear();
            self.routes.reset();
            self.camera.reset();
            self.custom_origin = None;
        }
    }

    fn start_sampling(&mut self, now_ms: u64) {
        if let Err(err) = self.sampler.start(now_ms) {
            self.session.emit(&SessionEvent::SensorFault(err));
        }
    }

    // ------------------------------------------------------------------
    // Platform callbacks
    // ------------------------------------------------------------------

    /// Process one raw fix from the platform.
    pub fn on_location(&mut self, raw: PositionSample) -> NavigationUpdate {
        if self.session.status() != NavStatus::Running {
            return NavigationUpdate::default();
        }
        let Some(sample) = self.sampler.offer(raw) else {
            return NavigationUpdate::default();
        };
        let Some(tour_id) = self.session.active_tour_id().map(str::to_string) else {
            return NavigationUpdate::default();
        };

        // Check-ins come from every loaded tour; the active one only drives routing
        let fences = self.registry.candidates(&sample.coordinate);
        let checkins = self.proximity.evaluate(&sample, fences);

        for event in &checkins {
            info!("[Navigator] Check-in at {} ({}m)", event.place_id, event.distance_at_trigger_m);
            self.checkins.push(event.clone());
            self.session.emit(&SessionEvent::CheckedIn(event.clone()));
        }

        let viewport = self.camera.update(&sample);
        let route_request = self.live_route_request(&tour_id, &sample);

        NavigationUpdate {
            checkins,
            viewport,
            route_request,
        }
    }

    /// The platform reported a location error.
    pub fn on_location_error(&mut self, err: SensorError) {
        if self.session.status() == NavStatus::Idle {
            debug!("[Navigator] Ignoring sensor error while idle: {}", err);
            return;
        }
        self.sampler.fail(err.clone());
        self.session.emit(&SessionEvent::SensorFault(err));
    }

    /// Periodic check for a missing fix. Returns the timeout when one is due.
    pub fn tick(&mut self, now_ms: u64) -> Option<SensorError> {
        let err = self.sampler.check_timeout(now_ms)?;
        self.session.emit(&SessionEvent::SensorFault(err.clone()));
        Some(err)
    }

    /// The user panned, zoomed or rotated the map.
    pub fn on_manual_interaction(&mut self) {
        self.camera.on_manual_interaction();
    }

    // ------------------------------------------------------------------
    // Routing
    // ------------------------------------------------------------------

    /// Route from a user-chosen point instead of the live position.
    pub fn set_custom_origin(&mut self, origin: Option<Coordinate>) {
        self.custom_origin = origin.filter(|c| c.is_valid());
    }

    pub fn custom_origin(&self) -> Option<Coordinate> {
        self.custom_origin
    }

    fn live_route_request(&mut self, tour_id: &str, sample: &PositionSample) -> Option<RouteRequest> {
        let tour = self.tours.iter().find(|t| t.id == tour_id)?;
        let origin = self.custom_origin.unwrap_or(sample.coordinate);

        let mut waypoints = vec![origin];
        waypoints.extend(tour.ordered_waypoints().into_iter().skip(1));

        self.issue(&waypoints, sample.timestamp_ms)
    }

    /// Request for the whole active tour, start to end.
    pub fn tour_route_request(&mut self, now_ms: u64) -> Option<RouteRequest> {
        let waypoints = self.active_tour()?.ordered_waypoints();
        self.issue(&waypoints, now_ms)
    }

    fn issue(&mut self, waypoints: &[Coordinate], now_ms: u64) -> Option<RouteRequest> {
        let profile = self.session.profile();
        match self.routes.issue(waypoints, profile, self.session.epoch(), now_ms) {
            Ok(request) => Some(request),
            Err(err) => {
                debug!("[Navigator] No route request: {}", err);
                None
            }
        }
    }

    /// Hand back the outcome of a [`RouteRequest`].
    ///
    /// Returns what the map should draw, or `None` when the result is stale.
    pub fn complete_route(
        &mut self,
        request: &RouteRequest,
        outcome: Result<Route, RoutingError>,
    ) -> Option<RouteResult> {
        let running = self.session.status() == NavStatus::Running;
        let result = self
            .routes
            .complete(request, outcome, self.session.epoch(), running)?;

        self.session.set_stats(result.stats);
        self.session.emit(&SessionEvent::RouteUpdated(result.clone()));
        Some(result)
    }

    pub fn latest_route(&self) -> Option<&RouteResult> {
        self.routes.latest()
    }

    // ------------------------------------------------------------------
    // Check-in prompts
    // ------------------------------------------------------------------

    pub fn clusters(&self) -> &[Cluster] {
        self.checkins.clusters()
    }

    pub fn history(&self) -> &[ResolvedCheckin] {
        self.checkins.history()
    }

    pub fn confirm(&mut self, place_id: &str) -> Option<CheckinEvent> {
        self.checkins.confirm(place_id)
    }

    pub fn dismiss(&mut self, place_id: &str) -> Option<CheckinEvent> {
        self.checkins.dismiss(place_id)
    }

    pub fn dismiss_cluster(&mut self, key: &str) -> Vec<CheckinEvent> {
        self.checkins.dismiss_cluster(key)
    }

    // ------------------------------------------------------------------
    // Events and snapshots
    // ------------------------------------------------------------------

    pub fn subscribe<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(&SessionEvent) + Send + 'static,
    {
        self.session.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.session.unsubscribe(id)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.session.snapshot()
    }

    /// Bring back a session saved with [`Navigator::snapshot`].
    ///
    /// Only applies while idle. A running snapshot comes back paused; call
    /// [`Navigator::resume`] to restart sampling.
    pub fn restore(&mut self, snapshot: SessionSnapshot) -> Result<(), NavError> {
        if self.session.status() != NavStatus::Idle {
            debug!("[Navigator] restore ignored in {:?}", self.session.status());
            return Ok(());
        }
        if let Some(tour_id) = &snapshot.active_tour_id {
            self.find_tour(tour_id)
                .ok_or_else(|| NavError::UnknownTour(tour_id.clone()))?
                .validate()?;
        }

        self.proximity.reset();
        self.checkins.clear();
        self.routes.reset();
        self.camera.reset();
        self.session.apply_snapshot(snapshot);
        Ok(())
    }
}
