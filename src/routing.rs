//! Route requests and result bookkeeping.
//!
//! The navigator never talks to the directions service itself. It hands out
//! [`RouteRequest`]s, the host (or [`crate::http::DirectionsClient`]) resolves
//! them at its own pace, and hands the outcome back through
//! [`RouteTracker::complete`]. Completions can arrive late and out of order;
//! the tracker decides which ones may still reach the map.
//!
//! ## Waypoint cap
//!
//! Directions APIs cap the number of waypoints per request (25 for Mapbox).
//! Longer lists are downsampled evenly, keeping the first and last points
//! exactly.

use log::{debug, warn};

use crate::session::RouteStats;
use crate::{Coordinate, RoutingError, TravelProfile};

/// Waypoint limit of the Mapbox Directions API.
pub const DEFAULT_MAX_WAYPOINTS: usize = 25;

/// A road-following route returned by a directions service.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "persist", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct Route {
    pub polyline: Vec<Coordinate>,
    pub distance_m: f64,
    pub duration_s: f64,
}

/// Identifies one route request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "persist", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct RouteTicket {
    /// Monotonic per tracker
    pub seq: u64,
    /// Session epoch the request was issued in
    pub epoch: u64,
    /// Timestamp of the sample that prompted the request
    pub issued_at_ms: u64,
}

/// A request for the directions service.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "persist", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct RouteRequest {
    pub ticket: RouteTicket,
    /// At most `max_waypoints` points, already downsampled
    pub waypoints: Vec<Coordinate>,
    pub profile: TravelProfile,
}

/// What the map should draw for a completed request.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "persist", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct RouteResult {
    pub ticket: RouteTicket,
    pub polyline: Vec<Coordinate>,
    /// `None` when the service failed and the straight line is shown
    pub stats: Option<RouteStats>,
    /// True when `polyline` is the straight-line waypoint sequence
    pub fallback: bool,
}

/// Reduce `points` to at most `max` points, evenly spaced by index.
///
/// The first and last points are always kept. Lists already within the cap
/// are returned unchanged.
///
/// # Example
/// ```
/// use tour_nav::routing::downsample_waypoints;
/// use tour_nav::Coordinate;
///
/// let points: Vec<Coordinate> = (0..30)
///     .map(|i| Coordinate::new(12.0 + i as f64 * 0.001, 77.0))
///     .collect();
/// let reduced = downsample_waypoints(&points, 25);
/// assert_eq!(reduced.len(), 25);
/// assert_eq!(reduced[0], points[0]);
/// assert_eq!(reduced[24], points[29]);
/// ```
pub fn downsample_waypoints(points: &[Coordinate], max: usize) -> Vec<Coordinate> {
    let max = max.max(2);
    let n = points.len();
    if n <= max {
        return points.to_vec();
    }

    let step = (n - 1) as f64 / (max - 1) as f64;
    let mut out: Vec<Coordinate> = (0..max)
        .map(|i| {
            let idx = ((i as f64 * step).round() as usize).min(n - 1);
            points[idx]
        })
        .collect();

    // i * step can round short of n - 1
    out[max - 1] = points[n - 1];
    out
}

/// Issues tickets and filters completions.
///
/// A completion is applied only when the session is still running, its
/// epoch is the current one, and no newer request has been applied yet.
#[derive(Debug)]
pub struct RouteTracker {
    max_waypoints: usize,
    next_seq: u64,
    last_applied_seq: Option<u64>,
    latest: Option<RouteResult>,
}

impl Default for RouteTracker {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_WAYPOINTS)
    }
}

impl RouteTracker {
    pub fn new(max_waypoints: usize) -> Self {
        Self {
            max_waypoints,
            next_seq: 0,
            last_applied_seq: None,
            latest: None,
        }
    }

    /// The last applied result.
    pub fn latest(&self) -> Option<&RouteResult> {
        self.latest.as_ref()
    }

    /// Forget the applied result (session stopped).
    pub fn reset(&mut self) {
        self.last_applied_seq = None;
        self.latest = None;
    }

    /// Create a request for `waypoints`, downsampled to the waypoint cap.
    pub fn issue(
        &mut self,
        waypoints: &[Coordinate],
        profile: TravelProfile,
        epoch: u64,
        now_ms: u64,
    ) -> Result<RouteRequest, RoutingError> {
        if waypoints.len() < 2 {
            return Err(RoutingError::TooFewWaypoints(waypoints.len()));
        }

        self.next_seq += 1;
        let ticket = RouteTicket {
            seq: self.next_seq,
            epoch,
            issued_at_ms: now_ms,
        };

        let reduced = downsample_waypoints(waypoints, self.max_waypoints);
        if reduced.len() < waypoints.len() {
            debug!(
                "[RouteTracker] Downsampled {} waypoints to {}",
                waypoints.len(),
                reduced.len()
            );
        }

        Ok(RouteRequest {
            ticket,
            waypoints: reduced,
            profile,
        })
    }

    /// Apply the outcome of `request`.
    ///
    /// Service failures fall back to the straight-line waypoint sequence
    /// with no stats. Returns `None` when the completion is stale.
    pub fn complete(
        &mut self,
        request: &RouteRequest,
        outcome: Result<Route, RoutingError>,
        current_epoch: u64,
        running: bool,
    ) -> Option<RouteResult> {
        let ticket = request.ticket;

        if !running {
            warn!("[RouteTracker] Discarding route #{}: session not running", ticket.seq);
            return None;
        }
        if ticket.epoch != current_epoch {
            warn!(
                "[RouteTracker] Discarding route #{}: epoch {} is no longer current ({})",
                ticket.seq, ticket.epoch, current_epoch
            );
            return None;
        }
        if let Some(applied) = self.last_applied_seq {
            if ticket.seq <= applied {
                warn!(
                    "[RouteTracker] Discarding route #{}: #{} already applied",
                    ticket.seq, applied
                );
                return None;
            }
        }

        let result = match outcome {
            Ok(route) if route.polyline.len() >= 2 => RouteResult {
                ticket,
                polyline: route.polyline,
                stats: Some(RouteStats {
                    distance_m: route.distance_m,
                    duration_s: route.duration_s,
                }),
                fallback: false,
            },
            Ok(_) => {
                warn!("[RouteTracker] Route #{} has no usable geometry, drawing straight line", ticket.seq);
                Self::straight_line(request)
            }
            Err(e) => {
                warn!("[RouteTracker] Route #{} failed ({}), drawing straight line", ticket.seq, e);
                Self::straight_line(request)
            }
        };

        self.last_applied_seq = Some(ticket.seq);
        self.latest = Some(result.clone());
        Some(result)
    }

    fn straight_line(request: &RouteRequest) -> RouteResult {
        RouteResult {
            ticket: request.ticket,
            polyline: request.waypoints.clone(),
            stats: None,
            fallback: true,
        }
    }
}
