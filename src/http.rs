//! Directions client for the Mapbox Directions API.
//!
//! Resolves a [`RouteRequest`] into a road-following [`Route`]:
//! - Waypoints are capped at the API limit before the URL is built
//! - Automatic retry with exponential backoff on 429
//! - Short retry on connection errors
//!
//! Failures come back as [`RoutingError`]; hand them to
//! [`Navigator::complete_route`](crate::Navigator::complete_route), which
//! falls back to the straight-line waypoints.

use log::{debug, info, warn};
use reqwest::Client;
use serde::Deserialize;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use crate::routing::{downsample_waypoints, Route, RouteRequest, DEFAULT_MAX_WAYPOINTS};
use crate::{Coordinate, RoutingError, TravelProfile};

pub const DEFAULT_BASE_URL: &str = "https://api.mapbox.com";

const MAX_RETRIES: u32 = 3;

#[derive(Debug, Deserialize)]
struct DirectionsResponse {
    #[serde(default)]
    routes: Vec<ApiRoute>,
    code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiRoute {
    geometry: ApiGeometry,
    distance: f64,
    duration: f64,
}

#[derive(Debug, Deserialize)]
struct ApiGeometry {
    /// `[lng, lat]` pairs
    coordinates: Vec<[f64; 2]>,
}

/// Build the directions URL for `waypoints`.
pub fn directions_url(
    base_url: &str,
    access_token: &str,
    waypoints: &[Coordinate],
    profile: TravelProfile,
) -> String {
    let coords = waypoints
        .iter()
        .map(|c| format!("{},{}", c.longitude, c.latitude))
        .collect::<Vec<_>>()
        .join(";");

    format!(
        "{}/directions/v5/mapbox/{}/{}?alternatives=false&geometries=geojson&overview=full&access_token={}",
        base_url.trim_end_matches('/'),
        profile.as_str(),
        coords,
        access_token
    )
}

/// Parse a directions response body. Only the first route is used.
pub fn parse_directions_response(body: &[u8]) -> Result<Route, RoutingError> {
    let data: DirectionsResponse =
        serde_json::from_slice(body).map_err(|e| RoutingError::Malformed(e.to_string()))?;

    let Some(route) = data.routes.into_iter().next() else {
        debug!("[Directions] No routes (code {:?})", data.code);
        return Err(RoutingError::NoRoute);
    };

    let polyline: Vec<Coordinate> = route
        .geometry
        .coordinates
        .into_iter()
        .map(|[lng, lat]| Coordinate::new(lat, lng))
        .filter(|c| c.is_valid())
        .collect();

    if polyline.len() < 2 {
        return Err(RoutingError::Malformed(format!(
            "route geometry has {} usable points",
            polyline.len()
        )));
    }

    Ok(Route {
        polyline,
        distance_m: route.distance,
        duration_s: route.duration,
    })
}

/// Tracks consecutive 429s so that repeated throttling backs off further.
#[derive(Debug, Default)]
struct Backoff {
    consecutive_429s: AtomicU32,
}

impl Backoff {
    fn record_success(&self) {
        self.consecutive_429s.store(0, Ordering::Relaxed);
    }

    fn record_429(&self) -> Duration {
        let count = self.consecutive_429s.fetch_add(1, Ordering::Relaxed) + 1;
        // 1s, 2s, 4s max
        let backoff = Duration::from_millis(500 * (1 << count.min(3)));
        warn!("[Directions] Got 429! Consecutive: {}, backing off {:?}", count, backoff);
        backoff
    }
}

/// Async client for the directions service.
#[derive(Debug)]
pub struct DirectionsClient {
    client: Client,
    base_url: String,
    access_token: String,
    backoff: Backoff,
}

impl DirectionsClient {
    /// Client for the public Mapbox endpoint.
    pub fn new(access_token: &str) -> Result<Self, RoutingError> {
        Self::with_base_url(DEFAULT_BASE_URL, access_token)
    }

    /// Client for a self-hosted or proxied endpoint.
    pub fn with_base_url(base_url: &str, access_token: &str) -> Result<Self, RoutingError> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .tcp_keepalive(Duration::from_secs(30))
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| RoutingError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.to_string(),
            access_token: access_token.to_string(),
            backoff: Backoff::default(),
        })
    }

    /// Resolve a request issued by the navigator.
    pub async fn resolve(&self, request: &RouteRequest) -> Result<Route, RoutingError> {
        debug!("[Directions] Resolving route #{}", request.ticket.seq);
        self.fetch_route(&request.waypoints, request.profile).await
    }

    /// Fetch a route through `waypoints`.
    pub async fn fetch_route(
        &self,
        waypoints: &[Coordinate],
        profile: TravelProfile,
    ) -> Result<Route, RoutingError> {
        if waypoints.len() < 2 {
            return Err(RoutingError::TooFewWaypoints(waypoints.len()));
        }
        let waypoints = downsample_waypoints(waypoints, DEFAULT_MAX_WAYPOINTS);
        let url = directions_url(&self.base_url, &self.access_token, &waypoints, profile);

        let mut retries = 0;
        let req_start = Instant::now();

        loop {
            match self.client.get(&url).send().await {
                Ok(resp) => {
                    let status = resp.status();

                    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                        retries += 1;
                        if retries > MAX_RETRIES {
                            return Err(RoutingError::Status(status.as_u16()));
                        }
                        let wait = self.backoff.record_429();
                        tokio::time::sleep(wait).await;
                        continue;
                    }

                    self.backoff.record_success();

                    if !status.is_success() {
                        warn!("[Directions] HTTP {}", status);
                        return Err(RoutingError::Status(status.as_u16()));
                    }

                    let bytes = resp
                        .bytes()
                        .await
                        .map_err(|e| RoutingError::Network(format!("Body download error: {}", e)))?;

                    let route = parse_directions_response(&bytes)?;
                    info!(
                        "[Directions] {} waypoints ({}) -> {} points, {:.0}m, {:.0}s in {:?}",
                        waypoints.len(),
                        profile,
                        route.polyline.len(),
                        route.distance_m,
                        route.duration_s,
                        req_start.elapsed()
                    );
                    return Ok(route);
                }
                Err(e) => {
                    retries += 1;
                    if retries > MAX_RETRIES {
                        return Err(RoutingError::Network(e.to_string()));
                    }

                    let wait = Duration::from_millis(200 * (1 << retries));
                    warn!("[Directions] Error: {}, retry {} after {:?}", e, retries, wait);
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }
}

/// Synchronous wrapper for FFI - runs the async client on a tokio runtime
#[cfg(feature = "ffi")]
pub fn fetch_route_sync(access_token: &str, request: &RouteRequest) -> Result<Route, RoutingError> {
    use tokio::runtime::Builder;

    let rt = Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .map_err(|e| RoutingError::Network(format!("Runtime error: {}", e)))?;

    let client = DirectionsClient::new(access_token)?;
    rt.block_on(client.resolve(request))
}

#[cfg(test)]
mod tests {
    use super::*;

    const OK_BODY: &str = r#"{
        "code": "Ok",
        "routes": [{
            "geometry": { "type": "LineString", "coordinates": [[77.5350, 12.9330], [77.5355, 12.9335], [77.5360, 12.9350]] },
            "distance": 412.7,
            "duration": 301.2
        }],
        "waypoints": []
    }"#;

    #[test]
    fn test_parse_route() {
        let route = parse_directions_response(OK_BODY.as_bytes()).unwrap();
        assert_eq!(route.polyline.len(), 3);
        // [lng, lat] on the wire
        assert_eq!(route.polyline[0], Coordinate::new(12.9330, 77.5350));
        assert_eq!(route.distance_m, 412.7);
        assert_eq!(route.duration_s, 301.2);
    }

    #[test]
    fn test_parse_zero_routes() {
        let body = br#"{ "code": "NoRoute", "routes": [] }"#;
        assert_eq!(parse_directions_response(body), Err(RoutingError::NoRoute));
        assert_eq!(parse_directions_response(br#"{ "code": "NoSegment" }"#), Err(RoutingError::NoRoute));
    }

    #[test]
    fn test_parse_malformed() {
        assert!(matches!(
            parse_directions_response(b"<html>oops</html>"),
            Err(RoutingError::Malformed(_))
        ));

        let one_point = br#"{ "routes": [{ "geometry": { "coordinates": [[77.5, 12.9]] }, "distance": 0, "duration": 0 }] }"#;
        assert!(matches!(parse_directions_response(one_point), Err(RoutingError::Malformed(_))));
    }

    #[test]
    fn test_directions_url() {
        let url = directions_url(
            "https://api.mapbox.com/",
            "tok",
            &[Coordinate::new(12.933, 77.535), Coordinate::new(12.935, 77.536)],
            TravelProfile::Cycling,
        );
        assert_eq!(
            url,
            "https://api.mapbox.com/directions/v5/mapbox/cycling/77.535,12.933;77.536,12.935\
             ?alternatives=false&geometries=geojson&overview=full&access_token=tok"
        );
    }

    #[test]
    fn test_backoff_grows_and_resets() {
        let backoff = Backoff::default();
        assert_eq!(backoff.record_429(), Duration::from_millis(1000));
        assert_eq!(backoff.record_429(), Duration::from_millis(2000));
        assert_eq!(backoff.record_429(), Duration::from_millis(4000));
        assert_eq!(backoff.record_429(), Duration::from_millis(4000));

        backoff.record_success();
        assert_eq!(backoff.record_429(), Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn test_too_few_waypoints() {
        let client = DirectionsClient::new("tok").unwrap();
        let err = client
            .fetch_route(&[Coordinate::new(12.933, 77.535)], TravelProfile::Walking)
            .await
            .unwrap_err();
        assert_eq!(err, RoutingError::TooFewWaypoints(1));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_error() {
        // Port 9 (discard) is closed on test machines
        let client = DirectionsClient::with_base_url("http://127.0.0.1:9", "tok").unwrap();
        let err = client
            .fetch_route(
                &[Coordinate::new(12.933, 77.535), Coordinate::new(12.935, 77.536)],
                TravelProfile::Walking,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RoutingError::Network(_)));
    }
}
