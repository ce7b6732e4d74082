//! Error types.
//!
//! Only [`NavError`] ever reaches a caller as an `Err`: it is returned by
//! [`Navigator::start`](crate::Navigator::start) when a tour cannot be
//! navigated. Sensor and routing errors are recovered where they happen and
//! exposed as state instead.

use thiserror::Error;

/// Failure reported by the platform location source.
#[derive(Debug, Clone, PartialEq, Error)]
#[cfg_attr(feature = "ffi", derive(uniffi::Error), uniffi(flat_error))]
pub enum SensorError {
    /// The user denied location access.
    #[error("location permission denied")]
    PermissionDenied,
    /// The device has no usable location capability.
    #[error("location unavailable: {0}")]
    Unavailable(String),
    /// No fix was received within the configured window.
    #[error("no location fix within {waited_ms} ms")]
    Timeout { waited_ms: u64 },
}

impl SensorError {
    /// Timeouts are transient; the subscription stays open and a fix may
    /// still arrive.
    pub fn is_transient(&self) -> bool {
        matches!(self, SensorError::Timeout { .. })
    }
}

/// Failure of the external directions service.
#[derive(Debug, Clone, PartialEq, Error)]
#[cfg_attr(feature = "ffi", derive(uniffi::Error), uniffi(flat_error))]
pub enum RoutingError {
    #[error("request error: {0}")]
    Network(String),
    #[error("HTTP {0}")]
    Status(u16),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("no route returned")]
    NoRoute,
    #[error("need at least 2 waypoints, got {0}")]
    TooFewWaypoints(usize),
}

/// Errors rejected synchronously by [`Navigator::start`](crate::Navigator::start).
#[derive(Debug, Clone, PartialEq, Error)]
#[cfg_attr(feature = "ffi", derive(uniffi::Error), uniffi(flat_error))]
pub enum NavError {
    #[error("unknown tour: {0}")]
    UnknownTour(String),
    /// A tour needs at least one stop plus an end point with coordinates.
    #[error("tour {tour_id} has {geolocated} geolocated stops; need at least one stop plus the end")]
    InvalidTourData { tour_id: String, geolocated: usize },
}
