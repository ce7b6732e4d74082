//! Position sampling.
//!
//! Wraps the platform's continuous location stream and turns it into a
//! rate-limited sequence of [`PositionSample`]s:
//!
//! - The platform watch is shared process-wide through [`SharedLocationSource`];
//!   every navigator holds a [`LocationSubscription`] guard and the watch is
//!   only running while at least one guard is alive.
//! - [`PositionSampler`] decides which raw fixes are forwarded downstream. A fix
//!   passes when at least `min_interval_ms` elapsed since the last forwarded
//!   sample, or when it moved more than `min_distance_m` from it.
//! - Sensor errors stop the sampler and are kept as state. Nothing retries on
//!   its own; the user has to start navigation again.

use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, info, warn};

use crate::geo_utils::haversine_distance;
use crate::{Coordinate, SensorError};

/// One fix from the platform location stream.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "persist", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct PositionSample {
    pub coordinate: Coordinate,
    /// Compass heading in degrees, when the device reports one
    pub heading: Option<f64>,
    /// Horizontal accuracy in meters, when the device reports one
    pub accuracy_m: Option<f64>,
    /// Platform timestamp in milliseconds. Only compared with other fixes,
    /// never with the host clock.
    pub timestamp_ms: u64,
}

impl PositionSample {
    pub fn new(coordinate: Coordinate, timestamp_ms: u64) -> Self {
        Self {
            coordinate,
            heading: None,
            accuracy_m: None,
            timestamp_ms,
        }
    }

    pub fn with_heading(mut self, heading: f64) -> Self {
        self.heading = Some(heading);
        self
    }

    /// Heading normalised to `[0, 360)`, if present and finite.
    pub fn valid_heading(&self) -> Option<f64> {
        self.heading
            .filter(|h| h.is_finite())
            .map(|h| h.rem_euclid(360.0))
    }
}

/// Throttle and timeout settings for [`PositionSampler`].
#[derive(Debug, Clone)]
#[cfg_attr(feature = "persist", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "persist", serde(default))]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct SamplerConfig {
    /// Minimum time between forwarded samples.
    /// Default: 5000 ms
    pub min_interval_ms: u64,

    /// A sample that moved further than this from the last forwarded one is
    /// forwarded regardless of time.
    /// Default: 30.0 meters
    pub min_distance_m: f64,

    /// How long to wait for a fix before reporting [`SensorError::Timeout`].
    /// Default: 10000 ms
    pub fix_timeout_ms: u64,

    /// Ask the platform for high-accuracy (GPS) mode.
    /// Default: true
    pub high_accuracy: bool,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 5000,
            min_distance_m: 30.0,
            fix_timeout_ms: 10_000,
            high_accuracy: true,
        }
    }
}

// ============================================================================
// Platform location source
// ============================================================================

/// The platform primitive behind the position stream.
///
/// Implementations register a continuous watch with the OS; fixes and errors
/// are delivered back through [`Navigator::on_location`](crate::Navigator::on_location)
/// and [`Navigator::on_location_error`](crate::Navigator::on_location_error).
pub trait LocationSource: Send {
    fn start_watch(&mut self, high_accuracy: bool) -> Result<(), SensorError>;
    fn stop_watch(&mut self);
}

struct SharedInner {
    source: Box<dyn LocationSource>,
    subscribers: usize,
}

/// Reference-counted handle to the single platform location watch.
///
/// Clones share the same watch. The first [`acquire`](Self::acquire) starts
/// it; dropping the last [`LocationSubscription`] stops it.
#[derive(Clone)]
pub struct SharedLocationSource {
    inner: Arc<Mutex<SharedInner>>,
}

impl SharedLocationSource {
    pub fn new(source: Box<dyn LocationSource>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SharedInner {
                source,
                subscribers: 0,
            })),
        }
    }

    fn lock(inner: &Mutex<SharedInner>) -> MutexGuard<'_, SharedInner> {
        // A panic while holding the lock leaves the counter consistent
        inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Join the shared watch, starting it if nobody else holds it.
    pub fn acquire(&self, high_accuracy: bool) -> Result<LocationSubscription, SensorError> {
        let mut inner = Self::lock(&self.inner);
        if inner.subscribers == 0 {
            inner.source.start_watch(high_accuracy)?;
            info!("[LocationSource] Platform watch started");
        }
        inner.subscribers += 1;
        debug!("[LocationSource] {} active subscriber(s)", inner.subscribers);

        Ok(LocationSubscription {
            inner: Arc::clone(&self.inner),
        })
    }

    /// Number of live [`LocationSubscription`] guards.
    pub fn active_subscribers(&self) -> usize {
        Self::lock(&self.inner).subscribers
    }
}

impl std::fmt::Debug for SharedLocationSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedLocationSource")
            .field("subscribers", &self.active_subscribers())
            .finish()
    }
}

/// Guard keeping the shared platform watch alive.
pub struct LocationSubscription {
    inner: Arc<Mutex<SharedInner>>,
}

impl Drop for LocationSubscription {
    fn drop(&mut self) {
        let mut inner = SharedLocationSource::lock(&self.inner);
        inner.subscribers = inner.subscribers.saturating_sub(1);
        if inner.subscribers == 0 {
            inner.source.stop_watch();
            info!("[LocationSource] Platform watch stopped");
        }
    }
}

impl std::fmt::Debug for LocationSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("LocationSubscription")
    }
}

// ============================================================================
// Sampler
// ============================================================================

/// Lifecycle of a [`PositionSampler`].
#[derive(Debug, Clone, PartialEq)]
pub enum SamplerState {
    /// No subscription.
    Stopped,
    /// Subscribed and forwarding throttled samples.
    Forwarding,
    /// Subscribed, but every fix is dropped.
    Suspended,
    /// The sensor reported an error. Permanent errors also drop the
    /// subscription; a timeout keeps it.
    Failed(SensorError),
}

/// Rate-limits the platform stream into the samples the navigator acts on.
#[derive(Debug)]
pub struct PositionSampler {
    config: SamplerConfig,
    source: SharedLocationSource,
    subscription: Option<LocationSubscription>,
    forwarding: bool,
    last_forwarded: Option<PositionSample>,
    /// Host time at which the current wait for a fix began
    waiting_since_ms: Option<u64>,
    /// A raw fix arrived since the last timeout check
    fix_seen: bool,
    error: Option<SensorError>,
}

impl PositionSampler {
    pub fn new(config: SamplerConfig, source: SharedLocationSource) -> Self {
        Self {
            config,
            source,
            subscription: None,
            forwarding: false,
            last_forwarded: None,
            waiting_since_ms: None,
            fix_seen: false,
            error: None,
        }
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    pub fn state(&self) -> SamplerState {
        match (&self.error, &self.subscription, self.forwarding) {
            (Some(err), _, _) => SamplerState::Failed(err.clone()),
            (None, None, _) => SamplerState::Stopped,
            (None, Some(_), true) => SamplerState::Forwarding,
            (None, Some(_), false) => SamplerState::Suspended,
        }
    }

    /// Last error reported by the sensor, if any.
    pub fn error(&self) -> Option<&SensorError> {
        self.error.as_ref()
    }

    pub fn last_forwarded(&self) -> Option<&PositionSample> {
        self.last_forwarded.as_ref()
    }

    /// Subscribe (if needed) and begin forwarding.
    ///
    /// Clears any previous error. On failure the sampler records the error and
    /// stays stopped.
    pub fn start(&mut self, now_ms: u64) -> Result<(), SensorError> {
        self.error = None;
        if self.subscription.is_none() {
            match self.source.acquire(self.config.high_accuracy) {
                Ok(sub) => self.subscription = Some(sub),
                Err(err) => {
                    warn!("[PositionSampler] Could not start location watch: {}", err);
                    self.error = Some(err.clone());
                    self.forwarding = false;
                    return Err(err);
                }
            }
        }
        self.forwarding = true;
        self.waiting_since_ms = Some(now_ms);
        self.fix_seen = false;
        info!("[PositionSampler] Forwarding samples");
        Ok(())
    }

    /// Stop forwarding but keep the subscription, so resuming does not pay
    /// the fix reacquisition latency.
    pub fn suspend(&mut self) {
        if self.forwarding {
            self.forwarding = false;
            self.waiting_since_ms = None;
            info!("[PositionSampler] Suspended");
        }
    }

    /// Tear the subscription down and forget all throttle state.
    pub fn stop(&mut self) {
        self.forwarding = false;
        self.subscription = None;
        self.last_forwarded = None;
        self.waiting_since_ms = None;
        self.fix_seen = false;
        self.error = None;
    }

    /// Offer a raw fix. Returns the sample if it should be processed.
    pub fn offer(&mut self, sample: PositionSample) -> Option<PositionSample> {
        if !self.forwarding {
            return None;
        }
        if !sample.coordinate.is_valid() {
            debug!("[PositionSampler] Dropping invalid fix {:?}", sample.coordinate);
            return None;
        }

        self.fix_seen = true;
        if self.error.as_ref().is_some_and(|e| e.is_transient()) {
            self.error = None;
        }

        if let Some(last) = &self.last_forwarded {
            if sample.timestamp_ms < last.timestamp_ms {
                debug!(
                    "[PositionSampler] Dropping out-of-order fix ({} < {})",
                    sample.timestamp_ms, last.timestamp_ms
                );
                return None;
            }

            let elapsed = sample.timestamp_ms - last.timestamp_ms;
            let moved = haversine_distance(&last.coordinate, &sample.coordinate);
            if elapsed < self.config.min_interval_ms && moved <= self.config.min_distance_m {
                debug!(
                    "[PositionSampler] Throttled: {}ms since last, moved {:.1}m",
                    elapsed, moved
                );
                return None;
            }
        }

        self.last_forwarded = Some(sample);
        Some(sample)
    }

    /// Record a sensor failure and stop.
    ///
    /// Timeouts are transient and leave the subscription in place.
    pub fn fail(&mut self, err: SensorError) {
        warn!("[PositionSampler] Sensor error: {}", err);
        if !err.is_transient() {
            self.forwarding = false;
            self.subscription = None;
            self.waiting_since_ms = None;
        }
        self.error = Some(err);
    }

    /// Report a timeout if forwarding and no fix arrived for `fix_timeout_ms`.
    ///
    /// `now_ms` is the host clock, the same one passed to [`start`](Self::start).
    /// Fix timestamps come from the platform and are never compared against
    /// it: a fix restarts the wait at the next check instead. Each wait is
    /// reported once; the clock restarts after reporting.
    pub fn check_timeout(&mut self, now_ms: u64) -> Option<SensorError> {
        if !self.forwarding {
            return None;
        }
        if std::mem::take(&mut self.fix_seen) {
            self.waiting_since_ms = Some(now_ms);
            return None;
        }
        let since = self.waiting_since_ms?;
        let waited_ms = now_ms.saturating_sub(since);
        if waited_ms < self.config.fix_timeout_ms {
            return None;
        }

        self.waiting_since_ms = Some(now_ms);
        let err = SensorError::Timeout { waited_ms };
        self.fail(err.clone());
        Some(err)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Location source that counts start/stop calls.
    #[derive(Default, Clone)]
    pub(crate) struct FakeSource {
        pub starts: Arc<AtomicU32>,
        pub stops: Arc<AtomicU32>,
        pub deny: bool,
    }

    impl LocationSource for FakeSource {
        fn start_watch(&mut self, _high_accuracy: bool) -> Result<(), SensorError> {
            if self.deny {
                return Err(SensorError::PermissionDenied);
            }
            self.starts.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }

        fn stop_watch(&mut self) {
            self.stops.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn sampler() -> (PositionSampler, FakeSource) {
        let fake = FakeSource::default();
        let source = SharedLocationSource::new(Box::new(fake.clone()));
        (PositionSampler::new(SamplerConfig::default(), source), fake)
    }

    fn fix(lat: f64, ts: u64) -> PositionSample {
        PositionSample::new(Coordinate::new(lat, 77.5350), ts)
    }

    #[test]
    fn test_nothing_forwarded_before_start() {
        let (mut s, _) = sampler();
        assert_eq!(s.state(), SamplerState::Stopped);
        assert!(s.offer(fix(12.9330, 0)).is_none());
    }

    #[test]
    fn test_burst_only_first_forwarded() {
        let (mut s, _) = sampler();
        s.start(0).unwrap();

        // ~1 m steps every 500 ms: below both thresholds
        let forwarded: Vec<_> = (0..8)
            .filter_map(|i| s.offer(fix(12.9330 + i as f64 * 0.00001, 1000 + i * 500)))
            .collect();

        assert_eq!(forwarded.len(), 1);
        assert_eq!(forwarded[0].timestamp_ms, 1000);
    }

    #[test]
    fn test_forwarded_after_interval() {
        let (mut s, _) = sampler();
        s.start(0).unwrap();
        assert!(s.offer(fix(12.9330, 1000)).is_some());
        assert!(s.offer(fix(12.9330, 5999)).is_none());
        assert!(s.offer(fix(12.9330, 6000)).is_some());
    }

    #[test]
    fn test_forwarded_after_large_jump() {
        let (mut s, _) = sampler();
        s.start(0).unwrap();
        assert!(s.offer(fix(12.9330, 1000)).is_some());
        // ~44 m north, 100 ms later
        assert!(s.offer(fix(12.9334, 1100)).is_some());
    }

    #[test]
    fn test_out_of_order_fix_dropped() {
        let (mut s, _) = sampler();
        s.start(0).unwrap();
        assert!(s.offer(fix(12.9330, 10_000)).is_some());
        assert!(s.offer(fix(12.9400, 9_000)).is_none());
    }

    #[test]
    fn test_invalid_fix_dropped() {
        let (mut s, _) = sampler();
        s.start(0).unwrap();
        assert!(s.offer(fix(f64::NAN, 1000)).is_none());
        assert!(s.last_forwarded().is_none());
    }

    #[test]
    fn test_suspend_keeps_subscription() {
        let (mut s, fake) = sampler();
        s.start(0).unwrap();
        s.suspend();
        assert_eq!(s.state(), SamplerState::Suspended);
        assert!(s.offer(fix(12.9330, 1000)).is_none());
        assert_eq!(fake.stops.load(Ordering::Relaxed), 0);

        s.start(2000).unwrap();
        assert_eq!(fake.starts.load(Ordering::Relaxed), 1);
        assert!(s.offer(fix(12.9330, 3000)).is_some());
    }

    #[test]
    fn test_stop_tears_down_watch() {
        let (mut s, fake) = sampler();
        s.start(0).unwrap();
        s.stop();
        assert_eq!(s.state(), SamplerState::Stopped);
        assert_eq!(fake.stops.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_permission_denied_fails_without_panic() {
        let fake = FakeSource { deny: true, ..Default::default() };
        let source = SharedLocationSource::new(Box::new(fake));
        let mut s = PositionSampler::new(SamplerConfig::default(), source);

        assert_eq!(s.start(0), Err(SensorError::PermissionDenied));
        assert_eq!(s.state(), SamplerState::Failed(SensorError::PermissionDenied));
        assert!(s.offer(fix(12.9330, 1000)).is_none());
    }

    #[test]
    fn test_runtime_error_stops_sampler() {
        let (mut s, fake) = sampler();
        s.start(0).unwrap();
        s.fail(SensorError::Unavailable("gps off".into()));
        assert!(matches!(s.state(), SamplerState::Failed(_)));
        assert_eq!(fake.stops.load(Ordering::Relaxed), 1);
        assert!(s.offer(fix(12.9330, 1000)).is_none());
    }

    #[test]
    fn test_timeout_reported_once_per_window() {
        let (mut s, _) = sampler();
        s.start(0).unwrap();
        assert!(s.check_timeout(9_999).is_none());
        assert_eq!(s.check_timeout(10_000), Some(SensorError::Timeout { waited_ms: 10_000 }));
        assert!(s.check_timeout(12_000).is_none());

        // Timeout is transient: a fix still gets through and clears it
        assert!(s.offer(fix(12.9330, 12_500)).is_some());
        assert_eq!(s.state(), SamplerState::Forwarding);
        assert!(s.check_timeout(20_000).is_none());
        assert!(s.check_timeout(29_999).is_none());
        assert!(s.check_timeout(30_000).is_some());
    }

    #[test]
    fn test_timeout_ignores_fix_clock() {
        let (mut s, _) = sampler();
        // Host clock counts from boot, fixes carry wall-clock milliseconds
        s.start(5_000).unwrap();
        assert!(s.offer(fix(12.9330, 1_700_000_000_000)).is_some());
        assert!(s.check_timeout(6_000).is_none());
        assert!(s.check_timeout(15_999).is_none());
        assert_eq!(s.check_timeout(16_000), Some(SensorError::Timeout { waited_ms: 10_000 }));

        // A fix far behind the host clock does not trigger one either
        let (mut s, _) = sampler();
        s.start(1_700_000_000_000).unwrap();
        assert!(s.offer(fix(12.9330, 3_000)).is_some());
        assert!(s.check_timeout(1_700_000_001_000).is_none());
        assert!(s.check_timeout(1_700_000_005_000).is_none());
    }

    #[test]
    fn test_shared_source_refcount() {
        let fake = FakeSource::default();
        let shared = SharedLocationSource::new(Box::new(fake.clone()));

        let a = shared.acquire(true).unwrap();
        let b = shared.acquire(true).unwrap();
        assert_eq!(shared.active_subscribers(), 2);
        assert_eq!(fake.starts.load(Ordering::Relaxed), 1);

        drop(a);
        assert_eq!(fake.stops.load(Ordering::Relaxed), 0);
        drop(b);
        assert_eq!(fake.stops.load(Ordering::Relaxed), 1);
        assert_eq!(shared.active_subscribers(), 0);
    }

    #[test]
    fn test_valid_heading() {
        let s = fix(12.0, 0).with_heading(-90.0);
        assert_eq!(s.valid_heading(), Some(270.0));
        assert_eq!(fix(12.0, 0).with_heading(f64::NAN).valid_heading(), None);
    }
}
