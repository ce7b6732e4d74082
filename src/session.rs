//! Navigation session state machine.
//!
//! ```text
//!            start              pause
//!   Idle ───────────▶ Running ─────────▶ Paused
//!    ▲                  ▲  │               │
//!    │                  │  └──── stop ─────┤
//!    │                  └──── resume ──────┘
//!    └──────────────────── stop ───────────┘
//! ```
//!
//! Transitions that do not apply to the current state are ignored rather
//! than rejected, because UI handlers routinely fire them twice.
//!
//! The session is also the event bus: listeners registered with
//! [`NavigationSession::subscribe`] receive every [`SessionEvent`].

use log::info;

use crate::{CheckinEvent, RouteResult, SensorError, TravelProfile};

/// Navigation status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "persist", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "persist", serde(rename_all = "snake_case"))]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum NavStatus {
    #[default]
    Idle,
    Running,
    Paused,
}

/// Distance and duration of the current route, from the directions service.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "persist", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct RouteStats {
    pub distance_m: f64,
    pub duration_s: f64,
}

/// Everything the session broadcasts to its listeners.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StatusChanged { from: NavStatus, to: NavStatus },
    CheckedIn(CheckinEvent),
    SensorFault(SensorError),
    RouteUpdated(RouteResult),
}

/// Handle returned by [`NavigationSession::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Box<dyn FnMut(&SessionEvent) + Send>;

/// Serializable copy of the session state.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "persist", derive(serde::Serialize, serde::Deserialize))]
pub struct SessionSnapshot {
    pub status: NavStatus,
    pub active_tour_id: Option<String>,
    pub profile: TravelProfile,
    pub last_stats: Option<RouteStats>,
}

/// The single source of truth for an in-progress tour.
pub struct NavigationSession {
    status: NavStatus,
    active_tour_id: Option<String>,
    profile: TravelProfile,
    last_stats: Option<RouteStats>,
    /// Bumped on every start and stop; async results carry the epoch they
    /// were issued in
    epoch: u64,
    listeners: Vec<(ListenerId, Listener)>,
    next_listener: u64,
}

impl Default for NavigationSession {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for NavigationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NavigationSession")
            .field("status", &self.status)
            .field("active_tour_id", &self.active_tour_id)
            .field("profile", &self.profile)
            .field("last_stats", &self.last_stats)
            .field("epoch", &self.epoch)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl NavigationSession {
    pub fn new() -> Self {
        Self {
            status: NavStatus::Idle,
            active_tour_id: None,
            profile: TravelProfile::default(),
            last_stats: None,
            epoch: 0,
            listeners: Vec::new(),
            next_listener: 0,
        }
    }

    pub fn status(&self) -> NavStatus {
        self.status
    }

    pub fn active_tour_id(&self) -> Option<&str> {
        self.active_tour_id.as_deref()
    }

    pub fn profile(&self) -> TravelProfile {
        self.profile
    }

    pub fn last_stats(&self) -> Option<RouteStats> {
        self.last_stats
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    /// Idle → Running. Returns whether the transition applied.
    pub fn start(&mut self, tour_id: &str, profile: TravelProfile) -> bool {
        if self.status != NavStatus::Idle {
            return false;
        }
        self.active_tour_id = Some(tour_id.to_string());
        self.profile = profile;
        self.last_stats = None;
        self.epoch += 1;
        info!("[NavigationSession] Starting tour {} ({})", tour_id, profile);
        self.transition(NavStatus::Running);
        true
    }

    /// Running → Paused. Returns whether the transition applied.
    pub fn pause(&mut self) -> bool {
        if self.status != NavStatus::Running {
            return false;
        }
        self.transition(NavStatus::Paused);
        true
    }

    /// Paused → Running. Returns whether the transition applied.
    pub fn resume(&mut self) -> bool {
        if self.status != NavStatus::Paused {
            return false;
        }
        self.transition(NavStatus::Running);
        true
    }

    /// Any state → Idle. Clears the active tour and stats.
    ///
    /// Returns whether anything changed (stopping an idle session does not).
    pub fn stop(&mut self) -> bool {
        if self.status == NavStatus::Idle && self.active_tour_id.is_none() {
            return false;
        }
        self.active_tour_id = None;
        self.last_stats = None;
        self.epoch += 1;
        if self.status != NavStatus::Idle {
            self.transition(NavStatus::Idle);
        }
        true
    }

    pub fn set_stats(&mut self, stats: Option<RouteStats>) {
        self.last_stats = stats;
    }

    fn transition(&mut self, to: NavStatus) {
        let from = self.status;
        self.status = to;
        info!("[NavigationSession] {:?} -> {:?}", from, to);
        self.emit(&SessionEvent::StatusChanged { from, to });
    }

    // ------------------------------------------------------------------
    // Event bus
    // ------------------------------------------------------------------

    /// Register a listener for every [`SessionEvent`].
    pub fn subscribe<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(&SessionEvent) + Send + 'static,
    {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Remove a listener. Returns false if it was not registered.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    pub(crate) fn emit(&mut self, event: &SessionEvent) {
        for (_, listener) in self.listeners.iter_mut() {
            listener(event);
        }
    }

    // ------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            status: self.status,
            active_tour_id: self.active_tour_id.clone(),
            profile: self.profile,
            last_stats: self.last_stats,
        }
    }

    /// Rebuild a session from a snapshot.
    ///
    /// A snapshot taken while Running comes back Paused: sampling restarts
    /// only on an explicit resume. A snapshot without an active tour comes
    /// back Idle.
    pub fn restore(snapshot: SessionSnapshot) -> Self {
        let mut session = Self::new();
        session.apply_snapshot(snapshot);
        session
    }

    /// Overwrite the state from a snapshot, keeping the listeners.
    ///
    /// No status event is emitted; the epoch moves on so results issued
    /// before the restore are discarded.
    pub(crate) fn apply_snapshot(&mut self, snapshot: SessionSnapshot) {
        let status = match (&snapshot.active_tour_id, snapshot.status) {
            (None, _) | (Some(_), NavStatus::Idle) => NavStatus::Idle,
            (Some(_), _) => NavStatus::Paused,
        };

        self.status = status;
        self.active_tour_id = if status == NavStatus::Idle {
            None
        } else {
            snapshot.active_tour_id
        };
        self.profile = snapshot.profile;
        self.last_stats = snapshot.last_stats;
        self.epoch += 1;
        info!("[NavigationSession] Restored as {:?}", self.status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recorder(session: &mut NavigationSession) -> Arc<Mutex<Vec<SessionEvent>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        session.subscribe(move |e| sink.lock().unwrap().push(e.clone()));
        events
    }

    #[test]
    fn test_full_lifecycle() {
        let mut s = NavigationSession::new();
        assert_eq!(s.status(), NavStatus::Idle);

        assert!(s.start("t1", TravelProfile::Cycling));
        assert_eq!(s.status(), NavStatus::Running);
        assert_eq!(s.active_tour_id(), Some("t1"));
        assert_eq!(s.profile(), TravelProfile::Cycling);

        assert!(s.pause());
        assert_eq!(s.status(), NavStatus::Paused);
        assert!(s.resume());
        assert_eq!(s.status(), NavStatus::Running);

        assert!(s.stop());
        assert_eq!(s.status(), NavStatus::Idle);
        assert_eq!(s.active_tour_id(), None);
    }

    #[test]
    fn test_redundant_transitions_are_noops() {
        let mut s = NavigationSession::new();
        let events = recorder(&mut s);

        assert!(!s.pause());
        assert!(!s.resume());
        assert!(!s.stop());

        s.start("t1", TravelProfile::Walking);
        assert!(!s.start("t2", TravelProfile::Driving));
        assert_eq!(s.active_tour_id(), Some("t1"));
        assert!(!s.resume());

        s.pause();
        assert!(!s.pause());
        assert_eq!(s.status(), NavStatus::Paused);

        // start, pause: exactly two status events
        assert_eq!(events.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_stop_from_paused() {
        let mut s = NavigationSession::new();
        s.start("t1", TravelProfile::Walking);
        s.pause();
        assert!(s.stop());
        assert_eq!(s.status(), NavStatus::Idle);
    }

    #[test]
    fn test_epoch_changes_on_start_and_stop() {
        let mut s = NavigationSession::new();
        let e0 = s.epoch();
        s.start("t1", TravelProfile::Walking);
        let e1 = s.epoch();
        s.pause();
        s.resume();
        assert_eq!(s.epoch(), e1);
        s.stop();
        assert!(e0 < e1 && e1 < s.epoch());
    }

    #[test]
    fn test_status_events() {
        let mut s = NavigationSession::new();
        let events = recorder(&mut s);

        s.start("t1", TravelProfile::Walking);
        s.pause();
        s.stop();

        let got = events.lock().unwrap().clone();
        assert_eq!(
            got,
            vec![
                SessionEvent::StatusChanged { from: NavStatus::Idle, to: NavStatus::Running },
                SessionEvent::StatusChanged { from: NavStatus::Running, to: NavStatus::Paused },
                SessionEvent::StatusChanged { from: NavStatus::Paused, to: NavStatus::Idle },
            ]
        );
    }

    #[test]
    fn test_unsubscribe() {
        let mut s = NavigationSession::new();
        let count = Arc::new(Mutex::new(0));
        let c = Arc::clone(&count);
        let id = s.subscribe(move |_| *c.lock().unwrap() += 1);

        s.start("t1", TravelProfile::Walking);
        assert!(s.unsubscribe(id));
        assert!(!s.unsubscribe(id));
        s.stop();

        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn test_stats_cleared_on_stop() {
        let mut s = NavigationSession::new();
        s.start("t1", TravelProfile::Walking);
        s.set_stats(Some(RouteStats { distance_m: 1200.0, duration_s: 900.0 }));
        assert!(s.last_stats().is_some());
        s.stop();
        assert!(s.last_stats().is_none());
    }

    #[test]
    fn test_restore_running_comes_back_paused() {
        let mut s = NavigationSession::new();
        s.start("t1", TravelProfile::Driving);
        let restored = NavigationSession::restore(s.snapshot());
        assert_eq!(restored.status(), NavStatus::Paused);
        assert_eq!(restored.active_tour_id(), Some("t1"));
        assert_eq!(restored.profile(), TravelProfile::Driving);
    }

    #[test]
    fn test_restore_without_tour_is_idle() {
        let snapshot = SessionSnapshot {
            status: NavStatus::Running,
            active_tour_id: None,
            profile: TravelProfile::Walking,
            last_stats: None,
        };
        assert_eq!(NavigationSession::restore(snapshot).status(), NavStatus::Idle);
    }

    #[cfg(feature = "persist")]
    #[test]
    fn test_snapshot_json() {
        let mut s = NavigationSession::new();
        s.start("t1", TravelProfile::Cycling);
        let json = serde_json::to_string(&s.snapshot()).unwrap();
        assert!(json.contains("\"status\":\"running\""));
        let back: SessionSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s.snapshot());
    }
}
