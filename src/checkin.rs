//! Check-in prompt aggregation.
//!
//! Raw [`CheckinEvent`]s are grouped into [`Cluster`]s so that places close
//! to each other produce a single prompt. A cluster's center is the coordinate
//! of its first event and never moves. Items are resolved one at a time
//! (confirmed or dismissed); a cluster disappears with its last item.

use log::debug;

use crate::geo_utils::haversine_distance;
use crate::{CheckinEvent, Coordinate};

/// Events within this distance of a cluster's center join that cluster.
pub const DEFAULT_MERGE_RADIUS_M: f64 = 60.0;

/// A group of nearby check-ins shown as one prompt.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "persist", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct Cluster {
    /// `"{place_id}-{tour_id}"` of the first event
    pub key: String,
    pub center: Coordinate,
    /// Pending events, in arrival order
    pub items: Vec<CheckinEvent>,
}

/// What the user did with a check-in prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "persist", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum Resolution {
    Confirmed,
    Dismissed,
}

/// A resolved check-in.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "persist", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct ResolvedCheckin {
    pub event: CheckinEvent,
    pub resolution: Resolution,
}

/// Outcome of [`CheckinAggregator::push`].
#[derive(Debug, Clone, PartialEq)]
pub enum PushOutcome {
    /// A new cluster was opened with this key
    Created(String),
    /// The event joined the cluster with this key
    Merged(String),
    /// The place is already pending; the event was ignored
    Duplicate,
}

/// Queue of pending check-in prompts.
#[derive(Debug)]
pub struct CheckinAggregator {
    merge_radius_m: f64,
    clusters: Vec<Cluster>,
    history: Vec<ResolvedCheckin>,
}

impl Default for CheckinAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_MERGE_RADIUS_M)
    }
}

impl CheckinAggregator {
    pub fn new(merge_radius_m: f64) -> Self {
        Self {
            merge_radius_m,
            clusters: Vec::new(),
            history: Vec::new(),
        }
    }

    /// Open clusters, in the order they were created.
    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    /// Number of unresolved events across all clusters.
    pub fn pending_count(&self) -> usize {
        self.clusters.iter().map(|c| c.items.len()).sum()
    }

    pub fn is_pending(&self, place_id: &str) -> bool {
        self.locate(place_id).is_some()
    }

    /// Resolved check-ins of the current session, oldest first.
    pub fn history(&self) -> &[ResolvedCheckin] {
        &self.history
    }

    /// Drop every pending cluster and the history.
    pub fn clear(&mut self) {
        self.clusters.clear();
        self.history.clear();
    }

    /// Add an event, merging it into the first cluster whose center is within
    /// the merge radius.
    ///
    /// # Example
    /// ```
    /// use tour_nav::{CheckinAggregator, CheckinEvent, Coordinate, PushOutcome};
    ///
    /// fn event(id: &str, lat: f64) -> CheckinEvent {
    ///     CheckinEvent {
    ///         place_id: id.into(), tour_id: "t1".into(), name: id.into(),
    ///         coordinate: Coordinate::new(lat, 77.5350), radius_m: 30.0,
    ///         distance_at_trigger_m: 0.0, timestamp_ms: 0, blurb: None, time: None,
    ///     }
    /// }
    ///
    /// let mut queue = CheckinAggregator::default();
    /// assert_eq!(queue.push(event("a", 12.9330)), PushOutcome::Created("a-t1".into()));
    /// // ~22 m away: same prompt
    /// assert_eq!(queue.push(event("b", 12.9332)), PushOutcome::Merged("a-t1".into()));
    /// assert_eq!(queue.clusters().len(), 1);
    /// ```
    pub fn push(&mut self, event: CheckinEvent) -> PushOutcome {
        if self.is_pending(&event.place_id) {
            debug!("[CheckinAggregator] Ignoring duplicate event for {}", event.place_id);
            return PushOutcome::Duplicate;
        }

        let radius = self.merge_radius_m;
        if let Some(cluster) = self
            .clusters
            .iter_mut()
            .find(|c| haversine_distance(&c.center, &event.coordinate) <= radius)
        {
            debug!("[CheckinAggregator] {} joins cluster {}", event.place_id, cluster.key);
            cluster.items.push(event);
            return PushOutcome::Merged(cluster.key.clone());
        }

        let key = format!("{}-{}", event.place_id, event.tour_id);
        debug!("[CheckinAggregator] New cluster {}", key);
        self.clusters.push(Cluster {
            key: key.clone(),
            center: event.coordinate,
            items: vec![event],
        });
        PushOutcome::Created(key)
    }

    /// The user checked in at `place_id`. Returns the resolved event.
    pub fn confirm(&mut self, place_id: &str) -> Option<CheckinEvent> {
        self.resolve(place_id, Resolution::Confirmed)
    }

    /// The user declined the check-in at `place_id`. Returns the resolved event.
    pub fn dismiss(&mut self, place_id: &str) -> Option<CheckinEvent> {
        self.resolve(place_id, Resolution::Dismissed)
    }

    /// Dismiss every item of one cluster. Returns the dismissed events.
    pub fn dismiss_cluster(&mut self, key: &str) -> Vec<CheckinEvent> {
        let Some(idx) = self.clusters.iter().position(|c| c.key == key) else {
            return Vec::new();
        };

        let cluster = self.clusters.remove(idx);
        self.history.extend(cluster.items.iter().cloned().map(|event| ResolvedCheckin {
            event,
            resolution: Resolution::Dismissed,
        }));
        cluster.items
    }

    fn locate(&self, place_id: &str) -> Option<(usize, usize)> {
        self.clusters.iter().enumerate().find_map(|(ci, c)| {
            c.items
                .iter()
                .position(|e| e.place_id == place_id)
                .map(|ii| (ci, ii))
        })
    }

    fn resolve(&mut self, place_id: &str, resolution: Resolution) -> Option<CheckinEvent> {
        let (ci, ii) = self.locate(place_id)?;

        let event = self.clusters[ci].items.remove(ii);
        if self.clusters[ci].items.is_empty() {
            self.clusters.remove(ci);
        }

        self.history.push(ResolvedCheckin {
            event: event.clone(),
            resolution,
        });
        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo_utils::destination_point;

    const ORIGIN: Coordinate = Coordinate { latitude: 12.9330, longitude: 77.5350 };

    fn event_at(id: &str, coordinate: Coordinate) -> CheckinEvent {
        CheckinEvent {
            place_id: id.to_string(),
            tour_id: "t1".to_string(),
            name: id.to_uppercase(),
            coordinate,
            radius_m: 30.0,
            distance_at_trigger_m: 3.0,
            timestamp_ms: 0,
            blurb: None,
            time: None,
        }
    }

    #[test]
    fn test_close_events_merge() {
        let mut agg = CheckinAggregator::default();
        agg.push(event_at("a", ORIGIN));
        let outcome = agg.push(event_at("b", destination_point(&ORIGIN, 45.0, 90.0)));

        assert_eq!(outcome, PushOutcome::Merged("a-t1".to_string()));
        assert_eq!(agg.clusters().len(), 1);
        assert_eq!(agg.clusters()[0].items.len(), 2);
    }

    #[test]
    fn test_far_events_split() {
        let mut agg = CheckinAggregator::default();
        agg.push(event_at("a", ORIGIN));
        let outcome = agg.push(event_at("b", destination_point(&ORIGIN, 200.0, 90.0)));

        assert_eq!(outcome, PushOutcome::Created("b-t1".to_string()));
        assert_eq!(agg.clusters().len(), 2);
        assert_eq!(agg.clusters()[0].key, "a-t1");
        assert_eq!(agg.clusters()[1].key, "b-t1");
    }

    #[test]
    fn test_center_is_not_recentered() {
        let mut agg = CheckinAggregator::default();
        agg.push(event_at("a", ORIGIN));
        // 50 m east joins; the center stays on "a"
        agg.push(event_at("b", destination_point(&ORIGIN, 50.0, 90.0)));
        // 100 m east is only 50 m from "b" but 100 m from the center
        let outcome = agg.push(event_at("c", destination_point(&ORIGIN, 100.0, 90.0)));

        assert_eq!(agg.clusters()[0].center, ORIGIN);
        assert_eq!(outcome, PushOutcome::Created("c-t1".to_string()));
    }

    #[test]
    fn test_duplicate_place_ignored() {
        let mut agg = CheckinAggregator::default();
        agg.push(event_at("a", ORIGIN));
        assert_eq!(agg.push(event_at("a", ORIGIN)), PushOutcome::Duplicate);
        assert_eq!(agg.pending_count(), 1);
    }

    #[test]
    fn test_confirm_one_item_keeps_siblings() {
        let mut agg = CheckinAggregator::default();
        agg.push(event_at("a", ORIGIN));
        agg.push(event_at("b", destination_point(&ORIGIN, 20.0, 0.0)));

        let confirmed = agg.confirm("a").unwrap();
        assert_eq!(confirmed.place_id, "a");

        assert_eq!(agg.clusters().len(), 1);
        let remaining: Vec<&str> = agg.clusters()[0].items.iter().map(|e| e.place_id.as_str()).collect();
        assert_eq!(remaining, vec!["b"]);

        agg.dismiss("b");
        assert!(agg.clusters().is_empty());
    }

    #[test]
    fn test_history_records_resolutions() {
        let mut agg = CheckinAggregator::default();
        agg.push(event_at("a", ORIGIN));
        agg.push(event_at("b", destination_point(&ORIGIN, 500.0, 0.0)));

        agg.confirm("a");
        agg.dismiss("b");

        let history: Vec<(&str, Resolution)> = agg
            .history()
            .iter()
            .map(|r| (r.event.place_id.as_str(), r.resolution))
            .collect();
        assert_eq!(history, vec![("a", Resolution::Confirmed), ("b", Resolution::Dismissed)]);
    }

    #[test]
    fn test_dismiss_cluster_removes_all_items() {
        let mut agg = CheckinAggregator::default();
        agg.push(event_at("a", ORIGIN));
        agg.push(event_at("b", destination_point(&ORIGIN, 10.0, 0.0)));
        agg.push(event_at("c", destination_point(&ORIGIN, 900.0, 0.0)));

        let dismissed = agg.dismiss_cluster("a-t1");
        assert_eq!(dismissed.len(), 2);
        assert_eq!(agg.clusters().len(), 1);
        assert_eq!(agg.clusters()[0].key, "c-t1");
        assert!(agg.dismiss_cluster("a-t1").is_empty());
    }

    #[test]
    fn test_resolving_unknown_place_is_noop() {
        let mut agg = CheckinAggregator::default();
        agg.push(event_at("a", ORIGIN));
        assert!(agg.confirm("nope").is_none());
        assert!(agg.dismiss("nope").is_none());
        assert_eq!(agg.pending_count(), 1);
        assert!(agg.history().is_empty());
    }

    #[test]
    fn test_clear() {
        let mut agg = CheckinAggregator::default();
        agg.push(event_at("a", ORIGIN));
        agg.confirm("a");
        agg.push(event_at("b", ORIGIN));
        agg.clear();
        assert_eq!(agg.pending_count(), 0);
        assert!(agg.history().is_empty());
    }
}
