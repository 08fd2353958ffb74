//! Proximity alerts for tracks that come too close to own ship.
//!
//! [`ProximityMonitor::evaluate`] is edge-triggered: an alert is raised the
//! first time a track is seen inside the threshold and cleared the first
//! time it is seen outside again.  Vision-only tracks carry no range and
//! are never evaluated.

use std::collections::BTreeMap;

use navi_types::{FusedTrack, ProximityAlert, TrackKey, TrackKind};
use tracing::{info, warn};

pub const DEFAULT_THRESHOLD_M: f64 = 10.0;

#[derive(Debug)]
pub struct ProximityMonitor {
    threshold_m: f64,
    active: BTreeMap<TrackKey, f64>,
}

impl Default for ProximityMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD_M)
    }
}

impl ProximityMonitor {
    pub fn new(threshold_m: f64) -> Self {
        Self {
            threshold_m,
            active: BTreeMap::new(),
        }
    }

    pub fn threshold_m(&self) -> f64 {
        self.threshold_m
    }

    /// Takes effect at the next [`evaluate`](Self::evaluate).
    pub fn set_threshold(&mut self, threshold_m: f64) {
        info!(from = self.threshold_m, to = threshold_m, "proximity threshold updated");
        self.threshold_m = threshold_m;
    }

    /// Compare `tracks` against the threshold and return the alert edges.
    ///
    /// Alerts for tracks that are no longer live are dropped silently.
    pub fn evaluate(&mut self, tracks: &[FusedTrack]) -> Vec<ProximityAlert> {
        let mut edges = Vec::new();
        self.active
            .retain(|key, _| tracks.iter().any(|t| t.track_key == *key && t.kind() != TrackKind::VisionOnly));

        for track in tracks.iter().filter(|t| t.kind() != TrackKind::VisionOnly) {
            let inside = track.distance_m < self.threshold_m;
            let was_active = self.active.contains_key(&track.track_key);
            if inside == was_active {
                if inside {
                    self.active.insert(track.track_key, track.distance_m);
                }
                continue;
            }

            let alert = ProximityAlert {
                track_key: track.track_key,
                distance_m: track.distance_m,
                threshold_m: self.threshold_m,
                class_label: track.class_label.clone(),
                sensor_ref: track.sensor_ref,
                raised: inside,
            };
            if inside {
                warn!(track = %track.track_key, distance_m = track.distance_m, "{}", alert.message());
                self.active.insert(track.track_key, track.distance_m);
            } else {
                info!(track = %track.track_key, distance_m = track.distance_m, "{}", alert.message());
                self.active.remove(&track.track_key);
            }
            edges.push(alert);
        }
        edges
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Keys and last distances of every track currently in alert, nearest
    /// first.
    pub fn summary(&self) -> Vec<(TrackKey, f64)> {
        let mut out: Vec<(TrackKey, f64)> = self.active.iter().map(|(k, d)| (*k, *d)).collect();
        out.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        out
    }
}
