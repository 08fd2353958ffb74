//! [`SourceWatchdog`] – detection-source liveness monitor.
//!
//! Every delivered detection counts as a heartbeat for its source, stamped
//! with the detection's own observation time.  A source is *silent* once the
//! engine clock has moved more than its timeout past the newest heartbeat.
//!
//! The engine calls [`SourceWatchdog::check_all`] at the end of every cycle
//! and reports silent sources in the cycle report.  Silence is informational
//! only; tracks keep ageing on their own thresholds.

use std::collections::BTreeMap;

use navi_types::SourceKind;

// ────────────────────────────────────────────────────────────────────────────
// Public types
// ────────────────────────────────────────────────────────────────────────────

/// Health state reported for a single source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceHealth {
    /// The source delivered something within its timeout.
    Alive,
    /// Nothing has arrived within the timeout.
    Silent,
}

// ────────────────────────────────────────────────────────────────────────────
// Internal entry
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct SourceEntry {
    last_heartbeat: f64,
    timeout_s: f64,
}

// ────────────────────────────────────────────────────────────────────────────
// Watchdog
// ────────────────────────────────────────────────────────────────────────────

/// Tracks heartbeats from registered sources on the engine clock.
///
/// # Example
///
/// ```
/// use navi_fusion::watchdog::{SourceWatchdog, SourceHealth};
/// use navi_types::SourceKind;
///
/// let mut wd = SourceWatchdog::new();
/// wd.register(SourceKind::Spatial, 10.0, 0.0);
/// wd.heartbeat(SourceKind::Spatial, 4.0);
///
/// assert_eq!(wd.health(SourceKind::Spatial, 12.0), SourceHealth::Alive);
/// assert_eq!(wd.health(SourceKind::Spatial, 15.0), SourceHealth::Silent);
/// ```
#[derive(Debug, Default)]
pub struct SourceWatchdog {
    sources: BTreeMap<SourceKind, SourceEntry>,
}

impl SourceWatchdog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `kind` with a heartbeat `timeout_s`, counting `at` as its
    /// first heartbeat.
    ///
    /// Re-registering an existing source resets its deadline.
    pub fn register(&mut self, kind: SourceKind, timeout_s: f64, at: f64) {
        self.sources.insert(
            kind,
            SourceEntry {
                last_heartbeat: at,
                timeout_s,
            },
        );
    }

    pub fn is_registered(&self, kind: SourceKind) -> bool {
        self.sources.contains_key(&kind)
    }

    /// Change the timeout of every registered source, keeping heartbeats.
    pub fn set_timeout(&mut self, timeout_s: f64) {
        for entry in self.sources.values_mut() {
            entry.timeout_s = timeout_s;
        }
    }

    /// Record a heartbeat observed at `at`.  Older heartbeats never move the
    /// deadline backwards.
    ///
    /// No-ops for sources that have not been registered.
    pub fn heartbeat(&mut self, kind: SourceKind, at: f64) {
        if let Some(entry) = self.sources.get_mut(&kind) {
            entry.last_heartbeat = entry.last_heartbeat.max(at);
        }
    }

    /// Returns [`SourceHealth::Silent`] for unknown sources.
    pub fn health(&self, kind: SourceKind, now: f64) -> SourceHealth {
        match self.sources.get(&kind) {
            Some(entry) if now - entry.last_heartbeat <= entry.timeout_s => SourceHealth::Alive,
            _ => SourceHealth::Silent,
        }
    }

    /// Seconds since the newest heartbeat, or `None` for unknown sources.
    pub fn silent_for(&self, kind: SourceKind, now: f64) -> Option<f64> {
        self.sources
            .get(&kind)
            .map(|entry| (now - entry.last_heartbeat).max(0.0))
    }

    /// Every registered source whose deadline has passed, in stable order.
    pub fn check_all(&self, now: f64) -> Vec<SourceKind> {
        self.sources
            .keys()
            .copied()
            .filter(|kind| self.health(*kind, now) == SourceHealth::Silent)
            .collect()
    }
}
