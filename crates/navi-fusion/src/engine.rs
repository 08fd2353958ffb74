//! [`FusionEngine`] – the ingest / cycle / view façade.
//!
//! Producers push detections with `ingest_*` at any time and from any
//! thread; nothing is matched until the host calls [`FusionEngine::run_cycle`].
//! Each cycle swaps the inbox out, runs the lifecycle over the registry and
//! publishes a fresh immutable [`ViewSnapshot`].
//!
//! Locking:
//!
//! * `inbox` – held only to push or swap; both streams share it so a cycle
//!   takes every detection that arrived before it exactly once.
//! * `state` – registry, watchdog and cycle counter; held for a whole cycle,
//!   so cycles never overlap.
//! * `view` – the published `Arc<ViewSnapshot>`, replaced at cycle end.
//!   Readers clone the `Arc` and never see a half-applied cycle.
//! * `history` – the last `history_len` published views, oldest first.
//!
//! # Example
//!
//! ```
//! use navi_fusion::engine::FusionEngine;
//! use navi_types::SpatialDetection;
//!
//! let engine = FusionEngine::default();
//! engine
//!     .ingest_spatial(SpatialDetection {
//!         spatial_id: 1,
//!         sensor_ref: Some(1),
//!         angle_deg: 60.0,
//!         distance_m: 240.0,
//!         observed_at: 0.0,
//!         intensity: None,
//!     })
//!     .unwrap();
//!
//! let report = engine.run_cycle(0.5).unwrap();
//! assert_eq!(report.spatial_only_count, 1);
//! assert_eq!(engine.current_view().len(), 1);
//! ```

use std::collections::VecDeque;
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use navi_types::{
    CycleReport, FusedTrack, NaviError, SourceKind, SpatialDetection, TrackKey, TrackView,
    VisionDetection,
};
use tracing::{debug, info, warn};

use crate::classify;
use crate::config::FusionConfig;
use crate::lifecycle::LifecycleManager;
use crate::registry::TrackRegistry;
use crate::source::{SpatialSource, VisionSource};
use crate::watchdog::SourceWatchdog;

// ────────────────────────────────────────────────────────────────────────────
// View snapshot
// ────────────────────────────────────────────────────────────────────────────

/// Immutable result of one cycle.
#[derive(Debug, Clone, Default)]
pub struct ViewSnapshot {
    cycle: u64,
    now: f64,
    tracks: Vec<FusedTrack>,
    report: CycleReport,
}

impl ViewSnapshot {
    /// Live tracks, oldest first.
    pub fn tracks(&self) -> &[FusedTrack] {
        &self.tracks
    }

    /// Display projections of [`tracks`](Self::tracks), same order.
    pub fn projections(&self) -> Vec<TrackView> {
        self.tracks.iter().map(classify::project).collect()
    }

    pub fn get(&self, key: TrackKey) -> Option<&FusedTrack> {
        self.tracks.iter().find(|t| t.track_key == key)
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Cycle that produced this snapshot; `0` before the first cycle.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn now(&self) -> f64 {
        self.now
    }

    pub fn report(&self) -> &CycleReport {
        &self.report
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Engine
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Inbox {
    spatial: Vec<SpatialDetection>,
    vision: Vec<VisionDetection>,
}

#[derive(Debug, Default)]
struct CycleState {
    registry: TrackRegistry,
    watchdog: SourceWatchdog,
    cycle: u64,
    silent: Vec<SourceKind>,
}

/// Thread-safe fusion engine.  Share it behind an `Arc`.
#[derive(Debug, Default)]
pub struct FusionEngine {
    config: RwLock<FusionConfig>,
    inbox: Mutex<Inbox>,
    state: Mutex<CycleState>,
    view: RwLock<Arc<ViewSnapshot>>,
    history: Mutex<VecDeque<Arc<ViewSnapshot>>>,
    stopped: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl FusionEngine {
    /// # Errors
    ///
    /// Returns [`NaviError::Config`] when `config` fails validation.
    pub fn new(config: FusionConfig) -> Result<Self, NaviError> {
        config.validate()?;
        Ok(Self {
            config: RwLock::new(config),
            ..Default::default()
        })
    }

    // ── Ingestion ───────────────────────────────────────────────────────────

    /// Buffer one spatial detection for the next cycle.
    ///
    /// # Errors
    ///
    /// * [`NaviError::InvalidDetection`] – the detection fails validation.
    /// * [`NaviError::EngineStopped`] – [`stop`](Self::stop) was called.
    pub fn ingest_spatial(&self, detection: SpatialDetection) -> Result<(), NaviError> {
        if self.is_stopped() {
            return Err(NaviError::EngineStopped);
        }
        if let Err(e) = detection.validate() {
            warn!(spatial_id = detection.spatial_id, error = %e, "spatial detection rejected");
            return Err(e);
        }
        let mut inbox = lock(&self.inbox);
        if self.is_stopped() {
            return Err(NaviError::EngineStopped);
        }
        inbox.spatial.push(detection);
        Ok(())
    }

    /// Buffer one vision detection for the next cycle.
    ///
    /// Besides field validation, the camera must have a bearing sector in
    /// the current configuration.
    ///
    /// # Errors
    ///
    /// * [`NaviError::InvalidDetection`] – the detection fails validation.
    /// * [`NaviError::EngineStopped`] – [`stop`](Self::stop) was called.
    pub fn ingest_vision(&self, detection: VisionDetection) -> Result<(), NaviError> {
        if self.is_stopped() {
            return Err(NaviError::EngineStopped);
        }
        let checked = detection.validate().and_then(|()| {
            let config = self.config.read().unwrap_or_else(PoisonError::into_inner);
            let has_sector = detection
                .sensor_ref
                .is_some_and(|sensor| config.projection.sector(sensor).is_some());
            if has_sector {
                Ok(())
            } else {
                Err(NaviError::InvalidDetection {
                    source_kind: SourceKind::Vision,
                    id: detection.vision_id,
                    reason: format!("no bearing sector for camera {:?}", detection.sensor_ref),
                })
            }
        });
        if let Err(e) = checked {
            warn!(vision_id = detection.vision_id, error = %e, "vision detection rejected");
            return Err(e);
        }
        let mut inbox = lock(&self.inbox);
        if self.is_stopped() {
            return Err(NaviError::EngineStopped);
        }
        inbox.vision.push(detection);
        Ok(())
    }

    /// Best-effort batch ingest; one result per input, in order.
    pub fn ingest_spatial_batch(
        &self,
        detections: impl IntoIterator<Item = SpatialDetection>,
    ) -> Vec<Result<(), NaviError>> {
        detections.into_iter().map(|d| self.ingest_spatial(d)).collect()
    }

    /// Best-effort batch ingest; one result per input, in order.
    pub fn ingest_vision_batch(
        &self,
        detections: impl IntoIterator<Item = VisionDetection>,
    ) -> Vec<Result<(), NaviError>> {
        detections.into_iter().map(|d| self.ingest_vision(d)).collect()
    }

    /// Drain `source` into the inbox.  Returns how many detections were
    /// accepted; rejected ones are logged and skipped.
    ///
    /// # Errors
    ///
    /// Propagates the source's poll error, or [`NaviError::EngineStopped`].
    pub fn pump_spatial(&self, source: &mut dyn SpatialSource, now: f64) -> Result<usize, NaviError> {
        if self.is_stopped() {
            return Err(NaviError::EngineStopped);
        }
        let batch = source.poll_spatial(now)?;
        let accepted = self.ingest_spatial_batch(batch).iter().filter(|r| r.is_ok()).count();
        debug!(source = source.id(), accepted, "spatial source pumped");
        Ok(accepted)
    }

    /// # Errors
    ///
    /// Propagates the source's poll error, or [`NaviError::EngineStopped`].
    pub fn pump_vision(&self, source: &mut dyn VisionSource, now: f64) -> Result<usize, NaviError> {
        if self.is_stopped() {
            return Err(NaviError::EngineStopped);
        }
        let batch = source.poll_vision(now)?;
        let accepted = self.ingest_vision_batch(batch).iter().filter(|r| r.is_ok()).count();
        debug!(source = source.id(), accepted, "vision source pumped");
        Ok(accepted)
    }

    /// Buffered (spatial, vision) detection counts.
    pub fn pending(&self) -> (usize, usize) {
        let inbox = lock(&self.inbox);
        (inbox.spatial.len(), inbox.vision.len())
    }

    // ── Cycle ───────────────────────────────────────────────────────────────

    /// Match, promote, demote and expire against engine time `now`, then
    /// publish a new view.
    ///
    /// # Errors
    ///
    /// * [`NaviError::InvalidCycleTime`] – `now` is not finite.
    /// * [`NaviError::EngineStopped`] – [`stop`](Self::stop) was called.
    pub fn run_cycle(&self, now: f64) -> Result<CycleReport, NaviError> {
        if !now.is_finite() {
            return Err(NaviError::InvalidCycleTime(now));
        }
        let config = self.config();
        let mut state = lock(&self.state);

        let Inbox { spatial, vision } = {
            let mut inbox = lock(&self.inbox);
            if self.is_stopped() {
                return Err(NaviError::EngineStopped);
            }
            mem::take(&mut *inbox)
        };

        state.cycle += 1;
        let mut report = CycleReport {
            cycle: state.cycle,
            now,
            ..Default::default()
        };
        debug!(cycle = state.cycle, now, spatial = spatial.len(), vision = vision.len(), "cycle start");

        let newest_spatial = spatial.iter().map(|d| d.observed_at).reduce(f64::max);
        let newest_vision = vision.iter().map(|d| d.observed_at).reduce(f64::max);
        let CycleState { registry, watchdog, silent, .. } = &mut *state;
        for (kind, newest) in [(SourceKind::Spatial, newest_spatial), (SourceKind::Vision, newest_vision)] {
            if !watchdog.is_registered(kind) {
                watchdog.register(kind, config.source_timeout_s, now);
            }
            if let Some(at) = newest {
                watchdog.heartbeat(kind, at);
            }
        }
        watchdog.set_timeout(config.source_timeout_s);

        LifecycleManager::new(&config).commit(registry, spatial, vision, now, &mut report);

        report.silent_sources = watchdog.check_all(now);
        for kind in &report.silent_sources {
            if !silent.contains(kind) {
                warn!(
                    source = %kind,
                    silent_for_s = watchdog.silent_for(*kind, now).unwrap_or_default(),
                    "detection source went silent"
                );
            }
        }
        for kind in silent.iter() {
            if !report.silent_sources.contains(kind) {
                info!(source = %kind, "detection source recovered");
            }
        }
        *silent = report.silent_sources.clone();

        let snapshot = Arc::new(ViewSnapshot {
            cycle: report.cycle,
            now,
            tracks: registry.snapshot(),
            report: report.clone(),
        });
        *self.view.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&snapshot);

        let mut history = lock(&self.history);
        history.push_back(snapshot);
        while history.len() > config.history_len {
            history.pop_front();
        }
        drop(history);

        debug!(
            cycle = report.cycle,
            matched = report.matched_count,
            spatial_only = report.spatial_only_count,
            vision_only = report.vision_only_count,
            expired = report.expired_count,
            "cycle complete"
        );
        Ok(report)
    }

    // ── Queries ─────────────────────────────────────────────────────────────

    /// The most recently published view.  Never blocks on a running cycle.
    pub fn current_view(&self) -> Arc<ViewSnapshot> {
        Arc::clone(&self.view.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Full detail of one track as of the current view.
    ///
    /// # Errors
    ///
    /// Returns [`NaviError::NotFound`] when no live track has `key`.
    pub fn lookup(&self, key: TrackKey) -> Result<FusedTrack, NaviError> {
        self.current_view()
            .get(key)
            .cloned()
            .ok_or(NaviError::NotFound(key))
    }

    /// Recently published views, oldest first.  At most `history_len`.
    pub fn history(&self) -> Vec<Arc<ViewSnapshot>> {
        lock(&self.history).iter().cloned().collect()
    }

    pub fn clear_history(&self) {
        lock(&self.history).clear();
    }

    /// Seconds since `kind` last delivered anything, as of `now`.  `None`
    /// before the first cycle.
    pub fn silent_for(&self, kind: SourceKind, now: f64) -> Option<f64> {
        lock(&self.state).watchdog.silent_for(kind, now)
    }

    pub fn config(&self) -> FusionConfig {
        self.config.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Replace the configuration; takes effect from the next cycle.
    ///
    /// # Errors
    ///
    /// Returns [`NaviError::Config`] when `config` fails validation.  The
    /// previous configuration stays in force.
    pub fn set_config(&self, config: FusionConfig) -> Result<(), NaviError> {
        config.validate()?;
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = config;
        info!("fusion configuration updated");
        Ok(())
    }

    // ── Shutdown ────────────────────────────────────────────────────────────

    /// Refuse further ingestion and cycles.  Buffered detections are
    /// discarded; the last view stays readable.
    pub fn stop(&self) {
        let mut inbox = lock(&self.inbox);
        if !self.stopped.swap(true, Ordering::AcqRel) {
            let dropped = inbox.spatial.len() + inbox.vision.len();
            *inbox = Inbox::default();
            info!(dropped, "fusion engine stopped");
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}
