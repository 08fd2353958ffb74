//! Track lifecycle: creation, refresh, promotion, merge, demotion, expiry.
//!
//! [`LifecycleManager::commit`] applies one cycle's worth of detections to a
//! [`TrackRegistry`] in a fixed order:
//!
//! 1. **Coalesce** – repeated ids inside the batch collapse to their newest
//!    observation.
//! 2. **Screen** – detections already older than the cleanup threshold are
//!    dropped, as are vision boxes whose camera has no bearing sector.
//! 3. **Refresh** – detections whose id a live track already holds update
//!    that track's side.  Value fields only move forward in time; the side's
//!    last-seen timestamp is the maximum ever observed.
//! 4. **Age** – tracks whose every present side has been silent for longer
//!    than the threshold expire; a matched track with one silent side is
//!    demoted to the side that is still alive.
//! 5. **Associate** – the [`Matcher`] pairs the remaining detections and the
//!    single-sided tracks.  Pairs promote (or merge) tracks, keeping the key
//!    and creation time of the older track.
//! 6. **Create** – whatever is still unpaired becomes a new single-sided
//!    track.
//!
//! ```text
//!              vision pairs            vision silent
//!  SpatialOnly ────────────► Matched ───────────────► SpatialOnly
//!  VisionOnly  ────────────►         ───────────────► VisionOnly
//!              spatial pairs           spatial silent
//!
//!  any state ── every present side silent ──► Expired (removed)
//! ```

use std::collections::BTreeMap;

use navi_types::{
    CycleReport, FusedTrack, SpatialDetection, TrackKey, TrackKind, TrackState, VisionDetection,
};
use tracing::{debug, error, info, warn};

use crate::config::FusionConfig;
use crate::matcher::{MatchedPair, Matcher, Origin, SpatialCandidate, VisionCandidate};
use crate::registry::TrackRegistry;

/// Applies cycle batches to a registry under one configuration.
pub struct LifecycleManager<'a> {
    config: &'a FusionConfig,
}

impl<'a> LifecycleManager<'a> {
    pub fn new(config: &'a FusionConfig) -> Self {
        Self { config }
    }

    /// Run steps 1–6 for one cycle at time `now` and fill the counters of
    /// `report`.
    pub fn commit(
        &self,
        registry: &mut TrackRegistry,
        spatial: Vec<SpatialDetection>,
        vision: Vec<VisionDetection>,
        now: f64,
        report: &mut CycleReport,
    ) {
        let spatial = coalesce(spatial, |d| d.spatial_id, |d| d.observed_at);
        let vision = coalesce(vision, |d| d.vision_id, |d| d.observed_at);
        let (spatial, vision) = self.screen(spatial, vision, now, report);

        let spatial = self.refresh_spatial(registry, spatial);
        let vision = self.refresh_vision(registry, vision);

        self.age(registry, now, report);
        self.associate(registry, &spatial, &vision, report);

        report.matched_count = registry.count_kind(TrackKind::Matched);
        report.spatial_only_count = registry.count_kind(TrackKind::SpatialOnly);
        report.vision_only_count = registry.count_kind(TrackKind::VisionOnly);
    }

    fn is_silent(&self, last_seen: Option<f64>, now: f64) -> bool {
        last_seen.is_none_or(|t| now - t > self.config.cleanup_threshold_s)
    }

    fn bearing_of(&self, detection: &VisionDetection) -> Option<f64> {
        let sensor = detection.sensor_ref?;
        self.config.projection.derived_angle(&detection.bbox, sensor)
    }

    // ── Step 2 ──────────────────────────────────────────────────────────────

    fn screen(
        &self,
        spatial: Vec<SpatialDetection>,
        vision: Vec<VisionDetection>,
        now: f64,
        report: &mut CycleReport,
    ) -> (Vec<SpatialDetection>, Vec<VisionDetection>) {
        let before = spatial.len() + vision.len();
        let spatial: Vec<_> = spatial
            .into_iter()
            .filter(|d| !self.is_silent(Some(d.observed_at), now))
            .collect();
        let vision: Vec<_> = vision
            .into_iter()
            .filter(|d| !self.is_silent(Some(d.observed_at), now))
            .collect();
        report.stale_dropped += before - spatial.len() - vision.len();

        let vision = vision
            .into_iter()
            .filter(|d| {
                let projectable = self.bearing_of(d).is_some();
                if !projectable {
                    warn!(
                        vision_id = d.vision_id,
                        sensor = ?d.sensor_ref,
                        "no bearing sector for camera; detection dropped"
                    );
                }
                projectable
            })
            .collect();
        (spatial, vision)
    }

    // ── Step 3 ──────────────────────────────────────────────────────────────

    fn refresh_spatial(
        &self,
        registry: &mut TrackRegistry,
        detections: Vec<SpatialDetection>,
    ) -> Vec<SpatialDetection> {
        let mut unassociated = Vec::new();
        for detection in detections {
            let Some(key) = registry.by_spatial(detection.spatial_id) else {
                unassociated.push(detection);
                continue;
            };
            if let Ok(existing) = registry.get(key) {
                let mut track = existing.clone();
                apply_spatial(&mut track, &detection);
                settle(&mut track);
                store(registry, track);
            }
        }
        unassociated
    }

    fn refresh_vision(
        &self,
        registry: &mut TrackRegistry,
        detections: Vec<VisionDetection>,
    ) -> Vec<VisionDetection> {
        let mut unassociated = Vec::new();
        for detection in detections {
            let Some(key) = registry.by_vision(detection.vision_id) else {
                unassociated.push(detection);
                continue;
            };
            let Some(bearing) = self.bearing_of(&detection) else {
                continue;
            };
            if let Ok(existing) = registry.get(key) {
                let mut track = existing.clone();
                apply_vision(&mut track, &detection, bearing);
                settle(&mut track);
                store(registry, track);
            }
        }
        unassociated
    }

    // ── Step 4 ──────────────────────────────────────────────────────────────

    fn age(&self, registry: &mut TrackRegistry, now: f64, report: &mut CycleReport) {
        for key in registry.keys() {
            let Ok(track) = registry.get(key) else {
                continue;
            };
            let spatial_silent =
                track.spatial_ref.is_some() && self.is_silent(track.last_spatial_at, now);
            let vision_silent =
                track.vision_ref.is_some() && self.is_silent(track.last_vision_at, now);

            match track.kind() {
                TrackKind::Matched if spatial_silent && vision_silent => {
                    expire(registry, key, report)
                }
                TrackKind::Matched if vision_silent => {
                    let mut demoted = track.clone();
                    drop_vision_side(&mut demoted);
                    settle(&mut demoted);
                    info!(track = %key, "vision side silent; reverted to spatial-only");
                    store(registry, demoted);
                    report.demoted_count += 1;
                }
                TrackKind::Matched if spatial_silent => {
                    let mut demoted = track.clone();
                    drop_spatial_side(&mut demoted, self.config);
                    settle(&mut demoted);
                    info!(track = %key, "spatial side silent; reverted to vision-only");
                    store(registry, demoted);
                    report.demoted_count += 1;
                }
                TrackKind::SpatialOnly if spatial_silent => expire(registry, key, report),
                TrackKind::VisionOnly if vision_silent => expire(registry, key, report),
                _ => {}
            }
        }
    }

    // ── Steps 5 and 6 ───────────────────────────────────────────────────────

    fn associate(
        &self,
        registry: &mut TrackRegistry,
        spatial: &[SpatialDetection],
        vision: &[VisionDetection],
        report: &mut CycleReport,
    ) {
        let mut spatial_candidates: Vec<SpatialCandidate> = spatial
            .iter()
            .enumerate()
            .filter_map(|(i, d)| {
                Some(SpatialCandidate {
                    origin: Origin::Detection(i),
                    spatial_id: d.spatial_id,
                    sensor_ref: d.sensor_ref?,
                    angle_deg: d.angle_deg,
                    observed_at: d.observed_at,
                })
            })
            .collect();
        let mut vision_candidates: Vec<VisionCandidate> = vision
            .iter()
            .enumerate()
            .filter_map(|(i, d)| {
                Some(VisionCandidate {
                    origin: Origin::Detection(i),
                    vision_id: d.vision_id,
                    sensor_ref: d.sensor_ref?,
                    bbox: d.bbox,
                    observed_at: d.observed_at,
                })
            })
            .collect();

        for track in registry.iter() {
            match (track.kind(), track.spatial_ref, track.vision_ref, track.bbox) {
                (TrackKind::SpatialOnly, Some(spatial_id), _, _) => {
                    spatial_candidates.push(SpatialCandidate {
                        origin: Origin::Track(track.track_key),
                        spatial_id,
                        sensor_ref: track.sensor_ref,
                        angle_deg: track.angle_deg,
                        observed_at: track.last_spatial_at.unwrap_or(track.created_at),
                    })
                }
                (TrackKind::VisionOnly, _, Some(vision_id), Some(bbox)) => {
                    vision_candidates.push(VisionCandidate {
                        origin: Origin::Track(track.track_key),
                        vision_id,
                        sensor_ref: track.vision_sensor_ref.unwrap_or(track.sensor_ref),
                        bbox,
                        observed_at: track.last_vision_at.unwrap_or(track.created_at),
                    })
                }
                _ => {}
            }
        }

        let outcome = Matcher::new(self.config).match_candidates(&spatial_candidates, &vision_candidates);
        debug!(
            spatial = spatial_candidates.len(),
            vision = vision_candidates.len(),
            pairs = outcome.pairs.len(),
            "association complete"
        );

        for pair in &outcome.pairs {
            self.commit_pair(
                registry,
                &spatial_candidates[pair.spatial],
                &vision_candidates[pair.vision],
                pair,
                spatial,
                vision,
                report,
            );
        }

        for i in outcome.unmatched_spatial {
            if let Origin::Detection(idx) = spatial_candidates[i].origin {
                let key = registry.allocate_key();
                let mut track = spatial_only_track(key, &spatial[idx]);
                settle(&mut track);
                debug!(track = %key, spatial_id = spatial[idx].spatial_id, "spatial-only track created");
                store(registry, track);
            }
        }
        for i in outcome.unmatched_vision {
            if let Origin::Detection(idx) = vision_candidates[i].origin
                && let Some(bearing) = self.bearing_of(&vision[idx])
            {
                let key = registry.allocate_key();
                let mut track = vision_only_track(key, &vision[idx], bearing);
                settle(&mut track);
                debug!(track = %key, vision_id = vision[idx].vision_id, "vision-only track created");
                store(registry, track);
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn commit_pair(
        &self,
        registry: &mut TrackRegistry,
        s: &SpatialCandidate,
        v: &VisionCandidate,
        pair: &MatchedPair,
        spatial: &[SpatialDetection],
        vision: &[VisionDetection],
        report: &mut CycleReport,
    ) {
        let mut fused = match (s.origin, v.origin) {
            (Origin::Detection(si), Origin::Detection(vi)) => {
                let Some(bearing) = self.bearing_of(&vision[vi]) else {
                    return;
                };
                let key = registry.allocate_key();
                let mut track = spatial_only_track(key, &spatial[si]);
                apply_vision(&mut track, &vision[vi], bearing);
                track.created_at = s.observed_at.min(v.observed_at);
                track
            }
            (Origin::Track(key), Origin::Detection(vi)) => {
                let (Ok(existing), Some(bearing)) = (registry.get(key), self.bearing_of(&vision[vi]))
                else {
                    return;
                };
                let mut track = existing.clone();
                apply_vision(&mut track, &vision[vi], bearing);
                report.promoted_count += 1;
                track
            }
            (Origin::Detection(si), Origin::Track(key)) => {
                let Ok(existing) = registry.get(key) else {
                    return;
                };
                let mut track = existing.clone();
                apply_spatial(&mut track, &spatial[si]);
                report.promoted_count += 1;
                track
            }
            (Origin::Track(spatial_key), Origin::Track(vision_key)) => {
                let Some(track) = merge(registry, spatial_key, vision_key) else {
                    return;
                };
                report.promoted_count += 1;
                report.merged_count += 1;
                track
            }
        };

        fused.fusion_quality = Some(pair.fusion_quality);
        settle(&mut fused);
        info!(
            track = %fused.track_key,
            spatial_id = s.spatial_id,
            vision_id = v.vision_id,
            angle_delta = pair.angle_delta,
            time_delta = pair.time_delta,
            quality = pair.fusion_quality,
            "track matched"
        );
        store(registry, fused);
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Track construction and side updates
// ────────────────────────────────────────────────────────────────────────────

/// Keep the newest observation per id; later arrivals win timestamp ties.
/// Output is ordered by id.
fn coalesce<D>(batch: Vec<D>, id: impl Fn(&D) -> u64, observed_at: impl Fn(&D) -> f64) -> Vec<D> {
    let mut newest: BTreeMap<u64, D> = BTreeMap::new();
    for detection in batch {
        let key = id(&detection);
        match newest.get(&key) {
            Some(kept) if observed_at(kept) > observed_at(&detection) => {}
            _ => {
                newest.insert(key, detection);
            }
        }
    }
    newest.into_values().collect()
}

fn spatial_only_track(key: TrackKey, d: &SpatialDetection) -> FusedTrack {
    FusedTrack {
        track_key: key,
        spatial_ref: Some(d.spatial_id),
        vision_ref: None,
        sensor_ref: d.sensor_ref.unwrap_or_default(),
        angle_deg: d.angle_deg,
        distance_m: d.distance_m,
        class_label: None,
        confidence: None,
        bbox: None,
        vision_sensor_ref: None,
        intensity: d.intensity,
        fusion_quality: None,
        last_spatial_at: Some(d.observed_at),
        last_vision_at: None,
        created_at: d.observed_at,
        state: TrackState::SpatialOnly,
    }
}

fn vision_only_track(key: TrackKey, d: &VisionDetection, bearing: f64) -> FusedTrack {
    FusedTrack {
        track_key: key,
        spatial_ref: None,
        vision_ref: Some(d.vision_id),
        sensor_ref: d.sensor_ref.unwrap_or_default(),
        angle_deg: bearing,
        distance_m: 0.0,
        class_label: Some(d.class_label.clone()),
        confidence: Some(d.confidence),
        bbox: Some(d.bbox),
        vision_sensor_ref: d.sensor_ref,
        intensity: None,
        fusion_quality: None,
        last_spatial_at: None,
        last_vision_at: Some(d.observed_at),
        created_at: d.observed_at,
        state: TrackState::VisionOnly,
    }
}

/// Attach or refresh the spatial side.  The spatial side owns bearing and
/// range whenever it is present.
fn apply_spatial(track: &mut FusedTrack, d: &SpatialDetection) {
    track.spatial_ref = Some(d.spatial_id);
    if track.last_spatial_at.is_none_or(|last| d.observed_at >= last) {
        track.angle_deg = d.angle_deg;
        track.distance_m = d.distance_m;
        track.intensity = d.intensity;
        if let Some(sensor) = d.sensor_ref {
            track.sensor_ref = sensor;
        }
    }
    track.last_spatial_at = Some(track.last_spatial_at.map_or(d.observed_at, |t| t.max(d.observed_at)));
}

/// Attach or refresh the vision side.  Without a spatial side the projected
/// bearing stands in for the track's angle and the range is unknown (0).
fn apply_vision(track: &mut FusedTrack, d: &VisionDetection, bearing: f64) {
    track.vision_ref = Some(d.vision_id);
    if track.last_vision_at.is_none_or(|last| d.observed_at >= last) {
        track.class_label = Some(d.class_label.clone());
        track.confidence = Some(d.confidence);
        track.bbox = Some(d.bbox);
        track.vision_sensor_ref = d.sensor_ref;
        if track.spatial_ref.is_none() {
            track.angle_deg = bearing;
            track.distance_m = 0.0;
            if let Some(sensor) = d.sensor_ref {
                track.sensor_ref = sensor;
            }
        }
    }
    track.last_vision_at = Some(track.last_vision_at.map_or(d.observed_at, |t| t.max(d.observed_at)));
}

fn drop_vision_side(track: &mut FusedTrack) {
    track.vision_ref = None;
    track.class_label = None;
    track.confidence = None;
    track.bbox = None;
    track.vision_sensor_ref = None;
    track.last_vision_at = None;
}

fn drop_spatial_side(track: &mut FusedTrack, config: &FusionConfig) {
    track.spatial_ref = None;
    track.last_spatial_at = None;
    track.intensity = None;
    track.distance_m = 0.0;
    let Some(camera) = track.vision_sensor_ref else {
        return;
    };
    track.sensor_ref = camera;
    if let Some(bearing) = track
        .bbox
        .and_then(|bbox| config.projection.derived_angle(&bbox, camera))
    {
        track.angle_deg = bearing;
    }
}

/// Absorb the younger of two single-sided tracks into the older one.
fn merge(registry: &mut TrackRegistry, spatial_key: TrackKey, vision_key: TrackKey) -> Option<FusedTrack> {
    let spatial_track = registry.get(spatial_key).ok()?.clone();
    let vision_track = registry.get(vision_key).ok()?.clone();
    let spatial_is_older = (spatial_track.created_at, spatial_track.track_key.0)
        .partial_cmp(&(vision_track.created_at, vision_track.track_key.0))
        .is_some_and(|o| o.is_le());

    let (mut survivor, absorbed) = if spatial_is_older {
        (spatial_track, vision_track)
    } else {
        (vision_track, spatial_track)
    };
    registry.remove(absorbed.track_key).ok()?;

    if spatial_is_older {
        survivor.vision_ref = absorbed.vision_ref;
        survivor.class_label = absorbed.class_label;
        survivor.confidence = absorbed.confidence;
        survivor.bbox = absorbed.bbox;
        survivor.vision_sensor_ref = absorbed.vision_sensor_ref;
        survivor.last_vision_at = absorbed.last_vision_at;
    } else {
        survivor.spatial_ref = absorbed.spatial_ref;
        survivor.angle_deg = absorbed.angle_deg;
        survivor.distance_m = absorbed.distance_m;
        survivor.intensity = absorbed.intensity;
        survivor.sensor_ref = absorbed.sensor_ref;
        survivor.last_spatial_at = absorbed.last_spatial_at;
    }
    info!(
        survivor = %survivor.track_key,
        absorbed = %absorbed.track_key,
        "single-sided tracks merged"
    );
    Some(survivor)
}

fn settle(track: &mut FusedTrack) {
    track.state = match track.kind() {
        TrackKind::Matched => TrackState::Matched,
        TrackKind::SpatialOnly => TrackState::SpatialOnly,
        TrackKind::VisionOnly => TrackState::VisionOnly,
    };
    if track.state != TrackState::Matched {
        track.fusion_quality = None;
    }
}

fn expire(registry: &mut TrackRegistry, key: TrackKey, report: &mut CycleReport) {
    if let Ok(mut gone) = registry.remove(key) {
        gone.state = TrackState::Expired;
        info!(
            track = %key,
            state = ?gone.state,
            last_seen = gone.last_seen_at(),
            "track expired"
        );
        report.expired_count += 1;
    }
}

fn store(registry: &mut TrackRegistry, track: FusedTrack) {
    let key = track.track_key;
    if let Err(e) = registry.upsert(track) {
        error!(track = %key, error = %e, "registry rejected track update");
    }
}
