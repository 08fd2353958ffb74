//! `navi-types` – shared vocabulary of the Navi fusion stack.
//!
//! Detection inputs, the canonical [`FusedTrack`], the display projection
//! [`TrackView`], bus [`Event`]s and the global [`NaviError`] live here so
//! that every other crate speaks the same language.
//!
//! All timestamps are seconds on a single monotonic clock chosen by the
//! host (`f64`).  Angles are degrees in `[0, 360)` measured on the tactical
//! map frame, distances are metres.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ────────────────────────────────────────────────────────────────────────────
// Identifiers
// ────────────────────────────────────────────────────────────────────────────

/// Stable identifier of a [`FusedTrack`] inside one engine instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TrackKey(pub u64);

impl fmt::Display for TrackKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

/// The two independent detection streams feeding the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Radar/LiDAR-like bearing + range returns.
    Spatial,
    /// Image-based detector output (bounding box + class).
    Vision,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Spatial => write!(f, "spatial"),
            SourceKind::Vision => write!(f, "vision"),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Detection inputs
// ────────────────────────────────────────────────────────────────────────────

/// Axis-aligned bounding region in image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x_min: f64,
    pub y_min: f64,
    pub x_max: f64,
    pub y_max: f64,
}

impl BoundingBox {
    pub fn new(x_min: f64, y_min: f64, x_max: f64, y_max: f64) -> Self {
        Self { x_min, y_min, x_max, y_max }
    }

    /// Horizontal centre of the box in pixels.
    pub fn center_x(&self) -> f64 {
        (self.x_min + self.x_max) / 2.0
    }

    fn is_well_formed(&self) -> bool {
        [self.x_min, self.y_min, self.x_max, self.y_max]
            .iter()
            .all(|v| v.is_finite())
            && self.x_max >= self.x_min
            && self.y_max >= self.y_min
    }
}

/// A single bearing/range return from the spatial source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialDetection {
    pub spatial_id: u64,
    /// Camera/sensor channel this return is associated with.
    pub sensor_ref: Option<u32>,
    pub angle_deg: f64,
    pub distance_m: f64,
    pub observed_at: f64,
    /// Return intensity in `[0, 1]`, when the sensor reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intensity: Option<f64>,
}

impl SpatialDetection {
    /// Reject malformed returns instead of coercing them.
    ///
    /// # Errors
    ///
    /// Returns [`NaviError::InvalidDetection`] when the sensor reference is
    /// missing, the angle lies outside `[0, 360)`, the distance is negative,
    /// or any numeric field is not finite.
    pub fn validate(&self) -> Result<(), NaviError> {
        let invalid = |reason: String| NaviError::InvalidDetection {
            source_kind: SourceKind::Spatial,
            id: self.spatial_id,
            reason,
        };
        if self.sensor_ref.is_none() {
            return Err(invalid("missing sensor_ref".into()));
        }
        if !self.angle_deg.is_finite() || !(0.0..360.0).contains(&self.angle_deg) {
            return Err(invalid(format!("angle {} outside [0, 360)", self.angle_deg)));
        }
        if !self.distance_m.is_finite() || self.distance_m < 0.0 {
            return Err(invalid(format!("distance {} is not a finite range", self.distance_m)));
        }
        if !self.observed_at.is_finite() {
            return Err(invalid("non-finite observed_at".into()));
        }
        if let Some(i) = self.intensity
            && (!i.is_finite() || !(0.0..=1.0).contains(&i))
        {
            return Err(invalid(format!("intensity {i} outside [0, 1]")));
        }
        Ok(())
    }
}

/// A single object detection from the vision source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisionDetection {
    pub vision_id: u64,
    pub sensor_ref: Option<u32>,
    pub bbox: BoundingBox,
    pub class_label: String,
    pub confidence: f64,
    pub observed_at: f64,
}

impl VisionDetection {
    /// Reject malformed detections instead of coercing them.
    ///
    /// # Errors
    ///
    /// Returns [`NaviError::InvalidDetection`] when the sensor reference is
    /// missing, the box is degenerate or non-finite, the confidence lies
    /// outside `[0, 1]`, the class label is blank, or the timestamp is not
    /// finite.
    pub fn validate(&self) -> Result<(), NaviError> {
        let invalid = |reason: String| NaviError::InvalidDetection {
            source_kind: SourceKind::Vision,
            id: self.vision_id,
            reason,
        };
        if self.sensor_ref.is_none() {
            return Err(invalid("missing sensor_ref".into()));
        }
        if !self.bbox.is_well_formed() {
            return Err(invalid(format!("malformed bbox {:?}", self.bbox)));
        }
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(invalid(format!("confidence {} outside [0, 1]", self.confidence)));
        }
        if self.class_label.trim().is_empty() {
            return Err(invalid("empty class label".into()));
        }
        if !self.observed_at.is_finite() {
            return Err(invalid("non-finite observed_at".into()));
        }
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Fused tracks
// ────────────────────────────────────────────────────────────────────────────

/// Lifecycle state of a [`FusedTrack`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackState {
    SpatialOnly,
    VisionOnly,
    Matched,
    /// Terminal.  Expired tracks are removed from the registry in the same
    /// cycle and only ever show up in logs.
    Expired,
}

/// Which detection kinds currently back a live track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackKind {
    Matched,
    SpatialOnly,
    VisionOnly,
}

/// The canonical long-lived entity held by the track registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedTrack {
    pub track_key: TrackKey,
    pub spatial_ref: Option<u64>,
    pub vision_ref: Option<u64>,
    /// Sensor of the side that owns the bearing: the spatial sensor while a
    /// spatial side is present, otherwise the camera.
    pub sensor_ref: u32,
    pub angle_deg: f64,
    pub distance_m: f64,
    pub class_label: Option<String>,
    pub confidence: Option<f64>,
    pub bbox: Option<BoundingBox>,
    /// Camera that produced `bbox`.  Spatial sensor handovers never touch it.
    #[serde(default)]
    pub vision_sensor_ref: Option<u32>,
    pub intensity: Option<f64>,
    /// Angle/time agreement of the current pairing, `None` unless matched.
    pub fusion_quality: Option<f64>,
    pub last_spatial_at: Option<f64>,
    pub last_vision_at: Option<f64>,
    pub created_at: f64,
    pub state: TrackState,
}

impl FusedTrack {
    /// Kind derived from the references that are present.
    ///
    /// A track with neither reference never lives in a registry; it is
    /// reported as `SpatialOnly` only to keep this total.
    pub fn kind(&self) -> TrackKind {
        match (self.spatial_ref, self.vision_ref) {
            (Some(_), Some(_)) => TrackKind::Matched,
            (None, Some(_)) => TrackKind::VisionOnly,
            _ => TrackKind::SpatialOnly,
        }
    }

    /// Latest observation time over all present sides.
    pub fn last_seen_at(&self) -> f64 {
        let spatial = self.spatial_ref.and(self.last_spatial_at);
        let vision = self.vision_ref.and(self.last_vision_at);
        match (spatial, vision) {
            (Some(s), Some(v)) => s.max(v),
            (Some(s), None) => s,
            (None, Some(v)) => v,
            (None, None) => self.created_at,
        }
    }
}

/// Tactical-map obstacle category shown on a marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ObstacleKind {
    Boat,
    Vessel,
    Person,
    Debris,
    Buoy,
    Unknown,
}

impl fmt::Display for ObstacleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ObstacleKind::Boat => "BOAT",
            ObstacleKind::Vessel => "VESSEL",
            ObstacleKind::Person => "PERSON",
            ObstacleKind::Debris => "DEBRIS",
            ObstacleKind::Buoy => "BUOY",
            ObstacleKind::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// Read-only projection of a track handed to the display layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackView {
    pub id: TrackKey,
    pub kind: TrackKind,
    pub angle_deg: f64,
    pub distance_m: f64,
    pub class_label: Option<String>,
    pub confidence: Option<f64>,
    pub bbox: Option<BoundingBox>,
    pub fusion_quality: Option<f64>,
    pub obstacle: ObstacleKind,
}

/// Outcome of one fusion cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    /// Monotonic cycle sequence number, starting at 1.
    pub cycle: u64,
    pub now: f64,
    /// Live `Matched` tracks after the cycle.
    pub matched_count: usize,
    /// Live `SpatialOnly` tracks after the cycle.
    pub spatial_only_count: usize,
    /// Live `VisionOnly` tracks after the cycle.
    pub vision_only_count: usize,
    /// Tracks that expired and were removed during this cycle.
    pub expired_count: usize,
    pub promoted_count: usize,
    pub demoted_count: usize,
    /// Tracks absorbed into an older track during this cycle.
    pub merged_count: usize,
    /// Detections that were already older than the cleanup threshold.
    pub stale_dropped: usize,
    /// Sources that have not delivered anything within their timeout.
    pub silent_sources: Vec<SourceKind>,
}

impl CycleReport {
    pub fn live_count(&self) -> usize {
        self.matched_count + self.spatial_only_count + self.vision_only_count
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Bus events
// ────────────────────────────────────────────────────────────────────────────

/// Raised when a live track crosses the proximity threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProximityAlert {
    pub track_key: TrackKey,
    pub distance_m: f64,
    pub threshold_m: f64,
    pub class_label: Option<String>,
    pub sensor_ref: u32,
    /// `true` when entering the alert zone, `false` when leaving it.
    pub raised: bool,
}

impl ProximityAlert {
    /// Operator-facing message for the alert banner.
    pub fn message(&self) -> String {
        let name = self.class_label.as_deref().unwrap_or("Object");
        if self.raised {
            format!(
                "CAUTION: {name} detected at {:.1}m (C{}-{})",
                self.distance_m, self.sensor_ref, self.track_key
            )
        } else {
            format!("Alert cleared: {name} now at safe distance ({:.1}m)", self.distance_m)
        }
    }
}

/// Unified event wrapper for the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g. `"navi-fusion::engine"`
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data routed over the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    SpatialDetection(SpatialDetection),
    VisionDetection(VisionDetection),
    /// A cycle completed and a new view snapshot is available.
    ViewUpdated(CycleReport),
    Proximity(ProximityAlert),
    SourceSilent { source_kind: SourceKind, silent_for_s: f64 },
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Error type shared by every Navi crate.  None of these is fatal to the
/// hosting process.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NaviError {
    #[error("Invalid {source_kind} detection {id}: {reason}")]
    InvalidDetection {
        source_kind: SourceKind,
        id: u64,
        reason: String,
    },

    #[error("Fusion engine has been stopped")]
    EngineStopped,

    #[error("Track not found: {0}")]
    NotFound(TrackKey),

    #[error("{source_kind} reference {id} already held by {holder}")]
    DuplicateReference {
        source_kind: SourceKind,
        id: u64,
        holder: TrackKey,
    },

    #[error("Event bus error: {0}")]
    Channel(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Cycle time must be finite, got {0}")]
    InvalidCycleTime(f64),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spatial(angle: f64) -> SpatialDetection {
        SpatialDetection {
            spatial_id: 1,
            sensor_ref: Some(2),
            angle_deg: angle,
            distance_m: 200.0,
            observed_at: 100.0,
            intensity: None,
        }
    }

    fn vision() -> VisionDetection {
        VisionDetection {
            vision_id: 5,
            sensor_ref: Some(2),
            bbox: BoundingBox::new(900.0, 400.0, 1100.0, 600.0),
            class_label: "vessel-ship".into(),
            confidence: 0.89,
            observed_at: 102.0,
        }
    }

    #[test]
    fn spatial_angle_out_of_range_is_rejected() {
        let err = spatial(400.0).validate().unwrap_err();
        assert!(matches!(err, NaviError::InvalidDetection { source_kind: SourceKind::Spatial, .. }));
        assert!(spatial(360.0).validate().is_err());
        assert!(spatial(-0.5).validate().is_err());
        assert!(spatial(359.9).validate().is_ok());
    }

    #[test]
    fn spatial_missing_sensor_or_nan_is_rejected() {
        let mut d = spatial(10.0);
        d.sensor_ref = None;
        assert!(d.validate().is_err());

        let mut d = spatial(10.0);
        d.distance_m = f64::NAN;
        assert!(d.validate().is_err());

        let mut d = spatial(10.0);
        d.distance_m = -1.0;
        assert!(d.validate().is_err());

        let mut d = spatial(10.0);
        d.intensity = Some(1.5);
        assert!(d.validate().is_err());
    }

    #[test]
    fn vision_validation_rules() {
        assert!(vision().validate().is_ok());

        let mut d = vision();
        d.confidence = 1.2;
        assert!(d.validate().is_err());

        let mut d = vision();
        d.bbox = BoundingBox::new(10.0, 0.0, 5.0, 5.0);
        assert!(d.validate().is_err());

        let mut d = vision();
        d.class_label = "  ".into();
        assert!(d.validate().is_err());

        let mut d = vision();
        d.observed_at = f64::INFINITY;
        assert!(d.validate().is_err());
    }

    #[test]
    fn kind_follows_references() {
        let mut t = FusedTrack {
            track_key: TrackKey(1),
            spatial_ref: Some(1),
            vision_ref: None,
            sensor_ref: 2,
            angle_deg: 45.0,
            distance_m: 200.0,
            class_label: None,
            confidence: None,
            bbox: None,
            vision_sensor_ref: None,
            intensity: None,
            fusion_quality: None,
            last_spatial_at: Some(100.0),
            last_vision_at: None,
            created_at: 100.0,
            state: TrackState::SpatialOnly,
        };
        assert_eq!(t.kind(), TrackKind::SpatialOnly);
        assert_eq!(t.last_seen_at(), 100.0);

        t.vision_ref = Some(5);
        t.last_vision_at = Some(104.0);
        assert_eq!(t.kind(), TrackKind::Matched);
        assert_eq!(t.last_seen_at(), 104.0);

        t.spatial_ref = None;
        assert_eq!(t.kind(), TrackKind::VisionOnly);
    }

    #[test]
    fn error_display() {
        let err = NaviError::NotFound(TrackKey(7));
        assert_eq!(err.to_string(), "Track not found: T7");
        assert!(NaviError::EngineStopped.to_string().contains("stopped"));
    }

    #[test]
    fn event_json_shape() {
        let event = Event::new(
            "navi-fusion::engine",
            EventPayload::ViewUpdated(CycleReport { cycle: 3, matched_count: 1, ..Default::default() }),
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, event.id);
        match back.payload {
            EventPayload::ViewUpdated(report) => assert_eq!(report.cycle, 3),
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn proximity_message_mentions_label_and_distance() {
        let alert = ProximityAlert {
            track_key: TrackKey(3),
            distance_m: 4.3,
            threshold_m: 10.0,
            class_label: Some("boat".into()),
            sensor_ref: 1,
            raised: true,
        };
        assert_eq!(alert.message(), "CAUTION: boat detected at 4.3m (C1-T3)");
    }
}
