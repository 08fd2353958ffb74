//! Obstacle categories for tactical-map markers.
//!
//! Vision-backed tracks are categorised from their class label.  Tracks with
//! only a spatial side fall back to a range/intensity heuristic: close and
//! bright returns are buoys, close and dull ones debris, and so on.

use navi_types::{FusedTrack, ObstacleKind, TrackView};

// Order matters for partial matches: "vessel-ship" hits "ship" first.
const LABEL_TABLE: &[(&str, ObstacleKind)] = &[
    ("boat", ObstacleKind::Boat),
    ("ship", ObstacleKind::Vessel),
    ("person", ObstacleKind::Person),
    ("swimmer", ObstacleKind::Person),
    ("debris", ObstacleKind::Debris),
    ("floating_object", ObstacleKind::Debris),
    ("buoy", ObstacleKind::Buoy),
    ("vessel", ObstacleKind::Vessel),
    ("unknown", ObstacleKind::Unknown),
];

/// Category for a detector class label.  Exact (case-insensitive) matches
/// win, then substring matches in either direction.
pub fn obstacle_from_label(label: &str) -> ObstacleKind {
    let lower = label.trim().to_lowercase();
    if let Some((_, kind)) = LABEL_TABLE.iter().find(|(key, _)| *key == lower) {
        return *kind;
    }
    LABEL_TABLE
        .iter()
        .find(|(key, _)| lower.contains(key) || key.contains(lower.as_str()))
        .map(|(_, kind)| *kind)
        .unwrap_or(ObstacleKind::Unknown)
}

/// Category guessed from a bare spatial return.
pub fn obstacle_from_spatial(distance_m: f64, intensity: Option<f64>) -> ObstacleKind {
    let intensity = intensity.unwrap_or(0.0);
    if distance_m < 50.0 {
        if intensity > 0.8 { ObstacleKind::Buoy } else { ObstacleKind::Debris }
    } else if distance_m < 150.0 {
        if intensity > 0.7 { ObstacleKind::Boat } else { ObstacleKind::Person }
    } else {
        ObstacleKind::Vessel
    }
}

pub fn obstacle_for(track: &FusedTrack) -> ObstacleKind {
    match (&track.class_label, track.spatial_ref) {
        (Some(label), _) => obstacle_from_label(label),
        (None, Some(_)) => obstacle_from_spatial(track.distance_m, track.intensity),
        (None, None) => ObstacleKind::Unknown,
    }
}

/// Display projection of a track.
pub fn project(track: &FusedTrack) -> TrackView {
    TrackView {
        id: track.track_key,
        kind: track.kind(),
        angle_deg: track.angle_deg,
        distance_m: track.distance_m,
        class_label: track.class_label.clone(),
        confidence: track.confidence,
        bbox: track.bbox,
        fusion_quality: track.fusion_quality,
        obstacle: obstacle_for(track),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use navi_types::{TrackKey, TrackKind, TrackState};

    fn spatial_only(distance_m: f64, intensity: Option<f64>) -> FusedTrack {
        FusedTrack {
            track_key: TrackKey(1),
            spatial_ref: Some(1),
            vision_ref: None,
            sensor_ref: 1,
            angle_deg: 90.0,
            distance_m,
            class_label: None,
            confidence: None,
            bbox: None,
            vision_sensor_ref: None,
            intensity,
            fusion_quality: None,
            last_spatial_at: Some(0.0),
            last_vision_at: None,
            created_at: 0.0,
            state: TrackState::SpatialOnly,
        }
    }

    #[test]
    fn exact_labels() {
        assert_eq!(obstacle_from_label("boat"), ObstacleKind::Boat);
        assert_eq!(obstacle_from_label("Swimmer"), ObstacleKind::Person);
        assert_eq!(obstacle_from_label("floating_object"), ObstacleKind::Debris);
    }

    #[test]
    fn partial_labels() {
        assert_eq!(obstacle_from_label("vessel-ship"), ObstacleKind::Vessel);
        assert_eq!(obstacle_from_label("fishing boat"), ObstacleKind::Boat);
        assert_eq!(obstacle_from_label("kayak"), ObstacleKind::Unknown);
    }

    #[test]
    fn spatial_heuristic_bands() {
        assert_eq!(obstacle_from_spatial(20.0, Some(0.9)), ObstacleKind::Buoy);
        assert_eq!(obstacle_from_spatial(20.0, None), ObstacleKind::Debris);
        assert_eq!(obstacle_from_spatial(100.0, Some(0.75)), ObstacleKind::Boat);
        assert_eq!(obstacle_from_spatial(100.0, Some(0.2)), ObstacleKind::Person);
        assert_eq!(obstacle_from_spatial(400.0, None), ObstacleKind::Vessel);
    }

    #[test]
    fn projection_prefers_label_over_heuristic() {
        let mut track = spatial_only(20.0, Some(0.9));
        assert_eq!(project(&track).obstacle, ObstacleKind::Buoy);

        track.vision_ref = Some(4);
        track.class_label = Some("person".into());
        let view = project(&track);
        assert_eq!(view.kind, TrackKind::Matched);
        assert_eq!(view.obstacle, ObstacleKind::Person);
    }
}
