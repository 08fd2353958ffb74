//! Circular angle helpers and the camera bearing projection.
//!
//! The tactical map measures bearings in degrees, `0°` pointing right (east)
//! and increasing anti-clockwise.  Each camera covers one [`CameraSector`]
//! of that circle; a vision bounding box is projected into the same frame by
//! interpolating its horizontal centre across the sector:
//!
//! ```text
//! bearing = normalize(start_deg + clamp(center_x / frame_width, 0, 1) * fov_deg)
//! ```
//!
//! The projection is a calibration input, so sectors and frame width are
//! configuration.  A sensor without a sector has no bearing at all; nothing
//! falls back to a neighbouring camera.
//!
//! # Example
//!
//! ```
//! use navi_fusion::geometry::{angular_distance, BearingProjection};
//! use navi_types::BoundingBox;
//!
//! assert_eq!(angular_distance(10.0, 350.0), 20.0);
//!
//! let projection = BearingProjection::default();
//! // Camera 1 covers 45°..135°; a centred box looks straight down the middle.
//! let bbox = BoundingBox::new(860.0, 0.0, 1060.0, 100.0);
//! let bearing = projection.derived_angle(&bbox, 1).unwrap();
//! assert!((bearing - 90.0).abs() < 1e-9);
//! ```

use navi_types::{BoundingBox, NaviError};
use serde::{Deserialize, Serialize};

/// Wrap any finite angle into `[0, 360)`.
pub fn normalize_angle(deg: f64) -> f64 {
    let wrapped = deg.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs.
    if wrapped >= 360.0 { 0.0 } else { wrapped }
}

/// Shortest distance between two bearings on the circle, in `[0, 180]`.
pub fn angular_distance(a: f64, b: f64) -> f64 {
    let diff = (a - b).abs().rem_euclid(360.0);
    diff.min(360.0 - diff)
}

fn default_fov_deg() -> f64 {
    90.0
}

fn default_frame_width_px() -> f64 {
    1920.0
}

fn default_sectors() -> Vec<CameraSector> {
    vec![
        CameraSector::new(1, 45.0),
        CameraSector::new(2, 135.0),
        CameraSector::new(3, 225.0),
        CameraSector::new(4, 315.0),
    ]
}

/// The slice of the map circle seen by one camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraSector {
    pub sensor_ref: u32,
    /// Bearing of the left image edge.
    pub start_deg: f64,
    #[serde(default = "default_fov_deg")]
    pub fov_deg: f64,
}

impl CameraSector {
    /// A sector with the default 90° field of view.
    pub fn new(sensor_ref: u32, start_deg: f64) -> Self {
        Self {
            sensor_ref,
            start_deg,
            fov_deg: default_fov_deg(),
        }
    }

    pub fn with_fov(mut self, fov_deg: f64) -> Self {
        self.fov_deg = fov_deg;
        self
    }
}

/// Maps a bounding box on a given camera to a bearing on the map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BearingProjection {
    #[serde(default = "default_frame_width_px")]
    pub frame_width_px: f64,
    #[serde(default = "default_sectors")]
    pub sectors: Vec<CameraSector>,
}

impl Default for BearingProjection {
    fn default() -> Self {
        Self {
            frame_width_px: default_frame_width_px(),
            sectors: default_sectors(),
        }
    }
}

impl BearingProjection {
    pub fn new(frame_width_px: f64, sectors: Vec<CameraSector>) -> Self {
        Self {
            frame_width_px,
            sectors,
        }
    }

    /// The sector configured for `sensor_ref`, if any.
    pub fn sector(&self, sensor_ref: u32) -> Option<&CameraSector> {
        self.sectors.iter().find(|s| s.sensor_ref == sensor_ref)
    }

    /// Bearing of the centre of `bbox` as seen by camera `sensor_ref`.
    ///
    /// Returns `None` when no sector is configured for the camera.  Boxes
    /// whose centre lies outside the frame are clamped to the sector edge.
    pub fn derived_angle(&self, bbox: &BoundingBox, sensor_ref: u32) -> Option<f64> {
        let sector = self.sector(sensor_ref)?;
        let norm_x = (bbox.center_x() / self.frame_width_px).clamp(0.0, 1.0);
        Some(normalize_angle(sector.start_deg + norm_x * sector.fov_deg))
    }

    /// Inverse of [`derived_angle`](Self::derived_angle): the pixel column at
    /// which `angle_deg` appears on camera `sensor_ref`.
    ///
    /// Returns `None` when the camera is unknown or the bearing lies outside
    /// its field of view.
    pub fn pixel_for_angle(&self, sensor_ref: u32, angle_deg: f64) -> Option<f64> {
        let sector = self.sector(sensor_ref)?;
        let offset = normalize_angle(angle_deg - sector.start_deg);
        (offset <= sector.fov_deg).then(|| offset / sector.fov_deg * self.frame_width_px)
    }

    /// Camera whose sector contains `angle_deg`, preferring the first match.
    pub fn sensor_for_angle(&self, angle_deg: f64) -> Option<u32> {
        self.sectors
            .iter()
            .find(|s| normalize_angle(angle_deg - s.start_deg) < s.fov_deg)
            .map(|s| s.sensor_ref)
    }

    /// Check the calibration for values that would make bearings meaningless.
    ///
    /// # Errors
    ///
    /// Returns [`NaviError::Config`] for a non-positive frame width, a field
    /// of view outside `(0, 360]`, a non-finite start bearing, or two sectors
    /// claiming the same camera.
    pub fn validate(&self) -> Result<(), NaviError> {
        if !self.frame_width_px.is_finite() || self.frame_width_px <= 0.0 {
            return Err(NaviError::Config(format!(
                "frame_width_px must be positive, got {}",
                self.frame_width_px
            )));
        }
        for (i, sector) in self.sectors.iter().enumerate() {
            if !sector.start_deg.is_finite() {
                return Err(NaviError::Config(format!(
                    "camera {} has a non-finite start bearing",
                    sector.sensor_ref
                )));
            }
            if !sector.fov_deg.is_finite() || sector.fov_deg <= 0.0 || sector.fov_deg > 360.0 {
                return Err(NaviError::Config(format!(
                    "camera {} field of view {} outside (0, 360]",
                    sector.sensor_ref, sector.fov_deg
                )));
            }
            if self.sectors[..i].iter().any(|s| s.sensor_ref == sector.sensor_ref) {
                return Err(NaviError::Config(format!(
                    "camera {} has more than one sector",
                    sector.sensor_ref
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox_at(center_x: f64) -> BoundingBox {
        BoundingBox::new(center_x - 50.0, 0.0, center_x + 50.0, 80.0)
    }

    #[test]
    fn angular_distance_wraps_around() {
        assert_eq!(angular_distance(10.0, 350.0), 20.0);
        assert_eq!(angular_distance(350.0, 10.0), 20.0);
        assert_eq!(angular_distance(0.0, 180.0), 180.0);
        assert_eq!(angular_distance(45.0, 47.0), 2.0);
        assert_eq!(angular_distance(720.0, 0.0), 0.0);
    }

    #[test]
    fn normalize_angle_wraps_into_range() {
        assert_eq!(normalize_angle(405.0), 45.0);
        assert_eq!(normalize_angle(-90.0), 270.0);
        assert_eq!(normalize_angle(360.0), 0.0);
        let tiny = normalize_angle(-1e-20);
        assert!((0.0..360.0).contains(&tiny));
    }

    #[test]
    fn default_sectors_follow_dashboard_layout() {
        let p = BearingProjection::default();
        // Left edge of camera 2.
        assert_eq!(p.derived_angle(&bbox_at(0.0), 2), Some(135.0));
        // Right edge of camera 4 wraps past north-east back to 45°.
        assert_eq!(p.derived_angle(&bbox_at(1920.0), 4), Some(45.0));
        // Middle of camera 3.
        assert_eq!(p.derived_angle(&bbox_at(960.0), 3), Some(270.0));
    }

    #[test]
    fn centre_outside_frame_is_clamped() {
        let p = BearingProjection::default();
        assert_eq!(p.derived_angle(&bbox_at(-400.0), 1), Some(45.0));
        assert_eq!(p.derived_angle(&bbox_at(5000.0), 1), Some(135.0));
    }

    #[test]
    fn unknown_camera_has_no_bearing() {
        let p = BearingProjection::default();
        assert_eq!(p.derived_angle(&bbox_at(960.0), 9), None);
        assert_eq!(p.pixel_for_angle(9, 10.0), None);
    }

    #[test]
    fn pixel_for_angle_inverts_projection() {
        let p = BearingProjection::default();
        let px = p.pixel_for_angle(1, 100.0).unwrap();
        let bearing = p.derived_angle(&bbox_at(px), 1).unwrap();
        assert!((bearing - 100.0).abs() < 1e-9);
        // Outside camera 1's field of view.
        assert_eq!(p.pixel_for_angle(1, 200.0), None);
    }

    #[test]
    fn sensor_for_angle_picks_covering_camera() {
        let p = BearingProjection::default();
        assert_eq!(p.sensor_for_angle(90.0), Some(1));
        assert_eq!(p.sensor_for_angle(10.0), Some(4));
        assert_eq!(p.sensor_for_angle(135.0), Some(2));
    }

    #[test]
    fn validate_rejects_bad_calibration() {
        assert!(BearingProjection::default().validate().is_ok());

        let p = BearingProjection::new(0.0, default_sectors());
        assert!(p.validate().is_err());

        let p = BearingProjection::new(1920.0, vec![CameraSector::new(1, 0.0).with_fov(0.0)]);
        assert!(p.validate().is_err());

        let p = BearingProjection::new(1920.0, vec![CameraSector::new(1, 0.0), CameraSector::new(1, 90.0)]);
        assert!(p.validate().is_err());
    }

    #[test]
    fn projection_deserialises_with_defaults() {
        let p: BearingProjection =
            serde_json::from_str(r#"{ "sectors": [ { "sensor_ref": 2, "start_deg": 0.0 } ] }"#).unwrap();
        assert_eq!(p.frame_width_px, 1920.0);
        assert_eq!(p.sectors[0].fov_deg, 90.0);
    }
}
