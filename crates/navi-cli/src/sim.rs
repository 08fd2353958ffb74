//! Scripted sea for the demo host.
//!
//! Objects appear on the spawn interval at golden-angle spaced bearings,
//! drift and close in at fixed rates, and vanish after their lifetime.  Seven
//! in ten are seen by both sensors, two only by a camera, one only by the
//! spatial sensor.  Everything is a pure function of the spawn serial and the clock,
//! so two runs with the same timing produce the same detections.

use navi_fusion::geometry::{BearingProjection, normalize_angle};
use navi_fusion::source::{SpatialSource, VisionSource};
use navi_types::{BoundingBox, NaviError, SpatialDetection, VisionDetection};

const LABELS: [&str; 6] = ["boat", "person", "debris", "vessel", "buoy", "unknown"];
const GOLDEN_ANGLE_DEG: f64 = 137.508;
const HORIZON_Y_PX: f64 = 540.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visibility {
    Both,
    SpatialOnly,
    VisionOnly,
}

#[derive(Debug, Clone)]
struct SimObject {
    serial: u64,
    label: &'static str,
    visibility: Visibility,
    angle_deg: f64,
    distance_m: f64,
    drift_deg_s: f64,
    approach_m_s: f64,
    intensity: f64,
    confidence: f64,
    camera_offset_deg: f64,
    expires_at: f64,
}

impl SimObject {
    fn spawn(serial: u64, now: f64) -> Self {
        let visibility = match serial % 10 {
            7 | 8 => Visibility::VisionOnly,
            9 => Visibility::SpatialOnly,
            _ => Visibility::Both,
        };
        Self {
            serial,
            label: LABELS[(serial % LABELS.len() as u64) as usize],
            visibility,
            angle_deg: normalize_angle(serial as f64 * GOLDEN_ANGLE_DEG),
            distance_m: 20.0 + ((serial * 97) % 280) as f64,
            drift_deg_s: ((serial % 5) as f64 - 2.0) * 0.5,
            approach_m_s: 1.5 + (serial % 3) as f64,
            intensity: 0.55 + (serial % 5) as f64 * 0.1,
            confidence: 0.72 + (serial % 4) as f64 * 0.07,
            camera_offset_deg: ((serial % 3) as f64 - 1.0) * 1.5,
            expires_at: now + 12.0 + (serial % 4) as f64 * 6.0,
        }
    }

    fn advance(&mut self, dt: f64) {
        self.angle_deg = normalize_angle(self.angle_deg + self.drift_deg_s * dt);
        self.distance_m = (self.distance_m - self.approach_m_s * dt).max(1.0);
    }
}

/// Deterministic detection producer implementing both source traits.
#[derive(Debug)]
pub struct SimulatedSea {
    projection: BearingProjection,
    spawn_interval_s: f64,
    max_objects: usize,
    objects: Vec<SimObject>,
    spawned: u64,
    next_spawn_at: f64,
    clock: Option<f64>,
}

impl SimulatedSea {
    pub fn new(projection: BearingProjection, spawn_interval_s: f64, max_objects: usize) -> Self {
        Self {
            projection,
            spawn_interval_s,
            max_objects,
            objects: Vec::new(),
            spawned: 0,
            next_spawn_at: 0.0,
            clock: None,
        }
    }

    pub fn live_objects(&self) -> usize {
        self.objects.len()
    }

    /// Move the scene forward to `now`.  Going backwards is a no-op.
    pub fn advance(&mut self, now: f64) {
        if self.clock.is_some_and(|last| now <= last) {
            return;
        }
        let dt = now - self.clock.unwrap_or(now);
        self.clock = Some(now);
        for object in &mut self.objects {
            object.advance(dt);
        }
        self.objects.retain(|o| o.expires_at > now);

        while self.next_spawn_at <= now {
            if self.objects.len() < self.max_objects {
                self.spawned += 1;
                self.objects.push(SimObject::spawn(self.spawned, now));
            }
            self.next_spawn_at += self.spawn_interval_s;
        }
    }

    fn bbox_for(&self, object: &SimObject, camera_angle: f64) -> Option<(u32, BoundingBox)> {
        let sensor = self.projection.sensor_for_angle(camera_angle)?;
        let center_x = self.projection.pixel_for_angle(sensor, camera_angle)?;
        let width = (4000.0 / object.distance_m.max(10.0)).clamp(16.0, 240.0);
        let height = width * 0.6;
        Some((
            sensor,
            BoundingBox::new(
                center_x - width / 2.0,
                HORIZON_Y_PX - height / 2.0,
                center_x + width / 2.0,
                HORIZON_Y_PX + height / 2.0,
            ),
        ))
    }
}

impl SpatialSource for SimulatedSea {
    fn id(&self) -> &str {
        "simulated_sea"
    }

    fn poll_spatial(&mut self, now: f64) -> Result<Vec<SpatialDetection>, NaviError> {
        self.advance(now);
        Ok(self
            .objects
            .iter()
            .filter(|o| o.visibility != Visibility::VisionOnly)
            .filter_map(|o| {
                Some(SpatialDetection {
                    spatial_id: o.serial,
                    sensor_ref: Some(self.projection.sensor_for_angle(o.angle_deg)?),
                    angle_deg: o.angle_deg,
                    distance_m: o.distance_m,
                    observed_at: now,
                    intensity: Some(o.intensity.min(1.0)),
                })
            })
            .collect())
    }
}

impl VisionSource for SimulatedSea {
    fn id(&self) -> &str {
        "simulated_sea"
    }

    fn poll_vision(&mut self, now: f64) -> Result<Vec<VisionDetection>, NaviError> {
        self.advance(now);
        Ok(self
            .objects
            .iter()
            .filter(|o| o.visibility != Visibility::SpatialOnly)
            .filter_map(|o| {
                let (sensor, bbox) = self.bbox_for(o, normalize_angle(o.angle_deg + o.camera_offset_deg))?;
                Some(VisionDetection {
                    vision_id: o.serial,
                    sensor_ref: Some(sensor),
                    bbox,
                    class_label: o.label.to_string(),
                    confidence: o.confidence.min(1.0),
                    observed_at: now,
                })
            })
            .collect())
    }
}
