//! `SpatialSource` and `VisionSource` traits for detection producers.
//!
//! Radar drivers, detector pipelines and the simulator implement these and
//! are drained into a [`FusionEngine`](crate::engine::FusionEngine) with
//! [`pump_spatial`](crate::engine::FusionEngine::pump_spatial) /
//! [`pump_vision`](crate::engine::FusionEngine::pump_vision).  The engine
//! only ever talks to the trait, so producers can be swapped freely.

use navi_types::{NaviError, SpatialDetection, VisionDetection};

/// A producer of bearing + range returns.
pub trait SpatialSource: Send {
    /// Stable identifier for this source, e.g. `"bow_radar"`.
    fn id(&self) -> &str;

    /// Detections produced since the last poll, as of engine time `now`.
    ///
    /// # Errors
    ///
    /// Returns [`NaviError::Channel`] when the producer is disconnected.
    fn poll_spatial(&mut self, now: f64) -> Result<Vec<SpatialDetection>, NaviError>;
}

/// A producer of image detections.
pub trait VisionSource: Send {
    fn id(&self) -> &str;

    /// # Errors
    ///
    /// Returns [`NaviError::Channel`] when the producer is disconnected.
    fn poll_vision(&mut self, now: f64) -> Result<Vec<VisionDetection>, NaviError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockRadar {
        next_id: u64,
    }

    impl SpatialSource for MockRadar {
        fn id(&self) -> &str {
            "mock_radar"
        }

        fn poll_spatial(&mut self, now: f64) -> Result<Vec<SpatialDetection>, NaviError> {
            self.next_id += 1;
            Ok(vec![SpatialDetection {
                spatial_id: self.next_id,
                sensor_ref: Some(1),
                angle_deg: 10.0,
                distance_m: 80.0,
                observed_at: now,
                intensity: Some(0.5),
            }])
        }
    }

    #[test]
    fn mock_radar_poll() {
        let mut radar = MockRadar { next_id: 0 };
        assert_eq!(radar.id(), "mock_radar");
        let batch = radar.poll_spatial(3.0).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].spatial_id, 1);
        assert_eq!(batch[0].observed_at, 3.0);
    }
}
