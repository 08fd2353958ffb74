//! Runtime-adjustable fusion parameters.
//!
//! Every threshold the engine uses lives in [`FusionConfig`].  The struct is
//! `serde`-friendly so the host can load it from the `[fusion]` table of its
//! TOML config; every field has a default, so a partial table is valid.

use navi_types::NaviError;
use serde::{Deserialize, Serialize};

use crate::geometry::BearingProjection;

fn default_max_time_delta_s() -> f64 {
    6.0
}
fn default_max_angle_delta_deg() -> f64 {
    45.0
}
fn default_cleanup_threshold_s() -> f64 {
    8.0
}
fn default_spawn_interval_s() -> f64 {
    3.0
}
fn default_source_timeout_s() -> f64 {
    10.0
}
fn default_angle_weight() -> f64 {
    0.6
}
fn default_time_weight() -> f64 {
    0.4
}
fn default_history_len() -> usize {
    100
}

/// Matching, lifecycle and projection parameters for one engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionConfig {
    /// Largest observation-time gap between a spatial and a vision item that
    /// may still be paired.
    #[serde(default = "default_max_time_delta_s")]
    pub max_time_delta_s: f64,

    /// Largest bearing disagreement (circular) that may still be paired.
    #[serde(default = "default_max_angle_delta_deg")]
    pub max_angle_delta_deg: f64,

    /// Silence after which a side is considered gone.  A track with every
    /// present side silent for longer than this expires.
    #[serde(default = "default_cleanup_threshold_s")]
    pub cleanup_threshold_s: f64,

    /// Cadence of the synthetic detection generator.  Not used by the
    /// engine itself; carried here so hosts read it from one place.
    #[serde(default = "default_spawn_interval_s")]
    pub spawn_interval_s: f64,

    /// Silence after which a whole source is reported as silent.
    #[serde(default = "default_source_timeout_s")]
    pub source_timeout_s: f64,

    /// Weight of bearing agreement in the fusion quality score.
    #[serde(default = "default_angle_weight")]
    pub angle_weight: f64,

    /// Weight of time agreement in the fusion quality score.
    #[serde(default = "default_time_weight")]
    pub time_weight: f64,

    /// Number of recent cycle views the engine keeps.  `0` disables the
    /// history.
    #[serde(default = "default_history_len")]
    pub history_len: usize,

    #[serde(default)]
    pub projection: BearingProjection,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            max_time_delta_s: default_max_time_delta_s(),
            max_angle_delta_deg: default_max_angle_delta_deg(),
            cleanup_threshold_s: default_cleanup_threshold_s(),
            spawn_interval_s: default_spawn_interval_s(),
            source_timeout_s: default_source_timeout_s(),
            angle_weight: default_angle_weight(),
            time_weight: default_time_weight(),
            history_len: default_history_len(),
            projection: BearingProjection::default(),
        }
    }
}

impl FusionConfig {
    /// Check that every threshold is usable.
    ///
    /// # Errors
    ///
    /// Returns [`NaviError::Config`] naming the first offending field.
    pub fn validate(&self) -> Result<(), NaviError> {
        let positive = [
            ("max_time_delta_s", self.max_time_delta_s),
            ("cleanup_threshold_s", self.cleanup_threshold_s),
            ("spawn_interval_s", self.spawn_interval_s),
            ("source_timeout_s", self.source_timeout_s),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(NaviError::Config(format!("{name} must be positive, got {value}")));
            }
        }
        if !self.max_angle_delta_deg.is_finite()
            || self.max_angle_delta_deg <= 0.0
            || self.max_angle_delta_deg > 180.0
        {
            return Err(NaviError::Config(format!(
                "max_angle_delta_deg must lie in (0, 180], got {}",
                self.max_angle_delta_deg
            )));
        }
        let weights_ok = [self.angle_weight, self.time_weight]
            .iter()
            .all(|w| w.is_finite() && *w >= 0.0);
        if !weights_ok || self.angle_weight + self.time_weight <= 0.0 {
            return Err(NaviError::Config(
                "quality weights must be non-negative and not both zero".into(),
            ));
        }
        self.projection.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_dashboard_constants() {
        let cfg = FusionConfig::default();
        assert_eq!(cfg.max_time_delta_s, 6.0);
        assert_eq!(cfg.max_angle_delta_deg, 45.0);
        assert_eq!(cfg.cleanup_threshold_s, 8.0);
        assert_eq!(cfg.spawn_interval_s, 3.0);
        assert_eq!(cfg.history_len, 100);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_table_fills_defaults() {
        let cfg: FusionConfig = serde_json::from_str(r#"{ "cleanup_threshold_s": 12.0 }"#).unwrap();
        assert_eq!(cfg.cleanup_threshold_s, 12.0);
        assert_eq!(cfg.max_angle_delta_deg, 45.0);
        assert_eq!(cfg.projection, BearingProjection::default());
    }

    #[test]
    fn validate_rejects_nonsense() {
        let cfg = FusionConfig { cleanup_threshold_s: 0.0, ..Default::default() };
        assert!(matches!(cfg.validate(), Err(NaviError::Config(msg)) if msg.contains("cleanup_threshold_s")));

        let cfg = FusionConfig { max_angle_delta_deg: 200.0, ..Default::default() };
        assert!(cfg.validate().is_err());

        let cfg = FusionConfig { angle_weight: 0.0, time_weight: 0.0, ..Default::default() };
        assert!(cfg.validate().is_err());

        let cfg = FusionConfig { max_time_delta_s: f64::NAN, ..Default::default() };
        assert!(cfg.validate().is_err());
    }
}
