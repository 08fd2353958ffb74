//! Text renderers for the live track table.

use navi_types::{TrackKind, TrackView};
use serde::{Deserialize, Serialize};

/// How each track line is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ViewRenderer {
    /// Label, confidence and fusion quality.
    #[default]
    Detection,
    /// Compass point, bearing and range.
    Direction,
}

impl std::fmt::Display for ViewRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViewRenderer::Detection => write!(f, "detection"),
            ViewRenderer::Direction => write!(f, "direction"),
        }
    }
}

impl std::str::FromStr for ViewRenderer {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "detection" => Ok(ViewRenderer::Detection),
            "direction" => Ok(ViewRenderer::Direction),
            other => Err(format!("unknown renderer '{other}' (expected detection|direction)")),
        }
    }
}

impl ViewRenderer {
    /// One table row for `view`.
    pub fn render(&self, view: &TrackView) -> String {
        match self {
            ViewRenderer::Detection => {
                let label = view.class_label.as_deref().unwrap_or("-");
                let confidence = view
                    .confidence
                    .map(|c| format!("{:>3.0}%", c * 100.0))
                    .unwrap_or_else(|| "   -".to_string());
                format!(
                    "{:<6} {:<12} {:<8} {:<16} {} {}",
                    view.id.to_string(),
                    kind_label(view.kind),
                    view.obstacle.to_string(),
                    label,
                    confidence,
                    quality_stars(view.fusion_quality),
                )
            }
            ViewRenderer::Direction => {
                let range = if view.kind == TrackKind::VisionOnly {
                    "    ?".to_string()
                } else {
                    format!("{:>6.1}m", view.distance_m)
                };
                format!(
                    "{:<6} {:<2} {:>5.1}° {} {}",
                    view.id.to_string(),
                    compass_point(view.angle_deg),
                    view.angle_deg,
                    range,
                    view.obstacle,
                )
            }
        }
    }
}

pub fn kind_label(kind: TrackKind) -> &'static str {
    match kind {
        TrackKind::Matched => "MATCHED",
        TrackKind::SpatialOnly => "SPATIAL",
        TrackKind::VisionOnly => "VISION",
    }
}

/// Eight-point compass name for a map bearing (0° = east, anti-clockwise).
pub fn compass_point(angle_deg: f64) -> &'static str {
    const POINTS: [&str; 8] = ["E", "NE", "N", "NW", "W", "SW", "S", "SE"];
    let sector = ((angle_deg.rem_euclid(360.0) + 22.5) / 45.0).floor() as usize % 8;
    POINTS[sector]
}

/// Five-star bar for a fusion quality in `[0, 1]`; blank when unmatched.
pub fn quality_stars(quality: Option<f64>) -> String {
    match quality {
        Some(q) => {
            let filled = (q.clamp(0.0, 1.0) * 5.0).round() as usize;
            format!("{}{}", "*".repeat(filled), ".".repeat(5 - filled))
        }
        None => String::new(),
    }
}
