//! Spatial ↔ vision association.
//!
//! A spatial item and a vision item are **compatible** when they come from
//! the same camera channel, were observed at most `max_time_delta_s` apart,
//! and the vision box projects to a bearing within `max_angle_delta_deg`
//! (circular distance) of the spatial bearing.
//!
//! Assignment is one-to-one and deterministic: every compatible pair is
//! ranked by
//!
//! 1. angular distance,
//! 2. absolute time delta,
//! 3. vision id,
//! 4. spatial id,
//!
//! and pairs are committed greedily in that order, each commit removing both
//! items from further candidacy.  For any spatial item this selects the
//! closest remaining vision item, ties going to the smaller time gap and then
//! the earliest vision id.  The ranking key is total, so the result does not
//! depend on the order in which candidates were supplied.
//!
//! Candidates are either fresh detections from this cycle or single-sided
//! tracks waiting for a counterpart; [`Origin`] tells the caller which.

use navi_types::{BoundingBox, TrackKey};

use crate::config::FusionConfig;
use crate::geometry::angular_distance;

/// Where a candidate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Origin {
    /// Index into the caller's detection batch.
    Detection(usize),
    /// A live single-sided track.
    Track(TrackKey),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpatialCandidate {
    pub origin: Origin,
    pub spatial_id: u64,
    pub sensor_ref: u32,
    pub angle_deg: f64,
    pub observed_at: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VisionCandidate {
    pub origin: Origin,
    pub vision_id: u64,
    pub sensor_ref: u32,
    pub bbox: BoundingBox,
    pub observed_at: f64,
}

/// A committed pairing.  `spatial` and `vision` index the candidate slices
/// passed to [`Matcher::match_candidates`].
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedPair {
    pub spatial: usize,
    pub vision: usize,
    pub angle_delta: f64,
    pub time_delta: f64,
    pub fusion_quality: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchOutcome {
    /// Pairs in commit order.
    pub pairs: Vec<MatchedPair>,
    /// Indices of spatial candidates left unpaired, ascending.
    pub unmatched_spatial: Vec<usize>,
    /// Indices of vision candidates left unpaired, ascending.
    pub unmatched_vision: Vec<usize>,
}

struct Edge {
    spatial: usize,
    vision: usize,
    angle_delta: f64,
    time_delta: f64,
}

/// Stateless pairing logic over borrowed configuration.
pub struct Matcher<'a> {
    config: &'a FusionConfig,
}

impl<'a> Matcher<'a> {
    pub fn new(config: &'a FusionConfig) -> Self {
        Self { config }
    }

    /// `(angle_delta, time_delta)` when the two items may be paired.
    pub fn compatibility(
        &self,
        spatial: &SpatialCandidate,
        vision: &VisionCandidate,
    ) -> Option<(f64, f64)> {
        if spatial.sensor_ref != vision.sensor_ref {
            return None;
        }
        let time_delta = (spatial.observed_at - vision.observed_at).abs();
        if time_delta > self.config.max_time_delta_s {
            return None;
        }
        let bearing = self
            .config
            .projection
            .derived_angle(&vision.bbox, vision.sensor_ref)?;
        let angle_delta = angular_distance(spatial.angle_deg, bearing);
        (angle_delta <= self.config.max_angle_delta_deg).then_some((angle_delta, time_delta))
    }

    /// Weighted angle/time agreement in `[0, 1]`; 1 is a perfect match.
    pub fn fusion_quality(&self, angle_delta: f64, time_delta: f64) -> f64 {
        let angle_score = 1.0 - angle_delta / self.config.max_angle_delta_deg;
        let time_score = 1.0 - time_delta / self.config.max_time_delta_s;
        let total_weight = self.config.angle_weight + self.config.time_weight;
        let quality = (self.config.angle_weight * angle_score + self.config.time_weight * time_score)
            / total_weight;
        quality.clamp(0.0, 1.0)
    }

    /// Pair `spatial` with `vision` one-to-one.
    pub fn match_candidates(
        &self,
        spatial: &[SpatialCandidate],
        vision: &[VisionCandidate],
    ) -> MatchOutcome {
        let mut edges = Vec::new();
        for (si, s) in spatial.iter().enumerate() {
            for (vi, v) in vision.iter().enumerate() {
                if let Some((angle_delta, time_delta)) = self.compatibility(s, v) {
                    edges.push(Edge {
                        spatial: si,
                        vision: vi,
                        angle_delta,
                        time_delta,
                    });
                }
            }
        }

        edges.sort_by(|a, b| {
            a.angle_delta
                .total_cmp(&b.angle_delta)
                .then(a.time_delta.total_cmp(&b.time_delta))
                .then(vision[a.vision].vision_id.cmp(&vision[b.vision].vision_id))
                .then(spatial[a.spatial].spatial_id.cmp(&spatial[b.spatial].spatial_id))
        });

        let mut spatial_taken = vec![false; spatial.len()];
        let mut vision_taken = vec![false; vision.len()];
        let mut pairs = Vec::new();
        for edge in edges {
            if spatial_taken[edge.spatial] || vision_taken[edge.vision] {
                continue;
            }
            spatial_taken[edge.spatial] = true;
            vision_taken[edge.vision] = true;
            pairs.push(MatchedPair {
                spatial: edge.spatial,
                vision: edge.vision,
                angle_delta: edge.angle_delta,
                time_delta: edge.time_delta,
                fusion_quality: self.fusion_quality(edge.angle_delta, edge.time_delta),
            });
        }

        MatchOutcome {
            pairs,
            unmatched_spatial: untaken(&spatial_taken),
            unmatched_vision: untaken(&vision_taken),
        }
    }
}

fn untaken(taken: &[bool]) -> Vec<usize> {
    taken
        .iter()
        .enumerate()
        .filter(|(_, t)| !**t)
        .map(|(i, _)| i)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{BearingProjection, CameraSector};

    // Camera 2 looks at 0°..90°, so a box centred at pixel x sees x * 90 / 1920 degrees.
    fn config() -> FusionConfig {
        FusionConfig {
            projection: BearingProjection::new(
                1920.0,
                vec![CameraSector::new(2, 0.0), CameraSector::new(3, 300.0)],
            ),
            ..Default::default()
        }
    }

    fn bbox_for(bearing: f64, start: f64) -> BoundingBox {
        let cx = (bearing - start).rem_euclid(360.0) / 90.0 * 1920.0;
        BoundingBox::new(cx - 40.0, 100.0, cx + 40.0, 180.0)
    }

    fn s(id: u64, sensor: u32, angle: f64, t: f64) -> SpatialCandidate {
        SpatialCandidate {
            origin: Origin::Detection(id as usize),
            spatial_id: id,
            sensor_ref: sensor,
            angle_deg: angle,
            observed_at: t,
        }
    }

    fn v(id: u64, sensor: u32, bearing: f64, t: f64) -> VisionCandidate {
        let start = if sensor == 3 { 300.0 } else { 0.0 };
        VisionCandidate {
            origin: Origin::Detection(id as usize),
            vision_id: id,
            sensor_ref: sensor,
            bbox: bbox_for(bearing, start),
            observed_at: t,
        }
    }

    #[test]
    fn compatible_pair_is_matched() {
        let cfg = config();
        let m = Matcher::new(&cfg);
        let out = m.match_candidates(&[s(1, 2, 45.0, 100.0)], &[v(5, 2, 47.0, 102.0)]);
        assert_eq!(out.pairs.len(), 1);
        let pair = &out.pairs[0];
        assert!((pair.angle_delta - 2.0).abs() < 1e-9);
        assert_eq!(pair.time_delta, 2.0);
        assert!(out.unmatched_spatial.is_empty());
        assert!(out.unmatched_vision.is_empty());
    }

    #[test]
    fn different_camera_never_matches() {
        let cfg = config();
        let m = Matcher::new(&cfg);
        let out = m.match_candidates(&[s(1, 2, 45.0, 100.0)], &[v(5, 3, 45.0, 100.0)]);
        assert!(out.pairs.is_empty());
        assert_eq!(out.unmatched_spatial, vec![0]);
        assert_eq!(out.unmatched_vision, vec![0]);
    }

    #[test]
    fn time_window_is_inclusive() {
        let cfg = config();
        let m = Matcher::new(&cfg);
        assert!(m.compatibility(&s(1, 2, 45.0, 100.0), &v(5, 2, 45.0, 106.0)).is_some());
        assert!(m.compatibility(&s(1, 2, 45.0, 100.0), &v(5, 2, 45.0, 106.5)).is_none());
        // Order of observation does not matter.
        assert!(m.compatibility(&s(1, 2, 45.0, 106.0), &v(5, 2, 45.0, 100.0)).is_some());
    }

    #[test]
    fn angle_window_uses_circular_distance() {
        let cfg = config();
        let m = Matcher::new(&cfg);
        // Camera 3 spans 300°..30°: a box at 350° vs a return at 10° is 20° apart.
        let (angle, _) = m.compatibility(&s(1, 3, 10.0, 0.0), &v(5, 3, 350.0, 0.0)).unwrap();
        assert!((angle - 20.0).abs() < 1e-9);
        // 50° apart is outside the 45° window.
        assert!(m.compatibility(&s(1, 2, 10.0, 0.0), &v(5, 2, 60.0, 0.0)).is_none());
    }

    #[test]
    fn closest_bearing_wins() {
        let cfg = config();
        let m = Matcher::new(&cfg);
        let out = m.match_candidates(
            &[s(1, 2, 45.0, 100.0)],
            &[v(7, 2, 60.0, 100.0), v(8, 2, 44.0, 104.0), v(9, 2, 30.0, 100.0)],
        );
        assert_eq!(out.pairs.len(), 1);
        assert_eq!(out.pairs[0].vision, 1);
        assert_eq!(out.unmatched_vision, vec![0, 2]);
    }

    #[test]
    fn equal_bearing_tie_broken_by_time_then_id() {
        let cfg = config();
        let m = Matcher::new(&cfg);
        let out = m.match_candidates(
            &[s(1, 2, 45.0, 100.0)],
            &[v(9, 2, 45.0, 103.0), v(8, 2, 45.0, 101.0)],
        );
        assert_eq!(out.pairs[0].vision, 1, "smaller time delta wins");

        let out = m.match_candidates(
            &[s(1, 2, 45.0, 100.0)],
            &[v(9, 2, 45.0, 101.0), v(4, 2, 45.0, 101.0)],
        );
        assert_eq!(out.pairs[0].vision, 1, "earliest vision id wins");
    }

    #[test]
    fn matching_is_one_to_one() {
        let cfg = config();
        let m = Matcher::new(&cfg);
        let out = m.match_candidates(
            &[s(1, 2, 45.0, 100.0), s(2, 2, 46.0, 100.0)],
            &[v(5, 2, 45.5, 100.0)],
        );
        assert_eq!(out.pairs.len(), 1);
        assert_eq!(out.unmatched_spatial.len(), 1);
    }

    #[test]
    fn greedy_pairs_each_side_with_its_nearest() {
        let cfg = config();
        let m = Matcher::new(&cfg);
        let out = m.match_candidates(
            &[s(1, 2, 20.0, 0.0), s(2, 2, 70.0, 0.0)],
            &[v(5, 2, 68.0, 0.0), v(6, 2, 22.0, 0.0)],
        );
        let mut pairs: Vec<(usize, usize)> = out.pairs.iter().map(|p| (p.spatial, p.vision)).collect();
        pairs.sort();
        assert_eq!(pairs, vec![(0, 1), (1, 0)]);
    }

    #[test]
    fn result_independent_of_input_order() {
        let cfg = config();
        let m = Matcher::new(&cfg);
        let spatial = vec![s(1, 2, 40.0, 100.0), s(2, 2, 42.0, 101.0), s(3, 2, 80.0, 99.0)];
        let vision = vec![v(5, 2, 41.0, 100.0), v(6, 2, 41.0, 100.0), v(7, 2, 79.0, 103.0)];

        let ids = |sp: &[SpatialCandidate], vi: &[VisionCandidate], out: &MatchOutcome| {
            let mut pairs: Vec<(u64, u64)> = out
                .pairs
                .iter()
                .map(|p| (sp[p.spatial].spatial_id, vi[p.vision].vision_id))
                .collect();
            pairs.sort();
            pairs
        };

        let forward = m.match_candidates(&spatial, &vision);
        let mut sr = spatial.clone();
        sr.reverse();
        let mut vr = vision.clone();
        vr.reverse();
        let reversed = m.match_candidates(&sr, &vr);

        assert_eq!(ids(&spatial, &vision, &forward), ids(&sr, &vr, &reversed));
        // Repeated runs are identical.
        assert_eq!(forward, m.match_candidates(&spatial, &vision));
    }

    #[test]
    fn unknown_camera_sector_never_matches() {
        let cfg = config();
        let m = Matcher::new(&cfg);
        let out = m.match_candidates(&[s(1, 9, 45.0, 0.0)], &[v(5, 9, 45.0, 0.0)]);
        assert!(out.pairs.is_empty());
    }

    #[test]
    fn quality_is_one_for_perfect_agreement_and_falls_off() {
        let cfg = config();
        let m = Matcher::new(&cfg);
        assert!((m.fusion_quality(0.0, 0.0) - 1.0).abs() < 1e-12);
        assert!((m.fusion_quality(45.0, 6.0)).abs() < 1e-12);
        let q = m.fusion_quality(22.5, 0.0);
        assert!((q - 0.7).abs() < 1e-12);
    }
}
