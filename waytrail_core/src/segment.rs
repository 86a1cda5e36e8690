//! Segment Renderer - dense, evenly spaced positions along a polyline.
//!
//! For every consecutive pair `(p_i, p_i+1)` with length `d` and unit
//! direction `u`, the trail yields `p_i + u·k·s` for `k = 0, 1, 2, …` while
//! `k·s < d`. The end point of a segment is therefore only produced as the
//! start of the next one.
//!
//! ```text
//!   p0 ●───·───·───·───● p1        spacing s, d = 4s
//!      k=0 k=1 k=2 k=3  (not emitted)
//! ```
//!
//! [`SegmentTrail::max_per_leg`] bounds the samples of any one leg. A leg
//! that would need more is sampled at the wider spacing `d / limit`, so the
//! trail still reaches across it.

use crate::geometry;
use nalgebra::Vector3;
use waytrail_env::Location;

/// Lazy trail over a point slice. A clone continues from the same spot;
/// call [`trail`] again to start over.
#[derive(Debug, Clone)]
pub struct SegmentTrail<'a> {
    points: &'a [Location],
    spacing: f64,

    /// Index of the segment start point
    segment: usize,

    /// Step counter within the current segment
    step: u64,

    /// Most samples any one segment yields
    leg_limit: u64,
}

/// Builds the trail for `points` at the given `spacing`.
///
/// Fewer than two points, or a spacing that is not a positive finite
/// number, yields nothing.
pub fn trail(points: &[Location], spacing: f64) -> SegmentTrail<'_> {
    SegmentTrail {
        points,
        spacing,
        segment: 0,
        step: 0,
        leg_limit: u64::MAX,
    }
}

impl SegmentTrail<'_> {
    /// Caps every leg at `limit` samples (at least one).
    pub fn max_per_leg(mut self, limit: usize) -> Self {
        self.leg_limit = (limit as u64).max(1);
        self
    }

    fn leg_spacing(&self, length: f64) -> f64 {
        let limit = self.leg_limit as f64;
        if length / self.spacing > limit {
            length / limit
        } else {
            self.spacing
        }
    }
}

/// Direction and length of a drawable segment.
///
/// Segments crossing worlds or joining coincident points are skipped.
fn leg(from: &Location, to: &Location) -> Option<(Vector3<f64>, f64)> {
    if !from.same_world(to) {
        return None;
    }
    let dir = geometry::direction(&from.position, &to.position)?;
    Some((dir, geometry::distance(&from.position, &to.position)))
}

impl Iterator for SegmentTrail<'_> {
    type Item = Location;

    fn next(&mut self) -> Option<Location> {
        if !(self.spacing > 0.0 && self.spacing.is_finite()) {
            return None;
        }

        while self.segment + 1 < self.points.len() {
            let from = &self.points[self.segment];
            let to = &self.points[self.segment + 1];

            if let Some((dir, length)) = leg(from, to) {
                let along = self.step as f64 * self.leg_spacing(length);
                if along < length && self.step < self.leg_limit {
                    self.step += 1;
                    return Some(Location {
                        world: from.world.clone(),
                        position: geometry::offset(&from.position, &dir, along),
                        yaw: from.yaw,
                        pitch: from.pitch,
                    });
                }
            }

            self.segment += 1;
            self.step = 0;
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn at(x: f64, y: f64, z: f64) -> Location {
        Location::new("world", x, y, z)
    }

    #[test]
    fn test_ten_units_at_two_and_a_half() {
        let points = [at(0.0, 0.0, 0.0), at(10.0, 0.0, 0.0)];
        let xs: Vec<f64> = trail(&points, 2.5).map(|p| p.x()).collect();
        assert_eq!(xs, vec![0.0, 2.5, 5.0, 7.5]);
    }

    #[test]
    fn test_endpoint_not_emitted_when_reached_exactly() {
        let points = [at(0.0, 0.0, 0.0), at(0.0, 3.0, 0.0)];
        let out: Vec<Location> = trail(&points, 1.0).collect();
        assert_eq!(out.len(), 3);
        assert!(out.iter().all(|p| p.y() < 3.0));
    }

    #[test]
    fn test_multiple_segments_restart_at_each_point() {
        let points = [at(0.0, 0.0, 0.0), at(1.0, 0.0, 0.0), at(1.0, 0.0, 1.5)];
        let out: Vec<Location> = trail(&points, 1.0).collect();

        // 1 from the first leg, 2 from the second
        assert_eq!(out.len(), 3);
        assert_relative_eq!(out[1].position, Vector3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(out[2].position, Vector3::new(1.0, 0.0, 1.0));
    }

    #[test]
    fn test_degenerate_inputs() {
        assert_eq!(trail(&[], 0.5).count(), 0);
        assert_eq!(trail(&[at(1.0, 1.0, 1.0)], 0.5).count(), 0);

        let points = [at(0.0, 0.0, 0.0), at(4.0, 0.0, 0.0)];
        assert_eq!(trail(&points, 0.0).count(), 0);
        assert_eq!(trail(&points, -1.0).count(), 0);
        assert_eq!(trail(&points, f64::NAN).count(), 0);
    }

    #[test]
    fn test_coincident_and_cross_world_segments_skipped() {
        let points = [
            at(0.0, 0.0, 0.0),
            at(0.0, 0.0, 0.0),
            Location::new("other", 5.0, 0.0, 0.0),
            Location::new("other", 5.0, 1.0, 0.0),
        ];
        let out: Vec<Location> = trail(&points, 0.5).collect();
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|p| p.world == "other"));
    }

    #[test]
    fn test_trail_is_recomputable() {
        let points = [at(0.0, 0.0, 0.0), at(3.0, 4.0, 0.0)];
        let first: Vec<Location> = trail(&points, 0.5).collect();
        let second: Vec<Location> = trail(&points, 0.5).collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 10);
    }

    #[test]
    fn test_long_leg_is_capped() {
        let points = [at(0.0, 0.0, 0.0), at(100_000.0, 0.0, 0.0), at(100_000.0, 0.0, 2.0)];
        let out: Vec<Location> = trail(&points, 0.5).max_per_leg(256).collect();

        // 256 across the long leg, then the short leg at full density
        assert_eq!(out.len(), 256 + 4);
        assert_relative_eq!(out[1].x(), 100_000.0 / 256.0);
        assert!(out[255].x() < 100_000.0);
        assert_relative_eq!(out[257].position, Vector3::new(100_000.0, 0.0, 0.5));
    }

    #[test]
    fn test_cap_leaves_short_legs_alone() {
        let points = [at(0.0, 0.0, 0.0), at(10.0, 0.0, 0.0)];
        let capped: Vec<Location> = trail(&points, 0.5).max_per_leg(20).collect();
        let free: Vec<Location> = trail(&points, 0.5).collect();
        assert_eq!(capped, free);
        assert_eq!(trail(&points, 0.5).max_per_leg(0).count(), 1);
    }

    #[test]
    fn test_orientation_follows_segment_start() {
        let points = [
            at(0.0, 0.0, 0.0).with_orientation(45.0, 10.0),
            at(2.0, 0.0, 0.0).with_orientation(90.0, 0.0),
        ];
        let out: Vec<Location> = trail(&points, 1.0).collect();
        assert!(out.iter().all(|p| p.yaw == 45.0 && p.pitch == 10.0));
    }
}
