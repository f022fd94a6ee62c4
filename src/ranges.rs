// ranges.rs - longitude/latitude ranges and fov/zoom bounds

use crate::coords::{clamp_latitude, normalize_longitude, Position};
use serde::{Deserialize, Serialize};
use std::f64::consts::{PI, TAU};

/// Boundary of a range that a position was clamped against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
    Top,
    Bottom,
}

/// `[min, max]` bounds, either side may be open.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Range {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl Range {
    pub const UNBOUNDED: Range = Range {
        min: None,
        max: None,
    };

    pub fn new(min: f64, max: f64) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }
}

/// Longitude and latitude ranges of the viewer.
///
/// Longitudes are compared modulo 2π, so `min > max` describes a range that
/// crosses the 0/2π seam. Latitude ranges are kept ascending by the config layer.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Ranges {
    pub longitude: Range,
    pub latitude: Range,
}

/// Clamps `position` in place and returns the sides that were hit.
///
/// `h_offset`/`v_offset` shrink the ranges (half the visible fov) so that the
/// edges of the view stay inside them; pass zero for a plain clamp. A range
/// narrower than the view pins the camera to its middle.
pub fn apply_ranges(position: &mut Position, ranges: &Ranges, h_offset: f64, v_offset: f64) -> Vec<Side> {
    let mut sides = Vec::new();

    match (ranges.longitude.min, ranges.longitude.max) {
        (Some(min), Some(max)) => {
            if let Some(side) = clamp_longitude(&mut position.longitude, min, max, h_offset) {
                sides.push(side);
            }
        }
        (Some(min), None) => {
            let r0 = normalize_longitude(min + h_offset);
            if position.longitude < r0 {
                position.longitude = r0;
                sides.push(Side::Left);
            }
        }
        (None, Some(max)) => {
            let r1 = normalize_longitude(max - h_offset);
            if position.longitude > r1 {
                position.longitude = r1;
                sides.push(Side::Right);
            }
        }
        (None, None) => {}
    }

    let lat_min = ranges.latitude.min.map(clamp_latitude);
    let lat_max = ranges.latitude.max.map(clamp_latitude);
    let (r0, r1) = match (lat_min, lat_max) {
        (Some(min), Some(max)) if min + v_offset > max - v_offset => {
            let mid = (min + max) / 2.0;
            (Some(mid), Some(mid))
        }
        (Some(min), Some(max)) => (Some(min + v_offset), Some(max - v_offset)),
        (Some(min), None) => (Some(clamp_latitude(min + v_offset)), None),
        (None, Some(max)) => (None, Some(clamp_latitude(max - v_offset))),
        (None, None) => (None, None),
    };

    if let Some(r0) = r0.filter(|r0| position.latitude < *r0) {
        position.latitude = r0;
        sides.push(Side::Bottom);
    } else if let Some(r1) = r1.filter(|r1| position.latitude > *r1) {
        position.latitude = r1;
        sides.push(Side::Top);
    }

    sides
}

/// Longitude clamp against `[min, max]` walked eastwards from `min`, so a range
/// with `min > max` crosses the 0/2π seam.
fn clamp_longitude(longitude: &mut f64, min: f64, max: f64, offset: f64) -> Option<Side> {
    if (max - min).abs() >= TAU {
        return None;
    }
    let min = normalize_longitude(min);
    let span = normalize_longitude(normalize_longitude(max) - min);

    if span <= 2.0 * offset {
        let mid = normalize_longitude(min + span / 2.0);
        let from_mid = normalize_longitude(*longitude - mid);
        if from_mid.min(TAU - from_mid) <= EPSILON {
            return None;
        }
        *longitude = mid;
        return Some(if from_mid < PI { Side::Right } else { Side::Left });
    }

    let r0 = normalize_longitude(min + offset);
    let inner = span - 2.0 * offset;
    let past_r0 = normalize_longitude(*longitude - r0);
    if past_r0 <= inner + EPSILON {
        return None;
    }
    // outside: snap to whichever end is closer
    if past_r0 - inner < TAU - past_r0 {
        *longitude = normalize_longitude(r0 + inner);
        Some(Side::Right)
    } else {
        *longitude = r0;
        Some(Side::Left)
    }
}

const EPSILON: f64 = 1e-9;

pub const MIN_ZOOM_LEVEL: u8 = 0;
pub const MAX_ZOOM_LEVEL: u8 = 100;

/// Vertical fov bounds in degrees. Level 0 is `max_fov`, level 100 is `min_fov`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FovBounds {
    pub min_fov: f64,
    pub max_fov: f64,
}

impl FovBounds {
    pub fn new(min_fov: f64, max_fov: f64) -> Self {
        Self { min_fov, max_fov }
    }

    pub fn clamp_level(level: f64) -> u8 {
        if level.is_nan() {
            return MIN_ZOOM_LEVEL;
        }
        level
            .round()
            .clamp(MIN_ZOOM_LEVEL as f64, MAX_ZOOM_LEVEL as f64) as u8
    }

    pub fn level_to_vfov(&self, level: u8) -> f64 {
        let level = level.min(MAX_ZOOM_LEVEL) as f64;
        self.max_fov + (level / MAX_ZOOM_LEVEL as f64) * (self.min_fov - self.max_fov)
    }

    pub fn fov_to_level(&self, fov: f64) -> u8 {
        let span = self.min_fov - self.max_fov;
        if span == 0.0 {
            return MIN_ZOOM_LEVEL;
        }
        Self::clamp_level((fov - self.max_fov) / span * MAX_ZOOM_LEVEL as f64)
    }

    /// Level of `default_fov`, or of the midpoint fov when none is given.
    pub fn default_level(&self, default_fov: Option<f64>) -> u8 {
        let fov = default_fov.unwrap_or((self.min_fov + self.max_fov) / 2.0);
        self.fov_to_level(fov)
    }
}

/// Horizontal fov (degrees) for a vertical fov (degrees) and an aspect ratio.
pub fn horizontal_fov(v_fov: f64, aspect: f64) -> f64 {
    (2.0 * ((v_fov.to_radians() / 2.0).tan() * aspect).atan()).to_degrees()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, FRAC_PI_8, PI, TAU};

    fn seam_ranges() -> Ranges {
        Ranges {
            longitude: Range::new(7.0 * FRAC_PI_4, FRAC_PI_4),
            latitude: Range::UNBOUNDED,
        }
    }

    #[test]
    fn seam_range_accepts_inside_values() {
        for lon in [0.0, FRAC_PI_8] {
            let mut p = Position::new(lon, 0.0);
            let sides = apply_ranges(&mut p, &seam_ranges(), 0.0, 0.0);
            assert!(sides.is_empty());
            assert_eq!(p.longitude, lon);
        }
    }

    #[test]
    fn seam_range_clamps_outside_value() {
        let mut p = Position::new(FRAC_PI_2, 0.0);
        let sides = apply_ranges(&mut p, &seam_ranges(), 0.0, 0.0);
        assert_eq!(sides, vec![Side::Right]);
        assert!((p.longitude - FRAC_PI_4).abs() < 1e-12);

        let mut p = Position::new(3.0 * FRAC_PI_2 - 0.1, 0.0);
        let sides = apply_ranges(&mut p, &seam_ranges(), 0.0, 0.0);
        assert_eq!(sides, vec![Side::Left]);
        assert!((p.longitude - 7.0 * FRAC_PI_4).abs() < 1e-12);
    }

    #[test]
    fn apply_ranges_is_idempotent() {
        let ranges = Ranges {
            longitude: Range::new(1.0, 2.0),
            latitude: Range::new(-0.5, 0.5),
        };
        for (lon, lat) in [(0.2, 1.0), (3.0, -1.0), (1.5, 0.0), (PI, 0.4)] {
            let mut once = Position::new(lon, lat);
            apply_ranges(&mut once, &ranges, 0.1, 0.2);
            let mut twice = once;
            let sides = apply_ranges(&mut twice, &ranges, 0.1, 0.2);
            assert_eq!(once, twice);
            assert!(sides.is_empty());
        }
    }

    #[test]
    fn longitude_range_narrower_than_view_pins_to_middle() {
        let ranges = Ranges {
            longitude: Range::new(1.0, 2.0),
            latitude: Range::UNBOUNDED,
        };
        let mut p = Position::new(3.0, 0.0);
        assert_eq!(apply_ranges(&mut p, &ranges, 0.85, 0.0), vec![Side::Right]);
        assert!((p.longitude - 1.5).abs() < 1e-12);

        let mut p = Position::new(5.0, 0.0);
        assert_eq!(apply_ranges(&mut p, &ranges, 0.85, 0.0), vec![Side::Left]);
        assert!((p.longitude - 1.5).abs() < 1e-12);
        assert!(apply_ranges(&mut p, &ranges, 0.85, 0.0).is_empty());
    }

    #[test]
    fn fov_offset_does_not_flip_a_seam_range() {
        // [6, 1] crosses the seam; shrunk by 0.5 on each side it is [0.217, 0.5]
        let ranges = Ranges {
            longitude: Range::new(6.0, 1.0),
            latitude: Range::UNBOUNDED,
        };
        let mut p = Position::new(0.3, 0.0);
        assert!(apply_ranges(&mut p, &ranges, 0.5, 0.0).is_empty());

        let mut p = Position::new(3.0, 0.0);
        assert_eq!(apply_ranges(&mut p, &ranges, 0.5, 0.0), vec![Side::Right]);
        assert!((p.longitude - 0.5).abs() < 1e-12);

        let mut p = Position::new(5.5, 0.0);
        assert_eq!(apply_ranges(&mut p, &ranges, 0.5, 0.0), vec![Side::Left]);
        assert!((p.longitude - (6.5 - TAU)).abs() < 1e-12);
    }

    #[test]
    fn full_turn_longitude_range_is_open() {
        let ranges = Ranges {
            longitude: Range::new(0.0, TAU),
            latitude: Range::UNBOUNDED,
        };
        let mut p = Position::new(0.1, 0.0);
        assert!(apply_ranges(&mut p, &ranges, 0.5, 0.0).is_empty());
        assert_eq!(p.longitude, 0.1);
    }

    #[test]
    fn narrow_latitude_range_settles_in_one_call() {
        let ranges = Ranges {
            longitude: Range::UNBOUNDED,
            latitude: Range::new(-0.1, 0.1),
        };
        for lat in [-1.0, 0.05, 1.0] {
            let mut once = Position::new(0.0, lat);
            apply_ranges(&mut once, &ranges, 0.0, 0.5);
            assert!(once.latitude.abs() < 1e-12);
            let mut twice = once;
            assert!(apply_ranges(&mut twice, &ranges, 0.0, 0.5).is_empty());
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn latitude_range_reports_top_and_bottom() {
        let ranges = Ranges {
            longitude: Range::UNBOUNDED,
            latitude: Range::new(-0.5, 0.5),
        };
        let mut p = Position::new(0.0, 1.0);
        assert_eq!(apply_ranges(&mut p, &ranges, 0.0, 0.0), vec![Side::Top]);
        assert_eq!(p.latitude, 0.5);
        let mut p = Position::new(0.0, -1.0);
        assert_eq!(apply_ranges(&mut p, &ranges, 0.0, 0.0), vec![Side::Bottom]);
        assert_eq!(p.latitude, -0.5);
    }

    #[test]
    fn fov_offset_shrinks_latitude_range() {
        let ranges = Ranges {
            longitude: Range::UNBOUNDED,
            latitude: Range::new(-0.5, 0.5),
        };
        let mut p = Position::new(0.0, 0.45);
        apply_ranges(&mut p, &ranges, 0.0, 0.1);
        assert!((p.latitude - 0.4).abs() < 1e-12);
    }

    #[test]
    fn zoom_levels_clamp() {
        assert_eq!(FovBounds::clamp_level(150.0), 100);
        assert_eq!(FovBounds::clamp_level(-10.0), 0);
        assert_eq!(FovBounds::clamp_level(49.6), 50);
    }

    #[test]
    fn zoom_level_maps_to_vfov() {
        let b = FovBounds::new(30.0, 90.0);
        assert_eq!(b.level_to_vfov(50), 60.0);
        assert_eq!(b.level_to_vfov(0), 90.0);
        assert_eq!(b.level_to_vfov(100), 30.0);
        assert_eq!(b.default_level(None), 50);
        assert_eq!(b.default_level(Some(90.0)), 0);
        assert_eq!(b.default_level(Some(10.0)), 100);
    }

    #[test]
    fn square_viewport_has_equal_fovs() {
        assert!((horizontal_fov(60.0, 1.0) - 60.0).abs() < 1e-9);
        assert!(horizontal_fov(60.0, 2.0) > 60.0);
    }
}
