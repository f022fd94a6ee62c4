// coords.rs - spherical / cartesian / viewer pixel / texture pixel conversions

use glam::DVec3;
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, PI, TAU};

/// Radius of the virtual sphere the panorama is mapped onto.
pub const SPHERE_RADIUS: f64 = 100.0;

/// A viewing direction. Longitude in [0, 2π), latitude in [-π/2, π/2].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub longitude: f64,
    pub latitude: f64,
}

impl Position {
    /// Builds a normalized position.
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            longitude,
            latitude,
        }
        .normalized()
    }

    pub fn normalized(self) -> Self {
        Self {
            longitude: normalize_longitude(self.longitude),
            latitude: clamp_latitude(self.latitude),
        }
    }
}

/// Pixel coordinates inside the full (uncropped) panorama image.
///
/// Values are not rounded; callers that need whole pixels round themselves.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TextureCoords {
    pub x: f64,
    pub y: f64,
}

/// Either a spherical position or texture pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExtendedPosition {
    Spherical(Position),
    Texture(TextureCoords),
}

impl From<Position> for ExtendedPosition {
    fn from(p: Position) -> Self {
        ExtendedPosition::Spherical(p)
    }
}

impl From<TextureCoords> for ExtendedPosition {
    fn from(t: TextureCoords) -> Self {
        ExtendedPosition::Texture(t)
    }
}

/// Crop metadata of an equirectangular panorama.
///
/// A partial panorama occupies `cropped_width x cropped_height` pixels placed at
/// (`cropped_x`, `cropped_y`) inside a `full_width x full_height` sphere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanoData {
    pub full_width: u32,
    pub full_height: u32,
    pub cropped_width: u32,
    pub cropped_height: u32,
    pub cropped_x: u32,
    pub cropped_y: u32,
}

impl PanoData {
    /// Pano data for an uncropped image of the given size.
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            full_width: width,
            full_height: height,
            cropped_width: width,
            cropped_height: height,
            cropped_x: 0,
            cropped_y: 0,
        }
    }

    pub fn is_cropped(&self) -> bool {
        self.full_width != self.cropped_width || self.full_height != self.cropped_height
    }
}

/// Viewport size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn aspect(&self) -> f64 {
        if self.height == 0 {
            1.0
        } else {
            self.width as f64 / self.height as f64
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl Default for Size {
    fn default() -> Self {
        Self::new(1280, 720)
    }
}

/// Reduces any angle into [0, 2π).
pub fn normalize_longitude(angle: f64) -> f64 {
    if !angle.is_finite() {
        return 0.0;
    }
    let a = angle.rem_euclid(TAU);
    // rem_euclid can round up to exactly TAU for tiny negative inputs
    if a >= TAU {
        0.0
    } else {
        a
    }
}

/// Reduces an angle into [start, start + 2π).
pub fn normalize_angle_from(angle: f64, start: f64) -> f64 {
    normalize_longitude(angle - start) + start
}

/// Clamps a latitude into [-π/2, π/2].
pub fn clamp_latitude(angle: f64) -> f64 {
    if angle.is_nan() {
        return 0.0;
    }
    angle.clamp(-FRAC_PI_2, FRAC_PI_2)
}

/// Signed longitude delta from `from` to `to` with the smallest magnitude.
pub fn shortest_arc(from: f64, to: f64) -> f64 {
    [0.0, TAU, -TAU]
        .iter()
        .map(|c| to - from + c)
        .fold(f64::INFINITY, |best, c| if c.abs() < best.abs() { c } else { best })
}

/// Angular distance between two directions on the unit sphere.
pub fn great_circle_distance(a: Position, b: Position) -> f64 {
    let cos = a.latitude.sin() * b.latitude.sin()
        + a.latitude.cos() * b.latitude.cos() * (b.longitude - a.longitude).cos();
    cos.clamp(-1.0, 1.0).acos()
}

pub fn spherical_to_vector3(position: Position) -> DVec3 {
    let (lon, lat) = (position.longitude, position.latitude);
    DVec3::new(lat.cos() * lon.sin(), lat.sin(), lat.cos() * lon.cos()) * SPHERE_RADIUS
}

/// Inverse of [`spherical_to_vector3`]. At the poles the longitude is arbitrary.
pub fn vector3_to_spherical(vector: DVec3) -> Position {
    let r = vector.length();
    if r == 0.0 || !r.is_finite() {
        return Position::default();
    }
    Position::new(
        vector.x.atan2(vector.z),
        (vector.y / r).clamp(-1.0, 1.0).asin(),
    )
}

pub fn spherical_to_texture(position: Position, pano: &PanoData) -> TextureCoords {
    let p = position.normalized();
    let full_w = pano.full_width as f64;
    let full_h = pano.full_height as f64;

    let relative_long = p.longitude / TAU * full_w;
    let relative_lat = p.latitude / PI * full_h;

    let x = if p.longitude < PI {
        relative_long + full_w / 2.0
    } else {
        relative_long - full_w / 2.0
    };

    TextureCoords {
        x: x - pano.cropped_x as f64,
        y: full_h / 2.0 - relative_lat - pano.cropped_y as f64,
    }
}

pub fn texture_to_spherical(coords: TextureCoords, pano: &PanoData) -> Position {
    let relative_x = (coords.x + pano.cropped_x as f64) / pano.full_width.max(1) as f64 * TAU;
    let relative_y = (coords.y + pano.cropped_y as f64) / pano.full_height.max(1) as f64 * PI;

    let longitude = if relative_x >= PI {
        relative_x - PI
    } else {
        relative_x + PI
    };

    Position::new(longitude, FRAC_PI_2 - relative_y)
}

/// Camera parameters needed to go between the screen and the sphere.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    pub position: Position,
    /// Vertical field of view in degrees.
    pub v_fov: f64,
    pub size: Size,
}

impl Projection {
    /// Forward, right and up unit vectors of the camera.
    fn basis(&self) -> (DVec3, DVec3, DVec3) {
        let (lon, lat) = (self.position.longitude, self.position.latitude);
        let forward = DVec3::new(lat.cos() * lon.sin(), lat.sin(), lat.cos() * lon.cos());
        let right = DVec3::new(lon.cos(), 0.0, -lon.sin());
        let up = DVec3::new(-lat.sin() * lon.sin(), lat.cos(), -lat.sin() * lon.cos());
        (forward, right, up)
    }

    fn half_extent(&self) -> f64 {
        (self.v_fov.to_radians() / 2.0).tan()
    }

    /// Casts the ray through viewer pixel (x, y) and returns its hit point on the sphere.
    pub fn viewer_pixel_to_vector3(&self, x: f64, y: f64) -> Option<DVec3> {
        if self.size.is_empty() {
            return None;
        }
        let ndc_x = 2.0 * x / self.size.width as f64 - 1.0;
        let ndc_y = 1.0 - 2.0 * y / self.size.height as f64;
        let t = self.half_extent();

        let (forward, right, up) = self.basis();
        let dir = forward + right * (ndc_x * t * self.size.aspect()) + up * (ndc_y * t);

        // camera sits at the sphere centre: |s * dir| = R
        let len = dir.length();
        if len == 0.0 || !len.is_finite() {
            return None;
        }
        Some(dir * (SPHERE_RADIUS / len))
    }

    /// Projects a point on the sphere to viewer pixels, `None` when behind the camera.
    pub fn vector3_to_viewer_pixel(&self, point: DVec3) -> Option<(f64, f64)> {
        if self.size.is_empty() {
            return None;
        }
        let dir = point.try_normalize()?;
        let (forward, right, up) = self.basis();
        let depth = dir.dot(forward);
        if depth <= f64::EPSILON {
            return None;
        }
        let t = self.half_extent();
        let ndc_x = dir.dot(right) / depth / (t * self.size.aspect());
        let ndc_y = dir.dot(up) / depth / t;

        Some((
            (ndc_x + 1.0) / 2.0 * self.size.width as f64,
            (1.0 - ndc_y) / 2.0 * self.size.height as f64,
        ))
    }

    pub fn viewer_pixel_to_spherical(&self, x: f64, y: f64) -> Option<Position> {
        self.viewer_pixel_to_vector3(x, y).map(vector3_to_spherical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn longitude_normalizes_into_one_turn() {
        for theta in [-10.0, -TAU, -PI, -1e-18, 0.0, 1.0, PI, TAU, 7.5, 100.0] {
            let n = normalize_longitude(theta);
            assert!((0.0..TAU).contains(&n), "{theta} -> {n}");
            let shifted = normalize_longitude(theta + TAU);
            assert!(
                approx_eq(n, shifted) || approx_eq((n - shifted).abs(), TAU),
                "{theta}: {n} vs {shifted}"
            );
        }
        assert_eq!(normalize_longitude(f64::NAN), 0.0);
    }

    #[test]
    fn latitude_clamps_to_nearest_pole() {
        assert_eq!(clamp_latitude(2.0), FRAC_PI_2);
        assert_eq!(clamp_latitude(-2.0), -FRAC_PI_2);
        assert_eq!(clamp_latitude(0.3), 0.3);
        let mut prev = clamp_latitude(-10.0);
        for i in -100..100 {
            let v = clamp_latitude(i as f64 * 0.05);
            assert!(v >= prev);
            prev = v;
        }
    }

    #[test]
    fn vector_round_trip_away_from_poles() {
        for lon in [0.0, 0.5, 1.0, PI, 4.0, 6.0] {
            for lat in [-1.4, -0.7, 0.0, 0.3, 1.2] {
                let p = Position::new(lon, lat);
                let back = vector3_to_spherical(spherical_to_vector3(p));
                assert!(approx_eq(back.longitude, p.longitude), "{p:?} -> {back:?}");
                assert!(approx_eq(back.latitude, p.latitude));
            }
        }
    }

    #[test]
    fn vector_has_sphere_radius() {
        let v = spherical_to_vector3(Position::new(1.0, 0.4));
        assert!(approx_eq(v.length(), SPHERE_RADIUS));
    }

    #[test]
    fn texture_round_trip_with_crop() {
        let pano = PanoData {
            full_width: 8000,
            full_height: 4000,
            cropped_width: 6000,
            cropped_height: 2000,
            cropped_x: 1000,
            cropped_y: 1000,
        };
        let p = Position::new(0.8, 0.2);
        let t = spherical_to_texture(p, &pano);
        let back = texture_to_spherical(t, &pano);
        assert!(approx_eq(back.longitude, p.longitude));
        assert!(approx_eq(back.latitude, p.latitude));
    }

    #[test]
    fn texture_center_is_longitude_zero() {
        let pano = PanoData::full(4000, 2000);
        let p = texture_to_spherical(TextureCoords { x: 2000.0, y: 1000.0 }, &pano);
        assert!(approx_eq(p.longitude, 0.0));
        assert!(approx_eq(p.latitude, 0.0));
    }

    #[test]
    fn screen_center_hits_view_direction() {
        let proj = Projection {
            position: Position::new(1.2, -0.3),
            v_fov: 60.0,
            size: Size::new(800, 600),
        };
        let p = proj.viewer_pixel_to_spherical(400.0, 300.0).unwrap();
        assert!(approx_eq(p.longitude, 1.2));
        assert!(approx_eq(p.latitude, -0.3));
    }

    #[test]
    fn right_of_center_is_larger_longitude() {
        let proj = Projection {
            position: Position::new(0.5, 0.0),
            v_fov: 60.0,
            size: Size::new(800, 600),
        };
        let p = proj.viewer_pixel_to_spherical(700.0, 100.0).unwrap();
        assert!(p.longitude > 0.5);
        assert!(p.latitude > 0.0);
    }

    #[test]
    fn pixel_projection_round_trips() {
        let proj = Projection {
            position: Position::new(5.9, 0.4),
            v_fov: 75.0,
            size: Size::new(1024, 768),
        };
        let v = proj.viewer_pixel_to_vector3(100.0, 650.0).unwrap();
        let (x, y) = proj.vector3_to_viewer_pixel(v).unwrap();
        assert!((x - 100.0).abs() < 1e-6);
        assert!((y - 650.0).abs() < 1e-6);
    }

    #[test]
    fn points_behind_camera_do_not_project() {
        let proj = Projection {
            position: Position::new(0.0, 0.0),
            v_fov: 60.0,
            size: Size::new(800, 600),
        };
        let behind = spherical_to_vector3(Position::new(PI, 0.0));
        assert!(proj.vector3_to_viewer_pixel(behind).is_none());
    }

    #[test]
    fn empty_viewport_has_no_ray() {
        let proj = Projection {
            position: Position::default(),
            v_fov: 60.0,
            size: Size::new(0, 0),
        };
        assert!(proj.viewer_pixel_to_vector3(0.0, 0.0).is_none());
    }

    #[test]
    fn shortest_arc_crosses_seam() {
        assert!(approx_eq(shortest_arc(0.1, TAU - 0.1), -0.2));
        assert!(approx_eq(shortest_arc(TAU - 0.1, 0.1), 0.2));
        assert!(approx_eq(shortest_arc(1.0, 2.0), 1.0));
    }

    #[test]
    fn great_circle_distance_along_equator() {
        let d = great_circle_distance(Position::new(0.0, 0.0), Position::new(FRAC_PI_2, 0.0));
        assert!(approx_eq(d, FRAC_PI_2));
    }
}
