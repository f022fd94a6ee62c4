// drivers.rs - autorotate and gyroscope before-render hooks

use crate::coords::{normalize_longitude, vector3_to_spherical, Position};
use glam::{DQuat, DVec3, EulerRot};

/// Which subsystem currently owns the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NavigationDriver {
    #[default]
    None,
    Drag,
    Inertia,
    Autorotate,
    Gyroscope,
    Animation,
}

/// Constant longitude spin with latitude easing toward a resting value.
#[derive(Debug, Clone, PartialEq)]
pub struct Autorotate {
    /// Radians per second, sign is the direction.
    speed: f64,
    target_latitude: f64,
    damping: f64,
    last_ms: Option<f64>,
}

impl Autorotate {
    pub fn new(speed: f64, target_latitude: f64, damping: f64) -> Self {
        Self {
            speed,
            target_latitude,
            damping: damping.max(1.0),
            last_ms: None,
        }
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Bounce off a longitude boundary.
    pub fn reverse(&mut self) {
        self.speed = -self.speed;
    }

    /// Next position; the first tick only records the timestamp.
    pub fn tick(&mut self, now_ms: f64, current: Position) -> Position {
        let elapsed_s = match self.last_ms.replace(now_ms) {
            Some(last) => ((now_ms - last) / 1000.0).max(0.0),
            None => 0.0,
        };
        Position {
            longitude: current.longitude + self.speed * elapsed_s,
            latitude: current.latitude
                - (current.latitude - self.target_latitude) / self.damping,
        }
    }
}

/// Device orientation angles in degrees, as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DeviceOrientation {
    /// Rotation around the z axis (compass), [0, 360).
    pub alpha: f64,
    /// Front-back tilt, [-180, 180).
    pub beta: f64,
    /// Left-right tilt, [-90, 90).
    pub gamma: f64,
    /// Screen rotation, 0/90/180/270.
    pub screen: f64,
}

impl DeviceOrientation {
    /// Direction the back of the device points at.
    pub fn direction(&self) -> DVec3 {
        let euler = DQuat::from_euler(
            EulerRot::YXZ,
            self.alpha.to_radians(),
            self.beta.to_radians(),
            -self.gamma.to_radians(),
        );
        // camera looks out the back of the device, not the top
        let back = DQuat::from_axis_angle(DVec3::X, -std::f64::consts::FRAC_PI_2);
        let screen = DQuat::from_axis_angle(DVec3::Z, -self.screen.to_radians());
        (euler * back * screen) * DVec3::NEG_Z
    }

    pub fn position(&self) -> Position {
        vector3_to_spherical(self.direction())
    }
}

/// Source of device orientation readings.
pub trait OrientationSource {
    fn is_available(&self) -> bool;
    /// Latest reading, `None` until the device has reported one.
    fn read(&mut self) -> Option<DeviceOrientation>;
}

/// Follows the device orientation, keeping the view direction at activation as reference.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Gyroscope {
    alpha_offset: Option<f64>,
}

impl Gyroscope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alpha_offset(&self) -> Option<f64> {
        self.alpha_offset
    }

    /// Horizontal drag while the gyroscope drives: shifts the reference frame.
    pub fn shift(&mut self, d_longitude: f64) {
        if let Some(offset) = &mut self.alpha_offset {
            *offset += d_longitude;
        }
    }

    pub fn tick(&mut self, reading: DeviceOrientation, current: Position) -> Position {
        let raw = reading.position();
        let offset = *self
            .alpha_offset
            .get_or_insert(current.longitude - raw.longitude);
        Position {
            longitude: normalize_longitude(raw.longitude + offset),
            latitude: raw.latitude,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn autorotate_spins_at_speed() {
        let mut a = Autorotate::new(1.0, 0.0, 200.0);
        let start = Position::new(0.0, 0.0);
        let p0 = a.tick(1000.0, start);
        assert_eq!(p0.longitude, 0.0);
        let p1 = a.tick(1500.0, p0);
        assert!((p1.longitude - 0.5).abs() < 1e-12);
        a.reverse();
        let p2 = a.tick(2000.0, p1);
        assert!(p2.longitude.abs() < 1e-12);
    }

    #[test]
    fn autorotate_decays_toward_target_latitude() {
        let mut a = Autorotate::new(0.0, 0.0, 2.0);
        let p = a.tick(0.0, Position::new(0.0, 1.0));
        assert!((p.latitude - 0.5).abs() < 1e-12);
    }

    #[test]
    fn upright_device_looks_at_horizon() {
        let o = DeviceOrientation {
            alpha: 0.0,
            beta: 90.0,
            gamma: 0.0,
            screen: 0.0,
        };
        assert!(o.position().latitude.abs() < 1e-9);
    }

    #[test]
    fn gyroscope_keeps_current_direction_at_start() {
        let mut g = Gyroscope::new();
        let reading = DeviceOrientation {
            alpha: 30.0,
            beta: 90.0,
            gamma: 0.0,
            screen: 0.0,
        };
        let current = Position::new(1.0, 0.0);
        let p = g.tick(reading, current);
        assert!((p.longitude - 1.0).abs() < 1e-9);

        // turning the device by 10 degrees turns the view by 10 degrees
        let turned = DeviceOrientation { alpha: 40.0, ..reading };
        let q = g.tick(turned, p);
        let delta = crate::coords::shortest_arc(p.longitude, q.longitude).abs();
        assert!((delta - 10f64.to_radians()).abs() < 1e-9);
    }

    #[test]
    fn shift_moves_reference() {
        let mut g = Gyroscope::new();
        g.shift(1.0);
        assert_eq!(g.alpha_offset(), None);
        let reading = DeviceOrientation { beta: 90.0, ..Default::default() };
        g.tick(reading, Position::new(0.0, 0.0));
        let before = g.alpha_offset().unwrap();
        g.shift(0.25);
        assert_eq!(g.alpha_offset(), Some(before + 0.25));
    }
}
