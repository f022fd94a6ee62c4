// camera.rs - camera state: position, zoom, fov and the needs-update flag

use crate::coords::{Position, Projection, Size};
use crate::ranges::{apply_ranges, horizontal_fov, FovBounds, Ranges, Side};

/// Result of a constrained rotation.
#[derive(Debug, Clone, PartialEq)]
pub struct RotateOutcome {
    pub position: Position,
    pub sides: Vec<Side>,
}

/// Single source of truth for what the renderer draws.
///
/// Written only through [`Camera::rotate`], [`Camera::zoom`] and [`Camera::set_size`].
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    position: Position,
    zoom_level: u8,
    /// Degrees.
    v_fov: f64,
    h_fov: f64,
    size: Size,
    bounds: FovBounds,
    needs_update: bool,
}

impl Camera {
    pub fn new(bounds: FovBounds, size: Size) -> Self {
        let mut camera = Self {
            position: Position::default(),
            zoom_level: 0,
            v_fov: bounds.max_fov,
            h_fov: bounds.max_fov,
            size,
            bounds,
            needs_update: true,
        };
        camera.update_fov();
        camera
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn zoom_level(&self) -> u8 {
        self.zoom_level
    }

    pub fn v_fov(&self) -> f64 {
        self.v_fov
    }

    pub fn h_fov(&self) -> f64 {
        self.h_fov
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn aspect(&self) -> f64 {
        self.size.aspect()
    }

    pub fn bounds(&self) -> FovBounds {
        self.bounds
    }

    pub fn projection(&self) -> Projection {
        Projection {
            position: self.position,
            v_fov: self.v_fov,
            size: self.size,
        }
    }

    /// Normalizes, applies the ranges (shrunk by half the visible fov) and stores.
    pub fn rotate(&mut self, position: Position, ranges: &Ranges) -> RotateOutcome {
        let mut position = position.normalized();
        let sides = apply_ranges(
            &mut position,
            ranges,
            self.h_fov.to_radians() / 2.0,
            self.v_fov.to_radians() / 2.0,
        );
        self.position = position;
        self.needs_update = true;
        RotateOutcome { position, sides }
    }

    /// Clamps the level to [0, 100] and derives both fovs from it.
    pub fn zoom(&mut self, level: f64) -> u8 {
        self.zoom_level = FovBounds::clamp_level(level);
        self.update_fov();
        self.needs_update = true;
        self.zoom_level
    }

    pub fn set_size(&mut self, size: Size) {
        self.size = size;
        self.update_fov();
        self.needs_update = true;
    }

    fn update_fov(&mut self) {
        self.v_fov = self.bounds.level_to_vfov(self.zoom_level);
        self.h_fov = horizontal_fov(self.v_fov, self.aspect());
    }

    pub fn needs_update(&self) -> bool {
        self.needs_update
    }

    pub fn mark_dirty(&mut self) {
        self.needs_update = true;
    }

    /// Returns the flag and clears it.
    pub fn take_needs_update(&mut self) -> bool {
        std::mem::replace(&mut self.needs_update, false)
    }
}
