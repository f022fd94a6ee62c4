// markers.rs - marker positions and hit-testing (content is drawn by the host)

use crate::coords::{spherical_to_vector3, ExtendedPosition, Position, Projection};
use glam::DVec3;

/// What the host supplies to create a marker.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerDescriptor {
    pub id: String,
    pub position: ExtendedPosition,
    /// Size of the marker on screen, centred on its projected point.
    pub width: f64,
    pub height: f64,
    pub tooltip: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub id: String,
    pub position: Position,
    pub width: f64,
    pub height: f64,
    pub tooltip: Option<String>,
    point: DVec3,
}

impl Marker {
    pub fn new(id: impl Into<String>, position: Position, width: f64, height: f64) -> Self {
        let position = position.normalized();
        Self {
            id: id.into(),
            position,
            width,
            height,
            tooltip: None,
            point: spherical_to_vector3(position),
        }
    }

    pub fn point(&self) -> DVec3 {
        self.point
    }

    /// Centre of the marker in viewer pixels, `None` when behind the camera.
    pub fn project(&self, projection: &Projection) -> Option<(f64, f64)> {
        projection.vector3_to_viewer_pixel(self.point)
    }

    pub fn contains(&self, projection: &Projection, x: f64, y: f64) -> bool {
        match self.project(projection) {
            Some((cx, cy)) => {
                (x - cx).abs() <= self.width / 2.0 && (y - cy).abs() <= self.height / 2.0
            }
            None => false,
        }
    }
}

/// Markers in insertion order; later markers are on top for hit-testing.
#[derive(Debug, Clone, Default)]
pub struct MarkerSet {
    markers: Vec<Marker>,
}

impl MarkerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the marker with the same id.
    pub fn insert(&mut self, marker: Marker) {
        match self.markers.iter_mut().find(|m| m.id == marker.id) {
            Some(existing) => *existing = marker,
            None => self.markers.push(marker),
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<Marker> {
        let idx = self.markers.iter().position(|m| m.id == id)?;
        Some(self.markers.remove(idx))
    }

    pub fn get(&self, id: &str) -> Option<&Marker> {
        self.markers.iter().find(|m| m.id == id)
    }

    pub fn clear(&mut self) {
        self.markers.clear();
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Marker> {
        self.markers.iter()
    }

    pub fn hit_test(&self, projection: &Projection, x: f64, y: f64) -> Option<&Marker> {
        self.markers
            .iter()
            .rev()
            .find(|m| m.contains(projection, x, y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::Size;

    fn projection() -> Projection {
        Projection {
            position: Position::new(0.0, 0.0),
            v_fov: 60.0,
            size: Size::new(800, 600),
        }
    }

    #[test]
    fn marker_in_view_centre_projects_to_centre() {
        let m = Marker::new("a", Position::new(0.0, 0.0), 20.0, 20.0);
        let (x, y) = m.project(&projection()).unwrap();
        assert!((x - 400.0).abs() < 1e-9);
        assert!((y - 300.0).abs() < 1e-9);
    }

    #[test]
    fn hit_test_prefers_top_marker() {
        let mut set = MarkerSet::new();
        set.insert(Marker::new("below", Position::new(0.0, 0.0), 40.0, 40.0));
        set.insert(Marker::new("above", Position::new(0.0, 0.0), 10.0, 10.0));
        assert_eq!(set.hit_test(&projection(), 402.0, 301.0).unwrap().id, "above");
        assert_eq!(set.hit_test(&projection(), 415.0, 300.0).unwrap().id, "below");
        assert!(set.hit_test(&projection(), 10.0, 10.0).is_none());
    }

    #[test]
    fn insert_replaces_same_id() {
        let mut set = MarkerSet::new();
        set.insert(Marker::new("a", Position::new(0.0, 0.0), 1.0, 1.0));
        set.insert(Marker::new("a", Position::new(1.0, 0.0), 1.0, 1.0));
        assert_eq!(set.len(), 1);
        assert_eq!(set.get("a").unwrap().position.longitude, 1.0);
        assert!(set.remove("a").is_some());
        assert!(set.is_empty());
    }
}
