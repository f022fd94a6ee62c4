// input.rs - raw input events, drag/pinch state machine, click vs double click

use crate::events::ClickData;
use std::collections::VecDeque;

/// Pointer travel below which a press/release is a click.
pub const MOVE_THRESHOLD: f64 = 4.0;
/// Mouse history kept for inertia, in ms.
pub const INERTIA_WINDOW_MS: f64 = 300.0;
/// Max delay between two clicks of a double click, in ms.
pub const DBLCLICK_DELAY_MS: f64 = 300.0;

/// Input events in client coordinates; `Viewer::set_viewer_offset` maps them into the
/// viewer. Timestamps are passed alongside.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    PointerDown { x: f64, y: f64 },
    PointerMove { x: f64, y: f64 },
    PointerUp { x: f64, y: f64 },
    /// Touch points currently on the surface.
    TouchStart { touches: Vec<(f64, f64)> },
    TouchMove { touches: Vec<(f64, f64)> },
    /// `changed` is where the lifted finger(s) left the surface.
    TouchEnd { remaining: usize, changed: (f64, f64) },
    /// Normalized wheel spin, positive when scrolling down.
    Wheel { spin_y: f64 },
    /// DOM-style key name ("ArrowUp", "PageDown", "+", " ").
    Key { key: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GestureState {
    #[default]
    Idle,
    Dragging,
    Pinching,
}

/// Pointer samples within the trailing inertia window.
#[derive(Debug, Clone, Default)]
pub struct MouseHistory {
    samples: VecDeque<(f64, f64, f64)>,
}

impl MouseHistory {
    pub fn push(&mut self, t: f64, x: f64, y: f64) {
        self.samples.push_back((t, x, y));
        while let Some(&(t0, _, _)) = self.samples.front() {
            if t - t0 > INERTIA_WINDOW_MS {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Release direction (unit) and speed in px/ms.
    ///
    /// Segment speeds are weighted by their index so that the latest movement counts most.
    pub fn velocity(&self) -> Option<((f64, f64), f64)> {
        let (_, x0, y0) = *self.samples.front()?;
        let (_, x1, y1) = *self.samples.back()?;
        let (dx, dy) = (x1 - x0, y1 - y0);
        let len = dx.hypot(dy);
        if len == 0.0 {
            return None;
        }

        let n = self.samples.len() as f64;
        let norm: f64 = self
            .samples
            .iter()
            .zip(self.samples.iter().skip(1))
            .enumerate()
            .filter_map(|(i, (a, b))| {
                let dt = b.0 - a.0;
                (dt > 0.0).then(|| (b.1 - a.1).hypot(b.2 - a.2) / dt * ((i + 1) as f64 / n))
            })
            .sum();

        (norm > 0.0).then_some(((dx / len, dy / len), norm))
    }
}

/// Inertia parameters: synthetic pointer travel after release.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Inertia {
    pub from: (f64, f64),
    pub to: (f64, f64),
    pub duration_ms: f64,
}

/// What a drag release turned out to be.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Release {
    Click { x: f64, y: f64 },
    Inertia(Inertia),
    Stop,
}

/// Drag/pinch gesture state machine.
///
/// It only tracks pointer geometry; what a drag does to the camera is up to the viewer.
#[derive(Debug, Clone, Default)]
pub struct InputArbiter {
    state: GestureState,
    start: (f64, f64),
    last: (f64, f64),
    pinch_distance: f64,
    history: MouseHistory,
}

impl InputArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> GestureState {
        self.state
    }

    pub fn history(&self) -> &MouseHistory {
        &self.history
    }

    pub fn start_drag(&mut self, x: f64, y: f64, now_ms: f64) {
        self.state = GestureState::Dragging;
        self.start = (x, y);
        self.last = (x, y);
        self.history.clear();
        self.history.push(now_ms, x, y);
    }

    /// Pixel delta since the previous pointer position, `None` when not dragging.
    pub fn drag_to(&mut self, x: f64, y: f64, now_ms: f64) -> Option<(f64, f64)> {
        if self.state != GestureState::Dragging {
            return None;
        }
        self.history.push(now_ms, x, y);
        Some(self.move_to(x, y))
    }

    /// Moves the tracked pointer without recording history (inertia ticks).
    pub fn move_to(&mut self, x: f64, y: f64) -> (f64, f64) {
        let delta = (x - self.last.0, y - self.last.1);
        self.last = (x, y);
        delta
    }

    pub fn end_drag(&mut self, x: f64, y: f64, now_ms: f64, allow_inertia: bool) -> Release {
        if self.state != GestureState::Dragging {
            return Release::Stop;
        }
        self.state = GestureState::Idle;

        if (x - self.start.0).hypot(y - self.start.1) < MOVE_THRESHOLD {
            return Release::Click { x, y };
        }
        if !allow_inertia {
            return Release::Stop;
        }

        self.history.push(now_ms, x, y);
        match self.history.velocity() {
            Some(((dx, dy), norm)) => Release::Inertia(Inertia {
                from: (x, y),
                to: (
                    x + dx * norm * INERTIA_WINDOW_MS,
                    y + dy * norm * INERTIA_WINDOW_MS,
                ),
                duration_ms: norm * INERTIA_WINDOW_MS,
            }),
            None => Release::Stop,
        }
    }

    pub fn start_pinch(&mut self, a: (f64, f64), b: (f64, f64)) {
        self.state = GestureState::Pinching;
        self.pinch_distance = (a.0 - b.0).hypot(a.1 - b.1);
        self.history.clear();
    }

    /// Change of finger distance since the previous pinch event.
    pub fn pinch_to(&mut self, a: (f64, f64), b: (f64, f64)) -> Option<f64> {
        if self.state != GestureState::Pinching {
            return None;
        }
        let distance = (a.0 - b.0).hypot(a.1 - b.1);
        let delta = distance - self.pinch_distance;
        self.pinch_distance = distance;
        Some(delta)
    }

    /// Back to idle without a release (cancelled gesture).
    pub fn reset(&mut self) {
        self.state = GestureState::Idle;
        self.history.clear();
    }
}

/// Result of feeding a click into the [`ClickTracker`].
#[derive(Debug, Clone, PartialEq)]
pub enum ClickResult {
    Click(ClickData),
    DoubleClick(ClickData),
}

/// Click vs double click.
///
/// The first click is reported at once and arms a timer. A second click inside the
/// timer window and the pixel threshold is reported as a double click carrying the
/// first click's data; otherwise it is a new click that re-arms the timer.
#[derive(Debug, Clone, Default)]
pub struct ClickTracker {
    armed: Option<(f64, ClickData)>,
}

impl ClickTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn click(&mut self, data: ClickData, now_ms: f64) -> ClickResult {
        self.expire(now_ms);

        if let Some((_, first)) = self.armed.take() {
            let near = (first.client_x - data.client_x).abs() < MOVE_THRESHOLD
                && (first.client_y - data.client_y).abs() < MOVE_THRESHOLD;
            if near {
                return ClickResult::DoubleClick(first);
            }
        }

        self.armed = Some((now_ms + DBLCLICK_DELAY_MS, data.clone()));
        ClickResult::Click(data)
    }

    /// Drops the pending first click once its window has passed.
    pub fn expire(&mut self, now_ms: f64) {
        if matches!(&self.armed, Some((deadline, _)) if now_ms > *deadline) {
            self.armed = None;
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    pub fn clear(&mut self) {
        self.armed = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::Position;

    fn click_at(x: f64, y: f64) -> ClickData {
        ClickData {
            client_x: x,
            client_y: y,
            viewer_x: x,
            viewer_y: y,
            position: Position::default(),
            texture: None,
            marker: None,
        }
    }

    #[test]
    fn history_drops_old_samples() {
        let mut h = MouseHistory::default();
        h.push(0.0, 0.0, 0.0);
        h.push(200.0, 10.0, 0.0);
        h.push(400.0, 20.0, 0.0);
        assert_eq!(h.len(), 2);
    }

    #[test]
    fn small_release_is_click() {
        let mut arbiter = InputArbiter::new();
        arbiter.start_drag(100.0, 100.0, 0.0);
        arbiter.drag_to(101.0, 102.0, 10.0);
        let release = arbiter.end_drag(102.0, 101.0, 20.0, true);
        assert_eq!(release, Release::Click { x: 102.0, y: 101.0 });
        assert_eq!(arbiter.state(), GestureState::Idle);
    }

    #[test]
    fn fast_release_produces_inertia_in_drag_direction() {
        let mut arbiter = InputArbiter::new();
        arbiter.start_drag(0.0, 0.0, 0.0);
        arbiter.drag_to(10.0, 0.0, 10.0);
        arbiter.drag_to(20.0, 0.0, 20.0);
        match arbiter.end_drag(30.0, 0.0, 30.0, true) {
            Release::Inertia(i) => {
                assert_eq!(i.from, (30.0, 0.0));
                assert!(i.to.0 > 30.0);
                assert_eq!(i.to.1, 0.0);
                assert!(i.duration_ms > 0.0);
            }
            other => panic!("expected inertia, got {other:?}"),
        }
    }

    #[test]
    fn inertia_can_be_disabled() {
        let mut arbiter = InputArbiter::new();
        arbiter.start_drag(0.0, 0.0, 0.0);
        arbiter.drag_to(50.0, 0.0, 10.0);
        assert_eq!(arbiter.end_drag(60.0, 0.0, 20.0, false), Release::Stop);
    }

    #[test]
    fn drag_deltas_are_relative() {
        let mut arbiter = InputArbiter::new();
        assert_eq!(arbiter.drag_to(1.0, 1.0, 0.0), None);
        arbiter.start_drag(10.0, 10.0, 0.0);
        assert_eq!(arbiter.drag_to(15.0, 8.0, 5.0), Some((5.0, -2.0)));
        assert_eq!(arbiter.drag_to(16.0, 8.0, 6.0), Some((1.0, 0.0)));
    }

    #[test]
    fn pinch_reports_distance_change() {
        let mut arbiter = InputArbiter::new();
        arbiter.start_pinch((0.0, 0.0), (100.0, 0.0));
        assert_eq!(arbiter.state(), GestureState::Pinching);
        assert_eq!(arbiter.pinch_to((0.0, 0.0), (120.0, 0.0)), Some(20.0));
        assert_eq!(arbiter.pinch_to((0.0, 0.0), (110.0, 0.0)), Some(-10.0));
    }

    #[test]
    fn two_quick_clicks_make_one_click_and_one_dblclick() {
        let mut tracker = ClickTracker::new();
        assert_eq!(tracker.click(click_at(10.0, 10.0), 0.0), ClickResult::Click(click_at(10.0, 10.0)));
        assert_eq!(
            tracker.click(click_at(11.0, 10.0), 100.0),
            ClickResult::DoubleClick(click_at(10.0, 10.0))
        );
        assert!(!tracker.is_armed());
    }

    #[test]
    fn slow_or_distant_clicks_stay_single() {
        let mut tracker = ClickTracker::new();
        tracker.click(click_at(10.0, 10.0), 0.0);
        assert!(matches!(tracker.click(click_at(10.0, 10.0), 500.0), ClickResult::Click(_)));

        let mut tracker = ClickTracker::new();
        tracker.click(click_at(10.0, 10.0), 0.0);
        assert!(matches!(tracker.click(click_at(50.0, 10.0), 50.0), ClickResult::Click(_)));
    }
}
