// animation.rs - frame-driven tweening with pluggable easing

use crate::task::{Outcome, Task};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::task::{Context, Poll};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Easing {
    #[default]
    Linear,
    InQuad,
    OutQuad,
    InOutQuad,
    InCubic,
    OutCubic,
    InOutCubic,
    InQuart,
    OutQuart,
    InOutQuart,
    InQuint,
    OutQuint,
    InOutQuint,
    InSine,
    OutSine,
    InOutSine,
    InExpo,
    OutExpo,
    InOutExpo,
    InCirc,
    OutCirc,
    InOutCirc,
}

impl Easing {
    pub fn apply(self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Easing::Linear => t,
            Easing::InQuad => t * t,
            Easing::OutQuad => t * (2.0 - t),
            Easing::InOutQuad => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    -1.0 + (4.0 - 2.0 * t) * t
                }
            }
            Easing::InCubic => t.powi(3),
            Easing::OutCubic => (t - 1.0).powi(3) + 1.0,
            Easing::InOutCubic => {
                if t < 0.5 {
                    4.0 * t.powi(3)
                } else {
                    (t - 1.0) * (2.0 * t - 2.0) * (2.0 * t - 2.0) + 1.0
                }
            }
            Easing::InQuart => t.powi(4),
            Easing::OutQuart => 1.0 - (t - 1.0).powi(4),
            Easing::InOutQuart => {
                if t < 0.5 {
                    8.0 * t.powi(4)
                } else {
                    1.0 - 8.0 * (t - 1.0).powi(4)
                }
            }
            Easing::InQuint => t.powi(5),
            Easing::OutQuint => 1.0 + (t - 1.0).powi(5),
            Easing::InOutQuint => {
                if t < 0.5 {
                    16.0 * t.powi(5)
                } else {
                    1.0 + 16.0 * (t - 1.0).powi(5)
                }
            }
            Easing::InSine => 1.0 - (t * PI / 2.0).cos(),
            Easing::OutSine => (t * PI / 2.0).sin(),
            Easing::InOutSine => 0.5 - (PI * t).cos() / 2.0,
            Easing::InExpo => {
                if t == 0.0 {
                    0.0
                } else {
                    2f64.powf(10.0 * (t - 1.0))
                }
            }
            Easing::OutExpo => {
                if t == 1.0 {
                    1.0
                } else {
                    1.0 - 2f64.powf(-10.0 * t)
                }
            }
            Easing::InOutExpo => {
                if t == 0.0 || t == 1.0 {
                    t
                } else if t < 0.5 {
                    0.5 * 2f64.powf(20.0 * t - 10.0)
                } else {
                    1.0 - 0.5 * 2f64.powf(-20.0 * t + 10.0)
                }
            }
            Easing::InCirc => 1.0 - (1.0 - t * t).sqrt(),
            Easing::OutCirc => (1.0 - (t - 1.0) * (t - 1.0)).sqrt(),
            Easing::InOutCirc => {
                if t < 0.5 {
                    (1.0 - (1.0 - 4.0 * t * t).sqrt()) / 2.0
                } else {
                    (1.0 + (1.0 - (2.0 * t - 2.0).powi(2)).sqrt()) / 2.0
                }
            }
        }
    }
}

impl FromStr for Easing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.to_string()))
            .map_err(|_| format!("unknown easing `{s}`"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PropertyRange {
    pub start: f64,
    pub end: f64,
}

impl PropertyRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    fn lerp(&self, k: f64) -> f64 {
        self.start + (self.end - self.start) * k
    }
}

/// Interpolated property values for one tick.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Sample {
    values: Vec<(&'static str, f64)>,
}

impl Sample {
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| *v)
    }
}

pub type AnimationId = u64;

/// Cancellable handle to a running animation; await it for the outcome.
#[derive(Debug, Clone)]
pub struct AnimationHandle {
    id: AnimationId,
    task: Task<()>,
}

impl AnimationHandle {
    pub fn id(&self) -> AnimationId {
        self.id
    }

    /// Stops the animation where its last tick left it. No further ticks fire.
    pub fn cancel(&self) -> bool {
        self.task.cancel()
    }

    pub fn is_running(&self) -> bool {
        self.task.is_pending()
    }

    pub fn is_cancelled(&self) -> bool {
        self.task.is_cancelled()
    }

    pub fn task(&self) -> &Task<()> {
        &self.task
    }
}

impl Future for AnimationHandle {
    type Output = Outcome<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.task).poll(cx)
    }
}

#[derive(Debug)]
struct Running {
    id: AnimationId,
    properties: Vec<(&'static str, PropertyRange)>,
    duration_ms: f64,
    easing: Easing,
    started_at: Option<f64>,
    task: Task<()>,
}

/// One step produced by [`Animator::tick`].
#[derive(Debug, Clone)]
pub struct Tick {
    pub id: AnimationId,
    pub sample: Sample,
    pub finished: bool,
}

/// Tweening engine driven by the render loop.
///
/// Nothing happens between calls to [`Animator::tick`], so animations are frozen
/// while the loop is stopped.
#[derive(Debug, Default)]
pub struct Animator {
    next_id: AnimationId,
    running: Vec<Running>,
}

impl Animator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn animate(
        &mut self,
        properties: Vec<(&'static str, PropertyRange)>,
        duration_ms: f64,
        easing: Easing,
    ) -> AnimationHandle {
        self.next_id = self.next_id.wrapping_add(1);
        let task = Task::pending();
        self.running.push(Running {
            id: self.next_id,
            properties,
            duration_ms: duration_ms.max(0.0),
            easing,
            started_at: None,
            task: task.clone(),
        });
        AnimationHandle {
            id: self.next_id,
            task,
        }
    }

    /// Advances every live animation. Finished animations are completed and removed;
    /// cancelled ones are dropped without producing a tick.
    pub fn tick(&mut self, now_ms: f64) -> Vec<Tick> {
        self.running.retain(|a| a.task.is_pending());

        let mut ticks = Vec::with_capacity(self.running.len());
        for anim in &mut self.running {
            let started_at = *anim.started_at.get_or_insert(now_ms);
            let t = if anim.duration_ms <= 0.0 {
                1.0
            } else {
                ((now_ms - started_at) / anim.duration_ms).min(1.0)
            };
            let k = anim.easing.apply(t);

            let sample = Sample {
                values: anim
                    .properties
                    .iter()
                    .map(|(name, range)| (*name, range.lerp(k)))
                    .collect(),
            };
            ticks.push(Tick {
                id: anim.id,
                sample,
                finished: t >= 1.0,
            });
        }

        self.running.retain(|a| {
            let done = ticks.iter().any(|t| t.id == a.id && t.finished);
            if done {
                a.task.complete(());
            }
            !done
        });

        ticks
    }

    pub fn is_running(&self, id: AnimationId) -> bool {
        self.running
            .iter()
            .any(|a| a.id == id && a.task.is_pending())
    }

    pub fn len(&self) -> usize {
        self.running.iter().filter(|a| a.task.is_pending()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn cancel_all(&mut self) {
        for anim in self.running.drain(..) {
            anim.task.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn easings_hit_endpoints() {
        for name in [
            "linear", "inQuad", "outQuad", "inOutQuad", "inCubic", "outCubic", "inOutCubic",
            "inQuart", "outQuart", "inOutQuart", "inQuint", "outQuint", "inOutQuint", "inSine",
            "outSine", "inOutSine", "inExpo", "outExpo", "inOutExpo", "inCirc", "outCirc",
            "inOutCirc",
        ] {
            let e: Easing = name.parse().unwrap();
            assert!(e.apply(0.0).abs() < 1e-3, "{name}");
            assert!((e.apply(1.0) - 1.0).abs() < 1e-3, "{name}");
        }
        assert!("bounce".parse::<Easing>().is_err());
    }

    #[test]
    fn interpolates_from_first_tick() {
        let mut animator = Animator::new();
        let handle = animator.animate(vec![("x", PropertyRange::new(0.0, 10.0))], 100.0, Easing::Linear);

        let t0 = animator.tick(1000.0);
        assert_eq!(t0[0].sample.get("x"), Some(0.0));
        let t1 = animator.tick(1050.0);
        assert_eq!(t1[0].sample.get("x"), Some(5.0));
        assert!(!t1[0].finished);
        let t2 = animator.tick(1200.0);
        assert_eq!(t2[0].sample.get("x"), Some(10.0));
        assert!(t2[0].finished);

        assert!(animator.is_empty());
        assert!(pollster::block_on(handle).is_completed());
    }

    #[test]
    fn cancelled_animation_stops_ticking() {
        let mut animator = Animator::new();
        let handle = animator.animate(vec![("x", PropertyRange::new(0.0, 1.0))], 100.0, Easing::Linear);
        animator.tick(0.0);
        handle.cancel();
        assert!(animator.tick(50.0).is_empty());
        assert!(pollster::block_on(handle).is_cancelled());
    }

    #[test]
    fn zero_duration_finishes_immediately() {
        let mut animator = Animator::new();
        let _h = animator.animate(vec![("p", PropertyRange::new(2.0, 4.0))], 0.0, Easing::OutCirc);
        let ticks = animator.tick(5.0);
        assert!(ticks[0].finished);
        assert_eq!(ticks[0].sample.get("p"), Some(4.0));
    }

    #[test]
    fn cancel_all_settles_everything() {
        let mut animator = Animator::new();
        let a = animator.animate(vec![], 10.0, Easing::Linear);
        let b = animator.animate(vec![], 10.0, Easing::Linear);
        animator.cancel_all();
        assert!(a.is_cancelled() && b.is_cancelled());
        assert!(animator.is_empty());
    }
}
