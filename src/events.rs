// events.rs - viewer notifications and the single-threaded event bus
//
// Subscribers are called synchronously on emit; every event is also queued so
// the host loop can poll() them in batch.

use crate::coords::{Position, Size, TextureCoords};
use crate::ranges::Side;
use log::warn;
use std::collections::VecDeque;

/// Maximum events kept for poll() before the oldest half is evicted.
const MAX_QUEUE_SIZE: usize = 1000;

/// Everything reported about a click or double click.
#[derive(Debug, Clone, PartialEq)]
pub struct ClickData {
    pub client_x: f64,
    pub client_y: f64,
    pub viewer_x: f64,
    pub viewer_y: f64,
    pub position: Position,
    /// Absent for cubemap panoramas.
    pub texture: Option<TextureCoords>,
    /// Marker under the pointer, if any.
    pub marker: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewerEvent {
    PositionUpdated(Position),
    ZoomUpdated(u8),
    SizeUpdated(Size),
    Autorotate(bool),
    GyroscopeUpdated(bool),
    FullscreenUpdated(bool),
    Click(ClickData),
    DblClick(ClickData),
    PanoramaLoaded,
    Ready,
    /// A range boundary stopped the camera.
    SideReached(Side),
}

impl ViewerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ViewerEvent::PositionUpdated(_) => "position-updated",
            ViewerEvent::ZoomUpdated(_) => "zoom-updated",
            ViewerEvent::SizeUpdated(_) => "size-updated",
            ViewerEvent::Autorotate(_) => "autorotate",
            ViewerEvent::GyroscopeUpdated(_) => "gyroscope-updated",
            ViewerEvent::FullscreenUpdated(_) => "fullscreen-updated",
            ViewerEvent::Click(_) => "click",
            ViewerEvent::DblClick(_) => "dblclick",
            ViewerEvent::PanoramaLoaded => "panorama-loaded",
            ViewerEvent::Ready => "ready",
            ViewerEvent::SideReached(_) => "_side-reached",
        }
    }
}

pub type SubscriptionId = u64;

type Callback = Box<dyn FnMut(&ViewerEvent)>;

#[derive(Default)]
pub struct EventBus {
    next_id: SubscriptionId,
    subscribers: Vec<(SubscriptionId, Callback)>,
    queue: VecDeque<ViewerEvent>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscribers.len())
            .field("queued", &self.queue.len())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&ViewerEvent) + 'static,
    {
        self.next_id += 1;
        self.subscribers.push((self.next_id, Box::new(callback)));
        self.next_id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        self.subscribers.len() != before
    }

    pub fn emit(&mut self, event: ViewerEvent) {
        for (_, cb) in &mut self.subscribers {
            cb(&event);
        }

        if self.queue.len() >= MAX_QUEUE_SIZE {
            let evict = self.queue.len() / 2;
            warn!("EventBus queue full ({} events), evicting oldest {}", self.queue.len(), evict);
            self.queue.drain(..evict);
        }
        self.queue.push_back(event);
    }

    /// All events emitted since the last poll.
    pub fn poll(&mut self) -> Vec<ViewerEvent> {
        self.queue.drain(..).collect()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn clear(&mut self) {
        self.subscribers.clear();
        self.queue.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn subscribers_run_before_poll() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut bus = EventBus::new();
        let sink = Rc::clone(&seen);
        bus.subscribe(move |e| sink.borrow_mut().push(e.name()));

        bus.emit(ViewerEvent::ZoomUpdated(3));
        bus.emit(ViewerEvent::Ready);

        assert_eq!(*seen.borrow(), vec!["zoom-updated", "ready"]);
        assert_eq!(bus.poll(), vec![ViewerEvent::ZoomUpdated(3), ViewerEvent::Ready]);
        assert_eq!(bus.queue_len(), 0);
    }

    #[test]
    fn unsubscribe_stops_callbacks() {
        let count = Rc::new(RefCell::new(0));
        let mut bus = EventBus::new();
        let c = Rc::clone(&count);
        let id = bus.subscribe(move |_| *c.borrow_mut() += 1);
        bus.emit(ViewerEvent::Ready);
        assert!(bus.unsubscribe(id));
        bus.emit(ViewerEvent::Ready);
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn queue_evicts_oldest_half() {
        let mut bus = EventBus::new();
        for i in 0..MAX_QUEUE_SIZE {
            bus.emit(ViewerEvent::ZoomUpdated((i % 100) as u8));
        }
        bus.emit(ViewerEvent::Ready);
        assert_eq!(bus.queue_len(), MAX_QUEUE_SIZE / 2 + 1);
        assert_eq!(bus.poll().last(), Some(&ViewerEvent::Ready));
    }
}
