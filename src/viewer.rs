// viewer.rs - the viewer: navigation drivers, input routing, panorama loading and the render loop
//
// Everything runs on the host's thread. The host calls handle_input() for raw events
// and frame() once per display refresh; frame() ticks animations and drivers, polls
// the texture loader and draws when the camera is dirty.

use crate::animation::{AnimationHandle, Animator, Easing, PropertyRange, Tick};
use crate::camera::{Camera, RotateOutcome};
use crate::config::{KeyAction, ViewerConfig};
use crate::coords::{
    great_circle_distance, shortest_arc, spherical_to_texture, texture_to_spherical, ExtendedPosition,
    PanoData, Position, Size, TextureCoords,
};
use crate::drivers::{Autorotate, Gyroscope, NavigationDriver, OrientationSource};
use crate::error::{Result, ViewerError};
use crate::events::{ClickData, EventBus, SubscriptionId, ViewerEvent};
use crate::input::{ClickResult, ClickTracker, GestureState, InputArbiter, InputEvent, Release};
use crate::loader::{PanoramaSource, PanoramaTexture, TextureLoader};
use crate::markers::{Marker, MarkerDescriptor, MarkerSet};
use crate::ranges::{apply_ranges, Ranges, Side};
use crate::renderer::{PanoramaRenderer, ViewParams};
use crate::task::Task;
use log::{debug, info, warn};
use std::sync::Arc;

/// Zoom levels per wheel notch.
const WHEEL_ZOOM_STEP: f64 = 5.0;
/// Keyboard rotation per key event, as a fraction of the fov (degrees in, degrees out).
const KEYBOARD_STEP: f64 = 0.01;

/// How long a programmatic animation takes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AnimSpeed {
    /// Fixed duration in ms.
    Duration(f64),
    /// Angular speed in rad/s along the great circle.
    Speed(f64),
}

/// The active driver together with its state.
#[derive(Debug, Default)]
enum Driver {
    #[default]
    None,
    Drag,
    Inertia(AnimationHandle),
    Autorotate(Autorotate),
    Gyroscope(Gyroscope),
    Animation(AnimationHandle),
}

impl Driver {
    fn kind(&self) -> NavigationDriver {
        match self {
            Driver::None => NavigationDriver::None,
            Driver::Drag => NavigationDriver::Drag,
            Driver::Inertia(_) => NavigationDriver::Inertia,
            Driver::Autorotate(_) => NavigationDriver::Autorotate,
            Driver::Gyroscope(_) => NavigationDriver::Gyroscope,
            Driver::Animation(_) => NavigationDriver::Animation,
        }
    }

    fn handle(&self) -> Option<&AnimationHandle> {
        match self {
            Driver::Inertia(h) | Driver::Animation(h) => Some(h),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct PendingLoad {
    source: PanoramaSource,
    position: Option<ExtendedPosition>,
    transition: bool,
    task: Task<()>,
}

/// Fade through black; the texture is swapped at the darkest point.
#[derive(Debug)]
struct Transition {
    handle: AnimationHandle,
    texture: Arc<PanoramaTexture>,
    position: Option<Position>,
    swapped: bool,
    task: Task<()>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TickOwner {
    Animation,
    Inertia,
    Transition,
    Orphan,
}

pub struct Viewer<R: PanoramaRenderer, L: TextureLoader> {
    config: ViewerConfig,
    config_warnings: Vec<String>,
    ranges: Ranges,
    camera: Camera,
    renderer: R,
    loader: L,
    orientation: Option<Box<dyn OrientationSource>>,

    animator: Animator,
    events: EventBus,
    arbiter: InputArbiter,
    clicks: ClickTracker,
    markers: MarkerSet,
    driver: Driver,
    gyroscope_request: Option<Task<()>>,

    panorama: Option<Arc<PanoramaTexture>>,
    loading: Option<PendingLoad>,
    transition: Option<Transition>,

    ready: bool,
    autorotate_at: Option<f64>,
    loop_running: bool,
    fullscreen: bool,
    destroyed: bool,
    /// Top-left corner of the viewer in client coordinates.
    viewer_offset: (f64, f64),
}

impl<R: PanoramaRenderer, L: TextureLoader> Viewer<R, L> {
    pub fn new(mut config: ViewerConfig, mut renderer: R, loader: L) -> Self {
        let config_warnings = config.sanitize();
        let size = config.size.unwrap_or_default();
        renderer.set_viewport_size(size);

        let mut camera = Camera::new(config.fov_bounds(), size);
        camera.zoom(config.default_zoom_level() as f64);
        let ranges = config.ranges();
        camera.rotate(config.default_position(), &ranges);

        info!(
            "viewer created: {}x{}, zoom {}, fov {:.1}",
            size.width,
            size.height,
            camera.zoom_level(),
            camera.v_fov()
        );

        Self {
            config,
            config_warnings,
            ranges,
            camera,
            renderer,
            loader,
            orientation: None,
            animator: Animator::new(),
            events: EventBus::new(),
            arbiter: InputArbiter::new(),
            clicks: ClickTracker::new(),
            markers: MarkerSet::new(),
            driver: Driver::None,
            gyroscope_request: None,
            panorama: None,
            loading: None,
            transition: None,
            ready: false,
            autorotate_at: None,
            loop_running: true,
            fullscreen: false,
            destroyed: false,
            viewer_offset: (0.0, 0.0),
        }
    }

    pub fn with_orientation_source(mut self, source: Box<dyn OrientationSource>) -> Self {
        self.orientation = Some(source);
        self
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.destroyed {
            Err(ViewerError::Destroyed)
        } else {
            Ok(())
        }
    }

    // ---- accessors ----

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    /// Repairs made to the configuration at construction.
    pub fn config_warnings(&self) -> &[String] {
        &self.config_warnings
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    pub fn get_position(&self) -> Position {
        self.camera.position()
    }

    pub fn get_zoom_level(&self) -> u8 {
        self.camera.zoom_level()
    }

    pub fn driver(&self) -> NavigationDriver {
        self.driver.kind()
    }

    pub fn gesture(&self) -> GestureState {
        self.arbiter.state()
    }

    pub fn is_autorotate_enabled(&self) -> bool {
        matches!(self.driver, Driver::Autorotate(_))
    }

    pub fn is_gyroscope_enabled(&self) -> bool {
        matches!(self.driver, Driver::Gyroscope(_))
    }

    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn is_loading(&self) -> bool {
        self.loading.is_some() || self.transition.is_some()
    }

    pub fn is_loop_running(&self) -> bool {
        self.loop_running
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub fn panorama(&self) -> Option<&Arc<PanoramaTexture>> {
        self.panorama.as_ref()
    }

    pub fn view_params(&self) -> ViewParams {
        ViewParams {
            position: self.camera.position(),
            v_fov: self.camera.v_fov(),
            h_fov: self.camera.h_fov(),
            aspect: self.camera.aspect(),
        }
    }

    // ---- events ----

    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&ViewerEvent) + 'static,
    {
        self.events.subscribe(callback)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    /// Events emitted since the last call.
    pub fn poll_events(&mut self) -> Vec<ViewerEvent> {
        self.events.poll()
    }

    // ---- coordinates ----

    fn pano_data(&self) -> Result<PanoData> {
        pano_data_of(self.panorama.as_deref())
    }

    pub fn spherical_to_texture(&self, position: Position) -> Result<TextureCoords> {
        Ok(spherical_to_texture(position, &self.pano_data()?))
    }

    pub fn texture_to_spherical(&self, coords: TextureCoords) -> Result<Position> {
        Ok(texture_to_spherical(coords, &self.pano_data()?))
    }

    fn resolve_position(&self, position: ExtendedPosition) -> Result<Position> {
        resolve_against(position, self.panorama.as_deref())
    }

    // ---- camera mutators ----

    /// The one path every position change goes through.
    fn apply_rotate(&mut self, position: Position) -> RotateOutcome {
        let outcome = self.camera.rotate(position, &self.ranges);
        for side in &outcome.sides {
            self.events.emit(ViewerEvent::SideReached(*side));
        }
        self.events.emit(ViewerEvent::PositionUpdated(outcome.position));
        outcome
    }

    fn apply_zoom(&mut self, level: f64) -> u8 {
        let level = self.camera.zoom(level);
        self.events.emit(ViewerEvent::ZoomUpdated(level));
        level
    }

    /// Stops whatever drives the camera and settles its handles.
    fn stop_driver(&mut self) {
        match std::mem::take(&mut self.driver) {
            Driver::None => {}
            Driver::Drag => self.arbiter.reset(),
            Driver::Inertia(handle) | Driver::Animation(handle) => {
                handle.cancel();
            }
            Driver::Autorotate(_) => {
                info!("autorotate stopped");
                self.events.emit(ViewerEvent::Autorotate(false));
            }
            Driver::Gyroscope(_) => {
                info!("gyroscope control stopped");
                if let Some(request) = self.gyroscope_request.take() {
                    request.cancel();
                }
                self.events.emit(ViewerEvent::GyroscopeUpdated(false));
            }
        }
    }

    /// Manual interaction: cancels the pending autorotate delay and hands the camera to `next`.
    fn take_over(&mut self, next: Driver) {
        self.autorotate_at = None;
        self.stop_driver();
        self.driver = next;
    }

    // ---- public API ----

    pub fn rotate(&mut self, position: impl Into<ExtendedPosition>) -> Result<()> {
        self.ensure_alive()?;
        let position = self.resolve_position(position.into())?;
        self.take_over(Driver::None);
        self.apply_rotate(position);
        Ok(())
    }

    /// Animates to `position` along the shortest arc, optionally zooming too.
    ///
    /// The previous navigation driver is stopped. Cancelling the returned handle
    /// leaves the camera where the last tick put it.
    pub fn animate(
        &mut self,
        position: impl Into<ExtendedPosition>,
        speed: AnimSpeed,
        zoom: Option<f64>,
    ) -> Result<AnimationHandle> {
        self.ensure_alive()?;
        let mut target = self.resolve_position(position.into())?.normalized();
        apply_ranges(
            &mut target,
            &self.ranges,
            self.camera.h_fov().to_radians() / 2.0,
            self.camera.v_fov().to_radians() / 2.0,
        );

        let current = self.camera.position();
        let duration_ms = match speed {
            AnimSpeed::Duration(ms) => ms,
            AnimSpeed::Speed(rad_s) if rad_s.abs() > 0.0 => {
                great_circle_distance(current, target) / rad_s.abs() * 1000.0
            }
            AnimSpeed::Speed(_) => 0.0,
        };

        let mut properties = vec![
            (
                "longitude",
                PropertyRange::new(
                    current.longitude,
                    current.longitude + shortest_arc(current.longitude, target.longitude),
                ),
            ),
            ("latitude", PropertyRange::new(current.latitude, target.latitude)),
        ];
        if let Some(level) = zoom {
            properties.push((
                "zoom",
                PropertyRange::new(self.camera.zoom_level() as f64, level),
            ));
        }

        self.take_over(Driver::None);
        let handle = self.animator.animate(properties, duration_ms, Easing::InOutSine);
        debug!("animating to {:?} over {:.0}ms", target, duration_ms);
        self.driver = Driver::Animation(handle.clone());
        Ok(handle)
    }

    pub fn zoom(&mut self, level: f64) -> Result<u8> {
        self.ensure_alive()?;
        Ok(self.apply_zoom(level))
    }

    pub fn zoom_in(&mut self) -> Result<u8> {
        self.zoom(self.camera.zoom_level() as f64 + self.config.zoom_speed)
    }

    pub fn zoom_out(&mut self) -> Result<u8> {
        self.zoom(self.camera.zoom_level() as f64 - self.config.zoom_speed)
    }

    pub fn start_autorotate(&mut self) -> Result<()> {
        self.ensure_alive()?;
        if self.is_autorotate_enabled() {
            return Ok(());
        }
        let autorotate = Autorotate::new(
            self.config.anim_speed.0,
            self.config.anim_lat(),
            self.config.autorotate_damping,
        );
        self.take_over(Driver::Autorotate(autorotate));
        info!("autorotate started");
        self.events.emit(ViewerEvent::Autorotate(true));
        Ok(())
    }

    pub fn stop_autorotate(&mut self) -> Result<()> {
        self.ensure_alive()?;
        self.autorotate_at = None;
        if self.is_autorotate_enabled() {
            self.stop_driver();
        }
        Ok(())
    }

    pub fn toggle_autorotate(&mut self) -> Result<()> {
        if self.is_autorotate_enabled() {
            self.stop_autorotate()
        } else {
            self.start_autorotate()
        }
    }

    /// Hands the camera to the device orientation.
    ///
    /// The task completes on the first applied reading. Without a usable orientation
    /// source it fails with [`ViewerError::GyroscopeUnavailable`] and the current
    /// driver keeps running.
    pub fn start_gyroscope_control(&mut self) -> Task<()> {
        if self.destroyed {
            return Task::failed(ViewerError::Destroyed);
        }
        let available = self.orientation.as_ref().is_some_and(|s| s.is_available());
        if !available {
            warn!("gyroscope requested but no orientation source is available");
            return Task::failed(ViewerError::GyroscopeUnavailable);
        }
        if self.is_gyroscope_enabled() {
            return self.gyroscope_request.clone().unwrap_or_else(|| Task::completed(()));
        }

        self.take_over(Driver::Gyroscope(Gyroscope::new()));
        let request = Task::pending();
        self.gyroscope_request = Some(request.clone());
        info!("gyroscope control started");
        self.events.emit(ViewerEvent::GyroscopeUpdated(true));
        request
    }

    pub fn stop_gyroscope_control(&mut self) -> Result<()> {
        self.ensure_alive()?;
        if self.is_gyroscope_enabled() {
            self.stop_driver();
        }
        Ok(())
    }

    /// Starts loading a new panorama.
    ///
    /// Only one load may be in flight; a second call fails with
    /// [`ViewerError::LoadInProgress`] and leaves the first untouched. With `transition`
    /// the old panorama fades through black into the new one, which requires both to be
    /// of the same kind.
    pub fn set_panorama(
        &mut self,
        source: impl Into<PanoramaSource>,
        position: Option<ExtendedPosition>,
        transition: bool,
    ) -> Result<Task<()>> {
        self.ensure_alive()?;
        if self.is_loading() {
            return Err(ViewerError::LoadInProgress);
        }
        let source = source.into();
        let transition = transition && self.config.transition.is_some() && self.panorama.is_some();
        if transition {
            if let Some(current) = &self.panorama {
                if current.source.is_cubemap() != source.is_cubemap() {
                    return Err(ViewerError::IncompatibleTransition);
                }
            }
        }

        info!("set panorama {}", source.describe());
        self.loader.request(source.clone(), self.config.pano_data);
        let task = Task::pending();
        self.loading = Some(PendingLoad {
            source,
            position,
            transition,
            task: task.clone(),
        });
        Ok(task)
    }

    /// Where the viewer sits inside the client area that input coordinates refer to.
    pub fn set_viewer_offset(&mut self, x: f64, y: f64) {
        self.viewer_offset = (x, y);
    }

    pub fn resize(&mut self, size: Size) -> Result<()> {
        self.ensure_alive()?;
        if size.is_empty() || size == self.camera.size() {
            return Ok(());
        }
        self.camera.set_size(size);
        self.renderer.set_viewport_size(size);
        self.events.emit(ViewerEvent::SizeUpdated(size));
        // the horizontal fov changed, so the range offsets did too
        self.apply_rotate(self.camera.position());
        Ok(())
    }

    pub fn toggle_fullscreen(&mut self) -> Result<bool> {
        self.ensure_alive()?;
        self.fullscreen = !self.fullscreen;
        self.events.emit(ViewerEvent::FullscreenUpdated(self.fullscreen));
        Ok(self.fullscreen)
    }

    /// Stops every driver, animation and the render loop. Safe to call repeatedly.
    pub fn stop_all(&mut self) {
        if !self.loop_running && matches!(self.driver, Driver::None) && self.animator.is_empty() {
            return;
        }
        self.autorotate_at = None;
        self.stop_driver();
        self.arbiter.reset();
        self.animator.cancel_all();
        if let Some(transition) = self.transition.take() {
            transition.task.cancel();
            self.renderer.set_opacity(1.0);
        }
        self.loop_running = false;
        debug!("render loop stopped");
    }

    pub fn start_loop(&mut self) {
        if self.destroyed || self.loop_running {
            return;
        }
        self.loop_running = true;
        self.camera.mark_dirty();
        debug!("render loop started");
    }

    /// Tears the viewer down. Later calls fail with [`ViewerError::Destroyed`].
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.stop_all();
        if let Some(load) = self.loading.take() {
            load.task.cancel();
        }
        self.clicks.clear();
        self.markers.clear();
        self.events.clear();
        self.destroyed = true;
        info!("viewer destroyed");
    }

    // ---- markers ----

    pub fn add_marker(&mut self, descriptor: MarkerDescriptor) -> Result<()> {
        self.ensure_alive()?;
        let position = self.resolve_position(descriptor.position)?;
        let mut marker = Marker::new(descriptor.id, position, descriptor.width, descriptor.height);
        marker.tooltip = descriptor.tooltip;
        self.markers.insert(marker);
        Ok(())
    }

    pub fn remove_marker(&mut self, id: &str) -> Result<Marker> {
        self.ensure_alive()?;
        self.markers
            .remove(id)
            .ok_or_else(|| ViewerError::UnknownMarker(id.to_string()))
    }

    pub fn markers(&self) -> &MarkerSet {
        &self.markers
    }

    /// Topmost marker under a viewer pixel.
    pub fn marker_at(&self, x: f64, y: f64) -> Option<&Marker> {
        self.markers.hit_test(&self.camera.projection(), x, y)
    }

    /// Where a marker currently sits on screen, `None` when it is behind the camera.
    pub fn marker_viewer_position(&self, id: &str) -> Result<Option<(f64, f64)>> {
        let marker = self
            .markers
            .get(id)
            .ok_or_else(|| ViewerError::UnknownMarker(id.to_string()))?;
        Ok(marker.project(&self.camera.projection()))
    }

    // ---- input ----

    /// Routes one raw input event. Coordinates are client pixels, shifted by the
    /// viewer offset wherever a point on the panorama is needed.
    pub fn handle_input(&mut self, event: InputEvent, now_ms: f64) -> Result<()> {
        self.ensure_alive()?;
        match event {
            InputEvent::PointerDown { x, y } => self.start_drag(x, y, now_ms),
            InputEvent::PointerMove { x, y } => {
                if let Some((dx, dy)) = self.arbiter.drag_to(x, y, now_ms) {
                    self.drag_by(dx, dy);
                }
            }
            InputEvent::PointerUp { x, y } => self.end_drag(x, y, now_ms),
            InputEvent::TouchStart { touches } => match touches.as_slice() {
                [(x, y)] => self.start_drag(*x, *y, now_ms),
                [a, b, ..] => {
                    if matches!(self.driver, Driver::Drag) {
                        self.driver = Driver::None;
                    }
                    self.autorotate_at = None;
                    self.arbiter.start_pinch(*a, *b);
                }
                [] => {}
            },
            InputEvent::TouchMove { touches } => match (self.arbiter.state(), touches.as_slice()) {
                (GestureState::Pinching, [a, b, ..]) => {
                    if let Some(delta) = self.arbiter.pinch_to(*a, *b) {
                        self.apply_zoom(self.camera.zoom_level() as f64 + delta);
                    }
                }
                (GestureState::Dragging, [(x, y)]) => {
                    if let Some((dx, dy)) = self.arbiter.drag_to(*x, *y, now_ms) {
                        self.drag_by(dx, dy);
                    }
                }
                _ => {}
            },
            InputEvent::TouchEnd { remaining, changed } => match self.arbiter.state() {
                GestureState::Dragging if remaining == 0 => self.end_drag(changed.0, changed.1, now_ms),
                GestureState::Pinching => self.arbiter.reset(),
                _ => {}
            },
            InputEvent::Wheel { spin_y } => {
                if self.config.mousewheel && spin_y != 0.0 {
                    self.autorotate_at = None;
                    let level = self.camera.zoom_level() as f64
                        - spin_y * WHEEL_ZOOM_STEP * self.config.mousewheel_factor;
                    self.apply_zoom(level);
                }
            }
            InputEvent::Key { key } => {
                if let Some(action) = self.config.keyboard.get(&key).copied() {
                    self.key_action(action)?;
                }
            }
        }
        Ok(())
    }

    fn start_drag(&mut self, x: f64, y: f64, now_ms: f64) {
        // the gyroscope keeps driving; drags only shift its reference
        if self.is_gyroscope_enabled() {
            self.autorotate_at = None;
        } else {
            self.take_over(Driver::Drag);
        }
        self.arbiter.start_drag(x, y, now_ms);
    }

    fn end_drag(&mut self, x: f64, y: f64, now_ms: f64) {
        let allow_inertia = self.config.move_inertia && !self.is_gyroscope_enabled();
        let release = self.arbiter.end_drag(x, y, now_ms, allow_inertia);
        if matches!(self.driver, Driver::Drag) {
            self.driver = Driver::None;
        }

        match release {
            Release::Click { x, y } => self.click(x, y, now_ms),
            Release::Inertia(inertia) => {
                let handle = self.animator.animate(
                    vec![
                        ("x", PropertyRange::new(inertia.from.0, inertia.to.0)),
                        ("y", PropertyRange::new(inertia.from.1, inertia.to.1)),
                    ],
                    inertia.duration_ms,
                    Easing::OutCirc,
                );
                self.driver = Driver::Inertia(handle);
            }
            Release::Stop => {}
        }
    }

    /// Pointer travel in pixels to camera rotation.
    fn drag_by(&mut self, dx: f64, dy: f64) {
        let size = self.camera.size();
        if size.is_empty() {
            return;
        }
        let speed = self.config.move_speed;
        let d_long = dx / size.width as f64 * self.camera.h_fov().to_radians() * speed;
        let d_lat = dy / size.height as f64 * self.camera.v_fov().to_radians() * speed;
        self.rotate_by(-d_long, d_lat);
    }

    fn rotate_by(&mut self, d_long: f64, d_lat: f64) {
        if let Driver::Gyroscope(gyroscope) = &mut self.driver {
            gyroscope.shift(d_long);
            return;
        }
        let current = self.camera.position();
        self.apply_rotate(Position {
            longitude: current.longitude + d_long,
            latitude: current.latitude + d_lat,
        });
    }

    fn key_action(&mut self, action: KeyAction) -> Result<()> {
        let speed = KEYBOARD_STEP * self.config.move_speed;
        let d_long = (speed * self.camera.h_fov()).to_radians();
        let d_lat = (speed * self.camera.v_fov()).to_radians();

        let (dl, dt) = match action {
            KeyAction::RotateLatitudeUp => (0.0, d_lat),
            KeyAction::RotateLatitudeDown => (0.0, -d_lat),
            KeyAction::RotateLongitudeRight => (d_long, 0.0),
            KeyAction::RotateLongitudeLeft => (-d_long, 0.0),
            KeyAction::ZoomIn => return self.zoom_in().map(|_| ()),
            KeyAction::ZoomOut => return self.zoom_out().map(|_| ()),
            KeyAction::ToggleAutorotate => return self.toggle_autorotate(),
        };

        if !self.is_gyroscope_enabled() {
            self.take_over(Driver::None);
        }
        self.rotate_by(dl, dt);
        Ok(())
    }

    fn click(&mut self, client_x: f64, client_y: f64, now_ms: f64) {
        let (x, y) = (client_x - self.viewer_offset.0, client_y - self.viewer_offset.1);
        let projection = self.camera.projection();
        let Some(position) = projection.viewer_pixel_to_spherical(x, y) else {
            debug!("click at ({x}, {y}) does not hit the sphere");
            return;
        };
        let data = ClickData {
            client_x,
            client_y,
            viewer_x: x,
            viewer_y: y,
            position,
            texture: self.spherical_to_texture(position).ok(),
            marker: self.marker_at(x, y).map(|m| m.id.clone()),
        };

        match self.clicks.click(data, now_ms) {
            ClickResult::Click(data) => self.events.emit(ViewerEvent::Click(data)),
            ClickResult::DoubleClick(data) => self.events.emit(ViewerEvent::DblClick(data)),
        }
    }

    // ---- render loop ----

    /// One turn of the render loop. Returns whether the renderer was asked to draw.
    pub fn frame(&mut self, now_ms: f64) -> bool {
        if self.destroyed || !self.loop_running {
            return false;
        }

        self.poll_loader(now_ms);
        self.clicks.expire(now_ms);

        if self.autorotate_at.is_some_and(|at| now_ms >= at) {
            self.autorotate_at = None;
            if matches!(self.driver, Driver::None) {
                // only fails when destroyed, checked above
                let _ = self.start_autorotate();
            }
        }

        self.before_render(now_ms);

        if self.camera.take_needs_update() {
            let view = self.view_params();
            self.renderer.draw(&view);
            true
        } else {
            false
        }
    }

    fn tick_owner(&self, id: u64) -> TickOwner {
        match &self.driver {
            Driver::Animation(h) if h.id() == id => TickOwner::Animation,
            Driver::Inertia(h) if h.id() == id => TickOwner::Inertia,
            _ if self.transition.as_ref().is_some_and(|t| t.handle.id() == id) => TickOwner::Transition,
            _ => TickOwner::Orphan,
        }
    }

    fn before_render(&mut self, now_ms: f64) {
        if self.transition.as_ref().is_some_and(|t| !t.task.is_pending()) {
            if let Some(transition) = self.transition.take() {
                debug!("transition cancelled");
                transition.handle.cancel();
                self.renderer.set_opacity(1.0);
                self.camera.mark_dirty();
            }
        }
        for tick in self.animator.tick(now_ms) {
            match self.tick_owner(tick.id) {
                TickOwner::Animation => self.animation_tick(&tick),
                TickOwner::Inertia => self.inertia_tick(&tick),
                TickOwner::Transition => self.transition_tick(&tick, now_ms),
                TickOwner::Orphan => {}
            }
        }

        // handle cancelled from outside
        if self.driver.handle().is_some_and(|h| !h.is_running()) {
            self.driver = Driver::None;
        }

        let position = self.camera.position();
        if let Driver::Autorotate(autorotate) = &mut self.driver {
            let next = autorotate.tick(now_ms, position);
            let outcome = self.apply_rotate(next);
            let bounced = outcome
                .sides
                .iter()
                .any(|s| matches!(s, Side::Left | Side::Right));
            if bounced {
                if let Driver::Autorotate(autorotate) = &mut self.driver {
                    autorotate.reverse();
                    debug!("autorotate reversed at {:?}", outcome.sides);
                }
            }
        }

        if let Driver::Gyroscope(gyroscope) = &mut self.driver {
            let reading = self.orientation.as_mut().and_then(|s| s.read());
            if let Some(reading) = reading {
                let next = gyroscope.tick(reading, position);
                self.apply_rotate(next);
                if let Some(request) = self.gyroscope_request.take() {
                    request.complete(());
                }
            }
        }
    }

    fn animation_tick(&mut self, tick: &Tick) {
        let current = self.camera.position();
        self.apply_rotate(Position {
            longitude: tick.sample.get("longitude").unwrap_or(current.longitude),
            latitude: tick.sample.get("latitude").unwrap_or(current.latitude),
        });
        if let Some(level) = tick.sample.get("zoom") {
            self.apply_zoom(level);
        }
        if tick.finished {
            self.driver = Driver::None;
        }
    }

    fn inertia_tick(&mut self, tick: &Tick) {
        if let (Some(x), Some(y)) = (tick.sample.get("x"), tick.sample.get("y")) {
            let (dx, dy) = self.arbiter.move_to(x, y);
            self.drag_by(dx, dy);
        }
        if tick.finished {
            self.driver = Driver::None;
        }
    }

    fn transition_tick(&mut self, tick: &Tick, now_ms: f64) {
        let progress = tick.sample.get("progress").unwrap_or(1.0);

        let swap = self
            .transition
            .as_mut()
            .filter(|t| progress >= 0.5 && !t.swapped)
            .map(|t| {
                t.swapped = true;
                (Arc::clone(&t.texture), t.position)
            });
        if let Some((texture, position)) = swap {
            if let Err(e) = self.show_panorama(texture, position, now_ms) {
                warn!("panorama transition failed: {e}");
                self.renderer.set_opacity(1.0);
                if let Some(transition) = self.transition.take() {
                    transition.handle.cancel();
                    transition.task.fail(e);
                }
                return;
            }
        }

        self.renderer.set_opacity((2.0 * progress - 1.0).abs() as f32);
        self.camera.mark_dirty();

        if tick.finished {
            self.renderer.set_opacity(1.0);
            if let Some(transition) = self.transition.take() {
                transition.task.complete(());
            }
        }
    }

    fn poll_loader(&mut self, now_ms: f64) {
        if self.loading.is_none() {
            return;
        }
        let Some(result) = self.loader.poll() else {
            return;
        };
        let Some(load) = self.loading.take() else {
            return;
        };
        if load.task.is_cancelled() {
            debug!("dropping cancelled load of {}", load.source.describe());
            return;
        }

        let texture = match result {
            Ok(texture) => texture,
            Err(e) => {
                warn!("failed to load {}: {e}", load.source.describe());
                load.task.fail(e);
                return;
            }
        };
        let position = match load.position.map(|p| resolve_against(p, Some(&*texture))).transpose() {
            Ok(position) => position,
            Err(e) => {
                warn!("cannot place {}: {e}", load.source.describe());
                load.task.fail(e);
                return;
            }
        };

        if load.transition {
            let duration = self.config.transition.map_or(0.0, |t| t.duration_ms);
            let handle = self
                .animator
                .animate(vec![("progress", PropertyRange::new(0.0, 1.0))], duration, Easing::Linear);
            debug!("transition to {} over {:.0}ms", load.source.describe(), duration);
            self.transition = Some(Transition {
                handle,
                texture,
                position,
                swapped: false,
                task: load.task,
            });
            return;
        }

        match self.show_panorama(texture, position, now_ms) {
            Ok(()) => {
                load.task.complete(());
            }
            Err(e) => {
                warn!("cannot show {}: {e}", load.source.describe());
                load.task.fail(e);
            }
        }
    }

    fn show_panorama(
        &mut self,
        texture: Arc<PanoramaTexture>,
        position: Option<Position>,
        now_ms: f64,
    ) -> Result<()> {
        self.renderer.set_panorama(&texture)?;
        self.panorama = Some(texture);
        if let Some(position) = position {
            self.apply_rotate(position);
        }
        self.camera.mark_dirty();
        self.events.emit(ViewerEvent::PanoramaLoaded);

        if !self.ready {
            self.ready = true;
            info!("viewer ready");
            self.events.emit(ViewerEvent::Ready);
            if let Some(delay) = self.config.time_anim {
                self.autorotate_at = Some(now_ms + delay);
            }
        }
        Ok(())
    }
}

fn pano_data_of(texture: Option<&PanoramaTexture>) -> Result<PanoData> {
    texture
        .filter(|t| !t.source.is_cubemap())
        .and_then(|t| t.pano_data)
        .ok_or(ViewerError::NoPanoData)
}

/// Texture positions are resolved against `texture`, which need not be shown yet.
fn resolve_against(position: ExtendedPosition, texture: Option<&PanoramaTexture>) -> Result<Position> {
    match position {
        ExtendedPosition::Spherical(p) => Ok(p),
        ExtendedPosition::Texture(t) => Ok(texture_to_spherical(t, &pano_data_of(texture)?)),
    }
}

impl<R: PanoramaRenderer, L: TextureLoader> Drop for Viewer<R, L> {
    fn drop(&mut self) {
        self.destroy();
    }
}
