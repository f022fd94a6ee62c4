// main.rs - desktop host: window, input mapping, menu bar and status bar

#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")] // no console window in release builds

use anyhow::Context;
use clap::Parser;
use log::{debug, error, info, warn};
use sphere_viewer::config::{find_config_file, ViewerConfig};
use sphere_viewer::{
    ImageLoader, InputEvent, PanoramaSource, Position, Size, TaskState, Viewer, ViewerEvent, WgpuRenderer,
};

use winit::{
    dpi::{LogicalSize, PhysicalPosition},
    event::*,
    event_loop::{ControlFlow, EventLoop},
    window::{Fullscreen, Window, WindowBuilder},
};

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "webp"];

#[derive(Parser, Debug)]
#[command(name = "sphere_viewer", version, about = "360° panorama viewer")]
struct Args {
    /// Equirectangular panorama to open
    image: Option<PathBuf>,

    /// Six cubemap faces: left front right back top bottom
    #[arg(long, num_args = 6, value_name = "FACE")]
    cubemap: Option<Vec<PathBuf>>,

    /// Viewer configuration (JSON)
    #[arg(long)]
    config: Option<PathBuf>,
}

type AppViewer = Viewer<WgpuRenderer, ImageLoader>;

/// Menu clicks, applied to the viewer once the frame is rendered
#[derive(Debug, Clone, PartialEq)]
enum UiAction {
    Open(PathBuf),
    ToggleFullscreen,
    ToggleAutorotate,
    ToggleGyroscope,
    ZoomIn,
    ZoomOut,
    ResetView,
    ToggleFps,
    Exit,
}

/// Snapshot of what the UI shows
struct Status {
    position: Position,
    zoom: u8,
    fov: f64,
    autorotate: bool,
    gyroscope: bool,
    fullscreen: bool,
    loading: bool,
    show_fps: bool,
    fps: f32,
    message: Option<String>,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match find_config_file(args.config.as_deref()) {
        Some(path) => {
            info!("using config {}", path.display());
            ViewerConfig::load(&path)?
        }
        None => ViewerConfig::default(),
    };
    let initial = match (args.cubemap, args.image) {
        (Some(faces), _) => Some(cubemap_source(faces)?),
        (None, Some(image)) => Some(PanoramaSource::Equirectangular(image)),
        (None, None) => config.panorama.clone().map(PanoramaSource::Equirectangular),
    };

    let event_loop = EventLoop::new();
    let initial_size = config.size.unwrap_or_default();
    let window = Arc::new(
        WindowBuilder::new()
            .with_title("Sphere Viewer")
            .with_inner_size(LogicalSize::new(initial_size.width, initial_size.height))
            .build(&event_loop)
            .context("creating window")?,
    );

    // fullscreen ray casting, no mesh
    let renderer = pollster::block_on(WgpuRenderer::new(window.clone())).context("initialising renderer")?;
    let inner = window.inner_size();
    config.size = Some(Size::new(inner.width, inner.height));

    let loader = ImageLoader::new(config.use_xmp_data, config.cache_size());
    let mut viewer: AppViewer = Viewer::new(config, renderer, loader);

    if let Some(source) = initial {
        if let Err(e) = viewer.set_panorama(source, None, false) {
            warn!("cannot open initial panorama: {e}");
        }
    }

    // interaction state
    let start = Instant::now();
    let mut cursor = PhysicalPosition::new(0.0, 0.0);
    let mut touches: BTreeMap<u64, (f64, f64)> = BTreeMap::new();
    let mut message: Option<String> = match viewer.config_warnings() {
        [] => None,
        warnings => Some(format!("config: {}", warnings.join("; "))),
    };
    let mut gyroscope_request: Option<sphere_viewer::Task<()>> = None;

    // fps
    let mut last_frame_time = Instant::now();
    let mut frame_count = 0;
    let mut fps = 0.0;
    let mut show_fps = false;

    event_loop.run(move |event, _, control_flow| {
        *control_flow = ControlFlow::Poll;
        let now_ms = start.elapsed().as_secs_f64() * 1000.0;

        match event {
            Event::WindowEvent { event, .. } => {
                // egui gets the event first
                let renderer = viewer.renderer_mut();
                let response = renderer.egui_state.on_event(&renderer.egui_ctx, &event);
                if response.consumed {
                    return;
                }

                let input = match event {
                    WindowEvent::CloseRequested => {
                        viewer.destroy();
                        *control_flow = ControlFlow::Exit;
                        None
                    }
                    WindowEvent::Resized(new_size) => {
                        if let Err(e) = viewer.resize(Size::new(new_size.width, new_size.height)) {
                            debug!("resize ignored: {e}");
                        }
                        None
                    }
                    WindowEvent::KeyboardInput { input, .. } => {
                        if input.state != ElementState::Pressed {
                            None
                        } else {
                            match input.virtual_keycode {
                                Some(VirtualKeyCode::O) => {
                                    if let Some(path) = pick_image() {
                                        open(&mut viewer, PanoramaSource::Equirectangular(path), &mut message);
                                    }
                                    None
                                }
                                Some(VirtualKeyCode::F11) => {
                                    let _ = viewer.toggle_fullscreen();
                                    None
                                }
                                Some(code) => dom_key(code).map(|key| InputEvent::Key { key: key.to_string() }),
                                None => None,
                            }
                        }
                    }
                    WindowEvent::CursorMoved { position, .. } => {
                        cursor = position;
                        Some(InputEvent::PointerMove {
                            x: position.x,
                            y: position.y,
                        })
                    }
                    WindowEvent::MouseInput {
                        state,
                        button: MouseButton::Left,
                        ..
                    } => Some(match state {
                        ElementState::Pressed => InputEvent::PointerDown { x: cursor.x, y: cursor.y },
                        ElementState::Released => InputEvent::PointerUp { x: cursor.x, y: cursor.y },
                    }),
                    WindowEvent::MouseWheel { delta, .. } => {
                        // winit scrolls up positive
                        let spin_y = match delta {
                            MouseScrollDelta::LineDelta(_, y) => -y as f64,
                            MouseScrollDelta::PixelDelta(pos) => -pos.y / 20.0,
                        };
                        Some(InputEvent::Wheel { spin_y })
                    }
                    WindowEvent::Touch(touch) => {
                        let point = (touch.location.x, touch.location.y);
                        match touch.phase {
                            TouchPhase::Started => {
                                touches.insert(touch.id, point);
                                Some(InputEvent::TouchStart {
                                    touches: touches.values().copied().collect(),
                                })
                            }
                            TouchPhase::Moved => {
                                touches.insert(touch.id, point);
                                Some(InputEvent::TouchMove {
                                    touches: touches.values().copied().collect(),
                                })
                            }
                            TouchPhase::Ended | TouchPhase::Cancelled => {
                                touches.remove(&touch.id);
                                Some(InputEvent::TouchEnd {
                                    remaining: touches.len(),
                                    changed: point,
                                })
                            }
                        }
                    }
                    WindowEvent::DroppedFile(path) => {
                        open(&mut viewer, PanoramaSource::Equirectangular(path), &mut message);
                        None
                    }
                    _ => None,
                };

                if let Some(input) = input {
                    if let Err(e) = viewer.handle_input(input, now_ms) {
                        debug!("input dropped: {e}");
                    }
                }
            }

            Event::RedrawRequested(_) => {
                if viewer.is_destroyed() {
                    return;
                }

                // fps
                frame_count += 1;
                let now = Instant::now();
                if now.duration_since(last_frame_time).as_secs_f32() >= 1.0 {
                    fps = frame_count as f32 / now.duration_since(last_frame_time).as_secs_f32();
                    frame_count = 0;
                    last_frame_time = now;
                }

                viewer.frame(now_ms);

                for event in viewer.poll_events() {
                    match event {
                        ViewerEvent::FullscreenUpdated(on) => apply_fullscreen(&window, on),
                        ViewerEvent::Click(data) | ViewerEvent::DblClick(data) => debug!(
                            "click at {:.1}°, {:.1}° marker {:?}",
                            data.position.longitude.to_degrees(),
                            data.position.latitude.to_degrees(),
                            data.marker
                        ),
                        ViewerEvent::PositionUpdated(_) => {}
                        other => debug!("event {}", other.name()),
                    }
                }

                if let Some(request) = &gyroscope_request {
                    match request.state() {
                        TaskState::Pending => {}
                        TaskState::Failed => {
                            message = Some("Gyroscope not available".to_string());
                            gyroscope_request = None;
                        }
                        _ => gyroscope_request = None,
                    }
                }

                let camera = viewer.camera();
                let status = Status {
                    position: camera.position(),
                    zoom: camera.zoom_level(),
                    fov: camera.v_fov(),
                    autorotate: viewer.is_autorotate_enabled(),
                    gyroscope: viewer.is_gyroscope_enabled(),
                    fullscreen: viewer.is_fullscreen(),
                    loading: viewer.is_loading(),
                    show_fps,
                    fps,
                    message: message.clone(),
                };

                // scene and UI
                let mut actions = Vec::new();
                let render_result = viewer
                    .renderer_mut()
                    .render_with_ui(&window, |ctx| draw_ui(ctx, &status, &mut actions));

                for action in actions {
                    let result = match action {
                        UiAction::Open(path) => {
                            open(&mut viewer, PanoramaSource::Equirectangular(path), &mut message);
                            Ok(())
                        }
                        UiAction::ToggleFullscreen => viewer.toggle_fullscreen().map(|_| ()),
                        UiAction::ToggleAutorotate => viewer.toggle_autorotate(),
                        UiAction::ToggleGyroscope => {
                            if viewer.is_gyroscope_enabled() {
                                viewer.stop_gyroscope_control()
                            } else {
                                gyroscope_request = Some(viewer.start_gyroscope_control());
                                Ok(())
                            }
                        }
                        UiAction::ZoomIn => viewer.zoom_in().map(|_| ()),
                        UiAction::ZoomOut => viewer.zoom_out().map(|_| ()),
                        UiAction::ResetView => {
                            let position = viewer.config().default_position();
                            let level = viewer.config().default_zoom_level();
                            viewer.rotate(position).and_then(|_| viewer.zoom(level as f64).map(|_| ()))
                        }
                        UiAction::ToggleFps => {
                            show_fps = !show_fps;
                            Ok(())
                        }
                        UiAction::Exit => {
                            viewer.destroy();
                            *control_flow = ControlFlow::Exit;
                            Ok(())
                        }
                    };
                    if let Err(e) = result {
                        warn!("{e}");
                        message = Some(e.to_string());
                    }
                }

                match render_result {
                    Ok(_) => {}
                    Err(wgpu::SurfaceError::Lost) => {
                        let renderer = viewer.renderer_mut();
                        renderer.resize(renderer.size);
                    }
                    Err(wgpu::SurfaceError::OutOfMemory) => *control_flow = ControlFlow::Exit,
                    Err(e) => error!("render error: {:?}", e),
                }
            }

            Event::MainEventsCleared => {
                window.request_redraw();
            }

            _ => {}
        }
    });
}

fn cubemap_source(faces: Vec<PathBuf>) -> anyhow::Result<PanoramaSource> {
    let faces: [PathBuf; 6] = faces
        .try_into()
        .map_err(|v: Vec<PathBuf>| anyhow::anyhow!("--cubemap needs 6 faces, got {}", v.len()))?;
    Ok(PanoramaSource::Cubemap(Box::new(faces)))
}

fn pick_image() -> Option<PathBuf> {
    rfd::FileDialog::new()
        .add_filter("Images", &IMAGE_EXTENSIONS)
        .pick_file()
}

fn open(viewer: &mut AppViewer, source: PanoramaSource, message: &mut Option<String>) {
    match viewer.set_panorama(source, None, true) {
        Ok(_) => *message = None,
        Err(e) => {
            warn!("{e}");
            *message = Some(e.to_string());
        }
    }
}

fn apply_fullscreen(window: &Window, on: bool) {
    if on {
        window.set_fullscreen(Some(Fullscreen::Borderless(None)));
    } else {
        window.set_fullscreen(None);
    }
}

/// winit key code -> DOM key name
fn dom_key(code: VirtualKeyCode) -> Option<&'static str> {
    Some(match code {
        VirtualKeyCode::Up => "ArrowUp",
        VirtualKeyCode::Down => "ArrowDown",
        VirtualKeyCode::Left => "ArrowLeft",
        VirtualKeyCode::Right => "ArrowRight",
        VirtualKeyCode::PageUp => "PageUp",
        VirtualKeyCode::PageDown => "PageDown",
        VirtualKeyCode::Plus | VirtualKeyCode::NumpadAdd | VirtualKeyCode::Equals => "+",
        VirtualKeyCode::Minus | VirtualKeyCode::NumpadSubtract => "-",
        VirtualKeyCode::Space => " ",
        _ => return None,
    })
}

fn draw_ui(ctx: &egui::Context, status: &Status, actions: &mut Vec<UiAction>) {
    egui::TopBottomPanel::top("menu_bar").show(ctx, |ui| {
        egui::menu::bar(ui, |ui| {
            // File
            ui.menu_button("File", |ui| {
                if ui.button("Open image…").clicked() {
                    ui.close_menu();
                    if let Some(path) = pick_image() {
                        actions.push(UiAction::Open(path));
                    }
                }
                if ui.button("Exit").clicked() {
                    actions.push(UiAction::Exit);
                }
            });

            // View
            ui.menu_button("View", |ui| {
                if ui.button("Reset view").clicked() {
                    actions.push(UiAction::ResetView);
                    ui.close_menu();
                }
                let fullscreen = if status.fullscreen { "Exit fullscreen" } else { "Fullscreen" };
                if ui.button(fullscreen).clicked() {
                    actions.push(UiAction::ToggleFullscreen);
                    ui.close_menu();
                }
                ui.separator();
                let mut show_fps = status.show_fps;
                if ui.checkbox(&mut show_fps, "Show FPS").clicked() {
                    actions.push(UiAction::ToggleFps);
                    ui.close_menu();
                }
            });

            // navbar
            ui.separator();
            if ui.selectable_label(status.autorotate, "⟳ Autorotate").clicked() {
                actions.push(UiAction::ToggleAutorotate);
            }
            if ui.selectable_label(status.gyroscope, "Gyroscope").clicked() {
                actions.push(UiAction::ToggleGyroscope);
            }
            if ui.button("−").clicked() {
                actions.push(UiAction::ZoomOut);
            }
            if ui.button("+").clicked() {
                actions.push(UiAction::ZoomIn);
            }
        });
    });

    egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
        ui.horizontal(|ui| {
            if status.loading {
                ui.label(egui::RichText::new("Loading…").color(egui::Color32::YELLOW));
                ui.label("|");
            }
            if let Some(message) = &status.message {
                ui.label(egui::RichText::new(message).color(egui::Color32::LIGHT_RED));
                ui.label("|");
            }

            ui.label(format!("Zoom: {}", status.zoom));
            ui.label("|");
            ui.label(format!("FOV: {:.1}°", status.fov));
            ui.label("|");
            ui.label(format!("Long: {:.1}°", status.position.longitude.to_degrees()));
            ui.label("|");
            ui.label(format!("Lat: {:.1}°", status.position.latitude.to_degrees()));

            if status.show_fps {
                ui.label("|");
                ui.label(egui::RichText::new(format!("FPS: {:.1}", status.fps)).color(egui::Color32::GREEN));
            }
        });
    });
}
