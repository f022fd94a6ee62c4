// lib.rs - camera and interaction core of the panorama viewer
//
// The viewer owns one Camera that every navigation source writes through, a frame-driven
// Animator, the drag/pinch/click state machine and the autorotate/gyroscope drivers.
// Drawing and image decoding sit behind the PanoramaRenderer and TextureLoader traits.

pub mod animation;
pub mod camera;
pub mod config;
pub mod coords;
pub mod drivers;
pub mod error;
pub mod events;
pub mod input;
pub mod loader;
pub mod markers;
pub mod ranges;
pub mod renderer;
pub mod task;
pub mod viewer;

pub use animation::{AnimationHandle, Easing};
pub use camera::Camera;
pub use config::ViewerConfig;
pub use coords::{ExtendedPosition, PanoData, Position, Size, TextureCoords};
pub use drivers::{DeviceOrientation, NavigationDriver, OrientationSource};
pub use error::{Result, ViewerError};
pub use events::{ClickData, ViewerEvent};
pub use input::InputEvent;
pub use loader::{ImageLoader, PanoramaSource, PanoramaTexture, TextureLoader};
pub use markers::{Marker, MarkerDescriptor};
pub use ranges::Side;
pub use renderer::{PanoramaRenderer, ViewParams, WgpuRenderer};
pub use task::{Outcome, Task, TaskState};
pub use viewer::{AnimSpeed, Viewer};
