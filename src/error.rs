// error.rs - viewer error type

use std::path::PathBuf;

/// Errors returned by fallible viewer operations.
///
/// Configuration problems never show up here: they are repaired in
/// [`crate::config::ViewerConfig::sanitize`] and reported as warnings.
#[derive(Debug, thiserror::Error)]
pub enum ViewerError {
    #[error("a panorama is already loading")]
    LoadInProgress,

    #[error("cannot transition between equirectangular and cubemap panoramas")]
    IncompatibleTransition,

    #[error("texture coordinates need an equirectangular panorama with pano data")]
    NoPanoData,

    #[error("gyroscope is not available on this device")]
    GyroscopeUnavailable,

    #[error("renderer not supported: {0}")]
    UnsupportedRenderer(String),

    #[error("viewer has been destroyed")]
    Destroyed,

    #[error("unknown marker `{0}`")]
    UnknownMarker(String),

    #[error("invalid panorama source: {0}")]
    InvalidSource(String),

    #[error("failed to decode {path:?}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to read {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T, E = ViewerError> = std::result::Result<T, E>;
