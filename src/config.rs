// config.rs - viewer configuration
//
// - Loaded from JSON, every field optional (defaults below)
// - Angles: number (radians) or "90deg" / "1.2rad"
// - Speeds: number (rad/s) or "2rpm" / "10dpm" / "5 degrees per second" ...
// - File lookup: --config <path> -> SPHERE_VIEWER_CONFIG -> <exe_dir>/assets/viewer.json
//   -> ./assets/viewer.json -> built-in defaults
// - sanitize() repairs bad values and reports each repair as a warning

use crate::coords::{clamp_latitude, PanoData, Position, Size};
use crate::ranges::{FovBounds, Range, Ranges};
use anyhow::Context;
use log::warn;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{de, Deserialize, Deserializer};
use std::collections::HashMap;
use std::f64::consts::{FRAC_PI_2, TAU};
use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "SPHERE_VIEWER_CONFIG";

static ANGLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(-?[0-9]+(?:\.[0-9]+)?)\s*(deg|degs|degrees|rad|rads|radians)?$")
        .expect("angle regex")
});

static SPEED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(-?[0-9]+(?:\.[0-9]+)?)\s*([a-z ]+)$").expect("speed regex")
});

/// Parses "90deg", "1.5rad" or a bare number (radians).
pub fn parse_angle(text: &str) -> Result<f64, String> {
    let text = text.trim().to_lowercase();
    let caps = ANGLE_RE
        .captures(&text)
        .ok_or_else(|| format!("unknown angle `{text}`"))?;
    let value: f64 = caps[1].parse().map_err(|_| format!("unknown angle `{text}`"))?;
    Ok(match caps.get(2).map(|m| m.as_str()) {
        Some("deg") | Some("degs") | Some("degrees") => value.to_radians(),
        _ => value,
    })
}

/// Parses an angular speed into radians per second.
pub fn parse_speed(text: &str) -> Result<f64, String> {
    let text = text.trim().to_lowercase();
    let caps = SPEED_RE
        .captures(&text)
        .ok_or_else(|| format!("unknown speed `{text}`"))?;
    let value: f64 = caps[1].parse().map_err(|_| format!("unknown speed `{text}`"))?;
    let per_second = match caps[2].trim() {
        "dpm" | "degrees per minute" => value.to_radians() / 60.0,
        "dps" | "degrees per second" => value.to_radians(),
        "rdpm" | "radians per minute" => value / 60.0,
        "rdps" | "radians per second" => value,
        "rpm" | "revolutions per minute" => value * TAU / 60.0,
        "rps" | "revolutions per second" => value * TAU,
        unit => return Err(format!("unknown speed unit `{unit}`")),
    };
    Ok(per_second)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Number(f64),
    Text(String),
}

/// An angle in radians.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Angle(pub f64);

impl<'de> Deserialize<'de> for Angle {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        match NumberOrText::deserialize(d)? {
            NumberOrText::Number(n) => Ok(Angle(n)),
            NumberOrText::Text(s) => parse_angle(&s).map(Angle).map_err(de::Error::custom),
        }
    }
}

/// An angular speed in radians per second.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Speed(pub f64);

impl Default for Speed {
    fn default() -> Self {
        // 2rpm
        Speed(2.0 * TAU / 60.0)
    }
}

impl<'de> Deserialize<'de> for Speed {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        match NumberOrText::deserialize(d)? {
            NumberOrText::Number(n) => Ok(Speed(n)),
            NumberOrText::Text(s) => parse_speed(&s).map(Speed).map_err(de::Error::custom),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrBool<T> {
    Bool(bool),
    Value(T),
}

fn number_or_false<'de, D, T>(d: D, default: Option<T>) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(match NumberOrBool::<T>::deserialize(d)? {
        NumberOrBool::Bool(false) => None,
        NumberOrBool::Bool(true) => default,
        NumberOrBool::Value(v) => Some(v),
    })
}

fn de_time_anim<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    number_or_false(d, Some(DEFAULT_TIME_ANIM_MS))
}

fn de_transition<'de, D: Deserializer<'de>>(d: D) -> Result<Option<TransitionConfig>, D::Error> {
    number_or_false(d, Some(TransitionConfig::default()))
}

pub const DEFAULT_TIME_ANIM_MS: f64 = 2000.0;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct TransitionConfig {
    pub duration_ms: f64,
}

impl Default for TransitionConfig {
    fn default() -> Self {
        Self {
            duration_ms: 1500.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum KeyAction {
    RotateLatitudeUp,
    RotateLatitudeDown,
    RotateLongitudeRight,
    RotateLongitudeLeft,
    ZoomIn,
    ZoomOut,
    ToggleAutorotate,
}

pub fn default_keyboard() -> HashMap<String, KeyAction> {
    [
        ("ArrowUp", KeyAction::RotateLatitudeUp),
        ("ArrowDown", KeyAction::RotateLatitudeDown),
        ("ArrowRight", KeyAction::RotateLongitudeRight),
        ("ArrowLeft", KeyAction::RotateLongitudeLeft),
        ("PageUp", KeyAction::ZoomIn),
        ("PageDown", KeyAction::ZoomOut),
        ("+", KeyAction::ZoomIn),
        ("-", KeyAction::ZoomOut),
        (" ", KeyAction::ToggleAutorotate),
    ]
    .into_iter()
    .map(|(k, a)| (k.to_string(), a))
    .collect()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Panorama shown at start-up (binary only).
    pub panorama: Option<PathBuf>,
    pub size: Option<Size>,

    pub longitude_range: Option<[Angle; 2]>,
    pub latitude_range: Option<[Angle; 2]>,

    /// Degrees.
    pub min_fov: f64,
    pub max_fov: f64,
    pub default_fov: Option<f64>,
    pub default_long: Angle,
    pub default_lat: Angle,

    pub anim_speed: Speed,
    /// Latitude autorotate settles on, defaults to `default_lat`.
    pub anim_lat: Option<Angle>,
    pub autorotate_damping: f64,
    /// Autorotate start delay in ms after the first panorama is shown, `false` to disable.
    #[serde(deserialize_with = "de_time_anim")]
    pub time_anim: Option<f64>,

    pub move_speed: f64,
    pub move_inertia: bool,
    pub mousewheel: bool,
    pub mousewheel_factor: f64,
    pub zoom_speed: f64,
    pub keyboard: HashMap<String, KeyAction>,

    #[serde(deserialize_with = "de_transition")]
    pub transition: Option<TransitionConfig>,
    pub pano_data: Option<PanoData>,
    pub use_xmp_data: bool,
    /// Number of decoded panoramas kept in memory.
    pub cache_texture: f64,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            panorama: None,
            size: None,
            longitude_range: None,
            latitude_range: None,
            min_fov: 30.0,
            max_fov: 90.0,
            default_fov: None,
            default_long: Angle(0.0),
            default_lat: Angle(0.0),
            anim_speed: Speed::default(),
            anim_lat: None,
            autorotate_damping: 200.0,
            time_anim: Some(DEFAULT_TIME_ANIM_MS),
            move_speed: 1.0,
            move_inertia: true,
            mousewheel: true,
            mousewheel_factor: 1.0,
            zoom_speed: 2.0,
            keyboard: default_keyboard(),
            transition: Some(TransitionConfig::default()),
            pano_data: None,
            use_xmp_data: true,
            cache_texture: 0.0,
        }
    }
}

impl ViewerConfig {
    /// Parses a config as written. Values are repaired later by [`Self::sanitize`],
    /// which `Viewer::new` runs and whose warnings it keeps.
    pub fn from_json_str(text: &str) -> anyhow::Result<Self> {
        serde_json::from_str(text).context("invalid viewer config")
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    /// Repairs invalid values in place. Every repair is logged and returned.
    pub fn sanitize(&mut self) -> Vec<String> {
        let mut warnings = Vec::new();

        if !(self.min_fov > 0.0 && self.max_fov > 0.0) || self.max_fov >= 180.0 {
            warnings.push(format!(
                "fov bounds [{}, {}] out of (0, 180), using [30, 90]",
                self.min_fov, self.max_fov
            ));
            self.min_fov = 30.0;
            self.max_fov = 90.0;
        }
        if self.max_fov < self.min_fov {
            warnings.push(format!(
                "max_fov {} is below min_fov {}, swapping",
                self.max_fov, self.min_fov
            ));
            std::mem::swap(&mut self.min_fov, &mut self.max_fov);
        }
        if let Some(fov) = self.default_fov {
            let clamped = fov.clamp(self.min_fov, self.max_fov);
            if clamped != fov {
                warnings.push(format!("default_fov {fov} clamped to {clamped}"));
                self.default_fov = Some(clamped);
            }
        }

        if let Some([min, max]) = self.latitude_range {
            let (mut lo, mut hi) = (min.0, max.0);
            if lo > hi {
                warnings.push("latitude_range is inverted, swapping".to_string());
                std::mem::swap(&mut lo, &mut hi);
            }
            if lo < -FRAC_PI_2 || hi > FRAC_PI_2 {
                warnings.push("latitude_range exceeds the poles, clamping".to_string());
                lo = clamp_latitude(lo);
                hi = clamp_latitude(hi);
            }
            self.latitude_range = Some([Angle(lo), Angle(hi)]);
        }

        if self.cache_texture < 0.0 || !self.cache_texture.is_finite() {
            warnings.push(format!("cache_texture {} is invalid, disabling cache", self.cache_texture));
            self.cache_texture = 0.0;
        } else if self.cache_texture.fract() != 0.0 {
            let rounded = self.cache_texture.round();
            warnings.push(format!(
                "cache_texture must be an integer, rounding {} to {}",
                self.cache_texture, rounded
            ));
            self.cache_texture = rounded;
        }

        for (name, value) in [
            ("move_speed", &mut self.move_speed),
            ("mousewheel_factor", &mut self.mousewheel_factor),
            ("zoom_speed", &mut self.zoom_speed),
        ] {
            if !(*value > 0.0) {
                warnings.push(format!("{name} must be positive, using 1"));
                *value = 1.0;
            }
        }
        if !(self.autorotate_damping >= 1.0) {
            warnings.push("autorotate_damping must be >= 1, using 200".to_string());
            self.autorotate_damping = 200.0;
        }
        if let Some(ms) = self.time_anim.filter(|ms| *ms < 0.0) {
            warnings.push(format!("time_anim {ms} is negative, disabling"));
            self.time_anim = None;
        }

        for w in &warnings {
            warn!("config: {w}");
        }
        warnings
    }

    pub fn ranges(&self) -> Ranges {
        let to_range = |r: &Option<[Angle; 2]>| match r {
            Some([min, max]) => Range::new(min.0, max.0),
            None => Range::UNBOUNDED,
        };
        Ranges {
            longitude: to_range(&self.longitude_range),
            latitude: to_range(&self.latitude_range),
        }
    }

    pub fn fov_bounds(&self) -> FovBounds {
        FovBounds::new(self.min_fov, self.max_fov)
    }

    pub fn default_position(&self) -> Position {
        Position::new(self.default_long.0, self.default_lat.0)
    }

    pub fn default_zoom_level(&self) -> u8 {
        self.fov_bounds().default_level(self.default_fov)
    }

    pub fn anim_lat(&self) -> f64 {
        clamp_latitude(self.anim_lat.unwrap_or(self.default_lat).0)
    }

    pub fn cache_size(&self) -> usize {
        self.cache_texture.max(0.0).round() as usize
    }
}

/// Finds the config file: explicit path, env var, then assets/viewer.json next to
/// the executable or in the working directory.
pub fn find_config_file(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = explicit {
        return Some(p.to_path_buf());
    }

    if let Ok(v) = std::env::var(CONFIG_ENV) {
        if !v.trim().is_empty() {
            return Some(PathBuf::from(v));
        }
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let p = dir.join("assets").join("viewer.json");
            if p.exists() {
                return Some(p);
            }
        }
    }

    let p = PathBuf::from("assets").join("viewer.json");
    if p.exists() {
        return Some(p);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn parses_angles() {
        assert_eq!(parse_angle("1.5").unwrap(), 1.5);
        assert!((parse_angle("180deg").unwrap() - PI).abs() < 1e-12);
        assert_eq!(parse_angle(" -0.5 rad ").unwrap(), -0.5);
        assert!(parse_angle("north").is_err());
    }

    #[test]
    fn parses_speeds() {
        assert!((parse_speed("2rpm").unwrap() - 2.0 * TAU / 60.0).abs() < 1e-12);
        assert!((parse_speed("60dpm").unwrap() - 1f64.to_radians()).abs() < 1e-12);
        assert!((parse_speed("1 revolutions per second").unwrap() - TAU).abs() < 1e-12);
        assert!(parse_speed("3 furlongs").is_err());
    }

    #[test]
    fn defaults_from_empty_json() {
        let c = ViewerConfig::from_json_str("{}").unwrap();
        assert_eq!(c.min_fov, 30.0);
        assert_eq!(c.max_fov, 90.0);
        assert_eq!(c.default_zoom_level(), 50);
        assert_eq!(c.time_anim, Some(DEFAULT_TIME_ANIM_MS));
        assert_eq!(c.keyboard.get("ArrowUp"), Some(&KeyAction::RotateLatitudeUp));
        assert!(c.transition.is_some());
    }

    #[test]
    fn reads_mixed_angle_and_flag_values() {
        let c = ViewerConfig::from_json_str(
            r#"{
                "longitude_range": ["315deg", "45deg"],
                "default_long": "90deg",
                "anim_speed": "-1rpm",
                "time_anim": false,
                "transition": false,
                "keyboard": { "w": "rotateLatitudeUp" }
            }"#,
        )
        .unwrap();
        let r = c.ranges();
        assert!((r.longitude.min.unwrap() - 315f64.to_radians()).abs() < 1e-12);
        assert!((c.default_position().longitude - FRAC_PI_2).abs() < 1e-12);
        assert!(c.anim_speed.0 < 0.0);
        assert_eq!(c.time_anim, None);
        assert_eq!(c.transition, None);
        assert_eq!(c.keyboard.len(), 1);
    }

    #[test]
    fn sanitize_repairs_bad_values() {
        let mut c = ViewerConfig {
            min_fov: 100.0,
            max_fov: 40.0,
            default_fov: Some(170.0),
            latitude_range: Some([Angle(1.0), Angle(-1.0)]),
            cache_texture: 2.6,
            mousewheel_factor: 0.0,
            ..ViewerConfig::default()
        };
        let warnings = c.sanitize();
        assert_eq!(warnings.len(), 5);
        assert_eq!((c.min_fov, c.max_fov), (40.0, 100.0));
        assert_eq!(c.default_fov, Some(100.0));
        assert_eq!(c.latitude_range, Some([Angle(-1.0), Angle(1.0)]));
        assert_eq!(c.cache_size(), 3);
        assert_eq!(c.mousewheel_factor, 1.0);
    }

    #[test]
    fn parsed_config_keeps_bad_values_for_sanitize() {
        let mut c = ViewerConfig::from_json_str(r#"{ "min_fov": 100, "max_fov": 40 }"#).unwrap();
        assert_eq!((c.min_fov, c.max_fov), (100.0, 40.0));
        assert_eq!(c.sanitize().len(), 1);
        assert_eq!((c.min_fov, c.max_fov), (40.0, 100.0));
    }

    #[test]
    fn valid_config_has_no_warnings() {
        assert!(ViewerConfig::default().sanitize().is_empty());
    }
}
