use glam::DVec3;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// An sRGB color with 8-bit components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Self = Self::new(0, 0, 0);
    pub const WHITE: Self = Self::new(255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Build a color from wide integers, clamping each component to [0, 255].
    pub fn clamped(r: i64, g: i64, b: i64) -> Self {
        let c = |v: i64| v.clamp(0, 255) as u8;
        Self::new(c(r), c(g), c(b))
    }

    /// Format as `#rrggbb`.
    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    /// Parse a `#rrggbb` string. Returns `None` when the text is not in that form.
    pub fn from_hex(text: &str) -> Option<Self> {
        let hex = text.trim().strip_prefix('#')?;
        if hex.len() != 6 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        let part = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        Some(Self::new(part(0)?, part(2)?, part(4)?))
    }

    /// Components as linear-ish floats in [0, 1].
    pub fn to_unit(&self) -> DVec3 {
        DVec3::new(self.r as f64, self.g as f64, self.b as f64) / 255.0
    }
}

/// A point in world space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub const ORIGIN: Self = Self::new(0.0, 0.0, 0.0);

    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

impl From<Position> for DVec3 {
    fn from(p: Position) -> Self {
        DVec3::new(p.x, p.y, p.z)
    }
}

impl From<DVec3> for Position {
    fn from(v: DVec3) -> Self {
        Self::new(v.x, v.y, v.z)
    }
}

/// A sphere in the scene. Identity is its index in the scene sequence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SceneObject {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub radius: f64,
    pub color: Color,
    /// Emission strength. Zero means the object does not emit light.
    pub emission: f64,
}

impl Default for SceneObject {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            radius: 1.0,
            color: Color::BLACK,
            emission: 0.0,
        }
    }
}

/// The object the built-in default scene is made of: a white emissive sphere at the origin.
pub fn default_object() -> SceneObject {
    SceneObject {
        color: Color::WHITE,
        emission: 1.0,
        ..SceneObject::default()
    }
}

/// Reasons a scene object cannot be rendered.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InvalidObject {
    #[error("radius must be a positive number, got {0}")]
    Radius(f64),
    #[error("emission must be a non-negative number, got {0}")]
    Emission(f64),
    #[error("position must be finite")]
    Position,
}

impl SceneObject {
    pub fn position(&self) -> Position {
        Position::new(self.x, self.y, self.z)
    }

    pub fn set_position(&mut self, position: Position) {
        self.x = position.x;
        self.y = position.y;
        self.z = position.z;
    }

    pub fn is_emissive(&self) -> bool {
        self.emission > 0.0
    }

    pub fn validate(&self) -> Result<(), InvalidObject> {
        if !(self.x.is_finite() && self.y.is_finite() && self.z.is_finite()) {
            return Err(InvalidObject::Position);
        }
        if !(self.radius.is_finite() && self.radius > 0.0) {
            return Err(InvalidObject::Radius(self.radius));
        }
        if !(self.emission.is_finite() && self.emission >= 0.0) {
            return Err(InvalidObject::Emission(self.emission));
        }
        Ok(())
    }
}

/// Parameters of one render request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderSettings {
    pub width: u32,
    pub height: u32,
    /// Caps the number of bounces a path may take.
    pub max_bounce_count: u32,
    /// Total number of accumulation passes.
    pub samples_per_pixel: u32,
    pub camera_position: Position,
    pub looking_at: Position,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            width: 1920 / 3,
            height: 1080 / 3,
            max_bounce_count: 128,
            samples_per_pixel: 10,
            camera_position: Position::new(20.0, 0.0, -8.0),
            looking_at: Position::ORIGIN,
        }
    }
}

/// Reasons render settings cannot be used.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InvalidSettings {
    #[error("image dimensions must be positive, got {width}x{height}")]
    Dimensions { width: u32, height: u32 },
    #[error("at least one sample per pixel is required")]
    NoSamples,
    #[error("camera position and look-at target must differ")]
    DegenerateCamera,
}

impl RenderSettings {
    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn validate(&self) -> Result<(), InvalidSettings> {
        if self.width == 0 || self.height == 0 {
            return Err(InvalidSettings::Dimensions {
                width: self.width,
                height: self.height,
            });
        }
        if self.samples_per_pixel == 0 {
            return Err(InvalidSettings::NoSamples);
        }
        if self.camera_position == self.looking_at {
            return Err(InvalidSettings::DegenerateCamera);
        }
        Ok(())
    }
}

/// Throughput figures for a finished render, rounded to two decimals.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderStats {
    pub samples_per_second: f64,
    /// Seconds.
    pub total_render_time: f64,
    pub megapixels_per_second: f64,
}

impl RenderStats {
    /// Smallest elapsed time used for rate computation, so rates stay finite.
    const MIN_ELAPSED_SECS: f64 = 1e-6;

    /// Derive stats for `samples` passes over a `width` x `height` image that took `elapsed`.
    pub fn from_timing(samples: u32, elapsed: Duration, width: u32, height: u32) -> Self {
        let secs = elapsed.as_secs_f64().max(Self::MIN_ELAPSED_SECS);
        let samples_per_second = samples as f64 / secs;
        let megapixels_per_second = samples_per_second * width as f64 * height as f64 / 1e6;
        Self {
            samples_per_second: round2(samples_per_second),
            total_render_time: round2(elapsed.as_secs_f64()),
            megapixels_per_second: round2(megapixels_per_second),
        }
    }
}

/// Round to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
