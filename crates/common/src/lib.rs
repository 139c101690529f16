//! Shared types: scene objects, render settings, statistics and pixel buffers.
//!
//! # Invariants
//! - Color components are always within [0, 255] (enforced by `u8`).
//! - A `PixelBuffer` always holds exactly `width * height * 4` bytes.

pub mod image;
pub mod types;

pub use image::{PixelBuffer, SizeMismatch};
pub use types::{
    default_object, round2, Color, InvalidObject, InvalidSettings, Position, RenderSettings,
    RenderStats, SceneObject,
};
