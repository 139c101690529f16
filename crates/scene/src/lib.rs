//! Scene Store: the authoritative list of scene objects and the render settings.
//!
//! # Invariants
//! - Every mutation persists the whole scene record and emits `Updated`.
//! - Object identity is the index; deleting shifts later indices down.
//! - A missing or corrupt saved record yields the default scene.

pub mod store;

pub use store::{default_scene, LoadOrigin, SceneEvent, SceneStore};
