//! Persistence: a key-value store port plus the saved-scene record.
//!
//! # Invariants
//! - The scene and its settings are saved as one record under one key.
//! - A record that fails to parse is reported as `Corrupt`, never as a panic.

pub mod snapshot;
pub mod store;

pub use snapshot::{SAVED_SCENE_KEY, SceneSnapshot};
pub use store::{FileStore, KeyValueStore, MemoryStore, PersistError};
