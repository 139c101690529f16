use lightsim_common::{RenderSettings, SceneObject};
use serde::{Deserialize, Serialize};

use crate::store::{KeyValueStore, PersistError};

/// Key the scene record is stored under.
pub const SAVED_SCENE_KEY: &str = "savedScene";

/// The persisted unit: every scene object plus the render settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneSnapshot {
    pub scene: Vec<SceneObject>,
    pub settings: RenderSettings,
}

impl SceneSnapshot {
    pub fn new(scene: Vec<SceneObject>, settings: RenderSettings) -> Self {
        Self { scene, settings }
    }

    pub fn encode(&self) -> Result<String, PersistError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a stored record. Any parse failure is `Corrupt`.
    pub fn decode(text: &str) -> Result<Self, PersistError> {
        serde_json::from_str(text).map_err(|e| PersistError::Corrupt(e.to_string()))
    }

    /// Read the saved record. `Ok(None)` when nothing has been saved.
    pub fn load(store: &dyn KeyValueStore) -> Result<Option<Self>, PersistError> {
        match store.get(SAVED_SCENE_KEY)? {
            Some(text) => Self::decode(&text).map(Some),
            None => Ok(None),
        }
    }

    /// Write this record, replacing any previous one.
    pub fn save(&self, store: &dyn KeyValueStore) -> Result<(), PersistError> {
        store.set(SAVED_SCENE_KEY, &self.encode()?)
    }

    /// Delete the saved record.
    pub fn erase(store: &dyn KeyValueStore) -> Result<(), PersistError> {
        store.remove(SAVED_SCENE_KEY)
    }
}
