use lightsim_common::{default_object, RenderSettings, SceneObject};
use lightsim_events::{EventBus, Notification, SubscriptionId};
use lightsim_persist::{KeyValueStore, MemoryStore, PersistError, SceneSnapshot};

/// Notifications emitted by the [`SceneStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SceneEvent {
    /// Contents or settings changed.
    Updated,
    /// Everything was replaced by the defaults; observers should rebuild from scratch.
    Reset,
}

impl Notification for SceneEvent {
    type Kind = SceneEvent;

    fn kind(&self) -> SceneEvent {
        *self
    }
}

/// Where the store's initial contents came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOrigin {
    /// Read from the saved record.
    Persisted,
    /// Nothing was saved; built-in defaults.
    Default,
    /// The saved record was unreadable; built-in defaults.
    Recovered(String),
}

/// Owns the scene objects and render settings.
///
/// All mutations go through explicit operations, each of which persists the
/// full record and notifies subscribers.
pub struct SceneStore {
    objects: Vec<SceneObject>,
    settings: RenderSettings,
    backend: Box<dyn KeyValueStore>,
    events: EventBus<SceneEvent>,
    origin: LoadOrigin,
}

impl SceneStore {
    /// Load the saved scene from `backend`, falling back to the default scene.
    pub fn open(backend: Box<dyn KeyValueStore>) -> Self {
        let (objects, settings, origin) = match SceneSnapshot::load(backend.as_ref()) {
            Ok(Some(snap)) => (snap.scene, snap.settings, LoadOrigin::Persisted),
            Ok(None) => {
                let (objects, settings) = default_scene();
                (objects, settings, LoadOrigin::Default)
            }
            Err(err) => {
                tracing::warn!(%err, "saved scene unreadable, using default scene");
                let (objects, settings) = default_scene();
                (objects, settings, LoadOrigin::Recovered(err.to_string()))
            }
        };
        tracing::debug!(objects = objects.len(), ?origin, "scene store opened");
        Self {
            objects,
            settings,
            backend,
            events: EventBus::new(),
            origin,
        }
    }

    /// A store backed by a fresh in-memory map.
    pub fn in_memory() -> Self {
        Self::open(Box::new(MemoryStore::new()))
    }

    pub fn origin(&self) -> &LoadOrigin {
        &self.origin
    }

    /// Append an object. Returns its index.
    pub fn add(&mut self, object: SceneObject) -> usize {
        self.objects.push(object);
        self.mark_updated();
        self.objects.len() - 1
    }

    /// Insert an object at `index`, clamped to the current length. Returns the index used.
    pub fn insert(&mut self, index: usize, object: SceneObject) -> usize {
        let index = index.min(self.objects.len());
        self.objects.insert(index, object);
        self.mark_updated();
        index
    }

    pub fn get(&self, index: usize) -> Option<&SceneObject> {
        self.objects.get(index)
    }

    pub fn all(&self) -> &[SceneObject] {
        &self.objects
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Remove the object at `index`, shifting later objects down.
    ///
    /// Out-of-bounds indices are a no-op: nothing is persisted or emitted.
    pub fn delete(&mut self, index: usize) -> Option<SceneObject> {
        if index >= self.objects.len() {
            tracing::debug!(index, len = self.objects.len(), "delete out of bounds ignored");
            return None;
        }
        let removed = self.objects.remove(index);
        self.mark_updated();
        Some(removed)
    }

    /// Replace the object at `index`. Returns the previous value if the index existed.
    pub fn replace(&mut self, index: usize, object: SceneObject) -> Option<SceneObject> {
        let slot = self.objects.get_mut(index)?;
        let old = std::mem::replace(slot, object);
        self.mark_updated();
        Some(old)
    }

    /// Modify one object in place. Returns false if the index does not exist.
    pub fn update<F>(&mut self, index: usize, f: F) -> bool
    where
        F: FnOnce(&mut SceneObject),
    {
        let Some(object) = self.objects.get_mut(index) else {
            return false;
        };
        f(object);
        self.mark_updated();
        true
    }

    /// Append several objects with a single persist and a single `Updated`.
    /// An empty batch changes nothing.
    pub fn extend<I>(&mut self, objects: I)
    where
        I: IntoIterator<Item = SceneObject>,
    {
        let before = self.objects.len();
        self.objects.extend(objects);
        if self.objects.len() != before {
            self.mark_updated();
        }
    }

    /// Remove every object. Settings are kept.
    pub fn clear(&mut self) {
        self.objects.clear();
        self.mark_updated();
    }

    /// Restore the default scene and settings and erase the saved record.
    pub fn reset(&mut self) {
        let (objects, settings) = default_scene();
        self.objects = objects;
        self.settings = settings;
        if let Err(err) = SceneSnapshot::erase(self.backend.as_ref()) {
            tracing::warn!(%err, "failed to erase saved scene");
        }
        tracing::info!("scene reset to defaults");
        self.events.emit(&SceneEvent::Updated);
        self.events.emit(&SceneEvent::Reset);
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    /// Replace the settings wholesale.
    pub fn set_settings(&mut self, settings: RenderSettings) {
        self.settings = settings;
        self.mark_updated();
    }

    /// Owned copy of the current scene and settings.
    pub fn snapshot(&self) -> SceneSnapshot {
        SceneSnapshot::new(self.objects.clone(), self.settings)
    }

    /// Persist the current state, reporting failure to the caller.
    pub fn save(&self) -> Result<(), PersistError> {
        self.snapshot().save(self.backend.as_ref())
    }

    pub fn subscribe<F>(&mut self, event: SceneEvent, callback: F) -> SubscriptionId
    where
        F: FnMut(&SceneEvent) + Send + 'static,
    {
        self.events.subscribe(event, callback)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    pub fn events_mut(&mut self) -> &mut EventBus<SceneEvent> {
        &mut self.events
    }

    /// Persist and emit `Updated`. Save failures are logged; the in-memory change stands.
    fn mark_updated(&mut self) {
        if let Err(err) = self.save() {
            tracing::warn!(%err, "failed to persist scene");
        }
        self.events.emit(&SceneEvent::Updated);
    }
}

impl std::fmt::Debug for SceneStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneStore")
            .field("objects", &self.objects)
            .field("settings", &self.settings)
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

/// Built-in scene: a single emissive sphere at the origin, default settings.
pub fn default_scene() -> (Vec<SceneObject>, RenderSettings) {
    (vec![default_object()], RenderSettings::default())
}
