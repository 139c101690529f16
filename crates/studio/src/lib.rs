//! Application core: the scene store, its edit history and the render
//! orchestrator, wired together.
//!
//! Scene changes are observed through the store's `Updated` notification.
//! With auto-preview on, the next edit or [`Studio::poll`] after a change
//! starts a fresh render of the current scene.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use lightsim_author::{EditError, Editor, ObjectEdit, SettingsEdit};
use lightsim_common::SceneObject;
use lightsim_render::{
    Clock, Orchestrator, OrchestratorConfig, RenderError, RenderEvent, RenderState, SessionId,
    WorkerFactory,
};
use lightsim_scene::{SceneEvent, SceneStore};

#[derive(Debug, Clone, Default)]
pub struct StudioConfig {
    /// Re-render whenever the scene changes.
    pub auto_preview: bool,
    pub orchestrator: OrchestratorConfig,
}

pub struct Studio {
    store: SceneStore,
    editor: Editor,
    orchestrator: Orchestrator,
    auto_preview: bool,
    scene_changed: Arc<AtomicBool>,
}

impl Studio {
    pub fn new(
        mut store: SceneStore,
        factory: impl WorkerFactory + 'static,
        config: StudioConfig,
    ) -> Self {
        let scene_changed = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&scene_changed);
        store.subscribe(SceneEvent::Updated, move |_| {
            flag.store(true, Ordering::Release);
        });
        Self {
            store,
            editor: Editor::new(),
            orchestrator: Orchestrator::new(factory).with_config(config.orchestrator),
            auto_preview: config.auto_preview,
            scene_changed,
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.orchestrator = self.orchestrator.with_clock(clock);
        self
    }

    /// Spawn the worker. Call once after construction.
    pub fn start(&mut self) {
        self.orchestrator.load();
    }

    pub fn store(&self) -> &SceneStore {
        &self.store
    }

    /// Direct store access. Changes made here are picked up by the next `poll`.
    /// They are not recorded for undo; a later undo that no longer matches the
    /// scene discards the edit history instead.
    pub fn store_mut(&mut self) -> &mut SceneStore {
        &mut self.store
    }

    pub fn editor(&self) -> &Editor {
        &self.editor
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn render_state(&self) -> &RenderState {
        self.orchestrator.state()
    }

    pub fn auto_preview(&self) -> bool {
        self.auto_preview
    }

    pub fn set_auto_preview(&mut self, enabled: bool) {
        self.auto_preview = enabled;
    }

    pub fn on_render_event<F>(&mut self, callback: F)
    where
        F: FnMut(&RenderEvent) + Send + 'static,
    {
        self.orchestrator.subscribe(callback);
    }

    /// Render the current scene and settings.
    pub fn render(&mut self) -> Result<SessionId, RenderError> {
        self.orchestrator
            .render(self.store.settings(), self.store.all())
    }

    /// Cancel whatever is running and reload the worker.
    pub fn skip(&mut self) {
        self.orchestrator.load();
    }

    pub fn poll(&mut self) -> usize {
        let handled = self.orchestrator.poll();
        self.preview_if_changed();
        handled
    }

    pub fn wait(&mut self, timeout: Duration) -> usize {
        let handled = self.orchestrator.wait(timeout);
        self.preview_if_changed();
        handled
    }

    pub fn add_object(&mut self, object: SceneObject) -> usize {
        let index = self.editor.add(&mut self.store, object);
        self.preview_if_changed();
        index
    }

    pub fn delete_object(&mut self, index: usize) -> Result<SceneObject, EditError> {
        let removed = self.editor.delete(&mut self.store, index);
        self.preview_if_changed();
        removed
    }

    pub fn edit_object(&mut self, index: usize, edit: ObjectEdit) -> Result<(), EditError> {
        let result = self.editor.edit_object(&mut self.store, index, edit);
        self.preview_if_changed();
        result
    }

    pub fn edit_settings(&mut self, edit: SettingsEdit) {
        self.editor.edit_settings(&mut self.store, edit);
        self.preview_if_changed();
    }

    pub fn clear(&mut self) {
        self.editor.clear(&mut self.store);
        self.preview_if_changed();
    }

    /// Restore the default scene. Edit history is dropped.
    pub fn reset(&mut self) {
        self.editor.reset(&mut self.store);
        self.preview_if_changed();
    }

    pub fn undo(&mut self) -> bool {
        let undone = self.editor.undo(&mut self.store);
        self.preview_if_changed();
        undone
    }

    pub fn redo(&mut self) -> bool {
        let redone = self.editor.redo(&mut self.store);
        self.preview_if_changed();
        redone
    }

    fn preview_if_changed(&mut self) {
        if !self.scene_changed.swap(false, Ordering::AcqRel) || !self.auto_preview {
            return;
        }
        match self.render() {
            Ok(session) => tracing::debug!(%session, "preview started"),
            Err(err) => tracing::debug!(%err, "preview skipped"),
        }
    }
}

impl std::fmt::Debug for Studio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Studio")
            .field("store", &self.store)
            .field("orchestrator", &self.orchestrator)
            .field("auto_preview", &self.auto_preview)
            .finish()
    }
}
