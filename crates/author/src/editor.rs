use lightsim_common::{RenderSettings, SceneObject};
use lightsim_scene::SceneStore;

use crate::field::{EditError, ObjectEdit, SettingsEdit};

/// An editing command that can be applied to the scene and reversed.
///
/// Each command carries enough context to undo itself. Indices refer to the
/// scene as it was when the command was applied.
#[derive(Debug, Clone, PartialEq)]
pub enum EditCommand {
    /// Insert an object at an index. Undo = delete it.
    Insert { index: usize, object: SceneObject },
    /// Delete the object at an index. Undo = re-insert it there.
    Delete { index: usize, object: SceneObject },
    /// Replace one object. Undo = restore the old value.
    Modify {
        index: usize,
        old: SceneObject,
        new: SceneObject,
    },
    /// Replace the settings. Undo = restore the old settings.
    Settings {
        old: RenderSettings,
        new: RenderSettings,
    },
    /// Remove every object. Undo = restore them.
    Clear { objects: Vec<SceneObject> },
    /// Append a list of objects to an empty scene. Undo = clear.
    Restore { objects: Vec<SceneObject> },
}

impl EditCommand {
    /// Produce the inverse command (for undo).
    pub fn inverse(&self) -> Self {
        match self {
            Self::Insert { index, object } => Self::Delete {
                index: *index,
                object: *object,
            },
            Self::Delete { index, object } => Self::Insert {
                index: *index,
                object: *object,
            },
            Self::Modify { index, old, new } => Self::Modify {
                index: *index,
                old: *new,
                new: *old,
            },
            Self::Settings { old, new } => Self::Settings {
                old: *new,
                new: *old,
            },
            Self::Clear { objects } => Self::Restore {
                objects: objects.clone(),
            },
            Self::Restore { objects } => Self::Clear {
                objects: objects.clone(),
            },
        }
    }
}

/// Editor with undo/redo support over a [`SceneStore`].
///
/// Every edit goes through the store, so persistence and notifications
/// happen exactly as for direct store mutations.
#[derive(Debug, Default)]
pub struct Editor {
    undo_stack: Vec<EditCommand>,
    redo_stack: Vec<EditCommand>,
}

impl Editor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an object and push to undo stack. Returns its index.
    pub fn add(&mut self, store: &mut SceneStore, object: SceneObject) -> usize {
        let index = store.add(object);
        self.record(EditCommand::Insert { index, object });
        index
    }

    /// Delete an object and push to undo stack.
    pub fn delete(
        &mut self,
        store: &mut SceneStore,
        index: usize,
    ) -> Result<SceneObject, EditError> {
        let object = store.delete(index).ok_or(EditError::ObjectNotFound(index))?;
        self.record(EditCommand::Delete { index, object });
        Ok(object)
    }

    /// Apply a field edit to one object and push to undo stack.
    pub fn edit_object(
        &mut self,
        store: &mut SceneStore,
        index: usize,
        edit: ObjectEdit,
    ) -> Result<(), EditError> {
        let old = *store.get(index).ok_or(EditError::ObjectNotFound(index))?;
        let mut new = old;
        edit.apply(&mut new);
        store.replace(index, new);
        self.record(EditCommand::Modify { index, old, new });
        Ok(())
    }

    /// Apply a settings edit and push to undo stack.
    pub fn edit_settings(&mut self, store: &mut SceneStore, edit: SettingsEdit) {
        let old = *store.settings();
        let mut new = old;
        edit.apply(&mut new);
        store.set_settings(new);
        self.record(EditCommand::Settings { old, new });
    }

    /// Remove every object and push to undo stack.
    pub fn clear(&mut self, store: &mut SceneStore) {
        let objects = store.all().to_vec();
        store.clear();
        self.record(EditCommand::Clear { objects });
    }

    /// Reset the store to defaults. History is discarded.
    pub fn reset(&mut self, store: &mut SceneStore) {
        store.reset();
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    /// Undo the last edit. Returns true if an operation was undone.
    pub fn undo(&mut self, store: &mut SceneStore) -> bool {
        let Some(cmd) = self.undo_stack.pop() else {
            return false;
        };
        if !apply_command(store, &cmd.inverse()) {
            self.discard_stale_history(&cmd);
            return false;
        }
        self.redo_stack.push(cmd);
        true
    }

    /// Redo the last undone edit. Returns true if an operation was redone.
    pub fn redo(&mut self, store: &mut SceneStore) -> bool {
        let Some(cmd) = self.redo_stack.pop() else {
            return false;
        };
        if !apply_command(store, &cmd) {
            self.discard_stale_history(&cmd);
            return false;
        }
        self.undo_stack.push(cmd);
        true
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    fn discard_stale_history(&mut self, cmd: &EditCommand) {
        tracing::warn!(?cmd, "scene changed outside the editor, edit history discarded");
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    fn record(&mut self, cmd: EditCommand) {
        tracing::trace!(?cmd, "edit recorded");
        self.undo_stack.push(cmd);
        self.redo_stack.clear();
    }
}

/// Apply `cmd` if the store still looks the way the command expects.
///
/// Returns false, leaving the store untouched, when the scene was changed
/// behind the editor's back and the recorded indices no longer line up.
fn apply_command(store: &mut SceneStore, cmd: &EditCommand) -> bool {
    match cmd {
        EditCommand::Insert { index, object } => {
            if *index > store.len() {
                return false;
            }
            store.insert(*index, *object);
        }
        EditCommand::Delete { index, object } => {
            if store.get(*index) != Some(object) {
                return false;
            }
            store.delete(*index);
        }
        EditCommand::Modify { index, old, new } => {
            if store.get(*index) != Some(old) {
                return false;
            }
            store.replace(*index, *new);
        }
        EditCommand::Settings { old, new } => {
            if store.settings() != old {
                return false;
            }
            store.set_settings(*new);
        }
        EditCommand::Clear { objects } => {
            if store.all() != objects.as_slice() {
                return false;
            }
            store.clear();
        }
        EditCommand::Restore { objects } => {
            if !store.is_empty() {
                return false;
            }
            store.extend(objects.iter().copied());
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{ObjectField, SettingsField};
    use lightsim_common::{default_object, Color};
    use lightsim_scene::SceneEvent;

    fn at(x: f64) -> SceneObject {
        SceneObject {
            x,
            ..SceneObject::default()
        }
    }

    #[test]
    fn add_and_undo() {
        let mut store = SceneStore::in_memory();
        let mut editor = Editor::new();

        let idx = editor.add(&mut store, at(3.0));
        assert_eq!(idx, 1);
        assert_eq!(store.len(), 2);

        assert!(editor.undo(&mut store));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(0), Some(&default_object()));
    }

    #[test]
    fn add_undo_redo() {
        let mut store = SceneStore::in_memory();
        let mut editor = Editor::new();

        editor.add(&mut store, at(3.0));
        editor.undo(&mut store);
        editor.redo(&mut store);
        assert_eq!(store.get(1).map(|o| o.x), Some(3.0));
    }

    #[test]
    fn delete_and_undo_restores_position() {
        let mut store = SceneStore::in_memory();
        let mut editor = Editor::new();
        editor.add(&mut store, at(1.0));
        editor.add(&mut store, at(2.0));

        let removed = editor.delete(&mut store, 1).unwrap();
        assert_eq!(removed.x, 1.0);
        assert_eq!(store.get(1).map(|o| o.x), Some(2.0));

        editor.undo(&mut store);
        assert_eq!(store.get(1).map(|o| o.x), Some(1.0));
        assert_eq!(store.get(2).map(|o| o.x), Some(2.0));
    }

    #[test]
    fn delete_missing_returns_error() {
        let mut store = SceneStore::in_memory();
        let mut editor = Editor::new();
        assert_eq!(
            editor.delete(&mut store, 7),
            Err(EditError::ObjectNotFound(7))
        );
        assert!(!editor.can_undo());
    }

    #[test]
    fn edit_object_field_and_undo() {
        let mut store = SceneStore::in_memory();
        let mut editor = Editor::new();

        let edit = ObjectEdit::parse(ObjectField::Color, "#00ff00").unwrap();
        editor.edit_object(&mut store, 0, edit).unwrap();
        assert_eq!(store.get(0).map(|o| o.color), Some(Color::new(0, 255, 0)));

        editor.undo(&mut store);
        assert_eq!(store.get(0).map(|o| o.color), Some(Color::WHITE));
    }

    #[test]
    fn edit_missing_object_is_error() {
        let mut store = SceneStore::in_memory();
        let mut editor = Editor::new();
        assert!(editor
            .edit_object(&mut store, 4, ObjectEdit::X(1.0))
            .is_err());
    }

    #[test]
    fn edit_settings_and_undo() {
        let mut store = SceneStore::in_memory();
        let mut editor = Editor::new();

        let edit = SettingsEdit::parse(SettingsField::SamplesPerPixel, "3").unwrap();
        editor.edit_settings(&mut store, edit);
        assert_eq!(store.settings().samples_per_pixel, 3);

        editor.undo(&mut store);
        assert_eq!(store.settings(), &RenderSettings::default());
    }

    #[test]
    fn clear_and_undo() {
        let mut store = SceneStore::in_memory();
        let mut editor = Editor::new();
        editor.add(&mut store, at(5.0));
        let before = store.all().to_vec();

        editor.clear(&mut store);
        assert!(store.is_empty());

        editor.undo(&mut store);
        assert_eq!(store.all(), before.as_slice());

        editor.redo(&mut store);
        assert!(store.is_empty());
    }

    #[test]
    fn redo_cleared_on_new_edit() {
        let mut store = SceneStore::in_memory();
        let mut editor = Editor::new();

        editor.add(&mut store, at(1.0));
        editor.undo(&mut store);
        assert!(editor.can_redo());

        editor.add(&mut store, at(2.0));
        assert!(!editor.can_redo());
    }

    #[test]
    fn reset_discards_history() {
        let mut store = SceneStore::in_memory();
        let mut editor = Editor::new();
        editor.add(&mut store, at(1.0));
        editor.reset(&mut store);
        assert!(!editor.can_undo());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn undo_after_direct_store_edit_discards_history() {
        let mut store = SceneStore::in_memory();
        let mut editor = Editor::new();
        editor.add(&mut store, at(3.0));
        store.delete(0);

        assert!(!editor.undo(&mut store));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(0).map(|o| o.x), Some(3.0));
        assert!(!editor.can_undo());
        assert!(!editor.can_redo());
        assert!(!editor.redo(&mut store));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn redo_refuses_stale_modify() {
        let mut store = SceneStore::in_memory();
        let mut editor = Editor::new();
        editor.edit_object(&mut store, 0, ObjectEdit::X(2.0)).unwrap();
        editor.undo(&mut store);
        store.update(0, |o| o.x = 9.0);

        assert!(!editor.redo(&mut store));
        assert_eq!(store.get(0).map(|o| o.x), Some(9.0));
    }

    #[test]
    fn undo_clear_restores_with_one_notification() {
        let mut store = SceneStore::in_memory();
        let mut editor = Editor::new();
        editor.add(&mut store, at(1.0));
        editor.add(&mut store, at(2.0));
        editor.clear(&mut store);

        let updates = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = std::sync::Arc::clone(&updates);
        store.subscribe(SceneEvent::Updated, move |_| {
            counter.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        });

        assert!(editor.undo(&mut store));
        assert_eq!(store.len(), 3);
        assert_eq!(updates.load(std::sync::atomic::Ordering::Relaxed), 1);
    }

    #[test]
    fn undo_redo_empty_return_false() {
        let mut store = SceneStore::in_memory();
        let mut editor = Editor::new();
        assert!(!editor.undo(&mut store));
        assert!(!editor.redo(&mut store));
    }
}
