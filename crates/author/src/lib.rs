//! Scene authoring: typed field edits and an undoable editor over the scene store.
//!
//! # Invariants
//! - Every editable field has its own typed setter; there is no by-name reflection.
//! - All editor operations are reversible, except `reset`, which clears history.

mod editor;
mod field;

pub use editor::{EditCommand, Editor};
pub use field::{EditError, ObjectEdit, ObjectField, SettingsEdit, SettingsField};
