pub mod actions;
pub mod editor;
pub mod list;
pub mod state;

pub use actions::{DeleteNote, LoadNote, NoteActions, ObserveNotes, UpsertNote};
pub use editor::EditorScreen;
pub use list::ListScreen;
pub use state::{reduce, EditorEvent, EditorUiState, ListUiState, NoteSummary};
