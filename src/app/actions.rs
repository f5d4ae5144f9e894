use std::sync::Arc;

use crate::model::{Note, NoteId};
use crate::outcome::{Feed, Outcome};
use crate::storage::NoteStore;

#[derive(Clone)]
pub struct ObserveNotes {
    store: Arc<dyn NoteStore>,
}

impl ObserveNotes {
    pub fn new(store: Arc<dyn NoteStore>) -> Self {
        Self { store }
    }

    pub fn call(&self, query: &str) -> Feed<Vec<Note>> {
        Feed::new(self.store.observe_active(query.trim()))
    }
}

#[derive(Clone)]
pub struct LoadNote {
    store: Arc<dyn NoteStore>,
}

impl LoadNote {
    pub fn new(store: Arc<dyn NoteStore>) -> Self {
        Self { store }
    }

    pub fn call(&self, id: &NoteId) -> Feed<Note> {
        Feed::new(self.store.observe_one(id))
    }
}

/// Creates or updates a note from an editor snapshot.
///
/// Without an id and with blank content nothing is written and the result is
/// `Success(None)`, so opening and leaving an empty editor never creates a
/// note. An existing note is always updated, even down to empty content.
#[derive(Clone)]
pub struct UpsertNote {
    store: Arc<dyn NoteStore>,
}

impl UpsertNote {
    pub fn new(store: Arc<dyn NoteStore>) -> Self {
        Self { store }
    }

    pub async fn call(
        &self,
        note_id: Option<&NoteId>,
        title: &str,
        content: &str,
    ) -> Outcome<Option<NoteId>> {
        let content = content.trim();
        match note_id {
            None if content.is_empty() => Outcome::Success(None),
            None => self.store.create(title, content).await.map(Some).into(),
            Some(id) => self
                .store
                .update(id, title, content)
                .await
                .map(|()| Some(id.clone()))
                .into(),
        }
    }
}

#[derive(Clone)]
pub struct DeleteNote {
    store: Arc<dyn NoteStore>,
}

impl DeleteNote {
    pub fn new(store: Arc<dyn NoteStore>) -> Self {
        Self { store }
    }

    pub async fn delete(&self, id: &NoteId) -> Outcome<()> {
        self.store.soft_delete(id).await.into()
    }

    pub async fn undo(&self, id: &NoteId) -> Outcome<()> {
        self.store.undo_delete(id).await.into()
    }
}

#[derive(Clone)]
pub struct NoteActions {
    pub observe: ObserveNotes,
    pub load: LoadNote,
    pub upsert: UpsertNote,
    pub delete: DeleteNote,
}

impl NoteActions {
    pub fn new(store: Arc<dyn NoteStore>) -> Self {
        Self {
            observe: ObserveNotes::new(store.clone()),
            load: LoadNote::new(store.clone()),
            upsert: UpsertNote::new(store.clone()),
            delete: DeleteNote::new(store),
        }
    }
}
