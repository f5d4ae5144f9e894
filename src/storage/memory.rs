use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use time::OffsetDateTime;
use tokio::sync::watch;

use super::{spawn_live, spawn_once, NoteStore, Subscription};
use crate::error::NoteError;
use crate::model::{Note, NoteId};

#[derive(Clone)]
pub struct MemoryNoteStore {
    shared: Arc<Shared>,
}

struct Shared {
    rows: Mutex<Vec<Row>>,
    revision: watch::Sender<u64>,
}

struct Row {
    note: Note,
    deleted: bool,
}

impl Default for MemoryNoteStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryNoteStore {
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            shared: Arc::new(Shared {
                rows: Mutex::new(Vec::new()),
                revision,
            }),
        }
    }

    pub fn active(&self, filter: &str) -> Vec<Note> {
        self.shared.active(filter)
    }

    fn notify(&self) {
        self.shared
            .revision
            .send_modify(|revision| *revision = revision.wrapping_add(1));
    }
}

impl Shared {
    fn active(&self, filter: &str) -> Vec<Note> {
        let needle = filter.trim().to_lowercase();
        let rows = self.rows.lock();
        // newest insertion first so equal timestamps keep recency order
        let mut notes = rows
            .iter()
            .rev()
            .filter(|row| !row.deleted)
            .filter(|row| {
                needle.is_empty()
                    || row.note.title.to_lowercase().contains(&needle)
                    || row.note.content.to_lowercase().contains(&needle)
            })
            .map(|row| row.note.clone())
            .collect::<Vec<_>>();
        notes.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        notes
    }

    fn find(&self, id: &NoteId) -> Result<Note, NoteError> {
        self.rows
            .lock()
            .iter()
            .find(|row| &row.note.id == id && !row.deleted)
            .map(|row| row.note.clone())
            .ok_or_else(|| NoteError::NotFound(id.to_string()))
    }
}

#[async_trait]
impl NoteStore for MemoryNoteStore {
    fn observe_active(&self, filter: &str) -> Result<Subscription<Vec<Note>>, NoteError> {
        let shared = self.shared.clone();
        let filter = filter.to_string();
        Ok(spawn_live(self.shared.revision.subscribe(), move || {
            std::future::ready(Ok(shared.active(&filter)))
        }))
    }

    fn observe_one(&self, id: &NoteId) -> Result<Subscription<Note>, NoteError> {
        Ok(spawn_once(std::future::ready(self.shared.find(id))))
    }

    async fn create(&self, title: &str, content: &str) -> Result<NoteId, NoteError> {
        let now = OffsetDateTime::now_utc();
        let id = NoteId::generate();
        self.shared.rows.lock().push(Row {
            note: Note {
                id: id.clone(),
                title: title.to_string(),
                content: content.to_string(),
                created_at: now,
                updated_at: now,
            },
            deleted: false,
        });
        self.notify();
        Ok(id)
    }

    async fn update(&self, id: &NoteId, title: &str, content: &str) -> Result<(), NoteError> {
        {
            let mut rows = self.shared.rows.lock();
            let row = rows
                .iter_mut()
                .find(|row| &row.note.id == id && !row.deleted)
                .ok_or_else(|| NoteError::NotFound(id.to_string()))?;
            row.note = Note {
                title: title.to_string(),
                content: content.to_string(),
                updated_at: OffsetDateTime::now_utc(),
                ..row.note.clone()
            };
        }
        self.notify();
        Ok(())
    }

    async fn soft_delete(&self, id: &NoteId) -> Result<(), NoteError> {
        let changed = {
            let mut rows = self.shared.rows.lock();
            let row = rows
                .iter_mut()
                .find(|row| &row.note.id == id)
                .ok_or_else(|| NoteError::NotFound(id.to_string()))?;
            !std::mem::replace(&mut row.deleted, true)
        };
        if changed {
            self.notify();
        }
        Ok(())
    }

    async fn undo_delete(&self, id: &NoteId) -> Result<(), NoteError> {
        {
            let mut rows = self.shared.rows.lock();
            let row = rows
                .iter_mut()
                .find(|row| &row.note.id == id)
                .ok_or_else(|| NoteError::NotFound(id.to_string()))?;
            row.deleted = false;
        }
        self.notify();
        Ok(())
    }
}
