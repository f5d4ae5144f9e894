use std::fs;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::config::DbConfig;
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::{mpsc, watch};

use crate::config::StorageOptions;
use crate::error::NoteError;
use crate::model::{now_millis, timestamp_from_millis, Note, NoteId};

pub mod memory;
mod schema;

pub use memory::MemoryNoteStore;

const FEED_BUFFER: usize = 8;

/// Live channel of store results. Dropping the receiver ends the producer.
pub type Subscription<T> = mpsc::Receiver<Result<T, NoteError>>;

/// Soft-deleted notes never appear in either observation.
#[async_trait]
pub trait NoteStore: Send + Sync {
    /// Active notes ordered by most recent update. An empty `filter` means
    /// every active note, otherwise a case-insensitive substring match on
    /// title or content.
    fn observe_active(&self, filter: &str) -> Result<Subscription<Vec<Note>>, NoteError>;

    /// Single-shot lookup; `NotFound` when the id is unknown or deleted.
    fn observe_one(&self, id: &NoteId) -> Result<Subscription<Note>, NoteError>;

    async fn create(&self, title: &str, content: &str) -> Result<NoteId, NoteError>;

    /// Full replacement of title and content. `NotFound` for unknown or
    /// soft-deleted ids.
    async fn update(&self, id: &NoteId, title: &str, content: &str) -> Result<(), NoteError>;

    /// Sets the deletion marker. Deleting an already deleted note succeeds.
    async fn soft_delete(&self, id: &NoteId) -> Result<(), NoteError>;

    async fn undo_delete(&self, id: &NoteId) -> Result<(), NoteError>;
}

// re-runs `fetch` after every revision bump until the receiver goes away
pub(crate) fn spawn_live<T, F, Fut>(mut changes: watch::Receiver<u64>, mut fetch: F) -> Subscription<T>
where
    T: Send + 'static,
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, NoteError>> + Send,
{
    let (tx, rx) = mpsc::channel(FEED_BUFFER);
    tokio::spawn(async move {
        loop {
            let revision = *changes.borrow_and_update();
            let result = fetch().await;
            if let Err(err) = &result {
                tracing::warn!(revision, %err, "live note query failed");
            }
            if tx.send(result).await.is_err() {
                break;
            }
            tokio::select! {
                changed = changes.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                () = tx.closed() => break,
            }
        }
    });
    rx
}

pub(crate) fn spawn_once<T, Fut>(fetch: Fut) -> Subscription<T>
where
    T: Send + 'static,
    Fut: Future<Output = Result<T, NoteError>> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(1);
    tokio::spawn(async move {
        let _ = tx.send(fetch.await).await;
    });
    rx
}

#[derive(Clone)]
pub struct SqliteNoteStore {
    db_path: Arc<PathBuf>,
    options: Arc<StorageOptions>,
    revision: Arc<watch::Sender<u64>>,
}

impl SqliteNoteStore {
    pub fn connect(&self) -> Result<Connection, NoteError> {
        let conn = Connection::open(&*self.db_path)?;
        prepare_connection(&conn, &self.options)?;
        Ok(conn)
    }

    pub fn with_connection<F, T>(&self, f: F) -> Result<T, NoteError>
    where
        F: FnOnce(&Connection) -> Result<T, NoteError>,
    {
        let conn = self.connect()?;
        f(&conn)
    }

    async fn blocking<F, T>(&self, f: F) -> Result<T, NoteError>
    where
        F: FnOnce(&Connection) -> Result<T, NoteError> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.with_connection(f)).await?
    }

    fn notify(&self) {
        self.revision.send_modify(|revision| *revision = revision.wrapping_add(1));
    }
}

#[async_trait]
impl NoteStore for SqliteNoteStore {
    fn observe_active(&self, filter: &str) -> Result<Subscription<Vec<Note>>, NoteError> {
        let store = self.clone();
        let filter = filter.trim().to_string();
        Ok(spawn_live(self.revision.subscribe(), move || {
            let store = store.clone();
            let filter = filter.clone();
            async move { store.blocking(move |conn| fetch_active(conn, &filter)).await }
        }))
    }

    fn observe_one(&self, id: &NoteId) -> Result<Subscription<Note>, NoteError> {
        let store = self.clone();
        let id = id.clone();
        Ok(spawn_once(async move {
            store.blocking(move |conn| fetch_one(conn, &id)).await
        }))
    }

    async fn create(&self, title: &str, content: &str) -> Result<NoteId, NoteError> {
        let id = NoteId::generate();
        let row_id = id.clone();
        let title = title.to_string();
        let content = content.to_string();
        self.blocking(move |conn| {
            let now = now_millis();
            conn.execute(
                "INSERT INTO notes (id, title, content, created_at, updated_at, deleted_at)
                 VALUES (?1, ?2, ?3, ?4, ?4, NULL)",
                params![row_id.as_str(), title, content, now],
            )?;
            Ok(())
        })
        .await?;
        self.notify();
        Ok(id)
    }

    async fn update(&self, id: &NoteId, title: &str, content: &str) -> Result<(), NoteError> {
        let id = id.clone();
        let title = title.to_string();
        let content = content.to_string();
        self.blocking(move |conn| {
            let updated = conn.execute(
                "UPDATE notes SET title = ?1, content = ?2, updated_at = ?3
                 WHERE id = ?4 AND deleted_at IS NULL",
                params![title, content, now_millis(), id.as_str()],
            )?;
            if updated == 0 {
                return Err(NoteError::NotFound(id.to_string()));
            }
            Ok(())
        })
        .await?;
        self.notify();
        Ok(())
    }

    async fn soft_delete(&self, id: &NoteId) -> Result<(), NoteError> {
        let id = id.clone();
        let changed = self
            .blocking(move |conn| {
                let updated = conn.execute(
                    "UPDATE notes SET deleted_at = ?1 WHERE id = ?2 AND deleted_at IS NULL",
                    params![now_millis(), id.as_str()],
                )?;
                if updated > 0 {
                    return Ok(true);
                }
                if note_exists(conn, &id)? {
                    Ok(false)
                } else {
                    Err(NoteError::NotFound(id.to_string()))
                }
            })
            .await?;
        if changed {
            self.notify();
        }
        Ok(())
    }

    async fn undo_delete(&self, id: &NoteId) -> Result<(), NoteError> {
        let id = id.clone();
        self.blocking(move |conn| {
            let updated = conn.execute(
                "UPDATE notes SET deleted_at = NULL WHERE id = ?1",
                params![id.as_str()],
            )?;
            if updated == 0 {
                return Err(NoteError::NotFound(id.to_string()));
            }
            Ok(())
        })
        .await?;
        self.notify();
        Ok(())
    }
}

fn fetch_active(conn: &Connection, filter: &str) -> Result<Vec<Note>, NoteError> {
    let notes = if filter.is_empty() {
        let mut stmt = conn.prepare(
            "SELECT id, title, content, created_at, updated_at
             FROM notes
             WHERE deleted_at IS NULL
             ORDER BY updated_at DESC, rowid DESC",
        )?;
        let rows = stmt.query_map([], note_from_row)?;
        rows.collect::<Result<Vec<_>, _>>()?
    } else {
        let pattern = format!("%{}%", escape_like(filter));
        let mut stmt = conn.prepare(
            "SELECT id, title, content, created_at, updated_at
             FROM notes
             WHERE deleted_at IS NULL
               AND (title LIKE ?1 ESCAPE '\\' OR content LIKE ?1 ESCAPE '\\')
             ORDER BY updated_at DESC, rowid DESC",
        )?;
        let rows = stmt.query_map(params![pattern], note_from_row)?;
        rows.collect::<Result<Vec<_>, _>>()?
    };
    Ok(notes)
}

fn fetch_one(conn: &Connection, id: &NoteId) -> Result<Note, NoteError> {
    conn.query_row(
        "SELECT id, title, content, created_at, updated_at
         FROM notes
         WHERE id = ?1 AND deleted_at IS NULL",
        params![id.as_str()],
        note_from_row,
    )
    .optional()?
    .ok_or_else(|| NoteError::NotFound(id.to_string()))
}

fn note_exists(conn: &Connection, id: &NoteId) -> Result<bool, NoteError> {
    let found = conn
        .query_row(
            "SELECT 1 FROM notes WHERE id = ?1",
            params![id.as_str()],
            |_row| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

fn note_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Note> {
    Ok(Note {
        id: NoteId::new(row.get::<_, String>(0)?),
        title: row.get(1)?,
        content: row.get(2)?,
        created_at: timestamp_from_millis(row.get(3)?),
        updated_at: timestamp_from_millis(row.get(4)?),
    })
}

fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

pub fn init(options: &StorageOptions) -> Result<SqliteNoteStore> {
    let db_path = &options.database_path;
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating data directory {}", parent.display()))?;
    }
    let conn = Connection::open(db_path)
        .with_context(|| format!("opening database {}", db_path.display()))?;
    prepare_connection(&conn, options).context("configuring database connection")?;
    schema::apply(&conn)?;
    tracing::debug!(path = %db_path.display(), "note store ready");
    let (revision, _) = watch::channel(0);
    Ok(SqliteNoteStore {
        db_path: Arc::new(db_path.clone()),
        options: Arc::new(options.clone()),
        revision: Arc::new(revision),
    })
}

fn prepare_connection(conn: &Connection, options: &StorageOptions) -> rusqlite::Result<()> {
    conn.set_db_config(DbConfig::SQLITE_DBCONFIG_ENABLE_FKEY, true)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(
        None,
        "wal_autocheckpoint",
        options.wal_autocheckpoint.to_string(),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::time::timeout;

    fn init_store() -> anyhow::Result<(TempDir, SqliteNoteStore)> {
        let temp = TempDir::new()?;
        let mut options = StorageOptions::default();
        options.database_path = temp.path().join("data").join("notes.db");
        let store = init(&options)?;
        Ok((temp, store))
    }

    async fn next_list(feed: &mut Subscription<Vec<Note>>) -> Vec<Note> {
        timeout(Duration::from_secs(5), feed.recv())
            .await
            .expect("live feed emits")
            .expect("live feed open")
            .expect("query succeeds")
    }

    fn titles(notes: &[Note]) -> Vec<&str> {
        notes.iter().map(|note| note.title.as_str()).collect()
    }

    #[tokio::test]
    async fn live_observation_follows_mutations() -> anyhow::Result<()> {
        let (_temp, store) = init_store()?;
        let mut feed = store.observe_active("")?;
        assert!(next_list(&mut feed).await.is_empty());

        let id = store.create("Groceries", "milk and eggs").await?;
        assert_eq!(titles(&next_list(&mut feed).await), ["Groceries"]);

        store.update(&id, "Groceries", "milk, eggs, bread").await?;
        let notes = next_list(&mut feed).await;
        assert_eq!(notes[0].content, "milk, eggs, bread");

        store.soft_delete(&id).await?;
        assert!(next_list(&mut feed).await.is_empty());

        store.undo_delete(&id).await?;
        assert_eq!(next_list(&mut feed).await.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn filter_matches_title_or_content_and_escapes_wildcards() -> anyhow::Result<()> {
        let (_temp, store) = init_store()?;
        store.create("Nimbus plan", "rollout").await?;
        store.create("Weekly", "discuss NIMBUS launch").await?;
        store.create("Discount", "100% off").await?;
        store.create("Other", "nothing here").await?;

        let mut feed = store.observe_active("nimbus")?;
        let mut hits = titles(&next_list(&mut feed).await)
            .into_iter()
            .map(str::to_string)
            .collect::<Vec<_>>();
        hits.sort();
        assert_eq!(hits, ["Nimbus plan", "Weekly"]);

        let mut percent = store.observe_active("%")?;
        assert_eq!(titles(&next_list(&mut percent).await), ["Discount"]);
        Ok(())
    }

    #[tokio::test]
    async fn update_and_lookup_reject_deleted_notes() -> anyhow::Result<()> {
        let (_temp, store) = init_store()?;
        let id = store.create("Draft", "text").await?;
        store.soft_delete(&id).await?;
        store.soft_delete(&id).await?;

        assert_matches!(
            store.update(&id, "Draft", "more").await,
            Err(NoteError::NotFound(_))
        );
        let mut lookup = store.observe_one(&id)?;
        assert_matches!(lookup.recv().await, Some(Err(NoteError::NotFound(_))));

        let unknown = NoteId::new("missing");
        assert_matches!(store.soft_delete(&unknown).await, Err(NoteError::NotFound(_)));
        assert_matches!(store.undo_delete(&unknown).await, Err(NoteError::NotFound(_)));
        Ok(())
    }

    #[tokio::test]
    async fn observe_one_returns_current_note() -> anyhow::Result<()> {
        let (_temp, store) = init_store()?;
        let id = store.create("Title", "Content").await?;
        let mut lookup = store.observe_one(&id)?;
        let note = lookup.recv().await.expect("single emission")?;
        assert_eq!(note.id, id);
        assert_eq!(note.title, "Title");
        assert_eq!(note.content, "Content");
        assert!(lookup.recv().await.is_none());
        Ok(())
    }

    #[test]
    fn like_escaping_covers_wildcards() {
        assert_eq!(escape_like(r"50%_a\b"), r"50\%\_a\\b");
    }
}
