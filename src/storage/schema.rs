use anyhow::{Context, Result};
use rusqlite::Connection;

pub fn apply(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS notes (
            id TEXT PRIMARY KEY NOT NULL,
            title TEXT NOT NULL DEFAULT '',
            content TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            deleted_at INTEGER
        );

        CREATE INDEX IF NOT EXISTS notes_updated_at ON notes(updated_at);
        CREATE INDEX IF NOT EXISTS notes_deleted_at ON notes(deleted_at);
        "#,
    )
    .context("applying schema migrations")?;
    Ok(())
}
