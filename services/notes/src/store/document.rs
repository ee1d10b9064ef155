//! Document note store over embedded SQLite
//!
//! Each note is one row holding the whole record as a JSON document; the
//! engine is only used as an addressable document file, not relationally.
//! Schema is created on open.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use common::error::{StoreError, StoreResult};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Row, Sqlite};

use crate::models::Note;
use crate::store::{NoteStore, new_key};

/// SQLite-backed document store
pub struct SqliteNoteStore {
    pool: Pool<Sqlite>,
}

impl SqliteNoteStore {
    /// Open (or create) the database file and ensure the schema exists
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))
            .map_err(StoreError::from)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        // SQLite permits limited write concurrency; a single connection
        // avoids "database is locked" failures under concurrent requests.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS notes (
                key TEXT PRIMARY KEY,
                doc TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }

    /// In-memory database, used by tests
    pub async fn open_in_memory() -> StoreResult<Self> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:").map_err(StoreError::from)?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS notes (
                key TEXT PRIMARY KEY,
                doc TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }

    async fn put(&self, note: &Note) -> StoreResult<()> {
        let doc = serde_json::to_string(note)?;
        sqlx::query(
            r#"
            INSERT INTO notes (key, doc) VALUES ($1, $2)
            ON CONFLICT(key) DO UPDATE SET doc = excluded.doc
            "#,
        )
        .bind(&note.key)
        .bind(&doc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl NoteStore for SqliteNoteStore {
    async fn create(&self, title: &str, body: &str) -> StoreResult<Note> {
        let now = Utc::now();
        let note = Note {
            key: new_key(),
            title: title.to_string(),
            body: body.to_string(),
            created_at: now,
            updated_at: now,
        };
        self.put(&note).await?;
        Ok(note)
    }

    async fn read(&self, key: &str) -> StoreResult<Note> {
        let row = sqlx::query("SELECT doc FROM notes WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;

        let doc: String = row.get("doc");
        let note = serde_json::from_str(&doc)?;
        Ok(note)
    }

    async fn update(&self, key: &str, title: &str, body: &str) -> StoreResult<Note> {
        let mut note = self.read(key).await?;
        note.title = title.to_string();
        note.body = body.to_string();
        note.updated_at = Utc::now();
        self.put(&note).await?;
        Ok(note)
    }

    async fn destroy(&self, key: &str) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM notes WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(key.to_string()));
        }
        Ok(())
    }

    async fn keylist(&self) -> StoreResult<Vec<String>> {
        let rows = sqlx::query("SELECT key FROM notes")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|row| row.get("key")).collect())
    }

    async fn count(&self) -> StoreResult<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM notes")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn document_round_trip() {
        let store = SqliteNoteStore::open_in_memory().await.unwrap();
        let created = store.create("Myth of Zeus", "Zeus is the Father...").await.unwrap();
        let read = store.read(&created.key).await.unwrap();
        assert_eq!(read, created);
    }

    #[tokio::test]
    async fn update_is_strict_not_upsert() {
        let store = SqliteNoteStore::open_in_memory().await.unwrap();
        let err = store.update("no-such-key", "t", "b").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn destroy_then_read_fails_not_found() {
        let store = SqliteNoteStore::open_in_memory().await.unwrap();
        let note = store.create("t", "b").await.unwrap();
        store.destroy(&note.key).await.unwrap();
        assert!(store.read(&note.key).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn count_matches_keylist() {
        let store = SqliteNoteStore::open_in_memory().await.unwrap();
        store.create("a", "a").await.unwrap();
        store.create("b", "b").await.unwrap();
        assert_eq!(store.keylist().await.unwrap().len(), store.count().await.unwrap());
    }
}
