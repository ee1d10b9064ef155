//! Relational note store over PostgreSQL
//!
//! Uses the shared connection pool constructed at startup. `migrate`
//! creates the schema and is called once during wiring.

use async_trait::async_trait;
use chrono::Utc;
use common::error::{StoreError, StoreResult};
use sqlx::{PgPool, Row};
use tracing::info;

use crate::models::Note;
use crate::store::{NoteStore, new_key};

/// PostgreSQL-backed note store
pub struct PgNoteStore {
    pool: PgPool,
}

impl PgNoteStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Ensure the notes table exists
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS notes (
                key TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                body TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        info!("notes schema ready");
        Ok(())
    }

    fn note_from_row(row: &sqlx::postgres::PgRow) -> Note {
        Note {
            key: row.get("key"),
            title: row.get("title"),
            body: row.get("body"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}

#[async_trait]
impl NoteStore for PgNoteStore {
    async fn create(&self, title: &str, body: &str) -> StoreResult<Note> {
        let now = Utc::now();
        let key = new_key();

        let row = sqlx::query(
            r#"
            INSERT INTO notes (key, title, body, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4)
            RETURNING key, title, body, created_at, updated_at
            "#,
        )
        .bind(&key)
        .bind(title)
        .bind(body)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(Self::note_from_row(&row))
    }

    async fn read(&self, key: &str) -> StoreResult<Note> {
        let row = sqlx::query(
            r#"
            SELECT key, title, body, created_at, updated_at
            FROM notes
            WHERE key = $1
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(key.to_string()))?;

        Ok(Self::note_from_row(&row))
    }

    async fn update(&self, key: &str, title: &str, body: &str) -> StoreResult<Note> {
        let row = sqlx::query(
            r#"
            UPDATE notes
            SET title = $2, body = $3, updated_at = $4
            WHERE key = $1
            RETURNING key, title, body, created_at, updated_at
            "#,
        )
        .bind(key)
        .bind(title)
        .bind(body)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(key.to_string()))?;

        Ok(Self::note_from_row(&row))
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
