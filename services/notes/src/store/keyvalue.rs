//! Key-value note store over Redis
//!
//! Each record lives under `note:{key}` as a JSON document. A membership
//! set under `note:keys` tracks live keys so keylist and count read a
//! consistent snapshot without scanning the keyspace.

use async_trait::async_trait;
use chrono::Utc;
use common::cache::RedisPool;
use common::error::{StoreError, StoreResult};

use crate::models::Note;
use crate::store::{NoteStore, new_key};

const RECORD_PREFIX: &str = "note:";
const KEYSET: &str = "note:keys";

/// Redis-backed note store
pub struct RedisNoteStore {
    pool: RedisPool,
}

impl RedisNoteStore {
    pub fn new(pool: RedisPool) -> Self {
        Self { pool }
    }

    fn record_key(key: &str) -> String {
        format!("{}{}", RECORD_PREFIX, key)
    }

    async fn put(&self, note: &Note) -> StoreResult<()> {
        let json = serde_json::to_string(note)?;
        self.pool
            .set(&Self::record_key(&note.key), &json, None)
            .await
            .map_err(StoreError::Storage)?;
        self.pool
            .set_add(KEYSET, &note.key)
            .await
            .map_err(StoreError::Storage)?;
        Ok(())
    }
}

#[async_trait]
impl NoteStore for RedisNoteStore {
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
        let json = self
            .pool
            .get(&Self::record_key(key))
            .await
            .map_err(StoreError::Storage)?
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        let note = serde_json::from_str(&json)?;
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
        let removed = self
            .pool
            .delete(&Self::record_key(key))
            .await
            .map_err(StoreError::Storage)?;
        if removed == 0 {
            return Err(StoreError::NotFound(key.to_string()));
        }
        self.pool
            .set_remove(KEYSET, key)
            .await
            .map_err(StoreError::Storage)?;
        Ok(())
    }

    async fn keylist(&self) -> StoreResult<Vec<String>> {
        self.pool
            .set_members(KEYSET)
            .await
            .map_err(StoreError::Storage)
    }

    async fn count(&self) -> StoreResult<usize> {
        let len = self
            .pool
            .set_len(KEYSET)
            .await
            .map_err(StoreError::Storage)?;
        Ok(len as usize)
    }
}
