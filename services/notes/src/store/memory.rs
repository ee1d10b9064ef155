//! In-memory note store
//!
//! No persistence: data exists only while the process is running. Useful
//! for development and as the reference implementation of the contract.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use common::error::{StoreError, StoreResult};
use tokio::sync::RwLock;

use crate::models::Note;
use crate::store::{NoteStore, new_key};

/// Process-local map of notes behind an async RwLock
#[derive(Default)]
pub struct MemoryNoteStore {
    notes: RwLock<HashMap<String, Note>>,
}

impl MemoryNoteStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NoteStore for MemoryNoteStore {
    async fn create(&self, title: &str, body: &str) -> StoreResult<Note> {
        let now = Utc::now();
        let note = Note {
            key: new_key(),
            title: title.to_string(),
            body: body.to_string(),
            created_at: now,
            updated_at: now,
        };

        let mut notes = self.notes.write().await;
        notes.insert(note.key.clone(), note.clone());
        Ok(note)
    }

    async fn read(&self, key: &str) -> StoreResult<Note> {
        let notes = self.notes.read().await;
        notes
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn update(&self, key: &str, title: &str, body: &str) -> StoreResult<Note> {
        let mut notes = self.notes.write().await;
        let note = notes
            .get_mut(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;

        note.title = title.to_string();
        note.body = body.to_string();
        note.updated_at = Utc::now();
        Ok(note.clone())
    }

    async fn destroy(&self, key: &str) -> StoreResult<()> {
        let mut notes = self.notes.write().await;
        notes
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn keylist(&self) -> StoreResult<Vec<String>> {
        let notes = self.notes.read().await;
        Ok(notes.keys().cloned().collect())
    }

    async fn count(&self) -> StoreResult<usize> {
        let notes = self.notes.read().await;
        Ok(notes.len())
    }
}
