//! Filesystem note store
//!
//! One JSON file per record, named `{key}.json`, inside a configured
//! directory. The directory is created on open; keylist is a directory
//! scan.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use common::error::{StoreError, StoreResult};
use tracing::debug;

use crate::models::Note;
use crate::store::{NoteStore, new_key};

/// Flat-file backend storing each note as a JSON document
pub struct FsNoteStore {
    dir: PathBuf,
}

impl FsNoteStore {
    /// Open the store, creating the directory if missing
    pub async fn open(dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    fn file_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    async fn read_json(&self, path: &Path, key: &str) -> StoreResult<Note> {
        let data = match tokio::fs::read(path).await {
            Ok(data) => data,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound(key.to_string()));
            }
            Err(err) => return Err(err.into()),
        };
        let note = serde_json::from_slice(&data)?;
        Ok(note)
    }

    async fn write_json(&self, note: &Note) -> StoreResult<()> {
        let path = self.file_path(&note.key);
        let data = serde_json::to_vec(note)?;
        debug!("writing {}", path.display());
        tokio::fs::write(&path, data).await?;
        Ok(())
    }
}

#[async_trait]
impl NoteStore for FsNoteStore {
    async fn create(&self, title: &str, body: &str) -> StoreResult<Note> {
        let now = Utc::now();
        let note = Note {
            key: new_key(),
            title: title.to_string(),
            body: body.to_string(),
            created_at: now,
            updated_at: now,
        };
        self.write_json(&note).await?;
        Ok(note)
    }

    async fn read(&self, key: &str) -> StoreResult<Note> {
        self.read_json(&self.file_path(key), key).await
    }

    async fn update(&self, key: &str, title: &str, body: &str) -> StoreResult<Note> {
        // Strict policy: the existing record is read first, which both
        // enforces NotFound on a missing key and preserves created_at.
        let mut note = self.read(key).await?;
        note.title = title.to_string();
        note.body = body.to_string();
        note.updated_at = Utc::now();
        self.write_json(&note).await?;
        Ok(note)
    }

    async fn destroy(&self, key: &str) -> StoreResult<()> {
        match tokio::fs::remove_file(self.file_path(key)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(StoreError::NotFound(key.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn keylist(&self) -> StoreResult<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(key) = name.strip_suffix(".json") {
                keys.push(key.to_string());
            }
        }
        Ok(keys)
    }

    async fn count(&self) -> StoreResult<usize> {
        Ok(self.keylist().await?.len())
    }
}
