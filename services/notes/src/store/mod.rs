//! Pluggable note storage
//!
//! One asynchronous contract, several interchangeable backends. The backend
//! is selected once at startup from configuration; the rest of the
//! application only ever sees `Arc<dyn NoteStore>`.
//!
//! Backends:
//! - [`MemoryNoteStore`] - process-local map, no persistence
//! - [`FsNoteStore`] - one JSON file per record in a directory
//! - [`RedisNoteStore`] - record per key plus a membership set
//! - [`SqliteNoteStore`] - embedded engine, one JSON document per record
//! - [`PgNoteStore`] - relational columns over the shared PostgreSQL pool
//!
//! Two decorators compose around any backend: [`TimedStore`] bounds each
//! operation with the configured timeout, and [`NotifyingStore`] publishes
//! change events after successful mutations.

mod document;
mod events;
mod fs;
mod keyvalue;
mod memory;
mod relational;

pub use document::SqliteNoteStore;
pub use events::{NoteEvent, NoteEvents};
pub use fs::FsNoteStore;
pub use keyvalue::RedisNoteStore;
pub use memory::MemoryNoteStore;
pub use relational::PgNoteStore;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::error::{StoreError, StoreResult};

use crate::models::Note;

/// Uniform asynchronous repository over the Note entity
///
/// Update policy is strict: `update` on a missing key fails with
/// `StoreError::NotFound`, it never upserts. Keys are UUIDv4 strings
/// assigned on `create` and assumed collision-free by construction.
#[async_trait]
pub trait NoteStore: Send + Sync {
    /// Allocate a fresh key, persist the record, return it populated with
    /// server-assigned fields
    async fn create(&self, title: &str, body: &str) -> StoreResult<Note>;

    /// Fetch the record for `key`, fully populated from the last
    /// successful write
    async fn read(&self, key: &str) -> StoreResult<Note>;

    /// Rewrite title and body for an existing record, preserving
    /// `created_at` and refreshing `updated_at`
    async fn update(&self, key: &str, title: &str, body: &str) -> StoreResult<Note>;

    /// Remove the record permanently; afterwards `read` fails NotFound
    async fn destroy(&self, key: &str) -> StoreResult<()>;

    /// All currently-live keys as a consistent snapshot, no ordering
    /// guarantee
    async fn keylist(&self) -> StoreResult<Vec<String>>;

    /// Number of live records
    async fn count(&self) -> StoreResult<usize>;
}

/// Decorator bounding every operation with a timeout
///
/// A stalled engine call surfaces as `StoreError::Timeout` instead of
/// leaving the request pending indefinitely.
pub struct TimedStore<S> {
    inner: S,
    timeout: Duration,
}

impl<S: NoteStore> TimedStore<S> {
    pub fn new(inner: S, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    async fn bounded<T>(
        &self,
        fut: impl Future<Output = StoreResult<T>> + Send,
    ) -> StoreResult<T> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| StoreError::Timeout)?
    }
}

#[async_trait]
impl<S: NoteStore> NoteStore for TimedStore<S> {
    async fn create(&self, title: &str, body: &str) -> StoreResult<Note> {
        self.bounded(self.inner.create(title, body)).await
    }

    async fn read(&self, key: &str) -> StoreResult<Note> {
        self.bounded(self.inner.read(key)).await
    }

    async fn update(&self, key: &str, title: &str, body: &str) -> StoreResult<Note> {
        self.bounded(self.inner.update(key, title, body)).await
    }

    async fn destroy(&self, key: &str) -> StoreResult<()> {
        self.bounded(self.inner.destroy(key)).await
    }

    async fn keylist(&self) -> StoreResult<Vec<String>> {
        self.bounded(self.inner.keylist()).await
    }

    async fn count(&self) -> StoreResult<usize> {
        self.bounded(self.inner.count()).await
    }
}

/// Decorator publishing change events after successful mutations
///
/// Notification is fire-and-forget: a publish failure never fails the
/// underlying storage operation.
pub struct NotifyingStore<S> {
    inner: S,
    events: NoteEvents,
}

impl<S: NoteStore> NotifyingStore<S> {
    pub fn new(inner: S, events: NoteEvents) -> Self {
        Self { inner, events }
    }
}

#[async_trait]
impl<S: NoteStore> NoteStore for NotifyingStore<S> {
    async fn create(&self, title: &str, body: &str) -> StoreResult<Note> {
        let note = self.inner.create(title, body).await?;
        self.events.publish(NoteEvent::Created(note.clone()));
        Ok(note)
    }

    async fn read(&self, key: &str) -> StoreResult<Note> {
        self.inner.read(key).await
    }

    async fn update(&self, key: &str, title: &str, body: &str) -> StoreResult<Note> {
        let note = self.inner.update(key, title, body).await?;
        self.events.publish(NoteEvent::Updated(note.clone()));
        Ok(note)
    }

    async fn destroy(&self, key: &str) -> StoreResult<()> {
        self.inner.destroy(key).await?;
        self.events.publish(NoteEvent::Deleted(key.to_string()));
        Ok(())
    }

    async fn keylist(&self) -> StoreResult<Vec<String>> {
        self.inner.keylist().await
    }

    async fn count(&self) -> StoreResult<usize> {
        self.inner.count().await
    }
}

/// Wrap a backend with the timeout and event decorators
pub fn compose(
    backend: impl NoteStore + 'static,
    timeout: Duration,
    events: NoteEvents,
) -> Arc<dyn NoteStore> {
    Arc::new(NotifyingStore::new(TimedStore::new(backend, timeout), events))
}

/// Generate a new opaque note key
pub(crate) fn new_key() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::TryRecvError;

    /// Backend that never completes, for exercising the timeout decorator
    struct StalledStore;

    #[async_trait]
    impl NoteStore for StalledStore {
        async fn create(&self, _title: &str, _body: &str) -> StoreResult<Note> {
            std::future::pending().await
        }

        async fn read(&self, _key: &str) -> StoreResult<Note> {
            std::future::pending().await
        }

        async fn update(&self, _key: &str, _title: &str, _body: &str) -> StoreResult<Note> {
            std::future::pending().await
        }

        async fn destroy(&self, _key: &str) -> StoreResult<()> {
            std::future::pending().await
        }

        async fn keylist(&self) -> StoreResult<Vec<String>> {
            std::future::pending().await
        }

        async fn count(&self) -> StoreResult<usize> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn timed_store_maps_stall_to_timeout() {
        let store = TimedStore::new(StalledStore, Duration::from_millis(10));
        let err = store.read("any").await.unwrap_err();
        assert!(matches!(err, StoreError::Timeout));
    }

    #[tokio::test]
    async fn notifying_store_publishes_after_mutations() {
        let events = NoteEvents::new();
        let mut rx = events.subscribe();
        let store = NotifyingStore::new(MemoryNoteStore::new(), events);

        let note = store.create("title", "body").await.unwrap();
        store.update(&note.key, "title", "revised").await.unwrap();
        store.destroy(&note.key).await.unwrap();

        assert!(matches!(rx.try_recv().unwrap(), NoteEvent::Created(n) if n.key == note.key));
        assert!(matches!(rx.try_recv().unwrap(), NoteEvent::Updated(n) if n.body == "revised"));
        assert!(matches!(rx.try_recv().unwrap(), NoteEvent::Deleted(k) if k == note.key));
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn publish_without_subscribers_does_not_fail_mutation() {
        let store = NotifyingStore::new(MemoryNoteStore::new(), NoteEvents::new());
        assert!(store.create("title", "body").await.is_ok());
    }
}
