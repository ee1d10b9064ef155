//! Server-side session records
//!
//! A session is addressed by an opaque id carried in a client cookie and
//! maps to a serialized [`SessionData`] record. The store is shared by all
//! in-flight requests; operations on distinct session ids never interfere.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use common::cache::RedisPool;
use common::error::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

const SESSION_PREFIX: &str = "session:";

/// One-shot user-facing notice, consumed on next read
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Flash {
    pub level: String,
    pub message: String,
}

impl Flash {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: "error".to_string(),
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: "info".to_string(),
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: "success".to_string(),
            message: message.into(),
        }
    }
}

/// Transient per-session state
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionData {
    /// Authenticated identity, absent for anonymous sessions
    pub user_id: Option<Uuid>,
    /// Originally requested path, honored after the next successful login
    pub return_to: Option<String>,
    /// Last-attempted login email, echoed back on the login page
    pub previous_login_attempt: Option<String>,
    /// CSRF state for an in-flight OAuth authorization
    pub oauth_state: Option<String>,
    /// Pending flash messages
    #[serde(default)]
    pub flash: Vec<Flash>,
}

impl SessionData {
    /// Take and clear pending flash messages
    pub fn take_flash(&mut self) -> Vec<Flash> {
        std::mem::take(&mut self.flash)
    }
}

/// Generate a fresh session id
pub fn new_session_id() -> String {
    Uuid::new_v4().to_string()
}

/// Session record storage
///
/// `save` refreshes the record's TTL, giving sessions a sliding expiry.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, sid: &str) -> StoreResult<Option<SessionData>>;
    async fn save(&self, sid: &str, data: &SessionData) -> StoreResult<()>;
    async fn destroy(&self, sid: &str) -> StoreResult<()>;
}

/// Redis-backed session store with engine-side expiry
pub struct RedisSessionStore {
    pool: RedisPool,
    ttl_seconds: u64,
}

impl RedisSessionStore {
    pub fn new(pool: RedisPool, ttl_seconds: u64) -> Self {
        Self { pool, ttl_seconds }
    }

    fn record_key(sid: &str) -> String {
        format!("{}{}", SESSION_PREFIX, sid)
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn load(&self, sid: &str) -> StoreResult<Option<SessionData>> {
        let json = self
            .pool
            .get(&Self::record_key(sid))
            .await
            .map_err(StoreError::Storage)?;
        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, sid: &str, data: &SessionData) -> StoreResult<()> {
        let json = serde_json::to_string(data)?;
        self.pool
            .set(&Self::record_key(sid), &json, Some(self.ttl_seconds))
            .await
            .map_err(StoreError::Storage)
    }

    async fn destroy(&self, sid: &str) -> StoreResult<()> {
        self.pool
            .delete(&Self::record_key(sid))
            .await
            .map_err(StoreError::Storage)?;
        Ok(())
    }
}

/// In-process session store for development and tests
///
/// Expiry is checked on load; expired records are treated as absent.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, (SessionData, DateTime<Utc>)>>,
    ttl_seconds: i64,
}

impl MemorySessionStore {
    pub fn new(ttl_seconds: u64) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl_seconds: ttl_seconds as i64,
        }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, sid: &str) -> StoreResult<Option<SessionData>> {
        let sessions = self.sessions.read().await;
        match sessions.get(sid) {
            Some((data, expires)) if *expires > Utc::now() => Ok(Some(data.clone())),
            _ => Ok(None),
        }
    }

    async fn save(&self, sid: &str, data: &SessionData) -> StoreResult<()> {
        let expires = Utc::now() + Duration::seconds(self.ttl_seconds);
        let mut sessions = self.sessions.write().await;
        sessions.insert(sid.to_string(), (data.clone(), expires));
        Ok(())
    }

    async fn destroy(&self, sid: &str) -> StoreResult<()> {
        let mut sessions = self.sessions.write().await;
        sessions.remove(sid);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_load_destroy_round_trip() {
        let store = MemorySessionStore::new(3600);
        let sid = new_session_id();
        let data = SessionData {
            user_id: Some(Uuid::new_v4()),
            return_to: Some("/notes".to_string()),
            ..Default::default()
        };

        store.save(&sid, &data).await.unwrap();
        let loaded = store.load(&sid).await.unwrap().unwrap();
        assert_eq!(loaded.user_id, data.user_id);
        assert_eq!(loaded.return_to.as_deref(), Some("/notes"));

        store.destroy(&sid).await.unwrap();
        assert!(store.load(&sid).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn distinct_session_ids_do_not_interfere() {
        let store = MemorySessionStore::new(3600);
        let a = new_session_id();
        let b = new_session_id();

        store.save(&a, &SessionData::default()).await.unwrap();
        store
            .save(
                &b,
                &SessionData {
                    user_id: Some(Uuid::new_v4()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        store.destroy(&a).await.unwrap();
        assert!(store.load(&a).await.unwrap().is_none());
        assert!(store.load(&b).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn expired_session_is_treated_as_absent() {
        let store = MemorySessionStore::new(0);
        let sid = new_session_id();
        store.save(&sid, &SessionData::default()).await.unwrap();
        assert!(store.load(&sid).await.unwrap().is_none());
    }

    #[test]
    fn take_flash_drains_messages() {
        let mut data = SessionData::default();
        data.flash.push(Flash::info("hello"));
        let taken = data.take_flash();
        assert_eq!(taken.len(), 1);
        assert!(data.flash.is_empty());
    }
}
