//! Redis connection pool
//!
//! Backs the key-value note store and the Redis session store. One pool is
//! created per process and shared by every in-flight request.

use anyhow::Result;
use redis::{AsyncCommands, Client};
use tracing::info;

/// Configuration for Redis connection
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis connection URL (e.g., "redis://localhost:6379")
    pub url: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
        }
    }
}

/// Redis connection pool
#[derive(Clone)]
pub struct RedisPool {
    client: Client,
}

impl RedisPool {
    /// Initialize a new Redis connection pool
    pub fn new(config: &RedisConfig) -> Result<Self> {
        let client = Client::open(config.url.clone())?;
        info!("Redis client initialized with URL: {}", config.url);
        Ok(RedisPool { client })
    }

    /// Get a connection from the pool
    async fn get_connection(&self) -> Result<redis::aio::MultiplexedConnection> {
        let conn = self.client.get_multiplexed_async_connection().await?;
        Ok(conn)
    }

    /// Set a key-value pair in Redis with optional TTL
    pub async fn set(&self, key: &str, value: &str, ttl_seconds: Option<u64>) -> Result<()> {
        let mut conn = self.get_connection().await?;

        if let Some(ttl) = ttl_seconds {
            let _: () = conn.set_ex(key, value, ttl).await?;
        } else {
            let _: () = conn.set(key, value).await?;
        }

        Ok(())
    }

    /// Get a value from Redis by key
    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.get_connection().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    /// Delete a key, returning how many keys were removed
    pub async fn delete(&self, key: &str) -> Result<u64> {
        let mut conn = self.get_connection().await?;
        let removed: u64 = conn.del(key).await?;
        Ok(removed)
    }

    /// Refresh the TTL on an existing key
    pub async fn expire(&self, key: &str, ttl_seconds: u64) -> Result<bool> {
        let mut conn = self.get_connection().await?;
        let set: bool = conn.expire(key, ttl_seconds as i64).await?;
        Ok(set)
    }

    /// Add a member to a set
    pub async fn set_add(&self, key: &str, member: &str) -> Result<()> {
        let mut conn = self.get_connection().await?;
        let _: u64 = conn.sadd(key, member).await?;
        Ok(())
    }

    /// Remove a member from a set
    pub async fn set_remove(&self, key: &str, member: &str) -> Result<()> {
        let mut conn = self.get_connection().await?;
        let _: u64 = conn.srem(key, member).await?;
        Ok(())
    }

    /// All members of a set
    pub async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        let mut conn = self.get_connection().await?;
        let members: Vec<String> = conn.smembers(key).await?;
        Ok(members)
    }

    /// Cardinality of a set
    pub async fn set_len(&self, key: &str) -> Result<u64> {
        let mut conn = self.get_connection().await?;
        let len: u64 = conn.scard(key).await?;
        Ok(len)
    }

    /// Check if Redis is reachable
    pub async fn health_check(&self) -> Result<bool> {
        let mut conn = self.get_connection().await?;
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(pong == "PONG")
    }
}
