//! Shared infrastructure for the notes application
//!
//! Storage error taxonomy, PostgreSQL pool construction, and the Redis
//! connection pool used by the key-value backend and the session store.

pub mod cache;
pub mod database;
pub mod error;
