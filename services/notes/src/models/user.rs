//! User model and related payloads

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// User entity
///
/// The password hash never leaves the process: it is skipped on
/// serialization so no outward representation can carry it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub gender: Option<String>,
    pub location: Option<String>,
    pub website: Option<String>,
    pub picture: Option<String>,
    pub facebook_id: Option<String>,
    #[serde(skip_serializing)]
    pub password_reset_token: Option<String>,
    #[serde(skip_serializing)]
    pub password_reset_expires: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// New user registration payload (plaintext password, hashed before persistence)
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub password: String,
}

/// Profile update payload
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub gender: Option<String>,
    pub location: Option<String>,
    pub website: Option<String>,
}

/// Login credential pair
#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}
