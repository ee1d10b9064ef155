//! User repository: credential lookup, registration, and the
//! password-reset token lifecycle

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};
use tracing::info;
use uuid::Uuid;

use crate::error::AuthError;
use crate::models::{NewUser, ProfileUpdate, User};

/// PostgreSQL unique-constraint violation code
const UNIQUE_VIOLATION: &str = "23505";

/// Hash a plaintext password into a PHC string
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut rand::thread_rng());
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AuthError::Storage(anyhow::anyhow!("Failed to hash password: {}", e)))?;
    Ok(hash.to_string())
}

/// Verify a plaintext password against a stored PHC string
pub fn verify_password(password: &str, stored_hash: &str) -> Result<bool, AuthError> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|e| AuthError::Storage(anyhow::anyhow!("Failed to parse password hash: {}", e)))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Storage contract for user records
///
/// Consumed by the session gate for credential lookup and by the account
/// flows for registration, profile changes, and password reset.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Register a new user; the plaintext password is hashed before
    /// persistence. Fails with `DuplicateEmail` on a taken address.
    async fn create(&self, new_user: &NewUser) -> Result<User, AuthError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AuthError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AuthError>;

    async fn find_by_provider(&self, provider_id: &str) -> Result<Option<User>, AuthError>;

    async fn update_profile(&self, id: Uuid, update: &ProfileUpdate) -> Result<User, AuthError>;

    async fn update_password(&self, id: Uuid, new_password: &str) -> Result<(), AuthError>;

    /// Bind a reset token and its expiry to the user with the given email
    async fn set_reset_token(
        &self,
        email: &str,
        token: &str,
        expires: DateTime<Utc>,
    ) -> Result<User, AuthError>;

    /// Atomically consume an unexpired reset token: set the new password
    /// hash and clear the token so a second consumption fails. Fails with
    /// `TokenExpired` when the token exists but its window has elapsed,
    /// `TokenInvalid` when it is unknown.
    async fn consume_reset_token(&self, token: &str, new_password: &str)
    -> Result<User, AuthError>;

    /// Link an OAuth provider id (and optional picture) to the user
    async fn link_provider(
        &self,
        id: Uuid,
        provider_id: &str,
        picture: Option<&str>,
    ) -> Result<User, AuthError>;

    /// Clear the linked provider id
    async fn unlink_provider(&self, id: Uuid) -> Result<User, AuthError>;

    async fn delete(&self, id: Uuid) -> Result<(), AuthError>;
}

/// PostgreSQL-backed user repository
#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

const USER_COLUMNS: &str = "id, email, password_hash, first_name, last_name, gender, location, \
     website, picture, facebook_id, password_reset_token, password_reset_expires, \
     created_at, updated_at";

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Ensure the users table exists
    pub async fn migrate(&self) -> Result<(), AuthError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id UUID PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                first_name TEXT,
                last_name TEXT,
                gender TEXT,
                location TEXT,
                website TEXT,
                picture TEXT,
                facebook_id TEXT,
                password_reset_token TEXT,
                password_reset_expires TIMESTAMPTZ,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        info!("users schema ready");
        Ok(())
    }

    fn user_from_row(row: &PgRow) -> User {
        User {
            id: row.get("id"),
            email: row.get("email"),
            password_hash: row.get("password_hash"),
            first_name: row.get("first_name"),
            last_name: row.get("last_name"),
            gender: row.get("gender"),
            location: row.get("location"),
            website: row.get("website"),
            picture: row.get("picture"),
            facebook_id: row.get("facebook_id"),
            password_reset_token: row.get("password_reset_token"),
            password_reset_expires: row.get("password_reset_expires"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }

    async fn fetch_one_where(
        &self,
        clause: &str,
        bind: &str,
    ) -> Result<Option<User>, AuthError> {
        let query = format!("SELECT {} FROM users WHERE {}", USER_COLUMNS, clause);
        let row = sqlx::query(&query)
            .bind(bind)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| Self::user_from_row(&row)))
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create(&self, new_user: &NewUser) -> Result<User, AuthError> {
        info!("Creating new user: {}", new_user.email);
        let password_hash = hash_password(&new_user.password)?;
        let now = Utc::now();

        let query = format!(
            r#"
            INSERT INTO users (id, email, password_hash, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4)
            RETURNING {}
            "#,
            USER_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(Uuid::new_v4())
            .bind(&new_user.email)
            .bind(&password_hash)
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(|err| match &err {
                sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                    AuthError::DuplicateEmail
                }
                _ => AuthError::from(err),
            })?;

        Ok(Self::user_from_row(&row))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AuthError> {
        self.fetch_one_where("email = $1", email).await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AuthError> {
        let query = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| Self::user_from_row(&row)))
    }

    async fn find_by_provider(&self, provider_id: &str) -> Result<Option<User>, AuthError> {
        self.fetch_one_where("facebook_id = $1", provider_id).await
    }

    async fn update_profile(&self, id: Uuid, update: &ProfileUpdate) -> Result<User, AuthError> {
        let query = format!(
            r#"
            UPDATE users
            SET email = COALESCE($2, email),
                first_name = COALESCE($3, first_name),
                last_name = COALESCE($4, last_name),
                gender = COALESCE($5, gender),
                location = COALESCE($6, location),
                website = COALESCE($7, website),
                updated_at = $8
            WHERE id = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(id)
            .bind(&update.email)
            .bind(&update.first_name)
            .bind(&update.last_name)
            .bind(&update.gender)
            .bind(&update.location)
            .bind(&update.website)
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| match &err {
                sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                    AuthError::DuplicateEmail
                }
                _ => AuthError::from(err),
            })?
            .ok_or(AuthError::UserNotFound)?;

        Ok(Self::user_from_row(&row))
    }

    async fn update_password(&self, id: Uuid, new_password: &str) -> Result<(), AuthError> {
        let password_hash = hash_password(new_password)?;
        let result = sqlx::query(
            "UPDATE users SET password_hash = $2, updated_at = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(&password_hash)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AuthError::UserNotFound);
        }
        Ok(())
    }

    async fn set_reset_token(
        &self,
        email: &str,
        token: &str,
        expires: DateTime<Utc>,
    ) -> Result<User, AuthError> {
        let query = format!(
            r#"
            UPDATE users
            SET password_reset_token = $2, password_reset_expires = $3, updated_at = $4
            WHERE email = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(email)
            .bind(token)
            .bind(expires)
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        Ok(Self::user_from_row(&row))
    }

    async fn consume_reset_token(
        &self,
        token: &str,
        new_password: &str,
    ) -> Result<User, AuthError> {
        let password_hash = hash_password(new_password)?;

        // Single conditional update: checks the expiry window, rewrites the
        // hash, and clears the token, so replay cannot succeed.
        let query = format!(
            r#"
            UPDATE users
            SET password_hash = $2,
                password_reset_token = NULL,
                password_reset_expires = NULL,
                updated_at = $3
            WHERE password_reset_token = $1 AND password_reset_expires > $3
            RETURNING {}
            "#,
            USER_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(token)
            .bind(&password_hash)
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Self::user_from_row(&row)),
            None => {
                // Distinguish an expired token from an unknown one
                let exists: Option<i64> = sqlx::query_scalar(
                    "SELECT 1 FROM users WHERE password_reset_token = $1",
                )
                .bind(token)
                .fetch_optional(&self.pool)
                .await?;
                if exists.is_some() {
                    Err(AuthError::TokenExpired)
                } else {
                    Err(AuthError::TokenInvalid)
                }
            }
        }
    }

    async fn link_provider(
        &self,
        id: Uuid,
        provider_id: &str,
        picture: Option<&str>,
    ) -> Result<User, AuthError> {
        let query = format!(
            r#"
            UPDATE users
            SET facebook_id = $2, picture = COALESCE($3, picture), updated_at = $4
            WHERE id = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(id)
            .bind(provider_id)
            .bind(picture)
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        Ok(Self::user_from_row(&row))
    }

    async fn unlink_provider(&self, id: Uuid) -> Result<User, AuthError> {
        let query = format!(
            r#"
            UPDATE users
            SET facebook_id = NULL, picture = NULL, updated_at = $2
            WHERE id = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(id)
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        Ok(Self::user_from_row(&row))
    }

    async fn delete(&self, id: Uuid) -> Result<(), AuthError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AuthError::UserNotFound);
        }
        Ok(())
    }
}
