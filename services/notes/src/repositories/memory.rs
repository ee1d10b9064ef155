//! In-process user repository for development and router tests

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::AuthError;
use crate::models::{NewUser, ProfileUpdate, User};
use crate::repositories::user::{UserRepository, hash_password};

/// Map-backed user repository with the same semantics as the PostgreSQL
/// implementation, including the atomic single-use reset-token consumption
#[derive(Default)]
pub struct MemoryUserRepository {
    users: RwLock<HashMap<Uuid, User>>,
}

impl MemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn create(&self, new_user: &NewUser) -> Result<User, AuthError> {
        let password_hash = hash_password(&new_user.password)?;
        let mut users = self.users.write().await;

        if users.values().any(|u| u.email == new_user.email) {
            return Err(AuthError::DuplicateEmail);
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email: new_user.email.clone(),
            password_hash,
            first_name: None,
            last_name: None,
            gender: None,
            location: None,
            website: None,
            picture: None,
            facebook_id: None,
            password_reset_token: None,
            password_reset_expires: None,
            created_at: now,
            updated_at: now,
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AuthError> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AuthError> {
        let users = self.users.read().await;
        Ok(users.get(&id).cloned())
    }

    async fn find_by_provider(&self, provider_id: &str) -> Result<Option<User>, AuthError> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|u| u.facebook_id.as_deref() == Some(provider_id))
            .cloned())
    }

    async fn update_profile(&self, id: Uuid, update: &ProfileUpdate) -> Result<User, AuthError> {
        let mut users = self.users.write().await;

        if let Some(email) = &update.email {
            if users.values().any(|u| u.id != id && &u.email == email) {
                return Err(AuthError::DuplicateEmail);
            }
        }

        let user = users.get_mut(&id).ok_or(AuthError::UserNotFound)?;
        if let Some(email) = &update.email {
            user.email = email.clone();
        }
        if let Some(v) = &update.first_name {
            user.first_name = Some(v.clone());
        }
        if let Some(v) = &update.last_name {
            user.last_name = Some(v.clone());
        }
        if let Some(v) = &update.gender {
            user.gender = Some(v.clone());
        }
        if let Some(v) = &update.location {
            user.location = Some(v.clone());
        }
        if let Some(v) = &update.website {
            user.website = Some(v.clone());
        }
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn update_password(&self, id: Uuid, new_password: &str) -> Result<(), AuthError> {
        let password_hash = hash_password(new_password)?;
        let mut users = self.users.write().await;
        let user = users.get_mut(&id).ok_or(AuthError::UserNotFound)?;
        user.password_hash = password_hash;
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn set_reset_token(
        &self,
        email: &str,
        token: &str,
        expires: DateTime<Utc>,
    ) -> Result<User, AuthError> {
        let mut users = self.users.write().await;
        let user = users
            .values_mut()
            .find(|u| u.email == email)
            .ok_or(AuthError::UserNotFound)?;
        user.password_reset_token = Some(token.to_string());
        user.password_reset_expires = Some(expires);
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn consume_reset_token(
        &self,
        token: &str,
        new_password: &str,
    ) -> Result<User, AuthError> {
        let password_hash = hash_password(new_password)?;
        let mut users = self.users.write().await;
        let user = users
            .values_mut()
            .find(|u| u.password_reset_token.as_deref() == Some(token))
            .ok_or(AuthError::TokenInvalid)?;

        match user.password_reset_expires {
            Some(expires) if expires > Utc::now() => {
                user.password_hash = password_hash;
                user.password_reset_token = None;
                user.password_reset_expires = None;
                user.updated_at = Utc::now();
                Ok(user.clone())
            }
            _ => Err(AuthError::TokenExpired),
        }
    }

    async fn link_provider(
        &self,
        id: Uuid,
        provider_id: &str,
        picture: Option<&str>,
    ) -> Result<User, AuthError> {
        let mut users = self.users.write().await;
        let user = users.get_mut(&id).ok_or(AuthError::UserNotFound)?;
        user.facebook_id = Some(provider_id.to_string());
        if let Some(picture) = picture {
            user.picture = Some(picture.to_string());
        }
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn unlink_provider(&self, id: Uuid) -> Result<User, AuthError> {
        let mut users = self.users.write().await;
        let user = users.get_mut(&id).ok_or(AuthError::UserNotFound)?;
        user.facebook_id = None;
        user.picture = None;
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn delete(&self, id: Uuid) -> Result<(), AuthError> {
        let mut users = self.users.write().await;
        users.remove(&id).ok_or(AuthError::UserNotFound)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            email: email.to_string(),
            password: "Sup3r-secret".to_string(),
        }
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let repo = MemoryUserRepository::new();
        repo.create(&new_user("a@example.com")).await.unwrap();
        let err = repo.create(&new_user("a@example.com")).await.unwrap_err();
        assert!(matches!(err, AuthError::DuplicateEmail));
    }

    #[tokio::test]
    async fn plaintext_password_is_never_stored() {
        let repo = MemoryUserRepository::new();
        let user = repo.create(&new_user("a@example.com")).await.unwrap();
        assert!(!user.password_hash.contains("Sup3r-secret"));
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("password_hash"));
    }

    #[tokio::test]
    async fn reset_token_consumes_once_before_expiry() {
        let repo = MemoryUserRepository::new();
        repo.create(&new_user("a@example.com")).await.unwrap();
        repo.set_reset_token("a@example.com", "tok", Utc::now() + Duration::hours(1))
            .await
            .unwrap();

        let user = repo.consume_reset_token("tok", "N3w-password").await.unwrap();
        assert!(user.password_reset_token.is_none());
        assert!(crate::repositories::verify_password("N3w-password", &user.password_hash).unwrap());

        // Replay fails: the token was cleared on consumption
        let err = repo.consume_reset_token("tok", "again").await.unwrap_err();
        assert!(matches!(err, AuthError::TokenInvalid));
    }

    #[tokio::test]
    async fn expired_reset_token_fails() {
        let repo = MemoryUserRepository::new();
        repo.create(&new_user("a@example.com")).await.unwrap();
        repo.set_reset_token("a@example.com", "tok", Utc::now() - Duration::seconds(1))
            .await
            .unwrap();

        let err = repo.consume_reset_token("tok", "pw").await.unwrap_err();
        assert!(matches!(err, AuthError::TokenExpired));
    }

    #[tokio::test]
    async fn provider_link_and_unlink() {
        let repo = MemoryUserRepository::new();
        let user = repo.create(&new_user("a@example.com")).await.unwrap();

        repo.link_provider(user.id, "fb-123", Some("https://graph/pic"))
            .await
            .unwrap();
        let linked = repo.find_by_provider("fb-123").await.unwrap().unwrap();
        assert_eq!(linked.id, user.id);

        repo.unlink_provider(user.id).await.unwrap();
        assert!(repo.find_by_provider("fb-123").await.unwrap().is_none());
    }
}
