//! Account flows: login, signup, logout, and the password-reset pipeline
//!
//! Each flow is an explicit sequence of fallible steps; any failing step
//! short-circuits with a typed error for the route layer to map.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rand::RngCore;
use tracing::info;
use uuid::Uuid;

use crate::error::AuthError;
use crate::models::{Credentials, NewUser, User};
use crate::repositories::{UserRepository, hash_password, verify_password};
use crate::session::{SessionData, SessionStore, new_session_id};

/// Length in bytes of the random reset token (hex-encoded on the wire)
const RESET_TOKEN_BYTES: usize = 16;

/// Outbound mail collaborator
///
/// Delivery formatting is out of scope; the pipeline only requires the
/// send to be a fallible step.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Send the reset link for a freshly minted token
    async fn send_password_reset(&self, user: &User, reset_url: &str) -> anyhow::Result<()>;

    /// Confirm a completed password change
    async fn send_password_changed(&self, user: &User) -> anyhow::Result<()>;
}

/// Mailer that records sends in the log stream
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_password_reset(&self, user: &User, reset_url: &str) -> anyhow::Result<()> {
        info!("password reset mail to {}: {}", user.email, reset_url);
        Ok(())
    }

    async fn send_password_changed(&self, user: &User) -> anyhow::Result<()> {
        info!("password changed mail to {}", user.email);
        Ok(())
    }
}

/// Verification target used when the email lookup misses, so the login
/// path does the same hashing work whether or not the account exists.
fn fallback_hash() -> &'static str {
    static FALLBACK: OnceLock<String> = OnceLock::new();
    FALLBACK.get_or_init(|| {
        hash_password("fallback-password").expect("fallback hash must be constructible")
    })
}

/// Account service coordinating the user repository, session store, and
/// mail collaborator
#[derive(Clone)]
pub struct AccountService {
    users: Arc<dyn UserRepository>,
    sessions: Arc<dyn SessionStore>,
    mailer: Arc<dyn Mailer>,
    reset_token_ttl: Duration,
    base_url: String,
}

impl AccountService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        sessions: Arc<dyn SessionStore>,
        mailer: Arc<dyn Mailer>,
        reset_token_ttl_secs: u64,
        base_url: String,
    ) -> Self {
        Self {
            users,
            sessions,
            mailer,
            reset_token_ttl: Duration::seconds(reset_token_ttl_secs as i64),
            base_url,
        }
    }

    pub fn users(&self) -> &Arc<dyn UserRepository> {
        &self.users
    }

    /// Verify a credential pair against the user store
    ///
    /// Constant-shape: password verification runs against a fallback hash
    /// when the lookup misses, so timing does not reveal whether the email
    /// is registered. Both failure modes return the same low-detail error.
    pub async fn authenticate(&self, credentials: &Credentials) -> Result<User, AuthError> {
        let user = self.users.find_by_email(&credentials.email).await?;

        let stored_hash = user
            .as_ref()
            .map(|u| u.password_hash.as_str())
            .unwrap_or_else(|| fallback_hash());
        let verified = verify_password(&credentials.password, stored_hash)?;

        match user {
            Some(user) if verified => Ok(user),
            _ => Err(AuthError::InvalidCredential),
        }
    }

    /// Authenticate and bind a fresh session to the user id
    ///
    /// Returns the session id for the cookie and the post-login redirect
    /// target (the recorded `return_to`, when one exists).
    pub async fn login(
        &self,
        credentials: &Credentials,
        previous_session: Option<(&str, SessionData)>,
    ) -> Result<(String, User, Option<String>), AuthError> {
        let user = self.authenticate(credentials).await?;

        // Carry over transient state, drop the old session id
        let mut return_to = None;
        if let Some((old_sid, data)) = previous_session {
            return_to = data.return_to;
            self.sessions
                .destroy(old_sid)
                .await
                .map_err(|e| AuthError::Storage(e.into()))?;
        }

        let sid = new_session_id();
        let data = SessionData {
            user_id: Some(user.id),
            ..Default::default()
        };
        self.sessions
            .save(&sid, &data)
            .await
            .map_err(|e| AuthError::Storage(e.into()))?;

        info!("user {} logged in", user.id);
        Ok((sid, user, return_to))
    }

    /// Register a new account and log it in
    pub async fn signup(&self, new_user: &NewUser) -> Result<(String, User), AuthError> {
        let user = self.users.create(new_user).await?;

        let sid = new_session_id();
        let data = SessionData {
            user_id: Some(user.id),
            ..Default::default()
        };
        self.sessions
            .save(&sid, &data)
            .await
            .map_err(|e| AuthError::Storage(e.into()))?;

        info!("user {} registered", user.id);
        Ok((sid, user))
    }

    /// Destroy the session binding; the id is unauthenticated afterwards
    pub async fn logout(&self, sid: &str) -> Result<(), AuthError> {
        self.sessions
            .destroy(sid)
            .await
            .map_err(|e| AuthError::Storage(e.into()))
    }

    /// Start the reset flow: mint a time-bounded token, bind it to the
    /// user, and hand the reset link to the mail collaborator
    pub async fn forgot_password(&self, email: &str) -> Result<(), AuthError> {
        let token = mint_reset_token();
        let expires = Utc::now() + self.reset_token_ttl;

        let user = self.users.set_reset_token(email, &token, expires).await?;
        let reset_url = format!("{}/reset/{}", self.base_url.trim_end_matches('/'), token);
        self.mailer
            .send_password_reset(&user, &reset_url)
            .await
            .map_err(AuthError::Storage)?;

        info!("reset token minted for user {}", user.id);
        Ok(())
    }

    /// Complete the reset flow: consume the token, set the new password,
    /// confirm by mail, and log the user in
    pub async fn reset_password(
        &self,
        token: &str,
        new_password: &str,
    ) -> Result<(String, User), AuthError> {
        let user = self.users.consume_reset_token(token, new_password).await?;
        self.mailer
            .send_password_changed(&user)
            .await
            .map_err(AuthError::Storage)?;

        let sid = new_session_id();
        let data = SessionData {
            user_id: Some(user.id),
            ..Default::default()
        };
        self.sessions
            .save(&sid, &data)
            .await
            .map_err(|e| AuthError::Storage(e.into()))?;

        info!("password reset completed for user {}", user.id);
        Ok((sid, user))
    }

    /// Permanently delete the account and its session
    pub async fn delete_account(&self, user_id: Uuid, sid: &str) -> Result<(), AuthError> {
        self.users.delete(user_id).await?;
        self.sessions
            .destroy(sid)
            .await
            .map_err(|e| AuthError::Storage(e.into()))
    }
}

/// Random hex token for the reset link
fn mint_reset_token() -> String {
    let mut bytes = [0u8; RESET_TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::MemoryUserRepository;
    use crate::session::MemorySessionStore;

    fn service() -> AccountService {
        AccountService::new(
            Arc::new(MemoryUserRepository::new()),
            Arc::new(MemorySessionStore::new(3600)),
            Arc::new(LogMailer),
            3600,
            "http://localhost:3000".to_string(),
        )
    }

    fn credentials(email: &str, password: &str) -> Credentials {
        Credentials {
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    async fn register(service: &AccountService, email: &str, password: &str) -> User {
        service
            .users()
            .create(&NewUser {
                email: email.to_string(),
                password: password.to_string(),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn authenticate_accepts_valid_credentials() {
        let service = service();
        let user = register(&service, "zeus@olympus.gr", "thunderbolt!").await;
        let found = service
            .authenticate(&credentials("zeus@olympus.gr", "thunderbolt!"))
            .await
            .unwrap();
        assert_eq!(found.id, user.id);
    }

    #[tokio::test]
    async fn authenticate_rejects_wrong_password_and_unknown_email_alike() {
        let service = service();
        register(&service, "zeus@olympus.gr", "thunderbolt!").await;

        let wrong_pw = service
            .authenticate(&credentials("zeus@olympus.gr", "wrong"))
            .await
            .unwrap_err();
        let unknown = service
            .authenticate(&credentials("hades@underworld.gr", "wrong"))
            .await
            .unwrap_err();

        assert_eq!(wrong_pw.to_string(), unknown.to_string());
        assert!(matches!(wrong_pw, AuthError::InvalidCredential));
        assert!(matches!(unknown, AuthError::InvalidCredential));
    }

    #[tokio::test]
    async fn login_carries_return_to_and_rotates_session_id() {
        let service = service();
        register(&service, "zeus@olympus.gr", "thunderbolt!").await;

        let old_sid = "anonymous-session";
        let previous = SessionData {
            return_to: Some("/notes".to_string()),
            previous_login_attempt: Some("zeus@olympus.gr".to_string()),
            ..Default::default()
        };

        let (sid, user, return_to) = service
            .login(
                &credentials("zeus@olympus.gr", "thunderbolt!"),
                Some((old_sid, previous)),
            )
            .await
            .unwrap();

        assert_ne!(sid, old_sid);
        assert_eq!(return_to.as_deref(), Some("/notes"));
        assert!(user.facebook_id.is_none());
    }

    #[tokio::test]
    async fn logout_unbinds_the_session() {
        let service = service();
        register(&service, "zeus@olympus.gr", "thunderbolt!").await;
        let (sid, _, _) = service
            .login(&credentials("zeus@olympus.gr", "thunderbolt!"), None)
            .await
            .unwrap();

        service.logout(&sid).await.unwrap();
    }

    #[tokio::test]
    async fn full_reset_flow_consumes_the_token_once() {
        let service = service();
        register(&service, "zeus@olympus.gr", "thunderbolt!").await;
        service.forgot_password("zeus@olympus.gr").await.unwrap();

        let token = service
            .users()
            .find_by_email("zeus@olympus.gr")
            .await
            .unwrap()
            .unwrap()
            .password_reset_token
            .unwrap();

        let (_sid, user) = service
            .reset_password(&token, "new-thunderbolt!")
            .await
            .unwrap();
        assert!(verify_password("new-thunderbolt!", &user.password_hash).unwrap());

        let replay = service.reset_password(&token, "again!").await.unwrap_err();
        assert!(matches!(replay, AuthError::TokenInvalid));
    }

    #[tokio::test]
    async fn forgot_password_for_unknown_email_fails() {
        let service = service();
        let err = service.forgot_password("nobody@example.com").await.unwrap_err();
        assert!(matches!(err, AuthError::UserNotFound));
    }

    #[test]
    fn reset_tokens_are_hex_and_distinct() {
        let a = mint_reset_token();
        let b = mint_reset_token();
        assert_eq!(a.len(), RESET_TOKEN_BYTES * 2);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
