//! Application error types and their HTTP mapping

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use common::error::StoreError;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// A single field-level validation failure
#[derive(Debug, Clone, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Input violates schema constraints; carries field-level detail
#[derive(Debug, Clone, Error)]
#[error("validation failed")]
pub struct ValidationError {
    pub errors: Vec<FieldError>,
}

impl ValidationError {
    pub fn new(errors: Vec<FieldError>) -> Self {
        Self { errors }
    }

    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            errors: vec![FieldError::new(field, message)],
        }
    }
}

/// Authentication and account errors
#[derive(Debug, Error)]
pub enum AuthError {
    /// Login failure; deliberately low-detail to avoid account enumeration
    #[error("Invalid email or password")]
    InvalidCredential,

    /// Unique email constraint violation on signup
    #[error("The email address is already associated with another account")]
    DuplicateEmail,

    /// Reset token unknown or already consumed
    #[error("Password reset token is invalid")]
    TokenInvalid,

    /// Reset token past its expiry window
    #[error("Password reset token has expired")]
    TokenExpired,

    /// No user record for the given id/email
    #[error("user not found")]
    UserNotFound,

    /// Underlying engine failure
    #[error("storage error: {0}")]
    Storage(#[source] anyhow::Error),
}

impl From<sqlx::Error> for AuthError {
    fn from(err: sqlx::Error) -> Self {
        AuthError::Storage(err.into())
    }
}

/// Top-level application error returned by route handlers
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Request lacks an authenticated session
    #[error("You need to be authenticated to access this resource")]
    Unauthorized,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Store(StoreError::NotFound(key)) => {
                let body = Json(json!({ "error": format!("note {} does not exist", key) }));
                (StatusCode::NOT_FOUND, body).into_response()
            }
            AppError::Store(err) => {
                error!("storage failure: {:#}", anyhow::Error::from(err));
                generic_500()
            }
            AppError::Auth(AuthError::InvalidCredential) => {
                let body = Json(json!({ "error": AuthError::InvalidCredential.to_string() }));
                (StatusCode::UNAUTHORIZED, body).into_response()
            }
            AppError::Auth(AuthError::DuplicateEmail) => {
                let body = Json(json!({ "error": AuthError::DuplicateEmail.to_string() }));
                (StatusCode::CONFLICT, body).into_response()
            }
            AppError::Auth(err @ (AuthError::TokenInvalid | AuthError::TokenExpired)) => {
                let body = Json(json!({ "error": err.to_string() }));
                (StatusCode::BAD_REQUEST, body).into_response()
            }
            AppError::Auth(AuthError::UserNotFound) => {
                let body = Json(json!({ "error": "user not found" }));
                (StatusCode::NOT_FOUND, body).into_response()
            }
            AppError::Auth(AuthError::Storage(err)) => {
                error!("storage failure: {:#}", err);
                generic_500()
            }
            AppError::Validation(err) => {
                let body = Json(json!({
                    "error": "validation failed",
                    "fields": err.errors,
                }));
                (StatusCode::UNPROCESSABLE_ENTITY, body).into_response()
            }
            AppError::Unauthorized => {
                let body = Json(json!({
                    "success": false,
                    "message": "You need to be authenticated to access this resource",
                }));
                (StatusCode::UNAUTHORIZED, body).into_response()
            }
            AppError::Internal(err) => {
                error!("unhandled error: {:#}", err);
                generic_500()
            }
        }
    }
}

fn generic_500() -> Response {
    let body = Json(json!({ "error": "Internal server error" }));
    (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
}
