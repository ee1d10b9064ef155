//! Route wiring and handlers
//!
//! View rendering is not done here: page handlers answer with redirects,
//! flash state, or plain JSON data for the presentation layer. The API
//! under /api/v1 is gated with the JSON strategy, the page routes with
//! the redirect strategy.

use axum::{
    Extension, Form, Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::AppState;
use crate::error::{AppError, AuthError};
use crate::middleware::{
    AuthSession, api_guard, current_session, page_guard, removal_cookie, session_cookie,
};
use crate::models::{Credentials, NewUser, NoteDraft, ProfileUpdate};
use crate::session::{Flash, SessionData, new_session_id};
use crate::validation::{validate_email, validate_login, validate_password_pair};

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/notes", get(api_list_notes).post(api_create_note))
        .route(
            "/notes/:key",
            get(api_read_note).put(api_update_note).delete(api_destroy_note),
        )
        .route_layer(from_fn_with_state(state.clone(), api_guard));

    let pages = Router::new()
        .route("/notes", get(notes_page))
        .route("/notes/view/:key", get(note_detail_page))
        .route("/profile", get(profile_get).put(profile_put))
        .route("/profile/password", post(change_password))
        .route("/profile/delete", post(delete_account))
        .route("/profile/unlink/facebook", post(unlink_facebook))
        .route_layer(from_fn_with_state(state.clone(), page_guard));

    Router::new()
        .route("/health", get(health_check))
        .route("/login", get(login_get).post(login_post))
        .route("/logout", get(logout))
        .route("/signup", get(signup_get).post(signup_post))
        .route("/forgot", get(forgot_get).post(forgot_post))
        .route("/reset/:token", post(reset_post))
        .route("/auth/facebook", get(facebook_start))
        .route("/auth/facebook/callback", get(facebook_callback))
        .nest("/api/v1", api)
        .merge(pages)
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "notes",
    }))
}

// ---------------------------------------------------------------------------
// Notes API (JSON strategy)

#[derive(Serialize)]
struct NoteListResponse {
    keys: Vec<String>,
    count: usize,
}

async fn api_list_notes(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let keys = state.notes.keylist().await?;
    let count = state.notes.count().await?;
    Ok(Json(NoteListResponse { keys, count }))
}

async fn api_create_note(
    State(state): State<AppState>,
    Json(draft): Json<NoteDraft>,
) -> Result<impl IntoResponse, AppError> {
    draft.validate()?;
    let note = state.notes.create(&draft.title, &draft.body).await?;
    Ok((StatusCode::CREATED, Json(note)))
}

async fn api_read_note(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let note = state.notes.read(&key).await?;
    Ok(Json(note))
}

async fn api_update_note(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(draft): Json<NoteDraft>,
) -> Result<impl IntoResponse, AppError> {
    draft.validate()?;
    let note = state.notes.update(&key, &draft.title, &draft.body).await?;
    Ok(Json(note))
}

async fn api_destroy_note(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    state.notes.destroy(&key).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Notes pages (redirect strategy)

async fn notes_page(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let keys = state.notes.keylist().await?;
    let count = state.notes.count().await?;
    Ok(Json(NoteListResponse { keys, count }))
}

async fn note_detail_page(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let note = state.notes.read(&key).await?;
    Ok(Json(note))
}

// ---------------------------------------------------------------------------
// Login / logout

#[derive(Serialize)]
struct LoginPageState {
    flash: Vec<Flash>,
    previous_login_attempt: Option<String>,
}

/// Login page state: pending flash messages plus the last-attempted email
async fn login_get(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    let mut page = LoginPageState {
        flash: Vec::new(),
        previous_login_attempt: None,
    };

    if let Some((sid, mut data)) = current_session(&state, &jar).await {
        page.flash = data.take_flash();
        page.previous_login_attempt = data.previous_login_attempt.take();
        state.sessions.save(&sid, &data).await?;
    }

    Ok(Json(page))
}

async fn login_post(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<Credentials>,
) -> Response {
    if let Err(err) = validate_login(&form.email, &form.password) {
        let messages = err.errors.into_iter().map(|e| e.message).collect();
        return stash_failure(&state, jar, "/login", Some(form.email), messages).await;
    }

    let previous = current_session(&state, &jar).await;
    let previous_ref = previous.as_ref().map(|(sid, data)| (sid.as_str(), data.clone()));

    match state.accounts.login(&form, previous_ref).await {
        Ok((sid, _user, return_to)) => {
            let jar = jar.add(session_cookie(&state.cookie_name, &sid));
            let target = return_to.unwrap_or_else(|| "/notes".to_string());
            (jar, Redirect::to(&target)).into_response()
        }
        Err(AuthError::InvalidCredential) => {
            stash_failure(
                &state,
                jar,
                "/login",
                Some(form.email),
                vec!["Username or password is not valid. Please try again.".to_string()],
            )
            .await
        }
        Err(err) => AppError::Auth(err).into_response(),
    }
}

async fn logout(State(state): State<AppState>, jar: CookieJar) -> Response {
    if let Some((sid, _)) = current_session(&state, &jar).await {
        if let Err(err) = state.accounts.logout(&sid).await {
            return AppError::Auth(err).into_response();
        }
        info!("session {} logged out", sid);
    }
    let jar = jar.add(removal_cookie(&state.cookie_name));
    (jar, Redirect::to("/login")).into_response()
}

// ---------------------------------------------------------------------------
// Signup

#[derive(Deserialize)]
struct SignupForm {
    email: String,
    password: String,
    password_confirm: String,
}

async fn signup_get(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    let mut flash = Vec::new();
    if let Some((sid, mut data)) = current_session(&state, &jar).await {
        flash = data.take_flash();
        state.sessions.save(&sid, &data).await?;
    }
    Ok(Json(json!({ "flash": flash })))
}

async fn signup_post(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<SignupForm>,
) -> Response {
    if let Err(err) = validate_email(&form.email) {
        let messages = err.errors.into_iter().map(|e| e.message).collect();
        return stash_failure(&state, jar, "/signup", None, messages).await;
    }
    if let Err(err) = validate_password_pair(&form.password, &form.password_confirm) {
        let messages = err.errors.into_iter().map(|e| e.message).collect();
        return stash_failure(&state, jar, "/signup", None, messages).await;
    }

    let new_user = NewUser {
        email: form.email,
        password: form.password,
    };
    match state.accounts.signup(&new_user).await {
        Ok((sid, _user)) => {
            let jar = jar.add(session_cookie(&state.cookie_name, &sid));
            (jar, Redirect::to("/notes")).into_response()
        }
        Err(AuthError::DuplicateEmail) => {
            stash_failure(
                &state,
                jar,
                "/signup",
                None,
                vec![AuthError::DuplicateEmail.to_string()],
            )
            .await
        }
        Err(err) => AppError::Auth(err).into_response(),
    }
}

// ---------------------------------------------------------------------------
// Password reset

#[derive(Deserialize)]
struct ForgotForm {
    email: String,
}

async fn forgot_get(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    let mut flash = Vec::new();
    if let Some((sid, mut data)) = current_session(&state, &jar).await {
        flash = data.take_flash();
        state.sessions.save(&sid, &data).await?;
    }
    Ok(Json(json!({ "flash": flash })))
}

async fn forgot_post(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<ForgotForm>,
) -> Response {
    if let Err(err) = validate_email(&form.email) {
        let messages = err.errors.into_iter().map(|e| e.message).collect();
        return stash_failure(&state, jar, "/forgot", None, messages).await;
    }

    match state.accounts.forgot_password(&form.email).await {
        Ok(()) => {
            let message = format!(
                "An email has been sent to {} with further instructions.",
                form.email
            );
            stash_notice(&state, jar, "/forgot", Flash::info(message)).await
        }
        Err(AuthError::UserNotFound) => {
            let message = format!(
                "The email address {} is not associated with any account.",
                form.email
            );
            stash_notice(&state, jar, "/forgot", Flash::error(message)).await
        }
        Err(err) => AppError::Auth(err).into_response(),
    }
}

#[derive(Deserialize)]
struct ResetForm {
    password: String,
    password_confirm: String,
}

async fn reset_post(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(token): Path<String>,
    Form(form): Form<ResetForm>,
) -> Response {
    if let Err(err) = validate_password_pair(&form.password, &form.password_confirm) {
        let messages = err.errors.into_iter().map(|e| e.message).collect();
        return stash_failure(&state, jar, "/forgot", None, messages).await;
    }

    match state.accounts.reset_password(&token, &form.password).await {
        Ok((sid, _user)) => {
            let jar = jar.add(session_cookie(&state.cookie_name, &sid));
            (jar, Redirect::to("/profile")).into_response()
        }
        Err(err @ (AuthError::TokenInvalid | AuthError::TokenExpired)) => {
            stash_notice(&state, jar, "/forgot", Flash::error(err.to_string())).await
        }
        Err(err) => AppError::Auth(err).into_response(),
    }
}

// ---------------------------------------------------------------------------
// Profile

async fn profile_get(Extension(auth): Extension<AuthSession>) -> impl IntoResponse {
    Json(auth.user)
}

async fn profile_put(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthSession>,
    Form(update): Form<ProfileUpdate>,
) -> Result<impl IntoResponse, AppError> {
    if let Some(email) = &update.email {
        validate_email(email)?;
    }
    let user = state.accounts.users().update_profile(auth.user.id, &update).await?;
    Ok(Json(user))
}

#[derive(Deserialize)]
struct ChangePasswordForm {
    password: String,
    password_confirm: String,
}

async fn change_password(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthSession>,
    Form(form): Form<ChangePasswordForm>,
) -> Result<impl IntoResponse, AppError> {
    validate_password_pair(&form.password, &form.password_confirm)?;
    state
        .accounts
        .users()
        .update_password(auth.user.id, &form.password)
        .await?;
    Ok(Redirect::to("/profile"))
}

async fn delete_account(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthSession>,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    state.accounts.delete_account(auth.user.id, &auth.sid).await?;
    let jar = jar.add(removal_cookie(&state.cookie_name));
    Ok((jar, Redirect::to("/login")))
}

async fn unlink_facebook(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthSession>,
) -> Result<impl IntoResponse, AppError> {
    state.accounts.users().unlink_provider(auth.user.id).await?;
    Ok(Redirect::to("/profile"))
}

// ---------------------------------------------------------------------------
// OAuth linking

async fn facebook_start(State(state): State<AppState>, jar: CookieJar) -> Response {
    let Some(oauth) = &state.oauth else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "OAuth is not configured" })),
        )
            .into_response();
    };

    let (url, csrf_token) = oauth.authorize_url();

    // Stash the CSRF state on the session for the callback to verify
    let (sid, mut data, fresh) = match current_session(&state, &jar).await {
        Some((sid, data)) => (sid, data, false),
        None => (new_session_id(), SessionData::default(), true),
    };
    data.oauth_state = Some(csrf_token.secret().clone());
    if let Err(err) = state.sessions.save(&sid, &data).await {
        return AppError::Store(err).into_response();
    }

    let redirect = Redirect::to(&url);
    if fresh {
        let jar = jar.add(session_cookie(&state.cookie_name, &sid));
        (jar, redirect).into_response()
    } else {
        redirect.into_response()
    }
}

#[derive(Deserialize)]
struct OAuthCallback {
    code: String,
    state: String,
}

async fn facebook_callback(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(params): Query<OAuthCallback>,
) -> Response {
    let Some(oauth) = &state.oauth else {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    };

    let Some((sid, mut data)) = current_session(&state, &jar).await else {
        return stash_notice(&state, jar, "/login", Flash::error("OAuth session expired")).await;
    };

    // The callback state must match the one minted at /auth/facebook
    if data.oauth_state.take().as_deref() != Some(params.state.as_str()) {
        return stash_notice(&state, jar, "/login", Flash::error("Invalid OAuth state")).await;
    }
    if let Err(err) = state.sessions.save(&sid, &data).await {
        return AppError::Store(err).into_response();
    }

    let profile = match oauth.exchange_code(params.code).await {
        Ok(token) => match oauth.fetch_profile(&token).await {
            Ok(profile) => profile,
            Err(err) => return AppError::Internal(err).into_response(),
        },
        Err(err) => return AppError::Internal(err).into_response(),
    };

    let users = state.accounts.users();

    // Logged in: link the provider to the current account
    if let Some(user_id) = data.user_id {
        match users.find_by_provider(&profile.id).await {
            Ok(Some(existing)) if existing.id != user_id => {
                let message =
                    "There is already an existing account linked with this Facebook profile.";
                return stash_notice(&state, jar, "/profile", Flash::error(message)).await;
            }
            Ok(_) => {}
            Err(err) => return AppError::Auth(err).into_response(),
        }

        return match users
            .link_provider(user_id, &profile.id, Some(&profile.picture_url()))
            .await
        {
            Ok(_) => {
                stash_notice(
                    &state,
                    jar,
                    "/profile",
                    Flash::success("Your Facebook account has been linked."),
                )
                .await
            }
            Err(err) => AppError::Auth(err).into_response(),
        };
    }

    // Not logged in: sign in through an already-linked account, or link by
    // matching email
    let linked = match users.find_by_provider(&profile.id).await {
        Ok(linked) => linked,
        Err(err) => return AppError::Auth(err).into_response(),
    };

    let user = match linked {
        Some(user) => Some(user),
        None => match &profile.email {
            Some(email) => match users.find_by_email(email).await {
                Ok(Some(user)) => {
                    match users
                        .link_provider(user.id, &profile.id, Some(&profile.picture_url()))
                        .await
                    {
                        Ok(user) => Some(user),
                        Err(err) => return AppError::Auth(err).into_response(),
                    }
                }
                Ok(None) => None,
                Err(err) => return AppError::Auth(err).into_response(),
            },
            None => None,
        },
    };

    match user {
        Some(user) => {
            let new_sid = new_session_id();
            let session = SessionData {
                user_id: Some(user.id),
                ..Default::default()
            };
            if let Err(err) = state.sessions.destroy(&sid).await {
                return AppError::Store(err).into_response();
            }
            if let Err(err) = state.sessions.save(&new_sid, &session).await {
                return AppError::Store(err).into_response();
            }
            let jar = jar.add(session_cookie(&state.cookie_name, &new_sid));
            (jar, Redirect::to("/notes")).into_response()
        }
        None => {
            let message = "This Facebook profile is not associated with any account.";
            stash_notice(&state, jar, "/login", Flash::error(message)).await
        }
    }
}

// ---------------------------------------------------------------------------
// Flash helpers

/// Record failure messages (and optionally the attempted email) on the
/// session and redirect back to the given form
async fn stash_failure(
    state: &AppState,
    jar: CookieJar,
    redirect_to: &str,
    attempted_email: Option<String>,
    messages: Vec<String>,
) -> Response {
    let (sid, mut data, fresh) = match current_session(state, &jar).await {
        Some((sid, data)) => (sid, data, false),
        None => (new_session_id(), SessionData::default(), true),
    };

    data.previous_login_attempt = attempted_email;
    for message in messages {
        data.flash.push(Flash::error(message));
    }

    if let Err(err) = state.sessions.save(&sid, &data).await {
        return AppError::Store(err).into_response();
    }

    let redirect = Redirect::to(redirect_to);
    if fresh {
        let jar = jar.add(session_cookie(&state.cookie_name, &sid));
        (jar, redirect).into_response()
    } else {
        redirect.into_response()
    }
}

/// Record a single flash message and redirect
async fn stash_notice(
    state: &AppState,
    jar: CookieJar,
    redirect_to: &str,
    flash: Flash,
) -> Response {
    let (sid, mut data, fresh) = match current_session(state, &jar).await {
        Some((sid, data)) => (sid, data, false),
        None => (new_session_id(), SessionData::default(), true),
    };
    data.flash.push(flash);

    if let Err(err) = state.sessions.save(&sid, &data).await {
        return AppError::Store(err).into_response();
    }

    let redirect = Redirect::to(redirect_to);
    if fresh {
        let jar = jar.add(session_cookie(&state.cookie_name, &sid));
        (jar, redirect).into_response()
    } else {
        redirect.into_response()
    }
}
