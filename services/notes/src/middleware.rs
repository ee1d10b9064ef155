//! The session gate: per-request authentication enforcement
//!
//! Routes pick one of two failure strategies. Page routes redirect
//! unauthenticated callers to the login URL, recording the requested path
//! for the post-login redirect; API routes answer with a structured 401
//! and never redirect. Authenticated requests proceed with the resolved
//! user attached to the request extensions and a refreshed session TTL.

use axum::{
    body::Body,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use tracing::error;

use crate::AppState;
use crate::error::AppError;
use crate::models::User;
use crate::session::{Flash, SessionData, new_session_id};

/// Failure strategy for unauthenticated requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardStrategy {
    /// Redirect to the login page, recording `return_to` and a flash notice
    RedirectToLogin,
    /// Respond with a structured 401 body
    RejectJson,
}

/// Authenticated request context, inserted into request extensions by the
/// gate and read by downstream handlers
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub sid: String,
    pub user: User,
}

/// Build the session cookie
pub fn session_cookie(name: &str, sid: &str) -> Cookie<'static> {
    Cookie::build((name.to_string(), sid.to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

/// Build an expired session cookie, clearing it client-side
pub fn removal_cookie(name: &str) -> Cookie<'static> {
    let mut cookie = Cookie::build((name.to_string(), String::new()))
        .path("/")
        .build();
    cookie.make_removal();
    cookie
}

/// Load the session referenced by the request cookie, if any
pub async fn current_session(state: &AppState, jar: &CookieJar) -> Option<(String, SessionData)> {
    let sid = jar.get(&state.cookie_name)?.value().to_string();
    match state.sessions.load(&sid).await {
        Ok(Some(data)) => Some((sid, data)),
        Ok(None) => None,
        Err(err) => {
            error!("failed to load session {}: {}", sid, err);
            None
        }
    }
}

/// Page-route guard: unauthenticated requests are redirected to /login
pub async fn page_guard(
    State(state): State<AppState>,
    jar: CookieJar,
    req: Request<Body>,
    next: Next,
) -> Response {
    gate(state, jar, req, next, GuardStrategy::RedirectToLogin).await
}

/// API-route guard: unauthenticated requests get a 401 JSON rejection
pub async fn api_guard(
    State(state): State<AppState>,
    jar: CookieJar,
    req: Request<Body>,
    next: Next,
) -> Response {
    gate(state, jar, req, next, GuardStrategy::RejectJson).await
}

async fn gate(
    state: AppState,
    jar: CookieJar,
    mut req: Request<Body>,
    next: Next,
    strategy: GuardStrategy,
) -> Response {
    let session = current_session(&state, &jar).await;

    if let Some((sid, data)) = &session {
        if let Some(user_id) = data.user_id {
            match state.accounts.users().find_by_id(user_id).await {
                Ok(Some(user)) => {
                    // Sliding expiry: saving refreshes the record's TTL
                    if let Err(err) = state.sessions.save(sid, data).await {
                        error!("failed to refresh session {}: {}", sid, err);
                    }
                    req.extensions_mut().insert(AuthSession {
                        sid: sid.clone(),
                        user,
                    });
                    return next.run(req).await;
                }
                Ok(None) => {
                    // Stale identity: the user record is gone
                }
                Err(err) => {
                    error!("failed to resolve session user: {}", err);
                    return AppError::Auth(err).into_response();
                }
            }
        }
    }

    match strategy {
        GuardStrategy::RejectJson => AppError::Unauthorized.into_response(),
        GuardStrategy::RedirectToLogin => {
            redirect_to_login(state, jar, session, req.uri().path()).await
        }
    }
}

async fn redirect_to_login(
    state: AppState,
    jar: CookieJar,
    session: Option<(String, SessionData)>,
    requested_path: &str,
) -> Response {
    // Record the originally requested path on the session, creating an
    // anonymous record when the request carried none.
    let (sid, mut data, fresh) = match session {
        Some((sid, data)) => (sid, data, false),
        None => (new_session_id(), SessionData::default(), true),
    };
    data.user_id = None;
    data.return_to = Some(requested_path.to_string());
    data.flash
        .push(Flash::error("You need to be authenticated to access this page"));

    if let Err(err) = state.sessions.save(&sid, &data).await {
        error!("failed to record return_to on session {}: {}", sid, err);
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    let redirect = Redirect::to("/login");
    if fresh {
        let jar = jar.add(session_cookie(&state.cookie_name, &sid));
        (jar, redirect).into_response()
    } else {
        redirect.into_response()
    }
}
