//! Router-level tests for the session gate and the notes API
//!
//! Built entirely on the in-process backends: memory note store, memory
//! session store, memory user repository.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode, header};
use serde_json::Value;
use tower::ServiceExt;

use notes::AppState;
use notes::account::{AccountService, LogMailer};
use notes::models::NewUser;
use notes::repositories::{MemoryUserRepository, UserRepository};
use notes::routes::create_router;
use notes::session::{MemorySessionStore, SessionStore};
use notes::store::{MemoryNoteStore, NoteEvents, compose};

const COOKIE_NAME: &str = "notes_sid";

struct TestApp {
    router: Router,
    users: Arc<dyn UserRepository>,
}

fn test_app() -> TestApp {
    let users: Arc<dyn UserRepository> = Arc::new(MemoryUserRepository::new());
    let sessions: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new(3600));
    let events = NoteEvents::new();
    let notes = compose(MemoryNoteStore::new(), Duration::from_secs(5), events.clone());

    let accounts = AccountService::new(
        users.clone(),
        sessions.clone(),
        Arc::new(LogMailer),
        3600,
        "http://localhost:3000".to_string(),
    );

    let state = AppState {
        notes,
        sessions,
        accounts,
        events,
        oauth: None,
        cookie_name: COOKIE_NAME.to_string(),
    };

    TestApp {
        router: create_router(state),
        users,
    }
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

fn form(method: &str, uri: &str, body: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn json(method: &str, uri: &str, body: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

/// Extract the session cookie pair from a Set-Cookie header
fn session_cookie(response: &Response<Body>) -> Option<String> {
    let raw = response.headers().get(header::SET_COOKIE)?.to_str().ok()?;
    let pair = raw.split(';').next()?;
    assert!(pair.starts_with(COOKIE_NAME));
    Some(pair.to_string())
}

async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn register(app: &TestApp, email: &str, password: &str) {
    app.users
        .create(&NewUser {
            email: email.to_string(),
            password: password.to_string(),
        })
        .await
        .unwrap();
}

/// Log in through the form endpoint and return the session cookie
async fn login(app: &TestApp, email: &str, password: &str) -> String {
    let body = format!("email={}&password={}", email, password);
    let response = app
        .router
        .clone()
        .oneshot(form("POST", "/login", &body, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    session_cookie(&response).expect("login must set the session cookie")
}

#[tokio::test]
async fn page_route_redirects_unauthenticated_to_login() {
    let app = test_app();

    let response = app.router.clone().oneshot(get("/notes", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/login");
    // A fresh anonymous session carries the recorded return_to
    assert!(session_cookie(&response).is_some());
}

#[tokio::test]
async fn api_route_rejects_unauthenticated_with_json_401() {
    let app = test_app();

    let response = app
        .router
        .clone()
        .oneshot(get("/api/v1/notes", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().get(header::LOCATION).is_none());
    let body = body_json(response).await;
    assert_eq!(body["success"], Value::Bool(false));
}

#[tokio::test]
async fn return_to_is_honored_after_login() {
    let app = test_app();
    register(&app, "zeus@olympus.gr", "thunderbolt!").await;

    // Hit a protected page first; the gate records the path
    let response = app
        .router
        .clone()
        .oneshot(get("/notes/view/some-key", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let anon_cookie = session_cookie(&response).unwrap();

    // The login page surfaces the gate's flash message
    let response = app
        .router
        .clone()
        .oneshot(get("/login", Some(&anon_cookie)))
        .await
        .unwrap();
    let page = body_json(response).await;
    assert_eq!(page["flash"][0]["level"], "error");

    // Logging in with the anonymous session redirects to the original path
    let body = "email=zeus@olympus.gr&password=thunderbolt!";
    let response = app
        .router
        .clone()
        .oneshot(form("POST", "/login", body, Some(&anon_cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/notes/view/some-key");
}

#[tokio::test]
async fn failed_login_records_flash_and_previous_attempt() {
    let app = test_app();
    register(&app, "zeus@olympus.gr", "thunderbolt!").await;

    let body = "email=zeus@olympus.gr&password=wrong-password";
    let response = app
        .router
        .clone()
        .oneshot(form("POST", "/login", body, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/login");
    let cookie = session_cookie(&response).unwrap();

    let response = app
        .router
        .clone()
        .oneshot(get("/login", Some(&cookie)))
        .await
        .unwrap();
    let page = body_json(response).await;
    assert_eq!(page["previous_login_attempt"], "zeus@olympus.gr");
    assert_eq!(page["flash"][0]["level"], "error");

    // Flash is one-shot: a second read comes back empty
    let response = app
        .router
        .clone()
        .oneshot(get("/login", Some(&cookie)))
        .await
        .unwrap();
    let page = body_json(response).await;
    assert_eq!(page["flash"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn authenticated_api_supports_full_note_lifecycle() {
    let app = test_app();
    register(&app, "zeus@olympus.gr", "thunderbolt!").await;
    let cookie = login(&app, "zeus@olympus.gr", "thunderbolt!").await;

    // Create
    let response = app
        .router
        .clone()
        .oneshot(json(
            "POST",
            "/api/v1/notes",
            r#"{"title":"Myth of Zeus","body":"Zeus is the Father..."}"#,
            Some(&cookie),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let note = body_json(response).await;
    let key = note["key"].as_str().unwrap().to_string();

    // Listed
    let response = app
        .router
        .clone()
        .oneshot(get("/api/v1/notes", Some(&cookie)))
        .await
        .unwrap();
    let list = body_json(response).await;
    assert_eq!(list["count"], 1);
    assert!(
        list["keys"]
            .as_array()
            .unwrap()
            .iter()
            .any(|k| k.as_str() == Some(key.as_str()))
    );

    // Update
    let response = app
        .router
        .clone()
        .oneshot(json(
            "PUT",
            &format!("/api/v1/notes/{}", key),
            r#"{"title":"Myth of Zeus","body":"revised body"}"#,
            Some(&cookie),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Read back
    let response = app
        .router
        .clone()
        .oneshot(get(&format!("/api/v1/notes/{}", key), Some(&cookie)))
        .await
        .unwrap();
    let note = body_json(response).await;
    assert_eq!(note["body"], "revised body");

    // Destroy, then read fails 404
    let response = app
        .router
        .clone()
        .oneshot(json(
            "DELETE",
            &format!("/api/v1/notes/{}", key),
            "",
            Some(&cookie),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .router
        .clone()
        .oneshot(get(&format!("/api/v1/notes/{}", key), Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_note_payload_fails_validation() {
    let app = test_app();
    register(&app, "zeus@olympus.gr", "thunderbolt!").await;
    let cookie = login(&app, "zeus@olympus.gr", "thunderbolt!").await;

    let response = app
        .router
        .clone()
        .oneshot(json(
            "POST",
            "/api/v1/notes",
            r#"{"title":"","body":""}"#,
            Some(&cookie),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    assert_eq!(body["fields"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn logout_invalidates_the_session() {
    let app = test_app();
    register(&app, "zeus@olympus.gr", "thunderbolt!").await;
    let cookie = login(&app, "zeus@olympus.gr", "thunderbolt!").await;

    let response = app
        .router
        .clone()
        .oneshot(get("/logout", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    // The old session id no longer authenticates
    let response = app
        .router
        .clone()
        .oneshot(get("/api/v1/notes", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn signup_logs_the_user_in() {
    let app = test_app();

    let body = "email=hera@olympus.gr&password=peacocks-and-pomegranates&password_confirm=peacocks-and-pomegranates";
    let response = app
        .router
        .clone()
        .oneshot(form("POST", "/signup", body, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/notes");
    let cookie = session_cookie(&response).unwrap();

    let response = app
        .router
        .clone()
        .oneshot(get("/api/v1/notes", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn duplicate_signup_redirects_back_with_flash() {
    let app = test_app();
    register(&app, "hera@olympus.gr", "already-here!").await;

    let body = "email=hera@olympus.gr&password=peacocks-and-pomegranates&password_confirm=peacocks-and-pomegranates";
    let response = app
        .router
        .clone()
        .oneshot(form("POST", "/signup", body, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/signup");
}

#[tokio::test]
async fn profile_requires_authentication_and_hides_the_hash() {
    let app = test_app();
    register(&app, "zeus@olympus.gr", "thunderbolt!").await;

    let response = app.router.clone().oneshot(get("/profile", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let cookie = login(&app, "zeus@olympus.gr", "thunderbolt!").await;
    let response = app
        .router
        .clone()
        .oneshot(get("/profile", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let profile = body_json(response).await;
    assert_eq!(profile["email"], "zeus@olympus.gr");
    assert!(profile.get("password_hash").is_none());
}

#[tokio::test]
async fn health_check_is_open() {
    let app = test_app();
    let response = app.router.clone().oneshot(get("/health", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
