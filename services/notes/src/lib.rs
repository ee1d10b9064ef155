//! Notes application: pluggable note storage behind one asynchronous
//! contract, and session-based authentication gating the routes that
//! consume it.

pub mod account;
pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod oauth;
pub mod repositories;
pub mod routes;
pub mod session;
pub mod store;
pub mod validation;

use std::sync::Arc;

use crate::account::AccountService;
use crate::oauth::FacebookOAuth;
use crate::session::SessionStore;
use crate::store::{NoteEvents, NoteStore};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub notes: Arc<dyn NoteStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub accounts: AccountService,
    pub events: NoteEvents,
    pub oauth: Option<FacebookOAuth>,
    pub cookie_name: String,
}
