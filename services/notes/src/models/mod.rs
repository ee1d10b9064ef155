//! Data models for the notes application

pub mod note;
pub mod user;

pub use note::{Note, NoteDraft};
pub use user::{Credentials, NewUser, ProfileUpdate, User};
