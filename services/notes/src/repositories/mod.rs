//! Repositories for user records

pub mod memory;
pub mod user;

pub use memory::MemoryUserRepository;
pub use user::{PgUserRepository, UserRepository, hash_password, verify_password};
