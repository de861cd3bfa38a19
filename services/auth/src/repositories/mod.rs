//! Database repositories

pub mod user;

pub use user::{UserRepository, is_unique_violation};
