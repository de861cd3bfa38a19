//! Shared infrastructure for the split-bill services
//!
//! This crate provides the pieces every service needs regardless of what it
//! serves: PostgreSQL pooling and migrations, the Redis client used for token
//! bookkeeping, typed infrastructure errors and tracing setup.

pub mod cache;
pub mod database;
pub mod error;
pub mod telemetry;
