//! Bill splitting core
//!
//! Bills carry an amount shared evenly among participant users. The creator
//! of a bill owns it; participants can read it. This crate validates bill
//! input, enforces that policy on every repository operation and derives
//! summary statistics, independent of the storage backend behind it.

pub mod access;
pub mod error;
pub mod models;
pub mod repository;
pub mod stats;
pub mod store;
pub mod validation;

pub use access::{Access, access_for};
pub use error::{BillError, BillResult};
pub use repository::BillRepository;
pub use stats::StatsAggregator;
