//! Domain models for users, bills and statistics

pub mod bill;
pub mod stats;
pub mod user;

pub use bill::{Bill, BillId, BillInput, BillPage, BillPatch, BillStatus, BillView, Category, ListParams};
pub use stats::{MonthlyExpense, Stats};
pub use user::{User, UserId, UserSummary};
