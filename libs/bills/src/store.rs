//! Storage port for users and bills
//!
//! The repository and the statistics aggregator only talk to these traits.
//! `postgres` is the server backend; `local` keeps everything in one
//! namespaced key-value document, the way the browser-only variant of the
//! app keeps its state.

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::models::{Bill, BillId, BillStatus, Category, MonthlyExpense, User, UserId};

pub mod local;
pub mod postgres;

pub use local::LocalStore;
pub use postgres::PgStore;

/// Selection of bills, always scoped to what one user can see
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillMatch {
    pub visible_to: UserId,
    pub status: Option<BillStatus>,
    pub category: Option<Category>,
    /// Case-insensitive literal substring of title or description
    pub search: Option<String>,
    /// Inclusive lower bound on the bill date
    pub date_from: Option<NaiveDate>,
}

impl BillMatch {
    pub fn visible_to(user: UserId) -> Self {
        Self {
            visible_to: user,
            status: None,
            category: None,
            search: None,
            date_from: None,
        }
    }

    pub fn with_status(mut self, status: BillStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_date_from(mut self, date: NaiveDate) -> Self {
        self.date_from = Some(date);
        self
    }

    /// In-process evaluation, mirroring the SQL the postgres backend builds
    pub fn matches(&self, bill: &Bill) -> bool {
        if bill.created_by != self.visible_to && !bill.is_participant(self.visible_to) {
            return false;
        }
        if self.status.is_some_and(|status| bill.status != status) {
            return false;
        }
        if self.category.is_some_and(|category| bill.category != category) {
            return false;
        }
        if self.date_from.is_some_and(|from| bill.date < from) {
            return false;
        }
        match &self.search {
            Some(needle) => {
                let needle = needle.to_lowercase();
                bill.title.to_lowercase().contains(&needle)
                    || bill
                        .description
                        .as_deref()
                        .is_some_and(|d| d.to_lowercase().contains(&needle))
            }
            None => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub offset: u64,
    pub limit: u64,
}

/// Count and sum of a bill selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Totals {
    pub count: u64,
    pub sum: Decimal,
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>>;

    /// Users among `ids` that exist, in no particular order
    async fn find_by_ids(&self, ids: &[UserId]) -> Result<Vec<User>>;

    /// Every user, sorted by name
    async fn list_all(&self) -> Result<Vec<User>>;

    /// Case-insensitive substring match on name or email
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<User>>;

    async fn exists(&self, id: UserId) -> Result<bool> {
        Ok(self.find_by_id(id).await?.is_some())
    }
}

#[async_trait]
pub trait BillStore: Send + Sync {
    async fn insert(&self, bill: &Bill) -> Result<()>;

    async fn find_by_id(&self, id: BillId) -> Result<Option<Bill>>;

    /// One page of matching bills, newest created first, plus the total match count
    async fn find_page(&self, filter: &BillMatch, page: PageRequest) -> Result<(Vec<Bill>, u64)>;

    /// Replace the mutable fields of a stored bill and bump its revision.
    ///
    /// With `expected_revision` the write only happens if the stored revision
    /// still equals it. Returns the stored bill, or `None` when nothing was
    /// written.
    async fn update(&self, bill: &Bill, expected_revision: Option<i64>) -> Result<Option<Bill>>;

    async fn delete(&self, id: BillId) -> Result<bool>;

    async fn totals(&self, filter: &BillMatch) -> Result<Totals>;

    /// Amount sums grouped by (year, month) of the bill date, ascending
    async fn monthly_totals(&self, filter: &BillMatch) -> Result<Vec<MonthlyExpense>>;
}
