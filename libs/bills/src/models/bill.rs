//! Bill aggregate and the payloads that create, change and list it

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use super::user::{UserId, UserSummary};

pub type BillId = Uuid;

/// Raised when a stored or submitted string names no known variant
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillStatus {
    #[default]
    Pending,
    Paid,
}

impl BillStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BillStatus::Pending => "pending",
            BillStatus::Paid => "paid",
        }
    }
}

impl FromStr for BillStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BillStatus::Pending),
            "paid" => Ok(BillStatus::Paid),
            other => Err(UnknownVariant {
                kind: "status",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for BillStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Utility the bill is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Gas,
    Electricity,
    Water,
    Internet,
    #[default]
    Other,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Gas => "gas",
            Category::Electricity => "electricity",
            Category::Water => "water",
            Category::Internet => "internet",
            Category::Other => "other",
        }
    }
}

impl FromStr for Category {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gas" => Ok(Category::Gas),
            "electricity" => Ok(Category::Electricity),
            "water" => Ok(Category::Water),
            "internet" => Ok(Category::Internet),
            "other" => Ok(Category::Other),
            other => Err(UnknownVariant {
                kind: "category",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A shared expense split evenly among its participants
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bill {
    pub id: BillId,
    pub title: String,
    pub amount: Decimal,
    pub description: Option<String>,
    pub date: NaiveDate,
    pub due_date: NaiveDate,
    pub status: BillStatus,
    pub category: Category,
    pub users: Vec<UserId>,
    pub created_by: UserId,
    /// Bumped by the store on every successful update
    pub revision: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Bill {
    /// Share of the amount owed by each participant.
    ///
    /// A bill without participants should never be persisted; if one shows up
    /// anyway the full amount is returned and the anomaly is logged.
    pub fn amount_per_person(&self) -> Decimal {
        if self.users.is_empty() {
            warn!(bill_id = %self.id, "Bill has no participants");
            return self.amount;
        }
        self.amount / Decimal::from(self.users.len())
    }

    pub fn is_participant(&self, user: UserId) -> bool {
        self.users.contains(&user)
    }
}

/// Bill creation payload as submitted by a client.
///
/// Fields stay loosely typed so that every problem can be reported at once
/// instead of failing on the first malformed value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillInput {
    pub title: Option<String>,
    pub amount: Option<serde_json::Value>,
    pub description: Option<String>,
    pub date: Option<String>,
    pub due_date: Option<String>,
    pub status: Option<String>,
    pub category: Option<String>,
    pub users: Option<Vec<String>>,
}

/// Partial bill update.
///
/// Identity and ownership fields are not part of the patch, so a client
/// sending `id` or `createdBy` has them silently dropped.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillPatch {
    pub title: Option<String>,
    pub amount: Option<serde_json::Value>,
    /// `Some(None)` clears the description
    #[serde(default, deserialize_with = "present")]
    pub description: Option<Option<String>>,
    pub date: Option<String>,
    pub due_date: Option<String>,
    pub status: Option<String>,
    pub category: Option<String>,
    pub users: Option<Vec<String>>,
    /// When set, the update only applies if the stored revision still matches
    pub expected_revision: Option<i64>,
}

fn present<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// Raw listing parameters from the query string
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListParams {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub status: Option<String>,
    pub category: Option<String>,
    pub search: Option<String>,
}

/// Bill with participants resolved for presentation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BillView {
    pub id: BillId,
    pub title: String,
    pub amount: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub date: NaiveDate,
    pub due_date: NaiveDate,
    pub status: BillStatus,
    pub category: Category,
    pub users: Vec<UserSummary>,
    pub created_by: Option<UserSummary>,
    pub amount_per_person: Decimal,
    pub revision: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BillPage {
    pub items: Vec<BillView>,
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub pages: u64,
}
