//! Summary figures derived from the bills a user can see

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Sum of bill amounts dated in one calendar month
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyExpense {
    pub year: i32,
    pub month: u32,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total_bills: u64,
    pub unpaid_bills: u64,
    pub total_amount: Decimal,
    pub unpaid_amount: Decimal,
    /// Oldest month first; months without bills are absent
    pub monthly_expenses: Vec<MonthlyExpense>,
}
