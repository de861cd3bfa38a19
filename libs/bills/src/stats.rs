//! Summary statistics over the bills visible to a user

use std::sync::Arc;

use chrono::{Months, NaiveDate};

use crate::error::BillResult;
use crate::models::{BillStatus, Stats, UserId};
use crate::store::{BillMatch, BillStore};

/// Length of the trailing window of the monthly expense series
pub const MONTHLY_WINDOW: Months = Months::new(6);

#[derive(Clone)]
pub struct StatsAggregator {
    bills: Arc<dyn BillStore>,
}

impl StatsAggregator {
    pub fn new(bills: Arc<dyn BillStore>) -> Self {
        Self { bills }
    }

    /// Totals, unpaid totals and the monthly series relative to `today`
    pub async fn summarize(&self, acting_user: UserId, today: NaiveDate) -> BillResult<Stats> {
        let visible = BillMatch::visible_to(acting_user);
        let unpaid = visible.clone().with_status(BillStatus::Pending);
        let recent = visible.clone().with_date_from(window_start(today));

        let (all, pending, monthly_expenses) = tokio::try_join!(
            self.bills.totals(&visible),
            self.bills.totals(&unpaid),
            self.bills.monthly_totals(&recent),
        )?;

        Ok(Stats {
            total_bills: all.count,
            unpaid_bills: pending.count,
            total_amount: all.sum,
            unpaid_amount: pending.sum,
            monthly_expenses,
        })
    }
}

/// First day included in the monthly series; the day is clamped at month end
pub fn window_start(today: NaiveDate) -> NaiveDate {
    today.checked_sub_months(MONTHLY_WINDOW).unwrap_or(NaiveDate::MIN)
}
