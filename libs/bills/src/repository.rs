//! Bill repository: validation, referential checks and access control
//! around the storage port

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::access::access_for;
use crate::error::{BillError, BillResult};
use crate::models::{
    Bill, BillId, BillInput, BillPage, BillPatch, BillView, ListParams, User, UserId, UserSummary,
};
use crate::store::{BillMatch, BillStore, PageRequest, UserDirectory};
use crate::validation::{ValidationErrors, validate_for_create, validate_for_update, validate_list_params};

/// Entry point for every read and write of bills
#[derive(Clone)]
pub struct BillRepository {
    bills: Arc<dyn BillStore>,
    users: Arc<dyn UserDirectory>,
}

impl BillRepository {
    pub fn new(bills: Arc<dyn BillStore>, users: Arc<dyn UserDirectory>) -> Self {
        Self { bills, users }
    }

    /// Create a bill owned by `acting_user`
    pub async fn create(&self, input: &BillInput, acting_user: UserId) -> BillResult<BillView> {
        let now = Utc::now();
        let new_bill = validate_for_create(input, now.date_naive())?;
        self.ensure_users_exist(&new_bill.users).await?;

        let bill = Bill {
            id: Uuid::new_v4(),
            title: new_bill.title,
            amount: new_bill.amount,
            description: new_bill.description,
            date: new_bill.date,
            due_date: new_bill.due_date,
            status: new_bill.status,
            category: new_bill.category,
            users: new_bill.users,
            created_by: acting_user,
            revision: 1,
            created_at: now,
            updated_at: now,
        };
        self.bills.insert(&bill).await?;
        info!(bill_id = %bill.id, created_by = %acting_user, "Bill created");

        self.resolve(bill).await
    }

    /// Fetch a bill the acting user created or participates in
    pub async fn get_by_id(&self, id: BillId, acting_user: UserId) -> BillResult<BillView> {
        let bill = self.load(id).await?;
        if !access_for(&bill, acting_user).can_read() {
            return Err(BillError::AccessDenied("Access denied".to_string()));
        }
        self.resolve(bill).await
    }

    /// One page of the acting user's visible bills, newest first
    pub async fn list(&self, params: &ListParams, acting_user: UserId) -> BillResult<BillPage> {
        let filter = validate_list_params(params)?;
        let selection = BillMatch {
            status: filter.status,
            category: filter.category,
            search: filter.search,
            ..BillMatch::visible_to(acting_user)
        };
        let page = PageRequest {
            offset: u64::from(filter.page - 1) * u64::from(filter.limit),
            limit: u64::from(filter.limit),
        };

        let (bills, total) = self.bills.find_page(&selection, page).await?;
        let items = self.resolve_many(bills).await?;

        Ok(BillPage {
            items,
            page: filter.page,
            limit: filter.limit,
            total,
            pages: total.div_ceil(u64::from(filter.limit)),
        })
    }

    /// Apply a patch; only the creator may do this
    pub async fn update(&self, id: BillId, patch: &BillPatch, acting_user: UserId) -> BillResult<BillView> {
        let existing = self.load(id).await?;
        if !access_for(&existing, acting_user).can_write() {
            return Err(BillError::AccessDenied(
                "Only the bill creator can edit this bill".to_string(),
            ));
        }
        if let Some(expected) = patch.expected_revision {
            if expected != existing.revision {
                return Err(stale_revision(id));
            }
        }

        let mut bill = validate_for_update(&existing, patch)?;
        if patch.users.is_some() {
            self.ensure_users_exist(&bill.users).await?;
        }
        bill.updated_at = Utc::now();

        let stored = match self.bills.update(&bill, patch.expected_revision).await? {
            Some(stored) => stored,
            None if patch.expected_revision.is_some() => return Err(stale_revision(id)),
            None => return Err(bill_not_found()),
        };
        info!(bill_id = %id, revision = stored.revision, "Bill updated");

        self.resolve(stored).await
    }

    /// Hard-delete a bill; only the creator may do this
    pub async fn delete(&self, id: BillId, acting_user: UserId) -> BillResult<()> {
        let existing = self.load(id).await?;
        if !access_for(&existing, acting_user).can_write() {
            return Err(BillError::AccessDenied(
                "Only the bill creator can delete this bill".to_string(),
            ));
        }

        if !self.bills.delete(id).await? {
            return Err(bill_not_found());
        }
        info!(bill_id = %id, "Bill deleted");
        Ok(())
    }

    async fn load(&self, id: BillId) -> BillResult<Bill> {
        self.bills.find_by_id(id).await?.ok_or_else(bill_not_found)
    }

    async fn ensure_users_exist(&self, ids: &[UserId]) -> BillResult<()> {
        let found = self.users.find_by_ids(ids).await?;
        if found.len() != ids.len() {
            return Err(ValidationErrors::single("users", "One or more users not found").into());
        }
        Ok(())
    }

    async fn resolve(&self, bill: Bill) -> BillResult<BillView> {
        let mut views = self.resolve_many(vec![bill]).await?;
        Ok(views.remove(0))
    }

    /// Attach user records with a single directory lookup for the whole batch
    async fn resolve_many(&self, bills: Vec<Bill>) -> BillResult<Vec<BillView>> {
        let mut ids: Vec<UserId> = Vec::new();
        for bill in &bills {
            for id in bill.users.iter().chain(std::iter::once(&bill.created_by)) {
                if !ids.contains(id) {
                    ids.push(*id);
                }
            }
        }

        let directory: HashMap<UserId, User> = if ids.is_empty() {
            HashMap::new()
        } else {
            self.users
                .find_by_ids(&ids)
                .await?
                .into_iter()
                .map(|u| (u.id, u))
                .collect()
        };

        Ok(bills.into_iter().map(|bill| view(bill, &directory)).collect())
    }
}

fn view(bill: Bill, directory: &HashMap<UserId, User>) -> BillView {
    let users: Vec<UserSummary> = bill
        .users
        .iter()
        .filter_map(|id| directory.get(id).map(UserSummary::from))
        .collect();
    if users.len() != bill.users.len() {
        warn!(bill_id = %bill.id, "Bill references participants that no longer exist");
    }

    BillView {
        amount_per_person: bill.amount_per_person(),
        id: bill.id,
        title: bill.title,
        amount: bill.amount,
        description: bill.description,
        date: bill.date,
        due_date: bill.due_date,
        status: bill.status,
        category: bill.category,
        users,
        created_by: directory.get(&bill.created_by).map(UserSummary::from),
        revision: bill.revision,
        created_at: bill.created_at,
        updated_at: bill.updated_at,
    }
}

fn bill_not_found() -> BillError {
    BillError::NotFound("Bill not found".to_string())
}

fn stale_revision(id: BillId) -> BillError {
    BillError::Conflict(format!("Bill {id} was modified by another request"))
}
