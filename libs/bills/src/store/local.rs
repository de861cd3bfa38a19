//! Single-process store keeping users and bills under one namespace key
//!
//! State lives in memory behind a lock. When opened with a path, every
//! mutation rewrites a JSON document of the form `{"splitbill": {...}}`,
//! so the data survives restarts without a database.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Datelike, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::{BillMatch, BillStore, PageRequest, Totals, UserDirectory};
use crate::models::{Bill, BillId, MonthlyExpense, User, UserId};

pub const NAMESPACE: &str = "splitbill";

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    users: Vec<User>,
    bills: Vec<Bill>,
}

/// Directory entry read from a users seed file
#[derive(Debug, Clone, Deserialize)]
pub struct UserSeed {
    pub id: UserId,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub avatar: Option<String>,
}

#[derive(Debug, Default)]
struct LocalState {
    users: HashMap<UserId, User>,
    bills: HashMap<BillId, Bill>,
}

impl LocalState {
    fn snapshot(&self) -> Snapshot {
        Snapshot {
            users: self.users.values().cloned().collect(),
            bills: self.bills.values().cloned().collect(),
        }
    }

    fn email_taken(&self, email: &str, except: UserId) -> bool {
        self.users
            .values()
            .any(|u| u.id != except && u.email.eq_ignore_ascii_case(email))
    }

    fn matching<'a>(&'a self, filter: &'a BillMatch) -> impl Iterator<Item = &'a Bill> + 'a {
        self.bills.values().filter(move |bill| filter.matches(bill))
    }
}

#[derive(Debug, Default)]
pub struct LocalStore {
    state: RwLock<LocalState>,
    snapshot_path: Option<PathBuf>,
}

impl LocalStore {
    /// Purely in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store backed by a JSON file, loading it if it already exists
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut state = LocalState::default();

        if tokio::fs::try_exists(&path).await? {
            let raw = tokio::fs::read(&path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let mut namespaces: BTreeMap<String, Snapshot> = serde_json::from_slice(&raw)
                .with_context(|| format!("Malformed store file {}", path.display()))?;
            let snapshot = namespaces.remove(NAMESPACE).unwrap_or_default();

            state.users = snapshot.users.into_iter().map(|u| (u.id, u)).collect();
            state.bills = snapshot.bills.into_iter().map(|b| (b.id, b)).collect();
            info!(
                users = state.users.len(),
                bills = state.bills.len(),
                "Loaded local store from {}",
                path.display()
            );
        }

        Ok(Self {
            state: RwLock::new(state),
            snapshot_path: Some(path),
        })
    }

    /// Register a user directly; the local variant has no separate auth backend
    pub async fn insert_user(&self, user: User) -> Result<()> {
        let mut state = self.state.write().await;
        if state.email_taken(&user.email, user.id) {
            anyhow::bail!("Email {} is already registered", user.email);
        }
        let id = user.id;
        let previous = state.users.insert(id, user);
        self.commit(&mut state, move |state| match previous {
            Some(previous) => {
                state.users.insert(id, previous);
            }
            None => {
                state.users.remove(&id);
            }
        })
        .await
    }

    /// Add the users listed in a JSON array file, skipping ids already known
    ///
    /// Bearer tokens name users by id, so the seed ids must match the ones
    /// the token issuer uses. Returns how many users were added.
    pub async fn seed_users_from(&self, path: &Path) -> Result<usize> {
        let raw = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read users seed {}", path.display()))?;
        let seeds: Vec<UserSeed> = serde_json::from_slice(&raw)
            .with_context(|| format!("Malformed users seed {}", path.display()))?;
        self.seed_users(seeds).await
    }

    /// Add users in one write; either all new users land or none do
    pub async fn seed_users(&self, seeds: Vec<UserSeed>) -> Result<usize> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let mut added = Vec::new();

        for seed in seeds {
            if state.users.contains_key(&seed.id) {
                debug!(user_id = %seed.id, "Seed user already present");
                continue;
            }
            if state.email_taken(&seed.email, seed.id) {
                for id in &added {
                    state.users.remove(id);
                }
                anyhow::bail!("Email {} is already registered", seed.email);
            }
            added.push(seed.id);
            state.users.insert(
                seed.id,
                User {
                    id: seed.id,
                    name: seed.name,
                    email: seed.email,
                    avatar: seed.avatar,
                    created_at: now,
                    updated_at: now,
                },
            );
        }

        if added.is_empty() {
            return Ok(0);
        }

        let count = added.len();
        self.commit(&mut state, move |state| {
            for id in &added {
                state.users.remove(id);
            }
        })
        .await?;
        info!(users = count, "Seeded local user directory");
        Ok(count)
    }

    /// Persist a change already applied to `state`, undoing it if the write fails
    async fn commit(
        &self,
        state: &mut LocalState,
        undo: impl FnOnce(&mut LocalState) + Send,
    ) -> Result<()> {
        if let Err(err) = self.persist(state).await {
            warn!("Rolling back local store change: {:#}", err);
            undo(state);
            return Err(err);
        }
        Ok(())
    }

    async fn persist(&self, state: &LocalState) -> Result<()> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };

        let mut namespaces = BTreeMap::new();
        namespaces.insert(NAMESPACE, state.snapshot());
        let raw = serde_json::to_vec_pretty(&namespaces)?;
        tokio::fs::write(path, raw)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        debug!("Local store written to {}", path.display());
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for LocalStore {
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn find_by_ids(&self, ids: &[UserId]) -> Result<Vec<User>> {
        let state = self.state.read().await;
        let mut seen = Vec::with_capacity(ids.len());
        let mut users = Vec::with_capacity(ids.len());
        for id in ids {
            if seen.contains(id) {
                continue;
            }
            seen.push(*id);
            if let Some(user) = state.users.get(id) {
                users.push(user.clone());
            }
        }
        Ok(users)
    }

    async fn list_all(&self) -> Result<Vec<User>> {
        let mut users: Vec<User> = self.state.read().await.users.values().cloned().collect();
        users.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(users)
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<User>> {
        let needle = query.to_lowercase();
        let mut users: Vec<User> = self
            .list_all()
            .await?
            .into_iter()
            .filter(|u| {
                u.name.to_lowercase().contains(&needle) || u.email.to_lowercase().contains(&needle)
            })
            .collect();
        users.truncate(limit);
        Ok(users)
    }
}

#[async_trait]
impl BillStore for LocalStore {
    async fn insert(&self, bill: &Bill) -> Result<()> {
        let mut state = self.state.write().await;
        if state.bills.contains_key(&bill.id) {
            anyhow::bail!("Bill {} already exists", bill.id);
        }
        state.bills.insert(bill.id, bill.clone());
        let id = bill.id;
        self.commit(&mut state, move |state| {
            state.bills.remove(&id);
        })
        .await
    }

    async fn find_by_id(&self, id: BillId) -> Result<Option<Bill>> {
        Ok(self.state.read().await.bills.get(&id).cloned())
    }

    async fn find_page(&self, filter: &BillMatch, page: PageRequest) -> Result<(Vec<Bill>, u64)> {
        let state = self.state.read().await;
        let mut bills: Vec<&Bill> = state.matching(filter).collect();
        bills.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total = bills.len() as u64;
        let items = bills
            .into_iter()
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .cloned()
            .collect();
        Ok((items, total))
    }

    async fn update(&self, bill: &Bill, expected_revision: Option<i64>) -> Result<Option<Bill>> {
        let mut state = self.state.write().await;
        let Some(stored) = state.bills.get_mut(&bill.id) else {
            return Ok(None);
        };
        if expected_revision.is_some_and(|expected| expected != stored.revision) {
            return Ok(None);
        }

        let updated = Bill {
            id: stored.id,
            created_by: stored.created_by,
            created_at: stored.created_at,
            revision: stored.revision + 1,
            ..bill.clone()
        };
        let previous = std::mem::replace(stored, updated.clone());

        self.commit(&mut state, move |state| {
            state.bills.insert(previous.id, previous);
        })
        .await?;
        Ok(Some(updated))
    }

    async fn delete(&self, id: BillId) -> Result<bool> {
        let mut state = self.state.write().await;
        let Some(removed) = state.bills.remove(&id) else {
            return Ok(false);
        };
        self.commit(&mut state, move |state| {
            state.bills.insert(removed.id, removed);
        })
        .await?;
        Ok(true)
    }

    async fn totals(&self, filter: &BillMatch) -> Result<Totals> {
        let state = self.state.read().await;
        Ok(state.matching(filter).fold(Totals::default(), |acc, bill| Totals {
            count: acc.count + 1,
            sum: acc.sum + bill.amount,
        }))
    }

    async fn monthly_totals(&self, filter: &BillMatch) -> Result<Vec<MonthlyExpense>> {
        let state = self.state.read().await;
        let mut months: BTreeMap<(i32, u32), Decimal> = BTreeMap::new();
        for bill in state.matching(filter) {
            *months.entry((bill.date.year(), bill.date.month())).or_default() += bill.amount;
        }
        Ok(months
            .into_iter()
            .map(|((year, month), amount)| MonthlyExpense {
                year,
                month,
                amount,
            })
            .collect())
    }
}
