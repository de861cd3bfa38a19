//! Application state shared across handlers

use std::sync::Arc;

use anyhow::Result;
use bills::store::{BillStore, LocalStore, PgStore, UserDirectory};
use bills::{BillRepository, StatsAggregator};
use common::database::{DatabaseConfig, health_check, init_pool, run_migrations};
use tracing::{info, warn};

use crate::config::{ServerConfig, StorageBackend};
use crate::middleware::TokenVerifier;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub bills: BillRepository,
    pub stats: StatsAggregator,
    pub users: Arc<dyn UserDirectory>,
    pub verifier: Arc<TokenVerifier>,
}

impl AppState {
    pub fn new(
        bill_store: Arc<dyn BillStore>,
        users: Arc<dyn UserDirectory>,
        verifier: TokenVerifier,
    ) -> Self {
        Self {
            bills: BillRepository::new(bill_store.clone(), users.clone()),
            stats: StatsAggregator::new(bill_store),
            users,
            verifier: Arc::new(verifier),
        }
    }

    /// Wire up the configured storage backend
    pub async fn from_config(config: &ServerConfig, verifier: TokenVerifier) -> Result<Self> {
        match config.storage {
            StorageBackend::Postgres => {
                let db_config = DatabaseConfig::from_env()?;
                let pool = init_pool(&db_config).await?;
                health_check(&pool).await?;
                run_migrations(&pool).await?;
                info!("Using PostgreSQL storage");

                let store = Arc::new(PgStore::new(pool));
                Ok(Self::new(store.clone(), store, verifier))
            }
            StorageBackend::Local => {
                let store = match &config.local_store_path {
                    Some(path) => Arc::new(LocalStore::open(path).await?),
                    None => Arc::new(LocalStore::new()),
                };
                match &config.local_users_path {
                    Some(path) => {
                        let added = store.seed_users_from(path).await?;
                        info!(added, "Loaded users seed from {}", path.display());
                    }
                    None => warn!("No users seed configured; only users already in the snapshot can sign in"),
                }
                info!(
                    snapshot = ?config.local_store_path,
                    "Using local storage"
                );
                Ok(Self::new(store.clone(), store, verifier))
            }
        }
    }
}
