use anyhow::Result;
use tracing::info;

mod error;
mod jwt;
mod middleware;
mod models;
mod rate_limiter;
mod repositories;
mod routes;
mod session;
mod validation;

use common::{
    cache::{RedisConfig, RedisPool},
    database::{self, DatabaseConfig},
};

use crate::{
    jwt::{JwtConfig, JwtService},
    rate_limiter::{RateLimiter, RateLimiterConfig},
    repositories::UserRepository,
    session::SessionManager,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub redis_pool: RedisPool,
    pub jwt_service: JwtService,
    pub user_repository: UserRepository,
    pub rate_limiter: RateLimiter,
    pub session_manager: SessionManager,
}

#[tokio::main]
async fn main() -> Result<()> {
    common::telemetry::init_tracing("auth-service");

    info!("Starting authentication service");

    let db_config = DatabaseConfig::from_env()?;
    let pool = database::init_pool(&db_config).await?;

    if !database::health_check(&pool).await? {
        anyhow::bail!("Failed to connect to database");
    }
    database::run_migrations(&pool).await?;

    let jwt_service = JwtService::new(JwtConfig::from_env()?)?;

    let redis_pool = RedisPool::new(&RedisConfig::from_env()?).await?;
    let session_manager =
        SessionManager::new(redis_pool.clone(), jwt_service.refresh_token_expiry());

    let app_state = AppState {
        redis_pool,
        jwt_service,
        user_repository: UserRepository::new(pool),
        rate_limiter: RateLimiter::new(RateLimiterConfig::default()),
        session_manager,
    };

    info!("Authentication service initialized successfully");

    let app = routes::create_router(app_state);

    let bind_address =
        std::env::var("AUTH_BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    info!("Authentication service listening on {}", bind_address);

    axum::serve(listener, app).await?;

    Ok(())
}
