use anyhow::Result;
use tracing::info;

mod config;
mod error;
mod middleware;
mod routes;
mod state;

use crate::{
    config::ServerConfig,
    middleware::{JwtConfig, TokenVerifier},
    state::AppState,
};

#[tokio::main]
async fn main() -> Result<()> {
    common::telemetry::init_tracing("api-service");

    info!("Starting API service");

    let server_config = ServerConfig::from_env()?;
    let verifier = TokenVerifier::new(&JwtConfig::from_env()?)?;
    let app_state = AppState::from_config(&server_config, verifier).await?;

    info!("API service initialized successfully");

    let app = routes::create_router(app_state);

    let listener = tokio::net::TcpListener::bind(&server_config.bind_address).await?;
    info!("API service listening on {}", server_config.bind_address);

    axum::serve(listener, app).await?;

    Ok(())
}
