//! Authentication service routes

use axum::{
    Extension, Json, Router,
    extract::State,
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post, put},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    AppState,
    error::AuthError,
    jwt::TokenType,
    middleware::auth_middleware,
    models::{LoginRequest, RegisterRequest, UpdateProfile, User},
    repositories::is_unique_violation,
    validation::{normalize_email, validate_profile_update, validate_registration},
};

/// Issued tokens, with the account they belong to
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub user: User,
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: u64,
}

/// Body of refresh and logout
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

/// Create the router for the authentication service
pub fn create_router(state: AppState) -> Router {
    let account_routes = Router::new()
        .route("/auth/me", get(me))
        .route("/auth/profile", put(update_profile))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh_token))
        .route("/auth/logout", post(logout))
        .merge(account_routes)
        .with_state(state)
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "auth-service"
    }))
}

/// Sign both tokens and open a session for the user
async fn issue_tokens(state: &AppState, user: User) -> Result<TokenResponse, AuthError> {
    let access_token = state
        .jwt_service
        .generate_access_token(user.id)
        .map_err(|e| AuthError::internal("Failed to generate access token", e))?;

    let refresh_token = state
        .jwt_service
        .generate_refresh_token(user.id)
        .map_err(|e| AuthError::internal("Failed to generate refresh token", e))?;

    state
        .session_manager
        .store(user.id, &refresh_token)
        .await
        .map_err(|e| AuthError::internal("Failed to store session in Redis", e))?;

    Ok(TokenResponse {
        user,
        access_token,
        refresh_token,
        token_type: "Bearer".to_string(),
        expires_in: state.jwt_service.access_token_expiry(),
    })
}

/// Account registration endpoint
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let new_user = validate_registration(&payload).map_err(AuthError::Validation)?;

    let existing = state
        .user_repository
        .find_by_email(&new_user.email)
        .await
        .map_err(|e| AuthError::internal("Failed to look up email", e))?;
    if existing.is_some() {
        return Err(AuthError::Conflict("Email already registered".to_string()));
    }

    let user = state
        .user_repository
        .create(&new_user)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AuthError::Conflict("Email already registered".to_string())
            } else {
                AuthError::internal("Failed to create user", e)
            }
        })?;

    info!("Registered user: {}", user.id);

    let response = issue_tokens(&state, user).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// User login endpoint
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let email = normalize_email(&payload.email);
    if email.is_empty() || payload.password.is_empty() {
        return Err(AuthError::Validation(
            "Email and password are required".to_string(),
        ));
    }

    if !state.rate_limiter.is_allowed(&email).await {
        warn!("Login throttled for: {}", email);
        return Err(AuthError::TooManyRequests);
    }

    let invalid = || AuthError::Unauthorized("Invalid credentials".to_string());

    let user = state
        .user_repository
        .find_by_email(&email)
        .await
        .map_err(|e| AuthError::internal("Failed to look up user", e))?
        .ok_or_else(invalid)?;

    let verified = state
        .user_repository
        .verify_password(&user, &payload.password)
        .map_err(|e| AuthError::internal("Failed to verify password", e))?;
    if !verified {
        return Err(invalid());
    }

    state.rate_limiter.reset(&email).await;
    info!("User logged in: {}", user.id);

    let response = issue_tokens(&state, user).await?;
    Ok(Json(response))
}

/// Refresh token endpoint; rotates the refresh token
pub async fn refresh_token(
    State(state): State<AppState>,
    Json(payload): Json<RefreshTokenRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let rejected = || AuthError::Unauthorized("Invalid refresh token".to_string());

    let claims = state
        .jwt_service
        .validate_token(&payload.refresh_token)
        .map_err(|_| rejected())?;

    if claims.token_type != TokenType::Refresh {
        return Err(rejected());
    }

    let blacklisted = state
        .jwt_service
        .is_token_blacklisted(&state.redis_pool, &payload.refresh_token)
        .await
        .map_err(|e| AuthError::internal("Failed to check if token is blacklisted", e))?;

    let current = state
        .session_manager
        .is_valid(claims.sub, &payload.refresh_token)
        .await
        .map_err(|e| AuthError::internal("Failed to read session", e))?;

    if blacklisted || !current {
        return Err(rejected());
    }

    let user = state
        .user_repository
        .find_by_id(claims.sub)
        .await
        .map_err(|e| AuthError::internal("Failed to load user", e))?
        .ok_or_else(rejected)?;

    let access_token = state
        .jwt_service
        .generate_access_token(user.id)
        .map_err(|e| AuthError::internal("Failed to generate access token", e))?;

    let new_refresh_token = state
        .jwt_service
        .rotate_refresh_token(&state.redis_pool, user.id, &payload.refresh_token)
        .await
        .map_err(|e| AuthError::internal("Failed to rotate refresh token", e))?;

    state
        .session_manager
        .store(user.id, &new_refresh_token)
        .await
        .map_err(|e| AuthError::internal("Failed to update session in Redis", e))?;

    Ok(Json(TokenResponse {
        user,
        access_token,
        refresh_token: new_refresh_token,
        token_type: "Bearer".to_string(),
        expires_in: state.jwt_service.access_token_expiry(),
    }))
}

/// Logout endpoint; revokes the refresh token
pub async fn logout(
    State(state): State<AppState>,
    Json(payload): Json<RefreshTokenRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let claims = state
        .jwt_service
        .validate_token(&payload.refresh_token)
        .map_err(|_| AuthError::Unauthorized("Invalid refresh token".to_string()))?;

    if claims.token_type != TokenType::Refresh {
        return Err(AuthError::Unauthorized("Invalid refresh token".to_string()));
    }

    let expiry = claims
        .remaining_lifetime()
        .map_err(|e| AuthError::internal("Failed to get current time", e))?;

    state
        .jwt_service
        .blacklist_token(&state.redis_pool, &payload.refresh_token, expiry)
        .await
        .map_err(|e| AuthError::internal("Failed to blacklist token", e))?;

    state
        .session_manager
        .delete(claims.sub)
        .await
        .map_err(|e| AuthError::internal("Failed to remove session from Redis", e))?;

    info!("User logged out: {}", claims.sub);

    Ok(Json(json!({ "message": "Logged out successfully" })))
}

/// Current account
pub async fn me(Extension(user): Extension<User>) -> impl IntoResponse {
    Json(json!({ "user": user }))
}

/// Update name, email or avatar of the current account
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(payload): Json<UpdateProfile>,
) -> Result<impl IntoResponse, AuthError> {
    let update = validate_profile_update(&payload).map_err(AuthError::Validation)?;

    if let Some(email) = &update.email {
        ensure_email_free(&state, email, user.id).await?;
    }

    let updated = state
        .user_repository
        .update_profile(user.id, &update)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AuthError::Conflict("Email already in use".to_string())
            } else {
                AuthError::internal("Failed to update profile", e)
            }
        })?
        .ok_or_else(|| AuthError::NotFound("User not found".to_string()))?;

    Ok(Json(json!({
        "message": "Profile updated successfully",
        "user": updated,
    })))
}

async fn ensure_email_free(state: &AppState, email: &str, owner: Uuid) -> Result<(), AuthError> {
    let holder = state
        .user_repository
        .find_by_email(email)
        .await
        .map_err(|e| AuthError::internal("Failed to look up email", e))?;

    match holder {
        Some(other) if other.id != owner => {
            Err(AuthError::Conflict("Email already in use".to_string()))
        }
        _ => Ok(()),
    }
}
