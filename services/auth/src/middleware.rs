//! Bearer token check for the account endpoints

use axum::{
    body::Body,
    extract::State,
    http::{Request, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use tracing::error;

use crate::{AppState, error::AuthError, jwt::TokenType, models::User};

/// Resolve the bearer token to a user and store it in the request extensions
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let token = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AuthError::Unauthorized("Access token required".to_string()))?
        .to_string();

    let claims = state.jwt_service.validate_token(&token).map_err(|e| {
        error!("Failed to validate token: {}", e);
        AuthError::Unauthorized("Invalid or expired token".to_string())
    })?;

    if claims.token_type != TokenType::Access {
        return Err(AuthError::Unauthorized("Invalid or expired token".to_string()));
    }

    let blacklisted = state
        .jwt_service
        .is_token_blacklisted(&state.redis_pool, &token)
        .await
        .map_err(|e| AuthError::internal("Failed to check if token is blacklisted", e))?;

    if blacklisted {
        return Err(AuthError::Unauthorized("Invalid or expired token".to_string()));
    }

    let user: User = state
        .user_repository
        .find_by_id(claims.sub)
        .await
        .map_err(|e| AuthError::internal("Failed to load user", e))?
        .ok_or_else(|| AuthError::Unauthorized("Invalid token".to_string()))?;

    req.extensions_mut().insert(user);

    Ok(next.run(req).await)
}
