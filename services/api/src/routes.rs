//! API service routes

use axum::{
    Extension, Json, Router,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::get,
};
use bills::models::{BillInput, BillPatch, ListParams};
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    middleware::{AuthUser, auth_middleware},
    state::AppState,
};

/// Upper bound on user search results
const USER_SEARCH_LIMIT: usize = 10;

/// Create the router for the API service
pub fn create_router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/api/users", get(get_users))
        .route("/api/users/search/:query", get(search_users))
        .route("/api/users/:id", get(get_user))
        .route("/api/bills", get(list_bills).post(create_bill))
        .route("/api/bills/stats/summary", get(get_stats))
        .route(
            "/api/bills/:id",
            get(get_bill).put(update_bill).delete(delete_bill),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .merge(protected_routes)
        .with_state(state)
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "api-service"
    }))
}

fn parse_id(raw: &str, what: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest(format!("Invalid {what} ID")))
}

/// List every user, for picking bill participants
pub async fn get_users(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let users = state.users.list_all().await.map_err(|e| {
        tracing::error!("Failed to get users: {}", e);
        ApiError::InternalServerError
    })?;

    Ok(Json(users))
}

/// Get a user by ID
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let id = parse_id(&id, "user")?;
    let user = state
        .users
        .find_by_id(id)
        .await
        .map_err(|e| {
            tracing::error!("Failed to get user: {}", e);
            ApiError::InternalServerError
        })?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    Ok(Json(user))
}

/// Search users by name or email
pub async fn search_users(
    State(state): State<AppState>,
    Path(query): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let users = state
        .users
        .search(query.trim(), USER_SEARCH_LIMIT)
        .await
        .map_err(|e| {
            tracing::error!("Failed to search users: {}", e);
            ApiError::InternalServerError
        })?;

    Ok(Json(users))
}

/// List the caller's visible bills with filters and pagination
pub async fn list_bills(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<ListParams>,
) -> ApiResult<impl IntoResponse> {
    let page = state.bills.list(&params, user.id).await?;
    Ok(Json(page))
}

/// Get a bill by ID
pub async fn get_bill(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let id = parse_id(&id, "bill")?;
    let bill = state.bills.get_by_id(id, user.id).await?;
    Ok(Json(bill))
}

/// Create a bill owned by the caller
pub async fn create_bill(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    payload: Result<Json<BillInput>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(payload) = payload?;
    let bill = state.bills.create(&payload, user.id).await?;
    Ok((StatusCode::CREATED, Json(bill)))
}

/// Update a bill; creator only
pub async fn update_bill(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    patch: Result<Json<BillPatch>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(patch) = patch?;
    let id = parse_id(&id, "bill")?;
    let bill = state.bills.update(id, &patch, user.id).await?;
    Ok(Json(bill))
}

/// Delete a bill; creator only
pub async fn delete_bill(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let id = parse_id(&id, "bill")?;
    state.bills.delete(id, user.id).await?;
    Ok(Json(json!({ "message": "Bill deleted successfully" })))
}

/// Totals and the monthly expense series for the caller
pub async fn get_stats(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<impl IntoResponse> {
    let stats = state.stats.summarize(user.id, Utc::now().date_naive()).await?;
    Ok(Json(stats))
}
