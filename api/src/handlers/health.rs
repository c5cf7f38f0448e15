use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::handlers::ErrorResponse;
use crate::state::AppState;

/// Health check endpoint: runs a trivial query through the pool
#[tracing::instrument(skip(state))]
pub async fn health_check(State(state): State<AppState>) -> Result<impl IntoResponse, ErrorResponse> {
    state.db_pool.health_check().await?;
    Ok((StatusCode::OK, Json(json!({ "status": "ok" }))))
}
