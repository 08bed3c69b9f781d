use crate::AppState;
use axum::{Json, extract::State, response::IntoResponse};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub staging: String,
    pub pending_uploads: usize,
    pub version: String,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "System health status", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let staging_status = match tokio::fs::metadata(state.store.staging_dir()).await {
        Ok(meta) if meta.is_dir() => "ready",
        _ => "missing",
    };

    Json(HealthResponse {
        status: "ok".to_string(),
        staging: staging_status.to_string(),
        pending_uploads: state.store.stats().active,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
