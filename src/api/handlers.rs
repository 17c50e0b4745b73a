use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use super::error::ApiError;
use super::state::AppState;
use crate::domain::model::ResultEnvelope;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub message: &'static str,
}

/// GET /：存活檢查
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        message: "Options scanner is alive",
    })
}

/// GET /analyze：執行所有掃描器並回傳排名後的 F&O 標的
pub async fn analyze(State(state): State<Arc<AppState>>) -> Result<Json<ResultEnvelope>, ApiError> {
    tracing::info!("📈 Analysis requested");
    let envelope = state.orchestrator.run().await?;
    Ok(Json(envelope))
}
