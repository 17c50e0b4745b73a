mod error;
mod handlers;
mod state;

pub use error::ApiError;
pub use state::AppState;

use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// `GET /` 健康檢查、`GET /analyze` 執行一次掃描
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::health))
        .route("/analyze", get(handlers::analyze))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
