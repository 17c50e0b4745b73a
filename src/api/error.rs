use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::utils::error::ScanError;

/// API 層錯誤，決定回應的 HTTP 狀態碼
#[derive(Debug)]
pub enum ApiError {
    /// 503：F&O 名單載入失敗且沒有舊名單可用
    EligibilityUnavailable(String),

    /// 503：所有掃描器都失敗或逾時
    AllSourcesFailed(String),

    /// 500：其他錯誤
    Internal(String),
}

/// JSON 錯誤回應
#[derive(Serialize)]
struct ErrorBody {
    error: String,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            ApiError::EligibilityUnavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "eligibility_unavailable", msg)
            }
            ApiError::AllSourcesFailed(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "all_sources_failed", msg)
            }
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg),
        };

        let body = ErrorBody {
            error: error_type.into(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

impl From<ScanError> for ApiError {
    fn from(err: ScanError) -> Self {
        // 上游暫時不可用只記警告，服務本身的錯誤才記 error
        if err.is_upstream_unavailable() {
            tracing::warn!("⚠️ Analysis unavailable: {} ({:?})", err, err.severity());
        } else {
            tracing::error!("❌ Analysis failed: {} ({:?})", err, err.severity());
        }
        tracing::info!("💡 Recovery suggestion: {}", err.recovery_suggestion());

        match err {
            ScanError::EligibilityUnavailable { .. } => ApiError::EligibilityUnavailable(err.to_string()),
            ScanError::AllSourcesFailed { .. } => ApiError::AllSourcesFailed(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}
