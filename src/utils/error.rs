use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// 單一掃描查詢失敗的原因，只影響該查詢本身
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    #[error("scanner '{query}' timed out after {elapsed:?}")]
    Timeout { query: String, elapsed: Duration },

    #[error("scanner '{query}' unavailable: {reason}")]
    Unavailable { query: String, reason: String },
}

impl SourceError {
    pub fn query(&self) -> &str {
        match self {
            SourceError::Timeout { query, .. } | SourceError::Unavailable { query, .. } => query,
        }
    }
}

/// 回應中的失敗掃描器紀錄
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceFailure {
    pub name: String,
    pub reason: String,
}

impl From<&SourceError> for SourceFailure {
    fn from(err: &SourceError) -> Self {
        Self {
            name: err.query().to_string(),
            reason: err.to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Eligibility list unavailable: {reason}")]
    EligibilityUnavailable { reason: String },

    #[error("All {} scanners failed: {}", .failures.len(), join_failures(.failures))]
    AllSourcesFailed { failures: Vec<SourceError> },

    #[error("Invalid configuration for '{field}' = '{value}': {reason}")]
    InvalidConfiguration {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing configuration field: {field}")]
    MissingConfigError { field: String },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

fn join_failures(failures: &[SourceError]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ScanError {
    pub fn invalid_config(field: &str, value: impl ToString, reason: impl Into<String>) -> Self {
        ScanError::InvalidConfiguration {
            field: field.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    /// 上游暫時不可用屬於可重試錯誤；配置錯誤必須在啟動時修正
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            ScanError::EligibilityUnavailable { .. } | ScanError::AllSourcesFailed { .. } => {
                ErrorSeverity::Medium
            }
            ScanError::HttpError(_) | ScanError::CsvError(_) | ScanError::SerializationError(_) => {
                ErrorSeverity::High
            }
            ScanError::InvalidConfiguration { .. }
            | ScanError::MissingConfigError { .. }
            | ScanError::ConfigError { .. }
            | ScanError::IoError(_) => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            ScanError::EligibilityUnavailable { .. } => {
                "The F&O list could not be loaded. Try again in a minute."
            }
            ScanError::AllSourcesFailed { .. } => {
                "No scanner answered. The screener may be down or the market may be closed."
            }
            ScanError::InvalidConfiguration { .. }
            | ScanError::MissingConfigError { .. }
            | ScanError::ConfigError { .. } => "Fix the configuration file and restart",
            ScanError::HttpError(_) => "Check network connectivity to the upstream provider",
            ScanError::CsvError(_) | ScanError::SerializationError(_) => {
                "The upstream payload format may have changed"
            }
            ScanError::IoError(_) => "Check file paths and permissions",
        }
    }

    /// 是否應以 503 回應（上游問題，而非服務本身的錯誤）
    pub fn is_upstream_unavailable(&self) -> bool {
        matches!(
            self,
            ScanError::EligibilityUnavailable { .. } | ScanError::AllSourcesFailed { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_sources_failed_lists_each_failure() {
        let err = ScanError::AllSourcesFailed {
            failures: vec![
                SourceError::Unavailable {
                    query: "volume_breakout".to_string(),
                    reason: "HTTP 500".to_string(),
                },
                SourceError::Timeout {
                    query: "rsi_momentum".to_string(),
                    elapsed: Duration::from_secs(20),
                },
            ],
        };

        let message = err.to_string();
        assert!(message.starts_with("All 2 scanners failed"));
        assert!(message.contains("volume_breakout"));
        assert!(message.contains("rsi_momentum"));
        assert!(err.is_upstream_unavailable());
    }

    #[test]
    fn test_config_errors_are_critical() {
        let err = ScanError::invalid_config("scoring.weights", 0.9, "weights must sum to 1.0");
        assert_eq!(err.severity(), ErrorSeverity::Critical);
        assert!(!err.is_upstream_unavailable());
    }

    #[test]
    fn test_source_failure_from_error() {
        let failure = SourceFailure::from(&SourceError::Unavailable {
            query: "ema_crossover".to_string(),
            reason: "connection refused".to_string(),
        });
        assert_eq!(failure.name, "ema_crossover");
        assert!(failure.reason.contains("connection refused"));
    }
}
