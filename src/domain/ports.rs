use crate::domain::model::{RawMatchRow, ScanQueryDefinition};
use crate::utils::error::{Result, SourceError};
use async_trait::async_trait;
use std::collections::HashSet;
use std::time::Duration;

#[async_trait]
pub trait Storage: Send + Sync {
    async fn read_file(&self, path: &str) -> Result<Vec<u8>>;
    async fn write_file(&self, path: &str, data: &[u8]) -> Result<()>;
}

/// F&O 名單的權威來源
#[async_trait]
pub trait EligibilityProvider: Send + Sync {
    async fn fetch_symbols(&self) -> Result<HashSet<String>>;
}

/// 單一掃描服務；每次呼叫要嘛回傳完整結果，要嘛整體失敗
#[async_trait]
pub trait ScanSource: Send + Sync {
    async fn fetch(
        &self,
        query: &ScanQueryDefinition,
        timeout: Duration,
    ) -> std::result::Result<Vec<RawMatchRow>, SourceError>;
}
