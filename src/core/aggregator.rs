//! 掃描結果彙整
//!
//! 對所有查詢並行呼叫 [`ScanSource`]，等待全部結束（成功、失敗或逾時）後
//! 依查詢順序合併成以 symbol 為鍵的候選集合，再套用 F&O 與價格篩選。

use crate::domain::model::{Candidate, EligibilitySnapshot, RawMatchRow, ScanQueryDefinition};
use crate::domain::ports::ScanSource;
use crate::utils::error::{Result, ScanError, SourceError};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// 含端點的價格區間 [min, max]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceRange {
    pub min: f64,
    pub max: f64,
}

impl PriceRange {
    pub fn new(min: f64, max: f64) -> Result<Self> {
        if !min.is_finite() || !max.is_finite() {
            return Err(ScanError::invalid_config(
                "filter",
                format!("[{}, {}]", min, max),
                "Price bounds must be finite numbers",
            ));
        }
        if min < 0.0 || min > max {
            return Err(ScanError::invalid_config(
                "filter",
                format!("[{}, {}]", min, max),
                "Price bounds must satisfy 0 <= min_price <= max_price",
            ));
        }
        Ok(Self { min, max })
    }

    pub fn contains(&self, price: f64) -> bool {
        self.min <= price && price <= self.max
    }
}

/// 扇出結果：成功查詢的原始列（依查詢順序）與失敗清單
#[derive(Debug, Clone)]
pub struct Fetched {
    pub rows: Vec<(String, Vec<RawMatchRow>)>,
    pub failures: Vec<SourceError>,
}

#[derive(Debug, Clone)]
pub struct Collected {
    /// 通過篩選的候選
    pub candidates: Vec<Candidate>,
    /// 篩選前的不重複代號數
    pub scanned_count: usize,
    /// 失敗的查詢，依查詢順序
    pub failures: Vec<SourceError>,
}

pub struct Aggregator {
    source: Arc<dyn ScanSource>,
    per_source_timeout: Duration,
    fetch_deadline: Duration,
}

impl Aggregator {
    pub fn new(source: Arc<dyn ScanSource>, per_source_timeout: Duration, fetch_deadline: Duration) -> Self {
        Self {
            source,
            per_source_timeout,
            fetch_deadline,
        }
    }

    pub async fn collect(
        &self,
        queries: &[ScanQueryDefinition],
        eligibility: &EligibilitySnapshot,
        price_range: &PriceRange,
    ) -> Result<Collected> {
        let fetched = self.fetch_all(queries).await?;
        Ok(merge_and_filter(fetched, eligibility, price_range))
    }

    /// 扇出並等待所有查詢結束；全部失敗時回傳 `AllSourcesFailed`
    pub async fn fetch_all(&self, queries: &[ScanQueryDefinition]) -> Result<Fetched> {
        let outcomes = self.fan_out(queries).await;

        let mut rows = Vec::new();
        let mut failures = Vec::new();
        for (query, outcome) in queries.iter().zip(outcomes) {
            match outcome {
                Ok(matched) => {
                    tracing::info!("🔎 Scanner '{}': found {} stocks", query.name, matched.len());
                    rows.push((query.name.clone(), matched));
                }
                Err(e) => {
                    tracing::warn!("⚠️ {}", e);
                    failures.push(e);
                }
            }
        }

        if rows.is_empty() {
            return Err(ScanError::AllSourcesFailed { failures });
        }

        Ok(Fetched { rows, failures })
    }

    /// 並行執行所有查詢；回傳結果順序與 `queries` 相同
    async fn fan_out(
        &self,
        queries: &[ScanQueryDefinition],
    ) -> Vec<std::result::Result<Vec<RawMatchRow>, SourceError>> {
        let deadline = far_enough(Instant::now(), self.fetch_deadline);

        let fetches = queries.iter().map(|query| {
            let source = Arc::clone(&self.source);
            let per_source_timeout = self.per_source_timeout;
            async move {
                let started = Instant::now();
                let cutoff = far_enough(started, per_source_timeout).min(deadline);
                match tokio::time::timeout_at(cutoff, source.fetch(query, per_source_timeout)).await {
                    Ok(result) => result,
                    // 逾時之後的結果一律丟棄
                    Err(_) => Err(SourceError::Timeout {
                        query: query.name.clone(),
                        elapsed: started.elapsed(),
                    }),
                }
            }
        });

        join_all(fetches).await
    }
}

/// 超過時鐘可表示範圍的期限視為約三十年後
fn far_enough(from: Instant, after: Duration) -> Instant {
    from.checked_add(after)
        .unwrap_or_else(|| from + Duration::from_secs(86_400 * 365 * 30))
}

pub fn merge_and_filter(
    fetched: Fetched,
    eligibility: &EligibilitySnapshot,
    price_range: &PriceRange,
) -> Collected {
    let merged = merge_rows(fetched.rows);
    let scanned_count = merged.len();
    tracing::info!("🧮 Aggregated {} unique stocks across all scanners", scanned_count);

    let candidates = apply_filters(merged, eligibility, price_range);
    tracing::info!(
        "✅ F&O filter: kept {}, removed {}",
        candidates.len(),
        scanned_count - candidates.len()
    );

    Collected {
        candidates,
        scanned_count,
        failures: fetched.failures,
    }
}

/// 依傳入順序合併；同一代號保留第一次出現的數值，並累積命中的查詢名稱
pub fn merge_rows<S, I>(results: I) -> Vec<Candidate>
where
    S: AsRef<str>,
    I: IntoIterator<Item = (S, Vec<RawMatchRow>)>,
{
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut candidates: Vec<Candidate> = Vec::new();

    for (query, rows) in results {
        let query = query.as_ref();
        for row in rows {
            match index.get(&row.symbol) {
                Some(&i) => candidates[i].record_hit(query),
                None => {
                    index.insert(row.symbol.clone(), candidates.len());
                    candidates.push(Candidate::from_row(&row, query));
                }
            }
        }
    }

    candidates
}

pub fn apply_filters(
    candidates: Vec<Candidate>,
    eligibility: &EligibilitySnapshot,
    price_range: &PriceRange,
) -> Vec<Candidate> {
    candidates
        .into_iter()
        .filter(|c| eligibility.contains(&c.symbol))
        .filter(|c| price_range.contains(c.price))
        .collect()
}
