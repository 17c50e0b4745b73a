use crate::utils::error::SourceFailure;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// 一個具名的掃描條件，載入後不可變
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanQueryDefinition {
    pub name: String,
    pub clause: String,
}

impl ScanQueryDefinition {
    pub fn new(name: impl Into<String>, clause: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            clause: clause.into(),
        }
    }
}

/// 掃描來源回傳的單列結果，已在來源邊界驗證過
#[derive(Debug, Clone, PartialEq)]
pub struct RawMatchRow {
    pub symbol: String,
    pub price: f64,
    pub change_pct: f64,
    pub volume_ratio: f64,
}

/// 某一時間點的 F&O 可交易標的集合
#[derive(Debug, Clone)]
pub struct EligibilitySnapshot {
    pub symbols: Arc<HashSet<String>>,
    pub fetched_at: DateTime<Utc>,
    /// 上游刷新失敗、改用舊資料時為 true
    pub stale: bool,
}

impl EligibilitySnapshot {
    pub fn contains(&self, symbol: &str) -> bool {
        self.symbols.contains(symbol)
    }
}

/// 合併後的候選標的，以 symbol 為鍵
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub symbol: String,
    pub price: f64,
    pub change_pct: f64,
    pub volume_ratio: f64,
    /// 命中此標的的查詢名稱，不重複，依首次命中順序
    pub scanners_hit: Vec<String>,
}

impl Candidate {
    pub fn from_row(row: &RawMatchRow, query: &str) -> Self {
        Self {
            symbol: row.symbol.clone(),
            price: row.price,
            change_pct: row.change_pct,
            volume_ratio: row.volume_ratio,
            scanners_hit: vec![query.to_string()],
        }
    }

    pub fn record_hit(&mut self, query: &str) {
        if !self.scanners_hit.iter().any(|q| q == query) {
            self.scanners_hit.push(query.to_string());
        }
    }

    pub fn breadth(&self) -> usize {
        self.scanners_hit.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StrategyHint {
    #[serde(rename = "Bullish: consider ATM/OTM Call (CE)")]
    Bullish,
    #[serde(rename = "Bearish: consider ATM/OTM Put (PE)")]
    Bearish,
    #[serde(rename = "Neutral: watch price action; Straddle if IV is low")]
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedResult {
    pub rank: usize,
    pub symbol: String,
    pub price: f64,
    pub change_pct: f64,
    pub volume_ratio: f64,
    pub score: f64,
    pub scanners_hit: Vec<String>,
    pub strategy_hint: StrategyHint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeStatus {
    Ok,
    /// 掃描有結果，但沒有任何標的通過 F&O 與價格篩選
    NoResults,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnvelopeWarnings {
    pub stale_eligibility: bool,
    pub eligibility_as_of: DateTime<Utc>,
    pub failed_scanners: Vec<SourceFailure>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultEnvelope {
    pub status: EnvelopeStatus,
    pub generated_at: DateTime<Utc>,
    pub elapsed_seconds: f64,
    pub total_candidates_scanned: usize,
    pub fo_eligible_count: usize,
    pub top_picks: Vec<RankedResult>,
    pub warnings: EnvelopeWarnings,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_hit_keeps_names_unique() {
        let row = RawMatchRow {
            symbol: "RELIANCE".to_string(),
            price: 2450.5,
            change_pct: 1.8,
            volume_ratio: 2.3,
        };
        let mut candidate = Candidate::from_row(&row, "volume_breakout");
        candidate.record_hit("rsi_momentum");
        candidate.record_hit("volume_breakout");

        assert_eq!(candidate.scanners_hit, vec!["volume_breakout", "rsi_momentum"]);
        assert_eq!(candidate.breadth(), 2);
    }

    #[test]
    fn test_strategy_hint_serializes_as_label() {
        let json = serde_json::to_value(StrategyHint::Bearish).unwrap();
        assert_eq!(json, "Bearish: consider ATM/OTM Put (PE)");
        let status = serde_json::to_value(EnvelopeStatus::NoResults).unwrap();
        assert_eq!(status, "no_results");
    }
}
