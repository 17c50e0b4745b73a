//! 候選標的評分與排序
//!
//! 每個訊號先正規化到 [0,1]，再依 [`ScoreWeights`] 加權求和。排序為全序：
//! 分數由高到低，同分時量比較高者優先，再以代號字典序決定。

use crate::domain::model::{Candidate, RankedResult, StrategyHint};
use crate::utils::error::{Result, ScanError};
use std::cmp::Ordering;
use std::collections::BTreeMap;

const WEIGHT_SUM_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Signal {
    /// 漲跌幅
    Momentum,
    /// 量比（當日成交量 / 均量）
    Volume,
    /// 命中的掃描器數量
    Breadth,
}

impl Signal {
    pub const ALL: [Signal; 3] = [Signal::Momentum, Signal::Volume, Signal::Breadth];

    pub fn name(&self) -> &'static str {
        match self {
            Signal::Momentum => "momentum",
            Signal::Volume => "volume",
            Signal::Breadth => "breadth",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Signal::ALL.into_iter().find(|s| s.name() == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreWeights {
    weights: BTreeMap<Signal, f64>,
}

impl ScoreWeights {
    /// 從設定檔的 `signal -> weight` 對應建立；未列出的訊號權重為 0
    pub fn from_map(map: &BTreeMap<String, f64>) -> Result<Self> {
        let mut weights = BTreeMap::new();
        for (name, weight) in map {
            let signal = Signal::from_name(name).ok_or_else(|| {
                ScanError::invalid_config(
                    "scoring.weights",
                    name,
                    "Unknown signal. Valid signals: momentum, volume, breadth",
                )
            })?;
            if !weight.is_finite() || *weight < 0.0 {
                return Err(ScanError::invalid_config(
                    &format!("scoring.weights.{}", name),
                    weight,
                    "Weight must be a finite, non-negative number",
                ));
            }
            weights.insert(signal, *weight);
        }

        let sum: f64 = weights.values().sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_EPSILON {
            return Err(ScanError::invalid_config(
                "scoring.weights",
                sum,
                "Weights must sum to 1.0",
            ));
        }

        Ok(Self { weights })
    }

    pub fn weight(&self, signal: Signal) -> f64 {
        self.weights.get(&signal).copied().unwrap_or(0.0)
    }
}

impl Default for ScoreWeights {
    fn default() -> Self {
        let weights = BTreeMap::from([
            (Signal::Breadth, 0.40),
            (Signal::Volume, 0.35),
            (Signal::Momentum, 0.25),
        ]);
        Self { weights }
    }
}

/// 正規化曲線：三者皆對原始訊號單調不減，且落在 [0,1]
#[derive(Debug, Clone, PartialEq)]
pub struct Normalization {
    /// 漲跌幅在 ±ceiling 處飽和
    pub change_pct_ceiling: f64,
    /// 量比 1x 為基準（0 分），在 ceiling 處飽和
    pub volume_ratio_ceiling: f64,
    /// 設定的掃描查詢數量
    pub query_count: usize,
}

impl Normalization {
    pub fn momentum(&self, change_pct: f64) -> f64 {
        let c = self.change_pct_ceiling;
        (change_pct.clamp(-c, c) + c) / (2.0 * c)
    }

    pub fn volume(&self, volume_ratio: f64) -> f64 {
        ((volume_ratio - 1.0) / (self.volume_ratio_ceiling - 1.0)).clamp(0.0, 1.0)
    }

    pub fn breadth(&self, scanners_hit: usize) -> f64 {
        if self.query_count == 0 {
            return 0.0;
        }
        (scanners_hit as f64 / self.query_count as f64).min(1.0)
    }

    pub fn normalize(&self, signal: Signal, candidate: &Candidate) -> f64 {
        match signal {
            Signal::Momentum => self.momentum(candidate.change_pct),
            Signal::Volume => self.volume(candidate.volume_ratio),
            Signal::Breadth => self.breadth(candidate.breadth()),
        }
    }
}

impl Default for Normalization {
    fn default() -> Self {
        Self {
            change_pct_ceiling: 5.0,
            volume_ratio_ceiling: 5.0,
            query_count: 3,
        }
    }
}

/// 方向提示只看漲跌幅的正負與大小
pub fn strategy_hint(change_pct: f64, neutral_band_pct: f64) -> StrategyHint {
    if change_pct > neutral_band_pct {
        StrategyHint::Bullish
    } else if change_pct < -neutral_band_pct {
        StrategyHint::Bearish
    } else {
        StrategyHint::Neutral
    }
}

#[derive(Debug, Clone)]
pub struct Scorer {
    weights: ScoreWeights,
    normalization: Normalization,
    neutral_band_pct: f64,
}

impl Scorer {
    pub fn new(weights: ScoreWeights, normalization: Normalization, neutral_band_pct: f64) -> Self {
        Self {
            weights,
            normalization,
            neutral_band_pct,
        }
    }

    pub fn score(&self, candidate: &Candidate) -> f64 {
        let total: f64 = Signal::ALL
            .iter()
            .map(|&signal| self.weights.weight(signal) * self.normalization.normalize(signal, candidate))
            .sum();
        // 權重和允許 1e-6 誤差，夾回 [0,1]
        total.clamp(0.0, 1.0)
    }

    pub fn rank(&self, candidates: Vec<Candidate>, top_n: usize) -> Vec<RankedResult> {
        let mut scored: Vec<(f64, Candidate)> = candidates
            .into_iter()
            // 以輸出的四位小數分數排序，同分才由量比與代號決定
            .map(|c| (round_score(self.score(&c)), c))
            .collect();

        scored.sort_by(|(score_a, a), (score_b, b)| compare_ranked(*score_a, a, *score_b, b));
        scored.truncate(top_n);

        tracing::debug!("🏅 Ranked {} candidates (top_n = {})", scored.len(), top_n);

        scored
            .into_iter()
            .enumerate()
            .map(|(i, (score, c))| RankedResult {
                rank: i + 1,
                strategy_hint: strategy_hint(c.change_pct, self.neutral_band_pct),
                symbol: c.symbol,
                price: c.price,
                change_pct: c.change_pct,
                volume_ratio: c.volume_ratio,
                score,
                scanners_hit: c.scanners_hit,
            })
            .collect()
    }
}

fn compare_ranked(score_a: f64, a: &Candidate, score_b: f64, b: &Candidate) -> Ordering {
    score_b
        .total_cmp(&score_a)
        .then_with(|| b.volume_ratio.total_cmp(&a.volume_ratio))
        .then_with(|| a.symbol.cmp(&b.symbol))
}

fn round_score(score: f64) -> f64 {
    (score * 10_000.0).round() / 10_000.0
}
