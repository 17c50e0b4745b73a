use crate::config::toml_config::TomlConfig;
use crate::core::aggregator::{merge_and_filter, Aggregator, PriceRange};
use crate::core::eligibility_cache::EligibilityCache;
use crate::core::scorer::Scorer;
use crate::domain::model::{
    EnvelopeStatus, EnvelopeWarnings, ResultEnvelope, ScanQueryDefinition,
};
use crate::domain::ports::ScanSource;
use crate::utils::error::{Result, SourceFailure};
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    RefreshingCache,
    Fetching,
    Merging,
    Scoring,
    Done,
    Failed,
}

/// 記錄一次執行的階段轉換與各階段耗時
#[derive(Debug)]
pub struct PhaseTracker {
    phase: Phase,
    entered_at: Instant,
    timings: Vec<(Phase, Duration)>,
}

impl PhaseTracker {
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            entered_at: Instant::now(),
            timings: Vec::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn timings(&self) -> &[(Phase, Duration)] {
        &self.timings
    }

    pub fn enter(&mut self, next: Phase) {
        let spent = self.entered_at.elapsed();
        tracing::debug!("{:?} -> {:?} (spent {:?} in {:?})", self.phase, next, spent, self.phase);
        self.timings.push((self.phase, spent));
        self.phase = next;
        self.entered_at = Instant::now();
    }

    /// 失敗只能發生在刷新名單或抓取階段
    fn fail_on<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            debug_assert!(matches!(self.phase, Phase::RefreshingCache | Phase::Fetching));
            tracing::debug!("{:?} failed: {}", self.phase, e);
            self.enter(Phase::Failed);
        }
        result
    }
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// 一次 `/analyze` 請求的完整流程：名單 → 扇出抓取 → 合併篩選 → 評分排名
pub struct Orchestrator {
    cache: EligibilityCache,
    aggregator: Aggregator,
    scorer: Scorer,
    queries: Vec<ScanQueryDefinition>,
    price_range: PriceRange,
    top_n: usize,
}

impl Orchestrator {
    pub fn new(
        cache: EligibilityCache,
        aggregator: Aggregator,
        scorer: Scorer,
        queries: Vec<ScanQueryDefinition>,
        price_range: PriceRange,
        top_n: usize,
    ) -> Self {
        Self {
            cache,
            aggregator,
            scorer,
            queries,
            price_range,
            top_n,
        }
    }

    /// 依已驗證的配置組出整條流程；名單快取由呼叫端建立以便跨請求共用
    pub fn from_config(
        config: &TomlConfig,
        cache: EligibilityCache,
        source: Arc<dyn ScanSource>,
    ) -> Result<Self> {
        let aggregator = Aggregator::new(source, config.per_source_timeout(), config.fetch_deadline());
        let scorer = Scorer::new(
            config.score_weights()?,
            config.normalization(),
            config.neutral_band_pct(),
        );

        Ok(Self::new(
            cache,
            aggregator,
            scorer,
            config.queries().to_vec(),
            config.price_range()?,
            config.top_n(),
        ))
    }

    pub async fn run(&self) -> Result<ResultEnvelope> {
        let started = Instant::now();
        let mut tracker = PhaseTracker::new();

        tracker.enter(Phase::RefreshingCache);
        let eligibility = tracker.fail_on(self.cache.ensure_fresh().await)?;
        if eligibility.stale {
            tracing::warn!(
                "⚠️ Using stale F&O list from {} ({} symbols)",
                eligibility.fetched_at,
                eligibility.symbols.len()
            );
        }

        tracker.enter(Phase::Fetching);
        tracing::info!("🚀 Running {} scanners...", self.queries.len());
        let fetched = tracker.fail_on(self.aggregator.fetch_all(&self.queries).await)?;

        tracker.enter(Phase::Merging);
        let collected = merge_and_filter(fetched, &eligibility, &self.price_range);

        tracker.enter(Phase::Scoring);
        let fo_eligible_count = collected.candidates.len();
        let top_picks = self.scorer.rank(collected.candidates, self.top_n);

        tracker.enter(Phase::Done);
        tracing::debug!("Phase timings: {:?}", tracker.timings());

        let status = if top_picks.is_empty() {
            EnvelopeStatus::NoResults
        } else {
            EnvelopeStatus::Ok
        };

        let envelope = ResultEnvelope {
            status,
            generated_at: Utc::now(),
            elapsed_seconds: round_seconds(started.elapsed()),
            total_candidates_scanned: collected.scanned_count,
            fo_eligible_count,
            top_picks,
            warnings: EnvelopeWarnings {
                stale_eligibility: eligibility.stale,
                eligibility_as_of: eligibility.fetched_at,
                failed_scanners: collected.failures.iter().map(SourceFailure::from).collect(),
            },
        };

        tracing::info!(
            "✅ Analysis complete in {:.2}s: {} picks",
            envelope.elapsed_seconds,
            envelope.top_picks.len()
        );
        Ok(envelope)
    }
}

fn round_seconds(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 100.0).round() / 100.0
}
