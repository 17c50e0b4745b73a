//! F&O 名單快取
//!
//! 名單在 TTL 內直接回傳；過期時只允許一個呼叫者向上游下載，其餘呼叫者
//! 等待同一次刷新並取得相同結果。刷新在獨立的 task 中執行並持有刷新鎖，
//! 發起的請求即使被取消，刷新仍會完成並寫回快取。

use crate::domain::model::EligibilitySnapshot;
use crate::domain::ports::{EligibilityProvider, Storage};
use crate::utils::error::{Result, ScanError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub ttl: Duration,
    /// 刷新失敗後，這段時間內不再打上游
    pub failure_backoff: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(24 * 60 * 60),
            failure_backoff: Duration::from_secs(60),
        }
    }
}

/// 一次刷新的結果；錯誤以字串保存，讓所有等待者拿到相同訊息
type Outcome = std::result::Result<EligibilitySnapshot, String>;

#[derive(Default)]
struct CacheState {
    symbols: Option<Arc<HashSet<String>>>,
    fetched_at: Option<DateTime<Utc>>,
    /// 每次刷新嘗試（不論成敗）遞增
    generation: u64,
    last_outcome: Option<Outcome>,
    last_failure_at: Option<Instant>,
}

impl CacheState {
    fn snapshot(&self, stale: bool) -> Option<EligibilitySnapshot> {
        match (&self.symbols, self.fetched_at) {
            (Some(symbols), Some(fetched_at)) => Some(EligibilitySnapshot {
                symbols: Arc::clone(symbols),
                fetched_at,
                stale,
            }),
            _ => None,
        }
    }

    fn fresh_snapshot(&self, ttl: Duration) -> Option<EligibilitySnapshot> {
        let fetched_at = self.fetched_at?;
        // 時間戳在未來（時鐘偏移）時視為剛下載
        let fresh = (Utc::now() - fetched_at)
            .to_std()
            .map(|age| age <= ttl)
            .unwrap_or(true);
        if fresh {
            self.snapshot(false)
        } else {
            None
        }
    }

    fn in_backoff(&self, backoff: Duration) -> Option<Outcome> {
        let failed_at = self.last_failure_at?;
        if failed_at.elapsed() < backoff {
            self.last_outcome.clone()
        } else {
            None
        }
    }
}

#[derive(Serialize, Deserialize)]
struct SnapshotFile {
    fetched_at: DateTime<Utc>,
    symbols: Vec<String>,
}

struct SnapshotStore {
    storage: Arc<dyn Storage>,
    file_name: String,
}

struct CacheInner {
    provider: Arc<dyn EligibilityProvider>,
    settings: CacheSettings,
    state: RwLock<CacheState>,
    refresh_lock: Arc<Mutex<()>>,
    snapshot_store: Option<SnapshotStore>,
}

/// 行程層級的 F&O 名單快取；clone 共用同一份狀態
#[derive(Clone)]
pub struct EligibilityCache {
    inner: Arc<CacheInner>,
}

impl EligibilityCache {
    pub fn new(provider: Arc<dyn EligibilityProvider>, settings: CacheSettings) -> Self {
        Self::build(provider, settings, None)
    }

    /// 每次成功刷新後把名單寫入 `file_name`，啟動時可用 [`restore_snapshot`](Self::restore_snapshot) 讀回
    pub fn with_snapshot(
        provider: Arc<dyn EligibilityProvider>,
        settings: CacheSettings,
        storage: Arc<dyn Storage>,
        file_name: impl Into<String>,
    ) -> Self {
        let store = SnapshotStore {
            storage,
            file_name: file_name.into(),
        };
        Self::build(provider, settings, Some(store))
    }

    fn build(
        provider: Arc<dyn EligibilityProvider>,
        settings: CacheSettings,
        snapshot_store: Option<SnapshotStore>,
    ) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                provider,
                settings,
                state: RwLock::new(CacheState::default()),
                refresh_lock: Arc::new(Mutex::new(())),
                snapshot_store,
            }),
        }
    }

    /// 直接放入一份名單（啟動時讀回快照或測試使用）
    pub async fn seed(&self, symbols: HashSet<String>, fetched_at: DateTime<Utc>) {
        let mut state = self.inner.state.write().await;
        state.symbols = Some(Arc::new(symbols));
        state.fetched_at = Some(fetched_at);
    }

    /// 從快照檔還原名單；未設定快照時回傳 `Ok(None)`
    pub async fn restore_snapshot(&self) -> Result<Option<usize>> {
        let Some(store) = &self.inner.snapshot_store else {
            return Ok(None);
        };

        let bytes = store.storage.read_file(&store.file_name).await?;
        let file: SnapshotFile = serde_json::from_slice(&bytes)?;
        let count = file.symbols.len();
        if count == 0 {
            return Ok(None);
        }

        tracing::info!(
            "💾 Restored F&O list snapshot: {} symbols as of {}",
            count,
            file.fetched_at
        );
        self.seed(file.symbols.into_iter().collect(), file.fetched_at).await;
        Ok(Some(count))
    }

    pub async fn ensure_fresh(&self) -> Result<EligibilitySnapshot> {
        let settings = &self.inner.settings;

        let observed_generation = {
            let state = self.inner.state.read().await;
            if let Some(snapshot) = state.fresh_snapshot(settings.ttl) {
                tracing::debug!("Using cached F&O list ({} symbols)", snapshot.symbols.len());
                return Ok(snapshot);
            }
            if let Some(outcome) = state.in_backoff(settings.failure_backoff) {
                tracing::debug!("F&O refresh in failure backoff, reusing last outcome");
                return into_result(outcome);
            }
            state.generation
        };

        let guard = Arc::clone(&self.inner.refresh_lock).lock_owned().await;

        {
            let state = self.inner.state.read().await;
            if state.generation != observed_generation {
                // 等待期間已有其他呼叫者完成刷新
                if let Some(outcome) = state.last_outcome.clone() {
                    return into_result(outcome);
                }
            }
        }

        let inner = Arc::clone(&self.inner);
        let refresh = tokio::spawn(async move { refresh(&inner, guard).await });

        match refresh.await {
            Ok(outcome) => into_result(outcome),
            Err(e) => Err(ScanError::EligibilityUnavailable {
                reason: format!("refresh task aborted: {}", e),
            }),
        }
    }
}

async fn refresh(inner: &CacheInner, _guard: OwnedMutexGuard<()>) -> Outcome {
    tracing::info!("📥 Downloading fresh F&O list...");
    let fetched = inner.provider.fetch_symbols().await;

    let mut state = inner.state.write().await;
    state.generation += 1;

    let outcome = match fetched {
        Ok(symbols) if !symbols.is_empty() => {
            let fetched_at = Utc::now();
            let symbols = Arc::new(symbols);
            state.symbols = Some(Arc::clone(&symbols));
            state.fetched_at = Some(fetched_at);
            state.last_failure_at = None;
            tracing::info!("✅ F&O list loaded: {} symbols", symbols.len());
            Ok(EligibilitySnapshot {
                symbols,
                fetched_at,
                stale: false,
            })
        }
        failed => {
            let reason = match failed {
                Ok(_) => "provider returned an empty list".to_string(),
                Err(e) => e.to_string(),
            };
            state.last_failure_at = Some(Instant::now());
            match state.snapshot(true) {
                Some(stale) => {
                    tracing::warn!(
                        "⚠️ Failed to refresh F&O list ({}), serving list from {}",
                        reason,
                        stale.fetched_at
                    );
                    Ok(stale)
                }
                None => {
                    tracing::error!("❌ Failed to load F&O list: {}", reason);
                    Err(reason)
                }
            }
        }
    };

    state.last_outcome = Some(outcome.clone());
    drop(state);

    if let (Ok(snapshot), Some(store)) = (&outcome, &inner.snapshot_store) {
        if !snapshot.stale {
            persist(store, snapshot).await;
        }
    }

    outcome
}

async fn persist(store: &SnapshotStore, snapshot: &EligibilitySnapshot) {
    let mut symbols: Vec<String> = snapshot.symbols.iter().cloned().collect();
    symbols.sort();
    let file = SnapshotFile {
        fetched_at: snapshot.fetched_at,
        symbols,
    };

    let written = match serde_json::to_vec_pretty(&file) {
        Ok(bytes) => store.storage.write_file(&store.file_name, &bytes).await,
        Err(e) => Err(e.into()),
    };
    if let Err(e) = written {
        tracing::warn!("⚠️ Could not write F&O snapshot '{}': {}", store.file_name, e);
    }
}

fn into_result(outcome: Outcome) -> Result<EligibilitySnapshot> {
    outcome.map_err(|reason| ScanError::EligibilityUnavailable { reason })
}
