use async_trait::async_trait;
use chrono::Utc;
use fo_scanner::adapters::LocalStorage;
use fo_scanner::core::eligibility_cache::{CacheSettings, EligibilityCache};
use fo_scanner::domain::ports::EligibilityProvider;
use fo_scanner::utils::error::{Result, ScanError};
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

#[derive(Clone)]
enum Reply {
    Symbols(Vec<&'static str>),
    Down,
}

struct CountingProvider {
    calls: AtomicUsize,
    delay: Duration,
    reply: Mutex<Reply>,
}

impl CountingProvider {
    fn new(reply: Reply, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay,
            reply: Mutex::new(reply),
        })
    }

    fn up(delay: Duration) -> Arc<Self> {
        Self::new(Reply::Symbols(vec!["RELIANCE", "TCS", "INFY"]), delay)
    }

    fn down() -> Arc<Self> {
        Self::new(Reply::Down, Duration::ZERO)
    }

    fn set_reply(&self, reply: Reply) {
        *self.reply.lock().unwrap() = reply;
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EligibilityProvider for CountingProvider {
    async fn fetch_symbols(&self) -> Result<HashSet<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;

        let reply = self.reply.lock().unwrap().clone();
        match reply {
            Reply::Symbols(symbols) => Ok(symbols.into_iter().map(String::from).collect()),
            Reply::Down => Err(ScanError::EligibilityUnavailable {
                reason: "HTTP 403 Forbidden".to_string(),
            }),
        }
    }
}

fn settings(ttl_minutes: u64, backoff: Duration) -> CacheSettings {
    CacheSettings {
        ttl: Duration::from_secs(ttl_minutes * 60),
        failure_backoff: backoff,
    }
}

fn symbols(names: &[&str]) -> HashSet<String> {
    names.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_concurrent_callers_on_empty_cache_trigger_one_fetch() {
    let provider = CountingProvider::up(Duration::from_millis(50));
    let cache = EligibilityCache::new(provider.clone(), settings(60, Duration::from_secs(60)));

    let results = join_all((0..10).map(|_| {
        let cache = cache.clone();
        async move { cache.ensure_fresh().await }
    }))
    .await;

    assert_eq!(provider.calls(), 1);
    for result in results {
        let snapshot = result.unwrap();
        assert_eq!(snapshot.symbols.len(), 3);
        assert!(!snapshot.stale);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callers_on_expired_cache_trigger_one_fetch() {
    let provider = CountingProvider::up(Duration::from_millis(50));
    let cache = EligibilityCache::new(provider.clone(), settings(60, Duration::from_secs(60)));
    cache
        .seed(symbols(&["OLDCO"]), Utc::now() - chrono::Duration::hours(2))
        .await;

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let cache = cache.clone();
            tokio::spawn(async move { cache.ensure_fresh().await })
        })
        .collect();

    for handle in handles {
        let snapshot = handle.await.unwrap().unwrap();
        assert!(snapshot.contains("RELIANCE"));
        assert!(!snapshot.contains("OLDCO"));
    }
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn test_fresh_cache_does_not_call_provider() {
    let provider = CountingProvider::down();
    let cache = EligibilityCache::new(provider.clone(), settings(60, Duration::from_secs(60)));
    let fetched_at = Utc::now() - chrono::Duration::minutes(10);
    cache.seed(symbols(&["RELIANCE", "TCS"]), fetched_at).await;

    let snapshot = cache.ensure_fresh().await.unwrap();

    assert_eq!(provider.calls(), 0);
    assert!(!snapshot.stale);
    assert_eq!(snapshot.fetched_at, fetched_at);
    assert_eq!(snapshot.symbols.len(), 2);
}

#[tokio::test]
async fn test_failure_without_previous_list_is_unavailable_for_every_waiter() {
    let provider = CountingProvider::new(Reply::Down, Duration::from_millis(30));
    let cache = EligibilityCache::new(provider.clone(), settings(60, Duration::from_secs(60)));

    let results = join_all((0..5).map(|_| {
        let cache = cache.clone();
        async move { cache.ensure_fresh().await }
    }))
    .await;

    assert_eq!(provider.calls(), 1);
    let messages: HashSet<String> = results
        .into_iter()
        .map(|result| match result {
            Err(e @ ScanError::EligibilityUnavailable { .. }) => e.to_string(),
            other => panic!("expected EligibilityUnavailable, got {:?}", other.map(|s| s.symbols.len())),
        })
        .collect();
    assert_eq!(messages.len(), 1);
    assert!(messages.iter().all(|m| m.contains("403")));
}

#[tokio::test]
async fn test_failure_with_expired_list_serves_stale() {
    let provider = CountingProvider::down();
    let cache = EligibilityCache::new(provider.clone(), settings(60, Duration::from_secs(60)));
    let fetched_at = Utc::now() - chrono::Duration::hours(3);
    cache.seed(symbols(&["RELIANCE"]), fetched_at).await;

    let snapshot = cache.ensure_fresh().await.unwrap();

    assert_eq!(provider.calls(), 1);
    assert!(snapshot.stale);
    assert_eq!(snapshot.fetched_at, fetched_at);
    assert!(snapshot.contains("RELIANCE"));
}

#[tokio::test]
async fn test_failure_backoff_suppresses_retries() {
    let provider = CountingProvider::down();
    let cache = EligibilityCache::new(provider.clone(), settings(60, Duration::from_secs(60)));

    assert!(cache.ensure_fresh().await.is_err());
    assert!(cache.ensure_fresh().await.is_err());
    assert!(cache.ensure_fresh().await.is_err());

    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn test_recovers_once_backoff_has_elapsed() {
    let provider = CountingProvider::down();
    let cache = EligibilityCache::new(provider.clone(), settings(60, Duration::ZERO));

    assert!(cache.ensure_fresh().await.is_err());

    provider.set_reply(Reply::Symbols(vec!["HDFCBANK"]));
    let snapshot = cache.ensure_fresh().await.unwrap();

    assert_eq!(provider.calls(), 2);
    assert!(!snapshot.stale);
    assert!(snapshot.contains("HDFCBANK"));
}

#[tokio::test]
async fn test_empty_list_counts_as_failure() {
    let provider = CountingProvider::new(Reply::Symbols(vec![]), Duration::ZERO);
    let cache = EligibilityCache::new(provider.clone(), settings(60, Duration::from_secs(60)));

    let err = cache.ensure_fresh().await.unwrap_err();
    assert!(matches!(err, ScanError::EligibilityUnavailable { .. }));
    assert!(err.to_string().contains("empty"));
}

#[tokio::test]
async fn test_snapshot_is_written_and_restored() {
    let dir = TempDir::new().unwrap();

    let provider = CountingProvider::up(Duration::ZERO);
    let cache = EligibilityCache::with_snapshot(
        provider.clone(),
        settings(60, Duration::from_secs(60)),
        Arc::new(LocalStorage::new(dir.path())),
        "fo_snapshot.json",
    );
    cache.ensure_fresh().await.unwrap();
    assert!(dir.path().join("fo_snapshot.json").exists());

    // 重啟後上游不可用，仍可用快照服務
    let restarted_provider = CountingProvider::down();
    let restarted = EligibilityCache::with_snapshot(
        restarted_provider.clone(),
        settings(60, Duration::from_secs(60)),
        Arc::new(LocalStorage::new(dir.path())),
        "fo_snapshot.json",
    );
    assert_eq!(restarted.restore_snapshot().await.unwrap(), Some(3));

    let snapshot = restarted.ensure_fresh().await.unwrap();
    assert_eq!(restarted_provider.calls(), 0);
    assert!(!snapshot.stale);
    assert!(snapshot.contains("INFY"));
}

#[tokio::test]
async fn test_missing_snapshot_is_an_error_and_leaves_cache_empty() {
    let dir = TempDir::new().unwrap();
    let provider = CountingProvider::down();
    let cache = EligibilityCache::with_snapshot(
        provider.clone(),
        settings(60, Duration::from_secs(60)),
        Arc::new(LocalStorage::new(dir.path())),
        "missing.json",
    );

    assert!(cache.restore_snapshot().await.is_err());
    assert!(cache.ensure_fresh().await.is_err());
}

#[tokio::test]
async fn test_without_snapshot_store_restore_is_noop() {
    let cache = EligibilityCache::new(CountingProvider::down(), CacheSettings::default());
    assert_eq!(cache.restore_snapshot().await.unwrap(), None);
}

#[tokio::test]
async fn test_cancelled_caller_does_not_abort_refresh() {
    let provider = CountingProvider::up(Duration::from_millis(200));
    let cache = EligibilityCache::new(provider.clone(), settings(60, Duration::from_secs(60)));

    let leader = {
        let cache = cache.clone();
        tokio::spawn(async move { cache.ensure_fresh().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    leader.abort();
    assert!(leader.await.unwrap_err().is_cancelled());

    let snapshot = cache.ensure_fresh().await.unwrap();

    assert_eq!(provider.calls(), 1);
    assert!(snapshot.contains("TCS"));
}
