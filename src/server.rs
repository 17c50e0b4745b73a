use crate::adapters::{ChartinkClient, LocalStorage, NseEligibilityProvider};
use crate::api::{self, AppState};
use crate::config::TomlConfig;
use crate::core::eligibility_cache::EligibilityCache;
use crate::core::orchestrator::Orchestrator;
use crate::utils::error::Result;
use std::sync::Arc;

/// 以已驗證的配置組出共享狀態；有快照檔時先讀回名單
pub async fn build_state(config: &TomlConfig) -> Result<Arc<AppState>> {
    let provider = Arc::new(NseEligibilityProvider::new(
        config.eligibility_url(),
        config.eligibility_timeout(),
    )?);

    let cache = match config.snapshot_path() {
        Some(path) => {
            let (storage, file_name) = LocalStorage::for_file(path);
            EligibilityCache::with_snapshot(provider, config.cache_settings(), Arc::new(storage), file_name)
        }
        None => EligibilityCache::new(provider, config.cache_settings()),
    };

    if let Err(e) = cache.restore_snapshot().await {
        tracing::warn!("⚠️ No usable F&O snapshot, list will be downloaded on first request: {}", e);
    }

    let source = Arc::new(ChartinkClient::new(config.scan_page_url(), config.scan_endpoint())?);
    let orchestrator = Orchestrator::from_config(config, cache, source)?;

    Ok(Arc::new(AppState::new(orchestrator)))
}

pub async fn serve(config: &TomlConfig) -> Result<()> {
    let state = build_state(config).await?;
    let app = api::router(state);

    let addr = format!("{}:{}", config.host(), config.port());
    tracing::info!("🌐 Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("👋 Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
