use crate::core::orchestrator::Orchestrator;

/// 所有請求共用；每次 `/analyze` 各自跑一次流程，只有名單快取是共享的
pub struct AppState {
    pub orchestrator: Orchestrator,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self { orchestrator }
    }
}
