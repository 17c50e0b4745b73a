// 外部系統的具體實作：NSE 名單、Chartink 掃描、本機檔案

pub mod chartink;
pub mod nse;
pub mod storage;

pub use chartink::ChartinkClient;
pub use nse::NseEligibilityProvider;
pub use storage::LocalStorage;
