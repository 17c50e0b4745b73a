use crate::core::aggregator::PriceRange;
use crate::core::eligibility_cache::CacheSettings;
use crate::core::scorer::{Normalization, ScoreWeights};
use crate::domain::model::ScanQueryDefinition;
use crate::utils::error::{Result, ScanError};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_FO_LIST_URL: &str = "https://nsearchives.nseindia.com/content/fo/fo_mktlots.csv";
pub const DEFAULT_CHARTINK_PROCESS_URL: &str = "https://chartink.com/screener/process";
pub const DEFAULT_CHARTINK_PAGE_URL: &str = "https://chartink.com/screener/";

const DEFAULT_TTL_MINUTES: u64 = 24 * 60;
/// 一週
const MAX_TTL_MINUTES: u64 = 7 * 24 * 60;
const MAX_DURATION_SECONDS: u64 = 3600;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    pub server: Option<ServerConfig>,
    pub logging: Option<LoggingConfig>,
    pub eligibility: EligibilityConfig,
    pub scan: ScanConfig,
    pub filter: FilterConfig,
    pub scoring: ScoringConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub verbose: Option<bool>,
    pub json: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EligibilityConfig {
    pub url: Option<String>,
    pub ttl_minutes: Option<u64>,
    pub timeout_seconds: Option<u64>,
    pub failure_backoff_seconds: Option<u64>,
    /// 名單快照檔，重啟後不必重新下載
    pub snapshot_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    pub endpoint: Option<String>,
    pub page_url: Option<String>,
    pub per_source_timeout_seconds: Option<u64>,
    pub fetch_deadline_seconds: Option<u64>,
    #[serde(default)]
    pub queries: Vec<ScanQueryDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    pub min_price: f64,
    pub max_price: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub top_n: Option<usize>,
    pub weights: BTreeMap<String, f64>,
    pub change_pct_ceiling: Option<f64>,
    pub volume_ratio_ceiling: Option<f64>,
    pub neutral_band_pct: Option<f64>,
}

impl TomlConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| ScanError::ConfigError {
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${CHARTINK_URL})；未設定的變數保持原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = regex::Regex::new(r"\$\{([^}]+)\}").map_err(|e| ScanError::ConfigError {
            message: format!("env substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    /// 驗證配置的合理性；任何錯誤都會讓服務拒絕啟動
    pub fn validate_config(&self) -> Result<()> {
        validation::validate_url("eligibility.url", self.eligibility_url())?;
        validation::validate_url("scan.endpoint", self.scan_endpoint())?;
        validation::validate_url("scan.page_url", self.scan_page_url())?;

        if let Some(path) = &self.eligibility.snapshot_path {
            validation::validate_path("eligibility.snapshot_path", path)?;
        }

        // 上限避免 Instant 加法溢位
        validation::validate_range(
            "eligibility.ttl_minutes",
            self.eligibility.ttl_minutes.unwrap_or(DEFAULT_TTL_MINUTES),
            1,
            MAX_TTL_MINUTES,
        )?;
        for (field, seconds) in [
            ("eligibility.timeout_seconds", self.eligibility.timeout_seconds),
            ("eligibility.failure_backoff_seconds", self.eligibility.failure_backoff_seconds),
            ("scan.per_source_timeout_seconds", self.scan.per_source_timeout_seconds),
            ("scan.fetch_deadline_seconds", self.scan.fetch_deadline_seconds),
        ] {
            if let Some(seconds) = seconds {
                validation::validate_range(field, seconds, 1, MAX_DURATION_SECONDS)?;
            }
        }

        if self.scan.queries.is_empty() {
            return Err(ScanError::MissingConfigError {
                field: "scan.queries".to_string(),
            });
        }
        for query in &self.scan.queries {
            validation::validate_non_empty_string("scan.queries.name", &query.name)?;
            validation::validate_non_empty_string(&format!("scan.queries.{}.clause", query.name), &query.clause)?;
        }
        validation::validate_unique_names("scan.queries.name", self.scan.queries.iter().map(|q| q.name.as_str()))?;

        self.price_range()?;
        validation::validate_positive_number("scoring.top_n", self.top_n() as u64, 1)?;
        self.score_weights()?;

        let normalization = self.normalization();
        validation::validate_finite("scoring.change_pct_ceiling", normalization.change_pct_ceiling)?;
        if normalization.change_pct_ceiling <= 0.0 {
            return Err(ScanError::invalid_config(
                "scoring.change_pct_ceiling",
                normalization.change_pct_ceiling,
                "Ceiling must be greater than 0",
            ));
        }
        validation::validate_finite("scoring.volume_ratio_ceiling", normalization.volume_ratio_ceiling)?;
        if normalization.volume_ratio_ceiling <= 1.0 {
            return Err(ScanError::invalid_config(
                "scoring.volume_ratio_ceiling",
                normalization.volume_ratio_ceiling,
                "Ceiling must be greater than the 1x baseline",
            ));
        }
        validation::validate_range("scoring.neutral_band_pct", self.neutral_band_pct(), 0.0, 100.0)?;

        Ok(())
    }

    pub fn host(&self) -> &str {
        self.server
            .as_ref()
            .and_then(|s| s.host.as_deref())
            .unwrap_or("0.0.0.0")
    }

    pub fn port(&self) -> u16 {
        self.server.as_ref().and_then(|s| s.port).unwrap_or(8000)
    }

    pub fn verbose(&self) -> bool {
        self.logging.as_ref().and_then(|l| l.verbose).unwrap_or(false)
    }

    pub fn json_logs(&self) -> bool {
        self.logging.as_ref().and_then(|l| l.json).unwrap_or(false)
    }

    pub fn eligibility_url(&self) -> &str {
        self.eligibility.url.as_deref().unwrap_or(DEFAULT_FO_LIST_URL)
    }

    pub fn eligibility_ttl(&self) -> Duration {
        let minutes = self.eligibility.ttl_minutes.unwrap_or(DEFAULT_TTL_MINUTES);
        Duration::from_secs(minutes.saturating_mul(60))
    }

    pub fn eligibility_timeout(&self) -> Duration {
        Duration::from_secs(self.eligibility.timeout_seconds.unwrap_or(15))
    }

    pub fn cache_settings(&self) -> CacheSettings {
        CacheSettings {
            ttl: self.eligibility_ttl(),
            failure_backoff: Duration::from_secs(self.eligibility.failure_backoff_seconds.unwrap_or(60)),
        }
    }

    pub fn snapshot_path(&self) -> Option<&str> {
        self.eligibility.snapshot_path.as_deref()
    }

    pub fn scan_endpoint(&self) -> &str {
        self.scan.endpoint.as_deref().unwrap_or(DEFAULT_CHARTINK_PROCESS_URL)
    }

    pub fn scan_page_url(&self) -> &str {
        self.scan.page_url.as_deref().unwrap_or(DEFAULT_CHARTINK_PAGE_URL)
    }

    pub fn per_source_timeout(&self) -> Duration {
        Duration::from_secs(self.scan.per_source_timeout_seconds.unwrap_or(20))
    }

    pub fn fetch_deadline(&self) -> Duration {
        Duration::from_secs(self.scan.fetch_deadline_seconds.unwrap_or(30))
    }

    pub fn queries(&self) -> &[ScanQueryDefinition] {
        &self.scan.queries
    }

    pub fn price_range(&self) -> Result<PriceRange> {
        PriceRange::new(self.filter.min_price, self.filter.max_price)
    }

    pub fn top_n(&self) -> usize {
        self.scoring.top_n.unwrap_or(5)
    }

    pub fn score_weights(&self) -> Result<ScoreWeights> {
        ScoreWeights::from_map(&self.scoring.weights)
    }

    pub fn normalization(&self) -> Normalization {
        let defaults = Normalization::default();
        Normalization {
            change_pct_ceiling: self.scoring.change_pct_ceiling.unwrap_or(defaults.change_pct_ceiling),
            volume_ratio_ceiling: self
                .scoring
                .volume_ratio_ceiling
                .unwrap_or(defaults.volume_ratio_ceiling),
            query_count: self.scan.queries.len(),
        }
    }

    pub fn neutral_band_pct(&self) -> f64 {
        self.scoring.neutral_band_pct.unwrap_or(1.5)
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
