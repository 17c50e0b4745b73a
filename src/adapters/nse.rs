use crate::domain::ports::EligibilityProvider;
use crate::utils::error::{Result, ScanError};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, REFERER, USER_AGENT};
use reqwest::Client;
use std::collections::HashSet;
use std::time::Duration;

pub(crate) const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// NSE 公布的 F&O 合約清單 (fo_mktlots.csv)
pub struct NseEligibilityProvider {
    client: Client,
    url: String,
}

impl NseEligibilityProvider {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        // 沒有瀏覽器 User-Agent 的請求會被 NSE 擋下
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
        headers.insert(REFERER, HeaderValue::from_static("https://www.nseindia.com/"));

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl EligibilityProvider for NseEligibilityProvider {
    async fn fetch_symbols(&self) -> Result<HashSet<String>> {
        tracing::debug!("Requesting F&O list from: {}", self.url);
        let response = self.client.get(&self.url).send().await?;
        tracing::debug!("F&O list response status: {}", response.status());

        let response = response.error_for_status()?;
        let body = response.bytes().await?;
        parse_fo_symbols(&body)
    }
}

/// 讀取 `SYMBOL` 欄；欄名會先去空白並轉大寫，代號同樣處理
pub fn parse_fo_symbols(data: &[u8]) -> Result<HashSet<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(data);

    let symbol_index = reader
        .headers()?
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case("SYMBOL"))
        .ok_or_else(|| ScanError::EligibilityUnavailable {
            reason: "F&O list has no SYMBOL column".to_string(),
        })?;

    let mut symbols = HashSet::new();
    for record in reader.records() {
        let record = record?;
        let Some(raw) = record.get(symbol_index) else {
            continue;
        };
        let symbol = raw.trim().to_uppercase();
        // 檔案中段會重複出現一次表頭
        if symbol.is_empty() || symbol == "SYMBOL" {
            continue;
        }
        symbols.insert(symbol);
    }

    Ok(symbols)
}
