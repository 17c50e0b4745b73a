use crate::adapters::nse::BROWSER_USER_AGENT;
use crate::domain::model::{RawMatchRow, ScanQueryDefinition};
use crate::domain::ports::ScanSource;
use crate::utils::error::{Result, SourceError};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, REFERER, USER_AGENT};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const CSRF_COOKIE: &str = "_csrf_token";

#[derive(Debug, Deserialize)]
struct ProcessResponse {
    data: Option<Vec<Value>>,
    scan_error: Option<String>,
}

/// Chartink 螢幕選股：先載入頁面取得 CSRF cookie，再 POST 掃描條件
pub struct ChartinkClient {
    client: Client,
    page_url: String,
    process_url: String,
    /// 同一個 session 共用的 token；POST 失敗後清除，下次重新取得
    csrf_token: Mutex<Option<String>>,
}

impl ChartinkClient {
    pub fn new(page_url: impl Into<String>, process_url: impl Into<String>) -> Result<Self> {
        let page_url = page_url.into();

        // Chartink 會擋掉非瀏覽器的請求
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
        headers.insert("X-Requested-With", HeaderValue::from_static("XMLHttpRequest"));
        if let Ok(referer) = HeaderValue::from_str(&page_url) {
            headers.insert(REFERER, referer);
        }

        let client = Client::builder()
            .cookie_store(true)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            page_url,
            process_url: process_url.into(),
            csrf_token: Mutex::new(None),
        })
    }

    /// 取得 CSRF token；並行的查詢共用同一次頁面載入
    async fn csrf_token(&self, query: &str, timeout: Duration) -> std::result::Result<String, SourceError> {
        let mut cached = self.csrf_token.lock().await;
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }

        tracing::debug!("Bootstrapping Chartink session from: {}", self.page_url);
        let response = self
            .client
            .get(&self.page_url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| map_reqwest_error(query, e))?;

        let token = response
            .cookies()
            .find(|c| c.name() == CSRF_COOKIE)
            .map(|c| c.value().to_string());

        match token {
            Some(token) if !token.is_empty() => {
                *cached = Some(token.clone());
                Ok(token)
            }
            _ => {
                tracing::warn!("⚠️ CSRF token not found, Chartink request may fail");
                Ok(String::new())
            }
        }
    }

    async fn invalidate_token(&self) {
        *self.csrf_token.lock().await = None;
    }

    async fn run_scan(
        &self,
        query: &ScanQueryDefinition,
        timeout: Duration,
    ) -> std::result::Result<Vec<RawMatchRow>, SourceError> {
        let token = self.csrf_token(&query.name, timeout).await?;

        let response = self
            .client
            .post(&self.process_url)
            .timeout(timeout)
            .form(&[(CSRF_COOKIE, token.as_str()), ("scan_clause", query.clause.as_str())])
            .send()
            .await
            .map_err(|e| map_reqwest_error(&query.name, e))?;

        let status = response.status();
        tracing::debug!("Scanner '{}' response status: {}", query.name, status);
        if !status.is_success() {
            return Err(SourceError::Unavailable {
                query: query.name.clone(),
                reason: format!("HTTP {}", status),
            });
        }

        let body: ProcessResponse = response
            .json()
            .await
            .map_err(|e| map_reqwest_error(&query.name, e))?;

        let rows = match (body.data, body.scan_error) {
            (Some(rows), _) => rows,
            (None, Some(scan_error)) => {
                return Err(SourceError::Unavailable {
                    query: query.name.clone(),
                    reason: format!("scan error: {}", scan_error),
                })
            }
            (None, None) => {
                return Err(SourceError::Unavailable {
                    query: query.name.clone(),
                    reason: "response has no data field".to_string(),
                })
            }
        };

        let total = rows.len();
        let parsed: Vec<RawMatchRow> = rows.iter().filter_map(parse_row).collect();
        if parsed.len() < total {
            tracing::debug!(
                "Scanner '{}': dropped {} malformed rows of {}",
                query.name,
                total - parsed.len(),
                total
            );
        }

        Ok(parsed)
    }
}

#[async_trait]
impl ScanSource for ChartinkClient {
    async fn fetch(
        &self,
        query: &ScanQueryDefinition,
        timeout: Duration,
    ) -> std::result::Result<Vec<RawMatchRow>, SourceError> {
        let started = Instant::now();

        let outcome = match tokio::time::timeout(timeout, self.run_scan(query, timeout)).await {
            Ok(result) => result,
            Err(_) => Err(SourceError::Timeout {
                query: query.name.clone(),
                elapsed: started.elapsed(),
            }),
        };

        if outcome.is_err() {
            self.invalidate_token().await;
        }
        outcome
    }
}

fn map_reqwest_error(query: &str, error: reqwest::Error) -> SourceError {
    if error.is_timeout() {
        SourceError::Timeout {
            query: query.to_string(),
            elapsed: Duration::ZERO,
        }
    } else if error.is_decode() {
        SourceError::Unavailable {
            query: query.to_string(),
            reason: format!("undecodable response: {}", error),
        }
    } else {
        SourceError::Unavailable {
            query: query.to_string(),
            reason: format!("HTTP request failed: {}", error),
        }
    }
}

/// 驗證單列資料；任何欄位缺漏或無法解析就整列捨棄
pub fn parse_row(row: &Value) -> Option<RawMatchRow> {
    let symbol = row.get("nsecode")?.as_str()?.trim().to_uppercase();
    if symbol.is_empty() {
        return None;
    }

    let price = number_field(row, "close")?;
    if price <= 0.0 {
        return None;
    }

    let change_pct = number_field(row, "per_chg")?;
    let volume_ratio = number_field(row, "per_chg_vol")?;
    if volume_ratio < 0.0 {
        return None;
    }

    Some(RawMatchRow {
        symbol,
        price,
        change_pct,
        volume_ratio,
    })
}

/// 數字或含千分位逗號的數字字串
fn number_field(row: &Value, key: &str) -> Option<f64> {
    let value = match row.get(key)? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().replace(',', "").parse::<f64>().ok()?,
        _ => return None,
    };
    value.is_finite().then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_row_accepts_numbers_and_strings() {
        let row = json!({
            "nsecode": " reliance ",
            "close": "2,450.50",
            "per_chg": 1.8,
            "per_chg_vol": "2.3"
        });

        let parsed = parse_row(&row).unwrap();
        assert_eq!(parsed.symbol, "RELIANCE");
        assert_eq!(parsed.price, 2450.5);
        assert_eq!(parsed.change_pct, 1.8);
        assert_eq!(parsed.volume_ratio, 2.3);
    }

    #[test]
    fn test_parse_row_drops_malformed_rows() {
        let missing_symbol = json!({"close": 100, "per_chg": 1, "per_chg_vol": 2});
        let blank_symbol = json!({"nsecode": "  ", "close": 100, "per_chg": 1, "per_chg_vol": 2});
        let bad_price = json!({"nsecode": "TCS", "close": "n/a", "per_chg": 1, "per_chg_vol": 2});
        let zero_price = json!({"nsecode": "TCS", "close": 0, "per_chg": 1, "per_chg_vol": 2});
        let missing_change = json!({"nsecode": "TCS", "close": 3900, "per_chg_vol": 2});
        let null_volume = json!({"nsecode": "TCS", "close": 3900, "per_chg": 1, "per_chg_vol": null});
        let negative_volume = json!({"nsecode": "TCS", "close": 3900, "per_chg": 1.0, "per_chg_vol": -3.5});

        for row in [
            missing_symbol,
            blank_symbol,
            bad_price,
            zero_price,
            missing_change,
            null_volume,
            negative_volume,
        ] {
            assert!(parse_row(&row).is_none(), "row should be dropped: {row}");
        }
    }

    #[test]
    fn test_negative_change_is_valid() {
        let row = json!({"nsecode": "INFY", "close": 1500, "per_chg": "-2.75", "per_chg_vol": 0.8});
        let parsed = parse_row(&row).unwrap();
        assert_eq!(parsed.change_pct, -2.75);
    }
}
