use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::MarketDataConfig;
use crate::services::market_data::{MarketData, MarketDataError};
use crate::types::Bar;

const REQUEST_TIMEOUT_SECS: u64 = 10;
const ERROR_BODY_CHARS: usize = 200;

/// Binance REST klines client.
#[derive(Clone)]
pub struct BinanceClient {
    client: Client,
    base_url: String,
    symbol: String,
    interval: String,
    limit: u32,
}

impl BinanceClient {
    /// Create a new Binance client.
    pub fn new(config: &MarketDataConfig) -> Self {
        let client = Client::builder()
            .user_agent("Paperbot/1.0")
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            symbol: config.symbol.to_uppercase(),
            interval: config.bar_interval.clone(),
            limit: config.bar_limit,
        }
    }
}

#[async_trait]
impl MarketData for BinanceClient {
    async fn fetch_bars(&self) -> Result<Vec<Bar>, MarketDataError> {
        let url = format!("{}/klines", self.base_url);
        let limit = self.limit.to_string();

        let response = self
            .client
            .get(&url)
            .query(&[
                ("symbol", self.symbol.as_str()),
                ("interval", self.interval.as_str()),
                ("limit", limit.as_str()),
            ])
            .send()
            .await
            .map_err(|e| MarketDataError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            let message = truncate_body(&text);
            warn!("Binance API returned {}: {}", status, message);
            return Err(MarketDataError::Http {
                status: status.as_u16(),
                message,
            });
        }

        let rows: Vec<Value> = response
            .json()
            .await
            .map_err(|e| MarketDataError::Parse(e.to_string()))?;

        let bars = parse_klines(&rows)?;
        debug!("Binance {} returned {} bars", self.symbol, bars.len());
        Ok(bars)
    }
}

/// First 200 characters of an error body, cut on a char boundary.
fn truncate_body(text: &str) -> String {
    text.chars().take(ERROR_BODY_CHARS).collect()
}

/// Parse kline rows: `[openTime, open, high, low, close, volume, ...]`,
/// with prices encoded as strings.
fn parse_klines(rows: &[Value]) -> Result<Vec<Bar>, MarketDataError> {
    rows.iter()
        .map(|row| {
            let fields = row
                .as_array()
                .ok_or_else(|| MarketDataError::Parse("kline row is not an array".to_string()))?;
            if fields.len() < 6 {
                return Err(MarketDataError::Parse(format!(
                    "kline row has {} fields, expected at least 6",
                    fields.len()
                )));
            }

            let time = fields[0]
                .as_i64()
                .ok_or_else(|| MarketDataError::Parse("invalid kline open time".to_string()))?;
            let num = |i: usize| -> Result<f64, MarketDataError> {
                match &fields[i] {
                    Value::String(s) => s.parse::<f64>().ok(),
                    Value::Number(n) => n.as_f64(),
                    _ => None,
                }
                .filter(|v| v.is_finite())
                .ok_or_else(|| MarketDataError::Parse(format!("invalid kline field {}", i)))
            };

            Ok(Bar {
                time,
                open: num(1)?,
                high: num(2)?,
                low: num(3)?,
                close: num(4)?,
                volume: num(5)?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_klines() {
        let json = r#"[
            [1700000000000, "70000.10", "70100.00", "69950.5", "70050.0", "12.5", 1700000059999, "0", 10, "0", "0", "0"],
            [1700000060000, "70050.0", "70060.0", "70000.0", "70010.0", "3.25", 1700000119999, "0", 4, "0", "0", "0"]
        ]"#;
        let rows: Vec<Value> = serde_json::from_str(json).unwrap();
        let bars = parse_klines(&rows).unwrap();

        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].time, 1_700_000_000_000);
        assert_eq!(bars[0].open, 70_000.10);
        assert_eq!(bars[1].close, 70_010.0);
        assert_eq!(bars[1].volume, 3.25);
    }

    #[test]
    fn test_parse_klines_rejects_short_row() {
        let rows: Vec<Value> = serde_json::from_str(r#"[[1700000000000, "1", "2"]]"#).unwrap();
        assert!(matches!(parse_klines(&rows), Err(MarketDataError::Parse(_))));
    }

    #[test]
    fn test_parse_klines_rejects_bad_price() {
        let rows: Vec<Value> =
            serde_json::from_str(r#"[[1700000000000, "x", "2", "1", "1.5", "10"]]"#).unwrap();
        assert!(matches!(parse_klines(&rows), Err(MarketDataError::Parse(_))));
    }

    #[test]
    fn test_truncate_body_multibyte() {
        // 199 ASCII bytes then a 3-byte char straddling byte 200
        let body = format!("{}€€€", "a".repeat(199));
        let cut = truncate_body(&body);
        assert_eq!(cut.chars().count(), 200);
        assert!(cut.ends_with('€'));

        assert_eq!(truncate_body("short"), "short");
        assert_eq!(truncate_body(&"é".repeat(300)).chars().count(), 200);
    }

    #[test]
    fn test_client_normalises_config() {
        let config = MarketDataConfig {
            base_url: "https://api.binance.com/api/v3/".to_string(),
            symbol: "ethusdt".to_string(),
            bar_interval: "5m".to_string(),
            bar_limit: 50,
            ema_fast: 9,
            ema_slow: 21,
        };
        let client = BinanceClient::new(&config);
        assert_eq!(client.base_url, "https://api.binance.com/api/v3");
        assert_eq!(client.symbol, "ETHUSDT");
    }
}
