//! Yahoo Finance chart API client (public endpoints, no authentication)

use super::{DailyBar, GatewayError, GatewayResult, MarketDataProvider, Quote};
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";

/// Yahoo Finance market data client
#[derive(Clone)]
pub struct YahooClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct ChartMeta {
    currency: Option<String>,
    #[serde(rename = "regularMarketPrice")]
    regular_market_price: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteBlock>,
}

#[derive(Debug, Deserialize, Default)]
struct QuoteBlock {
    close: Option<Vec<Option<f64>>>,
    high: Option<Vec<Option<f64>>>,
    low: Option<Vec<Option<f64>>>,
}

impl Default for YahooClient {
    fn default() -> Self {
        Self::new()
    }
}

impl YahooClient {
    /// Create a new client with the default base URL
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Override the base URL (tests point this at a local stub)
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .user_agent("stockcast/1.0")
                .build()
                .expect("Failed to build HTTP client"),
            base_url: base_url.into(),
        }
    }

    async fn fetch_chart(&self, ticker: &str, query: &str) -> GatewayResult<ChartResult> {
        let url = format!("{}/v8/finance/chart/{}?{}", self.base_url, ticker, query);
        debug!(ticker, query, "Fetching chart data from Yahoo");

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // 5xx means the provider is down; 4xx means it rejected this ticker
            if status.is_server_error() {
                return Err(GatewayError::Transport(format!("Yahoo API error {status}: {body}")));
            }
            return Err(GatewayError::Rejected(format!("Yahoo API error {status}: {body}")));
        }

        let parsed: ChartResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Rejected(format!("malformed chart payload: {e}")))?;

        if let Some(error) = parsed.chart.error {
            return Err(GatewayError::Rejected(format!("chart error for {ticker}: {error}")));
        }
        parsed
            .chart
            .result
            .and_then(|mut r| if r.is_empty() { None } else { Some(r.remove(0)) })
            .ok_or_else(|| GatewayError::Rejected(format!("empty chart result for {ticker}")))
    }
}

/// Flatten a chart result into daily bars, dropping null candles
/// (Yahoo pads holidays with nulls instead of omitting them)
fn bars_from_chart(result: &ChartResult) -> Vec<DailyBar> {
    let Some(timestamps) = result.timestamp.as_ref() else {
        return Vec::new();
    };
    let quote = result.indicators.quote.first();
    let closes = quote.and_then(|q| q.close.as_ref());
    let highs = quote.and_then(|q| q.high.as_ref());
    let lows = quote.and_then(|q| q.low.as_ref());

    timestamps
        .iter()
        .enumerate()
        .filter_map(|(i, ts)| {
            let close = closes.and_then(|v| v.get(i).copied().flatten())?;
            let high = highs.and_then(|v| v.get(i).copied().flatten()).unwrap_or(close);
            let low = lows.and_then(|v| v.get(i).copied().flatten()).unwrap_or(close);
            let date = DateTime::from_timestamp(*ts, 0)?.date_naive();
            Some(DailyBar {
                date,
                close,
                high,
                low,
            })
        })
        .collect()
}

fn epoch_at_midnight(date: NaiveDate) -> i64 {
    date.and_time(NaiveTime::MIN).and_utc().timestamp()
}

#[async_trait]
impl MarketDataProvider for YahooClient {
    async fn get_quote(&self, ticker: &str) -> GatewayResult<Quote> {
        let result = self.fetch_chart(ticker, "range=1d&interval=1d").await?;
        let price = result
            .meta
            .regular_market_price
            .ok_or_else(|| GatewayError::Rejected(format!("no market price for {ticker}")))?;
        Ok(Quote {
            price,
            currency: result.meta.currency,
        })
    }

    async fn get_daily_bars(
        &self,
        ticker: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> GatewayResult<Vec<DailyBar>> {
        // period2 is exclusive upstream, so push it one day past `to`
        let query = format!(
            "period1={}&period2={}&interval=1d",
            epoch_at_midnight(from),
            epoch_at_midnight(to + Duration::days(1)),
        );
        let result = self.fetch_chart(ticker, &query).await?;
        let bars = bars_from_chart(&result);
        debug!(ticker, count = bars.len(), "Fetched daily bars");
        Ok(bars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chart_payload_flattens_to_bars() {
        let payload = r#"{
            "chart": {
                "result": [{
                    "meta": { "currency": "USD", "regularMarketPrice": 151.2 },
                    "timestamp": [1700006400, 1700092800, 1700179200],
                    "indicators": {
                        "quote": [{
                            "close": [150.0, null, 152.5],
                            "high": [151.0, null, 153.0],
                            "low": [149.0, null, 151.5]
                        }]
                    }
                }],
                "error": null
            }
        }"#;
        let parsed: ChartResponse = serde_json::from_str(payload).unwrap();
        let result = &parsed.chart.result.unwrap()[0];
        let bars = bars_from_chart(result);

        // The null holiday candle is dropped
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].close, 150.0);
        assert_eq!(bars[0].high, 151.0);
        assert_eq!(bars[0].low, 149.0);
        assert_eq!(bars[1].close, 152.5);
        assert_eq!(result.meta.regular_market_price, Some(151.2));
    }

    #[test]
    fn missing_timestamps_yield_no_bars() {
        let payload = r#"{
            "chart": {
                "result": [{
                    "meta": { "currency": "USD" },
                    "indicators": { "quote": [{}] }
                }],
                "error": null
            }
        }"#;
        let parsed: ChartResponse = serde_json::from_str(payload).unwrap();
        let result = &parsed.chart.result.unwrap()[0];
        assert!(bars_from_chart(result).is_empty());
    }
}
