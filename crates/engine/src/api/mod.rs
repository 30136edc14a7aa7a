//! Market data gateway — provider trait and HTTP client implementations

pub mod yahoo;

pub use yahoo::YahooClient;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use thiserror::Error;

/// Gateway failure taxonomy. `Transport` means the provider itself could not
/// be reached (connect/timeout/5xx) — three of those in a row abort a batch.
/// `Rejected` is a per-ticker problem (bad symbol, malformed payload) and only
/// fails the item.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway unreachable: {0}")]
    Transport(String),

    #[error("gateway rejected request: {0}")]
    Rejected(String),
}

pub type GatewayResult<T> = Result<T, GatewayError>;

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        GatewayError::Transport(err.to_string())
    }
}

/// A current quote for a ticker
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub price: f64,
    pub currency: Option<String>,
}

/// One daily candle. High/low bound the target-hit check; close resolves
/// non-hourly predictions.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyBar {
    pub date: NaiveDate,
    pub close: f64,
    pub high: f64,
    pub low: f64,
}

/// The market-data provider contract consumed by the assessment engine.
/// An empty bar list means the market was closed — that is data-unavailable,
/// not an error.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn get_quote(&self, ticker: &str) -> GatewayResult<Quote>;

    /// Daily bars covering [from, to] inclusive
    async fn get_daily_bars(
        &self,
        ticker: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> GatewayResult<Vec<DailyBar>>;

    /// Closing price for one date, None when the market was closed that day
    async fn get_historical_close(
        &self,
        ticker: &str,
        date: NaiveDate,
    ) -> GatewayResult<Option<f64>> {
        let bars = self.get_daily_bars(ticker, date, date + Duration::days(1)).await?;
        Ok(bars.into_iter().find(|b| b.date == date).map(|b| b.close))
    }
}
