//! Market data client
//!
//! Fetches daily OHLCV history from the Yahoo Finance chart API.
//! One request per fetch: no caching, no retries, no rate limiting.

use crate::error::{PredictorError, Result};
use crate::types::{DailyBar, Period};
use chrono::DateTime;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

/// HTTP client for daily stock history.
#[derive(Clone)]
pub struct MarketDataClient {
    http: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartEnvelope,
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    timestamp: Option<Vec<i64>>,
    events: Option<ChartEvents>,
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize, Default)]
struct ChartEvents {
    dividends: Option<HashMap<String, DividendEvent>>,
    splits: Option<HashMap<String, SplitEvent>>,
}

#[derive(Debug, Deserialize)]
struct DividendEvent {
    amount: f64,
    date: i64,
}

#[derive(Debug, Deserialize)]
struct SplitEvent {
    date: i64,
    numerator: f64,
    denominator: f64,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    quote: Vec<ChartQuote>,
}

#[derive(Debug, Deserialize)]
struct ChartQuote {
    open: Option<Vec<Option<f64>>>,
    high: Option<Vec<Option<f64>>>,
    low: Option<Vec<Option<f64>>>,
    close: Option<Vec<Option<f64>>>,
    volume: Option<Vec<Option<f64>>>,
}

impl MarketDataClient {
    /// Create a new market data client
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .user_agent("stockcast/0.1")
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Fetch daily OHLCV history for a ticker over the given period.
    ///
    /// Provider errors (unknown symbol, timeouts) propagate unchanged;
    /// an empty or error-bearing response becomes `DataFetch`.
    pub async fn fetch_daily(&self, ticker: &str, period: Period) -> Result<Vec<DailyBar>> {
        let url = format!("{}/v8/finance/chart/{}", self.base_url, ticker);

        debug!("Fetching {} daily bars for range {}", ticker, period);

        let resp: ChartResponse = self
            .http
            .get(&url)
            .query(&[
                ("range", period.as_str()),
                ("interval", "1d"),
                ("events", "div,split"),
            ])
            .send()
            .await?
            .json()
            .await?;

        if let Some(err) = resp.chart.error {
            return Err(PredictorError::DataFetch(format!(
                "{}: {} ({})",
                ticker, err.description, err.code
            )));
        }

        let result = resp
            .chart
            .result
            .and_then(|mut r| if r.is_empty() { None } else { Some(r.remove(0)) })
            .ok_or_else(|| {
                PredictorError::DataFetch(format!("{}: empty chart response", ticker))
            })?;

        let bars = parse_series(result);
        if bars.is_empty() {
            return Err(PredictorError::DataFetch(format!(
                "{}: no usable daily bars in response",
                ticker
            )));
        }

        debug!("Fetched {} bars for {}", bars.len(), ticker);
        Ok(bars)
    }
}

/// Map the raw chart payload into ordered daily bars.
///
/// Rows with any missing quote field (holidays, partial sessions) are
/// skipped; dividends and splits are joined onto their trading day.
fn parse_series(result: ChartResult) -> Vec<DailyBar> {
    let timestamps = result.timestamp.unwrap_or_default();
    let Some(quote) = result.indicators.quote.into_iter().next() else {
        return Vec::new();
    };

    let opens = quote.open.unwrap_or_default();
    let highs = quote.high.unwrap_or_default();
    let lows = quote.low.unwrap_or_default();
    let closes = quote.close.unwrap_or_default();
    let volumes = quote.volume.unwrap_or_default();

    let events = result.events.unwrap_or_default();
    let dividends: HashMap<i64, f64> = events
        .dividends
        .unwrap_or_default()
        .into_values()
        .map(|d| (day_of(d.date), d.amount))
        .collect();
    let splits: HashMap<i64, f64> = events
        .splits
        .unwrap_or_default()
        .into_values()
        .filter(|s| s.denominator != 0.0)
        .map(|s| (day_of(s.date), s.numerator / s.denominator))
        .collect();

    let mut bars = Vec::with_capacity(timestamps.len());
    let mut last_date = None;

    for (i, &ts) in timestamps.iter().enumerate() {
        let row = (
            opens.get(i).copied().flatten(),
            highs.get(i).copied().flatten(),
            lows.get(i).copied().flatten(),
            closes.get(i).copied().flatten(),
            volumes.get(i).copied().flatten(),
        );
        let (Some(open), Some(high), Some(low), Some(close), Some(volume)) = row else {
            continue;
        };
        let Some(date) = DateTime::from_timestamp(ts, 0).map(|dt| dt.date_naive()) else {
            continue;
        };
        // Keep dates strictly increasing; drop duplicate sessions
        if last_date.is_some_and(|d| date <= d) {
            continue;
        }
        last_date = Some(date);

        let mut bar = DailyBar::new(date, open, high, low, close, volume);
        bar.dividends = dividends.get(&day_of(ts)).copied().unwrap_or(0.0);
        bar.splits = splits.get(&day_of(ts)).copied().unwrap_or(0.0);
        bars.push(bar);
    }

    bars
}

fn day_of(ts: i64) -> i64 {
    ts.div_euclid(86_400)
}
