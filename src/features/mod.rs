//! Feature engineering
//!
//! Turns a raw OHLCV series into the fixed feature set the classifier
//! trains on, plus the binary next-day direction target. Undefined
//! values (unfilled windows, shifted heads) are NaN; training rows
//! containing NaN are dropped, while the inference row is aligned to
//! the trained column list with zeros substituted for anything missing.

pub mod indicators;

use crate::client::MarketDataClient;
use crate::error::{PredictorError, Result};
use crate::types::{DailyBar, Period};
use chrono::NaiveDate;
use tracing::warn;

use indicators::{ema, pct_change, rolling_mean, rolling_std, rsi, shift};

pub const TARGET_COLUMN: &str = "Target";

/// Window of the display moving average drawn on charts.
pub const DISPLAY_SMA_WINDOW: usize = 50;

/// A date-indexed table of named numeric columns, in insertion order.
#[derive(Debug, Clone)]
pub struct FeatureFrame {
    dates: Vec<NaiveDate>,
    columns: Vec<(String, Vec<f64>)>,
}

impl FeatureFrame {
    pub fn new(dates: Vec<NaiveDate>) -> Self {
        Self {
            dates,
            columns: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_slice())
    }

    /// Column names in frame order.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|(n, _)| n.clone()).collect()
    }

    /// Feature column names: everything except the target.
    pub fn feature_names(&self) -> Vec<String> {
        self.columns
            .iter()
            .map(|(n, _)| n.clone())
            .filter(|n| n != TARGET_COLUMN)
            .collect()
    }

    /// Append a named column; must match the frame's row count.
    pub fn insert(&mut self, name: &str, values: Vec<f64>) {
        debug_assert_eq!(values.len(), self.dates.len());
        self.columns.push((name.to_string(), values));
    }

    /// Closing price of the most recent row.
    pub fn latest_close(&self) -> Result<f64> {
        self.column("Close")
            .and_then(|c| c.last().copied())
            .ok_or_else(|| PredictorError::Prediction("series has no close prices".into()))
    }

    /// Extract the training matrix: one row per day with every feature
    /// defined, excluding the final day (its next-day target does not
    /// exist yet). Returns (X, y, feature names).
    pub fn training_data(&self) -> Result<(Vec<Vec<f64>>, Vec<f64>, Vec<String>)> {
        let names = self.feature_names();
        let target = self
            .column(TARGET_COLUMN)
            .ok_or_else(|| PredictorError::Prediction("target column missing".into()))?;

        let feature_cols: Vec<&[f64]> = names
            .iter()
            .map(|n| self.column(n).expect("feature column exists"))
            .collect();

        let mut x = Vec::new();
        let mut y = Vec::new();

        // last row excluded: no observed next-day close
        for i in 0..self.len().saturating_sub(1) {
            let row: Vec<f64> = feature_cols.iter().map(|c| c[i]).collect();
            if row.iter().any(|v| v.is_nan()) {
                continue;
            }
            x.push(row);
            y.push(target[i]);
        }

        if x.is_empty() {
            return Err(PredictorError::Prediction(
                "no fully-defined rows left after windowing; series too short".into(),
            ));
        }

        Ok((x, y, names))
    }

    /// Build the inference row for the most recent day, reindexed to
    /// `trained_columns`: missing columns are filled with 0 (and logged),
    /// extra columns are discarded, NaN is neutralized to 0.
    pub fn aligned_latest(&self, trained_columns: &[String]) -> Result<Vec<f64>> {
        if self.is_empty() {
            return Err(PredictorError::Prediction("empty feature frame".into()));
        }
        let last = self.len() - 1;

        let mut row = Vec::with_capacity(trained_columns.len());
        for name in trained_columns {
            let value = match self.column(name) {
                Some(col) => col[last],
                None => {
                    warn!("Feature alignment: trained column '{}' missing from fresh data, filling with 0", name);
                    0.0
                }
            };
            row.push(if value.is_nan() { 0.0 } else { value });
        }

        Ok(row)
    }

    /// Inference row in the frame's own column order, for models that
    /// predate stored feature lists.
    pub fn natural_latest(&self) -> Result<Vec<f64>> {
        let names = self.feature_names();
        self.aligned_latest(&names)
    }
}

/// Derive the full indicator set from raw daily bars.
pub fn derive_features(bars: &[DailyBar]) -> FeatureFrame {
    let dates: Vec<NaiveDate> = bars.iter().map(|b| b.date).collect();
    let open: Vec<f64> = bars.iter().map(|b| b.open).collect();
    let high: Vec<f64> = bars.iter().map(|b| b.high).collect();
    let low: Vec<f64> = bars.iter().map(|b| b.low).collect();
    let close: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let volume: Vec<f64> = bars.iter().map(|b| b.volume).collect();
    let dividends: Vec<f64> = bars.iter().map(|b| b.dividends).collect();
    let splits: Vec<f64> = bars.iter().map(|b| b.splits).collect();

    let mut frame = FeatureFrame::new(dates);

    // Trend direction
    let ma_10 = rolling_mean(&close, 10);
    let ma_50 = rolling_mean(&close, 50);

    // Momentum
    let price_change = pct_change(&close, 1);
    let price_change_5d = pct_change(&close, 5);

    // Volatility
    let volatility = rolling_std(&close, 10);

    // Trading activity
    let volume_ma = rolling_mean(&volume, 10);
    let volume_ratio: Vec<f64> = volume
        .iter()
        .zip(volume_ma.iter())
        .map(|(v, m)| v / m)
        .collect();

    let rsi_14 = rsi(&close, 14);

    // Above/below moving average; NaN comparisons resolve to 0
    let trend_10d: Vec<f64> = close
        .iter()
        .zip(ma_10.iter())
        .map(|(c, m)| if c > m { 1.0 } else { 0.0 })
        .collect();
    let trend_50d: Vec<f64> = close
        .iter()
        .zip(ma_50.iter())
        .map(|(c, m)| if c > m { 1.0 } else { 0.0 })
        .collect();

    // MACD: fast EMA minus slow EMA, with a smoothed signal line
    let ema_12 = ema(&close, 12);
    let ema_26 = ema(&close, 26);
    let macd: Vec<f64> = ema_12
        .iter()
        .zip(ema_26.iter())
        .map(|(f, s)| f - s)
        .collect();
    let macd_signal = ema(&macd, 9);

    // What happened yesterday
    let lag_price_change = shift(&price_change, 1);
    let lag_volume_ratio = shift(&volume_ratio, 1);

    frame.insert("Open", open);
    frame.insert("High", high);
    frame.insert("Low", low);
    frame.insert("Close", close);
    frame.insert("Volume", volume);
    frame.insert("Dividends", dividends);
    frame.insert("Stock_Splits", splits);
    frame.insert("MA_10", ma_10);
    frame.insert("MA_50", ma_50);
    frame.insert("Price_Change", price_change);
    frame.insert("Price_Change_5d", price_change_5d);
    frame.insert("Volatility", volatility);
    frame.insert("Volume_MA", volume_ma);
    frame.insert("Volume_Ratio", volume_ratio);
    frame.insert("RSI", rsi_14);
    frame.insert("Trend_10d", trend_10d);
    frame.insert("Trend_50d", trend_50d);
    frame.insert("MACD", macd);
    frame.insert("MACD_Signal", macd_signal);
    frame.insert("Lag_1d_Price_Change", lag_price_change);
    frame.insert("Lag_1d_Volume_Ratio", lag_volume_ratio);

    frame
}

/// Append the binary next-day direction target: 1 when the next close
/// is strictly higher, 0 otherwise, NaN on the final row.
pub fn label_targets(frame: &mut FeatureFrame) {
    let close = frame
        .column("Close")
        .map(|c| c.to_vec())
        .unwrap_or_default();
    let n = close.len();

    let mut target = vec![f64::NAN; n];
    for i in 0..n.saturating_sub(1) {
        target[i] = if close[i + 1] > close[i] { 1.0 } else { 0.0 };
    }

    frame.insert(TARGET_COLUMN, target);
}

/// Fetch a ticker's history and produce its labeled feature frame.
pub async fn prepare(
    client: &MarketDataClient,
    ticker: &str,
    period: Period,
) -> Result<FeatureFrame> {
    let bars = client.fetch_daily(ticker, period).await?;
    let mut frame = derive_features(&bars);
    label_targets(&mut frame);
    Ok(frame)
}

/// Chart-only moving average of closing prices. Independent of the
/// training feature set.
pub fn display_sma(closes: &[f64]) -> Vec<f64> {
    rolling_mean(closes, DISPLAY_SMA_WINDOW)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn synthetic_bars(n: usize) -> Vec<DailyBar> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        (0..n)
            .map(|i| {
                let price = 100.0 + (i as f64 * 0.35).sin() * 8.0 + i as f64 * 0.05;
                let mut bar = DailyBar::new(
                    start + chrono::Duration::days(i as i64),
                    price - 0.5,
                    price + 1.0,
                    price - 1.0,
                    price,
                    1_000_000.0 + (i as f64 * 0.8).cos() * 150_000.0,
                );
                bar.dividends = 0.0;
                bar.splits = 0.0;
                bar
            })
            .collect()
    }

    #[test]
    fn test_derive_features_column_set() {
        let bars = synthetic_bars(80);
        let frame = derive_features(&bars);

        for name in [
            "Open",
            "Close",
            "MA_10",
            "MA_50",
            "Price_Change",
            "Price_Change_5d",
            "Volatility",
            "Volume_MA",
            "Volume_Ratio",
            "RSI",
            "Trend_10d",
            "Trend_50d",
            "MACD",
            "MACD_Signal",
            "Lag_1d_Price_Change",
            "Lag_1d_Volume_Ratio",
        ] {
            assert!(frame.column(name).is_some(), "missing column {name}");
        }
        assert!(frame.column(TARGET_COLUMN).is_none());
    }

    #[test]
    fn test_training_rows_bounded_by_longest_window() {
        let n = 120;
        let bars = synthetic_bars(n);
        let mut frame = derive_features(&bars);
        label_targets(&mut frame);

        let (x, y, _) = frame.training_data().unwrap();
        // the 50-day window is the longest; the final row has no target
        assert!(x.len() <= n - 50 + 1);
        assert_eq!(x.len(), n - 50);
        assert_eq!(x.len(), y.len());
    }

    #[test]
    fn test_training_rows_have_no_nan() {
        let bars = synthetic_bars(90);
        let mut frame = derive_features(&bars);
        label_targets(&mut frame);

        let (x, _, _) = frame.training_data().unwrap();
        for row in &x {
            assert!(row.iter().all(|v| !v.is_nan()));
        }
    }

    #[test]
    fn test_short_series_yields_error() {
        let bars = synthetic_bars(30);
        let mut frame = derive_features(&bars);
        label_targets(&mut frame);

        assert!(frame.training_data().is_err());
    }

    #[test]
    fn test_target_labels_direction() {
        let mut bars = synthetic_bars(60);
        // force a known pattern at the tail
        let n = bars.len();
        bars[n - 3].close = 100.0;
        bars[n - 2].close = 101.0;
        bars[n - 1].close = 100.5;

        let mut frame = derive_features(&bars);
        label_targets(&mut frame);
        let target = frame.column(TARGET_COLUMN).unwrap();

        assert_eq!(target[n - 3], 1.0);
        assert_eq!(target[n - 2], 0.0);
        assert!(target[n - 1].is_nan());
    }

    #[test]
    fn test_trend_columns_are_zero_while_ma_undefined() {
        let bars = synthetic_bars(60);
        let frame = derive_features(&bars);
        let trend_50 = frame.column("Trend_50d").unwrap();

        // before day 50 the MA is NaN and the comparison must yield 0
        for &v in &trend_50[..49] {
            assert_eq!(v, 0.0);
        }
    }

    #[test]
    fn test_macd_signal_deterministic() {
        let bars = synthetic_bars(100);
        let a = derive_features(&bars);
        let b = derive_features(&bars);

        let sig_a = a.column("MACD_Signal").unwrap();
        let sig_b = b.column("MACD_Signal").unwrap();
        assert_eq!(sig_a, sig_b);
    }

    #[test]
    fn test_aligned_latest_restricts_to_trained_columns() {
        let bars = synthetic_bars(80);
        let mut frame = derive_features(&bars);
        label_targets(&mut frame);

        // trained on a strict subset, in a custom order
        let trained = vec![
            "RSI".to_string(),
            "Close".to_string(),
            "MACD".to_string(),
        ];
        let row = frame.aligned_latest(&trained).unwrap();

        assert_eq!(row.len(), trained.len());
        let last = frame.len() - 1;
        assert_eq!(row[1], frame.column("Close").unwrap()[last]);
    }

    #[test]
    fn test_aligned_latest_fills_missing_column_with_zero() {
        let bars = synthetic_bars(80);
        let frame = derive_features(&bars);

        let trained = vec!["Close".to_string(), "Sector_Momentum".to_string()];
        let row = frame.aligned_latest(&trained).unwrap();

        assert_eq!(row.len(), 2);
        assert_eq!(row[1], 0.0);
    }

    #[test]
    fn test_aligned_latest_neutralizes_nan() {
        let bars = synthetic_bars(20);
        let frame = derive_features(&bars);

        // MA_50 is still undefined at row 19
        let trained = vec!["MA_50".to_string()];
        let row = frame.aligned_latest(&trained).unwrap();
        assert_eq!(row[0], 0.0);
    }

    #[test]
    fn test_display_sma_window() {
        let closes: Vec<f64> = (0..60).map(|i| i as f64).collect();
        let sma = display_sma(&closes);

        assert!(sma[48].is_nan());
        assert!(!sma[49].is_nan());
        // mean of 0..=49
        assert!((sma[49] - 24.5).abs() < 1e-9);
    }
}
