//! Prediction API server
//!
//! Serves next-day direction predictions plus chart-ready price history
//! over HTTP. The model registry is built once at startup from the
//! configured roster and is read-only afterwards, so request handlers
//! share it without locking; requests for tickers outside the roster
//! fall back to the designated default model.

use crate::config::Config;
use crate::error::Result;
use crate::features;
use crate::model::StockPredictor;
use crate::types::{ChartData, Period, PredictionResult};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::client::MarketDataClient;

/// Shared, immutable state handed to every request handler.
pub struct AppState {
    registry: HashMap<String, Arc<StockPredictor>>,
    fallback: String,
    client: MarketDataClient,
}

impl AppState {
    pub fn new(
        registry: HashMap<String, Arc<StockPredictor>>,
        fallback: String,
        client: MarketDataClient,
    ) -> Self {
        Self {
            registry,
            fallback,
            client,
        }
    }

    /// Build the registry from the configured roster, loading one
    /// bundle per ticker. Missing or unreadable bundles are logged and
    /// skipped, matching the roster to whatever is actually on disk.
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = MarketDataClient::new(&config.data.base_url, config.data.timeout_secs)?;
        let mut registry = HashMap::new();

        for ticker in &config.models.tickers {
            let path = std::path::Path::new(&config.models.dir)
                .join(format!("model_{}.json", ticker));
            if !path.exists() {
                warn!("Model file not found for {} at {}", ticker, path.display());
                continue;
            }

            let mut predictor = StockPredictor::new(&config.training);
            match predictor.load(&path) {
                Ok(()) => {
                    registry.insert(ticker.clone(), Arc::new(predictor));
                }
                Err(e) => {
                    warn!("Failed to load model for {}: {}", ticker, e);
                }
            }
        }

        info!(
            "Model registry loaded: {} of {} roster tickers",
            registry.len(),
            config.models.tickers.len()
        );

        Ok(Self::new(
            registry,
            config.models.fallback.clone(),
            client,
        ))
    }

    /// Select the predictor for a ticker, falling back to the default
    /// model when the ticker has no dedicated one.
    pub fn predictor_for(&self, ticker: &str) -> Option<&Arc<StockPredictor>> {
        self.registry
            .get(ticker)
            .or_else(|| self.registry.get(&self.fallback))
    }

    pub fn roster_size(&self) -> usize {
        self.registry.len()
    }
}

#[derive(Debug, Deserialize)]
struct PredictQuery {
    period: Option<String>,
}

/// Full response for one prediction request.
#[derive(Debug, Serialize)]
pub struct PredictResponse {
    #[serde(flatten)]
    pub result: PredictionResult,
    #[serde(rename = "chartData")]
    pub chart_data: ChartData,
}

/// Build the chart series from a prepared feature frame: dates, closing
/// prices and the 50-day display moving average (null until defined).
fn chart_from_frame(frame: &features::FeatureFrame) -> ChartData {
    let closes = frame.column("Close").unwrap_or_default();
    let sma = features::display_sma(closes);

    ChartData {
        labels: frame
            .dates()
            .iter()
            .map(|d| d.format("%Y-%m-%d").to_string())
            .collect(),
        prices: closes
            .iter()
            .map(|&v| if v.is_nan() { None } else { Some(v) })
            .collect(),
        sma: sma
            .iter()
            .map(|&v| if v.is_nan() { None } else { Some(v) })
            .collect(),
    }
}

// ============ HTTP API Handlers ============

/// Predict tomorrow's direction for a ticker
async fn predict(
    State(state): State<Arc<AppState>>,
    Path(ticker): Path<String>,
    Query(query): Query<PredictQuery>,
) -> std::result::Result<Json<PredictResponse>, (StatusCode, String)> {
    let ticker = ticker.to_uppercase();

    let period: Period = match query.period.as_deref() {
        Some(raw) => raw
            .parse()
            .map_err(|e: String| (StatusCode::BAD_REQUEST, e))?,
        None => Period::default(),
    };

    let predictor = state.predictor_for(&ticker).ok_or((
        StatusCode::INTERNAL_SERVER_ERROR,
        "no trained model available; train roster models first".to_string(),
    ))?;

    let frame = features::prepare(&state.client, &ticker, period)
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("An error occurred during prediction: {}", e),
            )
        })?;

    // the response always names the requested ticker, even when the
    // fallback model produced the prediction
    let result = predictor.predict_from_frame(&frame, &ticker).map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("An error occurred during prediction: {}", e),
        )
    })?;

    let chart_data = chart_from_frame(&frame);

    Ok(Json(PredictResponse { result, chart_data }))
}

/// Liveness acknowledgment
async fn ping() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}

/// Service banner
async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": "Prediction service is running" }))
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/ping", get(ping))
        .route("/predict/{ticker}", get(predict))
        .with_state(state)
}

/// Start the API server
pub async fn serve(state: Arc<AppState>, host: &str, port: u16) -> Result<()> {
    let app = create_router(state);

    let addr = format!("{}:{}", host, port);
    info!("Prediction API listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrainingConfig;
    use crate::features::{derive_features, label_targets};
    use crate::types::DailyBar;
    use chrono::NaiveDate;

    fn test_client() -> MarketDataClient {
        MarketDataClient::new("http://localhost:0", 1).unwrap()
    }

    fn trained_predictor() -> (StockPredictor, features::FeatureFrame) {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let bars: Vec<DailyBar> = (0..120)
            .map(|i| {
                let price = 100.0 + (i as f64 * 0.5).sin() * 5.0 + i as f64 * 0.1;
                DailyBar::new(
                    start + chrono::Duration::days(i as i64),
                    price - 0.5,
                    price + 1.0,
                    price - 1.0,
                    price,
                    1_000_000.0,
                )
            })
            .collect();

        let mut frame = derive_features(&bars);
        label_targets(&mut frame);

        let mut predictor = StockPredictor::new(&TrainingConfig {
            n_trees: 10,
            ..Default::default()
        });
        predictor.train_on_frame(&frame, "SPY").unwrap();
        (predictor, frame)
    }

    fn state_with_fallback_only() -> (Arc<AppState>, features::FeatureFrame) {
        let (predictor, frame) = trained_predictor();
        let mut registry = HashMap::new();
        registry.insert("SPY".to_string(), Arc::new(predictor));

        let state = AppState::new(registry, "SPY".to_string(), test_client());
        (Arc::new(state), frame)
    }

    #[test]
    fn test_predictor_selection_prefers_dedicated_model() {
        let (predictor, _) = trained_predictor();
        let mut registry = HashMap::new();
        registry.insert("AAPL".to_string(), Arc::new(predictor.clone()));
        registry.insert("SPY".to_string(), Arc::new(predictor));

        let state = AppState::new(registry, "SPY".to_string(), test_client());

        assert!(state.predictor_for("AAPL").is_some());
        assert!(state.predictor_for("MSFT").is_some()); // falls back
        assert_eq!(state.roster_size(), 2);
    }

    #[test]
    fn test_unknown_ticker_falls_back_and_keeps_requested_name() {
        let (state, frame) = state_with_fallback_only();

        // ticker outside the roster resolves to the fallback model
        let predictor = state.predictor_for("ZZZZ").unwrap();
        let result = predictor.predict_from_frame(&frame, "ZZZZ").unwrap();

        assert_eq!(result.ticker, "ZZZZ");
        assert!(result.confidence > 50.0);
    }

    #[test]
    fn test_empty_registry_has_no_predictor() {
        let state = AppState::new(HashMap::new(), "SPY".to_string(), test_client());
        assert!(state.predictor_for("AAPL").is_none());
    }

    #[test]
    fn test_registry_from_config_loads_saved_bundles() {
        let (predictor, _) = trained_predictor();
        let dir = tempfile::tempdir().unwrap();
        predictor.save(&dir.path().join("model_AAPL.json")).unwrap();

        let mut config = Config::default();
        config.models.dir = dir.path().to_string_lossy().into_owned();
        config.models.tickers = vec!["AAPL".to_string(), "NOFILE".to_string()];
        config.models.fallback = "AAPL".to_string();

        let state = AppState::from_config(&config).unwrap();
        assert_eq!(state.roster_size(), 1);
        assert!(state.predictor_for("AAPL").is_some());
        // missing bundle falls through to the fallback
        assert!(state.predictor_for("NOFILE").is_some());
    }

    #[test]
    fn test_response_json_shape() {
        let (state, frame) = state_with_fallback_only();
        let predictor = state.predictor_for("SPY").unwrap();
        let result = predictor.predict_from_frame(&frame, "SPY").unwrap();
        let chart_data = chart_from_frame(&frame);

        let response = PredictResponse { result, chart_data };
        let value = serde_json::to_value(&response).unwrap();

        for key in [
            "prediction",
            "direction",
            "confidence",
            "current_price",
            "ticker",
            "chartData",
        ] {
            assert!(value.get(key).is_some(), "missing key {key}");
        }

        let chart = &value["chartData"];
        assert_eq!(chart["labels"].as_array().unwrap().len(), 120);
        assert_eq!(chart["prices"].as_array().unwrap().len(), 120);
        assert_eq!(chart["sma"].as_array().unwrap().len(), 120);
        // the display average is undefined before its window fills
        assert!(chart["sma"][0].is_null());
        assert!(!chart["sma"][119].is_null());
    }

    #[test]
    fn test_chart_nulls_before_window() {
        let (_, frame) = trained_predictor();
        let chart = chart_from_frame(&frame);

        assert!(chart.sma[48].is_none());
        assert!(chart.sma[49].is_some());
        assert!(chart.prices.iter().all(|p| p.is_some()));
    }

    #[tokio::test]
    async fn test_ping_handler() {
        let response = ping().await;
        assert_eq!(response.0["ok"], serde_json::json!(true));
    }

    #[tokio::test]
    async fn test_root_handler() {
        let response = root().await;
        assert!(response.0["message"].as_str().unwrap().contains("running"));
    }
}
