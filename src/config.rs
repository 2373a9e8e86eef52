//! Service configuration
//!
//! Loaded from a TOML file with environment-variable overrides
//! (prefix `STOCKCAST`, e.g. `STOCKCAST_SERVER__PORT=9000`).

use crate::error::{PredictorError, Result};
use crate::types::Period;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub training: TrainingConfig,
}

impl Config {
    /// Load configuration from a TOML file, falling back to defaults
    /// for anything the file does not set.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("STOCKCAST")
                    .separator("__"),
            )
            .build()
            .map_err(|e| PredictorError::Config(e.to_string()))?;

        settings
            .try_deserialize()
            .map_err(|e| PredictorError::Config(e.to_string()))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            data: DataConfig::default(),
            models: ModelsConfig::default(),
            training: TrainingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataConfig {
    /// Market data provider base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelsConfig {
    /// Directory holding one serialized bundle per ticker
    #[serde(default = "default_models_dir")]
    pub dir: String,
    /// Roster of tickers with dedicated pre-trained models
    #[serde(default = "default_tickers")]
    pub tickers: Vec<String>,
    /// Model used for tickers outside the roster
    #[serde(default = "default_fallback")]
    pub fallback: String,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            dir: default_models_dir(),
            tickers: default_tickers(),
            fallback: default_fallback(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrainingConfig {
    #[serde(default)]
    pub algorithm: Algorithm,
    #[serde(default = "default_n_trees")]
    pub n_trees: usize,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default = "default_min_samples_leaf")]
    pub min_samples_leaf: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_test_fraction")]
    pub test_fraction: f64,
    /// Historical window used when training roster models
    #[serde(default = "default_training_period")]
    pub period: Period,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::default(),
            n_trees: default_n_trees(),
            max_depth: default_max_depth(),
            min_samples_leaf: default_min_samples_leaf(),
            seed: default_seed(),
            test_fraction: default_test_fraction(),
            period: default_training_period(),
        }
    }
}

/// Classifier family used by the predictor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    RandomForest,
    LogisticRegression,
}

impl Default for Algorithm {
    fn default() -> Self {
        Algorithm::RandomForest
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_base_url() -> String {
    "https://query1.finance.yahoo.com".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_models_dir() -> String {
    "trained_models".to_string()
}

fn default_tickers() -> Vec<String> {
    [
        "AAPL", "GOOG", "MSFT", "TSLA", "AMZN", "NFLX", "META", "NVDA", "AMD", "INTC", "BABA",
        "SPY",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_fallback() -> String {
    "SPY".to_string()
}

fn default_n_trees() -> usize {
    100
}

fn default_max_depth() -> usize {
    5
}

fn default_min_samples_leaf() -> usize {
    5
}

fn default_seed() -> u64 {
    42
}

fn default_test_fraction() -> f64 {
    0.2
}

fn default_training_period() -> Period {
    Period::OneYear
}
