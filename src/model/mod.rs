//! Stock direction predictor
//!
//! Wraps one trained classifier together with the ordered list of
//! feature columns it was fitted on. Training fetches history, builds
//! the feature frame, splits it chronologically and fits; inference
//! recomputes features, aligns the latest row to the trained columns
//! and reports the predicted direction with its confidence.
//!
//! ```ignore
//! let mut predictor = StockPredictor::new(&config.training);
//! predictor.train(&client, "AAPL", Period::FiveYears).await?;
//! predictor.save(Path::new("trained_models/model_AAPL.json"))?;
//! let result = predictor.predict_next_day(&client, "AAPL", Period::OneYear).await?;
//! ```

pub mod forest;
pub mod logistic;
pub mod tree;


use crate::client::MarketDataClient;
use crate::config::{Algorithm, TrainingConfig};
use crate::error::{PredictorError, Result};
use crate::features::{self, FeatureFrame};
use crate::types::{Period, PredictionResult};
use forest::{ForestConfig, RandomForest};
use logistic::{LogisticConfig, LogisticRegression};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tracing::info;

/// A fitted classifier of either family.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Classifier {
    Forest(RandomForest),
    Logistic(LogisticRegression),
}

impl Classifier {
    fn fit(&mut self, x: &[Vec<f64>], y: &[f64]) {
        match self {
            Classifier::Forest(m) => m.fit(x, y),
            Classifier::Logistic(m) => m.fit(x, y),
        }
    }

    fn predict_proba_one(&self, features: &[f64]) -> [f64; 2] {
        match self {
            Classifier::Forest(m) => m.predict_proba_one(features),
            Classifier::Logistic(m) => m.predict_proba_one(features),
        }
    }

    fn predict(&self, x: &[Vec<f64>]) -> Vec<f64> {
        match self {
            Classifier::Forest(m) => m.predict(x),
            Classifier::Logistic(m) => m.predict(x),
        }
    }

    fn accuracy(&self, x: &[Vec<f64>], y: &[f64]) -> f64 {
        match self {
            Classifier::Forest(m) => m.accuracy(x, y),
            Classifier::Logistic(m) => m.accuracy(x, y),
        }
    }
}

/// On-disk bundle: classifier plus its trained column list.
#[derive(Serialize)]
struct BundleRef<'a> {
    model: &'a Classifier,
    feature_columns: &'a Option<Vec<String>>,
}

/// Accepts both the bundle format and legacy blobs holding a bare
/// classifier; resolved into normalized predictor state at load time.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredModel {
    Bundle {
        model: Classifier,
        #[serde(default)]
        feature_columns: Option<Vec<String>>,
    },
    Legacy(Classifier),
}

/// Precision/recall/F1 for one class on the test split.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Metrics reported after a training run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainReport {
    pub ticker: String,
    pub n_train: usize,
    pub n_test: usize,
    pub train_accuracy: f64,
    pub test_accuracy: f64,
    /// Test-split metrics for [down, up]
    pub class_metrics: [ClassMetrics; 2],
    /// (feature name, importance) sorted descending; forest only
    pub feature_importance: Vec<(String, f64)>,
}

/// Next-day direction predictor owning one model bundle.
#[derive(Debug, Clone)]
pub struct StockPredictor {
    training: TrainingConfig,
    model: Option<Classifier>,
    feature_columns: Option<Vec<String>>,
}

impl StockPredictor {
    pub fn new(training: &TrainingConfig) -> Self {
        Self {
            training: training.clone(),
            model: None,
            feature_columns: None,
        }
    }

    /// True once a classifier is trained or loaded.
    pub fn is_ready(&self) -> bool {
        self.model.is_some()
    }

    pub fn feature_columns(&self) -> Option<&[String]> {
        self.feature_columns.as_deref()
    }

    fn build_classifier(&self) -> Classifier {
        match self.training.algorithm {
            Algorithm::RandomForest => Classifier::Forest(RandomForest::new(ForestConfig {
                n_trees: self.training.n_trees,
                max_depth: self.training.max_depth,
                min_samples_leaf: self.training.min_samples_leaf,
                seed: self.training.seed,
                ..Default::default()
            })),
            Algorithm::LogisticRegression => {
                Classifier::Logistic(LogisticRegression::new(LogisticConfig::default()))
            }
        }
    }

    /// Fetch history and train on it. Always leaves the predictor ready
    /// on success, replacing any previously loaded model.
    pub async fn train(
        &mut self,
        client: &MarketDataClient,
        ticker: &str,
        period: Period,
    ) -> Result<TrainReport> {
        let frame = features::prepare(client, ticker, period).await?;
        self.train_on_frame(&frame, ticker)
    }

    /// Train on an already-prepared feature frame.
    pub fn train_on_frame(&mut self, frame: &FeatureFrame, ticker: &str) -> Result<TrainReport> {
        let (x, y, names) = frame.training_data()?;
        let n = x.len();

        // chronological split: the earliest rows train, the remainder
        // tests, so nothing from the future leaks into the fit
        let n_test = (n as f64 * self.training.test_fraction).ceil() as usize;
        let n_train = n - n_test;
        if n_train == 0 {
            return Err(PredictorError::Prediction(format!(
                "{}: only {} usable rows, not enough to train",
                ticker, n
            )));
        }

        let (x_train, x_test) = x.split_at(n_train);
        let (y_train, y_test) = y.split_at(n_train);

        info!(
            "Training on {}: {} train rows, {} test rows, {} features",
            ticker,
            n_train,
            n_test,
            names.len()
        );

        let mut classifier = self.build_classifier();
        classifier.fit(x_train, y_train);

        let train_accuracy = classifier.accuracy(x_train, y_train);
        let test_accuracy = classifier.accuracy(x_test, y_test);
        let test_predictions = classifier.predict(x_test);
        let class_metrics = per_class_metrics(&test_predictions, y_test);

        let feature_importance = match &classifier {
            Classifier::Forest(f) => f
                .importance_ranking()
                .into_iter()
                .map(|(idx, imp)| (names[idx].clone(), imp))
                .collect(),
            Classifier::Logistic(_) => Vec::new(),
        };

        self.model = Some(classifier);
        self.feature_columns = Some(names);

        Ok(TrainReport {
            ticker: ticker.to_string(),
            n_train,
            n_test,
            train_accuracy,
            test_accuracy,
            class_metrics,
            feature_importance,
        })
    }

    /// Predict tomorrow's direction for a ticker.
    pub async fn predict_next_day(
        &self,
        client: &MarketDataClient,
        ticker: &str,
        period: Period,
    ) -> Result<PredictionResult> {
        if self.model.is_none() {
            return Err(PredictorError::UntrainedModel);
        }
        let frame = features::prepare(client, ticker, period).await?;
        self.predict_from_frame(&frame, ticker)
    }

    /// Run inference on the latest row of a prepared frame.
    pub fn predict_from_frame(
        &self,
        frame: &FeatureFrame,
        ticker: &str,
    ) -> Result<PredictionResult> {
        let model = self.model.as_ref().ok_or(PredictorError::UntrainedModel)?;

        let row = match &self.feature_columns {
            Some(columns) => frame.aligned_latest(columns)?,
            // legacy models carry no column list; use the frame's order
            None => frame.natural_latest()?,
        };

        let probs = model.predict_proba_one(&row);
        let prediction: u8 = if probs[1] > probs[0] { 1 } else { 0 };
        let confidence = probs[prediction as usize] * 100.0;
        let current_price = frame.latest_close()?;

        Ok(PredictionResult {
            prediction,
            direction: if prediction == 1 { "UP" } else { "DOWN" }.to_string(),
            confidence,
            current_price,
            ticker: ticker.to_string(),
        })
    }

    /// Serialize the bundle (classifier + trained columns) to a file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| PredictorError::Persistence("no trained model to save".into()))?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = File::create(path)?;
        serde_json::to_writer(
            BufWriter::new(file),
            &BundleRef {
                model,
                feature_columns: &self.feature_columns,
            },
        )?;

        info!("Saved model bundle to {}", path.display());
        Ok(())
    }

    /// Load a bundle from a file, accepting the legacy bare-classifier
    /// format (feature columns stay unset).
    pub fn load(&mut self, path: &Path) -> Result<()> {
        let file = File::open(path)?;
        let stored: StoredModel = serde_json::from_reader(BufReader::new(file))?;

        match stored {
            StoredModel::Bundle {
                model,
                feature_columns,
            } => {
                self.model = Some(model);
                self.feature_columns = feature_columns;
            }
            StoredModel::Legacy(model) => {
                self.model = Some(model);
                self.feature_columns = None;
            }
        }

        info!("Loaded model bundle from {}", path.display());
        Ok(())
    }
}

/// Precision/recall/F1 per class, [down, up], over the test split.
fn per_class_metrics(predictions: &[f64], labels: &[f64]) -> [ClassMetrics; 2] {
    [0.0, 1.0].map(|class| {
        let tp = predictions
            .iter()
            .zip(labels)
            .filter(|(p, l)| **p == class && **l == class)
            .count() as f64;
        let fp = predictions
            .iter()
            .zip(labels)
            .filter(|(p, l)| **p == class && **l != class)
            .count() as f64;
        let fn_ = predictions
            .iter()
            .zip(labels)
            .filter(|(p, l)| **p != class && **l == class)
            .count() as f64;
        let support = labels.iter().filter(|&&l| l == class).count();

        let precision = if tp + fp > 0.0 { tp / (tp + fp) } else { 0.0 };
        let recall = if tp + fn_ > 0.0 { tp / (tp + fn_) } else { 0.0 };
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        ClassMetrics {
            precision,
            recall,
            f1,
            support,
        }
    })
}
