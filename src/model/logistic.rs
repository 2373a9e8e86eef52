//! Logistic regression, the linear alternative to the forest
//!
//! Batch gradient descent on log loss with z-score feature scaling
//! learned at fit time. Deterministic: zero-initialized weights, fixed
//! iteration cap, tolerance-based early exit.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticConfig {
    pub learning_rate: f64,
    pub max_iter: usize,
    pub tolerance: f64,
}

impl Default for LogisticConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            max_iter: 1000,
            tolerance: 1e-6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    config: LogisticConfig,
    weights: Vec<f64>,
    bias: f64,
    /// Per-feature scaling learned from the training matrix
    feature_means: Vec<f64>,
    feature_stds: Vec<f64>,
}

impl LogisticRegression {
    pub fn new(config: LogisticConfig) -> Self {
        Self {
            config,
            weights: Vec::new(),
            bias: 0.0,
            feature_means: Vec::new(),
            feature_stds: Vec::new(),
        }
    }

    /// Fit on a feature matrix and 0/1 labels.
    pub fn fit(&mut self, x: &[Vec<f64>], y: &[f64]) {
        let n_samples = x.len();
        let n_features = x.first().map(|r| r.len()).unwrap_or(0);
        if n_samples == 0 || n_features == 0 {
            return;
        }

        self.learn_scaling(x, n_features);
        let scaled: Vec<Vec<f64>> = x.iter().map(|row| self.scale(row)).collect();

        let mut weights = vec![0.0; n_features];
        let mut bias = 0.0;
        let mut prev_cost = f64::INFINITY;

        for _ in 0..self.config.max_iter {
            let mut grad_w = vec![0.0; n_features];
            let mut grad_b = 0.0;
            let mut cost = 0.0;

            for (row, &label) in scaled.iter().zip(y.iter()) {
                let z = dot(&weights, row) + bias;
                let p = sigmoid(z);
                let err = p - label;

                for (g, &v) in grad_w.iter_mut().zip(row.iter()) {
                    *g += err * v;
                }
                grad_b += err;

                let clipped = p.clamp(1e-15, 1.0 - 1e-15);
                cost -= label * clipped.ln() + (1.0 - label) * (1.0 - clipped).ln();
            }

            let n = n_samples as f64;
            for (w, g) in weights.iter_mut().zip(grad_w.iter()) {
                *w -= self.config.learning_rate * g / n;
            }
            bias -= self.config.learning_rate * grad_b / n;

            cost /= n;
            if (prev_cost - cost).abs() < self.config.tolerance {
                break;
            }
            prev_cost = cost;
        }

        self.weights = weights;
        self.bias = bias;
    }

    /// Class distribution [P(down), P(up)] for a single sample.
    pub fn predict_proba_one(&self, features: &[f64]) -> [f64; 2] {
        if self.weights.is_empty() {
            return [0.5, 0.5];
        }
        let scaled = self.scale(features);
        let p = sigmoid(dot(&self.weights, &scaled) + self.bias);
        [1.0 - p, p]
    }

    pub fn predict_one(&self, features: &[f64]) -> f64 {
        let probs = self.predict_proba_one(features);
        if probs[1] > probs[0] {
            1.0
        } else {
            0.0
        }
    }

    pub fn predict(&self, x: &[Vec<f64>]) -> Vec<f64> {
        x.iter().map(|row| self.predict_one(row)).collect()
    }

    pub fn accuracy(&self, x: &[Vec<f64>], y: &[f64]) -> f64 {
        if x.is_empty() {
            return 0.0;
        }
        let correct = x
            .iter()
            .zip(y.iter())
            .filter(|(row, &label)| {
                let target = if label > 0.0 { 1.0 } else { 0.0 };
                self.predict_one(row) == target
            })
            .count();
        correct as f64 / x.len() as f64
    }

    fn learn_scaling(&mut self, x: &[Vec<f64>], n_features: usize) {
        let n = x.len() as f64;
        let mut means = vec![0.0; n_features];
        for row in x {
            for (m, &v) in means.iter_mut().zip(row.iter()) {
                *m += v;
            }
        }
        for m in &mut means {
            *m /= n;
        }

        let mut stds = vec![0.0; n_features];
        for row in x {
            for ((s, &v), &m) in stds.iter_mut().zip(row.iter()).zip(means.iter()) {
                *s += (v - m).powi(2);
            }
        }
        for s in &mut stds {
            *s = (*s / n).sqrt();
            if *s < 1e-12 {
                *s = 1.0;
            }
        }

        self.feature_means = means;
        self.feature_stds = stds;
    }

    fn scale(&self, features: &[f64]) -> Vec<f64> {
        features
            .iter()
            .zip(self.feature_means.iter())
            .zip(self.feature_stds.iter())
            .map(|((&v, &m), &s)| (v - m) / s)
            .collect()
    }
}

/// Numerically stable sigmoid.
fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}
