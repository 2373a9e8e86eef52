//! Random forest classifier
//!
//! Bagged ensemble of weighted decision trees. Each tree fits a
//! bootstrap resample on a sqrt-sized feature subset, seeded from the
//! forest seed plus the tree index, so training is reproducible and
//! parallelizable. Class probabilities are the mean of the per-tree
//! leaf distributions.

use super::tree::{DecisionTree, TreeConfig};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestConfig {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features per split (None = sqrt of total)
    pub max_features: Option<usize>,
    pub bootstrap: bool,
    /// Reweight classes inversely to their frequency
    pub balanced: bool,
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: 5,
            min_samples_split: 2,
            min_samples_leaf: 5,
            max_features: None,
            bootstrap: true,
            balanced: true,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    config: ForestConfig,
    trees: Vec<DecisionTree>,
    feature_importances: Vec<f64>,
}

impl RandomForest {
    pub fn new(config: ForestConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            feature_importances: Vec::new(),
        }
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Fit the forest on a feature matrix and 0/1 labels.
    pub fn fit(&mut self, x: &[Vec<f64>], y: &[f64]) {
        let n_features = x.first().map(|r| r.len()).unwrap_or(0);
        let max_features = self
            .config
            .max_features
            .unwrap_or_else(|| (n_features as f64).sqrt().ceil() as usize)
            .max(1);

        let class_weights = if self.config.balanced {
            balanced_class_weights(y)
        } else {
            [1.0, 1.0]
        };

        let config = self.config.clone();
        self.trees = (0..config.n_trees)
            .into_par_iter()
            .map(|i| {
                let tree_seed = config.seed.wrapping_add(i as u64);
                let mut tree = DecisionTree::new(TreeConfig {
                    max_depth: config.max_depth,
                    min_samples_split: config.min_samples_split,
                    min_samples_leaf: config.min_samples_leaf,
                    max_features: Some(max_features),
                    seed: tree_seed,
                });

                if config.bootstrap {
                    let indices = bootstrap_indices(x.len(), tree_seed);
                    let bx: Vec<Vec<f64>> = indices.iter().map(|&j| x[j].clone()).collect();
                    let by: Vec<f64> = indices.iter().map(|&j| y[j]).collect();
                    tree.fit(&bx, &by, class_weights);
                } else {
                    tree.fit(x, y, class_weights);
                }

                tree
            })
            .collect();

        self.feature_importances = vec![0.0; n_features];
        for tree in &self.trees {
            for (i, &imp) in tree.feature_importances().iter().enumerate() {
                self.feature_importances[i] += imp;
            }
        }
        let total: f64 = self.feature_importances.iter().sum();
        if total > 0.0 {
            for imp in &mut self.feature_importances {
                *imp /= total;
            }
        }
    }

    /// Mean class distribution [P(down), P(up)] across all trees.
    pub fn predict_proba_one(&self, features: &[f64]) -> [f64; 2] {
        if self.trees.is_empty() {
            return [0.5, 0.5];
        }

        let mut sum = [0.0, 0.0];
        for tree in &self.trees {
            let p = tree.predict_proba_one(features);
            sum[0] += p[0];
            sum[1] += p[1];
        }
        let n = self.trees.len() as f64;
        [sum[0] / n, sum[1] / n]
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
        x.par_iter().map(|row| self.predict_one(row)).collect()
    }

    /// Fraction of rows whose predicted class matches the label.
    pub fn accuracy(&self, x: &[Vec<f64>], y: &[f64]) -> f64 {
        if x.is_empty() {
            return 0.0;
        }
        let predictions = self.predict(x);
        let correct = predictions
            .iter()
            .zip(y.iter())
            .filter(|(p, l)| {
                let label = if **l > 0.0 { 1.0 } else { 0.0 };
                **p == label
            })
            .count();
        correct as f64 / x.len() as f64
    }

    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }

    /// (feature index, importance) pairs sorted descending.
    pub fn importance_ranking(&self) -> Vec<(usize, f64)> {
        let mut ranking: Vec<(usize, f64)> = self
            .feature_importances
            .iter()
            .copied()
            .enumerate()
            .collect();
        ranking.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranking
    }
}

/// Inverse-frequency class weights `n / (k * n_c)` over classes present.
fn balanced_class_weights(y: &[f64]) -> [f64; 2] {
    let n = y.len() as f64;
    let n_up = y.iter().filter(|&&v| v > 0.0).count() as f64;
    let n_down = n - n_up;
    let k = [n_down, n_up].iter().filter(|&&c| c > 0.0).count() as f64;

    let weight = |count: f64| if count > 0.0 { n / (k * count) } else { 0.0 };
    [weight(n_down), weight(n_up)]
}

fn bootstrap_indices(n: usize, seed: u64) -> Vec<usize> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..n).map(|_| rng.random_range(0..n)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn separable_data() -> (Vec<Vec<f64>>, Vec<f64>) {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for i in 0..200 {
            let v = i as f64 / 20.0;
            x.push(vec![v, (v * 2.0).cos(), v * 0.5 - 3.0]);
            y.push(if v > 5.0 { 1.0 } else { 0.0 });
        }
        (x, y)
    }

    #[test]
    fn test_forest_learns_separable_data() {
        let (x, y) = separable_data();
        let mut forest = RandomForest::new(ForestConfig {
            n_trees: 20,
            ..Default::default()
        });
        forest.fit(&x, &y);

        assert_eq!(forest.n_trees(), 20);
        assert!(forest.accuracy(&x, &y) > 0.95);
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let (x, y) = separable_data();
        let mut forest = RandomForest::new(ForestConfig {
            n_trees: 15,
            ..Default::default()
        });
        forest.fit(&x, &y);

        for row in x.iter().step_by(17) {
            let probs = forest.predict_proba_one(row);
            assert!((probs[0] + probs[1] - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_same_seed_same_model() {
        let (x, y) = separable_data();

        let mut a = RandomForest::new(ForestConfig {
            n_trees: 10,
            ..Default::default()
        });
        a.fit(&x, &y);

        let mut b = RandomForest::new(ForestConfig {
            n_trees: 10,
            ..Default::default()
        });
        b.fit(&x, &y);

        for row in &x {
            assert_eq!(a.predict_proba_one(row), b.predict_proba_one(row));
        }
    }

    #[test]
    fn test_single_class_training_is_certain() {
        // every label up: balanced weighting must not divide by zero
        let x: Vec<Vec<f64>> = (0..60).map(|i| vec![i as f64]).collect();
        let y = vec![1.0; 60];

        let mut forest = RandomForest::new(ForestConfig {
            n_trees: 10,
            ..Default::default()
        });
        forest.fit(&x, &y);

        let probs = forest.predict_proba_one(&[30.0]);
        assert_eq!(probs, [0.0, 1.0]);
    }

    #[test]
    fn test_balanced_class_weights() {
        let y: Vec<f64> = (0..100).map(|i| if i < 25 { 1.0 } else { 0.0 }).collect();
        let [w_down, w_up] = balanced_class_weights(&y);

        // 75 down, 25 up: weights 100/(2*75) and 100/(2*25)
        assert!((w_down - 100.0 / 150.0).abs() < 1e-12);
        assert!((w_up - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_unfitted_forest_is_neutral() {
        let forest = RandomForest::new(ForestConfig::default());
        assert_eq!(forest.predict_proba_one(&[0.0]), [0.5, 0.5]);
    }

    #[test]
    fn test_importances_normalized() {
        let (x, y) = separable_data();
        let mut forest = RandomForest::new(ForestConfig {
            n_trees: 10,
            ..Default::default()
        });
        forest.fit(&x, &y);

        let total: f64 = forest.feature_importances().iter().sum();
        assert!((total - 1.0).abs() < 1e-9);

        let ranking = forest.importance_ranking();
        assert_eq!(ranking.len(), 3);
        assert!(ranking[0].1 >= ranking[1].1);
    }
}
