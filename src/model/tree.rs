//! Decision tree for binary direction classification
//!
//! Depth- and leaf-size-bounded CART tree over gini impurity, with
//! per-class sample weights so that imbalanced up/down label counts do
//! not bias the fit. Trees are fully deterministic for a given seed.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeConfig {
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features considered per split (None = all)
    pub max_features: Option<usize>,
    pub seed: u64,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_depth: 5,
            min_samples_split: 2,
            min_samples_leaf: 5,
            max_features: None,
            seed: 42,
        }
    }
}

/// One node of the fitted tree. Leaves carry the weighted class
/// distribution observed during training.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeNode {
    pub feature_idx: Option<usize>,
    pub threshold: Option<f64>,
    /// [P(down), P(up)] at this node
    pub class_probs: [f64; 2],
    pub n_samples: usize,
    pub left: Option<Box<TreeNode>>,
    pub right: Option<Box<TreeNode>>,
}

impl TreeNode {
    fn leaf(class_probs: [f64; 2], n_samples: usize) -> Self {
        Self {
            feature_idx: None,
            threshold: None,
            class_probs,
            n_samples,
            left: None,
            right: None,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    config: TreeConfig,
    root: Option<TreeNode>,
    feature_importances: Vec<f64>,
}

impl DecisionTree {
    pub fn new(config: TreeConfig) -> Self {
        Self {
            config,
            root: None,
            feature_importances: Vec::new(),
        }
    }

    /// Fit the tree on a feature matrix and 0/1 labels, weighting each
    /// sample by its class weight.
    pub fn fit(&mut self, x: &[Vec<f64>], y: &[f64], class_weights: [f64; 2]) {
        let n_features = x.first().map(|r| r.len()).unwrap_or(0);
        self.feature_importances = vec![0.0; n_features];

        let indices: Vec<usize> = (0..x.len()).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);

        self.root = Some(self.build(x, y, class_weights, &indices, 0, &mut rng));

        let total: f64 = self.feature_importances.iter().sum();
        if total > 0.0 {
            for imp in &mut self.feature_importances {
                *imp /= total;
            }
        }
    }

    fn build(
        &mut self,
        x: &[Vec<f64>],
        y: &[f64],
        weights: [f64; 2],
        indices: &[usize],
        depth: usize,
        rng: &mut ChaCha8Rng,
    ) -> TreeNode {
        let impurity = gini(y, indices, weights);
        let probs = class_distribution(y, indices, weights);

        if depth >= self.config.max_depth
            || indices.len() < self.config.min_samples_split
            || impurity < 1e-10
        {
            return TreeNode::leaf(probs, indices.len());
        }

        let Some(split) = self.best_split(x, y, weights, indices, impurity, rng) else {
            return TreeNode::leaf(probs, indices.len());
        };
        let (feature_idx, threshold, left_idx, right_idx, gain) = split;

        if left_idx.len() < self.config.min_samples_leaf
            || right_idx.len() < self.config.min_samples_leaf
        {
            return TreeNode::leaf(probs, indices.len());
        }

        self.feature_importances[feature_idx] += gain * indices.len() as f64;

        let left = self.build(x, y, weights, &left_idx, depth + 1, rng);
        let right = self.build(x, y, weights, &right_idx, depth + 1, rng);

        TreeNode {
            feature_idx: Some(feature_idx),
            threshold: Some(threshold),
            class_probs: probs,
            n_samples: indices.len(),
            left: Some(Box::new(left)),
            right: Some(Box::new(right)),
        }
    }

    #[allow(clippy::type_complexity)]
    fn best_split(
        &self,
        x: &[Vec<f64>],
        y: &[f64],
        weights: [f64; 2],
        indices: &[usize],
        parent_impurity: f64,
        rng: &mut ChaCha8Rng,
    ) -> Option<(usize, f64, Vec<usize>, Vec<usize>, f64)> {
        let n_features = x.first().map(|r| r.len()).unwrap_or(0);
        let max_features = self.config.max_features.unwrap_or(n_features);

        let mut candidates: Vec<usize> = (0..n_features).collect();
        candidates.shuffle(rng);
        candidates.truncate(max_features);

        let mut best: Option<(usize, f64, Vec<usize>, Vec<usize>, f64)> = None;
        let mut best_gain = 0.0;

        for &feature_idx in &candidates {
            let mut values: Vec<f64> = indices.iter().map(|&i| x[i][feature_idx]).collect();
            values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            values.dedup();

            for pair in values.windows(2) {
                let threshold = (pair[0] + pair[1]) / 2.0;

                let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
                    .iter()
                    .partition(|&&i| x[i][feature_idx] <= threshold);

                if left_idx.is_empty() || right_idx.is_empty() {
                    continue;
                }

                let w_left = weighted_count(y, &left_idx, weights);
                let w_right = weighted_count(y, &right_idx, weights);
                let w_total = w_left + w_right;
                if w_total <= 0.0 {
                    continue;
                }

                let child_impurity = (w_left * gini(y, &left_idx, weights)
                    + w_right * gini(y, &right_idx, weights))
                    / w_total;
                let gain = parent_impurity - child_impurity;

                if gain > best_gain {
                    best_gain = gain;
                    best = Some((feature_idx, threshold, left_idx, right_idx, gain));
                }
            }
        }

        best
    }

    /// Class distribution [P(down), P(up)] for a single sample.
    pub fn predict_proba_one(&self, features: &[f64]) -> [f64; 2] {
        match &self.root {
            Some(root) => {
                let mut node = root;
                while !node.is_leaf() {
                    let idx = node.feature_idx.expect("split node has feature");
                    let threshold = node.threshold.expect("split node has threshold");
                    // NaN comparisons are false and fall through to the right
                    node = if features[idx] <= threshold {
                        node.left.as_deref().expect("split node has left child")
                    } else {
                        node.right.as_deref().expect("split node has right child")
                    };
                }
                node.class_probs
            }
            None => [0.5, 0.5],
        }
    }

    pub fn predict_one(&self, features: &[f64]) -> f64 {
        let probs = self.predict_proba_one(features);
        if probs[1] > probs[0] {
            1.0
        } else {
            0.0
        }
    }

    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }
}

/// Weighted gini impurity of the labels at `indices`.
fn gini(y: &[f64], indices: &[usize], weights: [f64; 2]) -> f64 {
    let [w_down, w_up] = weighted_class_counts(y, indices, weights);
    let total = w_down + w_up;
    if total <= 0.0 {
        return 0.0;
    }
    let p = w_up / total;
    2.0 * p * (1.0 - p)
}

fn class_distribution(y: &[f64], indices: &[usize], weights: [f64; 2]) -> [f64; 2] {
    let [w_down, w_up] = weighted_class_counts(y, indices, weights);
    let total = w_down + w_up;
    if total <= 0.0 {
        return [0.5, 0.5];
    }
    [w_down / total, w_up / total]
}

fn weighted_class_counts(y: &[f64], indices: &[usize], weights: [f64; 2]) -> [f64; 2] {
    let mut counts = [0.0, 0.0];
    for &i in indices {
        if y[i] > 0.0 {
            counts[1] += weights[1];
        } else {
            counts[0] += weights[0];
        }
    }
    counts
}

fn weighted_count(y: &[f64], indices: &[usize], weights: [f64; 2]) -> f64 {
    let counts = weighted_class_counts(y, indices, weights);
    counts[0] + counts[1]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn separable_data() -> (Vec<Vec<f64>>, Vec<f64>) {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for i in 0..100 {
            let v = i as f64 / 10.0;
            x.push(vec![v, (v * 3.0).sin()]);
            y.push(if v > 5.0 { 1.0 } else { 0.0 });
        }
        (x, y)
    }

    #[test]
    fn test_tree_learns_separable_split() {
        let (x, y) = separable_data();
        let mut tree = DecisionTree::new(TreeConfig::default());
        tree.fit(&x, &y, [1.0, 1.0]);

        let correct = x
            .iter()
            .zip(y.iter())
            .filter(|(row, &label)| tree.predict_one(row) == label)
            .count();
        assert!(correct as f64 / x.len() as f64 > 0.95);
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let (x, y) = separable_data();
        let mut tree = DecisionTree::new(TreeConfig::default());
        tree.fit(&x, &y, [1.0, 1.0]);

        for row in &x {
            let probs = tree.predict_proba_one(row);
            assert!((probs[0] + probs[1] - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_unfitted_tree_is_neutral() {
        let tree = DecisionTree::new(TreeConfig::default());
        assert_eq!(tree.predict_proba_one(&[1.0]), [0.5, 0.5]);
    }

    #[test]
    fn test_min_samples_leaf_respected() {
        let (x, y) = separable_data();
        let mut tree = DecisionTree::new(TreeConfig {
            min_samples_leaf: 40,
            ..Default::default()
        });
        tree.fit(&x, &y, [1.0, 1.0]);

        fn check(node: &TreeNode, min: usize) {
            if node.is_leaf() {
                assert!(node.n_samples >= min);
            } else {
                check(node.left.as_ref().unwrap(), min);
                check(node.right.as_ref().unwrap(), min);
            }
        }
        check(tree.root.as_ref().unwrap(), 40);
    }

    #[test]
    fn test_class_weights_shift_distribution() {
        // 90 down / 10 up, single uninformative feature
        let x: Vec<Vec<f64>> = (0..100).map(|_| vec![1.0]).collect();
        let y: Vec<f64> = (0..100).map(|i| if i < 10 { 1.0 } else { 0.0 }).collect();

        let mut unweighted = DecisionTree::new(TreeConfig::default());
        unweighted.fit(&x, &y, [1.0, 1.0]);
        let p_unweighted = unweighted.predict_proba_one(&[1.0]);

        // balanced weights: n / (k * n_c)
        let mut balanced = DecisionTree::new(TreeConfig::default());
        balanced.fit(&x, &y, [100.0 / (2.0 * 90.0), 100.0 / (2.0 * 10.0)]);
        let p_balanced = balanced.predict_proba_one(&[1.0]);

        assert!(p_unweighted[1] < 0.2);
        assert!((p_balanced[1] - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_serde_round_trip_identical_predictions() {
        let (x, y) = separable_data();
        let mut tree = DecisionTree::new(TreeConfig::default());
        tree.fit(&x, &y, [1.0, 1.0]);

        let json = serde_json::to_string(&tree).unwrap();
        let restored: DecisionTree = serde_json::from_str(&json).unwrap();

        for row in &x {
            assert_eq!(tree.predict_proba_one(row), restored.predict_proba_one(row));
        }
    }
}
