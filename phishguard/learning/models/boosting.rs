use ndarray::{Array1, ArrayView2};
use rand::{rngs::SmallRng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::{
    forest::average_importances,
    sigmoid,
    tree::{Criterion, DecisionTree, Node, TreeParams},
    validate_input, validate_training, Classifier, ModelError, ModelKind,
};

/// Gradient boosting hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoostingConfig {
    /// Boosting stages.
    pub n_estimators: usize,
    /// Shrinkage applied to every stage.
    pub learning_rate: f64,
    /// Depth of each regression tree.
    pub max_depth: Option<usize>,
    /// Smallest node that may be split.
    pub min_samples_split: usize,
    /// Smallest allowed leaf.
    pub min_samples_leaf: usize,
    /// Seed for split feature ordering.
    pub seed: u64,
}

impl Default for BoostingConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: Some(5),
            min_samples_split: 2,
            min_samples_leaf: 1,
            seed: 42,
        }
    }
}

/// Binomial log-loss boosting: each stage fits a regression tree to the
/// residuals `y - p` and replaces its leaf values with one Newton step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoosting {
    config: BoostingConfig,
    init: f64,
    trees: Vec<DecisionTree>,
    n_features: usize,
}

impl GradientBoosting {
    /// Creates an unfitted model.
    #[must_use]
    pub fn new(config: BoostingConfig) -> Self {
        Self {
            config,
            init: 0.0,
            trees: Vec::new(),
            n_features: 0,
        }
    }

    /// Hyperparameters.
    #[must_use]
    pub fn config(&self) -> &BoostingConfig {
        &self.config
    }

    /// Prior log-odds every prediction starts from.
    #[must_use]
    pub fn init(&self) -> f64 {
        self.init
    }

    /// Fitted stages.
    #[must_use]
    pub fn stages(&self) -> &[DecisionTree] {
        &self.trees
    }

    fn decision_function(&self, features: ArrayView2<'_, f64>) -> Array1<f64> {
        features
            .rows()
            .into_iter()
            .map(|row| {
                self.init
                    + self.config.learning_rate
                        * self
                            .trees
                            .iter()
                            .map(|tree| tree.predict_row(row))
                            .sum::<f64>()
            })
            .collect()
    }
}

/// Newton leaf value `sum(residual) / sum(p * (1 - p))` for every leaf.
fn newton_leaf_values(
    tree: &mut DecisionTree,
    features: ArrayView2<'_, f64>,
    residuals: &[f64],
    probabilities: &[f64],
) {
    let mut sums = vec![(0.0_f64, 0.0_f64); tree.nodes().len()];
    for (row_idx, row) in features.rows().into_iter().enumerate() {
        let leaf = tree.leaf_index(row);
        let p = probabilities[row_idx];
        sums[leaf].0 += residuals[row_idx];
        sums[leaf].1 += p * (1.0 - p);
    }
    let leaves: Vec<usize> = tree
        .nodes()
        .iter()
        .enumerate()
        .filter(|(_, node)| matches!(node, Node::Leaf { .. }))
        .map(|(idx, _)| idx)
        .collect();
    for leaf in leaves {
        let (numerator, denominator) = sums[leaf];
        let value = if denominator.abs() < 1e-150 {
            0.0
        } else {
            numerator / denominator
        };
        tree.set_leaf_value(leaf, value);
    }
}

impl Classifier for GradientBoosting {
    fn fit(&mut self, features: ArrayView2<'_, f64>, labels: &[u8]) -> Result<(), ModelError> {
        validate_training(features, labels)?;
        let n = labels.len();
        let positives = labels.iter().filter(|label| **label == 1).count();
        if positives == 0 || positives == n {
            return Err(ModelError::SingleClass(
                ModelKind::GradientBoosting,
                u8::from(positives == n),
            ));
        }
        let prior = positives as f64 / n as f64;
        let init = (prior / (1.0 - prior)).ln();

        let params = TreeParams {
            criterion: Criterion::SquaredError,
            max_depth: self.config.max_depth,
            min_samples_split: self.config.min_samples_split.max(2),
            min_samples_leaf: self.config.min_samples_leaf.max(1),
            max_features: None,
        };
        let targets: Vec<f64> = labels.iter().map(|label| f64::from(*label)).collect();
        let all_rows: Vec<usize> = (0..n).collect();
        let mut rng = SmallRng::seed_from_u64(self.config.seed);
        let mut raw = vec![init; n];
        let mut trees = Vec::with_capacity(self.config.n_estimators);

        for _ in 0..self.config.n_estimators {
            let probabilities: Vec<f64> = raw.iter().map(|z| sigmoid(*z)).collect();
            let residuals: Vec<f64> = targets
                .iter()
                .zip(&probabilities)
                .map(|(y, p)| y - p)
                .collect();
            let mut tree = DecisionTree::fit(features, &residuals, &all_rows, &params, &mut rng);
            newton_leaf_values(&mut tree, features, &residuals, &probabilities);
            for (value, row) in raw.iter_mut().zip(features.rows()) {
                *value += self.config.learning_rate * tree.predict_row(row);
            }
            trees.push(tree);
        }

        self.init = init;
        self.trees = trees;
        self.n_features = features.ncols();
        Ok(())
    }

    fn predict_proba(&self, features: ArrayView2<'_, f64>) -> Result<Array1<f64>, ModelError> {
        if self.n_features == 0 {
            return Err(ModelError::NotFitted(ModelKind::GradientBoosting));
        }
        validate_input(features, self.n_features)?;
        Ok(self.decision_function(features).mapv(sigmoid))
    }

    fn feature_importances(&self) -> Option<Array1<f64>> {
        if self.n_features == 0 {
            return None;
        }
        Some(average_importances(
            self.trees.iter().map(DecisionTree::feature_importances),
            self.n_features,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    fn ring(n: usize) -> (Array2<f64>, Vec<u8>) {
        // positive inside the unit circle; linear models cannot separate it
        let features = Array2::from_shape_fn((n, 2), |(row, col)| {
            let angle = row as f64 * 0.7;
            let radius = if row % 2 == 0 { 0.5 } else { 1.5 };
            if col == 0 {
                radius * angle.cos()
            } else {
                radius * angle.sin()
            }
        });
        let labels = (0..n).map(|row| u8::from(row % 2 == 0)).collect();
        (features, labels)
    }

    #[test]
    fn boosting_fits_nonlinear_boundary() {
        let (x, y) = ring(120);
        let mut model = GradientBoosting::new(BoostingConfig {
            n_estimators: 30,
            max_depth: Some(3),
            ..BoostingConfig::default()
        });
        model.fit(x.view(), &y).unwrap();
        assert_eq!(model.stages().len(), 30);
        let predictions = model.predict(x.view()).unwrap();
        let correct = predictions.iter().zip(&y).filter(|(p, t)| p == t).count();
        assert!(correct >= 114, "only {correct} of 120 correct");
    }

    #[test]
    fn zero_stages_predict_the_prior() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let mut model = GradientBoosting::new(BoostingConfig {
            n_estimators: 0,
            ..BoostingConfig::default()
        });
        model.fit(x.view(), &[1, 1, 1, 0]).unwrap();
        assert!((model.init() - 3.0_f64.ln()).abs() < 1e-12);
        let proba = model.predict_proba(x.view()).unwrap();
        assert!(proba.iter().all(|p| (p - 0.75).abs() < 1e-12));
    }

    #[test]
    fn single_class_is_rejected() {
        let x = array![[0.0], [1.0]];
        let mut model = GradientBoosting::new(BoostingConfig::default());
        assert_eq!(
            model.fit(x.view(), &[0, 0]),
            Err(ModelError::SingleClass(ModelKind::GradientBoosting, 0))
        );
    }

    #[test]
    fn fitting_is_deterministic() {
        let (x, y) = ring(60);
        let config = BoostingConfig {
            n_estimators: 10,
            ..BoostingConfig::default()
        };
        let mut a = GradientBoosting::new(config);
        let mut b = GradientBoosting::new(config);
        a.fit(x.view(), &y).unwrap();
        b.fit(x.view(), &y).unwrap();
        assert_eq!(a, b);
        let importances = a.feature_importances().unwrap();
        assert!((importances.sum() - 1.0).abs() < 1e-9);
    }
}
