use std::{
    num::NonZeroUsize,
    thread::{self, ScopedJoinHandle},
};

use ndarray::{Array1, ArrayView2};
use rand::{rngs::SmallRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::{
    tree::{Criterion, DecisionTree, TreeParams},
    validate_input, validate_training, Classifier, ModelError, ModelKind,
};

/// Random forest hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForestConfig {
    /// Number of trees.
    pub n_estimators: usize,
    /// Depth cap per tree.
    pub max_depth: Option<usize>,
    /// Smallest node that may be split.
    pub min_samples_split: usize,
    /// Smallest allowed leaf.
    pub min_samples_leaf: usize,
    /// Draw a bootstrap sample of the rows for each tree.
    pub bootstrap: bool,
    /// Seed for tree seeds, bootstrap draws and feature sampling.
    pub seed: u64,
    /// Worker threads; `None` uses the available parallelism.
    pub n_jobs: Option<usize>,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_estimators: 200,
            max_depth: Some(20),
            min_samples_split: 10,
            min_samples_leaf: 1,
            bootstrap: true,
            seed: 42,
            n_jobs: None,
        }
    }
}

/// Bagged Gini trees with `sqrt(n_features)` candidate features per split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    config: ForestConfig,
    trees: Vec<DecisionTree>,
    n_features: usize,
}

impl RandomForest {
    /// Creates an unfitted forest.
    #[must_use]
    pub fn new(config: ForestConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            n_features: 0,
        }
    }

    /// Hyperparameters.
    #[must_use]
    pub fn config(&self) -> &ForestConfig {
        &self.config
    }

    /// Fitted trees in seed order.
    #[must_use]
    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }

    fn worker_count(&self) -> usize {
        self.config
            .n_jobs
            .unwrap_or_else(|| thread::available_parallelism().map_or(1, NonZeroUsize::get))
            .clamp(1, self.config.n_estimators.max(1))
    }
}

fn grow_tree(
    x: ArrayView2<'_, f64>,
    targets: &[f64],
    params: &TreeParams,
    bootstrap: bool,
    seed: u64,
) -> DecisionTree {
    let mut rng = SmallRng::seed_from_u64(seed);
    let n = x.nrows();
    let samples: Vec<usize> = if bootstrap {
        (0..n).map(|_| rng.gen_range(0..n)).collect()
    } else {
        (0..n).collect()
    };
    DecisionTree::fit(x, targets, &samples, params, &mut rng)
}

impl Classifier for RandomForest {
    fn fit(&mut self, features: ArrayView2<'_, f64>, labels: &[u8]) -> Result<(), ModelError> {
        validate_training(features, labels)?;
        let n_features = features.ncols();
        let params = TreeParams {
            criterion: Criterion::Gini,
            max_depth: self.config.max_depth,
            min_samples_split: self.config.min_samples_split.max(2),
            min_samples_leaf: self.config.min_samples_leaf.max(1),
            max_features: Some(((n_features as f64).sqrt() as usize).max(1)),
        };
        let targets: Vec<f64> = labels.iter().map(|label| f64::from(*label)).collect();

        // Seeds are drawn up front so the ensemble does not depend on how
        // trees are spread over workers.
        let mut master = SmallRng::seed_from_u64(self.config.seed);
        let seeds: Vec<u64> = (0..self.config.n_estimators).map(|_| master.gen()).collect();
        let chunk = seeds.len().div_ceil(self.worker_count()).max(1);
        let bootstrap = self.config.bootstrap;

        let trees = thread::scope(|scope| {
            let handles: Vec<_> = seeds
                .chunks(chunk)
                .map(|batch| {
                    let (targets, params) = (&targets, &params);
                    scope.spawn(move || {
                        batch
                            .iter()
                            .map(|seed| grow_tree(features, targets, params, bootstrap, *seed))
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            join_batches(handles)
        })?;

        self.trees = trees;
        self.n_features = n_features;
        Ok(())
    }

    fn predict_proba(&self, features: ArrayView2<'_, f64>) -> Result<Array1<f64>, ModelError> {
        if self.trees.is_empty() {
            return Err(ModelError::NotFitted(ModelKind::RandomForest));
        }
        validate_input(features, self.n_features)?;
        let n_trees = self.trees.len() as f64;
        Ok(features
            .rows()
            .into_iter()
            .map(|row| {
                self.trees
                    .iter()
                    .map(|tree| tree.predict_row(row))
                    .sum::<f64>()
                    / n_trees
            })
            .collect())
    }

    fn feature_importances(&self) -> Option<Array1<f64>> {
        if self.trees.is_empty() {
            return None;
        }
        Some(average_importances(
            self.trees.iter().map(DecisionTree::feature_importances),
            self.n_features,
        ))
    }
}

/// Joins every worker before reporting, so a second panicked worker cannot
/// escape through `thread::scope`.
fn join_batches<T>(handles: Vec<ScopedJoinHandle<'_, Vec<T>>>) -> Result<Vec<T>, ModelError> {
    let joined: Vec<_> = handles.into_iter().map(ScopedJoinHandle::join).collect();
    let mut items = Vec::new();
    for batch in joined {
        items.extend(batch.map_err(|_| ModelError::WorkerPanicked)?);
    }
    Ok(items)
}

/// Mean of per-tree importances, renormalized to sum to 1.
pub(crate) fn average_importances(
    per_tree: impl Iterator<Item = Array1<f64>>,
    n_features: usize,
) -> Array1<f64> {
    let mut total = Array1::<f64>::zeros(n_features);
    let mut count = 0_usize;
    for importances in per_tree {
        total += &importances;
        count += 1;
    }
    if count > 0 {
        total /= count as f64;
    }
    let sum = total.sum();
    if sum > 0.0 {
        total /= sum;
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn blobs(n: usize, seed: u64) -> (Array2<f64>, Vec<u8>) {
        let mut rng = SmallRng::seed_from_u64(seed);
        let labels: Vec<u8> = (0..n).map(|row| u8::from(row % 2 == 0)).collect();
        let features = Array2::from_shape_fn((n, 3), |(row, col)| {
            let shift = if labels[row] == 1 { 2.0 } else { -2.0 };
            match col {
                0 => shift + rng.gen_range(-1.0..1.0),
                _ => rng.gen_range(-1.0..1.0),
            }
        });
        (features, labels)
    }

    fn small_config(n_jobs: Option<usize>) -> ForestConfig {
        ForestConfig {
            n_estimators: 12,
            n_jobs,
            ..ForestConfig::default()
        }
    }

    #[test]
    fn forest_learns_separable_blobs() {
        let (x, y) = blobs(80, 5);
        let mut forest = RandomForest::new(small_config(None));
        forest.fit(x.view(), &y).unwrap();
        assert_eq!(forest.trees().len(), 12);
        let predictions = forest.predict(x.view()).unwrap();
        let correct = predictions.iter().zip(&y).filter(|(p, t)| p == t).count();
        assert!(correct >= 76, "only {correct} of 80 correct");

        let importances = forest.feature_importances().unwrap();
        assert!((importances.sum() - 1.0).abs() < 1e-9);
        assert!(importances[0] > importances[1] && importances[0] > importances[2]);
    }

    #[test]
    fn every_panicked_worker_is_reported_as_error() {
        let result = thread::scope(|scope| {
            let handles: Vec<ScopedJoinHandle<'_, Vec<u8>>> = (0..3_u8)
                .map(|idx| {
                    scope.spawn(move || {
                        assert!(idx == 1, "worker {idx} failed");
                        vec![idx]
                    })
                })
                .collect();
            join_batches(handles)
        });
        assert_eq!(result, Err(ModelError::WorkerPanicked));
    }

    #[test]
    fn joined_batches_keep_worker_order() {
        let result = thread::scope(|scope| {
            let handles: Vec<_> = (0..4_u8).map(|idx| scope.spawn(move || vec![idx, idx])).collect();
            join_batches(handles)
        });
        assert_eq!(result, Ok(vec![0, 0, 1, 1, 2, 2, 3, 3]));
    }

    #[test]
    fn thread_count_does_not_change_the_forest() {
        let (x, y) = blobs(60, 11);
        let mut single = RandomForest::new(small_config(Some(1)));
        let mut many = RandomForest::new(small_config(Some(4)));
        single.fit(x.view(), &y).unwrap();
        many.fit(x.view(), &y).unwrap();
        assert_eq!(single.trees(), many.trees());
    }

    #[test]
    fn probabilities_stay_in_unit_interval() {
        let (x, y) = blobs(40, 2);
        let mut forest = RandomForest::new(small_config(Some(2)));
        forest.fit(x.view(), &y).unwrap();
        let proba = forest.predict_proba(x.view()).unwrap();
        assert!(proba.iter().all(|p| (0.0..=1.0).contains(p)));
        assert!(matches!(
            forest.predict_proba(Array2::zeros((1, 2)).view()),
            Err(ModelError::FeatureMismatch { expected: 3, found: 2 })
        ));
    }
}
