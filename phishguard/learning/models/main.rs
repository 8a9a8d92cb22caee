//! Classifiers trained by the pipeline.

/// Gradient-boosted trees with log-loss.
pub mod boosting;
/// Bagged random forest.
pub mod forest;
/// L2-regularised logistic regression.
pub mod logistic;
/// CART decision tree shared by both ensembles.
pub mod tree;

use std::fmt;

use ndarray::{Array1, ArrayView2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use boosting::{BoostingConfig, GradientBoosting};
use forest::{ForestConfig, RandomForest};
use logistic::{LogisticConfig, LogisticRegression};

/// Model families in their fixed training and tie-break order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelKind {
    /// Bagged decision trees.
    RandomForest,
    /// Boosted decision trees.
    GradientBoosting,
    /// Linear logistic classifier.
    LogisticRegression,
}

impl ModelKind {
    /// Every kind, in training order.
    pub const ALL: [Self; 3] = [
        Self::RandomForest,
        Self::GradientBoosting,
        Self::LogisticRegression,
    ];

    /// Name recorded as `model_type` in the metadata artifact.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::RandomForest => "RandomForest",
            Self::GradientBoosting => "GradientBoosting",
            Self::LogisticRegression => "LogisticRegression",
        }
    }

    /// Whether the model trains and predicts on standardized features.
    #[must_use]
    pub const fn uses_scaled_features(self) -> bool {
        matches!(self, Self::LogisticRegression)
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Binary classifier over dense `f64` feature rows.
pub trait Classifier {
    /// Fits the model on rows and `{0, 1}` labels.
    fn fit(&mut self, features: ArrayView2<'_, f64>, labels: &[u8]) -> Result<(), ModelError>;

    /// Probability of class 1 for every row.
    fn predict_proba(&self, features: ArrayView2<'_, f64>) -> Result<Array1<f64>, ModelError>;

    /// Hard labels: 1 when the class-1 probability exceeds one half.
    fn predict(&self, features: ArrayView2<'_, f64>) -> Result<Vec<u8>, ModelError> {
        Ok(self
            .predict_proba(features)?
            .iter()
            .map(|p| u8::from(*p > 0.5))
            .collect())
    }

    /// Normalized per-feature importances, for models that expose them.
    fn feature_importances(&self) -> Option<Array1<f64>> {
        None
    }
}

/// Hyperparameters for the three configured models.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelSuite {
    /// Random forest settings.
    pub forest: ForestConfig,
    /// Gradient boosting settings.
    pub boosting: BoostingConfig,
    /// Logistic regression settings.
    pub logistic: LogisticConfig,
}

impl ModelSuite {
    /// Unfitted model of the given kind.
    #[must_use]
    pub fn build(&self, kind: ModelKind) -> TrainedModel {
        match kind {
            ModelKind::RandomForest => TrainedModel::RandomForest(RandomForest::new(self.forest)),
            ModelKind::GradientBoosting => {
                TrainedModel::GradientBoosting(GradientBoosting::new(self.boosting))
            }
            ModelKind::LogisticRegression => {
                TrainedModel::LogisticRegression(LogisticRegression::new(self.logistic))
            }
        }
    }
}

/// Any of the configured models; the serialized form of the winner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TrainedModel {
    /// Random forest.
    RandomForest(RandomForest),
    /// Gradient boosting.
    GradientBoosting(GradientBoosting),
    /// Logistic regression.
    LogisticRegression(LogisticRegression),
}

impl TrainedModel {
    /// Family of the wrapped model.
    #[must_use]
    pub const fn kind(&self) -> ModelKind {
        match self {
            Self::RandomForest(_) => ModelKind::RandomForest,
            Self::GradientBoosting(_) => ModelKind::GradientBoosting,
            Self::LogisticRegression(_) => ModelKind::LogisticRegression,
        }
    }

    fn inner(&self) -> &dyn Classifier {
        match self {
            Self::RandomForest(model) => model,
            Self::GradientBoosting(model) => model,
            Self::LogisticRegression(model) => model,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Classifier {
        match self {
            Self::RandomForest(model) => model,
            Self::GradientBoosting(model) => model,
            Self::LogisticRegression(model) => model,
        }
    }
}

impl Classifier for TrainedModel {
    fn fit(&mut self, features: ArrayView2<'_, f64>, labels: &[u8]) -> Result<(), ModelError> {
        self.inner_mut().fit(features, labels)
    }

    fn predict_proba(&self, features: ArrayView2<'_, f64>) -> Result<Array1<f64>, ModelError> {
        self.inner().predict_proba(features)
    }

    fn feature_importances(&self) -> Option<Array1<f64>> {
        self.inner().feature_importances()
    }
}

/// Errors raised while fitting or applying a model.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    /// No training rows.
    #[error("cannot fit on an empty training set")]
    EmptyTrainingSet,
    /// No feature columns.
    #[error("training set has no feature columns")]
    NoFeatures,
    /// Row and label counts differ.
    #[error("feature matrix has {rows} rows but {labels} labels")]
    LengthMismatch {
        /// Feature rows.
        rows: usize,
        /// Labels.
        labels: usize,
    },
    /// Labels outside `{0, 1}`.
    #[error("label {0} is not binary")]
    InvalidLabel(u8),
    /// NaN or infinite feature value.
    #[error("feature matrix contains NaN or infinite values")]
    NonFinite,
    /// The learner needs both classes present.
    #[error("{0} needs samples of both classes, got only class {1}")]
    SingleClass(ModelKind, u8),
    /// Prediction before fit.
    #[error("{0} has not been fitted")]
    NotFitted(ModelKind),
    /// Prediction input width differs from training.
    #[error("model was fit on {expected} features, input has {found}")]
    FeatureMismatch {
        /// Columns at fit time.
        expected: usize,
        /// Columns in the input.
        found: usize,
    },
    /// A tree-building worker thread panicked.
    #[error("tree-building worker panicked")]
    WorkerPanicked,
}

/// Shared input checks for every `fit`.
pub(crate) fn validate_training(
    features: ArrayView2<'_, f64>,
    labels: &[u8],
) -> Result<(), ModelError> {
    if features.nrows() != labels.len() {
        return Err(ModelError::LengthMismatch {
            rows: features.nrows(),
            labels: labels.len(),
        });
    }
    if labels.is_empty() {
        return Err(ModelError::EmptyTrainingSet);
    }
    if features.ncols() == 0 {
        return Err(ModelError::NoFeatures);
    }
    if let Some(label) = labels.iter().find(|label| **label > 1) {
        return Err(ModelError::InvalidLabel(*label));
    }
    if features.iter().any(|value| !value.is_finite()) {
        return Err(ModelError::NonFinite);
    }
    Ok(())
}

/// Shared input checks for every `predict_proba`.
pub(crate) fn validate_input(
    features: ArrayView2<'_, f64>,
    expected: usize,
) -> Result<(), ModelError> {
    if features.ncols() != expected {
        return Err(ModelError::FeatureMismatch {
            expected,
            found: features.ncols(),
        });
    }
    Ok(())
}

/// Logistic function, stable for large `|z|`.
pub(crate) fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}
