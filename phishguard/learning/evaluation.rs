use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::ModelKind;

/// 2x2 contingency table; rows are the true class, columns the prediction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    /// True 0, predicted 0.
    pub tn: usize,
    /// True 0, predicted 1.
    pub fp: usize,
    /// True 1, predicted 0.
    pub fn_: usize,
    /// True 1, predicted 1.
    pub tp: usize,
}

impl ConfusionMatrix {
    /// Tallies paired true and predicted labels.
    pub fn from_labels(truth: &[u8], predicted: &[u8]) -> Result<Self, EvaluationError> {
        if truth.len() != predicted.len() {
            return Err(EvaluationError::LengthMismatch {
                truth: truth.len(),
                predicted: predicted.len(),
            });
        }
        if truth.is_empty() {
            return Err(EvaluationError::Empty);
        }
        let mut matrix = Self::default();
        for (actual, guess) in truth.iter().zip(predicted) {
            match (*actual == 1, *guess == 1) {
                (false, false) => matrix.tn += 1,
                (false, true) => matrix.fp += 1,
                (true, false) => matrix.fn_ += 1,
                (true, true) => matrix.tp += 1,
            }
        }
        Ok(matrix)
    }

    /// All counted rows.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.tn + self.fp + self.fn_ + self.tp
    }

    /// `[[TN, FP], [FN, TP]]`.
    #[must_use]
    pub const fn as_rows(&self) -> [[usize; 2]; 2] {
        [[self.tn, self.fp], [self.fn_, self.tp]]
    }
}

/// Metric whose denominator was zero and was reported as 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UndefinedMetric {
    /// No positive predictions.
    Precision,
    /// No positive samples.
    Recall,
    /// No positive samples and no positive predictions.
    F1,
}

/// Test-set scores for one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    /// Evaluated model.
    pub model: ModelKind,
    /// Correct / total.
    pub accuracy: f64,
    /// TP / (TP + FP).
    pub precision: f64,
    /// TP / (TP + FN).
    pub recall: f64,
    /// Harmonic mean of precision and recall.
    pub f1: f64,
    /// Raw counts.
    pub confusion: ConfusionMatrix,
    /// Metrics that hit a zero denominator and were set to 0.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub undefined: Vec<UndefinedMetric>,
}

impl EvaluationRecord {
    /// Scores predictions against the true labels. Zero denominators give 0
    /// and are listed in [`Self::undefined`].
    pub fn evaluate(
        model: ModelKind,
        truth: &[u8],
        predicted: &[u8],
    ) -> Result<Self, EvaluationError> {
        Ok(Self::from_confusion(
            model,
            ConfusionMatrix::from_labels(truth, predicted)?,
        ))
    }

    /// Derives every metric from the counts.
    #[must_use]
    pub fn from_confusion(model: ModelKind, confusion: ConfusionMatrix) -> Self {
        let mut undefined = Vec::new();
        let ConfusionMatrix { tn, fp, fn_, tp } = confusion;
        let accuracy = ratio(tp + tn, confusion.total()).unwrap_or(0.0);
        let precision = ratio(tp, tp + fp).unwrap_or_else(|| {
            undefined.push(UndefinedMetric::Precision);
            0.0
        });
        let recall = ratio(tp, tp + fn_).unwrap_or_else(|| {
            undefined.push(UndefinedMetric::Recall);
            0.0
        });
        let f1 = ratio(2 * tp, 2 * tp + fp + fn_).unwrap_or_else(|| {
            undefined.push(UndefinedMetric::F1);
            0.0
        });
        Self {
            model,
            accuracy,
            precision,
            recall,
            f1,
            confusion,
            undefined,
        }
    }
}

fn ratio(numerator: usize, denominator: usize) -> Option<f64> {
    (denominator > 0).then(|| numerator as f64 / denominator as f64)
}

/// Errors raised while scoring predictions.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EvaluationError {
    /// Truth and prediction vectors differ in length.
    #[error("{truth} true labels but {predicted} predictions")]
    LengthMismatch {
        /// True labels.
        truth: usize,
        /// Predictions.
        predicted: usize,
    },
    /// Nothing to score.
    #[error("cannot evaluate an empty test set")]
    Empty,
}
