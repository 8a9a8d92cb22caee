use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::split::TrainSet;

/// Frozen per-feature standardization parameters.
///
/// Created only from a [`TrainSet`]; every later transform (test rows,
/// inference rows) reuses the same mean and scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalerState {
    mean: Array1<f64>,
    scale: Array1<f64>,
    n_samples_seen: usize,
}

impl ScalerState {
    /// Computes column means and population standard deviations over the
    /// training rows. Constant columns get a scale of 1.
    pub fn fit(train: &TrainSet) -> Result<Self, ScalerError> {
        Self::fit_matrix(train.features())
    }

    fn fit_matrix(features: ArrayView2<'_, f64>) -> Result<Self, ScalerError> {
        let rows = features.nrows();
        if rows == 0 {
            return Err(ScalerError::Empty);
        }
        let mean = features
            .mean_axis(Axis(0))
            .ok_or(ScalerError::Empty)?;
        let scale = features.std_axis(Axis(0), 0.0).mapv(|std| {
            if std.is_finite() && std > f64::EPSILON {
                std
            } else {
                1.0
            }
        });
        Ok(Self {
            mean,
            scale,
            n_samples_seen: rows,
        })
    }

    /// Applies `(value - mean) / std` column-wise.
    pub fn transform(&self, features: ArrayView2<'_, f64>) -> Result<Array2<f64>, ScalerError> {
        if features.ncols() != self.mean.len() {
            return Err(ScalerError::FeatureMismatch {
                expected: self.mean.len(),
                found: features.ncols(),
            });
        }
        Ok((&features - &self.mean) / &self.scale)
    }

    /// Per-feature means.
    #[must_use]
    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    /// Per-feature divisors.
    #[must_use]
    pub fn scale(&self) -> &Array1<f64> {
        &self.scale
    }

    /// Rows the state was fit on.
    #[must_use]
    pub fn n_samples_seen(&self) -> usize {
        self.n_samples_seen
    }

    /// Number of features expected by [`Self::transform`].
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.mean.len()
    }
}

/// Errors raised by the scaler.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScalerError {
    /// Fit called on zero rows.
    #[error("cannot fit a scaler on an empty training set")]
    Empty,
    /// Transform input has a different column count.
    #[error("scaler was fit on {expected} features, input has {found}")]
    FeatureMismatch {
        /// Columns seen at fit time.
        expected: usize,
        /// Columns in the input.
        found: usize,
    },
}
