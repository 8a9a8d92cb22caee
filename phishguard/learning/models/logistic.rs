use ndarray::{s, Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use super::{sigmoid, validate_input, validate_training, Classifier, ModelError, ModelKind};

/// Logistic regression hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LogisticConfig {
    /// Newton iteration cap.
    pub max_iter: usize,
    /// Inverse L2 regularisation strength.
    pub c: f64,
    /// Stop once every gradient component is below this.
    pub tol: f64,
    /// Recorded for parity with the ensembles; the solver draws no random numbers.
    pub seed: u64,
}

impl Default for LogisticConfig {
    fn default() -> Self {
        Self {
            max_iter: 1000,
            c: 0.1,
            tol: 1e-4,
            seed: 42,
        }
    }
}

/// Binary logistic regression minimising
/// `mean(log_loss) + ||w||^2 / (2 * C * n)`; the intercept is not penalised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    config: LogisticConfig,
    coef: Array1<f64>,
    intercept: f64,
    n_iter: usize,
    converged: bool,
}

impl LogisticRegression {
    /// Creates an unfitted model.
    #[must_use]
    pub fn new(config: LogisticConfig) -> Self {
        Self {
            config,
            coef: Array1::zeros(0),
            intercept: 0.0,
            n_iter: 0,
            converged: false,
        }
    }

    /// Hyperparameters.
    #[must_use]
    pub fn config(&self) -> &LogisticConfig {
        &self.config
    }

    /// Feature weights.
    #[must_use]
    pub fn coef(&self) -> &Array1<f64> {
        &self.coef
    }

    /// Bias term.
    #[must_use]
    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    /// Newton iterations used by the last fit.
    #[must_use]
    pub fn n_iter(&self) -> usize {
        self.n_iter
    }

    /// False when the last fit stopped at `max_iter`.
    #[must_use]
    pub fn converged(&self) -> bool {
        self.converged
    }
}

/// Objective, gradient and Hessian over the bias-augmented design matrix
/// (last column all ones).
struct Objective<'a> {
    design: &'a Array2<f64>,
    targets: &'a Array1<f64>,
    penalty: Array1<f64>,
}

impl Objective<'_> {
    fn value(&self, theta: &Array1<f64>) -> f64 {
        let z = self.design.dot(theta);
        let loss = z
            .iter()
            .zip(self.targets)
            .map(|(z, y)| softplus(*z) - y * z)
            .sum::<f64>()
            / self.targets.len() as f64;
        loss + 0.5 * (&self.penalty * theta * theta).sum()
    }

    fn gradient_and_hessian(&self, theta: &Array1<f64>) -> (Array1<f64>, Array2<f64>) {
        let n = self.targets.len() as f64;
        let p = self.design.dot(theta).mapv(sigmoid);
        let gradient = self.design.t().dot(&(&p - self.targets)) / n + &self.penalty * theta;
        let weights = p.mapv(|p| p * (1.0 - p) / n);
        let weighted = self.design * &weights.insert_axis(Axis(1));
        let mut hessian = self.design.t().dot(&weighted);
        hessian.diag_mut().zip_mut_with(&self.penalty, |h, r| *h += r);
        (gradient, hessian)
    }
}

fn softplus(z: f64) -> f64 {
    z.max(0.0) + (-z.abs()).exp().ln_1p()
}

/// Solves `a x = b` for symmetric positive-definite `a` by Cholesky
/// factorisation. Returns `None` if `a` is not positive definite.
fn solve_spd(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = b.len();
    let mut l = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let dot: f64 = (0..j).map(|k| l[[i, k]] * l[[j, k]]).sum();
            if i == j {
                let d = a[[i, i]] - dot;
                if d <= 0.0 || !d.is_finite() {
                    return None;
                }
                l[[i, j]] = d.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - dot) / l[[j, j]];
            }
        }
    }
    let mut y = Array1::<f64>::zeros(n);
    for i in 0..n {
        let dot: f64 = (0..i).map(|k| l[[i, k]] * y[k]).sum();
        y[i] = (b[i] - dot) / l[[i, i]];
    }
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let dot: f64 = (i + 1..n).map(|k| l[[k, i]] * x[k]).sum();
        x[i] = (y[i] - dot) / l[[i, i]];
    }
    Some(x)
}

impl Classifier for LogisticRegression {
    fn fit(&mut self, features: ArrayView2<'_, f64>, labels: &[u8]) -> Result<(), ModelError> {
        validate_training(features, labels)?;
        let positives = labels.iter().filter(|label| **label == 1).count();
        if positives == 0 || positives == labels.len() {
            return Err(ModelError::SingleClass(
                ModelKind::LogisticRegression,
                u8::from(positives == labels.len()),
            ));
        }
        let (n, d) = features.dim();
        let mut design = Array2::<f64>::ones((n, d + 1));
        design.slice_mut(s![.., ..d]).assign(&features);
        let targets: Array1<f64> = labels.iter().map(|label| f64::from(*label)).collect();
        let mut penalty = Array1::from_elem(d + 1, 1.0 / (self.config.c * n as f64));
        penalty[d] = 0.0;
        let objective = Objective {
            design: &design,
            targets: &targets,
            penalty,
        };

        let mut theta = Array1::<f64>::zeros(d + 1);
        let mut loss = objective.value(&theta);
        let mut converged = false;
        let mut iterations = 0;
        while iterations < self.config.max_iter {
            let (gradient, mut hessian) = objective.gradient_and_hessian(&theta);
            if gradient.iter().all(|g| g.abs() <= self.config.tol) {
                converged = true;
                break;
            }
            iterations += 1;
            let step = solve_spd(&hessian, &gradient).unwrap_or_else(|| {
                hessian.diag_mut().mapv_inplace(|h| h + 1e-8);
                solve_spd(&hessian, &gradient).unwrap_or_else(|| gradient.clone())
            });
            let slope = gradient.dot(&step);
            let mut alpha = 1.0;
            loop {
                let candidate = &theta - &(&step * alpha);
                let candidate_loss = objective.value(&candidate);
                if candidate_loss <= loss - 1e-4 * alpha * slope || alpha < 1e-10 {
                    theta = candidate;
                    loss = candidate_loss;
                    break;
                }
                alpha *= 0.5;
            }
        }

        self.coef = theta.slice(s![..d]).to_owned();
        self.intercept = theta[d];
        self.n_iter = iterations;
        self.converged = converged;
        Ok(())
    }

    fn predict_proba(&self, features: ArrayView2<'_, f64>) -> Result<Array1<f64>, ModelError> {
        if self.coef.is_empty() {
            return Err(ModelError::NotFitted(ModelKind::LogisticRegression));
        }
        validate_input(features, self.coef.len())?;
        Ok((features.dot(&self.coef) + self.intercept).mapv(sigmoid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn cholesky_solves_small_system() {
        let a = array![[4.0, 2.0], [2.0, 3.0]];
        let b = array![2.0, 1.0];
        let x = solve_spd(&a, &b).unwrap();
        assert!((x[0] - 0.5).abs() < 1e-12);
        assert!(x[1].abs() < 1e-12);
        assert!(solve_spd(&array![[0.0, 0.0], [0.0, 1.0]], &b).is_none());
    }

    #[test]
    fn learns_a_linear_boundary() {
        let x = Array2::from_shape_fn((60, 2), |(row, col)| {
            let t = row as f64 / 59.0 * 4.0 - 2.0;
            if col == 0 {
                t
            } else {
                ((row * 7) % 5) as f64 / 5.0 - 0.4
            }
        });
        let y: Vec<u8> = (0..60).map(|row| u8::from(row >= 30)).collect();
        let mut model = LogisticRegression::new(LogisticConfig::default());
        model.fit(x.view(), &y).unwrap();
        assert!(model.converged());
        assert!(model.n_iter() < 50);
        assert!(model.coef()[0] > 0.0);
        let predictions = model.predict(x.view()).unwrap();
        let correct = predictions.iter().zip(&y).filter(|(p, t)| p == t).count();
        assert!(correct >= 56, "only {correct} of 60 correct");
    }

    #[test]
    fn stronger_regularisation_shrinks_weights() {
        let x = array![[-2.0], [-1.0], [-0.5], [0.5], [1.0], [2.0]];
        let y = [0, 0, 1, 0, 1, 1];
        let mut loose = LogisticRegression::new(LogisticConfig {
            c: 10.0,
            ..LogisticConfig::default()
        });
        let mut tight = LogisticRegression::new(LogisticConfig {
            c: 0.01,
            ..LogisticConfig::default()
        });
        loose.fit(x.view(), &y).unwrap();
        tight.fit(x.view(), &y).unwrap();
        assert!(tight.coef()[0].abs() < loose.coef()[0].abs());
    }

    #[test]
    fn iteration_cap_is_reported() {
        let x = array![[-1.0], [1.0], [-2.0], [2.0]];
        let mut model = LogisticRegression::new(LogisticConfig {
            max_iter: 1,
            c: 1000.0,
            ..LogisticConfig::default()
        });
        model.fit(x.view(), &[0, 1, 0, 1]).unwrap();
        assert_eq!(model.n_iter(), 1);
        assert!(!model.converged());
    }
}
