use std::collections::BTreeMap;

use ndarray::{Array2, ArrayView2, Axis};
use rand::{rngs::SmallRng, seq::SliceRandom, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Train/test split parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitConfig {
    /// Fraction of rows held out for testing, in `(0, 1)`.
    pub test_size: f64,
    /// Seed for the row shuffles.
    pub seed: u64,
    /// Preserve class proportions in both partitions.
    pub stratify: bool,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_size: 0.2,
            seed: 42,
            stratify: true,
        }
    }
}

macro_rules! partition_accessors {
    ($name:ident) => {
        impl $name {
            /// Feature rows of this partition.
            #[must_use]
            pub fn features(&self) -> ArrayView2<'_, f64> {
                self.features.view()
            }

            /// Binary labels, aligned with [`Self::features`].
            #[must_use]
            pub fn labels(&self) -> &[u8] {
                &self.labels
            }

            /// Row numbers in the source dataset.
            #[must_use]
            pub fn indices(&self) -> &[usize] {
                &self.indices
            }

            /// Number of rows.
            #[must_use]
            pub fn len(&self) -> usize {
                self.labels.len()
            }

            /// True when the partition has no rows.
            #[must_use]
            pub fn is_empty(&self) -> bool {
                self.labels.is_empty()
            }
        }
    };
}

/// Training partition. Only [`train_test_split`] creates one, which is what
/// keeps scalers from being fit on held-out rows.
#[derive(Debug, Clone)]
pub struct TrainSet {
    features: Array2<f64>,
    labels: Vec<u8>,
    indices: Vec<usize>,
}

/// Held-out partition used for evaluation.
#[derive(Debug, Clone)]
pub struct TestSet {
    features: Array2<f64>,
    labels: Vec<u8>,
    indices: Vec<usize>,
}

partition_accessors!(TrainSet);
partition_accessors!(TestSet);

/// Disjoint train and test partitions.
#[derive(Debug, Clone)]
pub struct Split {
    /// Rows used for fitting.
    pub train: TrainSet,
    /// Rows used for evaluation.
    pub test: TestSet,
}

/// Partitions rows into train and test sets.
///
/// The test partition gets `ceil(test_size * n)` rows. With stratification on,
/// each class contributes its proportional share (largest-remainder rounding,
/// ties to the smaller class value) and rows are drawn from a per-class shuffle.
/// The same seed and input order always give the same partition.
pub fn train_test_split(
    features: ArrayView2<'_, f64>,
    labels: &[u8],
    config: &SplitConfig,
) -> Result<Split, SplitError> {
    let n = labels.len();
    if features.nrows() != n {
        return Err(SplitError::LengthMismatch {
            rows: features.nrows(),
            labels: n,
        });
    }
    if !(config.test_size > 0.0 && config.test_size < 1.0) {
        return Err(SplitError::InvalidTestSize(config.test_size));
    }
    let n_test = (config.test_size * n as f64).ceil() as usize;
    let n_train = n.saturating_sub(n_test);
    if n_test == 0 || n_train == 0 {
        return Err(SplitError::EmptyPartition {
            rows: n,
            test_size: config.test_size,
        });
    }

    let mut rng = SmallRng::seed_from_u64(config.seed);
    let (mut train_idx, mut test_idx) = if config.stratify {
        stratified_indices(labels, n_train, n_test, &mut rng)?
    } else {
        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(&mut rng);
        let train = order.split_off(n_test);
        (train, order)
    };
    train_idx.shuffle(&mut rng);
    test_idx.shuffle(&mut rng);

    Ok(Split {
        train: TrainSet {
            features: features.select(Axis(0), &train_idx),
            labels: gather(labels, &train_idx),
            indices: train_idx,
        },
        test: TestSet {
            features: features.select(Axis(0), &test_idx),
            labels: gather(labels, &test_idx),
            indices: test_idx,
        },
    })
}

fn stratified_indices(
    labels: &[u8],
    n_train: usize,
    n_test: usize,
    rng: &mut SmallRng,
) -> Result<(Vec<usize>, Vec<usize>), SplitError> {
    let mut by_class: BTreeMap<u8, Vec<usize>> = BTreeMap::new();
    for (idx, label) in labels.iter().enumerate() {
        by_class.entry(*label).or_default().push(idx);
    }
    if let Some((class, rows)) = by_class.iter().find(|(_, rows)| rows.len() < 2) {
        return Err(SplitError::TooFewMembers {
            class: *class,
            count: rows.len(),
        });
    }
    let n_classes = by_class.len();
    if n_test < n_classes || n_train < n_classes {
        return Err(SplitError::TooFewRows {
            train: n_train,
            test: n_test,
            classes: n_classes,
        });
    }

    let counts: Vec<usize> = by_class.values().map(Vec::len).collect();
    let allocation = allocate_test_rows(&counts, n_test);

    let mut train = Vec::with_capacity(n_train);
    let mut test = Vec::with_capacity(n_test);
    for (mut rows, take) in by_class.into_values().zip(allocation) {
        rows.shuffle(rng);
        let rest = rows.split_off(take);
        test.extend(rows);
        train.extend(rest);
    }
    Ok((train, test))
}

/// Largest-remainder apportionment of `n_test` rows across classes.
fn allocate_test_rows(counts: &[usize], n_test: usize) -> Vec<usize> {
    let total: usize = counts.iter().sum();
    let exact: Vec<f64> = counts
        .iter()
        .map(|count| n_test as f64 * *count as f64 / total as f64)
        .collect();
    let mut allocation: Vec<usize> = exact.iter().map(|value| value.floor() as usize).collect();
    let assigned: usize = allocation.iter().sum();

    let mut by_remainder: Vec<usize> = (0..counts.len()).collect();
    by_remainder.sort_by(|a, b| {
        let ra = exact[*a] - exact[*a].floor();
        let rb = exact[*b] - exact[*b].floor();
        rb.total_cmp(&ra)
    });
    for class in by_remainder.into_iter().take(n_test.saturating_sub(assigned)) {
        allocation[class] += 1;
    }
    allocation
}

fn gather(labels: &[u8], indices: &[usize]) -> Vec<u8> {
    indices.iter().map(|idx| labels[*idx]).collect()
}

/// Errors raised by the splitter.
#[derive(Debug, Error, PartialEq)]
pub enum SplitError {
    /// Feature rows and labels disagree in length.
    #[error("feature matrix has {rows} rows but label vector has {labels}")]
    LengthMismatch {
        /// Feature rows.
        rows: usize,
        /// Labels.
        labels: usize,
    },
    /// Test fraction outside `(0, 1)`.
    #[error("test_size must be in (0, 1), got {0}")]
    InvalidTestSize(f64),
    /// One partition would be empty.
    #[error("test_size={test_size} with {rows} rows leaves an empty partition")]
    EmptyPartition {
        /// Total rows.
        rows: usize,
        /// Requested fraction.
        test_size: f64,
    },
    /// A class cannot appear in both partitions.
    #[error("the least populated class ({class}) has only {count} member(s), which is too few; the minimum for stratification is 2")]
    TooFewMembers {
        /// Class value.
        class: u8,
        /// Rows of that class.
        count: usize,
    },
    /// A partition is smaller than the number of classes.
    #[error("train size {train} and test size {test} must each be at least the number of classes ({classes})")]
    TooFewRows {
        /// Train rows.
        train: usize,
        /// Test rows.
        test: usize,
        /// Distinct classes.
        classes: usize,
    },
}
