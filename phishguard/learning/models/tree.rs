use std::cmp::Ordering;

use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::{rngs::SmallRng, seq::SliceRandom};
use serde::{Deserialize, Serialize};

/// Node impurity measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Criterion {
    /// Gini impurity over 0/1 targets; leaves hold the positive-class rate.
    Gini,
    /// Variance of real-valued targets; leaves hold the target mean.
    SquaredError,
}

/// Growth limits for a single tree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreeParams {
    /// Impurity measure.
    pub criterion: Criterion,
    /// Maximum depth; `None` grows until leaves are pure or too small.
    pub max_depth: Option<usize>,
    /// Smallest node that may be split.
    pub min_samples_split: usize,
    /// Smallest allowed child.
    pub min_samples_leaf: usize,
    /// Non-constant features to evaluate per split; `None` evaluates all.
    pub max_features: Option<usize>,
}

/// Tree node stored in a flat arena.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    /// Terminal node.
    Leaf {
        /// Prediction for rows reaching this leaf.
        value: f64,
        /// Training rows that reached it (bootstrap duplicates counted).
        samples: usize,
    },
    /// Internal node: rows with `x[feature] <= threshold` go left.
    Split {
        /// Feature column.
        feature: usize,
        /// Split point.
        threshold: f64,
        /// Left child index.
        left: usize,
        /// Right child index.
        right: usize,
        /// Training rows that reached it.
        samples: usize,
    },
}

/// Binary CART tree shared by the forest and the boosting stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
    importances: Vec<f64>,
}

#[derive(Debug, Clone, Copy, Default)]
struct Stats {
    n: f64,
    sum: f64,
    sum_sq: f64,
}

impl Stats {
    fn push(&mut self, target: f64) {
        self.n += 1.0;
        self.sum += target;
        self.sum_sq += target * target;
    }

    fn minus(self, other: Self) -> Self {
        Self {
            n: self.n - other.n,
            sum: self.sum - other.sum,
            sum_sq: self.sum_sq - other.sum_sq,
        }
    }

    fn mean(self) -> f64 {
        if self.n > 0.0 {
            self.sum / self.n
        } else {
            0.0
        }
    }

    fn impurity(self, criterion: Criterion) -> f64 {
        if self.n <= 0.0 {
            return 0.0;
        }
        let mean = self.mean();
        let value = match criterion {
            Criterion::Gini => 2.0 * mean * (1.0 - mean),
            Criterion::SquaredError => self.sum_sq / self.n - mean * mean,
        };
        value.max(0.0)
    }
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    weighted_child_impurity: f64,
}

struct Builder<'a, 'b> {
    x: ArrayView2<'a, f64>,
    targets: &'b [f64],
    params: &'b TreeParams,
    rng: &'b mut SmallRng,
    nodes: Vec<Node>,
    importances: Vec<f64>,
}

impl DecisionTree {
    /// Grows a tree over the given row indices. Rows may repeat (bootstrap
    /// samples); each repetition counts as one sample.
    #[must_use]
    pub fn fit(
        x: ArrayView2<'_, f64>,
        targets: &[f64],
        samples: &[usize],
        params: &TreeParams,
        rng: &mut SmallRng,
    ) -> Self {
        let mut builder = Builder {
            x,
            targets,
            params,
            rng,
            nodes: Vec::new(),
            importances: vec![0.0; x.ncols()],
        };
        builder.grow(samples.to_vec(), 0);
        Self {
            nodes: builder.nodes,
            importances: builder.importances,
        }
    }

    /// Index of the leaf a row falls into.
    #[must_use]
    pub fn leaf_index(&self, row: ArrayView1<'_, f64>) -> usize {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { .. } => return idx,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    idx = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    /// Leaf value for a row.
    #[must_use]
    pub fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        match &self.nodes[self.leaf_index(row)] {
            Node::Leaf { value, .. } => *value,
            Node::Split { .. } => unreachable!("leaf_index always stops on a leaf"),
        }
    }

    /// Overwrites the value stored in a leaf. Ignored for split nodes.
    pub fn set_leaf_value(&mut self, idx: usize, new_value: f64) {
        if let Some(Node::Leaf { value, .. }) = self.nodes.get_mut(idx) {
            *value = new_value;
        }
    }

    /// Node arena, root first.
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Longest root-to-leaf path.
    #[must_use]
    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match &nodes[idx] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => {
                    1 + walk(nodes, *left).max(walk(nodes, *right))
                }
            }
        }
        walk(&self.nodes, 0)
    }

    /// Impurity-decrease importances normalized to sum to 1 (all zeros for a
    /// single-leaf tree).
    #[must_use]
    pub fn feature_importances(&self) -> Array1<f64> {
        let total: f64 = self.importances.iter().sum();
        let raw = Array1::from_vec(self.importances.clone());
        if total > 0.0 {
            raw / total
        } else {
            raw
        }
    }
}

impl Builder<'_, '_> {
    fn grow(&mut self, samples: Vec<usize>, depth: usize) -> usize {
        let mut stats = Stats::default();
        for &row in &samples {
            stats.push(self.targets[row]);
        }
        let node_id = self.nodes.len();
        self.nodes.push(Node::Leaf {
            value: stats.mean(),
            samples: samples.len(),
        });

        let impurity = stats.impurity(self.params.criterion);
        let splittable = samples.len() >= self.params.min_samples_split
            && samples.len() >= 2 * self.params.min_samples_leaf
            && self.params.max_depth.map_or(true, |max| depth < max)
            && impurity > f64::EPSILON;
        if !splittable {
            return node_id;
        }
        let Some(best) = self.best_split(&samples, stats) else {
            return node_id;
        };

        self.importances[best.feature] += stats.n * impurity - best.weighted_child_impurity;
        let (left, right): (Vec<usize>, Vec<usize>) = samples
            .iter()
            .copied()
            .partition(|&row| self.x[[row, best.feature]] <= best.threshold);
        let n_samples = samples.len();
        drop(samples);
        let left_id = self.grow(left, depth + 1);
        let right_id = self.grow(right, depth + 1);
        self.nodes[node_id] = Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            left: left_id,
            right: right_id,
            samples: n_samples,
        };
        node_id
    }

    fn best_split(&mut self, samples: &[usize], total: Stats) -> Option<BestSplit> {
        let mut features: Vec<usize> = (0..self.x.ncols()).collect();
        features.shuffle(&mut *self.rng);
        let budget = self.params.max_features.unwrap_or(features.len()).max(1);
        let min_leaf = self.params.min_samples_leaf.max(1);

        let mut best: Option<BestSplit> = None;
        let mut visited = 0;
        let mut pairs: Vec<(f64, f64)> = Vec::with_capacity(samples.len());
        for feature in features {
            if visited >= budget {
                break;
            }
            pairs.clear();
            pairs.extend(
                samples
                    .iter()
                    .map(|&row| (self.x[[row, feature]], self.targets[row])),
            );
            pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
            let (first, last) = (pairs[0].0, pairs[pairs.len() - 1].0);
            if first >= last {
                continue;
            }
            visited += 1;

            let mut left = Stats::default();
            for i in 0..pairs.len() - 1 {
                left.push(pairs[i].1);
                let (here, next) = (pairs[i].0, pairs[i + 1].0);
                if here >= next {
                    continue;
                }
                let n_left = i + 1;
                if n_left < min_leaf || pairs.len() - n_left < min_leaf {
                    continue;
                }
                let right = total.minus(left);
                let weighted = left.n * left.impurity(self.params.criterion)
                    + right.n * right.impurity(self.params.criterion);
                if best
                    .as_ref()
                    .map_or(true, |current| weighted < current.weighted_child_impurity)
                {
                    let mut threshold = here + (next - here) / 2.0;
                    if threshold >= next {
                        threshold = here;
                    }
                    best = Some(BestSplit {
                        feature,
                        threshold,
                        weighted_child_impurity: weighted,
                    });
                }
            }
        }
        best
    }
}
