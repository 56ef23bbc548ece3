//! CART trees stored as a flat node arena.
//!
//! Every tree model (single tree, forest, boosting stages) shares this
//! representation. Each node records its training `cover` so path-dependent
//! attribution can weight unexplored branches.

use crate::error::{MlError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rand::seq::index::sample;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Impurity criterion used when searching splits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Criterion {
    /// Targets are 0/1 labels.
    Gini,
    /// Targets are real-valued (boosting residuals).
    SquaredError,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum NodeKind {
    Leaf,
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub kind: NodeKind,
    /// Output of the node if it were a leaf.
    pub value: f64,
    /// Number of training samples (with multiplicity) that reached the node.
    pub cover: f64,
}

/// Tree growth limits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TreeParams {
    pub criterion: Criterion,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    /// Features examined per split; `None` means all.
    pub max_features: Option<usize>,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            criterion: Criterion::Gini,
            max_depth: None,
            min_samples_split: 2,
            max_features: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<Node>,
}

impl Tree {
    /// Grow a tree on `samples` (row indices into `x`, duplicates allowed).
    ///
    /// `target` drives the split search; `leaf_value` maps the samples of a
    /// node to its output.
    pub fn fit<F>(
        x: &Array2<f64>,
        target: &[f64],
        samples: Vec<usize>,
        params: TreeParams,
        rng: Option<&mut ChaCha8Rng>,
        leaf_value: F,
    ) -> Result<Self>
    where
        F: Fn(&[usize]) -> f64,
    {
        if samples.is_empty() {
            return Err(MlError::evaluation("Cannot grow a tree on zero samples"));
        }
        let mut builder = Builder {
            x,
            target,
            params,
            rng,
            leaf_value,
            nodes: Vec::new(),
        };
        builder.grow(samples, 0);
        Ok(Self {
            nodes: builder.nodes,
        })
    }

    pub fn root(&self) -> Option<&Node> {
        self.nodes.first()
    }

    /// Index of the leaf reached by `row`.
    pub fn leaf_index(&self, row: ArrayView1<f64>) -> usize {
        let mut idx = 0;
        while let Some(node) = self.nodes.get(idx) {
            match node.kind {
                NodeKind::Leaf => return idx,
                NodeKind::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[feature] <= threshold { left } else { right };
                }
            }
        }
        idx
    }

    pub fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        self.nodes
            .get(self.leaf_index(row))
            .map(|n| n.value)
            .unwrap_or(0.0)
    }

    pub fn predict(&self, x: &Array2<f64>) -> Array1<f64> {
        x.rows().into_iter().map(|r| self.predict_row(r)).collect()
    }

    /// Cover-weighted mean of the leaf values.
    pub fn expected_value(&self) -> f64 {
        let Some(root) = self.root() else {
            return 0.0;
        };
        if root.cover <= 0.0 {
            return 0.0;
        }
        self.nodes
            .iter()
            .filter(|n| matches!(n.kind, NodeKind::Leaf))
            .map(|n| n.cover * n.value)
            .sum::<f64>()
            / root.cover
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match nodes.get(idx).map(|n| n.kind) {
                Some(NodeKind::Split { left, right, .. }) => {
                    1 + walk(nodes, left).max(walk(nodes, right))
                }
                _ => 0,
            }
        }
        walk(&self.nodes, 0)
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n.kind, NodeKind::Leaf))
            .count()
    }
}

struct Builder<'a, F> {
    x: &'a Array2<f64>,
    target: &'a [f64],
    params: TreeParams,
    rng: Option<&'a mut ChaCha8Rng>,
    leaf_value: F,
    nodes: Vec<Node>,
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    impurity: f64,
}

impl<F> Builder<'_, F>
where
    F: Fn(&[usize]) -> f64,
{
    fn grow(&mut self, samples: Vec<usize>, depth: usize) -> usize {
        let idx = self.nodes.len();
        self.nodes.push(Node {
            kind: NodeKind::Leaf,
            value: (self.leaf_value)(&samples),
            cover: samples.len() as f64,
        });

        let depth_reached = self.params.max_depth.is_some_and(|d| depth >= d);
        if depth_reached
            || samples.len() < self.params.min_samples_split
            || self.node_impurity(&samples) <= 1e-12
        {
            return idx;
        }

        let Some(split) = self.best_split(&samples) else {
            return idx;
        };
        let (left_samples, right_samples): (Vec<usize>, Vec<usize>) = samples
            .iter()
            .partition(|&&s| self.x[[s, split.feature]] <= split.threshold);
        if left_samples.is_empty() || right_samples.is_empty() {
            return idx;
        }

        let left = self.grow(left_samples, depth + 1);
        let right = self.grow(right_samples, depth + 1);
        self.nodes[idx].kind = NodeKind::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        idx
    }

    /// Weighted impurity (impurity times sample count).
    fn weighted_impurity(&self, n: f64, sum: f64, sum_sq: f64) -> f64 {
        if n <= 0.0 {
            return 0.0;
        }
        match self.params.criterion {
            Criterion::Gini => 2.0 * sum * (n - sum) / n,
            Criterion::SquaredError => (sum_sq - sum * sum / n).max(0.0),
        }
    }

    fn node_impurity(&self, samples: &[usize]) -> f64 {
        let (sum, sum_sq) = samples.iter().fold((0.0, 0.0), |(s, q), &i| {
            let t = self.target[i];
            (s + t, q + t * t)
        });
        self.weighted_impurity(samples.len() as f64, sum, sum_sq)
    }

    fn candidate_features(&mut self) -> Vec<usize> {
        let n_features = self.x.ncols();
        match (self.params.max_features, self.rng.as_deref_mut()) {
            (Some(k), Some(rng)) if k < n_features => {
                let mut picked = sample(rng, n_features, k).into_vec();
                picked.sort_unstable();
                picked
            }
            _ => (0..n_features).collect(),
        }
    }

    fn best_split(&mut self, samples: &[usize]) -> Option<SplitCandidate> {
        let n = samples.len() as f64;
        let (total_sum, total_sq) = samples.iter().fold((0.0, 0.0), |(s, q), &i| {
            let t = self.target[i];
            (s + t, q + t * t)
        });

        let mut best: Option<SplitCandidate> = None;
        let mut order = samples.to_vec();
        for feature in self.candidate_features() {
            order.sort_by(|&a, &b| self.x[[a, feature]].total_cmp(&self.x[[b, feature]]));

            let mut left_n = 0.0;
            let mut left_sum = 0.0;
            let mut left_sq = 0.0;
            for pos in 0..order.len() - 1 {
                let t = self.target[order[pos]];
                left_n += 1.0;
                left_sum += t;
                left_sq += t * t;

                let here = self.x[[order[pos], feature]];
                let next = self.x[[order[pos + 1], feature]];
                if here == next {
                    continue;
                }

                let impurity = self.weighted_impurity(left_n, left_sum, left_sq)
                    + self.weighted_impurity(n - left_n, total_sum - left_sum, total_sq - left_sq);
                if best.as_ref().is_none_or(|b| impurity < b.impurity - 1e-12) {
                    let mut threshold = here + (next - here) / 2.0;
                    if threshold >= next {
                        threshold = here;
                    }
                    best = Some(SplitCandidate {
                        feature,
                        threshold,
                        impurity,
                    });
                }
            }
        }
        best
    }
}

/// Mean of `y` over the samples; the positive-class fraction for 0/1 labels.
pub fn mean_leaf(y: &[f64]) -> impl Fn(&[usize]) -> f64 + '_ {
    move |samples: &[usize]| {
        if samples.is_empty() {
            return 0.0;
        }
        samples.iter().map(|&i| y[i]).sum::<f64>() / samples.len() as f64
    }
}
