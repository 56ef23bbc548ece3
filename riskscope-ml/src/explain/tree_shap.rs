//! Exact path-dependent TreeSHAP over the shared node arena.
//!
//! Attributions for one tree sum to `tree(x) - tree.expected_value()`, where
//! the expectation is taken over training covers.

use crate::algorithms::tree::{NodeKind, Tree};
use crate::algorithms::{DecisionTree, GradientBoosting, RandomForest};
use crate::error::{MlError, Result};
use ndarray::{Array1, Array2, ArrayView1};

/// A weighted sum of trees plus a constant offset.
///
/// Decision trees are one tree with weight 1, forests average their trees and
/// boosting scales every stage by the learning rate on top of the prior.
#[derive(Debug, Clone, Copy)]
pub struct TreeEnsemble<'a> {
    trees: &'a [Tree],
    weight: f64,
    offset: f64,
    n_features: Option<usize>,
}

impl<'a> TreeEnsemble<'a> {
    pub fn new(trees: &'a [Tree], weight: f64, offset: f64) -> Self {
        Self {
            trees,
            weight,
            offset,
            n_features: None,
        }
    }

    /// Require explained rows to have exactly `n` columns.
    pub fn with_n_features(mut self, n: usize) -> Self {
        self.n_features = Some(n);
        self
    }

    pub fn from_decision_tree(model: &'a DecisionTree) -> Self {
        Self::new(std::slice::from_ref(model.tree()), 1.0, 0.0).with_n_features(model.n_features())
    }

    pub fn from_random_forest(model: &'a RandomForest) -> Self {
        let trees = model.trees();
        Self::new(trees, 1.0 / trees.len().max(1) as f64, 0.0)
            .with_n_features(model.n_features())
    }

    pub fn from_gradient_boosting(model: &'a GradientBoosting) -> Self {
        Self::new(model.trees(), model.learning_rate(), model.init())
            .with_n_features(model.n_features())
    }

    /// Expected output over the training distribution.
    pub fn expected_value(&self) -> f64 {
        self.offset
            + self.weight * self.trees.iter().map(Tree::expected_value).sum::<f64>()
    }

    pub fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        self.offset
            + self.weight * self.trees.iter().map(|t| t.predict_row(row)).sum::<f64>()
    }

    /// Attribution matrix, one row per row of `x`.
    pub fn shap_values(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.trees.is_empty() {
            return Err(MlError::explain("Tree ensemble has not been fitted"));
        }
        if let Some(n) = self.n_features {
            if x.ncols() != n {
                return Err(MlError::explain(format!(
                    "Model was fitted on {n} features but rows have {}",
                    x.ncols()
                )));
            }
        }
        let mut out = Array2::zeros(x.raw_dim());
        for (i, row) in x.rows().into_iter().enumerate() {
            let mut phi = Array1::zeros(x.ncols());
            for tree in self.trees {
                tree_shap(tree, row, &mut phi)?;
            }
            phi *= self.weight;
            out.row_mut(i).assign(&phi);
        }
        Ok(out)
    }
}

#[derive(Debug, Clone, Copy)]
struct PathElement {
    feature: Option<usize>,
    zero_fraction: f64,
    one_fraction: f64,
    weight: f64,
}

/// Add the attributions of one tree for `row` into `phi`.
pub fn tree_shap(tree: &Tree, row: ArrayView1<f64>, phi: &mut Array1<f64>) -> Result<()> {
    if tree.nodes.is_empty() {
        return Err(MlError::explain("Cannot explain an empty tree"));
    }
    if let Some(bad) = tree.nodes.iter().find_map(|n| match n.kind {
        NodeKind::Split { feature, .. } if feature >= row.len() => Some(feature),
        _ => None,
    }) {
        return Err(MlError::explain(format!(
            "Tree splits on feature {bad} but rows have {} features",
            row.len()
        )));
    }
    recurse(tree, row, phi, 0, Vec::new(), 1.0, 1.0, None);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn recurse(
    tree: &Tree,
    row: ArrayView1<f64>,
    phi: &mut Array1<f64>,
    idx: usize,
    mut path: Vec<PathElement>,
    zero_fraction: f64,
    one_fraction: f64,
    feature: Option<usize>,
) {
    let node = tree.nodes[idx];
    extend(&mut path, zero_fraction, one_fraction, feature);

    match node.kind {
        NodeKind::Leaf => {
            for i in 1..path.len() {
                let w = unwound_sum(&path, i);
                let el = path[i];
                if let Some(f) = el.feature {
                    phi[f] += w * (el.one_fraction - el.zero_fraction) * node.value;
                }
            }
        }
        NodeKind::Split {
            feature: split_feature,
            threshold,
            left,
            right,
        } => {
            let (hot, cold) = if row[split_feature] <= threshold {
                (left, right)
            } else {
                (right, left)
            };

            let mut incoming_zero = 1.0;
            let mut incoming_one = 1.0;
            if let Some(k) = (1..path.len()).find(|&k| path[k].feature == Some(split_feature)) {
                incoming_zero = path[k].zero_fraction;
                incoming_one = path[k].one_fraction;
                unwind(&mut path, k);
            }

            let cover = node.cover;
            let hot_share = if cover > 0.0 { tree.nodes[hot].cover / cover } else { 0.0 };
            let cold_share = if cover > 0.0 { tree.nodes[cold].cover / cover } else { 0.0 };

            recurse(
                tree,
                row,
                phi,
                hot,
                path.clone(),
                incoming_zero * hot_share,
                incoming_one,
                Some(split_feature),
            );
            recurse(
                tree,
                row,
                phi,
                cold,
                path,
                incoming_zero * cold_share,
                0.0,
                Some(split_feature),
            );
        }
    }
}

fn extend(path: &mut Vec<PathElement>, zero: f64, one: f64, feature: Option<usize>) {
    let l = path.len();
    path.push(PathElement {
        feature,
        zero_fraction: zero,
        one_fraction: one,
        weight: if l == 0 { 1.0 } else { 0.0 },
    });
    let denom = (l + 1) as f64;
    for i in (0..l).rev() {
        path[i + 1].weight += one * path[i].weight * (i + 1) as f64 / denom;
        path[i].weight = zero * path[i].weight * (l - i) as f64 / denom;
    }
}

fn unwind(path: &mut Vec<PathElement>, i: usize) {
    let l = path.len() - 1;
    let one = path[i].one_fraction;
    let zero = path[i].zero_fraction;
    let denom = (l + 1) as f64;
    let mut next = path[l].weight;

    for j in (0..l).rev() {
        if one != 0.0 {
            let tmp = path[j].weight;
            path[j].weight = next * denom / ((j + 1) as f64 * one);
            next = tmp - path[j].weight * zero * (l - j) as f64 / denom;
        } else {
            path[j].weight = path[j].weight * denom / (zero * (l - j) as f64);
        }
    }
    for j in i..l {
        path[j].feature = path[j + 1].feature;
        path[j].zero_fraction = path[j + 1].zero_fraction;
        path[j].one_fraction = path[j + 1].one_fraction;
    }
    path.pop();
}

/// Total permutation weight of the path with element `i` removed.
fn unwound_sum(path: &[PathElement], i: usize) -> f64 {
    let l = path.len() - 1;
    let one = path[i].one_fraction;
    let zero = path[i].zero_fraction;
    let denom = (l + 1) as f64;
    let mut next = path[l].weight;
    let mut total = 0.0;

    for j in (0..l).rev() {
        if one != 0.0 {
            let tmp = next * denom / ((j + 1) as f64 * one);
            total += tmp;
            next = path[j].weight - tmp * zero * (l - j) as f64 / denom;
        } else if zero != 0.0 {
            total += path[j].weight * denom / (zero * (l - j) as f64);
        }
    }
    total
}
