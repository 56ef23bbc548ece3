//! Single CART classifier.

use super::tree::{Tree, TreeParams, mean_leaf};
use super::{Capabilities, Classifier, check_fit_input, check_predict_input, threshold_labels};
use crate::error::Result;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Gini CART grown to purity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    params: TreeParams,
    tree: Tree,
    n_features: usize,
}

impl DecisionTree {
    pub fn new() -> Self {
        Self::with_params(TreeParams::default())
    }

    pub fn with_params(params: TreeParams) -> Self {
        Self {
            params,
            tree: Tree::default(),
            n_features: 0,
        }
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }
}

impl Default for DecisionTree {
    fn default() -> Self {
        Self::new()
    }
}

impl Classifier for DecisionTree {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        let labels = y.to_vec();
        self.tree = Tree::fit(
            x,
            &labels,
            (0..x.nrows()).collect(),
            self.params,
            None,
            mean_leaf(&labels),
        )?;
        self.n_features = x.ncols();
        tracing::debug!(
            depth = self.tree.depth(),
            leaves = self.tree.n_leaves(),
            "Decision tree fitted"
        );
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(threshold_labels(&self.predict_proba(x)?))
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::PROBABILITY_ONLY
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        check_predict_input(x, self.n_features)?;
        Ok(self.tree.predict(x))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::testing::{accuracy, blobs};

    #[test]
    fn test_fits_training_data_exactly() {
        let (x, y) = blobs(60, 1);
        let mut model = DecisionTree::new();
        model.fit(&x, &y).unwrap();
        assert_eq!(accuracy(&model.predict(&x).unwrap(), &y), 1.0);
    }

    #[test]
    fn test_probability_only() {
        let (x, y) = blobs(20, 2);
        let mut model = DecisionTree::new();
        model.fit(&x, &y).unwrap();
        assert!(model.decision_function(&x).is_err());
        let proba = model.positive_probability(&x).unwrap().unwrap();
        assert!(proba.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn test_unfitted_predict_fails() {
        let (x, _) = blobs(4, 3);
        assert!(DecisionTree::new().predict(&x).is_err());
    }
}
