//! Gradient boosted regression trees with binomial deviance loss.
//!
//! Each stage fits a squared-error tree to the residuals `y - p` and replaces
//! the leaf outputs with a single Newton step `Σr / Σp(1-p)`. The raw score is
//! `init + learning_rate · Σ tree(x)` in log-odds space.

use super::tree::{Criterion, Tree, TreeParams};
use super::{
    Capabilities, Classifier, check_fit_input, check_predict_input, sigmoid, threshold_labels,
};
use crate::error::Result;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoosting {
    n_stages: usize,
    learning_rate: f64,
    max_depth: usize,
    init: f64,
    trees: Vec<Tree>,
    n_features: usize,
}

impl GradientBoosting {
    pub fn new(n_stages: usize, learning_rate: f64, max_depth: usize) -> Self {
        Self {
            n_stages,
            learning_rate,
            max_depth,
            init: 0.0,
            trees: Vec::new(),
            n_features: 0,
        }
    }

    /// Prior log-odds of the positive class.
    pub fn init(&self) -> f64 {
        self.init
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    pub fn trees(&self) -> &[Tree] {
        &self.trees
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    fn raw_score(&self, x: &Array2<f64>) -> Array1<f64> {
        let mut score = Array1::from_elem(x.nrows(), self.init);
        for tree in &self.trees {
            score.scaled_add(self.learning_rate, &tree.predict(x));
        }
        score
    }
}

impl Classifier for GradientBoosting {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        let n = x.nrows();
        let prior = y.sum() / n as f64;
        self.init = (prior / (1.0 - prior)).ln();
        self.trees.clear();

        let params = TreeParams {
            criterion: Criterion::SquaredError,
            max_depth: Some(self.max_depth),
            min_samples_split: 2,
            max_features: None,
        };

        let mut score = Array1::from_elem(n, self.init);
        for _ in 0..self.n_stages {
            let proba = score.mapv(sigmoid);
            let residual: Vec<f64> = y.iter().zip(proba.iter()).map(|(t, p)| t - p).collect();
            let hessian: Vec<f64> = proba.iter().map(|p| p * (1.0 - p)).collect();

            let newton = |samples: &[usize]| {
                let num: f64 = samples.iter().map(|&i| residual[i]).sum();
                let den: f64 = samples.iter().map(|&i| hessian[i]).sum();
                if den.abs() < 1e-150 { 0.0 } else { num / den }
            };
            let tree = Tree::fit(x, &residual, (0..n).collect(), params, None, newton)?;
            score.scaled_add(self.learning_rate, &tree.predict(x));
            self.trees.push(tree);
        }

        self.n_features = x.ncols();
        tracing::debug!(
            stages = self.trees.len(),
            init = self.init,
            "Gradient boosting fitted"
        );
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(threshold_labels(&self.predict_proba(x)?))
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::PROBABILITY_AND_SCORE
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(self.decision_function(x)?.mapv(sigmoid))
    }

    fn decision_function(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        check_predict_input(x, self.n_features)?;
        Ok(self.raw_score(x))
    }
}
