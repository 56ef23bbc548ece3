//! Bagged CART ensemble.

use super::tree::{Tree, TreeParams, mean_leaf};
use super::{Capabilities, Classifier, check_fit_input, check_predict_input, threshold_labels};
use crate::error::Result;
use ndarray::{Array1, Array2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    n_trees: usize,
    seed: u64,
    trees: Vec<Tree>,
    n_features: usize,
}

impl RandomForest {
    pub fn new(n_trees: usize, seed: u64) -> Self {
        Self {
            n_trees,
            seed,
            trees: Vec::new(),
            n_features: 0,
        }
    }

    pub fn trees(&self) -> &[Tree] {
        &self.trees
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }
}

impl Classifier for RandomForest {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        let n = x.nrows();
        let labels = y.to_vec();
        let seed = self.seed;
        let params = TreeParams {
            max_features: Some(((x.ncols() as f64).sqrt().floor() as usize).max(1)),
            ..TreeParams::default()
        };

        // Tree i draws only from its own rng seeded with seed + i.
        let trees = (0..self.n_trees)
            .into_par_iter()
            .map(|i| {
                let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(i as u64));
                let bootstrap: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                Tree::fit(x, &labels, bootstrap, params, Some(&mut rng), mean_leaf(&labels))
            })
            .collect::<Result<Vec<_>>>()?;

        self.trees = trees;
        self.n_features = x.ncols();
        tracing::debug!(trees = self.trees.len(), "Random forest fitted");
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
        let mut total = Array1::zeros(x.nrows());
        for tree in &self.trees {
            total += &tree.predict(x);
        }
        Ok(total / self.trees.len().max(1) as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::testing::{accuracy, blobs};

    #[test]
    fn test_forest_separates_blobs() {
        let (x, y) = blobs(80, 4);
        let mut model = RandomForest::new(25, 42);
        model.fit(&x, &y).unwrap();
        assert_eq!(model.trees().len(), 25);
        assert!(accuracy(&model.predict(&x).unwrap(), &y) > 0.95);
    }

    #[test]
    fn test_same_seed_same_forest() {
        let (x, y) = blobs(40, 5);
        let mut a = RandomForest::new(10, 7);
        let mut b = RandomForest::new(10, 7);
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_probabilities_are_tree_means() {
        let (x, y) = blobs(30, 6);
        let mut model = RandomForest::new(5, 1);
        model.fit(&x, &y).unwrap();
        let proba = model.predict_proba(&x).unwrap();
        let row = x.row(0);
        let manual: f64 =
            model.trees().iter().map(|t| t.predict_row(row)).sum::<f64>() / 5.0;
        assert!((proba[0] - manual).abs() < 1e-12);
    }
}
