//! Native binary classifiers and the closed algorithm registry.

pub mod decision_tree;
pub mod gradient_boosting;
pub mod linalg;
pub mod logistic;
pub mod random_forest;
pub mod registry;
pub mod svm;
pub mod tree;

pub use decision_tree::DecisionTree;
pub use gradient_boosting::GradientBoosting;
pub use logistic::LogisticRegression;
pub use random_forest::RandomForest;
pub use registry::{AlgorithmKind, Estimator};
pub use svm::Svm;

use crate::error::{MlError, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Output capabilities, fixed when the estimator is constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub supports_probability: bool,
    pub supports_decision_score: bool,
}

impl Capabilities {
    pub const PROBABILITY_ONLY: Self = Self {
        supports_probability: true,
        supports_decision_score: false,
    };

    pub const PROBABILITY_AND_SCORE: Self = Self {
        supports_probability: true,
        supports_decision_score: true,
    };
}

/// A binary classifier over dense `f64` features with labels in {0, 1}.
pub trait Classifier {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()>;

    /// Predicted labels (0.0 or 1.0).
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>>;

    fn capabilities(&self) -> Capabilities;

    /// Positive-class probability.
    fn predict_proba(&self, _x: &Array2<f64>) -> Result<Array1<f64>> {
        Err(MlError::evaluation("Estimator does not expose probabilities"))
    }

    /// Signed score, larger means more likely positive.
    fn decision_function(&self, _x: &Array2<f64>) -> Result<Array1<f64>> {
        Err(MlError::evaluation("Estimator does not expose a decision score"))
    }

    /// Native probability, else the logistic transform of the decision score,
    /// else `None`.
    fn positive_probability(&self, x: &Array2<f64>) -> Result<Option<Array1<f64>>> {
        let caps = self.capabilities();
        if caps.supports_probability {
            Ok(Some(self.predict_proba(x)?))
        } else if caps.supports_decision_score {
            Ok(Some(self.decision_function(x)?.mapv(sigmoid)))
        } else {
            Ok(None)
        }
    }
}

pub fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// Reject inputs every estimator refuses to fit on.
pub(crate) fn check_fit_input(x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
    if x.nrows() == 0 {
        return Err(MlError::evaluation("Cannot fit on an empty training set"));
    }
    if x.nrows() != y.len() {
        return Err(MlError::evaluation(format!(
            "Found {} samples in X but {} labels",
            x.nrows(),
            y.len()
        )));
    }
    if x.ncols() == 0 {
        return Err(MlError::evaluation("Training data has no features"));
    }
    if x.iter().any(|v| !v.is_finite()) {
        return Err(MlError::evaluation("Input X contains NaN or infinity"));
    }
    if y.iter().any(|&v| v != 0.0 && v != 1.0) {
        return Err(MlError::evaluation("Labels must be exactly 0 or 1"));
    }
    let positives = y.iter().filter(|&&v| v == 1.0).count();
    if positives == 0 || positives == y.len() {
        return Err(MlError::evaluation(
            "Training data contains a single class; need both 0 and 1",
        ));
    }
    Ok(())
}

pub(crate) fn check_predict_input(x: &Array2<f64>, n_features: usize) -> Result<()> {
    if n_features == 0 {
        return Err(MlError::evaluation("Estimator is not fitted"));
    }
    if x.ncols() != n_features {
        return Err(MlError::evaluation(format!(
            "X has {} features, but the estimator was fitted with {}",
            x.ncols(),
            n_features
        )));
    }
    if x.iter().any(|v| !v.is_finite()) {
        return Err(MlError::evaluation("Input X contains NaN or infinity"));
    }
    Ok(())
}

pub(crate) fn threshold_labels(proba: &Array1<f64>) -> Array1<f64> {
    proba.mapv(|p| if p > 0.5 { 1.0 } else { 0.0 })
}

#[cfg(test)]
pub(crate) mod testing {
    use ndarray::{Array1, Array2};
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    /// Two noisy Gaussian blobs, roughly balanced.
    pub fn blobs(n: usize, seed: u64) -> (Array2<f64>, Array1<f64>) {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut x = Array2::zeros((n, 2));
        let mut y = Array1::zeros(n);
        for i in 0..n {
            let label = (i % 2) as f64;
            let center = if label == 1.0 { 1.5 } else { -1.5 };
            x[[i, 0]] = center + rng.gen_range(-1.0..1.0);
            x[[i, 1]] = center + rng.gen_range(-1.0..1.0);
            y[i] = label;
        }
        (x, y)
    }

    pub fn accuracy(pred: &Array1<f64>, y: &Array1<f64>) -> f64 {
        pred.iter().zip(y.iter()).filter(|(a, b)| a == b).count() as f64 / y.len() as f64
    }
}
