//! RBF-kernel support vector classifier trained with SMO.
//!
//! Probabilities come from Platt scaling fitted on 5-fold out-of-fold decision
//! values.

use super::{Capabilities, Classifier, check_fit_input, check_predict_input};
use crate::calibration::platt::PlattScaler;
use crate::error::{MlError, Result};
use crate::eval::split::stratified_kfold;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Kernel matrices above this many rows are refused.
const MAX_KERNEL_SAMPLES: usize = 10_000;

const PROBABILITY_FOLDS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Svm {
    c: f64,
    tol: f64,
    max_iter: usize,
    seed: u64,
    gamma: f64,
    support_vectors: Array2<f64>,
    /// `alpha_i · y_i` for each support vector, with y in {-1, +1}.
    dual_coef: Array1<f64>,
    bias: f64,
    platt: Option<PlattScaler>,
    n_features: usize,
}

impl Svm {
    pub fn new(c: f64, seed: u64) -> Self {
        Self {
            c,
            tol: 1e-3,
            max_iter: 1000,
            seed,
            gamma: 1.0,
            support_vectors: Array2::zeros((0, 0)),
            dual_coef: Array1::zeros(0),
            bias: 0.0,
            platt: None,
            n_features: 0,
        }
    }

    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    pub fn n_support(&self) -> usize {
        self.dual_coef.len()
    }

    fn kernel(&self, a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        let dist: f64 = a.iter().zip(b.iter()).map(|(p, q)| (p - q) * (p - q)).sum();
        (-self.gamma * dist).exp()
    }

    /// `1 / (n_features · Var(X))` over every element of X.
    fn scale_gamma(x: &Array2<f64>) -> f64 {
        let var = x.var(0.0);
        if var > 0.0 {
            1.0 / (x.ncols() as f64 * var)
        } else {
            1.0
        }
    }

    /// Fit the margin only; `gamma` must already be set.
    fn fit_margin(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        let n = x.nrows();
        if n > MAX_KERNEL_SAMPLES {
            return Err(MlError::evaluation(format!(
                "SVM training set has {n} rows, more than the {MAX_KERNEL_SAMPLES} supported"
            )));
        }
        let signed = y.mapv(|v| if v == 1.0 { 1.0 } else { -1.0 });

        let mut kernel = Array2::zeros((n, n));
        for i in 0..n {
            for j in i..n {
                let k = self.kernel(x.row(i), x.row(j));
                kernel[[i, j]] = k;
                kernel[[j, i]] = k;
            }
        }

        let (alphas, bias) = self.smo(&kernel, &signed);

        let support: Vec<usize> = (0..n).filter(|&i| alphas[i] > 1e-8).collect();
        let mut support_vectors = Array2::zeros((support.len(), x.ncols()));
        let mut dual_coef = Array1::zeros(support.len());
        for (k, &i) in support.iter().enumerate() {
            support_vectors.row_mut(k).assign(&x.row(i));
            dual_coef[k] = alphas[i] * signed[i];
        }

        self.support_vectors = support_vectors;
        self.dual_coef = dual_coef;
        self.bias = bias;
        self.n_features = x.ncols();
        Ok(())
    }

    /// Simplified SMO with a random second multiplier.
    fn smo(&self, kernel: &Array2<f64>, y: &Array1<f64>) -> (Array1<f64>, f64) {
        let n = y.len();
        let mut alphas = Array1::<f64>::zeros(n);
        let mut bias = 0.0;
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);

        let output = |alphas: &Array1<f64>, bias: f64, i: usize| -> f64 {
            let mut f = bias;
            for k in 0..n {
                if alphas[k] > 0.0 {
                    f += alphas[k] * y[k] * kernel[[k, i]];
                }
            }
            f
        };

        let max_passes = 5;
        let mut passes = 0;
        let mut iter = 0;
        while passes < max_passes && iter < self.max_iter && n > 1 {
            let mut changed = 0;
            for i in 0..n {
                let e_i = output(&alphas, bias, i) - y[i];
                let violates = (y[i] * e_i < -self.tol && alphas[i] < self.c)
                    || (y[i] * e_i > self.tol && alphas[i] > 0.0);
                if !violates {
                    continue;
                }

                let j = loop {
                    let j = rng.gen_range(0..n);
                    if j != i {
                        break j;
                    }
                };
                let e_j = output(&alphas, bias, j) - y[j];
                let (ai_old, aj_old) = (alphas[i], alphas[j]);

                let (lo, hi) = if y[i] != y[j] {
                    ((aj_old - ai_old).max(0.0), (self.c + aj_old - ai_old).min(self.c))
                } else {
                    ((ai_old + aj_old - self.c).max(0.0), (ai_old + aj_old).min(self.c))
                };
                if (hi - lo).abs() < 1e-10 {
                    continue;
                }

                let eta = 2.0 * kernel[[i, j]] - kernel[[i, i]] - kernel[[j, j]];
                if eta >= 0.0 {
                    continue;
                }

                let aj = (aj_old - y[j] * (e_i - e_j) / eta).clamp(lo, hi);
                if (aj - aj_old).abs() < 1e-5 {
                    continue;
                }
                let ai = ai_old + y[i] * y[j] * (aj_old - aj);
                alphas[i] = ai;
                alphas[j] = aj;

                let b1 = bias
                    - e_i
                    - y[i] * (ai - ai_old) * kernel[[i, i]]
                    - y[j] * (aj - aj_old) * kernel[[i, j]];
                let b2 = bias
                    - e_j
                    - y[i] * (ai - ai_old) * kernel[[i, j]]
                    - y[j] * (aj - aj_old) * kernel[[j, j]];
                bias = if ai > 0.0 && ai < self.c {
                    b1
                } else if aj > 0.0 && aj < self.c {
                    b2
                } else {
                    (b1 + b2) / 2.0
                };
                changed += 1;
            }

            iter += 1;
            if changed == 0 {
                passes += 1;
            } else {
                passes = 0;
            }
        }

        if iter >= self.max_iter {
            tracing::warn!(max_iter = self.max_iter, "SMO stopped before convergence");
        }
        (alphas, bias)
    }

    fn margin(&self, x: &Array2<f64>) -> Array1<f64> {
        x.rows()
            .into_iter()
            .map(|row| {
                self.support_vectors
                    .rows()
                    .into_iter()
                    .zip(self.dual_coef.iter())
                    .map(|(sv, coef)| coef * self.kernel(sv, row))
                    .sum::<f64>()
                    + self.bias
            })
            .collect()
    }

    /// Decision values for every row, each produced by a model that did not
    /// train on it. Falls back to in-sample values when a class is too small
    /// to spread over the folds.
    fn out_of_fold_scores(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<Array1<f64>> {
        let positives = y.iter().filter(|&&v| v == 1.0).count();
        let negatives = y.len() - positives;
        if positives.min(negatives) < PROBABILITY_FOLDS {
            tracing::debug!(
                positives,
                negatives,
                "Too few samples for out-of-fold Platt scaling, using in-sample scores"
            );
            return Ok(self.margin(x));
        }

        let mut scores = Array1::zeros(y.len());
        for fold in stratified_kfold(y, PROBABILITY_FOLDS, self.seed)? {
            let train = fold.train;
            let x_train = x.select(Axis(0), &train);
            let y_train = y.select(Axis(0), &train);
            let mut inner = Svm::new(self.c, self.seed);
            inner.gamma = self.gamma;
            inner.fit_margin(&x_train, &y_train)?;

            let held_out = inner.margin(&x.select(Axis(0), &fold.test));
            for (&row, &score) in fold.test.iter().zip(held_out.iter()) {
                scores[row] = score;
            }
        }
        Ok(scores)
    }
}

impl Classifier for Svm {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        self.gamma = Self::scale_gamma(x);
        self.fit_margin(x, y)?;

        let scores = self.out_of_fold_scores(x, y)?;
        self.platt = Some(PlattScaler::fit(&scores, y)?);

        tracing::debug!(
            support = self.n_support(),
            gamma = self.gamma,
            "SVM fitted"
        );
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(self
            .decision_function(x)?
            .mapv(|f| if f > 0.0 { 1.0 } else { 0.0 }))
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::PROBABILITY_AND_SCORE
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let platt = self
            .platt
            .as_ref()
            .ok_or_else(|| MlError::evaluation("SVM probability model is not fitted"))?;
        Ok(self.decision_function(x)?.mapv(|f| platt.transform(f)))
    }

    fn decision_function(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        check_predict_input(x, self.n_features)?;
        Ok(self.margin(x))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::testing::{accuracy, blobs};
    use ndarray::array;

    #[test]
    fn test_separates_blobs() {
        let (x, y) = blobs(60, 13);
        let mut model = Svm::new(1.0, 42);
        model.fit(&x, &y).unwrap();
        assert!(accuracy(&model.predict(&x).unwrap(), &y) > 0.9);
        assert!(model.n_support() > 0);
    }

    #[test]
    fn test_probability_increases_with_score() {
        let (x, y) = blobs(60, 14);
        let mut model = Svm::new(1.0, 42);
        model.fit(&x, &y).unwrap();
        let probe = array![[-2.0, -2.0], [0.0, 0.0], [2.0, 2.0]];
        let proba = model.predict_proba(&probe).unwrap();
        assert!(proba[0] < proba[1] && proba[1] < proba[2]);
        assert!(proba.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn test_gamma_scales_with_variance() {
        let x = array![[0.0, 2.0], [2.0, 0.0]];
        // Var over all four elements is 1.0.
        assert!((Svm::scale_gamma(&x) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_small_classes_fall_back_to_in_sample_scores() {
        let x = array![[0.0], [0.2], [0.4], [3.0], [3.2], [3.4]];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let mut model = Svm::new(1.0, 1);
        model.fit(&x, &y).unwrap();
        let proba = model.predict_proba(&x).unwrap();
        assert!(proba[5] > proba[0]);
    }
}
