//! L2-regularized logistic regression fitted by Newton's method (IRLS).

use super::linalg::solve;
use super::{
    Capabilities, Classifier, check_fit_input, check_predict_input, sigmoid, threshold_labels,
};
use crate::error::Result;
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Minimizes `½‖w‖² + C · Σ logloss`; the intercept is not penalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    c: f64,
    max_iter: usize,
    tol: f64,
    coef: Array1<f64>,
    intercept: f64,
    n_iter: usize,
}

impl LogisticRegression {
    pub fn new(c: f64, max_iter: usize) -> Self {
        Self {
            c,
            max_iter,
            tol: 1e-8,
            coef: Array1::zeros(0),
            intercept: 0.0,
            n_iter: 0,
        }
    }

    pub fn coef(&self) -> &Array1<f64> {
        &self.coef
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    /// Newton iterations used by the last fit.
    pub fn n_iter(&self) -> usize {
        self.n_iter
    }

    fn objective(&self, design: &Array2<f64>, y: &Array1<f64>, w: &Array1<f64>, d: usize) -> f64 {
        let z = design.dot(w);
        let loss: f64 = z
            .iter()
            .zip(y.iter())
            .map(|(&zi, &yi)| {
                // log(1 + e^z) - y·z, computed without overflow
                let softplus = if zi > 0.0 {
                    zi + (-zi).exp().ln_1p()
                } else {
                    zi.exp().ln_1p()
                };
                softplus - yi * zi
            })
            .sum();
        let penalty: f64 = w.iter().take(d).map(|v| v * v).sum::<f64>() / 2.0;
        penalty + self.c * loss
    }
}

impl Classifier for LogisticRegression {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        let (n, d) = x.dim();

        // Design matrix with a trailing intercept column.
        let mut design = Array2::ones((n, d + 1));
        design.slice_mut(ndarray::s![.., ..d]).assign(x);

        let mut w = Array1::<f64>::zeros(d + 1);
        let mut converged = false;
        self.n_iter = 0;

        for iter in 0..self.max_iter {
            self.n_iter = iter + 1;
            let p = design.dot(&w).mapv(sigmoid);

            let mut grad = design.t().dot(&(&p - y)) * self.c;
            for j in 0..d {
                grad[j] += w[j];
            }

            let weights = p.mapv(|pi| (pi * (1.0 - pi)).max(1e-12));
            let weighted = &design * &weights.view().insert_axis(Axis(1));
            let mut hessian = design.t().dot(&weighted) * self.c;
            for j in 0..d {
                hessian[[j, j]] += 1.0;
            }
            hessian[[d, d]] += 1e-10;

            let mut step = solve(hessian, grad)?;

            // Backtrack until the penalized loss does not increase.
            let current = self.objective(&design, y, &w, d);
            let mut candidate = &w - &step;
            for _ in 0..30 {
                if self.objective(&design, y, &candidate, d) <= current + 1e-12 {
                    break;
                }
                step *= 0.5;
                candidate = &w - &step;
            }
            w = candidate;
            if step.iter().all(|s| s.abs() < self.tol) {
                converged = true;
                break;
            }
        }

        if !converged {
            tracing::warn!(
                max_iter = self.max_iter,
                "Logistic regression did not converge"
            );
        }
        self.coef = w.slice(ndarray::s![..d]).to_owned();
        self.intercept = w[d];
        tracing::debug!(iterations = self.n_iter, "Logistic regression fitted");
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
        check_predict_input(x, self.coef.len())?;
        Ok(x.dot(&self.coef) + self.intercept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::testing::{accuracy, blobs};
    use ndarray::array;

    #[test]
    fn test_separates_blobs() {
        let (x, y) = blobs(60, 11);
        let mut model = LogisticRegression::new(1.0, 100);
        model.fit(&x, &y).unwrap();
        assert!(accuracy(&model.predict(&x).unwrap(), &y) > 0.95);
        assert!(model.coef()[0] > 0.0);
    }

    #[test]
    fn test_separable_data_stays_finite() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];
        let mut model = LogisticRegression::new(1.0, 100);
        model.fit(&x, &y).unwrap();
        assert!(model.coef()[0].is_finite());
        assert!(model.n_iter() < 100);
        let proba = model.predict_proba(&x).unwrap();
        assert!(proba[0] < 0.5 && proba[3] > 0.5);
    }

    #[test]
    fn test_gradient_vanishes_at_optimum() {
        let (x, y) = blobs(40, 12);
        let mut model = LogisticRegression::new(1.0, 100);
        model.fit(&x, &y).unwrap();
        let p = model.predict_proba(&x).unwrap();
        let residual = &p - &y;
        // Intercept is unpenalized, so its gradient is Σ(p - y).
        assert!(residual.sum().abs() < 1e-6);
    }
}
