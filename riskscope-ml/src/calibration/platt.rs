//! Platt scaling (sigmoid calibration).
//!
//! Fits `P(y=1 | f) = sigmoid(a·f + b)` by Newton's method with backtracking,
//! using Platt's smoothed targets `(n₊+1)/(n₊+2)` and `1/(n₋+2)`.

use crate::algorithms::sigmoid;
use crate::error::{MlError, Result};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

const MAX_ITER: usize = 100;
const MIN_STEP: f64 = 1e-10;
const HESSIAN_RIDGE: f64 = 1e-12;
const GRADIENT_TOL: f64 = 1e-5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlattScaler {
    a: f64,
    b: f64,
}

impl PlattScaler {
    pub fn parameters(&self) -> (f64, f64) {
        (self.a, self.b)
    }

    pub fn transform(&self, score: f64) -> f64 {
        sigmoid(self.a * score + self.b)
    }

    pub fn fit(scores: &Array1<f64>, labels: &Array1<f64>) -> Result<Self> {
        let n = scores.len();
        if n == 0 || n != labels.len() {
            return Err(MlError::evaluation(format!(
                "Platt scaling needs matching non-empty inputs, got {} scores and {} labels",
                n,
                labels.len()
            )));
        }
        if scores.iter().any(|s| !s.is_finite()) {
            return Err(MlError::evaluation("Calibration scores contain NaN or infinity"));
        }

        let n_pos = labels.iter().filter(|&&y| y == 1.0).count() as f64;
        let n_neg = n as f64 - n_pos;
        let hi = (n_pos + 1.0) / (n_pos + 2.0);
        let lo = 1.0 / (n_neg + 2.0);
        let targets: Vec<f64> = labels.iter().map(|&y| if y == 1.0 { hi } else { lo }).collect();

        // Internally P = 1 / (1 + exp(A·f + B)), i.e. a = -A, b = -B.
        let mut big_a = 0.0;
        let mut big_b = ((n_neg + 1.0) / (n_pos + 1.0)).ln();
        let mut fval = objective(scores, &targets, big_a, big_b);

        for _ in 0..MAX_ITER {
            let (mut h11, mut h22, mut h21) = (HESSIAN_RIDGE, HESSIAN_RIDGE, 0.0);
            let (mut g1, mut g2) = (0.0, 0.0);
            for (&f, &t) in scores.iter().zip(targets.iter()) {
                let z = f * big_a + big_b;
                let (p, q) = if z >= 0.0 {
                    let e = (-z).exp();
                    (e / (1.0 + e), 1.0 / (1.0 + e))
                } else {
                    let e = z.exp();
                    (1.0 / (1.0 + e), e / (1.0 + e))
                };
                let d2 = p * q;
                h11 += f * f * d2;
                h22 += d2;
                h21 += f * d2;
                let d1 = t - p;
                g1 += f * d1;
                g2 += d1;
            }
            if g1.abs() < GRADIENT_TOL && g2.abs() < GRADIENT_TOL {
                break;
            }

            let det = h11 * h22 - h21 * h21;
            let da = -(h22 * g1 - h21 * g2) / det;
            let db = -(-h21 * g1 + h11 * g2) / det;
            let gd = g1 * da + g2 * db;

            let mut step = 1.0;
            while step >= MIN_STEP {
                let (na, nb) = (big_a + step * da, big_b + step * db);
                let nf = objective(scores, &targets, na, nb);
                if nf < fval + 1e-4 * step * gd {
                    big_a = na;
                    big_b = nb;
                    fval = nf;
                    break;
                }
                step /= 2.0;
            }
            if step < MIN_STEP {
                tracing::debug!("Platt line search failed, keeping current parameters");
                break;
            }
        }

        Ok(Self {
            a: -big_a,
            b: -big_b,
        })
    }
}

/// Cross-entropy of the smoothed targets under `1 / (1 + exp(A·f + B))`.
fn objective(scores: &Array1<f64>, targets: &[f64], big_a: f64, big_b: f64) -> f64 {
    scores
        .iter()
        .zip(targets.iter())
        .map(|(&f, &t)| {
            let z = f * big_a + big_b;
            if z >= 0.0 {
                t * z + (-z).exp().ln_1p()
            } else {
                (t - 1.0) * z + z.exp().ln_1p()
            }
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_monotone_in_score() {
        let scores = array![-2.0, -1.0, -0.5, 0.2, 0.4, 1.0, 1.5, 2.5];
        let labels = array![0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 1.0, 1.0];
        let platt = PlattScaler::fit(&scores, &labels).unwrap();
        let (a, _) = platt.parameters();
        assert!(a > 0.0);
        assert!(platt.transform(-1.0) < platt.transform(0.0));
        assert!(platt.transform(0.0) < platt.transform(1.0));
    }

    #[test]
    fn test_uninformative_scores_give_prior() {
        let scores = array![0.0, 0.0, 0.0, 0.0];
        let labels = array![0.0, 1.0, 1.0, 1.0];
        let platt = PlattScaler::fit(&scores, &labels).unwrap();
        // Smoothed targets: 4/5 for positives, 1/3 for the negative.
        let expected = (3.0 * 0.8 + 1.0 / 3.0) / 4.0;
        assert!((platt.transform(0.0) - expected).abs() < 1e-4);
    }

    #[test]
    fn test_rejects_mismatched_lengths() {
        assert!(PlattScaler::fit(&array![0.0, 1.0], &array![1.0]).is_err());
    }

    #[test]
    fn test_probabilities_in_unit_interval() {
        let scores = array![-50.0, -1.0, 1.0, 50.0];
        let labels = array![0.0, 0.0, 1.0, 1.0];
        let platt = PlattScaler::fit(&scores, &labels).unwrap();
        for s in [-1e6, -3.0, 0.0, 3.0, 1e6] {
            let p = platt.transform(s);
            assert!((0.0..=1.0).contains(&p));
        }
    }
}
