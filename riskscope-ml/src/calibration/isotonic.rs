//! Isotonic calibration via pool-adjacent-violators.

use crate::error::{MlError, Result};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Non-decreasing step function through `(xs, ys)`, linearly interpolated
/// between knots and clipped outside them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsotonicCalibrator {
    xs: Vec<f64>,
    ys: Vec<f64>,
}

impl IsotonicCalibrator {
    pub fn fit(scores: &Array1<f64>, labels: &Array1<f64>) -> Result<Self> {
        if scores.is_empty() || scores.len() != labels.len() {
            return Err(MlError::evaluation(format!(
                "Isotonic calibration needs matching non-empty inputs, got {} scores and {} labels",
                scores.len(),
                labels.len()
            )));
        }
        if scores.iter().any(|s| !s.is_finite()) {
            return Err(MlError::evaluation("Calibration scores contain NaN or infinity"));
        }

        let mut order: Vec<usize> = (0..scores.len()).collect();
        order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

        // Tied scores collapse into one weighted point.
        let mut xs: Vec<f64> = Vec::new();
        let mut sums: Vec<f64> = Vec::new();
        let mut weights: Vec<f64> = Vec::new();
        for &i in &order {
            match xs.last() {
                Some(&last) if last == scores[i] => {
                    if let (Some(s), Some(w)) = (sums.last_mut(), weights.last_mut()) {
                        *s += labels[i];
                        *w += 1.0;
                    }
                }
                _ => {
                    xs.push(scores[i]);
                    sums.push(labels[i]);
                    weights.push(1.0);
                }
            }
        }
        let means: Vec<f64> = sums.iter().zip(&weights).map(|(s, w)| s / w).collect();
        let ys = pava(&means, &weights);

        Ok(Self { xs, ys })
    }

    pub fn transform(&self, score: f64) -> f64 {
        let n = self.xs.len();
        if n == 0 {
            return 0.5;
        }
        if score <= self.xs[0] {
            return self.ys[0];
        }
        if score >= self.xs[n - 1] {
            return self.ys[n - 1];
        }
        let hi = self.xs.partition_point(|&x| x < score);
        if self.xs[hi] == score {
            return self.ys[hi];
        }
        let lo = hi - 1;
        let t = (score - self.xs[lo]) / (self.xs[hi] - self.xs[lo]);
        self.ys[lo] + t * (self.ys[hi] - self.ys[lo])
    }

    pub fn knots(&self) -> usize {
        self.xs.len()
    }
}

/// Weighted pool-adjacent-violators for a non-decreasing fit.
pub fn pava(values: &[f64], weights: &[f64]) -> Vec<f64> {
    // Each block: (mean, weight, number of points).
    let mut blocks: Vec<(f64, f64, usize)> = Vec::with_capacity(values.len());
    for (&v, &w) in values.iter().zip(weights) {
        blocks.push((v, w, 1));
        while blocks.len() > 1 {
            let (m2, w2, c2) = blocks[blocks.len() - 1];
            let (m1, w1, c1) = blocks[blocks.len() - 2];
            if m1 <= m2 {
                break;
            }
            blocks.pop();
            blocks.pop();
            let w = w1 + w2;
            blocks.push(((m1 * w1 + m2 * w2) / w, w, c1 + c2));
        }
    }
    blocks
        .into_iter()
        .flat_map(|(m, _, c)| std::iter::repeat_n(m, c))
        .collect()
}
