//! Run orchestration for the training and explanation modes.

pub mod advanced;
pub mod dependence;
pub mod train_job;

pub use advanced::{AdvancedOptions, AdvancedReport, AdvancedTrainer, ModelMetrics, TrainedModel};
pub use dependence::{DependenceOptions, DependenceReport, run_dependence};
pub use train_job::{TrainJob, TrainJobConfig, TrainJobOutcome, TrainJobParameters};

use crate::data::{Dataset, median};
use crate::error::{MlError, Result};
use ndarray::{Array1, Array2};

/// Fallback target columns, in order of preference.
pub const TARGET_CANDIDATES: [&str; 2] = ["RiskScore", "TotalScore"];

/// Explicit features (each must exist), else every `q*_score` column.
pub fn resolve_features(dataset: &Dataset, explicit: &[String]) -> Result<Vec<String>> {
    let explicit: Vec<String> = explicit
        .iter()
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty())
        .collect();
    if !explicit.is_empty() {
        for name in &explicit {
            dataset.require_column(name)?;
        }
        return Ok(explicit);
    }

    let matched: Vec<String> = dataset
        .column_names()
        .into_iter()
        .filter(|name| {
            let lower = name.to_lowercase();
            lower.starts_with('q') && lower.ends_with("_score")
        })
        .map(str::to_string)
        .collect();
    if matched.is_empty() {
        return Err(MlError::config(
            "No features given and no column matches the q*_score pattern",
        ));
    }
    Ok(matched)
}

/// The requested target if present, else the first fallback candidate present.
pub fn resolve_target(dataset: &Dataset, requested: &str) -> Result<String> {
    let requested = requested.trim();
    if !requested.is_empty() && dataset.has_column(requested) {
        return Ok(requested.to_string());
    }
    TARGET_CANDIDATES
        .iter()
        .find(|c| dataset.has_column(c))
        .map(|c| c.to_string())
        .ok_or_else(|| {
            MlError::config(format!(
                "Target column '{requested}' not found and no {} column exists",
                TARGET_CANDIDATES.join("/")
            ))
        })
}

/// Numeric matrix of `features` over every row; missing cells stay NaN.
pub fn feature_matrix(dataset: &Dataset, features: &[String]) -> Result<Array2<f64>> {
    let mut x = Array2::from_elem((dataset.n_rows(), features.len()), f64::NAN);
    for (j, name) in features.iter().enumerate() {
        let values = dataset.require_column(name)?.to_f64();
        x.column_mut(j).assign(&Array1::from(values));
    }
    Ok(x)
}

/// Per-column medians learned from one set of rows, used to fill NaN cells.
#[derive(Debug, Clone, PartialEq)]
pub struct MedianImputer {
    medians: Vec<f64>,
}

impl MedianImputer {
    /// Medians over the present cells of `x`. A column with no numeric value
    /// fills with 0.0.
    pub fn fit(x: &Array2<f64>) -> Self {
        let medians = x
            .columns()
            .into_iter()
            .map(|col| {
                let present: Vec<f64> = col.iter().copied().filter(|v| !v.is_nan()).collect();
                if present.is_empty() { 0.0 } else { median(&present) }
            })
            .collect();
        Self { medians }
    }

    pub fn medians(&self) -> &[f64] {
        &self.medians
    }

    pub fn transform(&self, x: &Array2<f64>) -> Array2<f64> {
        let mut out = x.clone();
        for (mut col, &fill) in out.columns_mut().into_iter().zip(&self.medians) {
            col.mapv_inplace(|v| if v.is_nan() { fill } else { v });
        }
        out
    }
}

/// [`feature_matrix`] with missing cells filled by medians over every row.
///
/// Only for explanation runs that never hold rows out.
pub fn median_filled_matrix(dataset: &Dataset, features: &[String]) -> Result<Array2<f64>> {
    let x = feature_matrix(dataset, features)?;
    Ok(MedianImputer::fit(&x).transform(&x))
}
