//! Best-effort feature attribution.
//!
//! [`explain_model`] picks exact TreeSHAP for uncalibrated tree models and the
//! sampling explainer for everything else. Failures never propagate: they are
//! turned into an [`ExplainSkip`] and logged.

pub mod sampling;
pub mod sink;
pub mod tree_shap;

pub use sampling::SamplingExplainer;
pub use sink::{ArtifactSink, FsArtifactSink};
pub use tree_shap::TreeEnsemble;

use crate::algorithms::{Classifier, Estimator};
use crate::error::{MlError, Result};
use crate::model::Model;
use ndarray::{Array1, Array2, Axis};
use rand::SeedableRng;
use rand::seq::index::sample;
use rand_chacha::ChaCha8Rng;
use riskscope_core::config::ExplainConfig;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Scale in which attributions are expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputSpace {
    Probability,
    LogOdds,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExplainerKind {
    TreeShap,
    Sampling,
}

/// Positive-class attributions for a sample of rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Explanation {
    /// Rows × features.
    pub attributions: Array2<f64>,
    pub base_value: f64,
    pub output_space: OutputSpace,
    pub explainer: ExplainerKind,
    /// The explained rows, aligned with `attributions`.
    pub features: Array2<f64>,
    pub feature_names: Vec<String>,
}

impl Explanation {
    /// Mean absolute attribution per feature.
    pub fn mean_abs(&self) -> Array1<f64> {
        self.attributions
            .mapv(f64::abs)
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(self.feature_names.len()))
    }

    /// Feature names with their mean |attribution|, largest first.
    pub fn ranking(&self) -> Vec<(String, f64)> {
        let mut ranked: Vec<(String, f64)> = self
            .feature_names
            .iter()
            .cloned()
            .zip(self.mean_abs())
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked
    }

    pub fn feature_index(&self, name: &str) -> Option<usize> {
        self.feature_names.iter().position(|f| f == name)
    }
}

/// Why no explanation was produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplainSkip {
    pub reason: String,
}

impl fmt::Display for ExplainSkip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)
    }
}

/// Explain a fitted model on a seeded sample of the rows of `x`.
pub fn explain_model(
    model: &Model,
    x: &Array2<f64>,
    feature_names: &[String],
    config: &ExplainConfig,
    seed: u64,
) -> std::result::Result<Explanation, ExplainSkip> {
    try_explain(model, x, feature_names, config, seed).map_err(|err| {
        let skip = ExplainSkip {
            reason: err.to_string(),
        };
        tracing::warn!(algorithm = %model.kind(), reason = %skip, "Skipping explanation");
        skip
    })
}

fn try_explain(
    model: &Model,
    x: &Array2<f64>,
    feature_names: &[String],
    config: &ExplainConfig,
    seed: u64,
) -> Result<Explanation> {
    if x.nrows() == 0 {
        return Err(MlError::explain("No rows to explain"));
    }
    if feature_names.len() != x.ncols() {
        return Err(MlError::explain(format!(
            "{} feature names for {} columns",
            feature_names.len(),
            x.ncols()
        )));
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let rows = sample_rows(x.nrows(), config.sample_cap, &mut rng);
    let features = x.select(Axis(0), &rows);

    let (attributions, base_value, output_space, explainer) = match model.as_estimator() {
        Some(estimator) if estimator.kind().is_tree_family() => {
            let (ensemble, space) = tree_ensemble(estimator)?;
            let phi = ensemble.shap_values(&features)?;
            (phi, ensemble.expected_value(), space, ExplainerKind::TreeShap)
        }
        _ => {
            let background_rows = sample_rows(x.nrows(), config.background_cap, &mut rng);
            let background = x.select(Axis(0), &background_rows);
            let predict = |m: &Array2<f64>| -> Result<Array1<f64>> {
                model
                    .positive_probability(m)?
                    .ok_or_else(|| MlError::explain("Model exposes no probability"))
            };
            let explainer = SamplingExplainer::new(predict, background)
                .with_permutations(config.permutations)
                .with_seed(seed);
            let phi = explainer.explain(&features)?;
            (
                phi,
                explainer.base_value()?,
                OutputSpace::Probability,
                ExplainerKind::Sampling,
            )
        }
    };

    tracing::info!(
        algorithm = %model.kind(),
        explainer = ?explainer,
        rows = features.nrows(),
        "Explanation computed"
    );
    Ok(Explanation {
        attributions,
        base_value,
        output_space,
        explainer,
        features,
        feature_names: feature_names.to_vec(),
    })
}

fn tree_ensemble(estimator: &Estimator) -> Result<(TreeEnsemble<'_>, OutputSpace)> {
    match estimator {
        Estimator::DecisionTree(m) => Ok((TreeEnsemble::from_decision_tree(m), OutputSpace::Probability)),
        Estimator::RandomForest(m) => Ok((TreeEnsemble::from_random_forest(m), OutputSpace::Probability)),
        Estimator::GradientBoosting(m) => {
            Ok((TreeEnsemble::from_gradient_boosting(m), OutputSpace::LogOdds))
        }
        other => Err(MlError::explain(format!(
            "{} is not a tree model",
            other.kind()
        ))),
    }
}

/// Sorted row indices: every row when `n <= cap`, else a seeded sample.
pub fn sample_rows(n: usize, cap: usize, rng: &mut ChaCha8Rng) -> Vec<usize> {
    if n <= cap {
        return (0..n).collect();
    }
    let mut rows = sample(rng, n, cap).into_vec();
    rows.sort_unstable();
    rows
}
