//! Where explanation artifacts go.
//!
//! The filesystem sink writes the plot data as JSON; rendering is left to
//! whatever reads those files.

use super::{ExplainerKind, Explanation, OutputSpace};
use crate::algorithms::AlgorithmKind;
use crate::error::{MlError, Result};
use riskscope_core::persistence::atomic_write_json;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Receives explanations and returns the path of the written artifact.
pub trait ArtifactSink {
    /// One summary per explained model.
    fn summary(&self, algorithm: AlgorithmKind, explanation: &Explanation) -> Result<PathBuf>;

    /// Attribution against value for a single feature.
    fn dependence(&self, feature: &str, explanation: &Explanation) -> Result<PathBuf>;
}

#[derive(Debug, Serialize)]
struct RankedFeature<'a> {
    feature: &'a str,
    mean_abs: f64,
}

#[derive(Debug, Serialize)]
struct SummaryRecord<'a> {
    algorithm: AlgorithmKind,
    explainer: ExplainerKind,
    output_space: OutputSpace,
    base_value: f64,
    feature_names: &'a [String],
    ranking: Vec<RankedFeature<'a>>,
    attributions: Vec<Vec<f64>>,
    values: Vec<Vec<f64>>,
}

#[derive(Debug, Serialize)]
struct DependenceRecord<'a> {
    feature: &'a str,
    output_space: OutputSpace,
    values: Vec<f64>,
    attributions: Vec<f64>,
}

/// Writes `shap_summary_<algorithm>.json` and `shap_dep_<feature>.json`.
#[derive(Debug, Clone)]
pub struct FsArtifactSink {
    dir: PathBuf,
}

impl FsArtifactSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ArtifactSink for FsArtifactSink {
    fn summary(&self, algorithm: AlgorithmKind, explanation: &Explanation) -> Result<PathBuf> {
        let ranking = explanation.ranking();
        let record = SummaryRecord {
            algorithm,
            explainer: explanation.explainer,
            output_space: explanation.output_space,
            base_value: explanation.base_value,
            feature_names: &explanation.feature_names,
            ranking: ranking
                .iter()
                .map(|(feature, mean_abs)| RankedFeature {
                    feature,
                    mean_abs: *mean_abs,
                })
                .collect(),
            attributions: rows(&explanation.attributions),
            values: rows(&explanation.features),
        };
        let path = self.dir.join(format!("shap_summary_{algorithm}.json"));
        atomic_write_json(&path, &record)?;
        tracing::debug!(path = %path.display(), "Wrote summary artifact");
        Ok(path)
    }

    fn dependence(&self, feature: &str, explanation: &Explanation) -> Result<PathBuf> {
        let idx = explanation
            .feature_index(feature)
            .ok_or_else(|| MlError::explain(format!("Unknown feature '{feature}'")))?;
        let record = DependenceRecord {
            feature,
            output_space: explanation.output_space,
            values: explanation.features.column(idx).to_vec(),
            attributions: explanation.attributions.column(idx).to_vec(),
        };
        let path = self
            .dir
            .join(format!("shap_dep_{}.json", file_stem(feature)));
        atomic_write_json(&path, &record)?;
        tracing::debug!(path = %path.display(), "Wrote dependence artifact");
        Ok(path)
    }
}

fn rows(m: &ndarray::Array2<f64>) -> Vec<Vec<f64>> {
    m.rows().into_iter().map(|r| r.to_vec()).collect()
}

/// Feature names may carry `=` or path separators from one-hot columns.
fn file_stem(feature: &str) -> String {
    feature
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
