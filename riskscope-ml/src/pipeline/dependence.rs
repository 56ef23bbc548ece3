//! Per-feature dependence artifacts.
//!
//! With a bundle path the stored model is explained; otherwise a random forest
//! is fitted on a seeded sample against the binarized target.

use super::{median_filled_matrix, resolve_features, resolve_target};
use crate::algorithms::{AlgorithmKind, Classifier};
use crate::bundle::ModelBundle;
use crate::calibration::CalibrationMode;
use crate::data::{BinaryTarget, Dataset};
use crate::error::{MlError, Result};
use crate::eval::OrderedMap;
use crate::explain::{ArtifactSink, explain_model, sample_rows};
use crate::model::Model;
use ndarray::Axis;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use riskscope_core::HarnessConfig;
use serde::Serialize;
use std::path::PathBuf;

/// Fewest rows used for the dependence sample.
const MIN_SAMPLE: usize = 20;

#[derive(Debug, Clone)]
pub struct DependenceOptions {
    pub target: String,
    pub features: Vec<String>,
    pub sample_size: usize,
    pub model_path: Option<PathBuf>,
}

impl Default for DependenceOptions {
    fn default() -> Self {
        Self {
            target: "RiskScore".to_string(),
            features: Vec::new(),
            sample_size: 200,
            model_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DependenceReport {
    pub images: OrderedMap<PathBuf>,
}

pub fn run_dependence(
    dataset: &Dataset,
    options: &DependenceOptions,
    config: &HarnessConfig,
    sink: &dyn ArtifactSink,
) -> Result<DependenceReport> {
    let stored = match &options.model_path {
        Some(path) => Some(ModelBundle::load(path)?),
        None => None,
    };
    let features = match stored.as_ref().and_then(|b| b.features.as_ref()) {
        Some(spec) => spec.names().to_vec(),
        None => resolve_features(dataset, &options.features)?,
    };

    let x = median_filled_matrix(dataset, &features)?;
    let cap = options.sample_size.max(MIN_SAMPLE);
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);

    let (model, sample) = match stored {
        Some(bundle) => {
            let rows = sample_rows(x.nrows(), cap, &mut rng);
            (bundle.model, x.select(Axis(0), &rows))
        }
        None => {
            let target = resolve_target(dataset, &options.target)?;
            let binary = BinaryTarget::from_column(dataset.require_column(&target)?)?;
            let picked = sample_rows(binary.rows.len(), cap, &mut rng);
            let rows: Vec<usize> = picked.iter().map(|&i| binary.rows[i]).collect();
            let sample = x.select(Axis(0), &rows);
            let y = binary.y.select(Axis(0), &picked);

            let mut model = Model::new(
                AlgorithmKind::RandomForest,
                CalibrationMode::None,
                config.calibration.folds,
                config.seed,
            )?;
            model.fit(&sample, &y)?;
            (model, sample)
        }
    };

    let mut explain_config = config.explain.clone();
    explain_config.sample_cap = sample.nrows();
    let explanation = explain_model(&model, &sample, &features, &explain_config, config.seed)
        .map_err(|skip| MlError::explain(skip.reason))?;

    let mut images = OrderedMap::new();
    for feature in &features {
        images.insert(feature.clone(), sink.dependence(feature, &explanation)?);
    }
    tracing::info!(
        features = images.len(),
        rows = sample.nrows(),
        "Dependence artifacts written"
    );
    Ok(DependenceReport { images })
}
