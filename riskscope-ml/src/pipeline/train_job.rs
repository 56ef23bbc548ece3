//! Single-model training job reported through a [`StatusStore`].
//!
//! The last column is the target. Categorical feature columns are one-hot
//! encoded, the split is unstratified and the resulting bundle bytes are
//! handed to the store together with `{accuracy, auc}`.

use crate::algorithms::{AlgorithmKind, Classifier};
use crate::bundle::{FeatureSpec, ModelBundle};
use crate::calibration::CalibrationMode;
use crate::data::{ClassLabels, Dataset};
use crate::error::{MlError, Result};
use crate::eval::{accuracy, roc_auc, split_by_test_size};
use crate::model::Model;
use crate::preprocess::FeaturePreprocessor;
use ndarray::Axis;
use riskscope_core::{StatusStore, StatusUpdate};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainJobConfig {
    #[serde(default = "default_model_type")]
    pub model_type: String,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub parameters: TrainJobParameters,
}

fn default_model_type() -> String {
    "LogisticRegression".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainJobParameters {
    #[serde(default = "default_test_size")]
    pub test_size: f64,
    #[serde(default = "default_random_state")]
    pub random_state: u64,
}

impl Default for TrainJobParameters {
    fn default() -> Self {
        Self {
            test_size: default_test_size(),
            random_state: default_random_state(),
        }
    }
}

fn default_test_size() -> f64 {
    0.2
}

fn default_random_state() -> u64 {
    42
}

/// What the job prints when it finishes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TrainJobOutcome {
    Success {
        #[serde(rename = "modelId")]
        model_id: i64,
    },
    Error {
        message: String,
    },
}

/// Result of a successful fit, before it is reported.
struct Trained {
    performance: serde_json::Value,
    bytes: Vec<u8>,
}

pub struct TrainJob<'a> {
    store: &'a dyn StatusStore,
}

impl<'a> TrainJob<'a> {
    pub fn new(store: &'a dyn StatusStore) -> Self {
        Self { store }
    }

    /// Run the job. Store failures are logged and do not change the outcome.
    pub fn run(&self, model_id: i64, config: &TrainJobConfig) -> TrainJobOutcome {
        let Some(file_path) = config.file_path.as_deref().filter(|p| !p.is_empty()) else {
            return TrainJobOutcome::Error {
                message: "filePath is required.".to_string(),
            };
        };

        tracing::info!(model_id, model_type = %config.model_type, "Starting training job");
        self.report(model_id, &StatusUpdate::training());
        match train(Path::new(file_path), config) {
            Ok(trained) => {
                self.report(model_id, &StatusUpdate::completed(trained.performance, trained.bytes));
                TrainJobOutcome::Success { model_id }
            }
            Err(err) => {
                let message = err.to_string();
                tracing::warn!(model_id, error = %message, "Training job failed");
                self.report(model_id, &StatusUpdate::failed(message.clone()));
                TrainJobOutcome::Error { message }
            }
        }
    }

    fn report(&self, model_id: i64, update: &StatusUpdate) {
        if let Err(err) = self.store.update(model_id, update) {
            tracing::warn!(model_id, error = %err, "Could not record model status");
        }
    }
}

fn train(path: &Path, config: &TrainJobConfig) -> Result<Trained> {
    if path.extension().and_then(|e| e.to_str()) != Some("csv") {
        return Err(MlError::config("Only .csv files are currently supported."));
    }
    let kind = AlgorithmKind::from_model_type(&config.model_type)?;
    let seed = config.parameters.random_state;

    let dataset = Dataset::from_csv_path(path)?;
    let target = dataset
        .columns()
        .last()
        .map(|c| c.name.clone())
        .ok_or_else(|| MlError::dataset("Dataset has no columns"))?;
    let labels = ClassLabels::from_column(dataset.require_column(&target)?)?;

    let partition = split_by_test_size(&labels.y, config.parameters.test_size, false, seed)?;
    let preprocessor = FeaturePreprocessor::new(&dataset, &target)?.fit(&dataset, &partition.train)?;
    let x_train = preprocessor.transform(&dataset, &partition.train)?;
    let x_test = preprocessor.transform(&dataset, &partition.test)?;
    let y_train = labels.y.select(Axis(0), &partition.train);
    let y_test = labels.y.select(Axis(0), &partition.test).to_vec();

    let mut model = Model::new(kind, CalibrationMode::None, 2, seed)?;
    model.fit(&x_train, &y_train)?;
    let predicted = model.predict(&x_test)?.to_vec();
    let proba = model.positive_probability(&x_test)?;
    let performance = serde_json::json!({
        "accuracy": accuracy(&y_test, &predicted),
        "auc": proba.and_then(|p| roc_auc(&y_test, &p.to_vec())),
    });

    let spec = FeatureSpec::new(preprocessor.feature_names().to_vec())?;
    let bundle = ModelBundle::new(model, Some(spec), target, labels.encoding());
    tracing::info!(algorithm = %kind, performance = %performance, "Training job finished");
    Ok(Trained {
        performance,
        bytes: bundle.to_bytes()?,
    })
}
