//! The advanced training run: one held-out split, every requested algorithm
//! fitted, scored, optionally explained and saved as a bundle.

use super::{MedianImputer, feature_matrix, resolve_features, resolve_target};
use crate::algorithms::{AlgorithmKind, Classifier};
use crate::bundle::{FeatureSpec, ModelBundle};
use crate::calibration::CalibrationMode;
use crate::data::{BinaryTarget, Dataset, TargetEncoding};
use crate::error::Result;
use crate::eval::{accuracy, f1_score, roc_auc, split_by_test_size};
use crate::explain::{ArtifactSink, explain_model};
use crate::model::Model;
use ndarray::{Array1, Array2, Axis};
use riskscope_core::HarnessConfig;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct AdvancedOptions {
    pub target: String,
    /// Empty means every `q*_score` column.
    pub features: Vec<String>,
    pub algorithms: Vec<String>,
    pub test_size: f64,
    pub calibration: CalibrationMode,
    pub explain: bool,
}

impl Default for AdvancedOptions {
    fn default() -> Self {
        Self {
            target: "RiskScore".to_string(),
            features: Vec::new(),
            algorithms: vec!["random_forest".to_string(), "logistic_regression".to_string()],
            test_size: 0.2,
            calibration: CalibrationMode::None,
            explain: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelMetrics {
    pub accuracy: Option<f64>,
    pub auc: Option<f64>,
    pub f1: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainedModel {
    pub algorithm: String,
    pub metrics: ModelMetrics,
    #[serde(rename = "modelPath")]
    pub model_path: Option<PathBuf>,
    pub shap_summary_png: Option<PathBuf>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub shap_dependence: BTreeMap<String, PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdvancedReport {
    pub target: String,
    pub features: Vec<String>,
    pub target_note: String,
    pub calibration: CalibrationMode,
    pub models: Vec<TrainedModel>,
}

/// Prepared inputs shared by every algorithm of one run.
struct Prepared {
    x_train: Array2<f64>,
    y_train: Array1<f64>,
    x_test: Array2<f64>,
    y_test: Vec<f64>,
    spec: FeatureSpec,
    target: String,
    encoding: TargetEncoding,
}

pub struct AdvancedTrainer<'a> {
    config: &'a HarnessConfig,
    sink: &'a dyn ArtifactSink,
    models_dir: PathBuf,
}

impl<'a> AdvancedTrainer<'a> {
    pub fn new(config: &'a HarnessConfig, sink: &'a dyn ArtifactSink) -> Self {
        Self {
            config,
            sink,
            models_dir: config.output.models_dir.clone(),
        }
    }

    pub fn with_models_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.models_dir = dir.into();
        self
    }

    pub fn run(&self, dataset: &Dataset, options: &AdvancedOptions) -> Result<AdvancedReport> {
        let features = resolve_features(dataset, &options.features)?;
        let target = resolve_target(dataset, &options.target)?;
        let binary = BinaryTarget::from_column(dataset.require_column(&target)?)?;
        let x_all = feature_matrix(dataset, &features)?.select(Axis(0), &binary.rows);

        let stratify = {
            let positives = binary.y.iter().filter(|&&v| v == 1.0).count();
            positives > 0 && positives < binary.y.len()
        };
        let partition = split_by_test_size(&binary.y, options.test_size, stratify, self.config.seed)?;

        tracing::info!(
            target = %target,
            features = features.len(),
            rows = binary.y.len(),
            dropped = dataset.n_rows() - binary.rows.len(),
            encoding = %binary.encoding,
            calibration = %options.calibration,
            "Starting advanced training"
        );

        let x_train = x_all.select(Axis(0), &partition.train);
        let imputer = MedianImputer::fit(&x_train);
        let prepared = Prepared {
            x_train: imputer.transform(&x_train),
            y_train: binary.y.select(Axis(0), &partition.train),
            x_test: imputer.transform(&x_all.select(Axis(0), &partition.test)),
            y_test: binary.y.select(Axis(0), &partition.test).to_vec(),
            spec: FeatureSpec::new(features.clone())?,
            target: target.clone(),
            encoding: binary.encoding.clone(),
        };

        let mut models = Vec::new();
        for name in options.algorithms.iter().map(|a| a.trim()).filter(|a| !a.is_empty()) {
            let kind = match name.parse::<AlgorithmKind>() {
                Ok(kind) => kind,
                Err(err) => {
                    tracing::warn!(algorithm = %name, error = %err, "Skipping unknown algorithm");
                    continue;
                }
            };
            let entry = match self.train_one(kind, options, &prepared) {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::warn!(algorithm = %kind, error = %err, "Training failed");
                    TrainedModel {
                        algorithm: kind.to_string(),
                        metrics: ModelMetrics {
                            accuracy: None,
                            auc: None,
                            f1: None,
                        },
                        model_path: None,
                        shap_summary_png: None,
                        shap_dependence: BTreeMap::new(),
                        error: Some(err.to_string()),
                    }
                }
            };
            models.push(entry);
        }

        Ok(AdvancedReport {
            target,
            features,
            target_note: binary.encoding.note(),
            calibration: options.calibration,
            models,
        })
    }

    fn train_one(
        &self,
        kind: AlgorithmKind,
        options: &AdvancedOptions,
        data: &Prepared,
    ) -> Result<TrainedModel> {
        let mut model = Model::new(
            kind,
            options.calibration,
            self.config.calibration.folds,
            self.config.seed,
        )?;
        model.fit(&data.x_train, &data.y_train)?;

        let predicted = model.predict(&data.x_test)?.to_vec();
        let proba = model.positive_probability(&data.x_test)?;
        let metrics = ModelMetrics {
            accuracy: accuracy(&data.y_test, &predicted),
            auc: proba.and_then(|p| roc_auc(&data.y_test, &p.to_vec())),
            f1: f1_score(&data.y_test, &predicted),
        };
        tracing::info!(
            algorithm = %kind,
            accuracy = ?metrics.accuracy,
            auc = ?metrics.auc,
            "Model trained"
        );

        let mut shap_summary_png = None;
        let mut shap_dependence = BTreeMap::new();
        if options.explain && self.config.explain.enabled {
            if let Ok(explanation) = explain_model(
                &model,
                &data.x_train,
                data.spec.names(),
                &self.config.explain,
                self.config.seed,
            ) {
                match self.sink.summary(kind, &explanation) {
                    Ok(path) => shap_summary_png = Some(path),
                    Err(err) => tracing::warn!(algorithm = %kind, error = %err, "Summary artifact failed"),
                }
                if self.config.explain.dependence_plots {
                    for feature in data.spec.names() {
                        match self.sink.dependence(feature, &explanation) {
                            Ok(path) => {
                                shap_dependence.insert(feature.clone(), path);
                            }
                            Err(err) => tracing::warn!(feature = %feature, error = %err, "Dependence artifact failed"),
                        }
                    }
                }
            }
        }

        let bundle = ModelBundle::new(
            model,
            Some(data.spec.clone()),
            data.target.clone(),
            data.encoding.clone(),
        );
        let path = self.models_dir.join(format!(
            "{kind}_{}.bundle",
            chrono::Utc::now().timestamp_millis()
        ));
        bundle.save(&path)?;

        Ok(TrainedModel {
            algorithm: kind.to_string(),
            metrics,
            model_path: Some(path),
            shap_summary_png,
            shap_dependence,
            error: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Column;
    use crate::explain::FsArtifactSink;
    use tempfile::TempDir;

    fn dataset(n: usize) -> Dataset {
        let q1: Vec<f64> = (0..n).map(|i| (i % 10) as f64).collect();
        let q2: Vec<f64> = (0..n).map(|i| ((i * 3) % 7) as f64).collect();
        let risk: Vec<f64> = (0..n).map(|i| (i % 10) as f64 * 2.0 + ((i * 3) % 7) as f64 * 0.1).collect();
        Dataset::from_columns(vec![
            Column::numeric("q1_score", q1),
            Column::numeric("q2_score", q2),
            Column::numeric("RiskScore", risk),
        ])
        .unwrap()
    }

    #[test]
    fn test_run_writes_bundles_and_reports() {
        let dir = TempDir::new().unwrap();
        let config = HarnessConfig::default();
        let sink = FsArtifactSink::new(dir.path().join("analysis"));
        let trainer = AdvancedTrainer::new(&config, &sink).with_models_dir(dir.path().join("models"));
        let options = AdvancedOptions {
            algorithms: vec!["decision_tree".into(), "knn".into(), "logistic_regression".into()],
            ..AdvancedOptions::default()
        };
        let report = trainer.run(&dataset(60), &options).unwrap();

        assert_eq!(report.target, "RiskScore");
        assert_eq!(report.features, vec!["q1_score", "q2_score"]);
        assert!(report.target_note.starts_with("binarized_at_median_"));
        assert_eq!(report.models.len(), 2);
        for model in &report.models {
            assert!(model.error.is_none());
            let path = model.model_path.as_ref().unwrap();
            let bundle = ModelBundle::load(path).unwrap();
            assert_eq!(bundle.features.unwrap().names(), ["q1_score", "q2_score"]);
            assert!(model.shap_summary_png.as_ref().unwrap().exists());
        }
        assert!(report.models[0].model_path.as_ref().unwrap().to_string_lossy().contains("decision_tree_"));
    }

    #[test]
    fn test_explanations_can_be_disabled() {
        let dir = TempDir::new().unwrap();
        let config = HarnessConfig::default();
        let sink = FsArtifactSink::new(dir.path().join("analysis"));
        let trainer = AdvancedTrainer::new(&config, &sink).with_models_dir(dir.path());
        let options = AdvancedOptions {
            algorithms: vec!["gradient_boosting".into()],
            explain: false,
            ..AdvancedOptions::default()
        };
        let report = trainer.run(&dataset(40), &options).unwrap();
        assert_eq!(report.models[0].shap_summary_png, None);
        let json = serde_json::to_value(&report).unwrap();
        assert!(json["models"][0]["shap_summary_png"].is_null());
        assert!(json["models"][0]["modelPath"].is_string());
    }

    #[test]
    fn test_missing_feature_cells_are_filled() {
        let dir = TempDir::new().unwrap();
        let config = HarnessConfig::default();
        let sink = FsArtifactSink::new(dir.path().join("analysis"));
        let q1: Vec<f64> = (0..50)
            .map(|i| if i % 7 == 0 { f64::NAN } else { (i % 10) as f64 })
            .collect();
        let risk: Vec<f64> = (0..50).map(|i| (i % 10) as f64).collect();
        let ds = Dataset::from_columns(vec![
            Column::numeric("q1_score", q1),
            Column::numeric("RiskScore", risk),
        ])
        .unwrap();
        let options = AdvancedOptions {
            algorithms: vec!["logistic_regression".into()],
            explain: false,
            ..AdvancedOptions::default()
        };
        let report = AdvancedTrainer::new(&config, &sink)
            .with_models_dir(dir.path())
            .run(&ds, &options)
            .unwrap();
        assert!(report.models[0].error.is_none());
        assert!(report.models[0].metrics.accuracy.unwrap().is_finite());
    }

    #[test]
    fn test_missing_pattern_is_configuration_error() {
        let dir = TempDir::new().unwrap();
        let config = HarnessConfig::default();
        let sink = FsArtifactSink::new(dir.path());
        let ds = Dataset::from_columns(vec![
            Column::numeric("age", vec![1.0, 2.0]),
            Column::numeric("RiskScore", vec![0.0, 1.0]),
        ])
        .unwrap();
        let err = AdvancedTrainer::new(&config, &sink)
            .run(&ds, &AdvancedOptions::default())
            .unwrap_err();
        assert_eq!(err.kind(), "configuration_error");
    }
}
