//! Multi-algorithm, multi-split evaluation.
//!
//! Every (algorithm, ratio) pair gets its own partition, preprocessor and
//! model. A failing pair is recorded in place and never stops its siblings.

use super::metrics::{accuracy, mean_present, roc_auc};
use super::split::{split_by_train_ratio, validate_ratio};
use crate::algorithms::{AlgorithmKind, Classifier};
use crate::calibration::CalibrationMode;
use crate::data::{ClassLabels, Dataset};
use crate::error::{MlError, Result};
use crate::model::Model;
use crate::preprocess::FeaturePreprocessor;
use ndarray::Axis;
use riskscope_core::HarnessConfig;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

/// String-keyed entries serialized as a JSON object in insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedMap<V>(Vec<(String, V)>);

impl<V> OrderedMap<V> {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: V) {
        self.0.push((key.into(), value));
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.0.iter().map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<V> Default for OrderedMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Serialize> Serialize for OrderedMap<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Outcome of one (algorithm, ratio) pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SplitResult {
    pub accuracy: Option<f64>,
    pub auc: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SplitResult {
    fn failed(err: &MlError) -> Self {
        Self {
            accuracy: None,
            auc: None,
            error: Some(err.to_string()),
        }
    }
}

/// Per-algorithm results keyed by ratio, plus averages over non-null values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlgorithmSummary {
    pub splits: OrderedMap<SplitResult>,
    pub average_accuracy: Option<f64>,
    pub average_auc: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AlgorithmSummary {
    fn from_splits(splits: OrderedMap<SplitResult>) -> Self {
        let average_accuracy = mean_present(splits.values().map(|s| s.accuracy));
        let average_auc = mean_present(splits.values().map(|s| s.auc));
        Self {
            splits,
            average_accuracy,
            average_auc,
            error: None,
        }
    }

    fn failed(err: &MlError) -> Self {
        Self {
            splits: OrderedMap::new(),
            average_accuracy: None,
            average_auc: None,
            error: Some(err.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationReport {
    pub results: OrderedMap<AlgorithmSummary>,
}

/// Drives the evaluation loop with a fixed seed and calibration setup.
#[derive(Debug, Clone)]
pub struct Evaluator {
    seed: u64,
    calibration: CalibrationMode,
    folds: usize,
}

impl Evaluator {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            calibration: CalibrationMode::None,
            folds: 5,
        }
    }

    pub fn from_config(config: &HarnessConfig) -> Self {
        Self {
            seed: config.seed,
            calibration: CalibrationMode::None,
            folds: config.calibration.folds,
        }
    }

    pub fn with_calibration(mut self, mode: CalibrationMode) -> Self {
        self.calibration = mode;
        self
    }

    /// Evaluate each algorithm at each train-size ratio.
    ///
    /// Ratios outside (0, 1), a missing target column or a missing target
    /// value fail the whole request; everything else is recorded per entry.
    pub fn evaluate(
        &self,
        dataset: &Dataset,
        target: &str,
        algorithms: &[String],
        splits: &[f64],
    ) -> Result<EvaluationReport> {
        for &ratio in splits {
            validate_ratio(ratio, "Split ratio")?;
        }
        let labels = ClassLabels::from_column(dataset.require_column(target)?)?;
        let plan = FeaturePreprocessor::new(dataset, target)?;

        let algorithms = dedup_by(algorithms.iter().map(|a| a.trim().to_string()), |a, b| a == b);
        let splits = dedup_by(splits.iter().copied(), |a, b| a == b);
        tracing::info!(
            rows = dataset.n_rows(),
            algorithms = algorithms.len(),
            splits = splits.len(),
            classes = labels.n_classes(),
            calibration = %self.calibration,
            "Starting evaluation"
        );

        let mut results = OrderedMap::new();
        for name in algorithms {
            let kind = match name.parse::<AlgorithmKind>() {
                Ok(kind) => kind,
                Err(err) => {
                    tracing::warn!(algorithm = %name, error = %err, "Skipping algorithm");
                    results.insert(name, AlgorithmSummary::failed(&err));
                    continue;
                }
            };

            let mut per_split = OrderedMap::new();
            for &ratio in &splits {
                let result = match self.evaluate_pair(dataset, &plan, &labels, kind, ratio) {
                    Ok(result) => result,
                    Err(err) => {
                        tracing::debug!(algorithm = %kind, ratio, error = %err, "Split failed");
                        SplitResult::failed(&err)
                    }
                };
                tracing::debug!(
                    algorithm = %kind,
                    ratio,
                    accuracy = ?result.accuracy,
                    auc = ?result.auc,
                    "Split evaluated"
                );
                per_split.insert(format!("{ratio}"), result);
            }
            results.insert(name, AlgorithmSummary::from_splits(per_split));
        }

        Ok(EvaluationReport { results })
    }

    fn evaluate_pair(
        &self,
        dataset: &Dataset,
        plan: &FeaturePreprocessor,
        labels: &ClassLabels,
        kind: AlgorithmKind,
        ratio: f64,
    ) -> Result<SplitResult> {
        let partition = split_by_train_ratio(&labels.y, ratio, labels.is_binary(), self.seed)?;

        let preprocessor = plan.fit(dataset, &partition.train)?;
        let x_train = preprocessor.transform(dataset, &partition.train)?;
        let x_test = preprocessor.transform(dataset, &partition.test)?;
        let y_train = labels.y.select(Axis(0), &partition.train);
        let y_test = labels.y.select(Axis(0), &partition.test).to_vec();

        let mut model = Model::new(kind, self.calibration, self.folds, self.seed)?;
        model.fit(&x_train, &y_train)?;

        let predicted = model.predict(&x_test)?.to_vec();
        let proba = model.positive_probability(&x_test)?;
        Ok(SplitResult {
            accuracy: accuracy(&y_test, &predicted),
            auc: proba.and_then(|p| roc_auc(&y_test, &p.to_vec())),
            error: None,
        })
    }
}

fn dedup_by<T, I, F>(items: I, same: F) -> Vec<T>
where
    I: IntoIterator<Item = T>,
    F: Fn(&T, &T) -> bool,
{
    let mut out: Vec<T> = Vec::new();
    for item in items {
        if !out.iter().any(|seen| same(seen, &item)) {
            out.push(item);
        }
    }
    out
}
