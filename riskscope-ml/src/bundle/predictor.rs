//! Inference over a loaded bundle.
//!
//! Feature order comes from the bundle's [`FeatureSpec`] when present, then
//! from a caller-supplied name list, and last from the sorted keys of the
//! request (flagged as degraded).

use super::format::ModelBundle;
use crate::algorithms::Classifier;
use crate::error::{MlError, Result};
use ndarray::Array2;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// Feature values of one request row, keyed by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureMap(BTreeMap<String, f64>);

impl FeatureMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        self.0.insert(name.into(), value);
    }

    /// Missing features read as 0.0.
    pub fn value(&self, name: &str) -> f64 {
        self.0.get(name).copied().unwrap_or(0.0)
    }

    pub fn sorted_keys(&self) -> Vec<String> {
        self.0.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Numbers, booleans, numeric strings and `null` (read as 0.0).
    pub fn from_json(value: &Value) -> Result<Self> {
        let Value::Object(obj) = value else {
            return Err(MlError::config("Features must be a JSON object"));
        };
        let mut map = Self::new();
        for (name, v) in obj {
            let x = match v {
                Value::Number(n) => n.as_f64(),
                Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
                Value::Null => Some(0.0),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            }
            .ok_or_else(|| MlError::config(format!("Feature '{name}' is not numeric")))?;
            map.insert(name.clone(), x);
        }
        Ok(map)
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for FeatureMap {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub pred: i64,
    /// Original target label for `pred`, for bundles trained on text labels.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub proba: Option<f64>,
    pub used_features: Vec<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub degraded: bool,
}

#[derive(Debug, Clone)]
pub struct Predictor {
    bundle: ModelBundle,
    allow_degraded_order: bool,
}

impl Predictor {
    pub fn new(bundle: ModelBundle) -> Self {
        Self {
            bundle,
            allow_degraded_order: true,
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        Ok(Self::new(ModelBundle::load(path)?))
    }

    pub fn with_degraded_order(mut self, allow: bool) -> Self {
        self.allow_degraded_order = allow;
        self
    }

    pub fn bundle(&self) -> &ModelBundle {
        &self.bundle
    }

    /// Resolve the feature order for `row`; the flag is set for the
    /// sorted-keys fallback.
    pub fn feature_order(
        &self,
        row: &FeatureMap,
        names: Option<&[String]>,
    ) -> Result<(Vec<String>, bool)> {
        if let Some(spec) = &self.bundle.features {
            return Ok((spec.names().to_vec(), false));
        }
        if let Some(names) = names.filter(|n| !n.is_empty()) {
            return Ok((names.to_vec(), false));
        }
        if !self.allow_degraded_order {
            return Err(MlError::config(
                "Bundle has no feature list and no feature names were supplied",
            ));
        }
        tracing::warn!(
            bundle_id = %self.bundle.id,
            "Bundle has no feature list; ordering features by sorted key"
        );
        Ok((row.sorted_keys(), true))
    }

    pub fn predict(&self, row: &FeatureMap, names: Option<&[String]>) -> Result<Prediction> {
        let (order, degraded) = self.feature_order(row, names)?;
        let values: Vec<f64> = order.iter().map(|name| row.value(name)).collect();
        let x = Array2::from_shape_vec((1, values.len()), values)
            .map_err(|e| MlError::evaluation(e.to_string()))?;

        let model = &self.bundle.model;
        let pred = model.predict(&x)?;
        let proba = model.positive_probability(&x)?.map(|p| p[0]);
        let pred = pred[0] as i64;
        Ok(Prediction {
            pred,
            label: self.bundle.target_encoding.class_label(pred).map(str::to_string),
            proba,
            used_features: order,
            degraded,
        })
    }

    /// One prediction per row, in input order.
    pub fn predict_batch(
        &self,
        rows: &[FeatureMap],
        names: Option<&[String]>,
    ) -> Result<Vec<Prediction>> {
        rows.iter().map(|row| self.predict(row, names)).collect()
    }

    /// Predict from a JSON object (single) or array of objects (batch).
    pub fn predict_json(
        &self,
        input: &Value,
        names: Option<&[String]>,
        batch: bool,
    ) -> Result<Value> {
        match input {
            Value::Array(items) => {
                let rows = items
                    .iter()
                    .map(FeatureMap::from_json)
                    .collect::<Result<Vec<_>>>()?;
                Ok(serde_json::to_value(self.predict_batch(&rows, names)?)?)
            }
            Value::Object(_) if !batch => {
                Ok(serde_json::to_value(self.predict(&FeatureMap::from_json(input)?, names)?)?)
            }
            _ if batch => Err(MlError::config("Batch input must be a JSON array of objects")),
            _ => Err(MlError::config("Features must be a JSON object or array")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::AlgorithmKind;
    use crate::bundle::FeatureSpec;
    use crate::calibration::CalibrationMode;
    use crate::data::TargetEncoding;
    use crate::model::Model;
    use ndarray::array;
    use serde_json::json;

    /// Logistic regression where only the second feature matters.
    fn bundle(with_spec: bool) -> ModelBundle {
        let x = array![
            [0.0, -2.0],
            [1.0, -1.5],
            [0.0, -1.0],
            [1.0, -0.5],
            [0.0, 0.5],
            [1.0, 1.0],
            [0.0, 1.5],
            [1.0, 2.0]
        ];
        let y = array![0.0, 0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 1.0];
        let mut model = Model::new(AlgorithmKind::LogisticRegression, CalibrationMode::None, 5, 0)
            .unwrap();
        model.fit(&x, &y).unwrap();
        let spec = with_spec.then(|| FeatureSpec::new(vec!["a".into(), "b".into()]).unwrap());
        ModelBundle::new(model, spec, "label", TargetEncoding::AsIs)
    }

    #[test]
    fn test_missing_feature_defaults_to_zero() {
        let predictor = Predictor::new(bundle(true));
        let partial: FeatureMap = [("b", 3.0)].into_iter().collect();
        let full: FeatureMap = [("a", 0.0), ("b", 3.0)].into_iter().collect();
        let p1 = predictor.predict(&partial, None).unwrap();
        let p2 = predictor.predict(&full, None).unwrap();
        assert_eq!(p1, p2);
        assert_eq!(p1.used_features, vec!["a", "b"]);
        assert!(!p1.degraded);
    }

    #[test]
    fn test_bundle_spec_beats_caller_names() {
        let predictor = Predictor::new(bundle(true));
        let names = vec!["b".to_string(), "a".to_string()];
        let (order, degraded) = predictor
            .feature_order(&FeatureMap::new(), Some(&names))
            .unwrap();
        assert_eq!(order, vec!["a", "b"]);
        assert!(!degraded);
    }

    #[test]
    fn test_caller_names_then_sorted_keys() {
        let predictor = Predictor::new(bundle(false));
        let row: FeatureMap = [("b", 1.0), ("a", 2.0)].into_iter().collect();
        let names = vec!["b".to_string(), "a".to_string()];
        let (order, degraded) = predictor.feature_order(&row, Some(&names)).unwrap();
        assert_eq!(order, names);
        assert!(!degraded);

        let (order, degraded) = predictor.feature_order(&row, None).unwrap();
        assert_eq!(order, vec!["a", "b"]);
        assert!(degraded);
    }

    #[test]
    fn test_class_index_bundle_reports_label() {
        let mut labelled = bundle(true);
        labelled.target_encoding = TargetEncoding::ClassIndex {
            classes: vec!["low".into(), "high".into()],
        };
        let predictor = Predictor::new(labelled);
        let high: FeatureMap = [("a", 0.0), ("b", 3.0)].into_iter().collect();
        let p = predictor.predict(&high, None).unwrap();
        assert_eq!(p.pred, 1);
        assert_eq!(p.label.as_deref(), Some("high"));

        let plain = Predictor::new(bundle(true)).predict(&high, None).unwrap();
        assert!(plain.label.is_none());
        assert!(serde_json::to_value(&plain).unwrap().get("label").is_none());
    }

    #[test]
    fn test_degraded_order_can_be_refused() {
        let predictor = Predictor::new(bundle(false)).with_degraded_order(false);
        let row: FeatureMap = [("a", 1.0)].into_iter().collect();
        let err = predictor.predict(&row, None).unwrap_err();
        assert_eq!(err.kind(), "configuration_error");
    }

    #[test]
    fn test_json_single_and_batch() {
        let predictor = Predictor::new(bundle(true));
        let single = predictor
            .predict_json(&json!({"a": 1, "b": 2.5}), None, false)
            .unwrap();
        assert_eq!(single["used_features"], json!(["a", "b"]));
        assert!(single.get("degraded").is_none());
        assert!(single["proba"].is_number());

        let batch = predictor
            .predict_json(&json!([{"b": -3.0}, {"b": 3.0}]), None, true)
            .unwrap();
        let preds: Vec<i64> = batch
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["pred"].as_i64().unwrap())
            .collect();
        assert_eq!(preds, vec![0, 1]);
    }

    #[test]
    fn test_non_numeric_feature_rejected() {
        let err = FeatureMap::from_json(&json!({"a": "high"})).unwrap_err();
        assert_eq!(err.kind(), "configuration_error");
        let ok = FeatureMap::from_json(&json!({"a": "1.5", "b": null, "c": true})).unwrap();
        assert_eq!(ok.value("a"), 1.5);
        assert_eq!(ok.value("b"), 0.0);
        assert_eq!(ok.value("c"), 1.0);
    }
}
