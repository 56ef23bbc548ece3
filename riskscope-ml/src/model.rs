//! A fitted-or-fittable model: a bare estimator or its calibrated wrapper.

use crate::algorithms::{AlgorithmKind, Capabilities, Classifier, Estimator};
use crate::calibration::{CalibratedClassifier, CalibrationMode};
use crate::error::Result;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Model {
    Base(Estimator),
    Calibrated(CalibratedClassifier),
}

impl Model {
    /// Fresh model for `kind`, wrapped in a calibrator unless `mode` is `none`.
    pub fn new(kind: AlgorithmKind, mode: CalibrationMode, folds: usize, seed: u64) -> Result<Self> {
        if mode.is_enabled() {
            Ok(Self::Calibrated(CalibratedClassifier::new(
                kind, mode, folds, seed,
            )?))
        } else {
            Ok(Self::Base(kind.build(seed)))
        }
    }

    pub fn kind(&self) -> AlgorithmKind {
        match self {
            Self::Base(e) => e.kind(),
            Self::Calibrated(c) => c.kind(),
        }
    }

    pub fn calibration(&self) -> CalibrationMode {
        match self {
            Self::Base(_) => CalibrationMode::None,
            Self::Calibrated(c) => c.mode(),
        }
    }

    /// The bare estimator when the model is uncalibrated.
    pub fn as_estimator(&self) -> Option<&Estimator> {
        match self {
            Self::Base(e) => Some(e),
            Self::Calibrated(_) => None,
        }
    }

    fn inner(&self) -> &dyn Classifier {
        match self {
            Self::Base(e) => e,
            Self::Calibrated(c) => c,
        }
    }
}

impl Classifier for Model {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        match self {
            Self::Base(e) => e.fit(x, y),
            Self::Calibrated(c) => c.fit(x, y),
        }
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.inner().predict(x)
    }

    fn capabilities(&self) -> Capabilities {
        self.inner().capabilities()
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.inner().predict_proba(x)
    }

    fn decision_function(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.inner().decision_function(x)
    }
}
