//! Cross-validated calibration wrapper.
//!
//! For each of `k` stratified folds a fresh estimator is fit on the other
//! folds and a calibrator is fit on its held-out scores. Predictions average
//! the calibrated probabilities of all `k` members.

use super::{CalibrationMode, Calibrator};
use crate::algorithms::{
    AlgorithmKind, Capabilities, Classifier, Estimator, check_fit_input, threshold_labels,
};
use crate::error::{MlError, Result};
use crate::eval::split::stratified_kfold;
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibratedMember {
    pub estimator: Estimator,
    pub calibrator: Calibrator,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibratedClassifier {
    kind: AlgorithmKind,
    mode: CalibrationMode,
    folds: usize,
    seed: u64,
    members: Vec<CalibratedMember>,
}

impl CalibratedClassifier {
    pub fn new(kind: AlgorithmKind, mode: CalibrationMode, folds: usize, seed: u64) -> Result<Self> {
        if !mode.is_enabled() {
            return Err(MlError::config(
                "Calibrated wrapper requires a sigmoid or isotonic mode",
            ));
        }
        if folds < 2 {
            return Err(MlError::config(format!(
                "Calibration needs at least 2 folds, got {folds}"
            )));
        }
        Ok(Self {
            kind,
            mode,
            folds,
            seed,
            members: Vec::new(),
        })
    }

    pub fn kind(&self) -> AlgorithmKind {
        self.kind
    }

    pub fn mode(&self) -> CalibrationMode {
        self.mode
    }

    pub fn members(&self) -> &[CalibratedMember] {
        &self.members
    }

    /// Scores the calibrator sees: decision score when available, else probability.
    fn raw_scores(estimator: &Estimator, x: &Array2<f64>) -> Result<Array1<f64>> {
        if estimator.capabilities().supports_decision_score {
            estimator.decision_function(x)
        } else {
            estimator.predict_proba(x)
        }
    }

    fn check_class_counts(&self, y: &Array1<f64>) -> Result<()> {
        let positives = y.iter().filter(|&&v| v == 1.0).count();
        let negatives = y.iter().filter(|&&v| v == 0.0).count();
        let smallest = positives.min(negatives);
        if smallest < self.folds {
            return Err(MlError::config(format!(
                "Requested {}-fold calibration but the smallest class has only {} members",
                self.folds, smallest
            )));
        }
        Ok(())
    }
}

impl Classifier for CalibratedClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        if y.iter().any(|&v| v != 0.0 && v != 1.0) {
            return Err(MlError::evaluation("Labels must be exactly 0 or 1"));
        }
        self.check_class_counts(y)?;
        check_fit_input(x, y)?;

        let mut members = Vec::with_capacity(self.folds);
        for fold in stratified_kfold(y, self.folds, self.seed)? {
            let mut estimator = self.kind.build(self.seed);
            estimator.fit(&x.select(Axis(0), &fold.train), &y.select(Axis(0), &fold.train))?;

            let held_out = x.select(Axis(0), &fold.test);
            let scores = Self::raw_scores(&estimator, &held_out)?;
            let calibrator = Calibrator::fit(self.mode, &scores, &y.select(Axis(0), &fold.test))?;
            members.push(CalibratedMember {
                estimator,
                calibrator,
            });
        }

        self.members = members;
        tracing::debug!(
            algorithm = %self.kind,
            mode = %self.mode,
            folds = self.folds,
            "Calibrated classifier fitted"
        );
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(threshold_labels(&self.predict_proba(x)?))
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::PROBABILITY_ONLY
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.members.is_empty() {
            return Err(MlError::evaluation("Calibrated classifier is not fitted"));
        }
        let mut total = Array1::zeros(x.nrows());
        for member in &self.members {
            let scores = Self::raw_scores(&member.estimator, x)?;
            total += &scores.mapv(|s| member.calibrator.transform(s));
        }
        Ok(total / self.members.len() as f64)
    }
}
