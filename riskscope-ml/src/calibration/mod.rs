//! Probability calibration: Platt scaling, isotonic regression and the
//! cross-validated wrapper that applies them to any registered estimator.

pub mod isotonic;
pub mod platt;
pub mod wrapper;

pub use isotonic::IsotonicCalibrator;
pub use platt::PlattScaler;
pub use wrapper::CalibratedClassifier;

use crate::error::{MlError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Requested calibration method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationMode {
    #[default]
    None,
    Sigmoid,
    Isotonic,
}

impl CalibrationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Sigmoid => "sigmoid",
            Self::Isotonic => "isotonic",
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::None)
    }
}

impl fmt::Display for CalibrationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CalibrationMode {
    type Err = MlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "" => Ok(Self::None),
            "sigmoid" => Ok(Self::Sigmoid),
            "isotonic" => Ok(Self::Isotonic),
            other => Err(MlError::config(format!(
                "Unknown calibration mode '{other}' (expected none, sigmoid or isotonic)"
            ))),
        }
    }
}

/// A fitted score-to-probability map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Calibrator {
    Sigmoid(PlattScaler),
    Isotonic(IsotonicCalibrator),
}

impl Calibrator {
    pub fn fit(
        mode: CalibrationMode,
        scores: &ndarray::Array1<f64>,
        labels: &ndarray::Array1<f64>,
    ) -> Result<Self> {
        match mode {
            CalibrationMode::Sigmoid => Ok(Self::Sigmoid(PlattScaler::fit(scores, labels)?)),
            CalibrationMode::Isotonic => {
                Ok(Self::Isotonic(IsotonicCalibrator::fit(scores, labels)?))
            }
            CalibrationMode::None => Err(MlError::config(
                "Calibration mode 'none' has no calibrator",
            )),
        }
    }

    pub fn transform(&self, score: f64) -> f64 {
        match self {
            Self::Sigmoid(p) => p.transform(score),
            Self::Isotonic(i) => i.transform(score),
        }
        .clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_modes() {
        assert_eq!("Sigmoid".parse::<CalibrationMode>().unwrap(), CalibrationMode::Sigmoid);
        assert_eq!(" isotonic ".parse::<CalibrationMode>().unwrap(), CalibrationMode::Isotonic);
        assert_eq!("none".parse::<CalibrationMode>().unwrap(), CalibrationMode::None);
    }

    #[test]
    fn test_unknown_mode_is_configuration_error() {
        let err = "beta".parse::<CalibrationMode>().unwrap_err();
        assert_eq!(err.kind(), "configuration_error");
    }

    #[test]
    fn test_none_has_no_calibrator() {
        let s = ndarray::array![0.0, 1.0];
        assert!(Calibrator::fit(CalibrationMode::None, &s, &s).is_err());
    }
}
