//! Configuration for the riskscope harness.
//!
//! Uses `figment` for layered configuration: defaults -> user config ->
//! workspace `.riskscope/config.toml` -> environment -> explicit file.
//! Only the binary calls [`load_config`]; the library receives a fully built
//! [`HarnessConfig`] and never reads the process environment itself.

use crate::error::{CoreError, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level harness configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Seed shared by splits, estimators and explanation sampling.
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    #[serde(default)]
    pub calibration: CalibrationConfig,
    #[serde(default)]
    pub explain: ExplainConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub predict: PredictConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            evaluation: EvaluationConfig::default(),
            calibration: CalibrationConfig::default(),
            explain: ExplainConfig::default(),
            output: OutputConfig::default(),
            store: StoreConfig::default(),
            predict: PredictConfig::default(),
        }
    }
}

fn default_seed() -> u64 {
    42
}

/// Defaults for the `evaluate` mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Algorithms evaluated when the caller does not name any.
    #[serde(default = "default_algorithms")]
    pub algorithms: Vec<String>,
    /// Train-size ratios evaluated when the caller does not name any.
    #[serde(default = "default_splits")]
    pub splits: Vec<f64>,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            algorithms: default_algorithms(),
            splits: default_splits(),
        }
    }
}

fn default_algorithms() -> Vec<String> {
    [
        "decision_tree",
        "random_forest",
        "gradient_boosting",
        "logistic_regression",
        "svm",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_splits() -> Vec<f64> {
    vec![0.8, 0.7, 0.6]
}

/// Probability calibration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// Cross-validation folds used by the calibrated wrapper.
    #[serde(default = "default_folds")]
    pub folds: usize,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            folds: default_folds(),
        }
    }
}

fn default_folds() -> usize {
    5
}

/// Feature attribution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplainConfig {
    /// Run the explainer after each advanced-train fit.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Maximum background rows for the sampling explainer.
    #[serde(default = "default_background_cap")]
    pub background_cap: usize,
    /// Maximum rows explained per model.
    #[serde(default = "default_sample_cap")]
    pub sample_cap: usize,
    /// Permutations drawn per explained row by the sampling explainer.
    #[serde(default = "default_permutations")]
    pub permutations: usize,
    /// Also emit one dependence artifact per feature after advanced-train.
    #[serde(default)]
    pub dependence_plots: bool,
}

impl Default for ExplainConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            background_cap: default_background_cap(),
            sample_cap: default_sample_cap(),
            permutations: default_permutations(),
            dependence_plots: false,
        }
    }
}

fn default_background_cap() -> usize {
    50
}

fn default_sample_cap() -> usize {
    200
}

fn default_permutations() -> usize {
    10
}

/// Output locations for artifacts and bundles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory receiving explanation artifacts.
    #[serde(default = "default_analysis_dir")]
    pub analysis_dir: PathBuf,
    /// Directory receiving model bundles.
    #[serde(default = "default_models_dir")]
    pub models_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            analysis_dir: default_analysis_dir(),
            models_dir: default_models_dir(),
        }
    }
}

fn default_analysis_dir() -> PathBuf {
    PathBuf::from("uploads/analysis")
}

fn default_models_dir() -> PathBuf {
    PathBuf::from("models_store")
}

/// Connection settings injected into the status store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database holding model status rows.
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

fn default_database_path() -> PathBuf {
    PathBuf::from(".riskscope/models.db")
}

/// Inference-time settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictConfig {
    /// Allow falling back to the sorted keys of the request when neither the
    /// bundle nor the caller supplies a feature order.
    #[serde(default = "default_true")]
    pub allow_degraded_order: bool,
}

impl Default for PredictConfig {
    fn default() -> Self {
        Self {
            allow_degraded_order: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Load configuration from defaults, config files and environment variables.
///
/// Environment variables use the `RISKSCOPE_` prefix with `__` as the section
/// separator, e.g. `RISKSCOPE_EXPLAIN__SAMPLE_CAP=100`.
pub fn load_config(workspace: Option<&Path>, explicit: Option<&Path>) -> Result<HarnessConfig> {
    let mut figment = Figment::from(Serialized::defaults(HarnessConfig::default()));

    // User-level config
    if let Some(dirs) = directories::ProjectDirs::from("dev", "riskscope", "riskscope") {
        let user_config = dirs.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    // Workspace-level config
    if let Some(ws) = workspace {
        let ws_config = ws.join(".riskscope").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    figment = figment.merge(Env::prefixed("RISKSCOPE_").split("__"));

    if let Some(path) = explicit {
        if !path.exists() {
            return Err(CoreError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }
        figment = figment.merge(Toml::file(path));
    }

    figment.extract().map_err(|e| CoreError::Config(Box::new(e)))
}
