//! CLI subcommand handlers.
//!
//! Each handler returns the text printed on stdout. Library errors bubble up
//! as [`MlError`] and are turned into an error record by `main`.

use crate::{Commands, ConfigAction};
use riskscope_core::{HarnessConfig, NullStatusStore, SqliteStatusStore, StatusStore};
use riskscope_ml::pipeline::{
    AdvancedOptions, AdvancedTrainer, DependenceOptions, TrainJob, TrainJobConfig, run_dependence,
};
use riskscope_ml::{CalibrationMode, Dataset, Evaluator, FsArtifactSink, MlError, Predictor, Result};
use serde::Serialize;
use serde_json::{Value, json};
use std::path::Path;

/// `{"error": {"kind", "message"}}`
pub fn error_record(kind: &str, message: &str) -> Value {
    json!({ "error": { "kind": kind, "message": message } })
}

/// Handle a CLI subcommand.
pub fn handle_command(
    command: Commands,
    workspace: &Path,
    config_path: Option<&Path>,
) -> Result<String> {
    let config = load(workspace, config_path)?;
    match command {
        Commands::Evaluate {
            dataset,
            target,
            algorithms,
            splits,
            calibration,
        } => {
            let data = Dataset::from_csv_path(&dataset)?;
            let algorithms = or_default(algorithms, &config.evaluation.algorithms);
            let splits = or_default(splits, &config.evaluation.splits);
            let report = Evaluator::from_config(&config)
                .with_calibration(calibration.parse::<CalibrationMode>()?)
                .evaluate(&data, &target, &algorithms, &splits)?;
            to_json(&report)
        }
        Commands::AdvancedTrain {
            dataset,
            target,
            features,
            algorithms,
            test_size,
            calibration,
            no_explain,
            output_dir,
        } => {
            let data = Dataset::from_csv_path(&dataset)?;
            let options = AdvancedOptions {
                target,
                features,
                algorithms,
                test_size,
                calibration: calibration.parse()?,
                explain: !no_explain,
            };
            let sink = FsArtifactSink::new(
                output_dir.unwrap_or_else(|| config.output.analysis_dir.clone()),
            );
            let report = AdvancedTrainer::new(&config, &sink).run(&data, &options)?;
            to_json(&report)
        }
        Commands::ShapDependence {
            dataset,
            target,
            features,
            sample_size,
            model_path,
        } => {
            let data = Dataset::from_csv_path(&dataset)?;
            let options = DependenceOptions {
                target,
                features,
                sample_size,
                model_path,
            };
            let sink = FsArtifactSink::new(config.output.analysis_dir.clone());
            to_json(&run_dependence(&data, &options, &config, &sink)?)
        }
        Commands::Predict {
            model,
            features,
            batch,
            feature_names,
        } => {
            let predictor =
                Predictor::load(&model)?.with_degraded_order(config.predict.allow_degraded_order);
            let input: Value = serde_json::from_str(&features)?;
            let names = (!feature_names.is_empty()).then_some(feature_names.as_slice());
            to_json(&predictor.predict_json(&input, names, batch)?)
        }
        Commands::TrainModel { model_id, job } => {
            let job: TrainJobConfig = serde_json::from_str(&job)?;
            let store = open_store(&config);
            to_json(&TrainJob::new(store.as_ref()).run(model_id, &job))
        }
        Commands::Config { action } => handle_config(action, workspace, &config),
    }
}

fn handle_config(action: ConfigAction, workspace: &Path, config: &HarnessConfig) -> Result<String> {
    match action {
        ConfigAction::Init => {
            let config_dir = workspace.join(".riskscope");
            std::fs::create_dir_all(&config_dir)?;

            let path = config_dir.join("config.toml");
            if path.exists() {
                return to_json(&json!({ "created": false, "path": path }));
            }
            std::fs::write(&path, render_toml(&HarnessConfig::default())?)?;
            tracing::info!(path = %path.display(), "Created default configuration");
            to_json(&json!({ "created": true, "path": path }))
        }
        ConfigAction::Show => render_toml(config),
    }
}

fn load(workspace: &Path, config_path: Option<&Path>) -> Result<HarnessConfig> {
    riskscope_core::load_config(Some(workspace), config_path)
        .map_err(|e| MlError::config(e.to_string()))
}

/// The configured status store, or a store that drops updates when the
/// database cannot be opened.
fn open_store(config: &HarnessConfig) -> Box<dyn StatusStore> {
    match SqliteStatusStore::new(&config.store) {
        Ok(store) => Box::new(store),
        Err(err) => {
            tracing::warn!(
                path = %config.store.database_path.display(),
                error = %err,
                "Cannot open status store; model status will not be recorded"
            );
            Box::new(NullStatusStore)
        }
    }
}

/// An empty list from the command line means "use the configured defaults".
fn or_default<T: Clone>(given: Vec<T>, configured: &[T]) -> Vec<T> {
    if given.is_empty() {
        configured.to_vec()
    } else {
        given
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

fn render_toml(config: &HarnessConfig) -> Result<String> {
    toml::to_string_pretty(config)
        .map_err(|e| MlError::config(format!("Cannot render configuration: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_error_record_shape() {
        assert_eq!(
            error_record("bundle_error", "Checksum mismatch"),
            json!({"error": {"kind": "bundle_error", "message": "Checksum mismatch"}})
        );
    }

    #[test]
    fn test_or_default() {
        assert_eq!(or_default(Vec::new(), &[0.8, 0.7]), vec![0.8, 0.7]);
        assert_eq!(or_default(vec![0.5], &[0.8, 0.7]), vec![0.5]);
    }

    #[test]
    fn test_config_init_then_show() {
        let dir = TempDir::new().unwrap();
        let out = handle_command(Commands::Config { action: ConfigAction::Init }, dir.path(), None)
            .unwrap();
        let created: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(created["created"], json!(true));
        assert!(dir.path().join(".riskscope/config.toml").exists());

        let shown = handle_command(Commands::Config { action: ConfigAction::Show }, dir.path(), None)
            .unwrap();
        assert!(shown.contains("seed = 42"));
        assert!(shown.contains("[explain]"));
    }

    #[test]
    fn test_missing_dataset_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = handle_command(
            Commands::Evaluate {
                dataset: dir.path().join("absent.csv"),
                target: "label".into(),
                algorithms: Vec::new(),
                splits: Vec::new(),
                calibration: "none".into(),
            },
            dir.path(),
            None,
        )
        .unwrap_err();
        assert_eq!(err.kind(), "dataset_error");
    }

    #[test]
    fn test_train_model_with_unopenable_store_still_trains() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();
        let config_path = dir.path().join("harness.toml");
        std::fs::write(
            &config_path,
            format!(
                "[store]\ndatabase_path = {:?}\n",
                blocker.join("models.db").to_string_lossy()
            ),
        )
        .unwrap();

        let csv = dir.path().join("d.csv");
        let mut body = String::from("x1,x2,label\n");
        for i in 0..40 {
            body.push_str(&format!("{},{},{}\n", i, i % 3, if i >= 20 { "yes" } else { "no" }));
        }
        std::fs::write(&csv, body).unwrap();

        let out = handle_command(
            Commands::TrainModel {
                model_id: 11,
                job: json!({ "modelType": "DecisionTree", "filePath": csv }).to_string(),
            },
            dir.path(),
            Some(&config_path),
        )
        .unwrap();
        let payload: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(payload, json!({ "status": "success", "modelId": 11 }));
    }

    #[test]
    fn test_evaluate_end_to_end() {
        let dir = TempDir::new().unwrap();
        let csv = dir.path().join("d.csv");
        let mut body = String::from("x1,x2,label\n");
        for i in 0..40 {
            let y = i % 2;
            body.push_str(&format!("{},{},{}\n", y as f64 * 2.0 + (i % 5) as f64 * 0.1, i % 3, y));
        }
        std::fs::write(&csv, body).unwrap();

        let out = handle_command(
            Commands::Evaluate {
                dataset: csv,
                target: "label".into(),
                algorithms: vec!["decision_tree".into(), "knn".into()],
                splits: vec![0.8],
                calibration: "none".into(),
            },
            dir.path(),
            None,
        )
        .unwrap();
        let payload: Value = serde_json::from_str(&out).unwrap();
        assert!(payload["results"]["decision_tree"]["splits"]["0.8"]["accuracy"].is_number());
        assert!(payload["results"]["knn"]["error"].is_string());
    }
}
