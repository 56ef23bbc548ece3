//! riskscope CLI: evaluation, calibration and explainability harness.
//!
//! Every mode prints one JSON document on stdout. Logs go to stderr and to a
//! daily JSON log file.

mod commands;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// riskscope: compare, calibrate and explain binary classifiers
#[derive(Parser, Debug)]
#[command(name = "riskscope", version, about, long_about = None)]
struct Cli {
    /// Workspace directory
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Evaluate algorithms across train-size ratios
    Evaluate {
        /// CSV dataset
        #[arg(long)]
        dataset: PathBuf,
        /// Target column
        #[arg(long)]
        target: String,
        /// Algorithms, comma separated (defaults from config)
        #[arg(long, value_delimiter = ',')]
        algorithms: Vec<String>,
        /// Train-size ratios, comma separated (defaults from config)
        #[arg(long, value_delimiter = ',')]
        splits: Vec<f64>,
        /// Calibration mode: none, sigmoid, isotonic
        #[arg(long, default_value = "none")]
        calibration: String,
    },
    /// Train on one held-out split, explain and save a bundle per algorithm
    AdvancedTrain {
        #[arg(long)]
        dataset: PathBuf,
        #[arg(long, default_value = "RiskScore")]
        target: String,
        /// Feature columns (defaults to every q*_score column)
        #[arg(long, value_delimiter = ',')]
        features: Vec<String>,
        #[arg(
            long,
            value_delimiter = ',',
            default_value = "random_forest,logistic_regression"
        )]
        algorithms: Vec<String>,
        #[arg(long, default_value_t = 0.2)]
        test_size: f64,
        /// Calibration mode: none, sigmoid, isotonic
        #[arg(long, default_value = "none")]
        calibration: String,
        /// Skip explanation artifacts
        #[arg(long)]
        no_explain: bool,
        /// Directory for explanation artifacts (defaults to output.analysis_dir)
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Write per-feature dependence artifacts
    ShapDependence {
        #[arg(long)]
        dataset: PathBuf,
        #[arg(long, default_value = "RiskScore")]
        target: String,
        #[arg(long, value_delimiter = ',')]
        features: Vec<String>,
        #[arg(long, default_value_t = 200)]
        sample_size: usize,
        /// Explain a stored bundle instead of fitting a forest
        #[arg(long)]
        model_path: Option<PathBuf>,
    },
    /// Predict with a stored bundle
    Predict {
        /// Bundle file
        #[arg(long)]
        model: PathBuf,
        /// JSON object, or JSON array of objects
        #[arg(long)]
        features: String,
        /// Treat the input as a batch
        #[arg(long)]
        batch: bool,
        /// Feature order for bundles without a feature list
        #[arg(long, value_delimiter = ',')]
        feature_names: Vec<String>,
    },
    /// Run a single-model training job and record its status
    TrainModel {
        #[arg(long)]
        model_id: i64,
        /// Job configuration as JSON: {modelType, filePath, parameters}
        #[arg(long = "config", value_name = "JSON")]
        job: String,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Create default configuration file
    Init,
    /// Show current configuration
    Show,
}

fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Set up tracing: human-readable stderr + JSON file logging
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(EnvFilter::new(filter));

    let log_dir = directories::ProjectDirs::from("dev", "riskscope", "riskscope")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "riskscope.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let output = match commands::handle_command(cli.command, &workspace, cli.config.as_deref()) {
        Ok(output) => output,
        Err(err) => {
            tracing::error!(kind = err.kind(), error = %err, "Command failed");
            serde_json::to_string(&commands::error_record(err.kind(), &err.to_string()))?
        }
    };
    println!("{output}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_evaluate_lists() {
        let cli = Cli::try_parse_from([
            "riskscope",
            "evaluate",
            "--dataset",
            "d.csv",
            "--target",
            "label",
            "--algorithms",
            "decision_tree,svm",
            "--splits",
            "0.8,0.6",
        ])
        .unwrap();
        let Commands::Evaluate { algorithms, splits, calibration, .. } = cli.command else {
            panic!("expected evaluate");
        };
        assert_eq!(algorithms, vec!["decision_tree", "svm"]);
        assert_eq!(splits, vec![0.8, 0.6]);
        assert_eq!(calibration, "none");
    }

    #[test]
    fn test_parse_advanced_train_defaults() {
        let cli = Cli::try_parse_from(["riskscope", "advanced-train", "--dataset", "d.csv"]).unwrap();
        let Commands::AdvancedTrain { target, algorithms, test_size, no_explain, .. } = cli.command
        else {
            panic!("expected advanced-train");
        };
        assert_eq!(target, "RiskScore");
        assert_eq!(algorithms, vec!["random_forest", "logistic_regression"]);
        assert_eq!(test_size, 0.2);
        assert!(!no_explain);
    }

    #[test]
    fn test_train_model_config_is_separate_from_global_config() {
        let cli = Cli::try_parse_from([
            "riskscope",
            "--config",
            "harness.toml",
            "train-model",
            "--model-id",
            "3",
            "--config",
            r#"{"filePath": "x.csv"}"#,
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("harness.toml")));
        let Commands::TrainModel { model_id, job } = cli.command else {
            panic!("expected train-model");
        };
        assert_eq!(model_id, 3);
        assert!(job.contains("filePath"));
    }
}
