//! # riskscope-core
//!
//! Shared foundation for the riskscope workspace: layered configuration,
//! atomic file persistence and the model status store that receives the
//! results of training jobs.

pub mod config;
pub mod error;
pub mod persistence;
pub mod store;

pub use config::{HarnessConfig, load_config};
pub use error::{CoreError, Result};
pub use store::{ModelStatus, NullStatusStore, SqliteStatusStore, StatusStore, StatusUpdate};
