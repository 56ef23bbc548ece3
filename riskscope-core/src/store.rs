//! Model status store.
//!
//! Training jobs report `{status, performance, model bytes}` keyed by an
//! external model id. The store is built from an explicit [`StoreConfig`];
//! it never looks at environment variables for credentials or paths.

use crate::config::StoreConfig;
use crate::error::Result;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Mutex;

/// Lifecycle state of a stored model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelStatus {
    Training,
    Completed,
    Failed,
}

impl ModelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Training => "training",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "training" => Some(Self::Training),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// A status update for one model row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub status: ModelStatus,
    pub performance: Option<serde_json::Value>,
    #[serde(skip)]
    pub model_data: Option<Vec<u8>>,
}

impl StatusUpdate {
    /// Marks a job as started. Clears any earlier outcome for the row.
    pub fn training() -> Self {
        Self {
            status: ModelStatus::Training,
            performance: None,
            model_data: None,
        }
    }

    pub fn completed(performance: serde_json::Value, model_data: Vec<u8>) -> Self {
        Self {
            status: ModelStatus::Completed,
            performance: Some(performance),
            model_data: Some(model_data),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: ModelStatus::Failed,
            performance: Some(serde_json::json!({ "error": message.into() })),
            model_data: None,
        }
    }
}

/// A stored model row.
#[derive(Debug, Clone)]
pub struct StoredModel {
    pub id: i64,
    pub status: ModelStatus,
    pub performance: Option<serde_json::Value>,
    pub model_data: Option<Vec<u8>>,
    pub updated_at: String,
}

/// Receiver of training job outcomes.
pub trait StatusStore: Send + Sync {
    /// Record the outcome of a job for `model_id`.
    fn update(&self, model_id: i64, update: &StatusUpdate) -> Result<()>;

    /// Fetch the current row for `model_id`.
    fn get(&self, model_id: i64) -> Result<Option<StoredModel>>;
}

/// Store that accepts every update and remembers nothing.
///
/// Stands in when the configured database cannot be opened so a job can
/// still train and report its outcome on stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullStatusStore;

impl StatusStore for NullStatusStore {
    fn update(&self, model_id: i64, update: &StatusUpdate) -> Result<()> {
        tracing::debug!(model_id, status = update.status.as_str(), "Status update dropped");
        Ok(())
    }

    fn get(&self, _model_id: i64) -> Result<Option<StoredModel>> {
        Ok(None)
    }
}

/// SQLite-backed [`StatusStore`].
pub struct SqliteStatusStore {
    conn: Mutex<Connection>,
}

impl SqliteStatusStore {
    /// Open (or create) the database named by the config.
    pub fn new(config: &StoreConfig) -> Result<Self> {
        if let Some(parent) = config.database_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Self::from_connection(Connection::open(&config.database_path)?)
    }

    /// In-memory store, used by tests and dry runs.
    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn open(path: &Path) -> Result<Self> {
        Self::new(&StoreConfig {
            database_path: path.to_path_buf(),
        })
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS prediction_models (
                id INTEGER PRIMARY KEY,
                status TEXT NOT NULL,
                performance TEXT,
                model_data BLOB,
                updated_at TEXT NOT NULL
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl StatusStore for SqliteStatusStore {
    fn update(&self, model_id: i64, update: &StatusUpdate) -> Result<()> {
        let performance = update
            .performance
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute(
            "INSERT INTO prediction_models (id, status, performance, model_data, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                performance = excluded.performance,
                model_data = excluded.model_data,
                updated_at = excluded.updated_at",
            params![
                model_id,
                update.status.as_str(),
                performance,
                update.model_data,
                Utc::now().to_rfc3339(),
            ],
        )?;
        tracing::debug!(model_id, status = update.status.as_str(), "Model status updated");
        Ok(())
    }

    fn get(&self, model_id: i64) -> Result<Option<StoredModel>> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let row = conn
            .query_row(
                "SELECT id, status, performance, model_data, updated_at
                 FROM prediction_models WHERE id = ?1",
                params![model_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<Vec<u8>>>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, status, performance, model_data, updated_at)) = row else {
            return Ok(None);
        };
        let performance = performance
            .map(|p| serde_json::from_str(&p))
            .transpose()?;
        Ok(Some(StoredModel {
            id,
            status: ModelStatus::parse(&status).unwrap_or(ModelStatus::Failed),
            performance,
            model_data,
            updated_at,
        }))
    }
}
