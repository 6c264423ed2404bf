//! Runtime configuration.
//!
//! Every setting can be given as a flag or through its `PULSEWATCH_*`
//! environment variable; flags win.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, ValueEnum};

use crate::adapters::csv::CsvRecordStore;
use crate::adapters::sqlite::SqliteRecordStore;
use crate::adapters::StorageError;
use crate::ports::RecordStore;

/// Record store shared by the services, whichever backend was chosen.
pub type SharedRecordStore = Arc<dyn RecordStore<Error = StorageError>>;

/// Backend for the record log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum StoreBackend {
    /// `patient_records.csv`, whole-table atomic rewrite per append
    #[default]
    Csv,
    /// `patient_records.db`, one INSERT per append
    Sqlite,
}

/// Where log lines go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogMode {
    /// Standard error, keeping stdout clean for command output
    #[default]
    Stderr,
    Stdout,
    /// Append to `--log-file`
    File,
}

/// Settings shared by every command.
#[derive(Args, Debug, Clone)]
pub struct AppConfig {
    /// Directory holding heart_disease_model.json, scaler.json and optional manifest.json
    #[arg(long, env = "PULSEWATCH_MODEL_DIR", default_value = "models", global = true)]
    pub model_dir: PathBuf,

    /// Directory holding the record log; created on first write
    #[arg(long, env = "PULSEWATCH_DATA_DIR", default_value = "data", global = true)]
    pub data_dir: PathBuf,

    /// Record store backend
    #[arg(long, env = "PULSEWATCH_STORE", value_enum, default_value_t = StoreBackend::Csv, global = true)]
    pub store: StoreBackend,

    /// Refuse to load artifacts unless manifest.json is present and matches
    #[arg(long, env = "PULSEWATCH_REQUIRE_MANIFEST", global = true)]
    pub require_manifest: bool,

    /// Log destination
    #[arg(long, env = "PULSEWATCH_LOG_MODE", value_enum, default_value_t = LogMode::Stderr, global = true)]
    pub log_mode: LogMode,

    /// Log file used with `--log-mode file` (default: <data-dir>/pulsewatch.log)
    #[arg(long, env = "PULSEWATCH_LOG_FILE", global = true)]
    pub log_file: Option<PathBuf>,
}

impl AppConfig {
    /// Resolved log file path.
    #[must_use]
    pub fn log_file(&self) -> PathBuf {
        self.log_file
            .clone()
            .unwrap_or_else(|| self.data_dir.join("pulsewatch.log"))
    }

    /// Open the configured record store.
    ///
    /// # Errors
    /// Returns error if the data directory cannot be created or an existing
    /// table has a different layout.
    pub fn open_store(&self) -> Result<SharedRecordStore, StorageError> {
        let store: SharedRecordStore = match self.store {
            StoreBackend::Csv => Arc::new(CsvRecordStore::in_dir(&self.data_dir)?),
            StoreBackend::Sqlite => Arc::new(SqliteRecordStore::in_dir(&self.data_dir)?),
        };
        tracing::info!("Record store: {}", store.location());
        Ok(store)
    }
}
