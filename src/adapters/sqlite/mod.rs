//! SQLite adapter: Implementation of RecordStore.
//!
//! Alternative to the CSV table for deployments with many concurrent
//! sessions. Each append is a single `INSERT`, so there is no
//! read-modify-write cycle to race on.
//!
//! The `patient_records` table carries the same 15 columns as the CSV header,
//! in the same order, after an autoincrement `id` that fixes insertion order.
//!
//! # Mutex Behavior
//!
//! The connection is protected by a `Mutex`. A poisoned mutex surfaces as
//! `StorageError::LockPoisoned` instead of panicking.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{params_from_iter, Connection};

use crate::domain::{Categorical, PersistedRecord, RECORD_COLUMNS};
use crate::ports::RecordStore;

use super::StorageError;

/// File name of the database inside the data directory.
pub const DATABASE_FILE_NAME: &str = "patient_records.db";

const TABLE: &str = "patient_records";

/// How long a writer waits for another connection's write lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQL type of each record column, in [`RECORD_COLUMNS`] order.
const COLUMN_TYPES: [&str; 15] = [
    "INTEGER", "INTEGER", "INTEGER", "INTEGER", "INTEGER", "INTEGER", "INTEGER", "INTEGER",
    "INTEGER", "REAL", "INTEGER", "INTEGER", "INTEGER", "INTEGER", "TEXT",
];

/// SQLite storage adapter.
pub struct SqliteRecordStore {
    conn: Mutex<Connection>,
    location: String,
}

impl SqliteRecordStore {
    /// Open (or create) the database inside `data_dir`.
    ///
    /// # Errors
    /// Returns error if the directory or database cannot be created, or the
    /// existing table has a different layout.
    pub fn in_dir<P: AsRef<Path>>(data_dir: P) -> Result<Self, StorageError> {
        let dir = data_dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|e| StorageError::io(dir, e))?;
        Self::new(dir.join(DATABASE_FILE_NAME))
    }

    /// Open (or create) the database at `path`.
    ///
    /// # Errors
    /// Returns error if database cannot be opened or initialized.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let conn = Connection::open(path.as_ref())?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let storage = Self {
            conn: Mutex::new(conn),
            location: path.as_ref().display().to_string(),
        };
        storage.init_schema()?;
        Ok(storage)
    }

    /// Create an in-memory SQLite database (for testing).
    ///
    /// # Errors
    /// Returns error if database cannot be created.
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        let storage = Self {
            conn: Mutex::new(conn),
            location: ":memory:".to_string(),
        };
        storage.init_schema()?;
        Ok(storage)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    /// Create the table if absent, then verify its layout.
    fn init_schema(&self) -> Result<(), StorageError> {
        let conn = self.lock()?;

        let columns = RECORD_COLUMNS
            .iter()
            .zip(COLUMN_TYPES.iter())
            .map(|(name, ty)| format!("{name} {ty} NOT NULL"))
            .collect::<Vec<_>>()
            .join(",\n                ");

        conn.execute_batch(&format!(
            r"
            CREATE TABLE IF NOT EXISTS {TABLE} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                {columns}
            );
            "
        ))?;

        self.verify_schema(&conn)
    }

    /// Compare the live table layout against [`RECORD_COLUMNS`].
    fn verify_schema(&self, conn: &Connection) -> Result<(), StorageError> {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({TABLE})"))?;
        let found = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<Result<Vec<_>, _>>()?;

        let expected_ok = found.first().map(String::as_str) == Some("id")
            && found[1..].iter().map(String::as_str).eq(RECORD_COLUMNS.iter().copied());
        if expected_ok {
            return Ok(());
        }

        Err(StorageError::SchemaMismatch {
            location: self.location.clone(),
            expected: format!("id,{}", RECORD_COLUMNS.join(",")),
            found: found.join(","),
        })
    }
}

impl RecordStore for SqliteRecordStore {
    type Error = StorageError;

    fn append(&self, record: &PersistedRecord) -> Result<(), Self::Error> {
        let conn = self.lock()?;
        self.verify_schema(&conn)?;

        let placeholders = (1..=RECORD_COLUMNS.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {TABLE} ({}) VALUES ({placeholders})",
            RECORD_COLUMNS.join(", ")
        );

        let o = &record.observation;
        let values: [rusqlite::types::Value; 15] = [
            i64::from(o.age).into(),
            i64::from(o.sex.code()).into(),
            i64::from(o.chest_pain.code()).into(),
            i64::from(o.resting_bp).into(),
            i64::from(o.cholesterol).into(),
            i64::from(o.fasting_blood_sugar_high).into(),
            i64::from(o.resting_ecg.code()).into(),
            i64::from(o.max_heart_rate).into(),
            i64::from(o.exercise_angina).into(),
            o.st_depression.into(),
            i64::from(o.st_slope.code()).into(),
            i64::from(o.major_vessels).into(),
            i64::from(o.thalassemia.code()).into(),
            i64::from(record.prediction()).into(),
            record.risk_level().as_str().to_string().into(),
        ];
        conn.execute(&sql, params_from_iter(values.iter()))?;

        tracing::debug!("Appended record to {}", self.location);
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<PersistedRecord>, Self::Error> {
        let conn = self.lock()?;

        // Render every column as text so rows go through the same parser as the CSV table.
        let select = RECORD_COLUMNS
            .iter()
            .map(|c| {
                if *c == "oldpeak" {
                    format!("printf('%.17g', {c})")
                } else {
                    format!("CAST({c} AS TEXT)")
                }
            })
            .collect::<Vec<_>>()
            .join(", ");
        let mut stmt = conn.prepare(&format!("SELECT id, {select} FROM {TABLE} ORDER BY id ASC"))?;

        let rows = stmt
            .query_map([], |row| {
                let id: i64 = row.get(0)?;
                let fields = (1..=RECORD_COLUMNS.len())
                    .map(|i| row.get::<_, String>(i))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok((id, fields))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, fields)| {
                PersistedRecord::from_row(&fields).map_err(|e| StorageError::Corrupt {
                    row: usize::try_from(id).unwrap_or_default(),
                    reason: e.0,
                })
            })
            .collect()
    }

    fn count(&self) -> Result<usize, Self::Error> {
        let conn = self.lock()?;

        let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {TABLE}"), [], |row| {
            row.get(0)
        })?;

        Ok(usize::try_from(count).unwrap_or_default())
    }

    fn location(&self) -> String {
        self.location.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{sample_observation, PredictionResult};

    fn record(age: u32, label: u8, oldpeak: f64) -> PersistedRecord {
        let mut observation = sample_observation();
        observation.age = age;
        observation.st_depression = oldpeak;
        PersistedRecord::new(
            observation,
            PredictionResult::from_label(label).expect("Should accept"),
        )
    }

    #[test]
    fn test_record_roundtrip() {
        let storage = SqliteRecordStore::in_memory().expect("Should create db");

        assert_eq!(storage.count().expect("Should count"), 0);
        assert!(storage.read_all().expect("Should load").is_empty());

        storage.append(&record(45, 0, 1.0)).expect("Should save");
        storage.append(&record(70, 1, 2.3)).expect("Should save");

        assert_eq!(storage.count().expect("Should count"), 2);
        let loaded = storage.read_all().expect("Should load");
        assert_eq!(loaded, vec![record(45, 0, 1.0), record(70, 1, 2.3)]);
    }

    #[test]
    fn test_reopen_keeps_rows() {
        let dir = tempfile::tempdir().expect("Should create tmpdir");
        {
            let storage = SqliteRecordStore::in_dir(dir.path()).expect("Should create db");
            storage.append(&record(50, 1, 0.5)).expect("Should save");
        }
        let storage = SqliteRecordStore::in_dir(dir.path()).expect("Should reopen db");
        assert_eq!(storage.read_all().expect("Should load"), vec![record(50, 1, 0.5)]);
    }

    #[test]
    fn test_foreign_table_is_schema_mismatch() {
        let dir = tempfile::tempdir().expect("Should create tmpdir");
        let path = dir.path().join(DATABASE_FILE_NAME);
        {
            let conn = Connection::open(&path).expect("Should open");
            conn.execute_batch(
                "CREATE TABLE patient_records (id INTEGER PRIMARY KEY, age INTEGER, sex INTEGER);",
            )
            .expect("Should create");
        }

        match SqliteRecordStore::new(&path) {
            Err(e) => assert!(e.is_schema_mismatch()),
            Ok(_) => panic!("expected schema mismatch"),
        }
    }
}
