//! CSV adapter: Implementation of RecordStore backed by a single CSV table.
//!
//! The table lives at `<data_dir>/patient_records.csv` with the header from
//! [`RECORD_COLUMNS`]. It is readable by any spreadsheet or dataframe tool.
//!
//! # Write protocol
//!
//! An append reads the current table, checks its header, and writes the
//! whole table plus the new row into a temporary file in the same directory.
//! The temporary file is fsynced and renamed over the table. Readers never
//! lock: a rename is atomic, so they see either the previous table or the
//! new one.
//!
//! # Mutex Behavior
//!
//! Appends to the same path are serialized at two levels. Within a process, a
//! lock registry keyed by path covers separate `CsvRecordStore` values
//! pointing at one file. Across processes, the whole read-modify-rename runs
//! under an exclusive OS lock on the sidecar `patient_records.csv.lock`. Both
//! locks are released on every exit path.
//!
//! The rewritten table keeps the permissions of the table it replaces; a new
//! table is created world-readable (0644 on Unix).

use std::collections::HashMap;
use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use fd_lock::RwLock;
use tempfile::NamedTempFile;

use crate::domain::{PersistedRecord, RECORD_COLUMNS};
use crate::ports::RecordStore;

use super::StorageError;

/// File name of the record table inside the data directory.
pub const RECORDS_FILE_NAME: &str = "patient_records.csv";

type PathLock = Arc<Mutex<()>>;

static APPEND_LOCKS: OnceLock<Mutex<HashMap<PathBuf, PathLock>>> = OnceLock::new();

/// Lock shared by every store writing to `path` within this process.
fn append_lock_for(path: &Path) -> Result<PathLock, StorageError> {
    let registry = APPEND_LOCKS.get_or_init(|| Mutex::new(HashMap::new()));
    let mut locks = registry.lock().map_err(|_| StorageError::LockPoisoned)?;
    Ok(locks
        .entry(path.to_path_buf())
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone())
}

/// Resolve `path` to an absolute location so different spellings share a lock.
fn canonical_target(path: &Path) -> Result<PathBuf, StorageError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let file_name = path.file_name().ok_or_else(|| {
        StorageError::io(
            path,
            io::Error::new(io::ErrorKind::InvalidInput, "record path has no file name"),
        )
    })?;
    fs::create_dir_all(&parent).map_err(|e| StorageError::io(&parent, e))?;
    let parent = fs::canonicalize(&parent).map_err(|e| StorageError::io(&parent, e))?;
    Ok(parent.join(file_name))
}

/// Sidecar lock file for `path`: the table path with `.lock` appended.
fn sidecar_lock_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".lock");
    PathBuf::from(name)
}

/// The existing table as raw rows, header checked.
struct Snapshot {
    rows: Vec<StringRecord>,
}

/// CSV storage adapter.
#[derive(Debug, Clone)]
pub struct CsvRecordStore {
    path: PathBuf,
}

impl CsvRecordStore {
    /// Create a store for the table inside `data_dir`.
    ///
    /// The directory is created if absent; the table itself is created on the
    /// first append.
    ///
    /// # Errors
    /// Returns error if the directory cannot be created.
    pub fn in_dir<P: AsRef<Path>>(data_dir: P) -> Result<Self, StorageError> {
        Self::new(data_dir.as_ref().join(RECORDS_FILE_NAME))
    }

    /// Create a store for an explicit table path.
    ///
    /// # Errors
    /// Returns error if the parent directory cannot be created.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = canonical_target(path.as_ref())?;
        tracing::debug!("CSV record store at {:?}", path);
        Ok(Self { path })
    }

    /// Path of the backing table.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the table as raw rows.
    ///
    /// Returns `None` if no table exists yet (or it is empty). Otherwise the
    /// header must equal [`RECORD_COLUMNS`] exactly.
    fn read_snapshot(&self) -> Result<Option<Snapshot>, StorageError> {
        let bytes = match fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::io(&self.path, e)),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(bytes.as_slice());

        let header = reader.headers()?.clone();
        self.check_header(&header)?;

        let rows = reader.records().collect::<Result<Vec<_>, _>>()?;
        Ok(Some(Snapshot { rows }))
    }

    fn check_header(&self, header: &StringRecord) -> Result<(), StorageError> {
        if header.iter().map(str::trim).eq(RECORD_COLUMNS.iter().copied()) {
            return Ok(());
        }
        Err(StorageError::SchemaMismatch {
            location: self.location(),
            expected: RECORD_COLUMNS.join(","),
            found: header.iter().collect::<Vec<_>>().join(","),
        })
    }

    /// Permissions for the rewritten table: the current table's, or 0644 for a new one.
    fn table_permissions(&self) -> Result<Option<fs::Permissions>, StorageError> {
        match fs::metadata(&self.path) {
            Ok(meta) => Ok(Some(meta.permissions())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(default_permissions()),
            Err(e) => Err(StorageError::io(&self.path, e)),
        }
    }

    /// Write `rows` plus `extra` to a temp file and rename it over the table.
    fn replace_table(&self, rows: &[StringRecord], extra: &[String]) -> Result<(), StorageError> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let tmp = NamedTempFile::new_in(dir).map_err(|e| StorageError::io(dir, e))?;

        {
            let mut writer = WriterBuilder::new()
                .has_headers(false)
                .flexible(true)
                .from_writer(tmp.as_file());
            writer.write_record(RECORD_COLUMNS)?;
            for row in rows {
                writer.write_record(row)?;
            }
            writer.write_record(extra)?;
            writer.flush().map_err(|e| StorageError::io(tmp.path(), e))?;
        }

        // Temp files are created owner-only.
        if let Some(permissions) = self.table_permissions()? {
            tmp.as_file()
                .set_permissions(permissions)
                .map_err(|e| StorageError::io(tmp.path(), e))?;
        }
        tmp.as_file()
            .sync_all()
            .map_err(|e| StorageError::io(tmp.path(), e))?;
        tmp.persist(&self.path)
            .map_err(|e| StorageError::io(&self.path, e.error))?;
        Ok(())
    }
}

#[cfg(unix)]
fn default_permissions() -> Option<fs::Permissions> {
    use std::os::unix::fs::PermissionsExt;
    Some(fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn default_permissions() -> Option<fs::Permissions> {
    None
}

impl RecordStore for CsvRecordStore {
    type Error = StorageError;

    fn append(&self, record: &PersistedRecord) -> Result<(), Self::Error> {
        let lock = append_lock_for(&self.path)?;
        let _guard = lock.lock().map_err(|_| StorageError::LockPoisoned)?;

        let lock_path = sidecar_lock_path(&self.path);
        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&lock_path)
            .map_err(|e| StorageError::io(&lock_path, e))?;
        let mut file_lock = RwLock::new(lock_file);
        let _file_guard = file_lock
            .write()
            .map_err(|e| StorageError::io(&lock_path, e))?;

        let existing = self
            .read_snapshot()?
            .map(|snapshot| snapshot.rows)
            .unwrap_or_default();
        self.replace_table(&existing, &record.to_row())?;

        tracing::debug!(
            "Appended record to {:?} ({} rows)",
            self.path,
            existing.len() + 1
        );
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<PersistedRecord>, Self::Error> {
        let Some(snapshot) = self.read_snapshot()? else {
            return Ok(Vec::new());
        };

        snapshot
            .rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let fields: Vec<&str> = row.iter().collect();
                PersistedRecord::from_row(&fields).map_err(|e| StorageError::Corrupt {
                    // Header is line 1.
                    row: i + 2,
                    reason: e.0,
                })
            })
            .collect()
    }

    fn count(&self) -> Result<usize, Self::Error> {
        Ok(self
            .read_snapshot()?
            .map(|snapshot| snapshot.rows.len())
            .unwrap_or(0))
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{sample_observation, PredictionResult};

    fn record(age: u32, label: u8) -> PersistedRecord {
        let mut observation = sample_observation();
        observation.age = age;
        PersistedRecord::new(
            observation,
            PredictionResult::from_label(label).expect("Should accept"),
        )
    }

    #[test]
    fn test_empty_store_reads_empty() {
        let dir = tempfile::tempdir().expect("Should create tmpdir");
        let store = CsvRecordStore::in_dir(dir.path().join("data")).expect("Should create store");

        assert!(store.read_all().expect("Should read").is_empty());
        assert_eq!(store.count().expect("Should count"), 0);
        assert!(dir.path().join("data").is_dir());
    }

    #[test]
    fn test_append_then_read() {
        let dir = tempfile::tempdir().expect("Should create tmpdir");
        let store = CsvRecordStore::in_dir(dir.path()).expect("Should create store");

        store.append(&record(45, 0)).expect("Should append");
        store.append(&record(61, 1)).expect("Should append");

        let rows = store.read_all().expect("Should read");
        assert_eq!(rows, vec![record(45, 0), record(61, 1)]);

        let text = fs::read_to_string(store.path()).expect("Should read file");
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some(RECORD_COLUMNS.join(",").as_str()));
        assert_eq!(lines.next(), Some("45,1,4,120,200,0,0,150,0,1.0,2,0,3,0,Low"));
        assert_eq!(lines.next(), Some("61,1,4,120,200,0,0,150,0,1.0,2,0,3,1,High"));
    }

    #[test]
    fn test_foreign_header_is_schema_mismatch() {
        let dir = tempfile::tempdir().expect("Should create tmpdir");
        let store = CsvRecordStore::in_dir(dir.path()).expect("Should create store");
        let original = "age,sex,cp,chol,trestbps,fbs,restecg,thalach,exang,oldpeak,slope,ca,thal,prediction,risk_level\n";
        fs::write(store.path(), original).expect("Should write");

        let err = store.append(&record(45, 0)).expect_err("Should reject");
        assert!(err.is_schema_mismatch());
        assert_eq!(
            fs::read_to_string(store.path()).expect("Should read file"),
            original
        );
    }

    #[test]
    fn test_corrupt_row_reports_line() {
        let dir = tempfile::tempdir().expect("Should create tmpdir");
        let store = CsvRecordStore::in_dir(dir.path()).expect("Should create store");
        store.append(&record(45, 0)).expect("Should append");

        let mut text = fs::read_to_string(store.path()).expect("Should read file");
        text.push_str("50,1,9,120,200,0,0,150,0,1.0,2,0,3,0,Low\n");
        fs::write(store.path(), text).expect("Should write");

        match store.read_all() {
            Err(StorageError::Corrupt { row, .. }) => assert_eq!(row, 3),
            other => panic!("expected corrupt row, got {other:?}"),
        }
    }

    #[test]
    fn test_append_takes_sidecar_lock() {
        let dir = tempfile::tempdir().expect("Should create tmpdir");
        let store = CsvRecordStore::in_dir(dir.path()).expect("Should create store");
        store.append(&record(45, 0)).expect("Should append");

        assert_eq!(
            sidecar_lock_path(store.path()),
            dir.path()
                .canonicalize()
                .expect("Should canonicalize")
                .join("patient_records.csv.lock")
        );
        assert!(sidecar_lock_path(store.path()).is_file());
    }

    #[cfg(unix)]
    #[test]
    fn test_table_stays_readable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("Should create tmpdir");
        let store = CsvRecordStore::in_dir(dir.path()).expect("Should create store");
        let mode = |p: &Path| fs::metadata(p).expect("Should stat").permissions().mode() & 0o777;

        store.append(&record(45, 0)).expect("Should append");
        assert_eq!(mode(store.path()), 0o644);

        fs::set_permissions(store.path(), fs::Permissions::from_mode(0o640)).expect("Should chmod");
        store.append(&record(61, 1)).expect("Should append");
        assert_eq!(mode(store.path()), 0o640);
    }
}
