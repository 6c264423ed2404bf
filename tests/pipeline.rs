//! End-to-end tests: shipped artifacts, record log backends and analytics.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use pulsewatch::adapters::artifacts::{
    ArtifactError, LogisticRegressionModel, ModelArtifacts, StandardScaler, MANIFEST_FILE_NAME,
    SCALER_FILE_NAME,
};
use pulsewatch::adapters::csv::CsvRecordStore;
use pulsewatch::adapters::sqlite::SqliteRecordStore;
use pulsewatch::application::{AnalyticsService, InferenceService};
use pulsewatch::domain::{
    encode, ChestPainType, Feature, ObservationInput, PatientObservation, PersistedRecord,
    PredictionResult, RecordStatus, RestingEcg, RiskLevel, Sex, StSlope, Thalassemia,
    RECORD_COLUMNS,
};
use pulsewatch::ports::RecordStore;
use pulsewatch::PulsewatchError;

fn shipped_models() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("models")
}

fn reference_input() -> ObservationInput {
    ObservationInput {
        age: 45,
        sex: "Male".into(),
        chest_pain: "Asymptomatic(4)".into(),
        resting_bp: 120,
        cholesterol: 200,
        fasting_blood_sugar: "False".into(),
        resting_ecg: "Normal(0)".into(),
        max_heart_rate: 150,
        exercise_angina: "No".into(),
        st_depression: 1.0,
        st_slope: "Flat(2)".into(),
        major_vessels: 0,
        thalassemia: "Normal(3)".into(),
    }
}

fn observation(age: u32) -> PatientObservation {
    PatientObservation {
        age,
        sex: Sex::Female,
        chest_pain: ChestPainType::NonAnginal,
        resting_bp: 130,
        cholesterol: 236,
        fasting_blood_sugar_high: false,
        resting_ecg: RestingEcg::LeftVentricularHypertrophy,
        max_heart_rate: 174,
        exercise_angina: false,
        st_depression: 0.0,
        st_slope: StSlope::Upsloping,
        major_vessels: 1,
        thalassemia: Thalassemia::Normal,
    }
}

fn record(age: u32, label: u8) -> PersistedRecord {
    PersistedRecord::new(
        observation(age),
        PredictionResult::from_label(label).expect("Should accept label"),
    )
}

fn csv_service(data_dir: &Path) -> InferenceService<LogisticRegressionModel, StandardScaler, CsvRecordStore> {
    let artifacts = ModelArtifacts::load(&shipped_models(), true).expect("Should load shipped artifacts");
    let store = CsvRecordStore::in_dir(data_dir).expect("Should create store");
    InferenceService::new(
        Arc::new(artifacts.classifier),
        Arc::new(artifacts.scaler),
        Arc::new(store),
    )
    .expect("Should build service")
}

#[test]
fn test_reference_scenario_persists_raw_values() {
    let dir = tempfile::tempdir().expect("Should create tmpdir");
    let service = csv_service(dir.path());

    let assessment = service
        .assess_input(&reference_input())
        .expect("Should assess");
    let vector = encode(&assessment.observation).expect("Should encode");
    assert_eq!(
        vector.as_array(),
        &[45.0, 1.0, 4.0, 120.0, 200.0, 0.0, 0.0, 150.0, 0.0, 1.0, 2.0, 0.0, 3.0]
    );
    assert_eq!(assessment.result.risk_level(), RiskLevel::Low);
    assert_eq!(assessment.record, RecordStatus::Saved);

    let text = fs::read_to_string(dir.path().join("patient_records.csv")).expect("Should read table");
    assert_eq!(
        text,
        format!(
            "{}\n45,1,4,120,200,0,0,150,0,1.0,2,0,3,0,Low\n",
            RECORD_COLUMNS.join(",")
        )
    );
}

#[test]
fn test_high_risk_patient() {
    let dir = tempfile::tempdir().expect("Should create tmpdir");
    let service = csv_service(dir.path());

    let input = ObservationInput {
        age: 67,
        sex: "male".into(),
        chest_pain: "asymptomatic".into(),
        resting_bp: 160,
        cholesterol: 286,
        fasting_blood_sugar: "no".into(),
        resting_ecg: "Left Ventricular Hypertrophy (2)".into(),
        max_heart_rate: 108,
        exercise_angina: "yes".into(),
        st_depression: 1.5,
        st_slope: "Flat".into(),
        major_vessels: 3,
        thalassemia: "Normal".into(),
    };
    let assessment = service.assess_input(&input).expect("Should assess");
    assert_eq!(assessment.result.label(), 1);
    assert_eq!(assessment.result.risk_level(), RiskLevel::High);

    let rows = CsvRecordStore::in_dir(dir.path())
        .expect("Should open store")
        .read_all()
        .expect("Should read");
    assert_eq!(rows.last().map(PersistedRecord::risk_level), Some(RiskLevel::High));
}

#[test]
fn test_invalid_input_is_rejected_without_append() {
    let dir = tempfile::tempdir().expect("Should create tmpdir");
    let service = csv_service(dir.path());

    let mut input = reference_input();
    input.st_depression = f64::NAN;
    match service.assess_input(&input) {
        Err(PulsewatchError::InvalidInput(e)) => assert_eq!(e.field(), "oldpeak"),
        other => panic!("expected invalid input, got {other:?}"),
    }
    assert!(!dir.path().join("patient_records.csv").exists());
}

#[test]
fn test_concurrent_csv_appends_lose_nothing() {
    const PRIOR: u32 = 3;
    const WRITERS: u32 = 8;
    const PER_WRITER: u32 = 4;

    let dir = tempfile::tempdir().expect("Should create tmpdir");
    let shared = Arc::new(CsvRecordStore::in_dir(dir.path()).expect("Should create store"));
    for i in 0..PRIOR {
        let age = 20 + i;
        shared.append(&record(age, (age % 2) as u8)).expect("Should append");
    }

    let handles: Vec<_> = (0..WRITERS)
        .map(|w| {
            let shared = Arc::clone(&shared);
            let data_dir = dir.path().to_path_buf();
            thread::spawn(move || {
                // Half the writers share one store value, half open their own.
                let own;
                let store: &CsvRecordStore = if w % 2 == 0 {
                    &shared
                } else {
                    own = CsvRecordStore::in_dir(&data_dir).expect("Should open store");
                    &own
                };
                for i in 0..PER_WRITER {
                    let age = 30 + w * PER_WRITER + i;
                    store.append(&record(age, (age % 2) as u8)).expect("Should append");
                }
            })
        })
        .collect();
    for h in handles {
        h.join().expect("Writer should not panic");
    }

    let rows = shared.read_all().expect("Should read");
    assert_eq!(rows.len() as u32, PRIOR + WRITERS * PER_WRITER);

    let mut ages: Vec<u32> = rows.iter().map(|r| r.observation.age).collect();
    ages.sort_unstable();
    let expected: Vec<u32> = (20..20 + PRIOR).chain(30..30 + WRITERS * PER_WRITER).collect();
    assert_eq!(ages, expected);
    for r in &rows {
        assert_eq!(u32::from(r.prediction()), r.observation.age % 2);
    }
}

#[test]
fn test_concurrent_sqlite_appends_lose_nothing() {
    const WRITERS: u32 = 6;
    const PER_WRITER: u32 = 5;

    let dir = tempfile::tempdir().expect("Should create tmpdir");
    SqliteRecordStore::in_dir(dir.path()).expect("Should create db");

    let handles: Vec<_> = (0..WRITERS)
        .map(|w| {
            let data_dir = dir.path().to_path_buf();
            thread::spawn(move || {
                let store = SqliteRecordStore::in_dir(&data_dir).expect("Should open db");
                for i in 0..PER_WRITER {
                    store.append(&record(30 + w * PER_WRITER + i, 1)).expect("Should append");
                }
            })
        })
        .collect();
    for h in handles {
        h.join().expect("Writer should not panic");
    }

    let store = SqliteRecordStore::in_dir(dir.path()).expect("Should open db");
    let mut ages: Vec<u32> = store
        .read_all()
        .expect("Should read")
        .iter()
        .map(|r| r.observation.age)
        .collect();
    ages.sort_unstable();
    assert_eq!(ages, (30..30 + WRITERS * PER_WRITER).collect::<Vec<_>>());
}

#[test]
fn test_schema_drift_reports_not_saved() {
    let dir = tempfile::tempdir().expect("Should create tmpdir");
    let table = dir.path().join("patient_records.csv");
    // Same columns, two of them swapped.
    let drifted = "age,sex,cp,trestbps,chol,fbs,restecg,thalach,exang,oldpeak,slope,thal,ca,prediction,risk_level\n";
    fs::write(&table, drifted).expect("Should write table");

    let service = csv_service(dir.path());
    let assessment = service
        .assess_input(&reference_input())
        .expect("Prediction should still be returned");

    match &assessment.record {
        RecordStatus::NotSaved { reason } => assert!(reason.contains("Schema mismatch")),
        RecordStatus::Saved => panic!("drifted table must not accept rows"),
    }
    assert_eq!(fs::read_to_string(&table).expect("Should read table"), drifted);
}

#[test]
fn test_unwritable_store_keeps_prediction() {
    let dir = tempfile::tempdir().expect("Should create tmpdir");
    fs::create_dir(dir.path().join("patient_records.csv")).expect("Should block table path");

    let service = csv_service(dir.path());
    let assessment = service
        .assess_input(&reference_input())
        .expect("Prediction should still be returned");

    assert_eq!(assessment.result.risk_level(), RiskLevel::Low);
    assert!(matches!(assessment.record, RecordStatus::NotSaved { .. }));
}

#[test]
fn test_empty_stores_read_empty() {
    let dir = tempfile::tempdir().expect("Should create tmpdir");

    let csv = CsvRecordStore::in_dir(dir.path().join("csv")).expect("Should create store");
    assert!(csv.read_all().expect("Should read").is_empty());

    let sqlite = SqliteRecordStore::in_dir(dir.path().join("sqlite")).expect("Should create db");
    assert!(sqlite.read_all().expect("Should read").is_empty());

    let analytics = AnalyticsService::new(Arc::new(csv));
    let counts = analytics.risk_level_counts().expect("Should count");
    assert_eq!((counts.high, counts.low), (0, 0));
}

#[test]
fn test_risk_level_counts_match_store() {
    let dir = tempfile::tempdir().expect("Should create tmpdir");
    let store = Arc::new(CsvRecordStore::in_dir(dir.path()).expect("Should create store"));
    let (k, m) = (4, 7);
    for i in 0..k {
        store.append(&record(50 + i, 1)).expect("Should append");
    }
    for i in 0..m {
        store.append(&record(30 + i, 0)).expect("Should append");
    }

    let analytics = AnalyticsService::new(store);
    let counts = analytics.risk_level_counts().expect("Should count");
    assert_eq!(counts.get(RiskLevel::High), k as usize);
    assert_eq!(counts.get(RiskLevel::Low), m as usize);

    let series = analytics
        .paired_series(Feature::Age, Feature::Cholesterol)
        .expect("Should build series");
    assert_eq!(series.len(), (k + m) as usize);
    assert_eq!((series[0].x, series[0].y, series[0].label), (50.0, 236.0, 1));
}

#[test]
fn test_missing_artifact_is_fatal() {
    let dir = tempfile::tempdir().expect("Should create tmpdir");
    fs::copy(shipped_models().join("heart_disease_model.json"), dir.path().join("heart_disease_model.json"))
        .expect("Should copy model");

    match ModelArtifacts::load(dir.path(), false) {
        Err(ArtifactError::Missing(path)) => assert!(path.ends_with(SCALER_FILE_NAME)),
        other => panic!("expected missing scaler, got {other:?}"),
    }
    assert!(matches!(
        ModelArtifacts::load(dir.path(), true),
        Err(ArtifactError::ManifestRequired(_))
    ));
}

#[test]
fn test_tampered_artifact_fails_manifest() {
    let dir = tempfile::tempdir().expect("Should create tmpdir");
    for name in ["heart_disease_model.json", SCALER_FILE_NAME, MANIFEST_FILE_NAME] {
        fs::copy(shipped_models().join(name), dir.path().join(name)).expect("Should copy artifact");
    }
    let scaler = fs::read_to_string(dir.path().join(SCALER_FILE_NAME)).expect("Should read scaler");
    fs::write(dir.path().join(SCALER_FILE_NAME), scaler.replace("54.439", "44.439"))
        .expect("Should write scaler");

    assert!(matches!(
        ModelArtifacts::load(dir.path(), false),
        Err(ArtifactError::DigestMismatch { .. })
    ));
}

#[test]
fn test_storage_error_is_reported_on_read() {
    let dir = tempfile::tempdir().expect("Should create tmpdir");
    let store = CsvRecordStore::in_dir(dir.path()).expect("Should create store");
    fs::write(store.path(), "age,sex\n45,1\n").expect("Should write foreign table");

    let analytics = AnalyticsService::new(Arc::new(store));
    match analytics.summary() {
        Err(PulsewatchError::Storage(e)) => assert!(e.is_schema_mismatch()),
        other => panic!("expected schema mismatch, got {other:?}"),
    }
}

#[test]
fn test_parallel_predict_processes_lose_nothing() {
    const PROCESSES: u32 = 12;

    let dir = tempfile::tempdir().expect("Should create tmpdir");
    let children: Vec<_> = (0..PROCESSES)
        .map(|i| {
            std::process::Command::new(env!("CARGO_BIN_EXE_pulsewatch"))
                .arg("--model-dir")
                .arg(shipped_models())
                .arg("--data-dir")
                .arg(dir.path())
                .arg("predict")
                .args(["--age", &(40 + i).to_string()])
                .args(["--sex", "Male", "--cp", "Asymptomatic", "--trestbps", "120"])
                .args(["--chol", "200", "--fbs", "false", "--restecg", "Normal"])
                .args(["--thalach", "150", "--exang", "no", "--oldpeak", "1.0"])
                .args(["--slope", "Flat", "--ca", "0", "--thal", "Normal"])
                .env("RUST_LOG", "warn")
                .stdout(std::process::Stdio::piped())
                .stderr(std::process::Stdio::piped())
                .spawn()
                .expect("Should spawn pulsewatch")
        })
        .collect();

    for child in children {
        let output = child.wait_with_output().expect("Should wait for pulsewatch");
        assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
        assert!(String::from_utf8_lossy(&output.stdout).contains("Record saved."));
    }

    let store = CsvRecordStore::in_dir(dir.path()).expect("Should open store");
    let mut ages: Vec<u32> = store
        .read_all()
        .expect("Should read")
        .iter()
        .map(|r| r.observation.age)
        .collect();
    ages.sort_unstable();
    assert_eq!(ages, (40..40 + PROCESSES).collect::<Vec<_>>());
}

#[test]
fn test_reads_during_appends_see_whole_tables() {
    use std::sync::atomic::{AtomicBool, Ordering};

    const WRITERS: u32 = 4;
    const PER_WRITER: u32 = 10;

    let dir = tempfile::tempdir().expect("Should create tmpdir");
    let store = Arc::new(CsvRecordStore::in_dir(dir.path()).expect("Should create store"));
    let done = Arc::new(AtomicBool::new(false));

    let reader = {
        let store = Arc::clone(&store);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let analytics = AnalyticsService::new(Arc::clone(&store));
            let mut last_rows = 0;
            let mut last_total = 0;
            let mut reads = 0;
            loop {
                let finished = done.load(Ordering::Acquire);
                let rows = store.read_all().expect("Read during append should succeed");
                assert!(rows.len() >= last_rows);
                last_rows = rows.len();

                let total = analytics
                    .risk_level_counts()
                    .expect("Counts during append should succeed")
                    .total();
                assert!(total >= last_total);
                last_total = total;
                reads += 1;
                if finished {
                    break;
                }
            }
            reads
        })
    };

    let writers: Vec<_> = (0..WRITERS)
        .map(|w| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..PER_WRITER {
                    store
                        .append(&record(30 + w * PER_WRITER + i, (i % 2) as u8))
                        .expect("Should append");
                }
            })
        })
        .collect();
    for h in writers {
        h.join().expect("Writer should not panic");
    }
    done.store(true, Ordering::Release);

    let reads = reader.join().expect("Reader should not panic");
    assert!(reads > 0);
    assert_eq!(
        store.read_all().expect("Should read").len() as u32,
        WRITERS * PER_WRITER
    );
}
