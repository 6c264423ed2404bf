//! Artifact adapter: Pre-trained classifier and scaler loaded from disk.
//!
//! Both artifacts are JSON exports of the fitted scikit-learn objects:
//!
//! - `heart_disease_model.json`: logistic regression (`coefficients`,
//!   `intercept`, decision `threshold`)
//! - `scaler.json`: standard scaler (`mean`, `scale`)
//!
//! Each carries the `feature_names` it was fitted against; loading fails
//! unless they equal the model contract order exactly.
//!
//! # Integrity
//!
//! A `manifest.json` next to the artifacts may bind them by SHA-256 digest.
//! When present every listed file must match; when `require_manifest` is set
//! a missing manifest is itself a load failure.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::{
    ensure_feature_order, FeatureOrderError, FeatureVector, ScaledVector, FEATURE_COUNT,
};
use crate::ports::{FeatureScaler, RiskClassifier};

/// File name of the classifier artifact.
pub const MODEL_FILE_NAME: &str = "heart_disease_model.json";
/// File name of the scaler artifact.
pub const SCALER_FILE_NAME: &str = "scaler.json";
/// File name of the optional digest manifest.
pub const MANIFEST_FILE_NAME: &str = "manifest.json";

const MANIFEST_VERSION: u32 = 1;

/// Errors raised while loading model artifacts. All are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("Artifact not found: {0:?}")]
    Missing(PathBuf),

    #[error("Failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid artifact format in {path:?}: {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid artifact {path:?}: {reason}")]
    Invalid { path: PathBuf, reason: String },

    #[error(transparent)]
    FeatureOrder(#[from] FeatureOrderError),

    #[error("Digest mismatch for {file}: manifest {expected}, actual {actual}")]
    DigestMismatch {
        file: String,
        expected: String,
        actual: String,
    },

    #[error("Manifest required but not found at {0:?}")]
    ManifestRequired(PathBuf),
}

/// Lowercase hex SHA-256 of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes).iter().map(|b| format!("{b:02x}")).collect()
}

fn read_artifact(path: &Path) -> Result<Vec<u8>, ArtifactError> {
    if !path.is_file() {
        return Err(ArtifactError::Missing(path.to_path_buf()));
    }
    fs::read(path).map_err(|source| ArtifactError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_artifact<T: for<'de> Deserialize<'de>>(path: &Path, bytes: &[u8]) -> Result<T, ArtifactError> {
    serde_json::from_slice(bytes).map_err(|source| ArtifactError::Format {
        path: path.to_path_buf(),
        source,
    })
}

fn invalid(path: &Path, reason: impl Into<String>) -> ArtifactError {
    ArtifactError::Invalid {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

fn to_fixed(path: &Path, name: &str, values: &[f64]) -> Result<[f64; FEATURE_COUNT], ArtifactError> {
    if values.iter().any(|v| !v.is_finite()) {
        return Err(invalid(path, format!("{name} contains a non-finite value")));
    }
    values.try_into().map_err(|_| {
        invalid(
            path,
            format!("{name} has {} values, expected {FEATURE_COUNT}", values.len()),
        )
    })
}

/// Digest manifest binding artifact files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub version: u32,
    /// File name -> lowercase hex SHA-256
    pub files: BTreeMap<String, String>,
}

impl ArtifactManifest {
    /// Build a manifest for files inside `dir`.
    ///
    /// # Errors
    /// Returns error if a file cannot be read.
    pub fn for_files(dir: &Path, names: &[&str]) -> Result<Self, ArtifactError> {
        let mut files = BTreeMap::new();
        for name in names {
            let bytes = read_artifact(&dir.join(name))?;
            files.insert((*name).to_string(), sha256_hex(&bytes));
        }
        Ok(Self {
            version: MANIFEST_VERSION,
            files,
        })
    }

    /// Load the manifest from `dir`, if one exists.
    ///
    /// # Errors
    /// Returns error if the manifest exists but cannot be parsed.
    pub fn load(dir: &Path) -> Result<Option<Self>, ArtifactError> {
        let path = dir.join(MANIFEST_FILE_NAME);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = read_artifact(&path)?;
        let manifest: Self = parse_artifact(&path, &bytes)?;
        if manifest.version != MANIFEST_VERSION {
            return Err(invalid(
                &path,
                format!("unsupported manifest version {}", manifest.version),
            ));
        }
        Ok(Some(manifest))
    }

    /// Check `bytes` against the digest recorded for `file_name`.
    ///
    /// # Errors
    /// Returns error if the file is not listed or its digest differs.
    pub fn verify(&self, file_name: &str, bytes: &[u8]) -> Result<(), ArtifactError> {
        let actual = sha256_hex(bytes);
        match self.files.get(file_name) {
            Some(expected) if expected.eq_ignore_ascii_case(&actual) => Ok(()),
            Some(expected) => Err(ArtifactError::DigestMismatch {
                file: file_name.to_string(),
                expected: expected.clone(),
                actual,
            }),
            None => Err(ArtifactError::DigestMismatch {
                file: file_name.to_string(),
                expected: "<not listed>".to_string(),
                actual,
            }),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ExportedLogisticModel {
    #[serde(default)]
    model_type: Option<String>,
    feature_names: Vec<String>,
    coefficients: Vec<f64>,
    intercept: f64,
    #[serde(default = "default_threshold")]
    threshold: f64,
}

fn default_threshold() -> f64 {
    0.5
}

/// Fitted logistic regression classifier.
#[derive(Debug, Clone)]
pub struct LogisticRegressionModel {
    feature_names: Vec<String>,
    coefficients: [f64; FEATURE_COUNT],
    intercept: f64,
    threshold: f64,
}

impl LogisticRegressionModel {
    /// Parse and validate an exported model.
    ///
    /// # Errors
    /// Returns error if the export is malformed or fitted on another feature order.
    pub fn from_json(path: &Path, bytes: &[u8]) -> Result<Self, ArtifactError> {
        let exported: ExportedLogisticModel = parse_artifact(path, bytes)?;

        if let Some(kind) = &exported.model_type {
            if kind != "logistic_regression" {
                return Err(invalid(path, format!("unsupported model_type {kind:?}")));
            }
        }
        ensure_feature_order("classifier", &exported.feature_names)?;
        let coefficients = to_fixed(path, "coefficients", &exported.coefficients)?;
        if !exported.intercept.is_finite() {
            return Err(invalid(path, "intercept is not finite"));
        }
        if !(exported.threshold > 0.0 && exported.threshold < 1.0) {
            return Err(invalid(path, "threshold must be within (0, 1)"));
        }

        Ok(Self {
            feature_names: exported.feature_names,
            coefficients,
            intercept: exported.intercept,
            threshold: exported.threshold,
        })
    }

    /// Positive-class probability for a scaled vector.
    #[must_use]
    pub fn probability(&self, scaled: &ScaledVector) -> f64 {
        let z = self.intercept
            + self
                .coefficients
                .iter()
                .zip(scaled.as_array().iter())
                .map(|(w, x)| w * x)
                .sum::<f64>();
        1.0 / (1.0 + (-z).exp())
    }
}

impl RiskClassifier for LogisticRegressionModel {
    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn predict(&self, scaled: &ScaledVector) -> u8 {
        u8::from(self.probability(scaled) >= self.threshold)
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ExportedScaler {
    feature_names: Vec<String>,
    mean: Vec<f64>,
    scale: Vec<f64>,
}

/// Fitted z-score scaler: `(x - mean) / scale` per feature.
#[derive(Debug, Clone)]
pub struct StandardScaler {
    feature_names: Vec<String>,
    mean: [f64; FEATURE_COUNT],
    scale: [f64; FEATURE_COUNT],
}

impl StandardScaler {
    /// Parse and validate an exported scaler.
    ///
    /// # Errors
    /// Returns error if the export is malformed or fitted on another feature order.
    pub fn from_json(path: &Path, bytes: &[u8]) -> Result<Self, ArtifactError> {
        let exported: ExportedScaler = parse_artifact(path, bytes)?;

        ensure_feature_order("scaler", &exported.feature_names)?;
        let mean = to_fixed(path, "mean", &exported.mean)?;
        let scale = to_fixed(path, "scale", &exported.scale)?;
        // A fitted scale is never zero; a zero here means a damaged export.
        if scale.iter().any(|s| *s == 0.0) {
            return Err(invalid(path, "scale contains zero"));
        }

        Ok(Self {
            feature_names: exported.feature_names,
            mean,
            scale,
        })
    }
}

impl FeatureScaler for StandardScaler {
    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn transform(&self, raw: &FeatureVector) -> ScaledVector {
        let mut out = [0.0; FEATURE_COUNT];
        for (i, x) in raw.as_array().iter().enumerate() {
            out[i] = (x - self.mean[i]) / self.scale[i];
        }
        ScaledVector::from_scaled(out)
    }
}

/// Classifier and scaler loaded together from one model directory.
#[derive(Debug, Clone)]
pub struct ModelArtifacts {
    pub classifier: LogisticRegressionModel,
    pub scaler: StandardScaler,
    /// SHA-256 of the classifier file
    pub classifier_digest: String,
    /// SHA-256 of the scaler file
    pub scaler_digest: String,
}

impl ModelArtifacts {
    /// Load both artifacts from `model_dir`.
    ///
    /// # Errors
    /// Returns `ArtifactError` if either file is missing, malformed, fitted
    /// on another feature order, or fails manifest verification.
    pub fn load(model_dir: &Path, require_manifest: bool) -> Result<Self, ArtifactError> {
        let manifest = ArtifactManifest::load(model_dir)?;
        if manifest.is_none() && require_manifest {
            return Err(ArtifactError::ManifestRequired(
                model_dir.join(MANIFEST_FILE_NAME),
            ));
        }

        let model_path = model_dir.join(MODEL_FILE_NAME);
        let scaler_path = model_dir.join(SCALER_FILE_NAME);
        let model_bytes = read_artifact(&model_path)?;
        let scaler_bytes = read_artifact(&scaler_path)?;

        match &manifest {
            Some(m) => {
                m.verify(MODEL_FILE_NAME, &model_bytes)?;
                m.verify(SCALER_FILE_NAME, &scaler_bytes)?;
            }
            None => tracing::warn!(
                "No {} in {:?}; artifacts loaded without digest verification",
                MANIFEST_FILE_NAME,
                model_dir
            ),
        }

        let classifier = LogisticRegressionModel::from_json(&model_path, &model_bytes)?;
        let scaler = StandardScaler::from_json(&scaler_path, &scaler_bytes)?;

        let artifacts = Self {
            classifier,
            scaler,
            classifier_digest: sha256_hex(&model_bytes),
            scaler_digest: sha256_hex(&scaler_bytes),
        };

        tracing::info!(
            "Loaded model artifacts from {:?} (classifier sha256={}, scaler sha256={}, n_features={})",
            model_dir,
            &artifacts.classifier_digest[..16],
            &artifacts.scaler_digest[..16],
            FEATURE_COUNT
        );

        Ok(artifacts)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Artifact JSON shared by tests across the crate.

    use crate::domain::FEATURE_COLUMNS;

    pub fn model_json(coefficients: &[f64], intercept: f64) -> String {
        serde_json::json!({
            "model_type": "logistic_regression",
            "feature_names": FEATURE_COLUMNS,
            "coefficients": coefficients,
            "intercept": intercept,
            "threshold": 0.5,
        })
        .to_string()
    }

    pub fn scaler_json(mean: &[f64], scale: &[f64]) -> String {
        serde_json::json!({
            "feature_names": FEATURE_COLUMNS,
            "mean": mean,
            "scale": scale,
        })
        .to_string()
    }

    pub fn write_artifacts(dir: &std::path::Path, intercept: f64) {
        std::fs::write(dir.join(super::MODEL_FILE_NAME), model_json(&[0.0; 13], intercept))
            .expect("Should write model");
        std::fs::write(dir.join(super::SCALER_FILE_NAME), scaler_json(&[0.0; 13], &[1.0; 13]))
            .expect("Should write scaler");
    }
}
