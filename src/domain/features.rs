//! Fixed feature order shared by the encoder, scaler and classifier.
//!
//! The scaler and classifier were fitted against the column order below.
//! Reordering any position silently corrupts every prediction, so every stage
//! addresses the vector through [`Feature`] and checks artifact feature names
//! against [`FEATURE_COLUMNS`] before use.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::patient::{Categorical, InvalidInput, PatientObservation};

/// Number of model input features.
pub const FEATURE_COUNT: usize = 13;

/// Column names in model input order.
pub const FEATURE_COLUMNS: [&str; FEATURE_COUNT] = [
    "age", "sex", "cp", "trestbps", "chol", "fbs", "restecg", "thalach", "exang", "oldpeak",
    "slope", "ca", "thal",
];

/// One position of the model input vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "&'static str", try_from = "String")]
pub enum Feature {
    Age = 0,
    Sex = 1,
    ChestPain = 2,
    RestingBp = 3,
    Cholesterol = 4,
    FastingBloodSugar = 5,
    RestingEcg = 6,
    MaxHeartRate = 7,
    ExerciseAngina = 8,
    StDepression = 9,
    StSlope = 10,
    MajorVessels = 11,
    Thalassemia = 12,
}

impl Feature {
    /// All features in model input order.
    pub const ORDER: [Feature; FEATURE_COUNT] = [
        Self::Age,
        Self::Sex,
        Self::ChestPain,
        Self::RestingBp,
        Self::Cholesterol,
        Self::FastingBloodSugar,
        Self::RestingEcg,
        Self::MaxHeartRate,
        Self::ExerciseAngina,
        Self::StDepression,
        Self::StSlope,
        Self::MajorVessels,
        Self::Thalassemia,
    ];

    /// Position in the model input vector.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Column name in the model contract and the record table.
    #[must_use]
    pub const fn column(self) -> &'static str {
        FEATURE_COLUMNS[self.index()]
    }

    /// Look up a feature by column name.
    #[must_use]
    pub fn from_column(name: &str) -> Option<Self> {
        Self::ORDER.iter().copied().find(|f| f.column() == name)
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

impl FromStr for Feature {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_column(s.trim()).ok_or_else(|| {
            format!(
                "unknown feature {s:?} (expected one of: {})",
                FEATURE_COLUMNS.join(", ")
            )
        })
    }
}

impl From<Feature> for &'static str {
    fn from(f: Feature) -> Self {
        f.column()
    }
}

impl TryFrom<String> for Feature {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// A feature stage's fitted order disagrees with the model contract.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{stage} feature order mismatch: expected [{expected}], found [{found}]")]
pub struct FeatureOrderError {
    pub stage: String,
    pub expected: String,
    pub found: String,
}

/// Check that a stage was fitted against exactly [`FEATURE_COLUMNS`].
///
/// # Errors
/// Returns `FeatureOrderError` on any length or position difference.
pub fn ensure_feature_order<S: AsRef<str>>(
    stage: &str,
    names: &[S],
) -> Result<(), FeatureOrderError> {
    let matches = names.len() == FEATURE_COUNT
        && names
            .iter()
            .zip(FEATURE_COLUMNS.iter())
            .all(|(n, c)| n.as_ref() == *c);
    if matches {
        return Ok(());
    }
    Err(FeatureOrderError {
        stage: stage.to_string(),
        expected: FEATURE_COLUMNS.join(","),
        found: names
            .iter()
            .map(|n| n.as_ref())
            .collect::<Vec<&str>>()
            .join(","),
    })
}

/// Raw (unscaled) model input, in [`Feature::ORDER`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeatureVector([f64; FEATURE_COUNT]);

impl FeatureVector {
    #[must_use]
    pub fn get(&self, feature: Feature) -> f64 {
        self.0[feature.index()]
    }

    #[must_use]
    pub fn as_array(&self) -> &[f64; FEATURE_COUNT] {
        &self.0
    }
}

/// Model input after training-time normalization.
///
/// Only a scaler can produce one, so raw vectors cannot reach the classifier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaledVector([f64; FEATURE_COUNT]);

impl ScaledVector {
    /// Wrap values produced by a fitted scaler.
    #[must_use]
    pub fn from_scaled(values: [f64; FEATURE_COUNT]) -> Self {
        Self(values)
    }

    #[must_use]
    pub fn get(&self, feature: Feature) -> f64 {
        self.0[feature.index()]
    }

    #[must_use]
    pub fn as_array(&self) -> &[f64; FEATURE_COUNT] {
        &self.0
    }
}

fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

/// Encode an observation into the model's input vector.
///
/// Pure and deterministic. The observation is validated first, so callers
/// that build a [`PatientObservation`] by hand still get domain checks.
///
/// # Errors
/// Returns `InvalidInput` naming the first out-of-domain field.
pub fn encode(observation: &PatientObservation) -> Result<FeatureVector, InvalidInput> {
    observation.validate()?;

    let mut v = [0.0; FEATURE_COUNT];
    v[Feature::Age.index()] = f64::from(observation.age);
    v[Feature::Sex.index()] = f64::from(observation.sex.code());
    v[Feature::ChestPain.index()] = f64::from(observation.chest_pain.code());
    v[Feature::RestingBp.index()] = f64::from(observation.resting_bp);
    v[Feature::Cholesterol.index()] = f64::from(observation.cholesterol);
    v[Feature::FastingBloodSugar.index()] = flag(observation.fasting_blood_sugar_high);
    v[Feature::RestingEcg.index()] = f64::from(observation.resting_ecg.code());
    v[Feature::MaxHeartRate.index()] = f64::from(observation.max_heart_rate);
    v[Feature::ExerciseAngina.index()] = flag(observation.exercise_angina);
    v[Feature::StDepression.index()] = observation.st_depression;
    v[Feature::StSlope.index()] = f64::from(observation.st_slope.code());
    v[Feature::MajorVessels.index()] = f64::from(observation.major_vessels);
    v[Feature::Thalassemia.index()] = f64::from(observation.thalassemia.code());

    Ok(FeatureVector(v))
}
