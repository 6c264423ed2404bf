//! Persisted record layout for the patient record log.
//!
//! One row per assessment: the 13 raw (unscaled) feature values in model
//! order, then `prediction` and `risk_level`.

use serde::Serialize;

use super::diagnosis::{PredictionResult, RiskLevel};
use super::features::{Feature, FEATURE_COLUMNS, FEATURE_COUNT};
use super::patient::{
    Categorical, ChestPainType, PatientObservation, RestingEcg, Sex, StSlope, Thalassemia,
};

/// Number of columns in the record table.
pub const RECORD_COLUMN_COUNT: usize = FEATURE_COUNT + 2;

/// Header of the record table, in storage order.
pub const RECORD_COLUMNS: [&str; RECORD_COLUMN_COUNT] = [
    FEATURE_COLUMNS[0],
    FEATURE_COLUMNS[1],
    FEATURE_COLUMNS[2],
    FEATURE_COLUMNS[3],
    FEATURE_COLUMNS[4],
    FEATURE_COLUMNS[5],
    FEATURE_COLUMNS[6],
    FEATURE_COLUMNS[7],
    FEATURE_COLUMNS[8],
    FEATURE_COLUMNS[9],
    FEATURE_COLUMNS[10],
    FEATURE_COLUMNS[11],
    FEATURE_COLUMNS[12],
    "prediction",
    "risk_level",
];

/// A stored row that cannot be turned back into a record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct MalformedRow(pub String);

/// One observation with its prediction, as appended to the record log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersistedRecord {
    pub observation: PatientObservation,
    pub result: PredictionResult,
}

impl PersistedRecord {
    #[must_use]
    pub fn new(observation: PatientObservation, result: PredictionResult) -> Self {
        Self {
            observation,
            result,
        }
    }

    #[must_use]
    pub fn prediction(&self) -> u8 {
        self.result.label()
    }

    #[must_use]
    pub fn risk_level(&self) -> RiskLevel {
        self.result.risk_level()
    }

    /// Raw value of one feature, as charted by the analytics views.
    #[must_use]
    pub fn feature_value(&self, feature: Feature) -> f64 {
        let o = &self.observation;
        match feature {
            Feature::Age => f64::from(o.age),
            Feature::Sex => f64::from(o.sex.code()),
            Feature::ChestPain => f64::from(o.chest_pain.code()),
            Feature::RestingBp => f64::from(o.resting_bp),
            Feature::Cholesterol => f64::from(o.cholesterol),
            Feature::FastingBloodSugar => f64::from(u8::from(o.fasting_blood_sugar_high)),
            Feature::RestingEcg => f64::from(o.resting_ecg.code()),
            Feature::MaxHeartRate => f64::from(o.max_heart_rate),
            Feature::ExerciseAngina => f64::from(u8::from(o.exercise_angina)),
            Feature::StDepression => o.st_depression,
            Feature::StSlope => f64::from(o.st_slope.code()),
            Feature::MajorVessels => f64::from(o.major_vessels),
            Feature::Thalassemia => f64::from(o.thalassemia.code()),
        }
    }

    /// Render the row in [`RECORD_COLUMNS`] order.
    #[must_use]
    pub fn to_row(&self) -> Vec<String> {
        let o = &self.observation;
        vec![
            o.age.to_string(),
            o.sex.code().to_string(),
            o.chest_pain.code().to_string(),
            o.resting_bp.to_string(),
            o.cholesterol.to_string(),
            u8::from(o.fasting_blood_sugar_high).to_string(),
            o.resting_ecg.code().to_string(),
            o.max_heart_rate.to_string(),
            u8::from(o.exercise_angina).to_string(),
            format_decimal(o.st_depression),
            o.st_slope.code().to_string(),
            o.major_vessels.to_string(),
            o.thalassemia.code().to_string(),
            self.prediction().to_string(),
            self.risk_level().as_str().to_string(),
        ]
    }

    /// Parse a row in [`RECORD_COLUMNS`] order.
    ///
    /// # Errors
    /// Returns `MalformedRow` on a wrong column count, an unparsable value,
    /// an unknown category code, or a risk level that disagrees with the
    /// prediction.
    pub fn from_row<S: AsRef<str>>(fields: &[S]) -> Result<Self, MalformedRow> {
        if fields.len() != RECORD_COLUMN_COUNT {
            return Err(MalformedRow(format!(
                "expected {RECORD_COLUMN_COUNT} columns, found {}",
                fields.len()
            )));
        }
        let field = |i: usize| fields[i].as_ref().trim();

        let observation = PatientObservation {
            age: parse_number(RECORD_COLUMNS[0], field(0))?,
            sex: parse_code::<Sex>(field(1))?,
            chest_pain: parse_code::<ChestPainType>(field(2))?,
            resting_bp: parse_number(RECORD_COLUMNS[3], field(3))?,
            cholesterol: parse_number(RECORD_COLUMNS[4], field(4))?,
            fasting_blood_sugar_high: parse_bit(RECORD_COLUMNS[5], field(5))?,
            resting_ecg: parse_code::<RestingEcg>(field(6))?,
            max_heart_rate: parse_number(RECORD_COLUMNS[7], field(7))?,
            exercise_angina: parse_bit(RECORD_COLUMNS[8], field(8))?,
            st_depression: parse_number(RECORD_COLUMNS[9], field(9))?,
            st_slope: parse_code::<StSlope>(field(10))?,
            major_vessels: parse_number(RECORD_COLUMNS[11], field(11))?,
            thalassemia: parse_code::<Thalassemia>(field(12))?,
        };

        let label: u8 = parse_number(RECORD_COLUMNS[13], field(13))?;
        let result = PredictionResult::from_label(label)
            .map_err(|e| MalformedRow(e.to_string()))?;

        let stored: RiskLevel = field(14).parse().map_err(MalformedRow)?;
        if stored != result.risk_level() {
            return Err(MalformedRow(format!(
                "risk_level {stored} disagrees with prediction {label}"
            )));
        }

        Ok(Self::new(observation, result))
    }
}

/// Format a float so it always carries a decimal point (`1.0`, `2.3`).
#[must_use]
pub fn format_decimal(value: f64) -> String {
    let s = value.to_string();
    if s.contains(['.', 'e', 'E']) || !value.is_finite() {
        s
    } else {
        format!("{s}.0")
    }
}

fn parse_number<T: std::str::FromStr>(column: &str, value: &str) -> Result<T, MalformedRow> {
    value
        .parse()
        .map_err(|_| MalformedRow(format!("{column}: cannot parse {value:?}")))
}

fn parse_bit(column: &str, value: &str) -> Result<bool, MalformedRow> {
    match value {
        "0" => Ok(false),
        "1" => Ok(true),
        other => Err(MalformedRow(format!("{column}: expected 0 or 1, found {other:?}"))),
    }
}

fn parse_code<C: Categorical>(value: &str) -> Result<C, MalformedRow> {
    let code: u8 = parse_number(C::FIELD, value)?;
    C::from_code(code)
        .ok_or_else(|| MalformedRow(format!("{}: unknown code {code}", C::FIELD)))
}
