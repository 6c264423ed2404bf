//! Prediction result types.
//!
//! Represents the classifier output and what a caller gets back for one
//! assessment.

use std::fmt;
use std::str::FromStr;

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

use super::patient::PatientObservation;

/// Risk category derived from the classifier label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskLevel {
    /// Label 0
    Low,
    /// Label 1
    High,
}

impl RiskLevel {
    /// Value stored in the `risk_level` column.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::High => "High",
        }
    }

    /// Get a human-readable description.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Low => "Low risk - stable condition",
            Self::High => "High risk of heart disease",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Low" => Ok(Self::Low),
            "High" => Ok(Self::High),
            other => Err(format!("unknown risk level {other:?}")),
        }
    }
}

/// The classifier returned something other than 0 or 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("classifier returned label {0}, expected 0 or 1")]
pub struct UnexpectedLabel(pub u8);

/// Binary prediction with its derived risk level.
///
/// The risk level is never stored separately, so it cannot disagree with the
/// label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PredictionResult {
    label: u8,
}

impl PredictionResult {
    /// Wrap a classifier label.
    ///
    /// # Errors
    /// Returns `UnexpectedLabel` unless `label` is 0 or 1.
    pub fn from_label(label: u8) -> Result<Self, UnexpectedLabel> {
        match label {
            0 | 1 => Ok(Self { label }),
            other => Err(UnexpectedLabel(other)),
        }
    }

    /// 0 = low risk, 1 = high risk.
    #[must_use]
    pub fn label(&self) -> u8 {
        self.label
    }

    #[must_use]
    pub fn risk_level(&self) -> RiskLevel {
        if self.label == 1 {
            RiskLevel::High
        } else {
            RiskLevel::Low
        }
    }
}

impl Serialize for PredictionResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("PredictionResult", 2)?;
        s.serialize_field("label", &self.label)?;
        s.serialize_field("risk_level", self.risk_level().as_str())?;
        s.end()
    }
}

/// Whether the assessment made it into the record log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RecordStatus {
    Saved,
    NotSaved { reason: String },
}

impl RecordStatus {
    #[must_use]
    pub fn is_saved(&self) -> bool {
        matches!(self, Self::Saved)
    }
}

/// Outcome of one assessment as returned to the caller.
///
/// The prediction and the record status are independent: a failed save
/// never hides a computed prediction.
#[derive(Debug, Clone, Serialize)]
pub struct Assessment {
    /// Echo of the observation that was assessed
    pub observation: PatientObservation,

    pub result: PredictionResult,

    pub record: RecordStatus,

    /// Timestamp of the assessment
    pub assessed_at: chrono::DateTime<chrono::Utc>,
}
