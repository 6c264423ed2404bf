//! Patient observation types for cardiac risk prediction.
//!
//! Clinical fields follow the Cleveland heart disease dataset the classifier
//! was trained on. Categorical fields are closed enums whose variants carry the
//! integer code the model expects.

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

/// Accepted age range in years.
pub const AGE_RANGE: RangeInclusive<u32> = 18..=100;
/// Accepted resting blood pressure range in mm Hg.
pub const RESTING_BP_RANGE: RangeInclusive<u32> = 80..=200;
/// Accepted serum cholesterol range in mg/dL.
pub const CHOLESTEROL_RANGE: RangeInclusive<u32> = 100..=600;
/// Accepted maximum heart rate range in bpm.
pub const MAX_HEART_RATE_RANGE: RangeInclusive<u32> = 60..=220;
/// Accepted ST depression range.
pub const ST_DEPRESSION_RANGE: RangeInclusive<f64> = 0.0..=6.0;
/// Accepted count of major vessels colored by fluoroscopy.
pub const MAJOR_VESSELS_RANGE: RangeInclusive<u8> = 0..=3;

/// Rejection of a single clinician-entered field.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InvalidInput {
    #[error("{field}: unknown choice {value:?}")]
    UnknownCategory { field: &'static str, value: String },

    #[error("{field}: {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("{field}: value must be a finite number")]
    NotFinite { field: &'static str },
}

impl InvalidInput {
    /// Name of the offending field.
    #[must_use]
    pub fn field(&self) -> &'static str {
        match self {
            Self::UnknownCategory { field, .. }
            | Self::OutOfRange { field, .. }
            | Self::NotFinite { field } => field,
        }
    }
}

/// A closed set of clinical choices, each mapped to a fixed model code.
pub trait Categorical: Sized + Copy + 'static {
    /// Column name of the field this category belongs to.
    const FIELD: &'static str;

    /// Every variant, in code order.
    const ALL: &'static [Self];

    /// Integer code the model was trained on.
    fn code(self) -> u8;

    /// Human-readable label shown to clinicians.
    fn label(self) -> &'static str;

    /// Label with the code suffix, as shown by the dashboard form.
    fn display_label(self) -> String {
        format!("{} ({})", self.label(), self.code())
    }

    /// Look up a variant by its model code.
    fn from_code(code: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|v| v.code() == code)
    }

    /// Resolve a clinician-facing choice.
    ///
    /// Matching is case-insensitive and ignores punctuation, so "Flat",
    /// "flat" and "Flat (2)" all resolve; the code suffix is compared against
    /// the variant's own display label, never parsed.
    ///
    /// # Errors
    /// Returns `InvalidInput::UnknownCategory` if no variant matches.
    fn from_choice(choice: &str) -> Result<Self, InvalidInput> {
        let wanted = normalize_choice(choice);
        Self::ALL
            .iter()
            .copied()
            .find(|v| {
                !wanted.is_empty()
                    && (wanted == normalize_choice(v.label())
                        || wanted == normalize_choice(&v.display_label()))
            })
            .ok_or_else(|| InvalidInput::UnknownCategory {
                field: Self::FIELD,
                value: choice.to_string(),
            })
    }
}

fn normalize_choice(s: &str) -> String {
    s.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Biological sex as recorded in the training data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Sex {
    Female,
    Male,
}

impl Categorical for Sex {
    const FIELD: &'static str = "sex";
    const ALL: &'static [Self] = &[Self::Female, Self::Male];

    fn code(self) -> u8 {
        match self {
            Self::Female => 0,
            Self::Male => 1,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Female => "Female",
            Self::Male => "Male",
        }
    }
}

/// Chest pain type (`cp`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChestPainType {
    TypicalAngina,
    AtypicalAngina,
    NonAnginal,
    Asymptomatic,
}

impl Categorical for ChestPainType {
    const FIELD: &'static str = "cp";
    const ALL: &'static [Self] = &[
        Self::TypicalAngina,
        Self::AtypicalAngina,
        Self::NonAnginal,
        Self::Asymptomatic,
    ];

    fn code(self) -> u8 {
        match self {
            Self::TypicalAngina => 1,
            Self::AtypicalAngina => 2,
            Self::NonAnginal => 3,
            Self::Asymptomatic => 4,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::TypicalAngina => "Typical Angina",
            Self::AtypicalAngina => "Atypical Angina",
            Self::NonAnginal => "Non-anginal",
            Self::Asymptomatic => "Asymptomatic",
        }
    }
}

/// Resting electrocardiogram result (`restecg`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestingEcg {
    Normal,
    StTAbnormality,
    LeftVentricularHypertrophy,
}

impl Categorical for RestingEcg {
    const FIELD: &'static str = "restecg";
    const ALL: &'static [Self] = &[
        Self::Normal,
        Self::StTAbnormality,
        Self::LeftVentricularHypertrophy,
    ];

    fn code(self) -> u8 {
        match self {
            Self::Normal => 0,
            Self::StTAbnormality => 1,
            Self::LeftVentricularHypertrophy => 2,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::StTAbnormality => "ST-T Abnormality",
            Self::LeftVentricularHypertrophy => "Left Ventricular Hypertrophy",
        }
    }
}

/// Slope of the peak exercise ST segment (`slope`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StSlope {
    Upsloping,
    Flat,
    Downsloping,
}

impl Categorical for StSlope {
    const FIELD: &'static str = "slope";
    const ALL: &'static [Self] = &[Self::Upsloping, Self::Flat, Self::Downsloping];

    fn code(self) -> u8 {
        match self {
            Self::Upsloping => 1,
            Self::Flat => 2,
            Self::Downsloping => 3,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Upsloping => "Upsloping",
            Self::Flat => "Flat",
            Self::Downsloping => "Downsloping",
        }
    }
}

/// Thalassemia finding (`thal`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Thalassemia {
    Normal,
    FixedDefect,
    ReversibleDefect,
}

impl Categorical for Thalassemia {
    const FIELD: &'static str = "thal";
    const ALL: &'static [Self] = &[Self::Normal, Self::FixedDefect, Self::ReversibleDefect];

    fn code(self) -> u8 {
        match self {
            Self::Normal => 3,
            Self::FixedDefect => 6,
            Self::ReversibleDefect => 7,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::FixedDefect => "Fixed Defect",
            Self::ReversibleDefect => "Reversible Defect",
        }
    }
}

/// One clinician-entered observation, typed.
///
/// Immutable once built; numeric domains are checked by [`Self::validate`]
/// and again by the feature encoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientObservation {
    /// Age in years (18-100)
    pub age: u32,
    pub sex: Sex,
    pub chest_pain: ChestPainType,
    /// Resting blood pressure in mm Hg (80-200)
    pub resting_bp: u32,
    /// Serum cholesterol in mg/dL (100-600)
    pub cholesterol: u32,
    /// Fasting blood sugar > 120 mg/dL
    pub fasting_blood_sugar_high: bool,
    pub resting_ecg: RestingEcg,
    /// Maximum heart rate achieved in bpm (60-220)
    pub max_heart_rate: u32,
    pub exercise_angina: bool,
    /// ST depression induced by exercise relative to rest (0.0-6.0)
    pub st_depression: f64,
    pub st_slope: StSlope,
    /// Major vessels colored by fluoroscopy (0-3)
    pub major_vessels: u8,
    pub thalassemia: Thalassemia,
}

fn check_range<T>(field: &'static str, value: T, range: &RangeInclusive<T>) -> Result<(), InvalidInput>
where
    T: PartialOrd + Copy + Into<f64>,
{
    if range.contains(&value) {
        Ok(())
    } else {
        Err(InvalidInput::OutOfRange {
            field,
            value: value.into(),
            min: (*range.start()).into(),
            max: (*range.end()).into(),
        })
    }
}

impl PatientObservation {
    /// Check every numeric field against its clinical domain.
    ///
    /// Fields are checked in feature order; the first violation is returned.
    ///
    /// # Errors
    /// Returns the `InvalidInput` naming the offending field.
    pub fn validate(&self) -> Result<(), InvalidInput> {
        check_range("age", self.age, &AGE_RANGE)?;
        check_range("trestbps", self.resting_bp, &RESTING_BP_RANGE)?;
        check_range("chol", self.cholesterol, &CHOLESTEROL_RANGE)?;
        check_range("thalach", self.max_heart_rate, &MAX_HEART_RATE_RANGE)?;

        if !self.st_depression.is_finite() {
            return Err(InvalidInput::NotFinite { field: "oldpeak" });
        }
        check_range("oldpeak", self.st_depression, &ST_DEPRESSION_RANGE)?;
        check_range("ca", self.major_vessels, &MAJOR_VESSELS_RANGE)?;
        Ok(())
    }
}

/// Raw form values as a clinician enters them.
///
/// Categorical fields are free strings here; [`PatientObservation::try_from`]
/// resolves them against the closed enums and checks numeric domains.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservationInput {
    pub age: u32,
    pub sex: String,
    pub chest_pain: String,
    pub resting_bp: u32,
    pub cholesterol: u32,
    pub fasting_blood_sugar: String,
    pub resting_ecg: String,
    pub max_heart_rate: u32,
    pub exercise_angina: String,
    pub st_depression: f64,
    pub st_slope: String,
    pub major_vessels: u8,
    pub thalassemia: String,
}

/// Parse a yes/no style answer.
///
/// # Errors
/// Returns `InvalidInput::UnknownCategory` for anything but
/// true/false, yes/no or 1/0.
pub fn parse_flag(field: &'static str, value: &str) -> Result<bool, InvalidInput> {
    match normalize_choice(value).as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => Err(InvalidInput::UnknownCategory {
            field,
            value: value.to_string(),
        }),
    }
}

impl TryFrom<&ObservationInput> for PatientObservation {
    type Error = InvalidInput;

    fn try_from(input: &ObservationInput) -> Result<Self, Self::Error> {
        let observation = Self {
            age: input.age,
            sex: Sex::from_choice(&input.sex)?,
            chest_pain: ChestPainType::from_choice(&input.chest_pain)?,
            resting_bp: input.resting_bp,
            cholesterol: input.cholesterol,
            fasting_blood_sugar_high: parse_flag("fbs", &input.fasting_blood_sugar)?,
            resting_ecg: RestingEcg::from_choice(&input.resting_ecg)?,
            max_heart_rate: input.max_heart_rate,
            exercise_angina: parse_flag("exang", &input.exercise_angina)?,
            st_depression: input.st_depression,
            st_slope: StSlope::from_choice(&input.st_slope)?,
            major_vessels: input.major_vessels,
            thalassemia: Thalassemia::from_choice(&input.thalassemia)?,
        };
        observation.validate()?;
        Ok(observation)
    }
}

#[cfg(test)]
pub(crate) fn sample_observation() -> PatientObservation {
    PatientObservation {
        age: 45,
        sex: Sex::Male,
        chest_pain: ChestPainType::Asymptomatic,
        resting_bp: 120,
        cholesterol: 200,
        fasting_blood_sugar_high: false,
        resting_ecg: RestingEcg::Normal,
        max_heart_rate: 150,
        exercise_angina: false,
        st_depression: 1.0,
        st_slope: StSlope::Flat,
        major_vessels: 0,
        thalassemia: Thalassemia::Normal,
    }
}
