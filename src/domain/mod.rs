//! Domain layer: Core business types and logic.
//!
//! This module contains pure Rust types with no I/O.
//! Feature order, encoding and record layout live here so every other layer
//! shares one definition of the model contract.

mod diagnosis;
mod features;
mod patient;
mod record;

pub use diagnosis::{Assessment, PredictionResult, RecordStatus, RiskLevel, UnexpectedLabel};
pub use features::{
    encode, ensure_feature_order, Feature, FeatureOrderError, FeatureVector, ScaledVector,
    FEATURE_COLUMNS, FEATURE_COUNT,
};
pub use patient::{
    parse_flag, Categorical, ChestPainType, InvalidInput, ObservationInput, PatientObservation,
    RestingEcg, Sex, StSlope, Thalassemia,
};
pub use record::{format_decimal, MalformedRow, PersistedRecord, RECORD_COLUMNS, RECORD_COLUMN_COUNT};

#[cfg(test)]
pub(crate) use patient::sample_observation;
