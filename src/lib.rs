//! # Pulsewatch
//!
//! Cardiac risk inference and record pipeline.
//!
//! This crate provides:
//! - Deterministic encoding of clinician-entered observations into the
//!   13-feature model input
//! - Pre-fitted scaling and binary risk classification from versioned artifacts
//! - An append-only record log (CSV or SQLite) that loses no rows under
//!   concurrent writers
//! - Read-only aggregate analytics over the log
//!
//! ## Architecture
//!
//! The crate follows Hexagonal Architecture:
//! - `domain`: Core types (PatientObservation, Feature order, PredictionResult, PersistedRecord)
//! - `ports`: Trait definitions for the scaler, classifier and record store
//! - `adapters`: Concrete implementations (JSON artifacts, CSV, SQLite, log sanitizer)
//! - `application`: Use cases orchestrating domain and ports
//! - `config`: Runtime configuration from flags and environment

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

pub use domain::{Assessment, PatientObservation, PredictionResult, RiskLevel};

/// Result type for Pulsewatch operations
pub type Result<T> = std::result::Result<T, PulsewatchError>;

/// Main error type for Pulsewatch
#[derive(Debug, thiserror::Error)]
pub enum PulsewatchError {
    #[error("Failed to load model artifacts: {0}")]
    ArtifactLoad(#[from] adapters::artifacts::ArtifactError),

    #[error("Invalid patient data: {0}")]
    InvalidInput(#[from] domain::InvalidInput),

    #[error("Storage operation failed: {0}")]
    Storage(#[from] adapters::StorageError),

    #[error(transparent)]
    FeatureOrder(#[from] domain::FeatureOrderError),

    #[error(transparent)]
    UnexpectedLabel(#[from] domain::UnexpectedLabel),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
