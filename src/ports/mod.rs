//! Ports layer: Trait definitions for external operations.
//!
//! Following Hexagonal Architecture, these traits define the boundaries
//! between the application and the model artifacts and record storage.

mod model;
mod storage;

pub use model::{FeatureScaler, RiskClassifier};
pub use storage::{RecordPage, RecordStore};
