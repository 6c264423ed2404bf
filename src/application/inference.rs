//! Inference service: Orchestrates one risk assessment.
//!
//! This service coordinates:
//! - Feature encoding and domain validation
//! - Feature order checks against each artifact
//! - Scaling and classification
//! - Record persistence

use std::sync::Arc;

use crate::adapters::StorageError;
use crate::domain::{
    encode, ensure_feature_order, Assessment, ObservationInput, PatientObservation,
    PersistedRecord, PredictionResult, RecordStatus,
};
use crate::ports::{FeatureScaler, RecordStore, RiskClassifier};
use crate::PulsewatchError;

/// Service for running risk assessments.
///
/// The scaler and classifier are loaded once and shared immutably; the
/// record store owns the durable table. Prediction and persistence fail
/// independently: invalid input aborts before anything is written, while a
/// storage failure is reported in the returned [`Assessment`] without
/// discarding the prediction.
pub struct InferenceService<C, Sc, S>
where
    C: RiskClassifier + ?Sized,
    Sc: FeatureScaler + ?Sized,
    S: RecordStore + ?Sized,
{
    classifier: Arc<C>,
    scaler: Arc<Sc>,
    storage: Arc<S>,
}

impl<C, Sc, S> InferenceService<C, Sc, S>
where
    C: RiskClassifier + ?Sized,
    Sc: FeatureScaler + ?Sized,
    S: RecordStore + ?Sized,
    S::Error: Into<StorageError>,
{
    /// Create a new inference service.
    ///
    /// # Errors
    /// Returns `FeatureOrder` if either artifact was fitted on a different
    /// column order than the encoder produces.
    pub fn new(classifier: Arc<C>, scaler: Arc<Sc>, storage: Arc<S>) -> Result<Self, PulsewatchError> {
        ensure_feature_order("scaler", scaler.feature_names())?;
        ensure_feature_order("classifier", classifier.feature_names())?;
        Ok(Self {
            classifier,
            scaler,
            storage,
        })
    }

    /// Encode, scale and classify without touching the record store.
    ///
    /// # Errors
    /// Returns `InvalidInput` for out-of-domain fields, `FeatureOrder` if an
    /// artifact's order no longer matches, `UnexpectedLabel` if the
    /// classifier leaves {0, 1}.
    pub fn predict(&self, observation: &PatientObservation) -> Result<PredictionResult, PulsewatchError> {
        tracing::debug!("Step 1: Encoding observation...");
        let raw = encode(observation)?;

        tracing::debug!("Step 2: Scaling features...");
        ensure_feature_order("scaler", self.scaler.feature_names())?;
        let scaled = self.scaler.transform(&raw);

        tracing::debug!("Step 3: Classifying...");
        ensure_feature_order("classifier", self.classifier.feature_names())?;
        let label = self.classifier.predict(&scaled);

        Ok(PredictionResult::from_label(label)?)
    }

    /// Run a full assessment and append it to the record log.
    ///
    /// # Errors
    /// Returns error only if the prediction itself fails. Storage failures
    /// come back as [`RecordStatus::NotSaved`].
    pub fn assess(&self, observation: PatientObservation) -> Result<Assessment, PulsewatchError> {
        let result = self.predict(&observation)?;

        tracing::debug!("Step 4: Appending record to {}...", self.storage.location());
        let record = PersistedRecord::new(observation, result);
        let status = match self.storage.append(&record) {
            Ok(()) => RecordStatus::Saved,
            Err(e) => {
                let e: StorageError = e.into();
                if e.is_schema_mismatch() {
                    tracing::error!("Record not saved, table layout changed: {}", e);
                } else {
                    tracing::warn!("Record not saved: {}", e);
                }
                RecordStatus::NotSaved {
                    reason: e.to_string(),
                }
            }
        };

        tracing::info!(
            "Assessment complete: label={}, risk={}, saved={}",
            result.label(),
            result.risk_level(),
            status.is_saved()
        );

        Ok(Assessment {
            observation: record.observation,
            result,
            record: status,
            assessed_at: chrono::Utc::now(),
        })
    }

    /// Resolve raw form values, then [`Self::assess`].
    ///
    /// # Errors
    /// Returns `InvalidInput` naming the offending field for unknown choices
    /// or out-of-domain numbers; nothing is appended in that case.
    pub fn assess_input(&self, input: &ObservationInput) -> Result<Assessment, PulsewatchError> {
        let observation = PatientObservation::try_from(input).map_err(|e| {
            tracing::warn!("Rejected input field {}: {}", e.field(), e);
            e
        })?;
        self.assess(observation)
    }

    /// Get the total record count.
    ///
    /// # Errors
    /// Returns error if storage operation fails.
    pub fn record_count(&self) -> Result<usize, PulsewatchError> {
        self.storage
            .count()
            .map_err(|e| PulsewatchError::Storage(e.into()))
    }
}
