//! Model ports: Traits for the pre-trained scaler and classifier.
//!
//! Both are opaque artifacts fitted offline. They are loaded once at startup
//! and shared immutably, so every method takes `&self`.

use crate::domain::{FeatureVector, ScaledVector};

/// Training-time feature normalization.
pub trait FeatureScaler: Send + Sync {
    /// Column names the scaler was fitted against, in fitted order.
    fn feature_names(&self) -> &[String];

    /// Apply the fitted normalization to a raw feature vector.
    ///
    /// Must not re-derive any parameter at runtime.
    fn transform(&self, raw: &FeatureVector) -> ScaledVector;
}

/// Pre-trained binary risk classifier.
pub trait RiskClassifier: Send + Sync {
    /// Column names the classifier was fitted against, in fitted order.
    fn feature_names(&self) -> &[String];

    /// Predict a label for a scaled vector.
    ///
    /// # Returns
    /// 0 for low risk, 1 for high risk. Pure per call.
    fn predict(&self, scaled: &ScaledVector) -> u8;
}
