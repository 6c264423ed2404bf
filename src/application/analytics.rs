//! Analytics service: Aggregate statistics over the record log.
//!
//! Every query reads the store's current snapshot; nothing is cached, so
//! results always reflect the table at call time. The pure helpers at the
//! bottom operate on any slice of records and back the service methods.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::adapters::StorageError;
use crate::domain::{Feature, PersistedRecord, RiskLevel};
use crate::ports::{RecordPage, RecordStore};
use crate::PulsewatchError;

/// Count of records per risk level. Both levels are always present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RiskCounts {
    #[serde(rename = "High")]
    pub high: usize,
    #[serde(rename = "Low")]
    pub low: usize,
}

impl RiskCounts {
    /// Count for one level.
    #[must_use]
    pub fn get(&self, level: RiskLevel) -> usize {
        match level {
            RiskLevel::High => self.high,
            RiskLevel::Low => self.low,
        }
    }

    /// Total number of records counted.
    #[must_use]
    pub fn total(&self) -> usize {
        self.high + self.low
    }

    /// The counts as a `{"High": k, "Low": m}` mapping.
    #[must_use]
    pub fn as_map(&self) -> BTreeMap<&'static str, usize> {
        BTreeMap::from([
            (RiskLevel::High.as_str(), self.high),
            (RiskLevel::Low.as_str(), self.low),
        ])
    }
}

/// One point of a scatter view: two feature values and the record's label.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub x: f64,
    pub y: f64,
    pub label: u8,
}

/// Feature pairings offered by the dashboard's correlation charts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartPreset {
    /// Max Heart Rate vs Age
    HeartRateVsAge,
    /// Cholesterol vs Resting BP
    CholesterolVsBp,
}

impl ChartPreset {
    pub const ALL: [Self; 2] = [Self::HeartRateVsAge, Self::CholesterolVsBp];

    /// Chart title.
    #[must_use]
    pub fn title(&self) -> &'static str {
        match self {
            Self::HeartRateVsAge => "Max Heart Rate vs Age",
            Self::CholesterolVsBp => "Cholesterol vs Resting BP",
        }
    }

    /// `(x, y)` features plotted by this chart.
    #[must_use]
    pub fn axes(&self) -> (Feature, Feature) {
        match self {
            Self::HeartRateVsAge => (Feature::Age, Feature::MaxHeartRate),
            Self::CholesterolVsBp => (Feature::Cholesterol, Feature::RestingBp),
        }
    }
}

/// Headline numbers for the record log.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RecordSummary {
    pub total: usize,
    pub high_risk: usize,
    /// Fraction of records labelled high risk; 0.0 for an empty log.
    pub high_risk_share: f64,
}

/// Service for read-only analytics over stored records.
pub struct AnalyticsService<S>
where
    S: RecordStore + ?Sized,
{
    storage: Arc<S>,
}

impl<S> AnalyticsService<S>
where
    S: RecordStore + ?Sized,
    S::Error: Into<StorageError>,
{
    /// Create a new analytics service.
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    fn snapshot(&self) -> Result<Vec<PersistedRecord>, PulsewatchError> {
        self.storage
            .read_all()
            .map_err(|e| PulsewatchError::Storage(e.into()))
    }

    /// Number of records per risk level.
    ///
    /// # Errors
    /// Returns error if storage cannot be read.
    pub fn risk_level_counts(&self) -> Result<RiskCounts, PulsewatchError> {
        Ok(risk_level_counts(&self.snapshot()?))
    }

    /// `(a, b, label)` for every record, in storage order.
    ///
    /// # Errors
    /// Returns error if storage cannot be read.
    pub fn paired_series(&self, a: Feature, b: Feature) -> Result<Vec<SeriesPoint>, PulsewatchError> {
        let points = paired_series(&self.snapshot()?, a, b);
        tracing::debug!("Built {} vs {} series with {} points", a, b, points.len());
        Ok(points)
    }

    /// Series for one of the dashboard charts.
    ///
    /// # Errors
    /// Returns error if storage cannot be read.
    pub fn preset_series(&self, preset: ChartPreset) -> Result<Vec<SeriesPoint>, PulsewatchError> {
        let (x, y) = preset.axes();
        self.paired_series(x, y)
    }

    /// Total, high-risk count and high-risk share.
    ///
    /// # Errors
    /// Returns error if storage cannot be read.
    pub fn summary(&self) -> Result<RecordSummary, PulsewatchError> {
        let summary = summarize(&self.snapshot()?);
        tracing::info!(
            "Record summary: total={}, high_risk={}",
            summary.total,
            summary.high_risk
        );
        Ok(summary)
    }

    /// The last `limit` records, oldest first.
    ///
    /// # Errors
    /// Returns error if storage cannot be read.
    pub fn recent(&self, limit: usize) -> Result<Vec<PersistedRecord>, PulsewatchError> {
        let mut records = self.snapshot()?;
        let skip = records.len().saturating_sub(limit);
        Ok(records.split_off(skip))
    }

    /// A page of records in storage order.
    ///
    /// # Errors
    /// Returns error if storage cannot be read.
    pub fn page(&self, offset: usize, limit: usize) -> Result<RecordPage, PulsewatchError> {
        self.storage
            .read_page(offset, limit)
            .map_err(|e| PulsewatchError::Storage(e.into()))
    }
}

/// Count records per risk level.
#[must_use]
pub fn risk_level_counts(records: &[PersistedRecord]) -> RiskCounts {
    records
        .iter()
        .fold(RiskCounts::default(), |mut counts, record| {
            match record.risk_level() {
                RiskLevel::High => counts.high += 1,
                RiskLevel::Low => counts.low += 1,
            }
            counts
        })
}

/// Pair two feature columns with each record's label.
#[must_use]
pub fn paired_series(records: &[PersistedRecord], a: Feature, b: Feature) -> Vec<SeriesPoint> {
    records
        .iter()
        .map(|r| SeriesPoint {
            x: r.feature_value(a),
            y: r.feature_value(b),
            label: r.prediction(),
        })
        .collect()
}

/// Headline numbers for a set of records.
#[must_use]
pub fn summarize(records: &[PersistedRecord]) -> RecordSummary {
    let counts = risk_level_counts(records);
    let total = counts.total();
    let high_risk_share = if total == 0 {
        0.0
    } else {
        counts.high as f64 / total as f64
    };
    RecordSummary {
        total,
        high_risk: counts.high,
        high_risk_share,
    }
}
