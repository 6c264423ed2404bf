//! Storage port: Trait for the append-only patient record log.
//!
//! This trait abstracts the storage backend (CSV file or SQLite) from the
//! application logic.

use crate::domain::PersistedRecord;

/// A page of records with pagination metadata.
#[derive(Debug, Clone)]
pub struct RecordPage {
    /// Records in this page, in storage order
    pub items: Vec<PersistedRecord>,
    /// Total count of all records
    pub total_count: usize,
    /// Current page offset
    pub offset: usize,
    /// Page size limit
    pub limit: usize,
    /// Whether there are more pages
    pub has_more: bool,
}

impl RecordPage {
    /// Create a new record page.
    #[must_use]
    pub fn new(items: Vec<PersistedRecord>, total_count: usize, offset: usize, limit: usize) -> Self {
        let has_more = offset.saturating_add(items.len()) < total_count;
        Self {
            items,
            total_count,
            offset,
            limit,
            has_more,
        }
    }

    /// Get the next page offset.
    #[must_use]
    pub fn next_offset(&self) -> Option<usize> {
        if self.has_more {
            Some(self.offset.saturating_add(self.limit))
        } else {
            None
        }
    }
}

/// Append-only store of assessed observations.
///
/// Rows are never mutated or deleted. Implementations must guarantee that
/// N concurrent `append` calls leave exactly N new rows, and that a reader
/// never observes a partially written table.
pub trait RecordStore: Send + Sync {
    /// Error type for storage operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Append one record.
    ///
    /// # Errors
    /// Returns a schema mismatch if the existing table layout differs from
    /// the record layout, or an I/O error if the write fails.
    fn append(&self, record: &PersistedRecord) -> Result<(), Self::Error>;

    /// Load every record in insertion order.
    ///
    /// # Returns
    /// An empty vector if nothing was ever written.
    ///
    /// # Errors
    /// Returns error if storage cannot be read or a row is corrupt.
    fn read_all(&self) -> Result<Vec<PersistedRecord>, Self::Error>;

    /// Get the total count of records.
    ///
    /// # Errors
    /// Returns error if storage cannot be read.
    fn count(&self) -> Result<usize, Self::Error> {
        Ok(self.read_all()?.len())
    }

    /// Load records with pagination, in insertion order.
    ///
    /// # Errors
    /// Returns error if storage cannot be read.
    fn read_page(&self, offset: usize, limit: usize) -> Result<RecordPage, Self::Error> {
        let all = self.read_all()?;
        let total = all.len();
        let items = all.into_iter().skip(offset).take(limit).collect();
        Ok(RecordPage::new(items, total, offset, limit))
    }

    /// Human-readable location of the backing table, for operator messages.
    fn location(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{sample_observation, PredictionResult};

    fn items(n: usize) -> Vec<PersistedRecord> {
        let result = PredictionResult::from_label(0).expect("Should accept");
        vec![PersistedRecord::new(sample_observation(), result); n]
    }

    #[test]
    fn test_next_offset() {
        let first = RecordPage::new(items(2), 5, 0, 2);
        assert!(first.has_more);
        assert_eq!(first.next_offset(), Some(2));

        let last = RecordPage::new(items(1), 5, 4, 2);
        assert!(!last.has_more);
        assert_eq!(last.next_offset(), None);
    }

    #[test]
    fn test_next_offset_saturates() {
        let page = RecordPage::new(items(1), 5, 1, usize::MAX);
        assert_eq!(page.next_offset(), Some(usize::MAX));
    }
}
