//! Prediction store port: Trait for persisting prediction records.

use crate::domain::{PredictionRecord, ReviewState};

/// A page of items with pagination metadata.
#[derive(Debug, Clone)]
pub struct Page<T> {
    /// Items in this page
    pub items: Vec<T>,
    /// Total count across all pages (for UI pagination)
    pub total_count: usize,
    /// Current page offset
    pub offset: usize,
    /// Page size limit
    pub limit: usize,
    /// Whether there are more pages
    pub has_more: bool,
}

impl<T> Page<T> {
    /// Create a new page.
    #[must_use]
    pub fn new(items: Vec<T>, total_count: usize, offset: usize, limit: usize) -> Self {
        let has_more = offset + items.len() < total_count;
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
            Some(self.offset + self.limit)
        } else {
            None
        }
    }

    /// Get the previous page offset.
    #[must_use]
    pub fn prev_offset(&self) -> Option<usize> {
        if self.offset > 0 {
            Some(self.offset.saturating_sub(self.limit))
        } else {
            None
        }
    }
}

/// Filters for listing and counting predictions. `None` fields match all.
#[derive(Debug, Clone, Default)]
pub struct PredictionFilter {
    /// Only predictions for this patient.
    pub patient_id: Option<i64>,
    /// Only predictions with this label.
    pub label: Option<String>,
    /// Only predictions created at or after this instant.
    pub created_after: Option<chrono::DateTime<chrono::Utc>>,
    /// Only predictions created at or before this instant.
    pub created_before: Option<chrono::DateTime<chrono::Utc>>,
}

/// Per-day aggregate over stored predictions.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DailyStat {
    pub date: chrono::NaiveDate,
    pub predictions: usize,
    /// Mean confidence of that day's predictions.
    pub average_confidence: f64,
}

/// Trait for prediction record persistence.
pub trait PredictionStore: Send + Sync {
    /// Error type for storage operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Insert a freshly created record.
    ///
    /// # Errors
    /// Returns a conflict error if the id is already present, or error if
    /// the storage operation fails.
    fn insert_prediction(&self, record: &PredictionRecord) -> Result<(), Self::Error>;

    /// Load a record by id.
    ///
    /// # Errors
    /// Returns error if the storage operation fails.
    fn prediction(&self, id: &str) -> Result<Option<PredictionRecord>, Self::Error>;

    /// List records matching `filter`, newest first.
    ///
    /// # Errors
    /// Returns error if the storage operation fails.
    fn predictions(
        &self,
        filter: &PredictionFilter,
        offset: usize,
        limit: usize,
    ) -> Result<Page<PredictionRecord>, Self::Error>;

    /// Apply a review transition. When `notes` is `Some`, the stored
    /// clinical notes are replaced as well.
    ///
    /// # Returns
    /// `false` if no record with that id exists.
    ///
    /// # Errors
    /// Returns error if the storage operation fails.
    fn update_review(
        &self,
        id: &str,
        review: &ReviewState,
        notes: Option<&str>,
    ) -> Result<bool, Self::Error>;

    /// Delete a record by id.
    ///
    /// # Returns
    /// `false` if no record with that id exists.
    ///
    /// # Errors
    /// Returns error if the storage operation fails.
    fn delete_prediction(&self, id: &str) -> Result<bool, Self::Error>;

    /// Count records matching `filter`.
    ///
    /// # Errors
    /// Returns error if the storage operation fails.
    fn count_predictions(&self, filter: &PredictionFilter) -> Result<usize, Self::Error>;

    /// Mean confidence across all records, `None` when the store is empty.
    ///
    /// # Errors
    /// Returns error if the storage operation fails.
    fn average_confidence(&self) -> Result<Option<f64>, Self::Error>;

    /// Per-day prediction counts from `since` onward, oldest first. Days
    /// with no predictions are absent.
    ///
    /// # Errors
    /// Returns error if the storage operation fails.
    fn daily_stats(
        &self,
        since: chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<DailyStat>, Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_navigation() {
        let page = Page::new(vec![1, 2, 3], 10, 3, 3);
        assert!(page.has_more);
        assert_eq!(page.next_offset(), Some(6));
        assert_eq!(page.prev_offset(), Some(0));

        let last: Page<i32> = Page::new(vec![], 0, 0, 50);
        assert!(!last.has_more);
        assert_eq!(last.next_offset(), None);
        assert_eq!(last.prev_offset(), None);
    }
}
