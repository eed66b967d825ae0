//! Analytics service: Dashboard aggregates over the stored predictions.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::adapters::StorageError;
use crate::ports::{DailyStat, PatientDirectory, PredictionFilter, PredictionStore};
use crate::{PneumoscanError, Result};

/// Aggregated counters for the dashboard overview.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverviewStats {
    pub total_patients: usize,
    pub total_predictions: usize,
    /// Predictions created since UTC midnight.
    pub predictions_today: usize,
    /// Prediction count per configured class name.
    pub label_counts: BTreeMap<String, usize>,
    /// Mean confidence across all predictions, 0.0 when none exist.
    pub average_confidence: f64,
}

/// Service computing aggregate statistics.
pub struct AnalyticsService<S, P>
where
    S: PredictionStore,
    P: PatientDirectory,
{
    store: Arc<S>,
    patients: Arc<P>,
    class_names: Vec<String>,
}

impl<S, P> AnalyticsService<S, P>
where
    S: PredictionStore,
    P: PatientDirectory,
    S::Error: Into<StorageError>,
    P::Error: Into<StorageError>,
{
    /// Create a new analytics service for the configured class list.
    pub fn new(store: Arc<S>, patients: Arc<P>, class_names: Vec<String>) -> Self {
        Self {
            store,
            patients,
            class_names,
        }
    }

    /// Compute the dashboard overview.
    ///
    /// # Errors
    /// Returns error if a storage operation fails.
    pub fn overview(&self) -> Result<OverviewStats> {
        let total_patients = self.patients.count_patients().map_err(storage)?;
        let total_predictions = self
            .store
            .count_predictions(&PredictionFilter::default())
            .map_err(storage)?;

        let midnight = chrono::Utc::now()
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc());
        let predictions_today = match midnight {
            Some(midnight) => self
                .store
                .count_predictions(&PredictionFilter {
                    created_after: Some(midnight),
                    ..Default::default()
                })
                .map_err(storage)?,
            None => 0,
        };

        let mut label_counts = BTreeMap::new();
        for class_name in &self.class_names {
            let count = self
                .store
                .count_predictions(&PredictionFilter {
                    label: Some(class_name.clone()),
                    ..Default::default()
                })
                .map_err(storage)?;
            label_counts.insert(class_name.clone(), count);
        }

        let average_confidence = self
            .store
            .average_confidence()
            .map_err(storage)?
            .unwrap_or(0.0);

        tracing::debug!(
            "Overview: {} patients, {} predictions ({} today)",
            total_patients,
            total_predictions,
            predictions_today
        );

        Ok(OverviewStats {
            total_patients,
            total_predictions,
            predictions_today,
            label_counts,
            average_confidence,
        })
    }

    /// Per-day prediction volume and mean confidence over the trailing
    /// `days` window, oldest day first.
    ///
    /// # Errors
    /// Returns error if a storage operation fails.
    pub fn daily(&self, days: u32) -> Result<Vec<DailyStat>> {
        let since = chrono::Utc::now() - chrono::Duration::days(i64::from(days));
        self.store.daily_stats(since).map_err(storage)
    }
}

fn storage(e: impl Into<StorageError>) -> PneumoscanError {
    PneumoscanError::Storage(e.into())
}
