//! Export service: CSV reports over patients and predictions.

use std::sync::Arc;

use crate::adapters::StorageError;
use crate::domain::{AuditAction, AuditEvent};
use crate::ports::{AuditTrail, PatientDirectory, PatientFilter, PredictionFilter, PredictionStore};
use crate::{PneumoscanError, Result};

const SYSTEM_ACTOR: &str = "system";

/// Everything is fetched through the same paginated ports the UI uses;
/// exports just walk all pages.
const EXPORT_PAGE_SIZE: usize = 500;

/// Service producing CSV exports.
pub struct ExportService<S, P, A>
where
    S: PredictionStore,
    P: PatientDirectory,
    A: AuditTrail,
{
    store: Arc<S>,
    patients: Arc<P>,
    audit: Arc<A>,
}

impl<S, P, A> ExportService<S, P, A>
where
    S: PredictionStore,
    P: PatientDirectory,
    A: AuditTrail,
    S::Error: Into<StorageError>,
    P::Error: Into<StorageError>,
    A::Error: Into<StorageError>,
{
    /// Create a new export service.
    pub fn new(store: Arc<S>, patients: Arc<P>, audit: Arc<A>) -> Self {
        Self {
            store,
            patients,
            audit,
        }
    }

    /// Export patients matching `filter` as CSV.
    ///
    /// # Errors
    /// Returns error if a storage operation or CSV encoding fails.
    pub fn patients_csv(&self, filter: &PatientFilter) -> Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record([
                "ID",
                "Patient Code",
                "First Name",
                "Last Name",
                "Age",
                "Gender",
                "Phone",
                "Email",
                "Medical Record Number",
                "Created At",
            ])
            .map_err(csv_err)?;

        let mut offset = 0;
        let mut exported = 0usize;
        loop {
            let page = self
                .patients
                .patients(filter, offset, EXPORT_PAGE_SIZE)
                .map_err(storage)?;
            for patient in &page.items {
                writer
                    .write_record([
                        patient.id.to_string(),
                        patient.patient_code.clone(),
                        patient.first_name.clone(),
                        patient.last_name.clone(),
                        patient.age.map(|a| a.to_string()).unwrap_or_default(),
                        patient.gender.clone().unwrap_or_default(),
                        patient.phone.clone().unwrap_or_default(),
                        patient.email.clone().unwrap_or_default(),
                        patient.medical_record_number.clone().unwrap_or_default(),
                        patient.created_at.to_rfc3339(),
                    ])
                    .map_err(csv_err)?;
            }
            exported += page.items.len();
            match page.next_offset() {
                Some(next) => offset = next,
                None => break,
            }
        }

        self.record_audit(
            AuditEvent::new(SYSTEM_ACTOR, AuditAction::Export, "Patient", "csv")
                .detail("rows", exported.to_string()),
        );

        finish(writer)
    }

    /// Export predictions matching `filter` as CSV.
    ///
    /// # Errors
    /// Returns error if a storage operation or CSV encoding fails.
    pub fn predictions_csv(&self, filter: &PredictionFilter) -> Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record([
                "Prediction ID",
                "Patient ID",
                "Image Filename",
                "Prediction",
                "Confidence",
                "Inference Seconds",
                "Clinical Notes",
                "Reviewed",
                "Reviewed By",
                "Created At",
            ])
            .map_err(csv_err)?;

        let mut offset = 0;
        let mut exported = 0usize;
        loop {
            let page = self
                .store
                .predictions(filter, offset, EXPORT_PAGE_SIZE)
                .map_err(storage)?;
            for record in &page.items {
                writer
                    .write_record([
                        record.id.clone(),
                        record
                            .patient_id
                            .map(|id| id.to_string())
                            .unwrap_or_default(),
                        record.image_filename.clone(),
                        record.label.clone(),
                        record.confidence.to_string(),
                        record.inference_seconds.to_string(),
                        record.clinical_notes.clone().unwrap_or_default(),
                        record.review.reviewed.to_string(),
                        record.review.reviewed_by.clone().unwrap_or_default(),
                        record.created_at.to_rfc3339(),
                    ])
                    .map_err(csv_err)?;
            }
            exported += page.items.len();
            match page.next_offset() {
                Some(next) => offset = next,
                None => break,
            }
        }

        self.record_audit(
            AuditEvent::new(SYSTEM_ACTOR, AuditAction::Export, "Prediction", "csv")
                .detail("rows", exported.to_string()),
        );

        finish(writer)
    }

    fn record_audit(&self, event: AuditEvent) {
        if let Err(e) = self.audit.record(&event) {
            let e: StorageError = e.into();
            tracing::warn!("Failed to record audit event {}: {e}", event.action);
        }
    }
}

fn storage(e: impl Into<StorageError>) -> PneumoscanError {
    PneumoscanError::Storage(e.into())
}

fn csv_err(e: csv::Error) -> PneumoscanError {
    PneumoscanError::Validation(format!("CSV encoding failed: {e}"))
}

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<String> {
    let bytes = writer
        .into_inner()
        .map_err(|e| PneumoscanError::Validation(format!("CSV encoding failed: {e}")))?;
    String::from_utf8(bytes)
        .map_err(|e| PneumoscanError::Validation(format!("CSV output was not UTF-8: {e}")))
}
