//! Patient service: Directory management glue around the patient port.

use std::sync::Arc;

use crate::adapters::StorageError;
use crate::domain::{AuditAction, AuditEvent, NewPatient, Patient, PatientUpdate};
use crate::ports::{AuditTrail, Page, PatientDirectory, PatientFilter};
use crate::{PneumoscanError, Result};

const SYSTEM_ACTOR: &str = "system";

/// Service for patient CRUD with audit logging.
pub struct PatientService<P, A>
where
    P: PatientDirectory,
    A: AuditTrail,
{
    patients: Arc<P>,
    audit: Arc<A>,
}

impl<P, A> PatientService<P, A>
where
    P: PatientDirectory,
    A: AuditTrail,
    P::Error: Into<StorageError>,
    A::Error: Into<StorageError>,
{
    /// Create a new patient service.
    pub fn new(patients: Arc<P>, audit: Arc<A>) -> Self {
        Self { patients, audit }
    }

    /// Register a new patient.
    ///
    /// # Errors
    /// `Validation` for malformed demographics, `Conflict` when the patient
    /// code is already taken, or a storage failure.
    pub fn create(&self, new: &NewPatient) -> Result<Patient> {
        new.validate()
            .map_err(|errors| PneumoscanError::Validation(errors.join("; ")))?;

        let patient = self.patients.create_patient(new).map_err(storage_err)?;

        self.record_audit(
            AuditEvent::new(
                SYSTEM_ACTOR,
                AuditAction::PatientCreated,
                "Patient",
                patient.id.to_string(),
            )
            .detail("patient_code", &patient.patient_code)
            .detail(
                "name",
                format!("{} {}", patient.first_name, patient.last_name),
            ),
        );

        Ok(patient)
    }

    /// Load a patient by id.
    ///
    /// # Errors
    /// `NotFound` for an unknown id, or a storage failure.
    pub fn get(&self, id: i64) -> Result<Patient> {
        self.patients
            .patient(id)
            .map_err(storage_err)?
            .ok_or_else(|| PneumoscanError::NotFound(format!("patient {id}")))
    }

    /// Apply a partial update to patient demographics.
    ///
    /// # Errors
    /// `NotFound` for an unknown id, or a storage failure.
    pub fn update(&self, id: i64, update: &PatientUpdate) -> Result<Patient> {
        let patient = self
            .patients
            .update_patient(id, update)
            .map_err(storage_err)?
            .ok_or_else(|| PneumoscanError::NotFound(format!("patient {id}")))?;

        self.record_audit(AuditEvent::new(
            SYSTEM_ACTOR,
            AuditAction::PatientUpdated,
            "Patient",
            id.to_string(),
        ));

        Ok(patient)
    }

    /// Remove a patient from the directory. Existing predictions keep
    /// their records with the patient reference cleared.
    ///
    /// # Errors
    /// `NotFound` for an unknown id, or a storage failure.
    pub fn delete(&self, id: i64) -> Result<()> {
        let deleted = self.patients.delete_patient(id).map_err(storage_err)?;
        if !deleted {
            return Err(PneumoscanError::NotFound(format!("patient {id}")));
        }

        self.record_audit(AuditEvent::new(
            SYSTEM_ACTOR,
            AuditAction::PatientDeleted,
            "Patient",
            id.to_string(),
        ));

        Ok(())
    }

    /// List patients, newest first.
    ///
    /// # Errors
    /// Returns error if the storage operation fails.
    pub fn list(
        &self,
        filter: &PatientFilter,
        offset: usize,
        limit: usize,
    ) -> Result<Page<Patient>> {
        self.patients
            .patients(filter, offset, limit)
            .map_err(storage_err)
    }

    fn record_audit(&self, event: AuditEvent) {
        if let Err(e) = self.audit.record(&event) {
            let e: StorageError = e.into();
            tracing::warn!("Failed to record audit event {}: {e}", event.action);
        }
    }
}

fn storage_err(e: impl Into<StorageError>) -> PneumoscanError {
    match e.into() {
        StorageError::Conflict(msg) => PneumoscanError::Conflict(msg),
        other => PneumoscanError::Storage(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::SqliteStorage;

    fn service() -> (PatientService<SqliteStorage, SqliteStorage>, Arc<SqliteStorage>) {
        let storage = Arc::new(SqliteStorage::in_memory().expect("Should create db"));
        (
            PatientService::new(Arc::clone(&storage), Arc::clone(&storage)),
            storage,
        )
    }

    fn sample(code: &str) -> NewPatient {
        NewPatient {
            patient_code: code.to_string(),
            first_name: "Alex".to_string(),
            last_name: "Morgan".to_string(),
            age: Some(47),
            ..Default::default()
        }
    }

    #[test]
    fn test_create_get_update_delete() {
        let (service, _storage) = service();

        let patient = service.create(&sample("PAT-0001")).expect("Should create");
        assert_eq!(service.get(patient.id).unwrap().patient_code, "PAT-0001");

        let update = PatientUpdate {
            last_name: Some("Reed".to_string()),
            ..Default::default()
        };
        let updated = service.update(patient.id, &update).expect("Should update");
        assert_eq!(updated.last_name, "Reed");

        service.delete(patient.id).expect("Should delete");
        assert!(matches!(
            service.get(patient.id).unwrap_err(),
            PneumoscanError::NotFound(_)
        ));
        assert!(matches!(
            service.delete(patient.id).unwrap_err(),
            PneumoscanError::NotFound(_)
        ));
    }

    #[test]
    fn test_duplicate_code_conflicts() {
        let (service, _storage) = service();
        service.create(&sample("PAT-0001")).expect("Should create");

        let err = service.create(&sample("PAT-0001")).unwrap_err();
        assert!(matches!(err, PneumoscanError::Conflict(_)));
    }

    #[test]
    fn test_invalid_demographics_rejected() {
        let (service, storage) = service();
        let err = service.create(&sample("")).unwrap_err();
        assert!(matches!(err, PneumoscanError::Validation(_)));
        assert_eq!(storage.count_patients().unwrap(), 0);
    }

    #[test]
    fn test_lifecycle_emits_audit_events() {
        let (service, storage) = service();
        let patient = service.create(&sample("PAT-0001")).unwrap();
        service.delete(patient.id).unwrap();

        let events = storage
            .events(&crate::ports::AuditQuery::default(), 0, 10)
            .unwrap();
        assert_eq!(events.total_count, 2);
    }
}
