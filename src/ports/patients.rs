//! Patient directory port: Trait for patient identity and demographics.
//!
//! The prediction path only needs [`PatientDirectory::patient_exists`]; the
//! remaining operations are directory management glue.

use crate::domain::{NewPatient, Patient, PatientUpdate};
use crate::ports::Page;

/// Filters for listing patients. `None` fields match all.
#[derive(Debug, Clone, Default)]
pub struct PatientFilter {
    /// Substring match over names, patient code and medical record number.
    pub search: Option<String>,
    pub gender: Option<String>,
    pub created_after: Option<chrono::DateTime<chrono::Utc>>,
    pub created_before: Option<chrono::DateTime<chrono::Utc>>,
}

/// Trait for the patient directory.
pub trait PatientDirectory: Send + Sync {
    /// Error type for directory operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Register a patient and return the stored record.
    ///
    /// # Errors
    /// Returns a conflict error if the patient code is already taken, or
    /// error if the storage operation fails.
    fn create_patient(&self, new: &NewPatient) -> Result<Patient, Self::Error>;

    /// Load a patient by storage id.
    ///
    /// # Errors
    /// Returns error if the storage operation fails.
    fn patient(&self, id: i64) -> Result<Option<Patient>, Self::Error>;

    /// Existence check by storage id.
    ///
    /// # Errors
    /// Returns error if the storage operation fails.
    fn patient_exists(&self, id: i64) -> Result<bool, Self::Error>;

    /// Apply a partial update; returns the updated record.
    ///
    /// # Returns
    /// `None` if no patient with that id exists.
    ///
    /// # Errors
    /// Returns error if the storage operation fails.
    fn update_patient(&self, id: i64, update: &PatientUpdate)
        -> Result<Option<Patient>, Self::Error>;

    /// Remove a patient. Predictions referencing the patient keep existing
    /// with their reference cleared.
    ///
    /// # Returns
    /// `false` if no patient with that id exists.
    ///
    /// # Errors
    /// Returns error if the storage operation fails.
    fn delete_patient(&self, id: i64) -> Result<bool, Self::Error>;

    /// List patients matching `filter`, newest first.
    ///
    /// # Errors
    /// Returns error if the storage operation fails.
    fn patients(
        &self,
        filter: &PatientFilter,
        offset: usize,
        limit: usize,
    ) -> Result<Page<Patient>, Self::Error>;

    /// Total number of registered patients.
    ///
    /// # Errors
    /// Returns error if the storage operation fails.
    fn count_patients(&self) -> Result<usize, Self::Error>;
}
