//! Patient directory types.
//!
//! Demographics only; no clinical features live here. The prediction path
//! touches patients solely through an existence check at creation time.

use serde::{Deserialize, Serialize};

/// A registered patient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    /// Storage-assigned identifier.
    pub id: i64,

    /// External patient code, unique across the directory.
    pub patient_code: String,

    pub first_name: String,
    pub last_name: String,
    pub age: Option<u32>,
    pub gender: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub medical_record_number: Option<String>,

    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Data required to register a patient.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewPatient {
    pub patient_code: String,
    pub first_name: String,
    pub last_name: String,
    pub age: Option<u32>,
    pub gender: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub medical_record_number: Option<String>,
}

impl NewPatient {
    /// Validate boundary constraints before the record reaches storage.
    ///
    /// # Errors
    /// Returns all violations as a vector of messages.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.patient_code.trim().is_empty() {
            errors.push("patient_code must not be empty".to_string());
        }
        if self.first_name.trim().is_empty() {
            errors.push("first_name must not be empty".to_string());
        }
        if self.last_name.trim().is_empty() {
            errors.push("last_name must not be empty".to_string());
        }
        if let Some(age) = self.age {
            if age > 120 {
                errors.push(format!("age {age} out of range [0, 120]"));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Partial update of patient demographics. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatientUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub age: Option<u32>,
    pub gender: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub medical_record_number: Option<String>,
}

impl PatientUpdate {
    /// True when the update would change nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.age.is_none()
            && self.gender.is_none()
            && self.phone.is_none()
            && self.email.is_none()
            && self.address.is_none()
            && self.medical_record_number.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation() {
        let valid = NewPatient {
            patient_code: "PAT-0001".to_string(),
            first_name: "Alex".to_string(),
            last_name: "Morgan".to_string(),
            age: Some(47),
            ..Default::default()
        };
        assert!(valid.validate().is_ok());

        let invalid = NewPatient {
            patient_code: "  ".to_string(),
            age: Some(140),
            ..Default::default()
        };
        let errors = invalid.validate().unwrap_err();
        assert_eq!(errors.len(), 4);
    }

    #[test]
    fn test_empty_update() {
        assert!(PatientUpdate::default().is_empty());
        let update = PatientUpdate {
            phone: Some("555-0100".to_string()),
            ..Default::default()
        };
        assert!(!update.is_empty());
    }
}
