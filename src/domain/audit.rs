//! Audit trail event types.
//!
//! Events are append-only and recorded fire-and-forget: a failure to write
//! an audit entry never fails the operation that produced it.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// State-changing actions worth an audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditAction {
    PredictionCreated,
    PredictionReviewed,
    PredictionDeleted,
    PatientCreated,
    PatientUpdated,
    PatientDeleted,
    Export,
}

impl AuditAction {
    /// Storage representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PredictionCreated => "PREDICTION_CREATED",
            Self::PredictionReviewed => "PREDICTION_REVIEWED",
            Self::PredictionDeleted => "PREDICTION_DELETED",
            Self::PatientCreated => "PATIENT_CREATED",
            Self::PatientUpdated => "PATIENT_UPDATED",
            Self::PatientDeleted => "PATIENT_DELETED",
            Self::Export => "EXPORT",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PREDICTION_CREATED" => Ok(Self::PredictionCreated),
            "PREDICTION_REVIEWED" => Ok(Self::PredictionReviewed),
            "PREDICTION_DELETED" => Ok(Self::PredictionDeleted),
            "PATIENT_CREATED" => Ok(Self::PatientCreated),
            "PATIENT_UPDATED" => Ok(Self::PatientUpdated),
            "PATIENT_DELETED" => Ok(Self::PatientDeleted),
            "EXPORT" => Ok(Self::Export),
            other => Err(format!("unknown audit action: {other}")),
        }
    }
}

/// One append-only audit entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Who performed the action ("system" for unattended paths).
    pub actor: String,
    pub action: AuditAction,
    /// Kind of the affected entity, e.g. "Prediction" or "Patient".
    pub entity_type: String,
    pub entity_id: String,
    /// Flat key/value context, typed at the call site.
    pub details: BTreeMap<String, String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl AuditEvent {
    /// Create an event timestamped now, with no details yet.
    #[must_use]
    pub fn new(
        actor: impl Into<String>,
        action: AuditAction,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
    ) -> Self {
        Self {
            actor: actor.into(),
            action,
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            details: BTreeMap::new(),
            timestamp: chrono::Utc::now(),
        }
    }

    /// Attach one detail entry (builder style).
    #[must_use]
    pub fn detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}
