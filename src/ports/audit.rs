//! Audit trail port: Trait for the append-only action log.

use crate::domain::{AuditAction, AuditEvent};
use crate::ports::Page;

/// Filters for querying audit events. `None` fields match all.
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub actor: Option<String>,
    pub action: Option<AuditAction>,
    pub entity_type: Option<String>,
    pub since: Option<chrono::DateTime<chrono::Utc>>,
    pub until: Option<chrono::DateTime<chrono::Utc>>,
}

/// Trait for audit trail storage.
///
/// Recording is fire-and-forget from the core's perspective: callers log a
/// failed write and carry on with the primary operation.
pub trait AuditTrail: Send + Sync {
    /// Error type for audit operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Append one event.
    ///
    /// # Errors
    /// Returns error if the storage operation fails.
    fn record(&self, event: &AuditEvent) -> Result<(), Self::Error>;

    /// Query events matching `query`, newest first.
    ///
    /// # Errors
    /// Returns error if the storage operation fails.
    fn events(
        &self,
        query: &AuditQuery,
        offset: usize,
        limit: usize,
    ) -> Result<Page<AuditEvent>, Self::Error>;

    /// Distinct actors present in the log.
    ///
    /// # Errors
    /// Returns error if the storage operation fails.
    fn actors(&self) -> Result<Vec<String>, Self::Error>;

    /// Distinct action names present in the log.
    ///
    /// # Errors
    /// Returns error if the storage operation fails.
    fn actions(&self) -> Result<Vec<String>, Self::Error>;
}
