//! SQLite adapter: Implementation of the persistence ports.
//!
//! One connection serves the prediction store, the patient directory and
//! the audit trail; SQLite is the single canonical persistence strategy.
//!
//! # Mutex Behavior
//!
//! The database connection is protected by `Mutex`. A poisoned mutex (from
//! panic in another thread) will cause panic. This fail-fast behavior is
//! intentional for data integrity in healthcare applications.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, params_from_iter, Connection, ToSql};

use crate::domain::{
    AuditAction, AuditEvent, NewPatient, Patient, PatientUpdate, PredictionRecord, ReviewState,
};
use crate::ports::{
    AuditQuery, AuditTrail, DailyStat, Page, PatientDirectory, PatientFilter, PredictionFilter,
    PredictionStore,
};

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Conflict: {0}")]
    Conflict(String),
}

/// SQLite storage adapter.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Create a new SQLite storage with the given database path.
    ///
    /// # Errors
    /// Returns error if the database cannot be opened or initialized.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.init_schema()?;
        Ok(storage)
    }

    /// Create an in-memory SQLite database (for testing).
    ///
    /// # Errors
    /// Returns error if the database cannot be created.
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.init_schema()?;
        Ok(storage)
    }

    /// Initialize the database schema.
    fn init_schema(&self) -> Result<(), StorageError> {
        let conn = self.conn.lock().expect("Lock failed");

        conn.execute_batch(
            r"
            CREATE TABLE IF NOT EXISTS patients (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                patient_code TEXT NOT NULL UNIQUE,
                first_name TEXT NOT NULL,
                last_name TEXT NOT NULL,
                age INTEGER,
                gender TEXT,
                phone TEXT,
                email TEXT,
                address TEXT,
                medical_record_number TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT
            );

            CREATE TABLE IF NOT EXISTS predictions (
                id TEXT PRIMARY KEY,
                patient_id INTEGER,
                image_filename TEXT NOT NULL,
                original_filename TEXT,
                label TEXT NOT NULL,
                confidence REAL NOT NULL,
                probabilities TEXT NOT NULL,
                inference_seconds REAL NOT NULL,
                image_width INTEGER NOT NULL,
                image_height INTEGER NOT NULL,
                clinical_notes TEXT,
                reviewed INTEGER NOT NULL DEFAULT 0,
                reviewed_by TEXT,
                reviewed_at TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_predictions_created
                ON predictions(created_at DESC);
            CREATE INDEX IF NOT EXISTS idx_predictions_patient
                ON predictions(patient_id);

            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                actor TEXT NOT NULL,
                action TEXT NOT NULL,
                entity_type TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                details TEXT NOT NULL,
                timestamp TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_audit_timestamp
                ON audit_log(timestamp DESC);
            ",
        )?;

        Ok(())
    }

    fn is_unique_violation(e: &rusqlite::Error) -> bool {
        matches!(
            e,
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == rusqlite::ErrorCode::ConstraintViolation
        )
    }

    fn parse_timestamp(raw: &str) -> chrono::DateTime<chrono::Utc> {
        chrono::DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&chrono::Utc))
            .unwrap_or_else(|_| chrono::Utc::now())
    }

    fn row_to_prediction(row: &rusqlite::Row<'_>) -> rusqlite::Result<PredictionRecord> {
        let probabilities_json: String = row.get(6)?;
        let probabilities: BTreeMap<String, f64> =
            serde_json::from_str(&probabilities_json).unwrap_or_default();

        let reviewed: i64 = row.get(11)?;
        let reviewed_at: Option<String> = row.get(13)?;
        let created_at: String = row.get(14)?;

        Ok(PredictionRecord {
            id: row.get(0)?,
            patient_id: row.get(1)?,
            image_filename: row.get(2)?,
            original_filename: row.get(3)?,
            label: row.get(4)?,
            confidence: row.get(5)?,
            probabilities,
            inference_seconds: row.get(7)?,
            image_size: (row.get::<_, i64>(8)? as u32, row.get::<_, i64>(9)? as u32),
            clinical_notes: row.get(10)?,
            review: ReviewState {
                reviewed: reviewed != 0,
                reviewed_by: row.get(12)?,
                reviewed_at: reviewed_at.as_deref().map(Self::parse_timestamp),
            },
            created_at: Self::parse_timestamp(&created_at),
        })
    }

    fn row_to_patient(row: &rusqlite::Row<'_>) -> rusqlite::Result<Patient> {
        let created_at: String = row.get(10)?;
        let updated_at: Option<String> = row.get(11)?;

        Ok(Patient {
            id: row.get(0)?,
            patient_code: row.get(1)?,
            first_name: row.get(2)?,
            last_name: row.get(3)?,
            age: row.get::<_, Option<i64>>(4)?.map(|a| a as u32),
            gender: row.get(5)?,
            phone: row.get(6)?,
            email: row.get(7)?,
            address: row.get(8)?,
            medical_record_number: row.get(9)?,
            created_at: Self::parse_timestamp(&created_at),
            updated_at: updated_at.as_deref().map(Self::parse_timestamp),
        })
    }

    fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuditEvent> {
        let action_raw: String = row.get(1)?;
        let details_json: String = row.get(4)?;
        let timestamp: String = row.get(5)?;

        Ok(AuditEvent {
            actor: row.get(0)?,
            action: action_raw
                .parse::<AuditAction>()
                .unwrap_or(AuditAction::Export),
            entity_type: row.get(2)?,
            entity_id: row.get(3)?,
            details: serde_json::from_str(&details_json).unwrap_or_default(),
            timestamp: Self::parse_timestamp(&timestamp),
        })
    }

    fn prediction_conditions(
        filter: &PredictionFilter,
    ) -> (String, Vec<Box<dyn ToSql + Send + Sync>>) {
        let mut conditions: Vec<&str> = Vec::new();
        let mut values: Vec<Box<dyn ToSql + Send + Sync>> = Vec::new();

        if let Some(patient_id) = filter.patient_id {
            conditions.push("patient_id = ?");
            values.push(Box::new(patient_id));
        }
        if let Some(label) = &filter.label {
            conditions.push("label = ?");
            values.push(Box::new(label.clone()));
        }
        if let Some(after) = filter.created_after {
            conditions.push("created_at >= ?");
            values.push(Box::new(after.to_rfc3339()));
        }
        if let Some(before) = filter.created_before {
            conditions.push("created_at <= ?");
            values.push(Box::new(before.to_rfc3339()));
        }

        let clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };
        (clause, values)
    }

    fn patient_conditions(filter: &PatientFilter) -> (String, Vec<Box<dyn ToSql + Send + Sync>>) {
        let mut conditions: Vec<&str> = Vec::new();
        let mut values: Vec<Box<dyn ToSql + Send + Sync>> = Vec::new();

        if let Some(search) = &filter.search {
            conditions.push(
                "(first_name LIKE ? OR last_name LIKE ? OR patient_code LIKE ? \
                 OR medical_record_number LIKE ?)",
            );
            let term = format!("%{search}%");
            for _ in 0..4 {
                values.push(Box::new(term.clone()));
            }
        }
        if let Some(gender) = &filter.gender {
            conditions.push("gender = ?");
            values.push(Box::new(gender.clone()));
        }
        if let Some(after) = filter.created_after {
            conditions.push("created_at >= ?");
            values.push(Box::new(after.to_rfc3339()));
        }
        if let Some(before) = filter.created_before {
            conditions.push("created_at <= ?");
            values.push(Box::new(before.to_rfc3339()));
        }

        let clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };
        (clause, values)
    }

    fn audit_conditions(query: &AuditQuery) -> (String, Vec<Box<dyn ToSql + Send + Sync>>) {
        let mut conditions: Vec<&str> = Vec::new();
        let mut values: Vec<Box<dyn ToSql + Send + Sync>> = Vec::new();

        if let Some(actor) = &query.actor {
            conditions.push("actor = ?");
            values.push(Box::new(actor.clone()));
        }
        if let Some(action) = query.action {
            conditions.push("action = ?");
            values.push(Box::new(action.as_str()));
        }
        if let Some(entity_type) = &query.entity_type {
            conditions.push("entity_type = ?");
            values.push(Box::new(entity_type.clone()));
        }
        if let Some(since) = query.since {
            conditions.push("timestamp >= ?");
            values.push(Box::new(since.to_rfc3339()));
        }
        if let Some(until) = query.until {
            conditions.push("timestamp <= ?");
            values.push(Box::new(until.to_rfc3339()));
        }

        let clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };
        (clause, values)
    }
}

const PREDICTION_COLUMNS: &str = "id, patient_id, image_filename, original_filename, label, \
     confidence, probabilities, inference_seconds, image_width, image_height, clinical_notes, \
     reviewed, reviewed_by, reviewed_at, created_at";

const PATIENT_COLUMNS: &str = "id, patient_code, first_name, last_name, age, gender, phone, \
     email, address, medical_record_number, created_at, updated_at";

impl PredictionStore for SqliteStorage {
    type Error = StorageError;

    fn insert_prediction(&self, record: &PredictionRecord) -> Result<(), Self::Error> {
        let probabilities = serde_json::to_string(&record.probabilities)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let conn = self.conn.lock().expect("Lock failed");

        conn.execute(
            r"
            INSERT INTO predictions (
                id, patient_id, image_filename, original_filename, label,
                confidence, probabilities, inference_seconds, image_width,
                image_height, clinical_notes, reviewed, reviewed_by,
                reviewed_at, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            ",
            params![
                record.id,
                record.patient_id,
                record.image_filename,
                record.original_filename,
                record.label,
                record.confidence,
                probabilities,
                record.inference_seconds,
                i64::from(record.image_size.0),
                i64::from(record.image_size.1),
                record.clinical_notes,
                record.review.reviewed as i64,
                record.review.reviewed_by,
                record.review.reviewed_at.map(|t| t.to_rfc3339()),
                record.created_at.to_rfc3339(),
            ],
        )
        .map_err(|e| {
            if Self::is_unique_violation(&e) {
                StorageError::Conflict(format!("prediction {} already exists", record.id))
            } else {
                StorageError::Database(e)
            }
        })?;

        tracing::debug!("Saved prediction {} to storage", record.id);
        Ok(())
    }

    fn prediction(&self, id: &str) -> Result<Option<PredictionRecord>, Self::Error> {
        let conn = self.conn.lock().expect("Lock failed");
        let mut stmt = conn.prepare(&format!(
            "SELECT {PREDICTION_COLUMNS} FROM predictions WHERE id = ?1"
        ))?;

        match stmt.query_row(params![id], Self::row_to_prediction) {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn predictions(
        &self,
        filter: &PredictionFilter,
        offset: usize,
        limit: usize,
    ) -> Result<Page<PredictionRecord>, Self::Error> {
        let (clause, mut values) = Self::prediction_conditions(filter);
        let conn = self.conn.lock().expect("Lock failed");

        let total_count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM predictions{clause}"),
            params_from_iter(values.iter()),
            |row| row.get(0),
        )?;

        values.push(Box::new(limit as i64));
        values.push(Box::new(offset as i64));
        let mut stmt = conn.prepare(&format!(
            "SELECT {PREDICTION_COLUMNS} FROM predictions{clause} \
             ORDER BY created_at DESC LIMIT ? OFFSET ?"
        ))?;
        let records = stmt
            .query_map(params_from_iter(values.iter()), Self::row_to_prediction)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page::new(records, total_count as usize, offset, limit))
    }

    fn update_review(
        &self,
        id: &str,
        review: &ReviewState,
        notes: Option<&str>,
    ) -> Result<bool, Self::Error> {
        let conn = self.conn.lock().expect("Lock failed");

        let changed = conn.execute(
            r"
            UPDATE predictions
            SET reviewed = ?1,
                reviewed_by = ?2,
                reviewed_at = ?3,
                clinical_notes = COALESCE(?4, clinical_notes)
            WHERE id = ?5
            ",
            params![
                review.reviewed as i64,
                review.reviewed_by,
                review.reviewed_at.map(|t| t.to_rfc3339()),
                notes,
                id,
            ],
        )?;

        Ok(changed > 0)
    }

    fn delete_prediction(&self, id: &str) -> Result<bool, Self::Error> {
        let conn = self.conn.lock().expect("Lock failed");
        let changed = conn.execute("DELETE FROM predictions WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    fn count_predictions(&self, filter: &PredictionFilter) -> Result<usize, Self::Error> {
        let (clause, values) = Self::prediction_conditions(filter);
        let conn = self.conn.lock().expect("Lock failed");

        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM predictions{clause}"),
            params_from_iter(values.iter()),
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn average_confidence(&self) -> Result<Option<f64>, Self::Error> {
        let conn = self.conn.lock().expect("Lock failed");
        let average: Option<f64> =
            conn.query_row("SELECT AVG(confidence) FROM predictions", [], |row| {
                row.get(0)
            })?;
        Ok(average)
    }

    fn daily_stats(
        &self,
        since: chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<DailyStat>, Self::Error> {
        let conn = self.conn.lock().expect("Lock failed");

        // Timestamps are stored as RFC 3339 in UTC, so the first ten
        // characters are the calendar day.
        let mut stmt = conn.prepare(
            "SELECT substr(created_at, 1, 10) AS day, COUNT(*), AVG(confidence) \
             FROM predictions WHERE created_at >= ?1 GROUP BY day ORDER BY day",
        )?;
        let rows = stmt.query_map(params![since.to_rfc3339()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, Option<f64>>(2)?,
            ))
        })?;

        let mut stats = Vec::new();
        for row in rows {
            let (day, predictions, average) = row?;
            let date = chrono::NaiveDate::parse_from_str(&day, "%Y-%m-%d")
                .map_err(|e| StorageError::Serialization(format!("bad stored day {day:?}: {e}")))?;
            stats.push(DailyStat {
                date,
                predictions: predictions as usize,
                average_confidence: average.unwrap_or(0.0),
            });
        }
        Ok(stats)
    }
}

impl PatientDirectory for SqliteStorage {
    type Error = StorageError;

    fn create_patient(&self, new: &NewPatient) -> Result<Patient, Self::Error> {
        let conn = self.conn.lock().expect("Lock failed");
        let now = chrono::Utc::now().to_rfc3339();

        conn.execute(
            r"
            INSERT INTO patients (
                patient_code, first_name, last_name, age, gender, phone,
                email, address, medical_record_number, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ",
            params![
                new.patient_code,
                new.first_name,
                new.last_name,
                new.age.map(i64::from),
                new.gender,
                new.phone,
                new.email,
                new.address,
                new.medical_record_number,
                now,
            ],
        )
        .map_err(|e| {
            if Self::is_unique_violation(&e) {
                StorageError::Conflict(format!("patient code {} already exists", new.patient_code))
            } else {
                StorageError::Database(e)
            }
        })?;

        let id = conn.last_insert_rowid();
        let mut stmt = conn.prepare(&format!(
            "SELECT {PATIENT_COLUMNS} FROM patients WHERE id = ?1"
        ))?;
        let patient = stmt.query_row(params![id], Self::row_to_patient)?;

        tracing::debug!("Registered patient {} ({})", patient.id, patient.patient_code);
        Ok(patient)
    }

    fn patient(&self, id: i64) -> Result<Option<Patient>, Self::Error> {
        let conn = self.conn.lock().expect("Lock failed");
        let mut stmt = conn.prepare(&format!(
            "SELECT {PATIENT_COLUMNS} FROM patients WHERE id = ?1"
        ))?;

        match stmt.query_row(params![id], Self::row_to_patient) {
            Ok(patient) => Ok(Some(patient)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn patient_exists(&self, id: i64) -> Result<bool, Self::Error> {
        let conn = self.conn.lock().expect("Lock failed");
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM patients WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn update_patient(
        &self,
        id: i64,
        update: &PatientUpdate,
    ) -> Result<Option<Patient>, Self::Error> {
        if !update.is_empty() {
            let mut assignments: Vec<&str> = Vec::new();
            let mut values: Vec<Box<dyn ToSql + Send + Sync>> = Vec::new();

            if let Some(first_name) = &update.first_name {
                assignments.push("first_name = ?");
                values.push(Box::new(first_name.clone()));
            }
            if let Some(last_name) = &update.last_name {
                assignments.push("last_name = ?");
                values.push(Box::new(last_name.clone()));
            }
            if let Some(age) = update.age {
                assignments.push("age = ?");
                values.push(Box::new(i64::from(age)));
            }
            if let Some(gender) = &update.gender {
                assignments.push("gender = ?");
                values.push(Box::new(gender.clone()));
            }
            if let Some(phone) = &update.phone {
                assignments.push("phone = ?");
                values.push(Box::new(phone.clone()));
            }
            if let Some(email) = &update.email {
                assignments.push("email = ?");
                values.push(Box::new(email.clone()));
            }
            if let Some(address) = &update.address {
                assignments.push("address = ?");
                values.push(Box::new(address.clone()));
            }
            if let Some(mrn) = &update.medical_record_number {
                assignments.push("medical_record_number = ?");
                values.push(Box::new(mrn.clone()));
            }
            assignments.push("updated_at = ?");
            values.push(Box::new(chrono::Utc::now().to_rfc3339()));
            values.push(Box::new(id));

            let conn = self.conn.lock().expect("Lock failed");
            conn.execute(
                &format!(
                    "UPDATE patients SET {} WHERE id = ?",
                    assignments.join(", ")
                ),
                params_from_iter(values.iter()),
            )?;
        }

        self.patient(id)
    }

    fn delete_patient(&self, id: i64) -> Result<bool, Self::Error> {
        let conn = self.conn.lock().expect("Lock failed");

        // Keep the patient's predictions; only the reference is cleared.
        conn.execute(
            "UPDATE predictions SET patient_id = NULL WHERE patient_id = ?1",
            params![id],
        )?;
        let changed = conn.execute("DELETE FROM patients WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    fn patients(
        &self,
        filter: &PatientFilter,
        offset: usize,
        limit: usize,
    ) -> Result<Page<Patient>, Self::Error> {
        let (clause, mut values) = Self::patient_conditions(filter);
        let conn = self.conn.lock().expect("Lock failed");

        let total_count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM patients{clause}"),
            params_from_iter(values.iter()),
            |row| row.get(0),
        )?;

        values.push(Box::new(limit as i64));
        values.push(Box::new(offset as i64));
        let mut stmt = conn.prepare(&format!(
            "SELECT {PATIENT_COLUMNS} FROM patients{clause} \
             ORDER BY created_at DESC LIMIT ? OFFSET ?"
        ))?;
        let patients = stmt
            .query_map(params_from_iter(values.iter()), Self::row_to_patient)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page::new(patients, total_count as usize, offset, limit))
    }

    fn count_patients(&self) -> Result<usize, Self::Error> {
        let conn = self.conn.lock().expect("Lock failed");
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM patients", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

impl AuditTrail for SqliteStorage {
    type Error = StorageError;

    fn record(&self, event: &AuditEvent) -> Result<(), Self::Error> {
        let details = serde_json::to_string(&event.details)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let conn = self.conn.lock().expect("Lock failed");

        conn.execute(
            r"
            INSERT INTO audit_log (actor, action, entity_type, entity_id, details, timestamp)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ",
            params![
                event.actor,
                event.action.as_str(),
                event.entity_type,
                event.entity_id,
                details,
                event.timestamp.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn events(
        &self,
        query: &AuditQuery,
        offset: usize,
        limit: usize,
    ) -> Result<Page<AuditEvent>, Self::Error> {
        let (clause, mut values) = Self::audit_conditions(query);
        let conn = self.conn.lock().expect("Lock failed");

        let total_count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM audit_log{clause}"),
            params_from_iter(values.iter()),
            |row| row.get(0),
        )?;

        values.push(Box::new(limit as i64));
        values.push(Box::new(offset as i64));
        let mut stmt = conn.prepare(&format!(
            "SELECT actor, action, entity_type, entity_id, details, timestamp \
             FROM audit_log{clause} ORDER BY timestamp DESC LIMIT ? OFFSET ?"
        ))?;
        let events = stmt
            .query_map(params_from_iter(values.iter()), Self::row_to_event)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page::new(events, total_count as usize, offset, limit))
    }

    fn actors(&self) -> Result<Vec<String>, Self::Error> {
        let conn = self.conn.lock().expect("Lock failed");
        let mut stmt = conn.prepare("SELECT DISTINCT actor FROM audit_log ORDER BY actor")?;
        let actors = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(actors)
    }

    fn actions(&self) -> Result<Vec<String>, Self::Error> {
        let conn = self.conn.lock().expect("Lock failed");
        let mut stmt = conn.prepare("SELECT DISTINCT action FROM audit_log ORDER BY action")?;
        let actions = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(actions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{new_record_id, InferenceResult};

    fn sample_result(label: &str, confidence: f64) -> InferenceResult {
        let mut probabilities = BTreeMap::new();
        probabilities.insert("NORMAL".to_string(), 1.0 - confidence);
        probabilities.insert("PNEUMONIA".to_string(), confidence);
        InferenceResult {
            label: label.to_string(),
            confidence,
            probabilities,
            inference_seconds: 0.05,
            image_size: (1024, 768),
        }
    }

    fn sample_record(patient_id: Option<i64>) -> PredictionRecord {
        PredictionRecord::new(
            new_record_id(),
            patient_id,
            "stored.png".to_string(),
            Some("xray.png".to_string()),
            sample_result("PNEUMONIA", 0.88),
            None,
        )
    }

    fn sample_patient(code: &str) -> NewPatient {
        NewPatient {
            patient_code: code.to_string(),
            first_name: "Alex".to_string(),
            last_name: "Morgan".to_string(),
            age: Some(47),
            gender: Some("female".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_prediction_roundtrip() {
        let storage = SqliteStorage::in_memory().expect("Should create db");
        let record = sample_record(None);

        storage.insert_prediction(&record).expect("Should save");
        let loaded = storage
            .prediction(&record.id)
            .expect("Should load")
            .expect("Should exist");

        assert_eq!(loaded.label, "PNEUMONIA");
        assert_eq!(loaded.probabilities, record.probabilities);
        assert_eq!(loaded.image_size, (1024, 768));
        assert!(!loaded.review.reviewed);
    }

    #[test]
    fn test_duplicate_id_is_a_conflict() {
        let storage = SqliteStorage::in_memory().expect("Should create db");
        let record = sample_record(None);

        storage.insert_prediction(&record).expect("Should save");
        let err = storage.insert_prediction(&record).unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));
    }

    #[test]
    fn test_review_update_and_notes_coalesce() {
        let storage = SqliteStorage::in_memory().expect("Should create db");
        let mut record = sample_record(None);
        record.clinical_notes = Some("initial note".to_string());
        storage.insert_prediction(&record).expect("Should save");

        let review = ReviewState::reviewed_by("dr.grey");
        let found = storage
            .update_review(&record.id, &review, None)
            .expect("Should update");
        assert!(found);

        let loaded = storage.prediction(&record.id).unwrap().unwrap();
        assert!(loaded.review.reviewed);
        assert_eq!(loaded.review.reviewed_by.as_deref(), Some("dr.grey"));
        assert_eq!(loaded.clinical_notes.as_deref(), Some("initial note"));

        let second = ReviewState::reviewed_by("dr.house");
        storage
            .update_review(&record.id, &second, Some("revised"))
            .expect("Should update");
        let loaded = storage.prediction(&record.id).unwrap().unwrap();
        assert_eq!(loaded.review.reviewed_by.as_deref(), Some("dr.house"));
        assert_eq!(loaded.clinical_notes.as_deref(), Some("revised"));

        assert!(!storage
            .update_review("missing", &review, None)
            .expect("Should not error"));
    }

    #[test]
    fn test_filters_and_pagination() {
        let storage = SqliteStorage::in_memory().expect("Should create db");
        let patient = storage
            .create_patient(&sample_patient("PAT-0001"))
            .expect("Should create");

        for _ in 0..3 {
            storage
                .insert_prediction(&sample_record(Some(patient.id)))
                .expect("Should save");
        }
        let mut normal = sample_record(None);
        normal.label = "NORMAL".to_string();
        storage.insert_prediction(&normal).expect("Should save");

        let by_patient = PredictionFilter {
            patient_id: Some(patient.id),
            ..Default::default()
        };
        assert_eq!(storage.count_predictions(&by_patient).unwrap(), 3);

        let by_label = PredictionFilter {
            label: Some("NORMAL".to_string()),
            ..Default::default()
        };
        assert_eq!(storage.count_predictions(&by_label).unwrap(), 1);

        let page = storage
            .predictions(&PredictionFilter::default(), 0, 2)
            .expect("Should list");
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.total_count, 4);
        assert!(page.has_more);
        assert_eq!(page.next_offset(), Some(2));
    }

    #[test]
    fn test_average_confidence() {
        let storage = SqliteStorage::in_memory().expect("Should create db");
        assert!(storage.average_confidence().unwrap().is_none());

        let mut first = sample_record(None);
        first.confidence = 0.6;
        let mut second = sample_record(None);
        second.confidence = 0.8;
        storage.insert_prediction(&first).unwrap();
        storage.insert_prediction(&second).unwrap();

        let average = storage.average_confidence().unwrap().unwrap();
        assert!((average - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_daily_stats_group_by_day() {
        let storage = SqliteStorage::in_memory().expect("Should create db");

        let mut today = sample_record(None);
        today.confidence = 0.9;
        storage.insert_prediction(&today).unwrap();
        let mut also_today = sample_record(None);
        also_today.confidence = 0.7;
        storage.insert_prediction(&also_today).unwrap();

        let mut last_week = sample_record(None);
        last_week.created_at = chrono::Utc::now() - chrono::Duration::days(7);
        storage.insert_prediction(&last_week).unwrap();

        let since = chrono::Utc::now() - chrono::Duration::days(30);
        let stats = storage.daily_stats(since).expect("Should aggregate");
        assert_eq!(stats.len(), 2);
        // Oldest day first.
        assert!(stats[0].date < stats[1].date);
        assert_eq!(stats[1].predictions, 2);
        assert!((stats[1].average_confidence - 0.8).abs() < 1e-9);

        // A narrower window drops the older day.
        let since = chrono::Utc::now() - chrono::Duration::days(1);
        assert_eq!(storage.daily_stats(since).unwrap().len(), 1);
    }

    #[test]
    fn test_patient_crud() {
        let storage = SqliteStorage::in_memory().expect("Should create db");

        let patient = storage
            .create_patient(&sample_patient("PAT-0001"))
            .expect("Should create");
        assert!(storage.patient_exists(patient.id).unwrap());
        assert!(!storage.patient_exists(patient.id + 99).unwrap());

        let err = storage.create_patient(&sample_patient("PAT-0001")).unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));

        let update = PatientUpdate {
            phone: Some("555-0100".to_string()),
            ..Default::default()
        };
        let updated = storage
            .update_patient(patient.id, &update)
            .expect("Should update")
            .expect("Should exist");
        assert_eq!(updated.phone.as_deref(), Some("555-0100"));
        assert_eq!(updated.first_name, "Alex");
        assert!(updated.updated_at.is_some());

        assert!(storage.delete_patient(patient.id).unwrap());
        assert!(!storage.delete_patient(patient.id).unwrap());
        assert_eq!(storage.count_patients().unwrap(), 0);
    }

    #[test]
    fn test_patient_search() {
        let storage = SqliteStorage::in_memory().expect("Should create db");
        storage.create_patient(&sample_patient("PAT-0001")).unwrap();
        let mut other = sample_patient("PAT-0002");
        other.first_name = "Jordan".to_string();
        other.gender = Some("male".to_string());
        storage.create_patient(&other).unwrap();

        let filter = PatientFilter {
            search: Some("jord".to_string()),
            ..Default::default()
        };
        let page = storage.patients(&filter, 0, 50).expect("Should list");
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].first_name, "Jordan");

        let filter = PatientFilter {
            gender: Some("female".to_string()),
            ..Default::default()
        };
        assert_eq!(storage.patients(&filter, 0, 50).unwrap().items.len(), 1);
    }

    #[test]
    fn test_deleting_patient_clears_prediction_reference() {
        let storage = SqliteStorage::in_memory().expect("Should create db");
        let patient = storage.create_patient(&sample_patient("PAT-0001")).unwrap();
        let record = sample_record(Some(patient.id));
        storage.insert_prediction(&record).unwrap();

        storage.delete_patient(patient.id).unwrap();

        let loaded = storage.prediction(&record.id).unwrap().unwrap();
        assert!(loaded.patient_id.is_none());
    }

    #[test]
    fn test_audit_trail_query() {
        let storage = SqliteStorage::in_memory().expect("Should create db");

        storage
            .record(
                &AuditEvent::new("system", AuditAction::PredictionCreated, "Prediction", "a")
                    .detail("label", "PNEUMONIA"),
            )
            .expect("Should record");
        storage
            .record(&AuditEvent::new(
                "dr.grey",
                AuditAction::PredictionReviewed,
                "Prediction",
                "a",
            ))
            .expect("Should record");

        let all = storage
            .events(&AuditQuery::default(), 0, 50)
            .expect("Should query");
        assert_eq!(all.total_count, 2);

        let by_actor = AuditQuery {
            actor: Some("dr.grey".to_string()),
            ..Default::default()
        };
        let page = storage.events(&by_actor, 0, 50).unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].action, AuditAction::PredictionReviewed);

        assert_eq!(storage.actors().unwrap(), vec!["dr.grey", "system"]);
        assert_eq!(storage.actions().unwrap().len(), 2);
    }
}
