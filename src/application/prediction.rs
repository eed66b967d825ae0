//! Prediction service: Orchestrates the classification pipeline and the
//! record lifecycle.
//!
//! This service coordinates:
//! - Upload validation
//! - Preprocessing, the timed model call, postprocessing
//! - Artifact and record persistence
//! - The clinical review transition and deletion
//!
//! The write-artifact → persist-record → emit-audit sequence carries no
//! atomicity guarantee: a crash mid-sequence can leave an orphaned file or
//! an audit-less record. Audit writes are fire-and-forget.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use crate::adapters::StorageError;
use crate::domain::{
    new_record_id, AuditAction, AuditEvent, ImagePreprocessor, ModelConfig, PredictionRecord,
    ResultPostprocessor, ReviewState,
};
use crate::ports::{
    ArtifactStore, AuditTrail, InferenceEngine, Page, PatientDirectory, PredictionFilter,
    PredictionStore,
};
use crate::{PneumoscanError, Result};

/// Actor recorded for unattended operations.
const SYSTEM_ACTOR: &str = "system";

/// Artifact extension used when the upload carries no usable one.
const DEFAULT_EXTENSION: &str = ".jpg";

/// One classification request as submitted by the caller.
#[derive(Debug, Clone)]
pub struct PredictionRequest<'a> {
    /// Raw image bytes.
    pub bytes: &'a [u8],
    /// Content type declared by the caller, e.g. `image/png`.
    pub content_type: &'a str,
    /// Filename as uploaded, if any.
    pub original_filename: Option<&'a str>,
    /// Patient to associate; must exist in the directory.
    pub patient_id: Option<i64>,
    /// Initial clinical notes.
    pub clinical_notes: Option<&'a str>,
}

/// Service for running classification and managing prediction records.
pub struct PredictionService<E, S, P, A, F>
where
    E: InferenceEngine,
    S: PredictionStore,
    P: PatientDirectory,
    A: AuditTrail,
    F: ArtifactStore,
{
    engine: Arc<E>,
    store: Arc<S>,
    patients: Arc<P>,
    audit: Arc<A>,
    artifacts: Arc<F>,
    preprocessor: ImagePreprocessor,
    postprocessor: ResultPostprocessor,
}

impl<E, S, P, A, F> PredictionService<E, S, P, A, F>
where
    E: InferenceEngine,
    S: PredictionStore,
    P: PatientDirectory,
    A: AuditTrail,
    F: ArtifactStore,
    S::Error: Into<StorageError>,
    P::Error: Into<StorageError>,
    A::Error: Into<StorageError>,
    F::Error: Into<std::io::Error>,
{
    /// Create a new prediction service.
    pub fn new(
        engine: Arc<E>,
        store: Arc<S>,
        patients: Arc<P>,
        audit: Arc<A>,
        artifacts: Arc<F>,
        config: &ModelConfig,
    ) -> Self {
        Self {
            engine,
            store,
            patients,
            audit,
            artifacts,
            preprocessor: ImagePreprocessor::new(config.clone()),
            postprocessor: ResultPostprocessor::new(config.class_names.clone()),
        }
    }

    /// Classify an uploaded image and create its prediction record.
    ///
    /// Validation failures (content type, undecodable bytes, unknown
    /// patient) are reported before the model is ever invoked.
    ///
    /// # Errors
    /// `Validation`, `NotFound`, `ModelNotLoaded`, `Inference`, `Conflict`
    /// or a storage/IO failure, per the stage that failed.
    pub fn submit(&self, request: &PredictionRequest<'_>) -> Result<PredictionRecord> {
        if !request.content_type.starts_with("image/") {
            return Err(PneumoscanError::Validation(format!(
                "unsupported content type: {}",
                request.content_type
            )));
        }

        if let Some(patient_id) = request.patient_id {
            let exists = self
                .patients
                .patient_exists(patient_id)
                .map_err(storage_err)?;
            if !exists {
                return Err(PneumoscanError::NotFound(format!(
                    "patient {patient_id} does not exist"
                )));
            }
        }

        self.ensure_loaded()?;

        let prepared = self.preprocessor.prepare(request.bytes)?;

        let started = Instant::now();
        let scores = self
            .engine
            .infer(&prepared.tensor)
            .map_err(|e| PneumoscanError::Inference(e.to_string()))?;
        let inference_seconds = started.elapsed().as_secs_f64();

        let result = self
            .postprocessor
            .interpret(&scores, inference_seconds, prepared.source_size)?;

        let id = new_record_id();
        let image_filename = format!("{id}{}", artifact_extension(request.original_filename));
        self.artifacts
            .store(&image_filename, request.bytes)
            .map_err(|e| PneumoscanError::Io(e.into()))?;

        let record = PredictionRecord::new(
            id,
            request.patient_id,
            image_filename,
            request.original_filename.map(str::to_string),
            result,
            request.clinical_notes.map(str::to_string),
        );
        self.store.insert_prediction(&record).map_err(storage_err)?;

        self.record_audit(
            AuditEvent::new(
                SYSTEM_ACTOR,
                AuditAction::PredictionCreated,
                "Prediction",
                &record.id,
            )
            .detail("label", &record.label)
            .detail("confidence", format!("{:.4}", record.confidence))
            .detail(
                "filename",
                record.original_filename.as_deref().unwrap_or_default(),
            ),
        );

        tracing::info!(
            "Prediction {}: {} (confidence: {:.4}, {:.0} ms)",
            record.id,
            record.label,
            record.confidence,
            record.inference_seconds * 1000.0
        );

        Ok(record)
    }

    /// Mark a prediction as reviewed by a clinician.
    ///
    /// Re-review is permitted and silently overwrites the prior reviewer
    /// metadata. When `notes` is `Some`, the stored clinical notes are
    /// replaced.
    ///
    /// # Errors
    /// `Validation` for an empty reviewer identity, `NotFound` for an
    /// unknown id, or a storage failure.
    pub fn review(
        &self,
        id: &str,
        reviewed_by: &str,
        notes: Option<&str>,
    ) -> Result<PredictionRecord> {
        if reviewed_by.trim().is_empty() {
            return Err(PneumoscanError::Validation(
                "reviewer identity must not be empty".to_string(),
            ));
        }

        let review = ReviewState::reviewed_by(reviewed_by);
        let found = self
            .store
            .update_review(id, &review, notes)
            .map_err(storage_err)?;
        if !found {
            return Err(PneumoscanError::NotFound(format!("prediction {id}")));
        }

        let mut event = AuditEvent::new(
            reviewed_by,
            AuditAction::PredictionReviewed,
            "Prediction",
            id,
        )
        .detail("reviewed_by", reviewed_by);
        if let Some(notes) = notes {
            event = event.detail("notes", notes);
        }
        self.record_audit(event);

        self.store
            .prediction(id)
            .map_err(storage_err)?
            .ok_or_else(|| PneumoscanError::NotFound(format!("prediction {id}")))
    }

    /// Delete a prediction and its stored image artifact.
    ///
    /// # Errors
    /// `NotFound` for an unknown id, or a storage/IO failure.
    pub fn delete(&self, id: &str) -> Result<()> {
        let record = self
            .store
            .prediction(id)
            .map_err(storage_err)?
            .ok_or_else(|| PneumoscanError::NotFound(format!("prediction {id}")))?;

        self.artifacts
            .remove(&record.image_filename)
            .map_err(|e| PneumoscanError::Io(e.into()))?;
        self.store.delete_prediction(id).map_err(storage_err)?;

        self.record_audit(
            AuditEvent::new(
                SYSTEM_ACTOR,
                AuditAction::PredictionDeleted,
                "Prediction",
                id,
            )
            .detail("label", &record.label)
            .detail(
                "filename",
                record.original_filename.as_deref().unwrap_or_default(),
            ),
        );

        Ok(())
    }

    /// Load one prediction record.
    ///
    /// # Errors
    /// `NotFound` for an unknown id, or a storage failure.
    pub fn prediction(&self, id: &str) -> Result<PredictionRecord> {
        self.store
            .prediction(id)
            .map_err(storage_err)?
            .ok_or_else(|| PneumoscanError::NotFound(format!("prediction {id}")))
    }

    /// List prediction records, newest first.
    ///
    /// # Errors
    /// Returns error if the storage operation fails.
    pub fn predictions(
        &self,
        filter: &PredictionFilter,
        offset: usize,
        limit: usize,
    ) -> Result<Page<PredictionRecord>> {
        self.store
            .predictions(filter, offset, limit)
            .map_err(storage_err)
    }

    /// Whether the engine currently has a model loaded.
    #[must_use]
    pub fn model_ready(&self) -> bool {
        self.engine.is_loaded()
    }

    fn ensure_loaded(&self) -> Result<()> {
        if self.engine.is_loaded() {
            return Ok(());
        }
        let loaded = self
            .engine
            .load()
            .map_err(|e| PneumoscanError::ModelNotLoaded(e.to_string()))?;
        if !loaded {
            return Err(PneumoscanError::ModelNotLoaded(
                "classifier model is unavailable".to_string(),
            ));
        }
        Ok(())
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

/// Derive a safe artifact extension from the uploaded filename.
fn artifact_extension(original_filename: Option<&str>) -> String {
    original_filename
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| {
            !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::fs::FsArtifactStore;
    use crate::adapters::onnx::EngineError;
    use crate::adapters::sqlite::SqliteStorage;
    use crate::domain::NewPatient;
    use image::{DynamicImage, ImageFormat, RgbImage};
    use ndarray::Array4;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Deterministic stand-in for the ONNX engine.
    struct MockEngine {
        scores: Vec<f32>,
        load_ok: bool,
        loaded: AtomicBool,
        infer_calls: AtomicUsize,
    }

    impl MockEngine {
        fn new(scores: Vec<f32>) -> Self {
            Self {
                scores,
                load_ok: true,
                loaded: AtomicBool::new(false),
                infer_calls: AtomicUsize::new(0),
            }
        }

        fn unavailable() -> Self {
            Self {
                load_ok: false,
                ..Self::new(vec![])
            }
        }
    }

    impl InferenceEngine for MockEngine {
        type Error = EngineError;

        fn load(&self) -> std::result::Result<bool, Self::Error> {
            if self.load_ok {
                self.loaded.store(true, Ordering::SeqCst);
            }
            Ok(self.load_ok)
        }

        fn is_loaded(&self) -> bool {
            self.loaded.load(Ordering::SeqCst)
        }

        fn infer(&self, _input: &Array4<f32>) -> std::result::Result<Vec<f32>, Self::Error> {
            if !self.is_loaded() {
                return Err(EngineError::NotLoaded);
            }
            self.infer_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.scores.clone())
        }
    }

    struct Fixture {
        service: PredictionService<MockEngine, SqliteStorage, SqliteStorage, SqliteStorage, FsArtifactStore>,
        engine: Arc<MockEngine>,
        storage: Arc<SqliteStorage>,
        _upload_dir: tempfile::TempDir,
    }

    fn fixture(engine: MockEngine) -> Fixture {
        let engine = Arc::new(engine);
        let storage = Arc::new(SqliteStorage::in_memory().expect("Should create db"));
        let upload_dir = tempfile::tempdir().expect("Should create tempdir");
        let artifacts =
            Arc::new(FsArtifactStore::new(upload_dir.path()).expect("Should create store"));
        let service = PredictionService::new(
            Arc::clone(&engine),
            Arc::clone(&storage),
            Arc::clone(&storage),
            Arc::clone(&storage),
            artifacts,
            &ModelConfig::default(),
        );
        Fixture {
            service,
            engine,
            storage,
            _upload_dir: upload_dir,
        }
    }

    fn zero_xray_png() -> Vec<u8> {
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::new(224, 224))
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .expect("Should encode");
        bytes
    }

    fn request<'a>(bytes: &'a [u8]) -> PredictionRequest<'a> {
        PredictionRequest {
            bytes,
            content_type: "image/png",
            original_filename: Some("xray.png"),
            patient_id: None,
            clinical_notes: None,
        }
    }

    #[test]
    fn test_zero_image_baseline_is_reproducible() {
        // Fixed scores [1, 3] give the logistic pair softmax probabilities.
        let fixture = fixture(MockEngine::new(vec![1.0, 3.0]));
        let bytes = zero_xray_png();

        let record = fixture.service.submit(&request(&bytes)).expect("Should classify");

        assert_eq!(record.label, "PNEUMONIA");
        assert!((record.probabilities["NORMAL"] - 0.119_202_922).abs() < 1e-6);
        assert!((record.probabilities["PNEUMONIA"] - 0.880_797_078).abs() < 1e-6);
        assert_eq!(record.confidence, record.probabilities["PNEUMONIA"]);
        assert_eq!(record.image_size, (224, 224));

        // Record, artifact and audit event all exist.
        let stored = fixture.storage.prediction(&record.id).unwrap().unwrap();
        assert_eq!(stored.label, record.label);
        assert!(fixture.service.model_ready());
        let events = fixture
            .storage
            .events(&crate::ports::AuditQuery::default(), 0, 10)
            .unwrap();
        assert_eq!(events.total_count, 1);
    }

    #[test]
    fn test_non_image_content_type_never_touches_engine() {
        let fixture = fixture(MockEngine::new(vec![1.0, 3.0]));
        let bytes = zero_xray_png();
        let mut bad = request(&bytes);
        bad.content_type = "application/pdf";

        let err = fixture.service.submit(&bad).unwrap_err();
        assert!(matches!(err, PneumoscanError::Validation(_)));
        assert_eq!(fixture.engine.infer_calls.load(Ordering::SeqCst), 0);
        assert!(!fixture.engine.is_loaded());
    }

    #[test]
    fn test_unknown_patient_persists_nothing() {
        let fixture = fixture(MockEngine::new(vec![1.0, 3.0]));
        let bytes = zero_xray_png();
        let mut bad = request(&bytes);
        bad.patient_id = Some(999);

        let err = fixture.service.submit(&bad).unwrap_err();
        assert!(matches!(err, PneumoscanError::NotFound(_)));
        assert_eq!(
            fixture
                .storage
                .count_predictions(&PredictionFilter::default())
                .unwrap(),
            0
        );
        assert_eq!(fixture.engine.infer_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_known_patient_is_attached() {
        let fixture = fixture(MockEngine::new(vec![1.0, 3.0]));
        let patient = fixture
            .storage
            .create_patient(&NewPatient {
                patient_code: "PAT-0001".to_string(),
                first_name: "Alex".to_string(),
                last_name: "Morgan".to_string(),
                ..Default::default()
            })
            .expect("Should create");

        let bytes = zero_xray_png();
        let mut req = request(&bytes);
        req.patient_id = Some(patient.id);
        req.clinical_notes = Some("persistent cough");

        let record = fixture.service.submit(&req).expect("Should classify");
        assert_eq!(record.patient_id, Some(patient.id));
        assert_eq!(record.clinical_notes.as_deref(), Some("persistent cough"));
    }

    #[test]
    fn test_unavailable_model_fails_fast() {
        let fixture = fixture(MockEngine::unavailable());
        let bytes = zero_xray_png();

        let err = fixture.service.submit(&request(&bytes)).unwrap_err();
        assert!(matches!(err, PneumoscanError::ModelNotLoaded(_)));
        assert!(!fixture.service.model_ready());
    }

    #[test]
    fn test_undecodable_image_is_a_validation_error() {
        let fixture = fixture(MockEngine::new(vec![1.0, 3.0]));
        let mut bad = request(b"not an image at all");
        bad.content_type = "image/png";

        let err = fixture.service.submit(&bad).unwrap_err();
        assert!(matches!(err, PneumoscanError::Validation(_)));
        assert_eq!(fixture.engine.infer_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_review_transition_and_re_review() {
        let fixture = fixture(MockEngine::new(vec![1.0, 3.0]));
        let bytes = zero_xray_png();
        let record = fixture.service.submit(&request(&bytes)).unwrap();
        assert!(!record.review.reviewed);

        let reviewed = fixture
            .service
            .review(&record.id, "dr.grey", Some("confirmed"))
            .expect("Should review");
        assert!(reviewed.review.reviewed);
        assert_eq!(reviewed.review.reviewed_by.as_deref(), Some("dr.grey"));
        assert!(reviewed.review.reviewed_at.is_some());
        assert_eq!(reviewed.clinical_notes.as_deref(), Some("confirmed"));

        // Re-review overwrites reviewer metadata without error.
        let again = fixture
            .service
            .review(&record.id, "dr.house", None)
            .expect("Should re-review");
        assert_eq!(again.review.reviewed_by.as_deref(), Some("dr.house"));
        assert_eq!(again.clinical_notes.as_deref(), Some("confirmed"));

        let err = fixture.service.review(&record.id, "  ", None).unwrap_err();
        assert!(matches!(err, PneumoscanError::Validation(_)));
        let err = fixture.service.review("missing", "dr.grey", None).unwrap_err();
        assert!(matches!(err, PneumoscanError::NotFound(_)));
    }

    #[test]
    fn test_delete_removes_record_and_artifact() {
        let fixture = fixture(MockEngine::new(vec![1.0, 3.0]));
        let bytes = zero_xray_png();
        let record = fixture.service.submit(&request(&bytes)).unwrap();

        let artifact = fixture._upload_dir.path().join(&record.image_filename);
        assert!(artifact.exists());

        fixture.service.delete(&record.id).expect("Should delete");
        assert!(!artifact.exists());
        assert!(matches!(
            fixture.service.prediction(&record.id).unwrap_err(),
            PneumoscanError::NotFound(_)
        ));

        let err = fixture.service.delete(&record.id).unwrap_err();
        assert!(matches!(err, PneumoscanError::NotFound(_)));
    }

    #[test]
    fn test_artifact_extension_derivation() {
        assert_eq!(artifact_extension(Some("scan.PNG")), ".png");
        assert_eq!(artifact_extension(Some("scan.jpeg")), ".jpeg");
        assert_eq!(artifact_extension(Some("archive.tar.gz")), ".gz");
        assert_eq!(artifact_extension(Some("no_extension")), ".jpg");
        assert_eq!(artifact_extension(Some("weird.p/n")), ".jpg");
        assert_eq!(artifact_extension(None), ".jpg");
    }
}
