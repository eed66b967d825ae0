//! Prediction record types and the review state machine.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Output of a single classifier forward pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceResult {
    /// Predicted class name.
    pub label: String,

    /// Probability of the predicted class, in `[0, 1]`.
    pub confidence: f64,

    /// Probability per configured class; entries sum to 1 within 1e-6.
    pub probabilities: BTreeMap<String, f64>,

    /// Wall-clock duration of the model call only, in seconds.
    pub inference_seconds: f64,

    /// Width and height of the source image.
    pub image_size: (u32, u32),
}

/// Clinical review state of a prediction.
///
/// `reviewed_by` and `reviewed_at` are populated exactly when `reviewed` is
/// true. Re-review overwrites both without keeping history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewState {
    pub reviewed: bool,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl ReviewState {
    /// A review recorded now by the given reviewer.
    #[must_use]
    pub fn reviewed_by(reviewer: impl Into<String>) -> Self {
        Self {
            reviewed: true,
            reviewed_by: Some(reviewer.into()),
            reviewed_at: Some(chrono::Utc::now()),
        }
    }

    /// Check the reviewed/metadata coupling invariant.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.reviewed == (self.reviewed_by.is_some() && self.reviewed_at.is_some())
            && (self.reviewed || (self.reviewed_by.is_none() && self.reviewed_at.is_none()))
    }
}

/// A persisted classification of one uploaded X-ray image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionRecord {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Reference to a patient, validated at creation time.
    pub patient_id: Option<i64>,

    /// Name of the stored image artifact.
    pub image_filename: String,

    /// Filename as uploaded by the caller.
    pub original_filename: Option<String>,

    /// Predicted class name.
    pub label: String,

    /// Probability of the predicted class.
    pub confidence: f64,

    /// Probability per configured class.
    pub probabilities: BTreeMap<String, f64>,

    /// Duration of the model call, in seconds.
    pub inference_seconds: f64,

    /// Width and height of the source image.
    pub image_size: (u32, u32),

    /// Free-text notes from the clinician.
    pub clinical_notes: Option<String>,

    /// Review workflow state.
    pub review: ReviewState,

    /// Timestamp of creation.
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl PredictionRecord {
    /// Assemble an unreviewed record from a completed inference.
    #[must_use]
    pub fn new(
        id: String,
        patient_id: Option<i64>,
        image_filename: String,
        original_filename: Option<String>,
        result: InferenceResult,
        clinical_notes: Option<String>,
    ) -> Self {
        Self {
            id,
            patient_id,
            image_filename,
            original_filename,
            label: result.label,
            confidence: result.confidence,
            probabilities: result.probabilities,
            inference_seconds: result.inference_seconds,
            image_size: result.image_size,
            clinical_notes,
            review: ReviewState::default(),
            created_at: chrono::Utc::now(),
        }
    }
}

/// Generate a record identifier: UUID v4 from a CSPRNG.
///
/// Uses ChaCha20Rng seeded from OS entropy so identifiers are collision
/// resistant and unpredictable on all platforms.
#[must_use]
pub fn new_record_id() -> String {
    use rand::Rng;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    let mut rng = ChaCha20Rng::from_entropy();
    let bytes: [u8; 16] = rng.gen();

    format!(
        "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
        bytes[0], bytes[1], bytes[2], bytes[3],
        bytes[4], bytes[5],
        (bytes[6] & 0x0f) | 0x40, bytes[7],
        (bytes[8] & 0x3f) | 0x80, bytes[9],
        bytes[10], bytes[11], bytes[12], bytes[13], bytes[14], bytes[15]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_result() -> InferenceResult {
        let mut probabilities = BTreeMap::new();
        probabilities.insert("NORMAL".to_string(), 0.25);
        probabilities.insert("PNEUMONIA".to_string(), 0.75);
        InferenceResult {
            label: "PNEUMONIA".to_string(),
            confidence: 0.75,
            probabilities,
            inference_seconds: 0.042,
            image_size: (640, 480),
        }
    }

    #[test]
    fn test_new_record_starts_unreviewed() {
        let record = PredictionRecord::new(
            new_record_id(),
            None,
            "abc.png".to_string(),
            Some("xray.png".to_string()),
            sample_result(),
            None,
        );

        assert!(!record.review.reviewed);
        assert!(record.review.is_consistent());
        assert_eq!(record.label, "PNEUMONIA");
        assert_eq!(record.confidence, record.probabilities["PNEUMONIA"]);
    }

    #[test]
    fn test_review_state_couples_metadata() {
        let review = ReviewState::reviewed_by("dr.house");
        assert!(review.reviewed);
        assert_eq!(review.reviewed_by.as_deref(), Some("dr.house"));
        assert!(review.reviewed_at.is_some());
        assert!(review.is_consistent());

        let inconsistent = ReviewState {
            reviewed: true,
            reviewed_by: None,
            reviewed_at: None,
        };
        assert!(!inconsistent.is_consistent());
    }

    #[test]
    fn test_record_id_generation() {
        let first = new_record_id();
        let second = new_record_id();
        assert_ne!(first, second);
        assert_eq!(first.len(), 36); // UUID format with dashes
    }
}
