//! Postprocessing: raw model scores to a calibrated classification result.

use std::collections::BTreeMap;

use crate::domain::InferenceResult;
use crate::{PneumoscanError, Result};

/// Converts a raw score vector into a labeled probability distribution.
#[derive(Debug, Clone)]
pub struct ResultPostprocessor {
    class_names: Vec<String>,
}

impl ResultPostprocessor {
    /// Create a postprocessor for the configured class list.
    #[must_use]
    pub fn new(class_names: Vec<String>) -> Self {
        Self { class_names }
    }

    /// Interpret raw scores as an [`InferenceResult`].
    ///
    /// Applies a numerically stable softmax, maps probabilities onto the
    /// configured class names (a score vector shorter than the class list
    /// leaves trailing classes at probability 0.0), and selects the argmax
    /// with ties broken by the lowest class index. Confidence is the
    /// selected probability at full precision; rounding is left to display
    /// layers.
    ///
    /// # Errors
    /// `Inference` if the score vector is empty or longer than the class
    /// list (the probability mass could not be attributed to named classes).
    pub fn interpret(
        &self,
        scores: &[f32],
        inference_seconds: f64,
        image_size: (u32, u32),
    ) -> Result<InferenceResult> {
        if scores.is_empty() {
            return Err(PneumoscanError::Inference(
                "model produced an empty score vector".to_string(),
            ));
        }
        if scores.len() > self.class_names.len() {
            return Err(PneumoscanError::Inference(format!(
                "model produced {} scores for {} classes",
                scores.len(),
                self.class_names.len()
            )));
        }

        let softmaxed = softmax(scores);

        // Align onto the class list; absent trailing entries stay at 0.0.
        let mut aligned = vec![0.0_f64; self.class_names.len()];
        aligned[..softmaxed.len()].copy_from_slice(&softmaxed);

        let mut selected = 0;
        for (index, probability) in aligned.iter().enumerate() {
            if *probability > aligned[selected] {
                selected = index;
            }
        }

        let probabilities: BTreeMap<String, f64> = self
            .class_names
            .iter()
            .cloned()
            .zip(aligned.iter().copied())
            .collect();

        Ok(InferenceResult {
            label: self.class_names[selected].clone(),
            confidence: aligned[selected],
            probabilities,
            inference_seconds,
            image_size,
        })
    }
}

/// Numerically stable softmax: subtract the maximum before exponentiating.
fn softmax(scores: &[f32]) -> Vec<f64> {
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exponentiated: Vec<f64> = scores
        .iter()
        .map(|&s| f64::from(s - max).exp())
        .collect();
    let sum: f64 = exponentiated.iter().sum();
    exponentiated.into_iter().map(|e| e / sum).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn postprocessor() -> ResultPostprocessor {
        ResultPostprocessor::new(vec!["NORMAL".to_string(), "PNEUMONIA".to_string()])
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let result = postprocessor()
            .interpret(&[2.5, -1.25], 0.01, (224, 224))
            .expect("Should interpret");
        let sum: f64 = result.probabilities.values().sum();
        assert!((sum - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_label_is_argmax_and_confidence_matches() {
        let result = postprocessor()
            .interpret(&[1.0, 3.0], 0.01, (224, 224))
            .expect("Should interpret");
        assert_eq!(result.label, "PNEUMONIA");
        assert_eq!(result.confidence, result.probabilities["PNEUMONIA"]);
        assert!(result.probabilities["PNEUMONIA"] > result.probabilities["NORMAL"]);
    }

    #[test]
    fn test_known_scores_give_known_probabilities() {
        // softmax([1, 3]) is the logistic pair (0.1192..., 0.8808...).
        let result = postprocessor()
            .interpret(&[1.0, 3.0], 0.0, (224, 224))
            .expect("Should interpret");
        assert!((result.probabilities["NORMAL"] - 0.119_202_922).abs() < 1e-6);
        assert!((result.probabilities["PNEUMONIA"] - 0.880_797_078).abs() < 1e-6);
    }

    #[test]
    fn test_tie_breaks_to_lowest_class_index() {
        let result = postprocessor()
            .interpret(&[0.5, 0.5], 0.0, (224, 224))
            .expect("Should interpret");
        assert_eq!(result.label, "NORMAL");
        assert!((result.confidence - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_short_score_vector_pads_with_zero() {
        let result = postprocessor()
            .interpret(&[4.2], 0.0, (100, 100))
            .expect("Should interpret");
        assert_eq!(result.label, "NORMAL");
        assert!((result.probabilities["NORMAL"] - 1.0).abs() < 1e-9);
        assert_eq!(result.probabilities["PNEUMONIA"], 0.0);
    }

    #[test]
    fn test_large_scores_do_not_overflow() {
        let result = postprocessor()
            .interpret(&[1000.0, 998.0], 0.0, (224, 224))
            .expect("Should interpret");
        assert_eq!(result.label, "NORMAL");
        let sum: f64 = result.probabilities.values().sum();
        assert!((sum - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_empty_and_oversized_scores_are_rejected() {
        assert!(postprocessor().interpret(&[], 0.0, (1, 1)).is_err());
        assert!(postprocessor().interpret(&[0.1, 0.2, 0.3], 0.0, (1, 1)).is_err());
    }
}
