//! Audio stress classification.
//!
//! A weighted soft-voting ensemble over a fixed set of base classifier
//! kinds. The whole model is an explicitly constructed, immutable object
//! loaded from a JSON artifact; there is no global model state and no
//! randomness at inference time.

pub mod artifact;
pub mod ensemble;
pub mod model;

pub use artifact::{EnsembleMember, ModelArtifact, StandardScaler};
pub use ensemble::EnsembleClassifier;
pub use model::BaseClassifier;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from loading or applying the ensemble
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("Model artifact not found at {0}")]
    ArtifactUnavailable(std::path::PathBuf),

    #[error("Invalid model artifact: {0}")]
    ArtifactInvalid(String),

    #[error("Feature dimension mismatch: got {got}, model expects {expected}")]
    DimensionMismatch { got: usize, expected: usize },
}

/// Stress label for one audio clip.
///
/// `Unknown` means "no audio evidence" - invalid input or an unavailable
/// model - and must never be read as `Normal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StressLabel {
    Normal,
    Stressed,
    Unknown,
}

/// Classifier output: label plus the winning class's probability
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub label: StressLabel,
    pub confidence: f64,
}

impl ClassificationResult {
    /// The neutral "no audio evidence" result
    pub fn unknown() -> Self {
        Self {
            label: StressLabel::Unknown,
            confidence: 0.0,
        }
    }

    pub fn is_stressed(&self) -> bool {
        self.label == StressLabel::Stressed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_result() {
        let result = ClassificationResult::unknown();
        assert_eq!(result.label, StressLabel::Unknown);
        assert_eq!(result.confidence, 0.0);
        assert!(!result.is_stressed());
    }

    #[test]
    fn test_label_serde_names() {
        let json = serde_json::to_string(&StressLabel::Stressed).unwrap();
        assert_eq!(json, "\"stressed\"");
        let back: StressLabel = serde_json::from_str("\"unknown\"").unwrap();
        assert_eq!(back, StressLabel::Unknown);
    }
}
