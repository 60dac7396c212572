//! Weighted soft-voting ensemble.

use std::path::Path;
use tracing::debug;

use crate::audio::features::FeatureVector;

use super::artifact::{EnsembleMember, ModelArtifact, StandardScaler};
use super::{ClassificationResult, ClassifierError, StressLabel};

/// The trained ensemble, immutable after construction.
///
/// Soft voting: every member contributes its P(stressed) scaled by its
/// weight; the weights sum to 1, so the combined value is itself a
/// probability. Inference is deterministic - identical vectors through
/// identical weights always produce identical output.
pub struct EnsembleClassifier {
    scaler: StandardScaler,
    members: Vec<EnsembleMember>,
    feature_dim: usize,
}

impl EnsembleClassifier {
    /// Build the classifier from a validated artifact
    pub fn from_artifact(artifact: ModelArtifact) -> Result<Self, ClassifierError> {
        artifact.validate()?;
        Ok(Self {
            scaler: artifact.scaler,
            members: artifact.members,
            feature_dim: artifact.feature_dim,
        })
    }

    /// Load the artifact at `path` and build the classifier
    pub fn load(path: &Path) -> Result<Self, ClassifierError> {
        Self::from_artifact(ModelArtifact::load(path)?)
    }

    pub fn feature_dim(&self) -> usize {
        self.feature_dim
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Classify one feature vector.
    ///
    /// Returns `Stressed` when the weighted P(stressed) reaches 0.5,
    /// `Normal` otherwise; confidence is the winning class's weighted
    /// probability.
    pub fn classify(
        &self,
        features: &FeatureVector,
    ) -> Result<ClassificationResult, ClassifierError> {
        if features.dim() != self.feature_dim {
            return Err(ClassifierError::DimensionMismatch {
                got: features.dim(),
                expected: self.feature_dim,
            });
        }

        let scaled = self.scaler.transform(features.as_slice());

        let p_stressed: f64 = self
            .members
            .iter()
            .map(|member| {
                let (_, p) = member.model.predict_proba(&scaled);
                member.weight * p
            })
            .sum();
        let p_stressed = p_stressed.clamp(0.0, 1.0);

        let (label, confidence) = if p_stressed >= 0.5 {
            (StressLabel::Stressed, p_stressed)
        } else {
            (StressLabel::Normal, 1.0 - p_stressed)
        };

        debug!(
            "Ensemble vote: P(stressed)={:.4} -> {:?} ({:.4})",
            p_stressed, label, confidence
        );

        Ok(ClassificationResult { label, confidence })
    }
}
