//! On-disk model artifact.
//!
//! A versioned JSON document holding everything inference needs: the
//! feature scaler, the ensemble members, and their voting weights. The
//! artifact is produced by the offline training tooling and validated in
//! full at load time so inference never meets a malformed model.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use super::model::BaseClassifier;
use super::ClassifierError;

/// Tolerance for the ensemble weight sum
const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Per-feature standardization fit alongside the ensemble
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f32>,
    pub std: Vec<f32>,
}

impl StandardScaler {
    /// (x - mean) / std, with zero-variance features left centered only
    pub fn transform(&self, features: &[f32]) -> Vec<f32> {
        features
            .iter()
            .zip(self.mean.iter().zip(self.std.iter()))
            .map(|(x, (m, s))| {
                let centered = x - m;
                if *s > f32::EPSILON {
                    centered / s
                } else {
                    centered
                }
            })
            .collect()
    }
}

/// One ensemble member: a base classifier and its voting weight
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleMember {
    pub weight: f64,
    pub model: BaseClassifier,
}

/// The complete trained model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub schema_version: u32,
    pub feature_dim: usize,
    pub scaler: StandardScaler,
    pub members: Vec<EnsembleMember>,
}

impl ModelArtifact {
    /// Load and validate an artifact from disk
    pub fn load(path: &Path) -> Result<Self, ClassifierError> {
        if !path.exists() {
            return Err(ClassifierError::ArtifactUnavailable(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ClassifierError::ArtifactInvalid(e.to_string()))?;
        let artifact: Self = serde_json::from_str(&content)
            .map_err(|e| ClassifierError::ArtifactInvalid(e.to_string()))?;

        artifact.validate()?;
        info!(
            "Loaded model artifact from {:?}: {} members, {} features",
            path,
            artifact.members.len(),
            artifact.feature_dim
        );
        Ok(artifact)
    }

    /// Save an artifact (used by training tooling and tests)
    pub fn save(&self, path: &Path) -> Result<(), ClassifierError> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ClassifierError::ArtifactInvalid(e.to_string()))?;
        std::fs::write(path, content)
            .map_err(|e| ClassifierError::ArtifactInvalid(e.to_string()))
    }

    /// Check weight sum, scaler shape and every member's internal shapes
    pub fn validate(&self) -> Result<(), ClassifierError> {
        if self.members.is_empty() {
            return Err(ClassifierError::ArtifactInvalid(
                "ensemble has no members".to_string(),
            ));
        }

        let weight_sum: f64 = self.members.iter().map(|m| m.weight).sum();
        if (weight_sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(ClassifierError::ArtifactInvalid(format!(
                "ensemble weights sum to {}, expected 1.0",
                weight_sum
            )));
        }
        if self.members.iter().any(|m| m.weight < 0.0) {
            return Err(ClassifierError::ArtifactInvalid(
                "negative ensemble weight".to_string(),
            ));
        }

        if self.scaler.mean.len() != self.feature_dim
            || self.scaler.std.len() != self.feature_dim
        {
            return Err(ClassifierError::ArtifactInvalid(format!(
                "scaler shape {}/{} does not match feature dim {}",
                self.scaler.mean.len(),
                self.scaler.std.len(),
                self.feature_dim
            )));
        }

        for member in &self.members {
            member
                .model
                .validate(self.feature_dim)
                .map_err(ClassifierError::ArtifactInvalid)?;
        }

        Ok(())
    }
}

#[cfg(test)]
impl ModelArtifact {
    /// Single-member ensemble that labels every clip stressed at the given
    /// confidence: a logistic model with zero weights and a bias at the
    /// matching log-odds. Sized for the default feature layout.
    pub(crate) fn constant_stressed_fixture(confidence: f64) -> Self {
        use crate::audio::features::FeatureConfig;
        use crate::classifier::model::LogisticModel;

        let dim = FeatureConfig::default().dim();
        let bias = (confidence / (1.0 - confidence)).ln() as f32;
        Self {
            schema_version: 1,
            feature_dim: dim,
            scaler: StandardScaler {
                mean: vec![0.0; dim],
                std: vec![1.0; dim],
            },
            members: vec![EnsembleMember {
                weight: 1.0,
                model: BaseClassifier::Logistic(LogisticModel {
                    weights: vec![0.0; dim],
                    bias,
                }),
            }],
        }
    }
}
