use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::fusion::FusionWeights;
use crate::physio::PhysioProfile;

/// Engine configuration
///
/// Every tunable the detection path reads lives here: fusion weights, the
/// trigger threshold, the physiological profile, and the classification
/// timeout. The pipeline treats a loaded config as read-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub schema_version: u32,

    /// Relative weights for the audio and physiological terms
    pub fusion: FusionWeights,

    /// Combined-score threshold above which an alert is raised
    pub trigger_threshold: f64,

    /// Physiological threshold bands and per-signal weights
    pub physio: PhysioProfile,

    /// Upper bound on a single classification call (ms)
    pub classify_timeout_ms: u64,

    /// Combined score at or above which severity is Critical
    pub severity_critical: f64,
    /// Combined score at or above which severity is High
    pub severity_high: f64,

    /// Path to the ensemble model artifact
    pub model_path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            schema_version: 1,
            fusion: FusionWeights::default(),
            trigger_threshold: 0.5,
            physio: PhysioProfile::default(),
            classify_timeout_ms: 2_000,
            severity_critical: 0.8,
            severity_high: 0.65,
            model_path: None,
        }
    }
}

impl EngineConfig {
    /// Load config from file, or create default
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content =
                std::fs::read_to_string(path).context("Failed to read config file")?;
            serde_json::from_str(&content).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content).context("Failed to write config file")
    }

    /// Get the default config directory
    pub fn default_config_dir() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Failed to get home directory")?;
        Ok(home.join(".distress-engine"))
    }

    /// Get the default models directory
    pub fn default_models_dir() -> Result<PathBuf> {
        Ok(Self::default_config_dir()?.join("models"))
    }

    /// Get the model artifact path
    pub fn get_model_path(&self) -> Result<PathBuf> {
        if let Some(ref path) = self.model_path {
            Ok(path.clone())
        } else {
            Ok(Self::default_models_dir()?.join("ensemble.json"))
        }
    }

    pub fn classify_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.classify_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.schema_version, 1);
        assert_eq!(config.trigger_threshold, 0.5);
        assert_eq!(config.classify_timeout_ms, 2_000);
        assert!(config.severity_critical > config.severity_high);
    }

    #[test]
    fn test_load_missing_file_yields_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::load(&dir.path().join("nope.json")).unwrap();
        assert_eq!(config.schema_version, 1);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = EngineConfig::default();
        config.trigger_threshold = 0.42;
        config.classify_timeout_ms = 750;
        config.save(&path).unwrap();

        let loaded = EngineConfig::load(&path).unwrap();
        assert_eq!(loaded.trigger_threshold, 0.42);
        assert_eq!(loaded.classify_timeout_ms, 750);
    }
}
