//! Per-sample evaluation pipeline.
//!
//! Ties the analyzers, the decision engine and the lifecycle manager
//! together for one sensor event. Evaluations share only read-only state
//! (model weights, thresholds), so bursty ingestion for a device can run
//! them concurrently; the lifecycle manager serializes alert creation.
//!
//! Classification is the heavyweight stage and runs off the ingest task on
//! the blocking pool under a bounded timeout. A slow, failing or missing
//! classifier degrades to `unknown`; it can delay an evaluation by at most
//! the timeout and can never abort one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::alert::{
    Alert, AlertLifecycleManager, DeviceRegistry, GpsFix, LifecycleError, Severity,
    TriggerSnapshot,
};
use crate::audio::features::{FeatureConfig, FeatureExtractor};
use crate::audio::preprocess::ClipPreprocessor;
use crate::audio::resampler::{to_analysis_rate, ANALYSIS_SAMPLE_RATE};
use crate::audio::AudioError;
use crate::classifier::{ClassificationResult, EnsembleClassifier};
use crate::config::EngineConfig;
use crate::events::EventSender;
use crate::fusion::{alert_reason, decide, DistressScore};
use crate::physio::{PhysiologicalAnalyzer, PhysiologicalScore, VitalsSample};

/// A decoded audio clip as received from the ingestion boundary
#[derive(Debug, Clone)]
pub struct AudioClip {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// One reading batch from a device. Immutable once received; consumed
/// exactly once per evaluation.
#[derive(Debug, Clone)]
pub struct SensorSample {
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
    pub vitals: VitalsSample,
    pub gps: Option<GpsFix>,
    pub audio: Option<AudioClip>,
    pub manual_trigger: bool,
}

/// Everything one evaluation produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationOutcome {
    pub device_id: String,
    pub score: DistressScore,
    /// None when the sample carried no audio at all
    pub classification: Option<ClassificationResult>,
    pub physio: PhysiologicalScore,
    /// The open alert (new or deduplicated) when the decision triggered
    pub alert: Option<Alert>,
    /// True only when this evaluation actually created the alert
    pub alert_created: bool,
}

/// The assembled engine
pub struct DistressPipeline {
    config: EngineConfig,
    preprocessor: Arc<ClipPreprocessor>,
    extractor: Arc<FeatureExtractor>,
    classifier: Option<Arc<EnsembleClassifier>>,
    physio: PhysiologicalAnalyzer,
    alerts: Arc<AlertLifecycleManager>,
}

impl DistressPipeline {
    /// Assemble a pipeline.
    ///
    /// `classifier` is optional by design: without one (artifact missing,
    /// failed validation) every audio clip classifies as `unknown` and
    /// vitals/manual triggers still work.
    pub fn new(
        config: EngineConfig,
        classifier: Option<EnsembleClassifier>,
        alerts: Arc<AlertLifecycleManager>,
    ) -> Result<Self, AudioError> {
        let preprocessor = Arc::new(ClipPreprocessor::new(ANALYSIS_SAMPLE_RATE)?);
        let extractor = Arc::new(FeatureExtractor::new(FeatureConfig::default())?);
        let physio = PhysiologicalAnalyzer::new(config.physio.clone());

        if classifier.is_none() {
            warn!("No classifier loaded; audio will classify as unknown");
        }

        Ok(Self {
            config,
            preprocessor,
            extractor,
            classifier: classifier.map(Arc::new),
            physio,
            alerts,
        })
    }

    /// Convenience constructor wiring a fresh registry and event channel
    pub fn with_registry(
        config: EngineConfig,
        classifier: Option<EnsembleClassifier>,
        registry: Arc<DeviceRegistry>,
        events: EventSender,
    ) -> Result<Self, AudioError> {
        let alerts = Arc::new(AlertLifecycleManager::with_events(registry, events));
        Self::new(config, classifier, alerts)
    }

    pub fn alerts(&self) -> &Arc<AlertLifecycleManager> {
        &self.alerts
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Evaluate one sensor sample end to end.
    ///
    /// Classifier and analyzer failures never surface from here - they
    /// become neutral inputs to the decision. Lifecycle errors (unknown
    /// device) do surface; they are caller errors, not signal noise.
    pub async fn evaluate(
        &self,
        sample: SensorSample,
    ) -> Result<EvaluationOutcome, LifecycleError> {
        let classification = match sample.audio {
            Some(ref clip) => Some(self.classify_bounded(clip.clone()).await),
            None => None,
        };

        let physio = self.physio.score(&sample.vitals);
        let score = decide(
            classification.as_ref(),
            &physio,
            sample.manual_trigger,
            &self.config.fusion,
            self.config.trigger_threshold,
        );

        debug!(
            "Evaluated sample from {} at {}: combined={:.3} triggered={}",
            sample.device_id, sample.timestamp, score.combined, score.triggered
        );

        let (alert, alert_created) = if score.triggered {
            let reason = alert_reason(classification.as_ref(), sample.manual_trigger);
            let severity = Severity::from_score(
                score.combined,
                score.manual_override,
                self.config.severity_critical,
                self.config.severity_high,
            );
            let opened = self.alerts.open_if_absent(
                &sample.device_id,
                reason,
                severity,
                score.combined,
                TriggerSnapshot {
                    gps: sample.gps,
                    vitals: sample.vitals,
                },
            )?;
            (Some(opened.alert), opened.created)
        } else {
            (None, false)
        };

        Ok(EvaluationOutcome {
            device_id: sample.device_id,
            score,
            classification,
            physio,
            alert,
            alert_created,
        })
    }

    /// Run the classification stage with its mandatory bound.
    ///
    /// Off-thread because feature extraction and the ensemble are far
    /// heavier than the vitals path; bounded because a wedged classifier
    /// must not stall distress evaluation.
    async fn classify_bounded(&self, clip: AudioClip) -> ClassificationResult {
        let Some(classifier) = self.classifier.clone() else {
            return ClassificationResult::unknown();
        };
        let preprocessor = self.preprocessor.clone();
        let extractor = self.extractor.clone();

        let work = tokio::task::spawn_blocking(move || {
            classify_clip(&preprocessor, &extractor, &classifier, clip)
        });

        match tokio::time::timeout(self.config.classify_timeout(), work).await {
            Ok(Ok(Ok(result))) => result,
            Ok(Ok(Err(e))) => {
                warn!("Classification degraded to unknown: {}", e);
                ClassificationResult::unknown()
            }
            Ok(Err(join_err)) => {
                warn!("Classification task failed: {}", join_err);
                ClassificationResult::unknown()
            }
            Err(_) => {
                warn!(
                    "Classification timed out after {:?}",
                    self.config.classify_timeout()
                );
                ClassificationResult::unknown()
            }
        }
    }
}

/// Resample, preprocess, extract and classify one clip.
///
/// Synchronous worker for the blocking pool; the CLI also calls it
/// directly.
pub fn classify_clip(
    preprocessor: &ClipPreprocessor,
    extractor: &FeatureExtractor,
    classifier: &EnsembleClassifier,
    clip: AudioClip,
) -> Result<ClassificationResult, String> {
    let mut samples = to_analysis_rate(&clip.samples, clip.sample_rate)
        .map_err(|e| e.to_string())?;
    preprocessor.process(&mut samples);

    let features = extractor.extract(&samples).map_err(|e| e.to_string())?;
    let result = classifier.classify(&features).map_err(|e| e.to_string())?;

    info!(
        "Audio classified {:?} (confidence {:.3})",
        result.label, result.confidence
    );
    Ok(result)
}
