//! Distress decision fusion.
//!
//! Combines the audio classifier's stressed-confidence with the
//! physiological score into a single [0, 1] distress score and applies the
//! trigger policy. Pure functions only - opening the alert is the
//! lifecycle manager's job.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::alert::AlertReason;
use crate::classifier::{ClassificationResult, StressLabel};
use crate::physio::PhysiologicalScore;

/// Relative weights for the audio and physiological terms
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FusionWeights {
    pub audio: f64,
    pub physio: f64,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            audio: 0.6,
            physio: 0.4,
        }
    }
}

/// The fused decision. Derived per evaluation and never persisted - only
/// the alert it may cause is durable.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DistressScore {
    pub combined: f64,
    pub manual_override: bool,
    pub triggered: bool,
}

/// Fuse one evaluation's evidence into a distress decision.
///
/// An absent or `unknown` classification removes the audio term entirely:
/// the physiological weight is renormalized to 1.0 for that evaluation
/// rather than treating missing audio as zero stress. A manual trigger
/// always fires regardless of the combined score.
pub fn decide(
    audio: Option<&ClassificationResult>,
    physio: &PhysiologicalScore,
    manual_trigger: bool,
    weights: &FusionWeights,
    trigger_threshold: f64,
) -> DistressScore {
    let audio_term = audio.and_then(|result| match result.label {
        StressLabel::Stressed => Some(result.confidence),
        StressLabel::Normal => Some(0.0),
        StressLabel::Unknown => None,
    });

    let combined = match audio_term {
        Some(stressed_confidence) => {
            let total = weights.audio + weights.physio;
            (stressed_confidence * weights.audio + physio.value * weights.physio) / total
        }
        // No audio evidence: the physiological term carries full weight
        None => physio.value,
    };
    let combined = combined.clamp(0.0, 1.0);

    let triggered = combined > trigger_threshold || manual_trigger;

    debug!(
        "Decision: combined={:.3} manual={} -> triggered={}",
        combined, manual_trigger, triggered
    );

    DistressScore {
        combined,
        manual_override: manual_trigger,
        triggered,
    }
}

/// Reason attached to an alert raised from this decision.
///
/// Manual always wins; otherwise the reason records whether the audio
/// classifier led the trigger or the vitals did.
pub fn alert_reason(audio: Option<&ClassificationResult>, manual_trigger: bool) -> AlertReason {
    if manual_trigger {
        AlertReason::ManualSos
    } else if audio.map(|a| a.is_stressed()).unwrap_or(false) {
        AlertReason::AutoStress
    } else {
        AlertReason::VitalsThreshold
    }
}
