//! Physiological threshold analysis.
//!
//! Scores heart rate, temperature and blood oxygen against a configurable
//! profile. Each signal ramps linearly from 0 at the edge of its normal
//! band to 1 at its alarm level, then saturates; the per-signal violations
//! are combined with the profile's weights into a single [0, 1] value.
//! Missing signals contribute nothing. Pure - no side effects, no I/O.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// One reading batch's vitals
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct VitalsSample {
    /// Beats per minute
    pub heart_rate: Option<f64>,
    /// Degrees Celsius
    pub temperature: Option<f64>,
    /// Blood oxygen saturation, percent
    pub spo2: Option<f64>,
}

impl VitalsSample {
    pub fn is_empty(&self) -> bool {
        self.heart_rate.is_none() && self.temperature.is_none() && self.spo2.is_none()
    }
}

/// Threshold bands and signal weights.
///
/// Heart rate and temperature alarm high, blood oxygen alarms low. Each
/// weight is the share of the combined score a fully violated signal can
/// claim; the defaults keep a 3:1:2 ratio between heart rate, temperature
/// and blood oxygen, normalized so the weights sum to 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhysioProfile {
    /// Upper edge of the normal heart-rate band (bpm)
    pub hr_normal_max: f64,
    /// Heart rate at which the violation saturates (bpm)
    pub hr_alarm: f64,
    pub weight_heart_rate: f64,

    /// Upper edge of the normal temperature band (C)
    pub temp_normal_max: f64,
    /// Temperature at which the violation saturates (C)
    pub temp_alarm: f64,
    pub weight_temperature: f64,

    /// Lower edge of the normal blood-oxygen band (%)
    pub spo2_normal_min: f64,
    /// Saturation level at which the violation saturates (%)
    pub spo2_alarm: f64,
    pub weight_spo2: f64,
}

impl Default for PhysioProfile {
    fn default() -> Self {
        Self {
            hr_normal_max: 100.0,
            hr_alarm: 110.0,
            weight_heart_rate: 0.5,

            temp_normal_max: 37.2,
            temp_alarm: 37.5,
            weight_temperature: 1.0 / 6.0,

            spo2_normal_min: 95.0,
            spo2_alarm: 90.0,
            weight_spo2: 1.0 / 3.0,
        }
    }
}

/// How much one signal contributed to the combined score
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SignalContribution {
    pub reading: f64,
    /// Violation level in [0, 1] before weighting
    pub violation: f64,
    /// Violation scaled by the signal's profile weight
    pub weighted: f64,
}

/// Combined physiological score with the per-signal breakdown.
///
/// Computed fresh per sample; never persisted on its own.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PhysiologicalScore {
    pub value: f64,
    pub heart_rate: Option<SignalContribution>,
    pub temperature: Option<SignalContribution>,
    pub spo2: Option<SignalContribution>,
}

/// Threshold analyzer over a fixed profile
#[derive(Debug, Clone, Default)]
pub struct PhysiologicalAnalyzer {
    profile: PhysioProfile,
}

impl PhysiologicalAnalyzer {
    pub fn new(profile: PhysioProfile) -> Self {
        Self { profile }
    }

    pub fn profile(&self) -> &PhysioProfile {
        &self.profile
    }

    /// Score one vitals sample
    pub fn score(&self, vitals: &VitalsSample) -> PhysiologicalScore {
        let p = &self.profile;

        let heart_rate = vitals.heart_rate.map(|bpm| {
            contribution(bpm, ramp_high(bpm, p.hr_normal_max, p.hr_alarm), p.weight_heart_rate)
        });
        let temperature = vitals.temperature.map(|c| {
            contribution(c, ramp_high(c, p.temp_normal_max, p.temp_alarm), p.weight_temperature)
        });
        let spo2 = vitals.spo2.map(|pct| {
            contribution(pct, ramp_low(pct, p.spo2_normal_min, p.spo2_alarm), p.weight_spo2)
        });

        let value = [&heart_rate, &temperature, &spo2]
            .into_iter()
            .flatten()
            .map(|c| c.weighted)
            .sum::<f64>()
            .clamp(0.0, 1.0);

        debug!(
            "Physio score {:.3} (hr {:?}, temp {:?}, spo2 {:?})",
            value,
            heart_rate.map(|c| c.violation),
            temperature.map(|c| c.violation),
            spo2.map(|c| c.violation)
        );

        PhysiologicalScore {
            value,
            heart_rate,
            temperature,
            spo2,
        }
    }
}

fn contribution(reading: f64, violation: f64, weight: f64) -> SignalContribution {
    SignalContribution {
        reading,
        violation,
        weighted: violation * weight,
    }
}

/// Linear ramp for signals that alarm high
fn ramp_high(value: f64, normal_max: f64, alarm: f64) -> f64 {
    if value <= normal_max {
        0.0
    } else if value >= alarm {
        1.0
    } else {
        (value - normal_max) / (alarm - normal_max)
    }
}

/// Linear ramp for signals that alarm low
fn ramp_low(value: f64, normal_min: f64, alarm: f64) -> f64 {
    if value >= normal_min {
        0.0
    } else if value <= alarm {
        1.0
    } else {
        (normal_min - value) / (normal_min - alarm)
    }
}
