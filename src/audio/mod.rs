//! Audio ingestion path: resampling, preprocessing, feature extraction.

pub mod features;
pub mod preprocess;
pub mod resampler;

pub use features::{FeatureConfig, FeatureExtractor, FeatureVector};
pub use preprocess::ClipPreprocessor;
pub use resampler::{ClipResampler, ANALYSIS_SAMPLE_RATE};

use thiserror::Error;

/// Errors from the audio analysis path.
///
/// `InsufficientAudio` is the only variant callers are expected to branch
/// on; the pipeline maps every variant to an `unknown` classification.
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Audio clip too short: {samples} samples (minimum {min})")]
    InsufficientAudio { samples: usize, min: usize },

    #[error("Resampling failed: {0}")]
    Resample(String),

    #[error("FFT failed: {0}")]
    Fft(String),

    #[error("Invalid audio: {0}")]
    InvalidAudio(String),
}
