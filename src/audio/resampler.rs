use rubato::{FftFixedIn, Resampler};
use tracing::debug;

use super::AudioError;

/// Sample rate all analysis runs at
pub const ANALYSIS_SAMPLE_RATE: u32 = 16000;

/// Audio resampler for converting clip sample rates to 16kHz
pub struct ClipResampler {
    resampler: FftFixedIn<f32>,
    input_buffer: Vec<Vec<f32>>,
    output_buffer: Vec<Vec<f32>>,
    input_frames: usize,
    ratio: f64,
}

impl ClipResampler {
    /// Create a new resampler from the source sample rate to 16kHz
    pub fn new(source_sample_rate: u32) -> Result<Self, AudioError> {
        let ratio = ANALYSIS_SAMPLE_RATE as f64 / source_sample_rate as f64;

        debug!(
            "Creating resampler: {} Hz -> {} Hz (ratio: {:.4})",
            source_sample_rate, ANALYSIS_SAMPLE_RATE, ratio
        );

        // Use 1024 input frames as a reasonable chunk size
        let input_frames = 1024;
        let channels = 1; // Mono

        let resampler = FftFixedIn::new(
            source_sample_rate as usize,
            ANALYSIS_SAMPLE_RATE as usize,
            input_frames,
            2, // sub_chunks for quality
            channels,
        )
        .map_err(|e| AudioError::Resample(e.to_string()))?;

        // Pre-allocate buffers
        let input_buffer = vec![vec![0.0f32; input_frames]; channels];
        let output_buffer = resampler.output_buffer_allocate(true);

        Ok(Self {
            resampler,
            input_buffer,
            output_buffer,
            input_frames,
            ratio,
        })
    }

    /// Resample a whole clip to the analysis rate.
    ///
    /// The clip is fed through in fixed-size chunks; the tail is
    /// zero-padded to fill the final chunk, which adds at most one chunk
    /// of near-silence at the end of the output.
    pub fn resample_clip(&mut self, input: &[f32]) -> Result<Vec<f32>, AudioError> {
        self.resampler.reset();

        let mut output =
            Vec::with_capacity((input.len() as f64 * self.ratio) as usize + 1024);

        for chunk in input.chunks(self.input_frames) {
            self.input_buffer[0][..chunk.len()].copy_from_slice(chunk);
            self.input_buffer[0][chunk.len()..].fill(0.0);

            let (_, output_frames) = self
                .resampler
                .process_into_buffer(&self.input_buffer, &mut self.output_buffer, None)
                .map_err(|e| AudioError::Resample(e.to_string()))?;

            output.extend_from_slice(&self.output_buffer[0][..output_frames]);
        }

        Ok(output)
    }
}

/// Bring a mono clip to the 16kHz analysis rate, resampling only if needed.
pub fn to_analysis_rate(samples: &[f32], source_sample_rate: u32) -> Result<Vec<f32>, AudioError> {
    if source_sample_rate == ANALYSIS_SAMPLE_RATE {
        return Ok(samples.to_vec());
    }
    ClipResampler::new(source_sample_rate)?.resample_clip(samples)
}
