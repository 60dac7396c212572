//! Acoustic feature extraction for stress classification.
//!
//! Turns a preprocessed 16kHz mono clip into a fixed-order feature vector:
//! per-frame MFCCs, chroma bins, log-mel bands, spectral-contrast bands and
//! zero-crossing rate, pooled to mean and standard deviation over the clip.
//!
//! The concatenation order is load-bearing: trained classifiers address the
//! vector purely positionally, so the layout here must match the layout the
//! model artifact was fit against.

use realfft::{RealFftPlanner, RealToComplex};
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;
use std::sync::Arc;
use tracing::debug;

use super::AudioError;

/// Feature extraction parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureConfig {
    pub sample_rate: u32,
    pub n_fft: usize,
    pub hop_length: usize,
    pub n_mfcc: usize,
    pub n_chroma: usize,
    pub n_mels: usize,
    pub n_contrast_bands: usize,
    /// Lowest band edge for spectral contrast (Hz)
    pub contrast_fmin: f32,
    /// Offset added before taking logs of spectral energy
    pub log_offset: f32,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            n_fft: 2048,
            hop_length: 512,
            n_mfcc: 40,
            n_chroma: 12,
            n_mels: 128,
            n_contrast_bands: 7,
            contrast_fmin: 200.0,
            log_offset: 1e-10,
        }
    }
}

impl FeatureConfig {
    /// Total vector dimension: mean + std for every coefficient
    pub fn dim(&self) -> usize {
        2 * (self.n_mfcc + self.n_chroma + self.n_mels + self.n_contrast_bands + 1)
    }

    /// Shortest clip the extractor accepts (one analysis window)
    pub fn min_samples(&self) -> usize {
        self.n_fft
    }
}

/// Fixed-dimension feature vector derived from one audio clip.
///
/// Discarded after classification; never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    values: Vec<f32>,
}

impl FeatureVector {
    pub fn dim(&self) -> usize {
        self.values.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    #[cfg(test)]
    pub fn from_values(values: Vec<f32>) -> Self {
        Self { values }
    }
}

/// Feature extractor with pre-computed filterbank, DCT basis and FFT plan.
///
/// `extract` takes `&self` and allocates its scratch per call, so one
/// extractor can serve concurrent evaluations.
pub struct FeatureExtractor {
    config: FeatureConfig,
    fft: Arc<dyn RealToComplex<f32>>,
    window: Vec<f32>,
    mel_filterbank: Vec<Vec<f32>>,
    /// DCT-II (orthonormal) basis, `n_mfcc` rows over `n_mels` columns
    dct_basis: Vec<Vec<f32>>,
    /// Pitch class per FFT bin; None for DC and sub-audible bins
    chroma_map: Vec<Option<usize>>,
    /// Half-open FFT-bin ranges for the contrast bands
    contrast_bands: Vec<(usize, usize)>,
}

impl FeatureExtractor {
    pub fn new(config: FeatureConfig) -> Result<Self, AudioError> {
        if config.n_fft == 0 || config.hop_length == 0 {
            return Err(AudioError::InvalidAudio(
                "n_fft and hop_length must be nonzero".to_string(),
            ));
        }

        let n_bins = config.n_fft / 2 + 1;

        // Hann window
        let window: Vec<f32> = (0..config.n_fft)
            .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / (config.n_fft - 1) as f32).cos()))
            .collect();

        let mel_filterbank = create_mel_filterbank(
            config.n_mels,
            n_bins,
            config.sample_rate as f32,
            0.0,
            config.sample_rate as f32 / 2.0,
        );

        let dct_basis = create_dct_basis(config.n_mfcc, config.n_mels);
        let chroma_map = create_chroma_map(n_bins, config.n_fft, config.sample_rate as f32);
        let contrast_bands = create_contrast_bands(
            config.n_contrast_bands,
            n_bins,
            config.n_fft,
            config.sample_rate as f32,
            config.contrast_fmin,
        );

        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(config.n_fft);

        debug!(
            "Feature extractor ready: {} dims over {} mel bands",
            config.dim(),
            config.n_mels
        );

        Ok(Self {
            config,
            fft,
            window,
            mel_filterbank,
            dct_basis,
            chroma_map,
            contrast_bands,
        })
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Extract the full feature vector from a 16kHz mono clip.
    ///
    /// Clips shorter than one analysis window fail with
    /// `InsufficientAudio`; anything longer produces a finite vector, no
    /// matter how degenerate the signal. Non-finite input samples are
    /// treated as silence.
    pub fn extract(&self, samples: &[f32]) -> Result<FeatureVector, AudioError> {
        let cfg = &self.config;
        if samples.len() < cfg.min_samples() {
            return Err(AudioError::InsufficientAudio {
                samples: samples.len(),
                min: cfg.min_samples(),
            });
        }

        let n_frames = 1 + (samples.len() - cfg.n_fft) / cfg.hop_length;
        let n_bins = cfg.n_fft / 2 + 1;

        let mut fft_input = vec![0.0f32; cfg.n_fft];
        let mut fft_output = vec![realfft::num_complex::Complex::new(0.0f32, 0.0); n_bins];
        let mut power_spec = vec![0.0f32; n_bins];

        let mut mfcc_frames = Vec::with_capacity(n_frames);
        let mut chroma_frames = Vec::with_capacity(n_frames);
        let mut mel_frames = Vec::with_capacity(n_frames);
        let mut contrast_frames = Vec::with_capacity(n_frames);
        let mut zcr_frames = Vec::with_capacity(n_frames);

        for frame_idx in 0..n_frames {
            let start = frame_idx * cfg.hop_length;
            let frame = &samples[start..start + cfg.n_fft];

            for (i, (&sample, &w)) in frame.iter().zip(self.window.iter()).enumerate() {
                fft_input[i] = if sample.is_finite() { sample * w } else { 0.0 };
            }

            self.fft
                .process(&mut fft_input, &mut fft_output)
                .map_err(|e| AudioError::Fft(e.to_string()))?;

            for (p, c) in power_spec.iter_mut().zip(fft_output.iter()) {
                *p = c.re * c.re + c.im * c.im;
            }

            let mel_frame = self.mel_frame(&power_spec);
            mfcc_frames.push(self.mfcc_frame(&mel_frame));
            chroma_frames.push(self.chroma_frame(&power_spec));
            contrast_frames.push(self.contrast_frame(&power_spec));
            mel_frames.push(mel_frame);
            zcr_frames.push(vec![zero_crossing_rate(frame)]);
        }

        let mut values = Vec::with_capacity(cfg.dim());
        append_mean_std(&mut values, &mfcc_frames, cfg.n_mfcc);
        append_mean_std(&mut values, &chroma_frames, cfg.n_chroma);
        append_mean_std(&mut values, &mel_frames, cfg.n_mels);
        append_mean_std(&mut values, &contrast_frames, cfg.n_contrast_bands);
        append_mean_std(&mut values, &zcr_frames, 1);

        debug_assert_eq!(values.len(), cfg.dim());
        Ok(FeatureVector { values })
    }

    /// Log-mel energies for one power spectrum
    fn mel_frame(&self, power_spec: &[f32]) -> Vec<f32> {
        self.mel_filterbank
            .iter()
            .map(|filter| {
                let energy: f32 = filter
                    .iter()
                    .zip(power_spec.iter())
                    .map(|(f, p)| f * p)
                    .sum();
                (energy + self.config.log_offset).ln()
            })
            .collect()
    }

    /// DCT of the log-mel frame
    fn mfcc_frame(&self, mel_frame: &[f32]) -> Vec<f32> {
        self.dct_basis
            .iter()
            .map(|row| row.iter().zip(mel_frame.iter()).map(|(b, m)| b * m).sum())
            .collect()
    }

    /// Power folded onto pitch classes, normalized to the frame maximum
    fn chroma_frame(&self, power_spec: &[f32]) -> Vec<f32> {
        let mut chroma = vec![0.0f32; self.config.n_chroma];
        for (bin, class) in self.chroma_map.iter().enumerate() {
            if let Some(class) = class {
                if let Some(slot) = chroma.get_mut(*class) {
                    *slot += power_spec[bin];
                }
            }
        }
        let max = chroma.iter().fold(0.0f32, |m, v| m.max(*v));
        if max > 0.0 {
            for v in chroma.iter_mut() {
                *v /= max;
            }
        }
        chroma
    }

    /// Peak-to-valley log contrast per octave band
    fn contrast_frame(&self, power_spec: &[f32]) -> Vec<f32> {
        let off = self.config.log_offset;
        self.contrast_bands
            .iter()
            .map(|&(start, end)| {
                let mut band: Vec<f32> = power_spec[start..end].to_vec();
                band.sort_by(|a, b| a.total_cmp(b));

                // Mean of the top and bottom 2% of bins, at least one each
                let q = ((band.len() as f32 * 0.02).round() as usize).max(1);
                let valley: f32 = band[..q].iter().sum::<f32>() / q as f32;
                let peak: f32 = band[band.len() - q..].iter().sum::<f32>() / q as f32;
                (peak + off).ln() - (valley + off).ln()
            })
            .collect()
    }
}

/// Rate of sign changes across a frame, in [0, 1]
fn zero_crossing_rate(frame: &[f32]) -> f32 {
    if frame.len() < 2 {
        return 0.0;
    }
    let crossings = frame
        .windows(2)
        .filter(|w| (w[0] >= 0.0) != (w[1] >= 0.0))
        .count();
    crossings as f32 / (frame.len() - 1) as f32
}

/// Append per-coefficient mean then standard deviation over all frames
fn append_mean_std(out: &mut Vec<f32>, frames: &[Vec<f32>], dim: usize) {
    let n = frames.len() as f32;
    let mut means = vec![0.0f32; dim];
    for frame in frames {
        for (m, v) in means.iter_mut().zip(frame.iter()) {
            *m += v;
        }
    }
    for m in means.iter_mut() {
        *m /= n;
    }

    let mut stds = vec![0.0f32; dim];
    for frame in frames {
        for ((s, v), m) in stds.iter_mut().zip(frame.iter()).zip(means.iter()) {
            let d = v - m;
            *s += d * d;
        }
    }
    for s in stds.iter_mut() {
        *s = (*s / n).sqrt();
    }

    out.extend_from_slice(&means);
    out.extend_from_slice(&stds);
}

/// Convert frequency to mel scale
fn hz_to_mel(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

/// Convert mel scale to frequency
fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10.0_f32.powf(mel / 2595.0) - 1.0)
}

/// Create a triangular mel filterbank matrix
fn create_mel_filterbank(
    n_mels: usize,
    n_fft_bins: usize,
    sample_rate: f32,
    fmin: f32,
    fmax: f32,
) -> Vec<Vec<f32>> {
    let mel_min = hz_to_mel(fmin);
    let mel_max = hz_to_mel(fmax);

    // n_mels + 2 equally spaced points in mel scale
    let mel_points: Vec<f32> = (0..=n_mels + 1)
        .map(|i| mel_min + (mel_max - mel_min) * (i as f32) / ((n_mels + 1) as f32))
        .collect();

    let hz_points: Vec<f32> = mel_points.iter().map(|&m| mel_to_hz(m)).collect();

    let fft_bin_points: Vec<f32> = hz_points
        .iter()
        .map(|&hz| (n_fft_bins as f32 - 1.0) * hz / (sample_rate / 2.0))
        .collect();

    let mut filterbank = Vec::with_capacity(n_mels);

    for i in 0..n_mels {
        let mut filter = vec![0.0f32; n_fft_bins];

        let left = fft_bin_points[i];
        let center = fft_bin_points[i + 1];
        let right = fft_bin_points[i + 2];

        for (bin, weight) in filter.iter_mut().enumerate() {
            let bin_f = bin as f32;

            if bin_f >= left && bin_f < center {
                // Rising edge
                *weight = (bin_f - left) / (center - left);
            } else if bin_f >= center && bin_f <= right {
                // Falling edge
                *weight = (right - bin_f) / (right - center);
            }
        }

        filterbank.push(filter);
    }

    filterbank
}

/// Orthonormal DCT-II basis with `n_out` rows over `n_in` inputs
fn create_dct_basis(n_out: usize, n_in: usize) -> Vec<Vec<f32>> {
    let n = n_in as f32;
    (0..n_out)
        .map(|k| {
            let scale = if k == 0 {
                (1.0 / n).sqrt()
            } else {
                (2.0 / n).sqrt()
            };
            (0..n_in)
                .map(|i| scale * (PI / n * (i as f32 + 0.5) * k as f32).cos())
                .collect()
        })
        .collect()
}

/// Map each FFT bin to its pitch class (A440 reference)
fn create_chroma_map(n_bins: usize, n_fft: usize, sample_rate: f32) -> Vec<Option<usize>> {
    (0..n_bins)
        .map(|bin| {
            let freq = bin as f32 * sample_rate / n_fft as f32;
            if freq < 20.0 {
                return None;
            }
            let midi = 69.0 + 12.0 * (freq / 440.0).log2();
            let class = (midi.round() as i64).rem_euclid(12) as usize;
            Some(class)
        })
        .collect()
}

/// Octave-scaled sub-band bin ranges for spectral contrast
fn create_contrast_bands(
    n_bands: usize,
    n_bins: usize,
    n_fft: usize,
    sample_rate: f32,
    fmin: f32,
) -> Vec<(usize, usize)> {
    let nyquist = sample_rate / 2.0;
    let hz_to_bin = |hz: f32| -> usize {
        ((hz / nyquist) * (n_bins as f32 - 1.0)).round() as usize
    };

    // Edges: 0, fmin, 2*fmin, ... then the nyquist closes the last band
    let mut edges_hz: Vec<f32> = vec![0.0];
    for i in 0..n_bands - 1 {
        edges_hz.push((fmin * 2.0f32.powi(i as i32)).min(nyquist));
    }
    edges_hz.push(nyquist);

    let mut bands = Vec::with_capacity(n_bands);
    let mut prev_end = 0usize;
    for w in edges_hz.windows(2) {
        let start = hz_to_bin(w[0]).max(prev_end);
        let end = hz_to_bin(w[1]).max(start + 1).min(n_bins);
        bands.push((start, end));
        prev_end = end;
    }
    bands
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(freq: f32, n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| (2.0 * PI * freq * i as f32 / 16000.0).sin() * 0.5)
            .collect()
    }

    #[test]
    fn test_hz_to_mel_roundtrip() {
        for hz in [100.0, 500.0, 1000.0, 2000.0, 4000.0, 8000.0] {
            let back = mel_to_hz(hz_to_mel(hz));
            assert!((hz - back).abs() < 1e-2, "Roundtrip failed for {} Hz", hz);
        }
    }

    #[test]
    fn test_mel_filterbank_shape() {
        let filterbank = create_mel_filterbank(128, 1025, 16000.0, 0.0, 8000.0);
        assert_eq!(filterbank.len(), 128);
        for filter in &filterbank {
            assert_eq!(filter.len(), 1025);
            assert!(filter.iter().all(|w| *w >= 0.0));
            assert!(filter.iter().sum::<f32>() > 0.0);
        }
    }

    #[test]
    fn test_contrast_bands_cover_spectrum() {
        let bands = create_contrast_bands(7, 1025, 2048, 16000.0, 200.0);
        assert_eq!(bands.len(), 7);
        for (start, end) in &bands {
            assert!(end > start);
            assert!(*end <= 1025);
        }
        // Bands are contiguous and ordered
        for w in bands.windows(2) {
            assert!(w[1].0 >= w[0].1);
        }
    }

    #[test]
    fn test_vector_dimension() {
        let extractor = FeatureExtractor::new(FeatureConfig::default()).unwrap();
        let features = extractor.extract(&tone(440.0, 16000)).unwrap();
        assert_eq!(features.dim(), 376);
        assert_eq!(features.dim(), extractor.config().dim());
    }

    #[test]
    fn test_silence_produces_finite_vector() {
        let extractor = FeatureExtractor::new(FeatureConfig::default()).unwrap();
        let features = extractor.extract(&vec![0.0f32; 16000]).unwrap();
        assert!(features.as_slice().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_garbled_input_is_sanitized() {
        let extractor = FeatureExtractor::new(FeatureConfig::default()).unwrap();
        let mut samples = tone(440.0, 16000);
        samples[100] = f32::NAN;
        samples[2000] = f32::INFINITY;
        let features = extractor.extract(&samples).unwrap();
        assert!(features.as_slice().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_short_clip_rejected() {
        let extractor = FeatureExtractor::new(FeatureConfig::default()).unwrap();
        let result = extractor.extract(&vec![0.1f32; 512]);
        assert!(matches!(
            result,
            Err(AudioError::InsufficientAudio { samples: 512, .. })
        ));
    }

    #[test]
    fn test_deterministic() {
        let extractor = FeatureExtractor::new(FeatureConfig::default()).unwrap();
        let clip = tone(330.0, 32000);
        let a = extractor.extract(&clip).unwrap();
        let b = extractor.extract(&clip).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_zcr_tracks_frequency() {
        // A sine at f crosses zero 2f times per second
        let low = zero_crossing_rate(&tone(100.0, 2048));
        let high = zero_crossing_rate(&tone(2000.0, 2048));
        assert!(high > low);
        assert!((high - 2.0 * 2000.0 / 16000.0).abs() < 0.05);
    }

    #[test]
    fn test_tone_energy_exceeds_silence() {
        let extractor = FeatureExtractor::new(FeatureConfig::default()).unwrap();
        let cfg = extractor.config().clone();

        let silent = extractor.extract(&vec![0.0f32; 16000]).unwrap();
        let voiced = extractor.extract(&tone(440.0, 16000)).unwrap();

        // Compare the mel-mean block (after mfcc and chroma blocks)
        let mel_start = 2 * cfg.n_mfcc + 2 * cfg.n_chroma;
        let mel_mean = |v: &FeatureVector| {
            v.as_slice()[mel_start..mel_start + cfg.n_mels]
                .iter()
                .sum::<f32>()
        };
        assert!(mel_mean(&voiced) > mel_mean(&silent));
    }
}
