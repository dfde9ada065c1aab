/// Auralis DSP - deterministic audio analysis and mastering primitives
///
/// Two halves, one crate:
/// - Fingerprinting: the 25-dimensional feature vector summarizing a track
///   (frequency balance, dynamics, rhythm, spectral shape, harmonicity,
///   temporal variation, stereo image).
/// - Mastering stages: EQ, compressor, upward expander, lookahead limiter,
///   stereo width, crossfades - the building blocks of the adaptive pipeline.
///
/// Everything here is pure sample math: no I/O, no clocks, no async. Given
/// identical input, every function produces identical output.

// Analysis modules (25D fingerprint)
pub mod spectrum;
pub mod frequency_bands;
pub mod spectral;
pub mod temporal;
pub mod harmonic;
pub mod variation;
pub mod stereo;
pub mod loudness;
pub mod fingerprint;

// Mastering stage modules
pub mod biquad;
pub mod envelope;
pub mod eq;
pub mod compressor;
pub mod expander;
pub mod limiter;
pub mod fade;

// Re-export the main entry points
pub use fingerprint::{
    extract, ExtractError, Fingerprint, MAX_ANALYSIS_SECS, MIN_DURATION_SECS, SCHEMA_VERSION,
};
pub use frequency_bands::{compute_band_energies, BandEnergies};
pub use harmonic::{compute_harmonic_profile, HarmonicProfile};
pub use loudness::{crest_factor_db, integrated_lufs};
pub use spectral::{compute_spectral_shape, SpectralShape};
pub use stereo::{measure_stereo_image, StereoImage, StereoWidthStage};
pub use temporal::{compute_temporal_profile, TemporalProfile};
pub use variation::{compute_variation_profile, VariationProfile};

pub use compressor::{soft_clip, Compressor, CompressorConfig};
pub use envelope::EnvelopeFollower;
pub use eq::AdaptiveEq;
pub use expander::TransientExpander;
pub use limiter::Limiter;

/// Planar stereo audio at a known sample rate.
///
/// Both channels always hold the same number of samples; mono sources are
/// promoted to dual mono before they reach this type.
#[derive(Debug, Clone, Default)]
pub struct StereoBuffer {
    pub left: Vec<f32>,
    pub right: Vec<f32>,
    pub sample_rate: u32,
}

impl StereoBuffer {
    pub fn new(left: Vec<f32>, right: Vec<f32>, sample_rate: u32) -> Self {
        debug_assert_eq!(left.len(), right.len());
        Self {
            left,
            right,
            sample_rate,
        }
    }

    /// Silence of `len` samples per channel.
    pub fn silence(len: usize, sample_rate: u32) -> Self {
        Self {
            left: vec![0.0; len],
            right: vec![0.0; len],
            sample_rate,
        }
    }

    pub fn from_interleaved(samples: &[f32], sample_rate: u32) -> Self {
        let left = samples.iter().step_by(2).copied().collect();
        let right = samples.iter().skip(1).step_by(2).copied().collect();
        Self {
            left,
            right,
            sample_rate,
        }
    }

    pub fn to_interleaved(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.left.len() * 2);
        for (l, r) in self.left.iter().zip(self.right.iter()) {
            out.push(*l);
            out.push(*r);
        }
        out
    }

    /// Samples per channel.
    pub fn len(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }

    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.left.len() as f32 / self.sample_rate as f32
    }

    /// Equal-weight mono mixdown.
    pub fn mono(&self) -> Vec<f32> {
        self.left
            .iter()
            .zip(self.right.iter())
            .map(|(l, r)| (l + r) * 0.5)
            .collect()
    }

    /// Peak absolute sample across both channels.
    pub fn peak(&self) -> f32 {
        self.left
            .iter()
            .chain(self.right.iter())
            .map(|s| s.abs())
            .fold(0.0f32, f32::max)
    }

    /// RMS across both channels combined.
    pub fn rms(&self) -> f32 {
        let n = self.left.len() + self.right.len();
        if n == 0 {
            return 0.0;
        }
        let sum_sq: f32 = self
            .left
            .iter()
            .chain(self.right.iter())
            .map(|s| s * s)
            .sum();
        (sum_sq / n as f32).sqrt()
    }
}
