/// The 25-dimensional audio fingerprint
///
/// Field order is fixed and versioned; the sidecar file and the store both
/// serialize exactly this order. Bumping SCHEMA_VERSION invalidates every
/// persisted fingerprint and forces re-extraction.

use crate::frequency_bands::{self, bass_to_mid_db};
use crate::harmonic;
use crate::loudness;
use crate::spectral;
use crate::stereo;
use crate::temporal;
use crate::variation;
use crate::StereoBuffer;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Bumped whenever the meaning or computation of any dimension changes.
pub const SCHEMA_VERSION: u16 = 1;

/// Shortest input a fingerprint can be trusted on.
pub const MIN_DURATION_SECS: f32 = 10.0;

/// Extraction cap: anything longer is fingerprinted from its head.
pub const MAX_ANALYSIS_SECS: f32 = 120.0;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("input too short for fingerprinting: {seconds:.1}s (minimum {MIN_DURATION_SECS}s)")]
    InsufficientDuration { seconds: f32 },

    #[error("input buffer is empty")]
    EmptyInput,

    #[error("unsupported sample rate: {0} Hz")]
    UnsupportedRate(u32),
}

/// 25 floats, fixed order. Groups: frequency (7), dynamics (3),
/// temporal (4), spectral (3), harmonic (3), variation (3), stereo (2).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fingerprint {
    // Frequency distribution (7D) - fractional band energy, sums to 1
    pub sub_bass: f32,
    pub bass: f32,
    pub low_mid: f32,
    pub mid: f32,
    pub upper_mid: f32,
    pub presence: f32,
    pub air: f32,

    // Dynamics (3D)
    pub lufs: f32,
    pub crest_db: f32,
    pub bass_mid_ratio_db: f32,

    // Temporal (4D)
    pub tempo_bpm: f32,
    pub rhythm_stability: f32,
    pub transient_density: f32,
    pub silence_ratio: f32,

    // Spectral (3D)
    pub spectral_centroid_hz: f32,
    pub spectral_rolloff_hz: f32,
    pub spectral_flatness: f32,

    // Harmonic (3D)
    pub harmonic_ratio: f32,
    pub pitch_stability: f32,
    pub chroma_energy: f32,

    // Variation (3D)
    pub dynamic_range_variation: f32,
    pub loudness_variation: f32,
    pub peak_consistency: f32,

    // Stereo (2D)
    pub stereo_width: f32,
    pub phase_correlation: f32,
}

impl Fingerprint {
    /// The canonical serialization order.
    pub fn to_array(&self) -> [f32; 25] {
        [
            self.sub_bass,
            self.bass,
            self.low_mid,
            self.mid,
            self.upper_mid,
            self.presence,
            self.air,
            self.lufs,
            self.crest_db,
            self.bass_mid_ratio_db,
            self.tempo_bpm,
            self.rhythm_stability,
            self.transient_density,
            self.silence_ratio,
            self.spectral_centroid_hz,
            self.spectral_rolloff_hz,
            self.spectral_flatness,
            self.harmonic_ratio,
            self.pitch_stability,
            self.chroma_energy,
            self.dynamic_range_variation,
            self.loudness_variation,
            self.peak_consistency,
            self.stereo_width,
            self.phase_correlation,
        ]
    }

    pub fn from_array(v: [f32; 25]) -> Self {
        Self {
            sub_bass: v[0],
            bass: v[1],
            low_mid: v[2],
            mid: v[3],
            upper_mid: v[4],
            presence: v[5],
            air: v[6],
            lufs: v[7],
            crest_db: v[8],
            bass_mid_ratio_db: v[9],
            tempo_bpm: v[10],
            rhythm_stability: v[11],
            transient_density: v[12],
            silence_ratio: v[13],
            spectral_centroid_hz: v[14],
            spectral_rolloff_hz: v[15],
            spectral_flatness: v[16],
            harmonic_ratio: v[17],
            pitch_stability: v[18],
            chroma_energy: v[19],
            dynamic_range_variation: v[20],
            loudness_variation: v[21],
            peak_consistency: v[22],
            stereo_width: v[23],
            phase_correlation: v[24],
        }
    }

    /// Structural sanity of the core invariants: finite fields, near-unit
    /// band sum, bounded stereo dimensions.
    pub fn is_valid(&self) -> bool {
        let arr = self.to_array();
        if arr.iter().any(|v| !v.is_finite()) {
            return false;
        }
        let band_sum: f32 = arr[..7].iter().sum();
        (band_sum - 1.0).abs() <= 0.01
            && (0.0..=1.0).contains(&self.stereo_width)
            && (-1.0..=1.0).contains(&self.phase_correlation)
            && self.crest_db >= 0.0
            && self.spectral_centroid_hz > 0.0
    }
}

/// Extract the full 25-D fingerprint from a stereo buffer at the canonical
/// rate. Works on segments of at least [`MIN_DURATION_SECS`].
pub fn extract(buffer: &StereoBuffer) -> Result<Fingerprint, ExtractError> {
    if buffer.is_empty() {
        return Err(ExtractError::EmptyInput);
    }
    if !(8_000..=192_000).contains(&buffer.sample_rate) {
        return Err(ExtractError::UnsupportedRate(buffer.sample_rate));
    }
    let duration = buffer.duration_secs();
    if duration < MIN_DURATION_SECS {
        return Err(ExtractError::InsufficientDuration { seconds: duration });
    }

    // Long tracks are represented by their head; keeps extraction bounded
    let analysis_len =
        ((MAX_ANALYSIS_SECS * buffer.sample_rate as f32) as usize).min(buffer.len());
    let left = &buffer.left[..analysis_len];
    let right = &buffer.right[..analysis_len];
    let mono: Vec<f32> = left
        .iter()
        .zip(right.iter())
        .map(|(l, r)| (l + r) * 0.5)
        .collect();
    let sr = buffer.sample_rate;

    let bands = frequency_bands::compute_band_energies(&mono, sr);
    let shape = spectral::compute_spectral_shape(&mono, sr);
    let rhythm = temporal::compute_temporal_profile(&mono, sr);
    let harmonics = harmonic::compute_harmonic_profile(&mono, sr);
    let movement = variation::compute_variation_profile(&mono, sr);
    let image = stereo::measure_stereo_image(left, right);

    Ok(Fingerprint {
        sub_bass: bands.sub_bass,
        bass: bands.bass,
        low_mid: bands.low_mid,
        mid: bands.mid,
        upper_mid: bands.upper_mid,
        presence: bands.presence,
        air: bands.air,

        lufs: loudness::integrated_lufs(left, right, sr),
        crest_db: loudness::crest_factor_db(left, right),
        bass_mid_ratio_db: bass_to_mid_db(&bands),

        tempo_bpm: rhythm.tempo_bpm,
        rhythm_stability: rhythm.rhythm_stability,
        transient_density: rhythm.transient_density,
        silence_ratio: rhythm.silence_ratio,

        spectral_centroid_hz: shape.centroid_hz,
        spectral_rolloff_hz: shape.rolloff_hz,
        spectral_flatness: shape.flatness,

        harmonic_ratio: harmonics.harmonic_ratio,
        pitch_stability: harmonics.pitch_stability,
        chroma_energy: harmonics.chroma_energy,

        dynamic_range_variation: movement.dynamic_range_variation,
        loudness_variation: movement.loudness_variation,
        peak_consistency: movement.peak_consistency,

        stereo_width: image.width,
        phase_correlation: image.correlation,
    })
}
