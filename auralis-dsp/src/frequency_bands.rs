/// Frequency balance across 7 perceptual bands
///
/// Band energies are accumulated over the full STFT (not a single window),
/// then normalized so the seven values sum to 1. The band edges follow the
/// usual mastering vocabulary: sub-bass, bass, low-mids, mids, upper-mids,
/// presence, air.

use crate::spectrum::SpectrumAnalyzer;

/// Band edges in Hz. Band `i` covers `[EDGES[i], EDGES[i+1])`.
pub const BAND_EDGES_HZ: [f32; 8] = [
    0.0, 60.0, 250.0, 500.0, 2000.0, 4000.0, 8000.0, 20000.0,
];

/// Fractional energy per band; sums to 1.0 (within float noise).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandEnergies {
    pub sub_bass: f32,
    pub bass: f32,
    pub low_mid: f32,
    pub mid: f32,
    pub upper_mid: f32,
    pub presence: f32,
    pub air: f32,
}

impl BandEnergies {
    pub fn to_array(&self) -> [f32; 7] {
        [
            self.sub_bass,
            self.bass,
            self.low_mid,
            self.mid,
            self.upper_mid,
            self.presence,
            self.air,
        ]
    }

    pub fn sum(&self) -> f32 {
        self.to_array().iter().sum()
    }

    fn from_array(values: [f32; 7]) -> Self {
        Self {
            sub_bass: values[0],
            bass: values[1],
            low_mid: values[2],
            mid: values[3],
            upper_mid: values[4],
            presence: values[5],
            air: values[6],
        }
    }

    fn uniform() -> Self {
        Self::from_array([1.0 / 7.0; 7])
    }
}

/// Bass-to-mid energy ratio in dB, taken from the normalized band split.
/// Positive = bass-heavy, negative = mid-forward.
pub fn bass_to_mid_db(bands: &BandEnergies) -> f32 {
    let bass = bands.bass.max(1e-9);
    let mid = bands.mid.max(1e-9);
    10.0 * (bass / mid).log10()
}

/// Accumulate per-band power over all STFT frames and normalize to a unit
/// sum. A silent or too-short input degrades to the uniform split so the
/// unit-sum contract holds for every input.
pub fn compute_band_energies(samples: &[f32], sample_rate: u32) -> BandEnergies {
    let analyzer = SpectrumAnalyzer::default();
    if analyzer.num_frames(samples.len()) == 0 {
        return BandEnergies::uniform();
    }

    let nyquist = sample_rate as f32 / 2.0;
    let frame_bands: Vec<[f32; 7]> = analyzer.par_frame_map(samples, |_, mags| {
        let mut bands = [0.0f32; 7];
        for (bin, &m) in mags.iter().enumerate() {
            let freq = analyzer.bin_frequency(bin, sample_rate);
            if freq > nyquist {
                break;
            }
            let power = m * m;
            for b in 0..7 {
                if freq >= BAND_EDGES_HZ[b] && freq < BAND_EDGES_HZ[b + 1] {
                    bands[b] += power;
                    break;
                }
            }
        }
        bands
    });

    // Sequential reduction keeps the result deterministic
    let mut total_bands = [0.0f32; 7];
    for fb in &frame_bands {
        for b in 0..7 {
            total_bands[b] += fb[b];
        }
    }

    let total: f32 = total_bands.iter().sum();
    if total < 1e-12 {
        return BandEnergies::uniform();
    }
    for b in &mut total_bands {
        *b /= total;
    }
    BandEnergies::from_array(total_bands)
}
