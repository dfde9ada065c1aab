/// ITU-R BS.1770 loudness and crest factor
///
/// The K-weighting prefilter is two biquads: a high shelf lifting ~+4 dB
/// above ~1.7 kHz (head diffraction stage) and a low-cut around 38 Hz (RLB
/// stage). The filter-design parameters below are the published values that
/// reproduce the standard's 48 kHz coefficient tables and transfer cleanly
/// to any sample rate.
///
/// Integrated loudness gates 400 ms blocks (75% overlap): blocks below
/// -70 LUFS are dropped outright, then blocks more than 10 LU below the
/// ungated mean are dropped, and the survivors are power-averaged.

use crate::biquad::{BiquadCoeffs, BiquadState};

const SHELF_HZ: f64 = 1681.974450955533;
const SHELF_GAIN_DB: f64 = 3.999843853973347;
const SHELF_Q: f64 = 0.7071752369554196;
const HIGHPASS_HZ: f64 = 38.13547087602444;
const HIGHPASS_Q: f64 = 0.5003270373238773;

const BLOCK_SECS: f64 = 0.4;
const BLOCK_OVERLAP: f64 = 0.75;
const ABSOLUTE_GATE_LUFS: f64 = -70.0;
const RELATIVE_GATE_LU: f64 = -10.0;

/// The -0.691 offset calibrates a 997 Hz sine at 0 dBFS to -3.01 LUFS.
const LOUDNESS_OFFSET: f64 = -0.691;

/// Silence floor reported when there is nothing to measure.
pub const SILENCE_LUFS: f32 = -120.0;

fn k_weighting_coeffs(sample_rate: u32) -> (BiquadCoeffs, BiquadCoeffs) {
    let sr = sample_rate as f64;
    (
        BiquadCoeffs::high_shelf(sr, SHELF_HZ, SHELF_Q, SHELF_GAIN_DB),
        BiquadCoeffs::highpass(sr, HIGHPASS_HZ, HIGHPASS_Q),
    )
}

fn k_weight_channel(samples: &[f32], sample_rate: u32) -> Vec<f32> {
    let (shelf, highpass) = k_weighting_coeffs(sample_rate);
    let mut shelf_state = BiquadState::default();
    let mut hp_state = BiquadState::default();

    samples
        .iter()
        .map(|&s| {
            let shelved = shelf.process_sample(s as f64, &mut shelf_state);
            highpass.process_sample(shelved, &mut hp_state) as f32
        })
        .collect()
}

/// Mean square per gating block, summed across channels.
fn block_powers(weighted: &[Vec<f32>], sample_rate: u32) -> Vec<f64> {
    let block_len = (BLOCK_SECS * sample_rate as f64) as usize;
    let hop = ((1.0 - BLOCK_OVERLAP) * block_len as f64).max(1.0) as usize;
    let n = weighted[0].len();
    if n < block_len {
        return Vec::new();
    }

    let n_blocks = (n - block_len) / hop + 1;
    let mut powers = Vec::with_capacity(n_blocks);
    for b in 0..n_blocks {
        let start = b * hop;
        let mut power = 0.0f64;
        for ch in weighted {
            let sum_sq: f64 = ch[start..start + block_len]
                .iter()
                .map(|&s| (s as f64) * (s as f64))
                .sum();
            power += sum_sq / block_len as f64;
        }
        powers.push(power);
    }
    powers
}

fn power_to_lufs(power: f64) -> f64 {
    LOUDNESS_OFFSET + 10.0 * power.max(1e-15).log10()
}

/// Gated integrated loudness of a stereo pair, in LUFS.
///
/// Inputs shorter than one gating block fall back to an ungated measurement
/// over whatever is there, so chunk-local callers always get a number.
pub fn integrated_lufs(left: &[f32], right: &[f32], sample_rate: u32) -> f32 {
    if left.is_empty() || sample_rate == 0 {
        return SILENCE_LUFS;
    }

    let weighted = vec![
        k_weight_channel(left, sample_rate),
        k_weight_channel(right, sample_rate),
    ];
    let powers = block_powers(&weighted, sample_rate);

    if powers.is_empty() {
        // Short input: single ungated block over the full length
        let mut power = 0.0f64;
        for ch in &weighted {
            let sum_sq: f64 = ch.iter().map(|&s| (s as f64) * (s as f64)).sum();
            power += sum_sq / ch.len().max(1) as f64;
        }
        return power_to_lufs(power).max(SILENCE_LUFS as f64) as f32;
    }

    // Absolute gate
    let above_absolute: Vec<f64> = powers
        .iter()
        .copied()
        .filter(|&p| power_to_lufs(p) > ABSOLUTE_GATE_LUFS)
        .collect();
    if above_absolute.is_empty() {
        return SILENCE_LUFS;
    }

    // Relative gate: -10 LU below the mean of the absolute-gated blocks
    let ungated_mean = above_absolute.iter().sum::<f64>() / above_absolute.len() as f64;
    let relative_threshold = power_to_lufs(ungated_mean) + RELATIVE_GATE_LU;

    let gated: Vec<f64> = above_absolute
        .into_iter()
        .filter(|&p| power_to_lufs(p) > relative_threshold)
        .collect();
    if gated.is_empty() {
        return SILENCE_LUFS;
    }

    let mean_power = gated.iter().sum::<f64>() / gated.len() as f64;
    power_to_lufs(mean_power).max(SILENCE_LUFS as f64) as f32
}

/// Crest factor `20 * log10(peak / rms)` over both channels, in dB.
/// Never negative; silence reports 0.
pub fn crest_factor_db(left: &[f32], right: &[f32]) -> f32 {
    let n = left.len() + right.len();
    if n == 0 {
        return 0.0;
    }

    let peak = left
        .iter()
        .chain(right.iter())
        .map(|s| s.abs())
        .fold(0.0f32, f32::max);
    let sum_sq: f32 = left.iter().chain(right.iter()).map(|s| s * s).sum();
    let rms = (sum_sq / n as f32).sqrt();

    if rms < 1e-10 || peak < 1e-10 {
        return 0.0;
    }
    (20.0 * (peak / rms).log10()).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn sine_stereo(freq: f32, amp: f32, sample_rate: u32, secs: f32) -> (Vec<f32>, Vec<f32>) {
        let n = (secs * sample_rate as f32) as usize;
        let ch: Vec<f32> = (0..n)
            .map(|i| amp * (2.0 * PI * freq * i as f32 / sample_rate as f32).sin())
            .collect();
        (ch.clone(), ch)
    }

    #[test]
    fn test_silence_reports_floor() {
        let z = vec![0.0f32; 44100];
        assert_eq!(integrated_lufs(&z, &z, 44100), SILENCE_LUFS);
    }

    #[test]
    fn test_full_scale_sine_calibration() {
        // 997 Hz at 0 dBFS in both channels reads -3.01 LUFS + 3.01 for the
        // second channel = ~0 LUFS... in practice: one channel is -3.01,
        // stereo duplicated adds +3 dB of power.
        let (l, r) = sine_stereo(997.0, 1.0, 48000, 5.0);
        let lufs = integrated_lufs(&l, &r, 48000);
        assert!((lufs - 0.0).abs() < 1.0, "lufs {lufs}");
    }

    #[test]
    fn test_quieter_signal_is_quieter() {
        let (l1, r1) = sine_stereo(997.0, 0.5, 44100, 3.0);
        let (l2, r2) = sine_stereo(997.0, 0.05, 44100, 3.0);
        let loud = integrated_lufs(&l1, &r1, 44100);
        let quiet = integrated_lufs(&l2, &r2, 44100);
        assert!((loud - quiet - 20.0).abs() < 1.0, "{loud} vs {quiet}");
    }

    #[test]
    fn test_gating_ignores_silent_tail() {
        // 3 s of tone followed by 3 s of silence should read close to the
        // tone alone; the gate drops the silent blocks.
        let (mut l, mut r) = sine_stereo(997.0, 0.3, 44100, 3.0);
        let tone_only = integrated_lufs(&l, &r, 44100);

        l.extend(std::iter::repeat(0.0).take(3 * 44100));
        r.extend(std::iter::repeat(0.0).take(3 * 44100));
        let with_tail = integrated_lufs(&l, &r, 44100);

        assert!((tone_only - with_tail).abs() < 1.5, "{tone_only} vs {with_tail}");
    }

    #[test]
    fn test_crest_of_sine() {
        // Sine crest factor is sqrt(2) = 3.01 dB
        let (l, r) = sine_stereo(440.0, 0.5, 44100, 1.0);
        let crest = crest_factor_db(&l, &r);
        assert!((crest - 3.01).abs() < 0.1, "crest {crest}");
    }

    #[test]
    fn test_crest_of_square_is_zero() {
        let l: Vec<f32> = (0..44100).map(|i| if i % 100 < 50 { 0.5 } else { -0.5 }).collect();
        let crest = crest_factor_db(&l, &l.clone());
        assert!(crest < 0.1);
    }

    #[test]
    fn test_crest_nonnegative_on_silence() {
        assert_eq!(crest_factor_db(&[0.0; 100], &[0.0; 100]), 0.0);
    }

    #[test]
    fn test_short_input_still_measures() {
        let (l, r) = sine_stereo(997.0, 0.3, 44100, 0.1);
        let lufs = integrated_lufs(&l, &r, 44100);
        assert!(lufs > SILENCE_LUFS && lufs < 0.0);
    }
}
