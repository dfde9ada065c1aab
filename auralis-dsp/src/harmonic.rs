/// Harmonic content: periodicity, pitch stability, chroma concentration
///
/// Works frame-wise on the time signal. Per 2048-sample frame, normalized
/// autocorrelation over the 60-1000 Hz lag range gives both a periodicity
/// strength (harmonic ratio after averaging) and a fundamental estimate
/// (pitch stability from the spread of those estimates across voiced
/// frames). Chroma folds the magnitude spectrum into 12 pitch classes and
/// measures how concentrated the fold is.

use crate::spectrum::SpectrumAnalyzer;
use rayon::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HarmonicProfile {
    /// 0 = noise, 1 = strongly periodic.
    pub harmonic_ratio: f32,
    /// 0 = wandering pitch, 1 = locked pitch. 0.5 when too few voiced frames.
    pub pitch_stability: f32,
    /// 0 = energy smeared across pitch classes, 1 = concentrated.
    pub chroma_energy: f32,
}

const FRAME_SIZE: usize = 2048;
const FRAME_HOP: usize = 2048;
const MIN_F0_HZ: f32 = 60.0;
const MAX_F0_HZ: f32 = 1000.0;
const VOICED_THRESHOLD: f32 = 0.5;

/// Lag stride of the coarse search pass; the winner is refined exactly.
const COARSE_STEP: usize = 4;

pub fn compute_harmonic_profile(samples: &[f32], sample_rate: u32) -> HarmonicProfile {
    if samples.len() < FRAME_SIZE * 2 || sample_rate == 0 {
        return HarmonicProfile {
            harmonic_ratio: 0.5,
            pitch_stability: 0.5,
            chroma_energy: 0.5,
        };
    }

    let n_frames = (samples.len() - FRAME_SIZE) / FRAME_HOP + 1;
    let per_frame: Vec<(f32, Option<f32>)> = (0..n_frames)
        .into_par_iter()
        .map(|i| {
            let frame = &samples[i * FRAME_HOP..i * FRAME_HOP + FRAME_SIZE];
            frame_periodicity(frame, sample_rate)
        })
        .collect();

    let periodicities: Vec<f32> = per_frame.iter().map(|f| f.0).collect();
    let harmonic_ratio = if periodicities.is_empty() {
        0.5
    } else {
        (periodicities.iter().sum::<f32>() / periodicities.len() as f32).clamp(0.0, 1.0)
    };

    let f0s: Vec<f32> = per_frame.iter().filter_map(|f| f.1).collect();
    let pitch_stability = stability_from_f0s(&f0s);

    HarmonicProfile {
        harmonic_ratio,
        pitch_stability,
        chroma_energy: chroma_concentration(samples, sample_rate),
    }
}

/// Normalized autocorrelation max over the f0 lag range. Returns the
/// periodicity strength and, when voiced, the fundamental in Hz.
///
/// Coarse-to-fine: a strided pass finds the neighborhood, then every lag
/// around the winner is checked exactly. Same result as the exhaustive
/// scan for any real periodicity wider than the stride.
fn frame_periodicity(frame: &[f32], sample_rate: u32) -> (f32, Option<f32>) {
    let energy: f32 = frame.iter().map(|s| s * s).sum();
    if energy < 1e-9 {
        return (0.0, None);
    }

    let min_lag = ((sample_rate as f32 / MAX_F0_HZ) as usize).max(2);
    let max_lag = ((sample_rate as f32 / MIN_F0_HZ) as usize).min(frame.len() / 2);
    if min_lag >= max_lag {
        return (0.0, None);
    }

    let correlate = |lag: usize| -> f32 {
        let mut corr = 0.0f32;
        for i in 0..frame.len() - lag {
            corr += frame[i] * frame[i + lag];
        }
        corr / energy
    };

    let mut best_corr = 0.0f32;
    let mut best_lag = min_lag;
    let mut lag = min_lag;
    while lag <= max_lag {
        let norm = correlate(lag);
        if norm > best_corr {
            best_corr = norm;
            best_lag = lag;
        }
        lag += COARSE_STEP;
    }
    let refine_lo = best_lag.saturating_sub(COARSE_STEP - 1).max(min_lag);
    let refine_hi = (best_lag + COARSE_STEP - 1).min(max_lag);
    for lag in refine_lo..=refine_hi {
        let norm = correlate(lag);
        if norm > best_corr {
            best_corr = norm;
            best_lag = lag;
        }
    }

    let periodicity = best_corr.clamp(0.0, 1.0);
    let f0 = if periodicity > VOICED_THRESHOLD {
        Some(sample_rate as f32 / best_lag as f32)
    } else {
        None
    };
    (periodicity, f0)
}

/// 1 minus the coefficient of variation of voiced-frame fundamentals.
fn stability_from_f0s(f0s: &[f32]) -> f32 {
    if f0s.len() < 3 {
        return 0.5;
    }
    let mean = f0s.iter().sum::<f32>() / f0s.len() as f32;
    if mean < 1e-6 {
        return 0.5;
    }
    let variance = f0s.iter().map(|f| (f - mean).powi(2)).sum::<f32>() / f0s.len() as f32;
    let cv = variance.sqrt() / mean;
    (1.0 - cv).clamp(0.0, 1.0)
}

/// Fold the 80-5000 Hz spectrum into 12 pitch classes per frame, normalize
/// the fold to a unit sum, and report how far its maximum rises above the
/// uniform 1/12 floor, averaged across frames.
fn chroma_concentration(samples: &[f32], sample_rate: u32) -> f32 {
    let analyzer = SpectrumAnalyzer::default();
    if analyzer.num_frames(samples.len()) == 0 {
        return 0.5;
    }

    let per_frame: Vec<f32> = analyzer.par_frame_map(samples, |_, mags| {
        let mut chroma = [0.0f32; 12];
        for (bin, &m) in mags.iter().enumerate() {
            let freq = analyzer.bin_frequency(bin, sample_rate);
            if !(80.0..=5000.0).contains(&freq) {
                continue;
            }
            // MIDI note number, folded to a pitch class
            let midi = 69.0 + 12.0 * (freq / 440.0).log2();
            let pc = ((midi.round() as i32) % 12 + 12) % 12;
            chroma[pc as usize] += m * m;
        }

        let total: f32 = chroma.iter().sum();
        if total < 1e-15 {
            return 0.0;
        }
        let max = chroma.iter().fold(0.0f32, |a, &b| a.max(b)) / total;
        // Rescale: uniform fold (1/12) -> 0, single class -> 1
        ((max - 1.0 / 12.0) / (1.0 - 1.0 / 12.0)).clamp(0.0, 1.0)
    });

    if per_frame.is_empty() {
        return 0.5;
    }
    (per_frame.iter().sum::<f32>() / per_frame.len() as f32).clamp(0.0, 1.0)
}
