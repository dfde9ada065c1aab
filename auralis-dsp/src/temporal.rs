/// Temporal features: tempo, rhythm stability, transient density, silence
///
/// All four hang off a spectral-flux onset envelope: per STFT frame, the
/// positive magnitude differences against the previous frame are summed.
/// Tempo comes from the envelope's autocorrelation restricted to 60-200 BPM;
/// rhythm stability from how much the dominant autocorrelation peak stands
/// out; transient density from picked onset peaks per second.

use crate::spectrum::{SpectrumAnalyzer, HOP_LENGTH};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemporalProfile {
    pub tempo_bpm: f32,
    /// 0 = no periodicity, 1 = metronomic.
    pub rhythm_stability: f32,
    /// Onsets per second divided by 10, clamped to [0, 1].
    pub transient_density: f32,
    /// Fraction of 50 ms frames below -60 dBFS RMS.
    pub silence_ratio: f32,
}

const MIN_BPM: f32 = 60.0;
const MAX_BPM: f32 = 200.0;
const FALLBACK_BPM: f32 = 120.0;
const SILENCE_FRAME_SECS: f32 = 0.05;
const SILENCE_FLOOR_DBFS: f32 = -60.0;

pub fn compute_temporal_profile(samples: &[f32], sample_rate: u32) -> TemporalProfile {
    let envelope = onset_envelope(samples, sample_rate);
    let envelope_rate = sample_rate as f32 / HOP_LENGTH as f32;
    let duration_secs = samples.len() as f32 / sample_rate.max(1) as f32;

    let (tempo_bpm, rhythm_stability) = tempo_from_envelope(&envelope, envelope_rate);
    let onset_count = pick_onsets(&envelope).len();
    let transient_density = if duration_secs > 0.0 {
        ((onset_count as f32 / duration_secs) / 10.0).clamp(0.0, 1.0)
    } else {
        0.0
    };

    TemporalProfile {
        tempo_bpm,
        rhythm_stability,
        transient_density,
        silence_ratio: silence_ratio(samples, sample_rate),
    }
}

/// Spectral-flux onset strength per STFT frame.
///
/// Streams frame by frame holding only the previous magnitudes; the full
/// spectrogram of a two-minute analysis window never materializes.
pub fn onset_envelope(samples: &[f32], sample_rate: u32) -> Vec<f32> {
    let _ = sample_rate;
    let analyzer = SpectrumAnalyzer::default();
    let n_frames = analyzer.num_frames(samples.len());
    if n_frames < 2 {
        return Vec::new();
    }

    let mut envelope = Vec::with_capacity(n_frames);
    envelope.push(0.0);
    let mut prev = analyzer.magnitudes(samples, 0);
    for i in 1..n_frames {
        let mags = analyzer.magnitudes(samples, i);
        let flux: f32 = mags
            .iter()
            .zip(prev.iter())
            .map(|(cur, old)| (cur - old).max(0.0))
            .sum();
        envelope.push(flux);
        prev = mags;
    }
    envelope
}

/// Autocorrelation over the BPM-lag range. Returns (tempo, peak sharpness).
fn tempo_from_envelope(envelope: &[f32], envelope_rate: f32) -> (f32, f32) {
    if envelope.len() < 8 {
        return (FALLBACK_BPM, 0.0);
    }

    // Remove DC so sustained loud passages don't masquerade as periodicity
    let mean = envelope.iter().sum::<f32>() / envelope.len() as f32;
    let centered: Vec<f32> = envelope.iter().map(|e| e - mean).collect();

    let energy: f32 = centered.iter().map(|e| e * e).sum();
    if energy < 1e-12 {
        return (FALLBACK_BPM, 0.0);
    }

    let min_lag = ((envelope_rate * 60.0 / MAX_BPM).ceil() as usize).max(1);
    let max_lag = ((envelope_rate * 60.0 / MIN_BPM).floor() as usize).min(centered.len() / 2);
    if min_lag >= max_lag {
        return (FALLBACK_BPM, 0.0);
    }

    let mut correlations = Vec::with_capacity(max_lag - min_lag + 1);
    for lag in min_lag..=max_lag {
        let mut corr = 0.0f32;
        for i in 0..centered.len() - lag {
            corr += centered[i] * centered[i + lag];
        }
        correlations.push(corr / energy);
    }

    let (best_idx, &best_corr) = correlations
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        .unwrap();
    let best_lag = min_lag + best_idx;
    let tempo = (60.0 * envelope_rate / best_lag as f32).clamp(MIN_BPM, MAX_BPM);

    // Sharpness: how far the winner rises above the lag-range mean.
    // A flat correlation curve (rubato, free time) scores near 0; one
    // dominant spike scores near 1.
    let corr_mean = correlations.iter().sum::<f32>() / correlations.len() as f32;
    let sharpness = if best_corr > 1e-9 {
        ((best_corr - corr_mean) / best_corr).clamp(0.0, 1.0)
    } else {
        0.0
    };

    (tempo, sharpness)
}

/// Local maxima of the onset envelope above an adaptive threshold.
fn pick_onsets(envelope: &[f32]) -> Vec<usize> {
    if envelope.len() < 3 {
        return Vec::new();
    }

    let mean = envelope.iter().sum::<f32>() / envelope.len() as f32;
    let variance =
        envelope.iter().map(|e| (e - mean).powi(2)).sum::<f32>() / envelope.len() as f32;
    let threshold = mean + variance.sqrt() * 0.5;

    let mut onsets = Vec::new();
    for i in 1..envelope.len() - 1 {
        if envelope[i] > threshold
            && envelope[i] > envelope[i - 1]
            && envelope[i] >= envelope[i + 1]
        {
            onsets.push(i);
        }
    }
    onsets
}

fn silence_ratio(samples: &[f32], sample_rate: u32) -> f32 {
    if samples.is_empty() || sample_rate == 0 {
        return 1.0;
    }

    let frame_len = ((SILENCE_FRAME_SECS * sample_rate as f32) as usize).max(1);
    let floor = 10f32.powf(SILENCE_FLOOR_DBFS / 20.0);

    let mut silent = 0usize;
    let mut total = 0usize;
    for frame in samples.chunks(frame_len) {
        let rms = (frame.iter().map(|s| s * s).sum::<f32>() / frame.len() as f32).sqrt();
        if rms < floor {
            silent += 1;
        }
        total += 1;
    }
    silent as f32 / total.max(1) as f32
}
